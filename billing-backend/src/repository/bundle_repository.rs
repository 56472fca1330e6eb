// billing-backend/src/repository/bundle_repository.rs

use crate::domain::bundle_model::{self, ActiveModel as BundleActiveModel, Entity as BundleEntity};
use chrono::Utc;
use sea_orm::entity::*;
use sea_orm::{DbConn, DbErr, QueryFilter, QueryOrder, Set};
use uuid::Uuid;

#[derive(Debug, Clone)]
pub struct BundleRepository {
    db: DbConn,
}

impl BundleRepository {
    pub fn new(db: DbConn) -> Self {
        Self { db }
    }

    pub async fn create(
        &self,
        account_id: Uuid,
        external_key: &str,
    ) -> Result<bundle_model::Model, DbErr> {
        let new_bundle = BundleActiveModel {
            id: Set(Uuid::new_v4()),
            account_id: Set(account_id),
            external_key: Set(external_key.to_string()),
            created_at: Set(Utc::now()),
        };

        new_bundle.insert(&self.db).await
    }

    pub async fn find_by_id(&self, id: Uuid) -> Result<Option<bundle_model::Model>, DbErr> {
        BundleEntity::find_by_id(id).one(&self.db).await
    }

    pub async fn find_by_account_id(
        &self,
        account_id: Uuid,
    ) -> Result<Vec<bundle_model::Model>, DbErr> {
        BundleEntity::find()
            .filter(bundle_model::Column::AccountId.eq(account_id))
            .order_by_asc(bundle_model::Column::CreatedAt)
            .all(&self.db)
            .await
    }

    /// アカウント内でキーが一致するバンドル
    pub async fn find_by_external_key(
        &self,
        account_id: Uuid,
        external_key: &str,
    ) -> Result<Option<bundle_model::Model>, DbErr> {
        BundleEntity::find()
            .filter(bundle_model::Column::AccountId.eq(account_id))
            .filter(bundle_model::Column::ExternalKey.eq(external_key))
            .one(&self.db)
            .await
    }
}
