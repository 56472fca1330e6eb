// billing-backend/src/repository/account_repository.rs

use crate::domain::account_model::{
    self, ActiveModel as AccountActiveModel, Entity as AccountEntity,
};
use chrono::Utc;
use sea_orm::entity::*;
use sea_orm::{DbConn, DbErr, QueryFilter, Set};
use uuid::Uuid;

#[derive(Debug, Clone)]
pub struct AccountRepository {
    db: DbConn,
}

impl AccountRepository {
    pub fn new(db: DbConn) -> Self {
        Self { db }
    }

    pub async fn create(&self, account: CreateAccount) -> Result<account_model::Model, DbErr> {
        let now = Utc::now();
        let new_account = AccountActiveModel {
            id: Set(Uuid::new_v4()),
            external_key: Set(account.external_key),
            name: Set(account.name),
            email: Set(account.email),
            currency: Set(account.currency.to_uppercase()),
            created_at: Set(now),
            updated_at: Set(now),
        };

        new_account.insert(&self.db).await
    }

    pub async fn find_by_id(&self, id: Uuid) -> Result<Option<account_model::Model>, DbErr> {
        AccountEntity::find_by_id(id).one(&self.db).await
    }

    pub async fn find_by_external_key(
        &self,
        external_key: &str,
    ) -> Result<Option<account_model::Model>, DbErr> {
        AccountEntity::find()
            .filter(account_model::Column::ExternalKey.eq(external_key))
            .one(&self.db)
            .await
    }
}

/// アカウント作成用構造体
#[derive(Debug, Clone)]
pub struct CreateAccount {
    pub external_key: String,
    pub name: String,
    pub email: String,
    pub currency: String,
}
