// billing-backend/src/service/account_service.rs

use crate::domain::account_model::Model as AccountModel;
use crate::domain::bundle_model::Model as BundleModel;
use crate::error::{SubscriptionApiError, SubscriptionApiResult};
use crate::repository::account_repository::{AccountRepository, CreateAccount};
use crate::repository::bundle_repository::BundleRepository;
use sea_orm::DbConn;
use tracing::info;
use uuid::Uuid;

pub type Account = AccountModel;
pub type Bundle = BundleModel;

pub struct AccountService {
    account_repo: AccountRepository,
    bundle_repo: BundleRepository,
}

impl AccountService {
    pub fn new(db: DbConn) -> Self {
        Self {
            account_repo: AccountRepository::new(db.clone()),
            bundle_repo: BundleRepository::new(db),
        }
    }

    /// アカウントを作成
    pub async fn create_account(&self, account: CreateAccount) -> SubscriptionApiResult<Account> {
        if self
            .account_repo
            .find_by_external_key(&account.external_key)
            .await?
            .is_some()
        {
            return Err(SubscriptionApiError::AccountKeyExists(account.external_key));
        }

        let created = self.account_repo.create(account).await?;
        info!(
            account_id = %created.id,
            external_key = %created.external_key,
            currency = %created.currency,
            "Account created"
        );
        Ok(created)
    }

    pub async fn get_account(&self, id: Uuid) -> SubscriptionApiResult<Account> {
        self.account_repo
            .find_by_id(id)
            .await?
            .ok_or(SubscriptionApiError::AccountNotFound(id))
    }

    /// アカウント配下にバンドルを作成（キーはアカウント内で一意）
    pub async fn create_bundle(
        &self,
        account_id: Uuid,
        external_key: &str,
    ) -> SubscriptionApiResult<Bundle> {
        self.get_account(account_id).await?;

        if self
            .bundle_repo
            .find_by_external_key(account_id, external_key)
            .await?
            .is_some()
        {
            return Err(SubscriptionApiError::BundleKeyExists(
                external_key.to_string(),
            ));
        }

        let bundle = self.bundle_repo.create(account_id, external_key).await?;
        info!(
            account_id = %account_id,
            bundle_id = %bundle.id,
            external_key = %external_key,
            "Bundle created"
        );
        Ok(bundle)
    }

    pub async fn get_bundle(&self, id: Uuid) -> SubscriptionApiResult<Bundle> {
        self.bundle_repo
            .find_by_id(id)
            .await?
            .ok_or(SubscriptionApiError::BundleNotFound(id))
    }

    pub async fn get_bundles_for_account(
        &self,
        account_id: Uuid,
    ) -> SubscriptionApiResult<Vec<Bundle>> {
        self.get_account(account_id).await?;
        Ok(self.bundle_repo.find_by_account_id(account_id).await?)
    }
}
