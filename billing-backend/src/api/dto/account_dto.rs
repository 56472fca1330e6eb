// billing-backend/src/api/dto/account_dto.rs

use crate::repository::account_repository::CreateAccount;
use crate::service::account_service::{Account, Bundle};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;
use validator::Validate;

// --- リクエストDTO ---

/// アカウント作成リクエスト
#[derive(Debug, Clone, Serialize, Deserialize, Validate)]
pub struct CreateAccountRequest {
    #[validate(length(
        min = 1,
        max = 255,
        message = "External key must be between 1 and 255 characters"
    ))]
    pub external_key: String,

    #[validate(length(
        min = 1,
        max = 100,
        message = "Name must be between 1 and 100 characters"
    ))]
    pub name: String,

    #[validate(email(message = "Invalid email format"))]
    pub email: String,

    #[validate(custom(function = validate_currency))]
    pub currency: String,
}

impl From<CreateAccountRequest> for CreateAccount {
    fn from(request: CreateAccountRequest) -> Self {
        Self {
            external_key: request.external_key,
            name: request.name,
            email: request.email,
            currency: request.currency,
        }
    }
}

/// バンドル作成リクエスト
#[derive(Debug, Clone, Serialize, Deserialize, Validate)]
pub struct CreateBundleRequest {
    #[validate(length(
        min = 1,
        max = 255,
        message = "External key must be between 1 and 255 characters"
    ))]
    pub external_key: String,
}

// --- レスポンスDTO ---

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AccountResponse {
    pub id: Uuid,
    pub external_key: String,
    pub name: String,
    pub email: String,
    pub currency: String,
    pub created_at: DateTime<Utc>,
}

impl From<Account> for AccountResponse {
    fn from(account: Account) -> Self {
        Self {
            id: account.id,
            external_key: account.external_key,
            name: account.name,
            email: account.email,
            currency: account.currency,
            created_at: account.created_at,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct BundleResponse {
    pub id: Uuid,
    pub account_id: Uuid,
    pub external_key: String,
    pub created_at: DateTime<Utc>,
}

impl From<Bundle> for BundleResponse {
    fn from(bundle: Bundle) -> Self {
        Self {
            id: bundle.id,
            account_id: bundle.account_id,
            external_key: bundle.external_key,
            created_at: bundle.created_at,
        }
    }
}

/// 通貨コードは大文字3文字（USD, EUR ...）
fn validate_currency(currency: &str) -> Result<(), validator::ValidationError> {
    if currency.len() == 3 && currency.chars().all(|c| c.is_ascii_uppercase()) {
        Ok(())
    } else {
        let mut error = validator::ValidationError::new("invalid_currency");
        error.message = Some("Currency must be a 3-letter uppercase code".into());
        Err(error)
    }
}
