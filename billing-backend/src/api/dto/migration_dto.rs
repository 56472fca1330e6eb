// billing-backend/src/api/dto/migration_dto.rs

use crate::api::dto::subscription_dto::{PlanSpecifierDto, SubscriptionResponse};
use crate::domain::migration::{
    AccountMigration, BundleMigration, SubscriptionMigration, SubscriptionMigrationCase,
};
use crate::error::AppError;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;
use validator::Validate;

// --- リクエストDTO ---

#[derive(Debug, Clone, Serialize, Deserialize, Validate)]
pub struct MigrationCaseDto {
    #[validate(nested)]
    pub plan: PlanSpecifierDto,
    pub effective_date: DateTime<Utc>,
    pub cancelled_date: Option<DateTime<Utc>>,
    pub charged_through_date: Option<DateTime<Utc>>,
}

#[derive(Debug, Clone, Serialize, Deserialize, Validate)]
pub struct SubscriptionMigrationDto {
    #[validate(
        length(min = 1, message = "At least one case is required"),
        nested
    )]
    pub cases: Vec<MigrationCaseDto>,
}

#[derive(Debug, Clone, Serialize, Deserialize, Validate)]
pub struct BundleMigrationDto {
    #[validate(length(
        min = 1,
        max = 255,
        message = "Bundle key must be between 1 and 255 characters"
    ))]
    pub bundle_key: String,

    #[validate(
        length(min = 1, message = "At least one subscription is required"),
        nested
    )]
    pub subscriptions: Vec<SubscriptionMigrationDto>,
}

/// アカウント移行リクエスト
#[derive(Debug, Clone, Serialize, Deserialize, Validate)]
pub struct AccountMigrationRequest {
    /// 移行先アカウントのID
    pub account_key: Uuid,

    #[validate(
        length(min = 1, message = "At least one bundle is required"),
        nested
    )]
    pub bundles: Vec<BundleMigrationDto>,
}

impl TryFrom<AccountMigrationRequest> for AccountMigration {
    type Error = AppError;

    fn try_from(request: AccountMigrationRequest) -> Result<Self, Self::Error> {
        let bundles = request
            .bundles
            .into_iter()
            .map(|bundle| {
                let subscriptions = bundle
                    .subscriptions
                    .into_iter()
                    .map(|subscription| {
                        let cases = subscription
                            .cases
                            .into_iter()
                            .map(|case| {
                                SubscriptionMigrationCase::new(
                                    case.plan.into(),
                                    case.effective_date,
                                    case.cancelled_date,
                                    case.charged_through_date,
                                )
                            })
                            .collect();
                        SubscriptionMigration::from_cases(cases).ok_or_else(|| {
                            AppError::ValidationError(
                                "Subscription migration has no cases".to_string(),
                            )
                        })
                    })
                    .collect::<Result<Vec<_>, _>>()?;
                Ok(BundleMigration {
                    bundle_key: bundle.bundle_key,
                    subscriptions,
                })
            })
            .collect::<Result<Vec<_>, AppError>>()?;

        Ok(AccountMigration {
            account_key: request.account_key,
            bundles,
        })
    }
}

// --- レスポンスDTO ---

#[derive(Debug, Clone, Serialize)]
pub struct MigrationResponse {
    pub account_key: Uuid,
    pub subscriptions: Vec<SubscriptionResponse>,
}
