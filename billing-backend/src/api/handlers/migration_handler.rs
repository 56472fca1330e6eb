// billing-backend/src/api/handlers/migration_handler.rs

use crate::api::dto::migration_dto::*;
use crate::api::dto::subscription_dto::SubscriptionResponse;
use crate::api::AppState;
use crate::domain::migration::AccountMigration;
use crate::error::AppResult;
use crate::types::ApiResponse;
use axum::{
    extract::{Json, State},
    routing::post,
    Router,
};
use tracing::info;
use validator::Validate;

/// 旧システムからのアカウント移行
pub async fn migrate_account_handler(
    State(app_state): State<AppState>,
    Json(payload): Json<AccountMigrationRequest>,
) -> AppResult<ApiResponse<MigrationResponse>> {
    payload.validate()?;
    let migration = AccountMigration::try_from(payload)?;

    let subscriptions = app_state.migration_service.migrate(&migration).await?;

    info!(
        account_id = %migration.account_key,
        subscriptions = subscriptions.len(),
        "Account migration completed via API"
    );
    Ok(ApiResponse::created(
        MigrationResponse {
            account_key: migration.account_key,
            subscriptions: subscriptions.iter().map(SubscriptionResponse::from).collect(),
        },
        "Account migrated",
    ))
}

pub fn migration_router(app_state: AppState) -> Router {
    Router::new()
        .route("/migrations", post(migrate_account_handler))
        .with_state(app_state)
}
