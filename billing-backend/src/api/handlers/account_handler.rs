// billing-backend/src/api/handlers/account_handler.rs

use crate::api::dto::account_dto::*;
use crate::api::dto::subscription_dto::SubscriptionResponse;
use crate::api::AppState;
use crate::error::AppResult;
use crate::extractors::ValidatedUuid;
use crate::types::ApiResponse;
use axum::{
    extract::{Json, State},
    routing::{get, post},
    Router,
};
use tracing::info;
use validator::Validate;

/// アカウント作成
pub async fn create_account_handler(
    State(app_state): State<AppState>,
    Json(payload): Json<CreateAccountRequest>,
) -> AppResult<ApiResponse<AccountResponse>> {
    payload.validate()?;

    let account = app_state
        .account_service
        .create_account(payload.into())
        .await?;

    info!(account_id = %account.id, "Account created via API");
    Ok(ApiResponse::created(
        AccountResponse::from(account),
        "Account created",
    ))
}

pub async fn get_account_handler(
    State(app_state): State<AppState>,
    ValidatedUuid(account_id): ValidatedUuid,
) -> AppResult<ApiResponse<AccountResponse>> {
    let account = app_state.account_service.get_account(account_id).await?;
    Ok(ApiResponse::success(AccountResponse::from(account)))
}

/// アカウント配下にバンドルを作成
pub async fn create_bundle_handler(
    State(app_state): State<AppState>,
    ValidatedUuid(account_id): ValidatedUuid,
    Json(payload): Json<CreateBundleRequest>,
) -> AppResult<ApiResponse<BundleResponse>> {
    payload.validate()?;

    let bundle = app_state
        .account_service
        .create_bundle(account_id, &payload.external_key)
        .await?;

    Ok(ApiResponse::created(
        BundleResponse::from(bundle),
        "Bundle created",
    ))
}

pub async fn list_bundles_handler(
    State(app_state): State<AppState>,
    ValidatedUuid(account_id): ValidatedUuid,
) -> AppResult<ApiResponse<Vec<BundleResponse>>> {
    let bundles = app_state
        .account_service
        .get_bundles_for_account(account_id)
        .await?;
    Ok(ApiResponse::success(
        bundles.into_iter().map(BundleResponse::from).collect(),
    ))
}

/// バンドル内のサブスクリプション一覧
pub async fn list_bundle_subscriptions_handler(
    State(app_state): State<AppState>,
    ValidatedUuid(bundle_id): ValidatedUuid,
) -> AppResult<ApiResponse<Vec<SubscriptionResponse>>> {
    let subscriptions = app_state
        .subscription_service
        .get_subscriptions_for_bundle(bundle_id)
        .await?;
    Ok(ApiResponse::success(
        subscriptions.iter().map(SubscriptionResponse::from).collect(),
    ))
}

pub fn account_router(app_state: AppState) -> Router {
    Router::new()
        .route("/accounts", post(create_account_handler))
        .route("/accounts/{id}", get(get_account_handler))
        .route(
            "/accounts/{id}/bundles",
            post(create_bundle_handler).get(list_bundles_handler),
        )
        .route(
            "/bundles/{id}/subscriptions",
            get(list_bundle_subscriptions_handler),
        )
        .with_state(app_state)
}
