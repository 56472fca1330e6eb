// billing-backend/src/api/handlers/subscription_handler.rs

use crate::api::dto::subscription_dto::*;
use crate::api::AppState;
use crate::error::AppResult;
use crate::extractors::ValidatedUuid;
use crate::types::ApiResponse;
use axum::{
    extract::{Json, Query, State},
    routing::{get, post, put},
    Router,
};
use tracing::info;
use validator::Validate;

/// サブスクリプション作成
pub async fn create_subscription_handler(
    State(app_state): State<AppState>,
    Json(payload): Json<CreateSubscriptionRequest>,
) -> AppResult<ApiResponse<SubscriptionResponse>> {
    payload.validate()?;

    let subscription = app_state
        .subscription_service
        .create_subscription(
            payload.bundle_id,
            &payload.plan.into(),
            payload.original_creation_date,
            payload.requested_date,
        )
        .await?;

    info!(
        subscription_id = %subscription.id,
        bundle_id = %subscription.bundle_id,
        "Subscription created via API"
    );
    Ok(ApiResponse::created(
        SubscriptionResponse::from(&subscription),
        "Subscription created",
    ))
}

pub async fn get_subscription_handler(
    State(app_state): State<AppState>,
    ValidatedUuid(subscription_id): ValidatedUuid,
) -> AppResult<ApiResponse<SubscriptionResponse>> {
    let subscription = app_state
        .subscription_service
        .get_subscription(subscription_id)
        .await?;
    Ok(ApiResponse::success(SubscriptionResponse::from(
        &subscription,
    )))
}

/// 未来に有効になるイベント
pub async fn get_pending_events_handler(
    State(app_state): State<AppState>,
    ValidatedUuid(subscription_id): ValidatedUuid,
) -> AppResult<ApiResponse<Vec<SubscriptionEventResponse>>> {
    let events = app_state
        .subscription_service
        .get_pending_events(subscription_id)
        .await?;
    Ok(ApiResponse::success(
        events.iter().map(SubscriptionEventResponse::from).collect(),
    ))
}

/// プラン変更
pub async fn change_plan_handler(
    State(app_state): State<AppState>,
    ValidatedUuid(subscription_id): ValidatedUuid,
    Json(payload): Json<ChangePlanRequest>,
) -> AppResult<ApiResponse<SubscriptionResponse>> {
    payload.validate()?;

    let subscription = app_state
        .subscription_service
        .change_plan(
            subscription_id,
            &payload.plan.into(),
            payload.requested_date,
            payload.policy,
        )
        .await?;
    Ok(ApiResponse::success(SubscriptionResponse::from(&subscription)).with_message("Plan changed"))
}

/// キャンセル
pub async fn cancel_subscription_handler(
    State(app_state): State<AppState>,
    ValidatedUuid(subscription_id): ValidatedUuid,
    Query(query): Query<CancelQuery>,
) -> AppResult<ApiResponse<SubscriptionResponse>> {
    let subscription = app_state
        .subscription_service
        .cancel(subscription_id, query.requested_date, query.policy)
        .await?;
    Ok(ApiResponse::success(SubscriptionResponse::from(&subscription))
        .with_message("Subscription cancelled"))
}

pub async fn uncancel_subscription_handler(
    State(app_state): State<AppState>,
    ValidatedUuid(subscription_id): ValidatedUuid,
) -> AppResult<ApiResponse<SubscriptionResponse>> {
    let subscription = app_state
        .subscription_service
        .uncancel(subscription_id)
        .await?;
    Ok(ApiResponse::success(SubscriptionResponse::from(&subscription))
        .with_message("Cancellation withdrawn"))
}

/// 請求済み期限日（CTD）の更新
pub async fn set_charged_through_date_handler(
    State(app_state): State<AppState>,
    ValidatedUuid(subscription_id): ValidatedUuid,
    Json(payload): Json<SetChargedThroughDateRequest>,
) -> AppResult<ApiResponse<SubscriptionResponse>> {
    let subscription = app_state
        .subscription_service
        .set_charged_through_date(subscription_id, payload.charged_through_date)
        .await?;
    Ok(ApiResponse::success(SubscriptionResponse::from(
        &subscription,
    )))
}

pub fn subscription_router(app_state: AppState) -> Router {
    Router::new()
        .route("/subscriptions", post(create_subscription_handler))
        .route(
            "/subscriptions/{id}",
            get(get_subscription_handler).delete(cancel_subscription_handler),
        )
        .route(
            "/subscriptions/{id}/events/pending",
            get(get_pending_events_handler),
        )
        .route("/subscriptions/{id}/plan", put(change_plan_handler))
        .route(
            "/subscriptions/{id}/uncancel",
            put(uncancel_subscription_handler),
        )
        .route(
            "/subscriptions/{id}/charged_through_date",
            put(set_charged_through_date_handler),
        )
        .with_state(app_state)
}
