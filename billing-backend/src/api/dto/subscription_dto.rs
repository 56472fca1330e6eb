// billing-backend/src/api/dto/subscription_dto.rs

use crate::catalog::{
    BillingPeriod, PhaseType, PlanPhaseSpecifier, ProductCategory, DEFAULT_PRICE_LIST_NAME,
};
use crate::domain::subscription::{
    DefaultSubscriptionBase, SubscriptionBaseEvent, SubscriptionState, SubscriptionTransition,
};
use crate::service::subscription_service::ChangePolicy;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;
use validator::Validate;

// --- リクエストDTO ---

/// プロダクト・請求周期・プライスリストによるプラン指定
#[derive(Debug, Clone, Serialize, Deserialize, Validate)]
pub struct PlanSpecifierDto {
    #[validate(length(
        min = 1,
        max = 100,
        message = "Product name must be between 1 and 100 characters"
    ))]
    pub product_name: String,

    pub category: ProductCategory,

    pub billing_period: BillingPeriod,

    #[validate(length(
        min = 1,
        max = 100,
        message = "Price list name must be between 1 and 100 characters"
    ))]
    pub price_list_name: Option<String>,

    pub phase_type: Option<PhaseType>,
}

impl From<PlanSpecifierDto> for PlanPhaseSpecifier {
    fn from(dto: PlanSpecifierDto) -> Self {
        PlanPhaseSpecifier::new(
            dto.product_name,
            dto.category,
            dto.billing_period,
            dto.price_list_name
                .unwrap_or_else(|| DEFAULT_PRICE_LIST_NAME.to_string()),
            dto.phase_type,
        )
    }
}

/// サブスクリプション作成リクエスト
#[derive(Debug, Clone, Serialize, Deserialize, Validate)]
pub struct CreateSubscriptionRequest {
    pub bundle_id: Uuid,

    #[validate(nested)]
    pub plan: PlanSpecifierDto,

    /// 省略時は現在時刻
    pub requested_date: Option<DateTime<Utc>>,

    /// 旧システムでの作成日（カタログのバージョン解決に使う）
    pub original_creation_date: Option<DateTime<Utc>>,
}

/// プラン変更リクエスト
#[derive(Debug, Clone, Serialize, Deserialize, Validate)]
pub struct ChangePlanRequest {
    #[validate(nested)]
    pub plan: PlanSpecifierDto,

    pub requested_date: Option<DateTime<Utc>>,

    #[serde(default)]
    pub policy: ChangePolicy,
}

/// キャンセルのクエリパラメータ
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct CancelQuery {
    pub requested_date: Option<DateTime<Utc>>,
    #[serde(default)]
    pub policy: ChangePolicy,
}

/// 請求済み期限日（CTD）更新リクエスト
#[derive(Debug, Clone, Serialize, Deserialize, Validate)]
pub struct SetChargedThroughDateRequest {
    pub charged_through_date: DateTime<Utc>,
}

// --- レスポンスDTO ---

#[derive(Debug, Clone, Serialize)]
pub struct SubscriptionResponse {
    pub id: Uuid,
    pub bundle_id: Uuid,
    pub category: ProductCategory,
    pub state: SubscriptionState,
    pub plan_name: Option<String>,
    pub phase_name: Option<String>,
    pub price_list_name: Option<String>,
    pub start_date: DateTime<Utc>,
    pub bundle_start_date: DateTime<Utc>,
    pub charged_through_date: Option<DateTime<Utc>>,
    pub current_phase_start: Option<DateTime<Utc>>,
    pub end_date: Option<DateTime<Utc>>,
    pub pending_cancel_date: Option<DateTime<Utc>>,
    pub transitions: Vec<SubscriptionTransition>,
}

impl From<&DefaultSubscriptionBase> for SubscriptionResponse {
    fn from(subscription: &DefaultSubscriptionBase) -> Self {
        Self {
            id: subscription.id,
            bundle_id: subscription.bundle_id,
            category: subscription.category,
            state: subscription.state(),
            plan_name: subscription.plan_name().map(str::to_string),
            phase_name: subscription.phase_name().map(str::to_string),
            price_list_name: subscription.price_list_name().map(str::to_string),
            start_date: subscription.start_date,
            bundle_start_date: subscription.bundle_start_date,
            charged_through_date: subscription.charged_through_date,
            current_phase_start: subscription.current_phase_start(),
            end_date: subscription.end_date(),
            pending_cancel_date: subscription.pending_cancel_date(),
            transitions: subscription.transitions(),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SubscriptionEventResponse {
    pub id: Uuid,
    pub event_type: String,
    pub plan_name: Option<String>,
    pub phase_name: Option<String>,
    pub effective_date: DateTime<Utc>,
    pub requested_date: DateTime<Utc>,
}

impl From<&SubscriptionBaseEvent> for SubscriptionEventResponse {
    fn from(event: &SubscriptionBaseEvent) -> Self {
        use crate::domain::subscription::EventKind;

        let (plan_name, phase_name) = match &event.kind {
            EventKind::Phase(phase) => (None, Some(phase.phase_name.clone())),
            EventKind::Api(api) => (api.plan_name.clone(), api.phase_name.clone()),
        };
        Self {
            id: event.id,
            event_type: event.kind.label().to_string(),
            plan_name,
            phase_name,
            effective_date: event.effective_date,
            requested_date: event.requested_date,
        }
    }
}
