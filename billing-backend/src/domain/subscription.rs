// billing-backend/src/domain/subscription.rs
//
// サブスクリプションのイベントと、イベント列の再生による状態導出

use super::subscription_event_model;
use super::subscription_model;
use crate::catalog::ProductCategory;
use crate::error::SubscriptionApiError;
use chrono::{DateTime, Utc};
use sea_orm::Set;
use serde::{Deserialize, Serialize};
use std::str::FromStr;
use uuid::Uuid;

const EVENT_TYPE_PHASE: &str = "phase";
const EVENT_TYPE_API: &str = "api";

/// ユーザー操作（API）由来のイベント種別
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum ApiEventType {
    Create,
    MigrateEntitlement,
    Change,
    Cancel,
    Uncancel,
}

impl ApiEventType {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Create => "CREATE",
            Self::MigrateEntitlement => "MIGRATE_ENTITLEMENT",
            Self::Change => "CHANGE",
            Self::Cancel => "CANCEL",
            Self::Uncancel => "UNCANCEL",
        }
    }

    pub fn all() -> Vec<Self> {
        vec![
            Self::Create,
            Self::MigrateEntitlement,
            Self::Change,
            Self::Cancel,
            Self::Uncancel,
        ]
    }
}

impl FromStr for ApiEventType {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_uppercase().as_str() {
            "CREATE" => Ok(Self::Create),
            "MIGRATE_ENTITLEMENT" => Ok(Self::MigrateEntitlement),
            "CHANGE" => Ok(Self::Change),
            "CANCEL" => Ok(Self::Cancel),
            "UNCANCEL" => Ok(Self::Uncancel),
            _ => Err(format!("Invalid api event type: {}", s)),
        }
    }
}

impl std::fmt::Display for ApiEventType {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct PhaseEvent {
    pub phase_name: String,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct ApiEvent {
    pub api_type: ApiEventType,
    pub plan_name: Option<String>,
    pub phase_name: Option<String>,
    pub price_list_name: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(tag = "type", rename_all = "lowercase")]
pub enum EventKind {
    Phase(PhaseEvent),
    Api(ApiEvent),
}

impl EventKind {
    /// ログやトランジション表示用のラベル（"PHASE" / API種別名）
    pub fn label(&self) -> &'static str {
        match self {
            Self::Phase(_) => "PHASE",
            Self::Api(api) => api.api_type.as_str(),
        }
    }

    pub fn api_type(&self) -> Option<ApiEventType> {
        match self {
            Self::Api(api) => Some(api.api_type),
            Self::Phase(_) => None,
        }
    }

    pub fn is_phase(&self) -> bool {
        matches!(self, Self::Phase(_))
    }
}

/// サブスクリプションの1イベント
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct SubscriptionBaseEvent {
    pub id: Uuid,
    pub subscription_id: Uuid,
    pub effective_date: DateTime<Utc>,
    pub requested_date: DateTime<Utc>,
    /// 記録日時（保存時にサービスの時計の時刻で上書き）
    pub created_date: DateTime<Utc>,
    /// 同一有効日時内の順序（保存時に採番）
    pub total_ordering: i64,
    pub is_active: bool,
    /// バスへの配信済みか（移行した過去分は配信せず通知済みで保存する）
    pub notified: bool,
    pub kind: EventKind,
}

impl SubscriptionBaseEvent {
    fn new(
        subscription_id: Uuid,
        kind: EventKind,
        requested_date: DateTime<Utc>,
        effective_date: DateTime<Utc>,
    ) -> Self {
        Self {
            id: Uuid::new_v4(),
            subscription_id,
            effective_date,
            requested_date,
            created_date: requested_date,
            total_ordering: 0,
            is_active: true,
            notified: false,
            kind,
        }
    }

    pub fn phase(
        subscription_id: Uuid,
        phase_name: impl Into<String>,
        requested_date: DateTime<Utc>,
        effective_date: DateTime<Utc>,
    ) -> Self {
        Self::new(
            subscription_id,
            EventKind::Phase(PhaseEvent {
                phase_name: phase_name.into(),
            }),
            requested_date,
            effective_date,
        )
    }

    /// プラン情報を伴うAPIイベント（CREATE / MIGRATE_ENTITLEMENT / CHANGE）
    pub fn api_with_plan(
        subscription_id: Uuid,
        api_type: ApiEventType,
        plan_name: impl Into<String>,
        phase_name: impl Into<String>,
        price_list_name: impl Into<String>,
        requested_date: DateTime<Utc>,
        effective_date: DateTime<Utc>,
    ) -> Self {
        Self::new(
            subscription_id,
            EventKind::Api(ApiEvent {
                api_type,
                plan_name: Some(plan_name.into()),
                phase_name: Some(phase_name.into()),
                price_list_name: Some(price_list_name.into()),
            }),
            requested_date,
            effective_date,
        )
    }

    /// プラン情報を持たないAPIイベント（CANCEL / UNCANCEL）
    pub fn api(
        subscription_id: Uuid,
        api_type: ApiEventType,
        requested_date: DateTime<Utc>,
        effective_date: DateTime<Utc>,
    ) -> Self {
        Self::new(
            subscription_id,
            EventKind::Api(ApiEvent {
                api_type,
                plan_name: None,
                phase_name: None,
                price_list_name: None,
            }),
            requested_date,
            effective_date,
        )
    }

    pub fn is_api_of(&self, api_type: ApiEventType) -> bool {
        self.kind.api_type() == Some(api_type)
    }

    /// 保存用のActiveModelに変換
    pub fn to_active_model(&self) -> subscription_event_model::ActiveModel {
        let (event_type, api_event_type, plan_name, phase_name, price_list_name) = match &self.kind
        {
            EventKind::Phase(phase) => (
                EVENT_TYPE_PHASE,
                None,
                None,
                Some(phase.phase_name.clone()),
                None,
            ),
            EventKind::Api(api) => (
                EVENT_TYPE_API,
                Some(api.api_type.as_str().to_string()),
                api.plan_name.clone(),
                api.phase_name.clone(),
                api.price_list_name.clone(),
            ),
        };

        subscription_event_model::ActiveModel {
            id: Set(self.id),
            subscription_id: Set(self.subscription_id),
            event_type: Set(event_type.to_string()),
            api_event_type: Set(api_event_type),
            plan_name: Set(plan_name),
            phase_name: Set(phase_name),
            price_list_name: Set(price_list_name),
            requested_date: Set(self.requested_date),
            effective_date: Set(self.effective_date),
            total_ordering: Set(self.total_ordering),
            is_active: Set(self.is_active),
            notified: Set(self.notified),
            created_at: Set(self.created_date),
        }
    }
}

impl TryFrom<subscription_event_model::Model> for SubscriptionBaseEvent {
    type Error = SubscriptionApiError;

    fn try_from(model: subscription_event_model::Model) -> Result<Self, Self::Error> {
        let corrupted = |reason: &str| {
            SubscriptionApiError::CorruptedEvent(format!("event {}: {}", model.id, reason))
        };

        let kind = match model.event_type.as_str() {
            EVENT_TYPE_PHASE => EventKind::Phase(PhaseEvent {
                phase_name: model
                    .phase_name
                    .clone()
                    .ok_or_else(|| corrupted("phase event without phase name"))?,
            }),
            EVENT_TYPE_API => {
                let api_type = model
                    .api_event_type
                    .as_deref()
                    .ok_or_else(|| corrupted("api event without api type"))
                    .and_then(|value| ApiEventType::from_str(value).map_err(|e| corrupted(&e)))?;
                EventKind::Api(ApiEvent {
                    api_type,
                    plan_name: model.plan_name.clone(),
                    phase_name: model.phase_name.clone(),
                    price_list_name: model.price_list_name.clone(),
                })
            }
            other => return Err(corrupted(&format!("unknown event type '{}'", other))),
        };

        Ok(Self {
            id: model.id,
            subscription_id: model.subscription_id,
            effective_date: model.effective_date,
            requested_date: model.requested_date,
            created_date: model.created_at,
            total_ordering: model.total_ordering,
            is_active: model.is_active,
            notified: model.notified,
            kind,
        })
    }
}

/// サブスクリプションの状態
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum SubscriptionState {
    /// 最初のイベントがまだ有効になっていない
    Pending,
    Active,
    Cancelled,
}

impl SubscriptionState {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Pending => "PENDING",
            Self::Active => "ACTIVE",
            Self::Cancelled => "CANCELLED",
        }
    }
}

impl std::fmt::Display for SubscriptionState {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

/// ある時点でのサブスクリプションの状態
#[derive(Debug, Clone, PartialEq, Eq)]
struct Snapshot {
    plan_name: Option<String>,
    phase_name: Option<String>,
    price_list_name: Option<String>,
    state: SubscriptionState,
    end_date: Option<DateTime<Utc>>,
    phase_start_date: Option<DateTime<Utc>>,
}

impl Snapshot {
    fn initial() -> Self {
        Self {
            plan_name: None,
            phase_name: None,
            price_list_name: None,
            state: SubscriptionState::Pending,
            end_date: None,
            phase_start_date: None,
        }
    }

    fn apply(&mut self, event: &SubscriptionBaseEvent) {
        match &event.kind {
            EventKind::Phase(phase) => {
                self.phase_name = Some(phase.phase_name.clone());
                self.phase_start_date = Some(event.effective_date);
            }
            EventKind::Api(api) => match api.api_type {
                ApiEventType::Create | ApiEventType::MigrateEntitlement => {
                    self.state = SubscriptionState::Active;
                    self.set_plan(api, event.effective_date);
                }
                ApiEventType::Change => self.set_plan(api, event.effective_date),
                ApiEventType::Cancel => {
                    self.state = SubscriptionState::Cancelled;
                    self.end_date = Some(event.effective_date);
                }
                // 取り消されたキャンセルは非アクティブ化済みなので状態は変わらない
                ApiEventType::Uncancel => {}
            },
        }
    }

    fn set_plan(&mut self, api: &ApiEvent, effective_date: DateTime<Utc>) {
        self.plan_name = api.plan_name.clone();
        self.phase_name = api.phase_name.clone();
        self.price_list_name = api.price_list_name.clone();
        self.phase_start_date = Some(effective_date);
    }
}

/// イベント1件による状態遷移
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct SubscriptionTransition {
    pub event_id: Uuid,
    pub effective_date: DateTime<Utc>,
    pub requested_date: DateTime<Utc>,
    pub transition_type: String,
    pub previous_plan: Option<String>,
    pub next_plan: Option<String>,
    pub previous_phase: Option<String>,
    pub next_phase: Option<String>,
    pub previous_price_list: Option<String>,
    pub next_price_list: Option<String>,
    pub previous_state: SubscriptionState,
    pub next_state: SubscriptionState,
}

/// サブスクリプション本体と、有効日時順に並んだアクティブなイベント
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DefaultSubscriptionBase {
    pub id: Uuid,
    pub bundle_id: Uuid,
    pub category: ProductCategory,
    pub start_date: DateTime<Utc>,
    pub bundle_start_date: DateTime<Utc>,
    pub charged_through_date: Option<DateTime<Utc>>,
    pub created_date: DateTime<Utc>,
    events: Vec<SubscriptionBaseEvent>,
    as_of: DateTime<Utc>,
    current: Snapshot,
}

impl DefaultSubscriptionBase {
    /// イベントを `as_of` 時点まで再生して現在の状態を組み立てる
    pub fn new(
        model: subscription_model::Model,
        mut events: Vec<SubscriptionBaseEvent>,
        as_of: DateTime<Utc>,
    ) -> Result<Self, SubscriptionApiError> {
        let category = model.category().map_err(|e| {
            SubscriptionApiError::CorruptedEvent(format!("subscription {}: {}", model.id, e))
        })?;

        events.retain(|event| event.is_active);
        events.sort_by_key(|event| (event.effective_date, event.total_ordering));

        let mut current = Snapshot::initial();
        for event in events.iter().filter(|event| event.effective_date <= as_of) {
            current.apply(event);
        }

        Ok(Self {
            id: model.id,
            bundle_id: model.bundle_id,
            category,
            start_date: model.start_date,
            bundle_start_date: model.bundle_start_date,
            charged_through_date: model.charged_through_date,
            created_date: model.created_at,
            events,
            as_of,
            current,
        })
    }

    pub fn events(&self) -> &[SubscriptionBaseEvent] {
        &self.events
    }

    /// 状態を評価した時刻
    pub fn as_of(&self) -> DateTime<Utc> {
        self.as_of
    }

    pub fn state(&self) -> SubscriptionState {
        self.current.state
    }

    pub fn plan_name(&self) -> Option<&str> {
        self.current.plan_name.as_deref()
    }

    pub fn phase_name(&self) -> Option<&str> {
        self.current.phase_name.as_deref()
    }

    pub fn price_list_name(&self) -> Option<&str> {
        self.current.price_list_name.as_deref()
    }

    pub fn end_date(&self) -> Option<DateTime<Utc>> {
        self.current.end_date
    }

    pub fn current_phase_start(&self) -> Option<DateTime<Utc>> {
        self.current.phase_start_date
    }

    /// 評価時刻より後に有効になるイベント
    pub fn pending_events(&self) -> impl Iterator<Item = &SubscriptionBaseEvent> {
        self.events
            .iter()
            .filter(move |event| event.effective_date > self.as_of)
    }

    pub fn pending_cancel_date(&self) -> Option<DateTime<Utc>> {
        self.pending_events()
            .find(|event| event.is_api_of(ApiEventType::Cancel))
            .map(|event| event.effective_date)
    }

    pub fn pending_change(&self) -> Option<&SubscriptionBaseEvent> {
        self.pending_events()
            .find(|event| event.is_api_of(ApiEventType::Change))
    }

    /// 将来分を含む全イベントの状態遷移
    pub fn transitions(&self) -> Vec<SubscriptionTransition> {
        let mut snapshot = Snapshot::initial();
        self.events
            .iter()
            .map(|event| {
                let previous = snapshot.clone();
                snapshot.apply(event);
                SubscriptionTransition {
                    event_id: event.id,
                    effective_date: event.effective_date,
                    requested_date: event.requested_date,
                    transition_type: event.kind.label().to_string(),
                    previous_plan: previous.plan_name,
                    next_plan: snapshot.plan_name.clone(),
                    previous_phase: previous.phase_name,
                    next_phase: snapshot.phase_name.clone(),
                    previous_price_list: previous.price_list_name,
                    next_price_list: snapshot.price_list_name.clone(),
                    previous_state: previous.state,
                    next_state: snapshot.state,
                }
            })
            .collect()
    }
}
