// billing-backend/src/service/event_bus.rs

use crate::domain::subscription::{ApiEventType, EventKind};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use tokio::sync::broadcast;
use tracing::debug;
use uuid::Uuid;

const DEFAULT_CHANNEL_CAPACITY: usize = 1024;

/// バス上に流れるサブスクリプションイベントの種別
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum NextEvent {
    Create,
    Change,
    Cancel,
    Uncancel,
    Phase,
    Migrate,
}

impl NextEvent {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Create => "CREATE",
            Self::Change => "CHANGE",
            Self::Cancel => "CANCEL",
            Self::Uncancel => "UNCANCEL",
            Self::Phase => "PHASE",
            Self::Migrate => "MIGRATE",
        }
    }
}

impl std::fmt::Display for NextEvent {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

impl From<&EventKind> for NextEvent {
    fn from(kind: &EventKind) -> Self {
        match kind {
            EventKind::Phase(_) => Self::Phase,
            EventKind::Api(api) => match api.api_type {
                ApiEventType::Create => Self::Create,
                ApiEventType::MigrateEntitlement => Self::Migrate,
                ApiEventType::Change => Self::Change,
                ApiEventType::Cancel => Self::Cancel,
                ApiEventType::Uncancel => Self::Uncancel,
            },
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct BusEvent {
    pub kind: NextEvent,
    pub subscription_id: Uuid,
    pub bundle_id: Uuid,
    pub effective_date: DateTime<Utc>,
}

/// サブスクリプションイベントのブロードキャストバス
#[derive(Debug, Clone)]
pub struct SubscriptionEventBus {
    sender: broadcast::Sender<BusEvent>,
}

impl SubscriptionEventBus {
    pub fn new() -> Self {
        Self::with_capacity(DEFAULT_CHANNEL_CAPACITY)
    }

    pub fn with_capacity(capacity: usize) -> Self {
        let (sender, _) = broadcast::channel(capacity);
        Self { sender }
    }

    pub fn subscribe(&self) -> broadcast::Receiver<BusEvent> {
        self.sender.subscribe()
    }

    /// イベントを配信し、受信した購読者数を返す（購読者がいなくてもエラーにしない）
    pub fn post(&self, event: BusEvent) -> usize {
        debug!(
            kind = %event.kind,
            subscription_id = %event.subscription_id,
            effective_date = %event.effective_date,
            "Posting subscription event"
        );
        self.sender.send(event).unwrap_or(0)
    }

    pub fn subscriber_count(&self) -> usize {
        self.sender.receiver_count()
    }
}

impl Default for SubscriptionEventBus {
    fn default() -> Self {
        Self::new()
    }
}
