// billing-backend/src/domain/subscription_event_model.rs
use chrono::{DateTime, Utc};
use sea_orm::entity::prelude::*;
use serde::{Deserialize, Serialize};

/// サブスクリプションイベントエンティティ
///
/// `event_type` は "phase" か "api"。api の場合のみ `api_event_type` を持つ。
#[derive(Clone, Debug, PartialEq, Eq, DeriveEntityModel, Serialize, Deserialize)]
#[sea_orm(table_name = "subscription_events")]
pub struct Model {
    #[sea_orm(primary_key, auto_increment = false)]
    pub id: Uuid,
    pub subscription_id: Uuid,
    pub event_type: String,
    #[sea_orm(nullable)]
    pub api_event_type: Option<String>,
    #[sea_orm(nullable)]
    pub plan_name: Option<String>,
    #[sea_orm(nullable)]
    pub phase_name: Option<String>,
    #[sea_orm(nullable)]
    pub price_list_name: Option<String>,
    pub requested_date: DateTime<Utc>,
    pub effective_date: DateTime<Utc>,
    pub total_ordering: i64,
    pub is_active: bool,
    pub notified: bool,
    pub created_at: DateTime<Utc>,
}

#[derive(Copy, Clone, Debug, EnumIter, DeriveRelation)]
pub enum Relation {
    #[sea_orm(
        belongs_to = "super::subscription_model::Entity",
        from = "Column::SubscriptionId",
        to = "super::subscription_model::Column::Id"
    )]
    Subscription,
}

impl Related<super::subscription_model::Entity> for Entity {
    fn to() -> RelationDef {
        Relation::Subscription.def()
    }
}

impl ActiveModelBehavior for ActiveModel {}
