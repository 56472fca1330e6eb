// billing-backend/src/domain/subscription_model.rs
use crate::catalog::ProductCategory;
use chrono::{DateTime, Utc};
use sea_orm::entity::prelude::*;
use serde::{Deserialize, Serialize};
use std::str::FromStr;

/// サブスクリプションエンティティ
///
/// プラン・フェーズ・状態はイベントから導出するため、ここには持たない。
#[derive(Clone, Debug, PartialEq, Eq, DeriveEntityModel, Serialize, Deserialize)]
#[sea_orm(table_name = "subscriptions")]
pub struct Model {
    #[sea_orm(primary_key, auto_increment = false)]
    pub id: Uuid,
    pub bundle_id: Uuid,
    pub category: String,
    pub start_date: DateTime<Utc>,
    pub bundle_start_date: DateTime<Utc>,
    #[sea_orm(nullable)]
    pub charged_through_date: Option<DateTime<Utc>>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

#[derive(Copy, Clone, Debug, EnumIter, DeriveRelation)]
pub enum Relation {
    #[sea_orm(
        belongs_to = "super::bundle_model::Entity",
        from = "Column::BundleId",
        to = "super::bundle_model::Column::Id"
    )]
    Bundle,
    #[sea_orm(has_many = "super::subscription_event_model::Entity")]
    Events,
}

impl Related<super::bundle_model::Entity> for Entity {
    fn to() -> RelationDef {
        Relation::Bundle.def()
    }
}

impl Related<super::subscription_event_model::Entity> for Entity {
    fn to() -> RelationDef {
        Relation::Events.def()
    }
}

impl ActiveModelBehavior for ActiveModel {}

impl Model {
    pub fn category(&self) -> Result<ProductCategory, String> {
        ProductCategory::from_str(&self.category)
    }
}
