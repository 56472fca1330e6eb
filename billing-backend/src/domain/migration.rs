// billing-backend/src/domain/migration.rs
//
// 旧システムからアカウントのサブスクリプションを取り込むための入力

use crate::catalog::{PlanPhaseSpecifier, ProductCategory};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

/// 移行するサブスクリプションの1区間
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SubscriptionMigrationCase {
    pub plan_phase_specifier: PlanPhaseSpecifier,
    pub effective_date: DateTime<Utc>,
    #[serde(default)]
    pub cancelled_date: Option<DateTime<Utc>>,
    #[serde(default)]
    pub charged_through_date: Option<DateTime<Utc>>,
}

impl SubscriptionMigrationCase {
    pub fn new(
        plan_phase_specifier: PlanPhaseSpecifier,
        effective_date: DateTime<Utc>,
        cancelled_date: Option<DateTime<Utc>>,
        charged_through_date: Option<DateTime<Utc>>,
    ) -> Self {
        Self {
            plan_phase_specifier,
            effective_date,
            cancelled_date,
            charged_through_date,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SubscriptionMigration {
    pub category: ProductCategory,
    pub cases: Vec<SubscriptionMigrationCase>,
}

impl SubscriptionMigration {
    /// 区間リストから作成する（区分は最初の区間のプロダクト区分）
    pub fn from_cases(cases: Vec<SubscriptionMigrationCase>) -> Option<Self> {
        let category = cases.first()?.plan_phase_specifier.category;
        Some(Self { category, cases })
    }

    /// 請求済み期限日（最初に設定されている区間のもの）
    pub fn charged_through_date(&self) -> Option<DateTime<Utc>> {
        self.cases.iter().find_map(|case| case.charged_through_date)
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct BundleMigration {
    pub bundle_key: String,
    pub subscriptions: Vec<SubscriptionMigration>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct AccountMigration {
    /// 移行先アカウントのID
    pub account_key: Uuid,
    pub bundles: Vec<BundleMigration>,
}
