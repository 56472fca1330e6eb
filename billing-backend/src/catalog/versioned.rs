// billing-backend/src/catalog/versioned.rs

use super::model::{
    BillingPeriod, Plan, PlanPhase, PlanPhaseSpecifier, PriceList, Product,
    DEFAULT_PRICE_LIST_NAME,
};
use crate::error::CatalogError;
use chrono::{DateTime, Utc};
use serde::Serialize;

/// 単一バージョンのカタログ（ある有効日時から適用される定義一式）
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct StandaloneCatalog {
    pub catalog_name: String,
    pub effective_date: DateTime<Utc>,
    pub currencies: Vec<String>,
    pub products: Vec<Product>,
    pub plans: Vec<Plan>,
    pub price_lists: Vec<PriceList>,
}

impl StandaloneCatalog {
    pub fn find_product(&self, name: &str) -> Result<&Product, CatalogError> {
        self.products
            .iter()
            .find(|product| product.name == name)
            .ok_or_else(|| CatalogError::ProductNotFound(name.to_string()))
    }

    pub fn find_plan(&self, name: &str) -> Result<&Plan, CatalogError> {
        self.plans
            .iter()
            .find(|plan| plan.name == name)
            .ok_or_else(|| CatalogError::PlanNotFound(name.to_string()))
    }

    pub fn find_phase(&self, name: &str) -> Result<&PlanPhase, CatalogError> {
        self.plans
            .iter()
            .find_map(|plan| plan.find_phase(name))
            .ok_or_else(|| CatalogError::PhaseNotFound(name.to_string()))
    }

    /// フェーズ名から所属プランを逆引きする
    pub fn find_plan_for_phase(&self, phase_name: &str) -> Result<&Plan, CatalogError> {
        self.plans
            .iter()
            .find(|plan| plan.find_phase(phase_name).is_some())
            .ok_or_else(|| CatalogError::PhaseNotFound(phase_name.to_string()))
    }

    pub fn price_list(&self, name: &str) -> Result<&PriceList, CatalogError> {
        self.price_lists
            .iter()
            .find(|list| list.name == name)
            .ok_or_else(|| CatalogError::PriceListNotFound(name.to_string()))
    }

    pub fn default_price_list(&self) -> Result<&PriceList, CatalogError> {
        self.price_list(DEFAULT_PRICE_LIST_NAME)
    }

    /// プライスリスト内でプロダクトと請求周期が一致するプランを探す
    ///
    /// 指定リストで見つからなければ DEFAULT リストにフォールバックする。
    pub fn find_plan_for(
        &self,
        product_name: &str,
        billing_period: BillingPeriod,
        price_list_name: &str,
    ) -> Result<&Plan, CatalogError> {
        let requested = self.price_list(price_list_name)?;

        let lookup = |list: &PriceList| {
            self.plans.iter().find(|plan| {
                list.contains(&plan.name)
                    && plan.product_name == product_name
                    && plan.billing_period() == billing_period
            })
        };

        lookup(requested)
            .or_else(|| {
                self.default_price_list()
                    .ok()
                    .filter(|default| default.name != requested.name)
                    .and_then(lookup)
            })
            .ok_or_else(|| {
                CatalogError::PlanNotFound(format!(
                    "{}/{}/{}",
                    product_name, billing_period, price_list_name
                ))
            })
    }
}

/// 有効日時順に並んだカタログバージョンの集合
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct VersionedCatalog {
    catalog_name: String,
    versions: Vec<StandaloneCatalog>,
}

impl VersionedCatalog {
    /// バージョンを有効日時順に並べて構築する
    pub fn new(mut versions: Vec<StandaloneCatalog>) -> Result<Self, CatalogError> {
        let Some(first) = versions.first() else {
            return Err(CatalogError::Validation(vec![
                "catalog has no versions".to_string(),
            ]));
        };
        let catalog_name = first.catalog_name.clone();

        let mut errors = Vec::new();
        for version in &versions {
            if version.catalog_name != catalog_name {
                errors.push(format!(
                    "catalog name mismatch: '{}' vs '{}'",
                    version.catalog_name, catalog_name
                ));
            }
        }

        versions.sort_by_key(|version| version.effective_date);
        for pair in versions.windows(2) {
            if pair[0].effective_date == pair[1].effective_date {
                errors.push(format!(
                    "duplicate catalog effective date {}",
                    pair[0].effective_date
                ));
            }
        }

        if !errors.is_empty() {
            return Err(CatalogError::Validation(errors));
        }

        Ok(Self {
            catalog_name,
            versions,
        })
    }

    pub fn catalog_name(&self) -> &str {
        &self.catalog_name
    }

    pub fn versions(&self) -> &[StandaloneCatalog] {
        &self.versions
    }

    pub fn latest(&self) -> &StandaloneCatalog {
        // new() で空でないことを保証済み
        &self.versions[self.versions.len() - 1]
    }

    /// 指定日時に有効なバージョン（有効日時 <= date の最新）
    pub fn version_at(&self, date: DateTime<Utc>) -> Result<&StandaloneCatalog, CatalogError> {
        self.versions
            .iter()
            .rev()
            .find(|version| version.effective_date <= date)
            .ok_or_else(|| CatalogError::NoCatalogVersion(date.to_rfc3339()))
    }

    pub fn find_plan(
        &self,
        spec: &PlanPhaseSpecifier,
        date: DateTime<Utc>,
    ) -> Result<&Plan, CatalogError> {
        self.version_at(date)?.find_plan_for(
            &spec.product_name,
            spec.billing_period,
            &spec.price_list_name,
        )
    }

    /// 名前でプランを解決する
    ///
    /// 指定日時のバージョンに無い場合は新しいバージョンから順に探す
    /// （既存サブスクリプションのプランが後のバージョンで追加・削除されていても辿れる）。
    pub fn resolve_plan(&self, name: &str, date: DateTime<Utc>) -> Result<&Plan, CatalogError> {
        self.version_at(date)
            .and_then(|version| version.find_plan(name))
            .or_else(|_| {
                self.versions
                    .iter()
                    .rev()
                    .find_map(|version| version.find_plan(name).ok())
                    .ok_or_else(|| CatalogError::PlanNotFound(name.to_string()))
            })
    }

    /// フェーズ名から所属プランを解決する（探索順は `resolve_plan` と同じ）
    pub fn resolve_plan_for_phase(
        &self,
        phase_name: &str,
        date: DateTime<Utc>,
    ) -> Result<&Plan, CatalogError> {
        self.version_at(date)
            .and_then(|version| version.find_plan_for_phase(phase_name))
            .or_else(|_| {
                self.versions
                    .iter()
                    .rev()
                    .find_map(|version| version.find_plan_for_phase(phase_name).ok())
                    .ok_or_else(|| CatalogError::PhaseNotFound(phase_name.to_string()))
            })
    }

    pub fn find_phase(&self, name: &str, date: DateTime<Utc>) -> Result<&PlanPhase, CatalogError> {
        self.version_at(date)?.find_phase(name)
    }

    pub fn find_product(&self, name: &str, date: DateTime<Utc>) -> Result<&Product, CatalogError> {
        self.version_at(date)?.find_product(name)
    }

    pub fn summary(&self) -> CatalogSummary {
        CatalogSummary {
            catalog_name: self.catalog_name.clone(),
            versions: self
                .versions
                .iter()
                .map(|version| CatalogVersionSummary {
                    effective_date: version.effective_date,
                    currencies: version.currencies.clone(),
                    products: version.products.iter().map(|p| p.name.clone()).collect(),
                    plans: version.plans.iter().map(|p| p.name.clone()).collect(),
                    price_lists: version.price_lists.iter().map(|l| l.name.clone()).collect(),
                })
                .collect(),
        }
    }
}

/// 次のフェーズ遷移の日時とフェーズ（最終フェーズならNone）
pub fn next_phase_transition<'a>(
    plan: &'a Plan,
    phase_name: &str,
    phase_start: DateTime<Utc>,
) -> Result<Option<(DateTime<Utc>, &'a PlanPhase)>, CatalogError> {
    let current = plan
        .find_phase(phase_name)
        .ok_or_else(|| CatalogError::PhaseNotFound(phase_name.to_string()))?;

    match plan.next_phase(phase_name) {
        Some(next) => {
            let effective_date = current.duration.add_to(phase_start)?;
            Ok(Some((effective_date, next)))
        }
        None => Ok(None),
    }
}

#[derive(Debug, Clone, Serialize)]
pub struct CatalogSummary {
    pub catalog_name: String,
    pub versions: Vec<CatalogVersionSummary>,
}

#[derive(Debug, Clone, Serialize)]
pub struct CatalogVersionSummary {
    pub effective_date: DateTime<Utc>,
    pub currencies: Vec<String>,
    pub products: Vec<String>,
    pub plans: Vec<String>,
    pub price_lists: Vec<String>,
}
