// billing-backend/src/catalog/model.rs

use bigdecimal::BigDecimal;
use serde::{Deserialize, Serialize};
use std::str::FromStr;

/// 全てのカタログに必須のプライスリスト名
pub const DEFAULT_PRICE_LIST_NAME: &str = "DEFAULT";

/// 請求周期
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum BillingPeriod {
    Monthly,
    Quarterly,
    Annual,
    NoBillingPeriod,
}

impl BillingPeriod {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Monthly => "MONTHLY",
            Self::Quarterly => "QUARTERLY",
            Self::Annual => "ANNUAL",
            Self::NoBillingPeriod => "NO_BILLING_PERIOD",
        }
    }

    /// 1周期あたりの月数（周期なしの場合はNone）
    pub fn number_of_months(&self) -> Option<u32> {
        match self {
            Self::Monthly => Some(1),
            Self::Quarterly => Some(3),
            Self::Annual => Some(12),
            Self::NoBillingPeriod => None,
        }
    }

    pub fn all() -> Vec<Self> {
        vec![
            Self::Monthly,
            Self::Quarterly,
            Self::Annual,
            Self::NoBillingPeriod,
        ]
    }
}

impl FromStr for BillingPeriod {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_uppercase().as_str() {
            "MONTHLY" => Ok(Self::Monthly),
            "QUARTERLY" => Ok(Self::Quarterly),
            "ANNUAL" => Ok(Self::Annual),
            "NO_BILLING_PERIOD" => Ok(Self::NoBillingPeriod),
            _ => Err(format!("Invalid billing period: {}", s)),
        }
    }
}

impl std::fmt::Display for BillingPeriod {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

/// プロダクト区分
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum ProductCategory {
    Base,
    AddOn,
    Standalone,
}

impl ProductCategory {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Base => "BASE",
            Self::AddOn => "ADD_ON",
            Self::Standalone => "STANDALONE",
        }
    }

    pub fn all() -> Vec<Self> {
        vec![Self::Base, Self::AddOn, Self::Standalone]
    }
}

impl FromStr for ProductCategory {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_uppercase().as_str() {
            "BASE" => Ok(Self::Base),
            "ADD_ON" => Ok(Self::AddOn),
            "STANDALONE" => Ok(Self::Standalone),
            _ => Err(format!("Invalid product category: {}", s)),
        }
    }
}

impl std::fmt::Display for ProductCategory {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

/// プランのフェーズ種別
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum PhaseType {
    Trial,
    Discount,
    Fixedterm,
    Evergreen,
}

impl PhaseType {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Trial => "TRIAL",
            Self::Discount => "DISCOUNT",
            Self::Fixedterm => "FIXEDTERM",
            Self::Evergreen => "EVERGREEN",
        }
    }

    pub fn all() -> Vec<Self> {
        vec![Self::Trial, Self::Discount, Self::Fixedterm, Self::Evergreen]
    }
}

impl FromStr for PhaseType {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_uppercase().as_str() {
            "TRIAL" => Ok(Self::Trial),
            "DISCOUNT" => Ok(Self::Discount),
            "FIXEDTERM" => Ok(Self::Fixedterm),
            "EVERGREEN" => Ok(Self::Evergreen),
            _ => Err(format!("Invalid phase type: {}", s)),
        }
    }
}

impl std::fmt::Display for PhaseType {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

/// 期間の単位
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum TimeUnit {
    Days,
    Months,
    Years,
    Unlimited,
}

impl TimeUnit {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Days => "DAYS",
            Self::Months => "MONTHS",
            Self::Years => "YEARS",
            Self::Unlimited => "UNLIMITED",
        }
    }
}

impl FromStr for TimeUnit {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_uppercase().as_str() {
            "DAYS" => Ok(Self::Days),
            "MONTHS" => Ok(Self::Months),
            "YEARS" => Ok(Self::Years),
            "UNLIMITED" => Ok(Self::Unlimited),
            _ => Err(format!("Invalid time unit: {}", s)),
        }
    }
}

impl std::fmt::Display for TimeUnit {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

/// フェーズの長さ（単位 × 数）
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct Duration {
    pub unit: TimeUnit,
    pub number: i32,
}

impl Duration {
    pub fn new(unit: TimeUnit, number: i32) -> Self {
        Self { unit, number }
    }

    pub fn days(number: i32) -> Self {
        Self::new(TimeUnit::Days, number)
    }

    pub fn months(number: i32) -> Self {
        Self::new(TimeUnit::Months, number)
    }

    pub fn years(number: i32) -> Self {
        Self::new(TimeUnit::Years, number)
    }

    pub fn unlimited() -> Self {
        Self::new(TimeUnit::Unlimited, 0)
    }

    pub fn is_unlimited(&self) -> bool {
        self.unit == TimeUnit::Unlimited
    }
}

impl std::fmt::Display for Duration {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        if self.is_unlimited() {
            write!(f, "{}", self.unit)
        } else {
            write!(f, "{} {}", self.number, self.unit)
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Price {
    pub currency: String,
    pub value: BigDecimal,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Product {
    pub name: String,
    pub category: ProductCategory,
    /// BASEプロダクトに付けられるアドオン名
    pub available_add_ons: Vec<String>,
}

impl Product {
    pub fn is_add_on_available(&self, add_on: &str) -> bool {
        self.available_add_ons.iter().any(|name| name == add_on)
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PlanPhase {
    pub name: String,
    pub phase_type: PhaseType,
    pub duration: Duration,
    pub billing_period: BillingPeriod,
    pub prices: Vec<Price>,
}

impl PlanPhase {
    /// フェーズ名は `<プラン名>-<フェーズ種別>` の規約
    pub fn phase_name(plan_name: &str, phase_type: PhaseType) -> String {
        format!("{}-{}", plan_name, phase_type.as_str().to_lowercase())
    }

    pub fn price_for(&self, currency: &str) -> Option<&BigDecimal> {
        self.prices
            .iter()
            .find(|price| price.currency.eq_ignore_ascii_case(currency))
            .map(|price| &price.value)
    }

    pub fn is_recurring(&self) -> bool {
        self.billing_period != BillingPeriod::NoBillingPeriod
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Plan {
    pub name: String,
    pub product_name: String,
    pub initial_phases: Vec<PlanPhase>,
    pub final_phase: PlanPhase,
}

impl Plan {
    /// 初期フェーズ → 最終フェーズの順に全フェーズを返す
    pub fn all_phases(&self) -> impl Iterator<Item = &PlanPhase> {
        self.initial_phases
            .iter()
            .chain(std::iter::once(&self.final_phase))
    }

    pub fn first_phase(&self) -> &PlanPhase {
        self.initial_phases.first().unwrap_or(&self.final_phase)
    }

    pub fn find_phase(&self, name: &str) -> Option<&PlanPhase> {
        self.all_phases().find(|phase| phase.name == name)
    }

    pub fn phase_of_type(&self, phase_type: PhaseType) -> Option<&PlanPhase> {
        self.all_phases()
            .find(|phase| phase.phase_type == phase_type)
    }

    /// 指定フェーズの次のフェーズ（最終フェーズならNone）
    pub fn next_phase(&self, name: &str) -> Option<&PlanPhase> {
        let mut phases = self.all_phases().skip_while(|phase| phase.name != name);
        phases.next()?;
        phases.next()
    }

    pub fn billing_period(&self) -> BillingPeriod {
        self.final_phase.billing_period
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PriceList {
    pub name: String,
    pub plans: Vec<String>,
}

impl PriceList {
    pub fn contains(&self, plan_name: &str) -> bool {
        self.plans.iter().any(|name| name == plan_name)
    }
}

/// プロダクト・請求周期・プライスリスト（・開始フェーズ）によるプラン指定
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct PlanPhaseSpecifier {
    pub product_name: String,
    pub category: ProductCategory,
    pub billing_period: BillingPeriod,
    pub price_list_name: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub phase_type: Option<PhaseType>,
}

impl PlanPhaseSpecifier {
    pub fn new(
        product_name: impl Into<String>,
        category: ProductCategory,
        billing_period: BillingPeriod,
        price_list_name: impl Into<String>,
        phase_type: Option<PhaseType>,
    ) -> Self {
        Self {
            product_name: product_name.into(),
            category,
            billing_period,
            price_list_name: price_list_name.into(),
            phase_type,
        }
    }
}

impl std::fmt::Display for PlanPhaseSpecifier {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(
            f,
            "{}/{}/{}/{}",
            self.product_name, self.category, self.billing_period, self.price_list_name
        )?;
        if let Some(phase_type) = self.phase_type {
            write!(f, "/{}", phase_type)?;
        }
        Ok(())
    }
}
