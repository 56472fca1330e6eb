// billing-backend/src/catalog/xml.rs
//
// カタログXML文書の構造と、ドメインモデルへの変換・検証

use super::model::{
    BillingPeriod, Duration, PhaseType, Plan, PlanPhase, Price, PriceList, Product,
    ProductCategory, TimeUnit, DEFAULT_PRICE_LIST_NAME,
};
use super::versioned::StandaloneCatalog;
use crate::error::CatalogError;
use bigdecimal::BigDecimal;
use chrono::{DateTime, Utc};
use serde::Deserialize;
use std::collections::HashSet;
use std::str::FromStr;

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub(crate) struct XmlCatalog {
    effective_date: String,
    catalog_name: String,
    #[serde(default)]
    currencies: XmlCurrencies,
    #[serde(default)]
    products: XmlProducts,
    #[serde(default)]
    plans: XmlPlans,
    price_lists: XmlPriceLists,
}

#[derive(Debug, Default, Deserialize)]
struct XmlCurrencies {
    #[serde(rename = "currency", default)]
    items: Vec<String>,
}

#[derive(Debug, Default, Deserialize)]
struct XmlProducts {
    #[serde(rename = "product", default)]
    items: Vec<XmlProduct>,
}

#[derive(Debug, Deserialize)]
struct XmlProduct {
    #[serde(rename = "@name")]
    name: String,
    category: String,
    #[serde(default)]
    available: XmlAvailable,
}

#[derive(Debug, Default, Deserialize)]
struct XmlAvailable {
    #[serde(rename = "addonProduct", default)]
    items: Vec<String>,
}

#[derive(Debug, Default, Deserialize)]
struct XmlPlans {
    #[serde(rename = "plan", default)]
    items: Vec<XmlPlan>,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct XmlPlan {
    #[serde(rename = "@name")]
    name: String,
    product: String,
    #[serde(default)]
    initial_phases: XmlInitialPhases,
    final_phase: XmlPhase,
}

#[derive(Debug, Default, Deserialize)]
struct XmlInitialPhases {
    #[serde(rename = "phase", default)]
    items: Vec<XmlPhase>,
}

#[derive(Debug, Deserialize)]
struct XmlPhase {
    #[serde(rename = "@type")]
    phase_type: String,
    duration: XmlDuration,
    #[serde(default)]
    recurring: Option<XmlRecurring>,
}

#[derive(Debug, Deserialize)]
struct XmlDuration {
    unit: String,
    #[serde(default)]
    number: Option<i32>,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct XmlRecurring {
    billing_period: String,
    #[serde(default)]
    recurring_price: XmlPrices,
}

#[derive(Debug, Default, Deserialize)]
struct XmlPrices {
    #[serde(rename = "price", default)]
    items: Vec<XmlPrice>,
}

#[derive(Debug, Deserialize)]
struct XmlPrice {
    currency: String,
    value: String,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct XmlPriceLists {
    default_price_list: XmlPriceList,
    #[serde(default)]
    child_price_list: Vec<XmlPriceList>,
}

#[derive(Debug, Deserialize)]
struct XmlPriceList {
    #[serde(rename = "@name")]
    name: String,
    #[serde(default)]
    plans: XmlPlanRefs,
}

#[derive(Debug, Default, Deserialize)]
struct XmlPlanRefs {
    #[serde(rename = "plan", default)]
    items: Vec<String>,
}

/// XML文字列を1バージョン分のカタログとして読み込む
pub(crate) fn parse_catalog(content: &str) -> Result<StandaloneCatalog, CatalogError> {
    let document: XmlCatalog =
        quick_xml::de::from_str(content).map_err(|err| CatalogError::Parse(err.to_string()))?;
    document.into_catalog()
}

impl XmlCatalog {
    fn into_catalog(self) -> Result<StandaloneCatalog, CatalogError> {
        let effective_date = DateTime::parse_from_rfc3339(self.effective_date.trim())
            .map(|date| date.with_timezone(&Utc))
            .map_err(|err| {
                CatalogError::Parse(format!(
                    "invalid effectiveDate '{}': {}",
                    self.effective_date, err
                ))
            })?;

        let mut errors = Vec::new();

        let currencies: Vec<String> = self
            .currencies
            .items
            .iter()
            .map(|c| c.trim().to_uppercase())
            .collect();
        if currencies.is_empty() {
            errors.push("catalog declares no currency".to_string());
        }

        // 値の書式が不正なものは文書の形の誤りとして Parse で返す
        let products = self
            .products
            .items
            .into_iter()
            .map(|product| {
                let category = ProductCategory::from_str(product.category.trim()).map_err(|err| {
                    CatalogError::Parse(format!("product '{}': {}", product.name, err))
                })?;
                Ok(Product {
                    name: product.name,
                    category,
                    available_add_ons: product.available.items,
                })
            })
            .collect::<Result<Vec<_>, CatalogError>>()?;

        let plans = self
            .plans
            .items
            .into_iter()
            .map(convert_plan)
            .collect::<Result<Vec<_>, _>>()?;

        let mut price_lists = vec![convert_price_list(self.price_lists.default_price_list)];
        price_lists.extend(
            self.price_lists
                .child_price_list
                .into_iter()
                .map(convert_price_list),
        );

        let catalog = StandaloneCatalog {
            catalog_name: self.catalog_name.trim().to_string(),
            effective_date,
            currencies,
            products,
            plans,
            price_lists,
        };

        errors.extend(validate(&catalog));
        if errors.is_empty() {
            Ok(catalog)
        } else {
            Err(CatalogError::Validation(errors))
        }
    }
}

fn convert_plan(plan: XmlPlan) -> Result<Plan, CatalogError> {
    let initial_phases = plan
        .initial_phases
        .items
        .into_iter()
        .map(|phase| convert_phase(&plan.name, phase))
        .collect::<Result<Vec<_>, _>>()?;
    let final_phase = convert_phase(&plan.name, plan.final_phase)?;

    Ok(Plan {
        name: plan.name,
        product_name: plan.product.trim().to_string(),
        initial_phases,
        final_phase,
    })
}

fn convert_phase(plan_name: &str, phase: XmlPhase) -> Result<PlanPhase, CatalogError> {
    let context = |err: String| CatalogError::Parse(format!("plan '{}': {}", plan_name, err));

    let phase_type = PhaseType::from_str(phase.phase_type.trim()).map_err(context)?;
    let unit = TimeUnit::from_str(phase.duration.unit.trim()).map_err(context)?;
    let duration = Duration::new(unit, phase.duration.number.unwrap_or(0));

    let (billing_period, prices) = match phase.recurring {
        Some(recurring) => {
            let billing_period =
                BillingPeriod::from_str(recurring.billing_period.trim()).map_err(context)?;
            let prices = recurring
                .recurring_price
                .items
                .into_iter()
                .map(|price| {
                    BigDecimal::from_str(price.value.trim())
                        .map(|value| Price {
                            currency: price.currency.trim().to_uppercase(),
                            value,
                        })
                        .map_err(|err| {
                            context(format!("invalid price '{}': {}", price.value, err))
                        })
                })
                .collect::<Result<Vec<_>, _>>()?;
            (billing_period, prices)
        }
        None => (BillingPeriod::NoBillingPeriod, Vec::new()),
    };

    Ok(PlanPhase {
        name: PlanPhase::phase_name(plan_name, phase_type),
        phase_type,
        duration,
        billing_period,
        prices,
    })
}

fn convert_price_list(list: XmlPriceList) -> PriceList {
    PriceList {
        name: list.name,
        plans: list
            .plans
            .items
            .into_iter()
            .map(|plan| plan.trim().to_string())
            .collect(),
    }
}

/// カタログ全体の整合性チェック（全ての問題を収集して返す）
pub(crate) fn validate(catalog: &StandaloneCatalog) -> Vec<String> {
    let mut errors = Vec::new();

    let mut product_names = HashSet::new();
    for product in &catalog.products {
        if !product_names.insert(product.name.as_str()) {
            errors.push(format!("duplicate product '{}'", product.name));
        }
    }

    for product in &catalog.products {
        for add_on in &product.available_add_ons {
            match catalog.products.iter().find(|p| &p.name == add_on) {
                None => errors.push(format!(
                    "product '{}' lists unknown add-on '{}'",
                    product.name, add_on
                )),
                Some(p) if p.category != ProductCategory::AddOn => errors.push(format!(
                    "product '{}' lists '{}' as add-on but it is {}",
                    product.name, add_on, p.category
                )),
                Some(_) => {}
            }
        }
    }

    let mut plan_names = HashSet::new();
    for plan in &catalog.plans {
        if !plan_names.insert(plan.name.as_str()) {
            errors.push(format!("duplicate plan '{}'", plan.name));
        }
        if !product_names.contains(plan.product_name.as_str()) {
            errors.push(format!(
                "plan '{}' refers to unknown product '{}'",
                plan.name, plan.product_name
            ));
        }
        if !plan.final_phase.duration.is_unlimited() {
            errors.push(format!(
                "plan '{}': final phase must have an UNLIMITED duration",
                plan.name
            ));
        }
        for phase in &plan.initial_phases {
            if phase.duration.is_unlimited() || phase.duration.number <= 0 {
                errors.push(format!(
                    "plan '{}': phase '{}' needs a finite positive duration",
                    plan.name, phase.name
                ));
            }
        }
        for phase in plan.all_phases().filter(|phase| phase.is_recurring()) {
            for currency in &catalog.currencies {
                if phase.price_for(currency).is_none() {
                    errors.push(format!(
                        "plan '{}': phase '{}' has no {} price",
                        plan.name, phase.name, currency
                    ));
                }
            }
        }
    }

    let mut list_names = HashSet::new();
    for list in &catalog.price_lists {
        if !list_names.insert(list.name.as_str()) {
            errors.push(format!("duplicate price list '{}'", list.name));
        }
        for plan in &list.plans {
            if !plan_names.contains(plan.as_str()) {
                errors.push(format!(
                    "price list '{}' refers to unknown plan '{}'",
                    list.name, plan
                ));
            }
        }
    }
    if !list_names.contains(DEFAULT_PRICE_LIST_NAME) {
        errors.push(format!(
            "default price list must be named '{}'",
            DEFAULT_PRICE_LIST_NAME
        ));
    }

    errors
}
