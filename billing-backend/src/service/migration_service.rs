// billing-backend/src/service/migration_service.rs
//
// 旧システムで管理していたサブスクリプションの取り込み
//
// 入力の検証とカタログ解決を全て終えてから書き込みを始める。

use crate::catalog::{Plan, PlanPhase, ProductCategory, VersionedCatalog};
use crate::db::DbPool;
use crate::domain::migration::{AccountMigration, BundleMigration, SubscriptionMigration};
use crate::domain::subscription::{ApiEventType, DefaultSubscriptionBase, SubscriptionBaseEvent};
use crate::error::{CatalogError, SubscriptionApiError, SubscriptionApiResult};
use crate::repository::account_repository::AccountRepository;
use crate::repository::bundle_repository::BundleRepository;
use crate::repository::subscription_repository::{CreateSubscription, SubscriptionRepository};
use crate::service::event_bus::{BusEvent, NextEvent, SubscriptionEventBus};
use crate::service::subscription_service::{
    plan_phase_events, resolve_specifier, SubscriptionService,
};
use crate::utils::clock::Clock;
use chrono::{DateTime, Utc};
use std::collections::HashSet;
use std::sync::Arc;
use tracing::{debug, info};
use uuid::Uuid;

/// カタログ解決済みの移行区間
struct ResolvedCase<'a> {
    plan: &'a Plan,
    phase: &'a PlanPhase,
    price_list_name: &'a str,
    effective_date: DateTime<Utc>,
    cancelled_date: Option<DateTime<Utc>>,
}

struct ResolvedSubscription<'a> {
    migration: &'a SubscriptionMigration,
    cases: Vec<ResolvedCase<'a>>,
}

impl ResolvedSubscription<'_> {
    fn first_effective_date(&self) -> DateTime<Utc> {
        self.cases[0].effective_date
    }

    fn product_name(&self) -> &str {
        &self.cases[self.cases.len() - 1].plan.product_name
    }
}

#[derive(Clone)]
pub struct MigrationService {
    account_repo: Arc<AccountRepository>,
    bundle_repo: Arc<BundleRepository>,
    subscription_repo: Arc<SubscriptionRepository>,
    subscription_service: SubscriptionService,
    catalog: Arc<VersionedCatalog>,
    clock: Arc<dyn Clock>,
    bus: SubscriptionEventBus,
}

impl MigrationService {
    pub fn new(
        db: DbPool,
        catalog: Arc<VersionedCatalog>,
        clock: Arc<dyn Clock>,
        bus: SubscriptionEventBus,
    ) -> Self {
        Self {
            account_repo: Arc::new(AccountRepository::new(db.clone())),
            bundle_repo: Arc::new(BundleRepository::new(db.clone())),
            subscription_repo: Arc::new(SubscriptionRepository::new(db.clone())),
            subscription_service: SubscriptionService::new(
                db,
                catalog.clone(),
                clock.clone(),
                bus.clone(),
            ),
            catalog,
            clock,
            bus,
        }
    }

    /// アカウントのバンドルとサブスクリプションを移行する
    pub async fn migrate(
        &self,
        migration: &AccountMigration,
    ) -> SubscriptionApiResult<Vec<DefaultSubscriptionBase>> {
        let now = self.clock.now();
        let account = self
            .account_repo
            .find_by_id(migration.account_key)
            .await?
            .ok_or(SubscriptionApiError::AccountNotFound(migration.account_key))?;

        let mut bundle_keys = HashSet::new();
        for bundle in &migration.bundles {
            if !bundle_keys.insert(bundle.bundle_key.as_str())
                || self
                    .bundle_repo
                    .find_by_external_key(account.id, &bundle.bundle_key)
                    .await?
                    .is_some()
            {
                return Err(SubscriptionApiError::BundleKeyExists(
                    bundle.bundle_key.clone(),
                ));
            }
        }

        let resolved_bundles = migration
            .bundles
            .iter()
            .map(|bundle| self.resolve_bundle(bundle))
            .collect::<SubscriptionApiResult<Vec<_>>>()?;

        let mut migrated = Vec::new();
        for (bundle, subscriptions) in migration.bundles.iter().zip(resolved_bundles) {
            let created = self.bundle_repo.create(account.id, &bundle.bundle_key).await?;
            debug!(
                account_id = %account.id,
                bundle_id = %created.id,
                bundle_key = %bundle.bundle_key,
                "Migrating bundle"
            );

            let bundle_start_date = subscriptions
                .iter()
                .find(|sub| sub.migration.category == ProductCategory::Base)
                .or(subscriptions.first())
                .map(|sub| sub.first_effective_date());

            for subscription in &subscriptions {
                let id = self
                    .migrate_subscription(
                        created.id,
                        subscription,
                        bundle_start_date.unwrap_or(subscription.first_effective_date()),
                        now,
                    )
                    .await?;
                migrated.push(self.subscription_service.get_subscription(id).await?);
            }
        }

        info!(
            account_id = %account.id,
            bundles = migration.bundles.len(),
            subscriptions = migrated.len(),
            "Account migrated"
        );
        Ok(migrated)
    }

    /// バンドル内のサブスクリプションを検証・解決し、ベースを先頭に並べる
    fn resolve_bundle<'a>(
        &'a self,
        bundle: &'a BundleMigration,
    ) -> SubscriptionApiResult<Vec<ResolvedSubscription<'a>>> {
        let mut resolved = bundle
            .subscriptions
            .iter()
            .map(|subscription| self.resolve_subscription(subscription))
            .collect::<SubscriptionApiResult<Vec<_>>>()?;
        resolved.sort_by_key(|sub| match sub.migration.category {
            ProductCategory::Base => 0,
            ProductCategory::Standalone => 1,
            ProductCategory::AddOn => 2,
        });

        let bases: Vec<&ResolvedSubscription> = resolved
            .iter()
            .filter(|sub| sub.migration.category == ProductCategory::Base)
            .collect();
        for add_on in resolved
            .iter()
            .filter(|sub| sub.migration.category == ProductCategory::AddOn)
        {
            let Some(base) = bases.first() else {
                return Err(SubscriptionApiError::InvalidMigration(format!(
                    "bundle {} has an add-on without a base subscription",
                    bundle.bundle_key
                )));
            };
            let base_product = self
                .catalog
                .find_product(base.product_name(), base.first_effective_date())?;
            if !base_product.is_add_on_available(add_on.product_name()) {
                return Err(SubscriptionApiError::AddOnNotAvailable {
                    addon: add_on.product_name().to_string(),
                    base: base_product.name.clone(),
                });
            }
        }

        Ok(resolved)
    }

    fn resolve_subscription<'a>(
        &'a self,
        migration: &'a SubscriptionMigration,
    ) -> SubscriptionApiResult<ResolvedSubscription<'a>> {
        validate_cases(migration)?;

        let cases = migration
            .cases
            .iter()
            .map(|case| {
                let spec = &case.plan_phase_specifier;
                let (plan, phase) = resolve_specifier(&self.catalog, spec, case.effective_date)?;
                Ok(ResolvedCase {
                    plan,
                    phase,
                    price_list_name: &spec.price_list_name,
                    effective_date: case.effective_date,
                    cancelled_date: case.cancelled_date,
                })
            })
            .collect::<SubscriptionApiResult<Vec<_>>>()?;

        Ok(ResolvedSubscription { migration, cases })
    }

    async fn migrate_subscription(
        &self,
        bundle_id: Uuid,
        subscription: &ResolvedSubscription<'_>,
        bundle_start_date: DateTime<Utc>,
        now: DateTime<Utc>,
    ) -> SubscriptionApiResult<Uuid> {
        let subscription_id = Uuid::new_v4();
        let mut events = migration_events(subscription_id, &subscription.cases, now)?;
        // 過去分の履歴はバスに流さず、通知済みとして同じトランザクションで保存する
        for event in events.iter_mut() {
            event.notified = event.effective_date <= now;
        }

        let (_, inserted) = self
            .subscription_repo
            .create_subscription_with_events(
                CreateSubscription {
                    id: subscription_id,
                    bundle_id,
                    category: subscription.migration.category,
                    start_date: subscription.first_effective_date(),
                    bundle_start_date,
                    charged_through_date: subscription.migration.charged_through_date(),
                },
                events,
                now,
            )
            .await?;
        let historical = inserted.iter().filter(|event| event.notified).count();

        self.bus.post(BusEvent {
            kind: NextEvent::Migrate,
            subscription_id,
            bundle_id,
            effective_date: subscription.first_effective_date(),
        });

        debug!(
            subscription_id = %subscription_id,
            bundle_id = %bundle_id,
            cases = subscription.cases.len(),
            pending_events = inserted.len() - historical,
            "Subscription migrated"
        );
        Ok(subscription_id)
    }
}

/// 区間リストの整合性を検証する
fn validate_cases(migration: &SubscriptionMigration) -> SubscriptionApiResult<()> {
    let invalid = |reason: String| Err(SubscriptionApiError::InvalidMigration(reason));

    if migration.cases.is_empty() {
        return invalid("subscription has no cases".to_string());
    }

    for case in &migration.cases {
        let spec = &case.plan_phase_specifier;
        if spec.category != migration.category {
            return invalid(format!(
                "case for {} is {} but the subscription is {}",
                spec.product_name, spec.category, migration.category
            ));
        }
        if case
            .cancelled_date
            .is_some_and(|cancelled| cancelled < case.effective_date)
        {
            return invalid(format!(
                "case for {} is cancelled before it starts",
                spec.product_name
            ));
        }
    }

    for pair in migration.cases.windows(2) {
        let (current, next) = (&pair[0], &pair[1]);
        if next.effective_date <= current.effective_date {
            return invalid(format!(
                "case effective dates must be strictly increasing ({} then {})",
                current.effective_date, next.effective_date
            ));
        }
        if current
            .cancelled_date
            .is_some_and(|cancelled| cancelled > next.effective_date)
        {
            return invalid(format!(
                "case cancelled at {} overlaps the next case starting {}",
                current.cancelled_date.unwrap_or(current.effective_date),
                next.effective_date
            ));
        }
    }

    Ok(())
}

/// 区間リストをイベント列に変換する
fn migration_events(
    subscription_id: Uuid,
    cases: &[ResolvedCase<'_>],
    now: DateTime<Utc>,
) -> Result<Vec<SubscriptionBaseEvent>, CatalogError> {
    let mut events = Vec::with_capacity(cases.len() + 2);
    let mut previous: Option<&ResolvedCase> = None;

    for case in cases {
        let event = match previous {
            None => SubscriptionBaseEvent::api_with_plan(
                subscription_id,
                ApiEventType::MigrateEntitlement,
                &case.plan.name,
                &case.phase.name,
                case.price_list_name,
                case.effective_date,
                case.effective_date,
            ),
            Some(previous) if previous.plan.name == case.plan.name => SubscriptionBaseEvent::phase(
                subscription_id,
                &case.phase.name,
                case.effective_date,
                case.effective_date,
            ),
            Some(_) => SubscriptionBaseEvent::api_with_plan(
                subscription_id,
                ApiEventType::Change,
                &case.plan.name,
                &case.phase.name,
                case.price_list_name,
                case.effective_date,
                case.effective_date,
            ),
        };
        events.push(event);
        previous = Some(case);
    }

    if let Some(last) = cases.last() {
        if let Some(cancelled_date) = last.cancelled_date {
            events.push(SubscriptionBaseEvent::api(
                subscription_id,
                ApiEventType::Cancel,
                cancelled_date,
                cancelled_date,
            ));
        }
        events.extend(plan_phase_events(
            subscription_id,
            last.plan,
            last.phase,
            last.effective_date,
            last.effective_date,
            now,
            last.cancelled_date,
        )?);
    }

    Ok(events)
}
