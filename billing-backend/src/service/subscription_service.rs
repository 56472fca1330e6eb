// billing-backend/src/service/subscription_service.rs

use crate::catalog::{
    next_phase_transition, Plan, PlanPhase, PlanPhaseSpecifier, ProductCategory,
    VersionedCatalog,
};
use crate::db::DbPool;
use crate::domain::subscription::{
    ApiEventType, DefaultSubscriptionBase, EventKind, SubscriptionBaseEvent, SubscriptionState,
};
use crate::domain::subscription_event_model;
use crate::domain::subscription_model;
use crate::error::{CatalogError, SubscriptionApiError, SubscriptionApiResult};
use crate::repository::bundle_repository::BundleRepository;
use crate::repository::subscription_repository::{CreateSubscription, SubscriptionRepository};
use crate::service::event_bus::{BusEvent, NextEvent, SubscriptionEventBus};
use crate::utils::clock::Clock;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::sync::Arc;
use tracing::{debug, info, warn};
use uuid::Uuid;

/// プラン変更・キャンセルの適用タイミング
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum ChangePolicy {
    /// 要求日時に適用
    #[default]
    Immediate,
    /// 請求済み期限日（CTD）が要求日時より後ならその日時に適用
    EndOfTerm,
}

impl ChangePolicy {
    fn effective_date(
        &self,
        requested_date: DateTime<Utc>,
        charged_through_date: Option<DateTime<Utc>>,
    ) -> DateTime<Utc> {
        match self {
            Self::Immediate => requested_date,
            Self::EndOfTerm => charged_through_date
                .filter(|ctd| *ctd > requested_date)
                .unwrap_or(requested_date),
        }
    }
}

#[derive(Clone)]
pub struct SubscriptionService {
    subscription_repo: Arc<SubscriptionRepository>,
    bundle_repo: Arc<BundleRepository>,
    catalog: Arc<VersionedCatalog>,
    clock: Arc<dyn Clock>,
    bus: SubscriptionEventBus,
}

impl SubscriptionService {
    pub fn new(
        db: DbPool,
        catalog: Arc<VersionedCatalog>,
        clock: Arc<dyn Clock>,
        bus: SubscriptionEventBus,
    ) -> Self {
        Self {
            subscription_repo: Arc::new(SubscriptionRepository::new(db.clone())),
            bundle_repo: Arc::new(BundleRepository::new(db)),
            catalog,
            clock,
            bus,
        }
    }

    pub fn catalog(&self) -> &VersionedCatalog {
        &self.catalog
    }

    pub fn now(&self) -> DateTime<Utc> {
        self.clock.now()
    }

    /// サブスクリプションを作成
    pub async fn create_subscription(
        &self,
        bundle_id: Uuid,
        spec: &PlanPhaseSpecifier,
        original_creation_date: Option<DateTime<Utc>>,
        requested_date: Option<DateTime<Utc>>,
    ) -> SubscriptionApiResult<DefaultSubscriptionBase> {
        let now = self.clock.now();
        let requested_date = requested_date.unwrap_or(now);
        if requested_date > now {
            return Err(SubscriptionApiError::RequestedDateInFuture(
                requested_date.to_rfc3339(),
            ));
        }

        self.bundle_repo
            .find_by_id(bundle_id)
            .await?
            .ok_or(SubscriptionApiError::BundleNotFound(bundle_id))?;

        let catalog_date = original_creation_date.unwrap_or(requested_date);
        let (plan, start_phase) = resolve_specifier(&self.catalog, spec, catalog_date)?;

        let bundle_subscriptions = self.load_bundle_subscriptions(bundle_id, now).await?;
        let active_base = bundle_subscriptions.iter().find(|sub| {
            sub.category == ProductCategory::Base && sub.state() != SubscriptionState::Cancelled
        });

        let mut bundle_start_date = catalog_date;
        let mut cancel_with_base = None;
        match spec.category {
            ProductCategory::Base => {
                if active_base.is_some() {
                    return Err(SubscriptionApiError::BaseAlreadyExists(bundle_id));
                }
            }
            ProductCategory::AddOn => {
                let base = active_base.ok_or(SubscriptionApiError::NoActiveBase(bundle_id))?;
                self.ensure_add_on_available(base, &plan.product_name, now)?;
                // アドオンはベースより長く存続できない
                cancel_with_base = base.pending_cancel_date();
                bundle_start_date = base.bundle_start_date;
            }
            ProductCategory::Standalone => {}
        }

        let subscription_id = Uuid::new_v4();
        let mut events = vec![SubscriptionBaseEvent::api_with_plan(
            subscription_id,
            ApiEventType::Create,
            &plan.name,
            &start_phase.name,
            &spec.price_list_name,
            requested_date,
            requested_date,
        )];
        events.extend(plan_phase_events(
            subscription_id,
            plan,
            start_phase,
            requested_date,
            requested_date,
            now,
            cancel_with_base,
        )?);
        if let Some(cancel_date) = cancel_with_base {
            events.push(SubscriptionBaseEvent::api(
                subscription_id,
                ApiEventType::Cancel,
                requested_date,
                cancel_date,
            ));
        }

        let (_, inserted) = self
            .subscription_repo
            .create_subscription_with_events(
                CreateSubscription {
                    id: subscription_id,
                    bundle_id,
                    category: spec.category,
                    start_date: requested_date,
                    bundle_start_date,
                    charged_through_date: None,
                },
                events,
                now,
            )
            .await?;

        info!(
            subscription_id = %subscription_id,
            bundle_id = %bundle_id,
            plan = %plan.name,
            phase = %start_phase.name,
            requested_date = %requested_date,
            "Subscription created"
        );

        self.process_due_events(due_events(inserted, now)?, now).await?;
        self.get_subscription(subscription_id).await
    }

    pub async fn get_subscription(&self, id: Uuid) -> SubscriptionApiResult<DefaultSubscriptionBase> {
        let model = self
            .subscription_repo
            .find_by_id(id)
            .await?
            .ok_or(SubscriptionApiError::SubscriptionNotFound(id))?;
        self.build_subscription(model, self.clock.now()).await
    }

    pub async fn get_subscriptions_for_bundle(
        &self,
        bundle_id: Uuid,
    ) -> SubscriptionApiResult<Vec<DefaultSubscriptionBase>> {
        self.bundle_repo
            .find_by_id(bundle_id)
            .await?
            .ok_or(SubscriptionApiError::BundleNotFound(bundle_id))?;
        self.load_bundle_subscriptions(bundle_id, self.clock.now())
            .await
    }

    /// 現在時刻より後に有効になるアクティブなイベント
    pub async fn get_pending_events(
        &self,
        id: Uuid,
    ) -> SubscriptionApiResult<Vec<SubscriptionBaseEvent>> {
        self.subscription_repo
            .find_by_id(id)
            .await?
            .ok_or(SubscriptionApiError::SubscriptionNotFound(id))?;

        self.subscription_repo
            .get_pending_events_for_subscription(id, self.clock.now())
            .await?
            .into_iter()
            .map(SubscriptionBaseEvent::try_from)
            .collect()
    }

    /// プランを変更
    pub async fn change_plan(
        &self,
        id: Uuid,
        spec: &PlanPhaseSpecifier,
        requested_date: Option<DateTime<Utc>>,
        policy: ChangePolicy,
    ) -> SubscriptionApiResult<DefaultSubscriptionBase> {
        let now = self.clock.now();
        let requested_date = requested_date.unwrap_or(now);
        let subscription = self.get_subscription(id).await?;

        if subscription.state() == SubscriptionState::Cancelled {
            return Err(SubscriptionApiError::SubscriptionCancelled(id));
        }
        if spec.category != subscription.category {
            return Err(SubscriptionApiError::CategoryMismatch {
                product: spec.product_name.clone(),
                requested: spec.category.to_string(),
                actual: subscription.category.to_string(),
            });
        }

        let effective_date =
            policy.effective_date(requested_date, subscription.charged_through_date);
        let pending_cancel = subscription.pending_cancel_date();
        if pending_cancel.is_some_and(|cancel_date| cancel_date <= effective_date) {
            return Err(SubscriptionApiError::SubscriptionCancelled(id));
        }

        let (plan, start_phase) = resolve_specifier(&self.catalog, spec, effective_date)?;

        // 変更日以降のフェーズ遷移・変更は新プランで置き換える（保留中のキャンセルは残す）
        let superseded: Vec<Uuid> = subscription
            .events()
            .iter()
            .filter(|event| event.effective_date >= effective_date)
            .filter(|event| event.kind.is_phase() || event.is_api_of(ApiEventType::Change))
            .map(|event| event.id)
            .collect();

        let mut events = vec![SubscriptionBaseEvent::api_with_plan(
            id,
            ApiEventType::Change,
            &plan.name,
            &start_phase.name,
            &spec.price_list_name,
            requested_date,
            effective_date,
        )];
        events.extend(plan_phase_events(
            id,
            plan,
            start_phase,
            effective_date,
            requested_date,
            now,
            pending_cancel,
        )?);

        let inserted = self
            .subscription_repo
            .update_events(id, &superseded, events, now)
            .await?;

        info!(
            subscription_id = %id,
            from_plan = ?subscription.plan_name(),
            to_plan = %plan.name,
            policy = ?policy,
            effective_date = %effective_date,
            "Subscription plan change requested"
        );

        self.process_due_events(due_events(inserted, now)?, now).await?;
        self.get_subscription(id).await
    }

    /// キャンセル（ベースの場合は同じバンドルのアドオンも同日にキャンセル）
    pub async fn cancel(
        &self,
        id: Uuid,
        requested_date: Option<DateTime<Utc>>,
        policy: ChangePolicy,
    ) -> SubscriptionApiResult<DefaultSubscriptionBase> {
        let now = self.clock.now();
        let requested_date = requested_date.unwrap_or(now);
        let subscription = self.get_subscription(id).await?;

        if subscription.state() == SubscriptionState::Cancelled
            || subscription.pending_cancel_date().is_some()
        {
            return Err(SubscriptionApiError::SubscriptionCancelled(id));
        }

        let effective_date =
            policy.effective_date(requested_date, subscription.charged_through_date);
        let mut due = self
            .write_cancel(&subscription, requested_date, effective_date, now)
            .await?;

        if subscription.category == ProductCategory::Base {
            let add_ons = self
                .load_bundle_subscriptions(subscription.bundle_id, now)
                .await?;
            for add_on in add_ons.iter().filter(|sub| {
                sub.category == ProductCategory::AddOn
                    && sub.state() != SubscriptionState::Cancelled
                    && sub.pending_cancel_date().is_none()
            }) {
                debug!(
                    base_id = %id,
                    add_on_id = %add_on.id,
                    "Cancelling add-on together with its base"
                );
                due.extend(
                    self.write_cancel(add_on, requested_date, effective_date, now)
                        .await?,
                );
            }
        }

        info!(
            subscription_id = %id,
            policy = ?policy,
            effective_date = %effective_date,
            "Subscription cancelled"
        );

        self.process_due_events(due, now).await?;
        self.get_subscription(id).await
    }

    /// 保留中のキャンセルを取り消す
    pub async fn uncancel(&self, id: Uuid) -> SubscriptionApiResult<DefaultSubscriptionBase> {
        let now = self.clock.now();
        let subscription = self.get_subscription(id).await?;
        let cancel_date = subscription
            .pending_cancel_date()
            .ok_or(SubscriptionApiError::NoPendingCancel(id))?;

        let mut due = self.write_uncancel(&subscription, cancel_date, now).await?;

        if subscription.category == ProductCategory::Base {
            let add_ons = self
                .load_bundle_subscriptions(subscription.bundle_id, now)
                .await?;
            for add_on in add_ons.iter().filter(|sub| {
                sub.category == ProductCategory::AddOn
                    && sub.pending_cancel_date() == Some(cancel_date)
            }) {
                due.extend(self.write_uncancel(add_on, cancel_date, now).await?);
            }
        }

        info!(
            subscription_id = %id,
            cancel_date = %cancel_date,
            "Subscription cancellation withdrawn"
        );

        self.process_due_events(due, now).await?;
        self.get_subscription(id).await
    }

    /// 請求済み期限日（CTD）を更新
    pub async fn set_charged_through_date(
        &self,
        id: Uuid,
        charged_through_date: DateTime<Utc>,
    ) -> SubscriptionApiResult<DefaultSubscriptionBase> {
        self.subscription_repo
            .find_by_id(id)
            .await?
            .ok_or(SubscriptionApiError::SubscriptionNotFound(id))?;

        let model = self
            .subscription_repo
            .update_charged_through_date(id, Some(charged_through_date))
            .await?;

        debug!(
            subscription_id = %id,
            charged_through_date = %charged_through_date,
            "Charged through date updated"
        );
        self.build_subscription(model, self.clock.now()).await
    }

    /// 有効日時を迎えた未通知イベントをバスに配信し、配信数を返す
    pub async fn notify_due_events(&self) -> SubscriptionApiResult<usize> {
        let now = self.clock.now();
        let due = due_events(
            self.subscription_repo.find_due_unnotified_events(now).await?,
            now,
        )?;
        let posted = self.process_due_events(due, now).await?;
        if posted > 0 {
            info!(count = posted, "Due subscription events notified");
        }
        Ok(posted)
    }

    // --- 内部処理 ---

    pub(crate) async fn build_subscription(
        &self,
        model: subscription_model::Model,
        as_of: DateTime<Utc>,
    ) -> SubscriptionApiResult<DefaultSubscriptionBase> {
        let events = self
            .subscription_repo
            .get_events_for_subscription(model.id)
            .await?
            .into_iter()
            .map(SubscriptionBaseEvent::try_from)
            .collect::<Result<Vec<_>, _>>()?;
        DefaultSubscriptionBase::new(model, events, as_of)
    }

    async fn load_bundle_subscriptions(
        &self,
        bundle_id: Uuid,
        as_of: DateTime<Utc>,
    ) -> SubscriptionApiResult<Vec<DefaultSubscriptionBase>> {
        let models = self.subscription_repo.find_by_bundle_id(bundle_id).await?;
        let mut subscriptions = Vec::with_capacity(models.len());
        for model in models {
            subscriptions.push(self.build_subscription(model, as_of).await?);
        }
        Ok(subscriptions)
    }

    fn ensure_add_on_available(
        &self,
        base: &DefaultSubscriptionBase,
        add_on_product: &str,
        now: DateTime<Utc>,
    ) -> SubscriptionApiResult<()> {
        let base_plan_name = base.plan_name().ok_or_else(|| {
            SubscriptionApiError::CorruptedEvent(format!("base {} has no plan", base.id))
        })?;
        let base_plan = self.catalog.resolve_plan(base_plan_name, now)?;
        let base_product = self
            .catalog
            .find_product(&base_plan.product_name, now)
            .or_else(|_| self.catalog.latest().find_product(&base_plan.product_name))?;

        if !base_product.is_add_on_available(add_on_product) {
            return Err(SubscriptionApiError::AddOnNotAvailable {
                addon: add_on_product.to_string(),
                base: base_product.name.clone(),
            });
        }
        Ok(())
    }

    async fn write_cancel(
        &self,
        subscription: &DefaultSubscriptionBase,
        requested_date: DateTime<Utc>,
        effective_date: DateTime<Utc>,
        now: DateTime<Utc>,
    ) -> SubscriptionApiResult<Vec<SubscriptionBaseEvent>> {
        let superseded: Vec<Uuid> = subscription
            .events()
            .iter()
            .filter(|event| event.effective_date > effective_date)
            .map(|event| event.id)
            .collect();

        let inserted = self
            .subscription_repo
            .update_events(
                subscription.id,
                &superseded,
                vec![SubscriptionBaseEvent::api(
                    subscription.id,
                    ApiEventType::Cancel,
                    requested_date,
                    effective_date,
                )],
                now,
            )
            .await?;
        due_events(inserted, now)
    }

    async fn write_uncancel(
        &self,
        subscription: &DefaultSubscriptionBase,
        cancel_date: DateTime<Utc>,
        now: DateTime<Utc>,
    ) -> SubscriptionApiResult<Vec<SubscriptionBaseEvent>> {
        let cancel_events: Vec<Uuid> = subscription
            .pending_events()
            .filter(|event| event.is_api_of(ApiEventType::Cancel))
            .map(|event| event.id)
            .collect();

        let mut events = vec![SubscriptionBaseEvent::api(
            subscription.id,
            ApiEventType::Uncancel,
            now,
            now,
        )];

        // キャンセルで打ち切られていた次のフェーズ遷移を復元する。
        // キャンセル日ちょうどの遷移・変更は残っているので、それを起点にする。
        let last_plan_event = subscription
            .events()
            .iter()
            .filter(|event| event.effective_date <= cancel_date)
            .filter_map(|event| match &event.kind {
                EventKind::Phase(phase) => Some((phase.phase_name.clone(), event.effective_date)),
                EventKind::Api(api) => api
                    .phase_name
                    .clone()
                    .map(|phase_name| (phase_name, event.effective_date)),
            })
            .last();
        if let Some((phase_name, phase_start)) = last_plan_event {
            let plan = self
                .catalog
                .resolve_plan_for_phase(&phase_name, phase_start)?;
            let phase = plan
                .find_phase(&phase_name)
                .ok_or_else(|| CatalogError::PhaseNotFound(phase_name.clone()))?;
            events.extend(plan_phase_events(
                subscription.id,
                plan,
                phase,
                phase_start,
                now,
                now,
                None,
            )?);
        }

        let inserted = self
            .subscription_repo
            .update_events(subscription.id, &cancel_events, events, now)
            .await?;
        due_events(inserted, now)
    }

    /// 期日を迎えたイベントをバスに配信して通知済みにする
    ///
    /// 通知済みへの更新に成功したイベントだけを配信するので、API呼び出しと
    /// バックグラウンド通知が同じイベントを拾っても配信は1回になる。
    /// フェーズ遷移を配信したら次の遷移を追加し、それも期日済みなら続けて処理する。
    async fn process_due_events(
        &self,
        mut due: Vec<SubscriptionBaseEvent>,
        now: DateTime<Utc>,
    ) -> SubscriptionApiResult<usize> {
        let mut bundle_ids: HashMap<Uuid, Uuid> = HashMap::new();
        let mut posted = 0;

        while !due.is_empty() {
            due.sort_by_key(|event| (event.effective_date, event.total_ordering));

            let mut chained = Vec::new();
            for event in &due {
                if !self.subscription_repo.claim_notification(event.id).await? {
                    continue;
                }

                let bundle_id = match bundle_ids.get(&event.subscription_id) {
                    Some(bundle_id) => *bundle_id,
                    None => {
                        let subscription = self
                            .subscription_repo
                            .find_by_id(event.subscription_id)
                            .await?
                            .ok_or(SubscriptionApiError::SubscriptionNotFound(
                                event.subscription_id,
                            ))?;
                        bundle_ids.insert(subscription.id, subscription.bundle_id);
                        subscription.bundle_id
                    }
                };

                self.bus.post(BusEvent {
                    kind: NextEvent::from(&event.kind),
                    subscription_id: event.subscription_id,
                    bundle_id,
                    effective_date: event.effective_date,
                });
                posted += 1;

                if let EventKind::Phase(phase) = &event.kind {
                    if let Some(next) = self.chain_next_phase(event, &phase.phase_name, now).await? {
                        if next.effective_date <= now {
                            chained.push(next);
                        }
                    }
                }
            }

            due = chained;
        }

        Ok(posted)
    }

    async fn chain_next_phase(
        &self,
        event: &SubscriptionBaseEvent,
        phase_name: &str,
        now: DateTime<Utc>,
    ) -> SubscriptionApiResult<Option<SubscriptionBaseEvent>> {
        let plan = self
            .catalog
            .resolve_plan_for_phase(phase_name, event.effective_date)?;
        let Some((boundary, next_phase)) =
            next_phase_transition(plan, phase_name, event.effective_date)?
        else {
            return Ok(None);
        };

        let existing = self
            .subscription_repo
            .get_events_for_subscription(event.subscription_id)
            .await?
            .into_iter()
            .map(SubscriptionBaseEvent::try_from)
            .collect::<Result<Vec<_>, _>>()?;
        if !is_phase_boundary_open(&existing, event.effective_date, boundary) {
            return Ok(None);
        }

        let inserted = self
            .subscription_repo
            .append_events(
                event.subscription_id,
                vec![SubscriptionBaseEvent::phase(
                    event.subscription_id,
                    &next_phase.name,
                    now,
                    boundary,
                )],
                now,
            )
            .await?;

        debug!(
            subscription_id = %event.subscription_id,
            phase = %next_phase.name,
            effective_date = %boundary,
            "Next phase transition scheduled"
        );
        inserted
            .into_iter()
            .next()
            .map(SubscriptionBaseEvent::try_from)
            .transpose()
    }
}

/// 期日を迎えたイベントを定期的に通知するバックグラウンドタスク
pub async fn event_notifier_task(service: Arc<SubscriptionService>, interval: std::time::Duration) {
    let mut ticker = tokio::time::interval(interval);
    ticker.set_missed_tick_behavior(tokio::time::MissedTickBehavior::Skip);

    loop {
        ticker.tick().await;
        if let Err(err) = service.notify_due_events().await {
            warn!(error = %err, "Failed to notify due subscription events");
        }
    }
}

/// プラン指定からプランと開始フェーズを解決する
pub(crate) fn resolve_specifier<'a>(
    catalog: &'a VersionedCatalog,
    spec: &PlanPhaseSpecifier,
    date: DateTime<Utc>,
) -> SubscriptionApiResult<(&'a Plan, &'a PlanPhase)> {
    let plan = catalog.find_plan(spec, date)?;
    let product = catalog.find_product(&plan.product_name, date)?;
    if product.category != spec.category {
        return Err(SubscriptionApiError::CategoryMismatch {
            product: product.name.clone(),
            requested: spec.category.to_string(),
            actual: product.category.to_string(),
        });
    }

    let phase = match spec.phase_type {
        Some(phase_type) => plan.phase_of_type(phase_type).ok_or_else(|| {
            CatalogError::PhaseNotFound(format!("{} phase of plan {}", phase_type, plan.name))
        })?,
        None => plan.first_phase(),
    };
    Ok((plan, phase))
}

/// `phase` を `phase_start` に開始した場合のフェーズ遷移イベント
///
/// `now` 以前の遷移は全て、未来の遷移は直近の1件だけを返す。`cancel_date` 以降の遷移は作らない。
pub(crate) fn plan_phase_events(
    subscription_id: Uuid,
    plan: &Plan,
    phase: &PlanPhase,
    phase_start: DateTime<Utc>,
    requested_date: DateTime<Utc>,
    now: DateTime<Utc>,
    cancel_date: Option<DateTime<Utc>>,
) -> Result<Vec<SubscriptionBaseEvent>, CatalogError> {
    let mut events = Vec::new();
    let mut current = phase;
    let mut start = phase_start;

    while let Some((boundary, next)) = next_phase_transition(plan, &current.name, start)? {
        if cancel_date.is_some_and(|cancel_date| cancel_date <= boundary) {
            break;
        }
        events.push(SubscriptionBaseEvent::phase(
            subscription_id,
            &next.name,
            requested_date,
            boundary,
        ));
        if boundary > now {
            break;
        }
        current = next;
        start = boundary;
    }

    Ok(events)
}

/// `after` に始まったフェーズの次の遷移（`boundary`）を追加してよいか
fn is_phase_boundary_open(
    events: &[SubscriptionBaseEvent],
    after: DateTime<Utc>,
    boundary: DateTime<Utc>,
) -> bool {
    !events.iter().any(|event| match &event.kind {
        EventKind::Phase(_) => event.effective_date > after,
        EventKind::Api(api) => match api.api_type {
            ApiEventType::Change => event.effective_date > after,
            ApiEventType::Cancel => event.effective_date <= boundary,
            _ => false,
        },
    })
}

fn due_events(
    models: Vec<subscription_event_model::Model>,
    now: DateTime<Utc>,
) -> SubscriptionApiResult<Vec<SubscriptionBaseEvent>> {
    models
        .into_iter()
        .filter(|model| model.is_active && model.effective_date <= now)
        .map(SubscriptionBaseEvent::try_from)
        .collect()
}
