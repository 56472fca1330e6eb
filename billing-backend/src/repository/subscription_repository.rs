// billing-backend/src/repository/subscription_repository.rs
//
// サブスクリプションとそのイベントの永続化
//
// 日時による絞り込みと並び替えはDB種別（sqliteでは日時が文字列）に依存しないよう
// 取得後にRust側で行う。

use crate::catalog::ProductCategory;
use crate::domain::subscription::SubscriptionBaseEvent;
use crate::domain::subscription_event_model::{self, Entity as EventEntity};
use crate::domain::subscription_model::{
    self, ActiveModel as SubscriptionActiveModel, Entity as SubscriptionEntity,
};
use chrono::{DateTime, Utc};
use sea_orm::entity::*;
use sea_orm::sea_query::Expr;
use sea_orm::{
    ConnectionTrait, DbConn, DbErr, QueryFilter, QueryOrder, Set, TransactionTrait,
};
use uuid::Uuid;

#[derive(Debug, Clone)]
pub struct SubscriptionRepository {
    db: DbConn,
}

impl SubscriptionRepository {
    pub fn new(db: DbConn) -> Self {
        Self { db }
    }

    // --- サブスクリプション ---

    /// サブスクリプションと初期イベントを1トランザクションで作成
    ///
    /// イベントの作成日時には `recorded_at`（サービスの時計の現在時刻）を記録する。
    pub async fn create_subscription_with_events(
        &self,
        subscription: CreateSubscription,
        events: Vec<SubscriptionBaseEvent>,
        recorded_at: DateTime<Utc>,
    ) -> Result<(subscription_model::Model, Vec<subscription_event_model::Model>), DbErr> {
        let txn = self.db.begin().await?;

        let now = Utc::now();
        let new_subscription = SubscriptionActiveModel {
            id: Set(subscription.id),
            bundle_id: Set(subscription.bundle_id),
            category: Set(subscription.category.as_str().to_string()),
            start_date: Set(subscription.start_date),
            bundle_start_date: Set(subscription.bundle_start_date),
            charged_through_date: Set(subscription.charged_through_date),
            created_at: Set(now),
            updated_at: Set(now),
        };
        let model = new_subscription.insert(&txn).await?;
        let inserted = insert_events(&txn, subscription.id, events, recorded_at).await?;

        txn.commit().await?;
        Ok((model, inserted))
    }

    pub async fn find_by_id(&self, id: Uuid) -> Result<Option<subscription_model::Model>, DbErr> {
        SubscriptionEntity::find_by_id(id).one(&self.db).await
    }

    pub async fn find_by_bundle_id(
        &self,
        bundle_id: Uuid,
    ) -> Result<Vec<subscription_model::Model>, DbErr> {
        let mut subscriptions = SubscriptionEntity::find()
            .filter(subscription_model::Column::BundleId.eq(bundle_id))
            .all(&self.db)
            .await?;
        subscriptions.sort_by_key(|sub| (sub.start_date, sub.created_at));
        Ok(subscriptions)
    }

    pub async fn update_charged_through_date(
        &self,
        id: Uuid,
        charged_through_date: Option<DateTime<Utc>>,
    ) -> Result<subscription_model::Model, DbErr> {
        let subscription = SubscriptionEntity::find_by_id(id)
            .one(&self.db)
            .await?
            .ok_or(DbErr::RecordNotFound("Subscription not found".to_string()))?;

        let mut active_model: SubscriptionActiveModel = subscription.into();
        active_model.charged_through_date = Set(charged_through_date);
        active_model.updated_at = Set(Utc::now());
        active_model.update(&self.db).await
    }

    // --- イベント ---

    /// アクティブなイベントを有効日時順（同時刻は採番順）で取得
    pub async fn get_events_for_subscription(
        &self,
        subscription_id: Uuid,
    ) -> Result<Vec<subscription_event_model::Model>, DbErr> {
        let mut events = EventEntity::find()
            .filter(subscription_event_model::Column::SubscriptionId.eq(subscription_id))
            .filter(subscription_event_model::Column::IsActive.eq(true))
            .order_by_asc(subscription_event_model::Column::TotalOrdering)
            .all(&self.db)
            .await?;
        events.sort_by_key(|event| (event.effective_date, event.total_ordering));
        Ok(events)
    }

    /// `now` より後に有効になるアクティブなイベント
    pub async fn get_pending_events_for_subscription(
        &self,
        subscription_id: Uuid,
        now: DateTime<Utc>,
    ) -> Result<Vec<subscription_event_model::Model>, DbErr> {
        let events = self.get_events_for_subscription(subscription_id).await?;
        Ok(events
            .into_iter()
            .filter(|event| event.effective_date > now)
            .collect())
    }

    pub async fn append_events(
        &self,
        subscription_id: Uuid,
        events: Vec<SubscriptionBaseEvent>,
        recorded_at: DateTime<Utc>,
    ) -> Result<Vec<subscription_event_model::Model>, DbErr> {
        self.update_events(subscription_id, &[], events, recorded_at)
            .await
    }

    /// `date` より後に有効になるアクティブなイベントを全て非アクティブにする
    pub async fn deactivate_events_after(
        &self,
        subscription_id: Uuid,
        date: DateTime<Utc>,
    ) -> Result<u64, DbErr> {
        let ids: Vec<Uuid> = self
            .get_pending_events_for_subscription(subscription_id, date)
            .await?
            .into_iter()
            .map(|event| event.id)
            .collect();
        deactivate(&self.db, &ids).await
    }

    /// イベントの非アクティブ化と追加を1トランザクションで行う
    pub async fn update_events(
        &self,
        subscription_id: Uuid,
        deactivate_ids: &[Uuid],
        new_events: Vec<SubscriptionBaseEvent>,
        recorded_at: DateTime<Utc>,
    ) -> Result<Vec<subscription_event_model::Model>, DbErr> {
        let txn = self.db.begin().await?;

        deactivate(&txn, deactivate_ids).await?;
        let inserted = insert_events(&txn, subscription_id, new_events, recorded_at).await?;

        txn.commit().await?;
        Ok(inserted)
    }

    /// 有効日時を迎えたが未通知のアクティブなイベント（有効日時順）
    pub async fn find_due_unnotified_events(
        &self,
        now: DateTime<Utc>,
    ) -> Result<Vec<subscription_event_model::Model>, DbErr> {
        let mut events: Vec<_> = EventEntity::find()
            .filter(subscription_event_model::Column::IsActive.eq(true))
            .filter(subscription_event_model::Column::Notified.eq(false))
            .all(&self.db)
            .await?
            .into_iter()
            .filter(|event| event.effective_date <= now)
            .collect();
        events.sort_by_key(|event| (event.effective_date, event.total_ordering));
        Ok(events)
    }

    /// 未通知のイベントを通知済みにする
    ///
    /// 条件付き更新なので、同じイベントを同時に通知しようとしても `true` を
    /// 受け取るのは1つの呼び出し元だけになる。`true` のときだけバスに配信すること。
    pub async fn claim_notification(&self, event_id: Uuid) -> Result<bool, DbErr> {
        let result = EventEntity::update_many()
            .col_expr(subscription_event_model::Column::Notified, Expr::value(true))
            .filter(subscription_event_model::Column::Id.eq(event_id))
            .filter(subscription_event_model::Column::Notified.eq(false))
            .exec(&self.db)
            .await?;
        Ok(result.rows_affected == 1)
    }
}

async fn insert_events<C>(
    conn: &C,
    subscription_id: Uuid,
    events: Vec<SubscriptionBaseEvent>,
    recorded_at: DateTime<Utc>,
) -> Result<Vec<subscription_event_model::Model>, DbErr>
where
    C: ConnectionTrait,
{
    if events.is_empty() {
        return Ok(Vec::new());
    }

    // 既存の最大値に続けて採番する
    let last_ordering = EventEntity::find()
        .filter(subscription_event_model::Column::SubscriptionId.eq(subscription_id))
        .order_by_desc(subscription_event_model::Column::TotalOrdering)
        .one(conn)
        .await?
        .map(|event| event.total_ordering)
        .unwrap_or(0);

    let mut inserted = Vec::with_capacity(events.len());
    for (index, mut event) in events.into_iter().enumerate() {
        event.total_ordering = last_ordering + index as i64 + 1;
        event.created_date = recorded_at;
        let model = event.to_active_model().insert(conn).await?;
        inserted.push(model);
    }
    Ok(inserted)
}

async fn deactivate<C>(conn: &C, event_ids: &[Uuid]) -> Result<u64, DbErr>
where
    C: ConnectionTrait,
{
    if event_ids.is_empty() {
        return Ok(0);
    }

    let result = EventEntity::update_many()
        .col_expr(subscription_event_model::Column::IsActive, Expr::value(false))
        .filter(subscription_event_model::Column::Id.is_in(event_ids.to_vec()))
        .exec(conn)
        .await?;
    Ok(result.rows_affected)
}

/// サブスクリプション作成用構造体
#[derive(Debug, Clone)]
pub struct CreateSubscription {
    pub id: Uuid,
    pub bundle_id: Uuid,
    pub category: ProductCategory,
    pub start_date: DateTime<Utc>,
    pub bundle_start_date: DateTime<Utc>,
    pub charged_through_date: Option<DateTime<Utc>>,
}
