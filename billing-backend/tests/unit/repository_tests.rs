// tests/unit/repository_tests.rs
use billing_backend::catalog::ProductCategory;
use billing_backend::domain::subscription::{ApiEventType, SubscriptionBaseEvent};
use billing_backend::repository::{
    account_repository::{AccountRepository, CreateAccount},
    bundle_repository::BundleRepository,
    subscription_repository::{CreateSubscription, SubscriptionRepository},
};
use chrono::{DateTime, Duration, TimeZone, Utc};
use uuid::Uuid;

use crate::common;

fn date(y: i32, m: u32, d: u32) -> DateTime<Utc> {
    Utc.with_ymd_and_hms(y, m, d, 0, 0, 0).unwrap()
}

fn test_account(external_key: &str) -> CreateAccount {
    CreateAccount {
        external_key: external_key.to_string(),
        name: "Test Account".to_string(),
        email: "account@example.com".to_string(),
        currency: "USD".to_string(),
    }
}

/// アカウントとバンドルを作成し、バンドルIDを返す
async fn setup_bundle(db: &common::db::TestDatabase) -> Uuid {
    let account = AccountRepository::new(db.connection.clone())
        .create(test_account(&Uuid::new_v4().to_string()))
        .await
        .unwrap();
    BundleRepository::new(db.connection.clone())
        .create(account.id, "bundle-1")
        .await
        .unwrap()
        .id
}

/// 作成 → 30日後のフェーズ遷移 → 3ヶ月後のキャンセル
fn lifecycle_events(subscription_id: Uuid, start: DateTime<Utc>) -> Vec<SubscriptionBaseEvent> {
    vec![
        SubscriptionBaseEvent::api_with_plan(
            subscription_id,
            ApiEventType::Create,
            "pistol-monthly",
            "pistol-monthly-trial",
            "DEFAULT",
            start,
            start,
        ),
        SubscriptionBaseEvent::phase(
            subscription_id,
            "pistol-monthly-evergreen",
            start,
            start + Duration::days(30),
        ),
        SubscriptionBaseEvent::api(
            subscription_id,
            ApiEventType::Cancel,
            start,
            start + Duration::days(90),
        ),
    ]
}

async fn create_subscription(
    repo: &SubscriptionRepository,
    bundle_id: Uuid,
    start: DateTime<Utc>,
) -> Uuid {
    let id = Uuid::new_v4();
    repo.create_subscription_with_events(
        CreateSubscription {
            id,
            bundle_id,
            category: ProductCategory::Base,
            start_date: start,
            bundle_start_date: start,
            charged_through_date: None,
        },
        lifecycle_events(id, start),
        start,
    )
    .await
    .unwrap();
    id
}

#[tokio::test]
async fn test_account_lookup_by_external_key() {
    let db = common::db::TestDatabase::new().await;
    let repo = AccountRepository::new(db.connection.clone());

    let created = repo.create(test_account("acme-001")).await.unwrap();

    let found = repo.find_by_external_key("acme-001").await.unwrap();
    assert_eq!(found.map(|a| a.id), Some(created.id));
    assert!(repo.find_by_external_key("unknown").await.unwrap().is_none());
}

#[tokio::test]
async fn test_bundles_are_scoped_to_account() {
    let db = common::db::TestDatabase::new().await;
    let accounts = AccountRepository::new(db.connection.clone());
    let bundles = BundleRepository::new(db.connection.clone());

    let first = accounts.create(test_account("first")).await.unwrap();
    let second = accounts.create(test_account("second")).await.unwrap();
    bundles.create(first.id, "12345").await.unwrap();
    bundles.create(first.id, "67890").await.unwrap();

    assert_eq!(bundles.find_by_account_id(first.id).await.unwrap().len(), 2);
    assert!(bundles.find_by_account_id(second.id).await.unwrap().is_empty());
    assert!(bundles
        .find_by_external_key(second.id, "12345")
        .await
        .unwrap()
        .is_none());
}

#[tokio::test]
async fn test_events_are_numbered_and_ordered_by_effective_date() {
    let db = common::db::TestDatabase::new().await;
    let bundle_id = setup_bundle(&db).await;
    let repo = SubscriptionRepository::new(db.connection.clone());
    let start = date(2012, 1, 1);

    let id = create_subscription(&repo, bundle_id, start).await;

    let events = repo.get_events_for_subscription(id).await.unwrap();
    assert_eq!(events.len(), 3);
    let orderings: Vec<i64> = events.iter().map(|e| e.total_ordering).collect();
    assert_eq!(orderings, vec![1, 2, 3]);

    // 後から追加したイベントは既存の採番に続く
    let appended = repo
        .append_events(
            id,
            vec![SubscriptionBaseEvent::api(
                id,
                ApiEventType::Uncancel,
                start,
                start + Duration::days(10),
            )],
            start,
        )
        .await
        .unwrap();
    assert_eq!(appended[0].total_ordering, 4);

    let events = repo.get_events_for_subscription(id).await.unwrap();
    assert_eq!(events[1].total_ordering, 4);
    assert_eq!(events[1].effective_date, start + Duration::days(10));
}

#[tokio::test]
async fn test_pending_events_and_deactivation() {
    let db = common::db::TestDatabase::new().await;
    let bundle_id = setup_bundle(&db).await;
    let repo = SubscriptionRepository::new(db.connection.clone());
    let start = date(2012, 1, 1);
    let id = create_subscription(&repo, bundle_id, start).await;

    let now = start + Duration::days(1);
    let pending = repo
        .get_pending_events_for_subscription(id, now)
        .await
        .unwrap();
    assert_eq!(pending.len(), 2);

    // フェーズ遷移より後のイベント（キャンセル）のみ無効化される
    let deactivated = repo
        .deactivate_events_after(id, start + Duration::days(30))
        .await
        .unwrap();
    assert_eq!(deactivated, 1);

    let pending = repo
        .get_pending_events_for_subscription(id, now)
        .await
        .unwrap();
    assert_eq!(pending.len(), 1);
    assert_eq!(pending[0].event_type, "phase");
}

#[tokio::test]
async fn test_due_events_are_reported_until_notified() {
    let db = common::db::TestDatabase::new().await;
    let bundle_id = setup_bundle(&db).await;
    let repo = SubscriptionRepository::new(db.connection.clone());
    let start = date(2012, 1, 1);
    create_subscription(&repo, bundle_id, start).await;

    let now = start + Duration::days(31);
    let due = repo.find_due_unnotified_events(now).await.unwrap();
    assert_eq!(due.len(), 2);

    for event in &due {
        assert!(repo.claim_notification(event.id).await.unwrap());
    }
    assert!(repo.find_due_unnotified_events(now).await.unwrap().is_empty());
}

#[tokio::test]
async fn test_notification_is_claimed_only_once() {
    let db = common::db::TestDatabase::new().await;
    let bundle_id = setup_bundle(&db).await;
    let repo = SubscriptionRepository::new(db.connection.clone());
    let start = date(2012, 1, 1);
    create_subscription(&repo, bundle_id, start).await;

    let due = repo.find_due_unnotified_events(start).await.unwrap();
    assert_eq!(due.len(), 1);

    let (first, second) = tokio::join!(
        repo.claim_notification(due[0].id),
        repo.claim_notification(due[0].id)
    );
    assert!(first.unwrap() ^ second.unwrap());
    assert!(!repo.claim_notification(Uuid::new_v4()).await.unwrap());
}

#[tokio::test]
async fn test_events_record_given_time_and_notified_flag() {
    let db = common::db::TestDatabase::new().await;
    let bundle_id = setup_bundle(&db).await;
    let repo = SubscriptionRepository::new(db.connection.clone());
    let start = date(2012, 1, 1);
    let recorded_at = date(2012, 3, 15);

    let id = Uuid::new_v4();
    let mut events = lifecycle_events(id, start);
    events[0].notified = true;
    let (_, inserted) = repo
        .create_subscription_with_events(
            CreateSubscription {
                id,
                bundle_id,
                category: ProductCategory::Base,
                start_date: start,
                bundle_start_date: start,
                charged_through_date: None,
            },
            events,
            recorded_at,
        )
        .await
        .unwrap();

    assert!(inserted.iter().all(|event| event.created_at == recorded_at));
    let notified: Vec<bool> = inserted.iter().map(|event| event.notified).collect();
    assert_eq!(notified, vec![true, false, false]);

    // 通知済みで保存したイベントは未通知の一覧に現れない
    let due = repo
        .find_due_unnotified_events(start + Duration::days(31))
        .await
        .unwrap();
    assert_eq!(due.len(), 1);
    assert_eq!(due[0].event_type, "phase");
}

#[tokio::test]
async fn test_update_charged_through_date() {
    let db = common::db::TestDatabase::new().await;
    let bundle_id = setup_bundle(&db).await;
    let repo = SubscriptionRepository::new(db.connection.clone());
    let start = date(2012, 1, 1);
    let id = create_subscription(&repo, bundle_id, start).await;

    let ctd = date(2012, 2, 1);
    let updated = repo.update_charged_through_date(id, Some(ctd)).await.unwrap();
    assert_eq!(updated.charged_through_date, Some(ctd));

    let missing = repo
        .update_charged_through_date(Uuid::new_v4(), Some(ctd))
        .await;
    assert!(missing.is_err());
}
