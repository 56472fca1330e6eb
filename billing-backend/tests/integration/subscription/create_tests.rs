// tests/integration/subscription/create_tests.rs

use crate::common::api_listener::TestApiListener;
use crate::common::app_helper::setup_test_app;
use crate::common::subscription_helper::{
    assert_date_within, minus_days, plus_days, plus_months, print_subscription_transitions,
    TestSubscriptionHelper,
};
use billing_backend::catalog::{BillingPeriod, DEFAULT_PRICE_LIST_NAME};
use billing_backend::domain::subscription::SubscriptionState;
use billing_backend::error::{CatalogError, SubscriptionApiError};
use billing_backend::service::event_bus::NextEvent;
use billing_backend::utils::clock::Clock;
use chrono::{TimeZone, Utc};
use std::sync::Arc;
use uuid::Uuid;

#[tokio::test]
async fn test_create_base_subscription_starts_in_trial() {
    let app = setup_test_app().await;
    let listener = Arc::new(TestApiListener::new(&app.bus));
    let helper = TestSubscriptionHelper::new(&app, listener.clone());
    let (_, bundle) = helper.create_account_with_bundle("bundle-create").await;
    let now = helper.now();

    let subscription = helper
        .create_subscription(&bundle, "Shotgun", BillingPeriod::Monthly, DEFAULT_PRICE_LIST_NAME, None)
        .await
        .unwrap();

    assert_eq!(subscription.state(), SubscriptionState::Active);
    assert_eq!(subscription.plan_name(), Some("shotgun-monthly"));
    assert_eq!(subscription.phase_name(), Some("shotgun-monthly-trial"));
    assert_eq!(subscription.price_list_name(), Some(DEFAULT_PRICE_LIST_NAME));
    assert_eq!(subscription.bundle_start_date, now);
    assert_date_within(subscription.start_date, now, app.clock.now());
    print_subscription_transitions(&subscription.transitions());

    // トライアル30日後にエバーグリーンへ
    helper
        .check_next_phase_change(&subscription, 1, Some(plus_days(now, 30)))
        .await;
    assert!(listener.is_completed());
}

#[tokio::test]
async fn test_create_with_past_requested_date_notifies_elapsed_phases() {
    let app = setup_test_app().await;
    let listener = Arc::new(TestApiListener::new(&app.bus));
    let helper = TestSubscriptionHelper::new(&app, listener.clone());
    let (_, bundle) = helper.create_account_with_bundle("bundle-past").await;
    let requested = minus_days(helper.now(), 45);
    let spec = helper.get_product_specifier("Shotgun", "gunclubDiscount", BillingPeriod::Monthly, None);

    // 作成と、既に過ぎたトライアル終了の両方が配信される
    listener.push_expected_events(&[NextEvent::Create, NextEvent::Phase]);
    let subscription = app
        .subscription_service
        .create_subscription(bundle.id, &spec, None, Some(requested))
        .await
        .unwrap();
    listener.assert_listener_status();

    assert_eq!(subscription.plan_name(), Some("shotgun-monthly-gunclub"));
    assert_eq!(subscription.phase_name(), Some("shotgun-monthly-gunclub-discount"));
    assert_eq!(subscription.current_phase_start(), Some(plus_days(requested, 30)));
    helper
        .check_next_phase_change(
            &subscription,
            1,
            Some(plus_months(plus_days(requested, 30), 6)),
        )
        .await;
}

#[tokio::test]
async fn test_create_with_future_requested_date_is_rejected() {
    let app = setup_test_app().await;
    let listener = Arc::new(TestApiListener::new(&app.bus));
    let helper = TestSubscriptionHelper::new(&app, listener.clone());
    let (_, bundle) = helper.create_account_with_bundle("bundle-future").await;
    let spec = helper.get_product_specifier("Pistol", DEFAULT_PRICE_LIST_NAME, BillingPeriod::Monthly, None);

    let result = app
        .subscription_service
        .create_subscription(bundle.id, &spec, None, Some(plus_days(helper.now(), 1)))
        .await;

    assert!(matches!(
        result,
        Err(SubscriptionApiError::RequestedDateInFuture(_))
    ));
    listener.assert_listener_status();
}

#[tokio::test]
async fn test_second_base_in_bundle_is_rejected() {
    let app = setup_test_app().await;
    let listener = Arc::new(TestApiListener::new(&app.bus));
    let helper = TestSubscriptionHelper::new(&app, listener.clone());
    let (_, bundle) = helper.create_account_with_bundle("bundle-base").await;

    helper
        .create_subscription(&bundle, "Pistol", BillingPeriod::Monthly, DEFAULT_PRICE_LIST_NAME, None)
        .await
        .unwrap();

    let spec = helper.get_product_specifier("Shotgun", DEFAULT_PRICE_LIST_NAME, BillingPeriod::Annual, None);
    let result = app
        .subscription_service
        .create_subscription(bundle.id, &spec, None, None)
        .await;

    assert!(matches!(result, Err(SubscriptionApiError::BaseAlreadyExists(id)) if id == bundle.id));
}

#[tokio::test]
async fn test_create_in_unknown_bundle_fails() {
    let app = setup_test_app().await;
    let listener = Arc::new(TestApiListener::new(&app.bus));
    let helper = TestSubscriptionHelper::new(&app, listener.clone());
    let spec = helper.get_product_specifier("Pistol", DEFAULT_PRICE_LIST_NAME, BillingPeriod::Monthly, None);

    let result = app
        .subscription_service
        .create_subscription(Uuid::new_v4(), &spec, None, None)
        .await;

    assert!(matches!(result, Err(SubscriptionApiError::BundleNotFound(_))));
}

#[tokio::test]
async fn test_add_on_requires_available_active_base() {
    let app = setup_test_app().await;
    let listener = Arc::new(TestApiListener::new(&app.bus));
    let helper = TestSubscriptionHelper::new(&app, listener.clone());
    let (_, bundle) = helper.create_account_with_bundle("bundle-addon").await;
    let scope = helper.get_product_specifier(
        "Telescopic-Scope",
        DEFAULT_PRICE_LIST_NAME,
        BillingPeriod::Monthly,
        None,
    );

    // ベースが無い
    let result = app
        .subscription_service
        .create_subscription(bundle.id, &scope, None, None)
        .await;
    assert!(matches!(result, Err(SubscriptionApiError::NoActiveBase(_))));

    // Pistol には Telescopic-Scope を付けられない
    helper
        .create_subscription(&bundle, "Pistol", BillingPeriod::Monthly, DEFAULT_PRICE_LIST_NAME, None)
        .await
        .unwrap();
    let result = app
        .subscription_service
        .create_subscription(bundle.id, &scope, None, None)
        .await;
    assert!(matches!(
        result,
        Err(SubscriptionApiError::AddOnNotAvailable { ref addon, ref base })
            if addon == "Telescopic-Scope" && base == "Pistol"
    ));

    // Laser-Scope は付けられる
    let laser = helper
        .create_subscription(&bundle, "Laser-Scope", BillingPeriod::Monthly, DEFAULT_PRICE_LIST_NAME, None)
        .await
        .unwrap();
    assert_eq!(laser.phase_name(), Some("laser-scope-monthly-discount"));
    helper
        .check_next_phase_change(&laser, 1, Some(plus_months(helper.now(), 1)))
        .await;

    let subscriptions = app
        .subscription_service
        .get_subscriptions_for_bundle(bundle.id)
        .await
        .unwrap();
    assert_eq!(subscriptions.len(), 2);
    assert!(subscriptions
        .iter()
        .all(|sub| sub.bundle_start_date == subscriptions[0].bundle_start_date));
}

#[tokio::test]
async fn test_original_creation_date_selects_catalog_version() {
    let app = setup_test_app().await;
    let listener = Arc::new(TestApiListener::new(&app.bus));
    let helper = TestSubscriptionHelper::new(&app, listener.clone());
    let (_, bundle) = helper.create_account_with_bundle("bundle-original-date").await;

    // 元の作成日は 2011-06-01 版より前、要求日はその後
    let original = Utc.with_ymd_and_hms(2011, 2, 1, 0, 0, 0).unwrap();
    let requested = Utc.with_ymd_and_hms(2011, 7, 1, 0, 0, 0).unwrap();
    let pistol = helper.get_product_specifier("Pistol", DEFAULT_PRICE_LIST_NAME, BillingPeriod::Monthly, None);

    listener.push_expected_events(&[NextEvent::Create, NextEvent::Phase]);
    let base = app
        .subscription_service
        .create_subscription(bundle.id, &pistol, Some(original), Some(requested))
        .await
        .unwrap();
    listener.assert_listener_status();

    let v1_plan = app.catalog.versions()[0].find_plan("pistol-monthly").unwrap();
    assert_eq!(base.plan_name(), Some(v1_plan.name.as_str()));
    assert_eq!(base.phase_name(), Some(v1_plan.final_phase.name.as_str()));
    assert_eq!(base.start_date, requested);
    assert_eq!(base.bundle_start_date, original);
    assert_eq!(base.current_phase_start(), Some(plus_days(requested, 30)));
    helper.check_next_phase_change(&base, 0, None).await;

    // Laser-Scope は v1 に無いので、元の作成日で引くと解決できない
    let laser = helper.get_product_specifier("Laser-Scope", DEFAULT_PRICE_LIST_NAME, BillingPeriod::Monthly, None);
    let result = app
        .subscription_service
        .create_subscription(bundle.id, &laser, Some(original), Some(requested))
        .await;
    assert!(matches!(
        result,
        Err(SubscriptionApiError::Catalog(
            CatalogError::ProductNotFound(_) | CatalogError::PlanNotFound(_)
        ))
    ));
    assert!(listener.is_completed());

    // 同じ要求日でも元の作成日が無ければ v2 で解決される
    listener.push_expected_events(&[NextEvent::Create, NextEvent::Phase]);
    let add_on = app
        .subscription_service
        .create_subscription(bundle.id, &laser, None, Some(requested))
        .await
        .unwrap();
    listener.assert_listener_status();
    assert_eq!(add_on.plan_name(), Some("laser-scope-monthly"));
    assert_eq!(add_on.bundle_start_date, original);
}
