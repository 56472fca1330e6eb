// tests/integration/migration/validation_tests.rs

use crate::common::api_listener::TestApiListener;
use crate::common::app_helper::setup_test_app;
use crate::common::subscription_helper::{minus_days, plus_days, TestSubscriptionHelper};
use billing_backend::catalog::{BillingPeriod, PhaseType, DEFAULT_PRICE_LIST_NAME};
use billing_backend::domain::migration::{AccountMigration, SubscriptionMigrationCase};
use billing_backend::error::SubscriptionApiError;
use std::sync::Arc;
use uuid::Uuid;

fn case(
    helper: &TestSubscriptionHelper,
    product: &str,
    term: BillingPeriod,
    phase_type: PhaseType,
    effective: chrono::DateTime<chrono::Utc>,
) -> SubscriptionMigrationCase {
    SubscriptionMigrationCase::new(
        helper.get_product_specifier(product, DEFAULT_PRICE_LIST_NAME, term, Some(phase_type)),
        effective,
        None,
        None,
    )
}

#[tokio::test]
async fn test_migration_for_unknown_account_fails() {
    let app = setup_test_app().await;
    let migration = AccountMigration {
        account_key: Uuid::new_v4(),
        bundles: vec![],
    };

    let result = app.migration_service.migrate(&migration).await;

    assert!(matches!(result, Err(SubscriptionApiError::AccountNotFound(_))));
}

#[tokio::test]
async fn test_existing_bundle_key_is_rejected() {
    let app = setup_test_app().await;
    let listener = Arc::new(TestApiListener::new(&app.bus));
    let helper = TestSubscriptionHelper::new(&app, listener.clone());

    let migration = helper
        .create_account_for_migration_with_regular_base_plan(minus_days(helper.now(), 30))
        .await;
    helper.migrate(&migration).await.unwrap();

    let result = app.migration_service.migrate(&migration).await;
    assert!(matches!(
        result,
        Err(SubscriptionApiError::BundleKeyExists(ref key)) if key == "12345"
    ));
    listener.assert_listener_status();
}

#[tokio::test]
async fn test_add_on_without_base_is_rejected_before_any_write() {
    let app = setup_test_app().await;
    let listener = Arc::new(TestApiListener::new(&app.bus));
    let helper = TestSubscriptionHelper::new(&app, listener.clone());
    let start = minus_days(helper.now(), 30);

    let migration = helper
        .create_account_for_migration_test(vec![vec![case(
            &helper,
            "Telescopic-Scope",
            BillingPeriod::Monthly,
            PhaseType::Evergreen,
            start,
        )]])
        .await;

    let result = app.migration_service.migrate(&migration).await;
    assert!(matches!(result, Err(SubscriptionApiError::InvalidMigration(_))));

    // バンドルも作られていない
    let bundles = app
        .account_service
        .get_bundles_for_account(migration.account_key)
        .await
        .unwrap();
    assert!(bundles.is_empty());
    listener.assert_listener_status();
}

#[tokio::test]
async fn test_add_on_not_available_for_base_is_rejected() {
    let app = setup_test_app().await;
    let listener = Arc::new(TestApiListener::new(&app.bus));
    let helper = TestSubscriptionHelper::new(&app, listener.clone());
    let start = minus_days(helper.now(), 30);

    let migration = helper
        .create_account_for_migration_test(vec![
            vec![case(&helper, "Pistol", BillingPeriod::Monthly, PhaseType::Evergreen, start)],
            vec![case(
                &helper,
                "Telescopic-Scope",
                BillingPeriod::Monthly,
                PhaseType::Evergreen,
                start,
            )],
        ])
        .await;

    let result = app.migration_service.migrate(&migration).await;
    assert!(matches!(
        result,
        Err(SubscriptionApiError::AddOnNotAvailable { .. })
    ));
}

#[tokio::test]
async fn test_cases_out_of_order_are_rejected() {
    let app = setup_test_app().await;
    let listener = Arc::new(TestApiListener::new(&app.bus));
    let helper = TestSubscriptionHelper::new(&app, listener.clone());
    let start = minus_days(helper.now(), 30);

    let migration = helper
        .create_account_for_migration_test(vec![vec![
            case(&helper, "Shotgun", BillingPeriod::Monthly, PhaseType::Evergreen, start),
            case(
                &helper,
                "Pistol",
                BillingPeriod::Monthly,
                PhaseType::Evergreen,
                minus_days(start, 1),
            ),
        ]])
        .await;

    let result = app.migration_service.migrate(&migration).await;
    assert!(matches!(
        result,
        Err(SubscriptionApiError::InvalidMigration(ref reason)) if reason.contains("strictly increasing")
    ));
}

#[tokio::test]
async fn test_unknown_phase_of_plan_is_rejected() {
    let app = setup_test_app().await;
    let listener = Arc::new(TestApiListener::new(&app.bus));
    let helper = TestSubscriptionHelper::new(&app, listener.clone());

    // refurbish-maintenance にはトライアルが無い
    let migration = helper
        .create_account_for_migration_test(vec![vec![case(
            &helper,
            "Refurbish-Maintenance",
            BillingPeriod::Monthly,
            PhaseType::Trial,
            plus_days(helper.now(), 1),
        )]])
        .await;

    let result = app.migration_service.migrate(&migration).await;
    assert!(matches!(result, Err(SubscriptionApiError::Catalog(_))));
}
