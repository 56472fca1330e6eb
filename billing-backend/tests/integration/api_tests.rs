// tests/integration/api_tests.rs
use axum::http::StatusCode;
use serde_json::{json, Value};
use tower::ServiceExt;
use uuid::Uuid;

use crate::common::app_helper::{setup_test_app, TestApp};
use crate::common::request::{create_empty_request, create_request, read_json};
use crate::common::subscription_helper::{minus_days, plus_days};

/// API経由でアカウントとバンドルを作成し、(account_id, bundle_id) を返す
async fn create_account_and_bundle(app: &TestApp) -> (String, String) {
    let account = json!({
        "external_key": Uuid::new_v4().to_string(),
        "name": "Api Account",
        "email": "api@example.com",
        "currency": "USD"
    });
    let res = app
        .router
        .clone()
        .oneshot(create_request("POST", "/accounts", &account))
        .await
        .unwrap();
    assert_eq!(res.status(), StatusCode::CREATED);
    let body = read_json(res).await;
    let account_id = body["data"]["id"].as_str().unwrap().to_string();

    let res = app
        .router
        .clone()
        .oneshot(create_request(
            "POST",
            &format!("/accounts/{}/bundles", account_id),
            &json!({ "external_key": "api-bundle" }),
        ))
        .await
        .unwrap();
    assert_eq!(res.status(), StatusCode::CREATED);
    let body = read_json(res).await;
    let bundle_id = body["data"]["id"].as_str().unwrap().to_string();

    (account_id, bundle_id)
}

async fn create_subscription(app: &TestApp, bundle_id: &str, product: &str) -> Value {
    let payload = json!({
        "bundle_id": bundle_id,
        "plan": {
            "product_name": product,
            "category": "BASE",
            "billing_period": "MONTHLY"
        }
    });
    let res = app
        .router
        .clone()
        .oneshot(create_request("POST", "/subscriptions", &payload))
        .await
        .unwrap();
    assert_eq!(res.status(), StatusCode::CREATED);
    read_json(res).await
}

#[tokio::test]
async fn test_account_endpoints() {
    let app = setup_test_app().await;
    let (account_id, bundle_id) = create_account_and_bundle(&app).await;

    let res = app
        .router
        .clone()
        .oneshot(create_empty_request("GET", &format!("/accounts/{}", account_id)))
        .await
        .unwrap();
    assert_eq!(res.status(), StatusCode::OK);
    let body = read_json(res).await;
    assert!(body["success"].as_bool().unwrap());
    assert_eq!(body["data"]["currency"], "USD");

    let res = app
        .router
        .clone()
        .oneshot(create_empty_request(
            "GET",
            &format!("/accounts/{}/bundles", account_id),
        ))
        .await
        .unwrap();
    assert_eq!(res.status(), StatusCode::OK);
    let body = read_json(res).await;
    assert_eq!(body["data"].as_array().unwrap().len(), 1);
    assert_eq!(body["data"][0]["id"], bundle_id);

    // 同じキーのバンドルは作れない
    let res = app
        .router
        .clone()
        .oneshot(create_request(
            "POST",
            &format!("/accounts/{}/bundles", account_id),
            &json!({ "external_key": "api-bundle" }),
        ))
        .await
        .unwrap();
    assert_eq!(res.status(), StatusCode::CONFLICT);
}

#[tokio::test]
async fn test_invalid_account_payload_is_rejected() {
    let app = setup_test_app().await;
    let account = json!({
        "external_key": "",
        "name": "Api Account",
        "email": "not-an-email",
        "currency": "usd"
    });

    let res = app
        .router
        .clone()
        .oneshot(create_request("POST", "/accounts", &account))
        .await
        .unwrap();

    assert_eq!(res.status(), StatusCode::BAD_REQUEST);
    let body = read_json(res).await;
    assert!(!body["success"].as_bool().unwrap());
    let fields = body["validation_errors"].as_object().unwrap();
    assert!(fields.contains_key("external_key"));
    assert!(fields.contains_key("email"));
    assert!(fields.contains_key("currency"));
}

#[tokio::test]
async fn test_unknown_and_malformed_ids() {
    let app = setup_test_app().await;

    let res = app
        .router
        .clone()
        .oneshot(create_empty_request(
            "GET",
            &format!("/subscriptions/{}", Uuid::new_v4()),
        ))
        .await
        .unwrap();
    assert_eq!(res.status(), StatusCode::NOT_FOUND);

    let res = app
        .router
        .clone()
        .oneshot(create_empty_request("GET", "/subscriptions/not-a-uuid"))
        .await
        .unwrap();
    assert_eq!(res.status(), StatusCode::BAD_REQUEST);
}

#[tokio::test]
async fn test_subscription_lifecycle_endpoints() {
    let app = setup_test_app().await;
    let (_, bundle_id) = create_account_and_bundle(&app).await;
    let now = app.subscription_service.now();

    let body = create_subscription(&app, &bundle_id, "Shotgun").await;
    let subscription = &body["data"];
    assert_eq!(subscription["plan_name"], "shotgun-monthly");
    assert_eq!(subscription["phase_name"], "shotgun-monthly-trial");
    assert_eq!(subscription["state"], "ACTIVE");
    let id = subscription["id"].as_str().unwrap().to_string();

    // 保留中のイベントはトライアル終了のみ
    let res = app
        .router
        .clone()
        .oneshot(create_empty_request(
            "GET",
            &format!("/subscriptions/{}/events/pending", id),
        ))
        .await
        .unwrap();
    assert_eq!(res.status(), StatusCode::OK);
    let body = read_json(res).await;
    let pending = body["data"].as_array().unwrap();
    assert_eq!(pending.len(), 1);
    assert_eq!(pending[0]["event_type"], "PHASE");
    assert_eq!(pending[0]["phase_name"], "shotgun-monthly-evergreen");

    // CTDを設定して期末キャンセル
    let ctd = plus_days(now, 15);
    let res = app
        .router
        .clone()
        .oneshot(create_request(
            "PUT",
            &format!("/subscriptions/{}/charged_through_date", id),
            &json!({ "charged_through_date": ctd }),
        ))
        .await
        .unwrap();
    assert_eq!(res.status(), StatusCode::OK);

    let res = app
        .router
        .clone()
        .oneshot(create_empty_request(
            "DELETE",
            &format!("/subscriptions/{}?policy=END_OF_TERM", id),
        ))
        .await
        .unwrap();
    assert_eq!(res.status(), StatusCode::OK);
    let body = read_json(res).await;
    assert_eq!(body["data"]["state"], "ACTIVE");
    assert!(body["data"]["pending_cancel_date"].is_string());

    // キャンセル予約中の期末以降へのプラン変更は不可
    let change = json!({
        "plan": {
            "product_name": "Assault-Rifle",
            "category": "BASE",
            "billing_period": "MONTHLY"
        },
        "policy": "END_OF_TERM"
    });
    let res = app
        .router
        .clone()
        .oneshot(create_request(
            "PUT",
            &format!("/subscriptions/{}/plan", id),
            &change,
        ))
        .await
        .unwrap();
    assert_eq!(res.status(), StatusCode::CONFLICT);

    let res = app
        .router
        .clone()
        .oneshot(create_empty_request(
            "PUT",
            &format!("/subscriptions/{}/uncancel", id),
        ))
        .await
        .unwrap();
    assert_eq!(res.status(), StatusCode::OK);
    let body = read_json(res).await;
    assert!(body["data"]["pending_cancel_date"].is_null());

    let res = app
        .router
        .clone()
        .oneshot(create_request(
            "PUT",
            &format!("/subscriptions/{}/plan", id),
            &change,
        ))
        .await
        .unwrap();
    assert_eq!(res.status(), StatusCode::OK);
    let body = read_json(res).await;
    // 期末まではShotgunのまま
    assert_eq!(body["data"]["plan_name"], "shotgun-monthly");

    let res = app
        .router
        .clone()
        .oneshot(create_empty_request(
            "GET",
            &format!("/bundles/{}/subscriptions", bundle_id),
        ))
        .await
        .unwrap();
    assert_eq!(res.status(), StatusCode::OK);
    let body = read_json(res).await;
    assert_eq!(body["data"].as_array().unwrap().len(), 1);
}

#[tokio::test]
async fn test_create_subscription_errors() {
    let app = setup_test_app().await;
    let (_, bundle_id) = create_account_and_bundle(&app).await;

    // 未知のプロダクト
    let payload = json!({
        "bundle_id": bundle_id,
        "plan": {
            "product_name": "Crossbow",
            "category": "BASE",
            "billing_period": "MONTHLY"
        }
    });
    let res = app
        .router
        .clone()
        .oneshot(create_request("POST", "/subscriptions", &payload))
        .await
        .unwrap();
    assert_eq!(res.status(), StatusCode::NOT_FOUND);

    // 未来日の作成は不可
    let payload = json!({
        "bundle_id": bundle_id,
        "plan": {
            "product_name": "Pistol",
            "category": "BASE",
            "billing_period": "MONTHLY"
        },
        "requested_date": plus_days(app.subscription_service.now(), 2)
    });
    let res = app
        .router
        .clone()
        .oneshot(create_request("POST", "/subscriptions", &payload))
        .await
        .unwrap();
    assert_eq!(res.status(), StatusCode::BAD_REQUEST);

    create_subscription(&app, &bundle_id, "Pistol").await;
    let payload = json!({
        "bundle_id": bundle_id,
        "plan": {
            "product_name": "Shotgun",
            "category": "BASE",
            "billing_period": "ANNUAL"
        }
    });
    let res = app
        .router
        .clone()
        .oneshot(create_request("POST", "/subscriptions", &payload))
        .await
        .unwrap();
    assert_eq!(res.status(), StatusCode::CONFLICT);
}

#[tokio::test]
async fn test_migration_endpoint() {
    let app = setup_test_app().await;
    let (account_id, _) = create_account_and_bundle(&app).await;
    let start = minus_days(app.subscription_service.now(), 40);

    let payload = json!({
        "account_key": account_id,
        "bundles": [{
            "bundle_key": "12345",
            "subscriptions": [{
                "cases": [{
                    "plan": {
                        "product_name": "Assault-Rifle",
                        "category": "BASE",
                        "billing_period": "ANNUAL",
                        "phase_type": "EVERGREEN"
                    },
                    "effective_date": start,
                    "charged_through_date": plus_days(start, 365)
                }]
            }]
        }]
    });
    let res = app
        .router
        .clone()
        .oneshot(create_request("POST", "/migrations", &payload))
        .await
        .unwrap();
    assert_eq!(res.status(), StatusCode::CREATED);
    let body = read_json(res).await;
    assert_eq!(body["data"]["account_key"], account_id);
    let subscriptions = body["data"]["subscriptions"].as_array().unwrap();
    assert_eq!(subscriptions.len(), 1);
    assert_eq!(subscriptions[0]["plan_name"], "assault-rifle-annual");
    assert_eq!(subscriptions[0]["phase_name"], "assault-rifle-annual-evergreen");

    // 区間の無いサブスクリプションは入力検証で弾かれる
    let invalid = json!({
        "account_key": account_id,
        "bundles": [{ "bundle_key": "67890", "subscriptions": [{ "cases": [] }] }]
    });
    let res = app
        .router
        .clone()
        .oneshot(create_request("POST", "/migrations", &invalid))
        .await
        .unwrap();
    assert_eq!(res.status(), StatusCode::BAD_REQUEST);
}

#[tokio::test]
async fn test_catalog_endpoint() {
    let app = setup_test_app().await;

    let res = app
        .router
        .clone()
        .oneshot(create_empty_request("GET", "/catalog"))
        .await
        .unwrap();

    assert_eq!(res.status(), StatusCode::OK);
    let body = read_json(res).await;
    assert_eq!(body["data"]["catalog_name"], "Firearms");
    let versions = body["data"]["versions"].as_array().unwrap();
    assert_eq!(versions.len(), 2);
    assert!(versions[1]["products"]
        .as_array()
        .unwrap()
        .iter()
        .any(|product| product == "Laser-Scope"));
}
