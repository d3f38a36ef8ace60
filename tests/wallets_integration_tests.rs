//! Wallet custody endpoints: creation, the virtual issuer wallet, faucet
//! funding and balances.

mod common;

use std::sync::Arc;
use std::time::Duration;

use axum::{
    body::Body,
    http::{Request, StatusCode},
    Router,
};
use serde_json::{json, Value};
use tower::ServiceExt;

use tokenflow_backend::services::ledger::LedgerClient;

use crate::common::{build_state, fast_executor_config, setup_test_db, StubLedger, TEST_ISSUER_SEED};

async fn request_json(
    app: &Router,
    method: &str,
    uri: &str,
    body: Option<Value>,
) -> (StatusCode, Value) {
    let builder = Request::builder()
        .method(method)
        .uri(uri)
        .header("content-type", "application/json");
    let request = match body {
        Some(body) => builder.body(Body::from(body.to_string())).unwrap(),
        None => builder.body(Body::empty()).unwrap(),
    };

    let response = app.clone().oneshot(request).await.unwrap();
    let status = response.status();
    let bytes = axum::body::to_bytes(response.into_body(), usize::MAX)
        .await
        .unwrap();
    let value = if bytes.is_empty() {
        Value::Null
    } else {
        serde_json::from_slice(&bytes).unwrap()
    };
    (status, value)
}

async fn test_app() -> (Router, Arc<StubLedger>) {
    let db = setup_test_db().await;
    let stub = Arc::new(StubLedger::new());
    let app = tokenflow_backend::router(build_state(db, stub.clone(), fast_executor_config()));
    (app, stub)
}

#[tokio::test]
async fn test_create_and_get_wallet() {
    let (app, stub) = test_app().await;

    let (status, created) = request_json(&app, "POST", "/api/wallets", Some(json!({}))).await;
    assert_eq!(status, StatusCode::CREATED);
    let wallet_id = created["walletId"].as_str().unwrap();
    let address = created["address"].as_str().unwrap();
    assert!(address.starts_with('r'));
    // The seed must never appear in a response.
    assert!(created.get("seed").is_none());

    let (status, fetched) =
        request_json(&app, "GET", &format!("/api/wallets/{wallet_id}"), None).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(fetched["address"], created["address"]);

    // A caller-supplied seed pins the derived address.
    let seed = "sCallerProvidedSeed00000001";
    let (_, with_seed) =
        request_json(&app, "POST", "/api/wallets", Some(json!({ "seed": seed }))).await;
    assert_eq!(
        with_seed["address"].as_str().unwrap(),
        stub.derive_address(seed).unwrap()
    );
}

#[tokio::test]
async fn test_get_unknown_wallet_returns_404() {
    let (app, _) = test_app().await;
    let (status, body) = request_json(&app, "GET", "/api/wallets/missing-id", None).await;
    assert_eq!(status, StatusCode::NOT_FOUND);
    assert!(body["error"].as_str().unwrap().contains("missing-id"));
}

#[tokio::test]
async fn test_issuer_is_served_as_virtual_wallet() {
    let (app, stub) = test_app().await;

    let (status, body) = request_json(&app, "GET", "/api/wallets/issuer", None).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["walletId"], "issuer");
    assert_eq!(
        body["address"].as_str().unwrap(),
        stub.derive_address(TEST_ISSUER_SEED).unwrap()
    );
    // Virtual: nothing persisted, no timestamps.
    assert!(body.get("createdAt").is_none());
}

#[tokio::test]
async fn test_fund_wallet_and_reject_issuer_funding() {
    let (app, _) = test_app().await;

    let (_, created) = request_json(&app, "POST", "/api/wallets", Some(json!({}))).await;
    let wallet_id = created["walletId"].as_str().unwrap();

    let (status, body) = request_json(
        &app,
        "POST",
        &format!("/api/wallets/{wallet_id}/fund"),
        Some(json!({})),
    )
    .await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["funded"], true);

    let (status, _) =
        request_json(&app, "POST", "/api/wallets/issuer/fund", Some(json!({}))).await;
    assert_eq!(status, StatusCode::BAD_REQUEST);
}

#[tokio::test]
async fn test_balance_reports_unfunded_account_as_null() {
    let (app, _) = test_app().await;

    let (_, created) = request_json(&app, "POST", "/api/wallets", Some(json!({}))).await;
    let wallet_id = created["walletId"].as_str().unwrap();

    let (status, body) = request_json(
        &app,
        "GET",
        &format!("/api/wallets/{wallet_id}/balance"),
        None,
    )
    .await;
    assert_eq!(status, StatusCode::OK);
    assert!(body["balance"].is_null());

    request_json(
        &app,
        "POST",
        &format!("/api/wallets/{wallet_id}/fund"),
        Some(json!({})),
    )
    .await;

    let (_, body) = request_json(
        &app,
        "GET",
        &format!("/api/wallets/{wallet_id}/balance"),
        None,
    )
    .await;
    assert_eq!(body["balance"], "10000000");
}

#[tokio::test]
async fn test_health_endpoint() {
    let (app, _) = test_app().await;
    let (status, body) = request_json(&app, "GET", "/health", None).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["status"], "ok");
    assert!(body["timestamp"].as_str().is_some());
}

#[tokio::test]
async fn test_operations_list_by_wallet() {
    let (app, _) = test_app().await;

    let (_, created) = request_json(&app, "POST", "/api/wallets", Some(json!({}))).await;
    let wallet_id = created["walletId"].as_str().unwrap().to_string();

    request_json(
        &app,
        "POST",
        "/api/operations/mint",
        Some(json!({
            "idempotencyKey": "mint-list-1",
            "userWalletId": wallet_id,
            "amount": "10",
        })),
    )
    .await;

    // Give the background executor a moment to finish.
    tokio::time::sleep(Duration::from_millis(300)).await;

    let (status, body) = request_json(
        &app,
        "GET",
        &format!("/api/operations?wallet={wallet_id}"),
        None,
    )
    .await;
    assert_eq!(status, StatusCode::OK);
    let list = body.as_array().unwrap();
    assert_eq!(list.len(), 1);
    assert_eq!(list[0]["kind"], "MINT");
}
