//! HTTP contract tests for the transaction API.
//!
//! Runs the real router over an in-memory store through `axum-test`.

#![allow(clippy::expect_used)] // Test code uses expect for clear failure messages

use axum::http::{HeaderName, HeaderValue, StatusCode};
use axum_test::TestServer;
use serde_json::{Value, json};
use std::sync::Arc;
use tally_core::{Quantity, ResourceId, ResourceRecord, ResourceStore, SeedMode, StoreError};
use tally_runtime::{RetryPolicy, TransactionEngine};
use tally_testing::{InMemoryResourceStore, ScriptedStore};
use tally_web::{AppState, Profile, REQUEST_ID_HEADER, router};

async fn ledger_store() -> Arc<InMemoryResourceStore> {
    let store = Arc::new(InMemoryResourceStore::new());
    store
        .seed(
            vec![
                ResourceRecord::new(ResourceId::new(1), "alice", Quantity::new(10_000)),
                ResourceRecord::new(ResourceId::new(4), "charlie", Quantity::new(1_000)),
            ],
            SeedMode::InsertMissing,
        )
        .await
        .expect("seed should succeed");
    store
}

fn server(store: Arc<dyn ResourceStore>, profile: Profile) -> TestServer {
    let engine = TransactionEngine::new(store);
    TestServer::new(router(AppState::new(engine, profile))).expect("test server should start")
}

#[tokio::test]
async fn test_ledger_transaction_applies() {
    let store = ledger_store().await;
    let server = server(store.clone(), Profile::Ledger);

    let response = server
        .post("/transaction")
        .json(&json!({ "user_id": 1, "amount": 12.5 }))
        .await;

    response.assert_status(StatusCode::OK);
    let body: Value = response.json();
    assert_eq!(body["status"], "processed");
    assert_eq!(body["remaining_balance"], 87.5);
    assert_eq!(body["deducted"], 12.5);

    let record = store
        .get(ResourceId::new(1))
        .await
        .expect("get should succeed")
        .expect("record should exist");
    assert_eq!(record.quantity, Quantity::new(8_750));
}

#[tokio::test]
async fn test_insufficient_funds_is_400_and_balance_unchanged() {
    let store = ledger_store().await;
    let server = server(store.clone(), Profile::Ledger);

    let response = server
        .post("/transaction")
        .json(&json!({ "resource_id": 1, "amount": 1_000_000 }))
        .await;

    response.assert_status(StatusCode::BAD_REQUEST);
    let body: Value = response.json();
    assert_eq!(body["code"], "INSUFFICIENT_RESOURCE");

    let record = store
        .get(ResourceId::new(1))
        .await
        .expect("get should succeed")
        .expect("record should exist");
    assert_eq!(record.quantity, Quantity::new(10_000));
}

#[tokio::test]
async fn test_inventory_sellout_is_410() {
    let store = Arc::new(InMemoryResourceStore::new());
    store
        .seed(
            vec![ResourceRecord::new(ResourceId::new(1), "Item A", Quantity::new(1))],
            SeedMode::Reset,
        )
        .await
        .expect("seed should succeed");
    let server = server(store, Profile::Inventory);

    let first = server
        .post("/transaction")
        .json(&json!({ "resource_id": 1, "amount": 1 }))
        .await;
    first.assert_status(StatusCode::OK);
    assert_eq!(first.json::<Value>()["remaining_quantity"], 0);

    let second = server
        .post("/transaction")
        .json(&json!({ "resource_id": 1, "amount": 1 }))
        .await;
    second.assert_status(StatusCode::GONE);
}

#[tokio::test]
async fn test_invalid_requests_are_400() {
    let server = server(ledger_store().await, Profile::Ledger);

    for body in [
        json!({ "resource_id": 1, "amount": 0 }),
        json!({ "resource_id": 1, "amount": -5 }),
        json!({ "resource_id": 1, "amount": 0.001 }),
        json!({ "resource_id": 1, "amount": 12.345 }),
        json!({ "resource_id": 1, "amount": "ten" }),
        json!({ "amount": 5 }),
    ] {
        server
            .post("/transaction")
            .json(&body)
            .await
            .assert_status(StatusCode::BAD_REQUEST);
    }
}

#[tokio::test]
async fn test_fractional_tickets_are_400_and_stock_unchanged() {
    let store = Arc::new(InMemoryResourceStore::new());
    store
        .seed(
            vec![ResourceRecord::new(ResourceId::new(1), "Item A", Quantity::new(10))],
            SeedMode::Reset,
        )
        .await
        .expect("seed should succeed");
    let server = server(store.clone(), Profile::Inventory);

    for amount in [1.5, 0.5] {
        server
            .post("/transaction")
            .json(&json!({ "resource_id": 1, "amount": amount }))
            .await
            .assert_status(StatusCode::BAD_REQUEST);
    }

    let record = store
        .get(ResourceId::new(1))
        .await
        .expect("get should succeed")
        .expect("record should exist");
    assert_eq!(record.quantity, Quantity::new(10));
    assert!(
        store
            .receipts(ResourceId::new(1))
            .await
            .expect("receipts should load")
            .is_empty()
    );
}

#[tokio::test]
async fn test_unknown_resource_is_404() {
    let server = server(ledger_store().await, Profile::Ledger);

    let response = server
        .post("/transaction")
        .json(&json!({ "resource_id": 99, "amount": 1 }))
        .await;

    response.assert_status(StatusCode::NOT_FOUND);
    assert_eq!(response.json::<Value>()["code"], "NOT_FOUND");
}

#[tokio::test(start_paused = true)]
async fn test_busy_is_503() {
    let scripted = Arc::new(ScriptedStore::new(ledger_store().await, u32::MAX));
    let engine = TransactionEngine::new(scripted)
        .with_retry_policy(RetryPolicy::builder().max_attempts(2).build());
    let server =
        TestServer::new(router(AppState::new(engine, Profile::Ledger))).expect("server starts");

    let response = server
        .post("/transaction")
        .json(&json!({ "resource_id": 1, "amount": 1 }))
        .await;

    response.assert_status(StatusCode::SERVICE_UNAVAILABLE);
}

#[tokio::test]
async fn test_store_failure_is_500_without_details() {
    let scripted = Arc::new(ScriptedStore::failing(
        ledger_store().await,
        StoreError::Database("password authentication failed".to_string()),
    ));
    let server = server(scripted, Profile::Ledger);

    let response = server
        .post("/transaction")
        .json(&json!({ "resource_id": 1, "amount": 1 }))
        .await;

    response.assert_status(StatusCode::INTERNAL_SERVER_ERROR);
    assert!(!response.text().contains("password"));
}

#[tokio::test]
async fn test_get_resource() {
    let server = server(ledger_store().await, Profile::Ledger);

    let response = server.get("/resources/4").await;
    response.assert_status(StatusCode::OK);
    let body: Value = response.json();
    assert_eq!(body["name"], "charlie");
    assert_eq!(body["quantity"], 10.0);

    server
        .get("/resources/99")
        .await
        .assert_status(StatusCode::NOT_FOUND);
}

#[tokio::test]
async fn test_health_and_request_id() {
    let server = server(ledger_store().await, Profile::Ledger);

    let response = server
        .get("/health")
        .add_header(
            HeaderName::from_static("x-request-id"),
            HeaderValue::from_static("probe-1"),
        )
        .await;
    response.assert_status(StatusCode::OK);
    assert_eq!(
        response
            .headers()
            .get(REQUEST_ID_HEADER)
            .expect("request id should be echoed"),
        "probe-1"
    );

    server
        .get("/health/ready")
        .await
        .assert_status(StatusCode::OK);
}
