//! Ticket sales over HTTP against the in-memory store.
//!
//! Run with: `cargo test -p ticketing --test ticket_sales`

#![allow(clippy::expect_used)] // Test code uses expect for clear failure messages

use axum::{
    Router,
    body::Body,
    http::{Method, Request, StatusCode},
};
use axum_test::TestServer;
use serde_json::Value;
use std::sync::Arc;
use tally_core::{Quantity, ResourceId, ResourceRecord, ResourceStore, SeedMode};
use tally_runtime::TransactionEngine;
use tally_testing::{InMemoryResourceStore, NoLatency};
use ticketing::TicketingState;
use tower::ServiceExt;

const ITEM: ResourceId = ResourceId::new(1);

async fn stocked_store(stock: u64) -> Arc<InMemoryResourceStore> {
    let store = Arc::new(InMemoryResourceStore::new());
    store
        .seed(
            vec![ResourceRecord::new(ITEM, "Item A", Quantity::new(stock))],
            SeedMode::Reset,
        )
        .await
        .expect("seed should succeed");
    store
}

fn app(store: Arc<InMemoryResourceStore>) -> Router {
    let engine = TransactionEngine::new(store).with_upstream(Arc::new(NoLatency));
    ticketing::app(TicketingState::new(engine, ITEM))
}

#[tokio::test]
async fn test_buy_ticket_then_sold_out() {
    let server = TestServer::new(app(stocked_store(1).await)).expect("test server should start");

    let first = server.post("/buy_ticket").await;
    first.assert_status(StatusCode::OK);
    let body: Value = first.json();
    assert_eq!(body["message"], "Purchase successful");
    assert_eq!(body["remaining_quantity"], 0);

    let second = server.post("/buy_ticket").await;
    second.assert_status(StatusCode::GONE);
    assert_eq!(second.json::<Value>()["message"], "Item sold out");
}

#[tokio::test]
async fn test_inventory_reports_remaining_stock() {
    let server = TestServer::new(app(stocked_store(100).await)).expect("test server should start");

    server.post("/buy_ticket").await.assert_status(StatusCode::OK);
    server.post("/buy_ticket").await.assert_status(StatusCode::OK);

    let response = server.get("/inventory").await;
    response.assert_status(StatusCode::OK);
    let body: Value = response.json();
    assert_eq!(body["id"], 1);
    assert_eq!(body["name"], "Item A");
    assert_eq!(body["quantity"], 98);
}

#[tokio::test]
async fn test_unseeded_item_is_404() {
    let store = Arc::new(InMemoryResourceStore::new());
    let server = TestServer::new(app(store)).expect("test server should start");

    server
        .post("/buy_ticket")
        .await
        .assert_status(StatusCode::NOT_FOUND);
    server
        .get("/inventory")
        .await
        .assert_status(StatusCode::NOT_FOUND);
}

#[tokio::test]
async fn test_generic_transaction_route_uses_inventory_profile() {
    let server = TestServer::new(app(stocked_store(3).await)).expect("test server should start");

    let response = server
        .post("/transaction")
        .json(&serde_json::json!({ "resource_id": 1, "amount": 3 }))
        .await;
    response.assert_status(StatusCode::OK);
    assert_eq!(response.json::<Value>()["remaining_quantity"], 0);

    server
        .post("/buy_ticket")
        .await
        .assert_status(StatusCode::GONE);
}

/// 200 buyers race for 100 tickets: exactly 100 succeed, none oversold.
#[tokio::test(flavor = "multi_thread", worker_threads = 8)]
async fn test_two_hundred_buyers_for_one_hundred_tickets() {
    let store = stocked_store(100).await;
    let app = app(store.clone());

    let handles: Vec<_> = (0..200)
        .map(|_| {
            let app = app.clone();
            tokio::spawn(async move {
                let request = Request::builder()
                    .method(Method::POST)
                    .uri("/buy_ticket")
                    .body(Body::empty())
                    .expect("request should build");
                app.oneshot(request)
                    .await
                    .expect("router is infallible")
                    .status()
            })
        })
        .collect();

    let mut sold: u64 = 0;
    let mut sold_out: u64 = 0;
    for handle in handles {
        match handle.await.expect("buyer task should not panic") {
            StatusCode::OK => sold += 1,
            StatusCode::GONE => sold_out += 1,
            other => assert_eq!(other, StatusCode::OK, "unexpected status"),
        }
    }

    assert_eq!(sold, 100);
    assert_eq!(sold_out, 100);

    let record = store
        .get(ITEM)
        .await
        .expect("get should succeed")
        .expect("item should exist");
    assert_eq!(record.quantity, Quantity::ZERO);

    let receipts = store.receipts(ITEM).await.expect("receipts should load");
    let receipted: u64 = receipts.iter().map(|r| r.amount.units()).sum();
    assert_eq!(receipted, 100);
}
