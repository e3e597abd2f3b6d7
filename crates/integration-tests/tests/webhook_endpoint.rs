//! Webhook endpoint through the axum router.
//!
//! Requests go through `tower::ServiceExt::oneshot`; no socket is bound.

#![allow(clippy::unwrap_used)]

use axum::Router;
use axum::body::Body;
use axum::http::{Request, StatusCode};
use chrono::Utc;
use dropline_core::OrderStatus;
use dropline_integration_tests::{
    Harness, MemoryStore, RecordingCrm, RecordingFulfillment, TEST_SECRET, checkout_event,
    checkout_session, sign, sign_now,
};
use serde_json::{Value, json};
use tower::ServiceExt;

fn app(harness: &Harness) -> Router {
    dropline_webhooks::app(harness.app_state())
}

fn webhook_request(body: &[u8], signature: Option<&str>) -> Request<Body> {
    let mut builder = Request::builder()
        .method("POST")
        .uri("/webhooks/stripe")
        .header("content-type", "application/json");
    if let Some(signature) = signature {
        builder = builder.header("stripe-signature", signature);
    }
    builder.body(Body::from(body.to_vec())).unwrap()
}

async fn send(app: Router, request: Request<Body>) -> (StatusCode, Value) {
    let response = app.oneshot(request).await.unwrap();
    let status = response.status();
    let bytes = axum::body::to_bytes(response.into_body(), usize::MAX)
        .await
        .unwrap();
    let body = serde_json::from_slice(&bytes).unwrap_or(Value::Null);
    (status, body)
}

fn checkout_payload(session_id: &str) -> Vec<u8> {
    checkout_event(&checkout_session(
        session_id,
        "a@b.com",
        &json!([{ "sku": "X", "qty": 2 }]),
        4990,
    ))
    .to_string()
    .into_bytes()
}

// ============================================================================
// Authentication gate
// ============================================================================

#[tokio::test]
async fn test_signed_checkout_is_acknowledged() {
    let harness = Harness::new();
    harness.store.add_product("X", 5, Some("vid-x"));
    let payload = checkout_payload("cs_http_ok");

    let (status, body) = send(app(&harness), webhook_request(&payload, Some(&sign_now(&payload)))).await;

    assert_eq!(status, StatusCode::OK);
    assert_eq!(body, json!({ "received": true }));
    let orders = harness.store.orders();
    assert_eq!(orders.len(), 1);
    assert_eq!(orders[0].status, OrderStatus::Paid);
    assert_eq!(harness.store.stock("X"), Some(3));
}

#[tokio::test]
async fn test_invalid_signature_has_no_side_effects() {
    let harness = Harness::new();
    harness.store.add_product("X", 5, Some("vid-x"));
    let payload = checkout_payload("cs_http_forged");
    let forged = sign("whsec_attacker_Zq81mVx", Utc::now().timestamp(), &payload);

    let (status, body) = send(app(&harness), webhook_request(&payload, Some(&forged))).await;

    assert_eq!(status, StatusCode::BAD_REQUEST);
    assert!(body["error"].as_str().unwrap().contains("authentication failed"));
    assert!(harness.store.orders().is_empty());
    assert!(harness.store.customers().is_empty());
    assert_eq!(harness.store.stock("X"), Some(5));
    assert!(harness.fulfillment.requests().is_empty());
    assert!(harness.klaviyo.contacts().is_empty());
    assert!(harness.brevo.contacts().is_empty());
    assert!(harness.email.messages().is_empty());
}

#[tokio::test]
async fn test_missing_signature_rejected() {
    let harness = Harness::new();
    let payload = checkout_payload("cs_http_unsigned");

    let (status, _) = send(app(&harness), webhook_request(&payload, None)).await;

    assert_eq!(status, StatusCode::BAD_REQUEST);
    assert!(harness.store.orders().is_empty());
}

#[tokio::test]
async fn test_stale_signature_rejected() {
    let harness = Harness::new();
    let payload = checkout_payload("cs_http_stale");
    let stale = sign(TEST_SECRET, Utc::now().timestamp() - 3600, &payload);

    let (status, _) = send(app(&harness), webhook_request(&payload, Some(&stale))).await;

    assert_eq!(status, StatusCode::BAD_REQUEST);
    assert!(harness.store.orders().is_empty());
}

#[tokio::test]
async fn test_signed_malformed_json_rejected() {
    let harness = Harness::new();
    let payload = b"{\"id\": \"evt_1\", \"type\":";

    let (status, body) = send(app(&harness), webhook_request(payload, Some(&sign_now(payload)))).await;

    assert_eq!(status, StatusCode::BAD_REQUEST);
    assert!(body["error"].as_str().unwrap().contains("malformed payload"));
}

// ============================================================================
// Routing
// ============================================================================

#[tokio::test]
async fn test_unknown_event_is_acknowledged() {
    let harness = Harness::new();
    let payload = br#"{"id":"evt_9","type":"customer.created","data":{"object":{"id":"cus_1"}}}"#;

    let (status, body) = send(app(&harness), webhook_request(payload, Some(&sign_now(payload)))).await;

    assert_eq!(status, StatusCode::OK);
    assert_eq!(body, json!({ "received": true }));
    assert!(harness.store.orders().is_empty());
}

#[tokio::test]
async fn test_payment_intent_is_acknowledged_without_order() {
    let harness = Harness::new();
    let payload = json!({
        "id": "evt_pi",
        "type": "payment_intent.succeeded",
        "data": { "object": { "id": "pi_1", "amount_received": 4990, "currency": "usd" } }
    })
    .to_string()
    .into_bytes();

    let (status, _) = send(app(&harness), webhook_request(&payload, Some(&sign_now(&payload)))).await;

    assert_eq!(status, StatusCode::OK);
    assert!(harness.store.orders().is_empty());
    assert!(harness.email.messages().is_empty());
}

// ============================================================================
// Non-blocking failures
// ============================================================================

#[tokio::test]
async fn test_dispatch_failure_still_returns_ok() {
    let store = MemoryStore::new();
    store.add_product("X", 5, Some("vid-x"));
    let harness = Harness::with(store, RecordingFulfillment::failing(), RecordingCrm::failing());
    let payload = checkout_payload("cs_http_partial");

    let (status, body) = send(app(&harness), webhook_request(&payload, Some(&sign_now(&payload)))).await;

    assert_eq!(status, StatusCode::OK);
    assert_eq!(body, json!({ "received": true }));
    assert_eq!(harness.store.orders()[0].status, OrderStatus::Paid);
    assert_eq!(harness.fulfillment.requests().len(), 1);
}

#[tokio::test]
async fn test_store_failure_still_returns_ok() {
    let harness = Harness::new();
    harness.store.fail_orders();
    let payload = checkout_payload("cs_http_store_down");

    let (status, body) = send(app(&harness), webhook_request(&payload, Some(&sign_now(&payload)))).await;

    assert_eq!(status, StatusCode::OK);
    assert_eq!(body, json!({ "received": true }));
    assert_eq!(harness.email.messages().len(), 1);
}

#[tokio::test]
async fn test_redelivery_over_http() {
    let store = MemoryStore::new();
    store.add_product("X", 1, None);
    let harness = Harness::with(store, RecordingFulfillment::new(), RecordingCrm::new());
    let payload = checkout_payload("cs_1");

    for _ in 0..2 {
        let (status, body) =
            send(app(&harness), webhook_request(&payload, Some(&sign_now(&payload)))).await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(body, json!({ "received": true }));
    }

    assert_eq!(harness.store.orders().len(), 1);
    assert_eq!(harness.store.orders()[0].status, OrderStatus::Paid);
    assert_eq!(harness.store.stock("X"), Some(1));
    assert!(harness.fulfillment.requests().is_empty());
}

// ============================================================================
// Health
// ============================================================================

#[tokio::test]
async fn test_health_endpoints() {
    let harness = Harness::new();

    let response = app(&harness)
        .oneshot(Request::get("/health").body(Body::empty()).unwrap())
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::OK);

    let response = app(&harness)
        .oneshot(Request::get("/health/ready").body(Body::empty()).unwrap())
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::OK);
}
