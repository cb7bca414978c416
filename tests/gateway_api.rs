//! HTTP surface tests: the request contract of §auth/balance/orders/
//! inventory endpoints, error envelope shape, and the gateway header
//! contract, all over the in-memory store.

use std::sync::Arc;

use axum::body::{to_bytes, Body};
use axum::http::{Request, StatusCode};
use axum::Router;
use serde_json::{json, Value};
use tower::ServiceExt;

use cnop::entities::Asset;
use cnop::gateway::{self, AppState};
use cnop::store::MemoryStore;

const PASSWORD: &str = "Str0ngPass!23";

fn test_state() -> AppState {
    AppState::new(Arc::new(MemoryStore::new()), "test-secret")
}

fn app(state: &AppState) -> Router {
    gateway::router(state.clone())
}

async fn seed_btc(state: &AppState) {
    state
        .assets
        .seed(Asset {
            asset_id: "BTC".to_string(),
            name: "Bitcoin".to_string(),
            category: "major".to_string(),
            price_usd: "10000.00".parse().unwrap(),
            amount: "1000".parse().unwrap(),
            is_active: true,
        })
        .await
        .unwrap();
}

async fn call(
    app: Router,
    method: &str,
    uri: &str,
    headers: &[(&str, &str)],
    body: Option<Value>,
) -> (StatusCode, Value) {
    let mut builder = Request::builder().method(method).uri(uri);
    for (name, value) in headers {
        builder = builder.header(*name, *value);
    }
    let request = match body {
        Some(json) => builder
            .header("content-type", "application/json")
            .body(Body::from(json.to_string()))
            .unwrap(),
        None => builder.body(Body::empty()).unwrap(),
    };

    let response = app.oneshot(request).await.unwrap();
    let status = response.status();
    let bytes = to_bytes(response.into_body(), usize::MAX).await.unwrap();
    let value = if bytes.is_empty() {
        Value::Null
    } else {
        serde_json::from_slice(&bytes).unwrap_or(Value::String(
            String::from_utf8_lossy(&bytes).to_string(),
        ))
    };
    (status, value)
}

fn register_body(username: &str, email: &str) -> Value {
    json!({
        "username": username,
        "email": email,
        "password": PASSWORD,
        "first_name": "Alice",
        "last_name": "Nakamoto",
    })
}

async fn register(state: &AppState, username: &str) {
    let (status, _) = call(
        app(state),
        "POST",
        "/auth/register",
        &[],
        Some(register_body(username, &format!("{username}@example.com"))),
    )
    .await;
    assert_eq!(status, StatusCode::CREATED);
}

async fn login(state: &AppState, username: &str) -> String {
    let (status, body) = call(
        app(state),
        "POST",
        "/auth/login",
        &[],
        Some(json!({ "username": username, "password": PASSWORD })),
    )
    .await;
    assert_eq!(status, StatusCode::OK);
    body["access_token"].as_str().unwrap().to_string()
}

#[tokio::test]
async fn register_returns_201_with_a_zero_balance_and_no_hash() {
    let state = test_state();

    let (status, body) = call(
        app(&state),
        "POST",
        "/auth/register",
        &[],
        Some(register_body("alice", "alice@example.com")),
    )
    .await;
    assert_eq!(status, StatusCode::CREATED);
    assert_eq!(body["username"], "alice");
    assert_eq!(body["role"], "customer");
    assert!(body.get("password_hash").is_none());
    assert!(body.get("password").is_none());

    let token = login(&state, "alice").await;
    let (status, body) = call(
        app(&state),
        "GET",
        "/balance",
        &[("authorization", &format!("Bearer {token}"))],
        None,
    )
    .await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["current_balance"], "0.00");
}

#[tokio::test]
async fn duplicate_email_is_409_and_the_first_user_is_unchanged() {
    let state = test_state();
    register(&state, "alice").await;

    let (status, body) = call(
        app(&state),
        "POST",
        "/auth/register",
        &[],
        Some(register_body("alice2", "alice@example.com")),
    )
    .await;
    assert_eq!(status, StatusCode::CONFLICT);
    assert_eq!(body["kind"], "EntityAlreadyExists");

    // First user still logs in and reads a zero balance.
    let token = login(&state, "alice").await;
    let (status, body) = call(
        app(&state),
        "GET",
        "/auth/me",
        &[("authorization", &format!("Bearer {token}"))],
        None,
    )
    .await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["email"], "alice@example.com");
}

#[tokio::test]
async fn weak_passwords_are_rejected_with_422() {
    let state = test_state();
    let mut body = register_body("alice", "alice@example.com");
    body["password"] = json!("short1!A");

    let (status, body) = call(app(&state), "POST", "/auth/register", &[], Some(body)).await;
    assert_eq!(status, StatusCode::UNPROCESSABLE_ENTITY);
    assert_eq!(body["kind"], "ValidationError");
}

#[tokio::test]
async fn deposit_and_overdraw_through_the_gateway_header_contract() {
    let state = test_state();
    register(&state, "alice").await;

    let gateway_headers: &[(&str, &str)] = &[
        ("x-authenticated", "true"),
        ("x-user-name", "alice"),
        ("x-user-role", "customer"),
        ("x-request-id", "req-test-42"),
    ];

    let (status, body) = call(
        app(&state),
        "POST",
        "/balance/deposit",
        gateway_headers,
        Some(json!({ "amount": "100.00" })),
    )
    .await;
    assert_eq!(status, StatusCode::CREATED);
    assert_eq!(body["balance"]["current_balance"], "100.00");
    assert_eq!(body["transaction_type"], "DEPOSIT");

    let (status, body) = call(
        app(&state),
        "POST",
        "/balance/withdraw",
        gateway_headers,
        Some(json!({ "amount": "150.00" })),
    )
    .await;
    assert_eq!(status, StatusCode::BAD_REQUEST);
    assert_eq!(body["kind"], "InsufficientBalance");
    // The envelope echoes the correlation id the gateway sent.
    assert_eq!(body["request_id"], "req-test-42");
}

#[tokio::test]
async fn missing_credentials_are_401() {
    let state = test_state();
    let (status, body) = call(app(&state), "GET", "/balance", &[], None).await;
    assert_eq!(status, StatusCode::UNAUTHORIZED);
    assert_eq!(body["kind"], "InvalidCredentials");
}

#[tokio::test]
async fn order_lifecycle_and_ownership_checks() {
    let state = test_state();
    seed_btc(&state).await;
    register(&state, "alice").await;
    register(&state, "mallory").await;
    let alice = login(&state, "alice").await;
    let mallory = login(&state, "mallory").await;
    let alice_auth = format!("Bearer {alice}");
    let mallory_auth = format!("Bearer {mallory}");

    call(
        app(&state),
        "POST",
        "/balance/deposit",
        &[("authorization", &alice_auth)],
        Some(json!({ "amount": "200.00" })),
    )
    .await;

    let (status, body) = call(
        app(&state),
        "POST",
        "/orders",
        &[("authorization", &alice_auth)],
        Some(json!({
            "order_type": "market_buy",
            "asset_id": "BTC",
            "quantity": "0.01",
            "price": "10000.00",
        })),
    )
    .await;
    assert_eq!(status, StatusCode::CREATED);
    assert_eq!(body["order"]["status"], "COMPLETED");
    assert_eq!(body["balance"]["current_balance"], "100.00");
    let order_id = body["order"]["order_id"].as_str().unwrap().to_string();

    // Owner reads it back; a stranger gets 403.
    let (status, body) = call(
        app(&state),
        "GET",
        &format!("/orders/{order_id}"),
        &[("authorization", &alice_auth)],
        None,
    )
    .await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["asset_id"], "BTC");

    let (status, body) = call(
        app(&state),
        "GET",
        &format!("/orders/{order_id}"),
        &[("authorization", &mallory_auth)],
        None,
    )
    .await;
    assert_eq!(status, StatusCode::FORBIDDEN);
    assert_eq!(body["kind"], "AccessDenied");

    let (status, body) = call(
        app(&state),
        "GET",
        "/users/alice/orders",
        &[("authorization", &alice_auth)],
        None,
    )
    .await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body.as_array().unwrap().len(), 1);

    let (status, _) = call(
        app(&state),
        "GET",
        "/users/alice/orders",
        &[("authorization", &mallory_auth)],
        None,
    )
    .await;
    assert_eq!(status, StatusCode::FORBIDDEN);
}

#[tokio::test]
async fn unknown_order_type_is_422_and_zero_quantity_rejected() {
    let state = test_state();
    seed_btc(&state).await;
    register(&state, "alice").await;
    let token = login(&state, "alice").await;
    let auth = format!("Bearer {token}");

    let (status, body) = call(
        app(&state),
        "POST",
        "/orders",
        &[("authorization", &auth)],
        Some(json!({
            "order_type": "stop_loss",
            "asset_id": "BTC",
            "quantity": "1",
            "price": "10.00",
        })),
    )
    .await;
    assert_eq!(status, StatusCode::UNPROCESSABLE_ENTITY);
    assert_eq!(body["kind"], "ValidationError");

    let (status, body) = call(
        app(&state),
        "POST",
        "/orders",
        &[("authorization", &auth)],
        Some(json!({
            "order_type": "market_buy",
            "asset_id": "BTC",
            "quantity": "0",
            "price": "10.00",
        })),
    )
    .await;
    assert_eq!(status, StatusCode::UNPROCESSABLE_ENTITY);
    assert_eq!(body["kind"], "ValidationError");
}

#[tokio::test]
async fn inventory_is_public_and_filters_inactive() {
    let state = test_state();
    seed_btc(&state).await;
    state
        .assets
        .seed(Asset {
            asset_id: "DEAD".to_string(),
            name: "Delisted".to_string(),
            category: "altcoin".to_string(),
            price_usd: "0".parse().unwrap(),
            amount: "0".parse().unwrap(),
            is_active: false,
        })
        .await
        .unwrap();

    let (status, body) = call(app(&state), "GET", "/inventory", &[], None).await;
    assert_eq!(status, StatusCode::OK);
    let assets = body.as_array().unwrap();
    assert_eq!(assets.len(), 1);
    assert_eq!(assets[0]["asset_id"], "BTC");

    let (status, _) = call(app(&state), "GET", "/inventory/BTC", &[], None).await;
    assert_eq!(status, StatusCode::OK);
    let (status, body) = call(app(&state), "GET", "/inventory/GHOST", &[], None).await;
    assert_eq!(status, StatusCode::NOT_FOUND);
    assert_eq!(body["kind"], "EntityNotFound");
}

#[tokio::test]
async fn profile_update_is_visible_on_the_next_read() {
    let state = test_state();
    register(&state, "alice").await;
    let token = login(&state, "alice").await;
    let auth = format!("Bearer {token}");

    let (status, _) = call(
        app(&state),
        "PUT",
        "/auth/me",
        &[("authorization", &auth)],
        Some(json!({ "first_name": "Alicia", "marketing_emails_consent": true })),
    )
    .await;
    assert_eq!(status, StatusCode::OK);

    let (status, body) = call(
        app(&state),
        "GET",
        "/auth/me",
        &[("authorization", &auth)],
        None,
    )
    .await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["first_name"], "Alicia");
    assert_eq!(body["marketing_emails_consent"], true);
    // Identity fields unchanged.
    assert_eq!(body["username"], "alice");
}
