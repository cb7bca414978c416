//! HTTP gateway over the transactional core.
//!
//! Handlers are thin: decode, authenticate, call into the DAOs or the
//! transaction manager, encode. All money and asset movement goes through
//! `txn`; nothing here touches the store schema.

pub mod extract;
pub mod handlers;
pub mod response;
pub mod state;

use axum::routing::{get, post};
use axum::Router;

pub use state::AppState;

pub fn router(state: AppState) -> Router {
    Router::new()
        .route("/health", get(health))
        .route("/auth/register", post(handlers::auth::register))
        .route("/auth/login", post(handlers::auth::login))
        .route(
            "/auth/me",
            get(handlers::auth::me).put(handlers::auth::update_me),
        )
        .route("/balance", get(handlers::balance::get_balance))
        .route("/balance/deposit", post(handlers::balance::deposit))
        .route("/balance/withdraw", post(handlers::balance::withdraw))
        .route(
            "/balance/transactions",
            get(handlers::balance::list_transactions),
        )
        .route(
            "/assets/balances",
            get(handlers::balance::list_asset_balances),
        )
        .route("/orders", post(handlers::orders::create_order))
        .route("/orders/{order_id}", get(handlers::orders::get_order))
        .route(
            "/users/{username}/orders",
            get(handlers::orders::list_orders),
        )
        .route("/inventory", get(handlers::inventory::list_assets))
        .route("/inventory/{asset_id}", get(handlers::inventory::get_asset))
        .with_state(state)
}

async fn health() -> &'static str {
    "ok"
}
