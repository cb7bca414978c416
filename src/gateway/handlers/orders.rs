//! Order handlers: creation dispatches into the transaction manager,
//! reads enforce ownership.

use axum::extract::{Json, Path, Query, State};
use rust_decimal::Decimal;
use serde::Deserialize;

use crate::entities::{Order, OrderType};
use crate::error::CoreError;
use crate::gateway::extract::{AuthUser, RequestContext};
use crate::gateway::response::{created, ok, ApiError, ApiResult};
use crate::gateway::state::AppState;
use crate::txn::TransactionResult;

#[derive(Debug, Deserialize)]
pub struct CreateOrderRequest {
    pub order_type: String,
    pub asset_id: String,
    pub quantity: Decimal,
    pub price: Decimal,
}

#[derive(Debug, Deserialize)]
pub struct ListOrdersParams {
    pub asset_id: Option<String>,
    pub limit: Option<usize>,
    pub offset: Option<usize>,
}

const DEFAULT_ORDERS_LIMIT: usize = 50;
const MAX_ORDERS_LIMIT: usize = 200;

/// `POST /orders`
pub async fn create_order(
    State(state): State<AppState>,
    ctx: RequestContext,
    auth: AuthUser,
    Json(req): Json<CreateOrderRequest>,
) -> ApiResult<TransactionResult> {
    let run = async {
        let order_type = OrderType::parse(&req.order_type).ok_or_else(|| {
            CoreError::Validation(format!("unknown order_type '{}'", req.order_type))
        })?;
        if order_type.is_buy() {
            state
                .txn
                .buy_order(
                    &auth.username,
                    &req.asset_id,
                    req.quantity,
                    req.price,
                    order_type,
                )
                .await
        } else {
            state
                .txn
                .sell_order(
                    &auth.username,
                    &req.asset_id,
                    req.quantity,
                    req.price,
                    order_type,
                )
                .await
        }
    };
    match run.await {
        Ok(result) => created(result),
        Err(err) => Err(ApiError::from_core(err, &ctx.request_id)),
    }
}

/// `GET /orders/{order_id}`
pub async fn get_order(
    State(state): State<AppState>,
    ctx: RequestContext,
    auth: AuthUser,
    Path(order_id): Path<String>,
) -> ApiResult<Order> {
    let run = async {
        let order = state.orders.get(&order_id).await?;
        if order.username != auth.username && !auth.is_admin() {
            return Err(CoreError::AccessDenied(
                "order belongs to another user".to_string(),
            ));
        }
        Ok(order)
    };
    match run.await {
        Ok(order) => ok(order),
        Err(err) => Err(ApiError::from_core(err, &ctx.request_id)),
    }
}

/// `GET /users/{username}/orders`
pub async fn list_orders(
    State(state): State<AppState>,
    ctx: RequestContext,
    auth: AuthUser,
    Path(username): Path<String>,
    Query(params): Query<ListOrdersParams>,
) -> ApiResult<Vec<Order>> {
    let run = async {
        if username != auth.username && !auth.is_admin() {
            return Err(CoreError::AccessDenied(
                "cannot list another user's orders".to_string(),
            ));
        }
        let limit = params.limit.unwrap_or(DEFAULT_ORDERS_LIMIT).min(MAX_ORDERS_LIMIT);
        let offset = params.offset.unwrap_or(0);
        match params.asset_id {
            Some(asset_id) => {
                state
                    .orders
                    .list_by_user_and_asset(&username, &asset_id, limit, offset)
                    .await
            }
            None => state.orders.list_by_user(&username, limit, offset).await,
        }
    };
    match run.await {
        Ok(orders) => ok(orders),
        Err(err) => Err(ApiError::from_core(err, &ctx.request_id)),
    }
}
