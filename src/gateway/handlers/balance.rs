//! Cash balance handlers: deposit, withdraw, reads.

use axum::extract::{Json, Query, State};
use rust_decimal::Decimal;
use serde::Deserialize;

use crate::dao::TransactionPage;
use crate::entities::{AssetBalance, Balance};
use crate::gateway::extract::{AuthUser, RequestContext};
use crate::gateway::response::{created, ok, ApiError, ApiResult};
use crate::gateway::state::AppState;
use crate::txn::TransactionResult;

#[derive(Debug, Deserialize)]
pub struct AmountRequest {
    pub amount: Decimal,
}

#[derive(Debug, Deserialize)]
pub struct HistoryParams {
    pub limit: Option<usize>,
    pub cursor: Option<String>,
}

const DEFAULT_HISTORY_LIMIT: usize = 50;
const MAX_HISTORY_LIMIT: usize = 200;

/// `POST /balance/deposit`
pub async fn deposit(
    State(state): State<AppState>,
    ctx: RequestContext,
    auth: AuthUser,
    Json(req): Json<AmountRequest>,
) -> ApiResult<TransactionResult> {
    match state.txn.deposit(&auth.username, req.amount).await {
        Ok(result) => created(result),
        Err(err) => Err(ApiError::from_core(err, &ctx.request_id)),
    }
}

/// `POST /balance/withdraw`
pub async fn withdraw(
    State(state): State<AppState>,
    ctx: RequestContext,
    auth: AuthUser,
    Json(req): Json<AmountRequest>,
) -> ApiResult<TransactionResult> {
    match state.txn.withdraw(&auth.username, req.amount).await {
        Ok(result) => created(result),
        Err(err) => Err(ApiError::from_core(err, &ctx.request_id)),
    }
}

/// `GET /balance` - read-your-writes read under the short lock.
pub async fn get_balance(
    State(state): State<AppState>,
    ctx: RequestContext,
    auth: AuthUser,
) -> ApiResult<Balance> {
    match state.txn.get_balance(&auth.username).await {
        Ok(balance) => ok(balance),
        Err(err) => Err(ApiError::from_core(err, &ctx.request_id)),
    }
}

/// `GET /balance/transactions`
pub async fn list_transactions(
    State(state): State<AppState>,
    ctx: RequestContext,
    auth: AuthUser,
    Query(params): Query<HistoryParams>,
) -> ApiResult<TransactionPageBody> {
    let limit = params
        .limit
        .unwrap_or(DEFAULT_HISTORY_LIMIT)
        .min(MAX_HISTORY_LIMIT);
    match state
        .balances
        .list_transactions(&auth.username, limit, params.cursor.as_deref())
        .await
    {
        Ok(page) => ok(TransactionPageBody::from(page)),
        Err(err) => Err(ApiError::from_core(err, &ctx.request_id)),
    }
}

/// `GET /assets/balances`
pub async fn list_asset_balances(
    State(state): State<AppState>,
    ctx: RequestContext,
    auth: AuthUser,
) -> ApiResult<Vec<AssetBalance>> {
    match state.asset_balances.get_all(&auth.username).await {
        Ok(holdings) => ok(holdings),
        Err(err) => Err(ApiError::from_core(err, &ctx.request_id)),
    }
}

#[derive(Debug, serde::Serialize)]
pub struct TransactionPageBody {
    pub items: Vec<crate::entities::BalanceTransaction>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub next_cursor: Option<String>,
}

impl From<TransactionPage> for TransactionPageBody {
    fn from(page: TransactionPage) -> Self {
        TransactionPageBody {
            items: page.items,
            next_cursor: page.next_cursor,
        }
    }
}
