//! Inventory read handlers. Public: no authentication required.

use axum::extract::{Path, Query, State};
use serde::Deserialize;

use crate::entities::Asset;
use crate::gateway::extract::RequestContext;
use crate::gateway::response::{ok, ApiError, ApiResult};
use crate::gateway::state::AppState;

#[derive(Debug, Deserialize)]
pub struct InventoryParams {
    pub active_only: Option<bool>,
}

/// `GET /inventory`
pub async fn list_assets(
    State(state): State<AppState>,
    ctx: RequestContext,
    Query(params): Query<InventoryParams>,
) -> ApiResult<Vec<Asset>> {
    match state.assets.get_all(params.active_only.unwrap_or(true)).await {
        Ok(assets) => ok(assets),
        Err(err) => Err(ApiError::from_core(err, &ctx.request_id)),
    }
}

/// `GET /inventory/{asset_id}`
pub async fn get_asset(
    State(state): State<AppState>,
    ctx: RequestContext,
    Path(asset_id): Path<String>,
) -> ApiResult<Asset> {
    match state.assets.get(&asset_id).await {
        Ok(asset) => ok(asset),
        Err(err) => Err(ApiError::from_core(err, &ctx.request_id)),
    }
}
