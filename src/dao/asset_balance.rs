//! Per-(user, asset) holdings.

use std::sync::Arc;

use chrono::Utc;
use rust_decimal::Decimal;
use tracing::debug;

use crate::entities::{AssetBalance, ASSET_SK_PREFIX};
use crate::error::CoreError;
use crate::store::{KeyValueStore, Query, Table};

pub struct AssetBalanceDao {
    store: Arc<dyn KeyValueStore>,
}

impl AssetBalanceDao {
    pub fn new(store: Arc<dyn KeyValueStore>) -> Self {
        AssetBalanceDao { store }
    }

    /// Add `delta` (signed) to the holding, creating the row on first buy.
    /// Read-modify-write - only sound under the user's lock. The resulting
    /// quantity must be non-negative; a violation here means a caller
    /// skipped its precondition check and is a server-side fault.
    pub async fn upsert(
        &self,
        username: &str,
        asset_id: &str,
        delta: Decimal,
    ) -> Result<AssetBalance, CoreError> {
        let now = Utc::now();
        let existing = self.find(username, asset_id).await?;

        let updated = match existing {
            Some(mut holding) => {
                let new_quantity = holding.quantity + delta;
                if new_quantity < Decimal::ZERO {
                    return Err(CoreError::InvariantViolation(format!(
                        "asset balance for {username}/{asset_id} would become {new_quantity}"
                    )));
                }
                holding.quantity = new_quantity;
                holding.updated_at = now;
                holding
            }
            None => {
                if delta < Decimal::ZERO {
                    return Err(CoreError::InvariantViolation(format!(
                        "no {asset_id} holding for {username} to decrement"
                    )));
                }
                AssetBalance {
                    username: username.to_string(),
                    asset_id: asset_id.to_string(),
                    quantity: delta,
                    created_at: now,
                    updated_at: now,
                }
            }
        };

        self.store
            .put(Table::Users, updated.to_item(), None)
            .await?;
        debug!(%username, %asset_id, quantity = %updated.quantity, "asset balance upserted");
        Ok(updated)
    }

    pub async fn find(
        &self,
        username: &str,
        asset_id: &str,
    ) -> Result<Option<AssetBalance>, CoreError> {
        let item = self
            .store
            .get(Table::Users, username, &AssetBalance::sort_key(asset_id))
            .await?;
        match item {
            Some(item) => Ok(Some(AssetBalance::from_item(&item)?)),
            None => Ok(None),
        }
    }

    pub async fn get(&self, username: &str, asset_id: &str) -> Result<AssetBalance, CoreError> {
        self.find(username, asset_id)
            .await?
            .ok_or_else(|| CoreError::not_found("asset balance", format!("{username}/{asset_id}")))
    }

    pub async fn get_all(&self, username: &str) -> Result<Vec<AssetBalance>, CoreError> {
        let items = self
            .store
            .query(
                Table::Users,
                Query::partition(username).sk_begins_with(ASSET_SK_PREFIX),
            )
            .await?;
        items
            .iter()
            .map(|item| AssetBalance::from_item(item).map_err(CoreError::from))
            .collect()
    }
}
