//! Inventory read model. The inventory collaborator owns asset lifecycle;
//! the core reads, plus a seeding helper for dev bootstrap.

use std::collections::HashMap;
use std::sync::Arc;

use crate::entities::Asset;
use crate::error::CoreError;
use crate::store::{ItemKey, KeyValueStore, Table};

pub struct AssetDao {
    store: Arc<dyn KeyValueStore>,
}

impl AssetDao {
    pub fn new(store: Arc<dyn KeyValueStore>) -> Self {
        AssetDao { store }
    }

    pub async fn get(&self, asset_id: &str) -> Result<Asset, CoreError> {
        let item = self
            .store
            .get(Table::Inventory, asset_id, "")
            .await?
            .ok_or_else(|| CoreError::not_found("asset", asset_id))?;
        Ok(Asset::from_item(&item)?)
    }

    pub async fn get_by_ids(
        &self,
        asset_ids: &[String],
    ) -> Result<HashMap<String, Asset>, CoreError> {
        let keys: Vec<ItemKey> = asset_ids
            .iter()
            .map(|id| ItemKey::new(id.clone(), ""))
            .collect();
        let found = self.store.batch_get(Table::Inventory, &keys).await?;

        let mut assets = HashMap::with_capacity(found.len());
        for item in found.values() {
            let asset = Asset::from_item(item)?;
            assets.insert(asset.asset_id.clone(), asset);
        }
        Ok(assets)
    }

    pub async fn get_all(&self, active_only: bool) -> Result<Vec<Asset>, CoreError> {
        let items = self.store.scan(Table::Inventory).await?;
        let mut assets = items
            .iter()
            .map(|item| Asset::from_item(item).map_err(CoreError::from))
            .collect::<Result<Vec<_>, _>>()?;
        if active_only {
            assets.retain(|asset| asset.is_active);
        }
        assets.sort_by(|a, b| a.asset_id.cmp(&b.asset_id));
        Ok(assets)
    }

    /// Seed or replace an inventory row. Dev bootstrap and tests only; in
    /// production the inventory collaborator writes this table.
    pub async fn seed(&self, asset: Asset) -> Result<(), CoreError> {
        self.store
            .put(Table::Inventory, asset.to_item(), None)
            .await?;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::store::MemoryStore;
    use rust_decimal::Decimal;

    fn asset(id: &str, price: &str, active: bool) -> Asset {
        Asset {
            asset_id: id.to_string(),
            name: id.to_string(),
            category: "major".to_string(),
            price_usd: price.parse().unwrap(),
            amount: Decimal::new(1000, 0),
            is_active: active,
        }
    }

    #[tokio::test]
    async fn get_all_filters_inactive_and_sorts() {
        let dao = AssetDao::new(Arc::new(MemoryStore::new()));
        dao.seed(asset("ETH", "2000.00", true)).await.unwrap();
        dao.seed(asset("BTC", "10000.00", true)).await.unwrap();
        dao.seed(asset("DEAD", "0", true)).await.unwrap();

        let active = dao.get_all(true).await.unwrap();
        let ids: Vec<&str> = active.iter().map(|a| a.asset_id.as_str()).collect();
        assert_eq!(ids, vec!["BTC", "ETH"]);

        let everything = dao.get_all(false).await.unwrap();
        assert_eq!(everything.len(), 3);
    }

    #[tokio::test]
    async fn batch_lookup_skips_missing_ids() {
        let dao = AssetDao::new(Arc::new(MemoryStore::new()));
        dao.seed(asset("BTC", "10000.00", true)).await.unwrap();

        let found = dao
            .get_by_ids(&["BTC".to_string(), "GHOST".to_string()])
            .await
            .unwrap();
        assert_eq!(found.len(), 1);
        assert!(found.contains_key("BTC"));
    }
}
