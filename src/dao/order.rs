//! Order records. Listing goes through the per-user secondary index.

use std::sync::Arc;

use chrono::Utc;
use tracing::debug;

use crate::entities::{Order, OrderStatus, SK_ORDER};
use crate::error::CoreError;
use crate::store::{
    format_ts, AttrValue, Condition, KeyValueStore, Query, SetOp, StoreError, Table,
    USER_ORDERS_INDEX,
};

pub struct OrderDao {
    store: Arc<dyn KeyValueStore>,
}

impl OrderDao {
    pub fn new(store: Arc<dyn KeyValueStore>) -> Self {
        OrderDao { store }
    }

    pub async fn create(&self, order: Order) -> Result<Order, CoreError> {
        match self
            .store
            .put(Table::Orders, order.to_item(), Some(Condition::NotExists))
            .await
        {
            Ok(()) => {
                debug!(order_id = %order.order_id, username = %order.username, "order created");
                Ok(order)
            }
            Err(StoreError::ConditionFailed) => {
                Err(CoreError::already_exists("order", &order.order_id))
            }
            Err(err) => Err(err.into()),
        }
    }

    pub async fn get(&self, order_id: &str) -> Result<Order, CoreError> {
        let item = self
            .store
            .get(Table::Orders, order_id, SK_ORDER)
            .await?
            .ok_or_else(|| CoreError::not_found("order", order_id))?;
        Ok(Order::from_item(&item)?)
    }

    /// Newest-first listing of a user's orders. Served from the secondary
    /// index, so recent writes may lag.
    pub async fn list_by_user(
        &self,
        username: &str,
        limit: usize,
        offset: usize,
    ) -> Result<Vec<Order>, CoreError> {
        let query = Query::partition(username)
            .on_index(USER_ORDERS_INDEX)
            .newest_first()
            .limit(limit + offset);
        self.run_listing(query, offset).await
    }

    pub async fn list_by_user_and_asset(
        &self,
        username: &str,
        asset_id: &str,
        limit: usize,
        offset: usize,
    ) -> Result<Vec<Order>, CoreError> {
        let query = Query::partition(username)
            .on_index(USER_ORDERS_INDEX)
            .newest_first()
            .filter_equals("asset_id", AttrValue::S(asset_id.to_string()))
            .limit(limit + offset);
        self.run_listing(query, offset).await
    }

    async fn run_listing(&self, query: Query, offset: usize) -> Result<Vec<Order>, CoreError> {
        let items = self.store.query(Table::Orders, query).await?;
        items
            .iter()
            .skip(offset)
            .map(|item| Order::from_item(item).map_err(CoreError::from))
            .collect()
    }

    /// Write the new status. State-machine legality is the transaction
    /// manager's concern; the DAO writes blindly.
    pub async fn update_status(
        &self,
        order_id: &str,
        new_status: OrderStatus,
        reason: Option<&str>,
    ) -> Result<Order, CoreError> {
        let mut ops = vec![
            SetOp::new("status", AttrValue::S(new_status.as_str().to_string())),
            SetOp::new("updated_at", AttrValue::S(format_ts(Utc::now()))),
        ];
        if let Some(reason) = reason {
            ops.push(SetOp::new(
                "status_reason",
                AttrValue::S(reason.to_string()),
            ));
        }

        let image = self
            .store
            .update(
                Table::Orders,
                order_id,
                SK_ORDER,
                ops,
                Some(Condition::Equals(
                    "entity_type",
                    AttrValue::S("order".to_string()),
                )),
            )
            .await
            .map_err(|err| match err {
                StoreError::ConditionFailed => CoreError::not_found("order", order_id),
                other => other.into(),
            })?;
        Ok(Order::from_item(&image)?)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::entities::OrderType;
    use crate::store::MemoryStore;

    fn dao() -> OrderDao {
        OrderDao::new(Arc::new(MemoryStore::new()))
    }

    fn order(username: &str, asset: &str) -> Order {
        let now = Utc::now();
        Order {
            order_id: Order::generate_id(now),
            username: username.to_string(),
            order_type: OrderType::MarketBuy,
            status: OrderStatus::Completed,
            asset_id: asset.to_string(),
            quantity: "1".parse().unwrap(),
            price: "10.00".parse().unwrap(),
            total_amount: "10.00".parse().unwrap(),
            status_reason: None,
            created_at: now,
            updated_at: now,
        }
    }

    #[tokio::test]
    async fn get_round_trips_created_order() {
        let dao = dao();
        let created = dao.create(order("alice", "BTC")).await.unwrap();
        let fetched = dao.get(&created.order_id).await.unwrap();
        assert_eq!(fetched.username, "alice");
        assert_eq!(fetched.status, OrderStatus::Completed);
    }

    #[tokio::test]
    async fn listing_filters_by_user_and_asset() {
        let dao = dao();
        dao.create(order("alice", "BTC")).await.unwrap();
        dao.create(order("alice", "ETH")).await.unwrap();
        dao.create(order("bob", "BTC")).await.unwrap();

        let all = dao.list_by_user("alice", 10, 0).await.unwrap();
        assert_eq!(all.len(), 2);

        let btc_only = dao
            .list_by_user_and_asset("alice", "BTC", 10, 0)
            .await
            .unwrap();
        assert_eq!(btc_only.len(), 1);
        assert_eq!(btc_only[0].asset_id, "BTC");
    }

    #[tokio::test]
    async fn update_status_writes_blindly_and_returns_new_image() {
        let dao = dao();
        let created = dao.create(order("alice", "BTC")).await.unwrap();
        let updated = dao
            .update_status(&created.order_id, OrderStatus::Failed, Some("payment failed"))
            .await
            .unwrap();
        assert_eq!(updated.status, OrderStatus::Failed);
        assert_eq!(updated.status_reason.as_deref(), Some("payment failed"));
    }

    #[tokio::test]
    async fn update_status_of_missing_order_is_not_found() {
        let dao = dao();
        let err = dao
            .update_status("ord_missing", OrderStatus::Cancelled, None)
            .await
            .unwrap_err();
        assert!(matches!(err, CoreError::EntityNotFound { .. }));
    }
}
