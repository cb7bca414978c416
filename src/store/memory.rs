//! In-memory store backend.
//!
//! Backs the integration tests and local development. Mirrors the
//! production backend's semantics where the core depends on them:
//! conditional writes are atomic per key, point reads observe the latest
//! write, queries return sort-key order, the secondary indexes of the
//! users and orders tables are emulated by attribute match.

use std::collections::HashMap;

use async_trait::async_trait;
use dashmap::DashMap;
use rust_decimal::Decimal;

use super::{
    AttrValue, Condition, Item, ItemKey, KeyValueStore, Query, SetOp, StoreError, Table,
    ATTR_SK, EMAIL_INDEX, USER_ORDERS_INDEX,
};

type TableMap = DashMap<(String, String), Item>;

#[derive(Debug, Default)]
pub struct MemoryStore {
    users: TableMap,
    orders: TableMap,
    inventory: TableMap,
}

impl MemoryStore {
    pub fn new() -> Self {
        MemoryStore::default()
    }

    fn table(&self, table: Table) -> &TableMap {
        match table {
            Table::Users => &self.users,
            Table::Orders => &self.orders,
            Table::Inventory => &self.inventory,
        }
    }
}

fn attr_le(lhs: &AttrValue, rhs: &AttrValue) -> bool {
    match (lhs, rhs) {
        (AttrValue::N(a), AttrValue::N(b)) => {
            match (a.parse::<Decimal>(), b.parse::<Decimal>()) {
                (Ok(a), Ok(b)) => a <= b,
                _ => false,
            }
        }
        (AttrValue::S(a), AttrValue::S(b)) => a <= b,
        _ => false,
    }
}

fn eval_condition(condition: &Condition, existing: Option<&Item>) -> bool {
    match condition {
        Condition::NotExists => existing.is_none(),
        Condition::Equals(attr, value) => {
            existing.is_some_and(|item| item.get(attr) == Some(value))
        }
        Condition::AtMost(attr, value) => existing
            .and_then(|item| item.get(attr))
            .is_some_and(|current| attr_le(current, value)),
        Condition::Or(a, b) => eval_condition(a, existing) || eval_condition(b, existing),
    }
}

/// Sort attribute a query orders by: the table sort key, or the index's.
fn sort_attr(query: &Query) -> &'static str {
    match query.index {
        Some(USER_ORDERS_INDEX) => "created_at",
        _ => ATTR_SK,
    }
}

fn matches_partition(query: &Query, item: &Item) -> bool {
    match query.index {
        None => item.pk().map(|pk| pk == query.pk).unwrap_or(false),
        Some(EMAIL_INDEX) => {
            item.opt_s("email") == Some(query.pk.as_str())
                && item.opt_s(ATTR_SK) == Some("USER")
        }
        Some(USER_ORDERS_INDEX) => item.opt_s("username") == Some(query.pk.as_str()),
        Some(_) => false,
    }
}

fn matches_predicates(query: &Query, item: &Item) -> bool {
    let sort_value = item.opt_s(sort_attr(query)).unwrap_or_default();
    if let Some(prefix) = &query.sk_begins_with {
        if !sort_value.starts_with(prefix.as_str()) {
            return false;
        }
    }
    if let Some(before) = &query.sk_before {
        if sort_value >= before.as_str() {
            return false;
        }
    }
    if let Some(after) = &query.sk_after {
        if sort_value <= after.as_str() {
            return false;
        }
    }
    if let Some((attr, value)) = &query.filter_equals {
        if item.get(attr) != Some(value) {
            return false;
        }
    }
    true
}

#[async_trait]
impl KeyValueStore for MemoryStore {
    async fn get(&self, table: Table, pk: &str, sk: &str) -> Result<Option<Item>, StoreError> {
        let key = (pk.to_string(), sk.to_string());
        Ok(self.table(table).get(&key).map(|entry| entry.value().clone()))
    }

    async fn put(
        &self,
        table: Table,
        item: Item,
        condition: Option<Condition>,
    ) -> Result<(), StoreError> {
        let pk = item.pk()?.to_string();
        let sk = if table.has_sort_key() {
            item.sk()?.to_string()
        } else {
            String::new()
        };

        use dashmap::mapref::entry::Entry;
        match self.table(table).entry((pk, sk)) {
            Entry::Occupied(mut occupied) => {
                if let Some(cond) = &condition {
                    if !eval_condition(cond, Some(occupied.get())) {
                        return Err(StoreError::ConditionFailed);
                    }
                }
                occupied.insert(item);
            }
            Entry::Vacant(vacant) => {
                if let Some(cond) = &condition {
                    if !eval_condition(cond, None) {
                        return Err(StoreError::ConditionFailed);
                    }
                }
                vacant.insert(item);
            }
        }
        Ok(())
    }

    async fn update(
        &self,
        table: Table,
        pk: &str,
        sk: &str,
        ops: Vec<SetOp>,
        condition: Option<Condition>,
    ) -> Result<Item, StoreError> {
        use dashmap::mapref::entry::Entry;
        let key = (pk.to_string(), sk.to_string());
        match self.table(table).entry(key) {
            Entry::Occupied(mut occupied) => {
                if let Some(cond) = &condition {
                    if !eval_condition(cond, Some(occupied.get())) {
                        return Err(StoreError::ConditionFailed);
                    }
                }
                let item = occupied.get_mut();
                for op in ops {
                    apply_set(item, op);
                }
                Ok(item.clone())
            }
            Entry::Vacant(vacant) => {
                if let Some(cond) = &condition {
                    if !eval_condition(cond, None) {
                        return Err(StoreError::ConditionFailed);
                    }
                }
                // Upsert semantics, matching the production backend.
                let mut item = if table.has_sort_key() {
                    Item::with_key(pk, sk)
                } else {
                    Item::new(pk)
                };
                for op in ops {
                    apply_set(&mut item, op);
                }
                vacant.insert(item.clone());
                Ok(item)
            }
        }
    }

    async fn delete(
        &self,
        table: Table,
        pk: &str,
        sk: &str,
        condition: Option<Condition>,
    ) -> Result<(), StoreError> {
        use dashmap::mapref::entry::Entry;
        let key = (pk.to_string(), sk.to_string());
        match self.table(table).entry(key) {
            Entry::Occupied(occupied) => {
                if let Some(cond) = &condition {
                    if !eval_condition(cond, Some(occupied.get())) {
                        return Err(StoreError::ConditionFailed);
                    }
                }
                occupied.remove();
                Ok(())
            }
            Entry::Vacant(_) => {
                if let Some(cond) = &condition {
                    if !eval_condition(cond, None) {
                        return Err(StoreError::ConditionFailed);
                    }
                }
                Ok(())
            }
        }
    }

    async fn query(&self, table: Table, query: Query) -> Result<Vec<Item>, StoreError> {
        let mut matches: Vec<Item> = self
            .table(table)
            .iter()
            .filter(|entry| matches_partition(&query, entry.value()))
            .filter(|entry| matches_predicates(&query, entry.value()))
            .map(|entry| entry.value().clone())
            .collect();

        let sort_by = sort_attr(&query);
        matches.sort_by(|a, b| {
            let a = a.opt_s(sort_by).unwrap_or_default();
            let b = b.opt_s(sort_by).unwrap_or_default();
            if query.descending {
                b.cmp(a)
            } else {
                a.cmp(b)
            }
        });

        if let Some(limit) = query.limit {
            matches.truncate(limit);
        }
        Ok(matches)
    }

    async fn batch_get(
        &self,
        table: Table,
        keys: &[ItemKey],
    ) -> Result<HashMap<ItemKey, Item>, StoreError> {
        let map = self.table(table);
        let mut result = HashMap::with_capacity(keys.len());
        for key in keys {
            let lookup = (key.pk.clone(), key.sk.clone());
            if let Some(entry) = map.get(&lookup) {
                result.insert(key.clone(), entry.value().clone());
            }
        }
        Ok(result)
    }

    async fn scan(&self, table: Table) -> Result<Vec<Item>, StoreError> {
        Ok(self
            .table(table)
            .iter()
            .map(|entry| entry.value().clone())
            .collect())
    }
}

fn apply_set(item: &mut Item, op: SetOp) {
    match op.value {
        AttrValue::S(s) => {
            item.set_s(op.attr, s);
        }
        AttrValue::N(n) => {
            item.set_n(op.attr, n);
        }
        AttrValue::Bool(b) => {
            item.set_bool(op.attr, b);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn store() -> MemoryStore {
        MemoryStore::new()
    }

    #[tokio::test]
    async fn conditional_put_not_exists() {
        let store = store();
        let item = Item::with_key("alice", "USER");
        store
            .put(Table::Users, item.clone(), Some(Condition::NotExists))
            .await
            .unwrap();

        let err = store
            .put(Table::Users, item, Some(Condition::NotExists))
            .await
            .unwrap_err();
        assert!(matches!(err, StoreError::ConditionFailed));
    }

    #[tokio::test]
    async fn read_after_write_observes_the_write() {
        let store = store();
        let mut item = Item::with_key("alice", "BALANCE");
        item.set_decimal("current_balance", "25.00".parse().unwrap());
        store.put(Table::Users, item, None).await.unwrap();

        let read = store.get(Table::Users, "alice", "BALANCE").await.unwrap();
        assert_eq!(
            read.unwrap().get_decimal("current_balance").unwrap(),
            "25.00".parse::<Decimal>().unwrap()
        );
    }

    #[tokio::test]
    async fn not_exists_or_at_most_allows_expired_overwrite() {
        let store = store();
        let mut stale = Item::with_key("USER#bob", "LOCK");
        stale.set_s("lock_id", "old-token");
        stale.set_n("expires_at", "1000");
        store.put(Table::Users, stale, None).await.unwrap();

        let mut fresh = Item::with_key("USER#bob", "LOCK");
        fresh.set_s("lock_id", "new-token");
        fresh.set_n("expires_at", "9999");

        let cond = Condition::not_exists_or(Condition::AtMost(
            "expires_at",
            AttrValue::N("2000".to_string()),
        ));
        store.put(Table::Users, fresh, Some(cond)).await.unwrap();

        let read = store
            .get(Table::Users, "USER#bob", "LOCK")
            .await
            .unwrap()
            .unwrap();
        assert_eq!(read.opt_s("lock_id"), Some("new-token"));
    }

    #[tokio::test]
    async fn conditional_delete_requires_matching_token() {
        let store = store();
        let mut lock = Item::with_key("USER#bob", "LOCK");
        lock.set_s("lock_id", "token-1");
        store.put(Table::Users, lock, None).await.unwrap();

        let wrong = store
            .delete(
                Table::Users,
                "USER#bob",
                "LOCK",
                Some(Condition::Equals(
                    "lock_id",
                    AttrValue::S("token-2".to_string()),
                )),
            )
            .await;
        assert!(matches!(wrong, Err(StoreError::ConditionFailed)));

        store
            .delete(
                Table::Users,
                "USER#bob",
                "LOCK",
                Some(Condition::Equals(
                    "lock_id",
                    AttrValue::S("token-1".to_string()),
                )),
            )
            .await
            .unwrap();
        assert!(store
            .get(Table::Users, "USER#bob", "LOCK")
            .await
            .unwrap()
            .is_none());
    }

    #[tokio::test]
    async fn query_returns_sort_key_order() {
        let store = store();
        for sk in ["2024-01-01T00:00:00Z", "2024-01-03T00:00:00Z", "2024-01-02T00:00:00Z"] {
            let mut item = Item::with_key("TRANS#alice", sk);
            item.set_s("amount", "1.00");
            store.put(Table::Users, item, None).await.unwrap();
        }

        let newest_first = store
            .query(
                Table::Users,
                Query::partition("TRANS#alice").newest_first(),
            )
            .await
            .unwrap();
        let keys: Vec<&str> = newest_first.iter().map(|i| i.sk().unwrap()).collect();
        assert_eq!(
            keys,
            vec![
                "2024-01-03T00:00:00Z",
                "2024-01-02T00:00:00Z",
                "2024-01-01T00:00:00Z"
            ]
        );
    }

    #[tokio::test]
    async fn user_orders_index_matches_username_attribute() {
        let store = store();
        for (order_id, username, asset, created) in [
            ("o1", "alice", "BTC", "2024-01-01T00:00:00Z"),
            ("o2", "alice", "ETH", "2024-01-02T00:00:00Z"),
            ("o3", "bob", "BTC", "2024-01-03T00:00:00Z"),
        ] {
            let mut item = Item::with_key(order_id, "ORDER");
            item.set_s("username", username);
            item.set_s("asset_id", asset);
            item.set_s("created_at", created);
            store.put(Table::Orders, item, None).await.unwrap();
        }

        let alice_orders = store
            .query(
                Table::Orders,
                Query::partition("alice")
                    .on_index(USER_ORDERS_INDEX)
                    .newest_first(),
            )
            .await
            .unwrap();
        assert_eq!(alice_orders.len(), 2);
        assert_eq!(alice_orders[0].opt_s("asset_id"), Some("ETH"));

        let alice_btc = store
            .query(
                Table::Orders,
                Query::partition("alice")
                    .on_index(USER_ORDERS_INDEX)
                    .filter_equals("asset_id", AttrValue::S("BTC".to_string())),
            )
            .await
            .unwrap();
        assert_eq!(alice_btc.len(), 1);
        assert_eq!(alice_btc[0].pk().unwrap(), "o1");
    }

    #[tokio::test]
    async fn batch_get_returns_present_keys_only() {
        let store = store();
        store
            .put(Table::Users, Item::with_key("alice", "USER"), None)
            .await
            .unwrap();

        let keys = vec![ItemKey::new("alice", "USER"), ItemKey::new("ghost", "USER")];
        let found = store.batch_get(Table::Users, &keys).await.unwrap();
        assert_eq!(found.len(), 1);
        assert_eq!(found[&keys[0]].pk().unwrap(), "alice");
    }
}
