//! Typed facade over the wide-column key-value store.
//!
//! Everything the core persists goes through [`KeyValueStore`]: conditional
//! puts, strongly consistent point reads, partition queries (optionally via
//! a secondary index) and batched reads. Two backends implement it -
//! [`MemoryStore`] for tests and local dev, [`DynamoStore`] for production.
//!
//! Consistency contract: point reads on a `(Pk, Sk)` observe the latest
//! write to that key (the balance and lock rows depend on this). Secondary
//! index queries may lag; only order/transaction history listings use them.

mod dynamo;
mod error;
mod item;
mod memory;

pub use dynamo::DynamoStore;
pub use error::StoreError;
pub use item::{format_ts, AttrValue, Item, ATTR_PK, ATTR_SK};
pub use memory::MemoryStore;

use std::collections::HashMap;

use async_trait::async_trait;

/// Logical tables. `Inventory` is keyed by partition key alone; the other
/// two use the composite `(Pk, Sk)`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Table {
    Users,
    Orders,
    Inventory,
}

impl Table {
    pub fn has_sort_key(self) -> bool {
        !matches!(self, Table::Inventory)
    }
}

/// Secondary index on the orders table: partition `username`, ordered by
/// `created_at`.
pub const USER_ORDERS_INDEX: &str = "UserOrdersIndex";
/// Secondary index on the users table for email uniqueness lookups.
pub const EMAIL_INDEX: &str = "EmailIndex";

/// Predicate attached to a write. The store applies it atomically against
/// the current image of the item; failure is `StoreError::ConditionFailed`.
#[derive(Debug, Clone)]
pub enum Condition {
    /// The item does not exist.
    NotExists,
    /// Attribute exists and equals the value.
    Equals(&'static str, AttrValue),
    /// Attribute exists and is `<=` the value (numeric for `N`,
    /// lexicographic for `S`).
    AtMost(&'static str, AttrValue),
    Or(Box<Condition>, Box<Condition>),
}

impl Condition {
    pub fn not_exists_or(other: Condition) -> Condition {
        Condition::Or(Box::new(Condition::NotExists), Box::new(other))
    }
}

/// One `SET attr = value` in an update.
#[derive(Debug, Clone)]
pub struct SetOp {
    pub attr: &'static str,
    pub value: AttrValue,
}

impl SetOp {
    pub fn new(attr: &'static str, value: AttrValue) -> Self {
        SetOp { attr, value }
    }
}

/// Partition query. At most one sort-key predicate may be set; `sk_before`
/// and `sk_after` are exclusive bounds used for cursor pagination.
#[derive(Debug, Clone, Default)]
pub struct Query {
    pub pk: String,
    pub sk_begins_with: Option<String>,
    pub sk_before: Option<String>,
    pub sk_after: Option<String>,
    pub index: Option<&'static str>,
    pub filter_equals: Option<(&'static str, AttrValue)>,
    pub limit: Option<usize>,
    pub descending: bool,
}

impl Query {
    pub fn partition(pk: impl Into<String>) -> Self {
        Query {
            pk: pk.into(),
            ..Query::default()
        }
    }

    pub fn on_index(mut self, index: &'static str) -> Self {
        self.index = Some(index);
        self
    }

    pub fn sk_begins_with(mut self, prefix: impl Into<String>) -> Self {
        self.sk_begins_with = Some(prefix.into());
        self
    }

    pub fn sk_before(mut self, cursor: impl Into<String>) -> Self {
        self.sk_before = Some(cursor.into());
        self
    }

    pub fn filter_equals(mut self, attr: &'static str, value: AttrValue) -> Self {
        self.filter_equals = Some((attr, value));
        self
    }

    pub fn limit(mut self, limit: usize) -> Self {
        self.limit = Some(limit);
        self
    }

    pub fn newest_first(mut self) -> Self {
        self.descending = true;
        self
    }
}

/// Key of an item, for point reads and batch gets.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct ItemKey {
    pub pk: String,
    pub sk: String,
}

impl ItemKey {
    pub fn new(pk: impl Into<String>, sk: impl Into<String>) -> Self {
        ItemKey {
            pk: pk.into(),
            sk: sk.into(),
        }
    }
}

/// The store capability set. All operations are async and may suspend on
/// network I/O; none retries `ConditionFailed` or request validation
/// failures. For hash-only tables pass `""` as the sort key.
#[async_trait]
pub trait KeyValueStore: Send + Sync {
    /// Strongly consistent point read.
    async fn get(&self, table: Table, pk: &str, sk: &str) -> Result<Option<Item>, StoreError>;

    /// Put the full item, optionally guarded by a condition on the current
    /// image.
    async fn put(
        &self,
        table: Table,
        item: Item,
        condition: Option<Condition>,
    ) -> Result<(), StoreError>;

    /// Apply `SET` operations to an existing item and return the new image.
    async fn update(
        &self,
        table: Table,
        pk: &str,
        sk: &str,
        ops: Vec<SetOp>,
        condition: Option<Condition>,
    ) -> Result<Item, StoreError>;

    async fn delete(
        &self,
        table: Table,
        pk: &str,
        sk: &str,
        condition: Option<Condition>,
    ) -> Result<(), StoreError>;

    /// Ordered partition query, optionally through a secondary index.
    async fn query(&self, table: Table, query: Query) -> Result<Vec<Item>, StoreError>;

    /// Batched point reads. Implementations retry unprocessed keys at least
    /// once; missing keys are simply absent from the result.
    async fn batch_get(
        &self,
        table: Table,
        keys: &[ItemKey],
    ) -> Result<HashMap<ItemKey, Item>, StoreError>;

    /// Full-table scan. Only the inventory read model uses this.
    async fn scan(&self, table: Table) -> Result<Vec<Item>, StoreError>;
}
