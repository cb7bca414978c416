//! DynamoDB store backend.
//!
//! Conditional writes map onto condition expressions, the lock-expiry
//! overwrite included. Transport-level failures are retried by the SDK's
//! standard retry policy (bounded at connect time); `ConditionFailed` and
//! request validation errors are never retried. Point reads are strongly
//! consistent; secondary-index queries are eventually consistent by
//! DynamoDB's nature, which the core permits only for history listings.

use std::collections::HashMap;

use async_trait::async_trait;
use aws_config::retry::RetryConfig;
use aws_config::BehaviorVersion;
use aws_sdk_dynamodb::config::Region;
use aws_sdk_dynamodb::error::{ProvideErrorMetadata, SdkError};
use aws_sdk_dynamodb::types::{AttributeValue, KeysAndAttributes, ReturnValue};
use aws_sdk_dynamodb::Client;

use super::{
    AttrValue, Condition, Item, ItemKey, KeyValueStore, Query, SetOp, StoreError, Table,
    ATTR_PK, ATTR_SK, EMAIL_INDEX, USER_ORDERS_INDEX,
};
use crate::config::TableNames;

/// How many passes `batch_get` makes over unprocessed keys before giving up.
const BATCH_GET_PASSES: usize = 3;

pub struct DynamoStore {
    client: Client,
    tables: TableNames,
}

impl DynamoStore {
    /// Build a client and verify the users table is reachable. A failure
    /// here is a bootstrap failure; callers exit rather than limp along.
    pub async fn connect(
        region: &str,
        tables: TableNames,
        max_retry_attempts: u32,
    ) -> Result<Self, StoreError> {
        let sdk_config = aws_config::defaults(BehaviorVersion::latest())
            .region(Region::new(region.to_string()))
            .retry_config(RetryConfig::standard().with_max_attempts(max_retry_attempts))
            .load()
            .await;
        let client = Client::new(&sdk_config);

        client
            .describe_table()
            .table_name(&tables.users)
            .send()
            .await
            .map_err(classify)?;

        Ok(DynamoStore { client, tables })
    }

    fn table_name(&self, table: Table) -> &str {
        match table {
            Table::Users => &self.tables.users,
            Table::Orders => &self.tables.orders,
            Table::Inventory => &self.tables.inventory,
        }
    }
}

fn to_attribute_value(value: &AttrValue) -> AttributeValue {
    match value {
        AttrValue::S(s) => AttributeValue::S(s.clone()),
        AttrValue::N(n) => AttributeValue::N(n.clone()),
        AttrValue::Bool(b) => AttributeValue::Bool(*b),
    }
}

fn to_item_map(item: &Item) -> HashMap<String, AttributeValue> {
    item.attrs()
        .map(|(name, value)| (name.clone(), to_attribute_value(value)))
        .collect()
}

fn from_item_map(map: &HashMap<String, AttributeValue>) -> Item {
    let mut item = Item::default();
    for (name, value) in map {
        match value {
            AttributeValue::S(s) => {
                item.set_s(name, s.clone());
            }
            AttributeValue::N(n) => {
                item.set_n(name, n.clone());
            }
            AttributeValue::Bool(b) => {
                item.set_bool(name, *b);
            }
            // Attribute types the core never writes are ignored on read.
            _ => {}
        }
    }
    item
}

fn key_map(table: Table, pk: &str, sk: &str) -> HashMap<String, AttributeValue> {
    let mut key = HashMap::new();
    key.insert(ATTR_PK.to_string(), AttributeValue::S(pk.to_string()));
    if table.has_sort_key() {
        key.insert(ATTR_SK.to_string(), AttributeValue::S(sk.to_string()));
    }
    key
}

fn classify<E, R>(err: SdkError<E, R>) -> StoreError
where
    SdkError<E, R>: ProvideErrorMetadata + std::error::Error,
{
    let message = || {
        err.message()
            .map(str::to_string)
            .unwrap_or_else(|| err.to_string())
    };
    match err.code() {
        Some("ConditionalCheckFailedException") => StoreError::ConditionFailed,
        Some("ValidationException") => StoreError::Validation(message()),
        _ => StoreError::Unavailable(message()),
    }
}

/// Accumulates `#n` / `:v` placeholders while rendering expressions.
#[derive(Default)]
struct ExprBuilder {
    names: HashMap<String, String>,
    values: HashMap<String, AttributeValue>,
    counter: usize,
}

impl ExprBuilder {
    fn name(&mut self, attr: &str) -> String {
        let placeholder = format!("#n{}", self.counter);
        self.counter += 1;
        self.names.insert(placeholder.clone(), attr.to_string());
        placeholder
    }

    fn value(&mut self, value: &AttrValue) -> String {
        let placeholder = format!(":v{}", self.counter);
        self.counter += 1;
        self.values
            .insert(placeholder.clone(), to_attribute_value(value));
        placeholder
    }

    fn condition(&mut self, cond: &Condition) -> String {
        match cond {
            Condition::NotExists => {
                format!("attribute_not_exists({})", self.name(ATTR_PK))
            }
            Condition::Equals(attr, value) => {
                format!("{} = {}", self.name(attr), self.value(value))
            }
            Condition::AtMost(attr, value) => {
                format!("{} <= {}", self.name(attr), self.value(value))
            }
            Condition::Or(left, right) => {
                format!("({}) OR ({})", self.condition(left), self.condition(right))
            }
        }
    }

    fn into_maps(
        self,
    ) -> (
        Option<HashMap<String, String>>,
        Option<HashMap<String, AttributeValue>>,
    ) {
        let names = (!self.names.is_empty()).then_some(self.names);
        let values = (!self.values.is_empty()).then_some(self.values);
        (names, values)
    }
}

/// Key attribute names a query addresses: the table's own, or the index's.
fn query_key_attrs(query: &Query) -> Result<(&'static str, &'static str), StoreError> {
    match query.index {
        None => Ok((ATTR_PK, ATTR_SK)),
        Some(USER_ORDERS_INDEX) => Ok(("username", "created_at")),
        Some(EMAIL_INDEX) => Ok(("email", ATTR_SK)),
        Some(other) => Err(StoreError::Validation(format!("unknown index '{other}'"))),
    }
}

#[async_trait]
impl KeyValueStore for DynamoStore {
    async fn get(&self, table: Table, pk: &str, sk: &str) -> Result<Option<Item>, StoreError> {
        let output = self
            .client
            .get_item()
            .table_name(self.table_name(table))
            .set_key(Some(key_map(table, pk, sk)))
            .consistent_read(true)
            .send()
            .await
            .map_err(classify)?;

        Ok(output.item.as_ref().map(from_item_map))
    }

    async fn put(
        &self,
        table: Table,
        item: Item,
        condition: Option<Condition>,
    ) -> Result<(), StoreError> {
        let mut request = self
            .client
            .put_item()
            .table_name(self.table_name(table))
            .set_item(Some(to_item_map(&item)));

        if let Some(cond) = condition {
            let mut expr = ExprBuilder::default();
            let rendered = expr.condition(&cond);
            let (names, values) = expr.into_maps();
            request = request
                .condition_expression(rendered)
                .set_expression_attribute_names(names)
                .set_expression_attribute_values(values);
        }

        request.send().await.map_err(classify)?;
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
        if ops.is_empty() {
            return Err(StoreError::Validation("update with no operations".into()));
        }

        let mut expr = ExprBuilder::default();
        let assignments: Vec<String> = ops
            .iter()
            .map(|op| format!("{} = {}", expr.name(op.attr), expr.value(&op.value)))
            .collect();
        let update_expression = format!("SET {}", assignments.join(", "));
        let rendered_condition = condition.as_ref().map(|cond| expr.condition(cond));
        let (names, values) = expr.into_maps();

        let mut request = self
            .client
            .update_item()
            .table_name(self.table_name(table))
            .set_key(Some(key_map(table, pk, sk)))
            .update_expression(update_expression)
            .set_expression_attribute_names(names)
            .set_expression_attribute_values(values)
            .return_values(ReturnValue::AllNew);

        if let Some(rendered) = rendered_condition {
            request = request.condition_expression(rendered);
        }

        let output = request.send().await.map_err(classify)?;
        let attributes = output.attributes.as_ref().ok_or_else(|| {
            StoreError::Corrupt("update returned no new image".to_string())
        })?;
        Ok(from_item_map(attributes))
    }

    async fn delete(
        &self,
        table: Table,
        pk: &str,
        sk: &str,
        condition: Option<Condition>,
    ) -> Result<(), StoreError> {
        let mut request = self
            .client
            .delete_item()
            .table_name(self.table_name(table))
            .set_key(Some(key_map(table, pk, sk)));

        if let Some(cond) = condition {
            let mut expr = ExprBuilder::default();
            let rendered = expr.condition(&cond);
            let (names, values) = expr.into_maps();
            request = request
                .condition_expression(rendered)
                .set_expression_attribute_names(names)
                .set_expression_attribute_values(values);
        }

        request.send().await.map_err(classify)?;
        Ok(())
    }

    async fn query(&self, table: Table, query: Query) -> Result<Vec<Item>, StoreError> {
        let (pk_attr, sort_attr) = query_key_attrs(&query)?;

        let mut expr = ExprBuilder::default();
        let mut key_condition = format!(
            "{} = {}",
            expr.name(pk_attr),
            expr.value(&AttrValue::S(query.pk.clone()))
        );
        if let Some(prefix) = &query.sk_begins_with {
            key_condition.push_str(&format!(
                " AND begins_with({}, {})",
                expr.name(sort_attr),
                expr.value(&AttrValue::S(prefix.clone()))
            ));
        } else if let Some(before) = &query.sk_before {
            key_condition.push_str(&format!(
                " AND {} < {}",
                expr.name(sort_attr),
                expr.value(&AttrValue::S(before.clone()))
            ));
        } else if let Some(after) = &query.sk_after {
            key_condition.push_str(&format!(
                " AND {} > {}",
                expr.name(sort_attr),
                expr.value(&AttrValue::S(after.clone()))
            ));
        }

        let filter_expression = query.filter_equals.as_ref().map(|(attr, value)| {
            format!("{} = {}", expr.name(attr), expr.value(value))
        });
        let (names, values) = expr.into_maps();

        let mut items = Vec::new();
        let mut exclusive_start_key: Option<HashMap<String, AttributeValue>> = None;
        loop {
            let mut request = self
                .client
                .query()
                .table_name(self.table_name(table))
                .set_index_name(query.index.map(str::to_string))
                .key_condition_expression(key_condition.clone())
                .set_filter_expression(filter_expression.clone())
                .set_expression_attribute_names(names.clone())
                .set_expression_attribute_values(values.clone())
                .scan_index_forward(!query.descending)
                .consistent_read(query.index.is_none())
                .set_exclusive_start_key(exclusive_start_key.take());
            if let Some(limit) = query.limit {
                request = request.limit((limit - items.len()) as i32);
            }

            let output = request.send().await.map_err(classify)?;
            items.extend(output.items.unwrap_or_default().iter().map(from_item_map));

            if let Some(limit) = query.limit {
                if items.len() >= limit {
                    items.truncate(limit);
                    break;
                }
            }
            match output.last_evaluated_key {
                Some(key) if !key.is_empty() => exclusive_start_key = Some(key),
                _ => break,
            }
        }
        Ok(items)
    }

    async fn batch_get(
        &self,
        table: Table,
        keys: &[ItemKey],
    ) -> Result<HashMap<ItemKey, Item>, StoreError> {
        let table_name = self.table_name(table).to_string();
        let mut result = HashMap::with_capacity(keys.len());
        let mut pending: Vec<HashMap<String, AttributeValue>> = keys
            .iter()
            .map(|key| key_map(table, &key.pk, &key.sk))
            .collect();

        for _ in 0..BATCH_GET_PASSES {
            if pending.is_empty() {
                break;
            }
            let request_keys = KeysAndAttributes::builder()
                .set_keys(Some(std::mem::take(&mut pending)))
                .consistent_read(true)
                .build()
                .map_err(|e| StoreError::Validation(e.to_string()))?;

            let output = self
                .client
                .batch_get_item()
                .request_items(table_name.clone(), request_keys)
                .send()
                .await
                .map_err(classify)?;

            if let Some(mut responses) = output.responses {
                for map in responses.remove(&table_name).unwrap_or_default() {
                    let item = from_item_map(&map);
                    let pk = item.pk()?.to_string();
                    let sk = item.opt_s(ATTR_SK).unwrap_or_default().to_string();
                    result.insert(ItemKey { pk, sk }, item);
                }
            }
            pending = output
                .unprocessed_keys
                .and_then(|mut unprocessed| unprocessed.remove(&table_name))
                .map(|keys_and_attrs| keys_and_attrs.keys)
                .unwrap_or_default();
        }

        if !pending.is_empty() {
            return Err(StoreError::Unavailable(format!(
                "batch_get left {} keys unprocessed after {BATCH_GET_PASSES} passes",
                pending.len()
            )));
        }
        Ok(result)
    }

    async fn scan(&self, table: Table) -> Result<Vec<Item>, StoreError> {
        let mut items = Vec::new();
        let mut exclusive_start_key: Option<HashMap<String, AttributeValue>> = None;
        loop {
            let output = self
                .client
                .scan()
                .table_name(self.table_name(table))
                .set_exclusive_start_key(exclusive_start_key.take())
                .send()
                .await
                .map_err(classify)?;

            items.extend(output.items.unwrap_or_default().iter().map(from_item_map));
            match output.last_evaluated_key {
                Some(key) if !key.is_empty() => exclusive_start_key = Some(key),
                _ => break,
            }
        }
        Ok(items)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn condition_rendering_covers_the_lock_acquire_shape() {
        let cond = Condition::not_exists_or(Condition::AtMost(
            "expires_at",
            AttrValue::N("1700000000000".to_string()),
        ));
        let mut expr = ExprBuilder::default();
        let rendered = expr.condition(&cond);
        assert_eq!(rendered, "(attribute_not_exists(#n0)) OR (#n1 <= :v2)");
        let (names, values) = expr.into_maps();
        let names = names.unwrap();
        assert_eq!(names["#n0"], "Pk");
        assert_eq!(names["#n1"], "expires_at");
        assert_eq!(
            values.unwrap()[":v2"],
            AttributeValue::N("1700000000000".to_string())
        );
    }

    #[test]
    fn update_expression_assignments_are_placeholders() {
        let ops = vec![
            SetOp::new("current_balance", AttrValue::S("10.00".to_string())),
            SetOp::new("updated_at", AttrValue::S("2024-01-01T00:00:00Z".to_string())),
        ];
        let mut expr = ExprBuilder::default();
        let assignments: Vec<String> = ops
            .iter()
            .map(|op| format!("{} = {}", expr.name(op.attr), expr.value(&op.value)))
            .collect();
        assert_eq!(assignments.join(", "), "#n0 = :v1, #n2 = :v3");
    }

    #[test]
    fn item_maps_round_trip() {
        let mut item = Item::with_key("alice", "BALANCE");
        item.set_s("username", "alice");
        item.set_decimal("current_balance", "42.00".parse().unwrap());
        item.set_bool("is_active", true);
        item.set_n("version", "3");

        let round_tripped = from_item_map(&to_item_map(&item));
        assert_eq!(round_tripped, item);
    }
}
