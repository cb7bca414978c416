//! Untyped-but-disciplined item model for the wide-column store.
//!
//! An [`Item`] is an attribute map; values are strings, numbers or bools.
//! Money and crypto amounts are always persisted as strings to preserve
//! decimal precision; timestamps as fixed-width RFC 3339 UTC strings so
//! lexicographic order equals chronological order. Numbers (`N`) are kept
//! for attributes that need numeric comparison in conditions (lock expiry
//! as epoch milliseconds).

use std::collections::BTreeMap;

use chrono::{DateTime, SecondsFormat, Utc};
use rust_decimal::Decimal;

use super::StoreError;
use crate::money;

/// Attribute names shared by every table.
pub const ATTR_PK: &str = "Pk";
pub const ATTR_SK: &str = "Sk";

#[derive(Debug, Clone, PartialEq)]
pub enum AttrValue {
    S(String),
    N(String),
    Bool(bool),
}

impl AttrValue {
    pub fn as_s(&self) -> Option<&str> {
        match self {
            AttrValue::S(s) => Some(s),
            _ => None,
        }
    }

    pub fn as_n(&self) -> Option<&str> {
        match self {
            AttrValue::N(n) => Some(n),
            _ => None,
        }
    }
}

/// Serialize a timestamp the way every `Sk`/timestamp attribute stores it.
pub fn format_ts(ts: DateTime<Utc>) -> String {
    ts.to_rfc3339_opts(SecondsFormat::Micros, true)
}

#[derive(Debug, Clone, Default, PartialEq)]
pub struct Item(BTreeMap<String, AttrValue>);

impl Item {
    pub fn new(pk: impl Into<String>) -> Self {
        let mut item = Item(BTreeMap::new());
        item.set_s(ATTR_PK, pk);
        item
    }

    pub fn with_key(pk: impl Into<String>, sk: impl Into<String>) -> Self {
        let mut item = Item::new(pk);
        item.set_s(ATTR_SK, sk);
        item
    }

    pub fn set_s(&mut self, attr: &str, value: impl Into<String>) -> &mut Self {
        self.0.insert(attr.to_string(), AttrValue::S(value.into()));
        self
    }

    pub fn set_opt_s(&mut self, attr: &str, value: Option<impl Into<String>>) -> &mut Self {
        if let Some(v) = value {
            self.set_s(attr, v);
        }
        self
    }

    pub fn set_n(&mut self, attr: &str, value: impl Into<String>) -> &mut Self {
        self.0.insert(attr.to_string(), AttrValue::N(value.into()));
        self
    }

    pub fn set_decimal(&mut self, attr: &str, value: Decimal) -> &mut Self {
        self.set_s(attr, value.to_string())
    }

    pub fn set_ts(&mut self, attr: &str, value: DateTime<Utc>) -> &mut Self {
        self.set_s(attr, format_ts(value))
    }

    pub fn set_epoch_ms(&mut self, attr: &str, value: DateTime<Utc>) -> &mut Self {
        self.set_n(attr, value.timestamp_millis().to_string())
    }

    pub fn set_bool(&mut self, attr: &str, value: bool) -> &mut Self {
        self.0.insert(attr.to_string(), AttrValue::Bool(value));
        self
    }

    pub fn get(&self, attr: &str) -> Option<&AttrValue> {
        self.0.get(attr)
    }

    pub fn opt_s(&self, attr: &str) -> Option<&str> {
        self.0.get(attr).and_then(AttrValue::as_s)
    }

    pub fn get_s(&self, attr: &str) -> Result<&str, StoreError> {
        self.opt_s(attr)
            .ok_or_else(|| corrupt(attr, "missing string attribute"))
    }

    pub fn get_decimal(&self, attr: &str) -> Result<Decimal, StoreError> {
        let raw = self.get_s(attr)?;
        money::parse_decimal(raw).map_err(|_| corrupt(attr, "not a decimal string"))
    }

    pub fn get_ts(&self, attr: &str) -> Result<DateTime<Utc>, StoreError> {
        let raw = self.get_s(attr)?;
        DateTime::parse_from_rfc3339(raw)
            .map(|dt| dt.with_timezone(&Utc))
            .map_err(|_| corrupt(attr, "not an RFC 3339 timestamp"))
    }

    pub fn get_epoch_ms(&self, attr: &str) -> Result<DateTime<Utc>, StoreError> {
        let raw = self
            .0
            .get(attr)
            .and_then(AttrValue::as_n)
            .ok_or_else(|| corrupt(attr, "missing numeric attribute"))?;
        let ms: i64 = raw
            .parse()
            .map_err(|_| corrupt(attr, "not an integer millisecond timestamp"))?;
        DateTime::from_timestamp_millis(ms)
            .ok_or_else(|| corrupt(attr, "millisecond timestamp out of range"))
    }

    pub fn get_bool(&self, attr: &str) -> Result<bool, StoreError> {
        match self.0.get(attr) {
            Some(AttrValue::Bool(b)) => Ok(*b),
            _ => Err(corrupt(attr, "missing boolean attribute")),
        }
    }

    pub fn pk(&self) -> Result<&str, StoreError> {
        self.get_s(ATTR_PK)
    }

    pub fn sk(&self) -> Result<&str, StoreError> {
        self.get_s(ATTR_SK)
    }

    pub fn attrs(&self) -> impl Iterator<Item = (&String, &AttrValue)> {
        self.0.iter()
    }
}

fn corrupt(attr: &str, what: &str) -> StoreError {
    StoreError::Corrupt(format!("attribute '{attr}': {what}"))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn timestamps_round_trip_and_sort_lexicographically() {
        let earlier = Utc::now();
        let later = earlier + chrono::Duration::microseconds(1);

        let mut item = Item::with_key("u1", "BALANCE");
        item.set_ts("created_at", earlier);
        assert_eq!(item.get_ts("created_at").unwrap(), earlier);

        assert!(format_ts(earlier) < format_ts(later));
    }

    #[test]
    fn decimal_attributes_are_strings() {
        let mut item = Item::with_key("u1", "BALANCE");
        item.set_decimal("current_balance", "100.10".parse().unwrap());
        assert_eq!(item.opt_s("current_balance"), Some("100.10"));
        assert_eq!(
            item.get_decimal("current_balance").unwrap(),
            "100.10".parse::<Decimal>().unwrap()
        );
    }

    #[test]
    fn missing_attributes_surface_as_corrupt() {
        let item = Item::with_key("u1", "USER");
        assert!(matches!(
            item.get_decimal("current_balance"),
            Err(StoreError::Corrupt(_))
        ));
    }
}
