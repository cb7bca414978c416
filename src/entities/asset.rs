//! Inventory assets, per-user asset holdings and their trade ledger.

use chrono::{DateTime, Utc};
use rust_decimal::Decimal;
use serde::Serialize;

use crate::store::{format_ts, Item, StoreError};
use super::balance::TRANS_PK_PREFIX;

/// Holdings live under `Sk = ASSET#<asset_id>` in the users table.
pub const ASSET_SK_PREFIX: &str = "ASSET#";

/// A tradable asset in the global inventory. The core only reads these;
/// the inventory collaborator owns their lifecycle.
#[derive(Debug, Clone, Serialize)]
pub struct Asset {
    pub asset_id: String,
    pub name: String,
    pub category: String,
    pub price_usd: Decimal,
    pub amount: Decimal,
    pub is_active: bool,
}

impl Asset {
    pub fn to_item(&self) -> Item {
        let mut item = Item::new(&self.asset_id);
        item.set_s("entity_type", "asset")
            .set_s("asset_id", &self.asset_id)
            .set_s("name", &self.name)
            .set_s("category", &self.category)
            .set_decimal("price_usd", self.price_usd)
            .set_decimal("amount", self.amount)
            // An asset without a price must never be purchasable.
            .set_bool("is_active", self.is_active && !self.price_usd.is_zero());
        item
    }

    pub fn from_item(item: &Item) -> Result<Self, StoreError> {
        Ok(Asset {
            asset_id: item.get_s("asset_id")?.to_string(),
            name: item.get_s("name")?.to_string(),
            category: item.get_s("category")?.to_string(),
            price_usd: item.get_decimal("price_usd")?,
            amount: item.get_decimal("amount")?,
            is_active: item.get_bool("is_active")?,
        })
    }
}

/// Per-(user, asset) quantity holding.
#[derive(Debug, Clone, Serialize)]
pub struct AssetBalance {
    pub username: String,
    pub asset_id: String,
    pub quantity: Decimal,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl AssetBalance {
    pub fn sort_key(asset_id: &str) -> String {
        format!("{ASSET_SK_PREFIX}{asset_id}")
    }

    pub fn to_item(&self) -> Item {
        let mut item = Item::with_key(&self.username, Self::sort_key(&self.asset_id));
        item.set_s("entity_type", "asset_balance")
            .set_s("username", &self.username)
            .set_s("asset_id", &self.asset_id)
            .set_decimal("quantity", self.quantity)
            .set_ts("created_at", self.created_at)
            .set_ts("updated_at", self.updated_at);
        item
    }

    pub fn from_item(item: &Item) -> Result<Self, StoreError> {
        Ok(AssetBalance {
            username: item.get_s("username")?.to_string(),
            asset_id: item.get_s("asset_id")?.to_string(),
            quantity: item.get_decimal("quantity")?,
            created_at: item.get_ts("created_at")?,
            updated_at: item.get_ts("updated_at")?,
        })
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum AssetTransactionType {
    Buy,
    Sell,
}

impl AssetTransactionType {
    pub fn as_str(self) -> &'static str {
        match self {
            AssetTransactionType::Buy => "BUY",
            AssetTransactionType::Sell => "SELL",
        }
    }

    pub fn parse(raw: &str) -> Option<Self> {
        match raw {
            "BUY" => Some(AssetTransactionType::Buy),
            "SELL" => Some(AssetTransactionType::Sell),
            _ => None,
        }
    }
}

/// Append-only ledger entry for one executed buy or sell, keyed under
/// `TRANS#<username>#<asset_id>`. Always references an existing order.
#[derive(Debug, Clone, Serialize)]
pub struct AssetTransaction {
    pub username: String,
    pub asset_id: String,
    pub transaction_type: AssetTransactionType,
    pub quantity: Decimal,
    pub price: Decimal,
    pub total_amount: Decimal,
    pub order_id: String,
    pub created_at: DateTime<Utc>,
    pub sort_key: String,
}

impl AssetTransaction {
    pub fn new(
        username: &str,
        asset_id: &str,
        transaction_type: AssetTransactionType,
        quantity: Decimal,
        price: Decimal,
        total_amount: Decimal,
        order_id: &str,
    ) -> Self {
        let created_at = Utc::now();
        AssetTransaction {
            username: username.to_string(),
            asset_id: asset_id.to_string(),
            transaction_type,
            quantity,
            price,
            total_amount,
            order_id: order_id.to_string(),
            created_at,
            sort_key: format_ts(created_at),
        }
    }

    pub fn partition_key(username: &str, asset_id: &str) -> String {
        format!("{TRANS_PK_PREFIX}{username}#{asset_id}")
    }

    pub fn to_item(&self) -> Item {
        let mut item = Item::with_key(
            Self::partition_key(&self.username, &self.asset_id),
            &self.sort_key,
        );
        item.set_s("entity_type", "asset_transaction")
            .set_s("username", &self.username)
            .set_s("asset_id", &self.asset_id)
            .set_s("transaction_type", self.transaction_type.as_str())
            .set_decimal("quantity", self.quantity)
            .set_decimal("price", self.price)
            .set_decimal("total_amount", self.total_amount)
            .set_s("order_id", &self.order_id)
            .set_ts("created_at", self.created_at);
        item
    }

    pub fn from_item(item: &Item) -> Result<Self, StoreError> {
        let type_raw = item.get_s("transaction_type")?;
        let transaction_type = AssetTransactionType::parse(type_raw).ok_or_else(|| {
            StoreError::Corrupt(format!("unknown asset transaction type '{type_raw}'"))
        })?;
        Ok(AssetTransaction {
            username: item.get_s("username")?.to_string(),
            asset_id: item.get_s("asset_id")?.to_string(),
            transaction_type,
            quantity: item.get_decimal("quantity")?,
            price: item.get_decimal("price")?,
            total_amount: item.get_decimal("total_amount")?,
            order_id: item.get_s("order_id")?.to_string(),
            created_at: item.get_ts("created_at")?,
            sort_key: item.sk()?.to_string(),
        })
    }
}
