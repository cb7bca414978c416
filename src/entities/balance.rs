//! Fiat balance and its append-only ledger.

use chrono::{DateTime, Utc};
use rust_decimal::Decimal;
use serde::Serialize;
use uuid::Uuid;

use crate::store::{format_ts, Item, StoreError};

pub const SK_BALANCE: &str = "BALANCE";
/// Ledger rows live under `TRANS#<username>`.
pub const TRANS_PK_PREFIX: &str = "TRANS#";

/// The user's cash position. Mutated only by applying ledger entries;
/// `current_balance` equals the sum of all the user's transaction amounts.
#[derive(Debug, Clone, Serialize)]
pub struct Balance {
    pub username: String,
    pub current_balance: Decimal,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl Balance {
    pub fn new_zero(username: &str) -> Self {
        let now = Utc::now();
        Balance {
            username: username.to_string(),
            current_balance: Decimal::new(0, 2),
            created_at: now,
            updated_at: now,
        }
    }

    pub fn key(username: &str) -> (String, &'static str) {
        (username.to_string(), SK_BALANCE)
    }

    pub fn to_item(&self) -> Item {
        let mut item = Item::with_key(&self.username, SK_BALANCE);
        item.set_s("entity_type", "balance")
            .set_s("username", &self.username)
            .set_decimal("current_balance", self.current_balance)
            .set_ts("created_at", self.created_at)
            .set_ts("updated_at", self.updated_at);
        item
    }

    pub fn from_item(item: &Item) -> Result<Self, StoreError> {
        Ok(Balance {
            username: item.get_s("username")?.to_string(),
            current_balance: item.get_decimal("current_balance")?,
            created_at: item.get_ts("created_at")?,
            updated_at: item.get_ts("updated_at")?,
        })
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum TransactionType {
    Deposit,
    Withdraw,
    OrderPayment,
    OrderSale,
    Refund,
}

impl TransactionType {
    pub fn as_str(self) -> &'static str {
        match self {
            TransactionType::Deposit => "DEPOSIT",
            TransactionType::Withdraw => "WITHDRAW",
            TransactionType::OrderPayment => "ORDER_PAYMENT",
            TransactionType::OrderSale => "ORDER_SALE",
            TransactionType::Refund => "REFUND",
        }
    }

    pub fn parse(raw: &str) -> Option<Self> {
        match raw {
            "DEPOSIT" => Some(TransactionType::Deposit),
            "WITHDRAW" => Some(TransactionType::Withdraw),
            "ORDER_PAYMENT" => Some(TransactionType::OrderPayment),
            "ORDER_SALE" => Some(TransactionType::OrderSale),
            "REFUND" => Some(TransactionType::Refund),
            _ => None,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum TransactionStatus {
    Pending,
    Completed,
    Failed,
}

impl TransactionStatus {
    pub fn as_str(self) -> &'static str {
        match self {
            TransactionStatus::Pending => "PENDING",
            TransactionStatus::Completed => "COMPLETED",
            TransactionStatus::Failed => "FAILED",
        }
    }

    pub fn parse(raw: &str) -> Option<Self> {
        match raw {
            "PENDING" => Some(TransactionStatus::Pending),
            "COMPLETED" => Some(TransactionStatus::Completed),
            "FAILED" => Some(TransactionStatus::Failed),
            _ => None,
        }
    }
}

/// One signed ledger entry on a user's cash account. Append-only: rows are
/// never mutated once written (compensation writes a new opposing row; the
/// only deletion is `cleanup_failed_transaction` reverting a row whose
/// balance application never happened).
#[derive(Debug, Clone, Serialize)]
pub struct BalanceTransaction {
    pub transaction_id: Uuid,
    pub username: String,
    pub transaction_type: TransactionType,
    /// Signed: positive credits, negative debits.
    pub amount: Decimal,
    pub description: String,
    pub status: TransactionStatus,
    pub reference_id: Option<String>,
    pub created_at: DateTime<Utc>,
    /// Sort key as persisted; the timestamp, plus a `#<uuid>` suffix when
    /// two entries collide on the same microsecond.
    pub sort_key: String,
}

impl BalanceTransaction {
    pub fn new(
        username: &str,
        transaction_type: TransactionType,
        amount: Decimal,
        description: impl Into<String>,
        reference_id: Option<String>,
    ) -> Self {
        let created_at = Utc::now();
        BalanceTransaction {
            transaction_id: Uuid::new_v4(),
            username: username.to_string(),
            transaction_type,
            amount,
            description: description.into(),
            status: TransactionStatus::Completed,
            reference_id,
            created_at,
            sort_key: format_ts(created_at),
        }
    }

    pub fn partition_key(username: &str) -> String {
        format!("{TRANS_PK_PREFIX}{username}")
    }

    pub fn to_item(&self) -> Item {
        let mut item = Item::with_key(Self::partition_key(&self.username), &self.sort_key);
        item.set_s("entity_type", "balance_transaction")
            .set_s("transaction_id", self.transaction_id.to_string())
            .set_s("username", &self.username)
            .set_s("transaction_type", self.transaction_type.as_str())
            .set_decimal("amount", self.amount)
            .set_s("description", &self.description)
            .set_s("status", self.status.as_str())
            .set_opt_s("reference_id", self.reference_id.clone())
            .set_ts("created_at", self.created_at);
        item
    }

    pub fn from_item(item: &Item) -> Result<Self, StoreError> {
        let type_raw = item.get_s("transaction_type")?;
        let transaction_type = TransactionType::parse(type_raw).ok_or_else(|| {
            StoreError::Corrupt(format!("unknown transaction_type '{type_raw}'"))
        })?;
        let status_raw = item.get_s("status")?;
        let status = TransactionStatus::parse(status_raw)
            .ok_or_else(|| StoreError::Corrupt(format!("unknown status '{status_raw}'")))?;
        let id_raw = item.get_s("transaction_id")?;
        let transaction_id = Uuid::parse_str(id_raw)
            .map_err(|_| StoreError::Corrupt(format!("bad transaction_id '{id_raw}'")))?;
        Ok(BalanceTransaction {
            transaction_id,
            username: item.get_s("username")?.to_string(),
            transaction_type,
            amount: item.get_decimal("amount")?,
            description: item.get_s("description")?.to_string(),
            status,
            reference_id: item.opt_s("reference_id").map(str::to_string),
            created_at: item.get_ts("created_at")?,
            sort_key: item.sk()?.to_string(),
        })
    }
}
