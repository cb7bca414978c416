//! Orders and their status machine.

use chrono::{DateTime, Utc};
use rust_decimal::Decimal;
use serde::Serialize;
use uuid::Uuid;

use crate::store::{Item, StoreError};

pub const SK_ORDER: &str = "ORDER";

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum OrderType {
    MarketBuy,
    MarketSell,
    LimitBuy,
    LimitSell,
}

impl OrderType {
    pub fn as_str(self) -> &'static str {
        match self {
            OrderType::MarketBuy => "market_buy",
            OrderType::MarketSell => "market_sell",
            OrderType::LimitBuy => "limit_buy",
            OrderType::LimitSell => "limit_sell",
        }
    }

    pub fn parse(raw: &str) -> Option<Self> {
        match raw {
            "market_buy" => Some(OrderType::MarketBuy),
            "market_sell" => Some(OrderType::MarketSell),
            "limit_buy" => Some(OrderType::LimitBuy),
            "limit_sell" => Some(OrderType::LimitSell),
            _ => None,
        }
    }

    pub fn is_buy(self) -> bool {
        matches!(self, OrderType::MarketBuy | OrderType::LimitBuy)
    }

    pub fn is_market(self) -> bool {
        matches!(self, OrderType::MarketBuy | OrderType::MarketSell)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum OrderStatus {
    Pending,
    Confirmed,
    Queued,
    Triggered,
    Processing,
    Completed,
    Cancelled,
    Failed,
    Expired,
}

impl OrderStatus {
    pub fn as_str(self) -> &'static str {
        match self {
            OrderStatus::Pending => "PENDING",
            OrderStatus::Confirmed => "CONFIRMED",
            OrderStatus::Queued => "QUEUED",
            OrderStatus::Triggered => "TRIGGERED",
            OrderStatus::Processing => "PROCESSING",
            OrderStatus::Completed => "COMPLETED",
            OrderStatus::Cancelled => "CANCELLED",
            OrderStatus::Failed => "FAILED",
            OrderStatus::Expired => "EXPIRED",
        }
    }

    pub fn parse(raw: &str) -> Option<Self> {
        match raw {
            "PENDING" => Some(OrderStatus::Pending),
            "CONFIRMED" => Some(OrderStatus::Confirmed),
            "QUEUED" => Some(OrderStatus::Queued),
            "TRIGGERED" => Some(OrderStatus::Triggered),
            "PROCESSING" => Some(OrderStatus::Processing),
            "COMPLETED" => Some(OrderStatus::Completed),
            "CANCELLED" => Some(OrderStatus::Cancelled),
            "FAILED" => Some(OrderStatus::Failed),
            "EXPIRED" => Some(OrderStatus::Expired),
            _ => None,
        }
    }

    pub fn is_terminal(self) -> bool {
        matches!(
            self,
            OrderStatus::Completed
                | OrderStatus::Cancelled
                | OrderStatus::Failed
                | OrderStatus::Expired
        )
    }

    /// Whether `next` is a permitted successor of `self`.
    pub fn can_transition_to(self, next: OrderStatus) -> bool {
        use OrderStatus::*;
        match self {
            Pending => matches!(next, Confirmed | Cancelled | Failed),
            Confirmed => matches!(next, Queued | Processing | Cancelled),
            Queued => matches!(next, Triggered | Cancelled | Expired),
            Triggered => matches!(next, Processing | Failed),
            Processing => matches!(next, Completed | Failed),
            Completed | Cancelled | Failed | Expired => false,
        }
    }

    /// Statuses only system actors may assign.
    pub fn system_only(self) -> bool {
        matches!(self, OrderStatus::Failed | OrderStatus::Expired)
    }

    /// Statuses from which the owning user may cancel.
    pub fn user_cancellable(self) -> bool {
        matches!(
            self,
            OrderStatus::Pending | OrderStatus::Confirmed | OrderStatus::Queued
        )
    }
}

/// A record of intent to buy or sell. Market orders collapse the
/// PENDING -> PROCESSING -> COMPLETED path and are written COMPLETED.
#[derive(Debug, Clone, Serialize)]
pub struct Order {
    pub order_id: String,
    pub username: String,
    pub order_type: OrderType,
    pub status: OrderStatus,
    pub asset_id: String,
    pub quantity: Decimal,
    pub price: Decimal,
    pub total_amount: Decimal,
    pub status_reason: Option<String>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl Order {
    /// Ids look like `ord_1a2b3c4d_1714761600`.
    pub fn generate_id(now: DateTime<Utc>) -> String {
        let uuid = Uuid::new_v4().simple().to_string();
        format!("ord_{}_{}", &uuid[..8], now.timestamp())
    }

    pub fn to_item(&self) -> Item {
        let mut item = Item::with_key(&self.order_id, SK_ORDER);
        item.set_s("entity_type", "order")
            .set_s("order_id", &self.order_id)
            .set_s("username", &self.username)
            .set_s("order_type", self.order_type.as_str())
            .set_s("status", self.status.as_str())
            .set_s("asset_id", &self.asset_id)
            .set_decimal("quantity", self.quantity)
            .set_decimal("price", self.price)
            .set_decimal("total_amount", self.total_amount)
            .set_opt_s("status_reason", self.status_reason.clone())
            .set_ts("created_at", self.created_at)
            .set_ts("updated_at", self.updated_at);
        item
    }

    pub fn from_item(item: &Item) -> Result<Self, StoreError> {
        let type_raw = item.get_s("order_type")?;
        let order_type = OrderType::parse(type_raw)
            .ok_or_else(|| StoreError::Corrupt(format!("unknown order_type '{type_raw}'")))?;
        let status_raw = item.get_s("status")?;
        let status = OrderStatus::parse(status_raw)
            .ok_or_else(|| StoreError::Corrupt(format!("unknown status '{status_raw}'")))?;
        Ok(Order {
            order_id: item.get_s("order_id")?.to_string(),
            username: item.get_s("username")?.to_string(),
            order_type,
            status,
            asset_id: item.get_s("asset_id")?.to_string(),
            quantity: item.get_decimal("quantity")?,
            price: item.get_decimal("price")?,
            total_amount: item.get_decimal("total_amount")?,
            status_reason: item.opt_s("status_reason").map(str::to_string),
            created_at: item.get_ts("created_at")?,
            updated_at: item.get_ts("updated_at")?,
        })
    }
}
