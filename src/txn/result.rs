//! Unified result of a transaction manager operation.

use rust_decimal::Decimal;
use serde::Serialize;

use crate::entities::{
    AssetBalance, Balance, BalanceTransaction, Order, TransactionStatus, TransactionType,
};

/// What every transactional operation hands back: the final balance plus
/// whichever artifacts the operation produced. Deposit/withdraw carry the
/// ledger entry; buy/sell carry the order and asset fields.
#[derive(Debug, Serialize)]
pub struct TransactionResult {
    pub status: TransactionStatus,
    pub transaction_type: TransactionType,
    pub transaction_amount: Decimal,
    pub balance: Balance,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub asset_id: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub asset_quantity: Option<Decimal>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub asset_balance: Option<AssetBalance>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub order: Option<Order>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub transaction: Option<BalanceTransaction>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
}

impl TransactionResult {
    /// Result of a cash-only movement (deposit, withdraw).
    pub fn transfer(
        transaction_type: TransactionType,
        amount: Decimal,
        balance: Balance,
        transaction: BalanceTransaction,
    ) -> Self {
        TransactionResult {
            status: TransactionStatus::Completed,
            transaction_type,
            transaction_amount: amount,
            balance,
            asset_id: None,
            asset_quantity: None,
            asset_balance: None,
            order: None,
            transaction: Some(transaction),
            error: None,
        }
    }

    /// Result of an executed order (buy, sell).
    pub fn executed_order(
        transaction_type: TransactionType,
        amount: Decimal,
        balance: Balance,
        order: Order,
        asset_quantity: Decimal,
        asset_balance: AssetBalance,
    ) -> Self {
        TransactionResult {
            status: TransactionStatus::Completed,
            transaction_type,
            transaction_amount: amount,
            balance,
            asset_id: Some(order.asset_id.clone()),
            asset_quantity: Some(asset_quantity),
            asset_balance: Some(asset_balance),
            order: Some(order),
            transaction: None,
            error: None,
        }
    }
}
