//! Fiat balance row and its append-only transaction ledger.

use std::sync::Arc;

use chrono::Utc;
use rust_decimal::Decimal;
use tracing::{debug, warn};
use uuid::Uuid;

use crate::entities::{Balance, BalanceTransaction, SK_BALANCE};
use crate::error::CoreError;
use crate::store::{
    format_ts, AttrValue, Condition, KeyValueStore, Query, SetOp, StoreError, Table,
};

/// One page of ledger history, newest first. `next_cursor` feeds the next
/// call's `cursor` argument; `None` means the listing is exhausted.
#[derive(Debug)]
pub struct TransactionPage {
    pub items: Vec<BalanceTransaction>,
    pub next_cursor: Option<String>,
}

pub struct BalanceDao {
    store: Arc<dyn KeyValueStore>,
}

impl BalanceDao {
    pub fn new(store: Arc<dyn KeyValueStore>) -> Self {
        BalanceDao { store }
    }

    pub async fn get_balance(&self, username: &str) -> Result<Balance, CoreError> {
        let item = self
            .store
            .get(Table::Users, username, SK_BALANCE)
            .await?
            .ok_or_else(|| CoreError::not_found("balance", username))?;
        Ok(Balance::from_item(&item)?)
    }

    /// Create the balance row; happens exactly once, during registration.
    pub async fn create_balance(&self, balance: Balance) -> Result<Balance, CoreError> {
        match self
            .store
            .put(Table::Users, balance.to_item(), Some(Condition::NotExists))
            .await
        {
            Ok(()) => Ok(balance),
            Err(StoreError::ConditionFailed) => {
                Err(CoreError::already_exists("balance", &balance.username))
            }
            Err(err) => Err(err.into()),
        }
    }

    /// Write `current_balance` and `updated_at`. No check on the amount;
    /// callers enforce the non-negativity precondition under the lock.
    pub async fn update_balance(
        &self,
        username: &str,
        new_amount: Decimal,
    ) -> Result<Balance, CoreError> {
        let ops = vec![
            SetOp::new("current_balance", AttrValue::S(new_amount.to_string())),
            SetOp::new("updated_at", AttrValue::S(format_ts(Utc::now()))),
        ];
        let image = self
            .store
            .update(
                Table::Users,
                username,
                SK_BALANCE,
                ops,
                Some(Condition::Equals(
                    "entity_type",
                    AttrValue::S("balance".to_string()),
                )),
            )
            .await
            .map_err(|err| match err {
                StoreError::ConditionFailed => CoreError::not_found("balance", username),
                other => other.into(),
            })?;
        Ok(Balance::from_item(&image)?)
    }

    /// Append a ledger row. The sort key is the creation timestamp; if two
    /// entries land on the same microsecond the second gets a UUID suffix.
    pub async fn create_transaction(
        &self,
        transaction: BalanceTransaction,
    ) -> Result<BalanceTransaction, CoreError> {
        let mut transaction = transaction;
        match self
            .store
            .put(
                Table::Users,
                transaction.to_item(),
                Some(Condition::NotExists),
            )
            .await
        {
            Ok(()) => {}
            Err(StoreError::ConditionFailed) => {
                let suffix = Uuid::new_v4().simple().to_string();
                transaction.sort_key = format!("{}#{}", transaction.sort_key, &suffix[..8]);
                match self
                    .store
                    .put(
                        Table::Users,
                        transaction.to_item(),
                        Some(Condition::NotExists),
                    )
                    .await
                {
                    Ok(()) => {}
                    Err(StoreError::ConditionFailed) => {
                        return Err(CoreError::InternalError(
                            "ledger sort key collided twice".to_string(),
                        ))
                    }
                    Err(err) => return Err(err.into()),
                }
            }
            Err(err) => return Err(err.into()),
        }
        debug!(
            username = %transaction.username,
            transaction_id = %transaction.transaction_id,
            transaction_type = transaction.transaction_type.as_str(),
            amount = %transaction.amount,
            "ledger entry created"
        );
        Ok(transaction)
    }

    /// Fold a ledger entry into the balance row: read, add the signed
    /// amount, write back. Only sound under the user's lock, and not
    /// atomic with `create_transaction` - a failure here is compensated by
    /// `cleanup_failed_transaction`.
    pub async fn apply_transaction(
        &self,
        transaction: &BalanceTransaction,
    ) -> Result<Balance, CoreError> {
        let balance = self.get_balance(&transaction.username).await?;
        let new_amount = balance.current_balance + transaction.amount;
        self.update_balance(&transaction.username, new_amount).await
    }

    pub async fn list_transactions(
        &self,
        username: &str,
        limit: usize,
        cursor: Option<&str>,
    ) -> Result<TransactionPage, CoreError> {
        let mut query = Query::partition(BalanceTransaction::partition_key(username))
            .newest_first()
            .limit(limit);
        if let Some(cursor) = cursor {
            query = query.sk_before(cursor);
        }

        let items = self.store.query(Table::Users, query).await?;
        let transactions = items
            .iter()
            .map(BalanceTransaction::from_item)
            .collect::<Result<Vec<_>, _>>()?;
        let next_cursor = (transactions.len() == limit)
            .then(|| transactions.last().map(|tx| tx.sort_key.clone()))
            .flatten();
        Ok(TransactionPage {
            items: transactions,
            next_cursor,
        })
    }

    /// Best-effort removal of a ledger row whose balance application never
    /// happened. Used by compensating logic only; a miss is not an error.
    pub async fn cleanup_failed_transaction(
        &self,
        username: &str,
        transaction_id: Uuid,
    ) -> Result<bool, CoreError> {
        let partition = BalanceTransaction::partition_key(username);
        let items = self
            .store
            .query(
                Table::Users,
                Query::partition(&partition)
                    .newest_first()
                    .filter_equals(
                        "transaction_id",
                        AttrValue::S(transaction_id.to_string()),
                    )
                    .limit(1),
            )
            .await?;

        let Some(item) = items.first() else {
            warn!(%username, %transaction_id, "cleanup: ledger row not found");
            return Ok(false);
        };
        let sort_key = item.sk()?.to_string();
        self.store
            .delete(Table::Users, &partition, &sort_key, None)
            .await?;
        warn!(%username, %transaction_id, "cleanup: removed unapplied ledger row");
        Ok(true)
    }
}
