//! Asset trade ledger.

use std::sync::Arc;

use uuid::Uuid;

use crate::entities::AssetTransaction;
use crate::error::CoreError;
use crate::store::{Condition, KeyValueStore, Query, StoreError, Table};

pub struct AssetTransactionDao {
    store: Arc<dyn KeyValueStore>,
}

impl AssetTransactionDao {
    pub fn new(store: Arc<dyn KeyValueStore>) -> Self {
        AssetTransactionDao { store }
    }

    /// Append-only insert; timestamp collisions get a UUID suffix like the
    /// cash ledger.
    pub async fn create(
        &self,
        transaction: AssetTransaction,
    ) -> Result<AssetTransaction, CoreError> {
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
            Ok(()) => Ok(transaction),
            Err(StoreError::ConditionFailed) => {
                let suffix = Uuid::new_v4().simple().to_string();
                transaction.sort_key = format!("{}#{}", transaction.sort_key, &suffix[..8]);
                self.store
                    .put(
                        Table::Users,
                        transaction.to_item(),
                        Some(Condition::NotExists),
                    )
                    .await
                    .map_err(|err| match err {
                        StoreError::ConditionFailed => CoreError::InternalError(
                            "asset ledger sort key collided twice".to_string(),
                        ),
                        other => other.into(),
                    })?;
                Ok(transaction)
            }
            Err(err) => Err(err.into()),
        }
    }

    /// Newest-first trade history for one (user, asset) pair.
    pub async fn list(
        &self,
        username: &str,
        asset_id: &str,
        limit: usize,
    ) -> Result<Vec<AssetTransaction>, CoreError> {
        let items = self
            .store
            .query(
                Table::Users,
                Query::partition(AssetTransaction::partition_key(username, asset_id))
                    .newest_first()
                    .limit(limit),
            )
            .await?;
        items
            .iter()
            .map(|item| AssetTransaction::from_item(item).map_err(CoreError::from))
            .collect()
    }
}
