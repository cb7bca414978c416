//! Per-user distributed lock.
//!
//! A single TTL'd row per user serializes every balance- and
//! order-affecting operation. The lock is advisory: only code paths that
//! acquire it are serialized, and all mutation paths in `txn` do. Acquire
//! is one conditional put - "no row, or the row has expired" - so two
//! replicas racing for the same user resolve at the store, not in memory.
//!
//! There is no cancellation token. A holder that dies leaks the lock until
//! the TTL elapses, which the short TTLs bound.

use std::future::Future;
use std::panic::AssertUnwindSafe;
use std::sync::Arc;

use chrono::{Duration, Utc};
use futures::FutureExt;
use tracing::{debug, warn};
use uuid::Uuid;

use crate::entities::{UserLock, SK_LOCK};
use crate::error::CoreError;
use crate::store::{AttrValue, Condition, KeyValueStore, StoreError, Table};

/// Operations that take the user lock, each with its own TTL. TTLs exceed
/// the expected p99 of the critical section while bounding how long a
/// crashed holder blocks the user.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LockOperation {
    Deposit,
    Withdraw,
    BuyOrder,
    SellOrder,
    GetBalance,
}

impl LockOperation {
    pub fn as_str(self) -> &'static str {
        match self {
            LockOperation::Deposit => "deposit",
            LockOperation::Withdraw => "withdraw",
            LockOperation::BuyOrder => "buy_order",
            LockOperation::SellOrder => "sell_order",
            LockOperation::GetBalance => "get_balance",
        }
    }

    pub fn ttl(self) -> Duration {
        match self {
            LockOperation::Deposit | LockOperation::Withdraw => Duration::seconds(2),
            LockOperation::BuyOrder | LockOperation::SellOrder => Duration::seconds(5),
            LockOperation::GetBalance => Duration::seconds(1),
        }
    }
}

pub struct LockManager {
    store: Arc<dyn KeyValueStore>,
}

impl LockManager {
    pub fn new(store: Arc<dyn KeyValueStore>) -> Self {
        LockManager { store }
    }

    /// Acquire the user's lock with the operation's default TTL. Returns
    /// the owner token `release` must present. Failure to acquire is not
    /// retried here; callers surface it with a retry hint.
    pub async fn acquire(
        &self,
        username: &str,
        operation: LockOperation,
    ) -> Result<String, CoreError> {
        self.acquire_with_ttl(username, operation, operation.ttl())
            .await
    }

    pub async fn acquire_with_ttl(
        &self,
        username: &str,
        operation: LockOperation,
        ttl: Duration,
    ) -> Result<String, CoreError> {
        let now = Utc::now();
        let lock = UserLock {
            username: username.to_string(),
            lock_id: Uuid::new_v4().to_string(),
            operation: operation.as_str().to_string(),
            expires_at: now + ttl,
            request_id: Uuid::new_v4().to_string(),
            created_at: now,
            updated_at: now,
        };

        // The row may be taken if it does not exist, or exists but expired.
        let condition = Condition::not_exists_or(Condition::AtMost(
            "expires_at",
            AttrValue::N(now.timestamp_millis().to_string()),
        ));

        match self
            .store
            .put(Table::Users, lock.to_item(), Some(condition))
            .await
        {
            Ok(()) => {
                debug!(%username, operation = operation.as_str(), lock_id = %lock.lock_id, "lock acquired");
                Ok(lock.lock_id)
            }
            Err(StoreError::ConditionFailed) => {
                warn!(%username, operation = operation.as_str(), "lock busy");
                Err(CoreError::LockAcquireFailed {
                    username: username.to_string(),
                    operation: operation.as_str().to_string(),
                })
            }
            Err(err) => Err(err.into()),
        }
    }

    /// Idempotent release. `false` means the token no longer owns the row
    /// (already released, expired, or reassigned) - not an error.
    pub async fn release(&self, username: &str, lock_token: &str) -> Result<bool, CoreError> {
        let partition = UserLock::partition_key(username);
        match self
            .store
            .delete(
                Table::Users,
                &partition,
                SK_LOCK,
                Some(Condition::Equals(
                    "lock_id",
                    AttrValue::S(lock_token.to_string()),
                )),
            )
            .await
        {
            Ok(()) => {
                debug!(%username, lock_id = %lock_token, "lock released");
                Ok(true)
            }
            Err(StoreError::ConditionFailed) => {
                debug!(%username, lock_id = %lock_token, "lock already gone");
                Ok(false)
            }
            Err(err) => Err(err.into()),
        }
    }

    /// Run `critical` with the lock held, releasing on every exit path -
    /// success, error, or panic (the panic is resumed after release).
    pub async fn with_lock<T, F, Fut>(
        &self,
        username: &str,
        operation: LockOperation,
        critical: F,
    ) -> Result<T, CoreError>
    where
        F: FnOnce() -> Fut,
        Fut: Future<Output = Result<T, CoreError>>,
    {
        let token = self.acquire(username, operation).await?;

        let outcome = AssertUnwindSafe(critical()).catch_unwind().await;

        match self.release(username, &token).await {
            Ok(true) => {}
            Ok(false) => {
                warn!(%username, operation = operation.as_str(), "lock expired before release")
            }
            Err(err) => warn!(%username, %err, "lock release failed"),
        }

        match outcome {
            Ok(result) => result,
            Err(panic) => std::panic::resume_unwind(panic),
        }
    }
}
