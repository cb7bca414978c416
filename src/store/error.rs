use thiserror::Error;

/// Closed failure set of the store adapter.
///
/// `ConditionFailed` is never retried by the adapter; it is the signal the
/// DAOs translate into domain meaning (already exists, lock busy, stale
/// token). Transient transport failures come back as `Unavailable` after
/// the adapter's bounded retries are exhausted.
#[derive(Debug, Error)]
pub enum StoreError {
    #[error("conditional write failed")]
    ConditionFailed,

    #[error("invalid store request: {0}")]
    Validation(String),

    #[error("store unavailable: {0}")]
    Unavailable(String),

    #[error("corrupt item: {0}")]
    Corrupt(String),
}
