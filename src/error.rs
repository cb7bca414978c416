//! The closed error taxonomy the core emits to collaborators.
//!
//! Every DAO, the lock manager and the transaction manager fail with one of
//! these kinds and nothing else. User-visible preconditions
//! (`InsufficientBalance`, `EntityNotFound`, ...) are never wrapped into
//! `InternalError` on the way out; the HTTP layer maps each kind to a fixed
//! status code.

use thiserror::Error;

use crate::store::StoreError;

#[derive(Debug, Error)]
pub enum CoreError {
    #[error("validation failed: {0}")]
    Validation(String),

    #[error("invalid credentials")]
    InvalidCredentials,

    #[error("access denied: {0}")]
    AccessDenied(String),

    #[error("{entity} '{key}' not found")]
    EntityNotFound { entity: &'static str, key: String },

    #[error("{entity} '{key}' already exists")]
    EntityAlreadyExists { entity: &'static str, key: String },

    #[error("insufficient balance: available {available}, required {required}")]
    InsufficientBalance {
        available: rust_decimal::Decimal,
        required: rust_decimal::Decimal,
    },

    #[error("insufficient asset balance for {asset_id}: available {available}, required {required}")]
    InsufficientAssetBalance {
        asset_id: String,
        available: rust_decimal::Decimal,
        required: rust_decimal::Decimal,
    },

    #[error("could not acquire lock for user '{username}' ({operation})")]
    LockAcquireFailed { username: String, operation: String },

    #[error("invariant violation: {0}")]
    InvariantViolation(String),

    #[error("store unavailable: {0}")]
    StoreUnavailable(String),

    #[error("internal error: {0}")]
    InternalError(String),
}

impl CoreError {
    pub fn not_found(entity: &'static str, key: impl Into<String>) -> Self {
        CoreError::EntityNotFound {
            entity,
            key: key.into(),
        }
    }

    pub fn already_exists(entity: &'static str, key: impl Into<String>) -> Self {
        CoreError::EntityAlreadyExists {
            entity,
            key: key.into(),
        }
    }

    /// Machine-readable kind, stable across releases.
    pub fn kind(&self) -> &'static str {
        match self {
            CoreError::Validation(_) => "ValidationError",
            CoreError::InvalidCredentials => "InvalidCredentials",
            CoreError::AccessDenied(_) => "AccessDenied",
            CoreError::EntityNotFound { .. } => "EntityNotFound",
            CoreError::EntityAlreadyExists { .. } => "EntityAlreadyExists",
            CoreError::InsufficientBalance { .. } => "InsufficientBalance",
            CoreError::InsufficientAssetBalance { .. } => "InsufficientAssetBalance",
            CoreError::LockAcquireFailed { .. } => "LockAcquireFailed",
            CoreError::InvariantViolation(_) => "InvariantViolation",
            CoreError::StoreUnavailable(_) => "StoreUnavailable",
            CoreError::InternalError(_) => "InternalError",
        }
    }

    /// HTTP status the gateway surfaces for this kind.
    pub fn http_status(&self) -> u16 {
        match self {
            CoreError::Validation(_) => 422,
            CoreError::InvalidCredentials => 401,
            CoreError::AccessDenied(_) => 403,
            CoreError::EntityNotFound { .. } => 404,
            CoreError::EntityAlreadyExists { .. } => 409,
            CoreError::InsufficientBalance { .. }
            | CoreError::InsufficientAssetBalance { .. } => 400,
            CoreError::LockAcquireFailed { .. } => 503,
            CoreError::InvariantViolation(_) => 500,
            CoreError::StoreUnavailable(_) => 503,
            CoreError::InternalError(_) => 500,
        }
    }
}

impl From<StoreError> for CoreError {
    fn from(err: StoreError) -> Self {
        match err {
            // ConditionFailed surfacing raw means a DAO forgot to translate
            // it into its domain meaning (AlreadyExists, lock busy, ...).
            StoreError::ConditionFailed => {
                CoreError::InternalError("unhandled conditional write failure".to_string())
            }
            StoreError::Validation(msg) => CoreError::Validation(msg),
            StoreError::Unavailable(msg) => CoreError::StoreUnavailable(msg),
            StoreError::Corrupt(msg) => CoreError::InvariantViolation(msg),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn kinds_map_to_documented_statuses() {
        assert_eq!(CoreError::Validation("x".into()).http_status(), 422);
        assert_eq!(CoreError::InvalidCredentials.http_status(), 401);
        assert_eq!(CoreError::not_found("order", "o1").http_status(), 404);
        assert_eq!(CoreError::already_exists("user", "u1").http_status(), 409);
        assert_eq!(
            CoreError::LockAcquireFailed {
                username: "u".into(),
                operation: "deposit".into()
            }
            .http_status(),
            503
        );
        assert_eq!(
            CoreError::InvariantViolation("q < 0".into()).http_status(),
            500
        );
    }

    #[test]
    fn user_visible_preconditions_keep_their_kind() {
        let err = CoreError::InsufficientBalance {
            available: "10.00".parse().unwrap(),
            required: "15.00".parse().unwrap(),
        };
        assert_eq!(err.kind(), "InsufficientBalance");
        assert_eq!(err.http_status(), 400);
    }
}
