//! CNOP - transactional core of a multi-service trading platform.
//!
//! Guarantees correctness of money and asset movements under concurrent
//! access: no negative balances, no lost writes, no double-spend, on a
//! wide-column key-value store without multi-row transactions.
//!
//! # Modules
//!
//! - [`store`] - typed adapter over the wide-column store (conditional
//!   writes, queries, two backends)
//! - [`entities`] - typed records with key-derivation rules
//! - [`dao`] - one data access object per aggregate
//! - [`lock`] - per-user TTL'd distributed mutex
//! - [`txn`] - transaction manager composing DAO calls under the lock,
//!   with compensating cleanup
//! - [`error`] - the closed error taxonomy
//! - [`auth`] - password hashing and access tokens (collaborator surface)
//! - [`gateway`] - HTTP surface consumed by the platform gateway
//! - [`config`] / [`logging`] / [`money`] - service plumbing

pub mod auth;
pub mod config;
pub mod dao;
pub mod entities;
pub mod error;
pub mod gateway;
pub mod lock;
pub mod logging;
pub mod money;
pub mod store;
pub mod txn;

// Convenient re-exports at crate root
pub use config::AppConfig;
pub use error::CoreError;
pub use lock::{LockManager, LockOperation};
pub use store::{DynamoStore, KeyValueStore, MemoryStore};
pub use txn::{TransactionManager, TransactionResult};
