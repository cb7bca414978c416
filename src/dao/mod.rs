//! Data access objects, one per aggregate.
//!
//! DAOs are stateless: each holds a reference to the store adapter and
//! translates store failures into the closed error taxonomy. They perform
//! no locking and no orchestration; check-then-act sequences are only
//! sound when the caller holds the user's lock (see `txn`).

mod asset_balance;
mod asset_transaction;
mod balance;
mod inventory;
mod order;
mod user;

pub use asset_balance::AssetBalanceDao;
pub use asset_transaction::AssetTransactionDao;
pub use balance::{BalanceDao, TransactionPage};
pub use inventory::AssetDao;
pub use order::OrderDao;
pub use user::UserDao;
