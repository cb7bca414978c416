//! Transaction manager: composes order creation, balance mutation and
//! ledger writes into atomic, recoverable units under the user's lock.

mod manager;
mod result;

pub use manager::TransactionManager;
pub use result::TransactionResult;
