//! Shared handler state: the DAO singletons, the transaction manager and
//! the token manager, all over one store adapter. Recreated per process;
//! nothing request-scoped lives here.

use std::sync::Arc;

use crate::auth::TokenManager;
use crate::dao::{
    AssetBalanceDao, AssetDao, AssetTransactionDao, BalanceDao, OrderDao, UserDao,
};
use crate::lock::LockManager;
use crate::store::KeyValueStore;
use crate::txn::TransactionManager;

#[derive(Clone)]
pub struct AppState {
    pub users: Arc<UserDao>,
    pub balances: Arc<BalanceDao>,
    pub orders: Arc<OrderDao>,
    pub assets: Arc<AssetDao>,
    pub asset_balances: Arc<AssetBalanceDao>,
    pub txn: Arc<TransactionManager>,
    pub tokens: Arc<TokenManager>,
}

impl AppState {
    pub fn new(store: Arc<dyn KeyValueStore>, jwt_secret: &str) -> Self {
        let locks = Arc::new(LockManager::new(store.clone()));
        let users = Arc::new(UserDao::new(store.clone()));
        let balances = Arc::new(BalanceDao::new(store.clone()));
        let orders = Arc::new(OrderDao::new(store.clone()));
        let assets = Arc::new(AssetDao::new(store.clone()));
        let asset_balances = Arc::new(AssetBalanceDao::new(store.clone()));
        let asset_transactions = Arc::new(AssetTransactionDao::new(store));

        let txn = Arc::new(TransactionManager::new(
            locks,
            balances.clone(),
            orders.clone(),
            assets.clone(),
            asset_balances.clone(),
            asset_transactions,
        ));

        AppState {
            users,
            balances,
            orders,
            assets,
            asset_balances,
            txn,
            tokens: Arc::new(TokenManager::new(jwt_secret)),
        }
    }
}
