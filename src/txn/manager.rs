//! Orchestration of deposit, withdraw, buy and sell.
//!
//! Every operation runs inside the user's lock; precondition checks happen
//! after acquisition so check-then-act is sound against concurrent
//! replicas. The store has no multi-row transactions, so multi-step
//! sequences recover by compensation: a forward write that logically
//! undoes a committed step. Compensation failures never surface to the
//! caller - they are logged critical for reconciliation and downgraded.

use std::sync::Arc;

use chrono::Utc;
use rust_decimal::Decimal;
use tracing::{error, info, warn};

use crate::dao::{
    AssetBalanceDao, AssetTransactionDao, AssetDao, BalanceDao, OrderDao,
};
use crate::entities::{
    AssetTransaction, AssetTransactionType, Balance, BalanceTransaction, Order, OrderStatus,
    OrderType, TransactionType,
};
use crate::error::CoreError;
use crate::lock::{LockManager, LockOperation};
use crate::money;
use crate::txn::TransactionResult;

pub struct TransactionManager {
    locks: Arc<LockManager>,
    balances: Arc<BalanceDao>,
    orders: Arc<OrderDao>,
    assets: Arc<AssetDao>,
    asset_balances: Arc<AssetBalanceDao>,
    asset_transactions: Arc<AssetTransactionDao>,
}

impl TransactionManager {
    pub fn new(
        locks: Arc<LockManager>,
        balances: Arc<BalanceDao>,
        orders: Arc<OrderDao>,
        assets: Arc<AssetDao>,
        asset_balances: Arc<AssetBalanceDao>,
        asset_transactions: Arc<AssetTransactionDao>,
    ) -> Self {
        TransactionManager {
            locks,
            balances,
            orders,
            assets,
            asset_balances,
            asset_transactions,
        }
    }

    /// Credit the user's cash balance.
    pub async fn deposit(
        &self,
        username: &str,
        amount: Decimal,
    ) -> Result<TransactionResult, CoreError> {
        let amount = money::validate_fiat_amount("amount", amount)
            .map_err(|e| CoreError::Validation(e.to_string()))?;
        info!(%username, %amount, "deposit started");

        self.locks
            .with_lock(username, LockOperation::Deposit, || async move {
                // The balance row exists from registration; a miss is a
                // user-visible 404, not an internal fault.
                self.balances.get_balance(username).await?;

                let entry = BalanceTransaction::new(
                    username,
                    TransactionType::Deposit,
                    amount,
                    "deposit",
                    None,
                );
                let entry = self.balances.create_transaction(entry).await?;
                let balance = self.apply_or_cleanup(username, &entry).await?;

                info!(%username, %amount, new_balance = %balance.current_balance, "deposit completed");
                Ok(TransactionResult::transfer(
                    TransactionType::Deposit,
                    amount,
                    balance,
                    entry,
                ))
            })
            .await
    }

    /// Debit the user's cash balance. The sufficiency check runs inside
    /// the lock.
    pub async fn withdraw(
        &self,
        username: &str,
        amount: Decimal,
    ) -> Result<TransactionResult, CoreError> {
        let amount = money::validate_fiat_amount("amount", amount)
            .map_err(|e| CoreError::Validation(e.to_string()))?;
        info!(%username, %amount, "withdrawal started");

        self.locks
            .with_lock(username, LockOperation::Withdraw, || async move {
                let balance = self.balances.get_balance(username).await?;
                if balance.current_balance < amount {
                    return Err(CoreError::InsufficientBalance {
                        available: balance.current_balance,
                        required: amount,
                    });
                }

                let entry = BalanceTransaction::new(
                    username,
                    TransactionType::Withdraw,
                    -amount,
                    "withdrawal",
                    None,
                );
                let entry = self.balances.create_transaction(entry).await?;
                let balance = self.apply_or_cleanup(username, &entry).await?;

                info!(%username, %amount, new_balance = %balance.current_balance, "withdrawal completed");
                Ok(TransactionResult::transfer(
                    TransactionType::Withdraw,
                    amount,
                    balance,
                    entry,
                ))
            })
            .await
    }

    /// Execute a market buy: debit cash, credit the holding, ledger both.
    pub async fn buy_order(
        &self,
        username: &str,
        asset_id: &str,
        quantity: Decimal,
        price: Decimal,
        order_type: OrderType,
    ) -> Result<TransactionResult, CoreError> {
        let (quantity, price) = validate_order_inputs(quantity, price, order_type, true)?;
        let total_cost = money::order_total(quantity, price);

        let asset = self.assets.get(asset_id).await?;
        if !asset.is_active {
            return Err(CoreError::Validation(format!(
                "asset '{asset_id}' is not available for trading"
            )));
        }

        info!(%username, %asset_id, %quantity, %price, %total_cost, "buy order started");
        self.locks
            .with_lock(username, LockOperation::BuyOrder, || async move {
                let balance = self.balances.get_balance(username).await?;
                if balance.current_balance < total_cost {
                    return Err(CoreError::InsufficientBalance {
                        available: balance.current_balance,
                        required: total_cost,
                    });
                }

                // Market orders complete immediately: the collapsed
                // PENDING -> PROCESSING -> COMPLETED path.
                let order = self
                    .orders
                    .create(new_market_order(
                        username, order_type, asset_id, quantity, price, total_cost,
                    ))
                    .await?;

                let payment = BalanceTransaction::new(
                    username,
                    TransactionType::OrderPayment,
                    -total_cost,
                    format!("Payment for buy order {}", order.order_id),
                    Some(order.order_id.clone()),
                );
                let payment = match self.balances.create_transaction(payment).await {
                    Ok(entry) => entry,
                    Err(err) => {
                        self.fail_order(&order.order_id, "payment ledger write failed")
                            .await;
                        return Err(err);
                    }
                };
                if let Err(err) = self.balances.apply_transaction(&payment).await {
                    self.cleanup_entry(username, &payment).await;
                    self.fail_order(&order.order_id, "payment could not be applied")
                        .await;
                    return Err(downgrade_apply_failure(err));
                }

                let holding = match self
                    .asset_balances
                    .upsert(username, asset_id, quantity)
                    .await
                {
                    Ok(holding) => holding,
                    Err(err) => {
                        // The cash already left the balance; put it back
                        // with a compensating refund, then fail the order.
                        self.refund(username, &order.order_id, total_cost).await;
                        self.fail_order(&order.order_id, "asset balance update failed")
                            .await;
                        return Err(err);
                    }
                };

                if let Err(err) = self
                    .asset_transactions
                    .create(AssetTransaction::new(
                        username,
                        asset_id,
                        AssetTransactionType::Buy,
                        quantity,
                        price,
                        total_cost,
                        &order.order_id,
                    ))
                    .await
                {
                    // Holding and balance are already correct; the missing
                    // ledger row is found by reconciliation.
                    error!(%username, order_id = %order.order_id, %err,
                        "asset ledger write failed after completed buy; flagged for reconciliation");
                }

                let balance = self.balances.get_balance(username).await?;
                info!(%username, order_id = %order.order_id, new_balance = %balance.current_balance, "buy order completed");
                Ok(TransactionResult::executed_order(
                    TransactionType::OrderPayment,
                    total_cost,
                    balance,
                    order,
                    quantity,
                    holding,
                ))
            })
            .await
    }

    /// Execute a market sell: debit the holding, credit cash, ledger both.
    pub async fn sell_order(
        &self,
        username: &str,
        asset_id: &str,
        quantity: Decimal,
        price: Decimal,
        order_type: OrderType,
    ) -> Result<TransactionResult, CoreError> {
        let (quantity, price) = validate_order_inputs(quantity, price, order_type, false)?;
        let proceeds = money::order_total(quantity, price);

        // Holders of a delisted asset may still sell it.
        self.assets.get(asset_id).await?;

        info!(%username, %asset_id, %quantity, %price, %proceeds, "sell order started");
        self.locks
            .with_lock(username, LockOperation::SellOrder, || async move {
                let available = self
                    .asset_balances
                    .find(username, asset_id)
                    .await?
                    .map(|holding| holding.quantity)
                    .unwrap_or(Decimal::ZERO);
                if available < quantity {
                    return Err(CoreError::InsufficientAssetBalance {
                        asset_id: asset_id.to_string(),
                        available,
                        required: quantity,
                    });
                }

                let order = self
                    .orders
                    .create(new_market_order(
                        username, order_type, asset_id, quantity, price, proceeds,
                    ))
                    .await?;

                let holding = match self
                    .asset_balances
                    .upsert(username, asset_id, -quantity)
                    .await
                {
                    Ok(holding) => holding,
                    Err(err) => {
                        self.fail_order(&order.order_id, "asset balance update failed")
                            .await;
                        return Err(err);
                    }
                };

                let sale = BalanceTransaction::new(
                    username,
                    TransactionType::OrderSale,
                    proceeds,
                    format!("Sale proceeds from order {}", order.order_id),
                    Some(order.order_id.clone()),
                );
                let sale = match self.balances.create_transaction(sale).await {
                    Ok(entry) => entry,
                    Err(err) => {
                        self.restore_holding(username, asset_id, quantity).await;
                        self.fail_order(&order.order_id, "proceeds ledger write failed")
                            .await;
                        return Err(err);
                    }
                };
                if let Err(err) = self.balances.apply_transaction(&sale).await {
                    self.cleanup_entry(username, &sale).await;
                    self.restore_holding(username, asset_id, quantity).await;
                    self.fail_order(&order.order_id, "proceeds could not be applied")
                        .await;
                    return Err(downgrade_apply_failure(err));
                }

                if let Err(err) = self
                    .asset_transactions
                    .create(AssetTransaction::new(
                        username,
                        asset_id,
                        AssetTransactionType::Sell,
                        quantity,
                        price,
                        proceeds,
                        &order.order_id,
                    ))
                    .await
                {
                    error!(%username, order_id = %order.order_id, %err,
                        "asset ledger write failed after completed sell; flagged for reconciliation");
                }

                let balance = self.balances.get_balance(username).await?;
                info!(%username, order_id = %order.order_id, new_balance = %balance.current_balance, "sell order completed");
                Ok(TransactionResult::executed_order(
                    TransactionType::OrderSale,
                    proceeds,
                    balance,
                    order,
                    quantity,
                    holding,
                ))
            })
            .await
    }

    /// Read the balance under the short lock, so the read serializes
    /// against in-flight mutations of the same user.
    pub async fn get_balance(&self, username: &str) -> Result<Balance, CoreError> {
        self.locks
            .with_lock(username, LockOperation::GetBalance, || async move {
                self.balances.get_balance(username).await
            })
            .await
    }

    /// Ledger entry written but not applied: delete it and surface a
    /// retryable failure instead of leaving a dangling credit or debit.
    async fn apply_or_cleanup(
        &self,
        username: &str,
        entry: &BalanceTransaction,
    ) -> Result<Balance, CoreError> {
        match self.balances.apply_transaction(entry).await {
            Ok(balance) => Ok(balance),
            Err(err) => {
                error!(%username, transaction_id = %entry.transaction_id, %err,
                    "balance update failed, cleaning up ledger entry");
                self.cleanup_entry(username, entry).await;
                Err(downgrade_apply_failure(err))
            }
        }
    }

    async fn cleanup_entry(&self, username: &str, entry: &BalanceTransaction) {
        if let Err(cleanup_err) = self
            .balances
            .cleanup_failed_transaction(username, entry.transaction_id)
            .await
        {
            error!(%username, transaction_id = %entry.transaction_id, %cleanup_err,
                "FINANCIAL DISCREPANCY: unapplied ledger entry could not be removed");
        }
    }

    /// Compensating credit for a buy whose asset-side failed after the
    /// payment was applied.
    async fn refund(&self, username: &str, order_id: &str, amount: Decimal) {
        let refund = BalanceTransaction::new(
            username,
            TransactionType::Refund,
            amount,
            format!("Refund for failed order {order_id}"),
            Some(order_id.to_string()),
        );
        let refund = match self.balances.create_transaction(refund).await {
            Ok(entry) => entry,
            Err(err) => {
                error!(%username, %order_id, %err,
                    "FINANCIAL DISCREPANCY: refund ledger write failed");
                return;
            }
        };
        if let Err(err) = self.balances.apply_transaction(&refund).await {
            error!(%username, %order_id, %err,
                "FINANCIAL DISCREPANCY: refund could not be applied");
        } else {
            warn!(%username, %order_id, %amount, "refund issued for failed order");
        }
    }

    /// Compensating increment for a sell whose cash-side failed after the
    /// holding was decremented.
    async fn restore_holding(&self, username: &str, asset_id: &str, quantity: Decimal) {
        match self.asset_balances.upsert(username, asset_id, quantity).await {
            Ok(_) => warn!(%username, %asset_id, %quantity, "holding restored for failed order"),
            Err(err) => error!(%username, %asset_id, %err,
                "FINANCIAL DISCREPANCY: holding could not be restored"),
        }
    }

    /// Best-effort status write; failures are logged, never surfaced.
    async fn fail_order(&self, order_id: &str, reason: &str) {
        if let Err(err) = self
            .orders
            .update_status(order_id, OrderStatus::Failed, Some(reason))
            .await
        {
            error!(%order_id, %err, "could not mark order failed");
        }
    }
}

fn validate_order_inputs(
    quantity: Decimal,
    price: Decimal,
    order_type: OrderType,
    expect_buy: bool,
) -> Result<(Decimal, Decimal), CoreError> {
    let quantity = money::validate_quantity("quantity", quantity)
        .map_err(|e| CoreError::Validation(e.to_string()))?;
    let price = money::validate_fiat_amount("price", price)
        .map_err(|e| CoreError::Validation(e.to_string()))?;
    if order_type.is_buy() != expect_buy {
        return Err(CoreError::Validation(format!(
            "order_type '{}' does not match this operation",
            order_type.as_str()
        )));
    }
    if !order_type.is_market() {
        return Err(CoreError::Validation(
            "limit orders are not supported".to_string(),
        ));
    }
    Ok((quantity, price))
}

fn new_market_order(
    username: &str,
    order_type: OrderType,
    asset_id: &str,
    quantity: Decimal,
    price: Decimal,
    total_amount: Decimal,
) -> Order {
    let now = Utc::now();
    Order {
        order_id: Order::generate_id(now),
        username: username.to_string(),
        order_type,
        status: OrderStatus::Completed,
        asset_id: asset_id.to_string(),
        quantity,
        price,
        total_amount,
        status_reason: None,
        created_at: now,
        updated_at: now,
    }
}

/// Step-3 apply failures surface as retryable unavailability unless they
/// already carry user-visible meaning.
fn downgrade_apply_failure(err: CoreError) -> CoreError {
    match err {
        CoreError::EntityNotFound { .. } => err,
        CoreError::StoreUnavailable(_) => err,
        other => CoreError::StoreUnavailable(other.to_string()),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::entities::Asset;
    use crate::store::{
        Condition, Item, ItemKey, KeyValueStore, MemoryStore, Query, SetOp, StoreError, Table,
    };
    use async_trait::async_trait;
    use std::collections::HashMap;
    use std::sync::atomic::{AtomicBool, Ordering};

    // ========================================================================
    // Failure injection: delegates to MemoryStore, fails selected writes
    // ========================================================================

    #[derive(Default)]
    struct FailingStore {
        inner: MemoryStore,
        fail_asset_balance_puts: AtomicBool,
        fail_balance_updates: AtomicBool,
    }

    #[async_trait]
    impl KeyValueStore for FailingStore {
        async fn get(&self, table: Table, pk: &str, sk: &str) -> Result<Option<Item>, StoreError> {
            self.inner.get(table, pk, sk).await
        }

        async fn put(
            &self,
            table: Table,
            item: Item,
            condition: Option<Condition>,
        ) -> Result<(), StoreError> {
            if self.fail_asset_balance_puts.load(Ordering::SeqCst)
                && item.opt_s("entity_type") == Some("asset_balance")
            {
                return Err(StoreError::Unavailable("injected put failure".to_string()));
            }
            self.inner.put(table, item, condition).await
        }

        async fn update(
            &self,
            table: Table,
            pk: &str,
            sk: &str,
            ops: Vec<SetOp>,
            condition: Option<Condition>,
        ) -> Result<Item, StoreError> {
            if self.fail_balance_updates.load(Ordering::SeqCst) && sk == "BALANCE" {
                return Err(StoreError::Unavailable(
                    "injected update failure".to_string(),
                ));
            }
            self.inner.update(table, pk, sk, ops, condition).await
        }

        async fn delete(
            &self,
            table: Table,
            pk: &str,
            sk: &str,
            condition: Option<Condition>,
        ) -> Result<(), StoreError> {
            self.inner.delete(table, pk, sk, condition).await
        }

        async fn query(&self, table: Table, query: Query) -> Result<Vec<Item>, StoreError> {
            self.inner.query(table, query).await
        }

        async fn batch_get(
            &self,
            table: Table,
            keys: &[ItemKey],
        ) -> Result<HashMap<ItemKey, Item>, StoreError> {
            self.inner.batch_get(table, keys).await
        }

        async fn scan(&self, table: Table) -> Result<Vec<Item>, StoreError> {
            self.inner.scan(table).await
        }
    }

    struct Harness {
        store: Arc<FailingStore>,
        locks: Arc<LockManager>,
        balances: Arc<BalanceDao>,
        orders: Arc<OrderDao>,
        assets: Arc<AssetDao>,
        manager: TransactionManager,
    }

    fn harness() -> Harness {
        let store = Arc::new(FailingStore::default());
        let dyn_store: Arc<dyn KeyValueStore> = store.clone();
        let locks = Arc::new(LockManager::new(dyn_store.clone()));
        let balances = Arc::new(BalanceDao::new(dyn_store.clone()));
        let orders = Arc::new(OrderDao::new(dyn_store.clone()));
        let assets = Arc::new(AssetDao::new(dyn_store.clone()));
        let asset_balances = Arc::new(AssetBalanceDao::new(dyn_store.clone()));
        let asset_transactions = Arc::new(AssetTransactionDao::new(dyn_store.clone()));
        let manager = TransactionManager::new(
            locks.clone(),
            balances.clone(),
            orders.clone(),
            assets.clone(),
            asset_balances,
            asset_transactions,
        );
        Harness {
            store,
            locks,
            balances,
            orders,
            assets,
            manager,
        }
    }

    async fn onboard(h: &Harness, username: &str) {
        h.balances
            .create_balance(Balance::new_zero(username))
            .await
            .unwrap();
    }

    async fn seed_btc(h: &Harness) {
        h.assets
            .seed(Asset {
                asset_id: "BTC".to_string(),
                name: "Bitcoin".to_string(),
                category: "major".to_string(),
                price_usd: "10000.00".parse().unwrap(),
                amount: "1000".parse().unwrap(),
                is_active: true,
            })
            .await
            .unwrap();
    }

    fn dec(s: &str) -> Decimal {
        s.parse().unwrap()
    }

    // ========================================================================
    // Deposit / withdraw
    // ========================================================================

    #[tokio::test]
    async fn deposit_then_withdraw_nets_to_zero() {
        let h = harness();
        onboard(&h, "alice").await;

        let deposited = h.manager.deposit("alice", dec("100.00")).await.unwrap();
        assert_eq!(deposited.balance.current_balance, dec("100.00"));

        let withdrawn = h.manager.withdraw("alice", dec("100.00")).await.unwrap();
        assert_eq!(withdrawn.balance.current_balance, dec("0.00"));

        let page = h.balances.list_transactions("alice", 10, None).await.unwrap();
        assert_eq!(page.items.len(), 2);
        let sum: Decimal = page.items.iter().map(|tx| tx.amount).sum();
        assert_eq!(sum, Decimal::ZERO);
    }

    #[tokio::test]
    async fn deposit_rejects_non_positive_and_sub_cent_amounts() {
        let h = harness();
        onboard(&h, "alice").await;
        assert!(matches!(
            h.manager.deposit("alice", dec("0")).await,
            Err(CoreError::Validation(_))
        ));
        assert!(matches!(
            h.manager.deposit("alice", dec("-1.00")).await,
            Err(CoreError::Validation(_))
        ));
        assert!(matches!(
            h.manager.deposit("alice", dec("1.001")).await,
            Err(CoreError::Validation(_))
        ));
    }

    #[tokio::test]
    async fn deposit_to_unknown_user_is_not_found() {
        let h = harness();
        assert!(matches!(
            h.manager.deposit("ghost", dec("10.00")).await,
            Err(CoreError::EntityNotFound { .. })
        ));
    }

    #[tokio::test]
    async fn withdraw_of_exact_balance_succeeds_one_cent_more_fails() {
        let h = harness();
        onboard(&h, "alice").await;
        h.manager.deposit("alice", dec("50.00")).await.unwrap();

        let err = h.manager.withdraw("alice", dec("50.01")).await.unwrap_err();
        match err {
            CoreError::InsufficientBalance {
                available,
                required,
            } => {
                assert_eq!(available, dec("50.00"));
                assert_eq!(required, dec("50.01"));
            }
            other => panic!("unexpected error: {other:?}"),
        }

        let result = h.manager.withdraw("alice", dec("50.00")).await.unwrap();
        assert_eq!(result.balance.current_balance, dec("0.00"));
    }

    #[tokio::test]
    async fn failed_apply_cleans_up_the_ledger_entry() {
        let h = harness();
        onboard(&h, "alice").await;
        h.manager.deposit("alice", dec("10.00")).await.unwrap();

        h.store.fail_balance_updates.store(true, Ordering::SeqCst);
        let err = h.manager.deposit("alice", dec("5.00")).await.unwrap_err();
        assert!(matches!(err, CoreError::StoreUnavailable(_)));
        h.store.fail_balance_updates.store(false, Ordering::SeqCst);

        // No dangling credit: one ledger row, and it still sums to the
        // balance.
        let balance = h.balances.get_balance("alice").await.unwrap();
        assert_eq!(balance.current_balance, dec("10.00"));
        let page = h.balances.list_transactions("alice", 10, None).await.unwrap();
        assert_eq!(page.items.len(), 1);
    }

    // ========================================================================
    // Buy
    // ========================================================================

    #[tokio::test]
    async fn buy_debits_cash_credits_holding_and_ledgers_both() {
        let h = harness();
        onboard(&h, "alice").await;
        seed_btc(&h).await;
        h.manager.deposit("alice", dec("200.00")).await.unwrap();

        let result = h
            .manager
            .buy_order("alice", "BTC", dec("0.01"), dec("10000.00"), OrderType::MarketBuy)
            .await
            .unwrap();

        assert_eq!(result.balance.current_balance, dec("100.00"));
        assert_eq!(result.asset_quantity, Some(dec("0.01")));
        let order = result.order.unwrap();
        assert_eq!(order.status, OrderStatus::Completed);
        assert_eq!(order.total_amount, dec("100.00"));

        let fetched = h.orders.get(&order.order_id).await.unwrap();
        assert_eq!(fetched.status, OrderStatus::Completed);
    }

    #[tokio::test]
    async fn buy_rejects_zero_quantity_and_unknown_asset() {
        let h = harness();
        onboard(&h, "alice").await;
        seed_btc(&h).await;

        assert!(matches!(
            h.manager
                .buy_order("alice", "BTC", dec("0"), dec("10.00"), OrderType::MarketBuy)
                .await,
            Err(CoreError::Validation(_))
        ));
        assert!(matches!(
            h.manager
                .buy_order("alice", "GHOST", dec("1"), dec("10.00"), OrderType::MarketBuy)
                .await,
            Err(CoreError::EntityNotFound { .. })
        ));
    }

    #[tokio::test]
    async fn buy_without_funds_is_insufficient_balance() {
        let h = harness();
        onboard(&h, "alice").await;
        seed_btc(&h).await;
        h.manager.deposit("alice", dec("50.00")).await.unwrap();

        let err = h
            .manager
            .buy_order("alice", "BTC", dec("0.01"), dec("10000.00"), OrderType::MarketBuy)
            .await
            .unwrap_err();
        assert!(matches!(err, CoreError::InsufficientBalance { .. }));

        // Nothing moved.
        let balance = h.balances.get_balance("alice").await.unwrap();
        assert_eq!(balance.current_balance, dec("50.00"));
        assert!(h.orders.list_by_user("alice", 10, 0).await.unwrap().is_empty());
    }

    #[tokio::test]
    async fn buy_asset_failure_refunds_and_fails_the_order() {
        let h = harness();
        onboard(&h, "alice").await;
        seed_btc(&h).await;
        h.manager.deposit("alice", dec("200.00")).await.unwrap();

        h.store
            .fail_asset_balance_puts
            .store(true, Ordering::SeqCst);
        let err = h
            .manager
            .buy_order("alice", "BTC", dec("0.01"), dec("10000.00"), OrderType::MarketBuy)
            .await
            .unwrap_err();
        assert!(matches!(err, CoreError::StoreUnavailable(_)));
        h.store
            .fail_asset_balance_puts
            .store(false, Ordering::SeqCst);

        // Balance restored by the compensating refund.
        let balance = h.balances.get_balance("alice").await.unwrap();
        assert_eq!(balance.current_balance, dec("200.00"));

        // Ledger shows payment and refund cancelling out.
        let page = h.balances.list_transactions("alice", 10, None).await.unwrap();
        let types: Vec<TransactionType> =
            page.items.iter().map(|tx| tx.transaction_type).collect();
        assert!(types.contains(&TransactionType::OrderPayment));
        assert!(types.contains(&TransactionType::Refund));
        let sum: Decimal = page.items.iter().map(|tx| tx.amount).sum();
        assert_eq!(sum, dec("200.00"));

        // Order is failed, not completed.
        let orders = h.orders.list_by_user("alice", 10, 0).await.unwrap();
        assert_eq!(orders.len(), 1);
        assert_eq!(orders[0].status, OrderStatus::Failed);
    }

    // ========================================================================
    // Sell
    // ========================================================================

    #[tokio::test]
    async fn buy_then_sell_round_trips() {
        let h = harness();
        onboard(&h, "alice").await;
        seed_btc(&h).await;
        h.manager.deposit("alice", dec("200.00")).await.unwrap();

        h.manager
            .buy_order("alice", "BTC", dec("0.01"), dec("10000.00"), OrderType::MarketBuy)
            .await
            .unwrap();
        let sold = h
            .manager
            .sell_order("alice", "BTC", dec("0.01"), dec("10000.00"), OrderType::MarketSell)
            .await
            .unwrap();

        assert_eq!(sold.balance.current_balance, dec("200.00"));
        assert_eq!(sold.asset_balance.as_ref().unwrap().quantity, Decimal::ZERO);

        let orders = h.orders.list_by_user("alice", 10, 0).await.unwrap();
        assert_eq!(orders.len(), 2);
    }

    #[tokio::test]
    async fn sell_more_than_held_is_insufficient_asset_balance() {
        let h = harness();
        onboard(&h, "alice").await;
        seed_btc(&h).await;
        h.manager.deposit("alice", dec("200.00")).await.unwrap();
        h.manager
            .buy_order("alice", "BTC", dec("0.01"), dec("10000.00"), OrderType::MarketBuy)
            .await
            .unwrap();

        let err = h
            .manager
            .sell_order("alice", "BTC", dec("0.02"), dec("10000.00"), OrderType::MarketSell)
            .await
            .unwrap_err();
        match err {
            CoreError::InsufficientAssetBalance {
                available,
                required,
                ..
            } => {
                assert_eq!(available, dec("0.01"));
                assert_eq!(required, dec("0.02"));
            }
            other => panic!("unexpected error: {other:?}"),
        }
    }

    #[tokio::test]
    async fn mismatched_order_type_is_rejected() {
        let h = harness();
        onboard(&h, "alice").await;
        seed_btc(&h).await;

        assert!(matches!(
            h.manager
                .buy_order("alice", "BTC", dec("1"), dec("10.00"), OrderType::MarketSell)
                .await,
            Err(CoreError::Validation(_))
        ));
        assert!(matches!(
            h.manager
                .buy_order("alice", "BTC", dec("1"), dec("10.00"), OrderType::LimitBuy)
                .await,
            Err(CoreError::Validation(_))
        ));
    }

    // ========================================================================
    // Locking
    // ========================================================================

    #[tokio::test]
    async fn operations_fail_fast_while_the_user_lock_is_held() {
        let h = harness();
        onboard(&h, "alice").await;

        let _held = h
            .locks
            .acquire("alice", LockOperation::BuyOrder)
            .await
            .unwrap();
        let err = h.manager.deposit("alice", dec("10.00")).await.unwrap_err();
        assert!(matches!(err, CoreError::LockAcquireFailed { .. }));
    }

    #[tokio::test]
    async fn get_balance_takes_and_releases_the_short_lock() {
        let h = harness();
        onboard(&h, "alice").await;
        h.manager.deposit("alice", dec("10.00")).await.unwrap();

        let balance = h.manager.get_balance("alice").await.unwrap();
        assert_eq!(balance.current_balance, dec("10.00"));
        // Lock released: a second read succeeds immediately.
        assert!(h.manager.get_balance("alice").await.is_ok());
    }
}
