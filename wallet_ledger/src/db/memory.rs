//! In-process wallet store.
//!
//! Every wallet owns a FIFO [`tokio::sync::Mutex`] that plays the role of the
//! row lock. Writes are staged inside the transaction and published on commit,
//! so plain lookups only ever observe committed balances.

use async_trait::async_trait;
use chrono::Utc;
use rust_decimal::Decimal;
use std::collections::HashMap;
use std::sync::{Arc, PoisonError, RwLock};
use std::time::Duration;
use tokio::sync::{Mutex, OwnedMutexGuard};
use uuid::Uuid;

use super::repository::{WalletStore, WalletTransaction};
use crate::wallet::{Wallet, WalletError, WalletId, WalletResult};

/// One stored wallet: its row lock and its last committed state
struct Row {
    lock: Arc<Mutex<()>>,
    committed: RwLock<Wallet>,
}

type Rows = Arc<RwLock<HashMap<WalletId, Arc<Row>>>>;

/// In-memory implementation of [`WalletStore`]
#[derive(Clone)]
pub struct MemoryWalletStore {
    rows: Rows,
    lock_timeout: Duration,
}

impl MemoryWalletStore {
    /// Create an empty store
    ///
    /// # Arguments
    ///
    /// * `lock_timeout` - Longest wait for a wallet row lock
    pub fn new(lock_timeout: Duration) -> Self {
        Self {
            rows: Arc::new(RwLock::new(HashMap::new())),
            lock_timeout,
        }
    }

    /// Number of committed wallets
    pub fn len(&self) -> usize {
        self.rows
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    fn row(&self, wallet_id: WalletId) -> Option<Arc<Row>> {
        self.rows
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .get(&wallet_id)
            .cloned()
    }
}

#[async_trait]
impl WalletStore for MemoryWalletStore {
    async fn begin(&self) -> WalletResult<Box<dyn WalletTransaction>> {
        Ok(Box::new(MemoryTransaction {
            store: self.clone(),
            locked: HashMap::new(),
            staged: HashMap::new(),
            inserted: HashMap::new(),
        }))
    }

    async fn lookup(&self, wallet_id: WalletId) -> WalletResult<Option<Wallet>> {
        Ok(self.row(wallet_id).map(|row| {
            row.committed
                .read()
                .unwrap_or_else(PoisonError::into_inner)
                .clone()
        }))
    }

    async fn health_check(&self) -> WalletResult<()> {
        Ok(())
    }
}

/// Open in-memory transaction
struct MemoryTransaction {
    store: MemoryWalletStore,
    /// Row locks held until commit or drop
    locked: HashMap<WalletId, OwnedMutexGuard<()>>,
    /// Balance writes waiting for commit
    staged: HashMap<WalletId, Wallet>,
    /// Wallets created by this transaction, invisible to others until commit
    inserted: HashMap<WalletId, Wallet>,
}

#[async_trait]
impl WalletTransaction for MemoryTransaction {
    async fn lookup_for_update(&mut self, wallet_id: WalletId) -> WalletResult<Option<Wallet>> {
        if let Some(wallet) = self.inserted.get(&wallet_id) {
            return Ok(Some(wallet.clone()));
        }

        let Some(row) = self.store.row(wallet_id) else {
            return Ok(None);
        };

        if !self.locked.contains_key(&wallet_id) {
            let guard = tokio::time::timeout(self.store.lock_timeout, row.lock.clone().lock_owned())
                .await
                .map_err(|_| WalletError::LockTimeout(self.store.lock_timeout))?;
            self.locked.insert(wallet_id, guard);
        }

        if let Some(wallet) = self.staged.get(&wallet_id) {
            return Ok(Some(wallet.clone()));
        }

        let wallet = row
            .committed
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .clone();
        Ok(Some(wallet))
    }

    async fn insert(&mut self, initial_balance: Decimal) -> WalletResult<Wallet> {
        let now = Utc::now();
        let wallet = Wallet::new(Uuid::new_v4(), initial_balance, now, now);
        self.inserted.insert(wallet.id, wallet.clone());
        Ok(wallet)
    }

    async fn persist_balance(
        &mut self,
        wallet: &Wallet,
        new_balance: Decimal,
    ) -> WalletResult<Wallet> {
        let mut updated = wallet.clone();
        updated.balance = crate::wallet::normalize(new_balance);
        updated.updated_at = Utc::now();

        if let Some(pending) = self.inserted.get_mut(&wallet.id) {
            *pending = updated.clone();
            return Ok(updated);
        }

        if !self.locked.contains_key(&wallet.id) {
            return Err(WalletError::TransactionFailed(format!(
                "balance update for wallet {} without holding its row lock",
                wallet.id
            )));
        }

        self.staged.insert(wallet.id, updated.clone());
        Ok(updated)
    }

    async fn commit(self: Box<Self>) -> WalletResult<()> {
        let MemoryTransaction {
            store,
            locked,
            staged,
            inserted,
        } = *self;

        for (wallet_id, wallet) in staged {
            if let Some(row) = store.row(wallet_id) {
                *row.committed.write().unwrap_or_else(PoisonError::into_inner) = wallet;
            }
        }

        if !inserted.is_empty() {
            let mut rows = store.rows.write().unwrap_or_else(PoisonError::into_inner);
            for (wallet_id, wallet) in inserted {
                rows.insert(
                    wallet_id,
                    Arc::new(Row {
                        lock: Arc::new(Mutex::new(())),
                        committed: RwLock::new(wallet),
                    }),
                );
            }
        }

        // Row locks are released only once the new balances are published.
        drop(locked);
        Ok(())
    }

    async fn rollback(self: Box<Self>) -> WalletResult<()> {
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn store() -> MemoryWalletStore {
        MemoryWalletStore::new(Duration::from_millis(200))
    }

    async fn committed_wallet(store: &MemoryWalletStore, balance: Decimal) -> Wallet {
        let mut tx = store.begin().await.unwrap();
        let wallet = tx.insert(balance).await.unwrap();
        tx.commit().await.unwrap();
        wallet
    }

    #[tokio::test]
    async fn test_insert_invisible_until_commit() {
        let store = store();
        let mut tx = store.begin().await.unwrap();
        let wallet = tx.insert(Decimal::ZERO).await.unwrap();

        assert!(store.lookup(wallet.id).await.unwrap().is_none());
        assert!(store.is_empty());

        tx.commit().await.unwrap();
        let found = store.lookup(wallet.id).await.unwrap().unwrap();
        assert_eq!(found.balance.to_string(), "0.00");
        assert_eq!(store.len(), 1);
    }

    #[tokio::test]
    async fn test_uncommitted_balance_not_visible() {
        let store = store();
        let wallet = committed_wallet(&store, Decimal::new(5000, 2)).await;

        let mut tx = store.begin().await.unwrap();
        let locked = tx.lookup_for_update(wallet.id).await.unwrap().unwrap();
        tx.persist_balance(&locked, Decimal::new(9900, 2))
            .await
            .unwrap();

        // Plain readers keep seeing the committed value
        let seen = store.lookup(wallet.id).await.unwrap().unwrap();
        assert_eq!(seen.balance, Decimal::new(5000, 2));

        tx.commit().await.unwrap();
        let seen = store.lookup(wallet.id).await.unwrap().unwrap();
        assert_eq!(seen.balance, Decimal::new(9900, 2));
    }

    #[tokio::test]
    async fn test_rollback_discards_writes() {
        let store = store();
        let wallet = committed_wallet(&store, Decimal::new(100, 0)).await;

        let mut tx = store.begin().await.unwrap();
        let locked = tx.lookup_for_update(wallet.id).await.unwrap().unwrap();
        tx.persist_balance(&locked, Decimal::ZERO).await.unwrap();
        tx.rollback().await.unwrap();

        let seen = store.lookup(wallet.id).await.unwrap().unwrap();
        assert_eq!(seen.balance, Decimal::new(100, 0));
    }

    #[tokio::test]
    async fn test_lock_wait_times_out() {
        let store = store();
        let wallet = committed_wallet(&store, Decimal::ZERO).await;

        let mut holder = store.begin().await.unwrap();
        holder.lookup_for_update(wallet.id).await.unwrap();

        let mut waiter = store.begin().await.unwrap();
        let result = waiter.lookup_for_update(wallet.id).await;
        assert!(matches!(result, Err(WalletError::LockTimeout(_))));

        drop(holder);
        assert!(waiter.lookup_for_update(wallet.id).await.unwrap().is_some());
    }

    #[tokio::test]
    async fn test_dropped_transaction_releases_lock() {
        let store = store();
        let wallet = committed_wallet(&store, Decimal::ZERO).await;

        {
            let mut abandoned = store.begin().await.unwrap();
            let locked = abandoned.lookup_for_update(wallet.id).await.unwrap().unwrap();
            abandoned
                .persist_balance(&locked, Decimal::new(1, 0))
                .await
                .unwrap();
        }

        let mut tx = store.begin().await.unwrap();
        let locked = tx.lookup_for_update(wallet.id).await.unwrap().unwrap();
        assert_eq!(locked.balance, Decimal::ZERO);
    }

    #[tokio::test]
    async fn test_persist_requires_lock() {
        let store = store();
        let wallet = committed_wallet(&store, Decimal::ZERO).await;

        let mut tx = store.begin().await.unwrap();
        let result = tx.persist_balance(&wallet, Decimal::ONE).await;
        assert!(matches!(result, Err(WalletError::TransactionFailed(_))));
    }

    #[tokio::test]
    async fn test_lookup_for_update_missing_wallet() {
        let store = store();
        let mut tx = store.begin().await.unwrap();
        assert!(tx.lookup_for_update(Uuid::new_v4()).await.unwrap().is_none());
    }
}
