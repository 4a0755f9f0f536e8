//! Wallet store traits and the PostgreSQL implementation.
//!
//! The store never commits on behalf of its caller: every mutating call goes
//! through a [`WalletTransaction`] whose lifetime the caller controls.

use async_trait::async_trait;
use rust_decimal::Decimal;
use sqlx::{PgPool, Postgres, Row, Transaction, postgres::PgRow};
use std::time::Duration;
use uuid::Uuid;

use crate::wallet::{Wallet, WalletError, WalletId, WalletResult};

/// Durable keyed storage of wallet records
#[async_trait]
pub trait WalletStore: Send + Sync {
    /// Open a transaction scope
    async fn begin(&self) -> WalletResult<Box<dyn WalletTransaction>>;

    /// Plain read of committed state, no lock taken
    async fn lookup(&self, wallet_id: WalletId) -> WalletResult<Option<Wallet>>;

    /// Check that the store is reachable
    async fn health_check(&self) -> WalletResult<()>;
}

/// A caller-controlled transaction over the wallet store.
///
/// Dropping a transaction without calling [`commit`](Self::commit) rolls it
/// back and releases every row lock it holds.
#[async_trait]
pub trait WalletTransaction: Send {
    /// Read a wallet and hold its exclusive row lock until the transaction ends
    ///
    /// # Errors
    ///
    /// * `WalletError::LockTimeout` - Lock not acquired within the lock timeout
    async fn lookup_for_update(&mut self, wallet_id: WalletId) -> WalletResult<Option<Wallet>>;

    /// Insert a new wallet with a freshly generated id
    async fn insert(&mut self, initial_balance: Decimal) -> WalletResult<Wallet>;

    /// Write a new balance to a wallet locked by this transaction
    async fn persist_balance(
        &mut self,
        wallet: &Wallet,
        new_balance: Decimal,
    ) -> WalletResult<Wallet>;

    /// Make every write of this transaction durable and visible
    async fn commit(self: Box<Self>) -> WalletResult<()>;

    /// Discard every write of this transaction
    async fn rollback(self: Box<Self>) -> WalletResult<()>;
}

/// PostgreSQL implementation of [`WalletStore`]
#[derive(Clone)]
pub struct PgWalletStore {
    pool: PgPool,
    lock_timeout: Duration,
}

impl PgWalletStore {
    /// Create a new store
    ///
    /// # Arguments
    ///
    /// * `pool` - Database connection pool
    /// * `lock_timeout` - Longest wait for a wallet row lock
    pub fn new(pool: PgPool, lock_timeout: Duration) -> Self {
        Self { pool, lock_timeout }
    }
}

#[async_trait]
impl WalletStore for PgWalletStore {
    async fn begin(&self) -> WalletResult<Box<dyn WalletTransaction>> {
        let mut tx = self.pool.begin().await?;

        // SET does not take bind parameters; the value is an integer we own.
        let statement = format!(
            "SET LOCAL lock_timeout = '{}ms'",
            self.lock_timeout.as_millis()
        );
        sqlx::query(&statement).execute(&mut *tx).await?;

        Ok(Box::new(PgWalletTransaction {
            tx,
            lock_timeout: self.lock_timeout,
        }))
    }

    async fn lookup(&self, wallet_id: WalletId) -> WalletResult<Option<Wallet>> {
        let row = sqlx::query(
            r#"
            SELECT id, balance, created_at, updated_at
            FROM wallets
            WHERE id = $1
            "#,
        )
        .bind(wallet_id)
        .fetch_optional(&self.pool)
        .await?;

        Ok(row.map(|r| wallet_from_row(&r)))
    }

    async fn health_check(&self) -> WalletResult<()> {
        sqlx::query("SELECT 1").execute(&self.pool).await?;
        Ok(())
    }
}

/// Open PostgreSQL transaction
pub struct PgWalletTransaction {
    tx: Transaction<'static, Postgres>,
    lock_timeout: Duration,
}

#[async_trait]
impl WalletTransaction for PgWalletTransaction {
    async fn lookup_for_update(&mut self, wallet_id: WalletId) -> WalletResult<Option<Wallet>> {
        let row = sqlx::query(
            r#"
            SELECT id, balance, created_at, updated_at
            FROM wallets
            WHERE id = $1
            FOR UPDATE
            "#,
        )
        .bind(wallet_id)
        .fetch_optional(&mut *self.tx)
        .await
        .map_err(|e| WalletError::from_lock_wait(e, self.lock_timeout))?;

        Ok(row.map(|r| wallet_from_row(&r)))
    }

    async fn insert(&mut self, initial_balance: Decimal) -> WalletResult<Wallet> {
        let row = sqlx::query(
            r#"
            INSERT INTO wallets (id, balance)
            VALUES ($1, $2)
            RETURNING id, balance, created_at, updated_at
            "#,
        )
        .bind(Uuid::new_v4())
        .bind(initial_balance)
        .fetch_one(&mut *self.tx)
        .await?;

        Ok(wallet_from_row(&row))
    }

    async fn persist_balance(
        &mut self,
        wallet: &Wallet,
        new_balance: Decimal,
    ) -> WalletResult<Wallet> {
        let row = sqlx::query(
            r#"
            UPDATE wallets
            SET balance = $1, updated_at = NOW()
            WHERE id = $2
            RETURNING id, balance, created_at, updated_at
            "#,
        )
        .bind(new_balance)
        .bind(wallet.id)
        .fetch_optional(&mut *self.tx)
        .await?
        .ok_or(WalletError::WalletNotFound(wallet.id))?;

        Ok(wallet_from_row(&row))
    }

    async fn commit(self: Box<Self>) -> WalletResult<()> {
        self.tx.commit().await?;
        Ok(())
    }

    async fn rollback(self: Box<Self>) -> WalletResult<()> {
        self.tx.rollback().await?;
        Ok(())
    }
}

fn wallet_from_row(row: &PgRow) -> Wallet {
    Wallet::new(
        row.get("id"),
        row.get("balance"),
        row.get("created_at"),
        row.get("updated_at"),
    )
}
