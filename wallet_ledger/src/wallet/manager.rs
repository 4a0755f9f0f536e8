//! Wallet manager: the seam between the balance protocol and the HTTP layer.

use rust_decimal::Decimal;
use std::sync::Arc;
use std::time::Duration;

use super::{
    errors::{WalletError, WalletResult},
    models::{Amount, OperationType, Wallet, WalletId, validate_initial_balance},
    protocol,
};
use crate::db::{WalletStore, timeouts::Deadline};

/// Wallet manager
#[derive(Clone)]
pub struct WalletManager {
    store: Arc<dyn WalletStore>,
    transaction_timeout: Duration,
}

impl WalletManager {
    /// Create a new wallet manager
    ///
    /// # Arguments
    ///
    /// * `store` - Wallet store (PostgreSQL or in-memory)
    /// * `transaction_timeout` - Bound on a create or balance operation up to its commit
    pub fn new(store: Arc<dyn WalletStore>, transaction_timeout: Duration) -> Self {
        Self {
            store,
            transaction_timeout,
        }
    }

    /// Get a wallet by id
    ///
    /// # Errors
    ///
    /// * `WalletError::WalletNotFound` - No wallet with that id
    pub async fn get_wallet(&self, wallet_id: WalletId) -> WalletResult<Wallet> {
        match self.store.lookup(wallet_id).await {
            Ok(Some(wallet)) => {
                log::debug!("Wallet {wallet_id} read, balance {}", wallet.balance);
                Ok(wallet)
            }
            Ok(None) => {
                log::warn!("Wallet not found: {wallet_id}");
                Err(WalletError::WalletNotFound(wallet_id))
            }
            Err(err) => {
                log::error!("Wallet lookup failed for {wallet_id}: {err}");
                Err(err)
            }
        }
    }

    /// Create a wallet with a zero balance
    pub async fn create_wallet(&self) -> WalletResult<Wallet> {
        self.create_wallet_with_balance(Decimal::ZERO).await
    }

    /// Create a wallet with an explicit initial balance
    ///
    /// # Errors
    ///
    /// * `WalletError::InvalidAmount` - Negative or too precise initial balance
    pub async fn create_wallet_with_balance(
        &self,
        initial_balance: Decimal,
    ) -> WalletResult<Wallet> {
        let initial_balance = validate_initial_balance(initial_balance)?;

        let result = protocol::create_wallet(
            self.store.as_ref(),
            initial_balance,
            Deadline::after(self.transaction_timeout),
        )
        .await;

        match &result {
            Ok(wallet) => log::info!("Wallet created: {}, balance {}", wallet.id, wallet.balance),
            Err(err) => log::error!("Wallet creation failed: {err}"),
        }
        result
    }

    /// Apply a deposit or withdrawal
    ///
    /// The amount is validated before any storage access.
    ///
    /// # Arguments
    ///
    /// * `wallet_id` - Wallet to mutate
    /// * `operation` - Deposit or withdraw
    /// * `amount` - Raw amount, must be positive with at most two fractional digits
    ///
    /// # Returns
    ///
    /// * `WalletResult<Wallet>` - Wallet with its committed new balance
    ///
    /// # Errors
    ///
    /// * `WalletError::InvalidAmount` - Amount rejected before reaching the store
    /// * `WalletError::WalletNotFound` - No wallet with that id
    /// * `WalletError::InsufficientFunds` - Withdrawal would go below zero
    pub async fn perform_operation(
        &self,
        wallet_id: WalletId,
        operation: OperationType,
        amount: Decimal,
    ) -> WalletResult<Wallet> {
        let amount = match Amount::new(amount) {
            Ok(amount) => amount,
            Err(err) => {
                log::warn!("{operation} rejected for wallet {wallet_id}: {err}");
                return Err(err);
            }
        };

        let result = protocol::apply_operation(
            self.store.as_ref(),
            wallet_id,
            operation,
            amount,
            Deadline::after(self.transaction_timeout),
        )
        .await;

        match &result {
            Ok(wallet) => log::info!(
                "{operation}: wallet={wallet_id}, amount={amount}, new_balance={}",
                wallet.balance
            ),
            Err(err) if err.is_infrastructure() => {
                log::error!("{operation} failed for wallet {wallet_id}: {err}")
            }
            Err(err) => log::warn!("{operation} rejected for wallet {wallet_id}: {err}"),
        }
        result
    }

    /// Check that the underlying store is reachable
    pub async fn health_check(&self) -> WalletResult<()> {
        self.store.health_check().await
    }
}
