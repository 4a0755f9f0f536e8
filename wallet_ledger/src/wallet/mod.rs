//! Wallet module providing concurrency-safe balance management.
//!
//! This module implements:
//! - The wallet model with exact two-digit decimal balances
//! - A balance transaction protocol that locks one wallet row per operation
//! - The [`WalletManager`] facade used by the HTTP layer
//!
//! ## Example
//!
//! ```no_run
//! use wallet_ledger::db::{Database, DatabaseConfig};
//! use wallet_ledger::wallet::{OperationType, WalletManager};
//! use rust_decimal::Decimal;
//! use std::sync::Arc;
//!
//! #[tokio::main]
//! async fn main() -> Result<(), Box<dyn std::error::Error>> {
//!     let config = DatabaseConfig::default();
//!     let db = Database::new(&config).await?;
//!     let store = Arc::new(db.wallet_store(config.lock_timeout()));
//!     let wallets = WalletManager::new(store, config.transaction_timeout());
//!
//!     let wallet = wallets.create_wallet().await?;
//!     let wallet = wallets
//!         .perform_operation(wallet.id, OperationType::Deposit, Decimal::new(100000, 2))
//!         .await?;
//!     println!("New balance: {}", wallet.balance);
//!
//!     Ok(())
//! }
//! ```

pub mod errors;
pub mod manager;
pub mod models;
pub mod protocol;

pub use errors::{WalletError, WalletResult};
pub use manager::WalletManager;
pub use models::{
    Amount, BALANCE_SCALE, MAX_BALANCE, OperationType, Wallet, WalletId, normalize,
    validate_initial_balance,
};
