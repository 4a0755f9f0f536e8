//! # Wallet Ledger
//!
//! A balance ledger where concurrent deposits and withdrawals can never drive a
//! wallet below zero or lose an update.
//!
//! Every balance change runs through a single protocol: lock the wallet row,
//! derive the new balance from the committed one, persist it and commit. The
//! exclusive row lock is what serializes concurrent operations on one wallet;
//! there is no in-process queue.
//!
//! ## Core Modules
//!
//! - [`wallet`]: Wallet model, errors, balance protocol and the [`WalletManager`] facade
//! - [`db`]: Store contract with PostgreSQL and in-memory implementations, pool setup
//!
//! ## Example
//!
//! ```
//! use wallet_ledger::{db::MemoryWalletStore, wallet::WalletManager};
//! use std::{sync::Arc, time::Duration};
//!
//! let store = Arc::new(MemoryWalletStore::new(Duration::from_secs(5)));
//! let wallets = WalletManager::new(store, Duration::from_secs(10));
//! ```

/// Storage layer: connection pool, store contract and implementations.
pub mod db;

/// Wallet model, balance protocol and facade.
pub mod wallet;

pub use db::{Database, DatabaseConfig, MemoryWalletStore, PgWalletStore, WalletStore};
pub use wallet::{OperationType, Wallet, WalletError, WalletManager, WalletResult};
