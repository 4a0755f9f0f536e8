//! Wallet error types.

use rust_decimal::Decimal;
use std::time::Duration;
use thiserror::Error;

use super::models::WalletId;

/// SQLSTATE raised by PostgreSQL when `lock_timeout` expires.
const LOCK_NOT_AVAILABLE: &str = "55P03";

/// Wallet errors
#[derive(Debug, Error)]
pub enum WalletError {
    /// Database error
    #[error("Database error: {0}")]
    Database(#[from] sqlx::Error),

    /// Wallet not found
    #[error("Wallet not found: {0}")]
    WalletNotFound(WalletId),

    /// Withdrawal would take the balance below zero
    #[error("Insufficient funds: available {available}, required {required}")]
    InsufficientFunds {
        available: Decimal,
        required: Decimal,
    },

    /// Invalid amount (must be positive with at most two fractional digits)
    #[error("Invalid amount: {0}")]
    InvalidAmount(String),

    /// Deposit would exceed the largest storable balance
    #[error("Balance overflow: result exceeds the maximum wallet balance")]
    BalanceOverflow,

    /// Waiting for the wallet row lock took too long
    #[error("Timed out after {0:?} waiting for wallet lock")]
    LockTimeout(Duration),

    /// The whole operation took too long and was rolled back
    #[error("Wallet operation timed out after {0:?}")]
    Timeout(Duration),

    /// Transaction failed
    #[error("Transaction failed: {0}")]
    TransactionFailed(String),
}

impl WalletError {
    /// Classify a database error raised while waiting on a row lock.
    pub fn from_lock_wait(err: sqlx::Error, lock_timeout: Duration) -> Self {
        let lock_expired = err
            .as_database_error()
            .and_then(|db| db.code())
            .is_some_and(|code| code == LOCK_NOT_AVAILABLE);

        if lock_expired {
            WalletError::LockTimeout(lock_timeout)
        } else {
            WalletError::Database(err)
        }
    }

    /// Whether the error comes from the storage layer rather than a business rule.
    ///
    /// Infrastructure errors always leave the transaction rolled back.
    pub fn is_infrastructure(&self) -> bool {
        matches!(
            self,
            WalletError::Database(_)
                | WalletError::LockTimeout(_)
                | WalletError::Timeout(_)
                | WalletError::TransactionFailed(_)
        )
    }

    /// Get a client-safe error message that doesn't leak sensitive information
    pub fn client_message(&self) -> String {
        match self {
            WalletError::Database(_) | WalletError::TransactionFailed(_) => {
                "Internal server error".to_string()
            }
            WalletError::LockTimeout(_) | WalletError::Timeout(_) => {
                "Service temporarily unavailable".to_string()
            }
            WalletError::WalletNotFound(_) => "Wallet not found".to_string(),
            WalletError::InsufficientFunds { .. } => "Insufficient funds".to_string(),
            _ => self.to_string(),
        }
    }
}

/// Result type for wallet operations
pub type WalletResult<T> = Result<T, WalletError>;
