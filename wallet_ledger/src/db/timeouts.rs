//! Timeout policy for wallet transactions
//!
//! Two bounds apply to every balance operation: the row-lock wait
//! (enforced by the store) and the transaction deadline (enforced here).
//!
//! The deadline covers everything up to, but not including, the commit.
//! Abandoning a commit that is already in flight could report a failure for
//! a write the database has made durable, so a commit always runs to
//! completion and its own outcome is returned.

use std::future::Future;
use std::time::Duration;
use tokio::time::{Instant, timeout_at};

use crate::wallet::{WalletError, WalletResult};

/// Default bound on waiting for a wallet row lock (5 seconds)
pub const DEFAULT_LOCK_TIMEOUT: Duration = Duration::from_secs(5);

/// Default bound on a whole wallet transaction (10 seconds)
pub const DEFAULT_TRANSACTION_TIMEOUT: Duration = Duration::from_secs(10);

/// Deadline shared by the pre-commit stages of one transaction
#[derive(Debug, Clone, Copy)]
pub struct Deadline {
    at: Instant,
    budget: Duration,
}

impl Deadline {
    /// Start a deadline `budget` from now
    pub fn after(budget: Duration) -> Self {
        Self {
            at: Instant::now() + budget,
            budget,
        }
    }

    pub fn budget(&self) -> Duration {
        self.budget
    }

    /// Run one stage of a transaction against the deadline
    ///
    /// On expiry the stage future is dropped and `WalletError::Timeout`
    /// carries the full budget. The caller still owns the transaction and
    /// must roll it back.
    ///
    /// # Example
    ///
    /// ```
    /// use std::time::Duration;
    /// use wallet_ledger::db::timeouts::Deadline;
    /// # #[tokio::main]
    /// # async fn main() {
    ///
    /// let deadline = Deadline::after(Duration::from_secs(1));
    /// let value = deadline.run(async { Ok(7) }).await.unwrap();
    /// assert_eq!(value, 7);
    /// # }
    /// ```
    pub async fn run<F, T>(&self, future: F) -> WalletResult<T>
    where
        F: Future<Output = WalletResult<T>>,
    {
        match timeout_at(self.at, future).await {
            Ok(result) => result,
            Err(_) => Err(WalletError::Timeout(self.budget)),
        }
    }
}
