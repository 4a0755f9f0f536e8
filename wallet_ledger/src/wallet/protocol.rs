//! Balance transaction protocol.
//!
//! Applies one deposit or withdrawal to exactly one wallet:
//!
//! 1. open a transaction
//! 2. lock the wallet row (`lookup_for_update`)
//! 3. compute the candidate balance from the locked, committed balance
//! 4. reject a negative withdrawal result or an overflowing deposit
//! 5. persist the candidate
//! 6. commit
//!
//! The row lock serializes every operation on a wallet, so the candidate is
//! always derived from the immediately preceding committed balance. Any
//! failure before the commit rolls the transaction back and leaves the stored
//! balance untouched. The transaction deadline bounds steps 1 to 5 only; once
//! the commit has been sent its result is what the caller sees.
//! Nothing here retries.

use rust_decimal::Decimal;

use super::{
    errors::{WalletError, WalletResult},
    models::{Amount, MAX_BALANCE, OperationType, Wallet, WalletId},
};
use crate::db::{WalletStore, WalletTransaction, timeouts::Deadline};

/// Compute the balance that results from applying `amount` to `balance`.
///
/// # Errors
///
/// * `WalletError::InsufficientFunds` - Withdrawal would go below zero
/// * `WalletError::BalanceOverflow` - Deposit would exceed [`MAX_BALANCE`]
pub fn candidate_balance(
    balance: Decimal,
    operation: OperationType,
    amount: Amount,
) -> WalletResult<Decimal> {
    match operation {
        OperationType::Deposit => balance
            .checked_add(amount.value())
            .filter(|candidate| *candidate <= MAX_BALANCE)
            .ok_or(WalletError::BalanceOverflow),
        OperationType::Withdraw => {
            let candidate = balance - amount.value();
            if candidate < Decimal::ZERO {
                return Err(WalletError::InsufficientFunds {
                    available: balance,
                    required: amount.value(),
                });
            }
            Ok(candidate)
        }
    }
}

/// Apply a deposit or withdrawal atomically with respect to every other
/// operation on the same wallet.
///
/// # Arguments
///
/// * `store` - Wallet store
/// * `wallet_id` - Wallet to mutate
/// * `operation` - Deposit or withdraw
/// * `amount` - Validated amount
/// * `deadline` - Bound on every stage before the commit
///
/// # Returns
///
/// * `WalletResult<Wallet>` - Wallet as committed
///
/// # Errors
///
/// * `WalletError::WalletNotFound` - No wallet with that id
/// * `WalletError::InsufficientFunds` - Withdrawal would go below zero
/// * `WalletError::BalanceOverflow` - Deposit would exceed the maximum balance
/// * `WalletError::LockTimeout` / `WalletError::Database` - Storage failure
/// * `WalletError::Timeout` - Deadline passed before the commit started
pub async fn apply_operation(
    store: &dyn WalletStore,
    wallet_id: WalletId,
    operation: OperationType,
    amount: Amount,
    deadline: Deadline,
) -> WalletResult<Wallet> {
    let mut tx = deadline.run(store.begin()).await?;

    let staged = deadline
        .run(mutate(tx.as_mut(), wallet_id, operation, amount))
        .await;

    match staged {
        Ok(wallet) => {
            tx.commit().await?;
            Ok(wallet)
        }
        Err(err) => {
            if let Err(rollback_err) = tx.rollback().await {
                log::error!("Rollback failed for wallet {wallet_id}: {rollback_err}");
            }
            Err(err)
        }
    }
}

async fn mutate(
    tx: &mut dyn WalletTransaction,
    wallet_id: WalletId,
    operation: OperationType,
    amount: Amount,
) -> WalletResult<Wallet> {
    let wallet = tx
        .lookup_for_update(wallet_id)
        .await?
        .ok_or(WalletError::WalletNotFound(wallet_id))?;

    let candidate = candidate_balance(wallet.balance, operation, amount)?;

    tx.persist_balance(&wallet, candidate).await
}

/// Insert a wallet and commit it in a single transaction.
///
/// Like [`apply_operation`], the deadline bounds every stage before the commit.
pub async fn create_wallet(
    store: &dyn WalletStore,
    initial_balance: Decimal,
    deadline: Deadline,
) -> WalletResult<Wallet> {
    let mut tx = deadline.run(store.begin()).await?;

    let inserted = deadline.run(tx.insert(initial_balance)).await;

    match inserted {
        Ok(wallet) => {
            tx.commit().await?;
            Ok(wallet)
        }
        Err(err) => {
            if let Err(rollback_err) = tx.rollback().await {
                log::error!("Rollback failed after wallet insert error: {rollback_err}");
            }
            Err(err)
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::db::MemoryWalletStore;
    use std::str::FromStr;
    use std::time::Duration;
    use uuid::Uuid;

    fn dec(s: &str) -> Decimal {
        Decimal::from_str(s).unwrap()
    }

    fn amount(s: &str) -> Amount {
        Amount::new(dec(s)).unwrap()
    }

    #[test]
    fn test_candidate_deposit() {
        let result = candidate_balance(dec("10.50"), OperationType::Deposit, amount("0.50"));
        assert_eq!(result.unwrap(), dec("11.00"));
    }

    #[test]
    fn test_candidate_withdraw_to_zero() {
        let result = candidate_balance(dec("100.00"), OperationType::Withdraw, amount("100.00"));
        assert_eq!(result.unwrap(), Decimal::ZERO);
    }

    #[test]
    fn test_candidate_withdraw_insufficient() {
        let result = candidate_balance(dec("99.99"), OperationType::Withdraw, amount("100.00"));
        match result {
            Err(WalletError::InsufficientFunds {
                available,
                required,
            }) => {
                assert_eq!(available, dec("99.99"));
                assert_eq!(required, dec("100.00"));
            }
            other => panic!("expected InsufficientFunds, got {other:?}"),
        }
    }

    #[test]
    fn test_candidate_deposit_overflow() {
        let result = candidate_balance(MAX_BALANCE, OperationType::Deposit, amount("0.01"));
        assert!(matches!(result, Err(WalletError::BalanceOverflow)));
    }

    #[test]
    fn test_candidate_is_exact() {
        // 0.10 added ten times is exactly 1.00 in decimal arithmetic
        let mut balance = Decimal::ZERO;
        for _ in 0..10 {
            balance = candidate_balance(balance, OperationType::Deposit, amount("0.10")).unwrap();
        }
        assert_eq!(balance, dec("1.00"));
    }

    fn deadline() -> Deadline {
        Deadline::after(Duration::from_secs(5))
    }

    #[tokio::test]
    async fn test_apply_operation_unknown_wallet() {
        let store = MemoryWalletStore::new(Duration::from_secs(1));
        let result = apply_operation(
            &store,
            Uuid::new_v4(),
            OperationType::Deposit,
            amount("1.00"),
            deadline(),
        )
        .await;
        assert!(matches!(result, Err(WalletError::WalletNotFound(_))));
    }

    #[tokio::test]
    async fn test_failed_withdraw_releases_lock() {
        let store = MemoryWalletStore::new(Duration::from_millis(200));
        let wallet = create_wallet(&store, Decimal::ZERO, deadline()).await.unwrap();

        let result = apply_operation(
            &store,
            wallet.id,
            OperationType::Withdraw,
            amount("100.00"),
            deadline(),
        )
        .await;
        assert!(matches!(result, Err(WalletError::InsufficientFunds { .. })));

        // A rolled-back operation must not leave the row locked
        let updated = apply_operation(
            &store,
            wallet.id,
            OperationType::Deposit,
            amount("1.00"),
            deadline(),
        )
        .await
        .unwrap();
        assert_eq!(updated.balance, dec("1.00"));
    }

    #[tokio::test]
    async fn test_deadline_before_commit_rolls_back() {
        let store = MemoryWalletStore::new(Duration::from_secs(5));
        let wallet = create_wallet(&store, dec("10.00"), deadline()).await.unwrap();

        let mut holder = store.begin().await.unwrap();
        holder.lookup_for_update(wallet.id).await.unwrap();

        let result = apply_operation(
            &store,
            wallet.id,
            OperationType::Deposit,
            amount("5.00"),
            Deadline::after(Duration::from_millis(30)),
        )
        .await;
        assert!(matches!(result, Err(WalletError::Timeout(_))));

        holder.rollback().await.unwrap();
        let stored = store.lookup(wallet.id).await.unwrap().unwrap();
        assert_eq!(stored.balance, dec("10.00"));
    }
}
