//! Wallet data models.

use chrono::{DateTime, Utc};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use super::errors::{WalletError, WalletResult};

/// Wallet ID type
pub type WalletId = Uuid;

/// Number of fractional digits carried by every balance and amount.
pub const BALANCE_SCALE: u32 = 2;

/// Largest balance a wallet can hold (`NUMERIC(18, 2)`).
pub const MAX_BALANCE: Decimal = Decimal::from_parts(2_808_348_671, 232_830_643, 0, false, 2);

/// Wallet model
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Wallet {
    pub id: WalletId,
    pub balance: Decimal,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl Wallet {
    /// Build a wallet whose balance is normalized to two fractional digits.
    pub fn new(
        id: WalletId,
        balance: Decimal,
        created_at: DateTime<Utc>,
        updated_at: DateTime<Utc>,
    ) -> Self {
        Self {
            id,
            balance: normalize(balance),
            created_at,
            updated_at,
        }
    }
}

/// Operation applied to a wallet balance
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "UPPERCASE")]
pub enum OperationType {
    Deposit,
    Withdraw,
}

impl std::fmt::Display for OperationType {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            OperationType::Deposit => write!(f, "DEPOSIT"),
            OperationType::Withdraw => write!(f, "WITHDRAW"),
        }
    }
}

/// A validated operation amount.
///
/// Strictly positive, at most [`BALANCE_SCALE`] fractional digits and never
/// above [`MAX_BALANCE`]. The only way to obtain one is [`Amount::new`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct Amount(Decimal);

impl Amount {
    /// Validate a raw decimal as an operation amount
    ///
    /// # Errors
    ///
    /// * `WalletError::InvalidAmount` - Zero, negative, too precise or too large
    pub fn new(value: Decimal) -> WalletResult<Self> {
        if value <= Decimal::ZERO {
            return Err(WalletError::InvalidAmount(format!(
                "amount must be greater than zero, got {value}"
            )));
        }
        if value.normalize().scale() > BALANCE_SCALE {
            return Err(WalletError::InvalidAmount(format!(
                "amount must have at most {BALANCE_SCALE} fractional digits, got {value}"
            )));
        }
        if value > MAX_BALANCE {
            return Err(WalletError::InvalidAmount(format!(
                "amount must not exceed {MAX_BALANCE}, got {value}"
            )));
        }
        Ok(Self(normalize(value)))
    }

    pub fn value(&self) -> Decimal {
        self.0
    }
}

impl TryFrom<Decimal> for Amount {
    type Error = WalletError;

    fn try_from(value: Decimal) -> Result<Self, Self::Error> {
        Amount::new(value)
    }
}

impl std::fmt::Display for Amount {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        self.0.fmt(f)
    }
}

/// Validate an initial balance for a new wallet (zero allowed).
pub fn validate_initial_balance(value: Decimal) -> WalletResult<Decimal> {
    if value.is_zero() {
        return Ok(normalize(Decimal::ZERO));
    }
    Amount::new(value).map(|amount| amount.value())
}

/// Rescale a decimal to exactly [`BALANCE_SCALE`] fractional digits.
///
/// Callers only pass values that already fit the scale, so this never rounds.
pub fn normalize(value: Decimal) -> Decimal {
    let mut value = value.normalize();
    value.rescale(BALANCE_SCALE);
    value
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::str::FromStr;

    fn dec(s: &str) -> Decimal {
        Decimal::from_str(s).unwrap()
    }

    #[test]
    fn test_max_balance_constant() {
        assert_eq!(MAX_BALANCE, dec("9999999999999999.99"));
        assert_eq!(MAX_BALANCE.scale(), 2);
    }

    #[test]
    fn test_amount_rejects_non_positive() {
        assert!(matches!(
            Amount::new(Decimal::ZERO),
            Err(WalletError::InvalidAmount(_))
        ));
        assert!(matches!(
            Amount::new(dec("-100")),
            Err(WalletError::InvalidAmount(_))
        ));
    }

    #[test]
    fn test_amount_rejects_excess_precision() {
        assert!(Amount::new(dec("0.001")).is_err());
        assert!(Amount::new(dec("10.123")).is_err());
        // Trailing zeros are not extra precision
        assert_eq!(Amount::new(dec("10.1000")).unwrap().value(), dec("10.10"));
    }

    #[test]
    fn test_amount_rejects_above_max() {
        assert!(Amount::new(MAX_BALANCE).is_ok());
        assert!(Amount::new(MAX_BALANCE + dec("0.01")).is_err());
    }

    #[test]
    fn test_amount_is_normalized() {
        let amount = Amount::new(dec("100")).unwrap();
        assert_eq!(amount.value().to_string(), "100.00");
    }

    #[test]
    fn test_initial_balance_allows_zero() {
        assert_eq!(
            validate_initial_balance(Decimal::ZERO).unwrap().to_string(),
            "0.00"
        );
        assert!(validate_initial_balance(dec("-1")).is_err());
    }

    #[test]
    fn test_operation_type_serde() {
        let json = serde_json::to_string(&OperationType::Withdraw).unwrap();
        assert_eq!(json, "\"WITHDRAW\"");
        let parsed: OperationType = serde_json::from_str("\"DEPOSIT\"").unwrap();
        assert_eq!(parsed, OperationType::Deposit);
        assert!(serde_json::from_str::<OperationType>("\"TRANSFER\"").is_err());
    }

    #[test]
    fn test_wallet_new_normalizes_balance() {
        let now = Utc::now();
        let wallet = Wallet::new(Uuid::new_v4(), Decimal::ZERO, now, now);
        assert_eq!(wallet.balance.to_string(), "0.00");
    }
}
