//! Transfer requirements and native-asset amounts
//!
//! Amounts are integer minor units (one minor unit = 10^-3 of the native
//! asset) so the fixed fees and listing prices the platform deals in are
//! represented exactly. The wire form is a decimal string.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::fmt;

use crate::errors::EngineError;
use crate::ids::ChainAddress;

/// Symbol of the native chain asset payments are denominated in.
pub const NATIVE_CURRENCY: &str = "ETH";

/// Minor units per whole native asset unit.
const MINOR_SCALE: i64 = 1_000;

/// A non-negative amount of the native asset, in minor units.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(try_from = "String", into = "String")]
pub struct AssetAmount(i64);

impl AssetAmount {
    pub const ZERO: AssetAmount = AssetAmount(0);

    /// Construct from minor units (10^-3 of the asset).
    pub fn from_minor(minor: i64) -> Result<Self, EngineError> {
        if minor < 0 {
            return Err(EngineError::InvalidAmount(minor.to_string()));
        }
        Ok(Self(minor))
    }

    /// Construct from whole asset units.
    pub fn from_major(major: i64) -> Result<Self, EngineError> {
        Self::from_minor(major.checked_mul(MINOR_SCALE).unwrap_or(-1))
    }

    pub fn minor(&self) -> i64 {
        self.0
    }

    /// Parse a decimal string such as `"3"`, `"1.5"` or `"0.25"`.
    ///
    /// At most three fractional digits are accepted; anything finer than the
    /// minor scale is rejected rather than rounded.
    pub fn parse(s: &str) -> Result<Self, EngineError> {
        let bad = || EngineError::InvalidAmount(s.to_string());
        let (whole, frac) = match s.split_once('.') {
            Some((w, f)) => (w, f),
            None => (s, ""),
        };
        if whole.is_empty() || frac.len() > 3 {
            return Err(bad());
        }
        if !whole.bytes().all(|b| b.is_ascii_digit()) || !frac.bytes().all(|b| b.is_ascii_digit()) {
            return Err(bad());
        }
        let major: i64 = whole.parse().map_err(|_| bad())?;
        let frac_minor: i64 = if frac.is_empty() {
            0
        } else {
            let digits: i64 = frac.parse().map_err(|_| bad())?;
            digits * 10_i64.pow(3 - frac.len() as u32)
        };
        let minor = major
            .checked_mul(MINOR_SCALE)
            .and_then(|m| m.checked_add(frac_minor))
            .ok_or_else(bad)?;
        Self::from_minor(minor).map_err(|_| bad())
    }
}

impl fmt::Display for AssetAmount {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let major = self.0 / MINOR_SCALE;
        let frac = self.0 % MINOR_SCALE;
        if frac == 0 {
            write!(f, "{major}")
        } else {
            let s = format!("{frac:03}");
            write!(f, "{}.{}", major, s.trim_end_matches('0'))
        }
    }
}

impl TryFrom<String> for AssetAmount {
    type Error = EngineError;

    fn try_from(value: String) -> Result<Self, Self::Error> {
        Self::parse(&value)
    }
}

impl From<AssetAmount> for String {
    fn from(amount: AssetAmount) -> Self {
        amount.to_string()
    }
}

/// What a payer must satisfy for a session to proceed past payment-wait.
///
/// Computed once per session and never mutated afterwards.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TransferRequirement {
    /// Destination account the payment must reach.
    pub to_address: ChainAddress,
    /// Required amount; larger transfers also satisfy the requirement.
    pub amount: AssetAmount,
    /// Native-asset symbol.
    pub currency: String,
    /// When payment-wait was entered; the wait ceiling counts from here.
    pub opened_at: DateTime<Utc>,
}

impl TransferRequirement {
    pub fn new(to_address: ChainAddress, amount: AssetAmount) -> Self {
        Self {
            to_address,
            amount,
            currency: NATIVE_CURRENCY.to_string(),
            opened_at: Utc::now(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_and_display() {
        assert_eq!(AssetAmount::parse("3").unwrap().minor(), 3_000);
        assert_eq!(AssetAmount::parse("1.5").unwrap().minor(), 1_500);
        assert_eq!(AssetAmount::parse("0.25").unwrap().minor(), 250);
        assert_eq!(AssetAmount::parse("2.0").unwrap().to_string(), "2");
        assert_eq!(AssetAmount::parse("1.5").unwrap().to_string(), "1.5");
        assert_eq!(AssetAmount::from_minor(250).unwrap().to_string(), "0.25");
    }

    #[test]
    fn test_parse_rejects_invalid() {
        assert!(AssetAmount::parse("").is_err());
        assert!(AssetAmount::parse(".5").is_err());
        assert!(AssetAmount::parse("1.2345").is_err());
        assert!(AssetAmount::parse("-1").is_err());
        assert!(AssetAmount::parse("abc").is_err());
    }

    #[test]
    fn test_serde_decimal_string() {
        let amount = AssetAmount::parse("1.5").unwrap();
        let json = serde_json::to_string(&amount).unwrap();
        assert_eq!(json, "\"1.5\"");
        let back: AssetAmount = serde_json::from_str(&json).unwrap();
        assert_eq!(back, amount);
    }
}
