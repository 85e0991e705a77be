//! Arbitrary-precision currency arithmetic.
//!
//! `Currency` is the foundation for every monetary and stake quantity in the
//! state machine. It is a non-negative integer bounded to 256 bits so that
//! amounts always fit the fixed-width portion of the effective-stake index
//! key. All arithmetic is exact; there is no floating point anywhere in
//! consensus-critical code.

use num_bigint::BigUint;
use serde::{de, Deserialize, Deserializer, Serialize, Serializer};
use std::cmp::Ordering;
use std::fmt;

/// Width of the big-endian key encoding, in bytes (256-bit amounts).
pub const CURRENCY_KEY_LEN: usize = 32;

/// Error from currency arithmetic or decoding
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum CurrencyError {
    #[error("currency underflow: subtrahend exceeds minuend")]
    Underflow,

    #[error("currency overflow: amount exceeds 256 bits")]
    Overflow,

    #[error("invalid decimal string: {0}")]
    BadDecimal(String),
}

/// Non-negative 256-bit-bounded integer amount with exact arithmetic.
///
/// Serializes as a decimal string so that amounts beyond u64 survive JSON.
#[derive(Clone, PartialEq, Eq, Default, Hash)]
pub struct Currency(BigUint);

impl Currency {
    pub fn zero() -> Self {
        Self(BigUint::default())
    }

    pub fn is_zero(&self) -> bool {
        self.0 == BigUint::default()
    }

    /// Parse a base-10 amount string.
    pub fn from_decimal(s: &str) -> Result<Self, CurrencyError> {
        let v = s
            .parse::<BigUint>()
            .map_err(|_| CurrencyError::BadDecimal(s.to_string()))?;
        Self::try_from(v)
    }

    /// Exact addition; fails only if the sum no longer fits 256 bits.
    pub fn checked_add(&self, other: &Currency) -> Result<Currency, CurrencyError> {
        Currency::try_from(&self.0 + &other.0)
    }

    /// Exact subtraction; fails if `other > self` (balances never go negative).
    pub fn checked_sub(&self, other: &Currency) -> Result<Currency, CurrencyError> {
        if other.0 > self.0 {
            return Err(CurrencyError::Underflow);
        }
        Ok(Currency(&self.0 - &other.0))
    }

    /// Big-endian, zero-padded 32-byte encoding. Sorts numerically as bytes,
    /// which is what the effective-stake index relies on.
    pub fn to_key_bytes(&self) -> [u8; CURRENCY_KEY_LEN] {
        let raw = self.0.to_bytes_be();
        let mut out = [0u8; CURRENCY_KEY_LEN];
        out[CURRENCY_KEY_LEN - raw.len()..].copy_from_slice(&raw);
        out
    }

    /// Decode the key encoding produced by [`Currency::to_key_bytes`].
    pub fn from_key_bytes(bytes: &[u8; CURRENCY_KEY_LEN]) -> Self {
        Self(BigUint::from_bytes_be(bytes))
    }

    /// Borrow the underlying integer for wider intermediate arithmetic
    /// (voting-power shifts, reward splits).
    pub fn as_biguint(&self) -> &BigUint {
        &self.0
    }
}

impl TryFrom<BigUint> for Currency {
    type Error = CurrencyError;

    fn try_from(v: BigUint) -> Result<Self, Self::Error> {
        if v.bits() > (CURRENCY_KEY_LEN as u64) * 8 {
            return Err(CurrencyError::Overflow);
        }
        Ok(Self(v))
    }
}

impl From<u64> for Currency {
    fn from(v: u64) -> Self {
        Self(BigUint::from(v))
    }
}

impl PartialOrd for Currency {
    fn partial_cmp(&self, other: &Self) -> Option<Ordering> {
        Some(self.cmp(other))
    }
}

impl Ord for Currency {
    fn cmp(&self, other: &Self) -> Ordering {
        self.0.cmp(&other.0)
    }
}

impl fmt::Debug for Currency {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "Currency({})", self.0)
    }
}

impl fmt::Display for Currency {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

impl Serialize for Currency {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.serialize_str(&self.0.to_string())
    }
}

impl<'de> Deserialize<'de> for Currency {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        let s = String::deserialize(deserializer)?;
        Currency::from_decimal(&s).map_err(de::Error::custom)
    }
}
