//! Canonical fixed-size identifiers.
//!
//! Rule: no String identifiers in consensus state. Ever.
//!
//! These types are:
//! - Fixed-size (no dynamic allocation)
//! - Deterministically serializable (hex strings in JSON)
//! - Efficient to copy and compare

use serde::{de, Deserialize, Deserializer, Serialize, Serializer};
use sha2::{Digest, Sha256};
use std::fmt;

/// Block height in the chain (0-indexed; 0 means "nothing committed yet")
pub type BlockHeight = u64;

/// Account address length in bytes
pub const ADDRESS_LEN: usize = 20;

/// Validator (ed25519) public key length in bytes
pub const VALIDATOR_KEY_LEN: usize = 32;

// ============================================================================
// ADDRESS
// ============================================================================

/// 20-byte account address, derived from the account's public key.
///
/// Used as the key for balances, stakes, and delegations.
#[derive(Clone, Copy, Eq, PartialEq, Ord, PartialOrd, Hash, Default)]
pub struct Address(pub [u8; ADDRESS_LEN]);

impl Address {
    pub const fn new(bytes: [u8; ADDRESS_LEN]) -> Self {
        Self(bytes)
    }

    /// Derive an address from raw public key bytes: SHA-256 truncated to 20 bytes.
    pub fn from_public_key(pubkey_bytes: &[u8]) -> Self {
        let digest = Sha256::digest(pubkey_bytes);
        let mut out = [0u8; ADDRESS_LEN];
        out.copy_from_slice(&digest[..ADDRESS_LEN]);
        Self(out)
    }

    pub const fn as_bytes(&self) -> &[u8; ADDRESS_LEN] {
        &self.0
    }

    /// Parse from a hex string (40 hex chars).
    pub fn from_hex(s: &str) -> Result<Self, TypeError> {
        let raw = hex::decode(s).map_err(|_| TypeError::BadHex)?;
        Self::try_from(raw.as_slice())
    }
}

impl TryFrom<&[u8]> for Address {
    type Error = TypeError;

    fn try_from(bytes: &[u8]) -> Result<Self, Self::Error> {
        if bytes.len() != ADDRESS_LEN {
            return Err(TypeError::BadLength {
                what: "address",
                expected: ADDRESS_LEN,
                actual: bytes.len(),
            });
        }
        let mut out = [0u8; ADDRESS_LEN];
        out.copy_from_slice(bytes);
        Ok(Self(out))
    }
}

impl fmt::Debug for Address {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "Address({})", hex::encode(&self.0[..6]))
    }
}

impl fmt::Display for Address {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", hex::encode(self.0))
    }
}

impl AsRef<[u8]> for Address {
    fn as_ref(&self) -> &[u8] {
        &self.0
    }
}

impl Serialize for Address {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.serialize_str(&hex::encode(self.0))
    }
}

impl<'de> Deserialize<'de> for Address {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        let s = String::deserialize(deserializer)?;
        Address::from_hex(&s).map_err(de::Error::custom)
    }
}

// ============================================================================
// VALIDATOR KEY
// ============================================================================

/// 32-byte ed25519 public key identifying a consensus validator.
#[derive(Clone, Copy, Eq, PartialEq, Ord, PartialOrd, Hash, Default)]
pub struct ValidatorKey(pub [u8; VALIDATOR_KEY_LEN]);

impl ValidatorKey {
    pub const fn new(bytes: [u8; VALIDATOR_KEY_LEN]) -> Self {
        Self(bytes)
    }

    pub const fn as_bytes(&self) -> &[u8; VALIDATOR_KEY_LEN] {
        &self.0
    }

    pub fn from_hex(s: &str) -> Result<Self, TypeError> {
        let raw = hex::decode(s).map_err(|_| TypeError::BadHex)?;
        Self::try_from(raw.as_slice())
    }

    /// The consensus-engine-facing address of this validator key
    /// (SHA-256 of the key, truncated), used for proposer lookup.
    pub fn validator_address(&self) -> Address {
        Address::from_public_key(&self.0)
    }
}

impl TryFrom<&[u8]> for ValidatorKey {
    type Error = TypeError;

    fn try_from(bytes: &[u8]) -> Result<Self, Self::Error> {
        if bytes.len() != VALIDATOR_KEY_LEN {
            return Err(TypeError::BadLength {
                what: "validator key",
                expected: VALIDATOR_KEY_LEN,
                actual: bytes.len(),
            });
        }
        let mut out = [0u8; VALIDATOR_KEY_LEN];
        out.copy_from_slice(bytes);
        Ok(Self(out))
    }
}

impl From<&ed25519_dalek::VerifyingKey> for ValidatorKey {
    fn from(key: &ed25519_dalek::VerifyingKey) -> Self {
        Self(key.to_bytes())
    }
}

impl fmt::Debug for ValidatorKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "ValidatorKey({})", hex::encode(&self.0[..6]))
    }
}

impl fmt::Display for ValidatorKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", hex::encode(self.0))
    }
}

impl AsRef<[u8]> for ValidatorKey {
    fn as_ref(&self) -> &[u8] {
        &self.0
    }
}

impl Serialize for ValidatorKey {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.serialize_str(&hex::encode(self.0))
    }
}

impl<'de> Deserialize<'de> for ValidatorKey {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        let s = String::deserialize(deserializer)?;
        ValidatorKey::from_hex(&s).map_err(de::Error::custom)
    }
}

// ============================================================================
// APP HASH
// ============================================================================

/// 32-byte state commitment returned to the consensus engine at Commit.
#[derive(Clone, Copy, Eq, PartialEq, Hash, Default)]
pub struct AppHash(pub [u8; 32]);

impl AppHash {
    pub const fn new(bytes: [u8; 32]) -> Self {
        Self(bytes)
    }

    pub const fn zero() -> Self {
        Self([0u8; 32])
    }

    pub const fn as_bytes(&self) -> &[u8; 32] {
        &self.0
    }

    pub fn is_zero(&self) -> bool {
        self.0 == [0u8; 32]
    }
}

impl fmt::Debug for AppHash {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "AppHash({})", hex::encode(&self.0[..8]))
    }
}

impl fmt::Display for AppHash {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", hex::encode(self.0))
    }
}

impl AsRef<[u8]> for AppHash {
    fn as_ref(&self) -> &[u8] {
        &self.0
    }
}

impl Serialize for AppHash {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.serialize_str(&hex::encode(self.0))
    }
}

impl<'de> Deserialize<'de> for AppHash {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        let s = String::deserialize(deserializer)?;
        let raw = hex::decode(&s).map_err(de::Error::custom)?;
        if raw.len() != 32 {
            return Err(de::Error::custom("app hash must be 32 bytes"));
        }
        let mut out = [0u8; 32];
        out.copy_from_slice(&raw);
        Ok(Self(out))
    }
}

// ============================================================================
// ERRORS
// ============================================================================

/// Error constructing a primitive from raw input
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum TypeError {
    #[error("{what}: expected {expected} bytes, got {actual}")]
    BadLength {
        what: &'static str,
        expected: usize,
        actual: usize,
    },

    #[error("invalid hex encoding")]
    BadHex,
}
