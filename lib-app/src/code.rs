//! Result codes returned across the engine and query boundaries.
//!
//! These values are PROTOCOL: every node must return the same code for the
//! same input, and clients key retry/report behavior off them. Zero always
//! means success. Never renumber; only append.

use serde::{Deserialize, Serialize};

/// Transaction result code (CheckTx / DeliverTx).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[repr(u32)]
pub enum TxCode {
    Ok = 0,
    /// Structurally invalid payload (zero amount, bad field shape).
    BadParam = 1,
    NotEnoughBalance = 2,
    SelfTransaction = 3,
    /// Operating on state owned by someone else (validator key bound to a
    /// different holder, withdrawing another holder's stake).
    PermissionDenied = 4,
    /// Undecodable envelope.
    MalformedTx = 5,
    /// Well-formed envelope with an unrecognized operation type.
    UnknownType = 6,
    BadSignature = 7,
    /// A delegator may back only one delegatee at a time.
    MultipleDelegates = 8,
    DelegateNotFound = 9,
    NoStake = 10,
    /// A pending stake decrease already exists at the same unlock height.
    HeightTaken = 11,
    /// Validator key mismatches the holder's staked key.
    BadValidator = 12,
    /// The operation would leave the validator set empty.
    LastValidator = 13,
}

impl TxCode {
    pub fn is_ok(&self) -> bool {
        *self == TxCode::Ok
    }

    pub fn value(&self) -> u32 {
        *self as u32
    }
}

/// Query result code.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[repr(u32)]
pub enum QueryCode {
    Ok = 0,
    BadPath = 1,
    /// Missing or empty key parameter.
    NoKey = 2,
    /// Key parameter present but undecodable.
    BadKey = 3,
    /// Well-formed query with no matching state.
    NoMatch = 4,
}

impl QueryCode {
    pub fn value(&self) -> u32 {
        *self as u32
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_zero_means_success() {
        assert_eq!(TxCode::Ok.value(), 0);
        assert_eq!(QueryCode::Ok.value(), 0);
        assert!(TxCode::Ok.is_ok());
        assert!(!TxCode::BadSignature.is_ok());
    }

    #[test]
    fn test_codes_are_stable() {
        // pinned: clients depend on these exact values
        assert_eq!(TxCode::NotEnoughBalance.value(), 2);
        assert_eq!(TxCode::BadSignature.value(), 7);
        assert_eq!(TxCode::LastValidator.value(), 13);
        assert_eq!(QueryCode::NoMatch.value(), 4);
    }
}
