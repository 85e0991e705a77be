//! Staking and delegation records.
//!
//! These are the persisted value shapes; the index discipline around them
//! (validator 1:1, effective-stake ordering) lives in the ledger crate.

use serde::{Deserialize, Serialize};

use crate::currency::Currency;
use crate::primitives::{Address, BlockHeight, ValidatorKey};

/// A holder's stake: the validator key it backs and the staked amount.
///
/// A stake record with a zero amount is never stored; deletion is the
/// canonical representation of "no stake".
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Stake {
    pub validator: ValidatorKey,
    pub amount: Currency,
}

/// A delegation from one holder to a staking delegatee.
///
/// May exist only while the delegatee holds a non-zero stake.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Delegate {
    pub delegatee: Address,
    pub amount: Currency,
}

/// A pending stake decrease, applied once `unlock_height` is reached.
///
/// Until then the scheduled amount still counts toward the holder's
/// effective stake and voting power. At most one lock per holder per
/// unlock height.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct LockedStake {
    pub validator: ValidatorKey,
    pub amount: Currency,
    pub unlock_height: BlockHeight,
}
