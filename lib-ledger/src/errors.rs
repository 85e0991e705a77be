//! Ledger and storage errors.

use lib_types::{Address, BlockHeight, CurrencyError, ValidatorKey};
use thiserror::Error;

/// Error from the underlying key-value backend
#[derive(Error, Debug, Clone)]
pub enum KvError {
    #[error("database error: {0}")]
    Database(String),

    #[error("serialization error: {0}")]
    Serialization(String),
}

/// Result type for key-value operations
pub type KvResult<T> = Result<T, KvError>;

/// Error from a ledger mutation or lookup
#[derive(Error, Debug, Clone)]
pub enum LedgerError {
    /// The validator key is already bound to a different holder (1:1 invariant).
    #[error("validator {validator} already bound to holder {holder}")]
    ValidatorTaken {
        validator: ValidatorKey,
        holder: Address,
    },

    /// Removing this stake would leave the validator set empty.
    #[error("cannot remove the last validator stake")]
    LastValidator,

    /// The caller does not hold the stake bound to this validator key.
    #[error("holder does not match the validator's stake holder")]
    PermissionDenied,

    /// The validator key does not match the holder's current stake.
    #[error("validator key does not match the holder's stake")]
    BadValidator,

    /// A pending stake decrease already exists at this unlock height.
    #[error("a locked stake already exists at height {0}")]
    HeightTaken(BlockHeight),

    /// The holder (or named delegatee) has no stake.
    #[error("no stake for {0}")]
    NoStake(Address),

    /// Scheduled decreases would exceed the staked amount.
    #[error("pending decreases exceed the staked amount")]
    ExcessiveDecrease,

    /// The stake cannot be fully removed while delegations still name it.
    #[error("stake still has delegations")]
    DelegatesRemain,

    #[error(transparent)]
    Currency(#[from] CurrencyError),

    #[error(transparent)]
    Kv(#[from] KvError),

    /// Primary/index desync or undecodable stored value. Fatal: the caller
    /// must halt rather than keep running on inconsistent state.
    #[error("internal consistency fault: {0}")]
    Consistency(String),
}

/// Result type for ledger operations
pub type LedgerResult<T> = Result<T, LedgerError>;
