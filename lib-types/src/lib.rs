//! Consensus-critical primitive types.
//! Stable, protocol-neutral, behavior-free where possible.
//!
//! Every type here participates in the deterministic state commitment, so
//! encodings are fixed: addresses and keys are fixed-size byte arrays that
//! serialize as hex strings, currency serializes as a decimal string.

pub mod currency;
pub mod primitives;
pub mod staking;

pub use currency::{Currency, CurrencyError};
pub use primitives::{Address, AppHash, BlockHeight, ValidatorKey, ADDRESS_LEN, VALIDATOR_KEY_LEN};
pub use staking::{Delegate, LockedStake, Stake};
