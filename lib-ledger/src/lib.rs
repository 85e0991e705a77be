//! Ledger store for the application state machine.
//!
//! Owns all primary keyed state (balances, stakes, delegations, incentive
//! records) and the three secondary indices that must stay in exact sync
//! with it:
//!
//! - validator key → holder address (and the 1:1 invariant behind it)
//! - delegatee → delegators (reverse delegation lookup)
//! - `(effective stake, holder)` ordered index for top-N retrieval
//!
//! Storage is an opaque ordered key-value interface ([`KvStore`]) with a
//! deterministic root commitment; the merkle scheme itself is a collaborator,
//! not part of this crate.

pub mod errors;
pub mod keys;
pub mod kv;
pub mod ledger;

pub use errors::{KvError, KvResult, LedgerError, LedgerResult};
pub use kv::{KvStore, MemKv, SledKv};
pub use ledger::{IncentiveRecord, Ledger};
