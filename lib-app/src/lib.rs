//! Deterministic application state machine for a proof-of-stake chain.
//!
//! The consensus engine feeds ordered transactions through the block
//! lifecycle ([`App`]); this crate turns them into ledger mutations,
//! validator-set updates, and per-block reward payouts, identically on every
//! node. Everything consensus-visible uses exact integer arithmetic.

pub mod app;
pub mod code;
pub mod config;
pub mod errors;
pub mod genesis;
pub mod incentive;
pub mod power;
pub mod query;
pub mod tx;

pub use app::{App, BlockHeader};
pub use code::{QueryCode, TxCode};
pub use config::AppConfig;
pub use errors::{AppError, AppResult};
pub use genesis::{GenesisBalance, GenesisStake, GenesisState};
pub use power::{derive_powers, diff_validator_sets, ValidatorUpdate, MAX_TOTAL_VOTING_POWER};
pub use query::{handle_query, QueryResponse};
pub use tx::{Event, Operation, SignedTx, TxResult};
