//! Application-level errors.
//!
//! Policy rejections (bad signature, insufficient balance, stake conflicts)
//! are NOT errors here; they surface as non-zero result codes in a
//! [`crate::tx::TxResult`] and the block keeps going. This type is for
//! faults: storage failures, root-hash mismatch at Commit, primary/index
//! desync. A fault must halt the process, since continuing on divergent
//! state forks the chain.

use lib_types::CurrencyError;
use thiserror::Error;

#[derive(Error, Debug)]
pub enum AppError {
    #[error(transparent)]
    Ledger(#[from] lib_ledger::LedgerError),

    #[error(transparent)]
    Currency(#[from] CurrencyError),

    #[error("bad genesis state: {0}")]
    Genesis(String),

    /// A lifecycle call arrived in the wrong state (e.g. DeliverTx with no
    /// open block).
    #[error("lifecycle violation: {0}")]
    Lifecycle(&'static str),

    /// Root-hash mismatch or other divergence between computed and persisted
    /// state. Fatal.
    #[error("internal consistency fault: {0}")]
    Consistency(String),
}

pub type AppResult<T> = Result<T, AppError>;
