//! Application policy configuration.
//!
//! One explicit value threaded through the controller at construction and
//! passed down to the incentive and ledger calls that need it. No globals:
//! every constant that shapes consensus-visible output lives here so two
//! nodes configured alike behave alike.

use serde::{Deserialize, Serialize};

use lib_types::{BlockHeight, Currency};

/// Policy knobs for the state machine.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct AppConfig {
    /// Validator-set size cap fed to top-N stake retrieval.
    pub max_validators: usize,

    /// Weight of the proposer's own stake in the incentive split.
    pub weight_validator: u64,

    /// Weight of each delegated amount in the incentive split.
    pub weight_delegator: u64,

    /// Base reward accrued per block.
    pub block_reward: Currency,

    /// Reward accrued per delivered transaction.
    pub tx_reward: Currency,

    /// Blocks a pending stake decrease waits before it is applied.
    pub lockup_period: BlockHeight,
}

impl Default for AppConfig {
    fn default() -> Self {
        Self {
            max_validators: 100,
            weight_validator: 2,
            weight_delegator: 1,
            block_reward: Currency::zero(),
            tx_reward: Currency::zero(),
            lockup_period: 1_000_000,
        }
    }
}
