//! Genesis payload.
//!
//! Parsing the genesis file is the node's job; this is the already-decoded
//! shape InitChain consumes.

use serde::{Deserialize, Serialize};
use std::collections::HashSet;

use lib_types::{Address, Currency, ValidatorKey};

use crate::errors::{AppError, AppResult};

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct GenesisBalance {
    pub owner: Address,
    pub amount: Currency,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct GenesisStake {
    pub holder: Address,
    pub validator: ValidatorKey,
    pub amount: Currency,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct GenesisState {
    #[serde(default)]
    pub balances: Vec<GenesisBalance>,
    #[serde(default)]
    pub stakes: Vec<GenesisStake>,
}

impl GenesisState {
    /// Structural validation before any of it touches the ledger.
    pub fn validate(&self) -> AppResult<()> {
        let mut owners = HashSet::new();
        for balance in &self.balances {
            if !owners.insert(balance.owner) {
                return Err(AppError::Genesis(format!(
                    "duplicate balance owner {}",
                    balance.owner
                )));
            }
        }
        let mut holders = HashSet::new();
        let mut validators = HashSet::new();
        for stake in &self.stakes {
            if stake.amount.is_zero() {
                return Err(AppError::Genesis(format!(
                    "zero stake for holder {}",
                    stake.holder
                )));
            }
            if !holders.insert(stake.holder) {
                return Err(AppError::Genesis(format!(
                    "duplicate stake holder {}",
                    stake.holder
                )));
            }
            if !validators.insert(stake.validator) {
                return Err(AppError::Genesis(format!(
                    "duplicate validator key {}",
                    stake.validator
                )));
            }
        }
        if self.stakes.is_empty() {
            return Err(AppError::Genesis("no genesis stakes".into()));
        }
        Ok(())
    }
}
