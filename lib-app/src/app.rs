//! Block-lifecycle controller.
//!
//! Sequences the engine calls into ledger mutations:
//!
//! ```text
//! InitChain                       (once)
//! BeginBlock → DeliverTx* → EndBlock → Commit     (per block)
//! CheckTx                          (any time, committed state only)
//! ```
//!
//! Per-block scratch (proposer, tx count, fees, validator snapshot) lives in
//! [`BlockScratch`] and is discarded at Commit; everything that must survive
//! a restart sits in the persisted [`AppState`] record.
//!
//! Reward attribution is one block in arrears: BeginBlock of height H pays
//! the proposer of H using the transaction count and fees accumulated during
//! block H−1 (persisted in [`AppState`] at the previous Commit). The same
//! convention applies at every site that touches reward inputs.

use serde::{Deserialize, Serialize};
use tracing::{debug, info, warn};

use lib_ledger::{KvStore, Ledger};
use lib_types::{Address, AppHash, BlockHeight, Currency, Stake};

use crate::code::TxCode;
use crate::config::AppConfig;
use crate::errors::{AppError, AppResult};
use crate::genesis::GenesisState;
use crate::incentive::{block_incentive, distribute};
use crate::power::{derive_powers, diff_validator_sets, ValidatorUpdate};
use crate::tx::{Event, ExecuteCtx, Operation, SignedTx, TxBody, TxResult};

/// Controller bookkeeping persisted after every commit.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
struct AppState {
    version: u64,
    last_height: BlockHeight,
    last_app_hash: AppHash,
    /// Transactions delivered in the last committed block; feeds the next
    /// BeginBlock's reward computation.
    last_block_txs: u64,
    /// Fees collected in the last committed block, not yet distributed.
    pending_fees: Currency,
}

/// Scratch state of the block currently open between BeginBlock and Commit.
struct BlockScratch {
    height: BlockHeight,
    num_txs: u64,
    fees: Currency,
    val_updated: bool,
    old_validators: Vec<ValidatorUpdate>,
    end_root: Option<AppHash>,
}

/// Block header fields the controller consumes.
#[derive(Debug, Clone)]
pub struct BlockHeader {
    pub height: BlockHeight,
    /// Consensus address of the proposer's validator key.
    pub proposer: Address,
}

/// The application state machine.
pub struct App<S: KvStore> {
    ledger: Ledger<S>,
    config: AppConfig,
    state: AppState,
    block: Option<BlockScratch>,
}

impl<S: KvStore> App<S> {
    /// Construct from storage, resuming from the persisted bookkeeping
    /// record if one exists.
    pub fn new(ledger: Ledger<S>, config: AppConfig) -> AppResult<Self> {
        let state = match ledger.get_metadata()? {
            Some(raw) => serde_json::from_slice(&raw)
                .map_err(|e| AppError::Consistency(format!("undecodable app metadata: {e}")))?,
            None => AppState::default(),
        };
        if state.version > 0 {
            info!(
                height = state.last_height,
                version = state.version,
                "resuming from committed state"
            );
        }
        Ok(Self {
            ledger,
            config,
            state,
            block: None,
        })
    }

    /// `(last committed height, last app hash)` for the engine handshake.
    pub fn info(&self) -> (BlockHeight, AppHash) {
        (self.state.last_height, self.state.last_app_hash)
    }

    pub fn ledger(&self) -> &Ledger<S> {
        &self.ledger
    }

    pub fn config(&self) -> &AppConfig {
        &self.config
    }

    /// Purge and repopulate state from genesis; returns the initial
    /// validator set.
    pub fn init_chain(&mut self, genesis: &GenesisState) -> AppResult<Vec<ValidatorUpdate>> {
        genesis.validate()?;
        self.ledger.purge()?;
        for balance in &genesis.balances {
            self.ledger.set_balance(&balance.owner, &balance.amount)?;
        }
        for stake in &genesis.stakes {
            self.ledger
                .set_unlocked_stake(
                    &stake.holder,
                    &Stake {
                        validator: stake.validator,
                        amount: stake.amount.clone(),
                    },
                )
                .map_err(|e| AppError::Genesis(format!("stake for {}: {e}", stake.holder)))?;
        }

        let root = self.ledger.root()?;
        self.state = AppState {
            version: self.ledger.version() + 1,
            last_height: 0,
            last_app_hash: root,
            last_block_txs: 0,
            pending_fees: Currency::zero(),
        };
        self.persist_state()?;
        let (saved_root, saved_version) = self.ledger.save()?;
        if saved_root != root || saved_version != self.state.version {
            return Err(AppError::Consistency(
                "genesis root diverged during save".into(),
            ));
        }

        let validators = self.current_validators(true)?;
        info!(app_hash = %root, validators = validators.len(), "chain initialized");
        Ok(validators)
    }

    /// Mempool admission: parse, verify, stateless check. Reads no state at
    /// all, so it is safe to call concurrently with block processing.
    pub fn check_tx(&self, raw: &[u8]) -> TxResult {
        let tx = match SignedTx::parse(raw) {
            Ok(tx) => tx,
            Err(code) => return TxResult::reject(code, "undecodable transaction"),
        };
        if let Err(code) = tx.verify() {
            return TxResult::reject(code, "signature verification failed");
        }
        let op = match tx.operation() {
            Ok(op) => op,
            Err(code) => return TxResult::reject(code, "unrecognized operation"),
        };
        let code = op.check(&tx.body.sender);
        if code.is_ok() {
            TxResult::ok(Vec::new())
        } else {
            TxResult::reject(code, "structural check failed")
        }
    }

    /// Open a block: snapshot the validator set for diffing and pay the
    /// proposer for the previous block.
    pub fn begin_block(&mut self, header: &BlockHeader) -> AppResult<()> {
        if self.state.version == 0 {
            return Err(AppError::Lifecycle("BeginBlock before InitChain"));
        }
        if self.block.is_some() {
            return Err(AppError::Lifecycle("BeginBlock with a block already open"));
        }
        if header.height != self.state.last_height + 1 {
            return Err(AppError::Consistency(format!(
                "non-contiguous height: expected {}, got {}",
                self.state.last_height + 1,
                header.height
            )));
        }

        let old_validators = self.current_validators(false)?;

        let total = block_incentive(
            &self.config,
            self.state.last_block_txs,
            &self.state.pending_fees,
        )?;
        match self.resolve_proposer(&header.proposer)? {
            Some(holder) => {
                distribute(&mut self.ledger, &self.config, header.height, &holder, &total)?;
            }
            None => {
                if !total.is_zero() {
                    warn!(proposer = %header.proposer, height = header.height,
                        "proposer has no staked holder, incentive skipped");
                }
            }
        }

        self.block = Some(BlockScratch {
            height: header.height,
            num_txs: 0,
            fees: Currency::zero(),
            val_updated: false,
            old_validators,
            end_root: None,
        });
        debug!(height = header.height, "block opened");
        Ok(())
    }

    /// Execute one transaction inside the open block. Policy rejections are
    /// returned as non-zero codes and never abort the block; only storage or
    /// consistency faults escape as errors.
    pub fn deliver_tx(&mut self, raw: &[u8]) -> AppResult<TxResult> {
        let height = {
            let block = self
                .block
                .as_mut()
                .ok_or(AppError::Lifecycle("DeliverTx with no open block"))?;
            block.num_txs += 1;
            block.height
        };

        let tx = match SignedTx::parse(raw) {
            Ok(tx) => tx,
            Err(code) => return Ok(TxResult::reject(code, "undecodable transaction")),
        };
        if let Err(code) = tx.verify() {
            return Ok(TxResult::reject(code, "signature verification failed"));
        }
        let op = match tx.operation() {
            Ok(op) => op,
            Err(code) => return Ok(TxResult::reject(code, "unrecognized operation")),
        };
        let mut result = self.execute_tx(&op, &tx.body, height)?;
        // every attributable response carries the envelope tags, accepted
        // or rejected
        result.events.insert(
            0,
            Event::new("tx")
                .attr("type", op.kind())
                .attr("sender", tx.body.sender),
        );

        if result.is_ok() && op.affects_validators() {
            if let Some(block) = self.block.as_mut() {
                block.val_updated = true;
            }
        }
        debug!(
            kind = op.kind(),
            sender = %tx.body.sender,
            code = result.code.value(),
            "delivered"
        );
        Ok(result)
    }

    /// Structural check, fee charge, then execution against the working
    /// state. The fee is charged up front and stays charged even if
    /// execution rejects; only a balance too small for the fee (or a block
    /// fee total past the currency cap) blocks the charge.
    fn execute_tx(
        &mut self,
        op: &Operation,
        body: &TxBody,
        height: BlockHeight,
    ) -> AppResult<TxResult> {
        let code = op.check(&body.sender);
        if !code.is_ok() {
            return Ok(TxResult::reject(code, "structural check failed"));
        }

        if !body.fee.is_zero() {
            let balance = self.ledger.get_balance(&body.sender, false)?;
            let remaining = match balance.checked_sub(&body.fee) {
                Ok(v) => v,
                Err(_) => {
                    return Ok(TxResult::reject(
                        TxCode::NotEnoughBalance,
                        "balance does not cover the fee",
                    ))
                }
            };
            let fees = match self.block.as_ref() {
                Some(block) => match block.fees.checked_add(&body.fee) {
                    Ok(v) => v,
                    Err(_) => {
                        return Ok(TxResult::reject(
                            TxCode::BadParam,
                            "block fee total overflow",
                        ))
                    }
                },
                None => return Err(AppError::Lifecycle("DeliverTx with no open block")),
            };
            self.ledger.set_balance(&body.sender, &remaining)?;
            if let Some(block) = self.block.as_mut() {
                block.fees = fees;
            }
        }

        let mut ctx = ExecuteCtx {
            ledger: &mut self.ledger,
            config: &self.config,
            sender: body.sender,
            height,
        };
        op.execute(&mut ctx)
    }

    /// Close the block: diff the validator set if any stake-affecting
    /// transaction landed, apply matured stake unlocks, and capture the root
    /// that Commit must reproduce.
    pub fn end_block(&mut self) -> AppResult<Vec<ValidatorUpdate>> {
        let (height, val_updated) = {
            let block = self
                .block
                .as_ref()
                .ok_or(AppError::Lifecycle("EndBlock with no open block"))?;
            (block.height, block.val_updated)
        };

        let updates = if val_updated {
            let new_validators = self.current_validators(false)?;
            let old_validators = match self.block.as_ref() {
                Some(block) => &block.old_validators,
                None => return Err(AppError::Lifecycle("EndBlock with no open block")),
            };
            diff_validator_sets(old_validators, &new_validators)
        } else {
            Vec::new()
        };

        self.ledger.loose_locked_stakes(height)?;

        let root = self.ledger.root()?;
        if let Some(block) = self.block.as_mut() {
            block.end_root = Some(root);
        }
        Ok(updates)
    }

    /// Persist the block: the saved root must reproduce the one captured at
    /// EndBlock bit for bit, or the process must halt.
    pub fn commit(&mut self) -> AppResult<AppHash> {
        let block = self
            .block
            .take()
            .ok_or(AppError::Lifecycle("Commit with no open block"))?;
        let end_root = block
            .end_root
            .ok_or(AppError::Lifecycle("Commit before EndBlock"))?;

        let root = self.ledger.root()?;
        if root != end_root {
            return Err(AppError::Consistency(format!(
                "root hash diverged between EndBlock and Commit: {end_root} vs {root}"
            )));
        }

        self.state = AppState {
            version: self.ledger.version() + 1,
            last_height: block.height,
            last_app_hash: root,
            last_block_txs: block.num_txs,
            pending_fees: block.fees,
        };
        self.persist_state()?;
        let (saved_root, saved_version) = self.ledger.save()?;
        if saved_root != root || saved_version != self.state.version {
            return Err(AppError::Consistency("state diverged during save".into()));
        }

        info!(height = self.state.last_height, app_hash = %root, "block committed");
        Ok(root)
    }

    // ===== internals =====

    fn persist_state(&mut self) -> AppResult<()> {
        let raw = serde_json::to_vec(&self.state)
            .map_err(|e| AppError::Consistency(format!("unencodable app metadata: {e}")))?;
        self.ledger.set_metadata(&raw)?;
        Ok(())
    }

    /// Validator set implied by the current ranking: top-N effective stakes
    /// mapped through the power derivation, zero-power holders dropped.
    fn current_validators(&self, committed: bool) -> AppResult<Vec<ValidatorUpdate>> {
        let ranked = self
            .ledger
            .get_top_stakes(self.config.max_validators, committed)?;
        let amounts: Vec<_> = ranked.iter().map(|(_, amount)| amount.clone()).collect();
        let powers = derive_powers(&amounts);

        let mut validators = Vec::new();
        for ((holder, _), power) in ranked.iter().zip(powers) {
            if power == 0 {
                continue;
            }
            let stake = self.ledger.get_stake(holder, committed)?.ok_or_else(|| {
                AppError::Consistency(format!("ranked holder {holder} has no stake"))
            })?;
            validators.push(ValidatorUpdate {
                key: stake.validator,
                power,
            });
        }
        Ok(validators)
    }

    /// Proposer's consensus address → staking holder, via the validator
    /// index.
    fn resolve_proposer(&self, proposer: &Address) -> AppResult<Option<Address>> {
        for (validator, holder) in self.ledger.get_validator_holders(false)? {
            if validator.validator_address() == *proposer {
                return Ok(Some(holder));
            }
        }
        Ok(None)
    }
}
