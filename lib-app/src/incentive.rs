//! Per-block incentive distribution.
//!
//! Total incentive = base block reward + per-tx reward × delivered-tx count
//! + accumulated transaction fees. The total splits between the proposer and
//! its delegators by weighted effective stake:
//!
//! ```text
//! weighted_sum    = wv·own_stake + Σ wd·delegated_i
//! delegator_share = floor(total · wd·delegated_i / weighted_sum)
//! proposer_share  = total − Σ delegator_shares        (the residual)
//! ```
//!
//! The residual rule makes conservation exact by construction: the credited
//! amounts always sum to the computed total, whatever the truncation does to
//! the individual quotients. All intermediate arithmetic is big-integer with
//! truncating division; no floating point touches ledger state.

use num_bigint::BigUint;
use tracing::debug;

use lib_ledger::{KvStore, Ledger};
use lib_types::{Address, BlockHeight, Currency};

use crate::config::AppConfig;
use crate::errors::AppResult;

/// One credited reward, as applied to the ledger.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Payout {
    pub recipient: Address,
    pub amount: Currency,
}

/// Total incentive for a block.
pub fn block_incentive(config: &AppConfig, num_txs: u64, fees: &Currency) -> AppResult<Currency> {
    let total = config.block_reward.as_biguint()
        + config.tx_reward.as_biguint() * num_txs
        + fees.as_biguint();
    Ok(Currency::try_from(total)?)
}

/// Split `total` between the proposer and its delegators, credit every
/// share, and append one incentive record per recipient at `height`.
///
/// Skipped entirely when the total is zero or the proposer holds no stake;
/// zero-amount shares write no record. Returns the applied payouts.
pub fn distribute<S: KvStore>(
    ledger: &mut Ledger<S>,
    config: &AppConfig,
    height: BlockHeight,
    proposer: &Address,
    total: &Currency,
) -> AppResult<Vec<Payout>> {
    if total.is_zero() {
        return Ok(Vec::new());
    }
    let stake = match ledger.get_stake(proposer, false)? {
        Some(stake) => stake,
        None => {
            debug!(%proposer, height, "proposer holds no stake, skipping incentive");
            return Ok(Vec::new());
        }
    };

    let delegates = ledger.get_delegates_by_delegatee(proposer, false)?;
    let weight_validator = BigUint::from(config.weight_validator);
    let weight_delegator = BigUint::from(config.weight_delegator);

    let mut weighted_sum = &weight_validator * stake.amount.as_biguint();
    for (_, delegate) in &delegates {
        weighted_sum += &weight_delegator * delegate.amount.as_biguint();
    }
    if weighted_sum == BigUint::default() {
        return Ok(Vec::new());
    }

    let mut payouts = Vec::new();
    let mut distributed = BigUint::default();
    for (delegator, delegate) in &delegates {
        // truncating division, computed at full precision
        let share =
            total.as_biguint() * &weight_delegator * delegate.amount.as_biguint() / &weighted_sum;
        if share == BigUint::default() {
            continue;
        }
        distributed += &share;
        payouts.push(Payout {
            recipient: *delegator,
            amount: Currency::try_from(share)?,
        });
    }

    // the proposer takes the residual, so the credited total is exact
    let residual = Currency::try_from(total.as_biguint() - distributed)?;
    if !residual.is_zero() {
        payouts.push(Payout {
            recipient: *proposer,
            amount: residual,
        });
    }

    for payout in &payouts {
        let balance = ledger
            .get_balance(&payout.recipient, false)?
            .checked_add(&payout.amount)?;
        ledger.set_balance(&payout.recipient, &balance)?;
        ledger.add_incentive_record(height, &payout.recipient, &payout.amount)?;
        debug!(recipient = %payout.recipient, amount = %payout.amount, height, "incentive credited");
    }
    Ok(payouts)
}
