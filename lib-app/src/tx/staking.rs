//! Stake and withdraw.
//!
//! `stake` binds (or tops up) the sender's stake behind a validator key,
//! debiting the staked amount from its balance. `withdraw` never pays out
//! immediately: it schedules a pending decrease that matures after the
//! configured lockup period, at which point the ledger credits the balance
//! back. Until maturity the full amount keeps its voting weight.

use serde::{Deserialize, Serialize};

use lib_ledger::KvStore;
use lib_types::{Currency, LockedStake, Stake, ValidatorKey};

use crate::code::TxCode;
use crate::errors::AppResult;
use crate::tx::{reject_from_ledger, Event, ExecuteCtx, TxResult};

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct StakeTx {
    pub validator: ValidatorKey,
    pub amount: Currency,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct WithdrawTx {
    pub validator: ValidatorKey,
    pub amount: Currency,
}

pub fn check_stake(tx: &StakeTx) -> TxCode {
    if tx.amount.is_zero() {
        return TxCode::BadParam;
    }
    TxCode::Ok
}

pub fn check_withdraw(tx: &WithdrawTx) -> TxCode {
    if tx.amount.is_zero() {
        return TxCode::BadParam;
    }
    TxCode::Ok
}

pub fn execute_stake<S: KvStore>(ctx: &mut ExecuteCtx<'_, S>, tx: &StakeTx) -> AppResult<TxResult> {
    let balance = ctx.ledger.get_balance(&ctx.sender, false)?;
    let remaining = match balance.checked_sub(&tx.amount) {
        Ok(v) => v,
        Err(_) => return Ok(TxResult::reject(TxCode::NotEnoughBalance, "insufficient balance")),
    };

    // topping up an existing stake must keep the same validator key
    let total = match ctx.ledger.get_stake(&ctx.sender, false)? {
        Some(existing) if existing.validator != tx.validator => {
            return Ok(TxResult::reject(
                TxCode::BadValidator,
                "stake already bound to a different validator key",
            ));
        }
        Some(existing) => match existing.amount.checked_add(&tx.amount) {
            Ok(v) => v,
            Err(_) => return Ok(TxResult::reject(TxCode::BadParam, "stake overflow")),
        },
        None => tx.amount.clone(),
    };

    if let Err(e) = ctx.ledger.set_unlocked_stake(
        &ctx.sender,
        &Stake {
            validator: tx.validator,
            amount: total.clone(),
        },
    ) {
        return reject_from_ledger(e);
    }
    ctx.ledger.set_balance(&ctx.sender, &remaining)?;

    Ok(TxResult::ok(vec![Event::new("stake")
        .attr("holder", ctx.sender)
        .attr("validator", tx.validator)
        .attr("amount", &tx.amount)
        .attr("total", &total)]))
}

pub fn execute_withdraw<S: KvStore>(
    ctx: &mut ExecuteCtx<'_, S>,
    tx: &WithdrawTx,
) -> AppResult<TxResult> {
    let unlock_height = ctx.height + ctx.config.lockup_period;
    if let Err(e) = ctx.ledger.set_locked_stake(
        &ctx.sender,
        &LockedStake {
            validator: tx.validator,
            amount: tx.amount.clone(),
            unlock_height,
        },
    ) {
        return reject_from_ledger(e);
    }

    Ok(TxResult::ok(vec![Event::new("withdraw")
        .attr("holder", ctx.sender)
        .attr("amount", &tx.amount)
        .attr("unlock_height", unlock_height)]))
}
