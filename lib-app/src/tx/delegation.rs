//! Delegate and retract.
//!
//! Delegating moves balance into a delegation record backing one staking
//! delegatee; retracting moves it back. A delegator backs at most one
//! delegatee at a time.

use serde::{Deserialize, Serialize};

use lib_ledger::KvStore;
use lib_types::{Address, Currency, Delegate};

use crate::code::TxCode;
use crate::errors::AppResult;
use crate::tx::{reject_from_ledger, Event, ExecuteCtx, TxResult};

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct DelegateTx {
    pub to: Address,
    pub amount: Currency,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RetractTx {
    /// Delegatee the funds were delegated to.
    pub from: Address,
    pub amount: Currency,
}

pub fn check_delegate(tx: &DelegateTx, sender: &Address) -> TxCode {
    if tx.amount.is_zero() {
        return TxCode::BadParam;
    }
    if tx.to == *sender {
        return TxCode::SelfTransaction;
    }
    TxCode::Ok
}

pub fn check_retract(tx: &RetractTx) -> TxCode {
    if tx.amount.is_zero() {
        return TxCode::BadParam;
    }
    TxCode::Ok
}

pub fn execute_delegate<S: KvStore>(
    ctx: &mut ExecuteCtx<'_, S>,
    tx: &DelegateTx,
) -> AppResult<TxResult> {
    let balance = ctx.ledger.get_balance(&ctx.sender, false)?;
    let remaining = match balance.checked_sub(&tx.amount) {
        Ok(v) => v,
        Err(_) => return Ok(TxResult::reject(TxCode::NotEnoughBalance, "insufficient balance")),
    };

    let total = match ctx.ledger.get_delegate(&ctx.sender, false)? {
        Some(existing) if existing.delegatee != tx.to => {
            return Ok(TxResult::reject(
                TxCode::MultipleDelegates,
                "already delegating to a different delegatee",
            ));
        }
        Some(existing) => match existing.amount.checked_add(&tx.amount) {
            Ok(v) => v,
            Err(_) => return Ok(TxResult::reject(TxCode::BadParam, "delegation overflow")),
        },
        None => tx.amount.clone(),
    };

    if let Err(e) = ctx.ledger.set_delegate(
        &ctx.sender,
        &Delegate {
            delegatee: tx.to,
            amount: total.clone(),
        },
    ) {
        return reject_from_ledger(e);
    }
    ctx.ledger.set_balance(&ctx.sender, &remaining)?;

    Ok(TxResult::ok(vec![Event::new("delegate")
        .attr("delegator", ctx.sender)
        .attr("delegatee", tx.to)
        .attr("amount", &tx.amount)
        .attr("total", &total)]))
}

pub fn execute_retract<S: KvStore>(
    ctx: &mut ExecuteCtx<'_, S>,
    tx: &RetractTx,
) -> AppResult<TxResult> {
    let existing = match ctx.ledger.get_delegate(&ctx.sender, false)? {
        Some(d) => d,
        None => return Ok(TxResult::reject(TxCode::DelegateNotFound, "no delegation")),
    };
    if existing.delegatee != tx.from {
        return Ok(TxResult::reject(
            TxCode::DelegateNotFound,
            "delegation names a different delegatee",
        ));
    }
    let remaining = match existing.amount.checked_sub(&tx.amount) {
        Ok(v) => v,
        Err(_) => {
            return Ok(TxResult::reject(
                TxCode::NotEnoughBalance,
                "retracting more than delegated",
            ))
        }
    };
    let credited = match ctx.ledger.get_balance(&ctx.sender, false)?.checked_add(&tx.amount) {
        Ok(v) => v,
        Err(_) => return Ok(TxResult::reject(TxCode::BadParam, "balance overflow")),
    };

    // zero remaining deletes the record
    if let Err(e) = ctx.ledger.set_delegate(
        &ctx.sender,
        &Delegate {
            delegatee: tx.from,
            amount: remaining.clone(),
        },
    ) {
        return reject_from_ledger(e);
    }
    ctx.ledger.set_balance(&ctx.sender, &credited)?;

    Ok(TxResult::ok(vec![Event::new("retract")
        .attr("delegator", ctx.sender)
        .attr("delegatee", tx.from)
        .attr("amount", &tx.amount)
        .attr("remaining", &remaining)]))
}
