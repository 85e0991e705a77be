//! Balance transfer.

use serde::{Deserialize, Serialize};

use lib_ledger::KvStore;
use lib_types::{Address, Currency};

use crate::code::TxCode;
use crate::errors::AppResult;
use crate::tx::{reject_from_ledger, Event, ExecuteCtx, TxResult};

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TransferTx {
    pub to: Address,
    pub amount: Currency,
}

pub fn check(tx: &TransferTx, sender: &Address) -> TxCode {
    if tx.amount.is_zero() {
        return TxCode::BadParam;
    }
    if tx.to == *sender {
        return TxCode::SelfTransaction;
    }
    TxCode::Ok
}

pub fn execute<S: KvStore>(ctx: &mut ExecuteCtx<'_, S>, tx: &TransferTx) -> AppResult<TxResult> {
    let from_balance = ctx.ledger.get_balance(&ctx.sender, false)?;
    let remaining = match from_balance.checked_sub(&tx.amount) {
        Ok(v) => v,
        Err(_) => return Ok(TxResult::reject(TxCode::NotEnoughBalance, "insufficient balance")),
    };
    let credited = match ctx.ledger.get_balance(&tx.to, false)?.checked_add(&tx.amount) {
        Ok(v) => v,
        Err(_) => return Ok(TxResult::reject(TxCode::BadParam, "recipient balance overflow")),
    };

    if let Err(e) = ctx.ledger.set_balance(&ctx.sender, &remaining) {
        return reject_from_ledger(e);
    }
    if let Err(e) = ctx.ledger.set_balance(&tx.to, &credited) {
        return reject_from_ledger(e);
    }

    Ok(TxResult::ok(vec![Event::new("transfer")
        .attr("from", ctx.sender)
        .attr("to", tx.to)
        .attr("amount", &tx.amount)]))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::AppConfig;
    use lib_ledger::Ledger;
    use lib_types::ADDRESS_LEN;

    fn addr(n: u8) -> Address {
        Address::new([n; ADDRESS_LEN])
    }

    fn cur(n: u64) -> Currency {
        Currency::from(n)
    }

    #[test]
    fn test_check_rejects_zero_and_self() {
        let tx = TransferTx {
            to: addr(2),
            amount: Currency::zero(),
        };
        assert_eq!(check(&tx, &addr(1)), TxCode::BadParam);

        let tx = TransferTx {
            to: addr(1),
            amount: cur(5),
        };
        assert_eq!(check(&tx, &addr(1)), TxCode::SelfTransaction);
    }

    #[test]
    fn test_execute_moves_funds_and_conserves_total() {
        let mut ledger = Ledger::in_memory();
        ledger.set_balance(&addr(1), &cur(100)).unwrap();
        let config = AppConfig::default();
        let mut ctx = ExecuteCtx {
            ledger: &mut ledger,
            config: &config,
            sender: addr(1),
            height: 1,
        };
        let result = execute(
            &mut ctx,
            &TransferTx {
                to: addr(2),
                amount: cur(30),
            },
        )
        .unwrap();
        assert!(result.is_ok());
        assert_eq!(result.events[0].kind, "transfer");
        assert_eq!(ledger.get_balance(&addr(1), false).unwrap(), cur(70));
        assert_eq!(ledger.get_balance(&addr(2), false).unwrap(), cur(30));
    }

    #[test]
    fn test_insufficient_funds_leaves_state_unchanged() {
        let mut ledger = Ledger::in_memory();
        ledger.set_balance(&addr(1), &cur(10)).unwrap();
        let config = AppConfig::default();
        let mut ctx = ExecuteCtx {
            ledger: &mut ledger,
            config: &config,
            sender: addr(1),
            height: 1,
        };
        let result = execute(
            &mut ctx,
            &TransferTx {
                to: addr(2),
                amount: cur(11),
            },
        )
        .unwrap();
        assert_eq!(result.code, TxCode::NotEnoughBalance);
        assert_eq!(ledger.get_balance(&addr(1), false).unwrap(), cur(10));
        assert_eq!(ledger.get_balance(&addr(2), false).unwrap(), Currency::zero());
    }
}
