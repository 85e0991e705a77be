//! Read-only query boundary.
//!
//! Queries run against the last-committed state only, never the in-progress
//! working state, so they are safe while a block is open. A missing value is
//! `NoMatch` (not a fault); a malformed key is `BadKey`; an unknown path is
//! `BadPath`.
//!
//! Keys arrive as JSON: a hex address string for the keyed lookups, an
//! object for incentive queries.

use serde::Deserialize;
use serde_json::json;

use lib_ledger::{KvStore, Ledger};
use lib_types::{Address, BlockHeight, ValidatorKey};

use crate::code::QueryCode;
use crate::errors::AppResult;

/// Outcome of one query.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct QueryResponse {
    pub code: QueryCode,
    pub value: serde_json::Value,
}

impl QueryResponse {
    fn ok(value: serde_json::Value) -> Self {
        Self {
            code: QueryCode::Ok,
            value,
        }
    }

    fn fail(code: QueryCode) -> Self {
        Self {
            code,
            value: serde_json::Value::Null,
        }
    }
}

/// Incentive query selector: by height, by address, or the exact record.
#[derive(Debug, Deserialize)]
struct IncentiveQuery {
    height: Option<BlockHeight>,
    address: Option<Address>,
}

/// Dispatch one query path. Only storage faults escape as errors; every
/// client mistake comes back as a non-zero [`QueryCode`].
pub fn handle_query<S: KvStore>(
    ledger: &Ledger<S>,
    path: &str,
    data: &[u8],
) -> AppResult<QueryResponse> {
    if data.is_empty() {
        return Ok(QueryResponse::fail(QueryCode::NoKey));
    }
    match path {
        "balance" => {
            let addr: Address = match serde_json::from_slice(data) {
                Ok(v) => v,
                Err(_) => return Ok(QueryResponse::fail(QueryCode::BadKey)),
            };
            // absent means zero; a balance query never misses
            let balance = ledger.get_balance(&addr, true)?;
            Ok(QueryResponse::ok(json!(balance)))
        }
        "stake" => {
            let addr: Address = match serde_json::from_slice(data) {
                Ok(v) => v,
                Err(_) => return Ok(QueryResponse::fail(QueryCode::BadKey)),
            };
            let stake = match ledger.get_stake(&addr, true)? {
                Some(stake) => stake,
                None => return Ok(QueryResponse::fail(QueryCode::NoMatch)),
            };
            let delegates: Vec<_> = ledger
                .get_delegates_by_delegatee(&addr, true)?
                .into_iter()
                .map(|(delegator, delegate)| {
                    json!({"delegator": delegator, "amount": delegate.amount})
                })
                .collect();
            let locks = ledger.get_locked_stakes(&addr, true)?;
            let effective = ledger.get_effective_stake(&addr, true)?;
            Ok(QueryResponse::ok(json!({
                "validator": stake.validator,
                "amount": stake.amount,
                "effective": effective,
                "delegates": delegates,
                "pending_decreases": locks,
            })))
        }
        "delegate" => {
            let addr: Address = match serde_json::from_slice(data) {
                Ok(v) => v,
                Err(_) => return Ok(QueryResponse::fail(QueryCode::BadKey)),
            };
            match ledger.get_delegate(&addr, true)? {
                Some(delegate) => Ok(QueryResponse::ok(json!(delegate))),
                None => Ok(QueryResponse::fail(QueryCode::NoMatch)),
            }
        }
        "validator" => {
            let key: ValidatorKey = match serde_json::from_slice(data) {
                Ok(v) => v,
                Err(_) => return Ok(QueryResponse::fail(QueryCode::BadKey)),
            };
            match ledger.get_holder_by_validator(&key, true)? {
                Some(holder) => Ok(QueryResponse::ok(json!(holder))),
                None => Ok(QueryResponse::fail(QueryCode::NoMatch)),
            }
        }
        "incentive" => {
            let q: IncentiveQuery = match serde_json::from_slice(data) {
                Ok(v) => v,
                Err(_) => return Ok(QueryResponse::fail(QueryCode::BadKey)),
            };
            let records = match (q.height, q.address) {
                (Some(height), Some(address)) => ledger
                    .get_incentive(height, &address, true)?
                    .into_iter()
                    .collect(),
                (Some(height), None) => ledger.get_block_incentives(height, true)?,
                (None, Some(address)) => ledger.get_address_incentives(&address, true)?,
                (None, None) => return Ok(QueryResponse::fail(QueryCode::NoKey)),
            };
            if records.is_empty() {
                return Ok(QueryResponse::fail(QueryCode::NoMatch));
            }
            Ok(QueryResponse::ok(json!(records)))
        }
        _ => Ok(QueryResponse::fail(QueryCode::BadPath)),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use lib_types::{Currency, Delegate, Stake, ADDRESS_LEN, VALIDATOR_KEY_LEN};

    fn addr(n: u8) -> Address {
        Address::new([n; ADDRESS_LEN])
    }

    fn committed_ledger() -> Ledger<lib_ledger::MemKv> {
        let mut ledger = Ledger::in_memory();
        ledger.set_balance(&addr(1), &Currency::from(77)).unwrap();
        ledger
            .set_unlocked_stake(
                &addr(2),
                &Stake {
                    validator: ValidatorKey::new([2; VALIDATOR_KEY_LEN]),
                    amount: Currency::from(100),
                },
            )
            .unwrap();
        ledger
            .set_delegate(
                &addr(3),
                &Delegate {
                    delegatee: addr(2),
                    amount: Currency::from(40),
                },
            )
            .unwrap();
        ledger
            .add_incentive_record(4, &addr(2), &Currency::from(12))
            .unwrap();
        ledger.save().unwrap();
        ledger
    }

    fn key(addr: &Address) -> Vec<u8> {
        serde_json::to_vec(addr).unwrap()
    }

    #[test]
    fn test_balance_query_defaults_to_zero() {
        let ledger = committed_ledger();
        let resp = handle_query(&ledger, "balance", &key(&addr(1))).unwrap();
        assert_eq!(resp.code, QueryCode::Ok);
        assert_eq!(resp.value, json!("77"));

        let resp = handle_query(&ledger, "balance", &key(&addr(9))).unwrap();
        assert_eq!(resp.value, json!("0"));
    }

    #[test]
    fn test_stake_query_includes_delegators() {
        let ledger = committed_ledger();
        let resp = handle_query(&ledger, "stake", &key(&addr(2))).unwrap();
        assert_eq!(resp.code, QueryCode::Ok);
        assert_eq!(resp.value["amount"], json!("100"));
        assert_eq!(resp.value["effective"], json!("140"));
        assert_eq!(resp.value["delegates"][0]["amount"], json!("40"));

        let resp = handle_query(&ledger, "stake", &key(&addr(9))).unwrap();
        assert_eq!(resp.code, QueryCode::NoMatch);
    }

    #[test]
    fn test_validator_reverse_lookup() {
        let ledger = committed_ledger();
        let vkey = ValidatorKey::new([2; VALIDATOR_KEY_LEN]);
        let resp = handle_query(&ledger, "validator", &serde_json::to_vec(&vkey).unwrap()).unwrap();
        assert_eq!(resp.code, QueryCode::Ok);
        assert_eq!(resp.value, json!(addr(2)));
    }

    #[test]
    fn test_incentive_query_variants() {
        let ledger = committed_ledger();
        let resp = handle_query(&ledger, "incentive", br#"{"height": 4}"#).unwrap();
        assert_eq!(resp.code, QueryCode::Ok);
        assert_eq!(resp.value[0]["amount"], json!("12"));

        let by_addr = serde_json::to_vec(&json!({"address": addr(2)})).unwrap();
        let resp = handle_query(&ledger, "incentive", &by_addr).unwrap();
        assert_eq!(resp.code, QueryCode::Ok);

        let resp = handle_query(&ledger, "incentive", br#"{"height": 99}"#).unwrap();
        assert_eq!(resp.code, QueryCode::NoMatch);

        let resp = handle_query(&ledger, "incentive", br#"{}"#).unwrap();
        assert_eq!(resp.code, QueryCode::NoKey);
    }

    #[test]
    fn test_error_codes_are_distinct() {
        let ledger = committed_ledger();
        assert_eq!(
            handle_query(&ledger, "nope", b"\"00\"").unwrap().code,
            QueryCode::BadPath
        );
        assert_eq!(
            handle_query(&ledger, "balance", b"").unwrap().code,
            QueryCode::NoKey
        );
        assert_eq!(
            handle_query(&ledger, "balance", b"\"zz\"").unwrap().code,
            QueryCode::BadKey
        );
    }

    #[test]
    fn test_query_reads_committed_view_only() {
        let mut ledger = committed_ledger();
        ledger.set_balance(&addr(1), &Currency::from(1)).unwrap();
        // uncommitted write is invisible to queries
        let resp = handle_query(&ledger, "balance", &key(&addr(1))).unwrap();
        assert_eq!(resp.value, json!("77"));
    }
}
