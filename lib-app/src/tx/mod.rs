//! Transaction pipeline: parse, verify, check, execute.
//!
//! A transaction travels four stages:
//!
//! 1. **parse** — decode the JSON envelope into a typed operation;
//! 2. **verify** — ed25519 signature over the canonical body bytes, plus
//!    the sender address must derive from the signing key;
//! 3. **check** — stateless structural validation, used for mempool
//!    admission; never reads the store;
//! 4. **execute** — stateful validation and mutation, only for transactions
//!    admitted into a block. Validate everything, then mutate: a failing
//!    condition rejects before the first write, so the store is never left
//!    half-updated by a rejected transaction.
//!
//! Operations form a closed sum type: adding a transaction kind means one
//! new variant with its own `check` and `execute`, one match arm each, and
//! nothing else.

pub mod delegation;
pub mod staking;
pub mod transfer;

use ed25519_dalek::{Signature, Verifier, VerifyingKey};
use serde::{Deserialize, Serialize};

use lib_ledger::{KvStore, Ledger, LedgerError};
use lib_types::{Address, BlockHeight, Currency, CurrencyError};

use crate::code::TxCode;
use crate::config::AppConfig;
use crate::errors::AppResult;

pub use delegation::{DelegateTx, RetractTx};
pub use staking::{StakeTx, WithdrawTx};
pub use transfer::TransferTx;

// ===== ENVELOPE =====

/// Signed part of the envelope. The canonical signing bytes are the JSON
/// serialization of exactly this struct, fields in declaration order; the
/// signature and public key live outside it.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TxBody {
    #[serde(rename = "type")]
    pub kind: String,
    pub sender: Address,
    pub nonce: u64,
    pub fee: Currency,
    pub payload: serde_json::Value,
}

/// Wire envelope: body plus the sender's public key and signature, hex.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SignedTx {
    #[serde(flatten)]
    pub body: TxBody,
    pub pubkey: String,
    pub signature: String,
}

impl SignedTx {
    /// Decode the wire bytes. Undecodable input is `MalformedTx`.
    pub fn parse(raw: &[u8]) -> Result<Self, TxCode> {
        serde_json::from_slice(raw).map_err(|_| TxCode::MalformedTx)
    }

    /// The byte string the signature covers.
    pub fn signing_bytes(body: &TxBody) -> Result<Vec<u8>, TxCode> {
        serde_json::to_vec(body).map_err(|_| TxCode::MalformedTx)
    }

    /// Signature check: the declared public key must both derive the sender
    /// address and verify the signature over the canonical body bytes.
    pub fn verify(&self) -> Result<(), TxCode> {
        let pubkey_raw: [u8; 32] = hex::decode(&self.pubkey)
            .ok()
            .and_then(|v| v.try_into().ok())
            .ok_or(TxCode::BadSignature)?;
        if Address::from_public_key(&pubkey_raw) != self.body.sender {
            return Err(TxCode::BadSignature);
        }
        let key = VerifyingKey::from_bytes(&pubkey_raw).map_err(|_| TxCode::BadSignature)?;
        let sig_raw: [u8; 64] = hex::decode(&self.signature)
            .ok()
            .and_then(|v| v.try_into().ok())
            .ok_or(TxCode::BadSignature)?;
        let signature = Signature::from_bytes(&sig_raw);
        let message = Self::signing_bytes(&self.body)?;
        key.verify(&message, &signature)
            .map_err(|_| TxCode::BadSignature)
    }

    /// Map the envelope to its typed operation.
    pub fn operation(&self) -> Result<Operation, TxCode> {
        Operation::from_envelope(&self.body.kind, self.body.payload.clone())
    }
}

// ===== RESULT & EVENTS =====

/// Structured observability attached to a delivered transaction.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Event {
    pub kind: String,
    pub attributes: Vec<(String, String)>,
}

impl Event {
    pub fn new(kind: &str) -> Self {
        Self {
            kind: kind.to_string(),
            attributes: Vec::new(),
        }
    }

    pub fn attr(mut self, key: &str, value: impl ToString) -> Self {
        self.attributes.push((key.to_string(), value.to_string()));
        self
    }
}

/// Outcome of CheckTx or DeliverTx.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TxResult {
    pub code: TxCode,
    pub info: String,
    pub events: Vec<Event>,
}

impl TxResult {
    pub fn ok(events: Vec<Event>) -> Self {
        Self {
            code: TxCode::Ok,
            info: String::new(),
            events,
        }
    }

    pub fn reject(code: TxCode, info: impl Into<String>) -> Self {
        Self {
            code,
            info: info.into(),
            events: Vec::new(),
        }
    }

    pub fn is_ok(&self) -> bool {
        self.code.is_ok()
    }
}

// ===== OPERATIONS =====

/// Everything execute needs besides the payload itself.
pub struct ExecuteCtx<'a, S: KvStore> {
    pub ledger: &'a mut Ledger<S>,
    pub config: &'a AppConfig,
    pub sender: Address,
    pub height: BlockHeight,
}

/// Closed set of ledger operations.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Operation {
    Transfer(TransferTx),
    Stake(StakeTx),
    Withdraw(WithdrawTx),
    Delegate(DelegateTx),
    Retract(RetractTx),
}

impl Operation {
    fn from_envelope(kind: &str, payload: serde_json::Value) -> Result<Self, TxCode> {
        fn decode<T: serde::de::DeserializeOwned>(v: serde_json::Value) -> Result<T, TxCode> {
            serde_json::from_value(v).map_err(|_| TxCode::BadParam)
        }
        match kind {
            "transfer" => Ok(Operation::Transfer(decode(payload)?)),
            "stake" => Ok(Operation::Stake(decode(payload)?)),
            "withdraw" => Ok(Operation::Withdraw(decode(payload)?)),
            "delegate" => Ok(Operation::Delegate(decode(payload)?)),
            "retract" => Ok(Operation::Retract(decode(payload)?)),
            _ => Err(TxCode::UnknownType),
        }
    }

    pub fn kind(&self) -> &'static str {
        match self {
            Operation::Transfer(_) => "transfer",
            Operation::Stake(_) => "stake",
            Operation::Withdraw(_) => "withdraw",
            Operation::Delegate(_) => "delegate",
            Operation::Retract(_) => "retract",
        }
    }

    /// Whether a successful execution can change the validator ranking.
    pub fn affects_validators(&self) -> bool {
        !matches!(self, Operation::Transfer(_))
    }

    /// Stateless structural validation (mempool admission). Never reads the
    /// store.
    pub fn check(&self, sender: &Address) -> TxCode {
        match self {
            Operation::Transfer(tx) => transfer::check(tx, sender),
            Operation::Stake(tx) => staking::check_stake(tx),
            Operation::Withdraw(tx) => staking::check_withdraw(tx),
            Operation::Delegate(tx) => delegation::check_delegate(tx, sender),
            Operation::Retract(tx) => delegation::check_retract(tx),
        }
    }

    /// Stateful validation and mutation against the live store.
    pub fn execute<S: KvStore>(&self, ctx: &mut ExecuteCtx<'_, S>) -> AppResult<TxResult> {
        let code = self.check(&ctx.sender);
        if !code.is_ok() {
            return Ok(TxResult::reject(code, "structural check failed"));
        }
        match self {
            Operation::Transfer(tx) => transfer::execute(ctx, tx),
            Operation::Stake(tx) => staking::execute_stake(ctx, tx),
            Operation::Withdraw(tx) => staking::execute_withdraw(ctx, tx),
            Operation::Delegate(tx) => delegation::execute_delegate(ctx, tx),
            Operation::Retract(tx) => delegation::execute_retract(ctx, tx),
        }
    }
}

/// Translate a ledger rejection into a transaction result code. Storage and
/// consistency faults are not translatable; they propagate and halt the
/// process.
pub(crate) fn reject_from_ledger(err: LedgerError) -> AppResult<TxResult> {
    let code = match &err {
        LedgerError::ValidatorTaken { .. } => TxCode::PermissionDenied,
        LedgerError::LastValidator => TxCode::LastValidator,
        LedgerError::PermissionDenied => TxCode::PermissionDenied,
        LedgerError::BadValidator => TxCode::BadValidator,
        LedgerError::HeightTaken(_) => TxCode::HeightTaken,
        LedgerError::NoStake(_) => TxCode::NoStake,
        LedgerError::ExcessiveDecrease => TxCode::NotEnoughBalance,
        LedgerError::DelegatesRemain => TxCode::PermissionDenied,
        LedgerError::Currency(CurrencyError::Underflow) => TxCode::NotEnoughBalance,
        LedgerError::Currency(_) => TxCode::BadParam,
        LedgerError::Kv(_) | LedgerError::Consistency(_) => return Err(err.into()),
    };
    Ok(TxResult::reject(code, err.to_string()))
}


#[cfg(test)]
mod tests {
    use super::testutil::TestAccount;
    use super::*;
    use lib_types::ADDRESS_LEN;

    #[test]
    fn test_parse_verify_round_trip() {
        let account = TestAccount::generate();
        let raw = account.sign(
            "transfer",
            serde_json::json!({"to": Address::new([9; ADDRESS_LEN]), "amount": "25"}),
        );
        let tx = SignedTx::parse(&raw).unwrap();
        tx.verify().unwrap();
        let op = tx.operation().unwrap();
        assert_eq!(op.kind(), "transfer");
        assert!(!op.affects_validators());
    }

    #[test]
    fn test_garbage_input_is_malformed() {
        assert_eq!(SignedTx::parse(b"not json").unwrap_err(), TxCode::MalformedTx);
        assert_eq!(SignedTx::parse(b"{}").unwrap_err(), TxCode::MalformedTx);
    }

    #[test]
    fn test_unknown_type_is_rejected_after_parse() {
        let account = TestAccount::generate();
        let raw = account.sign("mint", serde_json::json!({}));
        let tx = SignedTx::parse(&raw).unwrap();
        tx.verify().unwrap();
        assert_eq!(tx.operation().unwrap_err(), TxCode::UnknownType);
    }

    #[test]
    fn test_tampered_body_fails_verification() {
        let account = TestAccount::generate();
        let raw = account.sign(
            "transfer",
            serde_json::json!({"to": Address::new([9; ADDRESS_LEN]), "amount": "25"}),
        );
        let mut tx = SignedTx::parse(&raw).unwrap();
        tx.body.nonce += 1;
        assert_eq!(tx.verify().unwrap_err(), TxCode::BadSignature);
    }

    #[test]
    fn test_sender_must_match_signing_key() {
        let account = TestAccount::generate();
        let raw = account.sign(
            "transfer",
            serde_json::json!({"to": Address::new([9; ADDRESS_LEN]), "amount": "25"}),
        );
        let mut tx = SignedTx::parse(&raw).unwrap();
        tx.body.sender = Address::new([7; ADDRESS_LEN]);
        assert_eq!(tx.verify().unwrap_err(), TxCode::BadSignature);
    }

    #[test]
    fn test_bad_payload_shape_is_bad_param() {
        let account = TestAccount::generate();
        let raw = account.sign("transfer", serde_json::json!({"amount": "25"}));
        let tx = SignedTx::parse(&raw).unwrap();
        assert_eq!(tx.operation().unwrap_err(), TxCode::BadParam);
    }
}
