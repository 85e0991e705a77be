//! Key encoding helpers.
//!
//! Key encoding is PROTOCOL. These functions define the canonical byte
//! layout for every primary and index key. Never inline key construction in
//! ledger logic.
//!
//! Conventions:
//! - Type prefixes are short ASCII strings ending in `:`
//! - Heights are big-endian u64 (sorts numerically)
//! - Currency amounts in index keys are big-endian 32-byte (sorts numerically)
//! - Composite keys use fixed-width fields after the prefix

use lib_types::{Address, BlockHeight, Currency, ValidatorKey, ADDRESS_LEN};

// =============================================================================
// PRIMARY STATE KEYS
// =============================================================================

/// Controller bookkeeping record (index store; outside the state commitment)
pub const KEY_METADATA: &[u8] = b"meta:app";

pub const PREFIX_BALANCE: &[u8] = b"balance:";
pub const PREFIX_STAKE: &[u8] = b"stake:";
pub const PREFIX_DELEGATE: &[u8] = b"delegate:";
pub const PREFIX_LOCK: &[u8] = b"lock:";
pub const PREFIX_INCENTIVE: &[u8] = b"incentive:";

/// `balance:` + address → Currency (absent = zero)
pub fn balance_key(addr: &Address) -> Vec<u8> {
    [PREFIX_BALANCE, addr.as_ref()].concat()
}

/// `stake:` + holder → Stake
pub fn stake_key(holder: &Address) -> Vec<u8> {
    [PREFIX_STAKE, holder.as_ref()].concat()
}

/// `delegate:` + delegator → Delegate
pub fn delegate_key(delegator: &Address) -> Vec<u8> {
    [PREFIX_DELEGATE, delegator.as_ref()].concat()
}

/// `lock:` + holder + unlock_height (8 bytes BE) → LockedStake
///
/// Per-holder locks sort by unlock height, so a prefix scan walks them in
/// unlock order.
pub fn lock_key(holder: &Address, unlock_height: BlockHeight) -> Vec<u8> {
    let mut key = Vec::with_capacity(PREFIX_LOCK.len() + ADDRESS_LEN + 8);
    key.extend_from_slice(PREFIX_LOCK);
    key.extend_from_slice(holder.as_ref());
    key.extend_from_slice(&unlock_height.to_be_bytes());
    key
}

/// Prefix covering all locks of one holder
pub fn lock_prefix(holder: &Address) -> Vec<u8> {
    [PREFIX_LOCK, holder.as_ref()].concat()
}

/// Parse `(holder, unlock_height)` back out of a lock key.
pub fn parse_lock_key(key: &[u8]) -> Option<(Address, BlockHeight)> {
    let body = key.strip_prefix(PREFIX_LOCK)?;
    if body.len() != ADDRESS_LEN + 8 {
        return None;
    }
    let holder = Address::try_from(&body[..ADDRESS_LEN]).ok()?;
    let height = u64::from_be_bytes(body[ADDRESS_LEN..].try_into().ok()?);
    Some((holder, height))
}

/// `incentive:` + height (8 bytes BE) + recipient → Currency
pub fn incentive_key(height: BlockHeight, recipient: &Address) -> Vec<u8> {
    let mut key = Vec::with_capacity(PREFIX_INCENTIVE.len() + 8 + ADDRESS_LEN);
    key.extend_from_slice(PREFIX_INCENTIVE);
    key.extend_from_slice(&height.to_be_bytes());
    key.extend_from_slice(recipient.as_ref());
    key
}

/// Prefix covering all incentive records of one block
pub fn incentive_height_prefix(height: BlockHeight) -> Vec<u8> {
    let mut key = Vec::with_capacity(PREFIX_INCENTIVE.len() + 8);
    key.extend_from_slice(PREFIX_INCENTIVE);
    key.extend_from_slice(&height.to_be_bytes());
    key
}

/// Parse `(height, recipient)` back out of an incentive key.
pub fn parse_incentive_key(key: &[u8]) -> Option<(BlockHeight, Address)> {
    let body = key.strip_prefix(PREFIX_INCENTIVE)?;
    if body.len() != 8 + ADDRESS_LEN {
        return None;
    }
    let height = u64::from_be_bytes(body[..8].try_into().ok()?);
    let addr = Address::try_from(&body[8..]).ok()?;
    Some((height, addr))
}

// =============================================================================
// INDEX KEYS (separate index store; never part of the state commitment)
// =============================================================================

pub const PREFIX_IDX_VALIDATOR: &[u8] = b"validator:";
pub const PREFIX_IDX_EFF_STAKE: &[u8] = b"effstake:";
pub const PREFIX_IDX_DELEGATOR: &[u8] = b"delegator:";
pub const PREFIX_IDX_INCENTIVE_ADDR: &[u8] = b"incentive-addr:";

/// `validator:` + validator key → holder address
pub fn validator_index_key(validator: &ValidatorKey) -> Vec<u8> {
    [PREFIX_IDX_VALIDATOR, validator.as_ref()].concat()
}

/// Parse the validator key back out of a validator index key.
pub fn parse_validator_index_key(key: &[u8]) -> Option<ValidatorKey> {
    let body = key.strip_prefix(PREFIX_IDX_VALIDATOR)?;
    ValidatorKey::try_from(body).ok()
}

/// `effstake:` + amount (32 bytes BE) + holder → nil
///
/// Reverse iteration over this prefix yields holders in descending
/// effective-stake order; the holder suffix breaks amount ties by address.
pub fn eff_stake_index_key(amount: &Currency, holder: &Address) -> Vec<u8> {
    let mut key = Vec::with_capacity(PREFIX_IDX_EFF_STAKE.len() + 32 + ADDRESS_LEN);
    key.extend_from_slice(PREFIX_IDX_EFF_STAKE);
    key.extend_from_slice(&amount.to_key_bytes());
    key.extend_from_slice(holder.as_ref());
    key
}

/// Parse `(amount, holder)` back out of an effective-stake index key.
pub fn parse_eff_stake_index_key(key: &[u8]) -> Option<(Currency, Address)> {
    let body = key.strip_prefix(PREFIX_IDX_EFF_STAKE)?;
    if body.len() != 32 + ADDRESS_LEN {
        return None;
    }
    let amount = Currency::from_key_bytes(body[..32].try_into().ok()?);
    let holder = Address::try_from(&body[32..]).ok()?;
    Some((amount, holder))
}

/// `delegator:` + delegatee + delegator → nil
pub fn delegator_index_key(delegatee: &Address, delegator: &Address) -> Vec<u8> {
    let mut key = Vec::with_capacity(PREFIX_IDX_DELEGATOR.len() + 2 * ADDRESS_LEN);
    key.extend_from_slice(PREFIX_IDX_DELEGATOR);
    key.extend_from_slice(delegatee.as_ref());
    key.extend_from_slice(delegator.as_ref());
    key
}

/// Prefix covering all delegators of one delegatee
pub fn delegator_index_prefix(delegatee: &Address) -> Vec<u8> {
    [PREFIX_IDX_DELEGATOR, delegatee.as_ref()].concat()
}

/// Parse the delegator suffix from a delegator index key.
pub fn parse_delegator_index_key(key: &[u8], delegatee: &Address) -> Option<Address> {
    let body = key.strip_prefix(PREFIX_IDX_DELEGATOR)?;
    let suffix = body.strip_prefix(delegatee.as_ref() as &[u8])?;
    Address::try_from(suffix).ok()
}

/// `incentive-addr:` + recipient + height (8 bytes BE) → Currency
pub fn incentive_addr_index_key(recipient: &Address, height: BlockHeight) -> Vec<u8> {
    let mut key = Vec::with_capacity(PREFIX_IDX_INCENTIVE_ADDR.len() + ADDRESS_LEN + 8);
    key.extend_from_slice(PREFIX_IDX_INCENTIVE_ADDR);
    key.extend_from_slice(recipient.as_ref());
    key.extend_from_slice(&height.to_be_bytes());
    key
}

/// Prefix covering all incentive records of one recipient
pub fn incentive_addr_index_prefix(recipient: &Address) -> Vec<u8> {
    [PREFIX_IDX_INCENTIVE_ADDR, recipient.as_ref()].concat()
}

/// Parse the height suffix from an address-incentive index key.
pub fn parse_incentive_addr_index_key(key: &[u8], recipient: &Address) -> Option<BlockHeight> {
    let body = key.strip_prefix(PREFIX_IDX_INCENTIVE_ADDR)?;
    let suffix = body.strip_prefix(recipient.as_ref() as &[u8])?;
    Some(u64::from_be_bytes(suffix.try_into().ok()?))
}
