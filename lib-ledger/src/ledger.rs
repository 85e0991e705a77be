//! The ledger store.
//!
//! Owns every primary record (balances, stakes, delegations, locked stakes,
//! incentive history) and the secondary indices that must track them:
//!
//! - validator key → holder (1:1 binding, enforced at write time)
//! - `(effective stake, holder)` ordered ranking for top-N retrieval
//! - delegatee → delegators (reverse delegation lookup)
//! - recipient → incentive heights (reverse incentive lookup)
//!
//! Index discipline: remove the stale index key BEFORE the primary value
//! changes, insert the fresh key AFTER. Every mutation here follows that
//! order so the ranking index never points at a stale amount.
//!
//! The primary store and the index store are separate [`KvStore`] instances;
//! the root commitment covers primary state only, so index layout can change
//! without forking the chain.

use std::collections::BTreeMap;

use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};
use tracing::debug;

use lib_types::{Address, BlockHeight, Currency, Delegate, LockedStake, Stake, ValidatorKey};

use crate::errors::{KvError, LedgerError, LedgerResult};
use crate::keys;
use crate::kv::{KvStore, MemKv};
use lib_types::AppHash;

/// Append-only record of one reward payout: `(height, recipient, amount)`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct IncentiveRecord {
    pub height: BlockHeight,
    pub recipient: Address,
    pub amount: Currency,
}

/// Keyed application state with transactional index maintenance.
pub struct Ledger<S: KvStore> {
    state: S,
    index: S,
}

impl Ledger<MemKv> {
    /// Fresh in-memory ledger (tests, simulations).
    pub fn in_memory() -> Self {
        Self::new(MemKv::new(), MemKv::new())
    }
}

impl<S: KvStore> Ledger<S> {
    pub fn new(state: S, index: S) -> Self {
        Self { state, index }
    }

    // =========================================================================
    // COMMIT PLUMBING
    // =========================================================================

    /// Root commitment over the working primary state.
    pub fn root(&self) -> LedgerResult<AppHash> {
        Ok(self.state.root()?)
    }

    /// Version of the last save.
    pub fn version(&self) -> u64 {
        self.state.version()
    }

    /// Promote working state to committed in both stores; returns the new
    /// primary root and version.
    pub fn save(&mut self) -> LedgerResult<(AppHash, u64)> {
        self.index.save()?;
        Ok(self.state.save()?)
    }

    /// Delete everything, primary and index. Re-genesis and test harnesses
    /// only; never called during block processing.
    pub fn purge(&mut self) -> LedgerResult<()> {
        self.state.purge()?;
        self.index.purge()?;
        Ok(())
    }

    /// Opaque controller bookkeeping blob. Lives in the index store so it
    /// never feeds the state commitment (it records the commitment itself).
    pub fn get_metadata(&self) -> LedgerResult<Option<Vec<u8>>> {
        Ok(self.index.get(keys::KEY_METADATA, false)?)
    }

    pub fn set_metadata(&mut self, raw: &[u8]) -> LedgerResult<()> {
        Ok(self.index.set(keys::KEY_METADATA, raw)?)
    }

    // =========================================================================
    // BALANCES
    // =========================================================================

    /// Balance of an address; absent means zero.
    pub fn get_balance(&self, addr: &Address, committed: bool) -> LedgerResult<Currency> {
        Ok(self
            .get_json::<Currency>(&keys::balance_key(addr), committed)?
            .unwrap_or_else(Currency::zero))
    }

    /// Set a balance. Zero deletes the record; zero is never stored.
    pub fn set_balance(&mut self, addr: &Address, amount: &Currency) -> LedgerResult<()> {
        let key = keys::balance_key(addr);
        if amount.is_zero() {
            self.state.delete(&key)?;
        } else {
            self.put_json(&key, amount)?;
        }
        Ok(())
    }

    // =========================================================================
    // STAKES
    // =========================================================================

    pub fn get_stake(&self, holder: &Address, committed: bool) -> LedgerResult<Option<Stake>> {
        self.get_json(&keys::stake_key(holder), committed)
    }

    /// Reverse lookup through the validator index.
    pub fn get_holder_by_validator(
        &self,
        validator: &ValidatorKey,
        committed: bool,
    ) -> LedgerResult<Option<Address>> {
        match self
            .index
            .get(&keys::validator_index_key(validator), committed)?
        {
            Some(raw) => Ok(Some(Address::try_from(raw.as_slice()).map_err(|e| {
                LedgerError::Consistency(format!("bad holder in validator index: {e}"))
            })?)),
            None => Ok(None),
        }
    }

    /// Every active validator binding, in validator-key order.
    pub fn get_validator_holders(
        &self,
        committed: bool,
    ) -> LedgerResult<Vec<(ValidatorKey, Address)>> {
        let mut out = Vec::new();
        for (key, raw) in self
            .index
            .scan_prefix(keys::PREFIX_IDX_VALIDATOR, committed)?
        {
            let validator = keys::parse_validator_index_key(&key)
                .ok_or_else(|| LedgerError::Consistency("unparsable validator index key".into()))?;
            let holder = Address::try_from(raw.as_slice()).map_err(|e| {
                LedgerError::Consistency(format!("bad holder in validator index: {e}"))
            })?;
            out.push((validator, holder));
        }
        Ok(out)
    }

    /// Set or remove a holder's stake with the full amount immediately
    /// spendable for ranking (no pending decrease involved).
    ///
    /// A zero amount removes the stake. Removal is refused while delegations
    /// still name the holder, while decreases are still pending, or when it
    /// would empty the validator set.
    pub fn set_unlocked_stake(&mut self, holder: &Address, stake: &Stake) -> LedgerResult<()> {
        let existing = self.get_stake(holder, false)?;

        if stake.amount.is_zero() {
            let prior = existing.ok_or(LedgerError::NoStake(*holder))?;
            if !self.get_delegates_by_delegatee(holder, false)?.is_empty() {
                return Err(LedgerError::DelegatesRemain);
            }
            if !self.pending_decrease(holder)?.is_zero() {
                return Err(LedgerError::ExcessiveDecrease);
            }
            if self.validator_count()? <= 1 {
                return Err(LedgerError::LastValidator);
            }
            let old_eff = self.effective_amount(holder, &prior.amount, false)?;
            self.index
                .delete(&keys::eff_stake_index_key(&old_eff, holder))?;
            self.state.delete(&keys::stake_key(holder))?;
            self.index
                .delete(&keys::validator_index_key(&prior.validator))?;
            return Ok(());
        }

        // 1:1 binding: the validator key must be free or already ours.
        if let Some(bound) = self.get_holder_by_validator(&stake.validator, false)? {
            if bound != *holder {
                return Err(LedgerError::ValidatorTaken {
                    validator: stake.validator,
                    holder: bound,
                });
            }
        }
        if stake.amount < self.pending_decrease(holder)? {
            return Err(LedgerError::ExcessiveDecrease);
        }

        let old_eff = match &existing {
            Some(prior) => Some(self.effective_amount(holder, &prior.amount, false)?),
            None => None,
        };
        if let Some(eff) = &old_eff {
            self.index.delete(&keys::eff_stake_index_key(eff, holder))?;
        }
        if let Some(prior) = &existing {
            if prior.validator != stake.validator {
                self.index
                    .delete(&keys::validator_index_key(&prior.validator))?;
            }
        }

        self.put_json(&keys::stake_key(holder), stake)?;
        self.index
            .set(&keys::validator_index_key(&stake.validator), holder.as_ref())?;
        let new_eff = self.effective_amount(holder, &stake.amount, false)?;
        self.index
            .set(&keys::eff_stake_index_key(&new_eff, holder), &[])?;
        Ok(())
    }

    /// Schedule a pending stake decrease, effective at the lock's unlock
    /// height. Until then the full amount keeps counting toward the holder's
    /// effective stake.
    pub fn set_locked_stake(&mut self, holder: &Address, lock: &LockedStake) -> LedgerResult<()> {
        let stake = self
            .get_stake(holder, false)?
            .ok_or(LedgerError::NoStake(*holder))?;

        if let Some(bound) = self.get_holder_by_validator(&lock.validator, false)? {
            if bound != *holder {
                return Err(LedgerError::PermissionDenied);
            }
        }
        if stake.validator != lock.validator {
            return Err(LedgerError::BadValidator);
        }

        let key = keys::lock_key(holder, lock.unlock_height);
        if self.state.has(&key, false)? {
            return Err(LedgerError::HeightTaken(lock.unlock_height));
        }

        let scheduled = self.pending_decrease(holder)?.checked_add(&lock.amount)?;
        if scheduled > stake.amount {
            return Err(LedgerError::ExcessiveDecrease);
        }
        if scheduled == stake.amount {
            // This lock drains the stake completely once it matures.
            if !self.get_delegates_by_delegatee(holder, false)?.is_empty() {
                return Err(LedgerError::DelegatesRemain);
            }
            if self.validator_count()? <= 1 {
                return Err(LedgerError::LastValidator);
            }
        }

        self.put_json(&key, lock)
    }

    /// All pending decreases of a holder, in unlock-height order.
    pub fn get_locked_stakes(
        &self,
        holder: &Address,
        committed: bool,
    ) -> LedgerResult<Vec<LockedStake>> {
        let mut out = Vec::new();
        for (key, raw) in self.state.scan_prefix(&keys::lock_prefix(holder), committed)? {
            out.push(self.decode::<LockedStake>(&key, &raw)?);
        }
        Ok(out)
    }

    /// Apply every pending decrease whose unlock height has been reached:
    /// reduce the stake (deleting it at zero), credit the freed amount back
    /// to the holder's balance, refresh indices, and drop the lock records.
    ///
    /// A decrease that would empty the last remaining validator's stake is
    /// deferred, not applied: its lock records stay in place until another
    /// validator exists. The schedule-time guard only sees the set as it was
    /// then; this re-check holds when several full drains mature together.
    ///
    /// Returns `(holder, credited amount)` per affected holder, in address
    /// order. Called once per block after EndBlock.
    pub fn loose_locked_stakes(
        &mut self,
        height: BlockHeight,
    ) -> LedgerResult<Vec<(Address, Currency)>> {
        let mut matured: BTreeMap<Address, (Currency, Vec<Vec<u8>>)> = BTreeMap::new();
        for (key, raw) in self.state.scan_prefix(keys::PREFIX_LOCK, false)? {
            let lock = self.decode::<LockedStake>(&key, &raw)?;
            if lock.unlock_height > height {
                continue;
            }
            let (holder, _) = keys::parse_lock_key(&key)
                .ok_or_else(|| LedgerError::Consistency("unparsable lock key".into()))?;
            let entry = matured
                .entry(holder)
                .or_insert_with(|| (Currency::zero(), Vec::new()));
            entry.0 = entry.0.checked_add(&lock.amount)?;
            entry.1.push(key);
        }

        let mut credits = Vec::new();
        for (holder, (credit, lock_keys)) in &matured {
            let stake = self.get_stake(holder, false)?.ok_or_else(|| {
                LedgerError::Consistency(format!("locked stake without a stake for {holder}"))
            })?;
            let remaining = stake
                .amount
                .checked_sub(credit)
                .map_err(|_| LedgerError::Consistency(format!("lock exceeds stake for {holder}")))?;

            if remaining.is_zero() && self.validator_count()? <= 1 {
                debug!(%holder, height, "deferred unlock: last validator cannot drain");
                continue;
            }
            for key in lock_keys {
                self.state.delete(key)?;
            }

            let old_eff = self.effective_amount(holder, &stake.amount, false)?;
            self.index
                .delete(&keys::eff_stake_index_key(&old_eff, holder))?;

            if remaining.is_zero() {
                if !self.get_delegates_by_delegatee(holder, false)?.is_empty() {
                    return Err(LedgerError::Consistency(format!(
                        "stake of {holder} drained with delegations remaining"
                    )));
                }
                self.state.delete(&keys::stake_key(holder))?;
                self.index
                    .delete(&keys::validator_index_key(&stake.validator))?;
            } else {
                self.put_json(
                    &keys::stake_key(holder),
                    &Stake {
                        validator: stake.validator,
                        amount: remaining.clone(),
                    },
                )?;
                let new_eff = old_eff.checked_sub(credit)?;
                self.index
                    .set(&keys::eff_stake_index_key(&new_eff, holder), &[])?;
            }

            let balance = self.get_balance(holder, false)?.checked_add(credit)?;
            self.set_balance(holder, &balance)?;
            debug!(%holder, amount = %credit, height, "applied stake unlock");
            credits.push((*holder, credit.clone()));
        }

        Ok(credits)
    }

    // =========================================================================
    // DELEGATIONS
    // =========================================================================

    pub fn get_delegate(
        &self,
        delegator: &Address,
        committed: bool,
    ) -> LedgerResult<Option<Delegate>> {
        self.get_json(&keys::delegate_key(delegator), committed)
    }

    /// Set or remove a delegation. A zero amount removes the record. The
    /// delegatee's effective-stake index entry is refreshed, not the
    /// delegator's, since effective stake is delegatee-keyed.
    pub fn set_delegate(&mut self, delegator: &Address, delegate: &Delegate) -> LedgerResult<()> {
        let existing = self.get_delegate(delegator, false)?;

        if delegate.amount.is_zero() {
            if let Some(prior) = existing {
                self.drop_delegation(delegator, &prior)?;
            }
            return Ok(());
        }

        let delegatee_stake = self
            .get_stake(&delegate.delegatee, false)?
            .ok_or(LedgerError::NoStake(delegate.delegatee))?;
        // A delegation must outlive pending decreases; a fully-draining
        // delegatee is no longer a valid target.
        if self.pending_decrease(&delegate.delegatee)? == delegatee_stake.amount {
            return Err(LedgerError::NoStake(delegate.delegatee));
        }

        // Switching delegatees retires the old entries first.
        if let Some(prior) = &existing {
            if prior.delegatee != delegate.delegatee {
                self.drop_delegation(delegator, prior)?;
            }
        }

        let delegatee = delegate.delegatee;
        let old_eff = self.effective_amount(&delegatee, &delegatee_stake.amount, false)?;
        self.index
            .delete(&keys::eff_stake_index_key(&old_eff, &delegatee))?;
        self.put_json(&keys::delegate_key(delegator), delegate)?;
        self.index
            .set(&keys::delegator_index_key(&delegatee, delegator), &[])?;
        let new_eff = self.effective_amount(&delegatee, &delegatee_stake.amount, false)?;
        self.index
            .set(&keys::eff_stake_index_key(&new_eff, &delegatee), &[])?;
        Ok(())
    }

    /// Remove one delegation record and its index entries, refreshing the
    /// delegatee's ranking entry around the removal.
    fn drop_delegation(&mut self, delegator: &Address, prior: &Delegate) -> LedgerResult<()> {
        let stake = self.get_stake(&prior.delegatee, false)?;
        if let Some(stake) = &stake {
            let old_eff = self.effective_amount(&prior.delegatee, &stake.amount, false)?;
            self.index
                .delete(&keys::eff_stake_index_key(&old_eff, &prior.delegatee))?;
        }
        self.state.delete(&keys::delegate_key(delegator))?;
        self.index
            .delete(&keys::delegator_index_key(&prior.delegatee, delegator))?;
        if let Some(stake) = &stake {
            let new_eff = self.effective_amount(&prior.delegatee, &stake.amount, false)?;
            self.index
                .set(&keys::eff_stake_index_key(&new_eff, &prior.delegatee), &[])?;
        }
        Ok(())
    }

    /// All delegations naming `delegatee`, in delegator-address order.
    pub fn get_delegates_by_delegatee(
        &self,
        delegatee: &Address,
        committed: bool,
    ) -> LedgerResult<Vec<(Address, Delegate)>> {
        let mut out = Vec::new();
        for (key, _) in self
            .index
            .scan_prefix(&keys::delegator_index_prefix(delegatee), committed)?
        {
            let delegator = keys::parse_delegator_index_key(&key, delegatee)
                .ok_or_else(|| LedgerError::Consistency("unparsable delegator index key".into()))?;
            let delegate = self
                .get_delegate(&delegator, committed)?
                .ok_or_else(|| {
                    LedgerError::Consistency(format!("dangling delegator index for {delegator}"))
                })?;
            out.push((delegator, delegate));
        }
        Ok(out)
    }

    /// Own stake plus all delegated amounts; absent if the holder has no
    /// stake.
    pub fn get_effective_stake(
        &self,
        holder: &Address,
        committed: bool,
    ) -> LedgerResult<Option<Currency>> {
        match self.get_stake(holder, committed)? {
            Some(stake) => Ok(Some(self.effective_amount(holder, &stake.amount, committed)?)),
            None => Ok(None),
        }
    }

    /// Top `max_count` holders by effective stake, descending, read straight
    /// off the tail of the ranking index.
    pub fn get_top_stakes(
        &self,
        max_count: usize,
        committed: bool,
    ) -> LedgerResult<Vec<(Address, Currency)>> {
        let mut out = Vec::new();
        for (key, _) in
            self.index
                .scan_prefix_rev(keys::PREFIX_IDX_EFF_STAKE, committed, max_count)?
        {
            let (amount, holder) = keys::parse_eff_stake_index_key(&key)
                .ok_or_else(|| LedgerError::Consistency("unparsable ranking index key".into()))?;
            out.push((holder, amount));
        }
        Ok(out)
    }

    // =========================================================================
    // INCENTIVE HISTORY
    // =========================================================================

    /// Record one payout. Records are append-only: writing twice for the same
    /// `(height, recipient)` is an internal fault.
    pub fn add_incentive_record(
        &mut self,
        height: BlockHeight,
        recipient: &Address,
        amount: &Currency,
    ) -> LedgerResult<()> {
        let key = keys::incentive_key(height, recipient);
        if self.state.has(&key, false)? {
            return Err(LedgerError::Consistency(format!(
                "duplicate incentive record for {recipient} at height {height}"
            )));
        }
        self.put_json(&key, amount)?;
        let raw = serde_json::to_vec(amount).map_err(|e| KvError::Serialization(e.to_string()))?;
        self.index
            .set(&keys::incentive_addr_index_key(recipient, height), &raw)?;
        Ok(())
    }

    /// Every payout of one block, in recipient-address order.
    pub fn get_block_incentives(
        &self,
        height: BlockHeight,
        committed: bool,
    ) -> LedgerResult<Vec<IncentiveRecord>> {
        let mut out = Vec::new();
        for (key, raw) in self
            .state
            .scan_prefix(&keys::incentive_height_prefix(height), committed)?
        {
            let (height, recipient) = keys::parse_incentive_key(&key)
                .ok_or_else(|| LedgerError::Consistency("unparsable incentive key".into()))?;
            out.push(IncentiveRecord {
                height,
                recipient,
                amount: self.decode(&key, &raw)?,
            });
        }
        Ok(out)
    }

    /// Every payout ever made to one recipient, in height order.
    pub fn get_address_incentives(
        &self,
        recipient: &Address,
        committed: bool,
    ) -> LedgerResult<Vec<IncentiveRecord>> {
        let mut out = Vec::new();
        for (key, raw) in self
            .index
            .scan_prefix(&keys::incentive_addr_index_prefix(recipient), committed)?
        {
            let height = keys::parse_incentive_addr_index_key(&key, recipient).ok_or_else(|| {
                LedgerError::Consistency("unparsable incentive address index key".into())
            })?;
            out.push(IncentiveRecord {
                height,
                recipient: *recipient,
                amount: self.decode(&key, &raw)?,
            });
        }
        Ok(out)
    }

    /// One payout, by exact `(height, recipient)`.
    pub fn get_incentive(
        &self,
        height: BlockHeight,
        recipient: &Address,
        committed: bool,
    ) -> LedgerResult<Option<IncentiveRecord>> {
        Ok(self
            .get_json::<Currency>(&keys::incentive_key(height, recipient), committed)?
            .map(|amount| IncentiveRecord {
                height,
                recipient: *recipient,
                amount,
            }))
    }

    // =========================================================================
    // INTERNAL HELPERS
    // =========================================================================

    fn get_json<T: DeserializeOwned>(&self, key: &[u8], committed: bool) -> LedgerResult<Option<T>> {
        match self.state.get(key, committed)? {
            Some(raw) => Ok(Some(self.decode(key, &raw)?)),
            None => Ok(None),
        }
    }

    fn decode<T: DeserializeOwned>(&self, key: &[u8], raw: &[u8]) -> LedgerResult<T> {
        serde_json::from_slice(raw).map_err(|e| {
            LedgerError::Consistency(format!(
                "undecodable value at {}: {e}",
                String::from_utf8_lossy(key)
            ))
        })
    }

    fn put_json<T: Serialize>(&mut self, key: &[u8], value: &T) -> LedgerResult<()> {
        let raw = serde_json::to_vec(value).map_err(|e| KvError::Serialization(e.to_string()))?;
        self.state.set(key, &raw)?;
        Ok(())
    }

    fn validator_count(&self) -> LedgerResult<usize> {
        Ok(self
            .index
            .scan_prefix(keys::PREFIX_IDX_VALIDATOR, false)?
            .len())
    }

    /// Sum of all pending decreases of a holder (working view).
    fn pending_decrease(&self, holder: &Address) -> LedgerResult<Currency> {
        let mut total = Currency::zero();
        for lock in self.get_locked_stakes(holder, false)? {
            total = total.checked_add(&lock.amount)?;
        }
        Ok(total)
    }

    /// Own stake amount plus all delegated amounts.
    fn effective_amount(
        &self,
        holder: &Address,
        stake_amount: &Currency,
        committed: bool,
    ) -> LedgerResult<Currency> {
        let mut total = stake_amount.clone();
        for (_, delegate) in self.get_delegates_by_delegatee(holder, committed)? {
            total = total.checked_add(&delegate.amount)?;
        }
        Ok(total)
    }
}

// =============================================================================
// TESTS
// =============================================================================

#[cfg(test)]
mod tests {
    use super::*;
    use lib_types::{ADDRESS_LEN, VALIDATOR_KEY_LEN};

    fn addr(n: u8) -> Address {
        Address::new([n; ADDRESS_LEN])
    }

    fn vkey(n: u8) -> ValidatorKey {
        ValidatorKey::new([n; VALIDATOR_KEY_LEN])
    }

    fn cur(n: u64) -> Currency {
        Currency::from(n)
    }

    fn stake(n: u8, amount: u64) -> Stake {
        Stake {
            validator: vkey(n),
            amount: cur(amount),
        }
    }

    /// Ledger with two stakers so single-validator guards don't interfere.
    fn two_staker_ledger() -> Ledger<MemKv> {
        let mut ledger = Ledger::in_memory();
        ledger.set_unlocked_stake(&addr(1), &stake(1, 100)).unwrap();
        ledger.set_unlocked_stake(&addr(2), &stake(2, 50)).unwrap();
        ledger
    }

    #[test]
    fn test_balance_absent_means_zero() {
        let mut ledger = Ledger::in_memory();
        assert_eq!(ledger.get_balance(&addr(1), false).unwrap(), Currency::zero());

        ledger.set_balance(&addr(1), &cur(42)).unwrap();
        assert_eq!(ledger.get_balance(&addr(1), false).unwrap(), cur(42));

        // setting zero deletes the record rather than storing zero
        ledger.set_balance(&addr(1), &Currency::zero()).unwrap();
        assert_eq!(ledger.get_balance(&addr(1), false).unwrap(), Currency::zero());
    }

    #[test]
    fn test_stake_round_trip_and_validator_lookup() {
        let ledger = two_staker_ledger();
        assert_eq!(ledger.get_stake(&addr(1), false).unwrap(), Some(stake(1, 100)));
        assert_eq!(
            ledger.get_holder_by_validator(&vkey(1), false).unwrap(),
            Some(addr(1))
        );
        assert_eq!(ledger.get_holder_by_validator(&vkey(9), false).unwrap(), None);
    }

    #[test]
    fn test_validator_key_taken_by_other_holder() {
        let mut ledger = two_staker_ledger();
        let err = ledger
            .set_unlocked_stake(&addr(3), &stake(1, 10))
            .unwrap_err();
        assert!(matches!(err, LedgerError::ValidatorTaken { holder, .. } if holder == addr(1)));
        // both prior stakes untouched
        assert_eq!(ledger.get_stake(&addr(1), false).unwrap(), Some(stake(1, 100)));
        assert_eq!(ledger.get_stake(&addr(3), false).unwrap(), None);
    }

    #[test]
    fn test_restake_same_validator_updates_ranking() {
        let mut ledger = two_staker_ledger();
        ledger.set_unlocked_stake(&addr(1), &stake(1, 200)).unwrap();
        let top = ledger.get_top_stakes(10, false).unwrap();
        assert_eq!(top, vec![(addr(1), cur(200)), (addr(2), cur(50))]);
    }

    #[test]
    fn test_removing_last_validator_is_refused() {
        let mut ledger = Ledger::in_memory();
        ledger.set_unlocked_stake(&addr(1), &stake(1, 100)).unwrap();
        let err = ledger
            .set_unlocked_stake(&addr(1), &stake(1, 0))
            .unwrap_err();
        assert!(matches!(err, LedgerError::LastValidator));

        // a full pending decrease is refused for the same reason
        let err = ledger
            .set_locked_stake(
                &addr(1),
                &LockedStake {
                    validator: vkey(1),
                    amount: cur(100),
                    unlock_height: 5,
                },
            )
            .unwrap_err();
        assert!(matches!(err, LedgerError::LastValidator));
    }

    #[test]
    fn test_stake_removal() {
        let mut ledger = two_staker_ledger();
        ledger.set_unlocked_stake(&addr(2), &stake(2, 0)).unwrap();
        assert_eq!(ledger.get_stake(&addr(2), false).unwrap(), None);
        assert_eq!(ledger.get_holder_by_validator(&vkey(2), false).unwrap(), None);
        assert_eq!(
            ledger.get_top_stakes(10, false).unwrap(),
            vec![(addr(1), cur(100))]
        );
    }

    #[test]
    fn test_stake_removal_refused_while_delegated() {
        let mut ledger = two_staker_ledger();
        ledger
            .set_delegate(
                &addr(5),
                &Delegate {
                    delegatee: addr(2),
                    amount: cur(7),
                },
            )
            .unwrap();
        let err = ledger
            .set_unlocked_stake(&addr(2), &stake(2, 0))
            .unwrap_err();
        assert!(matches!(err, LedgerError::DelegatesRemain));
    }

    #[test]
    fn test_locked_stake_conflicts() {
        let mut ledger = two_staker_ledger();

        // wrong validator key for the holder's own stake
        let err = ledger
            .set_locked_stake(
                &addr(1),
                &LockedStake {
                    validator: vkey(9),
                    amount: cur(10),
                    unlock_height: 5,
                },
            )
            .unwrap_err();
        assert!(matches!(err, LedgerError::BadValidator));

        // validator key bound to a different holder
        let err = ledger
            .set_locked_stake(
                &addr(1),
                &LockedStake {
                    validator: vkey(2),
                    amount: cur(10),
                    unlock_height: 5,
                },
            )
            .unwrap_err();
        assert!(matches!(err, LedgerError::PermissionDenied));

        // no stake at all
        let err = ledger
            .set_locked_stake(
                &addr(7),
                &LockedStake {
                    validator: vkey(7),
                    amount: cur(10),
                    unlock_height: 5,
                },
            )
            .unwrap_err();
        assert!(matches!(err, LedgerError::NoStake(a) if a == addr(7)));

        // same holder, same unlock height, twice
        let lock = LockedStake {
            validator: vkey(1),
            amount: cur(10),
            unlock_height: 5,
        };
        ledger.set_locked_stake(&addr(1), &lock).unwrap();
        let err = ledger.set_locked_stake(&addr(1), &lock).unwrap_err();
        assert!(matches!(err, LedgerError::HeightTaken(5)));

        // cumulative decreases beyond the staked amount
        let err = ledger
            .set_locked_stake(
                &addr(1),
                &LockedStake {
                    validator: vkey(1),
                    amount: cur(91),
                    unlock_height: 6,
                },
            )
            .unwrap_err();
        assert!(matches!(err, LedgerError::ExcessiveDecrease));
    }

    #[test]
    fn test_withdraw_then_unlock() {
        // stake 100, schedule a decrease of 40 at height 5
        let mut ledger = two_staker_ledger();
        ledger
            .set_locked_stake(
                &addr(1),
                &LockedStake {
                    validator: vkey(1),
                    amount: cur(40),
                    unlock_height: 5,
                },
            )
            .unwrap();

        // before the unlock height the full amount still ranks
        assert_eq!(
            ledger.get_effective_stake(&addr(1), false).unwrap(),
            Some(cur(100))
        );
        assert!(ledger.loose_locked_stakes(4).unwrap().is_empty());
        assert_eq!(ledger.get_stake(&addr(1), false).unwrap(), Some(stake(1, 100)));

        // at height 5 the decrease applies and the freed amount is credited
        let credited = ledger.loose_locked_stakes(5).unwrap();
        assert_eq!(credited, vec![(addr(1), cur(40))]);
        assert_eq!(ledger.get_stake(&addr(1), false).unwrap(), Some(stake(1, 60)));
        assert_eq!(ledger.get_balance(&addr(1), false).unwrap(), cur(40));
        assert!(ledger.get_locked_stakes(&addr(1), false).unwrap().is_empty());
        assert_eq!(
            ledger.get_top_stakes(10, false).unwrap(),
            vec![(addr(1), cur(60)), (addr(2), cur(50))]
        );
    }

    #[test]
    fn test_unlock_to_zero_deletes_stake() {
        let mut ledger = two_staker_ledger();
        ledger
            .set_locked_stake(
                &addr(2),
                &LockedStake {
                    validator: vkey(2),
                    amount: cur(50),
                    unlock_height: 3,
                },
            )
            .unwrap();
        let credited = ledger.loose_locked_stakes(3).unwrap();
        assert_eq!(credited, vec![(addr(2), cur(50))]);
        assert_eq!(ledger.get_stake(&addr(2), false).unwrap(), None);
        assert_eq!(ledger.get_holder_by_validator(&vkey(2), false).unwrap(), None);
        assert_eq!(ledger.get_balance(&addr(2), false).unwrap(), cur(50));
    }

    #[test]
    fn test_unlock_never_empties_validator_set() {
        let mut ledger = two_staker_ledger();
        // each schedules a full drain while the other still exists, so the
        // schedule-time guard passes for both
        ledger
            .set_locked_stake(
                &addr(1),
                &LockedStake {
                    validator: vkey(1),
                    amount: cur(100),
                    unlock_height: 3,
                },
            )
            .unwrap();
        ledger
            .set_locked_stake(
                &addr(2),
                &LockedStake {
                    validator: vkey(2),
                    amount: cur(50),
                    unlock_height: 3,
                },
            )
            .unwrap();

        // addr(1) drains first (address order); addr(2) is then the last
        // validator and its decrease is deferred, locks intact
        let credited = ledger.loose_locked_stakes(3).unwrap();
        assert_eq!(credited, vec![(addr(1), cur(100))]);
        assert_eq!(ledger.get_stake(&addr(1), false).unwrap(), None);
        assert_eq!(ledger.get_stake(&addr(2), false).unwrap(), Some(stake(2, 50)));
        assert_eq!(ledger.get_locked_stakes(&addr(2), false).unwrap().len(), 1);
        assert_eq!(ledger.get_balance(&addr(2), false).unwrap(), Currency::zero());

        // once another validator exists the deferred decrease applies
        ledger.set_unlocked_stake(&addr(3), &stake(3, 10)).unwrap();
        let credited = ledger.loose_locked_stakes(4).unwrap();
        assert_eq!(credited, vec![(addr(2), cur(50))]);
        assert_eq!(ledger.get_stake(&addr(2), false).unwrap(), None);
        assert_eq!(ledger.get_balance(&addr(2), false).unwrap(), cur(50));
    }

    #[test]
    fn test_effective_stake_sums_delegations() {
        let mut ledger = two_staker_ledger();
        ledger
            .set_delegate(
                &addr(11),
                &Delegate {
                    delegatee: addr(1),
                    amount: cur(101),
                },
            )
            .unwrap();
        ledger
            .set_delegate(
                &addr(12),
                &Delegate {
                    delegatee: addr(1),
                    amount: cur(102),
                },
            )
            .unwrap();

        assert_eq!(
            ledger.get_effective_stake(&addr(1), false).unwrap(),
            Some(cur(303))
        );
        let delegates = ledger.get_delegates_by_delegatee(&addr(1), false).unwrap();
        assert_eq!(delegates.len(), 2);
        assert_eq!(delegates[0].0, addr(11));
        assert_eq!(delegates[1].0, addr(12));
        assert_eq!(
            ledger.get_top_stakes(10, false).unwrap(),
            vec![(addr(1), cur(303)), (addr(2), cur(50))]
        );

        // retract one delegation; ranking follows
        ledger
            .set_delegate(
                &addr(11),
                &Delegate {
                    delegatee: addr(1),
                    amount: Currency::zero(),
                },
            )
            .unwrap();
        assert_eq!(ledger.get_delegate(&addr(11), false).unwrap(), None);
        assert_eq!(
            ledger.get_effective_stake(&addr(1), false).unwrap(),
            Some(cur(202))
        );
    }

    #[test]
    fn test_delegate_requires_staking_delegatee() {
        let mut ledger = two_staker_ledger();
        let err = ledger
            .set_delegate(
                &addr(11),
                &Delegate {
                    delegatee: addr(9),
                    amount: cur(5),
                },
            )
            .unwrap_err();
        assert!(matches!(err, LedgerError::NoStake(a) if a == addr(9)));

        // a fully-draining delegatee is treated as unstaked
        ledger
            .set_locked_stake(
                &addr(2),
                &LockedStake {
                    validator: vkey(2),
                    amount: cur(50),
                    unlock_height: 9,
                },
            )
            .unwrap();
        let err = ledger
            .set_delegate(
                &addr(11),
                &Delegate {
                    delegatee: addr(2),
                    amount: cur(5),
                },
            )
            .unwrap_err();
        assert!(matches!(err, LedgerError::NoStake(a) if a == addr(2)));
    }

    #[test]
    fn test_switching_delegatee_reindexes_both() {
        let mut ledger = two_staker_ledger();
        ledger
            .set_delegate(
                &addr(11),
                &Delegate {
                    delegatee: addr(1),
                    amount: cur(30),
                },
            )
            .unwrap();
        ledger
            .set_delegate(
                &addr(11),
                &Delegate {
                    delegatee: addr(2),
                    amount: cur(30),
                },
            )
            .unwrap();

        assert_eq!(
            ledger.get_effective_stake(&addr(1), false).unwrap(),
            Some(cur(100))
        );
        assert_eq!(
            ledger.get_effective_stake(&addr(2), false).unwrap(),
            Some(cur(80))
        );
        assert!(ledger
            .get_delegates_by_delegatee(&addr(1), false)
            .unwrap()
            .is_empty());
    }

    #[test]
    fn test_top_stakes_ties_break_by_address() {
        let mut ledger = Ledger::in_memory();
        ledger.set_unlocked_stake(&addr(3), &stake(3, 70)).unwrap();
        ledger.set_unlocked_stake(&addr(1), &stake(1, 70)).unwrap();
        ledger.set_unlocked_stake(&addr(2), &stake(2, 90)).unwrap();

        let top = ledger.get_top_stakes(2, false).unwrap();
        // reverse index scan: higher amount first, then higher address
        assert_eq!(top, vec![(addr(2), cur(90)), (addr(3), cur(70))]);
    }

    #[test]
    fn test_incentive_records() {
        let mut ledger = Ledger::in_memory();
        ledger.add_incentive_record(5, &addr(1), &cur(700)).unwrap();
        ledger.add_incentive_record(5, &addr(2), &cur(300)).unwrap();
        ledger.add_incentive_record(6, &addr(1), &cur(10)).unwrap();

        let block5 = ledger.get_block_incentives(5, false).unwrap();
        assert_eq!(block5.len(), 2);
        assert_eq!(block5[0].recipient, addr(1));
        assert_eq!(block5[0].amount, cur(700));

        let for_addr1 = ledger.get_address_incentives(&addr(1), false).unwrap();
        assert_eq!(for_addr1.len(), 2);
        assert_eq!(for_addr1[0].height, 5);
        assert_eq!(for_addr1[1].height, 6);

        assert_eq!(
            ledger.get_incentive(5, &addr(2), false).unwrap(),
            Some(IncentiveRecord {
                height: 5,
                recipient: addr(2),
                amount: cur(300),
            })
        );
        assert_eq!(ledger.get_incentive(7, &addr(1), false).unwrap(), None);

        // append-only: a second write for the same (height, recipient) faults
        let err = ledger
            .add_incentive_record(5, &addr(1), &cur(1))
            .unwrap_err();
        assert!(matches!(err, LedgerError::Consistency(_)));
    }

    #[test]
    fn test_committed_view_lags_until_save() {
        let mut ledger = two_staker_ledger();
        assert_eq!(ledger.get_stake(&addr(1), true).unwrap(), None);
        assert!(ledger.get_top_stakes(10, true).unwrap().is_empty());

        let (root, version) = ledger.save().unwrap();
        assert_eq!(version, 1);
        assert!(!root.is_zero());
        assert_eq!(ledger.get_stake(&addr(1), true).unwrap(), Some(stake(1, 100)));
        assert_eq!(ledger.get_top_stakes(10, true).unwrap().len(), 2);
    }

    #[test]
    fn test_root_covers_primary_state_only() {
        let mut a = two_staker_ledger();
        let mut b = two_staker_ledger();
        // divergent index-only content must not change the commitment
        b.index.set(b"scratch", b"noise").unwrap();
        assert_eq!(a.root().unwrap(), b.root().unwrap());
        assert_eq!(a.save().unwrap().0, b.save().unwrap().0);
    }

    #[test]
    fn test_purge_clears_everything() {
        let mut ledger = two_staker_ledger();
        ledger.set_balance(&addr(9), &cur(5)).unwrap();
        ledger.add_incentive_record(1, &addr(1), &cur(1)).unwrap();
        ledger.purge().unwrap();
        assert_eq!(ledger.get_stake(&addr(1), false).unwrap(), None);
        assert_eq!(ledger.get_balance(&addr(9), false).unwrap(), Currency::zero());
        assert!(ledger.get_top_stakes(10, false).unwrap().is_empty());
        assert!(ledger.get_block_incentives(1, false).unwrap().is_empty());
    }
}
