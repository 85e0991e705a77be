//! Voting-power derivation and validator-set diffing.
//!
//! Effective stakes are 256-bit amounts; consensus voting powers are signed
//! 64-bit integers whose sum must stay under a global ceiling. The bridge is
//! a single right-shift applied uniformly to every amount, so relative stake
//! order is preserved exactly and the mapping is deterministic.

use num_bigint::BigUint;
use serde::{Deserialize, Serialize};

use lib_types::{Currency, ValidatorKey};

/// Ceiling on the sum of all voting powers. Kept well under `i64::MAX` so
/// the consensus engine can sum powers internally without overflow.
pub const MAX_TOTAL_VOTING_POWER: i64 = i64::MAX / 8;

/// One validator as the consensus engine sees it.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct ValidatorUpdate {
    pub key: ValidatorKey,
    pub power: i64,
}

/// Find the uniform right-shift `k` such that the running sum of shifted,
/// truncated amounts never exceeds the power ceiling.
///
/// Walks the amounts in ranked order; whenever adding the next shifted value
/// would pass the ceiling, `k` grows by one and both the running sum and the
/// value are re-shifted. Truncation only shrinks values, so the final `k`
/// keeps the full shifted sum within bounds as well.
fn adjust_factor(amounts: &[Currency]) -> u32 {
    let ceiling = BigUint::from(MAX_TOTAL_VOTING_POWER as u64);
    let mut shift: u32 = 0;
    let mut sum = BigUint::default();
    for amount in amounts {
        let mut value = amount.as_biguint() >> shift;
        while &sum + &value > ceiling {
            shift += 1;
            sum >>= 1;
            value >>= 1;
        }
        sum += value;
    }
    shift
}

/// Map ranked effective stakes to voting powers: `amount >> k`, truncating,
/// with one `k` for the whole set. Entries whose power truncates to zero are
/// returned as zero; callers drop them from the validator set (under-floor
/// holders are treated as resigned, not as an error).
pub fn derive_powers(amounts: &[Currency]) -> Vec<i64> {
    let shift = adjust_factor(amounts);
    amounts
        .iter()
        .map(|amount| {
            let value = amount.as_biguint() >> shift;
            // fits: each value is bounded by the ceiling, which is < i64::MAX
            u64::try_from(&value).map_or(0, |v| v as i64)
        })
        .collect()
}

/// Minimal update list between two validator sets.
///
/// Old-only keys come back with `power = 0` (removal); new-only or changed
/// keys come back with their current power; unchanged validators are
/// omitted. The result is ordered by descending power (stable on ties), the
/// order consumers apply updates in.
pub fn diff_validator_sets(
    old: &[ValidatorUpdate],
    new: &[ValidatorUpdate],
) -> Vec<ValidatorUpdate> {
    let mut old_sorted = old.to_vec();
    let mut new_sorted = new.to_vec();
    old_sorted.sort_by(|a, b| a.key.cmp(&b.key));
    new_sorted.sort_by(|a, b| a.key.cmp(&b.key));

    let mut updates = Vec::new();
    let (mut i, mut j) = (0, 0);
    while i < old_sorted.len() && j < new_sorted.len() {
        match old_sorted[i].key.cmp(&new_sorted[j].key) {
            std::cmp::Ordering::Less => {
                updates.push(ValidatorUpdate {
                    key: old_sorted[i].key,
                    power: 0,
                });
                i += 1;
            }
            std::cmp::Ordering::Greater => {
                updates.push(new_sorted[j]);
                j += 1;
            }
            std::cmp::Ordering::Equal => {
                if old_sorted[i].power != new_sorted[j].power {
                    updates.push(new_sorted[j]);
                }
                i += 1;
                j += 1;
            }
        }
    }
    for stale in &old_sorted[i..] {
        updates.push(ValidatorUpdate {
            key: stale.key,
            power: 0,
        });
    }
    updates.extend_from_slice(&new_sorted[j..]);

    // stable sort: ties keep their merge order
    updates.sort_by(|a, b| b.power.cmp(&a.power));
    updates
}
