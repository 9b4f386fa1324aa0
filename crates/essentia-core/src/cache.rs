//! Aspect → amount table mirrored from the backing store.
//!
//! `QuantityCache` is a plain single-owner structure. The grid wraps it,
//! together with the invalidation state, in one mutex so that every logical
//! update (a resync, or one push batch) is applied as a unit.
//!
//! ## Invariant
//!
//! No entry ever holds a zero or negative amount. Mutations that would take
//! an amount to zero or below remove the entry instead.

use fxhash::FxHashMap;

use crate::types::{Category, EssentiaStack};

/// Mirror of the network's essentia, keyed by aspect.
#[derive(Debug, Clone)]
pub struct QuantityCache<A: Category> {
    /// Aspect → stored amount (always > 0).
    table: FxHashMap<A, i64>,
}

impl<A: Category> QuantityCache<A> {
    /// Create an empty cache
    #[must_use]
    pub fn new() -> Self {
        Self {
            table: FxHashMap::default(),
        }
    }

    /// Change the stored amount of `aspect` by `delta`.
    ///
    /// - Absent aspect, `delta <= 0`: no change, returns 0.
    /// - Absent aspect, `delta > 0`: inserted with `delta`, returns `delta`.
    /// - Present aspect: the new amount is `max(0, old + delta)`; a zero
    ///   result removes the entry.
    ///
    /// Returns the delta actually applied, which is smaller in magnitude
    /// than `delta` when the amount was clamped at zero.
    pub fn point_mutate(&mut self, aspect: &A, delta: i64) -> i64 {
        let Some(&previous) = self.table.get(aspect) else {
            if delta > 0 {
                self.table.insert(aspect.clone(), delta);
                return delta;
            }
            return 0;
        };

        let updated = previous.saturating_add(delta).max(0);
        if updated > 0 {
            self.table.insert(aspect.clone(), updated);
        } else {
            self.table.remove(aspect);
        }

        updated - previous
    }

    /// Apply a batch of deltas as one logical update.
    ///
    /// Deltas for the same aspect are coalesced so each aspect appears at
    /// most once in the result, in first-seen order. Aspects whose applied
    /// deltas cancel out are omitted.
    pub fn apply_deltas<I>(&mut self, deltas: I) -> Vec<EssentiaStack<A>>
    where
        I: IntoIterator<Item = EssentiaStack<A>>,
    {
        let mut changes: Vec<EssentiaStack<A>> = Vec::new();
        let mut positions: FxHashMap<A, usize> = FxHashMap::default();

        for EssentiaStack { aspect, amount } in deltas {
            if amount == 0 {
                continue;
            }
            let applied = self.point_mutate(&aspect, amount);
            if applied == 0 {
                continue;
            }
            if let Some(&pos) = positions.get(&aspect) {
                changes[pos].amount += applied;
            } else {
                positions.insert(aspect.clone(), changes.len());
                changes.push(EssentiaStack::new(aspect, applied));
            }
        }

        changes.retain(|change| change.amount != 0);
        changes
    }

    /// Replace the table contents with an absolute snapshot.
    ///
    /// Snapshot entries for the same aspect are summed; aspects whose total
    /// is not positive are treated as absent.
    ///
    /// With `track_changes == false` the table is rebuilt from scratch and
    /// no deltas are computed. Otherwise the returned batch holds
    /// `new - old` for every changed aspect, the full amount for every new
    /// aspect, and `-old` for every aspect missing from the snapshot.
    /// Unchanged aspects are skipped.
    pub fn resync_from<I>(&mut self, snapshot: I, track_changes: bool) -> Vec<EssentiaStack<A>>
    where
        I: IntoIterator<Item = EssentiaStack<A>>,
    {
        let mut incoming: FxHashMap<A, i64> = FxHashMap::default();
        for EssentiaStack { aspect, amount } in snapshot {
            let total = incoming.entry(aspect).or_insert(0);
            *total = total.saturating_add(amount);
        }
        incoming.retain(|_, amount| *amount > 0);

        let previous = std::mem::replace(&mut self.table, incoming);
        if !track_changes {
            return Vec::new();
        }

        let mut changes = Vec::new();
        for (aspect, &amount) in &self.table {
            let old = previous.get(aspect).copied().unwrap_or(0);
            if amount != old {
                changes.push(EssentiaStack::new(aspect.clone(), amount - old));
            }
        }
        for (aspect, old) in previous {
            if !self.table.contains_key(&aspect) {
                changes.push(EssentiaStack::new(aspect, -old));
            }
        }

        changes
    }

    /// Stored amount of `aspect`, 0 if absent
    #[must_use]
    pub fn get(&self, aspect: &A) -> i64 {
        self.table.get(aspect).copied().unwrap_or(0)
    }

    /// Live read-only view over the stored stacks. Iteration order is unspecified.
    pub fn iter(&self) -> impl Iterator<Item = EssentiaStack<A>> + '_ {
        self.table
            .iter()
            .map(|(aspect, &amount)| EssentiaStack::new(aspect.clone(), amount))
    }

    /// Owned copy of every stored stack
    #[must_use]
    pub fn to_vec(&self) -> Vec<EssentiaStack<A>> {
        self.iter().collect()
    }

    /// Number of stored aspects
    #[must_use]
    pub fn len(&self) -> usize {
        self.table.len()
    }

    /// Whether nothing is stored
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.table.is_empty()
    }

    /// Sum of all stored amounts
    #[must_use]
    pub fn total(&self) -> i64 {
        self.table.values().fold(0i64, |acc, v| acc.saturating_add(*v))
    }
}

impl<A: Category> Default for QuantityCache<A> {
    fn default() -> Self {
        Self::new()
    }
}
