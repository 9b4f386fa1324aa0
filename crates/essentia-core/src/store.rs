//! Collaborator contracts consumed by the grid, plus in-memory implementations.
//!
//! The grid never owns the backing store or the power source. It only talks
//! to them through [`FluidStore`] and [`PowerSource`], always using their own
//! simulate/commit primitives, and learns about store changes through a
//! [`StoreListener`] registration.
//!
//! The in-memory types are complete collaborators used by tests, benches
//! and the standalone server.

use std::sync::{Arc, Weak};

use fxhash::FxHashMap;
use parking_lot::Mutex;

use crate::convert::EssentiaRegistry;
use crate::types::{ActionSource, Category, NativeStack, TransferMode};

// ---------------------------------------------------------------------------
// Contracts
// ---------------------------------------------------------------------------

/// Receives incremental change batches pushed by a [`FluidStore`].
pub trait StoreListener<G>: Send + Sync {
    /// Called after the store committed `changes` (signed native deltas).
    fn post_change(&self, changes: &[NativeStack<G>], source: &ActionSource);
}

/// The unit-based store that actually holds the gases.
pub trait FluidStore<G>: Send + Sync {
    /// Absolute amount of every stored gas, or `None` when the store cannot
    /// produce a listing right now.
    fn storage_list(&self) -> Option<Vec<NativeStack<G>>>;

    /// Take up to `amount` native units of `gas`. Returns what was (or in
    /// [`TransferMode::Simulate`], would be) taken.
    fn extract(&self, gas: &G, amount: i64, mode: TransferMode, source: &ActionSource) -> i64;

    /// Store `amount` native units of `gas`. Returns what was (or would be)
    /// rejected.
    fn inject(&self, gas: &G, amount: i64, mode: TransferMode, source: &ActionSource) -> i64;

    /// Register for pushed change batches. The store holds the listener weakly.
    fn add_listener(&self, listener: Weak<dyn StoreListener<G>>);
}

/// Power budget charged for every committed transfer.
pub trait PowerSource: Send + Sync {
    /// Draw up to `amount`. Returns what was (or would be) granted.
    /// [`TransferMode::Simulate`] never changes the balance.
    fn extract_power(&self, amount: f64, mode: TransferMode) -> f64;
}

// ---------------------------------------------------------------------------
// StaticRegistry
// ---------------------------------------------------------------------------

/// Fixed bidirectional aspect ↔ gas table.
#[derive(Debug, Clone)]
pub struct StaticRegistry<A: Category, G: Category> {
    gases: FxHashMap<A, G>,
    aspects: FxHashMap<G, A>,
}

impl<A: Category, G: Category> StaticRegistry<A, G> {
    /// Create an empty registry
    #[must_use]
    pub fn new() -> Self {
        Self {
            gases: FxHashMap::default(),
            aspects: FxHashMap::default(),
        }
    }

    /// Register `gas` as the store-side form of `aspect`
    #[must_use]
    pub fn with(mut self, aspect: A, gas: G) -> Self {
        self.register(aspect, gas);
        self
    }

    /// Register `gas` as the store-side form of `aspect`
    pub fn register(&mut self, aspect: A, gas: G) {
        self.gases.insert(aspect.clone(), gas.clone());
        self.aspects.insert(gas, aspect);
    }

    /// Number of registered aspects
    #[must_use]
    pub fn len(&self) -> usize {
        self.gases.len()
    }

    /// Whether nothing is registered
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.gases.is_empty()
    }
}

impl<A: Category, G: Category> Default for StaticRegistry<A, G> {
    fn default() -> Self {
        Self::new()
    }
}

impl<A: Category, G: Category> EssentiaRegistry<A, G> for StaticRegistry<A, G> {
    fn gas_for(&self, aspect: &A) -> Option<G> {
        self.gases.get(aspect).cloned()
    }

    fn aspect_of(&self, gas: &G) -> Option<A> {
        self.aspects.get(gas).cloned()
    }
}

// ---------------------------------------------------------------------------
// InMemoryFluidStore
// ---------------------------------------------------------------------------

#[derive(Debug)]
struct StoreInner<G> {
    amounts: FxHashMap<G, i64>,
    available: bool,
}

/// In-memory [`FluidStore`] with per-gas capacity and storage granularity.
///
/// Injections are truncated to a multiple of `granularity` native units,
/// mimicking stores that cannot hold partial cells. Listeners are notified
/// after the store's own lock is released.
pub struct InMemoryFluidStore<G: Category> {
    inner: Mutex<StoreInner<G>>,
    listeners: Mutex<Vec<Weak<dyn StoreListener<G>>>>,
    capacity_per_gas: i64,
    granularity: i64,
}

impl<G: Category> InMemoryFluidStore<G> {
    /// Create an empty store with unbounded capacity and unit granularity
    #[must_use]
    pub fn new() -> Self {
        Self {
            inner: Mutex::new(StoreInner {
                amounts: FxHashMap::default(),
                available: true,
            }),
            listeners: Mutex::new(Vec::new()),
            capacity_per_gas: i64::MAX,
            granularity: 1,
        }
    }

    /// Limit every gas to `capacity` native units
    #[must_use]
    pub fn with_capacity(mut self, capacity: i64) -> Self {
        self.capacity_per_gas = capacity.max(0);
        self
    }

    /// Only accept injections in multiples of `step` native units
    #[must_use]
    pub fn with_granularity(mut self, step: i64) -> Self {
        self.granularity = step.max(1);
        self
    }

    /// Add `amount` native units of `gas` (negative drains) and notify
    /// listeners of the change actually applied.
    ///
    /// The stored amount never drops below zero, so a drain larger than the
    /// stock reports only the stock removed.
    pub fn fill(&self, gas: G, amount: i64) {
        let change = {
            let mut inner = self.inner.lock();
            let old = inner.amounts.get(&gas).copied().unwrap_or(0);
            let new = old.saturating_add(amount).max(0);
            if new > 0 {
                inner.amounts.insert(gas.clone(), new);
            } else {
                inner.amounts.remove(&gas);
            }
            new - old
        };
        if change != 0 {
            self.notify(&[NativeStack::new(gas, change)], &ActionSource::None);
        }
    }

    /// Overwrite the amount of `gas` without notifying anyone.
    ///
    /// Models storage appearing or disappearing wholesale, which the host
    /// reports as a list update rather than as pushed deltas.
    pub fn set_silently(&self, gas: G, amount: i64) {
        let mut inner = self.inner.lock();
        if amount > 0 {
            inner.amounts.insert(gas, amount);
        } else {
            inner.amounts.remove(&gas);
        }
    }

    /// Make [`FluidStore::storage_list`] return `None` (or recover)
    pub fn set_available(&self, available: bool) {
        self.inner.lock().available = available;
    }

    /// Stored native amount of `gas`
    #[must_use]
    pub fn amount_of(&self, gas: &G) -> i64 {
        self.inner.lock().amounts.get(gas).copied().unwrap_or(0)
    }

    /// Number of live listeners
    #[must_use]
    pub fn listener_count(&self) -> usize {
        self.listeners
            .lock()
            .iter()
            .filter(|l| l.strong_count() > 0)
            .count()
    }

    fn notify(&self, changes: &[NativeStack<G>], source: &ActionSource) {
        let live: Vec<Arc<dyn StoreListener<G>>> = {
            let mut listeners = self.listeners.lock();
            listeners.retain(|l| l.strong_count() > 0);
            listeners.iter().filter_map(Weak::upgrade).collect()
        };
        for listener in live {
            listener.post_change(changes, source);
        }
    }
}

impl<G: Category> Default for InMemoryFluidStore<G> {
    fn default() -> Self {
        Self::new()
    }
}

impl<G: Category> FluidStore<G> for InMemoryFluidStore<G> {
    fn storage_list(&self) -> Option<Vec<NativeStack<G>>> {
        let inner = self.inner.lock();
        if !inner.available {
            return None;
        }
        Some(
            inner
                .amounts
                .iter()
                .map(|(gas, &amount)| NativeStack::new(gas.clone(), amount))
                .collect(),
        )
    }

    fn extract(&self, gas: &G, amount: i64, mode: TransferMode, source: &ActionSource) -> i64 {
        if amount <= 0 {
            return 0;
        }
        let taken = {
            let mut inner = self.inner.lock();
            let stored = inner.amounts.get(gas).copied().unwrap_or(0);
            let taken = amount.min(stored);
            if mode.is_commit() && taken > 0 {
                if stored - taken > 0 {
                    inner.amounts.insert(gas.clone(), stored - taken);
                } else {
                    inner.amounts.remove(gas);
                }
            }
            taken
        };

        if mode.is_commit() && taken > 0 {
            self.notify(&[NativeStack::new(gas.clone(), -taken)], source);
        }
        taken
    }

    fn inject(&self, gas: &G, amount: i64, mode: TransferMode, source: &ActionSource) -> i64 {
        if amount <= 0 {
            return 0;
        }
        let accepted = {
            let mut inner = self.inner.lock();
            let stored = inner.amounts.get(gas).copied().unwrap_or(0);
            let room = self.capacity_per_gas.saturating_sub(stored).max(0);
            let fits = amount.min(room);
            let accepted = fits - fits % self.granularity;
            if mode.is_commit() && accepted > 0 {
                inner.amounts.insert(gas.clone(), stored + accepted);
            }
            accepted
        };

        if mode.is_commit() && accepted > 0 {
            self.notify(&[NativeStack::new(gas.clone(), accepted)], source);
        }
        amount - accepted
    }

    fn add_listener(&self, listener: Weak<dyn StoreListener<G>>) {
        self.listeners.lock().push(listener);
    }
}

// ---------------------------------------------------------------------------
// InMemoryPowerGrid
// ---------------------------------------------------------------------------

/// In-memory [`PowerSource`] holding a single balance.
#[derive(Debug)]
pub struct InMemoryPowerGrid {
    balance: Mutex<f64>,
}

impl InMemoryPowerGrid {
    /// Create a power grid holding `balance`
    #[must_use]
    pub fn new(balance: f64) -> Self {
        Self {
            balance: Mutex::new(balance.max(0.0)),
        }
    }

    /// Current balance
    #[must_use]
    pub fn balance(&self) -> f64 {
        *self.balance.lock()
    }
}

impl PowerSource for InMemoryPowerGrid {
    fn extract_power(&self, amount: f64, mode: TransferMode) -> f64 {
        if amount <= 0.0 || !amount.is_finite() {
            return 0.0;
        }
        let mut balance = self.balance.lock();
        let granted = amount.min(*balance);
        if mode.is_commit() {
            *balance -= granted;
        }
        granted
    }
}
