//! Per-network essentia cache facade.
//!
//! One [`GridEssentiaCache`] exists per grid. It owns the cache table, the
//! invalidation state, the receiver registry and the transfer gateway, and
//! is driven by four kinds of input:
//!
//! - **Reads** ([`amount`](GridEssentiaCache::amount),
//!   [`essentia_list`](GridEssentiaCache::essentia_list)) resync first when dirty.
//! - **Topology events** mark the cache dirty.
//! - **Store pushes** ([`StoreListener::post_change`]) apply incremental
//!   deltas while clean and are dropped while dirty.
//! - **Ticks** resync a dirty cache, but only when someone is listening.
//!
//! # Locking
//!
//! The cache table and the invalidation state share one [`Mutex`], held for
//! the whole of a resync or a push batch. The receiver registry is only
//! locked after it (never before), and receivers are called once the state
//! lock is released, so a receiver may read the grid from inside
//! [`EssentiaReceiver::post_change`].
//!
//! Batches produced by concurrent updates may reach a receiver in either
//! order. Each batch is computed against one consistent table and deltas are
//! additive, so a receiver summing them always converges on the table.

use std::panic::AssertUnwindSafe;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Weak};

use parking_lot::Mutex;

use crate::builder::GridEssentiaCacheBuilder;
use crate::cache::QuantityCache;
use crate::config::GridConfig;
use crate::convert::{EssentiaRegistry, UnitConverter};
use crate::error::GridError;
use crate::gateway::TransferGateway;
use crate::invalidation::{CacheState, FreshnessTrigger, GridEvent, InvalidationController};
use crate::metrics::GridCounters;
use crate::notify::{ChangeNotifier, EssentiaReceiver};
use crate::store::{FluidStore, PowerSource, StoreListener};
use crate::types::{
    ActionSource, CapabilityToken, Category, EssentiaStack, NativeStack, TransferMode,
};

/// Cache table plus invalidation state, always locked together.
struct GridState<A: Category> {
    cache: QuantityCache<A>,
    invalidation: InvalidationController,
}

/// Network-wide essentia cache for one grid.
///
/// Construct with [`GridEssentiaCache::builder`], then call
/// [`on_grid_ready`](Self::on_grid_ready) once the grid is assembled.
pub struct GridEssentiaCache<A: Category, G: Category> {
    token: CapabilityToken,
    config: GridConfig,
    state: Mutex<GridState<A>>,
    notifier: ChangeNotifier<A>,
    gateway: TransferGateway<A, G>,
    store: Arc<dyn FluidStore<G>>,
    registry: Arc<dyn EssentiaRegistry<A, G>>,
    converter: UnitConverter,
    store_listener_registered: AtomicBool,
    counters: GridCounters,
}

impl<A: Category, G: Category> GridEssentiaCache<A, G> {
    /// Start building a grid cache identified by `token`.
    #[must_use]
    pub fn builder(token: CapabilityToken) -> GridEssentiaCacheBuilder<A, G> {
        GridEssentiaCacheBuilder::new(token)
    }

    pub(crate) fn from_parts(
        token: CapabilityToken,
        config: GridConfig,
        converter: UnitConverter,
        store: Arc<dyn FluidStore<G>>,
        power: Arc<dyn PowerSource>,
        registry: Arc<dyn EssentiaRegistry<A, G>>,
    ) -> Self {
        let gateway = TransferGateway::new(
            Arc::clone(&store),
            power,
            Arc::clone(&registry),
            converter,
            config.power_per_essentia,
        );
        Self {
            token,
            config,
            state: Mutex::new(GridState {
                cache: QuantityCache::new(),
                invalidation: InvalidationController::new(),
            }),
            notifier: ChangeNotifier::new(),
            gateway,
            store,
            registry,
            converter,
            store_listener_registered: AtomicBool::new(false),
            counters: GridCounters::new(),
        }
    }

    // -----------------------------------------------------------------------
    // Identity and introspection
    // -----------------------------------------------------------------------

    /// The grid's own capability token.
    #[must_use]
    pub fn token(&self) -> CapabilityToken {
        self.token
    }

    /// Whether `token` is this grid's token.
    #[must_use]
    pub fn is_valid(&self, token: &CapabilityToken) -> bool {
        *token == self.token
    }

    /// The configuration this grid was built with.
    #[must_use]
    pub fn config(&self) -> &GridConfig {
        &self.config
    }

    /// Observability counters.
    #[must_use]
    pub fn counters(&self) -> &GridCounters {
        &self.counters
    }

    /// Current invalidation state, without resyncing.
    #[must_use]
    pub fn cache_state(&self) -> CacheState {
        self.state.lock().invalidation.state()
    }

    /// Number of registered receivers.
    #[must_use]
    pub fn listener_count(&self) -> usize {
        self.notifier.len()
    }

    // -----------------------------------------------------------------------
    // Reads
    // -----------------------------------------------------------------------

    /// Amount of `aspect` on the grid, resyncing first if the cache is dirty.
    ///
    /// If the store cannot produce a listing, the last known amount is
    /// returned.
    pub fn amount(&self, aspect: &A) -> i64 {
        let (amount, changes) = {
            let mut state = self.state.lock();
            let changes = self.fresh_or_stale(&mut state, FreshnessTrigger::Read);
            (state.cache.get(aspect), changes)
        };
        self.publish(changes);
        amount
    }

    /// Every stored aspect and amount, resyncing first if the cache is dirty.
    ///
    /// The result is a copy; order is unspecified.
    pub fn essentia_list(&self) -> Vec<EssentiaStack<A>> {
        let (list, changes) = {
            let mut state = self.state.lock();
            let changes = self.fresh_or_stale(&mut state, FreshnessTrigger::Read);
            (state.cache.to_vec(), changes)
        };
        self.publish(changes);
        list
    }

    // -----------------------------------------------------------------------
    // Receivers
    // -----------------------------------------------------------------------

    /// Register `receiver` under `token`.
    ///
    /// The first receiver registered on a dirty cache forces a resync before
    /// it is recorded, so its first batch is relative to a correct baseline.
    pub fn add_listener(&self, receiver: Arc<dyn EssentiaReceiver<A>>, token: CapabilityToken) {
        let mut state = self.state.lock();
        if self.notifier.is_empty() && state.invalidation.is_dirty() {
            // No receivers yet, so this resync produces no deltas.
            if let Err(err) = self.resync_locked(&mut state) {
                tracing::debug!(error = %err, "resync before first listener failed");
            }
        }
        self.notifier.subscribe(receiver, token);
    }

    /// Remove `receiver`. Returns `true` if it was registered.
    pub fn remove_listener(&self, receiver: &Arc<dyn EssentiaReceiver<A>>) -> bool {
        self.notifier.unsubscribe(receiver)
    }

    // -----------------------------------------------------------------------
    // Transfers
    // -----------------------------------------------------------------------

    /// Take up to `amount` essentia of `aspect` out of the grid.
    ///
    /// See [`TransferGateway::extract`].
    pub fn extract(
        &self,
        aspect: &A,
        amount: i64,
        mode: TransferMode,
        source: &ActionSource,
    ) -> i64 {
        let extracted = self.gateway.extract(aspect, amount, mode, source);
        if mode.is_commit() && extracted > 0 {
            GridCounters::bump(&self.counters.extracts_committed);
        }
        extracted
    }

    /// Store `amount` essentia of `aspect` in the grid, returning what was
    /// rejected.
    ///
    /// See [`TransferGateway::inject`].
    pub fn inject(
        &self,
        aspect: &A,
        amount: i64,
        mode: TransferMode,
        source: &ActionSource,
    ) -> i64 {
        let rejected = self.gateway.inject(aspect, amount, mode, source);
        if mode.is_commit() && rejected < amount {
            GridCounters::bump(&self.counters.injects_committed);
        }
        rejected
    }

    // -----------------------------------------------------------------------
    // Topology events
    // -----------------------------------------------------------------------

    /// The grid finished assembling.
    ///
    /// Registers this cache for pushed store changes (once) and marks it
    /// dirty.
    pub fn on_grid_ready(self: &Arc<Self>) {
        if !self.store_listener_registered.swap(true, Ordering::AcqRel) {
            let weak: Weak<Self> = Arc::downgrade(self);
            let listener: Weak<dyn StoreListener<G>> = weak;
            self.store.add_listener(listener);
        }
        self.handle_event(GridEvent::CacheReady);
    }

    /// Storage joined the grid, or two grids merged.
    pub fn on_join(&self) {
        self.handle_event(GridEvent::StorageJoined);
    }

    /// Storage split away from the grid. Does not invalidate the cache.
    pub fn on_split(&self) {
        self.handle_event(GridEvent::StorageSplit);
    }

    /// The store's storage list changed wholesale.
    pub fn on_list_update(&self) {
        self.handle_event(GridEvent::ListUpdated);
    }

    /// Apply a topology event to the invalidation state.
    pub fn handle_event(&self, event: GridEvent) {
        let changed = self.state.lock().invalidation.on_event(event);
        if changed {
            tracing::debug!(?event, token = %self.token, "grid cache invalidated");
        }
    }

    // -----------------------------------------------------------------------
    // Tick
    // -----------------------------------------------------------------------

    /// Run one periodic tick, resyncing if dirty and someone is listening.
    ///
    /// # Errors
    ///
    /// Returns [`GridError::StoreUnavailable`] if a resync was due but the
    /// store produced no listing.
    pub fn try_update_tick(&self) -> Result<(), GridError> {
        let changes = {
            let mut state = self.state.lock();
            self.ensure_fresh(&mut state, FreshnessTrigger::Tick)?
        };
        self.publish(changes);
        Ok(())
    }

    /// Run one periodic tick, discarding any failure.
    ///
    /// Errors and panics from collaborators are logged and counted; nothing
    /// reaches the caller.
    pub fn on_update_tick(&self) {
        GridCounters::bump(&self.counters.ticks);

        let result = match std::panic::catch_unwind(AssertUnwindSafe(|| self.try_update_tick())) {
            Ok(result) => result,
            Err(payload) => Err(GridError::CollaboratorPanic(panic_message(&*payload))),
        };

        match result {
            Ok(()) => {}
            Err(GridError::StoreUnavailable) => {
                GridCounters::bump(&self.counters.tick_failures);
                tracing::debug!(token = %self.token, "tick resync deferred: store unavailable");
            }
            Err(err @ GridError::CollaboratorPanic(_)) => {
                GridCounters::bump(&self.counters.tick_failures);
                tracing::error!(token = %self.token, error = %err, "tick resync panicked");
            }
        }
    }

    // -----------------------------------------------------------------------
    // Internals
    // -----------------------------------------------------------------------

    fn ensure_fresh(
        &self,
        state: &mut GridState<A>,
        trigger: FreshnessTrigger,
    ) -> Result<Vec<EssentiaStack<A>>, GridError> {
        if !state
            .invalidation
            .needs_resync(trigger, self.notifier.len())
        {
            return Ok(Vec::new());
        }
        self.resync_locked(state)
    }

    fn fresh_or_stale(
        &self,
        state: &mut GridState<A>,
        trigger: FreshnessTrigger,
    ) -> Vec<EssentiaStack<A>> {
        self.ensure_fresh(state, trigger).unwrap_or_else(|err| {
            tracing::debug!(error = %err, "serving stale essentia cache");
            Vec::new()
        })
    }

    /// Rebuild the table from the store's listing. Must be called with the
    /// state lock held; the returned deltas are published by the caller after
    /// releasing it.
    fn resync_locked(&self, state: &mut GridState<A>) -> Result<Vec<EssentiaStack<A>>, GridError> {
        let Some(listing) = self.store.storage_list() else {
            GridCounters::bump(&self.counters.resyncs_unavailable);
            return Err(GridError::StoreUnavailable);
        };

        let snapshot: Vec<EssentiaStack<A>> = listing
            .iter()
            .filter_map(|stack| {
                self.converter
                    .to_essentia_stack(self.registry.as_ref(), stack)
            })
            .collect();

        let track_changes = !self.notifier.is_empty();
        let changes = state.cache.resync_from(snapshot, track_changes);
        state.invalidation.mark_clean();

        GridCounters::bump(&self.counters.resyncs);
        tracing::debug!(
            token = %self.token,
            aspects = state.cache.len(),
            total = state.cache.total(),
            changed = changes.len(),
            "essentia cache resynced"
        );
        Ok(changes)
    }

    fn publish(&self, changes: Vec<EssentiaStack<A>>) {
        if changes.is_empty() {
            return;
        }
        let outcome = self.notifier.dispatch(changes);
        if outcome.delivered + outcome.panicked > 0 {
            GridCounters::bump(&self.counters.batches_dispatched);
        }
        if outcome.evicted > 0 {
            GridCounters::add(&self.counters.receivers_evicted, outcome.evicted as u64);
        }
        if outcome.panicked > 0 {
            GridCounters::add(&self.counters.receivers_panicked, outcome.panicked as u64);
        }
    }
}

impl<A: Category, G: Category> StoreListener<G> for GridEssentiaCache<A, G> {
    fn post_change(&self, changes: &[NativeStack<G>], source: &ActionSource) {
        let applied = {
            let mut state = self.state.lock();
            if !state.invalidation.accepts_incremental() {
                GridCounters::bump(&self.counters.incremental_dropped);
                tracing::debug!(
                    token = %self.token,
                    changes = changes.len(),
                    "dropping store push while cache is dirty"
                );
                return;
            }

            let deltas = changes.iter().filter_map(|stack| {
                self.converter
                    .to_essentia_stack(self.registry.as_ref(), stack)
            });
            let applied = state.cache.apply_deltas(deltas);
            GridCounters::bump(&self.counters.incremental_applied);
            applied
        };

        if !applied.is_empty() {
            tracing::trace!(?source, changed = applied.len(), "applied store push");
        }
        if !self.notifier.is_empty() {
            self.publish(applied);
        }
    }
}

impl<A: Category, G: Category> crate::tick::Tickable for GridEssentiaCache<A, G> {
    fn on_update_tick(&self) {
        GridEssentiaCache::on_update_tick(self);
    }
}

fn panic_message(payload: &(dyn std::any::Any + Send)) -> String {
    if let Some(msg) = payload.downcast_ref::<&str>() {
        (*msg).to_string()
    } else if let Some(msg) = payload.downcast_ref::<String>() {
        msg.clone()
    } else {
        "unknown panic".to_string()
    }
}
