//! Dirty/clean tracking for the grid cache.
//!
//! ```text
//!            ready / join / list-updated
//!   ┌───────┐ ─────────────────────────► ┌───────┐
//!   │ CLEAN │                            │ DIRTY │  (initial)
//!   └───────┘ ◄───────────────────────── └───────┘
//!              successful resync
//! ```
//!
//! A split never changes state. While DIRTY, a resync runs on a direct read,
//! or on a tick only if someone is listening. Incremental store pushes are
//! accepted only while CLEAN.

/// Whether the cache is authoritative.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum CacheState {
    /// The cache matches the backing store as of the last resync
    Clean,
    /// The cache must be rebuilt before it can be trusted
    #[default]
    Dirty,
}

/// Topology events delivered to the grid.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum GridEvent {
    /// The grid finished constructing its caches
    CacheReady,
    /// Storage joined (or two grids merged)
    StorageJoined,
    /// Storage split away from the grid
    StorageSplit,
    /// The backing store's storage list changed wholesale
    ListUpdated,
}

/// What is asking for an up-to-date cache.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FreshnessTrigger {
    /// A caller reading amounts; always resyncs when dirty
    Read,
    /// The periodic tick; resyncs when dirty only if receivers exist
    Tick,
}

/// The two-state machine deciding when a full resync is due.
#[derive(Debug, Clone, Default)]
pub struct InvalidationController {
    state: CacheState,
}

impl InvalidationController {
    /// Create a controller in the [`CacheState::Dirty`] state
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Current state
    #[must_use]
    pub fn state(&self) -> CacheState {
        self.state
    }

    /// Whether a resync is outstanding
    #[must_use]
    pub fn is_dirty(&self) -> bool {
        self.state == CacheState::Dirty
    }

    /// Apply a topology event. Returns `true` if the state changed.
    pub fn on_event(&mut self, event: GridEvent) -> bool {
        match event {
            GridEvent::CacheReady | GridEvent::StorageJoined | GridEvent::ListUpdated => {
                let changed = self.state == CacheState::Clean;
                self.state = CacheState::Dirty;
                changed
            }
            GridEvent::StorageSplit => false,
        }
    }

    /// Whether `trigger` should run a resync now.
    #[must_use]
    pub fn needs_resync(&self, trigger: FreshnessTrigger, receiver_count: usize) -> bool {
        if !self.is_dirty() {
            return false;
        }
        match trigger {
            FreshnessTrigger::Read => true,
            FreshnessTrigger::Tick => receiver_count > 0,
        }
    }

    /// Whether incremental store pushes may be applied.
    ///
    /// While dirty they are relative to an unknown baseline and are dropped;
    /// the next resync recomputes the absolute state instead.
    #[must_use]
    pub fn accepts_incremental(&self) -> bool {
        self.state == CacheState::Clean
    }

    /// Record a completed resync
    pub fn mark_clean(&mut self) {
        self.state = CacheState::Clean;
    }
}
