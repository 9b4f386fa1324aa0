//! # Essentia Core
//!
//! Network-wide essentia cache for a grid whose actual storage lives in an
//! external fluid store. The cache mirrors the store in essentia units,
//! fans per-aspect deltas out to registered receivers, and gates every
//! transfer behind a power budget using a simulate-then-commit protocol.
//!
//! This crate provides:
//! - **Cache**: aspect → amount table with clamped point mutation and diffing resync
//! - **Notifier**: receiver registry with capability tokens and lazy eviction
//! - **Invalidation**: dirty/clean state machine driving deferred resyncs
//! - **Gateway**: power-gated extract/inject with unit-rounding reconciliation
//! - **Grid**: the per-network facade tying the pieces together
//!
//! ## Architecture
//!
//! ```text
//!  topology events ──► InvalidationController ──► resync ──┐
//!  periodic tick  ──►        (DIRTY/CLEAN)                 │
//!                                                          ▼
//!  store push ─────────────────────────────► QuantityCache ──► ChangeNotifier ──► receivers
//!       ▲                                                          (token check)
//!       │
//!  TransferGateway ──► FluidStore (simulate / commit)
//!        └───────────► PowerSource (simulate / commit)
//! ```
//!
//! ## Example
//!
//! ```rust,ignore
//! use essentia_core::{GridConfig, GridEssentiaCache, TransferMode, ActionSource};
//!
//! let grid = GridEssentiaCache::builder(token)
//!     .config(GridConfig::default())
//!     .store(store)
//!     .power(power)
//!     .registry(registry)
//!     .build()?;
//! grid.on_grid_ready();
//!
//! let taken = grid.extract(&ignis, 10, TransferMode::Commit, &ActionSource::None);
//! ```

#![deny(missing_docs)]
#![deny(unsafe_code)]
#![warn(clippy::all, clippy::pedantic)]
#![allow(clippy::module_name_repetitions)]

pub mod builder;
pub mod cache;
pub mod config;
pub mod convert;
pub mod error;
pub mod gateway;
pub mod grid;
pub mod invalidation;
pub mod metrics;
pub mod notify;
pub mod store;
pub mod tick;
pub mod types;

// Re-export key types
pub use builder::GridEssentiaCacheBuilder;
pub use cache::QuantityCache;
pub use config::GridConfig;
pub use convert::{EssentiaRegistry, UnitConverter};
pub use error::{ConfigError, GridError};
pub use gateway::TransferGateway;
pub use grid::GridEssentiaCache;
pub use invalidation::{CacheState, FreshnessTrigger, GridEvent, InvalidationController};
pub use metrics::{CounterSnapshot, GridCounters};
pub use notify::{ChangeNotifier, DispatchOutcome, EssentiaReceiver};
pub use store::{
    FluidStore, InMemoryFluidStore, InMemoryPowerGrid, PowerSource, StaticRegistry,
    StoreListener,
};
pub use tick::{TickDriver, Tickable};
pub use types::{
    ActionSource, CapabilityToken, Category, ChangeBatch, EssentiaStack, NativeStack,
    TransferMode,
};

/// Result type for essentia-core operations
pub type Result<T> = std::result::Result<T, Error>;

/// Error types for essentia-core
#[derive(Debug, thiserror::Error)]
pub enum Error {
    /// Grid runtime errors
    #[error("Grid error: {0}")]
    Grid(#[from] GridError),

    /// Configuration errors
    #[error("Configuration error: {0}")]
    Config(#[from] ConfigError),
}
