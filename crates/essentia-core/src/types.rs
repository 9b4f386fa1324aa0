//! Value types shared by the cache, notifier and transfer gateway.

use std::fmt;
use std::hash::Hash;
use std::sync::Arc;

/// Identity of a resource kind (an aspect) or of its store-side gas.
///
/// Supplied by the host and compared by equality only. Blanket-implemented
/// for every type that meets the bounds.
pub trait Category: Clone + Eq + Hash + fmt::Debug + Send + Sync + 'static {}

impl<T> Category for T where T: Clone + Eq + Hash + fmt::Debug + Send + Sync + 'static {}

/// An amount of one aspect, in essentia units.
///
/// Inside the cache the amount is always positive. As a change payload it
/// is a signed, non-zero delta.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct EssentiaStack<A> {
    /// The aspect
    pub aspect: A,
    /// Amount in essentia units
    pub amount: i64,
}

impl<A> EssentiaStack<A> {
    /// Create a new stack
    #[must_use]
    pub fn new(aspect: A, amount: i64) -> Self {
        Self { aspect, amount }
    }
}

impl<A: fmt::Debug> fmt::Display for EssentiaStack<A> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{:?} x{}", self.aspect, self.amount)
    }
}

/// An amount of a store-side gas, in native (store) units.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct NativeStack<G> {
    /// The gas representing an aspect in the backing store
    pub gas: G,
    /// Amount in native units
    pub amount: i64,
}

impl<G> NativeStack<G> {
    /// Create a new native stack
    #[must_use]
    pub fn new(gas: G, amount: i64) -> Self {
        Self { gas, amount }
    }
}

/// Immutable batch of per-aspect deltas handed to every receiver.
pub type ChangeBatch<A> = Arc<[EssentiaStack<A>]>;

/// Dry-run versus state-mutating flag threaded through every transfer.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum TransferMode {
    /// Report what would happen without mutating anything
    Simulate,
    /// Perform the transfer
    Commit,
}

impl TransferMode {
    /// Returns `true` for [`TransferMode::Commit`]
    #[must_use]
    pub fn is_commit(self) -> bool {
        self == Self::Commit
    }
}

impl fmt::Display for TransferMode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Simulate => write!(f, "simulate"),
            Self::Commit => write!(f, "commit"),
        }
    }
}

/// Who asked for a transfer. Forwarded to the backing store untouched.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Default)]
pub enum ActionSource {
    /// No attributable source
    #[default]
    None,
    /// A machine on the grid, by host-assigned id
    Machine(u64),
    /// A player, by name
    Player(String),
}

/// Opaque value proving a receiver's continued right to notifications.
///
/// Typically the identity of the grid that issued it. The notifier never
/// interprets it; receivers re-validate it on every dispatch.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct CapabilityToken(u64);

impl CapabilityToken {
    /// Create a token from a raw identity
    #[must_use]
    pub const fn new(raw: u64) -> Self {
        Self(raw)
    }

    /// The raw identity
    #[must_use]
    pub const fn raw(self) -> u64 {
        self.0
    }
}

impl fmt::Display for CapabilityToken {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "grid-{}", self.0)
    }
}
