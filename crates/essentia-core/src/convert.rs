//! Conversion between essentia units and the backing store's native units.
//!
//! The ratio is a fixed positive integer. Essentia → native multiplies and
//! is exact; native → essentia divides and truncates toward zero, so any
//! native remainder below one essentia is dropped.

use crate::error::ConfigError;
use crate::types::{EssentiaStack, NativeStack};

/// Maps aspects to the gas that stands in for them in the backing store.
///
/// Gases that are not essentia (any other fluid in the store) map to `None`
/// and are ignored by the cache.
pub trait EssentiaRegistry<A, G>: Send + Sync {
    /// The gas registered for `aspect`, if any
    fn gas_for(&self, aspect: &A) -> Option<G>;

    /// The aspect carried by `gas`, if it is an essentia gas
    fn aspect_of(&self, gas: &G) -> Option<A>;
}

/// Fixed-ratio converter between essentia and native units.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct UnitConverter {
    ratio: i64,
}

impl UnitConverter {
    /// Native units per essentia when nothing else is configured.
    pub const DEFAULT_RATIO: u32 = 250;

    /// Create a converter with `ratio` native units per essentia.
    ///
    /// # Errors
    ///
    /// Returns [`ConfigError::Invalid`] if `ratio` is zero.
    pub fn new(ratio: u32) -> Result<Self, ConfigError> {
        if ratio == 0 {
            return Err(ConfigError::Invalid(
                "conversion_ratio must be >= 1".to_string(),
            ));
        }
        Ok(Self {
            ratio: i64::from(ratio),
        })
    }

    /// Native units per essentia
    #[must_use]
    #[allow(clippy::cast_possible_truncation, clippy::cast_sign_loss)]
    pub fn ratio(&self) -> u32 {
        self.ratio as u32
    }

    /// Essentia amount → native amount. Saturates instead of overflowing.
    #[must_use]
    pub fn to_native(&self, essentia: i64) -> i64 {
        essentia.saturating_mul(self.ratio)
    }

    /// Native amount → essentia amount, truncating toward zero.
    #[must_use]
    pub fn to_essentia(&self, native: i64) -> i64 {
        native / self.ratio
    }

    /// Convert a store-side stack into an essentia stack.
    ///
    /// Returns `None` when the gas is not an essentia gas.
    pub fn to_essentia_stack<A, G>(
        &self,
        registry: &dyn EssentiaRegistry<A, G>,
        stack: &NativeStack<G>,
    ) -> Option<EssentiaStack<A>> {
        registry
            .aspect_of(&stack.gas)
            .map(|aspect| EssentiaStack::new(aspect, self.to_essentia(stack.amount)))
    }

    /// Build a store-side request for `essentia` units of `gas`.
    #[must_use]
    pub fn to_native_stack<G>(&self, gas: G, essentia: i64) -> NativeStack<G> {
        NativeStack::new(gas, self.to_native(essentia))
    }
}

impl Default for UnitConverter {
    fn default() -> Self {
        Self {
            ratio: i64::from(Self::DEFAULT_RATIO),
        }
    }
}
