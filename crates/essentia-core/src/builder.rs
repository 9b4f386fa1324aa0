//! Fluent builder for [`GridEssentiaCache`] construction.

use std::sync::Arc;

use crate::config::GridConfig;
use crate::convert::EssentiaRegistry;
use crate::error::ConfigError;
use crate::grid::GridEssentiaCache;
use crate::store::{FluidStore, PowerSource};
use crate::types::{CapabilityToken, Category};

/// Fluent builder for constructing a [`GridEssentiaCache`].
///
/// # Example
///
/// ```rust,ignore
/// let grid = GridEssentiaCache::builder(token)
///     .config(GridConfig::default().with_conversion_ratio(10))
///     .store(store)
///     .power(power)
///     .registry(registry)
///     .build()?;
/// ```
pub struct GridEssentiaCacheBuilder<A: Category, G: Category> {
    token: CapabilityToken,
    config: GridConfig,
    store: Option<Arc<dyn FluidStore<G>>>,
    power: Option<Arc<dyn PowerSource>>,
    registry: Option<Arc<dyn EssentiaRegistry<A, G>>>,
}

impl<A: Category, G: Category> GridEssentiaCacheBuilder<A, G> {
    /// Create a builder for a grid identified by `token`, with default settings.
    #[must_use]
    pub fn new(token: CapabilityToken) -> Self {
        Self {
            token,
            config: GridConfig::default(),
            store: None,
            power: None,
            registry: None,
        }
    }

    /// Replace the whole configuration.
    #[must_use]
    pub fn config(mut self, config: GridConfig) -> Self {
        self.config = config;
        self
    }

    /// Set the native units per essentia.
    #[must_use]
    pub fn conversion_ratio(mut self, ratio: u32) -> Self {
        self.config.conversion_ratio = ratio;
        self
    }

    /// Set the power charged per essentia transferred.
    #[must_use]
    pub fn power_per_essentia(mut self, rate: f64) -> Self {
        self.config.power_per_essentia = rate;
        self
    }

    /// Set the backing store.
    #[must_use]
    pub fn store(mut self, store: Arc<dyn FluidStore<G>>) -> Self {
        self.store = Some(store);
        self
    }

    /// Set the power source.
    #[must_use]
    pub fn power(mut self, power: Arc<dyn PowerSource>) -> Self {
        self.power = Some(power);
        self
    }

    /// Set the aspect/gas registry.
    #[must_use]
    pub fn registry(mut self, registry: Arc<dyn EssentiaRegistry<A, G>>) -> Self {
        self.registry = Some(registry);
        self
    }

    /// Build the grid cache. It starts dirty.
    ///
    /// # Errors
    ///
    /// Returns [`ConfigError::Invalid`] if the configuration fails
    /// validation or a collaborator was not supplied.
    pub fn build(self) -> Result<Arc<GridEssentiaCache<A, G>>, ConfigError> {
        self.config.validate()?;
        let converter = self.config.converter()?;
        let store = self
            .store
            .ok_or_else(|| ConfigError::Invalid("a fluid store is required".to_string()))?;
        let power = self
            .power
            .ok_or_else(|| ConfigError::Invalid("a power source is required".to_string()))?;
        let registry = self
            .registry
            .ok_or_else(|| ConfigError::Invalid("an essentia registry is required".to_string()))?;

        Ok(Arc::new(GridEssentiaCache::from_parts(
            self.token,
            self.config,
            converter,
            store,
            power,
            registry,
        )))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::store::{InMemoryFluidStore, InMemoryPowerGrid, StaticRegistry};

    type Store = InMemoryFluidStore<&'static str>;
    type Registry = StaticRegistry<&'static str, &'static str>;

    fn builder() -> GridEssentiaCacheBuilder<&'static str, &'static str> {
        GridEssentiaCacheBuilder::new(CapabilityToken::new(1))
    }

    #[test]
    fn test_build_with_all_collaborators() {
        let grid = builder()
            .conversion_ratio(10)
            .power_per_essentia(0.5)
            .store(Arc::new(Store::new()))
            .power(Arc::new(InMemoryPowerGrid::new(1.0)))
            .registry(Arc::new(Registry::new()))
            .build()
            .unwrap();
        assert_eq!(grid.config().conversion_ratio, 10);
        assert!((grid.config().power_per_essentia - 0.5).abs() < f64::EPSILON);
    }

    #[test]
    fn test_missing_collaborator() {
        let result = builder()
            .store(Arc::new(Store::new()))
            .registry(Arc::new(Registry::new()))
            .build();
        assert!(matches!(result, Err(ConfigError::Invalid(msg)) if msg.contains("power")));
    }

    #[test]
    fn test_invalid_config_rejected() {
        let result = builder()
            .conversion_ratio(0)
            .store(Arc::new(Store::new()))
            .power(Arc::new(InMemoryPowerGrid::new(1.0)))
            .registry(Arc::new(Registry::new()))
            .build();
        assert!(matches!(result, Err(ConfigError::Invalid(_))));
    }
}
