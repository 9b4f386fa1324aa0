//! Power-gated two-phase transfers against the backing store.
//!
//! Every transfer checks affordability with a simulated power draw before the
//! store is touched, so an unaffordable commit never mutates the store. Power
//! is only debited after the store has committed.
//!
//! ```text
//!  extract:  power(sim) ─► store(mode) ─► power(commit, if COMMIT)
//!  inject:   store(sim) ─► power(sim) ─► store(commit) ─► power(commit)
//!                │                             │
//!                └─ rounding/capacity loss ────┴─ reconciled into the rejection
//! ```
//!
//! The cache is never read or written here. Committed store changes reach the
//! cache through the store's own push notifications.

use std::sync::Arc;

use crate::convert::{EssentiaRegistry, UnitConverter};
use crate::store::{FluidStore, PowerSource};
use crate::types::{ActionSource, Category, TransferMode};

/// Executes extract/inject requests in essentia units.
pub struct TransferGateway<A: Category, G: Category> {
    store: Arc<dyn FluidStore<G>>,
    power: Arc<dyn PowerSource>,
    registry: Arc<dyn EssentiaRegistry<A, G>>,
    converter: UnitConverter,
    power_per_essentia: f64,
}

impl<A: Category, G: Category> TransferGateway<A, G> {
    /// Create a gateway over the given collaborators.
    #[must_use]
    pub fn new(
        store: Arc<dyn FluidStore<G>>,
        power: Arc<dyn PowerSource>,
        registry: Arc<dyn EssentiaRegistry<A, G>>,
        converter: UnitConverter,
        power_per_essentia: f64,
    ) -> Self {
        Self {
            store,
            power,
            registry,
            converter,
            power_per_essentia,
        }
    }

    /// Power charged for moving `amount` essentia.
    #[must_use]
    #[allow(clippy::cast_precision_loss)]
    pub fn power_cost(&self, amount: i64) -> f64 {
        self.power_per_essentia * amount as f64
    }

    fn can_afford(&self, cost: f64) -> bool {
        self.power.extract_power(cost, TransferMode::Simulate) >= cost
    }

    /// Take up to `amount` essentia of `aspect` out of the store.
    ///
    /// Returns the essentia actually (or, when simulating, hypothetically)
    /// extracted. Non-positive amounts, unregistered aspects and insufficient
    /// power all return 0 without touching the store or the power source.
    pub fn extract(
        &self,
        aspect: &A,
        amount: i64,
        mode: TransferMode,
        source: &ActionSource,
    ) -> i64 {
        if amount <= 0 {
            return 0;
        }
        let Some(gas) = self.registry.gas_for(aspect) else {
            tracing::trace!(?aspect, "extract for unregistered aspect");
            return 0;
        };

        let cost = self.power_cost(amount);
        if !self.can_afford(cost) {
            tracing::trace!(?aspect, amount, cost, "extract rejected: insufficient power");
            return 0;
        }

        let request = self.converter.to_native_stack(gas, amount);
        let received = self
            .store
            .extract(&request.gas, request.amount, mode, source);
        if received <= 0 {
            return 0;
        }

        if mode.is_commit() {
            self.power.extract_power(cost, TransferMode::Commit);
        }

        let extracted = self.converter.to_essentia(received);
        tracing::trace!(?aspect, requested = amount, extracted, %mode, "extract");
        extracted
    }

    /// Store `amount` essentia of `aspect`.
    ///
    /// Returns what could not be stored. Invalid input returns the full
    /// `amount`.
    ///
    /// Power gating is all-or-nothing: if the power source cannot cover the
    /// portion the store would accept, the whole request is rejected, even
    /// though [`extract`](Self::extract) draws power only for what it moves.
    ///
    /// A commit returns only the rejection of the committed injection, which
    /// covers the portion the simulated injection said would fit. Whatever
    /// the simulation already rejected for capacity is not included, so a
    /// commit under-reports store-capacity rejection; compare the result with
    /// a [`TransferMode::Simulate`] call to recover it.
    pub fn inject(
        &self,
        aspect: &A,
        amount: i64,
        mode: TransferMode,
        source: &ActionSource,
    ) -> i64 {
        if amount <= 0 {
            return amount;
        }
        let Some(gas) = self.registry.gas_for(aspect) else {
            tracing::trace!(?aspect, "inject for unregistered aspect");
            return amount;
        };

        let simulated_rejection =
            self.inject_into_store(gas.clone(), amount, TransferMode::Simulate, source);
        let adjusted = amount - simulated_rejection;
        if adjusted <= 0 {
            return amount;
        }

        if !self.can_afford(self.power_cost(adjusted)) {
            tracing::trace!(?aspect, amount, adjusted, "inject rejected: insufficient power");
            return amount;
        }

        if !mode.is_commit() {
            return simulated_rejection;
        }

        let commit_rejection =
            self.inject_into_store(gas, adjusted, TransferMode::Commit, source);
        let landed = adjusted - commit_rejection;
        if landed > 0 {
            self.power
                .extract_power(self.power_cost(landed), TransferMode::Commit);
        }

        tracing::trace!(
            ?aspect,
            requested = amount,
            landed,
            simulated_rejection,
            commit_rejection,
            "inject committed"
        );
        commit_rejection
    }

    /// Inject `amount` essentia as native units, returning the rejection in
    /// essentia units.
    ///
    /// A partial native rejection is floored, so native units the store
    /// truncates below one essentia count as accepted.
    fn inject_into_store(
        &self,
        gas: G,
        amount: i64,
        mode: TransferMode,
        source: &ActionSource,
    ) -> i64 {
        let request = self.converter.to_native_stack(gas, amount);
        let rejected = self.store.inject(&request.gas, request.amount, mode, source);
        if rejected <= 0 {
            0
        } else if rejected >= request.amount {
            amount
        } else {
            self.converter.to_essentia(rejected)
        }
    }
}
