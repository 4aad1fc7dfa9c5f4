//! Provisioning outcome counters.
//!
//! Purely observational; nothing in the pipeline reads them back.

use prometheus_client::encoding::EncodeLabelSet;
use prometheus_client::metrics::counter::Counter;
use prometheus_client::metrics::family::Family;
use prometheus_client::registry::Registry;
use vex_events::{Direction, Entity, Operation};

/// Labels for provisioning counters.
#[derive(Clone, Debug, Hash, PartialEq, Eq, EncodeLabelSet)]
pub struct EntityLabels {
    pub entity: String,
}

/// Success and error counters for both directions, labelled by entity.
#[derive(Clone, Debug, Default)]
pub struct ProvisionMetrics {
    pub provision_success: Family<EntityLabels, Counter>,
    pub provision_error: Family<EntityLabels, Counter>,
    pub deprovision_success: Family<EntityLabels, Counter>,
    pub deprovision_error: Family<EntityLabels, Counter>,
}

impl ProvisionMetrics {
    /// Create the four families and register them on `registry`.
    pub fn register(registry: &mut Registry) -> Self {
        let metrics = Self::default();
        registry.register(
            "vex_provision_success",
            "Edge provisions that completed",
            metrics.provision_success.clone(),
        );
        registry.register(
            "vex_provision_error",
            "Edge provisions that failed",
            metrics.provision_error.clone(),
        );
        registry.register(
            "vex_deprovision_success",
            "Edge deprovisions that completed",
            metrics.deprovision_success.clone(),
        );
        registry.register(
            "vex_deprovision_error",
            "Edge deprovisions that failed",
            metrics.deprovision_error.clone(),
        );
        metrics
    }

    fn family(&self, direction: Direction, ok: bool) -> &Family<EntityLabels, Counter> {
        match (direction, ok) {
            (Direction::Provision, true) => &self.provision_success,
            (Direction::Provision, false) => &self.provision_error,
            (Direction::Deprovision, true) => &self.deprovision_success,
            (Direction::Deprovision, false) => &self.deprovision_error,
        }
    }

    fn labels(entity: Entity) -> EntityLabels {
        EntityLabels {
            entity: entity.as_str().to_string(),
        }
    }

    /// Count one outcome of `operation`.
    pub fn record(&self, operation: Operation, ok: bool) {
        self.family(operation.direction(), ok)
            .get_or_create(&Self::labels(operation.entity()))
            .inc();
    }

    pub fn success(&self, operation: Operation) {
        self.record(operation, true);
    }

    pub fn error(&self, operation: Operation) {
        self.record(operation, false);
    }

    /// Current value of one counter.
    #[must_use]
    pub fn count(&self, operation: Operation, ok: bool) -> u64 {
        self.family(operation.direction(), ok)
            .get_or_create(&Self::labels(operation.entity()))
            .get()
    }
}
