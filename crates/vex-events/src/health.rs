//! Broker health reported by the producer.

use serde::{Deserialize, Serialize};

/// Health of the broker connection.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct HealthStatus {
    pub connected: bool,
    /// Brokers visible in cluster metadata.
    pub brokers: usize,
    /// Provisioning topics that exist on the cluster.
    pub topics_present: usize,
    /// Provisioning topics expected to exist.
    pub topics_expected: usize,
}

impl HealthStatus {
    /// Connected, at least one broker, and every provisioning topic exists.
    #[must_use]
    pub fn is_healthy(&self) -> bool {
        self.connected && self.brokers > 0 && self.topics_present == self.topics_expected
    }
}
