//! The provisioner capability and its two backends.
//!
//! Mutating API paths call a [`Provisioner`] after their relational write has
//! committed. A returned error never undoes that write; callers log it
//! through [`best_effort`] and carry on.
//!
//! | Backend | Effect of `Ok` | Meaning of `Err` |
//! |---|---|---|
//! | [`QueueProvisioner`] | intent durably queued | convergence not scheduled |
//! | [`DirectProvisioner`] | edge record already updated | edge not updated |

use std::sync::Arc;

use async_trait::async_trait;
use tracing::{info, instrument, warn};
use uuid::Uuid;
use vex_db::Flag;
use vex_events::{Delivery, IntentPublisher, Operation, ProvisionIntent, TopicConfig};

use crate::error::{ProvisionError, ProvisionResult};
use crate::metrics::ProvisionMetrics;
use crate::reconcile::{normalize_token_hash, Reconciler};

/// What a successful provisioner call achieved.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ProvisionReceipt {
    /// Accepted for asynchronous processing.
    Scheduled(Delivery),
    /// Applied to the edge store synchronously.
    Applied,
}

/// Provision and deprovision edge records for projects, flags and tokens.
#[async_trait]
pub trait Provisioner: Send + Sync {
    async fn provision_project(&self, project_id: Uuid) -> ProvisionResult<ProvisionReceipt>;

    async fn deprovision_project(&self, project_id: Uuid) -> ProvisionResult<ProvisionReceipt>;

    async fn provision_flag(&self, flag: &Flag) -> ProvisionResult<ProvisionReceipt>;

    async fn deprovision_flag(&self, flag: &Flag) -> ProvisionResult<ProvisionReceipt>;

    async fn provision_token(&self, token_id: Uuid) -> ProvisionResult<ProvisionReceipt>;

    /// `token_hash` is the raw digest or its hex encoding.
    async fn deprovision_token(&self, token_hash: &[u8]) -> ProvisionResult<ProvisionReceipt>;
}

/// Log a provisioner failure as a warning and swallow it.
///
/// Returns the receipt when the call succeeded.
pub fn best_effort(
    operation: Operation,
    result: ProvisionResult<ProvisionReceipt>,
) -> Option<ProvisionReceipt> {
    match result {
        Ok(receipt) => Some(receipt),
        Err(e) => {
            warn!(operation = %operation, error = %e, "Edge provisioning failed; continuing");
            None
        }
    }
}

// =============================================================================
// Queue backend
// =============================================================================

/// Publishes one intent per call and waits for the brokers to acknowledge it.
pub struct QueueProvisioner {
    publisher: Arc<dyn IntentPublisher>,
    topics: TopicConfig,
    metrics: ProvisionMetrics,
}

impl QueueProvisioner {
    pub fn new(
        publisher: Arc<dyn IntentPublisher>,
        topics: TopicConfig,
        metrics: ProvisionMetrics,
    ) -> Self {
        Self {
            publisher,
            topics,
            metrics,
        }
    }

    fn keyed(&self, operation: Operation, id: String) -> ProvisionIntent {
        ProvisionIntent::keyed(self.topics.topic_for(operation), id)
    }

    fn flag_intent(&self, operation: Operation, flag: &Flag) -> ProvisionResult<ProvisionIntent> {
        let payload = serde_json::to_vec(flag)?;
        Ok(ProvisionIntent::new(
            self.topics.topic_for(operation),
            flag.id.to_string(),
            payload,
        ))
    }

    #[instrument(skip_all, fields(operation = %operation, topic = %intent.topic))]
    async fn send(
        &self,
        operation: Operation,
        intent: ProvisionIntent,
    ) -> ProvisionResult<ProvisionReceipt> {
        match self.publisher.publish(intent).await {
            Ok(delivery) => Ok(ProvisionReceipt::Scheduled(delivery)),
            Err(e) => {
                self.metrics.error(operation);
                Err(e.into())
            }
        }
    }

    /// Encoding failures count as errors too.
    fn encode_failed(&self, operation: Operation, err: ProvisionError) -> ProvisionError {
        self.metrics.error(operation);
        err
    }
}

#[async_trait]
impl Provisioner for QueueProvisioner {
    async fn provision_project(&self, project_id: Uuid) -> ProvisionResult<ProvisionReceipt> {
        let op = Operation::ProvisionProject;
        self.send(op, self.keyed(op, project_id.to_string())).await
    }

    async fn deprovision_project(&self, project_id: Uuid) -> ProvisionResult<ProvisionReceipt> {
        let op = Operation::DeprovisionProject;
        self.send(op, self.keyed(op, project_id.to_string())).await
    }

    async fn provision_flag(&self, flag: &Flag) -> ProvisionResult<ProvisionReceipt> {
        let op = Operation::ProvisionFlag;
        let intent = self
            .flag_intent(op, flag)
            .map_err(|e| self.encode_failed(op, e))?;
        self.send(op, intent).await
    }

    async fn deprovision_flag(&self, flag: &Flag) -> ProvisionResult<ProvisionReceipt> {
        let op = Operation::DeprovisionFlag;
        let intent = self
            .flag_intent(op, flag)
            .map_err(|e| self.encode_failed(op, e))?;
        self.send(op, intent).await
    }

    async fn provision_token(&self, token_id: Uuid) -> ProvisionResult<ProvisionReceipt> {
        let op = Operation::ProvisionToken;
        self.send(op, self.keyed(op, token_id.to_string())).await
    }

    async fn deprovision_token(&self, token_hash: &[u8]) -> ProvisionResult<ProvisionReceipt> {
        let op = Operation::DeprovisionToken;
        let key = normalize_token_hash(token_hash)
            .map_err(|e| self.encode_failed(op, e.into()))?;
        self.send(op, self.keyed(op, key)).await
    }
}

// =============================================================================
// Direct backend
// =============================================================================

/// Reconciles in the caller's request path. No queue, no replay.
pub struct DirectProvisioner {
    reconciler: Arc<Reconciler>,
    metrics: ProvisionMetrics,
}

impl DirectProvisioner {
    pub fn new(reconciler: Arc<Reconciler>, metrics: ProvisionMetrics) -> Self {
        Self {
            reconciler,
            metrics,
        }
    }

    fn finish(
        &self,
        operation: Operation,
        result: crate::error::ReconcileResult<()>,
    ) -> ProvisionResult<ProvisionReceipt> {
        self.metrics.record(operation, result.is_ok());
        result?;
        info!(operation = %operation, "Applied to edge store");
        Ok(ProvisionReceipt::Applied)
    }
}

#[async_trait]
impl Provisioner for DirectProvisioner {
    async fn provision_project(&self, project_id: Uuid) -> ProvisionResult<ProvisionReceipt> {
        let result = self.reconciler.provision_project(project_id).await;
        self.finish(Operation::ProvisionProject, result)
    }

    async fn deprovision_project(&self, project_id: Uuid) -> ProvisionResult<ProvisionReceipt> {
        let result = self.reconciler.deprovision_project(project_id).await;
        self.finish(Operation::DeprovisionProject, result)
    }

    async fn provision_flag(&self, flag: &Flag) -> ProvisionResult<ProvisionReceipt> {
        let result = self.reconciler.provision_flag(flag).await;
        self.finish(Operation::ProvisionFlag, result)
    }

    async fn deprovision_flag(&self, flag: &Flag) -> ProvisionResult<ProvisionReceipt> {
        let result = self.reconciler.deprovision_flag(flag).await;
        self.finish(Operation::DeprovisionFlag, result)
    }

    async fn provision_token(&self, token_id: Uuid) -> ProvisionResult<ProvisionReceipt> {
        let result = self.reconciler.provision_token(token_id).await;
        self.finish(Operation::ProvisionToken, result)
    }

    async fn deprovision_token(&self, token_hash: &[u8]) -> ProvisionResult<ProvisionReceipt> {
        let result = self.reconciler.deprovision_token(token_hash).await;
        self.finish(Operation::DeprovisionToken, result)
    }
}

// =============================================================================
// Backend selection
// =============================================================================

/// The closed set of backends, chosen once from configuration.
pub enum ProvisionerBackend {
    Direct(DirectProvisioner),
    Queue(QueueProvisioner),
}

impl ProvisionerBackend {
    #[must_use]
    pub fn name(&self) -> &'static str {
        match self {
            Self::Direct(_) => "direct",
            Self::Queue(_) => "queue",
        }
    }

    fn inner(&self) -> &dyn Provisioner {
        match self {
            Self::Direct(p) => p,
            Self::Queue(p) => p,
        }
    }
}

#[async_trait]
impl Provisioner for ProvisionerBackend {
    async fn provision_project(&self, project_id: Uuid) -> ProvisionResult<ProvisionReceipt> {
        self.inner().provision_project(project_id).await
    }

    async fn deprovision_project(&self, project_id: Uuid) -> ProvisionResult<ProvisionReceipt> {
        self.inner().deprovision_project(project_id).await
    }

    async fn provision_flag(&self, flag: &Flag) -> ProvisionResult<ProvisionReceipt> {
        self.inner().provision_flag(flag).await
    }

    async fn deprovision_flag(&self, flag: &Flag) -> ProvisionResult<ProvisionReceipt> {
        self.inner().deprovision_flag(flag).await
    }

    async fn provision_token(&self, token_id: Uuid) -> ProvisionResult<ProvisionReceipt> {
        self.inner().provision_token(token_id).await
    }

    async fn deprovision_token(&self, token_hash: &[u8]) -> ProvisionResult<ProvisionReceipt> {
        self.inner().deprovision_token(token_hash).await
    }
}
