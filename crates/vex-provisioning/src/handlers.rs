//! Reconciliation message handlers and registry wiring.

use std::sync::Arc;

use async_trait::async_trait;
use tracing::{debug, instrument};
use uuid::Uuid;
use vex_db::Flag;
use vex_events::{
    HandlerError, HandlerRegistry, InboundMessage, MessageHandler, Operation, RegistryError,
    TopicConfig,
};

use crate::error::{ReconcileError, ReconcileResult};
use crate::metrics::ProvisionMetrics;
use crate::reconcile::Reconciler;

fn invalid(operation: Operation, reason: impl Into<String>) -> ReconcileError {
    ReconcileError::InvalidPayload {
        operation,
        reason: reason.into(),
    }
}

fn parse_id(operation: Operation, payload: &[u8]) -> ReconcileResult<Uuid> {
    let text = std::str::from_utf8(payload).map_err(|e| invalid(operation, e.to_string()))?;
    Uuid::parse_str(text.trim()).map_err(|e| invalid(operation, e.to_string()))
}

fn parse_flag(operation: Operation, payload: &[u8]) -> ReconcileResult<Flag> {
    serde_json::from_slice(payload).map_err(|e| invalid(operation, e.to_string()))
}

/// Handles every message of one operation's topic.
pub struct ReconcileHandler {
    operation: Operation,
    reconciler: Arc<Reconciler>,
    metrics: Option<ProvisionMetrics>,
}

impl ReconcileHandler {
    pub fn new(operation: Operation, reconciler: Arc<Reconciler>) -> Self {
        Self {
            operation,
            reconciler,
            metrics: None,
        }
    }

    #[must_use]
    pub fn with_metrics(mut self, metrics: ProvisionMetrics) -> Self {
        self.metrics = Some(metrics);
        self
    }

    #[must_use]
    pub fn operation(&self) -> Operation {
        self.operation
    }

    async fn apply(&self, payload: &[u8]) -> ReconcileResult<()> {
        let op = self.operation;
        match op {
            Operation::ProvisionProject => {
                self.reconciler.provision_project(parse_id(op, payload)?).await
            }
            Operation::DeprovisionProject => {
                self.reconciler
                    .deprovision_project(parse_id(op, payload)?)
                    .await
            }
            Operation::ProvisionToken => {
                self.reconciler.provision_token(parse_id(op, payload)?).await
            }
            Operation::DeprovisionToken => self.reconciler.deprovision_token(payload).await,
            Operation::ProvisionFlag => {
                self.reconciler
                    .provision_flag(&parse_flag(op, payload)?)
                    .await
            }
            Operation::DeprovisionFlag => {
                self.reconciler
                    .deprovision_flag(&parse_flag(op, payload)?)
                    .await
            }
        }
    }
}

#[async_trait]
impl MessageHandler for ReconcileHandler {
    #[instrument(skip_all, fields(operation = %self.operation, offset = message.offset))]
    async fn handle(&self, message: &InboundMessage) -> Result<(), HandlerError> {
        let result = self.apply(&message.payload).await;

        if let Some(metrics) = &self.metrics {
            metrics.record(self.operation, result.is_ok());
        }
        if result.is_ok() {
            debug!("Reconciled");
        }
        result.map_err(Into::into)
    }
}

/// Bind a reconciliation handler to each of the six topics.
pub fn build_registry(
    topics: &TopicConfig,
    reconciler: Arc<Reconciler>,
    metrics: Option<ProvisionMetrics>,
) -> Result<HandlerRegistry, RegistryError> {
    let mut builder = HandlerRegistry::builder();
    for operation in Operation::ALL {
        let mut handler = ReconcileHandler::new(operation, Arc::clone(&reconciler));
        if let Some(metrics) = &metrics {
            handler = handler.with_metrics(metrics.clone());
        }
        builder = builder.register(topics.topic_for(operation), Arc::new(handler))?;
    }
    Ok(builder.build())
}
