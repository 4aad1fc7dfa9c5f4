//! Routes claimed messages to their handlers.
//!
//! The dispatcher owns no business logic. It resolves a handler by topic,
//! runs it, and decides whether the message may be acknowledged:
//!
//! - handled or skipped (dry run): acknowledged
//! - handler error or no handler: left unacknowledged for redelivery
//!
//! Within one claim, once a message has been left unacknowledged no later
//! offset is committed, because committing offset N+k would also mark N as
//! consumed.

use std::sync::Arc;

use prometheus_client::encoding::EncodeLabelSet;
use prometheus_client::metrics::counter::Counter;
use prometheus_client::metrics::family::Family;
use prometheus_client::registry::Registry;
use tokio_util::sync::CancellationToken;
use tracing::{debug, error, info, instrument, warn};

use crate::claim::{Claim, OffsetCommitter};
use crate::error::EventError;
use crate::intent::InboundMessage;
use crate::registry::HandlerRegistry;

/// Result of dispatching one message.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum DispatchOutcome {
    /// The handler succeeded.
    Handled,
    /// Dry-run mode: the handler was not invoked.
    Skipped,
    /// The handler returned an error.
    Failed(String),
    /// No handler is registered for the topic.
    Unroutable,
}

impl DispatchOutcome {
    /// Whether the message's offset may be committed.
    #[must_use]
    pub fn acknowledges(&self) -> bool {
        matches!(self, Self::Handled | Self::Skipped)
    }

    #[must_use]
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Handled => "handled",
            Self::Skipped => "skipped",
            Self::Failed(_) => "failed",
            Self::Unroutable => "unroutable",
        }
    }
}

#[derive(Clone, Debug, Hash, PartialEq, Eq, EncodeLabelSet)]
pub struct OutcomeLabels {
    pub outcome: String,
}

/// Dispatch counters, labelled by outcome.
#[derive(Clone, Debug, Default)]
pub struct DispatchMetrics {
    pub dispatched: Family<OutcomeLabels, Counter>,
}

impl DispatchMetrics {
    /// Create the family and register it as `vex_dispatch_total`.
    pub fn register(registry: &mut Registry) -> Self {
        let metrics = Self::default();
        registry.register(
            "vex_dispatch",
            "Messages dispatched, by outcome",
            metrics.dispatched.clone(),
        );
        metrics
    }

    pub fn record(&self, outcome: &DispatchOutcome) {
        self.dispatched
            .get_or_create(&OutcomeLabels {
                outcome: outcome.as_str().to_string(),
            })
            .inc();
    }

    #[must_use]
    pub fn count(&self, outcome: &str) -> u64 {
        self.dispatched
            .get_or_create(&OutcomeLabels {
                outcome: outcome.to_string(),
            })
            .get()
    }
}

/// Tally of one claim loop.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ClaimSummary {
    pub handled: u64,
    pub skipped: u64,
    pub failed: u64,
    pub unroutable: u64,
    /// Highest offset successfully committed.
    pub last_committed: Option<i64>,
    /// First offset left unacknowledged. Commits stop from here on.
    pub held_at: Option<i64>,
}

/// Routes messages from partition claims to registered handlers.
#[derive(Clone, Debug)]
pub struct Dispatcher {
    registry: Arc<HandlerRegistry>,
    dry_run: bool,
    metrics: Option<DispatchMetrics>,
}

impl Dispatcher {
    pub fn new(registry: Arc<HandlerRegistry>) -> Self {
        Self {
            registry,
            dry_run: false,
            metrics: None,
        }
    }

    /// Acknowledge every routable message without running its handler.
    #[must_use]
    pub fn with_dry_run(mut self, dry_run: bool) -> Self {
        self.dry_run = dry_run;
        self
    }

    #[must_use]
    pub fn with_metrics(mut self, metrics: DispatchMetrics) -> Self {
        self.metrics = Some(metrics);
        self
    }

    #[must_use]
    pub fn registry(&self) -> &HandlerRegistry {
        &self.registry
    }

    #[must_use]
    pub fn is_dry_run(&self) -> bool {
        self.dry_run
    }

    /// Dispatch a single message to its handler.
    pub async fn dispatch(&self, message: &InboundMessage) -> DispatchOutcome {
        let outcome = match self.registry.get(&message.topic) {
            None => {
                error!(
                    topic = %message.topic,
                    partition = message.partition,
                    offset = message.offset,
                    "No handler registered for topic"
                );
                DispatchOutcome::Unroutable
            }
            Some(_) if self.dry_run => {
                debug!(
                    topic = %message.topic,
                    offset = message.offset,
                    "Dry run, skipping handler"
                );
                DispatchOutcome::Skipped
            }
            Some(handler) => match handler.handle(message).await {
                Ok(()) => {
                    debug!(
                        topic = %message.topic,
                        partition = message.partition,
                        offset = message.offset,
                        "Message handled"
                    );
                    DispatchOutcome::Handled
                }
                Err(e) => {
                    error!(
                        topic = %message.topic,
                        partition = message.partition,
                        offset = message.offset,
                        error = %e,
                        "Handler failed"
                    );
                    DispatchOutcome::Failed(e.to_string())
                }
            },
        };

        if let Some(metrics) = &self.metrics {
            metrics.record(&outcome);
        }
        outcome
    }

    /// Process a claim until it is exhausted, `cancel` fires, or a commit
    /// reports that the partition has been revoked.
    ///
    /// Cancellation is observed only between messages; an in-flight handler
    /// always runs to completion.
    #[instrument(skip_all, fields(topic = %claim.topic, partition = claim.partition))]
    pub async fn consume_claim(
        &self,
        claim: &mut Claim,
        committer: &dyn OffsetCommitter,
        cancel: &CancellationToken,
    ) -> ClaimSummary {
        let mut summary = ClaimSummary::default();
        debug!("Claim loop started");

        loop {
            let message = tokio::select! {
                biased;
                () = cancel.cancelled() => break,
                next = claim.next() => match next {
                    Some(message) => message,
                    None => break,
                },
            };

            let outcome = self.dispatch(&message).await;
            match &outcome {
                DispatchOutcome::Handled => summary.handled += 1,
                DispatchOutcome::Skipped => summary.skipped += 1,
                DispatchOutcome::Failed(_) => summary.failed += 1,
                DispatchOutcome::Unroutable => summary.unroutable += 1,
            }

            if !outcome.acknowledges() {
                if summary.held_at.is_none() {
                    warn!(offset = message.offset, "Holding claim offsets for redelivery");
                    summary.held_at = Some(message.offset);
                }
                continue;
            }

            if summary.held_at.is_some() {
                debug!(offset = message.offset, "Offset held behind an earlier failure");
                continue;
            }

            match committer.commit(&message) {
                Ok(()) => summary.last_committed = Some(message.offset),
                Err(e @ EventError::PartitionRevoked { .. }) => {
                    info!(offset = message.offset, reason = %e, "Claim revoked, stopping");
                    break;
                }
                Err(e) => warn!(offset = message.offset, error = %e, "Offset commit failed"),
            }
        }

        info!(
            handled = summary.handled,
            skipped = summary.skipped,
            failed = summary.failed,
            unroutable = summary.unroutable,
            "Claim loop ended"
        );
        summary
    }
}
