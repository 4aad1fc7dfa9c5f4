//! rdkafka consumer-group runtime.
//!
//! One run loop owns the [`StreamConsumer`]. Rebalance callbacks update the
//! shared [`Assignment`] in place and are then forwarded to the loop as
//! session events. Messages fan out through a [`ClaimSet`] to one claim task
//! per owned partition, so a partition is processed strictly in order while
//! partitions run concurrently.

use std::sync::Arc;

use rdkafka::consumer::{CommitMode, Consumer, ConsumerContext, Rebalance, StreamConsumer};
use rdkafka::error::{KafkaError, RDKafkaErrorCode};
use rdkafka::message::{BorrowedMessage, Message};
use rdkafka::{ClientContext, Offset, TopicPartitionList};
use tokio::sync::mpsc;
use tokio_util::sync::CancellationToken;
use tracing::{debug, error, info, instrument, warn};

use crate::assignment::{Assignment, PartitionKey};
use crate::claim::OffsetCommitter;
use crate::claim_set::ClaimSet;
use crate::config::{ConsumerConfig, KafkaConfig};
use crate::dispatcher::Dispatcher;
use crate::error::EventError;
use crate::intent::InboundMessage;
use crate::session::{Readiness, SessionTracker};

/// Group-membership changes and client errors, forwarded from librdkafka's
/// callbacks.
#[derive(Debug)]
enum SessionEvent {
    Assigned(Vec<(PartitionKey, u64)>),
    Revoked(Vec<(PartitionKey, u64)>),
    RebalanceFailed(String),
    ClientError { fatal: bool, cause: String },
}

fn partitions(tpl: &TopicPartitionList) -> Vec<PartitionKey> {
    tpl.elements()
        .iter()
        .map(|e| (e.topic().to_string(), e.partition()))
        .collect()
}

/// Errors that mean the group can never be joined with this configuration
/// or network, as opposed to a broker that is briefly away.
fn is_fatal_before_join(error: &KafkaError) -> bool {
    matches!(
        error.rdkafka_error_code(),
        Some(
            RDKafkaErrorCode::AllBrokersDown
                | RDKafkaErrorCode::Authentication
                | RDKafkaErrorCode::SaslAuthenticationFailed
                | RDKafkaErrorCode::GroupAuthorizationFailed
                | RDKafkaErrorCode::TopicAuthorizationFailed
        )
    )
}

/// Copy a borrowed record out of librdkafka's buffer.
fn inbound(message: &BorrowedMessage<'_>) -> InboundMessage {
    InboundMessage {
        topic: message.topic().to_string(),
        partition: message.partition(),
        offset: message.offset(),
        key: message.key().map(<[u8]>::to_vec),
        payload: message.payload().map(<[u8]>::to_vec).unwrap_or_default(),
        timestamp: message.timestamp().to_millis(),
    }
}

/// Consumer context that tracks ownership and forwards rebalances to the
/// run loop.
struct GroupContext {
    assignment: Arc<Assignment>,
    events: mpsc::UnboundedSender<SessionEvent>,
}

impl GroupContext {
    fn forward(&self, event: SessionEvent) {
        if self.events.send(event).is_err() {
            debug!("Session event dropped, run loop has exited");
        }
    }
}

impl ClientContext for GroupContext {
    fn error(&self, error: KafkaError, reason: &str) {
        self.forward(SessionEvent::ClientError {
            fatal: is_fatal_before_join(&error),
            cause: format!("{error}: {reason}"),
        });
    }
}

impl ConsumerContext for GroupContext {
    // Runs before librdkafka gives the partitions up. Fencing here means no
    // claim commit can be issued once the revoke has completed.
    fn pre_rebalance(&self, rebalance: &Rebalance<'_>) {
        match rebalance {
            Rebalance::Revoke(tpl) => {
                let ended = self.assignment.revoke(&partitions(tpl));
                self.forward(SessionEvent::Revoked(ended));
            }
            Rebalance::Error(e) => self.forward(SessionEvent::RebalanceFailed(e.to_string())),
            Rebalance::Assign(_) => {}
        }
    }

    fn post_rebalance(&self, rebalance: &Rebalance<'_>) {
        if let Rebalance::Assign(tpl) = rebalance {
            let granted = self.assignment.assign(&partitions(tpl));
            self.forward(SessionEvent::Assigned(granted));
        }
    }
}

type GroupConsumer = StreamConsumer<GroupContext>;

/// Commits `offset + 1` for each acknowledged message.
struct KafkaCommitter {
    consumer: Arc<GroupConsumer>,
}

impl OffsetCommitter for KafkaCommitter {
    fn commit(&self, message: &InboundMessage) -> Result<(), EventError> {
        let failed = |cause: String| EventError::CommitFailed {
            topic: message.topic.clone(),
            partition: message.partition,
            offset: message.offset,
            cause,
        };

        let mut tpl = TopicPartitionList::new();
        tpl.add_partition_offset(
            &message.topic,
            message.partition,
            Offset::Offset(message.offset + 1),
        )
        .map_err(|e| failed(e.to_string()))?;

        self.consumer
            .commit(&tpl, CommitMode::Async)
            .map_err(|e| failed(e.to_string()))
    }
}

/// A dispatcher replica participating in a named consumer group.
pub struct KafkaConsumerGroup {
    consumer: Arc<GroupConsumer>,
    assignment: Arc<Assignment>,
    dispatcher: Arc<Dispatcher>,
    group: String,
    bootstrap_servers: String,
    claim_buffer: usize,
    session: SessionTracker,
    events: mpsc::UnboundedReceiver<SessionEvent>,
}

impl KafkaConsumerGroup {
    /// Create the group consumer. Nothing is joined until [`run`](Self::run).
    pub fn new(
        kafka: &KafkaConfig,
        consumer: &ConsumerConfig,
        dispatcher: Arc<Dispatcher>,
    ) -> Result<Self, EventError> {
        consumer.validate()?;

        let assignment = Arc::new(Assignment::new());
        let (tx, events) = mpsc::unbounded_channel();
        let context = GroupContext {
            assignment: Arc::clone(&assignment),
            events: tx,
        };
        let stream: GroupConsumer = kafka
            .client_config()
            .set("group.id", &consumer.group)
            .set("auto.offset.reset", "earliest")
            .set("enable.auto.commit", "false")
            .set("session.timeout.ms", "30000")
            .create_with_context(context)
            .map_err(|e| EventError::ConnectionFailed {
                broker: kafka.bootstrap_servers.clone(),
                cause: e.to_string(),
            })?;

        info!(
            consumer_group = %consumer.group,
            bootstrap_servers = %kafka.bootstrap_servers,
            dry_run = dispatcher.is_dry_run(),
            "Consumer group created"
        );

        Ok(Self {
            consumer: Arc::new(stream),
            assignment,
            dispatcher,
            group: consumer.group.clone(),
            bootstrap_servers: kafka.bootstrap_servers.clone(),
            claim_buffer: consumer.claim_buffer,
            session: SessionTracker::new(),
            events,
        })
    }

    /// Readiness handle; ready after the first successful join.
    #[must_use]
    pub fn readiness(&self) -> Readiness {
        self.session.readiness()
    }

    /// Join the group and dispatch until `shutdown` is cancelled.
    ///
    /// Returns only after every claim loop has finished and the final
    /// offsets have been committed. A subscribe failure, or an unrecoverable
    /// client error before the first join, is returned as an error and
    /// should be treated as fatal.
    #[instrument(skip_all, fields(consumer_group = %self.group))]
    pub async fn run(mut self, shutdown: CancellationToken) -> Result<(), EventError> {
        let topics: Vec<String> = self
            .dispatcher
            .registry()
            .topics()
            .into_iter()
            .map(str::to_string)
            .collect();
        let topic_refs: Vec<&str> = topics.iter().map(String::as_str).collect();

        if let Err(e) = self.consumer.subscribe(&topic_refs) {
            self.session.closed();
            return Err(EventError::SubscribeFailed {
                topics,
                cause: e.to_string(),
            });
        }
        info!(topics = ?topics, "Subscribed, joining group");

        let committer: Arc<dyn OffsetCommitter> = Arc::new(KafkaCommitter {
            consumer: Arc::clone(&self.consumer),
        });
        let mut claims = ClaimSet::new(
            Arc::clone(&self.dispatcher),
            committer,
            Arc::clone(&self.assignment),
            self.claim_buffer,
        );

        let outcome = loop {
            tokio::select! {
                biased;
                () = shutdown.cancelled() => break Ok(()),
                Some(event) = self.events.recv() => {
                    if let Err(e) = self.on_session_event(event, &mut claims).await {
                        break Err(e);
                    }
                }
                received = self.consumer.recv() => match received.map(|m| inbound(&m)) {
                    Ok(message) => {
                        if claims.route(message, &shutdown).await {
                            self.session.consuming();
                        }
                    }
                    Err(e) => {
                        if let Err(fatal) = self.client_error(is_fatal_before_join(&e), e.to_string()) {
                            break Err(fatal);
                        }
                    }
                },
            }
        };

        self.shutdown(claims).await;
        outcome
    }

    async fn on_session_event(
        &self,
        event: SessionEvent,
        claims: &mut ClaimSet,
    ) -> Result<(), EventError> {
        match event {
            SessionEvent::Assigned(granted) => {
                info!(partitions = ?granted, "Partitions assigned");
                claims.assigned(&granted).await;
                self.session.joined();
            }
            SessionEvent::Revoked(ended) => {
                info!(partitions = ?ended, "Partitions revoked");
                self.session.rebalancing();
                claims.revoked(&ended).await;
            }
            SessionEvent::RebalanceFailed(cause) => {
                error!(cause = %cause, "Rebalance failed");
            }
            SessionEvent::ClientError { fatal, cause } => self.client_error(fatal, cause)?,
        }
        Ok(())
    }

    /// Unrecoverable errors end the run only until the group has been joined
    /// once. After that librdkafka keeps reconnecting and the error is logged.
    fn client_error(&self, fatal: bool, cause: String) -> Result<(), EventError> {
        if fatal && !self.session.status().joined {
            error!(cause = %cause, "Consumer group cannot connect");
            return Err(EventError::ConnectionFailed {
                broker: self.bootstrap_servers.clone(),
                cause,
            });
        }
        warn!(cause = %cause, "Kafka client error");
        Ok(())
    }

    /// Stop every claim, flush their final offsets, and leave the group.
    async fn shutdown(self, claims: ClaimSet) {
        info!(claims = claims.len(), "Consumer group shutting down");
        self.session.shutting_down();

        let mut tpl = TopicPartitionList::new();
        for ((topic, partition), position) in claims.close().await {
            if let Err(e) = tpl.add_partition_offset(&topic, partition, Offset::Offset(position)) {
                warn!(topic = %topic, partition, error = %e, "Could not stage final offset");
            }
        }

        if tpl.count() > 0 {
            match self.consumer.commit(&tpl, CommitMode::Sync) {
                Ok(()) => info!(partitions = tpl.count(), "Final offsets committed"),
                Err(e) => warn!(error = %e, "Final offset commit failed"),
            }
        }

        self.consumer.unsubscribe();
        self.session.closed();
        info!("Consumer group closed");
    }
}
