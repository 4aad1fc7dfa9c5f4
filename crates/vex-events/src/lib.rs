//! # vex-events
//!
//! Queue plumbing for edge provisioning.
//!
//! - **Producing**: [`IntentPublisher`] publishes one [`ProvisionIntent`] per
//!   mutation to the topic of its [`Operation`], waiting for all in-sync
//!   replicas.
//! - **Consuming**: a consumer group feeds per-partition [`Claim`]s to the
//!   [`Dispatcher`], which routes each message to the handler registered for
//!   its topic in an immutable [`HandlerRegistry`].
//!
//! ## Cargo Features
//!
//! - `kafka`: rdkafka producer and consumer group (requires librdkafka)
//! - `kafka-static`: build librdkafka from source (requires cmake)
//!
//! Everything else, including the dispatcher and claim loop, builds without
//! librdkafka so it can be tested in isolation.

// Core modules (always available)
pub mod assignment;
pub mod claim;
pub mod claim_set;
pub mod config;
pub mod dispatcher;
pub mod error;
pub mod handler;
pub mod health;
pub mod intent;
pub mod operation;
pub mod registry;
pub mod session;

// Kafka-dependent modules (require `kafka` feature)
#[cfg(feature = "kafka")]
pub mod group;
#[cfg(feature = "kafka")]
pub mod producer;

pub use assignment::{Assignment, FencedCommitter, PartitionKey};
pub use claim::{Claim, OffsetCommitter};
pub use claim_set::ClaimSet;
pub use config::{ConsumerConfig, KafkaConfig, KafkaConfigBuilder, TopicConfig};
pub use dispatcher::{ClaimSummary, DispatchMetrics, DispatchOutcome, Dispatcher};
pub use error::{EventError, HandlerError};
pub use handler::{IntentPublisher, MessageHandler};
pub use health::HealthStatus;
pub use intent::{Delivery, InboundMessage, ProvisionIntent};
pub use operation::{Direction, Entity, Operation};
pub use registry::{HandlerRegistry, HandlerRegistryBuilder, RegistryError};
pub use session::{Readiness, SessionState, SessionStatus, SessionTracker};

#[cfg(feature = "kafka")]
pub use group::KafkaConsumerGroup;
#[cfg(feature = "kafka")]
pub use producer::IntentProducer;
