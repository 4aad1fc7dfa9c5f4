//! Error types for reconciliation and provisioning.

use thiserror::Error;
use vex_db::DbError;
use vex_edge::EdgeError;
use vex_events::{EventError, Operation};

/// Failure while re-deriving or pushing an entity's edge representation.
#[derive(Debug, Error)]
pub enum ReconcileError {
    /// Reading authoritative state failed.
    #[error("Entity read failed: {0}")]
    Db(#[from] DbError),

    /// The edge store rejected or never received the change.
    #[error("Edge store error: {0}")]
    Edge(#[from] EdgeError),

    /// The snapshot could not be encoded.
    #[error("Snapshot encoding failed: {0}")]
    Encode(#[from] serde_json::Error),

    /// The message payload does not describe an entity.
    #[error("Invalid {operation} payload: {reason}")]
    InvalidPayload { operation: Operation, reason: String },
}

/// Result type for reconciliation.
pub type ReconcileResult<T> = Result<T, ReconcileError>;

/// Failure of a [`Provisioner`](crate::Provisioner) call.
///
/// Callers treat every variant as non-fatal: the relational write has
/// already committed and edge convergence is allowed to lag.
#[derive(Debug, Error)]
pub enum ProvisionError {
    /// The intent was not acknowledged, so convergence is not scheduled.
    #[error("Provisioning intent not scheduled: {0}")]
    Publish(#[from] EventError),

    /// Synchronous reconciliation failed.
    #[error("Reconciliation failed: {0}")]
    Reconcile(#[from] ReconcileError),

    /// The intent payload could not be encoded.
    #[error("Intent encoding failed: {0}")]
    Encode(#[from] serde_json::Error),
}

/// Result type for provisioner calls.
pub type ProvisionResult<T> = Result<T, ProvisionError>;
