//! # vex-provisioning
//!
//! Keeps the edge key-value store converged with the relational control
//! plane.
//!
//! ## Architecture
//!
//! ```text
//! ┌──────────────┐  intent  ┌────────────┐  claim  ┌────────────┐
//! │ API mutation │─────────►│   Topic    │────────►│ Dispatcher │
//! │ (Provisioner)│          │ (per op)   │         │            │
//! └──────┬───────┘          └────────────┘         └─────┬──────┘
//!        │ direct backend                                │
//!        ▼                                               ▼
//! ┌──────────────┐   read   ┌────────────┐  write  ┌────────────┐
//! │  Reconciler  │◄─────────│ Reconcile  │────────►│ Edge store │
//! │              │─────────►│  Handler   │         │            │
//! └──────────────┘          └────────────┘         └────────────┘
//! ```
//!
//! - [`Provisioner`]: six-operation capability with a queue backend and a
//!   direct backend, selected once via [`ProvisionerBackend`].
//! - [`Reconciler`]: re-derives and pushes (or removes) the complete edge
//!   record of one entity. Idempotent.
//! - [`build_registry`]: binds a [`ReconcileHandler`] to each topic.

pub mod error;
pub mod handlers;
pub mod metrics;
pub mod provisioner;
pub mod reader;
pub mod reconcile;
pub mod render;

pub use error::{ProvisionError, ProvisionResult, ReconcileError, ReconcileResult};
pub use handlers::{build_registry, ReconcileHandler};
pub use metrics::{EntityLabels, ProvisionMetrics};
pub use provisioner::{
    best_effort, DirectProvisioner, ProvisionReceipt, Provisioner, ProvisionerBackend,
    QueueProvisioner,
};
pub use reader::{EntityReader, PgEntityReader, FLAG_PAGE_LIMIT};
pub use reconcile::{normalize_token_hash, Reconciler};
pub use render::render_snapshot;
