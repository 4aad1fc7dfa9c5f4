//! # vex-edge
//!
//! Port and HTTP client for the globally distributed edge key-value store.
//!
//! Edge workers read flag snapshots and token records from the edge store
//! without touching the relational control plane. This crate defines the
//! [`EdgeStore`] port the reconciliation handlers write through, and
//! [`EdgeClient`], its implementation against the Workers KV REST API.
//!
//! A structured `success=false` response is an error even when the HTTP
//! status is 2xx, so partial batch failures surface as [`EdgeError::Rejected`]
//! rather than passing silently.
//!
//! ## Example
//!
//! ```ignore
//! use vex_edge::{EdgeClient, EdgeConfig, EdgeStore, KvPair, Namespace};
//!
//! let config = EdgeConfig::new("account-id", "api-token", "projects-ns", "tokens-ns");
//! let client = EdgeClient::new(config)?;
//! client
//!     .write(Namespace::Projects, vec![KvPair::new("project-id", "{}")])
//!     .await?;
//! ```

pub mod client;
pub mod config;
pub mod error;
pub mod retry;
pub mod types;

pub use client::EdgeClient;
pub use config::EdgeConfig;
pub use error::{EdgeError, EdgeResult};
pub use retry::RetryConfig;
pub use types::{ApiMessage, EdgeStore, KvPair, KvResponse, Namespace};
