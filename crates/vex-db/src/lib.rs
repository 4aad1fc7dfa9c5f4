//! # vex-db
//!
//! Relational models for vex feature-flag configuration.
//!
//! The provisioning pipeline never writes to the relational store. It only
//! re-reads the current, authoritative state of an entity when reconciling the
//! edge store, so this crate exposes the row types and the read queries the
//! pipeline needs, plus the write-time validation rules that shape the data it
//! later renders.
//!
//! ## Example
//!
//! ```rust,ignore
//! use vex_db::{connect, models::{Flag, Project}};
//!
//! let pool = connect("postgres://localhost/vex", 5).await?;
//! let project = Project::find_by_id(&pool, project_id).await?;
//! let flags = Flag::list_by_project(&pool, project.id, 1000, 0).await?;
//! ```

pub mod error;
pub mod models;
pub mod pool;

pub use error::DbError;
pub use models::{Flag, FlagType, Project, Token};
pub use pool::connect;
