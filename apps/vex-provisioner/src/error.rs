//! Top-level error for the provisioner binary.

use thiserror::Error;
use vex_db::DbError;
use vex_edge::EdgeError;
use vex_events::{EventError, RegistryError};
use vex_provisioning::ProvisionError;

use crate::config::ConfigError;

#[derive(Debug, Error)]
pub enum AppError {
    #[error("Configuration error: {0}")]
    Config(#[from] ConfigError),

    #[error("Database error: {0}")]
    Db(#[from] DbError),

    #[error("Edge store error: {0}")]
    Edge(#[from] EdgeError),

    #[error("Event bus error: {0}")]
    Events(#[from] EventError),

    #[error("Handler registration failed: {0}")]
    Registry(#[from] RegistryError),

    #[error("Provisioning failed: {0}")]
    Provision(#[from] ProvisionError),

    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    #[error("Invalid argument: {0}")]
    InvalidArgument(String),
}

impl AppError {
    /// Whether fixing the environment, rather than retrying, is the remedy.
    #[must_use]
    pub fn is_config_error(&self) -> bool {
        match self {
            AppError::Config(ConfigError::Events(e)) | AppError::Events(e) => e.is_config_error(),
            AppError::Config(_) => true,
            AppError::Edge(EdgeError::ConfigMissing { .. } | EdgeError::ConfigInvalid { .. }) => {
                true
            }
            _ => false,
        }
    }
}
