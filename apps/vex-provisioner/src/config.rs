//! Application configuration loaded from environment variables.
//!
//! Loading is fail-fast: a missing or malformed variable stops startup with
//! a message naming it. Sections that only some commands need (database,
//! edge API, broker) are loaded on demand so that, for example, publishing a
//! single intent does not require database credentials.

use std::env;
use std::str::FromStr;

use thiserror::Error;
use vex_events::{EventError, TopicConfig};

/// Default log filter directive.
pub const DEFAULT_LOG_FILTER: &str = "info,vex=debug";

/// Configuration errors that can occur during environment loading.
#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("Missing required environment variable: {0}")]
    MissingVar(String),

    #[error("Invalid value for {var}: {message}")]
    InvalidValue { var: String, message: String },

    #[error(transparent)]
    Events(#[from] EventError),
}

/// Which provisioner backend the operator commands use.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum BackendKind {
    Queue,
    Direct,
}

impl FromStr for BackendKind {
    type Err = ConfigError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_lowercase().as_str() {
            "queue" => Ok(Self::Queue),
            "direct" => Ok(Self::Direct),
            other => Err(ConfigError::InvalidValue {
                var: "PROVISIONER_BACKEND".to_string(),
                message: format!("expected `queue` or `direct`, got `{other}`"),
            }),
        }
    }
}

fn parse_var<T: FromStr>(var: &str, raw: &str) -> Result<T, ConfigError>
where
    T::Err: std::fmt::Display,
{
    raw.trim()
        .parse()
        .map_err(|e: T::Err| ConfigError::InvalidValue {
            var: var.to_string(),
            message: e.to_string(),
        })
}

fn optional<T: FromStr>(var: &str, default: T) -> Result<T, ConfigError>
where
    T::Err: std::fmt::Display,
{
    match env::var(var) {
        Ok(raw) => parse_var(var, &raw),
        Err(_) => Ok(default),
    }
}

/// Settings every command needs.
#[derive(Debug, Clone)]
pub struct Config {
    pub log_filter: String,
    pub metrics_port: u16,
    pub metrics_path: String,
    pub backend: BackendKind,
    pub topics: TopicConfig,
}

impl Config {
    /// Load from the environment.
    ///
    /// Optional:
    /// - `RUST_LOG` (default: `info,vex=debug`)
    /// - `METRICS_PORT` (default: 8081), `METRICS_PATH` (default: `/metrics`)
    /// - `PROVISIONER_BACKEND`: `queue` (default) or `direct`
    /// - `TOPIC_*`: the six topic names
    pub fn from_env() -> Result<Self, ConfigError> {
        let metrics_path = env::var("METRICS_PATH").unwrap_or_else(|_| "/metrics".to_string());
        validate_metrics_path(&metrics_path)?;

        Ok(Self {
            log_filter: env::var("RUST_LOG").unwrap_or_else(|_| DEFAULT_LOG_FILTER.to_string()),
            metrics_port: optional("METRICS_PORT", 8081)?,
            metrics_path,
            backend: optional("PROVISIONER_BACKEND", BackendKind::Queue)?,
            topics: TopicConfig::from_env()?,
        })
    }
}

fn validate_metrics_path(path: &str) -> Result<(), ConfigError> {
    if !path.starts_with('/') || path == "/healthz" || path == "/readyz" {
        return Err(ConfigError::InvalidValue {
            var: "METRICS_PATH".to_string(),
            message: format!("`{path}` must start with `/` and not shadow a health route"),
        });
    }
    Ok(())
}

/// Relational store settings for the entity readers.
#[derive(Clone)]
pub struct DatabaseConfig {
    pub url: String,
    pub max_connections: u32,
}

impl std::fmt::Debug for DatabaseConfig {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("DatabaseConfig")
            .field("url", &"[REDACTED]")
            .field("max_connections", &self.max_connections)
            .finish()
    }
}

impl DatabaseConfig {
    /// Load `DATABASE_URL` (required) and `DATABASE_MAX_CONNECTIONS` (default 5).
    pub fn from_env() -> Result<Self, ConfigError> {
        let url =
            env::var("DATABASE_URL").map_err(|_| ConfigError::MissingVar("DATABASE_URL".into()))?;
        let max_connections = optional("DATABASE_MAX_CONNECTIONS", 5u32)?;
        if max_connections == 0 {
            return Err(ConfigError::InvalidValue {
                var: "DATABASE_MAX_CONNECTIONS".to_string(),
                message: "must be at least 1".to_string(),
            });
        }
        Ok(Self {
            url,
            max_connections,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_backend_kind_parse() {
        assert_eq!("queue".parse::<BackendKind>().unwrap(), BackendKind::Queue);
        assert_eq!(" Direct ".parse::<BackendKind>().unwrap(), BackendKind::Direct);
        assert!(matches!(
            "kafka".parse::<BackendKind>(),
            Err(ConfigError::InvalidValue { ref var, .. }) if var == "PROVISIONER_BACKEND"
        ));
    }

    #[test]
    fn test_parse_var_reports_variable() {
        let err = parse_var::<u16>("METRICS_PORT", "99999").unwrap_err();
        assert!(err.to_string().starts_with("Invalid value for METRICS_PORT"));
        assert_eq!(parse_var::<u16>("METRICS_PORT", " 9090 ").unwrap(), 9090);
    }

    #[test]
    fn test_metrics_path_validation() {
        assert!(validate_metrics_path("/metrics").is_ok());
        assert!(validate_metrics_path("metrics").is_err());
        assert!(validate_metrics_path("/readyz").is_err());
    }

    #[test]
    fn test_database_url_redacted() {
        let config = DatabaseConfig {
            url: "postgres://vex:secret@db/vex".to_string(),
            max_connections: 5,
        };
        assert!(!format!("{config:?}").contains("secret"));
    }
}
