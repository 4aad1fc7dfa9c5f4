//! Edge API configuration.

use std::env;
use std::fmt;

use crate::error::EdgeError;
use crate::retry::RetryConfig;
use crate::types::Namespace;

/// Default Workers KV API root.
pub const DEFAULT_BASE_URL: &str = "https://api.cloudflare.com/client/v4";

/// Connection settings for the edge key-value API.
#[derive(Clone)]
pub struct EdgeConfig {
    /// API root, without a trailing slash.
    pub base_url: String,
    /// Account that owns the namespaces.
    pub account_id: String,
    /// Bearer token with KV write permission.
    pub api_token: String,
    /// Namespace holding project snapshots.
    pub project_namespace_id: String,
    /// Namespace holding token records.
    pub token_namespace_id: String,
    /// Whole-request timeout in seconds.
    pub timeout_secs: u64,
    /// Connect timeout in seconds.
    pub connect_timeout_secs: u64,
    /// Retry policy for transient failures.
    pub retry: RetryConfig,
}

impl fmt::Debug for EdgeConfig {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("EdgeConfig")
            .field("base_url", &self.base_url)
            .field("account_id", &self.account_id)
            .field("api_token", &"[REDACTED]")
            .field("project_namespace_id", &self.project_namespace_id)
            .field("token_namespace_id", &self.token_namespace_id)
            .field("timeout_secs", &self.timeout_secs)
            .field("retry", &self.retry)
            .finish()
    }
}

impl EdgeConfig {
    /// Create a configuration with default base URL, timeouts and retries.
    pub fn new(
        account_id: impl Into<String>,
        api_token: impl Into<String>,
        project_namespace_id: impl Into<String>,
        token_namespace_id: impl Into<String>,
    ) -> Self {
        Self {
            base_url: DEFAULT_BASE_URL.to_string(),
            account_id: account_id.into(),
            api_token: api_token.into(),
            project_namespace_id: project_namespace_id.into(),
            token_namespace_id: token_namespace_id.into(),
            timeout_secs: 10,
            connect_timeout_secs: 5,
            retry: RetryConfig::default(),
        }
    }

    /// Load configuration from environment variables.
    ///
    /// Required:
    /// - `EDGE_API_TOKEN`, `EDGE_ACCOUNT_ID`
    /// - `PROJECT_KV_NAMESPACE_ID`, `TOKEN_KV_NAMESPACE_ID`
    ///
    /// Optional:
    /// - `EDGE_API_BASE_URL` (default: the public Workers KV API)
    /// - `EDGE_TIMEOUT_SECS` (default: 10)
    /// - `EDGE_MAX_RETRIES` (default: 3)
    pub fn from_env() -> Result<Self, EdgeError> {
        let mut config = Self::new(
            required("EDGE_ACCOUNT_ID")?,
            required("EDGE_API_TOKEN")?,
            required("PROJECT_KV_NAMESPACE_ID")?,
            required("TOKEN_KV_NAMESPACE_ID")?,
        );

        if let Ok(base_url) = env::var("EDGE_API_BASE_URL") {
            config = config.with_base_url(base_url);
        }
        if let Ok(raw) = env::var("EDGE_TIMEOUT_SECS") {
            config.timeout_secs = parse_number("EDGE_TIMEOUT_SECS", &raw)?;
        }
        if let Ok(raw) = env::var("EDGE_MAX_RETRIES") {
            config.retry.max_retries = parse_number("EDGE_MAX_RETRIES", &raw)?;
        }

        config.validate()?;
        Ok(config)
    }

    /// Override the API root.
    #[must_use]
    pub fn with_base_url(mut self, base_url: impl Into<String>) -> Self {
        self.base_url = base_url.into().trim_end_matches('/').to_string();
        self
    }

    /// Override the retry policy.
    #[must_use]
    pub fn with_retry(mut self, retry: RetryConfig) -> Self {
        self.retry = retry;
        self
    }

    /// Override the request timeout.
    #[must_use]
    pub fn with_timeout_secs(mut self, secs: u64) -> Self {
        self.timeout_secs = secs;
        self
    }

    /// Namespace ID for a logical namespace.
    #[must_use]
    pub fn namespace_id(&self, namespace: Namespace) -> &str {
        match namespace {
            Namespace::Projects => &self.project_namespace_id,
            Namespace::Tokens => &self.token_namespace_id,
        }
    }

    /// Validate the configuration.
    pub fn validate(&self) -> Result<(), EdgeError> {
        let url = url::Url::parse(&self.base_url).map_err(|e| EdgeError::ConfigInvalid {
            var: "EDGE_API_BASE_URL".to_string(),
            reason: e.to_string(),
        })?;
        if url.scheme() != "https" && url.scheme() != "http" {
            return Err(EdgeError::ConfigInvalid {
                var: "EDGE_API_BASE_URL".to_string(),
                reason: format!("unsupported scheme: {}", url.scheme()),
            });
        }
        if url.cannot_be_a_base() {
            return Err(EdgeError::ConfigInvalid {
                var: "EDGE_API_BASE_URL".to_string(),
                reason: "URL cannot be used as a base".to_string(),
            });
        }
        for (var, value) in [
            ("EDGE_ACCOUNT_ID", &self.account_id),
            ("EDGE_API_TOKEN", &self.api_token),
            ("PROJECT_KV_NAMESPACE_ID", &self.project_namespace_id),
            ("TOKEN_KV_NAMESPACE_ID", &self.token_namespace_id),
        ] {
            if value.is_empty() {
                return Err(EdgeError::ConfigMissing {
                    var: var.to_string(),
                });
            }
        }
        if self.timeout_secs == 0 {
            return Err(EdgeError::ConfigInvalid {
                var: "EDGE_TIMEOUT_SECS".to_string(),
                reason: "must be greater than zero".to_string(),
            });
        }
        Ok(())
    }
}

fn required(var: &str) -> Result<String, EdgeError> {
    env::var(var).map_err(|_| EdgeError::ConfigMissing {
        var: var.to_string(),
    })
}

fn parse_number<T: std::str::FromStr>(var: &str, raw: &str) -> Result<T, EdgeError>
where
    T::Err: fmt::Display,
{
    raw.parse().map_err(|e: T::Err| EdgeError::ConfigInvalid {
        var: var.to_string(),
        reason: e.to_string(),
    })
}
