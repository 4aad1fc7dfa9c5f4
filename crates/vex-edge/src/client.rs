//! Workers KV HTTP client.
//!
//! Implements [`EdgeStore`] against the bulk-write and single-key delete
//! endpoints of the edge API.

use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use reqwest::{header, Client, Method, Response, StatusCode, Url};
use tracing::{debug, info, instrument, warn};

use crate::config::EdgeConfig;
use crate::error::{EdgeError, EdgeResult};
use crate::types::{EdgeStore, KvPair, KvResponse, Namespace};

/// Parse a `Retry-After` value: delay seconds or an HTTP-date.
///
/// A date in the past means retry now.
fn retry_after(value: &str, now: DateTime<Utc>) -> Option<Duration> {
    let value = value.trim();
    if let Ok(secs) = value.parse::<u64>() {
        return Some(Duration::from_secs(secs));
    }
    let at = DateTime::parse_from_rfc2822(value).ok()?;
    Some((at.with_timezone(&Utc) - now).to_std().unwrap_or(Duration::ZERO))
}

/// Edge key-value client.
#[derive(Clone)]
pub struct EdgeClient {
    config: Arc<EdgeConfig>,
    client: Client,
}

impl std::fmt::Debug for EdgeClient {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("EdgeClient")
            .field("config", &self.config)
            .finish_non_exhaustive()
    }
}

impl EdgeClient {
    /// Create a new client with the given configuration.
    pub fn new(config: EdgeConfig) -> EdgeResult<Self> {
        config.validate()?;

        let client = Client::builder()
            .timeout(Duration::from_secs(config.timeout_secs))
            .connect_timeout(Duration::from_secs(config.connect_timeout_secs))
            .build()
            .map_err(|e| EdgeError::ConfigInvalid {
                var: "http_client".to_string(),
                reason: e.to_string(),
            })?;

        info!(
            base_url = %config.base_url,
            account_id = %config.account_id,
            "Edge client created"
        );

        Ok(Self {
            config: Arc::new(config),
            client,
        })
    }

    /// URL of a namespace sub-resource, each segment percent-encoded.
    fn namespace_url(&self, namespace: Namespace, tail: &[&str]) -> EdgeResult<Url> {
        let mut url = Url::parse(&self.config.base_url).map_err(|e| EdgeError::ConfigInvalid {
            var: "EDGE_API_BASE_URL".to_string(),
            reason: e.to_string(),
        })?;
        {
            let mut segments = url.path_segments_mut().map_err(|()| EdgeError::ConfigInvalid {
                var: "EDGE_API_BASE_URL".to_string(),
                reason: "URL cannot be used as a base".to_string(),
            })?;
            segments
                .pop_if_empty()
                .extend([
                    "accounts",
                    self.config.account_id.as_str(),
                    "storage",
                    "kv",
                    "namespaces",
                    self.config.namespace_id(namespace),
                ])
                .extend(tail);
        }
        Ok(url)
    }

    /// Send a request, retrying transport errors and retryable statuses.
    async fn send_with_retry(
        &self,
        method: Method,
        url: Url,
        body: Option<&[KvPair]>,
    ) -> EdgeResult<Response> {
        let retry = &self.config.retry;
        let mut attempt = 0;

        loop {
            attempt += 1;

            let mut request = self
                .client
                .request(method.clone(), url.clone())
                .bearer_auth(&self.config.api_token);
            if let Some(entries) = body {
                request = request.json(entries);
            }

            debug!(url = %url, method = %method, attempt, "Sending edge request");

            match request.send().await {
                Ok(resp) => {
                    let status = resp.status();
                    if retry.should_retry(status.as_u16()) && attempt <= retry.max_retries {
                        let wait = if status == StatusCode::TOO_MANY_REQUESTS {
                            resp.headers()
                                .get(header::RETRY_AFTER)
                                .and_then(|v| v.to_str().ok())
                                .and_then(|v| retry_after(v, Utc::now()))
                                .map(|d| d.min(Duration::from_millis(retry.max_backoff_ms)))
                                .unwrap_or_else(|| retry.calculate_backoff(attempt))
                        } else {
                            retry.calculate_backoff(attempt)
                        };
                        warn!(
                            url = %url,
                            status = %status,
                            attempt,
                            wait_ms = wait.as_millis(),
                            "Transient edge response, retrying"
                        );
                        tokio::time::sleep(wait).await;
                        continue;
                    }
                    return Ok(resp);
                }
                Err(e) => {
                    if attempt <= retry.max_retries {
                        let wait = retry.calculate_backoff(attempt);
                        warn!(
                            url = %url,
                            error = %e,
                            attempt,
                            wait_ms = wait.as_millis(),
                            "Edge request failed, retrying"
                        );
                        tokio::time::sleep(wait).await;
                        continue;
                    }
                    return Err(EdgeError::Transport {
                        url: url.to_string(),
                        attempts: attempt,
                        source: e,
                    });
                }
            }
        }
    }

    /// Decode the structured envelope of a 2xx response.
    async fn read_envelope(resp: Response) -> EdgeResult<()> {
        let status = resp.status();
        let body = resp.text().await.map_err(|e| EdgeError::Decode(e.to_string()))?;

        if !status.is_success() {
            return Err(EdgeError::Http {
                status: status.as_u16(),
                body,
            });
        }

        let envelope: KvResponse =
            serde_json::from_str(&body).map_err(|e| EdgeError::Decode(e.to_string()))?;
        if !envelope.success {
            warn!(
                errors = ?envelope.errors,
                messages = ?envelope.messages,
                "Edge API reported failure"
            );
        }
        envelope.into_result()
    }
}

#[async_trait]
impl EdgeStore for EdgeClient {
    #[instrument(skip(self, entries), fields(namespace = namespace.as_str(), count = entries.len()))]
    async fn write(&self, namespace: Namespace, entries: Vec<KvPair>) -> EdgeResult<()> {
        let url = self.namespace_url(namespace, &["bulk"])?;
        let resp = self.send_with_retry(Method::PUT, url, Some(&entries)).await?;
        Self::read_envelope(resp).await?;
        debug!("Edge bulk write accepted");
        Ok(())
    }

    #[instrument(skip(self), fields(namespace = namespace.as_str()))]
    async fn delete(&self, namespace: Namespace, key: &str) -> EdgeResult<()> {
        let url = self.namespace_url(namespace, &["values", key])?;
        let resp = self.send_with_retry(Method::DELETE, url, None).await?;

        if resp.status() == StatusCode::NOT_FOUND {
            debug!(key = %key, "Edge key already absent");
            return Ok(());
        }

        Self::read_envelope(resp).await?;
        debug!(key = %key, "Edge key deleted");
        Ok(())
    }
}
