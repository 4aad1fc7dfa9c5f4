//! Retry policy for edge API calls.

use std::time::Duration;

use rand::Rng;

/// Exponential backoff with jitter for transient edge API failures.
#[derive(Debug, Clone)]
pub struct RetryConfig {
    /// Maximum number of retry attempts after the first request.
    pub max_retries: u32,
    /// Initial backoff delay in milliseconds.
    pub initial_backoff_ms: u64,
    /// Maximum backoff delay in milliseconds.
    pub max_backoff_ms: u64,
    /// Backoff multiplier.
    pub backoff_multiplier: f64,
    /// Whether to add up to 25% jitter to each delay.
    pub use_jitter: bool,
    /// HTTP status codes that trigger a retry.
    pub retry_status_codes: Vec<u16>,
}

impl Default for RetryConfig {
    fn default() -> Self {
        Self {
            max_retries: 3,
            initial_backoff_ms: 100,
            max_backoff_ms: 5_000,
            backoff_multiplier: 2.0,
            use_jitter: true,
            retry_status_codes: vec![429, 502, 503, 504],
        }
    }
}

impl RetryConfig {
    /// Create a retry config with custom max retries.
    #[must_use]
    pub fn new(max_retries: u32) -> Self {
        Self {
            max_retries,
            ..Default::default()
        }
    }

    /// Disable retries.
    #[must_use]
    pub fn disabled() -> Self {
        Self::new(0)
    }

    /// Set initial backoff.
    #[must_use]
    pub fn with_initial_backoff(mut self, ms: u64) -> Self {
        self.initial_backoff_ms = ms;
        self
    }

    /// Set max backoff.
    #[must_use]
    pub fn with_max_backoff(mut self, ms: u64) -> Self {
        self.max_backoff_ms = ms;
        self
    }

    /// Calculate backoff duration for a given attempt (1-based).
    #[must_use]
    pub fn calculate_backoff(&self, attempt: u32) -> Duration {
        if attempt == 0 {
            return Duration::ZERO;
        }

        let exponent = i32::try_from(attempt - 1).unwrap_or(i32::MAX);
        let base = self.initial_backoff_ms as f64 * self.backoff_multiplier.powi(exponent);
        let capped = base.min(self.max_backoff_ms as f64);

        let delay_ms = if self.use_jitter && capped > 0.0 {
            let jitter_range = capped * 0.25;
            (capped + rand::thread_rng().gen_range(-jitter_range..=jitter_range)).max(0.0)
        } else {
            capped
        };

        Duration::from_millis(delay_ms as u64)
    }

    /// Check if a status code should trigger a retry.
    #[must_use]
    pub fn should_retry(&self, status_code: u16) -> bool {
        self.retry_status_codes.contains(&status_code)
    }
}
