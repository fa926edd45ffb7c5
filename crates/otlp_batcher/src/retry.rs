//! Retrying Transport Client
//!
//! [`RetryingClient`] wraps any [`Transport`] with bounded exponential backoff:
//!
//! - attempt 0 is immediate
//! - retry `n` (1-based) waits `initial_delay * 2^(n-1)` first, with no jitter
//! - after `max_retries` failed retries the payload is dropped
//!
//! With the defaults (3 retries, 1s) the waits are 1s, 2s, 4s. There is no
//! disk spillover and no re-buffering, which bounds both memory and the time a
//! flush can take. Failure details are logged here and reduced to a `bool`
//! so callers stay error-unaware.

use crate::transport::Transport;
use bytes::Bytes;
use std::sync::atomic::{AtomicU64, Ordering};
use std::time::Duration;
use tokio::time::sleep;
use tracing::{debug, warn};

/// Configuration for retry behavior.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RetryConfig {
    /// Maximum number of retry attempts (0 = no retries, just the initial attempt).
    pub max_retries: u32,
    /// Delay before the first retry; doubles for each retry after it.
    pub initial_delay: Duration,
}

impl Default for RetryConfig {
    fn default() -> Self {
        Self {
            max_retries: 3,
            initial_delay: Duration::from_secs(1),
        }
    }
}

impl RetryConfig {
    pub fn new(max_retries: u32, initial_delay: Duration) -> Self {
        Self {
            max_retries,
            initial_delay,
        }
    }

    /// Calculate delay for a given attempt number (0-indexed).
    pub fn delay_for_attempt(&self, attempt: u32) -> Duration {
        if attempt == 0 {
            return Duration::ZERO;
        }
        let factor = 2u32.saturating_pow(attempt - 1);
        self.initial_delay.saturating_mul(factor)
    }

    /// Total number of attempts including the first one.
    pub fn max_attempts(&self) -> u32 {
        self.max_retries.saturating_add(1)
    }
}

/// A transport wrapper that retries failed sends with exponential backoff.
///
/// # Example
///
/// ```ignore
/// let client = RetryingClient::new(HttpTransport::new(timeout)?, RetryConfig::default());
///
/// // Up to 4 attempts: now, +1s, +2s, +4s
/// let delivered = client.send_with_retries(url, payload).await;
/// ```
pub struct RetryingClient<T: Transport> {
    transport: T,
    config: RetryConfig,
    /// Metrics: total retry attempts made
    total_retries: AtomicU64,
    /// Metrics: successful sends after retry (not first attempt)
    recovered_sends: AtomicU64,
}

impl<T: Transport> RetryingClient<T> {
    pub fn new(transport: T, config: RetryConfig) -> Self {
        Self {
            transport,
            config,
            total_retries: AtomicU64::new(0),
            recovered_sends: AtomicU64::new(0),
        }
    }

    /// Sends `payload` to `url`, retrying per the configured policy.
    ///
    /// Returns `true` once any attempt succeeds, `false` after
    /// `max_retries + 1` failed attempts. Never panics or propagates errors.
    pub async fn send_with_retries(&self, url: &str, payload: Bytes) -> bool {
        let max_attempts = self.config.max_attempts();

        for attempt in 0..max_attempts {
            // Wait before retry (no delay on first attempt)
            let delay = self.config.delay_for_attempt(attempt);
            if !delay.is_zero() {
                self.total_retries.fetch_add(1, Ordering::Relaxed);
                sleep(delay).await;
                debug!(url, attempt = attempt + 1, "retrying export");
            }

            // Bytes clone is a refcount bump, not a copy
            match self.transport.send(url, payload.clone()).await {
                Ok(()) => {
                    if attempt > 0 {
                        self.recovered_sends.fetch_add(1, Ordering::Relaxed);
                    }
                    return true;
                }
                Err(e) => {
                    debug!(url, attempt = attempt + 1, error = %e, "export attempt failed");
                }
            }
        }

        warn!(
            url,
            retries = self.config.max_retries,
            transport = self.transport.name(),
            "export failed after all retries, dropping batch"
        );
        false
    }

    /// Releases the underlying transport.
    pub fn shutdown(&self) {
        self.transport.shutdown();
    }

    pub fn transport(&self) -> &T {
        &self.transport
    }

    pub fn config(&self) -> &RetryConfig {
        &self.config
    }

    /// Returns the total number of retry attempts made.
    pub fn total_retries(&self) -> u64 {
        self.total_retries.load(Ordering::Relaxed)
    }

    /// Returns sends that succeeded after at least one retry.
    pub fn recovered_sends(&self) -> u64 {
        self.recovered_sends.load(Ordering::Relaxed)
    }
}
