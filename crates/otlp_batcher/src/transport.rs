use bytes::Bytes;
use reqwest::header::CONTENT_TYPE;
use std::future::Future;
use std::sync::{PoisonError, RwLock};
use std::time::Duration;
use thiserror::Error;
use tracing::{debug, trace};

/// Content type of every OTLP/HTTP request body.
pub const PROTOBUF_CONTENT_TYPE: &str = "application/x-protobuf";

/// Why a single send attempt failed.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum TransportError {
    /// Collector answered with a non-2xx status.
    #[error("collector returned status {status}: {body}")]
    Status { status: u16, body: String },
    /// Connection, DNS or protocol failure before a response arrived.
    #[error("request failed: {0}")]
    Request(String),
    /// No response within the request timeout.
    #[error("request timed out")]
    Timeout,
    /// Transport already shut down.
    #[error("transport is closed")]
    Closed,
}

/// One-shot delivery of an encoded payload to a URL.
///
/// Implementations make exactly one attempt per call; retrying is layered on
/// top by [`RetryingClient`](crate::RetryingClient). Uses native async fn in
/// traits, so implementors can write `async fn send`.
pub trait Transport: Send + Sync + 'static {
    /// Sends `payload` to `url`. `Ok` means the collector accepted it.
    fn send(
        &self,
        url: &str,
        payload: Bytes,
    ) -> impl Future<Output = Result<(), TransportError>> + Send;

    /// Releases pooled connections. Later sends fail with
    /// [`TransportError::Closed`].
    fn shutdown(&self);

    /// Returns the transport name for debugging.
    fn name(&self) -> &str;
}

/// OTLP/HTTP transport backed by a pooled `reqwest` client.
pub struct HttpTransport {
    client: RwLock<Option<reqwest::Client>>,
}

impl HttpTransport {
    /// Creates a transport whose requests time out after `timeout`.
    pub fn new(timeout: Duration) -> Result<Self, TransportError> {
        let client = reqwest::Client::builder()
            .timeout(timeout)
            .build()
            .map_err(|e| TransportError::Request(e.to_string()))?;

        Ok(Self::with_client(client))
    }

    /// Wraps an already configured client.
    pub fn with_client(client: reqwest::Client) -> Self {
        Self {
            client: RwLock::new(Some(client)),
        }
    }

    // reqwest::Client is an Arc handle; cloning it out keeps the lock off
    // the await path.
    fn client(&self) -> Option<reqwest::Client> {
        self.client
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .clone()
    }

    pub fn is_closed(&self) -> bool {
        self.client
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .is_none()
    }
}

impl Transport for HttpTransport {
    async fn send(&self, url: &str, payload: Bytes) -> Result<(), TransportError> {
        let client = self.client().ok_or(TransportError::Closed)?;
        let size = payload.len();

        let response = client
            .post(url)
            .header(CONTENT_TYPE, PROTOBUF_CONTENT_TYPE)
            .body(payload)
            .send()
            .await
            .map_err(|e| {
                if e.is_timeout() {
                    TransportError::Timeout
                } else {
                    TransportError::Request(e.to_string())
                }
            })?;

        let status = response.status();
        if status.is_success() {
            trace!(url, bytes = size, status = status.as_u16(), "payload accepted");
            return Ok(());
        }

        let body = response.text().await.unwrap_or_default();
        Err(TransportError::Status {
            status: status.as_u16(),
            body,
        })
    }

    fn shutdown(&self) {
        let released = self
            .client
            .write()
            .unwrap_or_else(PoisonError::into_inner)
            .take();
        if released.is_some() {
            debug!("http transport closed");
        }
    }

    fn name(&self) -> &str {
        "http"
    }
}

/// Test transport that records every payload and always succeeds
#[cfg(test)]
pub struct RecordingTransport {
    sent: std::sync::Mutex<Vec<(String, Bytes)>>,
    closed: std::sync::atomic::AtomicBool,
    delay: std::time::Duration,
}

#[cfg(test)]
impl RecordingTransport {
    pub fn new() -> Self {
        Self {
            sent: std::sync::Mutex::new(Vec::new()),
            closed: std::sync::atomic::AtomicBool::new(false),
            delay: std::time::Duration::ZERO,
        }
    }

    /// Each send takes `delay` before it is recorded.
    pub fn with_delay(delay: std::time::Duration) -> Self {
        Self {
            delay,
            ..Self::new()
        }
    }

    pub fn sent(&self) -> Vec<(String, Bytes)> {
        self.sent.lock().unwrap().clone()
    }

    pub fn sent_to(&self, suffix: &str) -> Vec<Bytes> {
        self.sent
            .lock()
            .unwrap()
            .iter()
            .filter(|(url, _)| url.ends_with(suffix))
            .map(|(_, payload)| payload.clone())
            .collect()
    }

    pub fn is_closed(&self) -> bool {
        self.closed.load(std::sync::atomic::Ordering::SeqCst)
    }
}

#[cfg(test)]
impl Transport for RecordingTransport {
    async fn send(&self, url: &str, payload: Bytes) -> Result<(), TransportError> {
        if self.is_closed() {
            return Err(TransportError::Closed);
        }
        if !self.delay.is_zero() {
            tokio::time::sleep(self.delay).await;
        }
        self.sent.lock().unwrap().push((url.to_string(), payload));
        Ok(())
    }

    fn shutdown(&self) {
        self.closed.store(true, std::sync::atomic::Ordering::SeqCst);
    }

    fn name(&self) -> &str {
        "recording"
    }
}

/// Lets a test keep a handle on what was sent after the exporter is gone.
#[cfg(test)]
impl Transport for std::sync::Arc<RecordingTransport> {
    async fn send(&self, url: &str, payload: Bytes) -> Result<(), TransportError> {
        (**self).send(url, payload).await
    }

    fn shutdown(&self) {
        (**self).shutdown()
    }

    fn name(&self) -> &str {
        (**self).name()
    }
}
