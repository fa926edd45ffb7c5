use crate::config::TelemetryConfig;
use std::fmt;

/// The three telemetry signal types. Each is buffered, flushed and exported
/// independently of the others.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Signal {
    Traces,
    Logs,
    Metrics,
}

impl Signal {
    pub const ALL: [Signal; 3] = [Signal::Traces, Signal::Logs, Signal::Metrics];

    /// OTLP/HTTP path appended to the collector base URL.
    pub fn path(self) -> &'static str {
        match self {
            Signal::Traces => "/v1/traces",
            Signal::Logs => "/v1/logs",
            Signal::Metrics => "/v1/metrics",
        }
    }

    pub fn as_str(self) -> &'static str {
        match self {
            Signal::Traces => "traces",
            Signal::Logs => "logs",
            Signal::Metrics => "metrics",
        }
    }

    pub(crate) fn index(self) -> usize {
        match self {
            Signal::Traces => 0,
            Signal::Logs => 1,
            Signal::Metrics => 2,
        }
    }
}

impl fmt::Display for Signal {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Full per-signal URLs, derived once from the configured endpoint.
#[derive(Debug, Clone)]
pub struct Endpoints {
    urls: [String; 3],
}

impl Endpoints {
    pub fn new(config: &TelemetryConfig) -> Self {
        let base = config.base_endpoint();
        Self {
            urls: Signal::ALL.map(|signal| format!("{}{}", base, signal.path())),
        }
    }

    pub fn url(&self, signal: Signal) -> &str {
        &self.urls[signal.index()]
    }
}
