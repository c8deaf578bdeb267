//! Typed error hierarchy for the progress client.
//!
//! Three top-level enums cover the three subsystems:
//! - `TransportError`: raw HTTP / IO failures from a single request
//! - `ProgressError`: failures the supervisor, poller and coordinator reason about
//! - `ConfigError`: loading and saving `pulse.toml`

use std::path::PathBuf;

use thiserror::Error;

/// Failure of a single HTTP exchange (stream open or status fetch).
#[derive(Debug, Clone, PartialEq, Error)]
pub enum TransportError {
    #[error("Unauthorized (HTTP 401)")]
    Unauthorized,

    #[error("Server returned HTTP {status}")]
    HttpStatus { status: u16 },

    #[error("Network error: {0}")]
    Network(String),

    #[error("Failed to decode response: {0}")]
    Decode(String),
}

impl TransportError {
    /// Classify an HTTP status code. Returns `None` for 2xx.
    pub fn from_status(status: u16) -> Option<Self> {
        match status {
            200..=299 => None,
            401 => Some(TransportError::Unauthorized),
            _ => Some(TransportError::HttpStatus { status }),
        }
    }

    /// Whether retrying the same request could succeed.
    pub fn is_retryable(&self) -> bool {
        !matches!(self, TransportError::Unauthorized)
    }
}

impl From<reqwest::Error> for TransportError {
    fn from(err: reqwest::Error) -> Self {
        if let Some(status) = err.status()
            && let Some(classified) = TransportError::from_status(status.as_u16())
        {
            return classified;
        }
        if err.is_decode() {
            TransportError::Decode(err.to_string())
        } else {
            TransportError::Network(err.to_string())
        }
    }
}

/// Errors the progress pipeline reasons about.
///
/// Retryable variants are absorbed by the supervisor up to its budget. Only
/// `Auth`, `RetryBudgetExhausted` and `BackendTaskFailure` ever reach a
/// consumer.
#[derive(Debug, Clone, PartialEq, Error)]
pub enum ProgressError {
    #[error("unauthorized: the credential was rejected by the server")]
    Auth,

    #[error("network error: {0}")]
    Network(String),

    #[error("stream endpoint returned HTTP {0}")]
    HttpStatus(u16),

    #[error("no heartbeat received within {timeout_ms} ms")]
    HeartbeatTimeout { timeout_ms: u64 },

    #[error("gave up after {attempts} reconnect attempts (last error: {last})")]
    RetryBudgetExhausted { attempts: u32, last: String },

    #[error("status poll failed: {0}")]
    PollingTransient(String),

    #[error("task failed [{code}]: {message}")]
    BackendTaskFailure { code: String, message: String },
}

impl ProgressError {
    /// Retryable errors are handled inside the supervisor's budget.
    pub fn is_retryable(&self) -> bool {
        matches!(
            self,
            ProgressError::Network(_)
                | ProgressError::HttpStatus(_)
                | ProgressError::HeartbeatTimeout { .. }
                | ProgressError::PollingTransient(_)
        )
    }

    /// Budget exhaustion is the only failure the coordinator recovers from by
    /// switching to polling.
    pub fn permits_fallback(&self) -> bool {
        matches!(self, ProgressError::RetryBudgetExhausted { .. })
    }
}

impl From<TransportError> for ProgressError {
    fn from(err: TransportError) -> Self {
        match err {
            TransportError::Unauthorized => ProgressError::Auth,
            TransportError::HttpStatus { status } => ProgressError::HttpStatus(status),
            TransportError::Network(msg) | TransportError::Decode(msg) => {
                ProgressError::Network(msg)
            }
        }
    }
}

/// Errors from loading, parsing or saving configuration.
#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("Failed to read config file at {path}: {source}")]
    Read {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("Failed to write config file at {path}: {source}")]
    Write {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("Failed to parse pulse.toml: {0}")]
    Parse(#[from] toml::de::Error),

    #[error("Failed to serialize pulse.toml: {0}")]
    Serialize(#[from] toml::ser::Error),

    #[error("Invalid value for {key}: {message}")]
    InvalidValue { key: String, message: String },
}
