// Error types module

use thiserror::Error;

/// Errors raised by the shared-state store collaborator
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum StoreError {
    /// Could not reach the store
    #[error("Store connection failed: {0}")]
    Connection(String),

    /// The store rejected or failed a command
    #[error("Store command failed: {0}")]
    Command(String),

    /// A command did not finish within the operation timeout
    #[error("Store operation timed out after {0}ms")]
    Timeout(u64),

    /// A stored field could not be parsed
    #[error("Malformed value for field '{field}': {value}")]
    MalformedValue { field: String, value: String },
}

impl From<redis::RedisError> for StoreError {
    fn from(err: redis::RedisError) -> Self {
        if err.is_connection_refusal() || err.is_connection_dropped() {
            StoreError::Connection(err.to_string())
        } else {
            StoreError::Command(err.to_string())
        }
    }
}

/// Rejections raised by a storage circuit breaker
///
/// Every variant carries a `retry_after` hint in seconds so callers can
/// schedule their own backoff without knowing the breaker thresholds.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum BreakerError {
    /// Sustained failure, do not retry soon
    #[error("Circuit for storage '{storage}' is open, retry after {retry_after}s")]
    CircuitOpen { storage: String, retry_after: u64 },

    /// Recent failure, short cool-down
    #[error("Backing off access to storage '{storage}', retry after {retry_after}s")]
    Failing { storage: String, retry_after: u64 },

    /// A fresh accessibility probe just failed
    #[error("Storage '{storage}' is not accessible, retry after {retry_after}s")]
    Inaccessible { storage: String, retry_after: u64 },

    /// Storage is missing from configuration or has no path
    #[error("{message}")]
    Misconfiguration { message: String, retry_after: u64 },

    /// The shared store failed while the breaker was consulting it
    #[error(transparent)]
    Store(#[from] StoreError),
}

impl BreakerError {
    /// Seconds the caller should wait before trying again
    pub fn retry_after(&self) -> u64 {
        match self {
            BreakerError::CircuitOpen { retry_after, .. }
            | BreakerError::Failing { retry_after, .. }
            | BreakerError::Inaccessible { retry_after, .. }
            | BreakerError::Misconfiguration { retry_after, .. } => *retry_after,
            BreakerError::Store(_) => 0,
        }
    }

    /// Short machine-readable reason, used as a metrics label
    pub fn reason(&self) -> &'static str {
        match self {
            BreakerError::CircuitOpen { .. } => "circuit_open",
            BreakerError::Failing { .. } => "failing",
            BreakerError::Inaccessible { .. } => "inaccessible",
            BreakerError::Misconfiguration { .. } => "misconfiguration",
            BreakerError::Store(_) => "store",
        }
    }
}
