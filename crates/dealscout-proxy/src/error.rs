//! Error types for the proxy pool.

use thiserror::Error;

/// Errors raised while loading proxy sources or persisting snapshots.
///
/// Probe failures are never errors: they are recorded as health.
#[derive(Debug, Error)]
pub enum ProxyError {
    /// Reading the source list or the snapshot file failed
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    /// The snapshot file could not be encoded or decoded
    #[error("snapshot error: {0}")]
    Snapshot(#[from] serde_json::Error),
}

/// Result type alias for proxy operations.
pub type Result<T> = std::result::Result<T, ProxyError>;

impl From<ProxyError> for dealscout_core::ScoutError {
    fn from(err: ProxyError) -> Self {
        dealscout_core::ScoutError::Proxy(err.to_string())
    }
}
