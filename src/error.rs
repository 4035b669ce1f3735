//! Error types for backend discovery.

use thiserror::Error;

/// Result type alias for discovery operations.
pub type Result<T> = std::result::Result<T, DiscoveryError>;

/// Errors surfaced to the caller of the discovery engine.
///
/// Probe failures are not represented here: a target that times out, refuses
/// the connection or answers with garbage is simply "not found".
#[derive(Debug, Error)]
pub enum DiscoveryError {
    /// Free-form address input could not be turned into an origin.
    #[error("invalid backend address: {0:?}")]
    InvalidAddress(String),

    /// Subnet prefix is not three dot-separated octets.
    #[error("invalid subnet prefix {0:?}: expected three octets such as 192.168.1")]
    InvalidPrefix(String),

    /// Persisted storage could not be read or written.
    #[error("storage error: {0}")]
    Storage(#[from] std::io::Error),

    /// Persisted value could not be encoded or decoded.
    #[error("serialization error: {0}")]
    Serialization(#[from] serde_json::Error),

    /// The HTTP client could not be constructed.
    #[error("http client error: {0}")]
    Client(#[from] reqwest::Error),
}
