//! Error types for the deployment applier.

use thiserror::Error;

/// Result type alias for deployment operations
pub type Result<T> = std::result::Result<T, Error>;

/// Error taxonomy for a deployment run
///
/// Validation failures are fatal and reported before any remote call.
/// Provider failures carry the failed operation and the provider's own
/// detail so the operator can retry manually. Timeouts are reported
/// distinctly from outright failure, since the underlying resource may
/// still converge after the poll loop gave up.
#[derive(Debug, Error)]
pub enum Error {
    /// Descriptor rejected before anything was applied
    #[error("Invalid descriptor: {0}")]
    Validation(String),

    /// Descriptor file could not be read or parsed
    #[error("Descriptor error: {0}")]
    Descriptor(String),

    /// Configuration error
    #[error("Configuration error: {0}")]
    Config(String),

    /// Remote provider rejected or failed a request
    #[error("Provider error: {0}")]
    Provider(#[from] crate::provider::ProviderError),

    /// The watched resource never reached a healthy state in time
    #[error("Timed out after {elapsed_secs}s waiting for {what}")]
    Timeout { what: String, elapsed_secs: u64 },

    /// Poll loop aborted by the caller
    #[error("Cancelled while waiting for {0}")]
    Cancelled(String),

    /// Endpoint smoke test error
    #[error("Probe error: {0}")]
    Probe(#[from] reqwest::Error),

    /// JSON serialization error
    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    /// I/O error
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),
}

impl Error {
    /// True for errors the operator can resolve by simply re-running
    /// convergence once the remote side settles.
    pub fn is_retryable(&self) -> bool {
        matches!(self, Error::Provider(_) | Error::Timeout { .. })
    }
}
