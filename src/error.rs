//! Heimdallr error types

use std::time::Duration;

/// Heimdallr error types
#[derive(Debug, thiserror::Error)]
pub enum HeimdallrError {
    // Admission errors
    /// The admission wait exceeded the caller's maximum. No call was made,
    /// so the caller may safely retry later without double-spending quota.
    #[error("admission wait for provider '{provider}' exceeded {max_wait:?}")]
    AdmissionTimeout { provider: String, max_wait: Duration },

    #[error("unknown provider: {0}")]
    UnknownProvider(String),

    #[error("configuration error: {0}")]
    Configuration(String),

    // Batch errors
    /// The shared processor call for a multi-item flush failed. Every item
    /// in that flush receives this error; the failure is not attributable
    /// to any single item.
    #[error("batch flush failed: {0}")]
    BatchFailure(String),

    /// A single-item processor call failed. Only that item fails.
    #[error("item processing failed: {0}")]
    ItemFailure(String),

    #[error("aggregator is shut down")]
    ShuttingDown,

    /// An item's completion channel closed without ever settling. This
    /// indicates a bug in flush bookkeeping, not a provider failure.
    #[error("completion channel dropped before settling")]
    CompletionLost,

    // Downstream errors
    /// Opaque failure from the caller-supplied processor or task.
    #[error("provider call failed: {0}")]
    Provider(String),

    #[error("invalid input: {0}")]
    InvalidInput(String),
}

/// Result type alias for heimdallr operations
pub type Result<T> = std::result::Result<T, HeimdallrError>;
