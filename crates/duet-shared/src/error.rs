use thiserror::Error;

/// Errors surfaced by the messaging core.
///
/// The variants carry enough structure for an outer transport layer to
/// pick its own status mapping (HTTP, RPC codes) without string
/// matching.
#[derive(Error, Debug)]
pub enum MessagingError {
    /// Malformed input: empty body, unknown kind, self-chat. Rejected
    /// synchronously, never persisted.
    #[error("Validation error: {0}")]
    Validation(String),

    /// Unknown chat/message/notification on a read or update. No
    /// partial effect.
    #[error("{0} not found")]
    NotFound(&'static str),

    /// Operation attempted by an actor who does not own the target.
    #[error("Unauthorized: {0}")]
    Unauthorized(String),

    /// Storage-layer failure. Safe to retry for operations below the
    /// log-append boundary; swallowed above it.
    #[error("Storage error: {0}")]
    Storage(String),
}
