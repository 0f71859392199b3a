use thiserror::Error;

/// Errors surfaced by the subscription engine
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum WatchError {
    /// Malformed subscribe request
    #[error("invalid argument: {0}")]
    InvalidArgument(String),

    /// Operation on an unknown subscription (or entity) id
    #[error("not found: {0}")]
    NotFound(String),

    /// Event source disconnected; cached state is still served
    #[error("upstream event source unavailable")]
    UpstreamUnavailable,

    /// Callback sink rejected or timed out
    #[error("delivery to callback '{callback_id}' failed: {reason}")]
    DeliveryFailed { callback_id: String, reason: String },
}

pub type Result<T> = std::result::Result<T, WatchError>;
