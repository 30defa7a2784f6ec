//! Validation error model.

use thiserror::Error;

/// Result type returned by the strict validation entry points.
pub type ValidationResult<T> = Result<T, ValidationError>;

/// Terminal failure of a validation pipeline.
///
/// Variants never carry decrypted plaintext. Reasons attached to the
/// `Invalid*` variants come from a fixed vocabulary and do not distinguish
/// between cryptographic failure causes.
#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum ValidationError {
    /// Malformed, undecryptable or badly formatted token envelope.
    #[error("invalid token: {0}")]
    InvalidToken(String),

    /// Malformed, undecryptable or badly formatted message envelope.
    #[error("invalid message: {0}")]
    InvalidMessage(String),

    /// The token's client is not on the allow-list.
    #[error("unauthorized client")]
    UnauthorizedClient,

    /// The client exceeded its request ceiling for the current window.
    #[error(
        "rate limit exceeded for {client}: {attempts}/{max_requests} requests per {window_secs}s"
    )]
    RateLimitExceeded {
        client: String,
        attempts: u64,
        max_requests: u64,
        window_secs: u64,
    },

    #[error("stale token")]
    StaleToken,

    #[error("stale message")]
    StaleMessage,

    /// Replay detected: the token was already consumed.
    #[error("token already used")]
    UsedToken,

    /// Replay detected: the message was already consumed.
    #[error("message already used")]
    UsedMessage,

    /// The shared store could not prove the envelope unused (fail closed).
    #[error("infrastructure error: {0}")]
    Infrastructure(String),
}

impl ValidationError {
    pub fn invalid_token(reason: impl Into<String>) -> Self {
        Self::InvalidToken(reason.into())
    }

    pub fn invalid_message(reason: impl Into<String>) -> Self {
        Self::InvalidMessage(reason.into())
    }

    pub fn infrastructure(reason: impl Into<String>) -> Self {
        Self::Infrastructure(reason.into())
    }

    /// True when the failure came from the shared store rather than the input.
    pub fn is_infrastructure(&self) -> bool {
        matches!(self, Self::Infrastructure(_))
    }

    /// Short, stable label for logs and metrics. Never includes input data.
    pub fn kind(&self) -> &'static str {
        match self {
            Self::InvalidToken(_) => "invalid_token",
            Self::InvalidMessage(_) => "invalid_message",
            Self::UnauthorizedClient => "unauthorized_client",
            Self::RateLimitExceeded { .. } => "rate_limit_exceeded",
            Self::StaleToken => "stale_token",
            Self::StaleMessage => "stale_message",
            Self::UsedToken => "used_token",
            Self::UsedMessage => "used_message",
            Self::Infrastructure(_) => "infrastructure",
        }
    }
}
