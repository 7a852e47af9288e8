use thiserror::Error;

/// Typed error hierarchy for marquee.
///
/// Use at component boundaries (provider calls, display trigger, policy sources,
/// config validation). Internal/leaf functions can continue using `anyhow::Result`;
/// the `Internal` variant allows seamless conversion via the `?` operator.
#[derive(Debug, Error)]
pub enum MarqueeError {
    #[error("Configuration error: {0}")]
    Config(String),

    #[error("SMS provider fetch failed: {message}")]
    ProviderFetch { message: String, retryable: bool },

    #[error("SMS provider send failed: {0}")]
    ProviderSend(String),

    #[error("Policy source '{source_name}' unavailable: {message}")]
    PolicySourceUnavailable {
        source_name: String,
        message: String,
    },

    #[error("Display trigger failed: {0}")]
    DisplayTrigger(String),

    #[error("Display queue is full (capacity {capacity})")]
    QueueOverflow { capacity: usize },

    #[error(transparent)]
    Internal(#[from] anyhow::Error),
}

impl MarqueeError {
    /// Whether this error is transient and the operation may succeed on a later attempt.
    pub fn is_retryable(&self) -> bool {
        match self {
            Self::ProviderFetch { retryable, .. } => *retryable,
            Self::ProviderSend(_) | Self::QueueOverflow { .. } | Self::Internal(_) => true,
            Self::Config(_) | Self::PolicySourceUnavailable { .. } | Self::DisplayTrigger(_) => {
                false
            }
        }
    }
}

/// Convenience alias for results using `MarqueeError`.
pub type MarqueeResult<T> = std::result::Result<T, MarqueeError>;
