use thiserror::Error;

/// Error taxonomy shared by every request boundary.
///
/// Each variant maps to one HTTP status class; see `status_code`.
#[derive(Debug, Error, Clone, PartialEq)]
pub enum Error {
    /// Malformed input to a tool or endpoint. Never retried.
    #[error("validation error: {0}")]
    Validation(String),

    /// Non-2xx or malformed response from the notice-search API.
    #[error("TED API {status}: {message}")]
    UpstreamApi { status: u16, message: String },

    /// A tool call exceeded its deadline.
    #[error("tool:{tool} timed out after {after_ms}ms")]
    Timeout { tool: String, after_ms: u64 },

    #[error("not found: {0}")]
    NotFound(String),

    /// Missing credentials or unusable configuration.
    #[error("configuration error: {0}")]
    Config(String),

    #[error("{0}")]
    Internal(String),
}

pub type Result<T> = std::result::Result<T, Error>;

impl Error {
    pub fn validation(msg: impl Into<String>) -> Self {
        Self::Validation(msg.into())
    }

    /// HTTP status this error surfaces as at a request boundary.
    pub fn status_code(&self) -> u16 {
        match self {
            Self::Validation(_) => 400,
            Self::NotFound(_) => 404,
            Self::UpstreamApi { .. } | Self::Timeout { .. } | Self::Config(_) | Self::Internal(_) => {
                500
            }
        }
    }

    /// Whether a bounded retry may be attempted for this error.
    pub fn is_retryable(&self) -> bool {
        !matches!(self, Self::Validation(_))
    }
}
