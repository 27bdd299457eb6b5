//! Error types for triagent-core

use thiserror::Error;

/// Main error type for the triagent-core library
#[derive(Error, Debug)]
pub enum Error {
    /// IO error
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    /// JSON parsing error
    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    /// Invalid severity, reference or normalization pattern
    #[error("invalid pattern: {0}")]
    Regex(#[from] regex::Error),

    /// Configuration error
    #[error("configuration error: {0}")]
    Config(String),

    /// A log source could not be opened or read
    #[error("log source {source_id} unavailable: {reason}")]
    SourceUnavailable { source_id: String, reason: String },

    /// A collaborator call ran past its deadline
    #[error("{operation} timed out after {timeout_ms}ms")]
    Timeout { operation: String, timeout_ms: u64 },

    /// The language model answered, but not in the expected shape
    #[error("malformed model response: {0}")]
    MalformedResponse(String),

    /// LLM error
    #[error("LLM error: {0}")]
    Llm(String),

    /// A downstream handler failed
    #[error("handler error: {0}")]
    Handler(String),
}

impl Error {
    /// Convenience constructor for [`Error::SourceUnavailable`].
    pub fn source_unavailable(source_id: impl Into<String>, reason: impl ToString) -> Self {
        Error::SourceUnavailable {
            source_id: source_id.into(),
            reason: reason.to_string(),
        }
    }
}

/// Result type alias for triagent-core
pub type Result<T> = std::result::Result<T, Error>;
