//! Error types shared across the ragchat crates.
//!
//! Every fallible operation in the workspace returns `AppResult<T>`. The graph
//! crate decides per node whether an `AppError` is recoverable (fallback plus an
//! `error_messages` entry) or aborts the turn.

use thiserror::Error;

/// Unified error type for ragchat.
#[derive(Error, Debug)]
pub enum AppError {
    /// Configuration-related errors
    #[error("Configuration error: {0}")]
    Config(String),

    /// I/O and filesystem errors
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    /// Language-model backend errors
    #[error("LLM error: {0}")]
    Llm(String),

    /// Dense or sparse embedding errors
    #[error("Embedding error: {0}")]
    Embedding(String),

    /// Vector store errors
    #[error("Vector store error: {0}")]
    VectorStore(String),

    /// Retrieval and reranking errors
    #[error("Knowledge error: {0}")]
    Knowledge(String),

    /// Prompt system errors
    #[error("Prompt error: {0}")]
    Prompt(String),

    /// Credential provisioning errors
    #[error("Secret error: {0}")]
    Secret(String),

    /// A remote call exceeded its deadline
    #[error("Timed out after {0} ms")]
    Timeout(u64),

    /// The caller cancelled the request
    #[error("Cancelled")]
    Cancelled,

    /// Serialization/deserialization errors
    #[error("Serialization error: {0}")]
    Serialization(String),

    /// Generic errors
    #[error("{0}")]
    Other(String),
}

impl AppError {
    /// Whether a single retry at the call site may succeed.
    ///
    /// Timeouts and transport-level failures of remote backends are transient.
    /// Configuration, parsing and cancellation are not.
    pub fn is_transient(&self) -> bool {
        match self {
            AppError::Timeout(_) => true,
            AppError::Io(err) => matches!(
                err.kind(),
                std::io::ErrorKind::ConnectionRefused
                    | std::io::ErrorKind::ConnectionReset
                    | std::io::ErrorKind::ConnectionAborted
                    | std::io::ErrorKind::TimedOut
                    | std::io::ErrorKind::Interrupted
            ),
            AppError::Llm(_)
            | AppError::Embedding(_)
            | AppError::VectorStore(_)
            | AppError::Knowledge(_)
            | AppError::Secret(_) => true,
            AppError::Config(_)
            | AppError::Prompt(_)
            | AppError::Cancelled
            | AppError::Serialization(_)
            | AppError::Other(_) => false,
        }
    }

    /// Short category name, safe to show to end users.
    pub fn kind(&self) -> &'static str {
        match self {
            AppError::Config(_) => "config",
            AppError::Io(_) => "io",
            AppError::Llm(_) => "llm",
            AppError::Embedding(_) => "embedding",
            AppError::VectorStore(_) => "vector_store",
            AppError::Knowledge(_) => "knowledge",
            AppError::Prompt(_) => "prompt",
            AppError::Secret(_) => "secret",
            AppError::Timeout(_) => "timeout",
            AppError::Cancelled => "cancelled",
            AppError::Serialization(_) => "serialization",
            AppError::Other(_) => "other",
        }
    }
}

impl From<serde_json::Error> for AppError {
    fn from(err: serde_json::Error) -> Self {
        AppError::Serialization(err.to_string())
    }
}

impl From<serde_yaml::Error> for AppError {
    fn from(err: serde_yaml::Error) -> Self {
        AppError::Serialization(err.to_string())
    }
}

/// Convenience type alias for Results with AppError.
pub type AppResult<T> = Result<T, AppError>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_transient_classification() {
        assert!(AppError::Timeout(500).is_transient());
        assert!(AppError::VectorStore("connection refused".into()).is_transient());
        assert!(!AppError::Cancelled.is_transient());
        assert!(!AppError::Config("bad".into()).is_transient());

        let io = std::io::Error::new(std::io::ErrorKind::ConnectionReset, "reset");
        assert!(AppError::from(io).is_transient());
        let io = std::io::Error::new(std::io::ErrorKind::NotFound, "missing");
        assert!(!AppError::from(io).is_transient());
    }

    #[test]
    fn test_kind_omits_details() {
        let err = AppError::VectorStore("connect to db.internal:6333 refused".into());
        assert_eq!(err.kind(), "vector_store");
        assert_eq!(AppError::Timeout(50).kind(), "timeout");
        assert_eq!(AppError::Cancelled.kind(), "cancelled");
    }

    #[test]
    fn test_serde_conversion() {
        let err: AppError = serde_json::from_str::<serde_json::Value>("{")
            .unwrap_err()
            .into();
        assert!(matches!(err, AppError::Serialization(_)));
    }
}
