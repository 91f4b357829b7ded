//! Error types for vector-memory

use std::time::Duration;

use serde::{Deserialize, Serialize};
use thiserror::Error;

/// Result type alias for vector-memory operations
pub type Result<T> = std::result::Result<T, Error>;

/// Errors that can occur in vector-memory
#[derive(Error, Debug)]
pub enum Error {
    #[error("Configuration error: {0}")]
    Config(String),

    #[error("Embedding error: {0}")]
    Embedding(String),

    #[error("Backend unavailable: {0}")]
    Backend(String),

    #[error("Authorization error: {0}")]
    Authorization(String),

    #[error("Invalid input: {0}")]
    InvalidInput(String),

    #[error("{operation} timed out after {after:?}")]
    Timeout {
        operation: &'static str,
        after: Duration,
    },

    #[error("Unsupported operation: {0}")]
    Unsupported(String),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
}

impl Error {
    pub fn config(msg: impl Into<String>) -> Self {
        Self::Config(msg.into())
    }

    pub fn embedding(msg: impl Into<String>) -> Self {
        Self::Embedding(msg.into())
    }

    pub fn backend(msg: impl Into<String>) -> Self {
        Self::Backend(msg.into())
    }

    pub fn authorization(msg: impl Into<String>) -> Self {
        Self::Authorization(msg.into())
    }

    pub fn invalid_input(msg: impl Into<String>) -> Self {
        Self::InvalidInput(msg.into())
    }

    pub fn unsupported(msg: impl Into<String>) -> Self {
        Self::Unsupported(msg.into())
    }

    /// The structured kind reported to callers in failure results
    pub fn kind(&self) -> ErrorKind {
        match self {
            Error::Config(_) => ErrorKind::ConfigurationError,
            Error::Embedding(_) => ErrorKind::EmbeddingFailure,
            Error::Backend(_) | Error::Io(_) => ErrorKind::BackendUnavailable,
            Error::Authorization(_) => ErrorKind::AuthorizationError,
            Error::InvalidInput(_) => ErrorKind::ValidationError,
            Error::Timeout { .. } => ErrorKind::Timeout,
            Error::Unsupported(_) => ErrorKind::Unsupported,
        }
    }
}

/// Discriminant of [`Error`] as seen across the tool boundary
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ErrorKind {
    ConfigurationError,
    EmbeddingFailure,
    BackendUnavailable,
    AuthorizationError,
    ValidationError,
    Timeout,
    Unsupported,
}

impl ErrorKind {
    /// Whether retrying the same call later may succeed
    pub fn is_recoverable(&self) -> bool {
        matches!(
            self,
            ErrorKind::EmbeddingFailure | ErrorKind::BackendUnavailable | ErrorKind::Timeout
        )
    }
}

impl std::fmt::Display for ErrorKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            ErrorKind::ConfigurationError => write!(f, "configuration_error"),
            ErrorKind::EmbeddingFailure => write!(f, "embedding_failure"),
            ErrorKind::BackendUnavailable => write!(f, "backend_unavailable"),
            ErrorKind::AuthorizationError => write!(f, "authorization_error"),
            ErrorKind::ValidationError => write!(f, "validation_error"),
            ErrorKind::Timeout => write!(f, "timeout"),
            ErrorKind::Unsupported => write!(f, "unsupported"),
        }
    }
}

/// Bound a future by `after`, mapping elapse to [`Error::Timeout`]
pub(crate) async fn bounded<T, F>(operation: &'static str, after: Duration, fut: F) -> Result<T>
where
    F: std::future::Future<Output = Result<T>>,
{
    match tokio::time::timeout(after, fut).await {
        Ok(result) => result,
        Err(_) => Err(Error::Timeout { operation, after }),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_kind_mapping() {
        assert_eq!(Error::config("x").kind(), ErrorKind::ConfigurationError);
        assert_eq!(Error::authorization("x").kind(), ErrorKind::AuthorizationError);
        assert_eq!(
            Error::from(std::io::Error::other("disk")).kind(),
            ErrorKind::BackendUnavailable
        );
        assert!(ErrorKind::Timeout.is_recoverable());
        assert!(!ErrorKind::AuthorizationError.is_recoverable());
    }

    #[test]
    fn test_kind_serializes_snake_case() {
        let json = serde_json::to_string(&ErrorKind::EmbeddingFailure).unwrap();
        assert_eq!(json, "\"embedding_failure\"");
        assert_eq!(ErrorKind::ValidationError.to_string(), "validation_error");
    }

    #[tokio::test]
    async fn test_bounded_times_out() {
        let result: Result<()> = bounded("sleep", Duration::from_millis(10), async {
            tokio::time::sleep(Duration::from_secs(5)).await;
            Ok(())
        })
        .await;
        assert!(matches!(result, Err(Error::Timeout { operation: "sleep", .. })));
    }
}
