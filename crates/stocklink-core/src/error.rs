//! Error types for Stock-Link

use std::time::Duration;
use thiserror::Error;

/// Result type alias for Stock-Link operations
pub type StockLinkResult<T> = Result<T, StockLinkError>;

/// Main error type for Stock-Link
#[derive(Error, Debug)]
pub enum StockLinkError {
    #[error("Cache error: {0}")]
    Cache(String),

    #[error("Install error: {0}")]
    Install(String),

    #[error("Network error: {0}")]
    Network(String),

    #[error("Checkout error: {0}")]
    Checkout(String),

    #[error("Session error: {0}")]
    Session(String),

    #[error("Analytics error: {0}")]
    Analytics(String),

    #[error("Configuration error: {0}")]
    Config(String),

    #[error("Not found: {0}")]
    NotFound(String),

    #[error("Operation timed out after {0:?}")]
    Timeout(Duration),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("URL error: {0}")]
    Url(#[from] url::ParseError),

    #[error(transparent)]
    Other(#[from] anyhow::Error),
}

impl StockLinkError {
    /// Create a new cache error
    pub fn cache(msg: impl Into<String>) -> Self {
        Self::Cache(msg.into())
    }

    /// Create a new install error
    pub fn install(msg: impl Into<String>) -> Self {
        Self::Install(msg.into())
    }

    /// Create a new network error
    pub fn network(msg: impl Into<String>) -> Self {
        Self::Network(msg.into())
    }

    /// Create a new checkout error
    pub fn checkout(msg: impl Into<String>) -> Self {
        Self::Checkout(msg.into())
    }

    /// Create a new session error
    pub fn session(msg: impl Into<String>) -> Self {
        Self::Session(msg.into())
    }

    /// Create a new analytics error
    pub fn analytics(msg: impl Into<String>) -> Self {
        Self::Analytics(msg.into())
    }

    /// Create a new configuration error
    pub fn config(msg: impl Into<String>) -> Self {
        Self::Config(msg.into())
    }

    /// Check if this error is worth retrying.
    pub fn is_retryable(&self) -> bool {
        matches!(
            self,
            StockLinkError::Network(_) | StockLinkError::Timeout(_) | StockLinkError::Io(_)
        )
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_constructors() {
        assert!(matches!(
            StockLinkError::cache("boom"),
            StockLinkError::Cache(_)
        ));
        assert!(matches!(
            StockLinkError::network("down"),
            StockLinkError::Network(_)
        ));
    }

    #[test]
    fn test_retryable() {
        assert!(StockLinkError::network("down").is_retryable());
        assert!(StockLinkError::Timeout(Duration::from_secs(1)).is_retryable());
        assert!(!StockLinkError::checkout("invalid").is_retryable());
    }
}
