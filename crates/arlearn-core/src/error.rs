//! Error types for ARLearn

use std::fmt;

use thiserror::Error;

/// Result type alias using ARLearn's Error
pub type Result<T> = std::result::Result<T, Error>;

/// Which backing store an error came from
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum StoreKind {
    Vector,
    Graph,
}

impl fmt::Display for StoreKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            StoreKind::Vector => write!(f, "vector"),
            StoreKind::Graph => write!(f, "graph"),
        }
    }
}

/// ARLearn error types with helpful messages and suggestions
#[derive(Error, Debug)]
pub enum Error {
    // Query errors (E001-E099)
    #[error("Invalid query: {0}")]
    InvalidQuery(String),

    #[error("Invalid input: {0}")]
    InvalidInput(String),

    // Store errors (E100-E199)
    #[error("The {store} store is unavailable: {reason}")]
    StoreUnavailable { store: StoreKind, reason: String },

    #[error("Database error: {0}")]
    DatabaseError(#[from] sqlx::Error),

    // Model service errors (E200-E299)
    #[error("Network error: {0}. Check your internet connection.")]
    NetworkError(#[from] reqwest::Error),

    #[error("Embedding generation failed: {0}")]
    EmbeddingFailed(String),

    #[error("Answer generation failed: {0}. Check your API key with `arlearn config get llm.api_key`.")]
    GenerationFailed(String),

    #[error("Rate limited. Waiting {0} seconds before retry.")]
    RateLimited(u64),

    // Config errors (E600-E699)
    #[error("Configuration error: {0}")]
    ConfigError(String),

    // Caller errors (E700-E799)
    #[error("Request cancelled by caller")]
    Cancelled,

    // Generic errors
    #[error("{0}")]
    Other(String),

    #[error(transparent)]
    Io(#[from] std::io::Error),
}

impl Error {
    /// Shorthand for a store failure on the given backend
    pub fn unavailable(store: StoreKind, reason: impl Into<String>) -> Self {
        Self::StoreUnavailable {
            store,
            reason: reason.into(),
        }
    }

    /// Get error code for this error type
    pub fn code(&self) -> &'static str {
        match self {
            Self::InvalidQuery(_) => "E001",
            Self::InvalidInput(_) => "E002",
            Self::StoreUnavailable { .. } => "E100",
            Self::DatabaseError(_) => "E101",
            Self::NetworkError(_) => "E200",
            Self::EmbeddingFailed(_) => "E201",
            Self::GenerationFailed(_) => "E202",
            Self::RateLimited(_) => "E203",
            Self::ConfigError(_) => "E600",
            Self::Cancelled => "E700",
            Self::Other(_) | Self::Io(_) => "E9999",
        }
    }

    /// Whether this error means a source could not be reached, as opposed to
    /// a malformed request. Only these are eligible for degraded-mode fallback.
    pub fn is_unavailable(&self) -> bool {
        matches!(
            self,
            Self::StoreUnavailable { .. }
                | Self::DatabaseError(_)
                | Self::NetworkError(_)
                | Self::EmbeddingFailed(_)
                | Self::RateLimited(_)
        )
    }

    /// Get suggestion for how to fix this error
    pub fn suggestion(&self) -> Option<String> {
        match self {
            Self::StoreUnavailable { store, .. } => Some(format!(
                "Check the {} store, or set `retrieval.dense_failure_policy` to `degraded`",
                store
            )),
            Self::NetworkError(_) => Some("Check internet connection".to_string()),
            Self::GenerationFailed(_) => Some("arlearn config get llm.api_key".to_string()),
            Self::ConfigError(_) => Some("arlearn config list".to_string()),
            Self::DatabaseError(_) => Some("arlearn config get storage.database_path".to_string()),
            _ => None,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_error_codes() {
        assert_eq!(Error::InvalidQuery("x".into()).code(), "E001");
        assert_eq!(Error::unavailable(StoreKind::Vector, "down").code(), "E100");
        assert_eq!(Error::Cancelled.code(), "E700");
        assert_eq!(Error::Other("x".into()).code(), "E9999");
    }

    #[test]
    fn test_store_unavailable_message() {
        let err = Error::unavailable(StoreKind::Graph, "connection refused");
        assert_eq!(
            err.to_string(),
            "The graph store is unavailable: connection refused"
        );
        assert!(err.suggestion().unwrap().contains("graph"));
    }

    #[test]
    fn test_is_unavailable() {
        assert!(Error::unavailable(StoreKind::Vector, "timeout").is_unavailable());
        assert!(Error::EmbeddingFailed("boom".into()).is_unavailable());
        assert!(!Error::InvalidQuery("dims".into()).is_unavailable());
        assert!(!Error::Cancelled.is_unavailable());
    }
}
