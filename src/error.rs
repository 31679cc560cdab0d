//! Cache Error Types
//!
//! Structured error handling for cache spaces and the remote tier.
//! `RemoteError` is what a remote store reports; `CacheError` is what
//! callers of a cache space see.

use std::time::Duration;

/// Result type for cache space operations
pub type CacheResult<T> = Result<T, CacheError>;

/// Errors reported by a remote store implementation
#[derive(Debug, thiserror::Error)]
pub enum RemoteError {
    #[error("Remote store unavailable: {0}")]
    Unavailable(String),

    #[error("Remote call timed out after {0:?}")]
    Timeout(Duration),

    #[error("Serialization error: {0}")]
    Serialization(String),

    #[error("Remote store error: {0}")]
    Backend(String),
}

impl RemoteError {
    /// Whether the failure is transient (connection or timeout) rather than
    /// a problem with the data itself
    pub fn is_transient(&self) -> bool {
        matches!(self, RemoteError::Unavailable(_) | RemoteError::Timeout(_))
    }
}

impl From<serde_json::Error> for RemoteError {
    fn from(err: serde_json::Error) -> Self {
        RemoteError::Serialization(err.to_string())
    }
}

/// Errors surfaced by cache space operations
#[derive(Debug, thiserror::Error)]
pub enum CacheError {
    /// Bad cache space configuration; fails space construction
    #[error("Invalid cache configuration: {0}")]
    InvalidConfig(String),

    /// The caller-supplied loader failed; nothing was cached
    #[error("Value loader failed: {0}")]
    Load(#[source] anyhow::Error),

    /// The remote tier could not be reached or did not answer in time
    #[error("Remote tier unavailable during {operation}: {source}")]
    RemoteUnavailable {
        operation: &'static str,
        #[source]
        source: RemoteError,
    },

    /// Background promotion workers need a Tokio runtime
    #[error("Runtime error: {0}")]
    Runtime(String),
}

impl CacheError {
    /// Wrap a remote store failure for the named operation
    pub fn remote(operation: &'static str, source: RemoteError) -> Self {
        CacheError::RemoteUnavailable { operation, source }
    }

    pub fn invalid_config(msg: impl Into<String>) -> Self {
        CacheError::InvalidConfig(msg.into())
    }

    /// Whether this error came from the remote tier
    pub fn is_remote(&self) -> bool {
        matches!(self, CacheError::RemoteUnavailable { .. })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_remote_error_transient() {
        assert!(RemoteError::Unavailable("refused".into()).is_transient());
        assert!(RemoteError::Timeout(Duration::from_millis(10)).is_transient());
        assert!(!RemoteError::Serialization("bad json".into()).is_transient());
        assert!(!RemoteError::Backend("WRONGTYPE".into()).is_transient());
    }

    #[test]
    fn test_cache_error_display() {
        let err = CacheError::remote("lookup", RemoteError::Unavailable("refused".into()));
        assert!(err.is_remote());
        assert_eq!(
            err.to_string(),
            "Remote tier unavailable during lookup: Remote store unavailable: refused"
        );

        let err = CacheError::invalid_config("max_size must be >= 1");
        assert!(!err.is_remote());
        assert!(err.to_string().contains("max_size"));
    }
}
