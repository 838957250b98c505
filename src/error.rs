//! Error types for planner-sync.

use thiserror::Error;

/// Errors raised by the sync core and the CLI around it.
#[derive(Error, Debug)]
pub enum SyncError {
    /// Local database failure.
    #[error("Database error: {0}")]
    Database(String),

    /// Configuration could not be read, written or understood.
    #[error("Configuration error: {0}")]
    Config(String),

    /// Filesystem error.
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    /// JSON (de)serialization failure.
    #[error("Parse error: {0}")]
    Parse(#[from] serde_json::Error),

    /// Caller supplied something the core cannot act on.
    #[error("Invalid input: {0}")]
    InvalidInput(String),

    /// A record that was asked for does not exist.
    #[error("Not found: {0}")]
    NotFound(String),

    /// The remote call never produced an HTTP response.
    #[error("Transport error: {0}")]
    Transport(String),

    /// The trigger coordinator is no longer running.
    #[error("Coordinator error: {0}")]
    Coordinator(String),

    /// A platform capability is missing or refused.
    #[error("Unsupported: {0}")]
    Unsupported(String),
}

impl From<serde_yaml::Error> for SyncError {
    fn from(e: serde_yaml::Error) -> Self {
        Self::Config(e.to_string())
    }
}

impl From<reqwest::Error> for SyncError {
    fn from(e: reqwest::Error) -> Self {
        if e.is_timeout() {
            Self::Transport(format!("request timed out: {e}"))
        } else {
            Self::Transport(e.to_string())
        }
    }
}

impl SyncError {
    /// Whether a failure is worth retrying later.
    #[must_use]
    pub const fn is_transient(&self) -> bool {
        matches!(self, Self::Transport(_) | Self::Database(_) | Self::Io(_))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_display_includes_context() {
        let err = SyncError::NotFound("action abc".to_string());
        assert_eq!(err.to_string(), "Not found: action abc");
    }

    #[test]
    fn test_transient_classification() {
        assert!(SyncError::Transport("reset".to_string()).is_transient());
        assert!(!SyncError::InvalidInput("bad".to_string()).is_transient());
        assert!(!SyncError::Unsupported("no bg sync".to_string()).is_transient());
    }

    #[test]
    fn test_from_json_error() {
        let json_err = serde_json::from_str::<serde_json::Value>("{").unwrap_err();
        let err: SyncError = json_err.into();
        assert!(matches!(err, SyncError::Parse(_)));
    }
}
