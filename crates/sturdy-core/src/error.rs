//! Error types for sturdy

use thiserror::Error;

/// Core error type for driver and proxy operations
#[derive(Error, Debug)]
pub enum SturdyError {
    #[error("Connection error: {0}")]
    Connection(String),

    #[error("Query error: {0}")]
    Query(String),

    #[error("Driver error: {0}")]
    Driver(String),

    #[error("Transaction error: {0}")]
    Transaction(String),

    #[error("Configuration error: {0}")]
    Configuration(String),

    #[error("Invalid state: {0}")]
    InvalidState(String),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("Not supported: {0}")]
    NotSupported(String),

    #[error("Timeout: {0}")]
    Timeout(String),

    #[error("Cancelled")]
    Cancelled,

    #[error("Retry policy error: {0}")]
    Policy(String),

    #[error("{0}")]
    Other(String),
}

impl SturdyError {
    /// Whether this error usually clears up on its own.
    ///
    /// Retry policies may use this as their default classification. The
    /// proxies themselves never look at it.
    pub fn is_transient(&self) -> bool {
        matches!(
            self,
            SturdyError::Connection(_) | SturdyError::Io(_) | SturdyError::Timeout(_)
        )
    }
}

/// Result type alias for sturdy operations
pub type Result<T> = std::result::Result<T, SturdyError>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_transient_classification() {
        assert!(SturdyError::Connection("reset by peer".into()).is_transient());
        assert!(SturdyError::Timeout("login timeout".into()).is_transient());
        assert!(
            SturdyError::Io(std::io::Error::new(std::io::ErrorKind::BrokenPipe, "pipe")).is_transient()
        );

        assert!(!SturdyError::Query("syntax error".into()).is_transient());
        assert!(!SturdyError::InvalidState("closed".into()).is_transient());
        assert!(!SturdyError::Cancelled.is_transient());
    }

    #[test]
    fn test_error_display() {
        let err = SturdyError::Transaction("deadlock victim".into());
        assert_eq!(err.to_string(), "Transaction error: deadlock victim");
        assert_eq!(SturdyError::Cancelled.to_string(), "Cancelled");
    }
}
