//! Errors surfaced by [`crate::store::GraphStore`] implementations.

use codestory_core::ErrorCategory;
use thiserror::Error;

#[derive(Debug, Error)]
pub enum GraphError {
    #[error("graph backend unreachable after retries: {0}")]
    Connection(String),

    #[error("query failed: {0}")]
    Query(String),

    #[error("schema operation failed: {0}")]
    Schema(String),

    #[error("transaction failed: {0}")]
    Transaction(String),
}

impl GraphError {
    /// Matches the original connector's exception taxonomy: service
    /// unavailability is transient and retried, driver/query errors are
    /// surfaced immediately.
    pub fn category(&self) -> ErrorCategory {
        match self {
            GraphError::Connection(_) => ErrorCategory::Transient,
            GraphError::Query(_) | GraphError::Schema(_) | GraphError::Transaction(_) => {
                ErrorCategory::Permanent
            }
        }
    }
}

pub type Result<T> = std::result::Result<T, GraphError>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn connection_errors_are_transient() {
        assert_eq!(
            GraphError::Connection("refused".into()).category(),
            ErrorCategory::Transient
        );
    }

    #[test]
    fn query_errors_are_permanent() {
        assert_eq!(
            GraphError::Query("syntax error".into()).category(),
            ErrorCategory::Permanent
        );
    }
}
