//! Error classification shared by every adapter that retries.

use std::fmt;

/// How an adapter should react to a failure.
///
/// Mirrors the classification used throughout the pipeline: transient
/// failures are retried with backoff, permanent failures are surfaced
/// immediately, and infrastructure failures (out of memory, disk full)
/// are treated as non-retryable but distinct from a bad request.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ErrorCategory {
    Transient,
    Permanent,
    Infrastructure,
}

impl ErrorCategory {
    pub fn as_str(&self) -> &'static str {
        match self {
            ErrorCategory::Transient => "transient",
            ErrorCategory::Permanent => "permanent",
            ErrorCategory::Infrastructure => "infrastructure",
        }
    }

    pub fn is_retryable(&self) -> bool {
        matches!(self, ErrorCategory::Transient)
    }
}

impl fmt::Display for ErrorCategory {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn only_transient_is_retryable() {
        assert!(ErrorCategory::Transient.is_retryable());
        assert!(!ErrorCategory::Permanent.is_retryable());
        assert!(!ErrorCategory::Infrastructure.is_retryable());
    }

    #[test]
    fn display_matches_as_str() {
        for cat in [
            ErrorCategory::Transient,
            ErrorCategory::Permanent,
            ErrorCategory::Infrastructure,
        ] {
            assert_eq!(cat.to_string(), cat.as_str());
        }
    }
}
