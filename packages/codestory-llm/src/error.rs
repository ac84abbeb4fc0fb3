use codestory_core::ErrorCategory;
use thiserror::Error;

#[derive(Debug, Error)]
pub enum LlmError {
    #[error("authentication failed{}", tenant.as_ref().map(|t| format!(" (tenant: {t})")).unwrap_or_default())]
    Auth { tenant: Option<String> },

    #[error("rate limited after retries exhausted")]
    RateLimited,

    #[error("transient provider error: {0}")]
    Transient(String),

    #[error("request rejected by provider: {0}")]
    InvalidRequest(String),
}

impl LlmError {
    pub fn category(&self) -> ErrorCategory {
        match self {
            LlmError::Transient(_) => ErrorCategory::Transient,
            LlmError::RateLimited | LlmError::Auth { .. } | LlmError::InvalidRequest(_) => {
                ErrorCategory::Permanent
            }
        }
    }

    /// Best-effort tenant id extraction from a provider error string, for
    /// `LLMAuthError`'s optional hint.
    pub fn auth_with_hint(message: &str) -> Self {
        let tenant = message
            .split_whitespace()
            .find(|tok| tok.starts_with("tenant="))
            .map(|tok| tok.trim_start_matches("tenant=").to_string());
        LlmError::Auth { tenant }
    }
}

pub type Result<T> = std::result::Result<T, LlmError>;
