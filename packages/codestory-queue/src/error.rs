use codestory_core::ErrorCategory;
use thiserror::Error;

#[derive(Debug, Error)]
pub enum QueueError {
    #[error("unknown task handle: {0}")]
    UnknownHandle(String),

    #[error("broker unavailable: {0}")]
    BrokerUnavailable(String),

    #[error("unknown channel: {0}")]
    UnknownChannel(String),
}

impl QueueError {
    pub fn category(&self) -> ErrorCategory {
        match self {
            QueueError::BrokerUnavailable(_) => ErrorCategory::Transient,
            QueueError::UnknownHandle(_) | QueueError::UnknownChannel(_) => {
                ErrorCategory::Permanent
            }
        }
    }
}

pub type Result<T> = std::result::Result<T, QueueError>;
