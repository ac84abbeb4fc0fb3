//! Pipeline-level error kinds, stable across the orchestrator and every
//! step (spec section 7).

use codestory_core::ErrorCategory;
use thiserror::Error;

#[derive(Debug, Error)]
pub enum PipelineError {
    #[error("malformed pipeline config: {0}")]
    Config(String),

    #[error(transparent)]
    GraphConnection(#[from] codestory_graph::GraphError),

    #[error("step timed out after {0:?}")]
    StepTimeout(std::time::Duration),

    #[error("step {step} failed: {message}")]
    StepFailed { step: String, message: String },

    #[error("external process error: {0}")]
    ExternalProcess(String),

    #[error(transparent)]
    Llm(#[from] codestory_llm::LlmError),

    #[error("job or step cancelled")]
    Cancelled,

    #[error("job not found: {0}")]
    JobNotFound(String),

    #[error("dependency cycle detected among steps: {0:?}")]
    DependencyCycle(Vec<String>),

    #[error("unknown step in registry: {0}")]
    UnknownStep(String),
}

impl PipelineError {
    pub fn category(&self) -> ErrorCategory {
        match self {
            PipelineError::GraphConnection(e) => e.category(),
            PipelineError::Llm(e) => e.category(),
            PipelineError::StepTimeout(_) => ErrorCategory::Transient,
            PipelineError::Config(_)
            | PipelineError::StepFailed { .. }
            | PipelineError::ExternalProcess(_)
            | PipelineError::Cancelled
            | PipelineError::JobNotFound(_)
            | PipelineError::DependencyCycle(_)
            | PipelineError::UnknownStep(_) => ErrorCategory::Permanent,
        }
    }
}

pub type Result<T> = std::result::Result<T, PipelineError>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn step_timeout_is_transient() {
        assert_eq!(
            PipelineError::StepTimeout(std::time::Duration::from_secs(1)).category(),
            ErrorCategory::Transient
        );
    }

    #[test]
    fn step_failed_is_permanent() {
        let err = PipelineError::StepFailed {
            step: "filesystem".into(),
            message: "boom".into(),
        };
        assert_eq!(err.category(), ErrorCategory::Permanent);
        assert!(err.to_string().contains("filesystem"));
    }
}
