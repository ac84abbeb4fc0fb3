//! Orchestration layer: job/step state, dependency resolution, the step
//! registry and contract, progress reporting, and the concrete workflow
//! steps (filesystem, ast, summarizer, docgrapher).

pub mod dag;
pub mod error;
pub mod job;
pub mod orchestrator;
pub mod progress;
pub mod registry;
pub mod step;
pub mod steps;

pub use error::{PipelineError, Result};
pub use job::{Job, JobStateMachine, Status, StepState};
pub use orchestrator::PipelineOrchestrator;
pub use registry::StepRegistry;
pub use step::{Step, StepContext, StepOutcome};
