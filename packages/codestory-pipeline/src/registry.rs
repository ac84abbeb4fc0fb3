//! The step registry: constructors are registered under a stable name at
//! build time and looked up by name, replacing dynamic plug-in discovery
//! (spec design notes).

use crate::error::{PipelineError, Result};
use crate::step::Step;
use std::collections::HashMap;
use std::sync::Arc;

#[derive(Default)]
pub struct StepRegistry {
    steps: HashMap<String, Arc<dyn Step>>,
}

impl StepRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn register(&mut self, step: Arc<dyn Step>) -> &mut Self {
        self.steps.insert(step.name().to_string(), step);
        self
    }

    pub fn get(&self, name: &str) -> Result<Arc<dyn Step>> {
        self.steps
            .get(name)
            .cloned()
            .ok_or_else(|| PipelineError::UnknownStep(name.to_string()))
    }

    pub fn names(&self) -> Vec<String> {
        self.steps.keys().cloned().collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::step::{StepContext, StepOutcome};
    use async_trait::async_trait;

    struct NoopStep;

    #[async_trait]
    impl Step for NoopStep {
        fn name(&self) -> &'static str {
            "noop"
        }

        async fn execute(&self, _ctx: StepContext) -> Result<StepOutcome> {
            Ok(StepOutcome::default())
        }
    }

    #[test]
    fn lookup_of_unknown_step_fails_closed() {
        let registry = StepRegistry::new();
        assert!(matches!(
            registry.get("ghost"),
            Err(PipelineError::UnknownStep(_))
        ));
    }

    #[test]
    fn registered_step_is_retrievable_by_name() {
        let mut registry = StepRegistry::new();
        registry.register(Arc::new(NoopStep));
        assert!(registry.get("noop").is_ok());
        assert_eq!(registry.names(), vec!["noop".to_string()]);
    }
}
