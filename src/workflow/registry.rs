//! Step registry: which steps a workflow has and when each applies.

use std::collections::BTreeMap;
use std::sync::Arc;

use async_trait::async_trait;

use super::WorkflowStep;
use crate::error::{StepError, WorkflowError};
use crate::subject::Subject;

/// One named unit of work bound to a single provider call.
#[async_trait]
pub trait Step<K: WorkflowStep>: Send + Sync {
    fn name(&self) -> K;

    /// Whether this step is scheduled for `subject`. Unguarded steps always run.
    fn is_applicable(&self, _subject: &Subject) -> bool {
        true
    }

    /// Run the step and return its normalized result payload.
    async fn invoke(&self, subject: &Subject) -> Result<serde_json::Value, StepError>;
}

/// Read-only map from step name to implementation, built once at startup.
pub struct StepRegistry<K: WorkflowStep> {
    steps: BTreeMap<K, Arc<dyn Step<K>>>,
}

impl<K: WorkflowStep> StepRegistry<K> {
    pub fn new() -> Self {
        Self {
            steps: BTreeMap::new(),
        }
    }

    /// Add a step. A second step with the same name replaces the first.
    pub fn with_step(mut self, step: Arc<dyn Step<K>>) -> Self {
        let name = step.name();
        if self.steps.insert(name, step).is_some() {
            tracing::warn!(workflow = %K::KIND, step = %name, "Step registered twice; keeping the last");
        } else {
            tracing::debug!(workflow = %K::KIND, step = %name, "Registered step");
        }
        self
    }

    pub fn get(&self, name: K) -> Option<Arc<dyn Step<K>>> {
        self.steps.get(&name).cloned()
    }

    /// Look up a step by wire name. Names outside the workflow, or not
    /// registered, are `UnknownStep`.
    pub fn resolve(&self, name: &str) -> Result<Arc<dyn Step<K>>, WorkflowError> {
        let key = K::parse(name)?;
        self.get(key).ok_or_else(|| WorkflowError::UnknownStep {
            workflow: K::KIND.to_string(),
            step: name.to_string(),
        })
    }

    /// Steps whose applicability guard holds for `subject`, in name order.
    pub fn scheduled(&self, subject: &Subject) -> Vec<Arc<dyn Step<K>>> {
        self.steps
            .values()
            .filter(|step| step.is_applicable(subject))
            .cloned()
            .collect()
    }

    pub fn names(&self) -> Vec<K> {
        self.steps.keys().copied().collect()
    }

    pub fn len(&self) -> usize {
        self.steps.len()
    }

    pub fn is_empty(&self) -> bool {
        self.steps.is_empty()
    }
}

impl<K: WorkflowStep> Default for StepRegistry<K> {
    fn default() -> Self {
        Self::new()
    }
}
