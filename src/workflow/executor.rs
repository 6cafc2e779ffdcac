//! Fan-out executor.
//!
//! Runs every scheduled step concurrently and waits for all of them. A step
//! that errors or panics becomes a failed outcome; siblings never see it.
//! There is no executor-level deadline: bounded completion comes from each
//! provider's own per-call timeout.

use std::any::Any;
use std::panic::AssertUnwindSafe;
use std::sync::Arc;
use std::time::Instant;

use futures::FutureExt;
use futures::future::join_all;
use tracing::{debug, info, warn};

use super::registry::{Step, StepRegistry};
use super::{StepMap, StepOutcome, WorkflowStep};
use crate::subject::Subject;

/// Run every step applicable to `subject` and collect all outcomes.
///
/// Returns only after every scheduled step has settled.
pub async fn fan_out<K: WorkflowStep>(registry: &StepRegistry<K>, subject: &Subject) -> StepMap<K> {
    let scheduled = registry.scheduled(subject);
    debug!(
        workflow = %K::KIND,
        subject_id = %subject.id,
        steps = scheduled.len(),
        "Fanning out workflow steps"
    );

    let futures = scheduled.into_iter().map(|step| run_step(step, subject));
    join_all(futures).await.into_iter().collect()
}

/// Run a single step, converting errors and panics into a failed outcome.
///
/// The step's name travels with its outcome so callers never rely on
/// positional order.
pub async fn run_step<K: WorkflowStep>(step: Arc<dyn Step<K>>, subject: &Subject) -> (K, StepOutcome) {
    let name = step.name();
    let start = Instant::now();

    let invocation = async { step.invoke(subject).await };
    let outcome = match AssertUnwindSafe(invocation).catch_unwind().await {
        Ok(Ok(result)) => StepOutcome::Completed { result },
        Ok(Err(e)) => StepOutcome::failed(e.to_string()),
        Err(panic) => StepOutcome::failed(format!("step panicked: {}", panic_message(&*panic))),
    };

    let elapsed_ms = start.elapsed().as_millis() as u64;
    match &outcome {
        StepOutcome::Completed { .. } => info!(
            workflow = %K::KIND,
            step = %name,
            subject_id = %subject.id,
            elapsed_ms,
            "Step completed"
        ),
        StepOutcome::Failed { error } => warn!(
            workflow = %K::KIND,
            step = %name,
            subject_id = %subject.id,
            elapsed_ms,
            %error,
            "Step failed"
        ),
    }

    (name, outcome)
}

fn panic_message(panic: &(dyn Any + Send)) -> String {
    if let Some(s) = panic.downcast_ref::<&str>() {
        (*s).to_string()
    } else if let Some(s) = panic.downcast_ref::<String>() {
        s.clone()
    } else {
        "unknown panic".to_string()
    }
}
