//! Single-step retry against a driver's latest run.

use std::sync::Arc;

use chrono::Utc;
use tracing::info;
use uuid::Uuid;

use super::aggregate::{RiskRules, aggregate};
use super::executor::run_step;
use super::registry::StepRegistry;
use super::{StepOutcome, WorkflowRun};
use crate::error::WorkflowError;
use crate::store::WorkflowStore;
use crate::subject::DriverDirectory;

/// Re-runs one step of a stored run and refreshes the run's derived status.
#[derive(Clone)]
pub struct RetryCoordinator {
    store: Arc<dyn WorkflowStore>,
    directory: Arc<dyn DriverDirectory>,
}

impl RetryCoordinator {
    pub fn new(store: Arc<dyn WorkflowStore>, directory: Arc<dyn DriverDirectory>) -> Self {
        Self { store, directory }
    }

    /// Retry `step_name` in the driver's latest run of workflow `K`.
    ///
    /// The run must have been finalized once (`RunInProgress` otherwise).
    /// Only steps that were scheduled in that run can be retried; anything
    /// else is `UnknownStep`. The subject is fetched fresh so the step sees
    /// current profile data. A failing step is returned as a failed outcome,
    /// not as an error.
    pub async fn retry_step<K: RiskRules>(
        &self,
        registry: &StepRegistry<K>,
        subject_id: Uuid,
        step_name: &str,
    ) -> Result<StepOutcome, WorkflowError> {
        let step = registry.resolve(step_name)?;

        let run = self
            .store
            .latest_run(K::KIND, subject_id)
            .await?
            .ok_or_else(|| WorkflowError::RunNotFound {
                workflow: K::KIND.to_string(),
                subject_id,
            })?;

        if run.completed_at.is_none() {
            return Err(WorkflowError::RunInProgress { id: run.id });
        }
        if !run.steps.contains_key(step_name) {
            return Err(WorkflowError::UnknownStep {
                workflow: K::KIND.to_string(),
                step: step_name.to_string(),
            });
        }
        let run_id = run.id;

        let subject = self.directory.get_subject(subject_id).await?;
        let (_, outcome) = run_step(step, &subject).await;
        self.store.record_step(run_id, step_name, &outcome).await?;

        let refreshed: WorkflowRun<K> = self.store.get_run(run_id).await?.try_into()?;
        let agg = aggregate(&refreshed.steps);
        self.store
            .finalize_run(
                run_id,
                agg.overall_status,
                &agg.summary,
                &agg.recommendations,
                Utc::now(),
            )
            .await?;

        info!(
            %run_id,
            workflow = %K::KIND,
            step = step_name,
            status = outcome.status_str(),
            overall_status = %agg.overall_status,
            "Step retried"
        );
        Ok(outcome)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::{ProviderError, StepError};
    use crate::store::LibSqlBackend;
    use crate::subject::Subject;
    use crate::subject::fixtures::{bare_subject, with_document};
    use crate::workflow::registry::Step;
    use crate::workflow::{OnboardingStep, OverallStatus, WorkflowStep};
    use async_trait::async_trait;
    use serde_json::{Value, json};
    use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};

    /// Fails until `healthy` is flipped; reports how many documents it saw.
    struct FlakyStep {
        name: OnboardingStep,
        healthy: Arc<AtomicBool>,
        calls: Arc<AtomicUsize>,
    }

    #[async_trait]
    impl Step<OnboardingStep> for FlakyStep {
        fn name(&self) -> OnboardingStep {
            self.name
        }

        async fn invoke(&self, subject: &Subject) -> Result<Value, StepError> {
            self.calls.fetch_add(1, Ordering::SeqCst);
            if self.healthy.load(Ordering::SeqCst) {
                Ok(json!({"documents": subject.documents.len()}))
            } else {
                Err(ProviderError::Upstream {
                    provider: "stripe".into(),
                    status: 502,
                    message: "bad gateway".into(),
                }
                .into())
            }
        }
    }

    struct Harness {
        db: Arc<LibSqlBackend>,
        retry: RetryCoordinator,
        registry: StepRegistry<OnboardingStep>,
        healthy: Arc<AtomicBool>,
        calls: Arc<AtomicUsize>,
        subject: Subject,
        run_id: Uuid,
    }

    /// A stored onboarding run where `payment` failed and the rest completed.
    async fn harness() -> Harness {
        let db = Arc::new(LibSqlBackend::new_memory().await.unwrap());
        let subject = bare_subject();
        db.upsert_subject(&subject).await.unwrap();

        let healthy = Arc::new(AtomicBool::new(false));
        let calls = Arc::new(AtomicUsize::new(0));
        let registry = StepRegistry::<OnboardingStep>::new().with_step(Arc::new(FlakyStep {
            name: OnboardingStep::Payment,
            healthy: Arc::clone(&healthy),
            calls: Arc::clone(&calls),
        }));

        let run_id = db
            .create_run(OnboardingStep::KIND, subject.id, Utc::now())
            .await
            .unwrap();
        for step in ["backgroundCheck", "insuranceVerification", "databaseUpdate"] {
            db.record_step(run_id, step, &StepOutcome::Completed { result: json!({"ok": step}) })
                .await
                .unwrap();
        }
        db.record_step(run_id, "payment", &StepOutcome::failed("bad gateway"))
            .await
            .unwrap();
        let stored: WorkflowRun<OnboardingStep> = db.get_run(run_id).await.unwrap().try_into().unwrap();
        let agg = aggregate(&stored.steps);
        db.finalize_run(run_id, agg.overall_status, &agg.summary, &agg.recommendations, Utc::now())
            .await
            .unwrap();

        let retry = RetryCoordinator::new(db.clone(), db.clone());
        Harness {
            db,
            retry,
            registry,
            healthy,
            calls,
            subject,
            run_id,
        }
    }

    #[tokio::test]
    async fn retry_turns_failed_step_into_completed() {
        let h = harness().await;
        h.healthy.store(true, Ordering::SeqCst);
        let before = h.db.get_run(h.run_id).await.unwrap();
        assert_eq!(before.overall_status, OverallStatus::Partial);

        let outcome = h
            .retry
            .retry_step(&h.registry, h.subject.id, "payment")
            .await
            .unwrap();
        assert!(outcome.is_completed());

        let run = h.db.get_run(h.run_id).await.unwrap();
        assert_eq!(run.steps["payment"], outcome);
        assert_eq!(run.overall_status, OverallStatus::Completed);
        assert_eq!(run.summary.completed_steps, 4);
        assert_eq!(run.summary.pending_steps, 0);
        assert_eq!(run.completed_at, before.completed_at);
        assert_eq!(run.steps["backgroundCheck"].result().unwrap()["ok"], "backgroundCheck");
    }

    #[tokio::test]
    async fn failing_retry_is_returned_not_thrown() {
        let h = harness().await;

        let outcome = h
            .retry
            .retry_step(&h.registry, h.subject.id, "payment")
            .await
            .unwrap();
        assert!(outcome.error().unwrap().contains("bad gateway"));

        let run = h.db.get_run(h.run_id).await.unwrap();
        assert_eq!(run.overall_status, OverallStatus::Partial);
        assert_eq!(run.steps.len(), 4);
    }

    #[tokio::test]
    async fn retrying_twice_is_idempotent() {
        let h = harness().await;
        h.healthy.store(true, Ordering::SeqCst);

        h.retry
            .retry_step(&h.registry, h.subject.id, "payment")
            .await
            .unwrap();
        let first = h.db.get_run(h.run_id).await.unwrap();
        h.retry
            .retry_step(&h.registry, h.subject.id, "payment")
            .await
            .unwrap();
        let second = h.db.get_run(h.run_id).await.unwrap();

        assert_eq!(h.calls.load(Ordering::SeqCst), 2);
        assert_eq!(first.steps, second.steps);
        assert_eq!(first.overall_status, second.overall_status);
        assert_eq!(first.completed_at, second.completed_at);
    }

    #[tokio::test]
    async fn retry_reads_fresh_subject() {
        let h = harness().await;
        h.healthy.store(true, Ordering::SeqCst);
        h.db.upsert_subject(&with_document(h.subject.clone()))
            .await
            .unwrap();

        let outcome = h
            .retry
            .retry_step(&h.registry, h.subject.id, "payment")
            .await
            .unwrap();
        assert_eq!(outcome.result().unwrap()["documents"], 1);
    }

    #[tokio::test]
    async fn unknown_step_name_is_rejected() {
        let h = harness().await;
        let err = h
            .retry
            .retry_step(&h.registry, h.subject.id, "criminal")
            .await
            .unwrap_err();
        assert!(matches!(err, WorkflowError::UnknownStep { .. }));
        assert_eq!(h.calls.load(Ordering::SeqCst), 0);
    }

    #[tokio::test]
    async fn unscheduled_step_is_rejected() {
        let h = harness().await;
        let registry = StepRegistry::<OnboardingStep>::new().with_step(Arc::new(FlakyStep {
            name: OnboardingStep::DocumentStorage,
            healthy: Arc::clone(&h.healthy),
            calls: Arc::clone(&h.calls),
        }));

        let err = h
            .retry
            .retry_step(&registry, h.subject.id, "documentStorage")
            .await
            .unwrap_err();
        assert!(matches!(err, WorkflowError::UnknownStep { .. }));
        assert_eq!(h.db.get_run(h.run_id).await.unwrap().steps.len(), 4);
    }

    #[tokio::test]
    async fn unfinalized_run_cannot_be_retried() {
        let h = harness().await;
        h.healthy.store(true, Ordering::SeqCst);
        let run_id = h
            .db
            .create_run(OnboardingStep::KIND, h.subject.id, Utc::now())
            .await
            .unwrap();
        h.db.record_step(run_id, "payment", &StepOutcome::failed("bad gateway"))
            .await
            .unwrap();

        let err = h
            .retry
            .retry_step(&h.registry, h.subject.id, "payment")
            .await
            .unwrap_err();
        assert!(matches!(err, WorkflowError::RunInProgress { id } if id == run_id));
        assert_eq!(h.calls.load(Ordering::SeqCst), 0);

        let run = h.db.get_run(run_id).await.unwrap();
        assert_eq!(run.overall_status, OverallStatus::Pending);
        assert!(run.completed_at.is_none());
        assert!(!run.steps["payment"].is_completed());
    }

    #[tokio::test]
    async fn retry_without_a_run_is_not_found() {
        let h = harness().await;
        let err = h
            .retry
            .retry_step(&h.registry, Uuid::new_v4(), "payment")
            .await
            .unwrap_err();
        assert!(err.is_not_found());
    }
}
