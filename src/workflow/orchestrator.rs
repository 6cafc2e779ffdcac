//! Entry point for starting, polling and retrying workflow runs.

use std::sync::Arc;

use chrono::Utc;
use tracing::info;
use uuid::Uuid;

use super::aggregate::{RiskRules, aggregate};
use super::background::background_check_registry;
use super::executor::fan_out;
use super::insurance::insurance_registry;
use super::onboarding::onboarding_registry;
use super::registry::StepRegistry;
use super::retry::RetryCoordinator;
use super::{
    BackgroundCheckStep, InsuranceStep, OnboardingStep, StepOutcome, WorkflowRun, WorkflowStep,
};
use crate::error::WorkflowError;
use crate::providers::Providers;
use crate::store::WorkflowStore;
use crate::subject::DriverDirectory;

/// The step registries of all three workflows, built once at startup.
pub struct Registries {
    pub onboarding: Arc<StepRegistry<OnboardingStep>>,
    pub background_check: Arc<StepRegistry<BackgroundCheckStep>>,
    pub insurance: Arc<StepRegistry<InsuranceStep>>,
}

impl Registries {
    /// Wire every step to its provider. The onboarding workflow shares the
    /// background-check and insurance registries for its nested steps.
    pub fn new(providers: &Providers, directory: Arc<dyn DriverDirectory>) -> Self {
        let background_check = Arc::new(background_check_registry(Arc::clone(
            &providers.background_check,
        )));
        let insurance = Arc::new(insurance_registry(Arc::clone(&providers.insurance)));
        let onboarding = Arc::new(onboarding_registry(
            providers,
            directory,
            Arc::clone(&background_check),
            Arc::clone(&insurance),
        ));
        Self {
            onboarding,
            background_check,
            insurance,
        }
    }
}

/// A workflow the orchestrator can run: its steps plus where its registry lives.
pub trait Workflow: RiskRules {
    fn registry(registries: &Registries) -> &StepRegistry<Self>;
}

impl Workflow for OnboardingStep {
    fn registry(registries: &Registries) -> &StepRegistry<Self> {
        &registries.onboarding
    }
}

impl Workflow for BackgroundCheckStep {
    fn registry(registries: &Registries) -> &StepRegistry<Self> {
        &registries.background_check
    }
}

impl Workflow for InsuranceStep {
    fn registry(registries: &Registries) -> &StepRegistry<Self> {
        &registries.insurance
    }
}

pub struct Orchestrator {
    registries: Registries,
    store: Arc<dyn WorkflowStore>,
    directory: Arc<dyn DriverDirectory>,
    retry: RetryCoordinator,
}

impl Orchestrator {
    pub fn new(
        providers: &Providers,
        store: Arc<dyn WorkflowStore>,
        directory: Arc<dyn DriverDirectory>,
    ) -> Self {
        let registries = Registries::new(providers, Arc::clone(&directory));
        Self::with_registries(registries, store, directory)
    }

    pub fn with_registries(
        registries: Registries,
        store: Arc<dyn WorkflowStore>,
        directory: Arc<dyn DriverDirectory>,
    ) -> Self {
        let retry = RetryCoordinator::new(Arc::clone(&store), Arc::clone(&directory));
        Self {
            registries,
            store,
            directory,
            retry,
        }
    }

    /// Run workflow `K` for a driver and return the finalized run.
    ///
    /// Fails with `SubjectNotFound` before any run is created. Step failures
    /// never fail the call; they show up in the run's outcomes.
    pub async fn start<K: Workflow>(&self, subject_id: Uuid) -> Result<WorkflowRun<K>, WorkflowError> {
        let subject = self.directory.get_subject(subject_id).await?;
        let run_id = self.store.create_run(K::KIND, subject_id, Utc::now()).await?;
        info!(%run_id, workflow = %K::KIND, %subject_id, "Workflow run started");

        let steps = fan_out(K::registry(&self.registries), &subject).await;
        for (step, outcome) in &steps {
            self.store.record_step(run_id, step.as_str(), outcome).await?;
        }

        // A retry may have overwritten a step since it was recorded.
        let stored: WorkflowRun<K> = self.store.get_run(run_id).await?.try_into()?;
        let agg = aggregate(&stored.steps);
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
            overall_status = %agg.overall_status,
            completed = agg.summary.completed_steps,
            total = agg.summary.total_steps,
            "Workflow run finished"
        );

        self.get_run(run_id).await
    }

    /// Latest run of workflow `K` for a driver.
    pub async fn status<K: Workflow>(&self, subject_id: Uuid) -> Result<WorkflowRun<K>, WorkflowError> {
        self.store
            .latest_run(K::KIND, subject_id)
            .await?
            .ok_or_else(|| WorkflowError::RunNotFound {
                workflow: K::KIND.to_string(),
                subject_id,
            })?
            .try_into()
    }

    /// Load a run by id. A run of another workflow is `UnknownRun`.
    pub async fn get_run<K: WorkflowStep>(&self, run_id: Uuid) -> Result<WorkflowRun<K>, WorkflowError> {
        self.store.get_run(run_id).await?.try_into()
    }

    /// Retry one step of the driver's latest run of workflow `K`.
    pub async fn retry<K: Workflow>(
        &self,
        subject_id: Uuid,
        step_name: &str,
    ) -> Result<StepOutcome, WorkflowError> {
        self.retry
            .retry_step(K::registry(&self.registries), subject_id, step_name)
            .await
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::DatabaseError;
    use crate::providers::stubs::StubProviders;
    use crate::store::LibSqlBackend;
    use crate::subject::Subject;
    use crate::subject::fixtures::{bare_subject, with_business, with_document, with_policy};
    use crate::store::StoredRun;
    use crate::workflow::{OverallStatus, RiskLevel, Summary, WorkflowKind};
    use async_trait::async_trait;
    use chrono::DateTime;
    use serde_json::json;
    use std::sync::atomic::Ordering;

    struct Harness {
        stubs: Arc<StubProviders>,
        db: Arc<LibSqlBackend>,
        orchestrator: Orchestrator,
    }

    async fn harness() -> Harness {
        let stubs = Arc::new(StubProviders::default());
        let db = Arc::new(LibSqlBackend::new_memory().await.unwrap());
        let orchestrator = Orchestrator::new(&stubs.providers(), db.clone(), db.clone());
        Harness {
            stubs,
            db,
            orchestrator,
        }
    }

    async fn seeded(h: &Harness, subject: Subject) -> Uuid {
        h.db.upsert_subject(&subject).await.unwrap();
        subject.id
    }

    #[tokio::test]
    async fn onboarding_with_documents_completes() {
        let h = harness().await;
        let id = seeded(&h, with_document(with_policy(bare_subject(), "POL-1"))).await;

        let run = h.orchestrator.start::<OnboardingStep>(id).await.unwrap();

        assert_eq!(run.overall_status, OverallStatus::Completed);
        assert_eq!(run.steps.len(), 5);
        assert_eq!(run.summary.completed_steps, 5);
        assert_eq!(run.summary.risk_level, Some(RiskLevel::Low));
        assert_eq!(run.summary.estimated_completion.as_deref(), Some("Immediate"));
        assert!(run.completed_at.is_some());

        let nested = run.steps[&OnboardingStep::BackgroundCheck].result().unwrap();
        assert_eq!(nested["overallStatus"], "completed");
        assert_eq!(nested["steps"]["criminal"]["status"], "completed");

        let profile = run.steps[&OnboardingStep::DatabaseUpdate].result().unwrap();
        assert_eq!(profile["onboardingStatus"], "in_review");
    }

    #[tokio::test]
    async fn document_storage_needs_documents() {
        let h = harness().await;
        let id = seeded(&h, bare_subject()).await;

        let run = h.orchestrator.start::<OnboardingStep>(id).await.unwrap();
        assert_eq!(run.steps.len(), 4);
        assert!(!run.steps.contains_key(&OnboardingStep::DocumentStorage));
    }

    #[tokio::test]
    async fn payment_outage_gives_partial_run() {
        let h = harness().await;
        h.stubs.fail_payments.store(true, Ordering::SeqCst);
        let id = seeded(&h, with_document(bare_subject())).await;

        let run = h.orchestrator.start::<OnboardingStep>(id).await.unwrap();

        assert_eq!(run.overall_status, OverallStatus::Partial);
        assert_eq!(run.summary.failed_steps, 1);
        assert_eq!(run.summary.risk_level, Some(RiskLevel::Medium));
        assert!(
            run.steps[&OnboardingStep::Payment]
                .error()
                .unwrap()
                .contains("service unavailable")
        );
        assert!(
            run.recommendations
                .contains(&"Payment setup failed - verify payout account details".to_string())
        );
    }

    #[tokio::test]
    async fn failed_nested_workflow_fails_its_step() {
        let h = harness().await;
        h.stubs.fail_background.store(true, Ordering::SeqCst);
        let id = seeded(&h, bare_subject()).await;

        let run = h.orchestrator.start::<OnboardingStep>(id).await.unwrap();
        let error = run.steps[&OnboardingStep::BackgroundCheck].error().unwrap();
        assert!(error.contains("background_check workflow failed"));
        assert!(error.contains("criminal"));
        assert!(run.steps[&OnboardingStep::InsuranceVerification].is_completed());
    }

    #[tokio::test]
    async fn unknown_subject_creates_no_run() {
        let h = harness().await;
        let id = Uuid::new_v4();

        let err = h.orchestrator.start::<InsuranceStep>(id).await.unwrap_err();
        assert!(matches!(err, WorkflowError::SubjectNotFound { .. }));

        let err = h.orchestrator.status::<InsuranceStep>(id).await.unwrap_err();
        assert!(matches!(err, WorkflowError::RunNotFound { .. }));
    }

    #[tokio::test]
    async fn status_returns_latest_run() {
        let h = harness().await;
        let id = seeded(&h, with_business(bare_subject())).await;

        h.orchestrator.start::<BackgroundCheckStep>(id).await.unwrap();
        let second = h.orchestrator.start::<BackgroundCheckStep>(id).await.unwrap();
        assert_eq!(second.steps.len(), 4);

        let status = h.orchestrator.status::<BackgroundCheckStep>(id).await.unwrap();
        assert_eq!(status.id, second.id);
        assert_eq!(status.steps, second.steps);
    }

    #[tokio::test]
    async fn run_of_other_workflow_is_rejected() {
        let h = harness().await;
        let id = seeded(&h, bare_subject()).await;
        let run = h.orchestrator.start::<InsuranceStep>(id).await.unwrap();

        let err = h
            .orchestrator
            .get_run::<OnboardingStep>(run.id)
            .await
            .unwrap_err();
        assert!(matches!(err, WorkflowError::UnknownRun { .. }));

        let err = h
            .orchestrator
            .get_run::<InsuranceStep>(Uuid::new_v4())
            .await
            .unwrap_err();
        assert!(matches!(err, WorkflowError::Storage(DatabaseError::NotFound { .. })));
    }

    #[tokio::test]
    async fn retry_after_outage_completes_run() {
        let h = harness().await;
        h.stubs.fail_payments.store(true, Ordering::SeqCst);
        let id = seeded(&h, bare_subject()).await;
        let first = h.orchestrator.start::<OnboardingStep>(id).await.unwrap();
        assert_eq!(first.overall_status, OverallStatus::Partial);

        h.stubs.fail_payments.store(false, Ordering::SeqCst);
        let outcome = h
            .orchestrator
            .retry::<OnboardingStep>(id, "payment")
            .await
            .unwrap();
        assert!(outcome.is_completed());

        let run = h.orchestrator.status::<OnboardingStep>(id).await.unwrap();
        assert_eq!(run.id, first.id);
        assert_eq!(run.overall_status, OverallStatus::Completed);
        assert_eq!(run.completed_at, first.completed_at);
        assert_eq!(
            run.steps[&OnboardingStep::InsuranceVerification],
            first.steps[&OnboardingStep::InsuranceVerification]
        );
    }

    /// Lets a successful payment retry land right after the run records its
    /// failed payment, before the run is finalized.
    struct RetryLandsMidRun {
        inner: Arc<LibSqlBackend>,
    }

    #[async_trait]
    impl WorkflowStore for RetryLandsMidRun {
        async fn create_run(
            &self,
            kind: WorkflowKind,
            subject_id: Uuid,
            started_at: DateTime<Utc>,
        ) -> Result<Uuid, DatabaseError> {
            self.inner.create_run(kind, subject_id, started_at).await
        }

        async fn record_step(
            &self,
            run_id: Uuid,
            step: &str,
            outcome: &StepOutcome,
        ) -> Result<(), DatabaseError> {
            self.inner.record_step(run_id, step, outcome).await?;
            if step == "payment" && !outcome.is_completed() {
                let retried = StepOutcome::Completed {
                    result: json!({"accountId": "acct_retried"}),
                };
                self.inner.record_step(run_id, step, &retried).await?;
            }
            Ok(())
        }

        async fn finalize_run(
            &self,
            run_id: Uuid,
            status: OverallStatus,
            summary: &Summary,
            recommendations: &[String],
            completed_at: DateTime<Utc>,
        ) -> Result<(), DatabaseError> {
            self.inner
                .finalize_run(run_id, status, summary, recommendations, completed_at)
                .await
        }

        async fn get_run(&self, run_id: Uuid) -> Result<StoredRun, DatabaseError> {
            self.inner.get_run(run_id).await
        }

        async fn latest_run(
            &self,
            kind: WorkflowKind,
            subject_id: Uuid,
        ) -> Result<Option<StoredRun>, DatabaseError> {
            self.inner.latest_run(kind, subject_id).await
        }
    }

    #[tokio::test]
    async fn finalize_reflects_stored_steps() {
        let stubs = Arc::new(StubProviders::default());
        stubs.fail_payments.store(true, Ordering::SeqCst);
        let db = Arc::new(LibSqlBackend::new_memory().await.unwrap());
        let store = Arc::new(RetryLandsMidRun { inner: db.clone() });
        let orchestrator = Orchestrator::new(&stubs.providers(), store, db.clone());
        let subject = bare_subject();
        db.upsert_subject(&subject).await.unwrap();

        let run = orchestrator.start::<OnboardingStep>(subject.id).await.unwrap();

        assert_eq!(run.steps[&OnboardingStep::Payment].result().unwrap()["accountId"], "acct_retried");
        assert_eq!(run.overall_status, OverallStatus::from_outcomes(run.steps.values()));
        assert_eq!(run.overall_status, OverallStatus::Completed);
        assert_eq!(run.summary.failed_steps, 0);
        assert_eq!(run.summary.risk_level, Some(RiskLevel::Low));
    }
}
