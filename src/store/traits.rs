//! Workflow run persistence contract.

use std::collections::BTreeMap;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use uuid::Uuid;

use crate::error::DatabaseError;
use crate::workflow::{OverallStatus, StepOutcome, Summary, WorkflowKind};

/// A run as persisted, with step names still in their wire form.
///
/// Converted into a typed `WorkflowRun<K>` by the workflow layer.
#[derive(Debug, Clone, PartialEq)]
pub struct StoredRun {
    pub id: Uuid,
    pub kind: WorkflowKind,
    pub subject_id: Uuid,
    pub started_at: DateTime<Utc>,
    pub completed_at: Option<DateTime<Utc>>,
    pub overall_status: OverallStatus,
    pub summary: Summary,
    pub recommendations: Vec<String>,
    pub steps: BTreeMap<String, StepOutcome>,
}

/// Durable store for workflow runs.
///
/// Step outcomes are stored one row per `(run, step)`; writing a step never
/// touches any other step of the same run.
#[async_trait]
pub trait WorkflowStore: Send + Sync {
    /// Open a new run in the `pending` state and return its id.
    async fn create_run(
        &self,
        kind: WorkflowKind,
        subject_id: Uuid,
        started_at: DateTime<Utc>,
    ) -> Result<Uuid, DatabaseError>;

    /// Insert or overwrite one step's outcome. Fails with `NotFound` for an
    /// unknown run.
    async fn record_step(
        &self,
        run_id: Uuid,
        step: &str,
        outcome: &StepOutcome,
    ) -> Result<(), DatabaseError>;

    /// Store the derived status, summary and recommendations.
    ///
    /// `completed_at` is only set the first time; refinalizing after a retry
    /// keeps the original completion time.
    async fn finalize_run(
        &self,
        run_id: Uuid,
        status: OverallStatus,
        summary: &Summary,
        recommendations: &[String],
        completed_at: DateTime<Utc>,
    ) -> Result<(), DatabaseError>;

    /// Load a run with all its steps. Fails with `NotFound` for an unknown id.
    async fn get_run(&self, run_id: Uuid) -> Result<StoredRun, DatabaseError>;

    /// Most recently started run of `kind` for a driver.
    async fn latest_run(
        &self,
        kind: WorkflowKind,
        subject_id: Uuid,
    ) -> Result<Option<StoredRun>, DatabaseError>;
}
