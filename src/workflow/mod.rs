//! Onboarding orchestration.
//!
//! A workflow is a closed set of named steps. Starting a run fans out every
//! step that applies to the driver, waits for all of them, and derives one
//! overall status plus a risk summary from the outcomes:
//!
//! 1. `registry` decides which steps apply to the subject
//! 2. `executor` runs them concurrently with per-step fault isolation
//! 3. `aggregate` turns the outcomes into status, summary and recommendations
//! 4. the store persists the run; `retry` re-runs a single step later
//!
//! Three workflows exist: the top-level onboarding workflow and the
//! background-check and insurance workflows it nests.

pub mod aggregate;
pub mod background;
pub mod executor;
pub mod insurance;
pub mod onboarding;
pub mod orchestrator;
pub mod registry;
pub mod retry;
pub mod steps;

use std::collections::BTreeMap;
use std::fmt;
use std::hash::Hash;
use std::str::FromStr;

use chrono::{DateTime, Utc};
use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::error::{DatabaseError, WorkflowError};
use crate::store::StoredRun;

pub use aggregate::{Aggregate, RiskRules, aggregate};
pub use orchestrator::{Orchestrator, Registries, Workflow};
pub use retry::RetryCoordinator;
pub use registry::{Step, StepRegistry};
pub use steps::{BackgroundCheckStep, InsuranceStep, OnboardingStep};

/// Which workflow a run belongs to.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum WorkflowKind {
    Onboarding,
    BackgroundCheck,
    Insurance,
}

impl WorkflowKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Onboarding => "onboarding",
            Self::BackgroundCheck => "background_check",
            Self::Insurance => "insurance",
        }
    }
}

impl fmt::Display for WorkflowKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for WorkflowKind {
    type Err = WorkflowError;

    /// Accepts both the stored form (`background_check`) and the URL form
    /// (`background-check`).
    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.replace('-', "_").as_str() {
            "onboarding" => Ok(Self::Onboarding),
            "background_check" => Ok(Self::BackgroundCheck),
            "insurance" => Ok(Self::Insurance),
            _ => Err(WorkflowError::UnknownWorkflow(s.to_string())),
        }
    }
}

/// A step identifier belonging to exactly one workflow's closed step set.
pub trait WorkflowStep:
    Copy
    + Eq
    + Ord
    + Hash
    + fmt::Debug
    + fmt::Display
    + Serialize
    + DeserializeOwned
    + Send
    + Sync
    + 'static
{
    const KIND: WorkflowKind;
    const ALL: &'static [Self];

    /// Wire name, e.g. `insuranceVerification`.
    fn as_str(&self) -> &'static str;

    /// Parse a wire name, rejecting names outside this workflow.
    fn parse(name: &str) -> Result<Self, WorkflowError> {
        Self::ALL
            .iter()
            .copied()
            .find(|s| s.as_str() == name)
            .ok_or_else(|| WorkflowError::UnknownStep {
                workflow: Self::KIND.to_string(),
                step: name.to_string(),
            })
    }
}

/// Outcome of one step. Immutable once recorded.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "status", rename_all = "lowercase")]
pub enum StepOutcome {
    Completed { result: serde_json::Value },
    Failed { error: String },
}

impl StepOutcome {
    pub fn failed(error: impl Into<String>) -> Self {
        Self::Failed {
            error: error.into(),
        }
    }

    pub fn is_completed(&self) -> bool {
        matches!(self, Self::Completed { .. })
    }

    pub fn result(&self) -> Option<&serde_json::Value> {
        match self {
            Self::Completed { result } => Some(result),
            Self::Failed { .. } => None,
        }
    }

    pub fn error(&self) -> Option<&str> {
        match self {
            Self::Completed { .. } => None,
            Self::Failed { error } => Some(error),
        }
    }

    pub fn status_str(&self) -> &'static str {
        match self {
            Self::Completed { .. } => "completed",
            Self::Failed { .. } => "failed",
        }
    }
}

/// Step outcomes of one run, keyed by step name.
pub type StepMap<K> = BTreeMap<K, StepOutcome>;

/// Derived status of a whole run.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum OverallStatus {
    /// Run created, fan-out not settled yet.
    Pending,
    Completed,
    Partial,
    Failed,
}

impl OverallStatus {
    /// `completed` iff every step completed, `failed` iff none did,
    /// `partial` otherwise. An empty set counts as `failed`.
    pub fn from_outcomes<'a>(outcomes: impl IntoIterator<Item = &'a StepOutcome>) -> Self {
        let (total, completed) = outcomes
            .into_iter()
            .fold((0usize, 0usize), |(t, c), o| (t + 1, c + o.is_completed() as usize));
        if completed == 0 {
            Self::Failed
        } else if completed == total {
            Self::Completed
        } else {
            Self::Partial
        }
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Pending => "pending",
            Self::Completed => "completed",
            Self::Partial => "partial",
            Self::Failed => "failed",
        }
    }
}

impl fmt::Display for OverallStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for OverallStatus {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "pending" => Ok(Self::Pending),
            "completed" => Ok(Self::Completed),
            "partial" => Ok(Self::Partial),
            "failed" => Ok(Self::Failed),
            other => Err(format!("unknown overall status: {other}")),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum RiskLevel {
    Low,
    Medium,
    High,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum CoverageStatus {
    Adequate,
    Insufficient,
    Expired,
    Unknown,
}

/// Derived, non-authoritative view of a run's step outcomes.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct Summary {
    pub completed_steps: usize,
    pub failed_steps: usize,
    pub total_steps: usize,
    /// Scheduled steps that have not completed.
    pub pending_steps: usize,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub risk_level: Option<RiskLevel>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub coverage_status: Option<CoverageStatus>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub estimated_completion: Option<String>,
    pub flags: Vec<String>,
}

impl Summary {
    /// Step counts only; risk fields are left for the workflow's rules.
    pub fn count<K>(steps: &StepMap<K>) -> Self {
        let total = steps.len();
        let completed = steps.values().filter(|o| o.is_completed()).count();
        Self {
            completed_steps: completed,
            failed_steps: total - completed,
            total_steps: total,
            pending_steps: total - completed,
            ..Self::default()
        }
    }
}

/// One execution of a workflow for a driver.
#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct WorkflowRun<K: WorkflowStep> {
    pub id: Uuid,
    pub workflow: WorkflowKind,
    pub subject_id: Uuid,
    pub started_at: DateTime<Utc>,
    pub completed_at: Option<DateTime<Utc>>,
    pub steps: StepMap<K>,
    pub overall_status: OverallStatus,
    pub summary: Summary,
    pub recommendations: Vec<String>,
}

impl<K: WorkflowStep> TryFrom<StoredRun> for WorkflowRun<K> {
    type Error = WorkflowError;

    fn try_from(stored: StoredRun) -> Result<Self, Self::Error> {
        if stored.kind != K::KIND {
            return Err(WorkflowError::UnknownRun { id: stored.id });
        }
        let steps = stored
            .steps
            .into_iter()
            .map(|(name, outcome)| {
                K::parse(&name).map(|k| (k, outcome)).map_err(|_| {
                    DatabaseError::Serialization(format!(
                        "run {} holds step {name:?} outside the {} workflow",
                        stored.id, K::KIND
                    ))
                })
            })
            .collect::<Result<StepMap<K>, DatabaseError>>()?;

        Ok(Self {
            id: stored.id,
            workflow: stored.kind,
            subject_id: stored.subject_id,
            started_at: stored.started_at,
            completed_at: stored.completed_at,
            steps,
            overall_status: stored.overall_status,
            summary: stored.summary,
            recommendations: stored.recommendations,
        })
    }
}
