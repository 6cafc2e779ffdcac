//! Status aggregation.
//!
//! The overall status is the same pure function for every workflow. Risk,
//! coverage, flags and recommendations come from the workflow's own rule
//! table (`RiskRules`), which declares the result fields it reads.

use serde::Serialize;
use serde_json::Value;

use super::{OverallStatus, StepMap, Summary, WorkflowStep};

/// Everything derived from a run's step outcomes.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct Aggregate {
    pub overall_status: OverallStatus,
    pub summary: Summary,
    pub recommendations: Vec<String>,
}

/// Workflow-specific risk rules.
pub trait RiskRules: WorkflowStep {
    /// Fill the risk fields and flags of `summary` (counts are already set)
    /// and return the recommendations.
    fn assess(steps: &StepMap<Self>, summary: &mut Summary) -> Vec<String>;
}

/// Derive overall status, summary and recommendations from `steps`.
pub fn aggregate<K: RiskRules>(steps: &StepMap<K>) -> Aggregate {
    let mut summary = Summary::count(steps);
    let recommendations = K::assess(steps, &mut summary);
    Aggregate {
        overall_status: OverallStatus::from_outcomes(steps.values()),
        summary,
        recommendations,
    }
}

/// Result payload of `step`, if it ran and completed.
pub(crate) fn completed<K: WorkflowStep>(steps: &StepMap<K>, step: K) -> Option<&Value> {
    steps.get(&step).and_then(|o| o.result())
}

pub(crate) fn bool_at(value: &Value, pointer: &str) -> Option<bool> {
    value.pointer(pointer).and_then(Value::as_bool)
}

/// Non-negative integer at `pointer`; numeric strings are accepted.
pub(crate) fn count_at(value: &Value, pointer: &str) -> Option<u64> {
    let v = value.pointer(pointer)?;
    v.as_u64().or_else(|| v.as_str().and_then(|s| s.trim().parse().ok()))
}

pub(crate) fn str_at<'a>(value: &'a Value, pointer: &str) -> Option<&'a str> {
    value.pointer(pointer).and_then(Value::as_str)
}
