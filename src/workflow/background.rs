//! Background-check workflow: criminal, driving, employment and credit checks.

use std::sync::Arc;

use async_trait::async_trait;
use serde_json::Value;

use super::aggregate::{RiskRules, bool_at, completed, count_at, str_at};
use super::registry::{Step, StepRegistry};
use super::{BackgroundCheckStep, RiskLevel, StepMap, Summary, WorkflowStep};
use crate::error::StepError;
use crate::providers::{BackgroundCheckProvider, BackgroundCheckRequest};
use crate::subject::Subject;

/// Result fields the risk rules read from normalized check reports.
mod shape {
    /// Criminal: provider's own verdict.
    pub const HAS_CRIMINAL_HISTORY: &str = "/summary/hasCriminalHistory";
    /// Criminal: list of `{type, ...}` records.
    pub const CRIMINAL_RECORDS: &str = "/results/records";
    /// Driving: violation count, or the violations list as fallback.
    pub const VIOLATION_COUNT: &str = "/summary/violationCount";
    pub const VIOLATIONS: &str = "/results/violations";
    /// Employment: whether the stated employment was confirmed.
    pub const EMPLOYMENT_VERIFIED: &str = "/summary/employmentVerified";
}

/// Record types that count as a conviction.
const CONVICTION_RECORD_TYPES: &[&str] = &["conviction", "felony", "misdemeanor"];

/// More violations than this raise the risk to medium.
const MAX_DRIVING_VIOLATIONS: u64 = 3;

/// One background check delegated to the provider.
pub struct CheckStep {
    step: BackgroundCheckStep,
    provider: Arc<dyn BackgroundCheckProvider>,
}

#[async_trait]
impl Step<BackgroundCheckStep> for CheckStep {
    fn name(&self) -> BackgroundCheckStep {
        self.step
    }

    /// Credit checks only run for owner-operators with a business on file.
    fn is_applicable(&self, subject: &Subject) -> bool {
        match self.step {
            BackgroundCheckStep::Credit => subject.business.is_some(),
            _ => true,
        }
    }

    async fn invoke(&self, subject: &Subject) -> Result<Value, StepError> {
        let request = BackgroundCheckRequest::from_subject(subject);
        let report = self.provider.run_check(self.step.into(), &request).await?;
        Ok(serde_json::to_value(report)?)
    }
}

pub fn background_check_registry(
    provider: Arc<dyn BackgroundCheckProvider>,
) -> StepRegistry<BackgroundCheckStep> {
    BackgroundCheckStep::ALL
        .iter()
        .fold(StepRegistry::new(), |registry, &step| {
            registry.with_step(Arc::new(CheckStep {
                step,
                provider: Arc::clone(&provider),
            }))
        })
}

fn has_conviction(result: &Value) -> bool {
    if bool_at(result, shape::HAS_CRIMINAL_HISTORY) == Some(true) {
        return true;
    }
    result
        .pointer(shape::CRIMINAL_RECORDS)
        .and_then(Value::as_array)
        .is_some_and(|records| {
            records.iter().any(|r| {
                str_at(r, "/type").is_some_and(|t| {
                    CONVICTION_RECORD_TYPES
                        .iter()
                        .any(|c| c.eq_ignore_ascii_case(t))
                })
            })
        })
}

fn violation_count(result: &Value) -> u64 {
    count_at(result, shape::VIOLATION_COUNT).unwrap_or_else(|| {
        result
            .pointer(shape::VIOLATIONS)
            .and_then(Value::as_array)
            .map_or(0, |v| v.len() as u64)
    })
}

impl RiskRules for BackgroundCheckStep {
    fn assess(steps: &StepMap<Self>, summary: &mut Summary) -> Vec<String> {
        let mut risk = RiskLevel::Low;

        if let Some(result) = completed(steps, Self::Criminal)
            && has_conviction(result)
        {
            summary.flags.push("Criminal history detected".into());
            risk = RiskLevel::High;
        }

        if let Some(result) = completed(steps, Self::Driving)
            && violation_count(result) > MAX_DRIVING_VIOLATIONS
        {
            summary.flags.push("Multiple driving violations".into());
            risk = risk.max(RiskLevel::Medium);
        }

        if let Some(result) = completed(steps, Self::Employment)
            && bool_at(result, shape::EMPLOYMENT_VERIFIED) != Some(true)
        {
            summary.flags.push("Employment verification failed".into());
            risk = risk.max(RiskLevel::Medium);
        }

        summary.risk_level = Some(risk);

        match risk {
            RiskLevel::High => vec![
                "Manual review required".into(),
                "Request additional documentation".into(),
            ],
            RiskLevel::Medium => vec![
                "Review flagged items".into(),
                "Consider additional verification".into(),
            ],
            RiskLevel::Low => vec!["Proceed with standard onboarding".into()],
        }
    }
}
