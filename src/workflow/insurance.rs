//! Insurance-verification workflow: policy, driver, vehicle and commercial lookups.

use std::sync::Arc;

use async_trait::async_trait;
use chrono::{NaiveDate, Utc};
use rust_decimal::Decimal;
use rust_decimal_macros::dec;
use serde_json::Value;

use super::aggregate::{RiskRules, str_at};
use super::registry::{Step, StepRegistry};
use super::{CoverageStatus, InsuranceStep, StepMap, Summary, WorkflowStep};
use crate::error::StepError;
use crate::providers::{InsuranceProvider, InsuranceRequest};
use crate::subject::Subject;

/// Minimum acceptable liability coverage.
pub const LIABILITY_FLOOR: Decimal = dec!(50000);

/// Result fields the coverage rules read from verification reports.
///
/// A report describes one policy at `/results` (`policyDetails` +
/// `coverage`) and/or several under `/results/policies`, each entry with the
/// same two members.
mod shape {
    pub const SINGLE_POLICY: &str = "/results";
    pub const POLICY_LIST: &str = "/results/policies";
    pub const STATUS: &str = "/policyDetails/status";
    pub const EXPIRATION_DATE: &str = "/policyDetails/expirationDate";
    pub const LIABILITY: &str = "/coverage/liability";
}

/// One insurance lookup delegated to the provider.
pub struct VerificationStep {
    step: InsuranceStep,
    provider: Arc<dyn InsuranceProvider>,
}

#[async_trait]
impl Step<InsuranceStep> for VerificationStep {
    fn name(&self) -> InsuranceStep {
        self.step
    }

    fn is_applicable(&self, subject: &Subject) -> bool {
        match self.step {
            InsuranceStep::Policy => subject.policy_number().is_some(),
            InsuranceStep::Driver => true,
            InsuranceStep::Vehicle => subject.vin().is_some(),
            InsuranceStep::Commercial => subject.business.is_some(),
        }
    }

    async fn invoke(&self, subject: &Subject) -> Result<Value, StepError> {
        let request = InsuranceRequest::from_subject(subject);
        let report = self.provider.verify(self.step.into(), &request).await?;
        Ok(serde_json::to_value(report)?)
    }
}

pub fn insurance_registry(provider: Arc<dyn InsuranceProvider>) -> StepRegistry<InsuranceStep> {
    InsuranceStep::ALL
        .iter()
        .fold(StepRegistry::new(), |registry, &step| {
            registry.with_step(Arc::new(VerificationStep {
                step,
                provider: Arc::clone(&provider),
            }))
        })
}

/// What the rules need to know about one policy.
#[derive(Debug, PartialEq)]
struct PolicyView {
    active: bool,
    expired: bool,
    liability: Option<Decimal>,
}

impl PolicyView {
    fn read(entry: &Value, today: NaiveDate) -> Option<Self> {
        let status = str_at(entry, shape::STATUS)?.to_ascii_lowercase();
        let lapsed = str_at(entry, shape::EXPIRATION_DATE)
            .and_then(|d| d.get(..10))
            .and_then(|d| NaiveDate::parse_from_str(d, "%Y-%m-%d").ok())
            .is_some_and(|d| d < today);
        let expired = status == "expired" || lapsed;
        Some(Self {
            active: status == "active" && !expired,
            expired,
            liability: entry.pointer(shape::LIABILITY).and_then(decimal),
        })
    }

    fn under_floor(&self) -> bool {
        self.active && self.liability.is_some_and(|l| l < LIABILITY_FLOOR)
    }
}

fn decimal(v: &Value) -> Option<Decimal> {
    match v {
        Value::String(s) => s.trim().parse().ok(),
        Value::Number(n) => n
            .as_i64()
            .map(Decimal::from)
            .or_else(|| n.as_f64().and_then(|f| Decimal::try_from(f).ok())),
        _ => None,
    }
}

fn policies_in(result: &Value, today: NaiveDate) -> Vec<PolicyView> {
    let mut policies: Vec<PolicyView> = result
        .pointer(shape::SINGLE_POLICY)
        .and_then(|single| PolicyView::read(single, today))
        .into_iter()
        .collect();
    if let Some(list) = result.pointer(shape::POLICY_LIST).and_then(Value::as_array) {
        policies.extend(list.iter().filter_map(|entry| PolicyView::read(entry, today)));
    }
    policies
}

/// Classify coverage across all completed lookups.
///
/// When a result set holds both an under-floor active policy and an expired
/// one, both flags are raised and `insufficient` wins the classification.
fn classify(steps: &StepMap<InsuranceStep>, today: NaiveDate) -> (CoverageStatus, Vec<String>) {
    let policies: Vec<PolicyView> = steps
        .values()
        .filter_map(|o| o.result())
        .flat_map(|result| policies_in(result, today))
        .collect();

    let any_active = policies.iter().any(|p| p.active);
    let any_expired = policies.iter().any(|p| p.expired);
    let any_under_floor = policies.iter().any(PolicyView::under_floor);

    let mut flags = Vec::new();
    if any_under_floor {
        flags.push("Insufficient liability coverage".to_string());
    }
    if any_expired {
        flags.push("Expired insurance policy".to_string());
    }
    if !any_active && !any_expired {
        flags.push("No active insurance policy found".to_string());
    }

    let status = if any_active && !any_expired && !any_under_floor {
        CoverageStatus::Adequate
    } else if any_active && any_under_floor {
        CoverageStatus::Insufficient
    } else if any_expired {
        CoverageStatus::Expired
    } else {
        CoverageStatus::Unknown
    };
    (status, flags)
}

fn recommendations_for(status: CoverageStatus) -> Vec<String> {
    let recs: &[&str] = match status {
        CoverageStatus::Adequate => &[
            "Insurance verification passed",
            "Proceed with standard onboarding",
        ],
        CoverageStatus::Insufficient => &[
            "Increase liability coverage to at least $50,000",
            "Contact insurance provider to update policy",
        ],
        CoverageStatus::Expired => &[
            "Renew expired insurance policy",
            "Provide updated insurance certificate",
        ],
        CoverageStatus::Unknown => &[
            "Manual insurance verification required",
            "Request additional insurance documentation",
        ],
    };
    recs.iter().map(|s| s.to_string()).collect()
}

impl RiskRules for InsuranceStep {
    fn assess(steps: &StepMap<Self>, summary: &mut Summary) -> Vec<String> {
        let (status, flags) = classify(steps, Utc::now().date_naive());
        summary.coverage_status = Some(status);
        summary.flags.extend(flags);
        recommendations_for(status)
    }
}
