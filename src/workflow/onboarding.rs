//! Top-level onboarding workflow.
//!
//! Wraps the background-check and insurance workflows as single steps and
//! adds payout setup, document archival and the profile update.

use std::sync::Arc;

use async_trait::async_trait;
use chrono::Utc;
use serde_json::{Value, json};

use super::aggregate::{RiskRules, aggregate};
use super::executor::fan_out;
use super::registry::{Step, StepRegistry};
use super::{
    BackgroundCheckStep, InsuranceStep, OnboardingStep, OverallStatus, RiskLevel, StepMap, Summary,
};
use crate::error::StepError;
use crate::providers::{
    ArchiveRequest, PaymentProvider, PayoutAccountRequest, Providers, StorageProvider,
};
use crate::subject::{DriverDirectory, Subject};

/// Runs a nested workflow and reports its aggregate as the step result.
///
/// The step fails only when every nested step failed.
pub struct NestedWorkflowStep<K: RiskRules> {
    name: OnboardingStep,
    registry: Arc<StepRegistry<K>>,
}

impl<K: RiskRules> NestedWorkflowStep<K> {
    pub fn new(name: OnboardingStep, registry: Arc<StepRegistry<K>>) -> Self {
        Self { name, registry }
    }
}

#[async_trait]
impl<K: RiskRules> Step<OnboardingStep> for NestedWorkflowStep<K> {
    fn name(&self) -> OnboardingStep {
        self.name
    }

    async fn invoke(&self, subject: &Subject) -> Result<Value, StepError> {
        let steps = fan_out(&self.registry, subject).await;
        let agg = aggregate(&steps);

        if agg.overall_status == OverallStatus::Failed {
            let reason = steps
                .iter()
                .filter_map(|(k, o)| o.error().map(|e| format!("{k}: {e}")))
                .collect::<Vec<_>>()
                .join("; ");
            return Err(StepError::NestedWorkflowFailed {
                workflow: K::KIND.to_string(),
                reason,
            });
        }

        Ok(json!({
            "overallStatus": agg.overall_status,
            "summary": agg.summary,
            "recommendations": agg.recommendations,
            "steps": steps,
        }))
    }
}

/// Opens the driver's payout account.
pub struct PayoutStep {
    payments: Arc<dyn PaymentProvider>,
}

#[async_trait]
impl Step<OnboardingStep> for PayoutStep {
    fn name(&self) -> OnboardingStep {
        OnboardingStep::Payment
    }

    async fn invoke(&self, subject: &Subject) -> Result<Value, StepError> {
        let account = self
            .payments
            .create_payout_account(&PayoutAccountRequest::from_subject(subject))
            .await?;
        Ok(serde_json::to_value(account)?)
    }
}

/// Moves uploaded documents into permanent storage.
pub struct ArchiveStep {
    storage: Arc<dyn StorageProvider>,
}

#[async_trait]
impl Step<OnboardingStep> for ArchiveStep {
    fn name(&self) -> OnboardingStep {
        OnboardingStep::DocumentStorage
    }

    fn is_applicable(&self, subject: &Subject) -> bool {
        !subject.documents.is_empty()
    }

    async fn invoke(&self, subject: &Subject) -> Result<Value, StepError> {
        let receipt = self
            .storage
            .archive_documents(&ArchiveRequest::from_subject(subject))
            .await?;
        Ok(serde_json::to_value(receipt)?)
    }
}

/// Marks the driver profile as submitted for review.
pub struct ProfileUpdateStep {
    directory: Arc<dyn DriverDirectory>,
}

#[async_trait]
impl Step<OnboardingStep> for ProfileUpdateStep {
    fn name(&self) -> OnboardingStep {
        OnboardingStep::DatabaseUpdate
    }

    async fn invoke(&self, subject: &Subject) -> Result<Value, StepError> {
        let submitted_at = Utc::now();
        self.directory
            .record_onboarding_submission(subject.id, submitted_at)
            .await?;
        Ok(json!({
            "driverId": subject.id,
            "onboardingStatus": "in_review",
            "submittedAt": submitted_at,
        }))
    }
}

pub fn onboarding_registry(
    providers: &Providers,
    directory: Arc<dyn DriverDirectory>,
    background: Arc<StepRegistry<BackgroundCheckStep>>,
    insurance: Arc<StepRegistry<InsuranceStep>>,
) -> StepRegistry<OnboardingStep> {
    StepRegistry::new()
        .with_step(Arc::new(NestedWorkflowStep::new(
            OnboardingStep::BackgroundCheck,
            background,
        )))
        .with_step(Arc::new(NestedWorkflowStep::new(
            OnboardingStep::InsuranceVerification,
            insurance,
        )))
        .with_step(Arc::new(PayoutStep {
            payments: Arc::clone(&providers.payments),
        }))
        .with_step(Arc::new(ArchiveStep {
            storage: Arc::clone(&providers.storage),
        }))
        .with_step(Arc::new(ProfileUpdateStep { directory }))
}

/// Remediation text for a failed onboarding step.
fn remediation(step: OnboardingStep) -> &'static str {
    match step {
        OnboardingStep::BackgroundCheck => {
            "Background check failed - verify personal information and retry"
        }
        OnboardingStep::InsuranceVerification => {
            "Insurance verification failed - provide valid insurance documentation"
        }
        OnboardingStep::Payment => "Payment setup failed - verify payout account details",
        OnboardingStep::DocumentStorage => "Document storage failed - re-upload required documents",
        OnboardingStep::DatabaseUpdate => "Profile update failed - contact support",
    }
}

fn estimated_completion(pending: usize) -> &'static str {
    match pending {
        0 => "Immediate",
        1..=2 => "1-2 business days",
        _ => "3-5 business days",
    }
}

impl RiskRules for OnboardingStep {
    fn assess(steps: &StepMap<Self>, summary: &mut Summary) -> Vec<String> {
        let failed = summary.failed_steps;
        let risk = if failed > 2 {
            summary.flags.push("Multiple critical steps failed".into());
            RiskLevel::High
        } else if failed > 0 {
            summary.flags.push("Some steps require attention".into());
            RiskLevel::Medium
        } else {
            RiskLevel::Low
        };
        summary.risk_level = Some(risk);
        summary.estimated_completion = Some(estimated_completion(summary.pending_steps).into());

        let mut recommendations: Vec<String> = steps
            .iter()
            .filter(|(_, o)| !o.is_completed())
            .map(|(step, _)| remediation(*step).to_string())
            .collect();

        let (completed, total) = (summary.completed_steps, summary.total_steps);
        if total > 0 && completed == total {
            recommendations.push("All onboarding steps completed successfully".into());
            recommendations.push("Proceed with standard onboarding".into());
        } else if completed * 2 > total {
            recommendations.push("Onboarding mostly complete - address remaining items".into());
        } else {
            recommendations.push("Onboarding requires significant attention".into());
        }

        recommendations
    }
}
