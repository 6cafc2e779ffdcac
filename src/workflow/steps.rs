//! Step names. Each workflow has its own closed set.

use std::fmt;

use serde::{Deserialize, Serialize};

use super::{WorkflowKind, WorkflowStep};
use crate::providers::{BackgroundCheckKind, InsuranceCheckKind};

/// Steps of the top-level onboarding workflow.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub enum OnboardingStep {
    BackgroundCheck,
    InsuranceVerification,
    Payment,
    DocumentStorage,
    DatabaseUpdate,
}

impl WorkflowStep for OnboardingStep {
    const KIND: WorkflowKind = WorkflowKind::Onboarding;
    const ALL: &'static [Self] = &[
        Self::BackgroundCheck,
        Self::InsuranceVerification,
        Self::Payment,
        Self::DocumentStorage,
        Self::DatabaseUpdate,
    ];

    fn as_str(&self) -> &'static str {
        match self {
            Self::BackgroundCheck => "backgroundCheck",
            Self::InsuranceVerification => "insuranceVerification",
            Self::Payment => "payment",
            Self::DocumentStorage => "documentStorage",
            Self::DatabaseUpdate => "databaseUpdate",
        }
    }
}

/// Steps of the background-check workflow.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub enum BackgroundCheckStep {
    Criminal,
    Driving,
    Employment,
    Credit,
}

impl WorkflowStep for BackgroundCheckStep {
    const KIND: WorkflowKind = WorkflowKind::BackgroundCheck;
    const ALL: &'static [Self] = &[Self::Criminal, Self::Driving, Self::Employment, Self::Credit];

    fn as_str(&self) -> &'static str {
        match self {
            Self::Criminal => "criminal",
            Self::Driving => "driving",
            Self::Employment => "employment",
            Self::Credit => "credit",
        }
    }
}

impl From<BackgroundCheckStep> for BackgroundCheckKind {
    fn from(step: BackgroundCheckStep) -> Self {
        match step {
            BackgroundCheckStep::Criminal => Self::Criminal,
            BackgroundCheckStep::Driving => Self::Driving,
            BackgroundCheckStep::Employment => Self::Employment,
            BackgroundCheckStep::Credit => Self::Credit,
        }
    }
}

/// Steps of the insurance-verification workflow.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub enum InsuranceStep {
    Policy,
    Driver,
    Vehicle,
    Commercial,
}

impl WorkflowStep for InsuranceStep {
    const KIND: WorkflowKind = WorkflowKind::Insurance;
    const ALL: &'static [Self] = &[Self::Policy, Self::Driver, Self::Vehicle, Self::Commercial];

    fn as_str(&self) -> &'static str {
        match self {
            Self::Policy => "policy",
            Self::Driver => "driver",
            Self::Vehicle => "vehicle",
            Self::Commercial => "commercial",
        }
    }
}

impl From<InsuranceStep> for InsuranceCheckKind {
    fn from(step: InsuranceStep) -> Self {
        match step {
            InsuranceStep::Policy => Self::Policy,
            InsuranceStep::Driver => Self::Driver,
            InsuranceStep::Vehicle => Self::Vehicle,
            InsuranceStep::Commercial => Self::Commercial,
        }
    }
}

impl fmt::Display for OnboardingStep {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl fmt::Display for BackgroundCheckStep {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl fmt::Display for InsuranceStep {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}
