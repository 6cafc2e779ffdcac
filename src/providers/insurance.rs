//! Insurance-verification provider.

use std::fmt;

use async_trait::async_trait;
use chrono::NaiveDate;
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::config::ProviderConfig;
use crate::error::ProviderError;
use crate::providers::http::HttpProvider;
use crate::subject::Subject;

/// Lookups the insurance API supports.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum InsuranceCheckKind {
    /// Verify a specific policy by number.
    Policy,
    /// Search all policies listing the driver.
    Driver,
    /// Search policies covering a VIN.
    Vehicle,
    /// Verify commercial coverage for a business.
    Commercial,
}

impl InsuranceCheckKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Policy => "policy",
            Self::Driver => "driver",
            Self::Vehicle => "vehicle",
            Self::Commercial => "commercial",
        }
    }
}

impl fmt::Display for InsuranceCheckKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct InsuranceRequest {
    pub driver_id: Uuid,
    pub first_name: String,
    pub last_name: String,
    pub date_of_birth: NaiveDate,
    pub license_number: String,
    pub license_state: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub policy_number: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub carrier: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub vin: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub business_name: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub ein: Option<String>,
}

impl InsuranceRequest {
    pub fn from_subject(subject: &Subject) -> Self {
        let p = &subject.personal;
        Self {
            driver_id: subject.id,
            first_name: p.first_name.clone(),
            last_name: p.last_name.clone(),
            date_of_birth: p.date_of_birth,
            license_number: p.license_number.clone(),
            license_state: p.license_state.clone(),
            policy_number: subject.policy_number().map(str::to_string),
            carrier: subject.insurance.as_ref().and_then(|i| i.carrier.clone()),
            vin: subject.vin().map(str::to_string),
            business_name: subject.business.as_ref().map(|b| b.name.clone()),
            ein: subject.business.as_ref().map(|b| b.ein.clone()),
        }
    }
}

/// Normalized verification result.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct VerificationReport {
    pub verification_id: String,
    pub status: String,
    #[serde(default)]
    pub results: serde_json::Value,
    #[serde(default)]
    pub summary: serde_json::Value,
}

#[async_trait]
pub trait InsuranceProvider: Send + Sync {
    async fn verify(
        &self,
        kind: InsuranceCheckKind,
        request: &InsuranceRequest,
    ) -> Result<VerificationReport, ProviderError>;
}

/// HTTP client for the insurance-verification API.
pub struct InsuranceClient {
    http: HttpProvider,
}

impl InsuranceClient {
    pub fn new(config: ProviderConfig) -> Result<Self, ProviderError> {
        Ok(Self {
            http: HttpProvider::new("insurance", config)?,
        })
    }
}

#[async_trait]
impl InsuranceProvider for InsuranceClient {
    async fn verify(
        &self,
        kind: InsuranceCheckKind,
        request: &InsuranceRequest,
    ) -> Result<VerificationReport, ProviderError> {
        self.http
            .post_json(&format!("/v1/verifications/{kind}"), request)
            .await
    }
}
