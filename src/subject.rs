//! The driver being onboarded, and the directory the workflows read it from.

use async_trait::async_trait;
use chrono::{DateTime, NaiveDate, Utc};
use secrecy::{ExposeSecret, SecretString};
use serde::{Deserialize, Serialize, Serializer};
use uuid::Uuid;

use crate::error::WorkflowError;

/// A driver applicant with everything the verification providers need.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Subject {
    pub id: Uuid,
    pub personal: PersonalInfo,
    #[serde(default)]
    pub vehicle: Option<VehicleInfo>,
    #[serde(default)]
    pub business: Option<BusinessInfo>,
    #[serde(default)]
    pub insurance: Option<InsuranceInfo>,
    #[serde(default)]
    pub documents: Vec<DocumentRef>,
}

impl Subject {
    /// VIN of the registered vehicle, if one was supplied and is not blank.
    pub fn vin(&self) -> Option<&str> {
        self.vehicle
            .as_ref()
            .map(|v| v.vin.trim())
            .filter(|vin| !vin.is_empty())
    }

    /// Insurance policy number, if one was supplied and is not blank.
    pub fn policy_number(&self) -> Option<&str> {
        self.insurance
            .as_ref()
            .and_then(|i| i.policy_number.as_deref())
            .map(str::trim)
            .filter(|p| !p.is_empty())
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PersonalInfo {
    pub first_name: String,
    pub last_name: String,
    pub email: String,
    #[serde(default)]
    pub phone: Option<String>,
    pub date_of_birth: NaiveDate,
    #[serde(serialize_with = "serialize_secret")]
    pub ssn: SecretString,
    pub license_number: String,
    pub license_state: String,
    pub address: Address,
    #[serde(default)]
    pub previous_addresses: Vec<Address>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Address {
    pub street: String,
    pub city: String,
    pub state: String,
    pub zip_code: String,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct VehicleInfo {
    pub vin: String,
    pub make: String,
    pub model: String,
    pub year: u16,
    #[serde(default)]
    pub license_plate: Option<String>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct BusinessInfo {
    pub name: String,
    pub ein: String,
    pub business_type: String,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct InsuranceInfo {
    #[serde(default)]
    pub policy_number: Option<String>,
    #[serde(default)]
    pub carrier: Option<String>,
    #[serde(default)]
    pub effective_date: Option<NaiveDate>,
    #[serde(default)]
    pub expiration_date: Option<NaiveDate>,
}

/// An uploaded document waiting to be moved into permanent storage.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct DocumentRef {
    pub id: Uuid,
    pub document_type: String,
    pub source_key: String,
    pub content_type: String,
    pub size_bytes: u64,
}

pub(crate) fn serialize_secret<S: Serializer>(secret: &SecretString, s: S) -> Result<S::Ok, S::Error> {
    s.serialize_str(secret.expose_secret())
}

/// Where workflows fetch driver profiles from, and report back to.
#[async_trait]
pub trait DriverDirectory: Send + Sync {
    /// Fetch the current profile. Fails with `SubjectNotFound` for unknown ids.
    async fn get_subject(&self, id: Uuid) -> Result<Subject, WorkflowError>;

    /// Insert or replace a driver profile.
    async fn upsert_subject(&self, subject: &Subject) -> Result<(), WorkflowError>;

    /// Mark the driver's profile as submitted for onboarding review.
    async fn record_onboarding_submission(
        &self,
        id: Uuid,
        submitted_at: DateTime<Utc>,
    ) -> Result<(), WorkflowError>;
}
