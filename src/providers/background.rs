//! Background-check provider (criminal, driving, employment and credit checks).

use std::fmt;

use async_trait::async_trait;
use chrono::NaiveDate;
use secrecy::SecretString;
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::config::ProviderConfig;
use crate::error::ProviderError;
use crate::providers::http::HttpProvider;
use crate::subject::{Address, BusinessInfo, Subject};

/// The individual checks the provider can run.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum BackgroundCheckKind {
    Criminal,
    Driving,
    Employment,
    Credit,
}

impl BackgroundCheckKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Criminal => "criminal",
            Self::Driving => "driving",
            Self::Employment => "employment",
            Self::Credit => "credit",
        }
    }
}

impl fmt::Display for BackgroundCheckKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Candidate details sent with every check.
#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct BackgroundCheckRequest {
    pub driver_id: Uuid,
    pub first_name: String,
    pub last_name: String,
    pub email: String,
    pub date_of_birth: NaiveDate,
    #[serde(serialize_with = "crate::subject::serialize_secret")]
    pub ssn: SecretString,
    pub license_number: String,
    pub license_state: String,
    pub address: Address,
    pub previous_addresses: Vec<Address>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub business: Option<BusinessInfo>,
}

impl BackgroundCheckRequest {
    pub fn from_subject(subject: &Subject) -> Self {
        let p = &subject.personal;
        Self {
            driver_id: subject.id,
            first_name: p.first_name.clone(),
            last_name: p.last_name.clone(),
            email: p.email.clone(),
            date_of_birth: p.date_of_birth,
            ssn: p.ssn.clone(),
            license_number: p.license_number.clone(),
            license_state: p.license_state.clone(),
            address: p.address.clone(),
            previous_addresses: p.previous_addresses.clone(),
            business: subject.business.clone(),
        }
    }
}

/// Normalized result of one check.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CheckReport {
    pub check_id: String,
    pub status: String,
    #[serde(default)]
    pub results: serde_json::Value,
    #[serde(default)]
    pub summary: serde_json::Value,
}

#[async_trait]
pub trait BackgroundCheckProvider: Send + Sync {
    async fn run_check(
        &self,
        kind: BackgroundCheckKind,
        request: &BackgroundCheckRequest,
    ) -> Result<CheckReport, ProviderError>;
}

/// HTTP client for the background-check API.
pub struct BackgroundCheckClient {
    http: HttpProvider,
}

impl BackgroundCheckClient {
    pub fn new(config: ProviderConfig) -> Result<Self, ProviderError> {
        Ok(Self {
            http: HttpProvider::new("background_check", config)?,
        })
    }
}

#[async_trait]
impl BackgroundCheckProvider for BackgroundCheckClient {
    async fn run_check(
        &self,
        kind: BackgroundCheckKind,
        request: &BackgroundCheckRequest,
    ) -> Result<CheckReport, ProviderError> {
        self.http
            .post_json(&format!("/v1/checks/{kind}"), request)
            .await
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::providers::http::fake;
    use crate::subject::fixtures::bare_subject;
    use axum::extract::Path;
    use axum::routing::post;
    use axum::{Json, Router};
    use serde_json::{Value, json};

    #[tokio::test]
    async fn posts_to_kind_specific_path() {
        let app = Router::new().route(
            "/v1/checks/{kind}",
            post(|Path(kind): Path<String>, Json(body): Json<Value>| async move {
                Json(json!({
                    "checkId": format!("chk_{kind}"),
                    "status": "clear",
                    "results": {"records": []},
                    "summary": {"ssnSent": body["ssn"]},
                }))
            }),
        );
        let base = fake::spawn(app).await;
        let client = BackgroundCheckClient::new(ProviderConfig::new(base).with_api_key("k")).unwrap();

        let request = BackgroundCheckRequest::from_subject(&bare_subject());
        let report = client
            .run_check(BackgroundCheckKind::Driving, &request)
            .await
            .unwrap();

        assert_eq!(report.check_id, "chk_driving");
        assert_eq!(report.status, "clear");
        assert_eq!(report.summary["ssnSent"], "123-45-6789");
    }

    #[tokio::test]
    async fn unconfigured_client_fails_fast() {
        let client = BackgroundCheckClient::new(ProviderConfig::new("http://127.0.0.1:9")).unwrap();
        let request = BackgroundCheckRequest::from_subject(&bare_subject());
        let err = client
            .run_check(BackgroundCheckKind::Criminal, &request)
            .await
            .unwrap_err();
        assert!(matches!(err, ProviderError::NotConfigured { .. }));
    }
}
