//! Payment provider: opens the payout account a driver gets paid into.

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::config::ProviderConfig;
use crate::error::ProviderError;
use crate::providers::http::HttpProvider;
use crate::subject::Subject;

/// Country payout accounts are opened in.
const PAYOUT_COUNTRY: &str = "US";

#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct PayoutAccountRequest {
    pub driver_id: Uuid,
    pub email: String,
    pub first_name: String,
    pub last_name: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub phone: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub business_name: Option<String>,
    pub country: String,
}

impl PayoutAccountRequest {
    pub fn from_subject(subject: &Subject) -> Self {
        let p = &subject.personal;
        Self {
            driver_id: subject.id,
            email: p.email.clone(),
            first_name: p.first_name.clone(),
            last_name: p.last_name.clone(),
            phone: p.phone.clone(),
            business_name: subject.business.as_ref().map(|b| b.name.clone()),
            country: PAYOUT_COUNTRY.to_string(),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PayoutAccount {
    pub account_id: String,
    pub status: String,
    #[serde(default)]
    pub payouts_enabled: bool,
}

#[async_trait]
pub trait PaymentProvider: Send + Sync {
    async fn create_payout_account(
        &self,
        request: &PayoutAccountRequest,
    ) -> Result<PayoutAccount, ProviderError>;
}

/// HTTP client for the payments API.
pub struct PaymentClient {
    http: HttpProvider,
}

impl PaymentClient {
    pub fn new(config: ProviderConfig) -> Result<Self, ProviderError> {
        Ok(Self {
            http: HttpProvider::new("payments", config)?,
        })
    }
}

#[async_trait]
impl PaymentProvider for PaymentClient {
    async fn create_payout_account(
        &self,
        request: &PayoutAccountRequest,
    ) -> Result<PayoutAccount, ProviderError> {
        self.http.post_json("/v1/payout_accounts", request).await
    }
}
