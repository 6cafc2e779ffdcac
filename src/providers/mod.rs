//! Adapters for the external verification, payment and storage APIs.
//!
//! Each capability is a trait so the workflows can run against stubs; the
//! `*Client` types are the HTTP implementations. Adapters only delegate and
//! normalize. They never retry, cache, or interpret results.

pub mod background;
pub mod http;
pub mod insurance;
pub mod payment;
pub mod storage;

use std::sync::Arc;

pub use background::{
    BackgroundCheckClient, BackgroundCheckKind, BackgroundCheckProvider, BackgroundCheckRequest,
    CheckReport,
};
pub use insurance::{
    InsuranceCheckKind, InsuranceClient, InsuranceProvider, InsuranceRequest, VerificationReport,
};
pub use payment::{PaymentClient, PaymentProvider, PayoutAccount, PayoutAccountRequest};
pub use storage::{ArchiveReceipt, ArchiveRequest, StorageClient, StorageProvider};

use crate::config::ProvidersConfig;
use crate::error::ProviderError;

/// One handle per provider capability.
#[derive(Clone)]
pub struct Providers {
    pub background_check: Arc<dyn BackgroundCheckProvider>,
    pub insurance: Arc<dyn InsuranceProvider>,
    pub payments: Arc<dyn PaymentProvider>,
    pub storage: Arc<dyn StorageProvider>,
}

impl Providers {
    /// Build the HTTP clients for every provider.
    ///
    /// Providers without a credential are still constructed; their calls
    /// fail with `NotConfigured`.
    pub fn from_config(config: &ProvidersConfig) -> Result<Self, ProviderError> {
        for (name, c) in [
            ("background_check", &config.background_check),
            ("insurance", &config.insurance),
            ("payments", &config.payments),
            ("storage", &config.storage),
        ] {
            if c.api_key.is_none() {
                tracing::warn!(provider = name, "Provider has no API key; its steps will fail");
            }
        }

        Ok(Self {
            background_check: Arc::new(BackgroundCheckClient::new(
                config.background_check.clone(),
            )?),
            insurance: Arc::new(InsuranceClient::new(config.insurance.clone())?),
            payments: Arc::new(PaymentClient::new(config.payments.clone())?),
            storage: Arc::new(StorageClient::new(config.storage.clone())?),
        })
    }
}

/// In-process providers for workflow tests. Every call succeeds with a clean
/// report unless its capability has been switched to failing.
#[cfg(test)]
pub(crate) mod stubs {
    use std::sync::atomic::{AtomicBool, Ordering};

    use async_trait::async_trait;
    use serde_json::json;

    use super::storage::StoredDocument;
    use super::*;

    #[derive(Default)]
    pub struct StubProviders {
        pub fail_background: AtomicBool,
        pub fail_payments: AtomicBool,
    }

    impl StubProviders {
        pub fn providers(self: &Arc<Self>) -> Providers {
            Providers {
                background_check: self.clone(),
                insurance: self.clone(),
                payments: self.clone(),
                storage: self.clone(),
            }
        }

        fn outage(provider: &str) -> ProviderError {
            ProviderError::Upstream {
                provider: provider.into(),
                status: 503,
                message: "service unavailable".into(),
            }
        }
    }

    #[async_trait]
    impl BackgroundCheckProvider for StubProviders {
        async fn run_check(
            &self,
            kind: BackgroundCheckKind,
            _request: &BackgroundCheckRequest,
        ) -> Result<CheckReport, ProviderError> {
            if self.fail_background.load(Ordering::SeqCst) {
                return Err(Self::outage("checkr"));
            }
            Ok(CheckReport {
                check_id: format!("chk_{kind}"),
                status: "clear".into(),
                results: json!({"records": [], "violations": []}),
                summary: json!({"hasCriminalHistory": false, "employmentVerified": true}),
            })
        }
    }

    #[async_trait]
    impl InsuranceProvider for StubProviders {
        async fn verify(
            &self,
            kind: InsuranceCheckKind,
            _request: &InsuranceRequest,
        ) -> Result<VerificationReport, ProviderError> {
            Ok(VerificationReport {
                verification_id: format!("ver_{kind}"),
                status: "verified".into(),
                results: json!({
                    "policyDetails": {"status": "active", "expirationDate": "2099-12-31"},
                    "coverage": {"liability": 100000}
                }),
                summary: json!({}),
            })
        }
    }

    #[async_trait]
    impl PaymentProvider for StubProviders {
        async fn create_payout_account(
            &self,
            request: &PayoutAccountRequest,
        ) -> Result<PayoutAccount, ProviderError> {
            if self.fail_payments.load(Ordering::SeqCst) {
                return Err(Self::outage("stripe"));
            }
            Ok(PayoutAccount {
                account_id: format!("acct_{}", request.driver_id.simple()),
                status: "active".into(),
                payouts_enabled: true,
            })
        }
    }

    #[async_trait]
    impl StorageProvider for StubProviders {
        async fn archive_documents(
            &self,
            request: &ArchiveRequest,
        ) -> Result<ArchiveReceipt, ProviderError> {
            Ok(ArchiveReceipt {
                archive_id: format!("arc_{}", request.driver_id.simple()),
                stored: request
                    .documents
                    .iter()
                    .map(|d| StoredDocument {
                        document_id: d.id,
                        url: format!("s3://driver-docs/{}", d.source_key),
                    })
                    .collect(),
            })
        }
    }
}
