//! Document storage provider: moves uploads into the permanent archive.

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::config::ProviderConfig;
use crate::error::ProviderError;
use crate::providers::http::HttpProvider;
use crate::subject::{DocumentRef, Subject};

#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ArchiveRequest {
    pub driver_id: Uuid,
    pub documents: Vec<DocumentRef>,
}

impl ArchiveRequest {
    pub fn from_subject(subject: &Subject) -> Self {
        Self {
            driver_id: subject.id,
            documents: subject.documents.clone(),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct StoredDocument {
    pub document_id: Uuid,
    pub url: String,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ArchiveReceipt {
    pub archive_id: String,
    #[serde(default)]
    pub stored: Vec<StoredDocument>,
}

#[async_trait]
pub trait StorageProvider: Send + Sync {
    async fn archive_documents(&self, request: &ArchiveRequest)
    -> Result<ArchiveReceipt, ProviderError>;
}

/// HTTP client for the document storage API.
pub struct StorageClient {
    http: HttpProvider,
}

impl StorageClient {
    pub fn new(config: ProviderConfig) -> Result<Self, ProviderError> {
        Ok(Self {
            http: HttpProvider::new("storage", config)?,
        })
    }
}

#[async_trait]
impl StorageProvider for StorageClient {
    async fn archive_documents(
        &self,
        request: &ArchiveRequest,
    ) -> Result<ArchiveReceipt, ProviderError> {
        let receipt: ArchiveReceipt = self.http.post_json("/v1/archives", request).await?;
        if receipt.stored.len() != request.documents.len() {
            return Err(ProviderError::InvalidResponse {
                provider: self.http.name().to_string(),
                reason: format!(
                    "archived {} of {} documents",
                    receipt.stored.len(),
                    request.documents.len()
                ),
            });
        }
        Ok(receipt)
    }
}
