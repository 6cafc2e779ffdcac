//! Error types for the onboarding backend.

use std::time::Duration;

use uuid::Uuid;

/// Configuration-related errors.
#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    #[error("Invalid configuration value for {key}: {message}")]
    InvalidValue { key: String, message: String },
}

/// Database-related errors.
#[derive(Debug, thiserror::Error)]
pub enum DatabaseError {
    #[error("Connection pool error: {0}")]
    Pool(String),

    #[error("Query failed: {0}")]
    Query(String),

    #[error("Entity not found: {entity} with id {id}")]
    NotFound { entity: String, id: String },

    #[error("Migration failed: {0}")]
    Migration(String),

    #[error("Serialization error: {0}")]
    Serialization(String),
}

/// Failures raised by an external provider adapter.
///
/// From the workflow's point of view every variant is just a failed step;
/// the variants only exist so logs can tell a missing credential from an
/// upstream outage.
#[derive(Debug, thiserror::Error)]
pub enum ProviderError {
    #[error("Provider {provider} is not configured: missing {missing}")]
    NotConfigured { provider: String, missing: String },

    #[error("Provider {provider} request failed: {reason}")]
    Request { provider: String, reason: String },

    #[error("Provider {provider} timed out after {timeout:?}")]
    Timeout { provider: String, timeout: Duration },

    #[error("Provider {provider} rejected the request ({status}): {message}")]
    Upstream {
        provider: String,
        status: u16,
        message: String,
    },

    #[error("Invalid response from {provider}: {reason}")]
    InvalidResponse { provider: String, reason: String },
}

/// Errors raised while setting up or coordinating a workflow run.
///
/// Individual step failures never surface here; they are recorded as
/// failed step outcomes instead.
#[derive(Debug, thiserror::Error)]
pub enum WorkflowError {
    #[error("Driver {id} not found")]
    SubjectNotFound { id: Uuid },

    #[error("No {workflow} run found for driver {subject_id}")]
    RunNotFound { workflow: String, subject_id: Uuid },

    #[error("Workflow run {id} not found")]
    UnknownRun { id: Uuid },

    #[error("Workflow run {id} has not finished its first pass yet")]
    RunInProgress { id: Uuid },

    #[error("Unknown {workflow} step: {step}")]
    UnknownStep { workflow: String, step: String },

    #[error("Unknown workflow: {0}")]
    UnknownWorkflow(String),

    #[error("Storage error: {0}")]
    Storage(#[from] DatabaseError),
}

impl WorkflowError {
    /// Whether this error means "the thing asked for does not exist".
    pub fn is_not_found(&self) -> bool {
        matches!(
            self,
            Self::SubjectNotFound { .. }
                | Self::RunNotFound { .. }
                | Self::UnknownRun { .. }
                | Self::Storage(DatabaseError::NotFound { .. })
        )
    }
}

/// Why a single step failed. Always recorded as a failed outcome, never
/// propagated out of a fan-out.
#[derive(Debug, thiserror::Error)]
pub enum StepError {
    #[error(transparent)]
    Provider(#[from] ProviderError),

    #[error(transparent)]
    Directory(#[from] WorkflowError),

    #[error("Failed to encode step result: {0}")]
    Encode(#[from] serde_json::Error),

    #[error("{workflow} workflow failed: {reason}")]
    NestedWorkflowFailed { workflow: String, reason: String },
}
