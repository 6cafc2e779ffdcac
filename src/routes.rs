//! REST endpoints for driver profiles and workflow runs.
//!
//! Thin pass-through to the orchestrator. `{workflow}` is one of
//! `onboarding`, `background-check` or `insurance`.

use std::sync::Arc;

use axum::extract::{Path, State};
use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use axum::routing::{get, post, put};
use axum::{Json, Router};
use serde_json::json;
use tower_http::cors::{Any, CorsLayer};
use uuid::Uuid;

use crate::error::WorkflowError;
use crate::subject::{DriverDirectory, Subject};
use crate::workflow::{
    BackgroundCheckStep, InsuranceStep, OnboardingStep, Orchestrator, WorkflowKind,
};

/// Shared state for the API routes.
#[derive(Clone)]
pub struct ApiState {
    pub orchestrator: Arc<Orchestrator>,
    pub directory: Arc<dyn DriverDirectory>,
}

/// Maps workflow errors onto HTTP statuses.
pub struct ApiError(WorkflowError);

impl From<WorkflowError> for ApiError {
    fn from(e: WorkflowError) -> Self {
        Self(e)
    }
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        let status = match &self.0 {
            e if e.is_not_found() => StatusCode::NOT_FOUND,
            WorkflowError::UnknownStep { .. } | WorkflowError::UnknownWorkflow(_) => {
                StatusCode::BAD_REQUEST
            }
            WorkflowError::RunInProgress { .. } => StatusCode::CONFLICT,
            e => {
                tracing::error!(error = %e, "Request failed");
                StatusCode::INTERNAL_SERVER_ERROR
            }
        };
        (status, Json(json!({"error": self.0.to_string()}))).into_response()
    }
}

/// GET /health
async fn health() -> impl IntoResponse {
    Json(json!({"status": "ok"}))
}

/// PUT /api/drivers/{id}
///
/// Creates or replaces a driver profile. The body's id must match the path.
async fn put_driver(
    State(state): State<ApiState>,
    Path(id): Path<Uuid>,
    Json(subject): Json<Subject>,
) -> Result<Response, ApiError> {
    if subject.id != id {
        return Ok((
            StatusCode::BAD_REQUEST,
            Json(json!({"error": format!("body id {} does not match path id {id}", subject.id)})),
        )
            .into_response());
    }
    state.directory.upsert_subject(&subject).await?;
    Ok(StatusCode::NO_CONTENT.into_response())
}

/// POST /api/drivers/{id}/{workflow}
///
/// Runs the workflow to completion and returns the finalized run.
async fn start_run(
    State(state): State<ApiState>,
    Path((id, workflow)): Path<(Uuid, String)>,
) -> Result<Response, ApiError> {
    let orchestrator = &state.orchestrator;
    let run = match workflow.parse::<WorkflowKind>()? {
        WorkflowKind::Onboarding => Json(orchestrator.start::<OnboardingStep>(id).await?).into_response(),
        WorkflowKind::BackgroundCheck => {
            Json(orchestrator.start::<BackgroundCheckStep>(id).await?).into_response()
        }
        WorkflowKind::Insurance => Json(orchestrator.start::<InsuranceStep>(id).await?).into_response(),
    };
    Ok((StatusCode::CREATED, run).into_response())
}

/// GET /api/drivers/{id}/{workflow}
///
/// Returns the driver's latest run of the workflow, or 404 if none exists.
async fn get_status(
    State(state): State<ApiState>,
    Path((id, workflow)): Path<(Uuid, String)>,
) -> Result<Response, ApiError> {
    let orchestrator = &state.orchestrator;
    Ok(match workflow.parse::<WorkflowKind>()? {
        WorkflowKind::Onboarding => Json(orchestrator.status::<OnboardingStep>(id).await?).into_response(),
        WorkflowKind::BackgroundCheck => {
            Json(orchestrator.status::<BackgroundCheckStep>(id).await?).into_response()
        }
        WorkflowKind::Insurance => Json(orchestrator.status::<InsuranceStep>(id).await?).into_response(),
    })
}

/// POST /api/drivers/{id}/{workflow}/steps/{step}/retry
///
/// Re-runs one step of the latest run. A step that fails again is still a
/// 200; the outcome says `failed`. A run that is still in flight is a 409.
async fn retry_step(
    State(state): State<ApiState>,
    Path((id, workflow, step)): Path<(Uuid, String, String)>,
) -> Result<Response, ApiError> {
    let orchestrator = &state.orchestrator;
    let kind: WorkflowKind = workflow.parse()?;
    let outcome = match kind {
        WorkflowKind::Onboarding => orchestrator.retry::<OnboardingStep>(id, &step).await?,
        WorkflowKind::BackgroundCheck => orchestrator.retry::<BackgroundCheckStep>(id, &step).await?,
        WorkflowKind::Insurance => orchestrator.retry::<InsuranceStep>(id, &step).await?,
    };
    Ok(Json(json!({
        "driverId": id,
        "workflow": kind,
        "step": step,
        "outcome": outcome,
    }))
    .into_response())
}

/// Build the API routes.
pub fn api_routes(state: ApiState) -> Router {
    Router::new()
        .route("/health", get(health))
        .route("/api/drivers/{id}", put(put_driver))
        .route("/api/drivers/{id}/{workflow}", post(start_run).get(get_status))
        .route(
            "/api/drivers/{id}/{workflow}/steps/{step}/retry",
            post(retry_step),
        )
        .layer(
            CorsLayer::new()
                .allow_origin(Any)
                .allow_methods(Any)
                .allow_headers(Any),
        )
        .with_state(state)
}
