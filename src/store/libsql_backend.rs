//! libSQL backend for workflow runs and driver profiles.
//!
//! Supports local file and in-memory databases. Timestamps are written as
//! fixed-width RFC 3339 (microseconds, `Z`) so they sort lexically.

use std::collections::BTreeMap;
use std::path::Path;
use std::sync::Arc;

use async_trait::async_trait;
use chrono::{DateTime, SecondsFormat, Utc};
use libsql::{Connection, Database as LibSqlDatabase, params};
use tracing::{debug, info};
use uuid::Uuid;

use crate::error::{DatabaseError, WorkflowError};
use crate::store::migrations;
use crate::store::traits::{StoredRun, WorkflowStore};
use crate::subject::{DriverDirectory, Subject};
use crate::workflow::{OverallStatus, StepOutcome, Summary, WorkflowKind};

/// libSQL database backend.
///
/// Stores a single connection that is reused for all operations.
/// `libsql::Connection` is `Send + Sync` and safe for concurrent async use.
pub struct LibSqlBackend {
    #[allow(dead_code)]
    db: Arc<LibSqlDatabase>,
    conn: Connection,
}

impl LibSqlBackend {
    /// Open (or create) a local database file and run migrations.
    pub async fn new_local(path: &Path) -> Result<Self, DatabaseError> {
        if let Some(parent) = path.parent() {
            std::fs::create_dir_all(parent).map_err(|e| {
                DatabaseError::Pool(format!("Failed to create database directory: {e}"))
            })?;
        }

        let db = libsql::Builder::new_local(path)
            .build()
            .await
            .map_err(|e| DatabaseError::Pool(format!("Failed to open libSQL database: {e}")))?;

        let conn = db
            .connect()
            .map_err(|e| DatabaseError::Pool(format!("Failed to create connection: {e}")))?;

        let backend = Self {
            db: Arc::new(db),
            conn,
        };
        migrations::run_migrations(backend.conn()).await?;
        info!(path = %path.display(), "Database opened");
        Ok(backend)
    }

    /// Create an in-memory database (for tests).
    pub async fn new_memory() -> Result<Self, DatabaseError> {
        let db = libsql::Builder::new_local(":memory:")
            .build()
            .await
            .map_err(|e| {
                DatabaseError::Pool(format!("Failed to create in-memory database: {e}"))
            })?;

        let conn = db
            .connect()
            .map_err(|e| DatabaseError::Pool(format!("Failed to create connection: {e}")))?;

        let backend = Self {
            db: Arc::new(db),
            conn,
        };
        migrations::run_migrations(backend.conn()).await?;
        Ok(backend)
    }

    fn conn(&self) -> &Connection {
        &self.conn
    }

    async fn load_steps(&self, run_id: Uuid) -> Result<BTreeMap<String, StepOutcome>, DatabaseError> {
        let mut rows = self
            .conn()
            .query(
                "SELECT step, status, result, error FROM workflow_steps WHERE run_id = ?1",
                params![run_id.to_string()],
            )
            .await
            .map_err(|e| DatabaseError::Query(format!("load_steps: {e}")))?;

        let mut steps = BTreeMap::new();
        while let Some(row) = rows
            .next()
            .await
            .map_err(|e| DatabaseError::Query(format!("load_steps: {e}")))?
        {
            let (step, outcome) = row_to_step(&row)?;
            steps.insert(step, outcome);
        }
        Ok(steps)
    }
}

// ── Helper functions ────────────────────────────────────────────────

fn fmt_datetime(dt: &DateTime<Utc>) -> String {
    dt.to_rfc3339_opts(SecondsFormat::Micros, true)
}

fn parse_datetime(s: &str) -> Result<DateTime<Utc>, DatabaseError> {
    DateTime::parse_from_rfc3339(s)
        .map(|dt| dt.with_timezone(&Utc))
        .map_err(|e| DatabaseError::Serialization(format!("bad timestamp {s:?}: {e}")))
}

fn parse_uuid(s: &str) -> Result<Uuid, DatabaseError> {
    Uuid::parse_str(s).map_err(|e| DatabaseError::Serialization(format!("bad uuid {s:?}: {e}")))
}

fn to_json<T: serde::Serialize + ?Sized>(value: &T) -> Result<String, DatabaseError> {
    serde_json::to_string(value).map_err(|e| DatabaseError::Serialization(e.to_string()))
}

fn from_json<T: serde::de::DeserializeOwned>(s: &str) -> Result<T, DatabaseError> {
    serde_json::from_str(s).map_err(|e| DatabaseError::Serialization(e.to_string()))
}

/// Convert `Option<String>` to libsql Value.
fn opt_text_owned(s: Option<String>) -> libsql::Value {
    match s {
        Some(s) => libsql::Value::Text(s),
        None => libsql::Value::Null,
    }
}

const RUN_COLUMNS: &str =
    "id, kind, subject_id, started_at, completed_at, overall_status, summary, recommendations";

/// Parse a `workflow_runs` row (selected with `RUN_COLUMNS`) without its steps.
fn row_to_run(row: &libsql::Row) -> Result<StoredRun, DatabaseError> {
    let get = |i: i32| {
        row.get::<String>(i)
            .map_err(|e| DatabaseError::Query(format!("row_to_run column {i}: {e}")))
    };

    let kind: WorkflowKind = get(1)?
        .parse()
        .map_err(|e: WorkflowError| DatabaseError::Serialization(e.to_string()))?;
    let overall_status: OverallStatus = get(5)?.parse().map_err(DatabaseError::Serialization)?;

    Ok(StoredRun {
        id: parse_uuid(&get(0)?)?,
        kind,
        subject_id: parse_uuid(&get(2)?)?,
        started_at: parse_datetime(&get(3)?)?,
        completed_at: row
            .get::<String>(4)
            .ok()
            .map(|s| parse_datetime(&s))
            .transpose()?,
        overall_status,
        summary: from_json(&get(6)?)?,
        recommendations: from_json(&get(7)?)?,
        steps: BTreeMap::new(),
    })
}

fn row_to_step(row: &libsql::Row) -> Result<(String, StepOutcome), DatabaseError> {
    let step: String = row
        .get(0)
        .map_err(|e| DatabaseError::Query(format!("row_to_step: {e}")))?;
    let status: String = row
        .get(1)
        .map_err(|e| DatabaseError::Query(format!("row_to_step: {e}")))?;

    let outcome = match status.as_str() {
        "completed" => StepOutcome::Completed {
            result: row
                .get::<String>(2)
                .ok()
                .map(|s| from_json(&s))
                .transpose()?
                .unwrap_or(serde_json::Value::Null),
        },
        "failed" => StepOutcome::Failed {
            error: row.get::<String>(3).ok().unwrap_or_default(),
        },
        other => {
            return Err(DatabaseError::Serialization(format!(
                "step {step:?} has unknown status {other:?}"
            )));
        }
    };
    Ok((step, outcome))
}

// ── Workflow runs ───────────────────────────────────────────────────

#[async_trait]
impl WorkflowStore for LibSqlBackend {
    async fn create_run(
        &self,
        kind: WorkflowKind,
        subject_id: Uuid,
        started_at: DateTime<Utc>,
    ) -> Result<Uuid, DatabaseError> {
        let id = Uuid::new_v4();
        self.conn()
            .execute(
                "INSERT INTO workflow_runs (id, kind, subject_id, started_at, overall_status, summary, recommendations) VALUES (?1, ?2, ?3, ?4, 'pending', '{}', '[]')",
                params![
                    id.to_string(),
                    kind.as_str(),
                    subject_id.to_string(),
                    fmt_datetime(&started_at),
                ],
            )
            .await
            .map_err(|e| DatabaseError::Query(format!("create_run: {e}")))?;

        debug!(run_id = %id, workflow = %kind, %subject_id, "Workflow run created");
        Ok(id)
    }

    async fn record_step(
        &self,
        run_id: Uuid,
        step: &str,
        outcome: &StepOutcome,
    ) -> Result<(), DatabaseError> {
        let result = outcome.result().map(to_json).transpose()?;
        let error = outcome.error().map(str::to_string);

        // The WHERE clause doubles as the existence check for the run.
        let affected = self
            .conn()
            .execute(
                "INSERT INTO workflow_steps (run_id, step, status, result, error, updated_at)
                 SELECT ?1, ?2, ?3, ?4, ?5, ?6
                 WHERE EXISTS (SELECT 1 FROM workflow_runs WHERE id = ?1)
                 ON CONFLICT (run_id, step) DO UPDATE SET
                    status = excluded.status,
                    result = excluded.result,
                    error = excluded.error,
                    updated_at = excluded.updated_at",
                params![
                    run_id.to_string(),
                    step,
                    outcome.status_str(),
                    opt_text_owned(result),
                    opt_text_owned(error),
                    fmt_datetime(&Utc::now()),
                ],
            )
            .await
            .map_err(|e| DatabaseError::Query(format!("record_step: {e}")))?;

        if affected == 0 {
            return Err(DatabaseError::NotFound {
                entity: "workflow_run".into(),
                id: run_id.to_string(),
            });
        }
        debug!(%run_id, step, status = outcome.status_str(), "Step outcome recorded");
        Ok(())
    }

    async fn finalize_run(
        &self,
        run_id: Uuid,
        status: OverallStatus,
        summary: &Summary,
        recommendations: &[String],
        completed_at: DateTime<Utc>,
    ) -> Result<(), DatabaseError> {
        let affected = self
            .conn()
            .execute(
                "UPDATE workflow_runs
                 SET overall_status = ?1, summary = ?2, recommendations = ?3,
                     completed_at = COALESCE(completed_at, ?4)
                 WHERE id = ?5",
                params![
                    status.as_str(),
                    to_json(summary)?,
                    to_json(recommendations)?,
                    fmt_datetime(&completed_at),
                    run_id.to_string(),
                ],
            )
            .await
            .map_err(|e| DatabaseError::Query(format!("finalize_run: {e}")))?;

        if affected == 0 {
            return Err(DatabaseError::NotFound {
                entity: "workflow_run".into(),
                id: run_id.to_string(),
            });
        }
        debug!(%run_id, %status, "Workflow run finalized");
        Ok(())
    }

    async fn get_run(&self, run_id: Uuid) -> Result<StoredRun, DatabaseError> {
        let mut rows = self
            .conn()
            .query(
                &format!("SELECT {RUN_COLUMNS} FROM workflow_runs WHERE id = ?1"),
                params![run_id.to_string()],
            )
            .await
            .map_err(|e| DatabaseError::Query(format!("get_run: {e}")))?;

        let row = rows
            .next()
            .await
            .map_err(|e| DatabaseError::Query(format!("get_run: {e}")))?
            .ok_or_else(|| DatabaseError::NotFound {
                entity: "workflow_run".into(),
                id: run_id.to_string(),
            })?;

        let mut run = row_to_run(&row)?;
        run.steps = self.load_steps(run_id).await?;
        Ok(run)
    }

    async fn latest_run(
        &self,
        kind: WorkflowKind,
        subject_id: Uuid,
    ) -> Result<Option<StoredRun>, DatabaseError> {
        let mut rows = self
            .conn()
            .query(
                &format!(
                    "SELECT {RUN_COLUMNS} FROM workflow_runs
                     WHERE kind = ?1 AND subject_id = ?2
                     ORDER BY started_at DESC, rowid DESC LIMIT 1"
                ),
                params![kind.as_str(), subject_id.to_string()],
            )
            .await
            .map_err(|e| DatabaseError::Query(format!("latest_run: {e}")))?;

        match rows
            .next()
            .await
            .map_err(|e| DatabaseError::Query(format!("latest_run: {e}")))?
        {
            Some(row) => {
                let mut run = row_to_run(&row)?;
                run.steps = self.load_steps(run.id).await?;
                Ok(Some(run))
            }
            None => Ok(None),
        }
    }
}

// ── Driver profiles ─────────────────────────────────────────────────

#[async_trait]
impl DriverDirectory for LibSqlBackend {
    async fn get_subject(&self, id: Uuid) -> Result<Subject, WorkflowError> {
        let mut rows = self
            .conn()
            .query(
                "SELECT profile FROM drivers WHERE id = ?1",
                params![id.to_string()],
            )
            .await
            .map_err(|e| DatabaseError::Query(format!("get_subject: {e}")))?;

        let row = rows
            .next()
            .await
            .map_err(|e| DatabaseError::Query(format!("get_subject: {e}")))?
            .ok_or(WorkflowError::SubjectNotFound { id })?;

        let profile: String = row
            .get(0)
            .map_err(|e| DatabaseError::Query(format!("get_subject: {e}")))?;
        Ok(from_json(&profile)?)
    }

    async fn upsert_subject(&self, subject: &Subject) -> Result<(), WorkflowError> {
        let now = fmt_datetime(&Utc::now());
        self.conn()
            .execute(
                "INSERT INTO drivers (id, profile, created_at, updated_at) VALUES (?1, ?2, ?3, ?3)
                 ON CONFLICT (id) DO UPDATE SET profile = excluded.profile, updated_at = excluded.updated_at",
                params![subject.id.to_string(), to_json(subject)?, now],
            )
            .await
            .map_err(|e| DatabaseError::Query(format!("upsert_subject: {e}")))?;

        debug!(subject_id = %subject.id, "Driver profile saved");
        Ok(())
    }

    async fn record_onboarding_submission(
        &self,
        id: Uuid,
        submitted_at: DateTime<Utc>,
    ) -> Result<(), WorkflowError> {
        let at = fmt_datetime(&submitted_at);
        let affected = self
            .conn()
            .execute(
                "UPDATE drivers SET onboarding_status = 'in_review', submitted_at = ?1, updated_at = ?1 WHERE id = ?2",
                params![at, id.to_string()],
            )
            .await
            .map_err(|e| DatabaseError::Query(format!("record_onboarding_submission: {e}")))?;

        if affected == 0 {
            return Err(WorkflowError::SubjectNotFound { id });
        }
        info!(subject_id = %id, "Driver submitted for onboarding review");
        Ok(())
    }
}
