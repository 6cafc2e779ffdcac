//! Persistence layer: libSQL-backed storage for workflow runs and drivers.

pub mod libsql_backend;
pub mod migrations;
pub mod traits;

pub use libsql_backend::LibSqlBackend;
pub use traits::{StoredRun, WorkflowStore};
