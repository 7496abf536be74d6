//! Row types for the state store (spec §3). Grounded on the `FromRow`
//! entity-struct shape in `fd_storage::models::runs::Run`, with status
//! columns stored as the same `SCREAMING_SNAKE_CASE` text `Status::Display`
//! produces rather than a Postgres enum type SQLite has no equivalent of.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use sqlx::FromRow;

#[derive(Debug, Clone, FromRow, Serialize, Deserialize)]
pub struct WorkflowRecord {
    pub id: i64,
    pub name: String,
    pub version: String,
    pub description: Option<String>,
    pub document_yaml: String,
    pub created_at: DateTime<Utc>,
}

#[derive(Debug, Clone, FromRow, Serialize, Deserialize)]
pub struct RunRecord {
    pub id: String,
    pub workflow_name: String,
    pub workflow_version: String,
    pub status: String,
    pub run_dir: String,
    pub created_at: DateTime<Utc>,
    pub started_at: Option<DateTime<Utc>>,
    pub completed_at: Option<DateTime<Utc>>,
    pub error: Option<String>,
}

#[derive(Debug, Clone, FromRow, Serialize, Deserialize)]
pub struct StepExecutionRecord {
    pub run_id: String,
    pub step_name: String,
    pub status: String,
    pub start_time: Option<DateTime<Utc>>,
    pub end_time: Option<DateTime<Utc>>,
    pub exit_code: Option<i32>,
    pub error: Option<String>,
    pub log_path: Option<String>,
    pub produced_files: String,
}

/// Fields needed to register a new workflow document (spec §4.1).
pub struct NewWorkflow {
    pub name: String,
    pub version: String,
    pub description: Option<String>,
    pub document_yaml: String,
}

/// Fields needed to start a new run (spec §4.2).
pub struct NewRun {
    pub id: String,
    pub workflow_name: String,
    pub workflow_version: String,
    pub run_dir: String,
}
