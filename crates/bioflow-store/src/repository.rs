//! Storage-backend-agnostic persistence seam (spec §4.5, §6). Mirrors how
//! `fd_storage::repos::RunsRepo` wraps a pool behind narrow async methods,
//! generalized into a trait so `bioflow-core` can run against either the
//! real SQLite store or an in-memory fake in tests.

use async_trait::async_trait;
use bioflow_types::Status;

use crate::models::{NewRun, NewWorkflow, RunRecord, StepExecutionRecord, WorkflowRecord};

#[derive(Debug, thiserror::Error)]
pub enum StoreError {
    #[error("database error: {0}")]
    Database(#[from] sqlx::Error),
    #[error("run not found: {0}")]
    RunNotFound(String),
    #[error("workflow not found: {name} v{version}")]
    WorkflowNotFound { name: String, version: String },
}

/// A single step's terminal or in-flight record, as persisted (spec §3
/// StepExecution).
pub struct StepExecutionUpdate<'a> {
    pub step_name: &'a str,
    pub status: Status,
    pub start_time: Option<chrono::DateTime<chrono::Utc>>,
    pub end_time: Option<chrono::DateTime<chrono::Utc>>,
    pub exit_code: Option<i32>,
    pub error: Option<&'a str>,
    pub log_path: Option<&'a str>,
    pub produced_files: &'a [String],
}

#[async_trait]
pub trait StateRepository: Send + Sync {
    async fn create_workflow(&self, new: NewWorkflow) -> Result<WorkflowRecord, StoreError>;
    async fn get_workflow(
        &self,
        name: &str,
        version: &str,
    ) -> Result<Option<WorkflowRecord>, StoreError>;
    async fn list_workflows(&self) -> Result<Vec<WorkflowRecord>, StoreError>;

    async fn create_run(&self, new: NewRun) -> Result<RunRecord, StoreError>;
    async fn get_run(&self, id: &str) -> Result<Option<RunRecord>, StoreError>;
    async fn list_runs(&self, status: Option<Status>) -> Result<Vec<RunRecord>, StoreError>;
    async fn mark_run_started(&self, id: &str) -> Result<Option<RunRecord>, StoreError>;
    async fn mark_run_terminal(
        &self,
        id: &str,
        status: Status,
        error: Option<&str>,
    ) -> Result<Option<RunRecord>, StoreError>;
    async fn delete_run(&self, id: &str) -> Result<(), StoreError>;

    async fn upsert_step_execution(
        &self,
        run_id: &str,
        update: StepExecutionUpdate<'_>,
    ) -> Result<(), StoreError>;
    async fn list_step_executions(
        &self,
        run_id: &str,
    ) -> Result<Vec<StepExecutionRecord>, StoreError>;
}
