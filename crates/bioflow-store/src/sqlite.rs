//! SQLite-backed [`StateRepository`] (spec §4.5). Query shapes are adapted
//! from `fd_storage::repos::runs::RunsRepo` (create/get/update_status/list)
//! with Postgres `$n` placeholders swapped for SQLite `?` and the Postgres
//! enum column replaced by plain text.

use async_trait::async_trait;
use bioflow_types::Status;
use chrono::Utc;
use tracing::instrument;

use crate::models::{NewRun, NewWorkflow, RunRecord, StepExecutionRecord, WorkflowRecord};
use crate::pool::DbPool;
use crate::repository::{StateRepository, StepExecutionUpdate, StoreError};

pub struct SqliteStateRepository {
    pool: DbPool,
}

impl SqliteStateRepository {
    pub fn new(pool: DbPool) -> Self {
        Self { pool }
    }
}

#[async_trait]
impl StateRepository for SqliteStateRepository {
    #[instrument(skip(self, new), fields(workflow = %new.name))]
    async fn create_workflow(&self, new: NewWorkflow) -> Result<WorkflowRecord, StoreError> {
        let rec = sqlx::query_as::<_, WorkflowRecord>(
            r#"
            INSERT INTO workflows (name, version, description, document_yaml, created_at)
            VALUES (?, ?, ?, ?, ?)
            RETURNING id, name, version, description, document_yaml, created_at
            "#,
        )
        .bind(&new.name)
        .bind(&new.version)
        .bind(&new.description)
        .bind(&new.document_yaml)
        .bind(Utc::now())
        .fetch_one(&self.pool)
        .await?;
        Ok(rec)
    }

    async fn get_workflow(
        &self,
        name: &str,
        version: &str,
    ) -> Result<Option<WorkflowRecord>, StoreError> {
        let rec = sqlx::query_as::<_, WorkflowRecord>(
            "SELECT id, name, version, description, document_yaml, created_at
             FROM workflows WHERE name = ? AND version = ?",
        )
        .bind(name)
        .bind(version)
        .fetch_optional(&self.pool)
        .await?;
        Ok(rec)
    }

    async fn list_workflows(&self) -> Result<Vec<WorkflowRecord>, StoreError> {
        let recs = sqlx::query_as::<_, WorkflowRecord>(
            "SELECT id, name, version, description, document_yaml, created_at
             FROM workflows ORDER BY created_at DESC",
        )
        .fetch_all(&self.pool)
        .await?;
        Ok(recs)
    }

    #[instrument(skip(self, new), fields(run_id = %new.id))]
    async fn create_run(&self, new: NewRun) -> Result<RunRecord, StoreError> {
        let rec = sqlx::query_as::<_, RunRecord>(
            r#"
            INSERT INTO runs (id, workflow_name, workflow_version, status, run_dir, created_at)
            VALUES (?, ?, ?, ?, ?, ?)
            RETURNING id, workflow_name, workflow_version, status, run_dir,
                      created_at, started_at, completed_at, error
            "#,
        )
        .bind(&new.id)
        .bind(&new.workflow_name)
        .bind(&new.workflow_version)
        .bind(Status::Pending.to_string())
        .bind(&new.run_dir)
        .bind(Utc::now())
        .fetch_one(&self.pool)
        .await?;
        Ok(rec)
    }

    async fn get_run(&self, id: &str) -> Result<Option<RunRecord>, StoreError> {
        let rec = sqlx::query_as::<_, RunRecord>(
            "SELECT id, workflow_name, workflow_version, status, run_dir,
                    created_at, started_at, completed_at, error
             FROM runs WHERE id = ?",
        )
        .bind(id)
        .fetch_optional(&self.pool)
        .await?;
        Ok(rec)
    }

    async fn list_runs(&self, status: Option<Status>) -> Result<Vec<RunRecord>, StoreError> {
        let recs = match status {
            Some(s) => {
                sqlx::query_as::<_, RunRecord>(
                    "SELECT id, workflow_name, workflow_version, status, run_dir,
                            created_at, started_at, completed_at, error
                     FROM runs WHERE status = ? ORDER BY created_at DESC",
                )
                .bind(s.to_string())
                .fetch_all(&self.pool)
                .await?
            }
            None => {
                sqlx::query_as::<_, RunRecord>(
                    "SELECT id, workflow_name, workflow_version, status, run_dir,
                            created_at, started_at, completed_at, error
                     FROM runs ORDER BY created_at DESC",
                )
                .fetch_all(&self.pool)
                .await?
            }
        };
        Ok(recs)
    }

    async fn mark_run_started(&self, id: &str) -> Result<Option<RunRecord>, StoreError> {
        let rec = sqlx::query_as::<_, RunRecord>(
            r#"
            UPDATE runs SET status = ?, started_at = ?
            WHERE id = ?
            RETURNING id, workflow_name, workflow_version, status, run_dir,
                      created_at, started_at, completed_at, error
            "#,
        )
        .bind(Status::Running.to_string())
        .bind(Utc::now())
        .bind(id)
        .fetch_optional(&self.pool)
        .await?;
        Ok(rec)
    }

    async fn mark_run_terminal(
        &self,
        id: &str,
        status: Status,
        error: Option<&str>,
    ) -> Result<Option<RunRecord>, StoreError> {
        let rec = sqlx::query_as::<_, RunRecord>(
            r#"
            UPDATE runs SET status = ?, completed_at = ?, error = ?
            WHERE id = ?
            RETURNING id, workflow_name, workflow_version, status, run_dir,
                      created_at, started_at, completed_at, error
            "#,
        )
        .bind(status.to_string())
        .bind(Utc::now())
        .bind(error)
        .bind(id)
        .fetch_optional(&self.pool)
        .await?;
        Ok(rec)
    }

    async fn delete_run(&self, id: &str) -> Result<(), StoreError> {
        sqlx::query("DELETE FROM step_executions WHERE run_id = ?")
            .bind(id)
            .execute(&self.pool)
            .await?;
        sqlx::query("DELETE FROM runs WHERE id = ?")
            .bind(id)
            .execute(&self.pool)
            .await?;
        Ok(())
    }

    async fn upsert_step_execution(
        &self,
        run_id: &str,
        update: StepExecutionUpdate<'_>,
    ) -> Result<(), StoreError> {
        let produced_files = serde_json::to_string(update.produced_files)
            .unwrap_or_else(|_| "[]".to_string());
        sqlx::query(
            r#"
            INSERT INTO step_executions
                (run_id, step_name, status, start_time, end_time, exit_code, error, log_path, produced_files)
            VALUES (?, ?, ?, ?, ?, ?, ?, ?, ?)
            ON CONFLICT (run_id, step_name) DO UPDATE SET
                status = excluded.status,
                start_time = excluded.start_time,
                end_time = excluded.end_time,
                exit_code = excluded.exit_code,
                error = excluded.error,
                log_path = excluded.log_path,
                produced_files = excluded.produced_files
            "#,
        )
        .bind(run_id)
        .bind(update.step_name)
        .bind(update.status.to_string())
        .bind(update.start_time)
        .bind(update.end_time)
        .bind(update.exit_code)
        .bind(update.error)
        .bind(update.log_path)
        .bind(produced_files)
        .execute(&self.pool)
        .await?;
        Ok(())
    }

    async fn list_step_executions(
        &self,
        run_id: &str,
    ) -> Result<Vec<StepExecutionRecord>, StoreError> {
        let recs = sqlx::query_as::<_, StepExecutionRecord>(
            "SELECT run_id, step_name, status, start_time, end_time, exit_code,
                    error, log_path, produced_files
             FROM step_executions WHERE run_id = ?",
        )
        .bind(run_id)
        .fetch_all(&self.pool)
        .await?;
        Ok(recs)
    }
}
