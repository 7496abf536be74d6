//! In-memory [`StateRepository`] fake for unit tests and `--no-persist` runs
//! (spec §7 Non-goals: persistence is required, but a durable backing store
//! is not, so an in-process fake is a legitimate mode, not just a test
//! double).

use std::collections::HashMap;
use std::sync::Mutex;

use async_trait::async_trait;
use bioflow_types::Status;
use chrono::Utc;

use crate::models::{NewRun, NewWorkflow, RunRecord, StepExecutionRecord, WorkflowRecord};
use crate::repository::{StateRepository, StepExecutionUpdate, StoreError};

#[derive(Default)]
pub struct MemoryStateRepository {
    workflows: Mutex<Vec<WorkflowRecord>>,
    runs: Mutex<HashMap<String, RunRecord>>,
    steps: Mutex<HashMap<(String, String), StepExecutionRecord>>,
}

impl MemoryStateRepository {
    pub fn new() -> Self {
        Self::default()
    }
}

#[async_trait]
impl StateRepository for MemoryStateRepository {
    async fn create_workflow(&self, new: NewWorkflow) -> Result<WorkflowRecord, StoreError> {
        let mut workflows = self.workflows.lock().unwrap();
        let rec = WorkflowRecord {
            id: workflows.len() as i64 + 1,
            name: new.name,
            version: new.version,
            description: new.description,
            document_yaml: new.document_yaml,
            created_at: Utc::now(),
        };
        workflows.push(rec.clone());
        Ok(rec)
    }

    async fn get_workflow(
        &self,
        name: &str,
        version: &str,
    ) -> Result<Option<WorkflowRecord>, StoreError> {
        Ok(self
            .workflows
            .lock()
            .unwrap()
            .iter()
            .find(|w| w.name == name && w.version == version)
            .cloned())
    }

    async fn list_workflows(&self) -> Result<Vec<WorkflowRecord>, StoreError> {
        Ok(self.workflows.lock().unwrap().clone())
    }

    async fn create_run(&self, new: NewRun) -> Result<RunRecord, StoreError> {
        let rec = RunRecord {
            id: new.id.clone(),
            workflow_name: new.workflow_name,
            workflow_version: new.workflow_version,
            status: Status::Pending.to_string(),
            run_dir: new.run_dir,
            created_at: Utc::now(),
            started_at: None,
            completed_at: None,
            error: None,
        };
        self.runs.lock().unwrap().insert(new.id, rec.clone());
        Ok(rec)
    }

    async fn get_run(&self, id: &str) -> Result<Option<RunRecord>, StoreError> {
        Ok(self.runs.lock().unwrap().get(id).cloned())
    }

    async fn list_runs(&self, status: Option<Status>) -> Result<Vec<RunRecord>, StoreError> {
        let runs = self.runs.lock().unwrap();
        let mut out: Vec<RunRecord> = match status {
            Some(s) => runs
                .values()
                .filter(|r| r.status == s.to_string())
                .cloned()
                .collect(),
            None => runs.values().cloned().collect(),
        };
        out.sort_by(|a, b| b.created_at.cmp(&a.created_at));
        Ok(out)
    }

    async fn mark_run_started(&self, id: &str) -> Result<Option<RunRecord>, StoreError> {
        let mut runs = self.runs.lock().unwrap();
        if let Some(run) = runs.get_mut(id) {
            run.status = Status::Running.to_string();
            run.started_at = Some(Utc::now());
            Ok(Some(run.clone()))
        } else {
            Ok(None)
        }
    }

    async fn mark_run_terminal(
        &self,
        id: &str,
        status: Status,
        error: Option<&str>,
    ) -> Result<Option<RunRecord>, StoreError> {
        let mut runs = self.runs.lock().unwrap();
        if let Some(run) = runs.get_mut(id) {
            run.status = status.to_string();
            run.completed_at = Some(Utc::now());
            run.error = error.map(|e| e.to_string());
            Ok(Some(run.clone()))
        } else {
            Ok(None)
        }
    }

    async fn delete_run(&self, id: &str) -> Result<(), StoreError> {
        self.runs.lock().unwrap().remove(id);
        self.steps.lock().unwrap().retain(|(rid, _), _| rid != id);
        Ok(())
    }

    async fn upsert_step_execution(
        &self,
        run_id: &str,
        update: StepExecutionUpdate<'_>,
    ) -> Result<(), StoreError> {
        let produced_files = serde_json::to_string(update.produced_files)
            .unwrap_or_else(|_| "[]".to_string());
        let rec = StepExecutionRecord {
            run_id: run_id.to_string(),
            step_name: update.step_name.to_string(),
            status: update.status.to_string(),
            start_time: update.start_time,
            end_time: update.end_time,
            exit_code: update.exit_code,
            error: update.error.map(|e| e.to_string()),
            log_path: update.log_path.map(|p| p.to_string()),
            produced_files,
        };
        self.steps
            .lock()
            .unwrap()
            .insert((run_id.to_string(), update.step_name.to_string()), rec);
        Ok(())
    }

    async fn list_step_executions(
        &self,
        run_id: &str,
    ) -> Result<Vec<StepExecutionRecord>, StoreError> {
        Ok(self
            .steps
            .lock()
            .unwrap()
            .iter()
            .filter(|((rid, _), _)| rid == run_id)
            .map(|(_, rec)| rec.clone())
            .collect())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn list_runs_filters_by_status() {
        let repo = MemoryStateRepository::new();
        repo.create_run(NewRun {
            id: "r1".into(),
            workflow_name: "demo".into(),
            workflow_version: "1".into(),
            run_dir: "/tmp/r1".into(),
        })
        .await
        .unwrap();
        repo.mark_run_terminal("r1", Status::Completed, None)
            .await
            .unwrap();
        repo.create_run(NewRun {
            id: "r2".into(),
            workflow_name: "demo".into(),
            workflow_version: "1".into(),
            run_dir: "/tmp/r2".into(),
        })
        .await
        .unwrap();

        let completed = repo.list_runs(Some(Status::Completed)).await.unwrap();
        assert_eq!(completed.len(), 1);
        assert_eq!(completed[0].id, "r1");

        let pending = repo.list_runs(Some(Status::Pending)).await.unwrap();
        assert_eq!(pending.len(), 1);
        assert_eq!(pending[0].id, "r2");
    }
}
