//! Workflow resource handlers (spec §6: `GET/POST /workflows`,
//! `GET /workflows/{id}`, `POST /workflows/{id}/run`). A workflow id on the
//! wire is `<name>@<version>`, since `(name, version)` is the natural key
//! (spec §3) and there is no surrogate id to expose instead.

use std::sync::Arc;

use axum::extract::{Path, State};
use axum::response::IntoResponse;
use axum::Json;
use bioflow_config::document::WorkflowDocument;
use bioflow_config::validate::validate;
use bioflow_core::RunOptions;
use bioflow_store::{NewWorkflow, WorkflowRecord};
use indexmap::IndexMap;
use serde::{Deserialize, Serialize};
use tracing::{info, warn};

use crate::handlers::ApiError;
use crate::state::AppState;

fn split_id(id: &str) -> Result<(&str, &str), ApiError> {
    id.split_once('@')
        .ok_or_else(|| ApiError::bad_request("workflow id must be `<name>@<version>`"))
}

#[derive(Debug, Serialize)]
pub struct WorkflowResponse {
    pub name: String,
    pub version: String,
    pub description: Option<String>,
    pub created_at: chrono::DateTime<chrono::Utc>,
}

impl From<WorkflowRecord> for WorkflowResponse {
    fn from(r: WorkflowRecord) -> Self {
        Self {
            name: r.name,
            version: r.version,
            description: r.description,
            created_at: r.created_at,
        }
    }
}

pub async fn list_workflows(State(state): State<AppState>) -> Result<impl IntoResponse, ApiError> {
    let workflows = state.store.list_workflows().await?;
    let out: Vec<WorkflowResponse> = workflows.into_iter().map(Into::into).collect();
    Ok(Json(out))
}

pub async fn get_workflow(
    State(state): State<AppState>,
    Path(id): Path<String>,
) -> Result<impl IntoResponse, ApiError> {
    let (name, version) = split_id(&id)?;
    let workflow = state
        .store
        .get_workflow(name, version)
        .await?
        .ok_or_else(|| ApiError::not_found("workflow", &id))?;
    Ok(Json(WorkflowResponse::from(workflow)))
}

#[derive(Debug, Deserialize)]
pub struct CreateWorkflowRequest {
    /// The workflow document, verbatim YAML (spec §6 document schema).
    pub document_yaml: String,
}

pub async fn create_workflow(
    State(state): State<AppState>,
    Json(request): Json<CreateWorkflowRequest>,
) -> Result<impl IntoResponse, ApiError> {
    let doc = WorkflowDocument::from_yaml(&request.document_yaml)
        .map_err(|e| ApiError::bad_request(format!("invalid workflow yaml: {e}")))?;
    let validated = validate(doc).map_err(|e| ApiError::bad_request(e.to_string()))?;
    let doc = validated.doc;

    let record = state
        .store
        .create_workflow(NewWorkflow {
            name: doc.name.clone(),
            version: doc.version.clone(),
            description: doc.description.clone(),
            document_yaml: request.document_yaml,
        })
        .await?;

    info!(name = %record.name, version = %record.version, "workflow registered");
    Ok((axum::http::StatusCode::CREATED, Json(WorkflowResponse::from(record))))
}

#[derive(Debug, Deserialize, Default)]
pub struct RunRequest {
    #[serde(default)]
    pub inputs: IndexMap<String, String>,
    #[serde(default = "default_parallel")]
    pub parallel: usize,
}

fn default_parallel() -> usize {
    4
}

#[derive(Debug, Serialize)]
pub struct RunStartedResponse {
    pub run_id: String,
}

/// Starts a run in the background and returns as soon as its `Run` row
/// exists, without waiting for the scheduler to finish (spec §6: the API
/// is for introspection/resume, not a blocking RPC over a run that may
/// take hours).
pub async fn run_workflow(
    State(state): State<AppState>,
    Path(id): Path<String>,
    Json(request): Json<RunRequest>,
) -> Result<impl IntoResponse, ApiError> {
    let (name, version) = split_id(&id)?;
    let workflow = state
        .store
        .get_workflow(name, version)
        .await?
        .ok_or_else(|| ApiError::not_found("workflow", &id))?;

    let tmp = tempfile::Builder::new()
        .suffix(".yaml")
        .tempfile()
        .map_err(|e| ApiError::internal(format!("could not stage workflow file: {e}")))?;
    std::fs::write(tmp.path(), &workflow.document_yaml)
        .map_err(|e| ApiError::internal(format!("could not stage workflow file: {e}")))?;

    let opts = RunOptions {
        inputs: request.inputs,
        parallel: request.parallel.max(1),
        ..Default::default()
    };

    let (tx, rx) = tokio::sync::oneshot::channel();
    let engine = Arc::clone(&state.engine);
    let cwd = state.base_cwd();
    let workflow_path = tmp.path().to_path_buf();

    tokio::spawn(async move {
        // Keep the temp file alive for the whole run, not just until we
        // return the run id to the caller.
        let _tmp = tmp;
        if let Err(e) = engine
            .run_with_notify(&workflow_path, &cwd, opts, Some(tx))
            .await
        {
            warn!(error = %e, "background run failed");
        }
    });

    let run_id = rx
        .await
        .map_err(|_| ApiError::internal("run did not report a run id"))?;

    Ok((axum::http::StatusCode::ACCEPTED, Json(RunStartedResponse { run_id })))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn splits_name_and_version() {
        let (name, version) = split_id("align-reads@2").unwrap();
        assert_eq!(name, "align-reads");
        assert_eq!(version, "2");
    }

    #[test]
    fn rejects_id_without_separator() {
        assert!(split_id("align-reads").is_err());
    }
}
