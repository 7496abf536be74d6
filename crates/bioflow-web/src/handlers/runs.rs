//! Run resource handlers (spec §6: `GET /runs`, `GET /runs/{id}`,
//! `GET /runs/{id}/steps`, `GET /runs/{id}/logs/{step}`,
//! `POST /runs/{id}/resume`, `POST /runs/{id}/cancel`, `DELETE /runs/{id}`).

use std::collections::HashMap;
use std::path::Path as FsPath;

use axum::extract::{Path, Query, State};
use axum::response::IntoResponse;
use axum::Json;
use bioflow_core::StepOverride;
use bioflow_store::{RunRecord, StepExecutionRecord};
use bioflow_types::Status;
use serde::Deserialize;

use crate::handlers::ApiError;
use crate::state::AppState;

#[derive(Debug, Deserialize, Default)]
pub struct ListRunsQuery {
    pub status: Option<String>,
}

pub async fn list_runs(
    State(state): State<AppState>,
    Query(query): Query<ListRunsQuery>,
) -> Result<impl IntoResponse, ApiError> {
    let status = match &query.status {
        Some(s) => Some(
            s.parse::<Status>()
                .map_err(|_| ApiError::bad_request(format!("unknown status `{s}`")))?,
        ),
        None => None,
    };
    let runs: Vec<RunRecord> = state.store.list_runs(status).await?;
    Ok(Json(runs))
}

pub async fn get_run(
    State(state): State<AppState>,
    Path(run_id): Path<String>,
) -> Result<impl IntoResponse, ApiError> {
    let run = state
        .store
        .get_run(&run_id)
        .await?
        .ok_or_else(|| ApiError::not_found("run", &run_id))?;
    Ok(Json(run))
}

pub async fn list_steps(
    State(state): State<AppState>,
    Path(run_id): Path<String>,
) -> Result<impl IntoResponse, ApiError> {
    state
        .store
        .get_run(&run_id)
        .await?
        .ok_or_else(|| ApiError::not_found("run", &run_id))?;
    let steps: Vec<StepExecutionRecord> = state.store.list_step_executions(&run_id).await?;
    Ok(Json(steps))
}

pub async fn get_log(
    State(state): State<AppState>,
    Path((run_id, step_name)): Path<(String, String)>,
) -> Result<impl IntoResponse, ApiError> {
    let run = state
        .store
        .get_run(&run_id)
        .await?
        .ok_or_else(|| ApiError::not_found("run", &run_id))?;

    let log_path = FsPath::new(&run.run_dir).join("logs").join(format!("{step_name}.log"));
    let contents = tokio::fs::read_to_string(&log_path)
        .await
        .map_err(|_| ApiError::not_found("log", &format!("{run_id}/{step_name}")))?;
    Ok(contents)
}

#[derive(Debug, Deserialize, Default)]
pub struct ResumeRequest {
    /// Per-step overrides of command/resources, keyed by step name (spec
    /// §4.3 resume).
    #[serde(default)]
    pub overrides: HashMap<String, StepOverride>,
}

pub async fn resume_run(
    State(state): State<AppState>,
    Path(run_id): Path<String>,
    Json(request): Json<ResumeRequest>,
) -> Result<impl IntoResponse, ApiError> {
    let outcome = state.engine.resume(&run_id, request.overrides).await?;
    Ok(Json(serde_json::json!({
        "run_id": outcome.run_id,
        "status": outcome.status.to_string(),
    })))
}

pub async fn cancel_run(
    State(state): State<AppState>,
    Path(run_id): Path<String>,
) -> Result<impl IntoResponse, ApiError> {
    state
        .store
        .get_run(&run_id)
        .await?
        .ok_or_else(|| ApiError::not_found("run", &run_id))?;
    let cancelled = state.engine.cancel(&run_id);
    Ok(Json(serde_json::json!({ "cancelled": cancelled })))
}

pub async fn delete_run(
    State(state): State<AppState>,
    Path(run_id): Path<String>,
) -> Result<impl IntoResponse, ApiError> {
    let run = state
        .store
        .get_run(&run_id)
        .await?
        .ok_or_else(|| ApiError::not_found("run", &run_id))?;

    let status: Status = run
        .status
        .parse()
        .map_err(|_| ApiError::internal("run has an unrecognized status"))?;
    if !status.is_terminal() {
        return Err(ApiError::conflict(format!(
            "run `{run_id}` is still {status}; cancel it before deleting"
        )));
    }

    state.store.delete_run(&run_id).await?;
    Ok(axum::http::StatusCode::NO_CONTENT)
}
