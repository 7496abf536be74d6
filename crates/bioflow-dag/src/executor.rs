//! The seam between the scheduler and the actual step runner (spec §4.4).
//! `bioflow-dag` knows nothing about containers, variable substitution, or
//! the run directory — it only knows how to ask a `StepExecutor` to run a
//! named step and wait for a terminal outcome, mirroring how
//! `vwf_core::dag::scheduler` is decoupled from `Runtime`.

use async_trait::async_trait;
use bioflow_types::Status;
use tokio_util::sync::CancellationToken;

/// Outcome of running a single step to completion (spec §4.3 state machine
/// terminal states, minus `Skipped` which the scheduler assigns itself).
#[derive(Debug, Clone, Default)]
pub struct StepOutcome {
    pub status: Status,
    pub exit_code: Option<i32>,
    pub error: Option<String>,
    pub log_path: Option<String>,
    pub produced_files: Vec<String>,
}

impl StepOutcome {
    pub fn completed(exit_code: i32) -> Self {
        Self {
            status: Status::Completed,
            exit_code: Some(exit_code),
            ..Default::default()
        }
    }

    pub fn failed(exit_code: i32) -> Self {
        Self {
            status: Status::Failed,
            exit_code: Some(exit_code),
            ..Default::default()
        }
    }

    pub fn error(message: impl Into<String>) -> Self {
        Self {
            status: Status::Error,
            error: Some(message.into()),
            ..Default::default()
        }
    }

    pub fn terminated_time_limit() -> Self {
        Self {
            status: Status::TerminatedTimeLimit,
            error: Some("step exceeded its time_limit".to_string()),
            ..Default::default()
        }
    }

    pub fn with_log_path(mut self, log_path: impl Into<String>) -> Self {
        self.log_path = Some(log_path.into());
        self
    }

    pub fn with_produced_files(mut self, produced_files: Vec<String>) -> Self {
        self.produced_files = produced_files;
        self
    }
}

/// Executes exactly one step and returns its terminal outcome (spec §4.4).
/// Implemented by `bioflow-core::StepRunner`; a `CancellationToken` is
/// handed in so cancel (spec §4.3) can interrupt an in-flight step at its
/// suspension points.
#[async_trait]
pub trait StepExecutor: Send + Sync {
    async fn execute(&self, step_name: &str, cancel: CancellationToken) -> StepOutcome;
}
