//! Per-step runtime record the scheduler owns while a run is in flight
//! (spec §3 StepExecution, "owned by the scheduler during execution,
//! read-only afterwards").

use bioflow_types::Status;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct StepExecState {
    pub status: Status,
    pub start_time: Option<DateTime<Utc>>,
    pub end_time: Option<DateTime<Utc>>,
    pub exit_code: Option<i32>,
    pub error: Option<String>,
    pub log_path: Option<String>,
    pub produced_files: Vec<String>,
}

impl StepExecState {
    pub fn pending() -> Self {
        Self {
            status: Status::Pending,
            start_time: None,
            end_time: None,
            exit_code: None,
            error: None,
            log_path: None,
            produced_files: Vec::new(),
        }
    }
}

impl Default for StepExecState {
    fn default() -> Self {
        Self::pending()
    }
}
