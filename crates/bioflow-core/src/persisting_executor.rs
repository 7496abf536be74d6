//! Decorates a [`StepExecutor`] so every transition is durably recorded
//! before and after the wrapped step runs (spec §4.7: "every update is an
//! idempotent upsert"). This is what lets `resume` recover a step that was
//! `RUNNING` when the process died — its row exists with no end time, and
//! `Scheduler::resume_states` treats anything but `Completed` as `Pending`.
//!
//! Repository errors around that bookkeeping are retried once before being
//! treated as fatal (spec §7 `RepositoryError`: "logged, retried once;
//! second failure aborts the run as ERROR"). `StepExecutor::execute` has no
//! channel back to the scheduler beyond its `StepOutcome` and the shared
//! `CancellationToken`, so a second failure cancels that token and flips
//! `aborted` — `Engine` checks it once the scheduler returns and overrides
//! the run's terminal status to `Error` regardless of what the scheduler's
//! own cancel-implies-`Failed` bookkeeping concluded.

use async_trait::async_trait;
use bioflow_dag::{StepExecutor, StepOutcome};
use bioflow_store::{StateRepository, StepExecutionUpdate};
use bioflow_types::Status;
use chrono::{DateTime, Utc};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use tokio_util::sync::CancellationToken;
use tracing::{error, warn};

pub struct PersistingExecutor {
    inner: Arc<dyn StepExecutor>,
    store: Arc<dyn StateRepository>,
    run_id: String,
    /// Set once a step's bookkeeping has failed twice in a row; `Engine`
    /// consults this after the scheduler finishes to decide whether the run
    /// terminates `Error` rather than whatever the scheduler itself concluded.
    aborted: Arc<AtomicBool>,
}

impl PersistingExecutor {
    pub fn new(
        inner: Arc<dyn StepExecutor>,
        store: Arc<dyn StateRepository>,
        run_id: String,
        aborted: Arc<AtomicBool>,
    ) -> Self {
        Self {
            inner,
            store,
            run_id,
            aborted,
        }
    }

    #[allow(clippy::too_many_arguments)]
    async fn persist_with_retry(
        &self,
        step_name: &str,
        status: Status,
        start_time: Option<DateTime<Utc>>,
        end_time: Option<DateTime<Utc>>,
        exit_code: Option<i32>,
        error_msg: Option<&str>,
        log_path: Option<&str>,
        produced_files: &[String],
        cancel: &CancellationToken,
    ) {
        for attempt in 1..=2 {
            let result = self
                .store
                .upsert_step_execution(
                    &self.run_id,
                    StepExecutionUpdate {
                        step_name,
                        status,
                        start_time,
                        end_time,
                        exit_code,
                        error: error_msg,
                        log_path,
                        produced_files,
                    },
                )
                .await;

            match result {
                Ok(()) => return,
                Err(e) if attempt == 1 => {
                    warn!(step = step_name, error = %e, "failed to persist step state, retrying once");
                }
                Err(e) => {
                    error!(
                        step = step_name,
                        error = %e,
                        "failed to persist step state twice, aborting run as ERROR"
                    );
                    self.aborted.store(true, Ordering::SeqCst);
                    cancel.cancel();
                }
            }
        }
    }
}

#[async_trait]
impl StepExecutor for PersistingExecutor {
    async fn execute(&self, step_name: &str, cancel: CancellationToken) -> StepOutcome {
        let start = Utc::now();
        self.persist_with_retry(
            step_name,
            Status::Running,
            Some(start),
            None,
            None,
            None,
            None,
            &[],
            &cancel,
        )
        .await;

        let outcome = self.inner.execute(step_name, cancel.clone()).await;

        self.persist_with_retry(
            step_name,
            outcome.status,
            Some(start),
            Some(Utc::now()),
            outcome.exit_code,
            outcome.error.as_deref(),
            outcome.log_path.as_deref(),
            &outcome.produced_files,
            &cancel,
        )
        .await;

        outcome
    }
}
