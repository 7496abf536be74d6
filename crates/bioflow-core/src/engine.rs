//! Engine façade (spec §4.8): the only entry point the CLI and HTTP API
//! invoke. Orchestrates loader → run-directory → scheduler → repository and
//! owns the lifetime of a scheduler instance per run. Grounded on
//! `vwf_core::engine::{Runner, run_workflow}`'s shape (a façade function
//! that loads config, runs steps, and produces a report), generalized from
//! sequential execution to the DAG scheduler and given an explicit context
//! (store + driver) instead of a single `Runtime` (spec §9: "no process-wide
//! singletons are required").

use std::collections::HashMap;
use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;

use bioflow_config::document::WorkflowDocument;
use bioflow_config::validate::{validate, InvalidWorkflow};
use bioflow_dag::{Scheduler, StepExecState};
use bioflow_runtime::ContainerDriver;
use bioflow_store::{NewRun, NewWorkflow, RunRecord, StateRepository, StepExecutionRecord, StoreError};
use bioflow_types::{RunId, Status};
use chrono::Utc;
use indexmap::IndexMap;
use serde::Deserialize;
use thiserror::Error;
use tokio_util::sync::CancellationToken;
use tracing::{info, instrument};

use crate::persisting_executor::PersistingExecutor;
use crate::run_dir::{RunDirError, RunDirectory};
use crate::step_runner::{StepContext, StepRunner};

#[derive(Debug, Error)]
pub enum EngineError {
    #[error("invalid workflow: {0}")]
    InvalidWorkflow(#[from] InvalidWorkflow),
    #[error("could not read workflow file: {0}")]
    Io(#[from] std::io::Error),
    #[error("could not parse workflow document: {0}")]
    Parse(#[from] serde_yaml::Error),
    #[error("run directory error: {0}")]
    RunDir(#[from] RunDirError),
    #[error("store error: {0}")]
    Store(#[from] StoreError),
    #[error("run `{0}` not found")]
    RunNotFound(String),
}

/// Whether (and with what default) steps without an explicit `time_limit`
/// are bounded (spec §4.4 step 2, CLI `--default-time-limit`/`--disable-time-limits`).
#[derive(Debug, Clone, Copy)]
pub enum TimeLimitPolicy {
    Default(Duration),
    Disabled,
}

impl Default for TimeLimitPolicy {
    fn default() -> Self {
        TimeLimitPolicy::Default(Duration::from_secs(3600))
    }
}

#[derive(Debug, Clone, Default)]
pub struct RunOptions {
    /// `--input k=v` overrides/extensions of the workflow's declared inputs.
    pub inputs: IndexMap<String, String>,
    pub parallel: usize,
    pub time_limit_policy: TimeLimitPolicy,
    /// `--output-dir`: overrides the engine's configured run base directory.
    pub output_dir: Option<PathBuf>,
}

/// Per-step override applied only to the new attempt's command/resources;
/// the workflow definition itself is not mutated (spec §4.3 resume).
#[derive(Debug, Clone, Default, Deserialize)]
pub struct StepOverride {
    pub command: Option<String>,
    pub cpu: Option<i64>,
    pub memory: Option<String>,
    pub time_limit: Option<String>,
}

#[derive(Debug, Clone)]
pub struct EngineRunOutcome {
    pub run_id: String,
    pub status: Status,
    pub steps: HashMap<String, StepExecState>,
}

/// A run's record plus its per-step execution history (spec §6 `status`:
/// "run and per-step state").
#[derive(Debug, Clone, serde::Serialize)]
pub struct RunStatus {
    pub run: RunRecord,
    pub steps: Vec<StepExecutionRecord>,
}

/// Orchestrates the loader, run directory manager, DAG scheduler, and state
/// repository. One `Engine` instance serves every run in a process; each
/// `run`/`resume` call spins up its own `Scheduler`.
pub struct Engine {
    base_dir: PathBuf,
    store: Arc<dyn StateRepository>,
    driver: Arc<dyn ContainerDriver>,
    active: Mutex<HashMap<String, CancellationToken>>,
}

impl Engine {
    pub fn new(base_dir: PathBuf, store: Arc<dyn StateRepository>, driver: Arc<dyn ContainerDriver>) -> Self {
        Self {
            base_dir,
            store,
            driver,
            active: Mutex::new(HashMap::new()),
        }
    }

    #[instrument(skip(self, opts))]
    pub async fn run(
        &self,
        workflow_path: &Path,
        cwd: &Path,
        opts: RunOptions,
    ) -> Result<EngineRunOutcome, EngineError> {
        self.run_with_notify(workflow_path, cwd, opts, None).await
    }

    /// Same as [`Engine::run`], but sends the freshly-minted run id over
    /// `notify` as soon as the run row exists — before the scheduler starts
    /// dispatching. Lets a caller that spawns the run in the background
    /// (the HTTP API) report the run id without waiting for completion.
    #[instrument(skip(self, opts, notify))]
    pub async fn run_with_notify(
        &self,
        workflow_path: &Path,
        cwd: &Path,
        opts: RunOptions,
        notify: Option<tokio::sync::oneshot::Sender<String>>,
    ) -> Result<EngineRunOutcome, EngineError> {
        let yaml = std::fs::read_to_string(workflow_path)?;
        let doc = WorkflowDocument::from_yaml(&yaml)?;
        let validated = validate(doc)?;
        let doc = validated.doc;

        if self.store.get_workflow(&doc.name, &doc.version).await?.is_none() {
            self.store
                .create_workflow(NewWorkflow {
                    name: doc.name.clone(),
                    version: doc.version.clone(),
                    description: doc.description.clone(),
                    document_yaml: yaml.clone(),
                })
                .await?;
        }

        let run_id = RunId::generate(Utc::now());
        let base_dir = opts.output_dir.clone().unwrap_or_else(|| self.base_dir.clone());
        let run_dir = RunDirectory::new(&base_dir, &doc.name, &doc.version, run_id.as_str());
        run_dir.create()?;
        run_dir.write_workflow_copy(&yaml)?;

        self.store
            .create_run(NewRun {
                id: run_id.to_string(),
                workflow_name: doc.name.clone(),
                workflow_version: doc.version.clone(),
                run_dir: run_dir.root().to_string_lossy().into_owned(),
            })
            .await?;

        if let Some(tx) = notify {
            let _ = tx.send(run_id.to_string());
        }

        let mut run_inputs: IndexMap<String, String> = doc.inputs.clone();
        for (k, v) in &opts.inputs {
            run_inputs.insert(k.clone(), v.clone());
        }
        // spec §7 InputStagingError: surfaced before first dispatch, run recorded as ERROR.
        if let Err(e) = run_dir.stage_inputs(&run_inputs, cwd) {
            self.store
                .mark_run_terminal(run_id.as_str(), Status::Error, Some(&e.to_string()))
                .await?;
            return Err(e.into());
        }

        let default_time_limit = match opts.time_limit_policy {
            TimeLimitPolicy::Default(d) => Some(d),
            TimeLimitPolicy::Disabled => None,
        };
        let ctx = StepContext {
            config: doc.config.clone(),
            run_inputs,
            run_dir,
            default_time_limit,
            stop_grace: Duration::from_secs(10),
        };
        let run_dir_root = run_dir.root().to_path_buf();
        let executor = Arc::new(StepRunner::new(doc.steps.clone(), ctx, self.driver.clone()));
        let aborted = Arc::new(AtomicBool::new(false));
        let persisting = Arc::new(PersistingExecutor::new(
            executor,
            self.store.clone(),
            run_id.to_string(),
            aborted.clone(),
        ));

        let order = validated.declaration_order.clone();
        let after: HashMap<String, Vec<String>> = doc
            .steps
            .iter()
            .map(|(name, step)| (name.clone(), step.after.clone()))
            .collect();

        let cancel = CancellationToken::new();
        self.active.lock().unwrap().insert(run_id.to_string(), cancel.clone());

        let scheduler = Scheduler::new(order, after, opts.parallel.max(1), persisting, cancel);
        let states = scheduler.initial_states();

        self.store.mark_run_started(run_id.as_str()).await?;
        info!(run_id = %run_id, "run started");
        let outcome = scheduler.run(states).await;
        self.active.lock().unwrap().remove(run_id.as_str());

        RunDirectory::from_existing(run_dir_root).cleanup_tmp()?;

        let (final_status, final_error) = if aborted.load(Ordering::SeqCst) {
            (
                Status::Error,
                Some("run aborted after repeated failures persisting step state".to_string()),
            )
        } else {
            (outcome.status, None)
        };
        self.store
            .mark_run_terminal(run_id.as_str(), final_status, final_error.as_deref())
            .await?;
        info!(run_id = %run_id, status = %final_status, "run finished");

        Ok(EngineRunOutcome {
            run_id: run_id.to_string(),
            status: final_status,
            steps: outcome.steps,
        })
    }

    /// Resume semantics (spec §4.3): `Completed` executions are kept, every
    /// other step is re-scheduled from `Pending`. A no-op on an
    /// already-`Completed` run, returning its unchanged terminal snapshot.
    #[instrument(skip(self, overrides))]
    pub async fn resume(
        &self,
        run_id: &str,
        overrides: HashMap<String, StepOverride>,
    ) -> Result<EngineRunOutcome, EngineError> {
        let run = self
            .store
            .get_run(run_id)
            .await?
            .ok_or_else(|| EngineError::RunNotFound(run_id.to_string()))?;

        let workflow = self
            .store
            .get_workflow(&run.workflow_name, &run.workflow_version)
            .await?
            .ok_or_else(|| EngineError::RunNotFound(run_id.to_string()))?;
        let doc = WorkflowDocument::from_yaml(&workflow.document_yaml)?;
        let validated = validate(doc)?;
        let mut doc = validated.doc;

        for (name, over) in &overrides {
            if let Some(step) = doc.steps.get_mut(name) {
                if let Some(cmd) = &over.command {
                    step.command = cmd.clone();
                }
                if let Some(cpu) = over.cpu {
                    step.resources.cpu = Some(cpu);
                }
                if let Some(memory) = &over.memory {
                    step.resources.memory = Some(memory.clone());
                }
                if let Some(time_limit) = &over.time_limit {
                    step.resources.time_limit = Some(time_limit.clone());
                }
            }
        }

        let prior_records = self.store.list_step_executions(run_id).await?;
        let mut prior = HashMap::new();
        for rec in prior_records {
            let status: Status = rec.status.parse().unwrap_or(Status::Pending);
            prior.insert(
                rec.step_name,
                StepExecState {
                    status,
                    start_time: rec.start_time,
                    end_time: rec.end_time,
                    exit_code: rec.exit_code,
                    error: rec.error,
                    log_path: rec.log_path,
                    produced_files: serde_json::from_str(&rec.produced_files).unwrap_or_default(),
                },
            );
        }

        let run_dir_root = PathBuf::from(&run.run_dir);
        let run_dir = RunDirectory::from_existing(run_dir_root.clone());

        let ctx = StepContext {
            config: doc.config.clone(),
            run_inputs: doc.inputs.clone(),
            run_dir,
            default_time_limit: Some(Duration::from_secs(3600)),
            stop_grace: Duration::from_secs(10),
        };
        let executor = Arc::new(StepRunner::new(doc.steps.clone(), ctx, self.driver.clone()));
        let aborted = Arc::new(AtomicBool::new(false));
        let persisting = Arc::new(PersistingExecutor::new(
            executor,
            self.store.clone(),
            run_id.to_string(),
            aborted.clone(),
        ));

        let order = validated.declaration_order.clone();
        let after: HashMap<String, Vec<String>> = doc
            .steps
            .iter()
            .map(|(name, step)| (name.clone(), step.after.clone()))
            .collect();

        let cancel = CancellationToken::new();
        self.active.lock().unwrap().insert(run_id.to_string(), cancel.clone());
        let scheduler = Scheduler::new(order, after, 4, persisting, cancel);

        let already_done = prior.values().all(|s| s.status == Status::Completed) && !prior.is_empty();
        let states = scheduler.resume_states(prior);

        let outcome = if already_done {
            bioflow_dag::RunOutcome {
                status: Status::Completed,
                steps: states,
            }
        } else {
            self.store.mark_run_started(run_id).await?;
            scheduler.run(states).await
        };
        self.active.lock().unwrap().remove(run_id);

        RunDirectory::from_existing(run_dir_root).cleanup_tmp()?;

        let (final_status, final_error) = if aborted.load(Ordering::SeqCst) {
            (
                Status::Error,
                Some("run aborted after repeated failures persisting step state".to_string()),
            )
        } else {
            (outcome.status, None)
        };
        self.store
            .mark_run_terminal(run_id, final_status, final_error.as_deref())
            .await?;

        Ok(EngineRunOutcome {
            run_id: run_id.to_string(),
            status: final_status,
            steps: outcome.steps,
        })
    }

    /// Marks `run_id`'s cancel token, if it is currently executing. Returns
    /// `true` if a live run was found and signalled.
    pub fn cancel(&self, run_id: &str) -> bool {
        if let Some(token) = self.active.lock().unwrap().get(run_id) {
            token.cancel();
            true
        } else {
            false
        }
    }

    /// Cancels every run currently in flight in this process. Used by the
    /// CLI's Ctrl-C handler, which doesn't know the run id ahead of time.
    pub fn cancel_all(&self) {
        for token in self.active.lock().unwrap().values() {
            token.cancel();
        }
    }

    /// A run's record plus its per-step execution history (spec §6 `status`:
    /// "run and per-step state").
    pub async fn status(&self, run_id: &str) -> Result<Option<RunStatus>, EngineError> {
        let Some(run) = self.store.get_run(run_id).await? else {
            return Ok(None);
        };
        let steps = self.store.list_step_executions(run_id).await?;
        Ok(Some(RunStatus { run, steps }))
    }

    pub async fn list(&self, status: Option<Status>) -> Result<Vec<bioflow_store::RunRecord>, EngineError> {
        Ok(self.store.list_runs(status).await?)
    }
}
