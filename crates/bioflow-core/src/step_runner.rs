//! Step runner (spec §4.4): the `StepExecutor` implementation the scheduler
//! dispatches to. Composes bindings, substitutes the command template,
//! invokes the container driver, races exit against the time budget, and
//! discovers produced outputs. The exit-or-deadline race is the "coroutine
//! per-step wait → structured concurrency" design note in spec §9, expressed
//! with `tokio::select!` the way `vwf_core`'s teacher has no analogue for
//! (it runs steps synchronously) but `sattyamjjain-ferrumdeck`'s services
//! show the idiom for.

use std::collections::HashMap;
use std::sync::Mutex;
use std::time::Duration;

use async_trait::async_trait;
use bioflow_config::document::{Resources, StepDefinition};
use bioflow_config::substitute::{substitute, Bindings};
use bioflow_config::duration::parse_duration_secs;
use bioflow_dag::{StepExecutor, StepOutcome};
use bioflow_runtime::{ContainerDriver, DriverError, Mount, RunSpec};
use bioflow_types::Value;
use indexmap::IndexMap;
use tokio_util::sync::CancellationToken;
use tracing::{info, warn};

use crate::run_dir::RunDirectory;

/// Everything a step needs from the workflow and run that does not change
/// across steps.
pub struct StepContext {
    pub config: IndexMap<String, serde_json::Value>,
    pub run_inputs: IndexMap<String, String>,
    pub run_dir: RunDirectory,
    /// `None` disables the engine-wide default time limit (`--disable-time-limits`).
    pub default_time_limit: Option<Duration>,
    pub stop_grace: Duration,
}

pub struct StepRunner {
    steps: IndexMap<String, StepDefinition>,
    ctx: StepContext,
    driver: std::sync::Arc<dyn ContainerDriver>,
    completed_outputs: Mutex<HashMap<String, Vec<String>>>,
}

impl StepRunner {
    pub fn new(
        steps: IndexMap<String, StepDefinition>,
        ctx: StepContext,
        driver: std::sync::Arc<dyn ContainerDriver>,
    ) -> Self {
        Self {
            steps,
            ctx,
            driver,
            completed_outputs: Mutex::new(HashMap::new()),
        }
    }

    fn bindings(&self, resources: &Resources) -> Bindings {
        let mut config = Value::map();
        for (k, v) in &self.ctx.config {
            config.insert(k.clone(), json_to_value(v));
        }

        let mut inputs = Value::map();
        for (k, v) in &self.ctx.run_inputs {
            inputs.insert(k.clone(), Value::from(v.as_str()));
        }

        let mut resources_value = Value::map();
        if let Some(cpu) = resources.cpu {
            resources_value.insert("cpu", Value::from(cpu));
        }
        if let Some(memory) = &resources.memory {
            resources_value.insert("memory", Value::from(memory.as_str()));
        }
        if let Some(time_limit) = &resources.time_limit {
            resources_value.insert("time_limit", Value::from(time_limit.as_str()));
        }

        let mut steps = Value::map();
        let completed = self.completed_outputs.lock().unwrap();
        for (step_name, produced) in completed.iter() {
            steps.insert(step_name.clone(), outputs_value(produced));
        }
        drop(completed);

        Bindings::new()
            .with_config(config)
            .with_inputs(inputs)
            .with_resources(resources_value)
            .with_steps(steps)
            .with_run_dir(self.ctx.run_dir.root().to_string_lossy().into_owned())
    }

    fn resolve_time_budget(&self, resources: &Resources) -> Option<Duration> {
        match &resources.time_limit {
            Some(raw) => parse_duration_secs(raw).ok().map(Duration::from_secs),
            None => self.ctx.default_time_limit,
        }
    }
}

fn json_to_value(v: &serde_json::Value) -> Value {
    match v {
        serde_json::Value::String(s) => Value::from(s.as_str()),
        serde_json::Value::Number(n) if n.is_i64() => Value::from(n.as_i64().unwrap()),
        other => Value::from(other.to_string()),
    }
}

fn outputs_value(produced_files: &[String]) -> Value {
    let mut map = Value::map();
    for rel in produced_files {
        let stem = std::path::Path::new(rel)
            .file_stem()
            .map(|s| s.to_string_lossy().into_owned())
            .unwrap_or_else(|| rel.clone());
        map.insert(stem, Value::from(rel.as_str()));
    }
    map
}

enum WaitResult {
    Exited(Result<i32, DriverError>),
    TimedOut,
    Cancelled,
}

#[async_trait]
impl StepExecutor for StepRunner {
    async fn execute(&self, step_name: &str, cancel: CancellationToken) -> StepOutcome {
        let Some(step) = self.steps.get(step_name) else {
            return StepOutcome::error(format!("unknown step `{step_name}`"));
        };

        let bindings = self.bindings(&step.resources);
        let command = substitute(&step.command, &bindings);
        let log_path = self.ctx.run_dir.log_path_for_step(step_name);
        let before = self.ctx.run_dir.snapshot_outputs();

        if let Err(e) = self.driver.pull(&step.container).await {
            warn!(step = step_name, error = %e, "image pull failed");
            return StepOutcome::error(e.to_string());
        }

        let run_dir_path = self.ctx.run_dir.root().to_path_buf();
        let spec = RunSpec {
            image: step.container.clone(),
            command,
            mounts: vec![Mount {
                host_path: run_dir_path.clone(),
                container_path: run_dir_path,
            }],
            cpu: step.resources.cpu.unwrap_or(1),
            memory: step.resources.memory.clone().unwrap_or_else(|| "512m".to_string()),
            log_file: log_path.clone(),
        };

        let handle = match self.driver.run(spec).await {
            Ok(h) => h,
            Err(e) => {
                warn!(step = step_name, error = %e, "container launch failed");
                return StepOutcome::error(e.to_string());
            }
        };

        let budget = self.resolve_time_budget(&step.resources);
        let wait_result = race(self.driver.as_ref(), &handle, budget, &cancel).await;

        let outcome = match wait_result {
            WaitResult::Exited(Ok(code)) if code == 0 => {
                info!(step = step_name, "completed");
                StepOutcome::completed(code)
            }
            WaitResult::Exited(Ok(code)) => StepOutcome::failed(code),
            WaitResult::Exited(Err(e)) => StepOutcome::error(e.to_string()),
            WaitResult::TimedOut => {
                escalate(self.driver.as_ref(), &handle, self.ctx.stop_grace).await;
                StepOutcome::terminated_time_limit()
            }
            WaitResult::Cancelled => {
                escalate(self.driver.as_ref(), &handle, self.ctx.stop_grace).await;
                StepOutcome::error("step cancelled")
            }
        };

        let produced_files = self.ctx.run_dir.diff_outputs(&before);
        if outcome.status.is_successful() {
            self.completed_outputs
                .lock()
                .unwrap()
                .insert(step_name.to_string(), produced_files.clone());
        }

        outcome
            .with_log_path(log_path.to_string_lossy().into_owned())
            .with_produced_files(produced_files)
    }
}

/// Wait for exit, deadline, or cancellation — whichever fires first wins,
/// the others are simply dropped (spec §4.4 step 5, §5 suspension points).
async fn race(
    driver: &dyn ContainerDriver,
    handle: &bioflow_runtime::ContainerHandle,
    budget: Option<Duration>,
    cancel: &CancellationToken,
) -> WaitResult {
    let wait_fut = driver.wait(handle);
    tokio::pin!(wait_fut);

    match budget {
        Some(d) => {
            tokio::select! {
                res = &mut wait_fut => WaitResult::Exited(res),
                _ = tokio::time::sleep(d) => WaitResult::TimedOut,
                _ = cancel.cancelled() => WaitResult::Cancelled,
            }
        }
        None => {
            tokio::select! {
                res = &mut wait_fut => WaitResult::Exited(res),
                _ = cancel.cancelled() => WaitResult::Cancelled,
            }
        }
    }
}

/// Soft stop, escalating to kill after `grace` if the container has not
/// exited (spec §4.5, §5).
async fn escalate(driver: &dyn ContainerDriver, handle: &bioflow_runtime::ContainerHandle, grace: Duration) {
    let _ = driver.stop(handle, grace.as_secs()).await;
    tokio::select! {
        _ = driver.wait(handle) => {}
        _ = tokio::time::sleep(grace) => {
            let _ = driver.kill(handle).await;
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use bioflow_runtime::{MockContainerDriver, Outcome};
    use std::sync::Arc;
    use tempfile::TempDir;

    fn step(command: &str) -> StepDefinition {
        StepDefinition {
            container: "alpine:3".to_string(),
            command: command.to_string(),
            resources: Resources::default(),
            after: vec![],
        }
    }

    fn runner(
        steps: IndexMap<String, StepDefinition>,
        driver: Arc<MockContainerDriver>,
        base: &TempDir,
    ) -> StepRunner {
        let run_dir = RunDirectory::new(base.path(), "demo", "1", "run1");
        run_dir.create().unwrap();
        let ctx = StepContext {
            config: IndexMap::new(),
            run_inputs: IndexMap::new(),
            run_dir,
            default_time_limit: Some(Duration::from_secs(3600)),
            stop_grace: Duration::from_millis(50),
        };
        StepRunner::new(steps, ctx, driver)
    }

    #[tokio::test]
    async fn successful_exit_records_completed() {
        let base = TempDir::new().unwrap();
        let mut steps = IndexMap::new();
        steps.insert("a".to_string(), step("echo hi"));
        let driver = Arc::new(MockContainerDriver::new());
        driver.script("echo hi", Outcome::Exit(0));
        let runner = runner(steps, driver, &base);

        let outcome = runner.execute("a", CancellationToken::new()).await;
        assert_eq!(outcome.status, bioflow_types::Status::Completed);
        assert_eq!(outcome.exit_code, Some(0));
    }

    #[tokio::test]
    async fn nonzero_exit_records_failed() {
        let base = TempDir::new().unwrap();
        let mut steps = IndexMap::new();
        steps.insert("a".to_string(), step("false"));
        let driver = Arc::new(MockContainerDriver::new());
        driver.script("false", Outcome::Exit(1));
        let runner = runner(steps, driver, &base);

        let outcome = runner.execute("a", CancellationToken::new()).await;
        assert_eq!(outcome.status, bioflow_types::Status::Failed);
        assert_eq!(outcome.exit_code, Some(1));
    }

    #[tokio::test]
    async fn deadline_exceeded_kills_and_reports_time_limit() {
        let base = TempDir::new().unwrap();
        let mut steps = IndexMap::new();
        let mut resources = Resources::default();
        resources.time_limit = Some("0s".to_string());
        steps.insert(
            "a".to_string(),
            StepDefinition {
                container: "alpine:3".to_string(),
                command: "sleep 30".to_string(),
                resources,
                after: vec![],
            },
        );
        let driver = Arc::new(MockContainerDriver::new());
        driver.script("sleep 30", Outcome::Hangs);
        let runner = runner(steps, driver, &base);

        let outcome = runner.execute("a", CancellationToken::new()).await;
        assert_eq!(outcome.status, bioflow_types::Status::TerminatedTimeLimit);
    }

    #[tokio::test]
    async fn substitutes_config_and_resources_into_command() {
        let base = TempDir::new().unwrap();
        let mut resources = Resources::default();
        resources.cpu = Some(4);
        let mut steps = IndexMap::new();
        steps.insert(
            "a".to_string(),
            StepDefinition {
                container: "alpine:3".to_string(),
                command: "run --threads ${resources.cpu} --ref ${config.genome}".to_string(),
                resources,
                after: vec![],
            },
        );
        let driver = Arc::new(MockContainerDriver::new());
        driver.script("run --threads 4 --ref GRCh38", Outcome::Exit(0));

        let run_dir = RunDirectory::new(base.path(), "demo", "1", "run1");
        run_dir.create().unwrap();
        let mut config = IndexMap::new();
        config.insert("genome".to_string(), serde_json::json!("GRCh38"));
        let ctx = StepContext {
            config,
            run_inputs: IndexMap::new(),
            run_dir,
            default_time_limit: Some(Duration::from_secs(3600)),
            stop_grace: Duration::from_millis(50),
        };
        let runner = StepRunner::new(steps, ctx, driver);

        let outcome = runner.execute("a", CancellationToken::new()).await;
        assert_eq!(outcome.status, bioflow_types::Status::Completed);
    }
}
