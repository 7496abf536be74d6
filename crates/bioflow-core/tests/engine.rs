//! Integration tests for the `Engine` façade, exercising the real
//! scheduler/step-runner/store stack end to end (spec §8 scenarios
//! S1/S2/S3/S4/S6), wired to a [`MockContainerDriver`] and a
//! [`MemoryStateRepository`] — `Engine`'s own pluggable dependencies, not a
//! bypass of it.

use std::collections::HashMap;
use std::sync::Arc;
use std::time::Duration;

use bioflow_core::{Engine, RunOptions, StepOverride, TimeLimitPolicy};
use bioflow_runtime::{ContainerDriver, MockContainerDriver, Outcome};
use bioflow_store::{MemoryStateRepository, StateRepository};
use bioflow_types::Status;
use tempfile::TempDir;

fn write_workflow(dir: &TempDir, yaml: &str) -> std::path::PathBuf {
    let path = dir.path().join("workflow.yaml");
    std::fs::write(&path, yaml).unwrap();
    path
}

fn engine(base: &TempDir, driver: Arc<MockContainerDriver>) -> Engine {
    let store: Arc<dyn StateRepository> = Arc::new(MemoryStateRepository::new());
    let driver: Arc<dyn ContainerDriver> = driver;
    Engine::new(base.path().join("runs-base"), store, driver)
}

mod linear_success {
    use super::*;

    #[tokio::test]
    async fn both_steps_complete_in_order() {
        let yaml = r#"
name: linear
version: "1"
steps:
  a:
    container: alpine:3
    command: "echo hi"
  b:
    container: alpine:3
    command: "echo bye"
    after: [a]
"#;
        let base = TempDir::new().unwrap();
        let driver = Arc::new(MockContainerDriver::new());
        let eng = engine(&base, driver.clone());
        let workflow = write_workflow(&base, yaml);

        let outcome = eng
            .run(&workflow, base.path(), RunOptions::default())
            .await
            .unwrap();

        assert_eq!(outcome.status, Status::Completed);
        assert_eq!(outcome.steps["a"].status, Status::Completed);
        assert_eq!(outcome.steps["b"].status, Status::Completed);
        assert!(outcome.steps["b"].start_time.unwrap() > outcome.steps["a"].end_time.unwrap());
    }
}

mod fan_out_fan_in {
    use super::*;

    #[tokio::test]
    async fn middle_steps_run_concurrently_then_join() {
        let yaml = r#"
name: fanout
version: "1"
steps:
  generate:
    container: alpine:3
    command: "gen"
  count_words:
    container: alpine:3
    command: "count"
    after: [generate]
  calc_sum:
    container: alpine:3
    command: "sum"
    after: [generate]
  sort_fruits:
    container: alpine:3
    command: "sort"
    after: [generate]
  final:
    container: alpine:3
    command: "join"
    after: [count_words, calc_sum, sort_fruits]
"#;
        let base = TempDir::new().unwrap();
        let driver = Arc::new(MockContainerDriver::new());
        driver.script("count", Outcome::ExitAfter(Duration::from_millis(30), 0));
        driver.script("sum", Outcome::ExitAfter(Duration::from_millis(30), 0));
        driver.script("sort", Outcome::ExitAfter(Duration::from_millis(30), 0));
        let eng = engine(&base, driver.clone());
        let workflow = write_workflow(&base, yaml);

        let opts = RunOptions {
            parallel: 4,
            ..Default::default()
        };
        let outcome = eng.run(&workflow, base.path(), opts).await.unwrap();

        assert_eq!(outcome.status, Status::Completed);
        for step in ["generate", "count_words", "calc_sum", "sort_fruits", "final"] {
            assert_eq!(outcome.steps[step].status, Status::Completed, "{step} did not complete");
        }
        let final_start = outcome.steps["final"].start_time.unwrap();
        for step in ["count_words", "calc_sum", "sort_fruits"] {
            assert!(final_start >= outcome.steps[step].end_time.unwrap());
        }
    }
}

mod time_limit_kill {
    use super::*;

    #[tokio::test]
    async fn exceeding_step_is_terminated() {
        let yaml = r#"
name: timeboxed
version: "1"
steps:
  slow:
    container: alpine:3
    command: "sleep 30"
    resources:
      time_limit: "1s"
"#;
        let base = TempDir::new().unwrap();
        let driver = Arc::new(MockContainerDriver::new());
        driver.script("sleep 30", Outcome::Hangs);
        let eng = engine(&base, driver.clone());
        let workflow = write_workflow(&base, yaml);

        let outcome = eng
            .run(&workflow, base.path(), RunOptions::default())
            .await
            .unwrap();

        assert_eq!(outcome.status, Status::Failed);
        assert_eq!(outcome.steps["slow"].status, Status::TerminatedTimeLimit);
    }
}

mod failure_propagation {
    use super::*;

    #[tokio::test]
    async fn failed_step_skips_its_dependants() {
        let yaml = r#"
name: chain
version: "1"
steps:
  a:
    container: alpine:3
    command: "false"
  b:
    container: alpine:3
    command: "echo b"
    after: [a]
  c:
    container: alpine:3
    command: "echo c"
    after: [b]
"#;
        let base = TempDir::new().unwrap();
        let driver = Arc::new(MockContainerDriver::new());
        driver.script("false", Outcome::Exit(1));
        let eng = engine(&base, driver.clone());
        let workflow = write_workflow(&base, yaml);

        let outcome = eng
            .run(&workflow, base.path(), RunOptions::default())
            .await
            .unwrap();

        assert_eq!(outcome.status, Status::Failed);
        assert_eq!(outcome.steps["a"].status, Status::Failed);
        assert_eq!(outcome.steps["b"].status, Status::Skipped);
        assert_eq!(outcome.steps["c"].status, Status::Skipped);
    }
}

mod resume {
    use super::*;

    #[tokio::test]
    async fn overridden_step_completes_and_dependants_rerun() {
        let yaml = r#"
name: chain
version: "1"
steps:
  a:
    container: alpine:3
    command: "false"
  b:
    container: alpine:3
    command: "echo b"
    after: [a]
  c:
    container: alpine:3
    command: "echo c"
    after: [b]
"#;
        let base = TempDir::new().unwrap();
        let driver = Arc::new(MockContainerDriver::new());
        driver.script("false", Outcome::Exit(1));
        let eng = engine(&base, driver.clone());
        let workflow = write_workflow(&base, yaml);

        let first = eng
            .run(&workflow, base.path(), RunOptions::default())
            .await
            .unwrap();
        assert_eq!(first.status, Status::Failed);

        let mut overrides = HashMap::new();
        overrides.insert(
            "a".to_string(),
            StepOverride {
                command: Some("exit 0".to_string()),
                ..Default::default()
            },
        );
        driver.script("exit 0", Outcome::Exit(0));

        let resumed = eng.resume(&first.run_id, overrides).await.unwrap();
        assert_eq!(resumed.status, Status::Completed);
        for step in ["a", "b", "c"] {
            assert_eq!(resumed.steps[step].status, Status::Completed);
        }
    }
}
