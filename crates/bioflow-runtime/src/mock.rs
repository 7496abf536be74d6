//! In-memory, scriptable container driver for tests and `--dry-run`.
//! Grounded on `vwf_core::runtime::{DryRunRuntime, MockLlmClient}`: a fake
//! that records/replays instead of touching the outside world.

use std::collections::HashMap;
use std::sync::Mutex;
use std::time::Duration;

use async_trait::async_trait;
use tokio::time::sleep;

use crate::traits::{ContainerDriver, ContainerHandle, DriverError, RunSpec};

/// Scripted result for one step's container run, keyed by exact command
/// text (tests compose a distinct command per step).
#[derive(Debug, Clone)]
pub enum Outcome {
    /// Exits immediately with the given code.
    Exit(i32),
    /// Exits with the given code after a delay — used for fan-out timing
    /// assertions (spec §8 scenario S2).
    ExitAfter(Duration, i32),
    /// Never exits on its own — used for time-limit kill tests (spec §8 S3).
    Hangs,
    /// `run()` itself fails, as if the daemon were unreachable or the image
    /// pull failed (spec §7 `ContainerLaunchError`).
    FailsToLaunch,
}

struct Running {
    outcome: Outcome,
}

/// Mock container driver: every `run()` call is resolved against a
/// pre-registered [`Outcome`] for that command, defaulting to an immediate
/// zero exit if unscripted.
#[derive(Default)]
pub struct MockContainerDriver {
    scripts: Mutex<HashMap<String, Outcome>>,
    running: Mutex<HashMap<String, Running>>,
    next_id: Mutex<u64>,
}

impl MockContainerDriver {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn script(&self, command: impl Into<String>, outcome: Outcome) {
        self.scripts.lock().unwrap().insert(command.into(), outcome);
    }

    fn alloc_id(&self) -> String {
        let mut n = self.next_id.lock().unwrap();
        *n += 1;
        format!("mock-{n}")
    }
}

#[async_trait]
impl ContainerDriver for MockContainerDriver {
    async fn pull(&self, _image: &str) -> Result<(), DriverError> {
        Ok(())
    }

    async fn run(&self, spec: RunSpec) -> Result<ContainerHandle, DriverError> {
        let outcome = self
            .scripts
            .lock()
            .unwrap()
            .remove(&spec.command)
            .unwrap_or(Outcome::Exit(0));

        if let Outcome::FailsToLaunch = outcome {
            return Err(DriverError::LaunchFailed("scripted launch failure".into()));
        }

        let id = self.alloc_id();
        self.running.lock().unwrap().insert(id.clone(), Running { outcome });
        Ok(ContainerHandle(id))
    }

    async fn stop(&self, handle: &ContainerHandle, _grace_seconds: u64) -> Result<(), DriverError> {
        self.running.lock().unwrap().remove(&handle.0);
        Ok(())
    }

    async fn kill(&self, handle: &ContainerHandle) -> Result<(), DriverError> {
        self.running.lock().unwrap().remove(&handle.0);
        Ok(())
    }

    async fn wait(&self, handle: &ContainerHandle) -> Result<i32, DriverError> {
        let outcome = {
            let running = self.running.lock().unwrap();
            running
                .get(&handle.0)
                .map(|r| r.outcome.clone())
                .unwrap_or(Outcome::Exit(0))
        };
        match outcome {
            Outcome::Exit(code) => Ok(code),
            Outcome::ExitAfter(delay, code) => {
                sleep(delay).await;
                Ok(code)
            }
            Outcome::Hangs => {
                sleep(Duration::from_secs(u64::MAX / 2)).await;
                unreachable!("mock driver scripted to hang forever")
            }
            Outcome::FailsToLaunch => unreachable!("launch failures never reach wait()"),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::traits::RunSpec;
    use std::path::PathBuf;

    fn spec(command: &str) -> RunSpec {
        RunSpec {
            image: "alpine:3".into(),
            command: command.into(),
            mounts: vec![],
            cpu: 1,
            memory: "512m".into(),
            log_file: PathBuf::from("/tmp/does-not-matter.log"),
        }
    }

    #[tokio::test]
    async fn unscripted_command_exits_zero() {
        let driver = MockContainerDriver::new();
        let handle = driver.run(spec("echo hi")).await.unwrap();
        assert_eq!(driver.wait(&handle).await.unwrap(), 0);
    }

    #[tokio::test]
    async fn scripted_nonzero_exit() {
        let driver = MockContainerDriver::new();
        driver.script("false", Outcome::Exit(1));
        let handle = driver.run(spec("false")).await.unwrap();
        assert_eq!(driver.wait(&handle).await.unwrap(), 1);
    }

    #[tokio::test]
    async fn scripted_launch_failure() {
        let driver = MockContainerDriver::new();
        driver.script("boom", Outcome::FailsToLaunch);
        assert!(driver.run(spec("boom")).await.is_err());
    }
}
