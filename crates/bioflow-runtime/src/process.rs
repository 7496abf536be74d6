//! Real container driver: shells out to a container CLI (`docker`/`podman`).
//! Grounded on `vwf_core::runtime::FsRuntime::run_command`'s
//! `std::process::Command` wrapping, moved onto `tokio::process::Command`
//! so the step runner can race it against a deadline timer (spec §4.4,
//! §9 "coroutine-style wait → structured concurrency").

use std::path::PathBuf;
use std::process::Stdio;

use async_trait::async_trait;
use tokio::fs::OpenOptions;
use tokio::io::AsyncWriteExt;
use tokio::process::Command;
use tracing::{debug, instrument, warn};

use crate::traits::{ContainerDriver, ContainerHandle, DriverError, Mount, RunSpec};

/// Drives a local container daemon through its CLI. `bin` is typically
/// `docker` or `podman`.
pub struct ProcessContainerDriver {
    bin: String,
}

impl ProcessContainerDriver {
    pub fn new(bin: impl Into<String>) -> Self {
        Self { bin: bin.into() }
    }

    fn mount_args(mounts: &[Mount]) -> Vec<String> {
        mounts
            .iter()
            .flat_map(|m| {
                vec![
                    "-v".to_string(),
                    format!("{}:{}", m.host_path.display(), m.container_path.display()),
                ]
            })
            .collect()
    }
}

impl Default for ProcessContainerDriver {
    fn default() -> Self {
        Self::new("docker")
    }
}

#[async_trait]
impl ContainerDriver for ProcessContainerDriver {
    #[instrument(skip(self))]
    async fn pull(&self, image: &str) -> Result<(), DriverError> {
        let out = Command::new(&self.bin)
            .args(["pull", image])
            .stdout(Stdio::null())
            .stderr(Stdio::piped())
            .output()
            .await
            .map_err(|e| DriverError::DaemonUnreachable(e.to_string()))?;
        if !out.status.success() {
            return Err(DriverError::PullFailed {
                image: image.to_string(),
                reason: String::from_utf8_lossy(&out.stderr).to_string(),
            });
        }
        Ok(())
    }

    #[instrument(skip(self, spec), fields(image = %spec.image))]
    async fn run(&self, spec: RunSpec) -> Result<ContainerHandle, DriverError> {
        let mut args: Vec<String> = vec![
            "run".to_string(),
            "-d".to_string(),
            "--cpus".to_string(),
            spec.cpu.to_string(),
            "--memory".to_string(),
            spec.memory.clone(),
        ];
        args.extend(Self::mount_args(&spec.mounts));
        args.push(spec.image.clone());
        args.push("sh".to_string());
        args.push("-c".to_string());
        args.push(spec.command.clone());

        let out = Command::new(&self.bin)
            .args(&args)
            .stdout(Stdio::piped())
            .stderr(Stdio::piped())
            .output()
            .await
            .map_err(|e| DriverError::DaemonUnreachable(e.to_string()))?;

        if !out.status.success() {
            return Err(DriverError::LaunchFailed(
                String::from_utf8_lossy(&out.stderr).to_string(),
            ));
        }
        let id = String::from_utf8_lossy(&out.stdout).trim().to_string();
        debug!(container_id = %id, "launched container");
        self.tail_logs(&id, &spec.log_file).await?;
        Ok(ContainerHandle(id))
    }

    #[instrument(skip(self))]
    async fn stop(&self, handle: &ContainerHandle, grace_seconds: u64) -> Result<(), DriverError> {
        let status = Command::new(&self.bin)
            .args(["stop", "-t", &grace_seconds.to_string(), &handle.0])
            .status()
            .await
            .map_err(|e| DriverError::DaemonUnreachable(e.to_string()))?;
        if !status.success() {
            warn!(container_id = %handle.0, "stop returned non-zero; caller should escalate to kill");
        }
        Ok(())
    }

    #[instrument(skip(self))]
    async fn kill(&self, handle: &ContainerHandle) -> Result<(), DriverError> {
        Command::new(&self.bin)
            .args(["kill", &handle.0])
            .status()
            .await
            .map_err(|e| DriverError::DaemonUnreachable(e.to_string()))?;
        Ok(())
    }

    #[instrument(skip(self))]
    async fn wait(&self, handle: &ContainerHandle) -> Result<i32, DriverError> {
        let out = Command::new(&self.bin)
            .args(["wait", &handle.0])
            .output()
            .await
            .map_err(|e| DriverError::DaemonUnreachable(e.to_string()))?;
        let text = String::from_utf8_lossy(&out.stdout);
        text.trim()
            .parse::<i32>()
            .map_err(|_| DriverError::LaunchFailed(format!("unparseable exit code: {text}")))
    }
}

impl ProcessContainerDriver {
    async fn tail_logs(&self, container_id: &str, log_file: &PathBuf) -> Result<(), DriverError> {
        // Best-effort: snapshot current logs into the file now; a
        // production driver would spawn `docker logs -f` and stream
        // continuously, but a point-in-time dump keeps this self-contained.
        let out = Command::new(&self.bin)
            .args(["logs", container_id])
            .output()
            .await
            .map_err(|e| DriverError::DaemonUnreachable(e.to_string()))?;

        let mut file = OpenOptions::new()
            .create(true)
            .append(true)
            .open(log_file)
            .await?;
        file.write_all(&out.stdout).await?;
        file.write_all(&out.stderr).await?;
        Ok(())
    }
}
