//! Container driver trait (spec §4.5). Mediates all container-runtime side
//! effects so the scheduler/step-runner can be tested against a fake, the
//! same role `vwf_core::runtime::Runtime` plays for filesystem/LLM side
//! effects in the teacher.

use std::path::{Path, PathBuf};

use async_trait::async_trait;
use thiserror::Error;

#[derive(Debug, Error)]
pub enum DriverError {
    #[error("image pull failed for `{image}`: {reason}")]
    PullFailed { image: String, reason: String },
    #[error("container launch failed: {0}")]
    LaunchFailed(String),
    #[error("container runtime unreachable: {0}")]
    DaemonUnreachable(String),
    #[error("i/o error: {0}")]
    Io(#[from] std::io::Error),
}

/// A bind mount from a host path to a container-internal path. The run
/// directory is mounted at the same path inside the container so
/// `${run_dir}` expansions resolve identically on both sides (spec §4.4).
#[derive(Debug, Clone)]
pub struct Mount {
    pub host_path: PathBuf,
    pub container_path: PathBuf,
}

/// Parameters for launching one step's container (spec §4.5).
#[derive(Debug, Clone)]
pub struct RunSpec {
    pub image: String,
    pub command: String,
    pub mounts: Vec<Mount>,
    pub cpu: i64,
    pub memory: String,
    pub log_file: PathBuf,
}

/// Opaque handle to a launched container; implementations decide the shape.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ContainerHandle(pub String);

/// Capability set `{pull, run, stop, kill, wait}` (spec §4.5). The driver
/// opens the log file in append mode and tees container stdout+stderr into
/// it; `stop` performs a soft signal, `kill` escalates.
#[async_trait]
pub trait ContainerDriver: Send + Sync {
    async fn pull(&self, image: &str) -> Result<(), DriverError>;
    async fn run(&self, spec: RunSpec) -> Result<ContainerHandle, DriverError>;
    async fn stop(&self, handle: &ContainerHandle, grace_seconds: u64) -> Result<(), DriverError>;
    async fn kill(&self, handle: &ContainerHandle) -> Result<(), DriverError>;
    /// Blocks until the container has exited and returns its exit code.
    async fn wait(&self, handle: &ContainerHandle) -> Result<i32, DriverError>;
}

pub(crate) fn container_path_for(run_dir: &Path) -> PathBuf {
    // The run directory is mounted at an identical path inside the
    // container, so host-side and container-side `${run_dir}` agree.
    run_dir.to_path_buf()
}
