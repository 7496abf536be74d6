//! Relational state persistence (spec §4.5, §6): workflows, runs, and their
//! step executions survive process restarts so `bioflow run --resume` and
//! the HTTP API's listing endpoints have something to read.

pub mod memory;
pub mod models;
pub mod pool;
pub mod repository;
pub mod sqlite;

pub use memory::MemoryStateRepository;
pub use models::{NewRun, NewWorkflow, RunRecord, StepExecutionRecord, WorkflowRecord};
pub use pool::{open, open_in_memory, DbPool};
pub use repository::{StateRepository, StepExecutionUpdate, StoreError};
pub use sqlite::SqliteStateRepository;
