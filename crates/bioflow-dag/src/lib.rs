//! DAG-based bounded-parallel scheduler (spec §4.3). Takes a validated
//! workflow's step order and `after` edges and drives every step to a
//! terminal status through a pluggable [`StepExecutor`], independent of how
//! steps are actually executed.

pub mod executor;
pub mod readiness;
pub mod scheduler;
pub mod step_state;

pub use executor::{StepExecutor, StepOutcome};
pub use scheduler::{RunOutcome, Scheduler, SchedulerEvent};
pub use step_state::StepExecState;
