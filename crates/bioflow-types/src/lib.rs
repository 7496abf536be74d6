//! Shared identifiers, status, and value types for the BioinfoFlow engine.
//!
//! Kept dependency-free of the scheduler/runtime/store so every other crate
//! can depend on it without pulling in unrelated machinery.

pub mod ids;
pub mod status;
pub mod value;

pub use ids::{RunId, StepName};
pub use status::Status;
pub use value::Value;
