//! BioinfoFlow workflow document parsing, validation, duration parsing, and
//! variable substitution.
//!
//! Design principle (shared with the teacher): workflows are data; the
//! scheduler/runner are code operating over it.

pub mod document;
pub mod duration;
pub mod substitute;
pub mod validate;

pub use document::{Resources, StepDefinition, WorkflowDocument};
pub use duration::{canonical_form, parse_duration_secs, InvalidDuration};
pub use substitute::{substitute, Bindings};
pub use validate::{validate, InvalidWorkflow, ValidatedWorkflow};
