//! Opaque identifiers shared across the engine crates.

use std::fmt;

/// `run_id` of the form `YYYYMMDD_HHMMSS_<8-hex>` (spec §3).
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash, serde::Serialize, serde::Deserialize)]
#[serde(transparent)]
pub struct RunId(String);

impl RunId {
    /// Build a fresh run id from the current time and an 8-hex-digit suffix.
    pub fn generate(now: chrono::DateTime<chrono::Utc>) -> Self {
        let suffix = format!("{:08x}", uuid::Uuid::new_v4().as_u128() as u32);
        Self(format!("{}_{}", now.format("%Y%m%d_%H%M%S"), suffix))
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl From<String> for RunId {
    fn from(s: String) -> Self {
        Self(s)
    }
}

impl fmt::Display for RunId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

/// Step name, unique within a workflow.
pub type StepName = String;
