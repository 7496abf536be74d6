//! Status enum shared by `Run` and `StepExecution` (spec §3, §4.3, §6).

use serde::{Deserialize, Serialize};

/// Lifecycle status of a run or a step execution.
///
/// The same variant set is used for both levels (spec §6): a run can be
/// `Error` (input staging failed before dispatch) just as a step can.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, Default)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum Status {
    #[default]
    Pending,
    Running,
    Completed,
    Failed,
    Error,
    TerminatedTimeLimit,
    Skipped,
}

impl Status {
    /// Terminal statuses are ones a step/run cannot leave except via resume.
    pub fn is_terminal(self) -> bool {
        !matches!(self, Status::Pending | Status::Running)
    }

    /// Completed or Skipped are the two "did not block dependants" outcomes.
    pub fn is_successful(self) -> bool {
        matches!(self, Status::Completed | Status::Skipped)
    }

    /// Failed/Error/TerminatedTimeLimit count as a failure for dependants
    /// (spec §4.3 readiness rule, §7 DeadlineExceeded policy).
    pub fn is_failure(self) -> bool {
        matches!(
            self,
            Status::Failed | Status::Error | Status::TerminatedTimeLimit
        )
    }
}

/// Parse error for [`Status::from_str`].
#[derive(Debug, Clone, thiserror::Error)]
#[error("unrecognized status: {0}")]
pub struct ParseStatusError(pub String);

impl std::str::FromStr for Status {
    type Err = ParseStatusError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "PENDING" => Ok(Status::Pending),
            "RUNNING" => Ok(Status::Running),
            "COMPLETED" => Ok(Status::Completed),
            "FAILED" => Ok(Status::Failed),
            "ERROR" => Ok(Status::Error),
            "TERMINATED_TIME_LIMIT" => Ok(Status::TerminatedTimeLimit),
            "SKIPPED" => Ok(Status::Skipped),
            other => Err(ParseStatusError(other.to_string())),
        }
    }
}

impl std::fmt::Display for Status {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let s = match self {
            Status::Pending => "PENDING",
            Status::Running => "RUNNING",
            Status::Completed => "COMPLETED",
            Status::Failed => "FAILED",
            Status::Error => "ERROR",
            Status::TerminatedTimeLimit => "TERMINATED_TIME_LIMIT",
            Status::Skipped => "SKIPPED",
        };
        f.write_str(s)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn terminal_classification() {
        assert!(!Status::Pending.is_terminal());
        assert!(!Status::Running.is_terminal());
        assert!(Status::Completed.is_terminal());
        assert!(Status::Skipped.is_terminal());
        assert!(Status::TerminatedTimeLimit.is_terminal());
    }

    #[test]
    fn failure_classification() {
        assert!(Status::Failed.is_failure());
        assert!(Status::Error.is_failure());
        assert!(Status::TerminatedTimeLimit.is_failure());
        assert!(!Status::Completed.is_failure());
        assert!(!Status::Skipped.is_failure());
    }
}
