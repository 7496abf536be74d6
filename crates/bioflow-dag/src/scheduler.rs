//! Bounded-parallel dispatch loop (spec §4.3). Grounded on
//! `vwf_core::dag::scheduler::Scheduler` for the event-enum/struct shape and
//! on `fd_dag::scheduler::DagScheduler::complete_step`/`fail_step` for the
//! complete-then-recompute-readiness cycle; the concurrency itself (bounded
//! fan-out via `Semaphore` + `JoinSet`) has no teacher counterpart and is
//! enriched from `sattyamjjain-ferrumdeck`'s tokio-based services.

use std::collections::{HashMap, HashSet};
use std::sync::Arc;

use bioflow_types::Status;
use chrono::Utc;
use tokio::sync::Semaphore;
use tokio::task::JoinSet;
use tokio_util::sync::CancellationToken;
use tracing::{info, warn};

use crate::executor::StepExecutor;
use crate::readiness;
use crate::step_state::StepExecState;

/// Events a caller can subscribe to for progress reporting (spec §6 status
/// polling is satisfied by reading `RunOutcome` directly; this enum exists
/// for callers, such as the HTTP API's log tail, that want live updates).
#[derive(Debug, Clone)]
pub enum SchedulerEvent {
    StepStarted { step: String },
    StepCompleted { step: String, status: Status },
    StepSkipped { step: String },
    RunComplete { status: Status },
}

/// Result of driving a workflow's steps to completion.
#[derive(Debug, Clone)]
pub struct RunOutcome {
    pub status: Status,
    pub steps: HashMap<String, StepExecState>,
}

/// Declaration order plus `after` edges, already validated acyclic by
/// `bioflow_config::validate` (spec §4.2).
pub struct Scheduler {
    order: Vec<String>,
    after: HashMap<String, Vec<String>>,
    parallelism: usize,
    executor: Arc<dyn StepExecutor>,
    cancel: CancellationToken,
    events: Option<tokio::sync::mpsc::UnboundedSender<SchedulerEvent>>,
}

impl Scheduler {
    pub fn new(
        order: Vec<String>,
        after: HashMap<String, Vec<String>>,
        parallelism: usize,
        executor: Arc<dyn StepExecutor>,
        cancel: CancellationToken,
    ) -> Self {
        Self {
            order,
            after,
            parallelism: parallelism.max(1),
            executor,
            cancel,
            events: None,
        }
    }

    pub fn with_events(mut self, sender: tokio::sync::mpsc::UnboundedSender<SchedulerEvent>) -> Self {
        self.events = Some(sender);
        self
    }

    fn emit(&self, event: SchedulerEvent) {
        if let Some(tx) = &self.events {
            let _ = tx.send(event);
        }
    }

    /// Fresh dispatch: every step starts `Pending`.
    pub fn initial_states(&self) -> HashMap<String, StepExecState> {
        self.order
            .iter()
            .map(|name| (name.clone(), StepExecState::pending()))
            .collect()
    }

    /// Resume semantics (spec §4.3): steps already `Completed` stay that
    /// way and are not re-run; every other step (including ones that were
    /// `Running` when the process died) is reset to `Pending` so it is
    /// re-dispatched from scratch.
    pub fn resume_states(&self, prior: HashMap<String, StepExecState>) -> HashMap<String, StepExecState> {
        self.order
            .iter()
            .map(|name| {
                let state = match prior.get(name) {
                    Some(s) if s.status == Status::Completed => s.clone(),
                    _ => StepExecState::pending(),
                };
                (name.clone(), state)
            })
            .collect()
    }

    /// Drive every step to a terminal status, dispatching newly-ready steps
    /// up to `parallelism` at a time, tie-broken by declaration order.
    pub async fn run(&self, mut states: HashMap<String, StepExecState>) -> RunOutcome {
        let semaphore = Arc::new(Semaphore::new(self.parallelism));
        let mut join_set: JoinSet<(String, crate::executor::StepOutcome)> = JoinSet::new();
        let mut dispatched: HashSet<String> = HashSet::new();

        loop {
            let ready = readiness::recompute(&self.order, &self.after, &mut states);

            if self.cancel.is_cancelled() {
                if join_set.is_empty() {
                    break;
                }
            } else {
                for name in ready {
                    if dispatched.contains(&name) {
                        continue;
                    }
                    let permit = match semaphore.clone().try_acquire_owned() {
                        Ok(p) => p,
                        Err(_) => break,
                    };
                    dispatched.insert(name.clone());
                    let entry = states.get_mut(&name).unwrap();
                    entry.status = Status::Running;
                    entry.start_time = Some(Utc::now());
                    self.emit(SchedulerEvent::StepStarted { step: name.clone() });

                    let executor = self.executor.clone();
                    let cancel = self.cancel.clone();
                    let step_name = name.clone();
                    join_set.spawn(async move {
                        let _permit = permit;
                        let outcome = executor.execute(&step_name, cancel).await;
                        (step_name, outcome)
                    });
                }
            }

            if join_set.is_empty() {
                break;
            }

            if let Some(joined) = join_set.join_next().await {
                match joined {
                    Ok((name, outcome)) => {
                        info!(step = %name, status = %outcome.status, "step finished");
                        let entry = states.get_mut(&name).unwrap();
                        entry.status = outcome.status;
                        entry.end_time = Some(Utc::now());
                        entry.exit_code = outcome.exit_code;
                        entry.error = outcome.error;
                        entry.log_path = outcome.log_path;
                        entry.produced_files = outcome.produced_files;
                        self.emit(SchedulerEvent::StepCompleted {
                            step: name,
                            status: entry.status,
                        });
                    }
                    Err(join_err) => {
                        warn!(error = %join_err, "step task panicked");
                    }
                }
            }
        }

        // Any step still Pending here is unreachable except via cancellation
        // interrupting dispatch before its turn; mark it Skipped so the run
        // reaches a fully terminal state (spec §4.3 cancel policy).
        for name in &self.order {
            let entry = states.get_mut(name).unwrap();
            if entry.status == Status::Pending {
                entry.status = Status::Skipped;
                entry.end_time = Some(Utc::now());
                self.emit(SchedulerEvent::StepSkipped { step: name.clone() });
            }
        }

        let overall = if self.cancel.is_cancelled() {
            Status::Failed
        } else if states.values().any(|s| s.status.is_failure()) {
            Status::Failed
        } else {
            Status::Completed
        };
        self.emit(SchedulerEvent::RunComplete { status: overall });

        RunOutcome {
            status: overall,
            steps: states,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::executor::StepOutcome;
    use async_trait::async_trait;
    use std::sync::Mutex;

    struct ScriptedExecutor {
        outcomes: Mutex<HashMap<String, StepOutcome>>,
    }

    #[async_trait]
    impl StepExecutor for ScriptedExecutor {
        async fn execute(&self, step_name: &str, _cancel: CancellationToken) -> StepOutcome {
            self.outcomes
                .lock()
                .unwrap()
                .get(step_name)
                .cloned()
                .unwrap_or_else(|| StepOutcome::completed(0))
        }
    }

    fn deps(pairs: &[(&str, &[&str])]) -> HashMap<String, Vec<String>> {
        pairs
            .iter()
            .map(|(k, v)| (k.to_string(), v.iter().map(|s| s.to_string()).collect()))
            .collect()
    }

    #[tokio::test]
    async fn linear_chain_completes_in_order() {
        let order = vec!["a".to_string(), "b".to_string(), "c".to_string()];
        let after = deps(&[("a", &[]), ("b", &["a"]), ("c", &["b"])]);
        let executor = Arc::new(ScriptedExecutor {
            outcomes: Mutex::new(HashMap::new()),
        });
        let sched = Scheduler::new(order, after, 2, executor, CancellationToken::new());
        let states = sched.initial_states();
        let outcome = sched.run(states).await;

        assert_eq!(outcome.status, Status::Completed);
        for step in ["a", "b", "c"] {
            assert_eq!(outcome.steps[step].status, Status::Completed);
        }
    }

    #[tokio::test]
    async fn failure_skips_dependants_and_fails_run() {
        let order = vec!["a".to_string(), "b".to_string(), "c".to_string()];
        let after = deps(&[("a", &[]), ("b", &["a"]), ("c", &["b"])]);
        let mut outcomes = HashMap::new();
        outcomes.insert("a".to_string(), StepOutcome::failed(1));
        let executor = Arc::new(ScriptedExecutor {
            outcomes: Mutex::new(outcomes),
        });
        let sched = Scheduler::new(order, after, 2, executor, CancellationToken::new());
        let states = sched.initial_states();
        let outcome = sched.run(states).await;

        assert_eq!(outcome.status, Status::Failed);
        assert_eq!(outcome.steps["a"].status, Status::Failed);
        assert_eq!(outcome.steps["b"].status, Status::Skipped);
        assert_eq!(outcome.steps["c"].status, Status::Skipped);
    }

    #[tokio::test]
    async fn fan_out_fan_in_all_complete() {
        let order = vec![
            "root".to_string(),
            "left".to_string(),
            "right".to_string(),
            "join".to_string(),
        ];
        let after = deps(&[
            ("root", &[]),
            ("left", &["root"]),
            ("right", &["root"]),
            ("join", &["left", "right"]),
        ]);
        let executor = Arc::new(ScriptedExecutor {
            outcomes: Mutex::new(HashMap::new()),
        });
        let sched = Scheduler::new(order, after, 2, executor, CancellationToken::new());
        let states = sched.initial_states();
        let outcome = sched.run(states).await;

        assert_eq!(outcome.status, Status::Completed);
        assert_eq!(outcome.steps["join"].status, Status::Completed);
    }

    #[tokio::test]
    async fn resume_keeps_completed_and_reruns_rest() {
        let order = vec!["a".to_string(), "b".to_string()];
        let after = deps(&[("a", &[]), ("b", &["a"])]);
        let executor = Arc::new(ScriptedExecutor {
            outcomes: Mutex::new(HashMap::new()),
        });
        let sched = Scheduler::new(order, after, 2, executor, CancellationToken::new());

        let mut prior = HashMap::new();
        let mut a_done = StepExecState::pending();
        a_done.status = Status::Completed;
        prior.insert("a".to_string(), a_done);
        prior.insert("b".to_string(), {
            let mut running = StepExecState::pending();
            running.status = Status::Running;
            running
        });

        let resumed = sched.resume_states(prior);
        assert_eq!(resumed["a"].status, Status::Completed);
        assert_eq!(resumed["b"].status, Status::Pending);

        let outcome = sched.run(resumed).await;
        assert_eq!(outcome.status, Status::Completed);
    }

    #[tokio::test]
    async fn cancellation_before_dispatch_skips_pending_steps() {
        let order = vec!["a".to_string(), "b".to_string()];
        let after = deps(&[("a", &[]), ("b", &["a"])]);
        let executor = Arc::new(ScriptedExecutor {
            outcomes: Mutex::new(HashMap::new()),
        });
        let cancel = CancellationToken::new();
        cancel.cancel();
        let sched = Scheduler::new(order, after, 2, executor, cancel);
        let states = sched.initial_states();
        let outcome = sched.run(states).await;

        assert_eq!(outcome.status, Status::Failed);
        assert_eq!(outcome.steps["a"].status, Status::Skipped);
        assert_eq!(outcome.steps["b"].status, Status::Skipped);
    }
}
