//! Readiness computation and skip propagation (spec §4.3). Grounded on
//! `vwf_core::dag::scheduler::Scheduler::update_task_statuses` /
//! `invalidate_downstream`'s repeated-pass-to-fixpoint shape, adapted from
//! artifact-availability to the simpler `after`-edge dependency model.

use std::collections::HashMap;

use bioflow_types::Status;

use crate::step_state::StepExecState;

/// A step's dependency is satisfied when it is `Completed`; any other
/// terminal status skips the step (spec §4.3 readiness rule).
fn all_deps_completed(after: &[String], states: &HashMap<String, StepExecState>) -> bool {
    after.iter().all(|dep| states[dep].status == Status::Completed)
}

fn any_dep_terminal_non_completed(after: &[String], states: &HashMap<String, StepExecState>) -> bool {
    after
        .iter()
        .any(|dep| states[dep].status.is_terminal() && states[dep].status != Status::Completed)
}

/// Recompute which `Pending` steps are ready to dispatch, propagating
/// `Skipped` to any step whose dependency terminated without completing.
/// Runs to a fixpoint in one call since a single completion can cascade
/// through several dependency layers at once (e.g. a diamond where the
/// shared ancestor fails).
pub fn recompute(
    order: &[String],
    after: &HashMap<String, Vec<String>>,
    states: &mut HashMap<String, StepExecState>,
) -> Vec<String> {
    loop {
        let mut changed = false;
        for name in order {
            if states[name].status != Status::Pending {
                continue;
            }
            let deps = &after[name];
            if any_dep_terminal_non_completed(deps, states) {
                let entry = states.get_mut(name).unwrap();
                entry.status = Status::Skipped;
                entry.end_time = Some(chrono::Utc::now());
                changed = true;
            }
        }
        if !changed {
            break;
        }
    }

    order
        .iter()
        .filter(|name| states[*name].status == Status::Pending)
        .filter(|name| all_deps_completed(&after[*name], states))
        .cloned()
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;

    fn deps(pairs: &[(&str, &[&str])]) -> HashMap<String, Vec<String>> {
        pairs
            .iter()
            .map(|(k, v)| (k.to_string(), v.iter().map(|s| s.to_string()).collect()))
            .collect()
    }

    #[test]
    fn entry_points_are_ready_immediately() {
        let order = vec!["a".to_string(), "b".to_string()];
        let after = deps(&[("a", &[]), ("b", &["a"])]);
        let mut states: HashMap<String, StepExecState> = order
            .iter()
            .map(|n| (n.clone(), StepExecState::pending()))
            .collect();
        let ready = recompute(&order, &after, &mut states);
        assert_eq!(ready, vec!["a".to_string()]);
    }

    #[test]
    fn failure_skips_transitive_dependants() {
        let order = vec!["a".to_string(), "b".to_string(), "c".to_string()];
        let after = deps(&[("a", &[]), ("b", &["a"]), ("c", &["b"])]);
        let mut states: HashMap<String, StepExecState> = order
            .iter()
            .map(|n| (n.clone(), StepExecState::pending()))
            .collect();
        states.get_mut("a").unwrap().status = Status::Failed;

        let ready = recompute(&order, &after, &mut states);
        assert!(ready.is_empty());
        assert_eq!(states["b"].status, Status::Skipped);
        assert_eq!(states["c"].status, Status::Skipped);
    }

    #[test]
    fn completed_dependency_unblocks_dependant() {
        let order = vec!["a".to_string(), "b".to_string()];
        let after = deps(&[("a", &[]), ("b", &["a"])]);
        let mut states: HashMap<String, StepExecState> = order
            .iter()
            .map(|n| (n.clone(), StepExecState::pending()))
            .collect();
        states.get_mut("a").unwrap().status = Status::Completed;

        let ready = recompute(&order, &after, &mut states);
        assert_eq!(ready, vec!["b".to_string()]);
    }
}
