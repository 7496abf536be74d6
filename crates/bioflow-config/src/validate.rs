//! Workflow schema/DAG validation (spec §3 StepDefinition invariant, §4.3
//! well-formedness, §7 `InvalidWorkflow`). Cycle detection is Kahn's
//! algorithm, grounded on
//! `sattyamjjain-ferrumdeck/rust/crates/fd-dag::WorkflowDag::topological_sort`.

use std::collections::{HashMap, HashSet, VecDeque};

use thiserror::Error;

use crate::document::WorkflowDocument;
use crate::duration::parse_duration_secs;

#[derive(Debug, Error, PartialEq, Eq)]
pub enum InvalidWorkflow {
    #[error("step `{0}` has no steps defined")]
    Empty(String),
    #[error("step `{step}` declares `after: {dependency}` but no such step exists")]
    MissingDependency { step: String, dependency: String },
    #[error("cycle detected among steps: {0:?}")]
    Cycle(Vec<String>),
    #[error("step `{step}` has an invalid time_limit `{value}`")]
    BadTimeLimit { step: String, value: String },
}

/// Declaration-order-preserving topological sort of a validated workflow's
/// steps, used by the scheduler's dispatch tie-break (spec §4.3).
pub struct ValidatedWorkflow {
    pub doc: WorkflowDocument,
    /// Step names in the order the scheduler should prefer among
    /// simultaneously-ready steps: the document's declaration order.
    pub declaration_order: Vec<String>,
}

/// Validate schema-level invariants and DAG well-formedness.
pub fn validate(doc: WorkflowDocument) -> Result<ValidatedWorkflow, InvalidWorkflow> {
    if doc.steps.is_empty() {
        return Err(InvalidWorkflow::Empty(doc.name.clone()));
    }

    for (name, step) in &doc.steps {
        for dep in &step.after {
            if !doc.steps.contains_key(dep) {
                return Err(InvalidWorkflow::MissingDependency {
                    step: name.clone(),
                    dependency: dep.clone(),
                });
            }
        }
        if let Some(limit) = &step.resources.time_limit {
            if parse_duration_secs(limit).is_err() {
                return Err(InvalidWorkflow::BadTimeLimit {
                    step: name.clone(),
                    value: limit.clone(),
                });
            }
        }
    }

    topological_check(&doc)?;

    let declaration_order = doc.step_names_in_order().map(str::to_string).collect();
    Ok(ValidatedWorkflow {
        doc,
        declaration_order,
    })
}

fn topological_check(doc: &WorkflowDocument) -> Result<(), InvalidWorkflow> {
    let mut in_degree: HashMap<&str, usize> = HashMap::new();
    let mut children: HashMap<&str, Vec<&str>> = HashMap::new();

    for name in doc.steps.keys() {
        in_degree.entry(name).or_insert(0);
        children.entry(name).or_default();
    }
    for (name, step) in &doc.steps {
        *in_degree.get_mut(name.as_str()).unwrap() += step.after.len();
        for dep in &step.after {
            children.get_mut(dep.as_str()).unwrap().push(name);
        }
    }

    let mut queue: VecDeque<&str> = in_degree
        .iter()
        .filter(|(_, deg)| **deg == 0)
        .map(|(name, _)| *name)
        .collect();
    let mut visited = 0usize;

    while let Some(name) = queue.pop_front() {
        visited += 1;
        for child in &children[name] {
            let deg = in_degree.get_mut(child).unwrap();
            *deg -= 1;
            if *deg == 0 {
                queue.push_back(child);
            }
        }
    }

    if visited != doc.steps.len() {
        let in_cycle: HashSet<&str> = in_degree
            .iter()
            .filter(|(_, deg)| **deg > 0)
            .map(|(name, _)| *name)
            .collect();
        let mut names: Vec<String> = doc
            .step_names_in_order()
            .filter(|n| in_cycle.contains(n))
            .map(str::to_string)
            .collect();
        names.sort();
        return Err(InvalidWorkflow::Cycle(names));
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    fn doc(yaml: &str) -> WorkflowDocument {
        WorkflowDocument::from_yaml(yaml).unwrap()
    }

    #[test]
    fn linear_workflow_is_valid() {
        let d = doc(
            r#"
name: t
version: "1"
steps:
  a: { container: x, command: y }
  b: { container: x, command: y, after: [a] }
"#,
        );
        let v = validate(d).unwrap();
        assert_eq!(v.declaration_order, vec!["a", "b"]);
    }

    #[test]
    fn rejects_missing_dependency() {
        let d = doc(
            r#"
name: t
version: "1"
steps:
  a: { container: x, command: y, after: [ghost] }
"#,
        );
        assert_eq!(
            validate(d).unwrap_err(),
            InvalidWorkflow::MissingDependency {
                step: "a".into(),
                dependency: "ghost".into()
            }
        );
    }

    #[test]
    fn rejects_cycle() {
        let d = doc(
            r#"
name: t
version: "1"
steps:
  a: { container: x, command: y, after: [b] }
  b: { container: x, command: y, after: [a] }
"#,
        );
        assert!(matches!(validate(d), Err(InvalidWorkflow::Cycle(_))));
    }

    #[test]
    fn rejects_bad_time_limit() {
        let d = doc(
            r#"
name: t
version: "1"
steps:
  a: { container: x, command: y, resources: { time_limit: "nope" } }
"#,
        );
        assert!(matches!(validate(d), Err(InvalidWorkflow::BadTimeLimit { .. })));
    }

    #[test]
    fn accepts_diamond_dag() {
        let d = doc(
            r#"
name: t
version: "1"
steps:
  gen: { container: x, command: y }
  left: { container: x, command: y, after: [gen] }
  right: { container: x, command: y, after: [gen] }
  final: { container: x, command: y, after: [left, right] }
"#,
        );
        assert!(validate(d).is_ok());
    }
}
