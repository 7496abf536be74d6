//! Workflow document model (spec §3, §6). Grounded on
//! `vwf-core::config::{WorkflowConfig, StepConfig}`'s shape, with the step
//! collection kept order-preserving (`IndexMap`) so declaration order is
//! available for the scheduler's tie-break rule (spec §4.3).

use indexmap::IndexMap;
use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct WorkflowDocument {
    pub name: String,
    pub version: String,
    #[serde(default)]
    pub description: Option<String>,
    #[serde(default)]
    pub config: IndexMap<String, serde_json::Value>,
    #[serde(default)]
    pub inputs: IndexMap<String, String>,
    pub steps: IndexMap<String, StepDefinition>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct StepDefinition {
    pub container: String,
    pub command: String,
    #[serde(default)]
    pub resources: Resources,
    #[serde(default)]
    pub after: Vec<String>,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct Resources {
    #[serde(default)]
    pub cpu: Option<i64>,
    #[serde(default)]
    pub memory: Option<String>,
    #[serde(default)]
    pub time_limit: Option<String>,
}

impl WorkflowDocument {
    /// Parse a YAML workflow document (spec §6: required keys `name`,
    /// `version`, `steps`).
    pub fn from_yaml(text: &str) -> Result<Self, serde_yaml::Error> {
        serde_yaml::from_str(text)
    }

    /// Step names in declaration order, matching `steps`' YAML ordering.
    pub fn step_names_in_order(&self) -> impl Iterator<Item = &str> {
        self.steps.keys().map(String::as_str)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parses_minimal_document() {
        let yaml = r#"
name: demo
version: "1"
steps:
  a:
    container: "alpine:3"
    command: "echo hi"
  b:
    container: "alpine:3"
    command: "echo bye"
    after: [a]
"#;
        let doc = WorkflowDocument::from_yaml(yaml).unwrap();
        assert_eq!(doc.name, "demo");
        assert_eq!(doc.steps.len(), 2);
        assert_eq!(doc.step_names_in_order().collect::<Vec<_>>(), vec!["a", "b"]);
        assert_eq!(doc.steps["b"].after, vec!["a".to_string()]);
    }

    #[test]
    fn preserves_declaration_order() {
        let yaml = r#"
name: demo
version: "1"
steps:
  zeta:
    container: "x"
    command: "y"
  alpha:
    container: "x"
    command: "y"
  mid:
    container: "x"
    command: "y"
"#;
        let doc = WorkflowDocument::from_yaml(yaml).unwrap();
        assert_eq!(
            doc.step_names_in_order().collect::<Vec<_>>(),
            vec!["zeta", "alpha", "mid"]
        );
    }
}
