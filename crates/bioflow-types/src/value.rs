//! Tagged-variant substitution tree (spec §9: "dynamically typed
//! substitution tree → tagged variant").

use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;

/// A leaf-or-map binding value for the variable substituter (spec §4.2).
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum Value {
    Str(String),
    Int(i64),
    Map(BTreeMap<String, Value>),
}

impl Value {
    pub fn map() -> Self {
        Value::Map(BTreeMap::new())
    }

    pub fn insert(&mut self, key: impl Into<String>, value: Value) -> &mut Self {
        if let Value::Map(m) = self {
            m.insert(key.into(), value);
        }
        self
    }

    /// Walk a `.`-separated path (e.g. `steps.a.outputs.count`) and return
    /// the leaf it resolves to, or `None` if any segment is missing.
    pub fn get_path(&self, path: &str) -> Option<&Value> {
        let mut current = self;
        for segment in path.split('.') {
            match current {
                Value::Map(m) => current = m.get(segment)?,
                _ => return None,
            }
        }
        Some(current)
    }

    /// Render a leaf as the literal text substituted into a template.
    /// Maps have no scalar rendering and resolve to `None`.
    pub fn as_literal(&self) -> Option<String> {
        match self {
            Value::Str(s) => Some(s.clone()),
            Value::Int(i) => Some(i.to_string()),
            Value::Map(_) => None,
        }
    }
}

impl From<String> for Value {
    fn from(s: String) -> Self {
        Value::Str(s)
    }
}

impl From<&str> for Value {
    fn from(s: &str) -> Self {
        Value::Str(s.to_string())
    }
}

impl From<i64> for Value {
    fn from(i: i64) -> Self {
        Value::Int(i)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn path_lookup_through_nested_maps() {
        let mut root = Value::map();
        let mut steps = Value::map();
        let mut a = Value::map();
        let mut outputs = Value::map();
        outputs.insert("count", Value::from(42i64));
        a.insert("outputs", outputs);
        steps.insert("a", a);
        root.insert("steps", steps);

        assert_eq!(
            root.get_path("steps.a.outputs.count").and_then(Value::as_literal),
            Some("42".to_string())
        );
        assert!(root.get_path("steps.a.outputs.missing").is_none());
        assert!(root.get_path("steps.b.outputs.count").is_none());
    }

    #[test]
    fn scalar_path_has_no_children() {
        let v = Value::from("leaf");
        assert!(v.get_path("anything").is_none());
    }
}
