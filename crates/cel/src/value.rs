//! Runtime values and the mutations expressions declare.

use std::cmp::Ordering;
use std::collections::BTreeMap;

use serde_json::Value as Json;
use tekq_core::{PipelineRun, PRIORITY_LABEL};

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Mutation {
    Label { key: String, value: String },
    Annotation { key: String, value: String },
    Priority { value: String },
}

impl Mutation {
    /// Write the declared field, creating the target map when absent.
    pub fn apply(&self, plr: &mut PipelineRun) {
        match self {
            Mutation::Label { key, value } => {
                plr.labels_mut().insert(key.clone(), value.clone());
            }
            Mutation::Annotation { key, value } => {
                plr.annotations_mut().insert(key.clone(), value.clone());
            }
            Mutation::Priority { value } => {
                plr.labels_mut().insert(PRIORITY_LABEL.to_string(), value.clone());
            }
        }
    }
}

#[derive(Debug, Clone, PartialEq)]
pub enum Value {
    Null,
    Bool(bool),
    Int(i64),
    Double(f64),
    String(String),
    List(Vec<Value>),
    Map(BTreeMap<String, Value>),
    Mutation(Mutation),
}

impl Value {
    pub fn type_name(&self) -> &'static str {
        match self {
            Value::Null => "null_type",
            Value::Bool(_) => "bool",
            Value::Int(_) => "int",
            Value::Double(_) => "double",
            Value::String(_) => "string",
            Value::List(_) => "list",
            Value::Map(_) => "map",
            Value::Mutation(_) => "mutation",
        }
    }

    /// Heterogeneous equality: numbers compare by value, other kinds must match.
    pub fn equals(&self, other: &Value) -> bool {
        match (self, other) {
            (Value::Int(a), Value::Double(b)) | (Value::Double(b), Value::Int(a)) => (*a as f64) == *b,
            (Value::List(a), Value::List(b)) => a.len() == b.len() && a.iter().zip(b).all(|(x, y)| x.equals(y)),
            (Value::Map(a), Value::Map(b)) => {
                a.len() == b.len() && a.iter().all(|(k, v)| b.get(k).is_some_and(|w| v.equals(w)))
            }
            (a, b) => a == b,
        }
    }

    pub fn compare(&self, other: &Value) -> Option<Ordering> {
        match (self, other) {
            (Value::Int(a), Value::Int(b)) => Some(a.cmp(b)),
            (Value::Double(a), Value::Double(b)) => a.partial_cmp(b),
            (Value::Int(a), Value::Double(b)) => (*a as f64).partial_cmp(b),
            (Value::Double(a), Value::Int(b)) => a.partial_cmp(&(*b as f64)),
            (Value::String(a), Value::String(b)) => Some(a.cmp(b)),
            (Value::Bool(a), Value::Bool(b)) => Some(a.cmp(b)),
            _ => None,
        }
    }
}

impl From<&Json> for Value {
    fn from(json: &Json) -> Self {
        match json {
            Json::Null => Value::Null,
            Json::Bool(b) => Value::Bool(*b),
            Json::Number(n) => match n.as_i64() {
                Some(i) => Value::Int(i),
                None => Value::Double(n.as_f64().unwrap_or(f64::NAN)),
            },
            Json::String(s) => Value::String(s.clone()),
            Json::Array(items) => Value::List(items.iter().map(Value::from).collect()),
            Json::Object(map) => Value::Map(map.iter().map(|(k, v)| (k.clone(), Value::from(v))).collect()),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn numbers_compare_across_kinds() {
        assert!(Value::Int(1).equals(&Value::Double(1.0)));
        assert!(!Value::Int(1).equals(&Value::String("1".into())));
        assert_eq!(Value::Int(1).compare(&Value::Double(1.5)), Some(Ordering::Less));
        assert_eq!(Value::Int(1).compare(&Value::String("a".into())), None);
    }

    #[test]
    fn priority_writes_the_priority_class_label() {
        let mut plr = PipelineRun::default();
        Mutation::Priority { value: "tekton-kueue-default".into() }.apply(&mut plr);
        assert_eq!(plr.label(PRIORITY_LABEL), Some("tekton-kueue-default"));
    }

    #[test]
    fn annotation_creates_missing_map() {
        let mut plr = PipelineRun::default();
        assert!(plr.metadata.annotations.is_none());
        Mutation::Annotation { key: "team".into(), value: "a".into() }.apply(&mut plr);
        assert_eq!(plr.annotation("team"), Some("a"));
    }
}
