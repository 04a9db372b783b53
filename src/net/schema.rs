//! Shape validation of raw Petri net JSON.
//!
//! [`validate_schema`] is the only way to turn an untyped
//! [`serde_json::Value`] into a [`PetriNet`]. It stops at the first mismatch
//! and reports where it happened as a JSONPath-like string (`$.arcs[2].from`).

use indexmap::IndexMap;
use serde::Serialize;
use serde_json::{Map, Value};
use thiserror::Error;

use super::model::{Arc, PetriNet};

/// Top-level keys, in the order they are checked.
pub const REQUIRED_KEYS: [&str; 4] = ["places", "transitions", "arcs", "initial"];

/// The first structural mismatch found in a raw document.
#[derive(Debug, Clone, PartialEq, Eq, Error, Serialize)]
#[error("schema violation at '{path}': {reason}")]
pub struct SchemaViolation {
    pub path: String,
    pub reason: String,
}

impl SchemaViolation {
    fn new(path: impl Into<String>, reason: impl Into<String>) -> Self {
        Self {
            path: path.into(),
            reason: reason.into(),
        }
    }
}

/// Checks the document shape and builds the typed net.
///
/// Token counts are only checked to be integers here; their value domain
/// is reported by the structural analyzer together with the other logical
/// defects.
pub fn validate_schema(raw: &Value) -> Result<PetriNet, SchemaViolation> {
    let root = raw
        .as_object()
        .ok_or_else(|| SchemaViolation::new("$", format!("expected object, found {}", kind(raw))))?;

    for key in REQUIRED_KEYS {
        if !root.contains_key(key) {
            return Err(SchemaViolation::new(
                "$",
                format!("missing required key '{key}'"),
            ));
        }
    }
    if let Some(unknown) = root.keys().find(|k| !REQUIRED_KEYS.contains(&k.as_str())) {
        return Err(SchemaViolation::new(
            format!("$.{unknown}"),
            "unknown top-level key",
        ));
    }

    let places = label_map(&root["places"], "$.places")?;
    let transitions = label_map(&root["transitions"], "$.transitions")?;
    let arcs = arc_list(&root["arcs"])?;
    let initial = marking(&root["initial"])?;

    Ok(PetriNet::from_parts(places, transitions, arcs, initial))
}

fn label_map(value: &Value, path: &str) -> Result<IndexMap<String, String>, SchemaViolation> {
    let obj = object_at(value, path)?;
    let mut out = IndexMap::with_capacity(obj.len());
    for (id, label) in obj {
        let entry_path = format!("{path}.{id}");
        if id.is_empty() {
            return Err(SchemaViolation::new(entry_path, "node id must not be empty"));
        }
        match label.as_str() {
            Some(s) if !s.trim().is_empty() => {
                out.insert(id.clone(), s.to_string());
            }
            Some(_) => {
                return Err(SchemaViolation::new(entry_path, "label must not be empty"));
            }
            None => {
                return Err(SchemaViolation::new(
                    entry_path,
                    format!("expected string label, found {}", kind(label)),
                ));
            }
        }
    }
    Ok(out)
}

fn arc_list(value: &Value) -> Result<Vec<Arc>, SchemaViolation> {
    let items = value.as_array().ok_or_else(|| {
        SchemaViolation::new("$.arcs", format!("expected array, found {}", kind(value)))
    })?;

    items
        .iter()
        .enumerate()
        .map(|(i, item)| {
            let path = format!("$.arcs[{i}]");
            let obj = object_at(item, &path)?;
            if let Some(extra) = obj.keys().find(|k| *k != "from" && *k != "to") {
                return Err(SchemaViolation::new(
                    format!("{path}.{extra}"),
                    "unknown arc key",
                ));
            }
            Ok(Arc {
                from: endpoint(obj, &path, "from")?,
                to: endpoint(obj, &path, "to")?,
            })
        })
        .collect()
}

fn endpoint(obj: &Map<String, Value>, path: &str, key: &str) -> Result<String, SchemaViolation> {
    let field_path = format!("{path}.{key}");
    match obj.get(key) {
        None => Err(SchemaViolation::new(path, format!("missing required key '{key}'"))),
        Some(Value::String(s)) if s.is_empty() => {
            Err(SchemaViolation::new(field_path, "node id must not be empty"))
        }
        Some(Value::String(s)) => Ok(s.clone()),
        Some(other) => Err(SchemaViolation::new(
            field_path,
            format!("expected string, found {}", kind(other)),
        )),
    }
}

fn marking(value: &Value) -> Result<IndexMap<String, i64>, SchemaViolation> {
    let obj = object_at(value, "$.initial")?;
    let mut out = IndexMap::with_capacity(obj.len());
    for (id, tokens) in obj {
        let path = format!("$.initial.{id}");
        if id.is_empty() {
            return Err(SchemaViolation::new(path, "place id must not be empty"));
        }
        let count = match tokens {
            Value::Number(n) if n.is_i64() => n.as_i64(),
            Value::Number(n) if n.is_u64() => {
                return Err(SchemaViolation::new(path, format!("token count {n} is out of range")));
            }
            _ => None,
        }
        .ok_or_else(|| {
            SchemaViolation::new(&path, format!("expected integer, found {}", kind(tokens)))
        })?;
        out.insert(id.clone(), count);
    }
    Ok(out)
}

fn object_at<'a>(value: &'a Value, path: &str) -> Result<&'a Map<String, Value>, SchemaViolation> {
    value
        .as_object()
        .ok_or_else(|| SchemaViolation::new(path, format!("expected object, found {}", kind(value))))
}

fn kind(value: &Value) -> &'static str {
    match value {
        Value::Null => "null",
        Value::Bool(_) => "boolean",
        Value::Number(n) if n.is_f64() => "number",
        Value::Number(_) => "integer",
        Value::String(_) => "string",
        Value::Array(_) => "array",
        Value::Object(_) => "object",
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn minimal() -> Value {
        json!({
            "places": {"p1": "idle"},
            "transitions": {"t1": "start"},
            "arcs": [{"from": "p1", "to": "t1"}],
            "initial": {"p1": 1}
        })
    }

    #[test]
    fn accepts_well_formed_document() {
        let net = validate_schema(&minimal()).unwrap();
        assert_eq!(net.places()["p1"], "idle");
        assert_eq!(net.arcs().len(), 1);
        assert_eq!(net.initial()["p1"], 1);
    }

    #[test]
    fn rejects_non_object_root() {
        let err = validate_schema(&json!([1, 2])).unwrap_err();
        assert_eq!(err.path, "$");
        assert!(err.reason.contains("expected object, found array"));
    }

    #[test]
    fn rejects_missing_key() {
        let mut doc = minimal();
        doc.as_object_mut().unwrap().remove("arcs");
        let err = validate_schema(&doc).unwrap_err();
        assert_eq!(err.reason, "missing required key 'arcs'");
    }

    #[test]
    fn rejects_unknown_top_level_key() {
        let mut doc = minimal();
        doc["comment"] = json!("generated");
        let err = validate_schema(&doc).unwrap_err();
        assert_eq!(err.path, "$.comment");
        assert_eq!(err.reason, "unknown top-level key");
    }

    #[test]
    fn rejects_non_string_label() {
        let mut doc = minimal();
        doc["transitions"]["t1"] = json!(7);
        let err = validate_schema(&doc).unwrap_err();
        assert_eq!(err.path, "$.transitions.t1");
        assert!(err.reason.contains("found integer"));
    }

    #[test]
    fn rejects_empty_label_and_empty_id() {
        let mut doc = minimal();
        doc["places"]["p1"] = json!("  ");
        assert_eq!(validate_schema(&doc).unwrap_err().reason, "label must not be empty");

        let mut doc = minimal();
        doc["places"][""] = json!("anon");
        assert_eq!(validate_schema(&doc).unwrap_err().path, "$.places.");
    }

    #[test]
    fn reports_arc_index_in_path() {
        let mut doc = minimal();
        doc["arcs"] = json!([{"from": "p1", "to": "t1"}, {"from": "t1"}]);
        let err = validate_schema(&doc).unwrap_err();
        assert_eq!(err.path, "$.arcs[1]");
        assert_eq!(err.reason, "missing required key 'to'");

        doc["arcs"] = json!([{"from": "p1", "to": 3}]);
        assert_eq!(validate_schema(&doc).unwrap_err().path, "$.arcs[0].to");

        doc["arcs"] = json!([{"from": "p1", "to": "t1", "weight": 2}]);
        assert_eq!(validate_schema(&doc).unwrap_err().path, "$.arcs[0].weight");
    }

    #[test]
    fn rejects_fractional_token_count() {
        let mut doc = minimal();
        doc["initial"]["p1"] = json!(1.5);
        let err = validate_schema(&doc).unwrap_err();
        assert_eq!(err.path, "$.initial.p1");
        assert!(err.reason.contains("expected integer, found number"));
    }

    #[test]
    fn leaves_token_domain_to_structure_checks() {
        let mut doc = minimal();
        doc["initial"]["p1"] = json!(0);
        let net = validate_schema(&doc).unwrap();
        assert_eq!(net.initial()["p1"], 0);
    }

    #[test]
    fn preserves_declaration_order() {
        let doc = json!({
            "places": {"z": "last", "a": "first"},
            "transitions": {"t": "go"},
            "arcs": [],
            "initial": {}
        });
        let net = validate_schema(&doc).unwrap();
        let keys: Vec<_> = net.places().keys().cloned().collect();
        assert_eq!(keys, vec!["z", "a"]);
    }
}
