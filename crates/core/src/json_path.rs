//! Paths into parsed JSON documents.

use crate::source::DataSource;
use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::fmt;

/// One traversal step: an object key or an array index.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(untagged)]
pub enum PathSegment {
    Index(usize),
    Key(String),
}

impl From<&str> for PathSegment {
    fn from(key: &str) -> Self {
        PathSegment::Key(key.to_string())
    }
}

impl From<String> for PathSegment {
    fn from(key: String) -> Self {
        PathSegment::Key(key)
    }
}

impl From<usize> for PathSegment {
    fn from(index: usize) -> Self {
        PathSegment::Index(index)
    }
}

impl fmt::Display for PathSegment {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            PathSegment::Index(index) => write!(f, "[{index}]"),
            PathSegment::Key(key) => write!(f, ".{key}"),
        }
    }
}

/// Build a path from mixed keys and indices: `json_path!["a", 0, "b"]`.
#[macro_export]
macro_rules! json_path {
    ($($segment:expr),* $(,)?) => {
        vec![$($crate::json_path::PathSegment::from($segment)),*]
    };
}

/// Walk `path` from `data`. Any step that does not fit the value at hand
/// (index into an object, key into an array, anything into a scalar,
/// out-of-range index, missing key) yields `None`.
pub fn lookup<'a>(data: &'a Value, path: &[PathSegment]) -> Option<&'a Value> {
    path.iter().try_fold(data, |current, segment| match (current, segment) {
        (Value::Array(items), PathSegment::Index(index)) => items.get(*index),
        (Value::Object(map), PathSegment::Key(key)) => map.get(key),
        _ => None,
    })
}

/// Mutable counterpart of [`lookup`].
pub fn lookup_mut<'a>(data: &'a mut Value, path: &[PathSegment]) -> Option<&'a mut Value> {
    path.iter().try_fold(data, |current, segment| match (current, segment) {
        (Value::Array(items), PathSegment::Index(index)) => items.get_mut(*index),
        (Value::Object(map), PathSegment::Key(key)) => map.get_mut(key),
        _ => None,
    })
}

/// Text projection of a JSON value: strings verbatim, `null` as absent,
/// everything else as compact JSON.
pub fn project(value: &Value) -> Option<String> {
    match value {
        Value::Null => None,
        Value::String(text) => Some(text.clone()),
        Value::Number(number) => Some(number.to_string()),
        other => serde_json::to_string(other).ok(),
    }
}

/// A string leaf of a JSON document.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct JsonField {
    pub value: String,
    pub path: Vec<PathSegment>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub source: Option<DataSource>,
}

/// Every string leaf of `data`, in document order.
pub fn string_leaves(data: &Value) -> Vec<JsonField> {
    let mut fields = Vec::new();
    collect_leaves(data, &mut Vec::new(), &mut fields);
    fields
}

fn collect_leaves(data: &Value, path: &mut Vec<PathSegment>, fields: &mut Vec<JsonField>) {
    match data {
        Value::Object(map) => {
            for (key, value) in map {
                path.push(PathSegment::Key(key.clone()));
                collect_leaves(value, path, fields);
                path.pop();
            }
        }
        Value::Array(items) => {
            for (index, value) in items.iter().enumerate() {
                path.push(PathSegment::Index(index));
                collect_leaves(value, path, fields);
                path.pop();
            }
        }
        Value::String(text) => fields.push(JsonField {
            value: text.clone(),
            path: path.clone(),
            source: None,
        }),
        // Numbers, booleans and null are never treated as tokens
        _ => {}
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn sample() -> Value {
        json!({"json_key": [{"key3": "test"}, "test2", 2, false], "key2": null})
    }

    #[test]
    fn lookup_follows_keys_and_indices() {
        let data = sample();
        assert_eq!(lookup(&data, &json_path!["json_key", 0, "key3"]), Some(&json!("test")));
        assert_eq!(lookup(&data, &json_path!["json_key", 2]), Some(&json!(2)));
        assert_eq!(lookup(&data, &[]), Some(&data));
    }

    #[test]
    fn lookup_rejects_mismatched_steps() {
        let data = sample();
        assert_eq!(lookup(&data, &json_path!["json_key", 4]), None);
        assert_eq!(lookup(&data, &json_path!["json_key", 0, 0]), None);
        assert_eq!(lookup(&data, &json_path!["json_key", 1, 0]), None);
        assert_eq!(lookup(&data, &json_path!["json_key", 2, "invalid"]), None);
        assert_eq!(lookup(&data, &json_path!["key2", 0]), None);
    }

    #[test]
    fn project_renders_scalars_and_containers() {
        assert_eq!(project(&json!(false)).as_deref(), Some("false"));
        assert_eq!(project(&json!(2)).as_deref(), Some("2"));
        assert_eq!(project(&json!({"key3": "test"})).as_deref(), Some(r#"{"key3":"test"}"#));
        assert_eq!(project(&Value::Null), None);
    }

    #[test]
    fn string_leaves_records_paths() {
        let fields = string_leaves(&sample());
        let paths: Vec<_> = fields.iter().map(|f| (f.value.as_str(), f.path.clone())).collect();
        assert_eq!(
            paths,
            vec![
                ("test", json_path!["json_key", 0, "key3"]),
                ("test2", json_path!["json_key", 1]),
            ]
        );
    }

    #[test]
    fn path_serializes_as_plain_array() {
        let path = json_path!["a", 3];
        assert_eq!(serde_json::to_string(&path).unwrap(), r#"["a",3]"#);
    }
}
