//! YAML document streams and field access helpers.

use crate::error::{Error, Result};
use serde::Deserialize;
use serde_yaml::{Mapping, Value};
use std::fs;
use std::path::Path;

/// Load every non-empty document of a multi-document YAML file.
///
/// `limit` truncates the stream after that many documents.
pub fn load_stream(path: &Path, limit: Option<usize>) -> Result<Vec<Value>> {
    let content = fs::read_to_string(path).map_err(|e| Error::Load {
        path: path.to_path_buf(),
        message: e.to_string(),
    })?;
    parse_stream(&content, limit).map_err(|e| Error::Load {
        path: path.to_path_buf(),
        message: e.to_string(),
    })
}

/// Load a single YAML document.
pub fn load_single(path: &Path) -> Result<Value> {
    let content = fs::read_to_string(path).map_err(|e| Error::Load {
        path: path.to_path_buf(),
        message: e.to_string(),
    })?;
    serde_yaml::from_str(&content).map_err(|e| Error::Load {
        path: path.to_path_buf(),
        message: e.to_string(),
    })
}

/// Parse a multi-document YAML string, skipping empty documents.
pub fn parse_stream(content: &str, limit: Option<usize>) -> Result<Vec<Value>> {
    let mut documents = Vec::new();
    for document in serde_yaml::Deserializer::from_str(content) {
        if limit.is_some_and(|n| documents.len() >= n) {
            break;
        }
        let value = Value::deserialize(document)?;
        if !value.is_null() {
            documents.push(value);
        }
    }
    Ok(documents)
}

/// Serialize documents as a stream, each one preceded by `---`.
pub fn to_stream<'a>(documents: impl IntoIterator<Item = &'a Value>) -> Result<String> {
    let mut out = String::new();
    for document in documents {
        out.push_str("---\n");
        out.push_str(&serde_yaml::to_string(document)?);
    }
    Ok(out)
}

/// Follow a path of mapping keys.
pub fn lookup<'a>(value: &'a Value, path: &[&str]) -> Option<&'a Value> {
    path.iter().try_fold(value, |current, key| current.get(*key))
}

/// Get the child at `key`, turning `value` into a mapping and inserting a null
/// child as needed.
pub fn child_mut<'a>(value: &'a mut Value, key: &str) -> &'a mut Value {
    if !value.is_mapping() {
        *value = Value::Mapping(Mapping::new());
    }
    let Value::Mapping(map) = value else {
        unreachable!("value was just made a mapping");
    };
    map.entry(Value::from(key)).or_insert(Value::Null)
}

/// [`child_mut`] along a whole path.
pub fn path_mut<'a>(value: &'a mut Value, path: &[&str]) -> &'a mut Value {
    path.iter().fold(value, |current, key| child_mut(current, key))
}

/// First element of `spec.containers`, if present.
pub fn first_container(doc: &Value) -> Option<&Value> {
    lookup(doc, &["spec", "containers"])?
        .as_sequence()?
        .first()
}

/// Mutable first element of `spec.containers`, if present.
pub fn first_container_mut(doc: &mut Value) -> Option<&mut Value> {
    doc.get_mut("spec")?
        .get_mut("containers")?
        .as_sequence_mut()?
        .first_mut()
}

/// Render a scalar the way it appears in a `key=value` list.
pub fn scalar_to_string(value: &Value) -> String {
    match value {
        Value::String(s) => s.clone(),
        Value::Number(n) => n.to_string(),
        Value::Bool(b) => b.to_string(),
        Value::Null => String::new(),
        other => serde_yaml::to_string(other)
            .map(|s| s.trim_end().to_string())
            .unwrap_or_default(),
    }
}

/// Comma-joined `key=value` pairs of a mapping, in document order.
pub fn join_pairs(value: Option<&Value>) -> String {
    value
        .and_then(Value::as_mapping)
        .map(|map| {
            map.iter()
                .map(|(k, v)| format!("{}={}", scalar_to_string(k), scalar_to_string(v)))
                .collect::<Vec<_>>()
                .join(",")
        })
        .unwrap_or_default()
}
