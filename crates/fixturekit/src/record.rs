//! Node and pod records.
//!
//! A record keeps its whole source document next to the few fields the
//! engine reads. Everything else in the document is opaque and passes through
//! untouched unless a transform overwrites it.

use crate::document::{self, first_container, lookup};
use crate::error::{Error, Result};
use crate::quantity::{Quantity, ResourceUnits, Resources};
use serde_yaml::Value;

const CAPACITY_CPU: &[&str] = &["status", "capacity", "cpu"];
const CAPACITY_MEMORY: &[&str] = &["status", "capacity", "memory"];
const REQUEST_PREFIX: &str = "spec.containers[0].resources.requests";

/// A node description with its parsed capacity.
#[derive(Debug, Clone, PartialEq)]
pub struct NodeRecord {
    pub name: String,
    pub capacity: Resources,
    pub units: ResourceUnits,
    pub doc: Value,
}

impl NodeRecord {
    /// Build a record from a node document.
    ///
    /// `ordinal` is the document's position in its stream, used in errors.
    pub fn from_document(doc: Value, ordinal: usize) -> Result<Self> {
        let name = lookup(&doc, &["metadata", "name"])
            .and_then(Value::as_str)
            .ok_or_else(|| Error::MissingField {
                record: format!("node #{ordinal}"),
                field: "metadata.name".to_string(),
            })?
            .to_string();
        let record = format!("node {name}");

        let cpu = quantity_at(&doc, CAPACITY_CPU, &record)?;
        let memory = quantity_at(&doc, CAPACITY_MEMORY, &record)?;

        Ok(Self {
            name,
            capacity: Resources::new(cpu.value, memory.value),
            units: ResourceUnits {
                cpu: cpu.unit,
                memory: memory.unit,
            },
            doc,
        })
    }

    /// Labels from `metadata.labels`, rendered `key=value` and comma-joined.
    pub fn labels_csv(&self) -> String {
        document::join_pairs(lookup(&self.doc, &["metadata", "labels"]))
    }

    /// Allocatable resources from `status.allocatable`, rendered `key=value`
    /// and comma-joined.
    pub fn allocatable_csv(&self) -> String {
        document::join_pairs(lookup(&self.doc, &["status", "allocatable"]))
    }
}

/// A pod description with its parsed request.
#[derive(Debug, Clone, PartialEq)]
pub struct PodRecord {
    /// Position in the input pod stream; the pod's identity within a run.
    pub ordinal: usize,
    pub name: Option<String>,
    pub request: Resources,
    pub units: ResourceUnits,
    pub doc: Value,
}

impl PodRecord {
    pub fn from_document(doc: Value, ordinal: usize) -> Result<Self> {
        let name = lookup(&doc, &["metadata", "name"])
            .and_then(Value::as_str)
            .map(str::to_string);
        let record = match &name {
            Some(n) => format!("pod #{ordinal} ({n})"),
            None => format!("pod #{ordinal}"),
        };

        let requests = first_container(&doc)
            .and_then(|c| lookup(c, &["resources", "requests"]))
            .ok_or_else(|| Error::MissingField {
                record: record.clone(),
                field: REQUEST_PREFIX.to_string(),
            })?;

        let parse = |key: &str| -> Result<Quantity> {
            let field = format!("{REQUEST_PREFIX}.{key}");
            let raw = requests.get(key).ok_or_else(|| Error::MissingField {
                record: record.clone(),
                field: field.clone(),
            })?;
            Quantity::parse(raw, &record, &field)
        };
        let cpu = parse("cpu")?;
        let memory = parse("memory")?;

        Ok(Self {
            ordinal,
            name,
            request: Resources::new(cpu.value, memory.value),
            units: ResourceUnits {
                cpu: cpu.unit,
                memory: memory.unit,
            },
            doc,
        })
    }

    /// Short description for logs.
    pub fn describe(&self) -> String {
        match &self.name {
            Some(n) => format!("pod #{} ({n})", self.ordinal),
            None => format!("pod #{}", self.ordinal),
        }
    }
}

fn quantity_at(doc: &Value, path: &[&str], record: &str) -> Result<Quantity> {
    let field = path.join(".");
    let raw = lookup(doc, path).ok_or_else(|| Error::MissingField {
        record: record.to_string(),
        field: field.clone(),
    })?;
    Quantity::parse(raw, record, &field)
}

/// Parse node documents in order.
pub fn nodes_from_documents(docs: Vec<Value>) -> Result<Vec<NodeRecord>> {
    docs.into_iter()
        .enumerate()
        .map(|(i, doc)| NodeRecord::from_document(doc, i))
        .collect()
}

/// Parse pod documents in order; each pod's ordinal is its stream position.
pub fn pods_from_documents(docs: Vec<Value>) -> Result<Vec<PodRecord>> {
    docs.into_iter()
        .enumerate()
        .map(|(i, doc)| PodRecord::from_document(doc, i))
        .collect()
}
