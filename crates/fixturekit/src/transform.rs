//! Backend-specific record transforms.
//!
//! Transforms take a record and hand back the shape that gets emitted. They
//! only read the record and, for hollow nodes, the template; the ledger and
//! pod pool are out of their reach.

use crate::document::{child_mut, first_container_mut, path_mut};
use crate::error::{Error, Result};
use crate::record::{NodeRecord, PodRecord};
use serde_yaml::{Mapping, Value};

/// Placeholder in the hollow-node launch command replaced by allocatable resources.
pub const EXTENDED_RESOURCES_TOKEN: &str = "template_node_extended_resources";

/// Annotation and taint key marking a node as fake.
pub const FAKE_NODE_KEY: &str = "kwok.x-k8s.io/node";
pub const FAKE_NODE_VALUE: &str = "fake";

const HOLLOW_POD_IMAGE: &str = "docker.io/busybox:latest";
const HOLLOW_POD_PULL_POLICY: &str = "IfNotPresent";
const HOLLOW_POD_NAMESPACE: &str = "kubemark";
const HOLLOW_NODE_ROLE_KEY: &str = "node-role.kubernetes.io/node";
const HOLLOW_NODE_ROLE_VALUE: &str = "kubemark-node";

/// A validated hollow-node template.
#[derive(Debug, Clone, PartialEq)]
pub struct HollowNodeTemplate {
    doc: Value,
}

impl HollowNodeTemplate {
    /// Validate a template document.
    ///
    /// The first container must carry a `command` list whose last two entries
    /// are strings; those are the arguments the transform extends.
    pub fn new(doc: Value) -> Result<Self> {
        let command = crate::document::first_container(&doc)
            .and_then(|c| c.get("command"))
            .and_then(Value::as_sequence)
            .ok_or_else(|| {
                Error::Template("spec.containers[0].command is missing".to_string())
            })?;
        if command.len() < 2 {
            return Err(Error::Template(format!(
                "launch command needs at least 2 arguments, found {}",
                command.len()
            )));
        }
        if !command[command.len() - 2..].iter().all(Value::is_string) {
            return Err(Error::Template(
                "last two launch command arguments must be strings".to_string(),
            ));
        }
        Ok(Self { doc })
    }

    pub fn document(&self) -> &Value {
        &self.doc
    }

    /// Patch a copy of the template for `node`.
    fn instantiate(&self, node: &NodeRecord) -> Value {
        let mut doc = self.doc.clone();
        *path_mut(&mut doc, &["metadata", "name"]) = Value::from(node.name.as_str());
        *path_mut(&mut doc, &["metadata", "labels", "name"]) = Value::from(node.name.as_str());

        let labels = node.labels_csv();
        let resources = node.allocatable_csv();
        if let Some(command) = first_container_mut(&mut doc)
            .and_then(|c| c.get_mut("command"))
            .and_then(Value::as_sequence_mut)
        {
            let n = command.len();
            if let Some(Value::String(arg)) = command.get_mut(n - 2) {
                arg.push(',');
                arg.push_str(&labels);
            }
            if let Some(Value::String(arg)) = command.get_mut(n - 1) {
                *arg = arg.replace(EXTENDED_RESOURCES_TOKEN, &resources);
            }
        }
        doc
    }
}

/// How nodes are reshaped for a backend.
#[derive(Debug, Clone, PartialEq)]
pub enum NodeVariant {
    /// Emit nodes as loaded
    Passthrough,
    /// Replace each node with a patched copy of a hollow-node template
    HollowNode(HollowNodeTemplate),
    /// Mark nodes as fake with an annotation and a no-schedule taint
    FakeNode,
    /// Emit nodes as loaded; the writer lays out per-stage directories
    SimulatorNode,
}

impl NodeVariant {
    pub fn transform_node(&self, mut node: NodeRecord) -> NodeRecord {
        match self {
            NodeVariant::Passthrough | NodeVariant::SimulatorNode => {}
            NodeVariant::HollowNode(template) => node.doc = template.instantiate(&node),
            NodeVariant::FakeNode => mark_fake(&mut node.doc),
        }
        node
    }

    /// Whether stages go into their own directories with a simulator manifest.
    pub fn routes_per_stage(&self) -> bool {
        matches!(self, NodeVariant::SimulatorNode)
    }

    pub fn name(&self) -> &'static str {
        match self {
            NodeVariant::Passthrough => "passthrough",
            NodeVariant::HollowNode(_) => "hollow-node",
            NodeVariant::FakeNode => "fake-node",
            NodeVariant::SimulatorNode => "simulator-node",
        }
    }
}

/// How pods are reshaped for a backend.
///
/// Every pod transform is idempotent: an unplaced pod stays in the pool and
/// gets transformed again in the next stage.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PodVariant {
    /// Emit pods as loaded
    Passthrough,
    /// Pin pods to hollow nodes and swap in a lightweight image
    HollowNodeAffinity,
    /// Tolerate the fake-node taint
    FakeNodeToleration,
}

impl PodVariant {
    pub fn transform_pod(&self, mut pod: PodRecord) -> PodRecord {
        match self {
            PodVariant::Passthrough => {}
            PodVariant::HollowNodeAffinity => pin_to_hollow_nodes(&mut pod.doc),
            PodVariant::FakeNodeToleration => tolerate_fake(&mut pod.doc),
        }
        pod
    }

    pub fn name(&self) -> &'static str {
        match self {
            PodVariant::Passthrough => "passthrough",
            PodVariant::HollowNodeAffinity => "hollow-node-affinity",
            PodVariant::FakeNodeToleration => "fake-node-toleration",
        }
    }
}

fn fake_node_entry(extra: &[(&str, &str)]) -> Value {
    let mut map = Mapping::new();
    map.insert("key".into(), FAKE_NODE_KEY.into());
    for (k, v) in extra {
        map.insert((*k).into(), (*v).into());
    }
    map.insert("value".into(), FAKE_NODE_VALUE.into());
    map.insert("effect".into(), "NoSchedule".into());
    Value::Mapping(map)
}

/// Append `entry` to the list at `path` unless an equal entry is already there.
fn push_unique(doc: &mut Value, path: &[&str], entry: Value) {
    let list = path_mut(doc, path);
    if !list.is_sequence() {
        *list = Value::Sequence(Vec::new());
    }
    if let Value::Sequence(items) = list
        && !items.contains(&entry)
    {
        items.push(entry);
    }
}

fn mark_fake(doc: &mut Value) {
    *path_mut(doc, &["metadata", "annotations", FAKE_NODE_KEY]) = FAKE_NODE_VALUE.into();
    push_unique(doc, &["spec", "taints"], fake_node_entry(&[]));
}

fn tolerate_fake(doc: &mut Value) {
    push_unique(
        doc,
        &["spec", "tolerations"],
        fake_node_entry(&[("operator", "Equal")]),
    );
}

fn hollow_node_affinity() -> Value {
    let mut expression = Mapping::new();
    expression.insert("key".into(), HOLLOW_NODE_ROLE_KEY.into());
    expression.insert("operator".into(), "In".into());
    expression.insert(
        "values".into(),
        Value::Sequence(vec![HOLLOW_NODE_ROLE_VALUE.into()]),
    );

    let mut term = Mapping::new();
    term.insert(
        "matchExpressions".into(),
        Value::Sequence(vec![Value::Mapping(expression)]),
    );

    let mut required = Mapping::new();
    required.insert(
        "nodeSelectorTerms".into(),
        Value::Sequence(vec![Value::Mapping(term)]),
    );

    let mut node_affinity = Mapping::new();
    node_affinity.insert(
        "requiredDuringSchedulingIgnoredDuringExecution".into(),
        Value::Mapping(required),
    );

    let mut affinity = Mapping::new();
    affinity.insert("nodeAffinity".into(), Value::Mapping(node_affinity));
    Value::Mapping(affinity)
}

fn pin_to_hollow_nodes(doc: &mut Value) {
    if let Some(container) = first_container_mut(doc) {
        *child_mut(container, "imagePullPolicy") = HOLLOW_POD_PULL_POLICY.into();
        *child_mut(container, "image") = HOLLOW_POD_IMAGE.into();
    }
    *path_mut(doc, &["metadata", "namespace"]) = HOLLOW_POD_NAMESPACE.into();
    *path_mut(doc, &["spec", "affinity"]) = hollow_node_affinity();
}
