//! First-fit packing of pods onto a slice of nodes.

use crate::ledger::Ledger;
use crate::progress::ProgressReporter;
use crate::quantity::Resources;
use crate::record::{NodeRecord, PodRecord};
use crate::transform::{NodeVariant, PodVariant};
use log::{debug, trace};
use serde::{Deserialize, Serialize};
use std::fmt;

/// Pods between progress ticks.
const TICK_EVERY: usize = 512;

/// What to do with the remaining pods once one pod fits no node.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum MissPolicy {
    /// Leave the pod unplaced and keep going with the next one
    #[default]
    #[serde(alias = "skip-and-continue")]
    Skip,
    /// Stop placing pods for this stage at the first miss
    #[serde(alias = "stop-at-first-miss")]
    Stop,
}

impl fmt::Display for MissPolicy {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            MissPolicy::Skip => write!(f, "skip-and-continue"),
            MissPolicy::Stop => write!(f, "stop-at-first-miss"),
        }
    }
}

/// A pod placed on a node. `node` is the node's index in the full node list.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Placement {
    pub pod: usize,
    pub node: usize,
}

/// A pod that fit no node of the slice.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PlacementMiss {
    pub pod: usize,
    pub name: Option<String>,
    pub request: Resources,
}

/// Result of packing one node slice.
#[derive(Debug, Default)]
pub struct PackOutcome {
    /// Transformed nodes of the slice, in input order
    pub nodes: Vec<NodeRecord>,
    /// Transformed pods that were placed, in input order
    pub pods: Vec<PodRecord>,
    /// Pods still pending, in input order
    pub unassigned: Vec<PodRecord>,
    /// One entry per placed pod, aligned with `pods`
    pub placements: Vec<Placement>,
    pub misses: Vec<PlacementMiss>,
}

/// A contiguous run of nodes and where it starts in the full node list.
#[derive(Debug, Clone, Copy)]
pub struct NodeSlice<'a> {
    pub offset: usize,
    pub nodes: &'a [NodeRecord],
}

impl<'a> NodeSlice<'a> {
    pub fn new(offset: usize, nodes: &'a [NodeRecord]) -> Self {
        Self { offset, nodes }
    }

    fn range(&self) -> std::ops::Range<usize> {
        self.offset..self.offset + self.nodes.len()
    }
}

/// First-fit packer configured for one backend.
#[derive(Debug, Clone)]
pub struct Packer {
    node_variant: NodeVariant,
    pod_variant: PodVariant,
    policy: MissPolicy,
}

impl Packer {
    pub fn new(node_variant: NodeVariant, pod_variant: PodVariant, policy: MissPolicy) -> Self {
        Self {
            node_variant,
            pod_variant,
            policy,
        }
    }

    pub fn node_variant(&self) -> &NodeVariant {
        &self.node_variant
    }

    pub fn pod_variant(&self) -> PodVariant {
        self.pod_variant
    }

    pub fn policy(&self) -> MissPolicy {
        self.policy
    }

    /// Pack `pending` onto `slice`.
    ///
    /// Every node of the slice is transformed and emitted. Each pod, in
    /// order, is transformed before its placement is known and then placed
    /// on the first node of the slice with room in both dimensions. Only
    /// ledger entries inside the slice are scanned.
    pub fn pack(
        &self,
        slice: NodeSlice<'_>,
        pending: Vec<PodRecord>,
        ledger: &mut Ledger,
        progress: &mut dyn ProgressReporter,
    ) -> PackOutcome {
        let mut outcome = PackOutcome {
            nodes: slice
                .nodes
                .iter()
                .cloned()
                .map(|node| self.node_variant.transform_node(node))
                .collect(),
            ..PackOutcome::default()
        };

        let range = slice.range();
        let total = pending.len();
        let mut pods = pending.into_iter();
        let mut seen = 0;

        for pod in pods.by_ref() {
            seen += 1;
            if seen % TICK_EVERY == 0 {
                progress.tick(&format!("placed {} of {total} pods", outcome.pods.len()));
            }

            let pod = self.pod_variant.transform_pod(pod);
            match ledger.first_fit(range.clone(), pod.request) {
                Some(node) => {
                    trace!("{} -> node #{node}", pod.describe());
                    outcome.placements.push(Placement {
                        pod: pod.ordinal,
                        node,
                    });
                    outcome.pods.push(pod);
                }
                None => {
                    debug!("{} fits no node in {range:?} ({})", pod.describe(), pod.request);
                    outcome.misses.push(PlacementMiss {
                        pod: pod.ordinal,
                        name: pod.name.clone(),
                        request: pod.request,
                    });
                    outcome.unassigned.push(pod);
                    if self.policy == MissPolicy::Stop {
                        break;
                    }
                }
            }
        }

        outcome.unassigned.extend(pods);
        outcome
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::progress::NoProgress;
    use crate::record::fixtures::{node, pod};

    fn nodes() -> Vec<NodeRecord> {
        vec![
            node("a", 4000, 8192),
            node("b", 2000, 4096),
            node("c", 1000, 2048),
        ]
    }

    fn pods() -> Vec<PodRecord> {
        vec![
            pod(0, "p1", 1000, 1024),
            pod(1, "p2", 3000, 4096),
            pod(2, "p3", 500, 512),
            pod(3, "p4", 2000, 8192),
        ]
    }

    fn names(pods: &[PodRecord]) -> Vec<&str> {
        pods.iter().filter_map(|p| p.name.as_deref()).collect()
    }

    #[test]
    fn test_first_fit_scenario() {
        let nodes = nodes();
        let mut ledger = Ledger::initialize(&nodes);
        let packer = Packer::new(NodeVariant::Passthrough, PodVariant::Passthrough, MissPolicy::Skip);

        let outcome = packer.pack(NodeSlice::new(0, &nodes), pods(), &mut ledger, &mut NoProgress);

        assert_eq!(names(&outcome.pods), ["p1", "p2", "p3"]);
        assert_eq!(names(&outcome.unassigned), ["p4"]);
        assert_eq!(
            outcome.placements,
            [
                Placement { pod: 0, node: 0 },
                Placement { pod: 1, node: 0 },
                Placement { pod: 2, node: 1 },
            ]
        );
        assert_eq!(ledger.remaining(0), Some(Resources::new(0, 3072)));
        assert_eq!(ledger.remaining(1), Some(Resources::new(1500, 3584)));
        assert_eq!(ledger.remaining(2), Some(Resources::new(1000, 2048)));
        assert_eq!(outcome.misses.len(), 1);
        assert_eq!(outcome.misses[0].pod, 3);
        assert_eq!(outcome.nodes.len(), 3);
    }

    #[test]
    fn test_skip_continues_after_miss() {
        let nodes = vec![node("a", 1000, 1024)];
        let mut ledger = Ledger::initialize(&nodes);
        let packer = Packer::new(NodeVariant::Passthrough, PodVariant::Passthrough, MissPolicy::Skip);
        let pending = vec![pod(0, "big", 5000, 1), pod(1, "small", 100, 1)];

        let outcome = packer.pack(NodeSlice::new(0, &nodes), pending, &mut ledger, &mut NoProgress);

        assert_eq!(names(&outcome.pods), ["small"]);
        assert_eq!(names(&outcome.unassigned), ["big"]);
    }

    #[test]
    fn test_stop_halts_at_first_miss() {
        let nodes = vec![node("a", 1000, 1024)];
        let mut ledger = Ledger::initialize(&nodes);
        let packer = Packer::new(
            NodeVariant::Passthrough,
            PodVariant::FakeNodeToleration,
            MissPolicy::Stop,
        );
        let pending = vec![
            pod(0, "first", 100, 1),
            pod(1, "big", 5000, 1),
            pod(2, "small", 100, 1),
        ];

        let outcome = packer.pack(NodeSlice::new(0, &nodes), pending, &mut ledger, &mut NoProgress);

        assert_eq!(names(&outcome.pods), ["first"]);
        assert_eq!(names(&outcome.unassigned), ["big", "small"]);
        // the missed pod was transformed, the ones after it were never looked at
        assert!(outcome.unassigned[0].doc["spec"].get("tolerations").is_some());
        assert!(outcome.unassigned[1].doc["spec"].get("tolerations").is_none());
        assert_eq!(ledger.remaining(0), Some(Resources::new(900, 1023)));
    }

    #[test]
    fn test_pack_only_scans_slice() {
        let nodes = nodes();
        let mut ledger = Ledger::initialize(&nodes);
        let packer = Packer::new(NodeVariant::Passthrough, PodVariant::Passthrough, MissPolicy::Skip);

        let outcome = packer.pack(
            NodeSlice::new(2, &nodes[2..]),
            vec![pod(0, "p", 1500, 1)],
            &mut ledger,
            &mut NoProgress,
        );

        assert!(outcome.pods.is_empty());
        assert_eq!(ledger.remaining(0), Some(Resources::new(4000, 8192)));
        assert_eq!(outcome.nodes.len(), 1);
        assert_eq!(outcome.nodes[0].name, "c");
    }

    #[test]
    fn test_pod_transform_applies_to_unplaced_pods() {
        let nodes = vec![node("a", 100, 100)];
        let mut ledger = Ledger::initialize(&nodes);
        let packer = Packer::new(
            NodeVariant::FakeNode,
            PodVariant::HollowNodeAffinity,
            MissPolicy::Skip,
        );

        let outcome = packer.pack(
            NodeSlice::new(0, &nodes),
            vec![pod(0, "huge", 1000, 1000)],
            &mut ledger,
            &mut NoProgress,
        );

        assert_eq!(
            outcome.unassigned[0].doc["metadata"]["namespace"],
            serde_yaml::Value::from("kubemark")
        );
        assert!(outcome.nodes[0].doc["spec"]["taints"].is_sequence());
    }

    #[test]
    fn test_progress_ticks() {
        struct Counter(usize);
        impl ProgressReporter for Counter {
            fn tick(&mut self, _message: &str) {
                self.0 += 1;
            }
        }

        let nodes = vec![node("a", 1_000_000, 1_000_000)];
        let mut ledger = Ledger::initialize(&nodes);
        let packer = Packer::new(NodeVariant::Passthrough, PodVariant::Passthrough, MissPolicy::Skip);
        let pending: Vec<_> = (0..TICK_EVERY * 2).map(|i| pod(i, "p", 1, 1)).collect();

        let mut counter = Counter(0);
        let outcome = packer.pack(NodeSlice::new(0, &nodes), pending, &mut ledger, &mut counter);

        assert_eq!(counter.0, 2);
        assert_eq!(outcome.pods.len(), TICK_EVERY * 2);
    }
}
