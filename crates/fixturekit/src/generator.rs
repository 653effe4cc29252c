//! Staged generation.
//!
//! [`StagedGenerator`] owns the whole run state: the node list, the ledger,
//! the pending pod pool and whatever has been emitted so far. Each call to
//! `next` packs the nodes entering one stage and yields that stage's output.
//! Stages run strictly in order because each one consumes ledger capacity
//! and pods that the next one would otherwise see.

use crate::ledger::Ledger;
use crate::packer::{NodeSlice, Packer, Placement, PlacementMiss};
use crate::progress::{NoProgress, ProgressReporter};
use crate::quantity::unit_mismatches;
use crate::record::{NodeRecord, PodRecord};
use crate::stages::{StagePlan, plan_stages};
use log::{debug, info, warn};
use serde::{Deserialize, Serialize};
use serde_yaml::Value;
use std::fmt;
use std::iter::FusedIterator;

/// Which records a stage output carries.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum OutputMode {
    /// Everything emitted so far, so each stage file is a full snapshot
    Cumulative,
    /// Only the nodes and pods this stage added
    Delta,
}

impl fmt::Display for OutputMode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            OutputMode::Cumulative => write!(f, "cumulative"),
            OutputMode::Delta => write!(f, "delta"),
        }
    }
}

/// Where the generator is in its run.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum GeneratorState {
    /// Inputs loaded, no stage produced yet
    Loading,
    /// Stage `n` (zero-based) was the last one produced
    Stage(usize),
    /// Every stage has been produced
    Done,
}

/// Output of one stage.
#[derive(Debug, Clone)]
pub struct StageOutput {
    /// Zero-based stage index
    pub index: usize,
    pub plan: StagePlan,
    /// Node documents for this stage's file
    pub nodes: Vec<Value>,
    /// Pod documents for this stage's file
    pub pods: Vec<Value>,
    /// Pods placed in this stage only, regardless of mode
    pub placements: Vec<Placement>,
    pub misses: Vec<PlacementMiss>,
    /// Pods still pending after this stage
    pub pending: usize,
}

impl StageOutput {
    pub fn node_count(&self) -> usize {
        self.plan.node_count()
    }
}

pub struct StagedGenerator<'p> {
    nodes: Vec<NodeRecord>,
    pending: Vec<PodRecord>,
    ledger: Ledger,
    packer: Packer,
    mode: OutputMode,
    plans: Vec<StagePlan>,
    state: GeneratorState,
    emitted_nodes: Vec<Value>,
    emitted_pods: Vec<Value>,
    progress: Box<dyn ProgressReporter + 'p>,
}

impl<'p> StagedGenerator<'p> {
    /// Set up a run over `nodes` and `pods` with stages of `step` nodes.
    ///
    /// A `step` of zero produces a single stage covering every node.
    pub fn new(
        nodes: Vec<NodeRecord>,
        pods: Vec<PodRecord>,
        step: usize,
        packer: Packer,
        mode: OutputMode,
    ) -> Self {
        for mismatch in unit_mismatches(
            nodes.iter().map(|n| &n.units),
            pods.iter().map(|p| &p.units),
        ) {
            warn!("{mismatch}; quantities are compared as raw magnitudes");
        }

        let plans = plan_stages(nodes.len(), step);
        info!(
            "{} nodes, {} pods, {} stage(s), {} output, {} on miss",
            nodes.len(),
            pods.len(),
            plans.len(),
            mode,
            packer.policy()
        );

        Self {
            ledger: Ledger::initialize(&nodes),
            nodes,
            pending: pods,
            packer,
            mode,
            plans,
            state: GeneratorState::Loading,
            emitted_nodes: Vec::new(),
            emitted_pods: Vec::new(),
            progress: Box::new(NoProgress),
        }
    }

    /// Report progress to `progress` while generating.
    pub fn with_progress(mut self, progress: impl ProgressReporter + 'p) -> Self {
        self.progress = Box::new(progress);
        self
    }

    pub fn plans(&self) -> &[StagePlan] {
        &self.plans
    }

    pub fn state(&self) -> GeneratorState {
        self.state
    }

    pub fn mode(&self) -> OutputMode {
        self.mode
    }

    pub fn packer(&self) -> &Packer {
        &self.packer
    }

    pub fn ledger(&self) -> &Ledger {
        &self.ledger
    }

    /// Pods not placed yet.
    pub fn pending(&self) -> &[PodRecord] {
        &self.pending
    }

    fn run_stage(&mut self, index: usize, plan: StagePlan) -> StageOutput {
        self.progress
            .tick(&format!("stage {} of {}: nodes {plan}", index + 1, self.plans.len()));

        let pending = std::mem::take(&mut self.pending);
        let outcome = self.packer.pack(
            NodeSlice::new(plan.start, &self.nodes[plan.start..plan.end]),
            pending,
            &mut self.ledger,
            self.progress.as_mut(),
        );
        self.pending = outcome.unassigned;

        for miss in &outcome.misses {
            debug!(
                "stage {}: pod #{} ({}) left pending",
                index + 1,
                miss.pod,
                miss.request
            );
        }

        let new_nodes: Vec<Value> = outcome.nodes.into_iter().map(|n| n.doc).collect();
        let new_pods: Vec<Value> = outcome.pods.into_iter().map(|p| p.doc).collect();
        let (nodes, pods) = match self.mode {
            OutputMode::Delta => (new_nodes, new_pods),
            OutputMode::Cumulative => {
                self.emitted_nodes.extend(new_nodes);
                self.emitted_pods.extend(new_pods);
                (self.emitted_nodes.clone(), self.emitted_pods.clone())
            }
        };

        info!(
            "stage {} {plan}: {} pods placed, {} pending",
            index + 1,
            outcome.placements.len(),
            self.pending.len()
        );

        StageOutput {
            index,
            plan,
            nodes,
            pods,
            placements: outcome.placements,
            misses: outcome.misses,
            pending: self.pending.len(),
        }
    }
}

impl Iterator for StagedGenerator<'_> {
    type Item = StageOutput;

    fn next(&mut self) -> Option<StageOutput> {
        let index = match self.state {
            GeneratorState::Loading => 0,
            GeneratorState::Stage(i) => i + 1,
            GeneratorState::Done => return None,
        };
        let Some(plan) = self.plans.get(index).copied() else {
            self.state = GeneratorState::Done;
            return None;
        };

        let output = self.run_stage(index, plan);
        self.state = if index + 1 == self.plans.len() {
            GeneratorState::Done
        } else {
            GeneratorState::Stage(index)
        };
        Some(output)
    }

    fn size_hint(&self) -> (usize, Option<usize>) {
        let remaining = match self.state {
            GeneratorState::Loading => self.plans.len(),
            GeneratorState::Stage(i) => self.plans.len() - i - 1,
            GeneratorState::Done => 0,
        };
        (remaining, Some(remaining))
    }
}

impl FusedIterator for StagedGenerator<'_> {}

/// Start a run with the output mode the packer's node variant implies.
pub fn generate<'p>(
    nodes: Vec<NodeRecord>,
    pods: Vec<PodRecord>,
    step: usize,
    packer: Packer,
) -> StagedGenerator<'p> {
    let mode = if packer.node_variant().routes_per_stage() {
        OutputMode::Delta
    } else {
        OutputMode::Cumulative
    };
    StagedGenerator::new(nodes, pods, step, packer, mode)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::document::to_stream;
    use crate::packer::MissPolicy;
    use crate::quantity::Resources;
    use crate::record::fixtures::{node, pod};
    use crate::transform::{NodeVariant, PodVariant};
    use std::collections::{HashMap, HashSet};

    fn packer(policy: MissPolicy) -> Packer {
        Packer::new(NodeVariant::Passthrough, PodVariant::Passthrough, policy)
    }

    /// Nodes of varied size and a pod pool larger than the cluster can hold.
    fn cluster(node_count: usize, pod_count: usize) -> (Vec<NodeRecord>, Vec<PodRecord>) {
        let nodes = (0..node_count)
            .map(|i| node(&format!("n{i}"), 1000 + (i as u64 % 3) * 1000, 2048 + (i as u64 % 4) * 1024))
            .collect();
        let pods = (0..pod_count)
            .map(|i| pod(i, &format!("p{i}"), 100 + (i as u64 % 7) * 150, 128 + (i as u64 % 5) * 300))
            .collect();
        (nodes, pods)
    }

    #[test]
    fn test_state_machine() {
        let (nodes, pods) = cluster(10, 20);
        let mut generator = StagedGenerator::new(nodes, pods, 4, packer(MissPolicy::Skip), OutputMode::Delta);

        assert_eq!(generator.state(), GeneratorState::Loading);
        assert_eq!(generator.size_hint(), (3, Some(3)));
        assert!(generator.next().is_some());
        assert_eq!(generator.state(), GeneratorState::Stage(0));
        assert!(generator.next().is_some());
        assert_eq!(generator.state(), GeneratorState::Stage(1));
        let last = generator.next().unwrap();
        assert_eq!(last.plan, StagePlan { start: 8, end: 10, step: 4 });
        assert_eq!(generator.state(), GeneratorState::Done);
        assert!(generator.next().is_none());
        assert!(generator.next().is_none());
    }

    #[test]
    fn test_no_nodes_goes_straight_to_done() {
        let mut generator = StagedGenerator::new(
            Vec::new(),
            vec![pod(0, "p", 1, 1)],
            10,
            packer(MissPolicy::Skip),
            OutputMode::Cumulative,
        );
        assert!(generator.next().is_none());
        assert_eq!(generator.state(), GeneratorState::Done);
        assert_eq!(generator.pending().len(), 1);
    }

    #[test]
    fn test_capacity_invariant() {
        let (nodes, pods) = cluster(25, 400);
        let capacity: Vec<Resources> = nodes.iter().map(|n| n.capacity).collect();
        let requests: HashMap<usize, Resources> = pods.iter().map(|p| (p.ordinal, p.request)).collect();

        let mut used = vec![Resources::default(); capacity.len()];
        for stage in StagedGenerator::new(nodes, pods, 7, packer(MissPolicy::Skip), OutputMode::Delta) {
            for placement in &stage.placements {
                let request = requests[&placement.pod];
                used[placement.node].cpu += request.cpu;
                used[placement.node].memory += request.memory;
            }
        }

        for (used, capacity) in used.iter().zip(&capacity) {
            assert!(used.cpu <= capacity.cpu);
            assert!(used.memory <= capacity.memory);
        }
    }

    #[test]
    fn test_placements_stay_inside_stage() {
        let (nodes, pods) = cluster(20, 300);
        for stage in StagedGenerator::new(nodes, pods, 6, packer(MissPolicy::Skip), OutputMode::Delta) {
            for placement in &stage.placements {
                assert!(placement.node >= stage.plan.start && placement.node < stage.plan.end);
            }
        }
    }

    #[test]
    fn test_no_double_assignment() {
        let (nodes, pods) = cluster(30, 500);
        let mut seen = HashSet::new();
        let mut generator = StagedGenerator::new(nodes, pods, 8, packer(MissPolicy::Skip), OutputMode::Delta);
        for stage in generator.by_ref() {
            for placement in &stage.placements {
                assert!(seen.insert(placement.pod), "pod #{} placed twice", placement.pod);
            }
            assert_eq!(stage.pods.len(), stage.placements.len());
        }
        for pod in generator.pending() {
            assert!(!seen.contains(&pod.ordinal));
        }
        assert_eq!(seen.len() + generator.pending().len(), 500);
    }

    #[test]
    fn test_node_completeness() {
        let (nodes, pods) = cluster(23, 50);
        let expected: Vec<Value> = nodes.iter().map(|n| n.doc.clone()).collect();

        let delta: Vec<Value> = StagedGenerator::new(
            nodes.clone(),
            pods.clone(),
            5,
            packer(MissPolicy::Skip),
            OutputMode::Delta,
        )
        .flat_map(|stage| stage.nodes)
        .collect();
        assert_eq!(delta, expected);

        let last = StagedGenerator::new(nodes, pods, 5, packer(MissPolicy::Skip), OutputMode::Cumulative)
            .last()
            .unwrap();
        assert_eq!(last.nodes, expected);
        assert_eq!(last.node_count(), 23);
    }

    #[test]
    fn test_cumulative_output_grows() {
        let (nodes, pods) = cluster(9, 200);
        let stages: Vec<StageOutput> =
            StagedGenerator::new(nodes, pods, 3, packer(MissPolicy::Skip), OutputMode::Cumulative).collect();

        let mut placed = 0;
        for (i, stage) in stages.iter().enumerate() {
            placed += stage.placements.len();
            assert_eq!(stage.nodes.len(), (i + 1) * 3);
            assert_eq!(stage.pods.len(), placed);
        }
        assert!(stages[1].pods.starts_with(&stages[0].pods));
    }

    #[test]
    fn test_frozen_nodes_not_revisited() {
        // "small" is never tried in stage 1 because placement stops at "big";
        // in stage 2 only node b is scanned, although a still has room
        let nodes = vec![node("a", 1000, 1000), node("b", 2000, 2000)];
        let pods = vec![
            pod(0, "p0", 900, 900),
            pod(1, "big", 2000, 2000),
            pod(2, "small", 50, 50),
        ];
        let mut generator =
            StagedGenerator::new(nodes, pods, 1, packer(MissPolicy::Stop), OutputMode::Delta);
        let stages: Vec<StageOutput> = generator.by_ref().collect();

        assert_eq!(stages[0].placements, [Placement { pod: 0, node: 0 }]);
        assert_eq!(stages[1].placements, [Placement { pod: 1, node: 1 }]);
        assert_eq!(stages[1].pending, 1);
        assert_eq!(generator.ledger().remaining(0), Some(Resources::new(100, 100)));
        assert_eq!(generator.pending()[0].ordinal, 2);
    }

    #[test]
    fn test_determinism() {
        let run = || {
            let (nodes, pods) = cluster(17, 150);
            StagedGenerator::new(nodes, pods, 5, packer(MissPolicy::Skip), OutputMode::Cumulative)
                .map(|stage| {
                    (
                        to_stream(&stage.nodes).unwrap(),
                        to_stream(&stage.pods).unwrap(),
                    )
                })
                .collect::<Vec<_>>()
        };
        assert_eq!(run(), run());
    }

    #[test]
    fn test_progress_does_not_change_results() {
        struct Recorder(Vec<String>);
        impl ProgressReporter for &mut Recorder {
            fn tick(&mut self, message: &str) {
                self.0.push(message.to_string());
            }
        }

        let (nodes, pods) = cluster(12, 100);
        let plain: Vec<Vec<Placement>> = StagedGenerator::new(
            nodes.clone(),
            pods.clone(),
            4,
            packer(MissPolicy::Skip),
            OutputMode::Delta,
        )
        .map(|s| s.placements)
        .collect();

        let mut recorder = Recorder(Vec::new());
        let reported: Vec<Vec<Placement>> =
            StagedGenerator::new(nodes, pods, 4, packer(MissPolicy::Skip), OutputMode::Delta)
                .with_progress(&mut recorder)
                .map(|s| s.placements)
                .collect();

        assert_eq!(plain, reported);
        assert_eq!(recorder.0.len(), 3);
        assert!(recorder.0[0].starts_with("stage 1 of 3"));
    }

    #[test]
    fn test_stop_policy_per_stage() {
        let nodes = vec![node("a", 100, 100), node("b", 1000, 1000)];
        let pods = vec![pod(0, "p0", 50, 50), pod(1, "big", 500, 500), pod(2, "p2", 10, 10)];
        let stages: Vec<StageOutput> =
            StagedGenerator::new(nodes, pods, 1, packer(MissPolicy::Stop), OutputMode::Delta).collect();

        // stage 1 stops at "big", stage 2 picks it and the rest up
        assert_eq!(stages[0].placements, [Placement { pod: 0, node: 0 }]);
        assert_eq!(
            stages[1].placements,
            [Placement { pod: 1, node: 1 }, Placement { pod: 2, node: 1 }]
        );
    }

    #[test]
    fn test_generate_picks_mode_from_variant() {
        let simulator = Packer::new(NodeVariant::SimulatorNode, PodVariant::Passthrough, MissPolicy::Skip);
        assert_eq!(generate(Vec::new(), Vec::new(), 0, simulator).mode(), OutputMode::Delta);
        assert_eq!(
            generate(Vec::new(), Vec::new(), 0, packer(MissPolicy::Skip)).mode(),
            OutputMode::Cumulative
        );
    }
}
