//! Partitioning of the node list into stages.

use std::fmt;

/// A contiguous node range emitted as one snapshot.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct StagePlan {
    pub start: usize,
    pub end: usize,
    pub step: usize,
}

impl StagePlan {
    /// Cumulative node count once this stage is emitted.
    pub fn node_count(&self) -> usize {
        self.end
    }

    /// Nodes entering the run in this stage.
    pub fn len(&self) -> usize {
        self.end - self.start
    }

    pub fn is_empty(&self) -> bool {
        self.start == self.end
    }
}

impl fmt::Display for StagePlan {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "[{}, {})", self.start, self.end)
    }
}

/// Split `total` nodes into stages of `step`.
///
/// A `step` of zero means a single stage. A stage starting at `s` snaps to
/// `total` when at most one step of nodes remains, so the last stage always
/// ends exactly at `total` and no stage overruns it.
pub fn plan_stages(total: usize, step: usize) -> Vec<StagePlan> {
    let step = if step == 0 { total } else { step };
    let mut plans = Vec::new();
    let mut start = 0;

    while start < total {
        let end = if total - start <= step {
            total
        } else {
            start + step
        };
        plans.push(StagePlan { start, end, step });
        start = end;
    }
    plans
}
