use std::cmp::Ordering;

use serde::{Deserialize, Serialize};
use treescan_core::{NodeIndex, TimeWindow};
use treescan_llr::Tally;

/// A scored candidate produced during a scan. Borrowed so that replica
/// scans, which only need the maximum, never allocate.
#[derive(Debug, Clone, Copy)]
pub struct Candidate<'a> {
    /// Node owning the candidate; the parent for merged-children cuts.
    pub node: NodeIndex,
    /// Merged children, empty for a node's own branch.
    pub members: &'a [NodeIndex],
    /// Observed cases and measure inside the candidate.
    pub tally: Tally,
    /// Expected cases under the null.
    pub expected: f64,
    /// Log-likelihood ratio.
    pub llr: f64,
    /// Time window for temporal scans.
    pub window: Option<TimeWindow>,
}

/// An observed cut retained in the ranked list.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Cut {
    /// Node owning the cut.
    pub node: NodeIndex,
    /// Merged children, empty for a simple cut.
    pub members: Vec<NodeIndex>,
    /// Observed cases.
    pub cases: i64,
    /// Expected cases under the null.
    pub expected: f64,
    /// Log-likelihood ratio.
    pub llr: f64,
    /// Replicas whose maximum LLR met or exceeded this cut's LLR.
    pub rank: u64,
    /// One based position in the final list.
    pub report_order: usize,
    /// Time window for temporal scans.
    pub window: Option<TimeWindow>,
}

impl Cut {
    /// Converts a candidate into an owned cut with no replicas counted.
    pub fn from_candidate(candidate: &Candidate<'_>) -> Self {
        Self {
            node: candidate.node,
            members: candidate.members.to_vec(),
            cases: candidate.tally.cases,
            expected: candidate.expected,
            llr: candidate.llr,
            rank: 0,
            report_order: 0,
            window: candidate.window,
        }
    }

    /// Observed over expected cases.
    pub fn relative_risk(&self) -> Option<f64> {
        (self.expected > 0.0).then(|| self.cases as f64 / self.expected)
    }

    /// Observed minus expected cases.
    pub fn excess_cases(&self) -> f64 {
        self.cases as f64 - self.expected
    }

    /// Monte Carlo p-value after `replicas` registered replicas.
    pub fn p_value(&self, replicas: usize) -> f64 {
        (self.rank + 1) as f64 / (replicas + 1) as f64
    }

    pub(crate) fn key(&self) -> CutKey<'_> {
        CutKey {
            llr: self.llr,
            node: self.node,
            members: &self.members,
            window: self.window,
        }
    }
}

/// Fields that determine a cut's position in the ranked list.
#[derive(Debug, Clone, Copy)]
pub(crate) struct CutKey<'a> {
    pub(crate) llr: f64,
    pub(crate) node: NodeIndex,
    pub(crate) members: &'a [NodeIndex],
    pub(crate) window: Option<TimeWindow>,
}

impl<'a> From<&Candidate<'a>> for CutKey<'a> {
    fn from(candidate: &Candidate<'a>) -> Self {
        Self {
            llr: candidate.llr,
            node: candidate.node,
            members: candidate.members,
            window: candidate.window,
        }
    }
}

/// Total order of the ranked list: higher LLR first, then lower node index,
/// then fewer merged children, then the lexicographically smaller member
/// list, then the earlier window.
pub(crate) fn rank_order(a: &CutKey<'_>, b: &CutKey<'_>) -> Ordering {
    b.llr
        .total_cmp(&a.llr)
        .then(a.node.cmp(&b.node))
        .then(a.members.len().cmp(&b.members.len()))
        .then_with(|| a.members.cmp(b.members))
        .then(a.window.cmp(&b.window))
}
