use std::collections::TryReserveError;

use treescan_core::errors::{ErrorInfo, ScanError};
use treescan_core::NodeIndex;

use crate::tree::TreeModel;

/// Simulated internal and branch cases of one node.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct SimulationNode {
    int_c: i64,
    br_c: i64,
    int_c_t: Vec<i64>,
    br_c_t: Vec<i64>,
}

impl SimulationNode {
    /// Simulated internal cases.
    pub fn internal_cases(&self) -> i64 {
        self.int_c
    }

    /// Simulated branch cases.
    pub fn branch_cases(&self) -> i64 {
        self.br_c
    }

    /// Simulated internal cases per interval.
    pub fn internal_cases_series(&self) -> &[i64] {
        &self.int_c_t
    }

    /// Simulated cumulative branch cases per interval.
    pub fn branch_cases_cumulative(&self) -> &[i64] {
        &self.br_c_t
    }
}

fn zeroed<T: Clone + Default>(len: usize) -> Result<Vec<T>, TryReserveError> {
    let mut values = Vec::new();
    values.try_reserve_exact(len)?;
    values.resize(len, T::default());
    Ok(values)
}

fn memory_error(err: TryReserveError, nodes: usize, intervals: usize) -> ScanError {
    ScanError::Memory(
        ErrorInfo::new("simulation-alloc", err.to_string())
            .with_context("nodes", nodes.to_string())
            .with_context("intervals", intervals.to_string())
            .with_hint("lower parallelism so fewer replica buffers are live at once"),
    )
}

/// Per-worker buffer holding one replica's simulated data.
///
/// Buffers mirror the node arena of a [`TreeModel`] and are reused across the
/// replicas a worker evaluates.
#[derive(Debug, Clone)]
pub struct SimulationBuffer {
    nodes: Vec<SimulationNode>,
    intervals: usize,
    site_signs: Vec<f64>,
    stack: Vec<usize>,
}

impl SimulationBuffer {
    /// Allocates a zeroed buffer shaped like `tree`. Allocation failure is
    /// reported as a memory error rather than aborting.
    pub fn new(tree: &TreeModel) -> Result<Self, ScanError> {
        let count = tree.len();
        let intervals = tree.intervals();
        let fail = |err| memory_error(err, count, intervals);
        let mut nodes = Vec::new();
        nodes.try_reserve_exact(count).map_err(fail)?;
        for _ in 0..count {
            nodes.push(SimulationNode {
                int_c: 0,
                br_c: 0,
                int_c_t: zeroed(intervals).map_err(fail)?,
                br_c_t: zeroed(intervals).map_err(fail)?,
            });
        }
        let mut site_signs: Vec<f64> = zeroed(tree.site_count()).map_err(fail)?;
        site_signs.fill(1.0);
        Ok(Self {
            nodes,
            intervals,
            site_signs,
            stack: Vec::new(),
        })
    }

    /// Resets all simulated counts and site signs.
    pub fn clear(&mut self) {
        for node in &mut self.nodes {
            node.int_c = 0;
            node.br_c = 0;
            node.int_c_t.fill(0);
            node.br_c_t.fill(0);
        }
        self.site_signs.fill(1.0);
    }

    /// Number of time intervals per node.
    pub fn intervals(&self) -> usize {
        self.intervals
    }

    /// Simulated node at the given index.
    pub fn node(&self, index: NodeIndex) -> &SimulationNode {
        &self.nodes[index.index()]
    }

    /// All simulated nodes in arena order.
    pub fn nodes(&self) -> &[SimulationNode] {
        &self.nodes
    }

    /// Adds simulated internal cases to a node.
    pub fn add_cases(&mut self, index: NodeIndex, cases: i64) {
        self.nodes[index.index()].int_c += cases;
    }

    /// Adds simulated internal cases at a time interval.
    pub fn add_cases_at(&mut self, index: NodeIndex, interval: usize, cases: i64) {
        let node = &mut self.nodes[index.index()];
        node.int_c += cases;
        node.int_c_t[interval] += cases;
    }

    /// Sets the sign applied to a site's differences; `true` flips it.
    pub fn set_site_flipped(&mut self, site: usize, flipped: bool) {
        self.site_signs[site] = if flipped { -1.0 } else { 1.0 };
    }

    /// Sign applied to a site's differences in this replica.
    pub fn site_sign(&self, site: usize) -> f64 {
        self.site_signs[site]
    }

    /// Signs of every site in this replica.
    pub fn site_signs(&self) -> &[f64] {
        &self.site_signs
    }

    /// Sum of simulated internal cases.
    pub fn total_cases(&self) -> i64 {
        self.nodes.iter().map(|node| node.int_c).sum()
    }

    /// Propagates simulated internal cases to branch totals.
    ///
    /// Nodes flagged `anforlust` add their cases to the precomputed ancestor
    /// set so each ancestor is counted once; every other node walks its parent
    /// links directly.
    pub fn propagate(&mut self, tree: &TreeModel) {
        for node in &mut self.nodes {
            node.br_c = 0;
            node.br_c_t.fill(0);
        }
        for origin in 0..self.nodes.len() {
            if self.nodes[origin].int_c == 0 {
                continue;
            }
            self.add_branch(origin, origin);
            let origin_index = NodeIndex::new(origin);
            if tree.node(origin_index).is_anforlust() {
                for ancestor in tree.ancestors(origin_index) {
                    self.add_branch(origin, ancestor.index());
                }
            } else {
                self.stack.clear();
                self.stack
                    .extend(tree.node(origin_index).parents().iter().map(|p| p.index()));
                while let Some(current) = self.stack.pop() {
                    self.add_branch(origin, current);
                    self.stack.extend(
                        tree.node(NodeIndex::new(current))
                            .parents()
                            .iter()
                            .map(|p| p.index()),
                    );
                }
            }
        }
        for node in &mut self.nodes {
            for t in 1..self.intervals {
                node.br_c_t[t] += node.br_c_t[t - 1];
            }
        }
    }

    fn add_branch(&mut self, origin: usize, target: usize) {
        let cases = self.nodes[origin].int_c;
        self.nodes[target].br_c += cases;
        for t in 0..self.intervals {
            let value = self.nodes[origin].int_c_t[t];
            if value != 0 {
                self.nodes[target].br_c_t[t] += value;
            }
        }
    }
}
