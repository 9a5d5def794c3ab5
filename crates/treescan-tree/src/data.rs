use treescan_core::NodeIndex;

use crate::simulation::SimulationBuffer;
use crate::tree::TreeModel;

/// Source of branch case counts: the observed tree or a simulated replica.
///
/// Expectations always come from the [`TreeModel`]; only cases (and, for the
/// signed-rank model, site signs) differ between observed and simulated data.
pub trait BranchCounts {
    /// Branch cases of a node.
    fn branch_cases(&self, node: NodeIndex) -> i64;

    /// Cumulative branch cases of a node per time interval.
    fn branch_cases_cumulative(&self, node: NodeIndex) -> &[i64];

    /// Sign applied to the differences observed at a site.
    fn site_sign(&self, site: usize) -> f64;
}

impl BranchCounts for TreeModel {
    fn branch_cases(&self, node: NodeIndex) -> i64 {
        self.node(node).branch_cases()
    }

    fn branch_cases_cumulative(&self, node: NodeIndex) -> &[i64] {
        self.node(node).branch_cases_cumulative()
    }

    fn site_sign(&self, _site: usize) -> f64 {
        1.0
    }
}

impl BranchCounts for SimulationBuffer {
    fn branch_cases(&self, node: NodeIndex) -> i64 {
        self.node(node).branch_cases()
    }

    fn branch_cases_cumulative(&self, node: NodeIndex) -> &[i64] {
        self.node(node).branch_cases_cumulative()
    }

    fn site_sign(&self, site: usize) -> f64 {
        SimulationBuffer::site_sign(self, site)
    }
}
