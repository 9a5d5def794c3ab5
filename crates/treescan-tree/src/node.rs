use serde::Serialize;
use treescan_core::{CutType, NodeIndex};

/// Paired observation recorded at a site for the signed-rank model.
#[derive(Debug, Clone, Copy, PartialEq, Serialize)]
pub struct SiteObservation {
    /// Site index shared across nodes.
    pub site: usize,
    /// Baseline measurement.
    pub baseline: f64,
    /// Current measurement.
    pub current: f64,
}

impl SiteObservation {
    /// Signed difference `current - baseline`.
    pub fn difference(&self) -> f64 {
        self.current - self.baseline
    }
}

/// A node of the tree with internal and branch (subtree inclusive) totals.
#[derive(Debug, Clone, Serialize)]
pub struct Node {
    pub(crate) id: String,
    pub(crate) index: NodeIndex,
    pub(crate) parents: Vec<NodeIndex>,
    pub(crate) children: Vec<NodeIndex>,
    pub(crate) level: u32,
    pub(crate) cut_type: Option<CutType>,
    pub(crate) anforlust: bool,
    pub(crate) int_c: i64,
    pub(crate) int_n: f64,
    pub(crate) br_c: i64,
    pub(crate) br_n: f64,
    /// Internal cases per time interval.
    pub(crate) int_c_t: Vec<i64>,
    /// Internal measure per time interval.
    pub(crate) int_n_t: Vec<f64>,
    /// Cumulative branch cases, `br_c_t[t]` covers intervals `0..=t`.
    pub(crate) br_c_t: Vec<i64>,
    /// Cumulative branch measure.
    pub(crate) br_n_t: Vec<f64>,
    /// Last interval at which this node's cases can be observed.
    pub(crate) censor: Option<usize>,
    pub(crate) sites: Vec<SiteObservation>,
    /// Branch sum of site differences, indexed by site.
    pub(crate) br_d: Vec<f64>,
}

impl Node {
    pub(crate) fn new(id: String, index: NodeIndex) -> Self {
        Self {
            id,
            index,
            parents: Vec::new(),
            children: Vec::new(),
            level: 0,
            cut_type: None,
            anforlust: false,
            int_c: 0,
            int_n: 0.0,
            br_c: 0,
            br_n: 0.0,
            int_c_t: Vec::new(),
            int_n_t: Vec::new(),
            br_c_t: Vec::new(),
            br_n_t: Vec::new(),
            censor: None,
            sites: Vec::new(),
            br_d: Vec::new(),
        }
    }

    /// External identifier of the node.
    pub fn id(&self) -> &str {
        &self.id
    }

    /// Arena index of the node.
    pub fn index(&self) -> NodeIndex {
        self.index
    }

    /// Parent indices in declaration order.
    pub fn parents(&self) -> &[NodeIndex] {
        &self.parents
    }

    /// Child indices in declared sibling order.
    pub fn children(&self) -> &[NodeIndex] {
        &self.children
    }

    /// Depth of the node, roots are at level 1.
    pub fn level(&self) -> u32 {
        self.level
    }

    /// Cut type assigned to this node, if any.
    pub fn cut_type(&self) -> Option<CutType> {
        self.cut_type
    }

    /// True when some ancestor is reachable from this node along more than
    /// one parent path.
    pub fn is_anforlust(&self) -> bool {
        self.anforlust
    }

    /// Cases recorded on the node itself.
    pub fn internal_cases(&self) -> i64 {
        self.int_c
    }

    /// Expectation (or observations) recorded on the node itself.
    pub fn internal_measure(&self) -> f64 {
        self.int_n
    }

    /// Cases of the node and all descendants.
    pub fn branch_cases(&self) -> i64 {
        self.br_c
    }

    /// Expectation of the node and all descendants.
    pub fn branch_measure(&self) -> f64 {
        self.br_n
    }

    /// Internal cases per time interval.
    pub fn internal_cases_series(&self) -> &[i64] {
        &self.int_c_t
    }

    /// Internal measure per time interval.
    pub fn internal_measure_series(&self) -> &[f64] {
        &self.int_n_t
    }

    /// Cumulative branch cases per time interval.
    pub fn branch_cases_cumulative(&self) -> &[i64] {
        &self.br_c_t
    }

    /// Cumulative branch measure per time interval.
    pub fn branch_measure_cumulative(&self) -> &[f64] {
        &self.br_n_t
    }

    /// Censoring interval, if the node is censored.
    pub fn censor(&self) -> Option<usize> {
        self.censor
    }

    /// Site observations recorded on the node.
    pub fn sites(&self) -> &[SiteObservation] {
        &self.sites
    }

    /// Branch sums of site differences indexed by site.
    pub fn branch_site_differences(&self) -> &[f64] {
        &self.br_d
    }
}
