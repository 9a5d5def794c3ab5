use std::collections::{BTreeMap, VecDeque};

use tracing::debug;
use treescan_core::errors::{ErrorInfo, ScanError};
use treescan_core::serde::stable_hash_string;
use treescan_core::{AnalysisConfig, ConditionalType, CutType, ModelType, NodeIndex};

use crate::node::{Node, SiteObservation};

fn tree_error(code: &str, message: &str) -> ErrorInfo {
    ErrorInfo::new(code, message)
}

fn configuration(info: ErrorInfo) -> ScanError {
    ScanError::Configuration(info)
}

#[derive(Debug, Clone)]
struct Entry {
    id: String,
    parents: Vec<String>,
    cut_type: Option<CutType>,
    cases: i64,
    measure: f64,
    cases_t: Vec<i64>,
    measure_t: Vec<f64>,
    censor: Option<usize>,
    sites: Vec<SiteObservation>,
}

/// Incrementally collects nodes, edges and counts before building a
/// [`TreeModel`].
#[derive(Debug, Clone, Default)]
pub struct TreeBuilder {
    entries: Vec<Entry>,
    lookup: BTreeMap<String, usize>,
    intervals: usize,
    site_count: usize,
}

impl TreeBuilder {
    /// Creates a builder for a tree-only data set.
    pub fn new() -> Self {
        Self::default()
    }

    /// Creates a builder whose counts are recorded per time interval.
    pub fn with_intervals(intervals: usize) -> Self {
        Self {
            intervals,
            ..Self::default()
        }
    }

    /// Declares a node together with the identifiers of its parents. Parents
    /// may be declared later; the order of declaration is the sibling order.
    pub fn add_node<I, S>(&mut self, id: &str, parents: I) -> Result<NodeIndex, ScanError>
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        if self.lookup.contains_key(id) {
            return Err(configuration(
                tree_error("duplicate-node", "node identifier declared twice").with_context("node", id),
            ));
        }
        let position = self.entries.len();
        let mut parent_ids: Vec<String> = Vec::new();
        for parent in parents {
            let parent = parent.into();
            if !parent_ids.contains(&parent) {
                parent_ids.push(parent);
            }
        }
        self.entries.push(Entry {
            id: id.to_string(),
            parents: parent_ids,
            cut_type: None,
            cases: 0,
            measure: 0.0,
            cases_t: vec![0; self.intervals],
            measure_t: vec![0.0; self.intervals],
            censor: None,
            sites: Vec::new(),
        });
        self.lookup.insert(id.to_string(), position);
        Ok(NodeIndex::new(position))
    }

    /// Adds cases and expectation (or observations) to a node of a tree-only
    /// data set.
    pub fn add_counts(&mut self, id: &str, cases: i64, measure: f64) -> Result<(), ScanError> {
        if self.intervals > 0 {
            return Err(configuration(
                tree_error("missing-interval", "temporal data requires a time interval")
                    .with_context("node", id),
            ));
        }
        check_counts(id, cases, measure)?;
        let entry = self.entry_mut(id)?;
        entry.cases += cases;
        entry.measure += measure;
        Ok(())
    }

    /// Adds cases and measure recorded at a time interval.
    pub fn add_counts_at(
        &mut self,
        id: &str,
        interval: usize,
        cases: i64,
        measure: f64,
    ) -> Result<(), ScanError> {
        if interval >= self.intervals {
            return Err(configuration(
                tree_error("interval-out-of-range", "time interval outside the data range")
                    .with_context("node", id)
                    .with_context("interval", interval.to_string()),
            ));
        }
        check_counts(id, cases, measure)?;
        let entry = self.entry_mut(id)?;
        entry.cases += cases;
        entry.measure += measure;
        entry.cases_t[interval] += cases;
        entry.measure_t[interval] += measure;
        Ok(())
    }

    /// Marks the last interval at which a node's cases are observable.
    pub fn set_censor(&mut self, id: &str, interval: usize) -> Result<(), ScanError> {
        if interval >= self.intervals {
            return Err(configuration(
                tree_error("interval-out-of-range", "censor interval outside the data range")
                    .with_context("node", id)
                    .with_context("interval", interval.to_string()),
            ));
        }
        self.entry_mut(id)?.censor = Some(interval);
        Ok(())
    }

    /// Records a paired site observation. Each observation counts as one case
    /// with unit measure.
    pub fn add_site(&mut self, id: &str, observation: SiteObservation) -> Result<(), ScanError> {
        if !observation.baseline.is_finite() || !observation.current.is_finite() {
            return Err(configuration(
                tree_error("site-value", "site observation is not finite")
                    .with_context("node", id)
                    .with_context("site", observation.site.to_string()),
            ));
        }
        self.site_count = self.site_count.max(observation.site + 1);
        let entry = self.entry_mut(id)?;
        entry.sites.push(observation);
        entry.cases += 1;
        entry.measure += 1.0;
        Ok(())
    }

    /// Assigns a cut type to a node.
    pub fn set_cut_type(&mut self, id: &str, cut_type: CutType) -> Result<(), ScanError> {
        self.entry_mut(id)?.cut_type = Some(cut_type);
        Ok(())
    }

    fn entry_mut(&mut self, id: &str) -> Result<&mut Entry, ScanError> {
        match self.lookup.get(id) {
            Some(&position) => Ok(&mut self.entries[position]),
            None => Err(configuration(
                tree_error("unknown-node", "node was not declared").with_context("node", id),
            )),
        }
    }

    /// Resolves edges, computes levels and propagates branch totals.
    pub fn build(self) -> Result<TreeModel, ScanError> {
        if self.entries.is_empty() {
            return Err(configuration(tree_error("empty-tree", "tree has no nodes")));
        }
        let mut nodes: Vec<Node> = Vec::with_capacity(self.entries.len());
        for (position, entry) in self.entries.iter().enumerate() {
            let mut node = Node::new(entry.id.clone(), NodeIndex::new(position));
            node.cut_type = entry.cut_type;
            node.int_c = entry.cases;
            node.int_n = entry.measure;
            node.int_c_t = entry.cases_t.clone();
            node.int_n_t = entry.measure_t.clone();
            node.censor = entry.censor;
            node.sites = entry.sites.clone();
            for parent in &entry.parents {
                let parent_index = self.lookup.get(parent).copied().ok_or_else(|| {
                    configuration(
                        tree_error("unknown-parent", "parent node was not declared")
                            .with_context("node", entry.id.clone())
                            .with_context("parent", parent.clone()),
                    )
                })?;
                node.parents.push(NodeIndex::new(parent_index));
            }
            nodes.push(node);
        }
        for position in 0..nodes.len() {
            let parents = nodes[position].parents.clone();
            for parent in parents {
                nodes[parent.index()].children.push(NodeIndex::new(position));
            }
        }
        let roots: Vec<NodeIndex> = nodes
            .iter()
            .filter(|node| node.parents.is_empty())
            .map(|node| node.index)
            .collect();
        if roots.is_empty() {
            return Err(configuration(
                tree_error("no-root", "every node has a parent")
                    .with_hint("the parent relation contains a cycle"),
            ));
        }

        let mut model = TreeModel {
            ancestors: vec![Vec::new(); nodes.len()],
            nodes,
            lookup: self
                .lookup
                .into_iter()
                .map(|(id, position)| (id, NodeIndex::new(position)))
                .collect(),
            roots,
            anforlust: false,
            intervals: self.intervals,
            site_count: self.site_count,
        };
        model.assign_levels();
        model.propagate()?;
        Ok(model)
    }
}

/// Bernoulli records are whole observations, each a case or a control.
fn check_observations(id: &str, interval: Option<usize>, cases: i64, observations: f64) -> Result<(), ScanError> {
    let info = if (observations - observations.round()).abs() > 1e-9 {
        tree_error("fractional-observations", "observation count is not a whole number")
    } else if cases as f64 > observations.round() {
        tree_error("cases-exceed-observations", "node has more cases than its own observations")
    } else {
        return Ok(());
    };
    let mut info = info
        .with_context("node", id)
        .with_context("cases", cases.to_string())
        .with_context("observations", observations.to_string());
    if let Some(interval) = interval {
        info = info.with_context("interval", interval.to_string());
    }
    Err(configuration(info))
}

fn check_counts(id: &str, cases: i64, measure: f64) -> Result<(), ScanError> {
    if cases < 0 || !measure.is_finite() || measure < 0.0 {
        return Err(configuration(
            tree_error("negative-count", "counts must be finite and non-negative")
                .with_context("node", id)
                .with_context("cases", cases.to_string())
                .with_context("measure", measure.to_string()),
        ));
    }
    Ok(())
}

/// Transient markers reused across the per-node propagation passes.
struct PassScratch {
    visited: Vec<bool>,
    visits: Vec<u32>,
    touched: Vec<usize>,
    stack: Vec<usize>,
}

impl PassScratch {
    fn new(len: usize) -> Self {
        Self {
            visited: vec![false; len],
            visits: vec![0; len],
            touched: Vec::new(),
            stack: Vec::new(),
        }
    }

    fn reset(&mut self) {
        for &position in &self.touched {
            self.visited[position] = false;
            self.visits[position] = 0;
        }
        self.touched.clear();
        self.stack.clear();
    }

    fn mark(&mut self, position: usize) {
        self.visited[position] = true;
        self.visits[position] = 1;
        self.touched.push(position);
    }
}

/// Internal values of one node added to every node on its ancestor paths.
struct Contribution {
    cases: i64,
    measure: f64,
    cases_t: Vec<i64>,
    measure_t: Vec<f64>,
    sites: Vec<(usize, f64)>,
}

impl Contribution {
    fn of(node: &Node) -> Self {
        Self {
            cases: node.int_c,
            measure: node.int_n,
            cases_t: node.int_c_t.clone(),
            measure_t: node.int_n_t.clone(),
            sites: node
                .sites
                .iter()
                .map(|obs| (obs.site, obs.difference()))
                .collect(),
        }
    }

    fn apply(&self, node: &mut Node) {
        node.br_c += self.cases;
        node.br_n += self.measure;
        for (slot, value) in node.br_c_t.iter_mut().zip(&self.cases_t) {
            *slot += value;
        }
        for (slot, value) in node.br_n_t.iter_mut().zip(&self.measure_t) {
            *slot += value;
        }
        for &(site, difference) in &self.sites {
            node.br_d[site] += difference;
        }
    }
}

/// Owned tree context: node arena, identifier lookup, roots and the ancestor
/// set of every node.
#[derive(Debug, Clone)]
pub struct TreeModel {
    nodes: Vec<Node>,
    lookup: BTreeMap<String, NodeIndex>,
    roots: Vec<NodeIndex>,
    ancestors: Vec<Vec<NodeIndex>>,
    anforlust: bool,
    intervals: usize,
    site_count: usize,
}

impl TreeModel {
    /// Number of nodes.
    pub fn len(&self) -> usize {
        self.nodes.len()
    }

    /// Whether the tree has no nodes. Built trees always have at least one.
    pub fn is_empty(&self) -> bool {
        self.nodes.is_empty()
    }

    /// All nodes in arena order.
    pub fn nodes(&self) -> &[Node] {
        &self.nodes
    }

    /// Node at the given index.
    pub fn node(&self, index: NodeIndex) -> &Node {
        &self.nodes[index.index()]
    }

    /// Resolves an external identifier.
    pub fn lookup(&self, id: &str) -> Option<NodeIndex> {
        self.lookup.get(id).copied()
    }

    /// Nodes without parents.
    pub fn roots(&self) -> &[NodeIndex] {
        &self.roots
    }

    /// Every ancestor of a node, each listed once.
    pub fn ancestors(&self, index: NodeIndex) -> &[NodeIndex] {
        &self.ancestors[index.index()]
    }

    /// True when any node reaches an ancestor along more than one path.
    pub fn is_anforlust(&self) -> bool {
        self.anforlust
    }

    /// Number of time intervals, zero for tree-only data.
    pub fn intervals(&self) -> usize {
        self.intervals
    }

    /// Number of distinct sites for signed-rank data.
    pub fn site_count(&self) -> usize {
        self.site_count
    }

    /// Sum of internal cases over all nodes.
    pub fn total_cases(&self) -> i64 {
        self.nodes.iter().map(|node| node.int_c).sum()
    }

    /// Sum of internal expectation over all nodes.
    pub fn total_measure(&self) -> f64 {
        self.nodes.iter().map(|node| node.int_n).sum()
    }

    /// Sum of internal cases per time interval over all nodes.
    pub fn total_cases_series(&self) -> Vec<i64> {
        let mut totals = vec![0; self.intervals];
        for node in &self.nodes {
            for (slot, value) in totals.iter_mut().zip(&node.int_c_t) {
                *slot += value;
            }
        }
        totals
    }

    /// Applies cut type overrides keyed by node identifier.
    pub fn assign_cut_types(&mut self, overrides: &BTreeMap<String, CutType>) -> Result<(), ScanError> {
        for (id, cut_type) in overrides {
            let index = self.lookup(id).ok_or_else(|| {
                configuration(
                    tree_error("unknown-node", "cut type assigned to an unknown node")
                        .with_context("node", id.clone()),
                )
            })?;
            self.nodes[index.index()].cut_type = Some(*cut_type);
        }
        Ok(())
    }

    /// Computes branch totals for every node from the internal values of the
    /// node and all of its descendants.
    ///
    /// One pass runs per originating node. The pass adds the node's internal
    /// values to itself and walks parent links, marking each ancestor the
    /// first time it is reached. An ancestor reached again through a second
    /// path only bumps its visit counter, so diamonds are counted once and the
    /// originating node is flagged `anforlust`. Reaching the originating node
    /// again means it is its own ancestor, which is a configuration error.
    pub fn propagate(&mut self) -> Result<(), ScanError> {
        let intervals = self.intervals;
        let site_count = self.site_count;
        for node in &mut self.nodes {
            node.br_c = 0;
            node.br_n = 0.0;
            node.br_c_t = vec![0; intervals];
            node.br_n_t = vec![0.0; intervals];
            node.br_d = vec![0.0; site_count];
            node.anforlust = false;
        }

        let mut scratch = PassScratch::new(self.nodes.len());
        for origin in 0..self.nodes.len() {
            let (ancestors, revisited) = self.add_cn(origin, &mut scratch)?;
            self.nodes[origin].anforlust = revisited;
            self.ancestors[origin] = ancestors;
        }
        self.anforlust = self.nodes.iter().any(|node| node.anforlust);

        for node in &mut self.nodes {
            for t in 1..intervals {
                node.br_c_t[t] += node.br_c_t[t - 1];
                node.br_n_t[t] += node.br_n_t[t - 1];
            }
        }
        debug!(
            nodes = self.nodes.len(),
            roots = self.roots.len(),
            anforlust = self.anforlust,
            "propagated branch totals"
        );
        Ok(())
    }

    fn add_cn(
        &mut self,
        origin: usize,
        scratch: &mut PassScratch,
    ) -> Result<(Vec<NodeIndex>, bool), ScanError> {
        let contribution = Contribution::of(&self.nodes[origin]);
        scratch.reset();
        scratch.mark(origin);
        scratch.stack.push(origin);
        let mut ancestors = Vec::new();
        let mut revisited = false;

        while let Some(current) = scratch.stack.pop() {
            contribution.apply(&mut self.nodes[current]);
            for slot in 0..self.nodes[current].parents.len() {
                let parent = self.nodes[current].parents[slot].index();
                if scratch.visited[parent] {
                    scratch.visits[parent] += 1;
                    if parent == origin && scratch.visits[origin] > 1 {
                        return Err(configuration(
                            tree_error("self-ancestor", "node is its own ancestor")
                                .with_context("node", self.nodes[origin].id.clone())
                                .with_context("via", self.nodes[current].id.clone())
                                .with_frame("propagate"),
                        ));
                    }
                    revisited = true;
                } else {
                    scratch.mark(parent);
                    ancestors.push(NodeIndex::new(parent));
                    scratch.stack.push(parent);
                }
            }
        }
        Ok((ancestors, revisited))
    }

    /// Checks that every branch expectation is usable by the likelihood
    /// models: finite, non-negative, and positive wherever cases occur,
    /// including every time interval. Bernoulli data additionally requires
    /// whole observation counts that each node's own cases do not exceed.
    pub fn validate_expectations(&self, bernoulli: bool) -> Result<(), ScanError> {
        for node in &self.nodes {
            if bernoulli && node.br_c as f64 > node.br_n {
                return Err(configuration(
                    tree_error("cases-exceed-observations", "node has more cases than observations")
                        .with_context("node", node.id.clone())
                        .with_context("cases", node.br_c.to_string())
                        .with_context("observations", node.br_n.to_string()),
                ));
            }
            if !node.br_n.is_finite() || node.br_n < 0.0 {
                return Err(configuration(
                    tree_error("negative-expectation", "branch expectation is negative")
                        .with_context("node", node.id.clone())
                        .with_context("expectation", node.br_n.to_string()),
                ));
            }
            if node.br_n == 0.0 && node.br_c > 0 {
                return Err(configuration(
                    tree_error("cases-without-expectation", "node has cases but zero expectation")
                        .with_context("node", node.id.clone())
                        .with_context("cases", node.br_c.to_string()),
                ));
            }
            for (t, (&cases, &expected)) in node.int_c_t.iter().zip(&node.int_n_t).enumerate() {
                if cases > 0 && expected <= 0.0 {
                    return Err(configuration(
                        tree_error("cases-without-expectation", "node has cases at an interval with zero expectation")
                            .with_context("node", node.id.clone())
                            .with_context("interval", t.to_string())
                            .with_context("cases", cases.to_string()),
                    ));
                }
            }
            if bernoulli {
                check_observations(&node.id, None, node.int_c, node.int_n)?;
                for (t, (&cases, &observations)) in node.int_c_t.iter().zip(&node.int_n_t).enumerate() {
                    check_observations(&node.id, Some(t), cases, observations)?;
                }
            }
        }
        Ok(())
    }

    fn assign_levels(&mut self) {
        let mut queue: VecDeque<NodeIndex> = VecDeque::new();
        for &root in &self.roots {
            self.nodes[root.index()].level = 1;
            queue.push_back(root);
        }
        while let Some(current) = queue.pop_front() {
            let level = self.nodes[current.index()].level + 1;
            for slot in 0..self.nodes[current.index()].children.len() {
                let child = self.nodes[current.index()].children[slot];
                if self.nodes[child.index()].level == 0 {
                    self.nodes[child.index()].level = level;
                    queue.push_back(child);
                }
            }
        }
    }

    /// Derives null expectations required by the configured model and
    /// validates the result.
    pub fn prepare(&mut self, config: &AnalysisConfig) -> Result<(), ScanError> {
        match (config.model, config.conditional) {
            (ModelType::Poisson, ConditionalType::TotalCases) => self.rescale_expectations()?,
            (ModelType::Uniform, ConditionalType::NodeAndTime) => {
                self.assign_node_time_expectations()?
            }
            (ModelType::Uniform, _) => self.assign_uniform_expectations()?,
            _ => {}
        }
        let bernoulli = matches!(config.model, ModelType::Bernoulli | ModelType::BernoulliTime);
        self.validate_expectations(bernoulli)
            .map_err(|err| err.with_frame("prepare expectations"))
    }

    /// Rescales every internal expectation by `TotalC / TotalN` so the grand
    /// total expectation equals the grand total of observed cases.
    pub fn rescale_expectations(&mut self) -> Result<(), ScanError> {
        let total_cases = self.total_cases() as f64;
        let total_measure = self.total_measure();
        if total_measure <= 0.0 {
            return Err(configuration(tree_error(
                "zero-expectation",
                "total expectation must be positive",
            )));
        }
        let ratio = total_cases / total_measure;
        for node in &mut self.nodes {
            node.int_n *= ratio;
            for value in &mut node.int_n_t {
                *value *= ratio;
            }
        }
        self.propagate()
    }

    /// Spreads each node's internal cases evenly over the intervals at which
    /// they are observable, giving the null expectation of the uniform model.
    pub fn assign_uniform_expectations(&mut self) -> Result<(), ScanError> {
        let intervals = self.require_intervals()?;
        for node in &mut self.nodes {
            let last = node.censor.unwrap_or(intervals - 1).min(intervals - 1);
            if let Some(t) = node.int_c_t.iter().skip(last + 1).position(|cases| *cases > 0) {
                return Err(configuration(
                    tree_error("cases-after-censor", "node has cases after its censor interval")
                        .with_context("node", node.id.clone())
                        .with_context("censor", last.to_string())
                        .with_context("interval", (last + 1 + t).to_string()),
                ));
            }
            let per_interval = node.int_c as f64 / (last + 1) as f64;
            for (t, value) in node.int_n_t.iter_mut().enumerate() {
                *value = if t <= last { per_interval } else { 0.0 };
            }
            node.int_n = node.int_c as f64;
        }
        self.propagate()
    }

    /// Expectation conditioned on node and time totals:
    /// `IntN_t = IntC · C_t / C`.
    pub fn assign_node_time_expectations(&mut self) -> Result<(), ScanError> {
        self.require_intervals()?;
        let totals = self.total_cases_series();
        let total = self.total_cases();
        if total <= 0 {
            return Err(configuration(tree_error("no-cases", "data set contains no cases")));
        }
        for node in &mut self.nodes {
            for (value, &at_time) in node.int_n_t.iter_mut().zip(&totals) {
                *value = node.int_c as f64 * at_time as f64 / total as f64;
            }
            node.int_n = node.int_c as f64;
        }
        self.propagate()
    }

    fn require_intervals(&self) -> Result<usize, ScanError> {
        if self.intervals == 0 {
            Err(configuration(tree_error(
                "missing-intervals",
                "temporal model requires counts per time interval",
            )))
        } else {
            Ok(self.intervals)
        }
    }

    /// Stable SHA256 over the node arena.
    pub fn canonical_hash(&self) -> Result<String, ScanError> {
        stable_hash_string(&self.nodes)
    }
}
