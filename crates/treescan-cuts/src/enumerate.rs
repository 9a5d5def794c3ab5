use std::collections::BTreeSet;
use std::slice;

use tracing::debug;
use treescan_core::errors::{ErrorInfo, ScanError};
use treescan_core::{AnalysisConfig, CutType, NodeIndex, ScanType, TimeWindow};
use treescan_llr::{LikelihoodModel, Tally};
use treescan_tree::{BranchCounts, TreeModel};

use crate::cut::Candidate;
use crate::list::{CutList, CutSink, MaxLlr};

/// Largest child count accepted for combinatorial cuts.
pub const MAX_COMBINATORIAL_CHILDREN: usize = 16;

/// Lists the merged-children groups a cut type generates from `children`,
/// in declared order. Nodes with fewer than two children have none.
pub fn merged_groups(
    children: &[NodeIndex],
    cut_type: CutType,
) -> Result<Vec<Vec<NodeIndex>>, ScanError> {
    let k = children.len();
    let mut groups = Vec::new();
    if k < 2 {
        return Ok(groups);
    }
    match cut_type {
        CutType::Simple => {}
        CutType::Ordinal => {
            for start in 0..k {
                for end in start + 1..k {
                    groups.push(children[start..=end].to_vec());
                }
            }
        }
        CutType::Pairs => {
            for j in 0..k {
                for l in j + 1..k {
                    groups.push(vec![children[j], children[l]]);
                }
            }
        }
        CutType::Triplets => {
            for j in 0..k {
                for l in j + 1..k {
                    groups.push(vec![children[j], children[l]]);
                    for m in j + 1..l {
                        groups.push(vec![children[j], children[m], children[l]]);
                    }
                }
            }
        }
        CutType::Combinatorial => {
            if k > MAX_COMBINATORIAL_CHILDREN {
                return Err(ScanError::Configuration(
                    ErrorInfo::new("combinatorial-children", "too many children for combinatorial cuts")
                        .with_context("children", k.to_string())
                        .with_context("limit", MAX_COMBINATORIAL_CHILDREN.to_string())
                        .with_hint("use ordinal, pairs or triplets cuts for wide nodes"),
                ));
            }
            for mask in 1u32..(1u32 << k) {
                let size = mask.count_ones() as usize;
                if size < 2 || size >= k {
                    continue;
                }
                groups.push(
                    (0..k)
                        .filter(|bit| mask & (1 << bit) != 0)
                        .map(|bit| children[bit])
                        .collect(),
                );
            }
        }
    }
    Ok(groups)
}

/// Enumerates the time windows allowed by the temporal configuration.
pub fn allowed_windows(config: &AnalysisConfig, intervals: usize) -> Vec<TimeWindow> {
    let temporal = &config.temporal;
    if intervals == 0 {
        return Vec::new();
    }
    let last = intervals - 1;
    let (start_lo, start_hi) = temporal.start_indices();
    let (end_lo, end_hi) = temporal.end_indices();
    let min_len = temporal.min_window.max(1);
    let max_len = temporal.effective_max_window();
    let mut windows = Vec::new();
    for start in start_lo..=start_hi.min(last) {
        for end in end_lo.max(start)..=end_hi.min(last) {
            let length = end - start + 1;
            if length >= min_len && length <= max_len {
                windows.push(TimeWindow::new(start, end));
            }
        }
    }
    windows
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Evaluator {
    Branch,
    Windowed,
    SignedRank,
}

#[derive(Debug, Clone)]
struct NodePlan {
    node: NodeIndex,
    groups: Vec<Vec<NodeIndex>>,
}

/// Result of scanning the observed data.
#[derive(Debug, Clone)]
pub struct ScanOutcome {
    /// Ranked observed cuts.
    pub cuts: CutList,
    /// Largest LLR over every candidate, independent of list capacity.
    pub max_llr: f64,
    /// Top cut LLR plus the model's test statistic adjustment.
    pub test_statistic: f64,
}

struct Both<'s> {
    list: &'s mut CutList,
    max: &'s mut MaxLlr,
}

impl CutSink for Both<'_> {
    fn offer(&mut self, candidate: &Candidate<'_>) {
        self.list.offer(candidate);
        self.max.offer(candidate);
    }
}

/// Candidate cut generator bound to one prepared tree and likelihood model.
///
/// The candidate set is fixed at construction from the observed data so that
/// every replica is scanned over exactly the same cuts.
#[derive(Debug, Clone)]
pub struct CutEnumerator<'t> {
    tree: &'t TreeModel,
    model: LikelihoodModel,
    evaluator: Evaluator,
    plans: Vec<NodePlan>,
    windows: Vec<TimeWindow>,
}

impl<'t> CutEnumerator<'t> {
    /// Selects the nodes to scan and precomputes their merged groups and the
    /// allowed time windows.
    pub fn new(
        tree: &'t TreeModel,
        model: LikelihoodModel,
        config: &AnalysisConfig,
    ) -> Result<Self, ScanError> {
        let mut excluded = BTreeSet::new();
        for id in &config.excluded_nodes {
            let index = tree.lookup(id).ok_or_else(|| {
                ScanError::Configuration(
                    ErrorInfo::new("unknown-node", "excluded node is not in the tree")
                        .with_context("node", id.clone()),
                )
            })?;
            excluded.insert(index);
        }

        let time_only = matches!(config.scan_type, ScanType::TimeOnly);
        let nodes: Vec<NodeIndex> = if time_only {
            tree.roots().to_vec()
        } else {
            tree.nodes().iter().map(|node| node.index()).collect()
        };

        let mut plans = Vec::new();
        for index in nodes {
            let node = tree.node(index);
            if excluded.contains(&index)
                || node.branch_cases() <= config.node_minimum
                || (!config.restricted_levels.is_empty()
                    && !config.restricted_levels.contains(&node.level()))
            {
                continue;
            }
            let cut_type = if time_only {
                CutType::Simple
            } else {
                node.cut_type().unwrap_or(config.default_cut_type)
            };
            let groups = merged_groups(node.children(), cut_type)
                .map_err(|err| err.with_frame(format!("node {}", node.id())))?;
            plans.push(NodePlan { node: index, groups });
        }

        let evaluator = if model.uses_site_differences() {
            Evaluator::SignedRank
        } else if config.is_temporal() {
            Evaluator::Windowed
        } else {
            Evaluator::Branch
        };
        let windows = if evaluator == Evaluator::Windowed {
            allowed_windows(config, tree.intervals())
        } else {
            Vec::new()
        };
        if evaluator == Evaluator::Windowed && windows.is_empty() {
            return Err(ScanError::Configuration(
                ErrorInfo::new("no-windows", "temporal settings allow no time window")
                    .with_context("intervals", tree.intervals().to_string()),
            ));
        }

        let enumerator = Self {
            tree,
            model,
            evaluator,
            plans,
            windows,
        };
        debug!(
            nodes = enumerator.plans.len(),
            candidates = enumerator.candidate_count(),
            windows = enumerator.windows.len(),
            "prepared cut enumeration"
        );
        Ok(enumerator)
    }

    /// Likelihood model used for scoring.
    pub fn model(&self) -> &LikelihoodModel {
        &self.model
    }

    /// Number of candidates scored per scan, not counting windows.
    pub fn candidate_count(&self) -> usize {
        self.plans.iter().map(|plan| 1 + plan.groups.len()).sum()
    }

    /// Time windows evaluated by temporal scans.
    pub fn windows(&self) -> &[TimeWindow] {
        &self.windows
    }

    /// Scores every candidate against `data` and offers it to `sink`.
    pub fn scan<D, S>(&self, data: &D, sink: &mut S)
    where
        D: BranchCounts + ?Sized,
        S: CutSink,
    {
        let mut differences = Vec::new();
        for plan in &self.plans {
            self.evaluate(plan.node, &[], slice::from_ref(&plan.node), data, sink, &mut differences);
            for group in &plan.groups {
                self.evaluate(plan.node, group, group, data, sink, &mut differences);
            }
        }
    }

    /// Scans the observed data into a ranked list of at most `capacity` cuts.
    pub fn scan_observed(&self, capacity: usize) -> ScanOutcome {
        let mut cuts = CutList::with_capacity(capacity);
        let mut max = MaxLlr::default();
        self.scan(
            self.tree,
            &mut Both {
                list: &mut cuts,
                max: &mut max,
            },
        );
        cuts.assign_report_order();
        let test_statistic = cuts
            .top()
            .map(|cut| cut.llr + self.model.test_statistic_adjustment())
            .unwrap_or(0.0);
        ScanOutcome {
            cuts,
            max_llr: max.value(),
            test_statistic,
        }
    }

    /// Largest LLR over every candidate in `data`.
    pub fn max_llr<D: BranchCounts + ?Sized>(&self, data: &D) -> f64 {
        let mut max = MaxLlr::default();
        self.scan(data, &mut max);
        max.value()
    }

    fn branch_tally<D: BranchCounts + ?Sized>(&self, parts: &[NodeIndex], data: &D) -> Tally {
        let mut tally = Tally::default();
        for &part in parts {
            tally += Tally::new(data.branch_cases(part), self.tree.node(part).branch_measure());
        }
        tally
    }

    fn evaluate<D, S>(
        &self,
        node: NodeIndex,
        members: &[NodeIndex],
        parts: &[NodeIndex],
        data: &D,
        sink: &mut S,
        differences: &mut Vec<f64>,
    ) where
        D: BranchCounts + ?Sized,
        S: CutSink,
    {
        let scope = self.branch_tally(parts, data);
        let (tally, llr, window) = match self.evaluator {
            Evaluator::Branch => (scope, self.model.evaluate(scope, Tally::default()), None),
            Evaluator::Windowed => match self.best_window(parts, data, scope) {
                Some((window, tally, llr)) => (tally, llr, Some(window)),
                None => return,
            },
            Evaluator::SignedRank => {
                differences.clear();
                differences.resize(self.tree.site_count(), 0.0);
                for &part in parts {
                    for (site, value) in self.tree.node(part).branch_site_differences().iter().enumerate() {
                        differences[site] += value * data.site_sign(site);
                    }
                }
                (scope, self.model.evaluate_differences(differences), None)
            }
        };
        sink.offer(&Candidate {
            node,
            members,
            tally,
            expected: self.model.expected_cases(tally, scope),
            llr,
            window,
        });
    }

    /// Best scoring window of a candidate. Ties keep the earliest window.
    fn best_window<D: BranchCounts + ?Sized>(
        &self,
        parts: &[NodeIndex],
        data: &D,
        scope: Tally,
    ) -> Option<(TimeWindow, Tally, f64)> {
        let mut best: Option<(TimeWindow, Tally, f64)> = None;
        for &window in &self.windows {
            let mut tally = Tally::default();
            for &part in parts {
                let cases = data.branch_cases_cumulative(part);
                let measure = self.tree.node(part).branch_measure_cumulative();
                let (before_cases, before_measure) = if window.start == 0 {
                    (0, 0.0)
                } else {
                    (cases[window.start - 1], measure[window.start - 1])
                };
                tally += Tally::new(cases[window.end] - before_cases, measure[window.end] - before_measure);
            }
            let llr = self.model.evaluate(tally, scope);
            if best.map_or(true, |(_, _, current)| llr > current) {
                best = Some((window, tally, llr));
            }
        }
        best
    }
}
