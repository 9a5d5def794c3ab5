use rand::Rng;
use rand_distr::{Binomial, Distribution, Poisson};
use treescan_core::errors::{ErrorInfo, ScanError};
use treescan_core::{NodeIndex, RngHandle};
use treescan_tree::{SimulationBuffer, TreeModel};

/// Generates the internal values of one null-hypothesis replica.
///
/// Implementations write into a cleared buffer and leave branch propagation
/// to the caller. Every replica draws from its own RNG seeded from the base
/// seed and the replica index, so output never depends on which thread runs
/// the replica.
pub trait Randomizer: Send + Sync {
    /// Short name used in logs.
    fn name(&self) -> &'static str;

    /// Fills `buffer` with replica `replica` of the null hypothesis.
    fn randomize(
        &self,
        replica: usize,
        tree: &TreeModel,
        buffer: &mut SimulationBuffer,
    ) -> Result<(), ScanError>;

    /// Whether every replica has exactly the observed case total.
    fn conserves_total(&self) -> bool;
}

fn distribution_error(name: &str, err: impl ToString, node: &str) -> ScanError {
    ScanError::Program(
        ErrorInfo::new("distribution", err.to_string())
            .with_context("distribution", name)
            .with_context("node", node),
    )
}

/// Independent Poisson draw per node from its expectation.
#[derive(Debug, Clone)]
pub struct PoissonRandomizer {
    seed: u64,
}

impl PoissonRandomizer {
    /// Creates the randomizer.
    pub fn new(seed: u64) -> Self {
        Self { seed }
    }
}

impl Randomizer for PoissonRandomizer {
    fn name(&self) -> &'static str {
        "poisson"
    }

    fn randomize(
        &self,
        replica: usize,
        tree: &TreeModel,
        buffer: &mut SimulationBuffer,
    ) -> Result<(), ScanError> {
        let mut rng = RngHandle::for_replica(self.seed, replica);
        for node in tree.nodes() {
            let expected = node.internal_measure();
            if expected <= 0.0 {
                continue;
            }
            let poisson =
                Poisson::new(expected).map_err(|err| distribution_error("poisson", err, node.id()))?;
            let draw: f64 = poisson.sample(&mut rng);
            buffer.add_cases(node.index(), draw as i64);
        }
        Ok(())
    }

    fn conserves_total(&self) -> bool {
        false
    }
}

/// Poisson conditioned on the total: cases are dealt out node by node with
/// `Binomial(remaining cases, IntN / remaining expectation)`.
#[derive(Debug, Clone)]
pub struct ConditionalPoissonRandomizer {
    seed: u64,
}

impl ConditionalPoissonRandomizer {
    /// Creates the randomizer.
    pub fn new(seed: u64) -> Self {
        Self { seed }
    }
}

impl Randomizer for ConditionalPoissonRandomizer {
    fn name(&self) -> &'static str {
        "conditional-poisson"
    }

    fn randomize(
        &self,
        replica: usize,
        tree: &TreeModel,
        buffer: &mut SimulationBuffer,
    ) -> Result<(), ScanError> {
        let mut rng = RngHandle::for_replica(self.seed, replica);
        let mut remaining_cases = tree.total_cases();
        let mut remaining_measure = tree.total_measure();
        let last = tree
            .nodes()
            .iter()
            .rev()
            .find(|node| node.internal_measure() > 0.0)
            .map(|node| node.index());
        for node in tree.nodes() {
            if remaining_cases <= 0 {
                break;
            }
            let expected = node.internal_measure();
            if expected <= 0.0 {
                continue;
            }
            // The last node with expectation takes whatever rounding left.
            let draw = if Some(node.index()) == last || expected >= remaining_measure {
                remaining_cases
            } else {
                let p = (expected / remaining_measure).clamp(0.0, 1.0);
                let binomial = Binomial::new(remaining_cases as u64, p)
                    .map_err(|err| distribution_error("binomial", err, node.id()))?;
                binomial.sample(&mut rng) as i64
            };
            buffer.add_cases(node.index(), draw);
            remaining_cases -= draw;
            remaining_measure -= expected;
        }
        Ok(())
    }

    fn conserves_total(&self) -> bool {
        true
    }
}

/// `Binomial(observations, p)` per node for a known event probability.
#[derive(Debug, Clone)]
pub struct BernoulliRandomizer {
    seed: u64,
    event_probability: f64,
}

impl BernoulliRandomizer {
    /// Creates the randomizer.
    pub fn new(seed: u64, event_probability: f64) -> Self {
        Self {
            seed,
            event_probability,
        }
    }
}

impl Randomizer for BernoulliRandomizer {
    fn name(&self) -> &'static str {
        "bernoulli"
    }

    fn randomize(
        &self,
        replica: usize,
        tree: &TreeModel,
        buffer: &mut SimulationBuffer,
    ) -> Result<(), ScanError> {
        let mut rng = RngHandle::for_replica(self.seed, replica);
        for node in tree.nodes() {
            let observations = node.internal_measure().round() as u64;
            if observations == 0 {
                continue;
            }
            let binomial = Binomial::new(observations, self.event_probability)
                .map_err(|err| distribution_error("binomial", err, node.id()))?;
            buffer.add_cases(node.index(), binomial.sample(&mut rng) as i64);
        }
        Ok(())
    }

    fn conserves_total(&self) -> bool {
        false
    }
}

/// Each node's cases placed uniformly at random over the intervals at which
/// they can be observed.
#[derive(Debug, Clone)]
pub struct UniformTimeRandomizer {
    seed: u64,
}

impl UniformTimeRandomizer {
    /// Creates the randomizer.
    pub fn new(seed: u64) -> Self {
        Self { seed }
    }
}

impl Randomizer for UniformTimeRandomizer {
    fn name(&self) -> &'static str {
        "uniform-time"
    }

    fn randomize(
        &self,
        replica: usize,
        tree: &TreeModel,
        buffer: &mut SimulationBuffer,
    ) -> Result<(), ScanError> {
        let intervals = tree.intervals();
        if intervals == 0 {
            return Err(ScanError::Program(ErrorInfo::new(
                "missing-intervals",
                "uniform time randomization on data without time intervals",
            )));
        }
        let mut rng = RngHandle::for_replica(self.seed, replica);
        for node in tree.nodes() {
            let last = node.censor().unwrap_or(intervals - 1).min(intervals - 1);
            for _ in 0..node.internal_cases() {
                let interval = rng.gen_range(0..=last);
                buffer.add_cases_at(node.index(), interval, 1);
            }
        }
        Ok(())
    }

    fn conserves_total(&self) -> bool {
        true
    }
}

/// Keeps every node's observations and flips each site's sign with
/// probability one half; the flip applies to the site in every node.
#[derive(Debug, Clone)]
pub struct SignFlipRandomizer {
    seed: u64,
}

impl SignFlipRandomizer {
    /// Creates the randomizer.
    pub fn new(seed: u64) -> Self {
        Self { seed }
    }
}

impl Randomizer for SignFlipRandomizer {
    fn name(&self) -> &'static str {
        "sign-flip"
    }

    fn randomize(
        &self,
        replica: usize,
        tree: &TreeModel,
        buffer: &mut SimulationBuffer,
    ) -> Result<(), ScanError> {
        let mut rng = RngHandle::for_replica(self.seed, replica);
        for node in tree.nodes() {
            buffer.add_cases(node.index(), node.internal_cases());
        }
        for site in 0..tree.site_count() {
            buffer.set_site_flipped(site, rng.gen_bool(0.5));
        }
        Ok(())
    }

    fn conserves_total(&self) -> bool {
        true
    }
}

/// Reorders `original` by assigning every element a random key and sorting
/// by key. Each call starts again from the original order.
pub fn permute_by_keys<T: Copy>(original: &[T], rng: &mut RngHandle) -> Vec<T> {
    let mut keyed: Vec<(u64, T)> = original.iter().map(|value| (rng.gen::<u64>(), *value)).collect();
    keyed.sort_by_key(|(key, _)| *key);
    keyed.into_iter().map(|(_, value)| value).collect()
}

/// Stationary slot of a permuted record: a node and, for temporal data, an
/// interval.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Slot {
    /// Node owning the slot.
    pub node: NodeIndex,
    /// Time interval of the slot.
    pub interval: Option<usize>,
}

/// Case/control labels permuted over fixed observation slots within strata.
///
/// Used for conditional Bernoulli (one stratum over the whole tree) and for
/// Bernoulli-time (one stratum per node, so node totals are preserved while
/// cases move between intervals).
#[derive(Debug, Clone)]
pub struct CaseLabelPermutation {
    seed: u64,
    strata: Vec<LabelStratum>,
}

#[derive(Debug, Clone)]
struct LabelStratum {
    slots: Vec<Slot>,
    labels: Vec<bool>,
}

impl CaseLabelPermutation {
    /// One stratum holding every observation of the tree.
    pub fn whole_tree(seed: u64, tree: &TreeModel) -> Self {
        let mut stratum = LabelStratum {
            slots: Vec::new(),
            labels: Vec::new(),
        };
        for node in tree.nodes() {
            push_records(&mut stratum, node.index(), None, node.internal_measure(), node.internal_cases());
        }
        Self {
            seed,
            strata: vec![stratum],
        }
    }

    /// One stratum per node, with slots per time interval.
    pub fn per_node(seed: u64, tree: &TreeModel) -> Self {
        let mut strata = Vec::new();
        for node in tree.nodes() {
            let mut stratum = LabelStratum {
                slots: Vec::new(),
                labels: Vec::new(),
            };
            let series = node
                .internal_measure_series()
                .iter()
                .zip(node.internal_cases_series());
            for (interval, (&observations, &cases)) in series.enumerate() {
                push_records(&mut stratum, node.index(), Some(interval), observations, cases);
            }
            if !stratum.slots.is_empty() {
                strata.push(stratum);
            }
        }
        Self { seed, strata }
    }

    /// Total number of permuted records.
    pub fn record_count(&self) -> usize {
        self.strata.iter().map(|stratum| stratum.slots.len()).sum()
    }
}

fn push_records(stratum: &mut LabelStratum, node: NodeIndex, interval: Option<usize>, observations: f64, cases: i64) {
    let observations = observations.round().max(0.0) as usize;
    let cases = (cases.max(0) as usize).min(observations);
    for position in 0..observations {
        stratum.slots.push(Slot { node, interval });
        stratum.labels.push(position < cases);
    }
}

impl Randomizer for CaseLabelPermutation {
    fn name(&self) -> &'static str {
        "case-label-permutation"
    }

    fn randomize(
        &self,
        replica: usize,
        _tree: &TreeModel,
        buffer: &mut SimulationBuffer,
    ) -> Result<(), ScanError> {
        let mut rng = RngHandle::for_replica(self.seed, replica);
        for stratum in &self.strata {
            let labels = permute_by_keys(&stratum.labels, &mut rng);
            for (slot, is_case) in stratum.slots.iter().zip(labels) {
                if !is_case {
                    continue;
                }
                match slot.interval {
                    Some(interval) => buffer.add_cases_at(slot.node, interval, 1),
                    None => buffer.add_cases(slot.node, 1),
                }
            }
        }
        Ok(())
    }

    fn conserves_total(&self) -> bool {
        true
    }
}

/// Node labels of cases permuted over their fixed case times, preserving
/// both node totals and interval totals.
#[derive(Debug, Clone)]
pub struct NodeTimePermutation {
    seed: u64,
    times: Vec<usize>,
    nodes: Vec<NodeIndex>,
}

impl NodeTimePermutation {
    /// Builds one record per observed case.
    pub fn new(seed: u64, tree: &TreeModel) -> Self {
        let mut times = Vec::new();
        let mut nodes = Vec::new();
        for node in tree.nodes() {
            for (interval, &cases) in node.internal_cases_series().iter().enumerate() {
                for _ in 0..cases.max(0) {
                    times.push(interval);
                    nodes.push(node.index());
                }
            }
        }
        Self { seed, times, nodes }
    }
}

impl Randomizer for NodeTimePermutation {
    fn name(&self) -> &'static str {
        "node-time-permutation"
    }

    fn randomize(
        &self,
        replica: usize,
        _tree: &TreeModel,
        buffer: &mut SimulationBuffer,
    ) -> Result<(), ScanError> {
        let mut rng = RngHandle::for_replica(self.seed, replica);
        let nodes = permute_by_keys(&self.nodes, &mut rng);
        for (&interval, node) in self.times.iter().zip(nodes) {
            buffer.add_cases_at(node, interval, 1);
        }
        Ok(())
    }

    fn conserves_total(&self) -> bool {
        true
    }
}
