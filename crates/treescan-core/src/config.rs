use std::collections::BTreeMap;
use std::fs;
use std::path::{Path, PathBuf};

use serde::{Deserialize, Serialize};

use crate::errors::{ErrorInfo, ScanError};
use crate::rng::check_seed_range;

/// Which dimensions of the data are scanned.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum ScanType {
    /// Scan over tree cuts only.
    TreeOnly,
    /// Scan over tree cuts and temporal windows.
    TreeTime,
    /// Scan over temporal windows of the whole tree.
    TimeOnly,
}

/// Probability model used for the likelihood ratio.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum ModelType {
    /// Poisson counts against an expectation.
    Poisson,
    /// Cases among observations.
    Bernoulli,
    /// Cases uniformly distributed over time under the null.
    Uniform,
    /// Cases among observations recorded per time interval.
    BernoulliTime,
    /// Paired baseline/current differences per site.
    SignedRank,
}

/// Which totals the null hypothesis conditions on.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum ConditionalType {
    /// Nothing is held fixed.
    Unconditional,
    /// The total number of cases is held fixed.
    TotalCases,
    /// Each node's case total is held fixed.
    Node,
    /// Node totals and time-interval totals are both held fixed.
    NodeAndTime,
}

/// Rule used to combine a node's children into candidate cuts.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum CutType {
    /// Only the node's own branch.
    Simple,
    /// Contiguous runs of at least two children.
    Ordinal,
    /// Every pair of children.
    Pairs,
    /// Every pair plus triplets bounded by a pair.
    Triplets,
    /// Every proper subset of at least two children.
    Combinatorial,
}

/// YAML-configurable parameters governing an analysis.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AnalysisConfig {
    /// Dimensions scanned by the analysis.
    #[serde(default = "default_scan_type")]
    pub scan_type: ScanType,
    /// Probability model.
    #[serde(default = "default_model")]
    pub model: ModelType,
    /// Conditioning of the null hypothesis.
    #[serde(default = "default_conditional")]
    pub conditional: ConditionalType,
    /// Cut type applied to nodes without an explicit override.
    #[serde(default = "default_cut_type")]
    pub default_cut_type: CutType,
    /// Per-node cut type overrides keyed by node identifier.
    #[serde(default)]
    pub cut_types: BTreeMap<String, CutType>,
    /// Number of Monte Carlo replicas.
    #[serde(default = "default_replicas")]
    pub replicas: usize,
    /// Number of worker threads.
    #[serde(default = "default_parallelism")]
    pub parallelism: usize,
    /// Base randomization seed.
    #[serde(default = "default_seed")]
    pub seed: u64,
    /// Nodes must have strictly more branch cases than this to be evaluated.
    #[serde(default)]
    pub node_minimum: i64,
    /// Tree levels (root = 1) that are never evaluated.
    #[serde(default)]
    pub restricted_levels: Vec<u32>,
    /// Node identifiers that are never evaluated.
    #[serde(default)]
    pub excluded_nodes: Vec<String>,
    /// Event probability for the unconditional Bernoulli model. Derived from
    /// the data totals when absent.
    #[serde(default)]
    pub event_probability: Option<f64>,
    /// Number of cuts retained from the observed scan.
    #[serde(default = "default_cut_capacity")]
    pub cut_capacity: usize,
    /// Only cuts with a p-value at or below this cutoff are reported.
    #[serde(default)]
    pub report_pvalue_cutoff: Option<f64>,
    /// Temporal window settings for tree-time and time-only scans.
    #[serde(default)]
    pub temporal: TemporalConfig,
    /// Sequential analysis and alpha spending.
    #[serde(default)]
    pub sequential: SequentialConfig,
    /// Replica archive and output settings.
    #[serde(default)]
    pub output: OutputConfig,
}

fn default_scan_type() -> ScanType {
    ScanType::TreeOnly
}

fn default_model() -> ModelType {
    ModelType::Poisson
}

fn default_conditional() -> ConditionalType {
    ConditionalType::TotalCases
}

fn default_cut_type() -> CutType {
    CutType::Simple
}

fn default_replicas() -> usize {
    999
}

fn default_parallelism() -> usize {
    1
}

fn default_seed() -> u64 {
    12_345_678
}

fn default_cut_capacity() -> usize {
    2000
}

impl Default for AnalysisConfig {
    fn default() -> Self {
        Self {
            scan_type: default_scan_type(),
            model: default_model(),
            conditional: default_conditional(),
            default_cut_type: default_cut_type(),
            cut_types: BTreeMap::new(),
            replicas: default_replicas(),
            parallelism: default_parallelism(),
            seed: default_seed(),
            node_minimum: 0,
            restricted_levels: Vec::new(),
            excluded_nodes: Vec::new(),
            event_probability: None,
            cut_capacity: default_cut_capacity(),
            report_pvalue_cutoff: None,
            temporal: TemporalConfig::default(),
            sequential: SequentialConfig::default(),
            output: OutputConfig::default(),
        }
    }
}

/// Inclusive range of absolute time values.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct TimeRange {
    /// First time value.
    pub start: i64,
    /// Last time value.
    pub end: i64,
}

impl TimeRange {
    /// Number of time intervals covered by the range.
    pub fn length(&self) -> usize {
        if self.end < self.start {
            0
        } else {
            (self.end - self.start + 1) as usize
        }
    }

    fn contains(&self, other: &TimeRange) -> bool {
        other.start >= self.start && other.end <= self.end && other.start <= other.end
    }
}

/// Temporal window configuration.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TemporalConfig {
    /// Time range covered by the data.
    #[serde(default = "default_data_range")]
    pub data_range: TimeRange,
    /// Range of allowed window start times. Defaults to the data range.
    #[serde(default)]
    pub start_range: Option<TimeRange>,
    /// Range of allowed window end times. Defaults to the data range.
    #[serde(default)]
    pub end_range: Option<TimeRange>,
    /// Minimum window length in intervals.
    #[serde(default = "default_min_window")]
    pub min_window: usize,
    /// Maximum window length in intervals. Defaults to half the data range.
    #[serde(default)]
    pub max_window: Option<usize>,
}

fn default_data_range() -> TimeRange {
    TimeRange { start: 1, end: 1 }
}

fn default_min_window() -> usize {
    1
}

impl Default for TemporalConfig {
    fn default() -> Self {
        Self {
            data_range: default_data_range(),
            start_range: None,
            end_range: None,
            min_window: default_min_window(),
            max_window: None,
        }
    }
}

impl TemporalConfig {
    /// Number of time intervals in the data range.
    pub fn intervals(&self) -> usize {
        self.data_range.length()
    }

    /// Effective maximum window length.
    pub fn effective_max_window(&self) -> usize {
        self.max_window
            .unwrap_or_else(|| (self.intervals() / 2).max(1))
            .min(self.intervals())
    }

    /// Window start range expressed as zero based interval indices.
    pub fn start_indices(&self) -> (usize, usize) {
        self.to_indices(self.start_range.unwrap_or(self.data_range))
    }

    /// Window end range expressed as zero based interval indices.
    pub fn end_indices(&self) -> (usize, usize) {
        self.to_indices(self.end_range.unwrap_or(self.data_range))
    }

    /// Converts an absolute time value into an interval index.
    pub fn index_of(&self, time: i64) -> Option<usize> {
        if time < self.data_range.start || time > self.data_range.end {
            None
        } else {
            Some((time - self.data_range.start) as usize)
        }
    }

    /// Converts an interval index back into an absolute time value.
    pub fn time_of(&self, index: usize) -> i64 {
        self.data_range.start + index as i64
    }

    fn to_indices(&self, range: TimeRange) -> (usize, usize) {
        let start = (range.start - self.data_range.start).max(0) as usize;
        let end = (range.end - self.data_range.start).max(0) as usize;
        (start, end)
    }
}

/// Sequential analysis settings.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SequentialConfig {
    /// Whether the analysis is one look of a sequential scan.
    #[serde(default)]
    pub enabled: bool,
    /// Total alpha budget across all looks.
    #[serde(default = "default_overall_alpha")]
    pub overall_alpha: f64,
    /// Alpha spent by each look.
    #[serde(default = "default_look_alpha")]
    pub look_alpha: f64,
    /// File persisting the sequential statistic between looks.
    #[serde(default)]
    pub state_file: Option<PathBuf>,
}

fn default_overall_alpha() -> f64 {
    0.05
}

fn default_look_alpha() -> f64 {
    0.01
}

impl Default for SequentialConfig {
    fn default() -> Self {
        Self {
            enabled: false,
            overall_alpha: default_overall_alpha(),
            look_alpha: default_look_alpha(),
            state_file: None,
        }
    }
}

/// Output and replica archive configuration.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct OutputConfig {
    /// CSV file receiving the per-replica maximum LLR stream.
    #[serde(default)]
    pub replica_llr_file: Option<PathBuf>,
    /// Directory where generated replicas are written.
    #[serde(default)]
    pub write_replicas: Option<PathBuf>,
    /// Directory from which replicas are read instead of generated.
    #[serde(default)]
    pub read_replicas: Option<PathBuf>,
}

fn invalid(code: &str, message: impl Into<String>) -> ScanError {
    ScanError::Configuration(ErrorInfo::new(code, message))
}

impl AnalysisConfig {
    /// Loads a configuration from a YAML file.
    pub fn load(path: &Path) -> Result<Self, ScanError> {
        let bytes = fs::read(path).map_err(|err| {
            ScanError::Io(
                ErrorInfo::new("config-read", err.to_string())
                    .with_context("path", path.display().to_string()),
            )
        })?;
        crate::serde::from_yaml_slice(&bytes).map_err(|err| err.with_frame(path.display().to_string()))
    }

    /// Number of worker threads actually started by the scheduler.
    pub fn worker_count(&self) -> usize {
        self.parallelism.max(1).min(self.replicas.max(1))
    }

    /// Whether the analysis scans temporal windows.
    pub fn is_temporal(&self) -> bool {
        !matches!(self.scan_type, ScanType::TreeOnly)
    }

    /// Performs the structural checks the engine relies on.
    pub fn validate(&self) -> Result<(), ScanError> {
        if self.parallelism == 0 {
            return Err(invalid("parallelism", "parallelism must be at least one"));
        }
        if self.cut_capacity == 0 {
            return Err(invalid("cut-capacity", "cut capacity must be at least one"));
        }
        if self.node_minimum < 0 {
            return Err(invalid("node-minimum", "node minimum cannot be negative"));
        }
        check_seed_range(self.seed, self.replicas)?;
        self.validate_model()?;
        if let Some(probability) = self.event_probability {
            if !(probability > 0.0 && probability < 1.0) {
                return Err(invalid(
                    "event-probability",
                    "event probability must lie strictly between 0 and 1",
                ));
            }
        }
        if let Some(cutoff) = self.report_pvalue_cutoff {
            if !(cutoff > 0.0 && cutoff <= 1.0) {
                return Err(invalid("pvalue-cutoff", "p-value cutoff must lie in (0, 1]"));
            }
        }
        if self.is_temporal() {
            self.validate_temporal()?;
        }
        if self.sequential.enabled {
            self.validate_sequential()?;
        }
        if self.output.read_replicas.is_some() && self.output.write_replicas.is_some() {
            return Err(invalid(
                "replica-archive",
                "replicas cannot be read and written in the same analysis",
            ));
        }
        Ok(())
    }

    fn validate_model(&self) -> Result<(), ScanError> {
        use ConditionalType::*;
        use ModelType::*;
        let supported = match self.scan_type {
            ScanType::TreeOnly => matches!(
                (self.model, self.conditional),
                (Poisson, Unconditional)
                    | (Poisson, TotalCases)
                    | (Bernoulli, Unconditional)
                    | (Bernoulli, TotalCases)
                    | (SignedRank, Unconditional)
            ),
            ScanType::TreeTime => matches!(
                (self.model, self.conditional),
                (Uniform, Node) | (Uniform, NodeAndTime) | (BernoulliTime, Node)
            ),
            ScanType::TimeOnly => matches!((self.model, self.conditional), (Uniform, TotalCases)),
        };
        if supported {
            Ok(())
        } else {
            Err(ScanError::Configuration(
                ErrorInfo::new("model-unsupported", "model is not available for this scan type")
                    .with_context("scan_type", format!("{:?}", self.scan_type))
                    .with_context("model", format!("{:?}", self.model))
                    .with_context("conditional", format!("{:?}", self.conditional)),
            ))
        }
    }

    fn validate_temporal(&self) -> Result<(), ScanError> {
        let temporal = &self.temporal;
        let data = temporal.data_range;
        if data.length() == 0 {
            return Err(invalid("time-range", "data time range is empty"));
        }
        for (label, range) in [("start", temporal.start_range), ("end", temporal.end_range)] {
            if let Some(range) = range {
                if !data.contains(&range) {
                    return Err(ScanError::Configuration(
                        ErrorInfo::new("window-range", "window range lies outside the data range")
                            .with_context("range", label),
                    ));
                }
            }
        }
        if temporal.min_window == 0 || temporal.min_window > temporal.effective_max_window() {
            return Err(invalid(
                "window-length",
                "minimum window length must be positive and not exceed the maximum",
            ));
        }
        let (start_lo, _) = temporal.start_indices();
        let (_, end_hi) = temporal.end_indices();
        if end_hi < start_lo {
            return Err(invalid("window-range", "end range precedes start range"));
        }
        Ok(())
    }

    fn validate_sequential(&self) -> Result<(), ScanError> {
        let seq = &self.sequential;
        if !(seq.overall_alpha > 0.0 && seq.overall_alpha < 1.0) {
            return Err(invalid("overall-alpha", "overall alpha must lie in (0, 1)"));
        }
        if !(seq.look_alpha > 0.0 && seq.look_alpha <= seq.overall_alpha) {
            return Err(invalid(
                "look-alpha",
                "look alpha must be positive and not exceed the overall alpha",
            ));
        }
        if seq.look_alpha * (self.replicas as f64 + 1.0) < 1.0 {
            return Err(ScanError::Configuration(
                ErrorInfo::new("look-replicas", "too few replicas for the look alpha")
                    .with_context("replicas", self.replicas.to_string())
                    .with_hint("use at least 1 / look_alpha - 1 replicas"),
            ));
        }
        Ok(())
    }
}
