use std::collections::BTreeMap;

use serde::{Deserialize, Serialize};
use treescan_core::errors::{ErrorKind, ScanError};
use treescan_core::{RunProvenance, SchemaVersion, TemporalConfig};
use treescan_cuts::Cut;
use treescan_llr::LikelihoodModel;
use treescan_tree::TreeModel;

use crate::critical::CriticalValues;
use crate::sequential::SequentialStatistic;

/// Version of the analysis report layout.
pub const REPORT_SCHEMA: SchemaVersion = SchemaVersion::new(1, 0);

/// How an analysis ended.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "status", content = "kind", rename_all = "kebab-case")]
pub enum CompletionStatus {
    /// Every requested replica was applied.
    Completed,
    /// The caller canceled the run.
    Canceled,
    /// The sequential early-termination threshold was reached.
    AutoAborted,
    /// A replica failed.
    Failed(ErrorKind),
}

/// Inclusive time window expressed in data time units.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct ReportedWindow {
    /// First time value.
    pub start: i64,
    /// Last time value.
    pub end: i64,
}

/// A ranked cut as presented to report writers.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ReportedCut {
    /// One based position in the ranked list.
    pub report_order: usize,
    /// Identifier of the owning node.
    pub node_id: String,
    /// Identifiers of merged children, empty for simple cuts.
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub merged: Vec<String>,
    /// Observed cases.
    pub cases: i64,
    /// Expected cases.
    pub expected: f64,
    /// Observed over expected.
    pub relative_risk: Option<f64>,
    /// Observed minus expected.
    pub excess_cases: f64,
    /// Log-likelihood ratio.
    pub llr: f64,
    /// Replicas meeting or exceeding the cut's LLR.
    pub rank: u64,
    /// Monte Carlo p-value, absent when no replica could be used.
    pub p_value: Option<f64>,
    /// Time window for temporal scans.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub window: Option<ReportedWindow>,
}

impl ReportedCut {
    /// Resolves node indices to identifiers and time indices to time values.
    pub fn from_cut(cut: &Cut, tree: &TreeModel, temporal: &TemporalConfig, replicas: Option<usize>) -> Self {
        Self {
            report_order: cut.report_order,
            node_id: tree.node(cut.node).id().to_string(),
            merged: cut
                .members
                .iter()
                .map(|member| tree.node(*member).id().to_string())
                .collect(),
            cases: cut.cases,
            expected: cut.expected,
            relative_risk: cut.relative_risk(),
            excess_cases: cut.excess_cases(),
            llr: cut.llr,
            rank: cut.rank,
            p_value: replicas.map(|count| cut.p_value(count)),
            window: cut.window.map(|window| ReportedWindow {
                start: temporal.time_of(window.start),
                end: temporal.time_of(window.end),
            }),
        }
    }
}

/// Everything an analysis produced.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AnalysisReport {
    /// Report layout version.
    pub schema: SchemaVersion,
    /// How the run ended.
    pub status: CompletionStatus,
    /// Failure that ended the run, if any.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub error: Option<ScanError>,
    /// Likelihood used for scoring.
    pub model: LikelihoodModel,
    /// Randomizer used for replicas.
    pub randomizer: String,
    /// Top cut LLR plus the model adjustment.
    pub test_statistic: f64,
    /// Ranked cuts, best first.
    pub cuts: Vec<ReportedCut>,
    /// Replicas requested.
    pub requested_replicas: usize,
    /// Replicas applied to the ranks.
    pub completed_replicas: usize,
    /// Maximum LLR of each applied replica in index order.
    pub replica_llrs: Vec<f64>,
    /// Critical values at the standard levels.
    pub critical_values: CriticalValues,
    /// LLRs of replicas that completed after a failure and were not ranked.
    #[serde(default, skip_serializing_if = "BTreeMap::is_empty")]
    pub diagnostics: BTreeMap<usize, f64>,
    /// Sequential state after this look.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub sequential: Option<SequentialStatistic>,
    /// Hashes and seed identifying the run.
    pub provenance: RunProvenance,
}

impl AnalysisReport {
    /// Whether the run produced usable significance results.
    pub fn is_success(&self) -> bool {
        !matches!(self.status, CompletionStatus::Failed(_))
    }
}
