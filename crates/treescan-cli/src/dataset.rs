//! JSON input format describing a tree and its counts.

use std::path::Path;

use serde::{Deserialize, Serialize};
use treescan_core::errors::{ErrorInfo, ScanError};
use treescan_core::serde::read_json;
use treescan_core::{AnalysisConfig, CutType};
use treescan_tree::{SiteObservation, TreeBuilder, TreeModel};

/// A node declaration.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct NodeRecord {
    /// Unique identifier.
    pub id: String,
    /// Parent identifiers; empty for roots.
    #[serde(default)]
    pub parents: Vec<String>,
    /// Cut type overriding the configured default.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub cut_type: Option<CutType>,
}

/// Cases and measure attributed to a node, optionally at a time value.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CountRecord {
    /// Node identifier.
    pub id: String,
    /// Observed cases.
    pub cases: i64,
    /// Expected cases or observations. Unused by the uniform model.
    #[serde(default)]
    pub measure: f64,
    /// Absolute time value, required by temporal scans.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub time: Option<i64>,
}

/// Last time value at which a node's cases are observable.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CensorRecord {
    /// Node identifier.
    pub id: String,
    /// Absolute time value.
    pub time: i64,
}

/// Paired measurement for the signed-rank model.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SiteRecord {
    /// Node identifier.
    pub id: String,
    /// Site index shared across nodes.
    pub site: usize,
    /// Baseline measurement.
    pub baseline: f64,
    /// Current measurement.
    pub current: f64,
}

/// Complete input data set.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct Dataset {
    /// Node declarations in any order.
    pub nodes: Vec<NodeRecord>,
    /// Count records; several records for one node are summed.
    #[serde(default)]
    pub counts: Vec<CountRecord>,
    /// Censoring times.
    #[serde(default)]
    pub censoring: Vec<CensorRecord>,
    /// Site observations.
    #[serde(default)]
    pub sites: Vec<SiteRecord>,
}

fn time_index(config: &AnalysisConfig, id: &str, time: i64) -> Result<usize, ScanError> {
    config.temporal.index_of(time).ok_or_else(|| {
        ScanError::Configuration(
            ErrorInfo::new("time-out-of-range", "time value outside the data range")
                .with_context("node", id)
                .with_context("time", time.to_string()),
        )
    })
}

impl Dataset {
    /// Reads a data set from a JSON file.
    pub fn load(path: &Path) -> Result<Self, ScanError> {
        read_json(path)
    }

    /// Builds the tree the configured scan runs on. Temporal scans bucket
    /// counts by the configured data range; tree-only scans ignore times.
    pub fn build_tree(&self, config: &AnalysisConfig) -> Result<TreeModel, ScanError> {
        let temporal = config.is_temporal();
        let mut builder = if temporal {
            TreeBuilder::with_intervals(config.temporal.intervals())
        } else {
            TreeBuilder::new()
        };
        for node in &self.nodes {
            builder.add_node(&node.id, node.parents.iter().cloned())?;
            if let Some(cut_type) = node.cut_type {
                builder.set_cut_type(&node.id, cut_type)?;
            }
        }
        for count in &self.counts {
            match (temporal, count.time) {
                (true, Some(time)) => {
                    let interval = time_index(config, &count.id, time)?;
                    builder.add_counts_at(&count.id, interval, count.cases, count.measure)?;
                }
                _ => builder.add_counts(&count.id, count.cases, count.measure)?,
            }
        }
        for censor in &self.censoring {
            let interval = time_index(config, &censor.id, censor.time)?;
            builder.set_censor(&censor.id, interval)?;
        }
        for site in &self.sites {
            builder.add_site(
                &site.id,
                SiteObservation {
                    site: site.site,
                    baseline: site.baseline,
                    current: site.current,
                },
            )?;
        }
        builder.build()
    }
}
