use std::fs;
use std::path::{Path, PathBuf};

use serde::{Deserialize, Serialize};
use tracing::info;
use treescan_core::errors::{ErrorInfo, ScanError};
use treescan_core::serde::{read_json, write_json};
use treescan_core::SchemaVersion;
use treescan_tree::{SimulationBuffer, TreeModel};

/// Internal values of one node in a stored replica.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RecordedNode {
    /// Node identifier.
    pub id: String,
    /// Simulated internal cases.
    pub cases: i64,
    /// Non-zero `(interval, cases)` pairs for temporal data.
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub series: Vec<(usize, i64)>,
}

/// Version of the replica file layout.
pub const REPLICA_SCHEMA: SchemaVersion = SchemaVersion::new(1, 0);

/// One replica as stored on disk. Only nodes with cases are listed.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ReplicaRecord {
    /// File layout version.
    pub schema: SchemaVersion,
    /// Replica index.
    pub replica: usize,
    /// Nodes with simulated cases.
    pub nodes: Vec<RecordedNode>,
    /// Sites whose sign was flipped.
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub flipped_sites: Vec<usize>,
}

impl ReplicaRecord {
    /// Captures the internal values of a filled buffer.
    pub fn capture(replica: usize, tree: &TreeModel, buffer: &SimulationBuffer) -> Self {
        let nodes = tree
            .nodes()
            .iter()
            .zip(buffer.nodes())
            .filter(|(_, simulated)| simulated.internal_cases() != 0)
            .map(|(node, simulated)| RecordedNode {
                id: node.id().to_string(),
                cases: simulated.internal_cases(),
                series: simulated
                    .internal_cases_series()
                    .iter()
                    .enumerate()
                    .filter(|(_, cases)| **cases != 0)
                    .map(|(interval, cases)| (interval, *cases))
                    .collect(),
            })
            .collect();
        let flipped_sites = buffer
            .site_signs()
            .iter()
            .enumerate()
            .filter(|(_, sign)| **sign < 0.0)
            .map(|(site, _)| site)
            .collect();
        Self {
            schema: REPLICA_SCHEMA,
            replica,
            nodes,
            flipped_sites,
        }
    }

    /// Writes the recorded values into a cleared buffer.
    pub fn restore(&self, tree: &TreeModel, buffer: &mut SimulationBuffer) -> Result<(), ScanError> {
        for node in &self.nodes {
            let index = tree.lookup(&node.id).ok_or_else(|| {
                ScanError::Io(
                    mismatch("replica names a node missing from the tree", self.replica)
                        .with_context("node", node.id.clone()),
                )
            })?;
            if node.series.is_empty() {
                if tree.intervals() > 0 && node.cases != 0 {
                    return Err(ScanError::Io(
                        mismatch("temporal replica without interval counts", self.replica)
                            .with_context("node", node.id.clone()),
                    ));
                }
                buffer.add_cases(index, node.cases);
                continue;
            }
            let mut total = 0;
            for &(interval, cases) in &node.series {
                if interval >= tree.intervals() {
                    return Err(ScanError::Io(
                        mismatch("replica interval outside the data range", self.replica)
                            .with_context("node", node.id.clone())
                            .with_context("interval", interval.to_string()),
                    ));
                }
                buffer.add_cases_at(index, interval, cases);
                total += cases;
            }
            if total != node.cases {
                return Err(ScanError::Io(
                    mismatch("replica series does not sum to the node total", self.replica)
                        .with_context("node", node.id.clone()),
                ));
            }
        }
        for &site in &self.flipped_sites {
            if site >= tree.site_count() {
                return Err(ScanError::Io(
                    mismatch("replica flips an unknown site", self.replica)
                        .with_context("site", site.to_string()),
                ));
            }
            buffer.set_site_flipped(site, true);
        }
        Ok(())
    }
}

fn mismatch(message: &str, replica: usize) -> ErrorInfo {
    ErrorInfo::new("replica-mismatch", message).with_context("replica", replica.to_string())
}

/// Directory holding one JSON file per replica.
#[derive(Debug, Clone)]
pub struct ReplicaArchive {
    root: PathBuf,
}

impl ReplicaArchive {
    /// Creates the directory if needed and returns an archive writing into it.
    pub fn create(root: &Path) -> Result<Self, ScanError> {
        fs::create_dir_all(root).map_err(|err| {
            ScanError::Io(
                ErrorInfo::new("replica-archive-mkdir", err.to_string())
                    .with_context("path", root.display().to_string()),
            )
        })?;
        info!(path = %root.display(), "recording replicas");
        Ok(Self {
            root: root.to_path_buf(),
        })
    }

    /// Opens an existing archive for reading.
    pub fn open(root: &Path) -> Result<Self, ScanError> {
        if !root.is_dir() {
            return Err(ScanError::Io(
                ErrorInfo::new("replica-archive-missing", "replica archive directory not found")
                    .with_context("path", root.display().to_string()),
            ));
        }
        info!(path = %root.display(), "replaying replicas");
        Ok(Self {
            root: root.to_path_buf(),
        })
    }

    /// Directory of the archive.
    pub fn root(&self) -> &Path {
        &self.root
    }

    /// File storing a replica.
    pub fn path_for(&self, replica: usize) -> PathBuf {
        self.root.join(format!("replica_{replica:06}.json"))
    }

    /// Stores the internal values of a filled buffer.
    pub fn write(&self, replica: usize, tree: &TreeModel, buffer: &SimulationBuffer) -> Result<(), ScanError> {
        write_json(&self.path_for(replica), &ReplicaRecord::capture(replica, tree, buffer))
    }

    /// Loads a replica into a cleared buffer.
    pub fn read(&self, replica: usize, tree: &TreeModel, buffer: &mut SimulationBuffer) -> Result<(), ScanError> {
        let record: ReplicaRecord = read_json(&self.path_for(replica))?;
        if !REPLICA_SCHEMA.can_read(record.schema) {
            return Err(ScanError::Io(
                ErrorInfo::new("replica-schema", "replica file was written by an incompatible version")
                    .with_context("replica", replica.to_string())
                    .with_context("found", record.schema.to_string())
                    .with_context("expected", REPLICA_SCHEMA.to_string()),
            ));
        }
        if record.replica != replica {
            return Err(ScanError::Io(
                mismatch("replica file holds a different replica", replica)
                    .with_context("found", record.replica.to_string()),
            ));
        }
        record.restore(tree, buffer)
    }
}
