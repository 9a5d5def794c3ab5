//! Provenance and schema descriptors shared across TreeScan artefacts.

use std::collections::BTreeMap;
use std::fmt;

use serde::{Deserialize, Serialize};

/// Version stamped into every persisted TreeScan document. Readers accept
/// documents with the same major version.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Serialize, Deserialize)]
pub struct SchemaVersion {
    /// Bumped when older readers can no longer load the document.
    pub major: u32,
    /// Bumped when fields are added.
    pub minor: u32,
}

impl SchemaVersion {
    /// Creates a schema version.
    pub const fn new(major: u32, minor: u32) -> Self {
        Self { major, minor }
    }

    /// Whether a reader at this version can load a document stamped `found`.
    pub fn can_read(&self, found: SchemaVersion) -> bool {
        self.major == found.major
    }
}

impl fmt::Display for SchemaVersion {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}.{}", self.major, self.minor)
    }
}

/// Provenance information attached to every analysis report.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, Default)]
pub struct RunProvenance {
    /// Hash of the analysis configuration used to produce the data.
    pub config_hash: String,
    /// Canonical hash of the tree and its counts.
    pub tree_hash: String,
    /// Base randomization seed.
    pub seed: u64,
    /// RFC 3339 timestamp recording when the artefact was generated.
    pub created_at: String,
    /// Version map for all tools involved in the run.
    pub tool_versions: BTreeMap<String, String>,
}

impl RunProvenance {
    /// Builds provenance stamped with the current UTC time.
    pub fn stamped(config_hash: String, tree_hash: String, seed: u64) -> Self {
        let mut tool_versions = BTreeMap::new();
        tool_versions.insert(
            "treescan-core".to_string(),
            env!("CARGO_PKG_VERSION").to_string(),
        );
        Self {
            config_hash,
            tree_hash,
            seed,
            created_at: chrono::Utc::now().to_rfc3339(),
            tool_versions,
        }
    }
}
