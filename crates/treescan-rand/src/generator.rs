use treescan_core::errors::{ErrorInfo, ScanError};
use treescan_core::AnalysisConfig;
use treescan_tree::{SimulationBuffer, TreeModel};

use crate::archive::ReplicaArchive;
use crate::factory::build_randomizer;
use crate::randomizer::Randomizer;

/// Where replica internal values come from.
#[derive(Debug, Clone)]
pub enum RandomizationSource {
    /// Draw every replica.
    Generate,
    /// Draw every replica and store it in the archive.
    Record(ReplicaArchive),
    /// Read every replica from the archive instead of drawing it.
    Replay(ReplicaArchive),
}

/// Produces fully propagated replicas into worker buffers.
pub struct ReplicaGenerator {
    randomizer: Box<dyn Randomizer>,
    source: RandomizationSource,
    expected_total: i64,
}

impl std::fmt::Debug for ReplicaGenerator {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ReplicaGenerator")
            .field("randomizer", &self.randomizer.name())
            .field("source", &self.source)
            .field("expected_total", &self.expected_total)
            .finish()
    }
}

impl ReplicaGenerator {
    /// Wraps a randomizer and source. `tree` supplies the observed case total
    /// every conserving replica is checked against.
    pub fn new(randomizer: Box<dyn Randomizer>, source: RandomizationSource, tree: &TreeModel) -> Self {
        Self {
            randomizer,
            source,
            expected_total: tree.total_cases(),
        }
    }

    /// Builds the randomizer and archive the configuration asks for.
    pub fn from_config(config: &AnalysisConfig, tree: &TreeModel) -> Result<Self, ScanError> {
        let randomizer = build_randomizer(config, tree)?;
        let source = match (&config.output.write_replicas, &config.output.read_replicas) {
            (_, Some(path)) => RandomizationSource::Replay(ReplicaArchive::open(path)?),
            (Some(path), None) => RandomizationSource::Record(ReplicaArchive::create(path)?),
            (None, None) => RandomizationSource::Generate,
        };
        Ok(Self::new(randomizer, source, tree))
    }

    /// Name of the underlying randomizer.
    pub fn randomizer_name(&self) -> &'static str {
        self.randomizer.name()
    }

    /// Case total every replica must reproduce, when the randomizer
    /// conserves it.
    pub fn conserved_total(&self) -> Option<i64> {
        self.randomizer.conserves_total().then_some(self.expected_total)
    }

    /// Clears `buffer`, fills it with replica `replica` and propagates branch
    /// totals. Conserving randomizers are checked against the observed total.
    pub fn generate(
        &self,
        replica: usize,
        tree: &TreeModel,
        buffer: &mut SimulationBuffer,
    ) -> Result<(), ScanError> {
        buffer.clear();
        match &self.source {
            RandomizationSource::Generate => self.randomizer.randomize(replica, tree, buffer)?,
            RandomizationSource::Record(archive) => {
                self.randomizer.randomize(replica, tree, buffer)?;
                archive.write(replica, tree, buffer)?;
            }
            RandomizationSource::Replay(archive) => archive.read(replica, tree, buffer)?,
        }
        buffer.propagate(tree);
        if self.randomizer.conserves_total() {
            let simulated = buffer.total_cases();
            if simulated != self.expected_total {
                return Err(ScanError::Program(
                    ErrorInfo::new("total-mismatch", "replica case total differs from the observed total")
                        .with_context("randomizer", self.randomizer.name())
                        .with_context("expected", self.expected_total.to_string())
                        .with_context("simulated", simulated.to_string()),
                ));
            }
        }
        Ok(())
    }
}
