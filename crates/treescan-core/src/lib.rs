#![deny(missing_docs)]
#![doc = "Core errors, seeding, configuration and provenance types for the TreeScan engine."]

/// Analysis configuration schema and defaults.
pub mod config;
pub mod errors;
mod ids;
pub mod provenance;
pub mod rng;
/// Canonical JSON/YAML helpers and stable hashing.
pub mod serde;

pub use config::{
    AnalysisConfig, ConditionalType, CutType, ModelType, OutputConfig, ScanType,
    SequentialConfig, TemporalConfig, TimeRange,
};
pub use errors::{ErrorInfo, ErrorKind, ScanError};
pub use ids::{NodeIndex, TimeWindow};
pub use provenance::{RunProvenance, SchemaVersion};
pub use rng::{check_seed_range, derive_substream_seed, RngHandle, MAX_RANDOMIZATION_SEED};
