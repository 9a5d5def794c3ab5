#![deny(missing_docs)]
#![doc = "Randomizers producing null-hypothesis replicas, plus replica archives."]

mod archive;
mod factory;
mod generator;
mod randomizer;

pub use archive::{RecordedNode, ReplicaArchive, ReplicaRecord, REPLICA_SCHEMA};
pub use factory::build_randomizer;
pub use generator::{RandomizationSource, ReplicaGenerator};
pub use randomizer::{
    permute_by_keys, BernoulliRandomizer, CaseLabelPermutation, ConditionalPoissonRandomizer,
    NodeTimePermutation, PoissonRandomizer, Randomizer, SignFlipRandomizer, Slot,
    UniformTimeRandomizer,
};
