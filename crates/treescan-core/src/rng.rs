//! Deterministic RNG wrapper and seed-derivation helpers.

use rand::rngs::StdRng;
use rand::{RngCore, SeedableRng};
use siphasher::sip::SipHasher13;
use std::hash::Hasher;

use crate::errors::{ErrorInfo, ScanError};

/// Largest base seed accepted once the replica count has been added to it.
pub const MAX_RANDOMIZATION_SEED: u64 = 2_147_483_647;

/// Deterministic RNG handle exposed to TreeScan consumers.
///
/// The handle is a thin wrapper around `StdRng` that documents the seeding
/// policy used throughout the project. Every replica owns its own handle,
/// seeded from `derive_substream_seed(base_seed, replica_index)`, so a replica
/// draws the same values no matter which worker thread evaluates it.
#[derive(Debug, Clone)]
pub struct RngHandle {
    rng: StdRng,
}

impl RngHandle {
    /// Creates a new RNG handle from a master seed.
    pub fn from_seed(seed: u64) -> Self {
        Self {
            rng: StdRng::seed_from_u64(seed),
        }
    }

    /// Creates the handle used by a specific replica.
    pub fn for_replica(base_seed: u64, replica_index: usize) -> Self {
        Self::from_seed(derive_substream_seed(base_seed, replica_index as u64))
    }
}

impl RngCore for RngHandle {
    fn next_u32(&mut self) -> u32 {
        self.rng.next_u32()
    }

    fn next_u64(&mut self) -> u64 {
        self.rng.next_u64()
    }

    fn fill_bytes(&mut self, dest: &mut [u8]) {
        self.rng.fill_bytes(dest)
    }

    fn try_fill_bytes(&mut self, dest: &mut [u8]) -> Result<(), rand::Error> {
        self.rng.try_fill_bytes(dest)
    }
}

/// Derives the deterministic seed for a specific substream.
pub fn derive_substream_seed(master_seed: u64, substream: u64) -> u64 {
    let mut hasher = SipHasher13::new_with_keys(0, 0);
    hasher.write_u64(master_seed);
    hasher.write_u64(substream);
    hasher.finish()
}

/// Ensures `base_seed + replicas` stays within the supported seed range.
pub fn check_seed_range(base_seed: u64, replicas: usize) -> Result<(), ScanError> {
    let within = base_seed
        .checked_add(replicas as u64)
        .map(|last| last <= MAX_RANDOMIZATION_SEED)
        .unwrap_or(false);
    if within {
        Ok(())
    } else {
        Err(ScanError::Configuration(
            ErrorInfo::new("seed-out-of-range", "randomization seed overflows across replicas")
                .with_context("seed", base_seed.to_string())
                .with_context("replicas", replicas.to_string())
                .with_hint(format!(
                    "choose a seed no larger than {}",
                    MAX_RANDOMIZATION_SEED.saturating_sub(replicas as u64)
                )),
        ))
    }
}
