use std::cmp::Ordering;

use crate::cut::{rank_order, Candidate, Cut, CutKey};

/// Receiver of scored candidates.
pub trait CutSink {
    /// Offers one candidate.
    fn offer(&mut self, candidate: &Candidate<'_>);
}

/// Bounded list of the best observed cuts, kept in rank order.
#[derive(Debug, Clone, PartialEq)]
pub struct CutList {
    capacity: usize,
    cuts: Vec<Cut>,
}

impl CutList {
    /// Creates an empty list retaining at most `capacity` cuts.
    pub fn with_capacity(capacity: usize) -> Self {
        Self {
            capacity,
            cuts: Vec::with_capacity(capacity.min(1024)),
        }
    }

    /// Maximum number of retained cuts.
    pub fn capacity(&self) -> usize {
        self.capacity
    }

    /// Retained cuts, best first.
    pub fn cuts(&self) -> &[Cut] {
        &self.cuts
    }

    /// Number of retained cuts.
    pub fn len(&self) -> usize {
        self.cuts.len()
    }

    /// Whether no cut was retained.
    pub fn is_empty(&self) -> bool {
        self.cuts.is_empty()
    }

    /// Best cut, if any.
    pub fn top(&self) -> Option<&Cut> {
        self.cuts.first()
    }

    /// Inserts a candidate if it ranks inside the capacity. Returns whether
    /// it was kept.
    pub fn insert(&mut self, candidate: &Candidate<'_>) -> bool {
        if self.capacity == 0 || candidate.llr <= 0.0 {
            return false;
        }
        let key = CutKey::from(candidate);
        let position = self
            .cuts
            .partition_point(|cut| rank_order(&cut.key(), &key) == Ordering::Less);
        if position >= self.capacity {
            return false;
        }
        self.cuts.insert(position, Cut::from_candidate(candidate));
        self.cuts.truncate(self.capacity);
        true
    }

    /// Numbers the retained cuts from one in rank order.
    pub fn assign_report_order(&mut self) {
        for (position, cut) in self.cuts.iter_mut().enumerate() {
            cut.report_order = position + 1;
        }
    }

    /// Counts one replica against every cut whose LLR it meets or exceeds.
    pub fn register_replica(&mut self, replica_llr: f64) {
        let first = self.cuts.partition_point(|cut| cut.llr > replica_llr);
        for cut in &mut self.cuts[first..] {
            cut.rank += 1;
        }
    }

    /// Clears replica counts, used when a simulation pass is restarted.
    pub fn reset_ranks(&mut self) {
        for cut in &mut self.cuts {
            cut.rank = 0;
        }
    }

    /// Drops cuts whose p-value exceeds `cutoff`.
    pub fn retain_significant(&mut self, replicas: usize, cutoff: f64) {
        self.cuts.retain(|cut| cut.p_value(replicas) <= cutoff);
    }
}

impl CutSink for CutList {
    fn offer(&mut self, candidate: &Candidate<'_>) {
        self.insert(candidate);
    }
}

/// Tracks only the largest LLR seen, used for replica scans.
#[derive(Debug, Clone, Copy, Default, PartialEq)]
pub struct MaxLlr {
    value: f64,
}

impl MaxLlr {
    /// Largest LLR offered so far, zero if none was positive.
    pub fn value(&self) -> f64 {
        self.value
    }
}

impl CutSink for MaxLlr {
    fn offer(&mut self, candidate: &Candidate<'_>) {
        if candidate.llr > self.value {
            self.value = candidate.llr;
        }
    }
}
