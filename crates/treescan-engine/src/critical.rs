use serde::{Deserialize, Serialize};

/// Significance levels reported with the replica counts they require.
pub const PERCENTILES: [(f64, usize); 5] = [
    (0.05, 19),
    (0.01, 99),
    (0.001, 999),
    (0.0001, 9_999),
    (0.00001, 99_999),
];

/// LLR a test statistic must exceed to be significant at `alpha`, read from
/// the replica LLRs sorted in descending order at position
/// `ceil((R + 1) * alpha) - 1`. `None` when the position is out of range.
pub fn critical_value(llrs: &[f64], alpha: f64) -> Option<f64> {
    let mut sorted = llrs.to_vec();
    sorted.sort_by(|a, b| b.total_cmp(a));
    value_at(&sorted, alpha)
}

fn value_at(descending: &[f64], alpha: f64) -> Option<f64> {
    let rank = ((descending.len() + 1) as f64 * alpha - 1e-9).ceil();
    if rank < 1.0 {
        return None;
    }
    descending.get(rank as usize - 1).copied()
}

/// Critical value at one significance level.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct CriticalValue {
    /// Significance level.
    pub alpha: f64,
    /// LLR at that level.
    pub llr: f64,
}

/// Critical values for the standard significance levels.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct CriticalValues {
    /// Levels with enough replicas, most lenient first.
    pub values: Vec<CriticalValue>,
}

impl CriticalValues {
    /// Derives the table from the replica LLR stream. Levels needing more
    /// replicas than were run are omitted.
    pub fn from_replicas(llrs: &[f64]) -> Self {
        let mut sorted = llrs.to_vec();
        sorted.sort_by(|a, b| b.total_cmp(a));
        let values = PERCENTILES
            .iter()
            .filter(|(_, required)| sorted.len() >= *required)
            .filter_map(|&(alpha, _)| value_at(&sorted, alpha).map(|llr| CriticalValue { alpha, llr }))
            .collect();
        Self { values }
    }

    /// Critical value at `alpha`, if reported.
    pub fn get(&self, alpha: f64) -> Option<f64> {
        self.values
            .iter()
            .find(|value| (value.alpha - alpha).abs() < 1e-12)
            .map(|value| value.llr)
    }
}
