//! Closed-form log-likelihood ratios, one function per probability model.

/// Tolerance below which an excess of observed over expected is treated as
/// no excess.
pub const EXCESS_TOLERANCE: f64 = 1e-10;

/// `x · ln(x / y)` with the convention `0 · ln 0 = 0`.
fn x_ln_ratio(x: f64, y: f64) -> f64 {
    if x <= 0.0 {
        0.0
    } else {
        x * (x / y).ln()
    }
}

/// Poisson log-likelihood ratio conditioned on the total number of cases.
pub fn poisson_conditional(cases: i64, expected: f64, total_cases: i64, total_expected: f64) -> f64 {
    let c = cases as f64;
    if c - expected < EXCESS_TOLERANCE {
        return 0.0;
    }
    if cases == total_cases {
        return x_ln_ratio(c, expected);
    }
    let rest = (total_cases - cases) as f64;
    x_ln_ratio(c, expected) + x_ln_ratio(rest, total_expected - expected)
}

/// Unconditional Poisson log-likelihood ratio.
pub fn poisson_unconditional(cases: i64, expected: f64) -> f64 {
    let c = cases as f64;
    if c - expected < EXCESS_TOLERANCE {
        return 0.0;
    }
    (expected - c) + x_ln_ratio(c, expected)
}

/// Unconditional Bernoulli log-likelihood ratio for `cases` events among
/// `observations` trials with known event probability.
pub fn bernoulli_unconditional(cases: i64, observations: f64, event_probability: f64) -> f64 {
    let c = cases as f64;
    let expected = observations * event_probability;
    if c <= expected {
        return 0.0;
    }
    x_ln_ratio(c, expected) + x_ln_ratio(observations - c, observations * (1.0 - event_probability))
}

/// Bernoulli log-likelihood ratio conditioned on the total number of cases
/// and observations.
pub fn bernoulli_conditional(
    cases: i64,
    observations: f64,
    total_cases: i64,
    total_observations: f64,
) -> f64 {
    let c = cases as f64;
    let total = total_cases as f64;
    let outside = total_observations - observations;
    if observations <= 0.0 || outside <= 0.0 {
        return 0.0;
    }
    let rest = total - c;
    if c / observations <= rest / outside {
        return 0.0;
    }
    let split = x_ln_ratio(c, observations)
        + x_ln_ratio(observations - c, observations)
        + x_ln_ratio(rest, outside)
        + x_ln_ratio(outside - rest, outside);
    let null = x_ln_ratio(total, total_observations)
        + x_ln_ratio(total_observations - total, total_observations);
    split - null
}

/// Signed-rank score of a set of paired differences.
///
/// Zero differences are dropped, the rest are ranked by absolute value with
/// ties sharing their average rank. The positive rank sum `W+` is
/// standardised with the tie-corrected variance; the score is `z² / 2` when
/// `z > 0` and zero otherwise.
pub fn signed_rank(differences: &[f64]) -> f64 {
    let mut values: Vec<f64> = differences.iter().copied().filter(|d| *d != 0.0).collect();
    let count = values.len();
    if count == 0 {
        return 0.0;
    }
    values.sort_by(|a, b| a.abs().total_cmp(&b.abs()));

    let mut positive_rank_sum = 0.0;
    let mut tie_correction = 0.0;
    let mut start = 0;
    while start < count {
        let mut end = start;
        while end + 1 < count && values[end + 1].abs() == values[start].abs() {
            end += 1;
        }
        let average_rank = (start + end + 2) as f64 / 2.0;
        for value in &values[start..=end] {
            if *value > 0.0 {
                positive_rank_sum += average_rank;
            }
        }
        let ties = (end - start + 1) as f64;
        tie_correction += ties * ties * ties - ties;
        start = end + 1;
    }

    let n = count as f64;
    let mean = n * (n + 1.0) / 4.0;
    let variance = n * (n + 1.0) * (2.0 * n + 1.0) / 24.0 - tie_correction / 48.0;
    if variance <= 0.0 {
        return 0.0;
    }
    let z = (positive_rank_sum - mean) / variance.sqrt();
    if z > 0.0 {
        z * z / 2.0
    } else {
        0.0
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn zero_log_zero_is_zero() {
        assert_eq!(x_ln_ratio(0.0, 0.0), 0.0);
        assert!((x_ln_ratio(2.0, 1.0) - 2.0 * 2f64.ln()).abs() < 1e-12);
    }

    #[test]
    fn deficits_score_zero() {
        assert_eq!(poisson_unconditional(2, 3.0), 0.0);
        assert_eq!(poisson_conditional(2, 3.0, 10, 10.0), 0.0);
        assert_eq!(bernoulli_unconditional(1, 10.0, 0.5), 0.0);
        assert_eq!(bernoulli_conditional(1, 5.0, 5, 10.0), 0.0);
    }
}
