use std::path::Path;

use serde::{Deserialize, Serialize};
use tracing::info;
use treescan_core::errors::{ErrorInfo, ScanError};
use treescan_core::serde::{read_json, write_json};

use crate::critical::critical_value;

/// Outcome of one completed look.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct LookRecord {
    /// One based look number.
    pub look: u32,
    /// Alpha spent by this look.
    pub alpha: f64,
    /// Replicas registered during the look.
    pub simulations: usize,
    /// Observed test statistic.
    pub test_statistic: f64,
    /// Look-local critical LLR, if the replicas support one.
    pub critical_value: Option<f64>,
    /// Whether the test statistic exceeded the critical value.
    pub signalled: bool,
}

/// Alpha-spending state carried between the looks of a sequential analysis.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SequentialStatistic {
    /// Total alpha budget.
    pub overall_alpha: f64,
    /// Alpha spent by completed looks.
    pub alpha_spent: f64,
    /// Number of the current or last look.
    pub look: u32,
    /// Alpha assigned to the current look.
    pub look_alpha: f64,
    /// Critical value of the last finished look.
    pub critical_value: Option<f64>,
    /// Set once the budget is exhausted or a look signalled.
    pub complete: bool,
    /// Finished looks in order.
    #[serde(default)]
    pub history: Vec<LookRecord>,
}

impl SequentialStatistic {
    /// Fresh statistic before the first look.
    pub fn new(overall_alpha: f64) -> Self {
        Self {
            overall_alpha,
            alpha_spent: 0.0,
            look: 0,
            look_alpha: 0.0,
            critical_value: None,
            complete: false,
            history: Vec::new(),
        }
    }

    /// Reads the persisted statistic, or starts a new one when there is no
    /// state file yet.
    pub fn load_or_new(path: Option<&Path>, overall_alpha: f64) -> Result<Self, ScanError> {
        match path {
            Some(path) if path.exists() => {
                let statistic: Self = read_json(path)?;
                info!(look = statistic.look, spent = statistic.alpha_spent, "loaded sequential state");
                Ok(statistic)
            }
            _ => Ok(Self::new(overall_alpha)),
        }
    }

    /// Persists the statistic.
    pub fn store(&self, path: &Path) -> Result<(), ScanError> {
        write_json(path, self)
    }

    /// Starts the next look and returns the alpha it may spend.
    pub fn begin_look(&mut self, alpha_per_look: f64) -> Result<f64, ScanError> {
        let remaining = self.overall_alpha - self.alpha_spent;
        if self.complete || remaining <= 1e-12 {
            return Err(ScanError::Configuration(
                ErrorInfo::new("sequential-complete", "sequential analysis already finished")
                    .with_context("looks", self.look.to_string())
                    .with_context("alpha_spent", self.alpha_spent.to_string()),
            ));
        }
        self.look += 1;
        self.look_alpha = alpha_per_look.min(remaining);
        info!(look = self.look, alpha = self.look_alpha, "starting sequential look");
        Ok(self.look_alpha)
    }

    /// Rank at which the top cut can no longer be significant in a look with
    /// `replicas` replicas: `floor(alpha * (replicas + 1))`.
    pub fn abort_threshold(&self, replicas: usize) -> u64 {
        (self.look_alpha * (replicas + 1) as f64 + 1e-9).floor() as u64
    }

    /// Closes the current look with its replica distribution.
    pub fn finish_look(&mut self, replica_llrs: &[f64], test_statistic: f64) -> &LookRecord {
        let critical = critical_value(replica_llrs, self.look_alpha);
        let signalled = critical.map_or(false, |value| test_statistic > value);
        self.alpha_spent += self.look_alpha;
        self.critical_value = critical;
        if signalled || self.alpha_spent >= self.overall_alpha - 1e-12 {
            self.complete = true;
        }
        info!(
            look = self.look,
            spent = self.alpha_spent,
            signalled,
            complete = self.complete,
            "finished sequential look"
        );
        self.history.push(LookRecord {
            look: self.look,
            alpha: self.look_alpha,
            simulations: replica_llrs.len(),
            test_statistic,
            critical_value: critical,
            signalled,
        });
        &self.history[self.history.len() - 1]
    }
}
