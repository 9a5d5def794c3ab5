use serde::{Deserialize, Serialize};
use tracing::debug;
use treescan_core::errors::{ErrorInfo, ScanError};
use treescan_core::{AnalysisConfig, ConditionalType, ModelType};
use treescan_tree::TreeModel;

use crate::functions;

/// Observed cases and expectation (or observations) of a candidate or of the
/// scope it is compared against.
#[derive(Debug, Clone, Copy, Default, PartialEq, Serialize, Deserialize)]
pub struct Tally {
    /// Observed cases.
    pub cases: i64,
    /// Expected cases, or observations for Bernoulli models.
    pub measure: f64,
}

impl Tally {
    /// Creates a tally.
    pub fn new(cases: i64, measure: f64) -> Self {
        Self { cases, measure }
    }
}

impl std::ops::AddAssign for Tally {
    fn add_assign(&mut self, other: Self) {
        self.cases += other.cases;
        self.measure += other.measure;
    }
}

/// Likelihood model selected once per analysis.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(tag = "model", rename_all = "kebab-case")]
pub enum LikelihoodModel {
    /// Poisson without conditioning.
    PoissonUnconditional,
    /// Poisson conditioned on the grand totals.
    PoissonConditional {
        /// Grand total of observed cases.
        total_cases: i64,
        /// Grand total of expected cases.
        total_measure: f64,
    },
    /// Bernoulli with a known event probability.
    BernoulliUnconditional {
        /// Probability that an observation is a case.
        event_probability: f64,
    },
    /// Bernoulli conditioned on the grand totals.
    BernoulliConditional {
        /// Grand total of cases.
        total_cases: i64,
        /// Grand total of observations.
        total_observations: f64,
    },
    /// Temporal uniform, conditioned on the branch totals of each node.
    Uniform,
    /// Bernoulli per time interval, conditioned on the branch totals of each
    /// node.
    BernoulliTime,
    /// Signed-rank score over paired site differences.
    SignedRank,
}

fn unsupported(config: &AnalysisConfig) -> ScanError {
    ScanError::Configuration(
        ErrorInfo::new("model-unsupported", "no likelihood for this model and conditioning")
            .with_context("model", format!("{:?}", config.model))
            .with_context("conditional", format!("{:?}", config.conditional)),
    )
}

impl LikelihoodModel {
    /// Picks the likelihood for the configured model. Grand totals are read
    /// from the prepared tree.
    pub fn from_config(config: &AnalysisConfig, tree: &TreeModel) -> Result<Self, ScanError> {
        let model = match (config.model, config.conditional) {
            (ModelType::Poisson, ConditionalType::Unconditional) => Self::PoissonUnconditional,
            (ModelType::Poisson, ConditionalType::TotalCases) => Self::PoissonConditional {
                total_cases: tree.total_cases(),
                total_measure: tree.total_measure(),
            },
            (ModelType::Bernoulli, ConditionalType::Unconditional) => {
                let event_probability = config.event_probability.ok_or_else(|| {
                    ScanError::Configuration(
                        ErrorInfo::new("event-probability", "unconditional Bernoulli needs an event probability")
                            .with_hint("set event_probability in the analysis configuration"),
                    )
                })?;
                Self::BernoulliUnconditional { event_probability }
            }
            (ModelType::Bernoulli, ConditionalType::TotalCases) => Self::BernoulliConditional {
                total_cases: tree.total_cases(),
                total_observations: tree.total_measure(),
            },
            (ModelType::Uniform, _) => Self::Uniform,
            (ModelType::BernoulliTime, ConditionalType::Node) => Self::BernoulliTime,
            (ModelType::SignedRank, ConditionalType::Unconditional) => Self::SignedRank,
            _ => return Err(unsupported(config)),
        };
        debug!(?model, "selected likelihood model");
        Ok(model)
    }

    /// Log-likelihood ratio of `window` against `scope`. Tree-wide models
    /// ignore `scope`; windowed models compare a window with the branch
    /// totals of its node.
    pub fn evaluate(&self, window: Tally, scope: Tally) -> f64 {
        match *self {
            Self::PoissonUnconditional => functions::poisson_unconditional(window.cases, window.measure),
            Self::PoissonConditional {
                total_cases,
                total_measure,
            } => functions::poisson_conditional(window.cases, window.measure, total_cases, total_measure),
            Self::BernoulliUnconditional { event_probability } => {
                functions::bernoulli_unconditional(window.cases, window.measure, event_probability)
            }
            Self::BernoulliConditional {
                total_cases,
                total_observations,
            } => functions::bernoulli_conditional(
                window.cases,
                window.measure,
                total_cases,
                total_observations,
            ),
            Self::Uniform => {
                functions::poisson_conditional(window.cases, window.measure, scope.cases, scope.measure)
            }
            Self::BernoulliTime => {
                functions::bernoulli_conditional(window.cases, window.measure, scope.cases, scope.measure)
            }
            Self::SignedRank => 0.0,
        }
    }

    /// Signed-rank score of per-site differences. Other models score zero.
    pub fn evaluate_differences(&self, differences: &[f64]) -> f64 {
        match self {
            Self::SignedRank => functions::signed_rank(differences),
            _ => 0.0,
        }
    }

    /// Expected cases of `window` under the null, used for relative risk and
    /// excess cases. Bernoulli measures are observations, so they are scaled
    /// by the null event rate.
    pub fn expected_cases(&self, window: Tally, scope: Tally) -> f64 {
        match *self {
            Self::BernoulliUnconditional { event_probability } => window.measure * event_probability,
            Self::BernoulliConditional {
                total_cases,
                total_observations,
            } if total_observations > 0.0 => window.measure * total_cases as f64 / total_observations,
            Self::BernoulliTime if scope.measure > 0.0 => {
                window.measure * scope.cases as f64 / scope.measure
            }
            _ => window.measure,
        }
    }

    /// Whether candidates are scored from site differences instead of counts.
    pub fn uses_site_differences(&self) -> bool {
        matches!(self, Self::SignedRank)
    }

    /// Whether candidates are scored per time window against node totals.
    pub fn is_windowed(&self) -> bool {
        matches!(self, Self::Uniform | Self::BernoulliTime)
    }

    /// Adjustment added to the top cut's LLR to form the test statistic.
    /// Non-zero only for conditional Poisson whose expectations were not
    /// rescaled to the case total.
    pub fn test_statistic_adjustment(&self) -> f64 {
        match *self {
            Self::PoissonConditional {
                total_cases,
                total_measure,
            } if total_cases > 0 && total_measure > 0.0 => {
                let c = total_cases as f64;
                -c * (c / total_measure).ln()
            }
            _ => 0.0,
        }
    }
}
