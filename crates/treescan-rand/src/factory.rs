use tracing::debug;
use treescan_core::errors::{ErrorInfo, ScanError};
use treescan_core::{AnalysisConfig, ConditionalType, ModelType, ScanType};
use treescan_tree::TreeModel;

use crate::randomizer::{
    BernoulliRandomizer, CaseLabelPermutation, ConditionalPoissonRandomizer, NodeTimePermutation,
    PoissonRandomizer, Randomizer, SignFlipRandomizer, UniformTimeRandomizer,
};

/// Picks the randomizer for the configured scan, model and conditioning.
pub fn build_randomizer(
    config: &AnalysisConfig,
    tree: &TreeModel,
) -> Result<Box<dyn Randomizer>, ScanError> {
    let seed = config.seed;
    let randomizer: Box<dyn Randomizer> = match (config.scan_type, config.model, config.conditional) {
        (ScanType::TreeOnly, ModelType::Poisson, ConditionalType::Unconditional) => {
            Box::new(PoissonRandomizer::new(seed))
        }
        (ScanType::TreeOnly, ModelType::Poisson, ConditionalType::TotalCases) => {
            Box::new(ConditionalPoissonRandomizer::new(seed))
        }
        (ScanType::TreeOnly, ModelType::Bernoulli, ConditionalType::Unconditional) => {
            let probability = config.event_probability.ok_or_else(|| {
                ScanError::Configuration(ErrorInfo::new(
                    "event-probability",
                    "unconditional Bernoulli needs an event probability",
                ))
            })?;
            Box::new(BernoulliRandomizer::new(seed, probability))
        }
        (ScanType::TreeOnly, ModelType::Bernoulli, ConditionalType::TotalCases) => {
            Box::new(CaseLabelPermutation::whole_tree(seed, tree))
        }
        (ScanType::TreeOnly, ModelType::SignedRank, ConditionalType::Unconditional) => {
            Box::new(SignFlipRandomizer::new(seed))
        }
        (ScanType::TreeTime, ModelType::Uniform, ConditionalType::Node)
        | (ScanType::TimeOnly, ModelType::Uniform, ConditionalType::TotalCases) => {
            Box::new(UniformTimeRandomizer::new(seed))
        }
        (ScanType::TreeTime, ModelType::Uniform, ConditionalType::NodeAndTime) => {
            Box::new(NodeTimePermutation::new(seed, tree))
        }
        (ScanType::TreeTime, ModelType::BernoulliTime, ConditionalType::Node) => {
            Box::new(CaseLabelPermutation::per_node(seed, tree))
        }
        _ => {
            return Err(ScanError::Configuration(
                ErrorInfo::new("model-unsupported", "no randomizer for this analysis")
                    .with_context("scan_type", format!("{:?}", config.scan_type))
                    .with_context("model", format!("{:?}", config.model))
                    .with_context("conditional", format!("{:?}", config.conditional)),
            ))
        }
    };
    debug!(randomizer = randomizer.name(), seed, "selected randomizer");
    Ok(randomizer)
}
