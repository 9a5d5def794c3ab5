#![deny(missing_docs)]
#![doc = "Log-likelihood ratio functions and per-analysis model selection."]

pub mod functions;
mod model;

pub use functions::{
    bernoulli_conditional, bernoulli_unconditional, poisson_conditional, poisson_unconditional,
    signed_rank, EXCESS_TOLERANCE,
};
pub use model::{LikelihoodModel, Tally};
