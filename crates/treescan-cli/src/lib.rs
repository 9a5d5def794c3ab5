//! TreeScan command line interface.
//!
//! ```bash
//! # Check settings and data without simulating
//! treescan validate --config analysis.yaml --data tree.json
//!
//! # Run an analysis and write analysis_report.json and cuts.csv
//! treescan run --config analysis.yaml --data tree.json --out results/
//! ```

#![deny(missing_docs)]

use std::error::Error;
use std::path::PathBuf;

use clap::{Args, Parser, Subcommand};
use tracing::{info, warn};
use treescan_core::errors::{ErrorInfo, ScanError};
use treescan_core::AnalysisConfig;
use treescan_engine::{run_analysis, AnalysisReport, CancelToken};

pub mod dataset;
pub mod output;

use dataset::Dataset;

/// Tree scan statistic analyses.
#[derive(Parser, Debug)]
#[command(name = "treescan", version, about = "Tree-based scan statistic with Monte Carlo inference")]
pub struct Cli {
    /// Command to execute.
    #[command(subcommand)]
    pub command: Command,
}

/// Top-level commands.
#[derive(Subcommand, Debug)]
pub enum Command {
    /// Scan the data and evaluate significance by simulation.
    Run(RunArgs),
    /// Check the configuration and build the tree without simulating.
    Validate(InputArgs),
}

/// Settings and data shared by every command.
#[derive(Args, Debug, Clone)]
pub struct InputArgs {
    /// YAML analysis settings.
    #[arg(long)]
    pub config: PathBuf,
    /// JSON data set with nodes and counts.
    #[arg(long)]
    pub data: PathBuf,
}

/// Arguments of `treescan run`.
#[derive(Args, Debug, Clone)]
pub struct RunArgs {
    /// Inputs.
    #[command(flatten)]
    pub input: InputArgs,
    /// Directory receiving the report and cut table.
    #[arg(long)]
    pub out: PathBuf,
    /// Overrides the configured number of replicas.
    #[arg(long)]
    pub replicas: Option<usize>,
    /// Overrides the configured number of worker threads.
    #[arg(long)]
    pub parallelism: Option<usize>,
    /// Overrides the configured randomization seed.
    #[arg(long)]
    pub seed: Option<u64>,
}

impl RunArgs {
    fn apply_overrides(&self, config: &mut AnalysisConfig) {
        if let Some(replicas) = self.replicas {
            config.replicas = replicas;
        }
        if let Some(parallelism) = self.parallelism {
            config.parallelism = parallelism;
        }
        if let Some(seed) = self.seed {
            config.seed = seed;
        }
    }
}

/// Dispatches a parsed command line.
pub fn execute(cli: Cli) -> Result<(), Box<dyn Error>> {
    match cli.command {
        Command::Run(args) => {
            let report = run(&args)?;
            match report.error {
                Some(err) => Err(Box::new(err)),
                None => Ok(()),
            }
        }
        Command::Validate(args) => validate(&args),
    }
}

/// Runs an analysis and writes its outputs. A failed simulation still
/// writes the report so the failing replica can be inspected.
pub fn run(args: &RunArgs) -> Result<AnalysisReport, ScanError> {
    let mut config = AnalysisConfig::load(&args.input.config)?;
    args.apply_overrides(&mut config);
    let dataset = Dataset::load(&args.input.data)?;
    let tree = dataset.build_tree(&config)?;
    info!(
        nodes = tree.len(),
        cases = tree.total_cases(),
        replicas = config.replicas,
        "loaded analysis inputs"
    );

    let report = run_analysis(&config, tree, &CancelToken::new())?;
    let written = output::write_outputs(&args.out, &report)?;
    for path in &written {
        info!(path = %path.display(), "wrote output");
    }
    if let Some(err) = &report.error {
        warn!(error = %err, "analysis did not complete");
    }
    Ok(report)
}

/// Validates the settings and builds the prepared tree.
pub fn validate(args: &InputArgs) -> Result<(), Box<dyn Error>> {
    let config = AnalysisConfig::load(&args.config)?;
    config.validate()?;
    let dataset = Dataset::load(&args.data)?;
    let mut tree = dataset.build_tree(&config)?;
    tree.assign_cut_types(&config.cut_types)?;
    tree.prepare(&config)?;
    if tree.total_cases() == 0 {
        return Err(Box::new(ScanError::Configuration(
            ErrorInfo::new("no-cases", "data set contains no cases")
                .with_context("data", args.data.display().to_string()),
        )));
    }
    info!(
        nodes = tree.len(),
        roots = tree.roots().len(),
        cases = tree.total_cases(),
        multi_parent = tree.is_anforlust(),
        "inputs are valid"
    );
    Ok(())
}
