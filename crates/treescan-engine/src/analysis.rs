use tracing::{info, warn};
use treescan_core::errors::{ErrorInfo, ErrorKind, ScanError};
use treescan_core::serde::stable_hash_string;
use treescan_core::{AnalysisConfig, RunProvenance};
use treescan_cuts::{CutEnumerator, CutList};
use treescan_llr::LikelihoodModel;
use treescan_rand::ReplicaGenerator;
use treescan_tree::TreeModel;

use crate::critical::CriticalValues;
use crate::job::{CancelToken, SourceState};
use crate::reducer::ReducerSummary;
use crate::report::{AnalysisReport, CompletionStatus, ReportedCut, REPORT_SCHEMA};
use crate::scheduler::{run_replicas, SimulationPlan};
use crate::sequential::SequentialStatistic;
use crate::sink::{CsvLlrSink, LlrSink};

fn check_intervals(config: &AnalysisConfig, tree: &TreeModel) -> Result<(), ScanError> {
    let expected = if config.is_temporal() {
        config.temporal.intervals()
    } else {
        0
    };
    if tree.intervals() != expected {
        return Err(ScanError::Configuration(
            ErrorInfo::new("interval-count", "tree time intervals do not match the data range")
                .with_context("tree", tree.intervals().to_string())
                .with_context("config", expected.to_string()),
        ));
    }
    Ok(())
}

/// Runs the scheduler, retrying once at half the workers after a memory
/// error. Ranks and the LLR file are reset before each attempt.
fn simulate(
    config: &AnalysisConfig,
    plan: &SimulationPlan<'_>,
    cuts: &mut CutList,
    cancel: &CancelToken,
) -> Result<ReducerSummary, ScanError> {
    let mut workers = config.worker_count();
    let mut retried = false;
    loop {
        cuts.reset_ranks();
        let mut csv = config
            .output
            .replica_llr_file
            .as_deref()
            .map(CsvLlrSink::create)
            .transpose()?;
        let sink = csv.as_mut().map(|sink| sink as &mut dyn LlrSink);
        let summary = run_replicas(plan, workers, cuts, sink, cancel);
        let out_of_memory = summary
            .first_error()
            .is_some_and(|err| err.kind() == ErrorKind::Memory);
        if !out_of_memory || retried || workers == 1 {
            return Ok(summary);
        }
        workers = (workers / 2).max(1);
        retried = true;
        warn!(workers, completed = summary.completed, "simulation ran out of memory, retrying with fewer workers");
    }
}

/// Scans a tree and evaluates significance by Monte Carlo simulation.
///
/// Setup problems (configuration, tree data, archive paths) are returned as
/// errors. Once the observed scan succeeded every outcome is a report. A
/// failing replica yields [`CompletionStatus::Failed`] with the error
/// attached. Ranks, p-values and the replica LLRs always cover exactly the
/// replicas applied before the run stopped.
pub fn run_analysis(
    config: &AnalysisConfig,
    mut tree: TreeModel,
    cancel: &CancelToken,
) -> Result<AnalysisReport, ScanError> {
    config.validate()?;
    check_intervals(config, &tree)?;
    tree.assign_cut_types(&config.cut_types)?;
    tree.prepare(config)?;
    let provenance = RunProvenance::stamped(stable_hash_string(config)?, tree.canonical_hash()?, config.seed);

    let model = LikelihoodModel::from_config(config, &tree)?;
    let enumerator = CutEnumerator::new(&tree, model, config)?;
    let observed = enumerator.scan_observed(config.cut_capacity);
    info!(
        nodes = tree.len(),
        candidates = enumerator.candidate_count(),
        cuts = observed.cuts.len(),
        test_statistic = observed.test_statistic,
        "scanned observed data"
    );

    let generator = ReplicaGenerator::from_config(config, &tree)?;
    let mut sequential = if config.sequential.enabled {
        let mut statistic = SequentialStatistic::load_or_new(
            config.sequential.state_file.as_deref(),
            config.sequential.overall_alpha,
        )?;
        statistic.begin_look(config.sequential.look_alpha)?;
        Some(statistic)
    } else {
        None
    };

    let plan = SimulationPlan {
        tree: &tree,
        enumerator: &enumerator,
        generator: &generator,
        replicas: config.replicas,
        abort_threshold: sequential
            .as_ref()
            .map(|statistic| statistic.abort_threshold(config.replicas)),
    };
    info!(
        replicas = config.replicas,
        workers = config.worker_count(),
        randomizer = generator.randomizer_name(),
        "starting replicas"
    );
    let mut cuts = observed.cuts;
    let summary = simulate(config, &plan, &mut cuts, cancel)?;
    let error = summary.first_error().cloned();
    let status = match (&error, summary.state) {
        (Some(err), _) => {
            warn!(error = %err, completed = summary.completed, "simulation failed");
            CompletionStatus::Failed(err.kind())
        }
        (None, SourceState::Canceled) => CompletionStatus::Canceled,
        (None, SourceState::AutoAborted) => CompletionStatus::AutoAborted,
        (None, SourceState::ExceptionCaught) => CompletionStatus::Failed(ErrorKind::Program),
        (None, SourceState::Normal) => CompletionStatus::Completed,
    };
    let ReducerSummary {
        completed,
        llrs,
        diagnostics,
        ..
    } = summary;
    let replicas_used = (completed > 0).then_some(completed);

    if let Some(statistic) = sequential.as_mut() {
        if matches!(status, CompletionStatus::Completed | CompletionStatus::AutoAborted) {
            statistic.finish_look(&llrs, observed.test_statistic);
            if let Some(path) = &config.sequential.state_file {
                statistic.store(path)?;
            }
        }
    }

    if let (Some(cutoff), Some(count)) = (config.report_pvalue_cutoff, replicas_used) {
        cuts.retain_significant(count, cutoff);
        cuts.assign_report_order();
    }

    let reported = cuts
        .cuts()
        .iter()
        .map(|cut| ReportedCut::from_cut(cut, &tree, &config.temporal, replicas_used))
        .collect();
    info!(?status, completed, "analysis finished");

    Ok(AnalysisReport {
        schema: REPORT_SCHEMA,
        status,
        error,
        model,
        randomizer: generator.randomizer_name().to_string(),
        test_statistic: observed.test_statistic,
        cuts: reported,
        requested_replicas: config.replicas,
        completed_replicas: completed,
        critical_values: CriticalValues::from_replicas(&llrs),
        diagnostics,
        replica_llrs: llrs,
        sequential,
        provenance,
    })
}
