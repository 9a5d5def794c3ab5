use std::any::Any;
use std::panic::{self, AssertUnwindSafe};
use std::sync::mpsc::{self, Sender};
use std::thread;

use tracing::debug;
use treescan_core::errors::{ErrorInfo, ScanError};
use treescan_cuts::{CutEnumerator, CutList};
use treescan_rand::ReplicaGenerator;
use treescan_tree::{SimulationBuffer, TreeModel};

use crate::job::{CancelToken, JobSource};
use crate::reducer::{ReducerSummary, ReplicaOutcome, ReplicaReducer};
use crate::sink::LlrSink;

/// Everything a simulation run reads but never mutates.
#[derive(Debug, Clone, Copy)]
pub struct SimulationPlan<'a> {
    /// Prepared tree.
    pub tree: &'a TreeModel,
    /// Candidate set and likelihood.
    pub enumerator: &'a CutEnumerator<'a>,
    /// Replica source.
    pub generator: &'a ReplicaGenerator,
    /// Replicas requested.
    pub replicas: usize,
    /// Rank of the top cut at which the run stops early.
    pub abort_threshold: Option<u64>,
}

fn panic_message(payload: &(dyn Any + Send)) -> String {
    if let Some(message) = payload.downcast_ref::<&str>() {
        (*message).to_string()
    } else if let Some(message) = payload.downcast_ref::<String>() {
        message.clone()
    } else {
        "worker panicked".to_string()
    }
}

fn evaluate_replica(
    plan: &SimulationPlan<'_>,
    index: usize,
    slot: &mut Option<SimulationBuffer>,
) -> Result<(f64, i64), ScanError> {
    if slot.is_none() {
        *slot = Some(SimulationBuffer::new(plan.tree)?);
    }
    let Some(buffer) = slot.as_mut() else {
        return Err(ScanError::Program(ErrorInfo::new(
            "buffer-missing",
            "worker buffer was not allocated",
        )));
    };
    plan.generator.generate(index, plan.tree, buffer)?;
    Ok((plan.enumerator.max_llr(buffer), buffer.total_cases()))
}

fn worker_loop(
    worker: usize,
    plan: &SimulationPlan<'_>,
    source: &JobSource,
    results: Sender<(usize, ReplicaOutcome)>,
) {
    let mut buffer = None;
    let mut evaluated = 0usize;
    while let Some(index) = source.acquire() {
        let outcome = match panic::catch_unwind(AssertUnwindSafe(|| evaluate_replica(plan, index, &mut buffer))) {
            Ok(Ok((llr, cases))) => ReplicaOutcome::Completed { llr, cases },
            Ok(Err(err)) => ReplicaOutcome::Failed(err.at_replica(index)),
            Err(payload) => {
                // The buffer may be half written; start the next job from scratch.
                buffer = None;
                ReplicaOutcome::Failed(
                    ScanError::Program(
                        ErrorInfo::new("worker-panic", panic_message(payload.as_ref()))
                            .with_context("worker", worker.to_string()),
                    )
                    .at_replica(index),
                )
            }
        };
        evaluated += 1;
        if results.send((index, outcome)).is_err() {
            break;
        }
    }
    debug!(worker, evaluated, "worker finished");
}

/// Evaluates `plan.replicas` replicas on `workers` scoped threads and folds
/// the results into `cuts` through a single reducer on the calling thread.
///
/// The summary is returned once every worker has joined, failed runs
/// included: replicas applied before the first error keep their LLRs in
/// the summary, and [`ReducerSummary::first_error`] names the error to
/// re-raise.
pub fn run_replicas(
    plan: &SimulationPlan<'_>,
    workers: usize,
    cuts: &mut CutList,
    sink: Option<&mut dyn LlrSink>,
    cancel: &CancelToken,
) -> ReducerSummary {
    let source = JobSource::new(plan.replicas);
    let workers = workers.max(1).min(plan.replicas.max(1));
    let mut reducer = ReplicaReducer::new(&source, cuts, sink, cancel, plan.abort_threshold)
        .with_expected_total(plan.generator.conserved_total());
    debug!(workers, replicas = plan.replicas, "starting simulation");

    thread::scope(|scope| {
        let (sender, receiver) = mpsc::channel();
        for worker in 0..workers {
            let sender = sender.clone();
            let source = &source;
            scope.spawn(move || worker_loop(worker, plan, source, sender));
        }
        drop(sender);
        for (index, outcome) in receiver {
            reducer.register(index, outcome);
        }
    });

    reducer.finish()
}
