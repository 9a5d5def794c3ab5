use std::collections::BTreeMap;

use tracing::{debug, info, warn};
use treescan_core::errors::{ErrorInfo, ErrorKind, ScanError};
use treescan_cuts::CutList;

use crate::job::{CancelToken, JobSource, SourceState};
use crate::sink::LlrSink;

/// Terminal outcome of one replica job.
#[derive(Debug, Clone, PartialEq)]
pub enum ReplicaOutcome {
    /// The replica was generated and scanned.
    Completed {
        /// Maximum LLR over the replica's candidates.
        llr: f64,
        /// Simulated case total of the replica.
        cases: i64,
    },
    /// The replica failed.
    Failed(ScanError),
}

/// What the reducer observed once every worker has finished.
#[derive(Debug, Clone, PartialEq)]
pub struct ReducerSummary {
    /// Final state of the job source.
    pub state: SourceState,
    /// Replicas applied to the bookkeeping, in index order.
    pub completed: usize,
    /// Maximum LLR of each applied replica, by index.
    pub llrs: Vec<f64>,
    /// Errors in arrival order.
    pub errors: Vec<ScanError>,
    /// Results that completed but were never ranked because an error
    /// stopped the bookkeeping first.
    pub diagnostics: BTreeMap<usize, f64>,
}

impl ReducerSummary {
    /// Error to re-raise: the first memory error if any, else the first error.
    pub fn first_error(&self) -> Option<&ScanError> {
        self.errors
            .iter()
            .find(|err| err.kind() == ErrorKind::Memory)
            .or_else(|| self.errors.first())
    }
}

/// Single-threaded owner of every order-sensitive side effect of a run.
///
/// Results arrive in completion order. They are parked until every lower
/// index has been applied, then applied strictly by increasing index: cut
/// ranks, the replica stream and sink, progress, and the early-termination
/// check.
pub struct ReplicaReducer<'a, 's> {
    source: &'a JobSource,
    cuts: &'a mut CutList,
    sink: Option<&'a mut (dyn LlrSink + 's)>,
    cancel: &'a CancelToken,
    abort_threshold: Option<u64>,
    expected_total: Option<i64>,
    pending: BTreeMap<usize, f64>,
    next: usize,
    llrs: Vec<f64>,
    errors: Vec<ScanError>,
    diagnostics: BTreeMap<usize, f64>,
    progress_step: usize,
}

impl<'a, 's> ReplicaReducer<'a, 's> {
    /// Creates a reducer writing into `cuts` and the optional `sink`.
    pub fn new(
        source: &'a JobSource,
        cuts: &'a mut CutList,
        sink: Option<&'a mut (dyn LlrSink + 's)>,
        cancel: &'a CancelToken,
        abort_threshold: Option<u64>,
    ) -> Self {
        Self {
            source,
            cuts,
            sink,
            cancel,
            abort_threshold,
            expected_total: None,
            pending: BTreeMap::new(),
            next: 0,
            llrs: Vec::with_capacity(source.total()),
            errors: Vec::new(),
            diagnostics: BTreeMap::new(),
            progress_step: (source.total() / 10).max(1),
        }
    }

    /// Checks every completed replica against a conserved case total.
    pub fn with_expected_total(mut self, total: Option<i64>) -> Self {
        self.expected_total = total;
        self
    }

    /// Number of replicas applied so far.
    pub fn completed(&self) -> usize {
        self.next
    }

    /// Accepts the outcome of replica `index`.
    pub fn register(&mut self, index: usize, outcome: ReplicaOutcome) {
        if self.cancel.is_canceled() && self.source.transition(SourceState::Canceled) {
            info!(completed = self.next, "simulation canceled");
        }
        if index < self.next || self.pending.contains_key(&index) {
            self.fail(ScanError::Program(
                ErrorInfo::new("duplicate-registration", "replica registered twice")
                    .with_context("replica", index.to_string()),
            ));
            return;
        }
        match self.source.state() {
            SourceState::Normal => {}
            SourceState::ExceptionCaught => {
                match outcome {
                    ReplicaOutcome::Completed { llr, .. } => {
                        self.diagnostics.insert(index, llr);
                    }
                    ReplicaOutcome::Failed(err) => self.errors.push(err),
                }
                return;
            }
            SourceState::Canceled | SourceState::AutoAborted => return,
        }
        match outcome {
            ReplicaOutcome::Completed { llr, cases } => match self.expected_total {
                Some(expected) if cases != expected => {
                    self.diagnostics.insert(index, llr);
                    self.fail(
                        ScanError::Program(
                            ErrorInfo::new("total-mismatch", "replica case total differs from the observed total")
                                .with_context("expected", expected.to_string())
                                .with_context("simulated", cases.to_string()),
                        )
                        .at_replica(index),
                    );
                }
                _ => {
                    self.pending.insert(index, llr);
                    self.drain();
                }
            },
            ReplicaOutcome::Failed(err) => self.fail(err),
        }
    }

    /// Stops the bookkeeping. Parked results move to the diagnostics.
    fn fail(&mut self, err: ScanError) {
        if self.source.transition(SourceState::ExceptionCaught) {
            warn!(error = %err, "replica failed, stopping simulation");
        }
        self.diagnostics.append(&mut self.pending);
        self.errors.push(err);
    }

    fn drain(&mut self) {
        while let Some(llr) = self.pending.remove(&self.next) {
            let index = self.next;
            if let Some(sink) = self.sink.as_mut() {
                if let Err(err) = sink.record(index, llr) {
                    self.diagnostics.insert(index, llr);
                    self.fail(err.at_replica(index));
                    return;
                }
            }
            self.cuts.register_replica(llr);
            self.llrs.push(llr);
            self.next += 1;
            if self.next % self.progress_step == 0 || self.next == self.source.total() {
                info!(completed = self.next, total = self.source.total(), "replica progress");
            }
            if let (Some(threshold), Some(top)) = (self.abort_threshold, self.cuts.top()) {
                if top.rank >= threshold && self.source.transition(SourceState::AutoAborted) {
                    info!(
                        completed = self.next,
                        rank = top.rank,
                        threshold,
                        "top cut can no longer be significant, stopping early"
                    );
                    self.pending.clear();
                    return;
                }
            }
        }
        if !self.pending.is_empty() {
            debug!(parked = self.pending.len(), next = self.next, "waiting for earlier replicas");
        }
    }

    /// Ends the run and returns what was applied.
    pub fn finish(mut self) -> ReducerSummary {
        if let Some(sink) = self.sink.as_mut() {
            if let Err(err) = sink.finish() {
                self.errors.push(err);
            }
        }
        ReducerSummary {
            state: self.source.state(),
            completed: self.next,
            llrs: self.llrs,
            errors: self.errors,
            diagnostics: self.diagnostics,
        }
    }
}
