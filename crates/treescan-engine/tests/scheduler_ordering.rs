use treescan_core::errors::{ErrorInfo, ScanError};
use treescan_core::{AnalysisConfig, CutType, NodeIndex};
use treescan_cuts::{CutEnumerator, CutList};
use treescan_engine::{
    run_replicas, CancelToken, JobSource, LlrSink, ReplicaOutcome, ReplicaReducer, SimulationPlan,
    SourceState,
};
use treescan_llr::LikelihoodModel;
use treescan_rand::{RandomizationSource, Randomizer, ReplicaGenerator};
use treescan_tree::{SimulationBuffer, TreeBuilder, TreeModel};

fn prepared_tree(config: &AnalysisConfig) -> TreeModel {
    let mut builder = TreeBuilder::new();
    builder.add_node("root", Vec::<String>::new()).unwrap();
    for (id, cases, expected) in [("a", 9, 3.0), ("b", 2, 3.0), ("c", 1, 3.0)] {
        builder.add_node(id, ["root"]).unwrap();
        builder.add_counts(id, cases, expected).unwrap();
    }
    builder.set_cut_type("root", CutType::Pairs).unwrap();
    let mut tree = builder.build().unwrap();
    tree.prepare(config).unwrap();
    tree
}

/// Fails one chosen replica and leaves the others empty.
struct FailAt(usize);

impl Randomizer for FailAt {
    fn name(&self) -> &'static str {
        "fail-at"
    }

    fn randomize(&self, replica: usize, _: &TreeModel, _: &mut SimulationBuffer) -> Result<(), ScanError> {
        if replica == self.0 {
            Err(ScanError::Program(ErrorInfo::new("injected", "injected failure")))
        } else {
            Ok(())
        }
    }

    fn conserves_total(&self) -> bool {
        false
    }
}

/// Puts every case on the first leaf, beating the observed top cut.
struct Concentrate;

impl Randomizer for Concentrate {
    fn name(&self) -> &'static str {
        "concentrate"
    }

    fn randomize(&self, _: usize, _: &TreeModel, buffer: &mut SimulationBuffer) -> Result<(), ScanError> {
        buffer.add_cases(NodeIndex::new(1), 12);
        Ok(())
    }

    fn conserves_total(&self) -> bool {
        true
    }
}

fn ranks_with_workers(workers: usize) -> (Vec<u64>, Vec<f64>) {
    let config = AnalysisConfig {
        replicas: 60,
        ..AnalysisConfig::default()
    };
    let tree = prepared_tree(&config);
    let model = LikelihoodModel::from_config(&config, &tree).unwrap();
    let enumerator = CutEnumerator::new(&tree, model, &config).unwrap();
    let mut cuts = enumerator.scan_observed(config.cut_capacity).cuts;
    let generator = ReplicaGenerator::from_config(&config, &tree).unwrap();
    let plan = SimulationPlan {
        tree: &tree,
        enumerator: &enumerator,
        generator: &generator,
        replicas: config.replicas,
        abort_threshold: None,
    };
    let summary = run_replicas(&plan, workers, &mut cuts, None, &CancelToken::new());
    assert!(summary.first_error().is_none());
    assert_eq!(summary.state, SourceState::Normal);
    assert_eq!(summary.completed, 60);
    (cuts.cuts().iter().map(|cut| cut.rank).collect(), summary.llrs)
}

#[test]
fn ranks_do_not_depend_on_worker_count() {
    let (ranks_serial, llrs_serial) = ranks_with_workers(1);
    let (ranks_parallel, llrs_parallel) = ranks_with_workers(4);
    assert_eq!(ranks_serial, ranks_parallel);
    assert_eq!(llrs_serial, llrs_parallel);
}

#[test]
fn failing_job_surfaces_with_its_index() {
    let config = AnalysisConfig {
        replicas: 25,
        ..AnalysisConfig::default()
    };
    let tree = prepared_tree(&config);
    let model = LikelihoodModel::from_config(&config, &tree).unwrap();
    let enumerator = CutEnumerator::new(&tree, model, &config).unwrap();
    let mut cuts = enumerator.scan_observed(10).cuts;
    let generator = ReplicaGenerator::new(Box::new(FailAt(7)), RandomizationSource::Generate, &tree);
    let plan = SimulationPlan {
        tree: &tree,
        enumerator: &enumerator,
        generator: &generator,
        replicas: config.replicas,
        abort_threshold: None,
    };
    let summary = run_replicas(&plan, 3, &mut cuts, None, &CancelToken::new());
    let err = summary.first_error().unwrap();
    assert_eq!(err.replica_index(), Some(7));
    assert_eq!(err.info().code, "injected");
    assert!(err.info().trace.iter().any(|frame| frame == "replica job 7"));
    assert_eq!(summary.state, SourceState::ExceptionCaught);
    assert!(summary.completed <= 7);
    assert_eq!(summary.llrs.len(), summary.completed);
    assert!(summary.diagnostics.keys().all(|index| *index >= summary.completed && *index != 7));
    assert!(cuts.cuts().iter().all(|cut| cut.rank <= summary.completed as u64));
}

#[test]
fn auto_abort_stops_bookkeeping_at_the_threshold() {
    let config = AnalysisConfig {
        replicas: 40,
        ..AnalysisConfig::default()
    };
    let tree = prepared_tree(&config);
    let model = LikelihoodModel::from_config(&config, &tree).unwrap();
    let enumerator = CutEnumerator::new(&tree, model, &config).unwrap();
    let mut cuts = enumerator.scan_observed(10).cuts;
    let generator = ReplicaGenerator::new(Box::new(Concentrate), RandomizationSource::Generate, &tree);
    let plan = SimulationPlan {
        tree: &tree,
        enumerator: &enumerator,
        generator: &generator,
        replicas: config.replicas,
        abort_threshold: Some(3),
    };
    let mut stream = Vec::new();
    let summary = run_replicas(&plan, 4, &mut cuts, Some(&mut stream), &CancelToken::new());
    assert_eq!(summary.state, SourceState::AutoAborted);
    assert_eq!(summary.completed, 3);
    assert_eq!(summary.llrs.len(), 3);
    assert_eq!(stream.iter().map(|(index, _)| *index).collect::<Vec<_>>(), vec![0, 1, 2]);
    assert_eq!(cuts.top().unwrap().rank, 3);
}

#[test]
fn canceled_run_applies_nothing() {
    let config = AnalysisConfig {
        replicas: 30,
        ..AnalysisConfig::default()
    };
    let tree = prepared_tree(&config);
    let model = LikelihoodModel::from_config(&config, &tree).unwrap();
    let enumerator = CutEnumerator::new(&tree, model, &config).unwrap();
    let mut cuts = enumerator.scan_observed(10).cuts;
    let generator = ReplicaGenerator::from_config(&config, &tree).unwrap();
    let plan = SimulationPlan {
        tree: &tree,
        enumerator: &enumerator,
        generator: &generator,
        replicas: config.replicas,
        abort_threshold: None,
    };
    let cancel = CancelToken::new();
    cancel.cancel();
    let summary = run_replicas(&plan, 2, &mut cuts, None, &cancel);
    assert_eq!(summary.state, SourceState::Canceled);
    assert_eq!(summary.completed, 0);
    assert!(cuts.cuts().iter().all(|cut| cut.rank == 0));
}

fn single_cut_list() -> CutList {
    let config = AnalysisConfig::default();
    let tree = prepared_tree(&config);
    let model = LikelihoodModel::from_config(&config, &tree).unwrap();
    let enumerator = CutEnumerator::new(&tree, model, &config).unwrap();
    enumerator.scan_observed(1).cuts
}

#[test]
fn reducer_applies_results_in_index_order() {
    let source = JobSource::new(5);
    let mut cuts = single_cut_list();
    let top = cuts.top().unwrap().llr;
    let cancel = CancelToken::new();
    let mut stream = Vec::new();
    let mut reducer = ReplicaReducer::new(&source, &mut cuts, Some(&mut stream), &cancel, None);

    reducer.register(2, ReplicaOutcome::Completed { llr: top + 1.0, cases: 0 });
    reducer.register(1, ReplicaOutcome::Completed { llr: 0.5, cases: 0 });
    assert_eq!(reducer.completed(), 0);
    reducer.register(0, ReplicaOutcome::Completed { llr: 0.25, cases: 0 });
    assert_eq!(reducer.completed(), 3);
    reducer.register(4, ReplicaOutcome::Completed { llr: top, cases: 0 });
    reducer.register(3, ReplicaOutcome::Completed { llr: 0.0, cases: 0 });
    let summary = reducer.finish();

    assert_eq!(summary.completed, 5);
    assert_eq!(summary.llrs, vec![0.25, 0.5, top + 1.0, 0.0, top]);
    assert!(summary.errors.is_empty());
    assert_eq!(stream.iter().map(|(index, _)| *index).collect::<Vec<_>>(), vec![0, 1, 2, 3, 4]);
    assert_eq!(cuts.top().unwrap().rank, 2);
}

#[test]
fn duplicate_registration_is_a_program_error() {
    let source = JobSource::new(3);
    let mut cuts = single_cut_list();
    let cancel = CancelToken::new();
    let mut reducer = ReplicaReducer::new(&source, &mut cuts, None, &cancel, None);
    reducer.register(0, ReplicaOutcome::Completed { llr: 0.1, cases: 0 });
    reducer.register(0, ReplicaOutcome::Completed { llr: 0.1, cases: 0 });
    reducer.register(1, ReplicaOutcome::Completed { llr: 0.2, cases: 0 });
    let summary = reducer.finish();
    assert_eq!(summary.state, SourceState::ExceptionCaught);
    assert_eq!(summary.completed, 1);
    assert!(matches!(
        summary.first_error(),
        Some(ScanError::Program(info)) if info.code == "duplicate-registration"
    ));
    assert_eq!(summary.diagnostics.get(&1), Some(&0.2));
}

#[test]
fn memory_errors_are_preferred_when_re_raised() {
    let source = JobSource::new(4);
    let mut cuts = single_cut_list();
    let cancel = CancelToken::new();
    let mut reducer = ReplicaReducer::new(&source, &mut cuts, None, &cancel, None);
    reducer.register(
        1,
        ReplicaOutcome::Failed(ScanError::Program(ErrorInfo::new("first", "first")).at_replica(1)),
    );
    reducer.register(
        0,
        ReplicaOutcome::Failed(ScanError::Memory(ErrorInfo::new("simulation-alloc", "oom")).at_replica(0)),
    );
    let summary = reducer.finish();
    assert_eq!(summary.errors.len(), 2);
    let err = summary.first_error().unwrap();
    assert_eq!(err.info().code, "simulation-alloc");
    assert_eq!(err.replica_index(), Some(0));
}

/// Rejects one replica index.
struct RejectAt(usize, Vec<usize>);

impl LlrSink for RejectAt {
    fn record(&mut self, replica: usize, _: f64) -> Result<(), ScanError> {
        if replica == self.0 {
            return Err(ScanError::Io(ErrorInfo::new("llr-write", "disk full")));
        }
        self.1.push(replica);
        Ok(())
    }
}

#[test]
fn sink_failure_leaves_the_replica_unranked() {
    let source = JobSource::new(4);
    let mut cuts = single_cut_list();
    let top = cuts.top().unwrap().llr;
    let cancel = CancelToken::new();
    let mut sink = RejectAt(1, Vec::new());
    let mut reducer = ReplicaReducer::new(&source, &mut cuts, Some(&mut sink), &cancel, None);
    reducer.register(0, ReplicaOutcome::Completed { llr: top + 1.0, cases: 0 });
    reducer.register(2, ReplicaOutcome::Completed { llr: top + 1.0, cases: 0 });
    reducer.register(1, ReplicaOutcome::Completed { llr: top + 1.0, cases: 0 });
    reducer.register(3, ReplicaOutcome::Completed { llr: 0.0, cases: 0 });
    let summary = reducer.finish();

    assert_eq!(summary.completed, 1);
    assert_eq!(summary.llrs.len(), 1);
    assert_eq!(summary.diagnostics.keys().copied().collect::<Vec<_>>(), vec![1, 2, 3]);
    assert_eq!(summary.first_error().unwrap().replica_index(), Some(1));
    assert_eq!(sink.1, vec![0]);
    assert_eq!(cuts.top().unwrap().rank, 1);
}

#[test]
fn replica_totals_are_checked_against_the_conserved_total() {
    let source = JobSource::new(3);
    let mut cuts = single_cut_list();
    let cancel = CancelToken::new();
    let mut reducer =
        ReplicaReducer::new(&source, &mut cuts, None, &cancel, None).with_expected_total(Some(12));
    reducer.register(0, ReplicaOutcome::Completed { llr: 0.1, cases: 12 });
    reducer.register(1, ReplicaOutcome::Completed { llr: 0.2, cases: 11 });
    let summary = reducer.finish();

    assert_eq!(summary.completed, 1);
    let err = summary.first_error().unwrap();
    assert!(matches!(err, ScanError::Replica { .. }));
    assert_eq!(err.info().code, "total-mismatch");
    assert_eq!(err.replica_index(), Some(1));
    assert_eq!(summary.diagnostics.get(&1), Some(&0.2));
}
