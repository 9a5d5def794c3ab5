use treescan_core::{AnalysisConfig, ConditionalType, CutType, ModelType, ScanType, TimeRange};
use treescan_cuts::{Candidate, CutEnumerator, CutList};
use treescan_llr::{LikelihoodModel, Tally};
use treescan_tree::{SimulationBuffer, TreeBuilder, TreeModel};

fn poisson_tree() -> TreeModel {
    let mut builder = TreeBuilder::new();
    builder.add_node("root", Vec::<String>::new()).unwrap();
    for (id, cases, expected) in [("a", 9, 3.0), ("b", 2, 3.0), ("c", 1, 3.0)] {
        builder.add_node(id, ["root"]).unwrap();
        builder.add_counts(id, cases, expected).unwrap();
    }
    builder.set_cut_type("root", CutType::Pairs).unwrap();
    builder.build().unwrap()
}

fn candidate(node: usize, llr: f64) -> Candidate<'static> {
    Candidate {
        node: treescan_core::NodeIndex::new(node),
        members: &[],
        tally: Tally::new(1, 1.0),
        expected: 1.0,
        llr,
        window: None,
    }
}

#[test]
fn list_keeps_best_within_capacity() {
    let mut list = CutList::with_capacity(2);
    assert!(list.insert(&candidate(3, 1.0)));
    assert!(list.insert(&candidate(1, 3.0)));
    assert!(!list.insert(&candidate(2, 0.5)));
    assert!(list.insert(&candidate(4, 2.0)));
    let llrs: Vec<f64> = list.cuts().iter().map(|cut| cut.llr).collect();
    assert_eq!(llrs, vec![3.0, 2.0]);
    assert!(!list.insert(&candidate(5, 0.0)));
}

#[test]
fn equal_llr_prefers_lower_node() {
    let mut list = CutList::with_capacity(4);
    list.insert(&candidate(7, 2.0));
    list.insert(&candidate(2, 2.0));
    let nodes: Vec<usize> = list.cuts().iter().map(|cut| cut.node.index()).collect();
    assert_eq!(nodes, vec![2, 7]);
}

#[test]
fn replicas_rank_cuts_they_meet() {
    let mut list = CutList::with_capacity(4);
    list.insert(&candidate(1, 3.0));
    list.insert(&candidate(2, 1.0));
    list.register_replica(1.0);
    list.register_replica(5.0);
    list.register_replica(0.2);
    assert_eq!(list.cuts()[0].rank, 1);
    assert_eq!(list.cuts()[1].rank, 2);
    assert!((list.cuts()[0].p_value(3) - 0.5).abs() < 1e-12);
}

#[test]
fn observed_scan_ranks_hot_child_first() {
    let mut tree = poisson_tree();
    let config = AnalysisConfig {
        default_cut_type: CutType::Simple,
        ..AnalysisConfig::default()
    };
    tree.prepare(&config).unwrap();
    let model = LikelihoodModel::from_config(&config, &tree).unwrap();
    let enumerator = CutEnumerator::new(&tree, model, &config).unwrap();
    // root, three children and three pairs
    assert_eq!(enumerator.candidate_count(), 7);

    let outcome = enumerator.scan_observed(10);
    let top = outcome.cuts.top().unwrap();
    assert_eq!(top.node, tree.lookup("a").unwrap());
    assert!(top.members.is_empty());
    assert_eq!(top.report_order, 1);
    assert!((outcome.max_llr - top.llr).abs() < 1e-12);
    assert!((outcome.test_statistic - top.llr).abs() < 1e-9);
}

#[test]
fn replica_scan_matches_observed_when_counts_match() {
    let mut tree = poisson_tree();
    let config = AnalysisConfig::default();
    tree.prepare(&config).unwrap();
    let model = LikelihoodModel::from_config(&config, &tree).unwrap();
    let enumerator = CutEnumerator::new(&tree, model, &config).unwrap();

    let mut buffer = SimulationBuffer::new(&tree).unwrap();
    for node in tree.nodes() {
        buffer.add_cases(node.index(), node.internal_cases());
    }
    buffer.propagate(&tree);
    let observed = enumerator.scan_observed(10).max_llr;
    assert!((enumerator.max_llr(&buffer) - observed).abs() < 1e-12);
}

#[test]
fn filters_drop_excluded_and_small_nodes() {
    let mut tree = poisson_tree();
    let config = AnalysisConfig {
        default_cut_type: CutType::Simple,
        node_minimum: 1,
        excluded_nodes: vec!["a".to_string()],
        ..AnalysisConfig::default()
    };
    tree.assign_cut_types(&config.cut_types).unwrap();
    tree.prepare(&config).unwrap();
    let model = LikelihoodModel::from_config(&config, &tree).unwrap();
    let enumerator = CutEnumerator::new(&tree, model, &config).unwrap();
    // root (with its pairs) and b remain; c has a single case
    assert_eq!(enumerator.candidate_count(), 5);

    let config = AnalysisConfig {
        excluded_nodes: vec!["zzz".to_string()],
        ..AnalysisConfig::default()
    };
    let err = CutEnumerator::new(&tree, model, &config).unwrap_err();
    assert_eq!(err.info().code, "unknown-node");
}

#[test]
fn temporal_scan_finds_burst_window() {
    let mut builder = TreeBuilder::with_intervals(6);
    builder.add_node("root", Vec::<String>::new()).unwrap();
    builder.add_node("leaf", ["root"]).unwrap();
    for (interval, cases) in [(0, 1), (2, 6), (3, 5), (5, 1)] {
        builder.add_counts_at("leaf", interval, cases, 0.0).unwrap();
    }
    let mut tree = builder.build().unwrap();
    let config = AnalysisConfig {
        scan_type: ScanType::TreeTime,
        model: ModelType::Uniform,
        conditional: ConditionalType::Node,
        temporal: treescan_core::TemporalConfig {
            data_range: TimeRange { start: 1, end: 6 },
            ..Default::default()
        },
        ..AnalysisConfig::default()
    };
    tree.prepare(&config).unwrap();
    let model = LikelihoodModel::from_config(&config, &tree).unwrap();
    let enumerator = CutEnumerator::new(&tree, model, &config).unwrap();
    assert!(!enumerator.windows().is_empty());

    let outcome = enumerator.scan_observed(10);
    let top = outcome.cuts.top().unwrap();
    let window = top.window.unwrap();
    assert_eq!((window.start, window.end), (2, 3));
    assert_eq!(top.cases, 11);
    assert!((top.expected - 13.0 / 6.0 * 2.0).abs() < 1e-9);
}
