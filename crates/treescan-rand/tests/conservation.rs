use proptest::prelude::*;
use treescan_core::{AnalysisConfig, ConditionalType, ModelType, ScanType, TemporalConfig, TimeRange};
use treescan_rand::{build_randomizer, CaseLabelPermutation, ReplicaGenerator, RandomizationSource};
use treescan_tree::{SimulationBuffer, TreeBuilder, TreeModel};

fn poisson_tree() -> TreeModel {
    let mut builder = TreeBuilder::new();
    builder.add_node("root", Vec::<String>::new()).unwrap();
    builder.add_node("a", ["root"]).unwrap();
    builder.add_node("b", ["root"]).unwrap();
    builder.add_node("a1", ["a"]).unwrap();
    builder.add_node("shared", ["a", "b"]).unwrap();
    builder.add_counts("a1", 7, 2.0).unwrap();
    builder.add_counts("b", 3, 4.0).unwrap();
    builder.add_counts("shared", 5, 3.0).unwrap();
    builder.build().unwrap()
}

fn temporal_tree() -> TreeModel {
    let mut builder = TreeBuilder::with_intervals(5);
    builder.add_node("root", Vec::<String>::new()).unwrap();
    builder.add_node("x", ["root"]).unwrap();
    builder.add_node("y", ["root"]).unwrap();
    builder.add_counts_at("x", 0, 3, 10.0).unwrap();
    builder.add_counts_at("x", 4, 2, 10.0).unwrap();
    builder.add_counts_at("y", 1, 4, 10.0).unwrap();
    builder.add_counts_at("y", 2, 1, 10.0).unwrap();
    builder.set_censor("y", 2).unwrap();
    builder.build().unwrap()
}

fn temporal_config(model: ModelType, conditional: ConditionalType) -> AnalysisConfig {
    AnalysisConfig {
        scan_type: ScanType::TreeTime,
        model,
        conditional,
        temporal: TemporalConfig {
            data_range: TimeRange { start: 1, end: 5 },
            ..TemporalConfig::default()
        },
        ..AnalysisConfig::default()
    }
}

proptest! {
    #[test]
    fn conditional_poisson_conserves_total(seed in 0u64..1_000_000, replica in 0usize..500) {
        let mut tree = poisson_tree();
        let config = AnalysisConfig { seed, ..AnalysisConfig::default() };
        tree.prepare(&config).unwrap();
        let generator = ReplicaGenerator::from_config(&config, &tree).unwrap();
        let mut buffer = SimulationBuffer::new(&tree).unwrap();
        generator.generate(replica, &tree, &mut buffer).unwrap();
        prop_assert_eq!(buffer.total_cases(), tree.total_cases());
        let root = tree.lookup("root").unwrap();
        prop_assert_eq!(buffer.node(root).branch_cases(), tree.total_cases());
    }

    #[test]
    fn temporal_randomizers_conserve_node_totals(seed in 0u64..1_000_000, replica in 0usize..200) {
        for (model, conditional) in [
            (ModelType::Uniform, ConditionalType::Node),
            (ModelType::Uniform, ConditionalType::NodeAndTime),
        ] {
            let mut tree = temporal_tree();
            let config = AnalysisConfig { seed, ..temporal_config(model, conditional) };
            tree.prepare(&config).unwrap();
            let generator = ReplicaGenerator::from_config(&config, &tree).unwrap();
            let mut buffer = SimulationBuffer::new(&tree).unwrap();
            generator.generate(replica, &tree, &mut buffer).unwrap();
            for node in tree.nodes() {
                prop_assert_eq!(buffer.node(node.index()).internal_cases(), node.internal_cases());
            }
        }
    }
}

#[test]
fn replicas_are_deterministic_per_index() {
    let mut tree = poisson_tree();
    let config = AnalysisConfig::default();
    tree.prepare(&config).unwrap();
    let randomizer = build_randomizer(&config, &tree).unwrap();
    let generator = ReplicaGenerator::new(randomizer, RandomizationSource::Generate, &tree);
    let mut first = SimulationBuffer::new(&tree).unwrap();
    let mut second = SimulationBuffer::new(&tree).unwrap();
    generator.generate(11, &tree, &mut first).unwrap();
    generator.generate(3, &tree, &mut second).unwrap();
    generator.generate(11, &tree, &mut second).unwrap();
    assert_eq!(first.nodes(), second.nodes());
}

#[test]
fn uniform_respects_censoring() {
    let mut tree = temporal_tree();
    let config = temporal_config(ModelType::Uniform, ConditionalType::Node);
    tree.prepare(&config).unwrap();
    let generator = ReplicaGenerator::from_config(&config, &tree).unwrap();
    let mut buffer = SimulationBuffer::new(&tree).unwrap();
    let y = tree.lookup("y").unwrap();
    for replica in 0..50 {
        generator.generate(replica, &tree, &mut buffer).unwrap();
        let series = buffer.node(y).internal_cases_series();
        assert_eq!(series[3] + series[4], 0);
    }
}

#[test]
fn node_time_permutation_keeps_interval_totals() {
    let mut tree = temporal_tree();
    let config = temporal_config(ModelType::Uniform, ConditionalType::NodeAndTime);
    tree.prepare(&config).unwrap();
    let generator = ReplicaGenerator::from_config(&config, &tree).unwrap();
    let mut buffer = SimulationBuffer::new(&tree).unwrap();
    let observed = tree.total_cases_series();
    for replica in 0..20 {
        generator.generate(replica, &tree, &mut buffer).unwrap();
        let mut simulated = vec![0; tree.intervals()];
        for node in buffer.nodes() {
            for (slot, value) in simulated.iter_mut().zip(node.internal_cases_series()) {
                *slot += value;
            }
        }
        assert_eq!(simulated, observed);
    }
}

#[test]
fn bernoulli_time_permutes_within_nodes() {
    let mut tree = temporal_tree();
    let config = temporal_config(ModelType::BernoulliTime, ConditionalType::Node);
    tree.prepare(&config).unwrap();
    let generator = ReplicaGenerator::from_config(&config, &tree).unwrap();
    let mut buffer = SimulationBuffer::new(&tree).unwrap();
    let x = tree.lookup("x").unwrap();
    for replica in 0..20 {
        generator.generate(replica, &tree, &mut buffer).unwrap();
        let series = buffer.node(x).internal_cases_series();
        assert_eq!(series.iter().sum::<i64>(), 5);
        // x only has observations at intervals 0 and 4
        assert_eq!(series[1] + series[2] + series[3], 0);
    }
}

#[test]
fn conditional_bernoulli_keeps_case_total() {
    let mut builder = TreeBuilder::new();
    builder.add_node("root", Vec::<String>::new()).unwrap();
    builder.add_node("a", ["root"]).unwrap();
    builder.add_node("b", ["root"]).unwrap();
    builder.add_counts("a", 4, 10.0).unwrap();
    builder.add_counts("b", 1, 10.0).unwrap();
    let mut tree = builder.build().unwrap();
    let config = AnalysisConfig {
        model: ModelType::Bernoulli,
        ..AnalysisConfig::default()
    };
    tree.prepare(&config).unwrap();
    assert_eq!(CaseLabelPermutation::whole_tree(1, &tree).record_count(), 20);
    let generator = ReplicaGenerator::from_config(&config, &tree).unwrap();
    let mut buffer = SimulationBuffer::new(&tree).unwrap();
    for replica in 0..20 {
        generator.generate(replica, &tree, &mut buffer).unwrap();
        assert_eq!(buffer.total_cases(), 5);
        for node in tree.nodes() {
            assert!(buffer.node(node.index()).internal_cases() as f64 <= node.internal_measure());
        }
    }
}

#[test]
fn sign_flips_keep_observation_counts() {
    let mut builder = TreeBuilder::new();
    builder.add_node("root", Vec::<String>::new()).unwrap();
    builder.add_node("leaf", ["root"]).unwrap();
    for site in 0..6 {
        builder
            .add_site(
                "leaf",
                treescan_tree::SiteObservation {
                    site,
                    baseline: 1.0,
                    current: 2.0 + site as f64,
                },
            )
            .unwrap();
    }
    let mut tree = builder.build().unwrap();
    let config = AnalysisConfig {
        model: ModelType::SignedRank,
        conditional: ConditionalType::Unconditional,
        ..AnalysisConfig::default()
    };
    tree.prepare(&config).unwrap();
    let generator = ReplicaGenerator::from_config(&config, &tree).unwrap();
    let mut buffer = SimulationBuffer::new(&tree).unwrap();
    let mut flipped = 0;
    for replica in 0..40 {
        generator.generate(replica, &tree, &mut buffer).unwrap();
        assert_eq!(buffer.total_cases(), 6);
        flipped += buffer.site_signs().iter().filter(|sign| **sign < 0.0).count();
    }
    assert!(flipped > 0 && flipped < 240);
}
