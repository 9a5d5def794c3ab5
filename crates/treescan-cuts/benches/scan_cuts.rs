use criterion::{black_box, criterion_group, criterion_main, Criterion};
use treescan_core::{AnalysisConfig, CutType};
use treescan_cuts::CutEnumerator;
use treescan_llr::LikelihoodModel;
use treescan_tree::{TreeBuilder, TreeModel};

/// Three-level tree with `width` children per node and varied counts.
fn wide_tree(width: usize) -> TreeModel {
    let mut builder = TreeBuilder::new();
    builder.add_node("root", Vec::<String>::new()).unwrap();
    for i in 0..width {
        let mid = format!("m{i}");
        builder.add_node(&mid, ["root"]).unwrap();
        for j in 0..width {
            let leaf = format!("m{i}l{j}");
            builder.add_node(&leaf, [mid.as_str()]).unwrap();
            let cases = ((i * 7 + j * 3) % 11) as i64;
            builder.add_counts(&leaf, cases, 5.0).unwrap();
        }
    }
    builder.build().unwrap()
}

fn scan_bench(c: &mut Criterion) {
    let mut tree = wide_tree(40);
    let config = AnalysisConfig {
        default_cut_type: CutType::Ordinal,
        ..AnalysisConfig::default()
    };
    tree.prepare(&config).unwrap();
    let model = LikelihoodModel::from_config(&config, &tree).unwrap();
    let enumerator = CutEnumerator::new(&tree, model, &config).unwrap();
    c.bench_function("max_llr_ordinal_1641_nodes", |b| {
        b.iter(|| black_box(enumerator.max_llr(&tree)));
    });
    c.bench_function("scan_observed_ordinal", |b| {
        b.iter(|| black_box(enumerator.scan_observed(2000)));
    });
}

criterion_group!(benches, scan_bench);
criterion_main!(benches);
