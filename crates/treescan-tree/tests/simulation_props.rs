use proptest::prelude::*;
use treescan_core::NodeIndex;
use treescan_tree::{BranchCounts, SimulationBuffer, TreeBuilder, TreeModel};

/// Builds a random layered graph where every non-root node picks one or two
/// parents among earlier nodes.
fn layered(parent_choices: &[(usize, Option<usize>)], cases: &[i64]) -> TreeModel {
    let mut builder = TreeBuilder::new();
    builder.add_node("n0", Vec::<String>::new()).unwrap();
    for (offset, (first, second)) in parent_choices.iter().enumerate() {
        let id = format!("n{}", offset + 1);
        let mut parents = vec![format!("n{}", first % (offset + 1))];
        if let Some(second) = second {
            parents.push(format!("n{}", second % (offset + 1)));
        }
        builder.add_node(&id, parents).unwrap();
    }
    for (position, &count) in cases.iter().enumerate().take(parent_choices.len() + 1) {
        builder
            .add_counts(&format!("n{position}"), count, count as f64 + 1.0)
            .unwrap();
    }
    builder.build().unwrap()
}

proptest! {
    #[test]
    fn root_branch_equals_total(
        parents in prop::collection::vec((0usize..32, prop::option::of(0usize..32)), 1..16),
        cases in prop::collection::vec(0i64..20, 17),
    ) {
        let tree = layered(&parents, &cases);
        let root = NodeIndex::new(0);
        prop_assert_eq!(tree.node(root).branch_cases(), tree.total_cases());
        for node in tree.nodes() {
            prop_assert!(node.branch_cases() >= node.internal_cases());
            prop_assert!(node.branch_measure() >= node.internal_measure() - 1e-9);
        }
    }

    #[test]
    fn simulated_propagation_matches_observed(
        parents in prop::collection::vec((0usize..32, prop::option::of(0usize..32)), 1..16),
        cases in prop::collection::vec(0i64..20, 17),
    ) {
        let tree = layered(&parents, &cases);
        let mut buffer = SimulationBuffer::new(&tree).unwrap();
        for node in tree.nodes() {
            buffer.add_cases(node.index(), node.internal_cases());
        }
        buffer.propagate(&tree);
        for node in tree.nodes() {
            prop_assert_eq!(
                BranchCounts::branch_cases(&buffer, node.index()),
                BranchCounts::branch_cases(&tree, node.index())
            );
        }
    }
}

#[test]
fn cleared_buffer_has_no_cases() {
    let tree = layered(&[(0, None), (0, Some(1))], &[1, 2, 3]);
    let mut buffer = SimulationBuffer::new(&tree).unwrap();
    buffer.add_cases(NodeIndex::new(2), 5);
    buffer.propagate(&tree);
    assert_eq!(buffer.node(NodeIndex::new(0)).branch_cases(), 5);
    buffer.clear();
    assert_eq!(buffer.total_cases(), 0);
    buffer.propagate(&tree);
    assert_eq!(buffer.node(NodeIndex::new(0)).branch_cases(), 0);
}
