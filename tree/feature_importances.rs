use crate::Tree;
use num_traits::ToPrimitive;

/// This function computes feature importances using the "split" method, where a feature's importance is proportional to the number of nodes that use it to split. If no tree has a branch, every importance is zero.
pub fn compute_feature_importances(trees: &[Tree], n_features: usize) -> Vec<f64> {
	let mut feature_importances = vec![0.0; n_features];
	for tree in trees.iter() {
		for branch in tree.branches() {
			feature_importances[branch.feature_index] += 1.0;
		}
	}
	// Normalize the feature_importances.
	let total: f64 = feature_importances.iter().sum();
	if total > 0.0 {
		for feature_importance in feature_importances.iter_mut() {
			*feature_importance /= total;
		}
	}
	feature_importances
}

/// The mean number of leaves per tree.
pub fn mean_leaves_per_tree(trees: &[Tree]) -> Option<f64> {
	if trees.is_empty() {
		return None;
	}
	let n_leaves: usize = trees.iter().map(|tree| tree.n_leaves()).sum();
	Some(n_leaves.to_f64()? / trees.len().to_f64()?)
}

#[cfg(test)]
use crate::{BranchNode, LeafNode, Node};

#[test]
fn test_compute_feature_importances() {
	let leaf = || {
		Node::Leaf(LeafNode {
			value: 0.0,
			n_examples: 1,
		})
	};
	let branch = |feature_index: usize, left_child_index: usize| {
		Node::Branch(BranchNode {
			feature_index,
			split_value: 0.0,
			left_child_index,
			right_child_index: left_child_index + 1,
			gain: 1.0,
		})
	};
	let trees = vec![
		Tree {
			nodes: vec![branch(0, 1), branch(2, 3), leaf(), leaf(), leaf()],
		},
		Tree {
			nodes: vec![branch(2, 1), leaf(), leaf()],
		},
		Tree {
			nodes: vec![leaf()],
		},
	];
	assert_eq!(
		compute_feature_importances(&trees, 3),
		vec![1.0 / 3.0, 0.0, 2.0 / 3.0]
	);
	assert_eq!(mean_leaves_per_tree(&trees), Some(2.0));
	assert_eq!(compute_feature_importances(&trees[2..], 2), vec![0.0, 0.0]);
}
