use crate::{
	split::{choose_best_split, ChooseBestSplitOptions, ChooseBestSplitOutput},
	BranchNode, LeafNode, Node, TrainOptions, Tree,
};
use ndarray::prelude::*;

pub struct TrainTreeOutput {
	pub tree: Tree,
	/// For each leaf, the indexes of the training examples that reached it and the leaf's value. The caller uses these to update its predictions without walking the tree again.
	pub leaf_values: Vec<(Vec<usize>, f64)>,
}

/// A leaf that may still be split.
struct OpenLeaf {
	node_index: usize,
	examples_index: Vec<usize>,
	value: f64,
	/// This is computed once, when the leaf is created. It is `None` if the leaf is too small to split or no split has positive gain.
	best_split: Option<ChooseBestSplitOutput>,
}

/// Grow a single tree leaf-wise. At each step the open leaf whose best split has the greatest gain is split, until the tree has `max_leaves` leaves or no leaf can be split with positive gain.
pub fn train_tree(
	features: ArrayView2<f64>,
	gradients: &[f64],
	hessians: &[f64],
	train_options: &TrainOptions,
) -> TrainTreeOutput {
	let n_examples = features.nrows();
	let sum_gradients: f64 = gradients.iter().sum();
	let sum_hessians: f64 = hessians.iter().sum();
	let root_value = compute_leaf_value(sum_gradients, sum_hessians, train_options);
	let mut nodes = vec![Node::Leaf(LeafNode {
		value: root_value,
		n_examples,
	})];
	let examples_index: Vec<usize> = (0..n_examples).collect();
	let best_split = if train_options.max_leaves > 1 {
		find_split(
			features,
			gradients,
			hessians,
			&examples_index,
			sum_gradients,
			sum_hessians,
			train_options,
		)
	} else {
		None
	};
	// This is the frontier of leaves, in the order they were created.
	let mut open_leaves = vec![OpenLeaf {
		node_index: 0,
		examples_index,
		value: root_value,
		best_split,
	}];

	while open_leaves.len() < train_options.max_leaves {
		// Pick the leaf with the greatest gain. The earlier leaf wins ties.
		let mut best_gain = 0.0;
		let mut best_leaf_index = None;
		for (leaf_index, open_leaf) in open_leaves.iter().enumerate() {
			if let Some(best_split) = &open_leaf.best_split {
				if best_split.gain > best_gain {
					best_gain = best_split.gain;
					best_leaf_index = Some(leaf_index);
				}
			}
		}
		let leaf_index = match best_leaf_index {
			Some(leaf_index) => leaf_index,
			None => break,
		};
		let split = match open_leaves[leaf_index].best_split.take() {
			Some(split) => split,
			None => break,
		};
		let node_index = open_leaves.remove(leaf_index).node_index;

		let left_child_index = nodes.len();
		let right_child_index = left_child_index + 1;
		let left_value =
			compute_leaf_value(split.left_sum_gradients, split.left_sum_hessians, train_options);
		let right_value = compute_leaf_value(
			split.right_sum_gradients,
			split.right_sum_hessians,
			train_options,
		);
		nodes[node_index] = Node::Branch(BranchNode {
			feature_index: split.feature_index,
			split_value: split.split_value,
			left_child_index,
			right_child_index,
			gain: split.gain,
		});
		nodes.push(Node::Leaf(LeafNode {
			value: left_value,
			n_examples: split.left_examples_index.len(),
		}));
		nodes.push(Node::Leaf(LeafNode {
			value: right_value,
			n_examples: split.right_examples_index.len(),
		}));

		// The children only need splits if the tree can keep growing after they are added.
		let children_may_split = open_leaves.len() + 2 < train_options.max_leaves;
		let (left_best_split, right_best_split) = if children_may_split {
			rayon::join(
				|| {
					find_split(
						features,
						gradients,
						hessians,
						&split.left_examples_index,
						split.left_sum_gradients,
						split.left_sum_hessians,
						train_options,
					)
				},
				|| {
					find_split(
						features,
						gradients,
						hessians,
						&split.right_examples_index,
						split.right_sum_gradients,
						split.right_sum_hessians,
						train_options,
					)
				},
			)
		} else {
			(None, None)
		};
		open_leaves.push(OpenLeaf {
			node_index: left_child_index,
			examples_index: split.left_examples_index,
			value: left_value,
			best_split: left_best_split,
		});
		open_leaves.push(OpenLeaf {
			node_index: right_child_index,
			examples_index: split.right_examples_index,
			value: right_value,
			best_split: right_best_split,
		});
	}

	let leaf_values = open_leaves
		.into_iter()
		.map(|open_leaf| (open_leaf.examples_index, open_leaf.value))
		.collect();
	TrainTreeOutput {
		tree: Tree { nodes },
		leaf_values,
	}
}

/// Leaves with fewer than `2 * min_data_in_leaf` examples are never split.
fn find_split(
	features: ArrayView2<f64>,
	gradients: &[f64],
	hessians: &[f64],
	examples_index: &[usize],
	sum_gradients: f64,
	sum_hessians: f64,
	train_options: &TrainOptions,
) -> Option<ChooseBestSplitOutput> {
	if examples_index.len() < train_options.min_data_in_leaf.saturating_mul(2) {
		return None;
	}
	choose_best_split(ChooseBestSplitOptions {
		features: features.view(),
		gradients,
		hessians,
		examples_index,
		sum_gradients,
		sum_hessians,
		train_options,
	})
}

/// This is the value that minimizes the regularized loss of the examples in a leaf.
pub fn compute_leaf_value(sum_gradients: f64, sum_hessians: f64, train_options: &TrainOptions) -> f64 {
	-sum_gradients / (sum_hessians + train_options.lam)
}

#[cfg(test)]
fn scenario_options() -> TrainOptions {
	TrainOptions {
		n_estimators: 1,
		learning_rate: 0.1,
		max_leaves: 2,
		min_data_in_leaf: 1,
		lam: 0.0,
		gamma: 0.0,
	}
}

#[test]
fn test_train_tree() {
	let features = arr2(&[[1.0], [2.0], [3.0], [4.0]]);
	let gradients = [2.0, 2.0, -2.0, -2.0];
	let hessians = [1.0; 4];
	let output = train_tree(features.view(), &gradients, &hessians, &scenario_options());
	insta::assert_debug_snapshot!(output.tree, @r###"
 Tree {
     nodes: [
         Branch(
             BranchNode {
                 feature_index: 0,
                 split_value: 2.5,
                 left_child_index: 1,
                 right_child_index: 2,
                 gain: 8.0,
             },
         ),
         Leaf(
             LeafNode {
                 value: -2.0,
                 n_examples: 2,
             },
         ),
         Leaf(
             LeafNode {
                 value: 2.0,
                 n_examples: 2,
             },
         ),
     ],
 }
 "###);
	assert_eq!(
		output.leaf_values,
		vec![(vec![0, 1], -2.0), (vec![2, 3], 2.0)]
	);
}

#[test]
fn test_train_tree_single_leaf() {
	let features = arr2(&[[1.0], [2.0], [3.0], [4.0]]);
	let gradients = [2.0, 2.0, -2.0, -2.0];
	let hessians = [1.0; 4];
	for max_leaves in 0..=1 {
		let train_options = TrainOptions {
			max_leaves,
			lam: 1.0,
			..scenario_options()
		};
		let output = train_tree(features.view(), &gradients, &hessians, &train_options);
		assert_eq!(
			output.tree.nodes,
			vec![Node::Leaf(LeafNode {
				value: -0.0,
				n_examples: 4,
			})]
		);
	}
}

#[test]
fn test_train_tree_frontier_order() {
	// The last example is split off first. The split leaf leaves the frontier and its children are appended.
	let features = arr2(&[[1.0], [2.0], [3.0], [4.0], [5.0], [6.0]]);
	let gradients = [1.0, 2.0, 3.0, -1.0, -2.0, -12.0];
	let hessians = [1.0; 6];
	let train_options = TrainOptions {
		max_leaves: 3,
		..scenario_options()
	};
	let output = train_tree(features.view(), &gradients, &hessians, &train_options);
	assert_eq!(output.tree.n_leaves(), 3);
	let leaf_sizes: Vec<usize> = output
		.leaf_values
		.iter()
		.map(|(examples_index, _)| examples_index.len())
		.collect();
	assert_eq!(leaf_sizes, vec![1, 3, 2]);
	assert_eq!(output.tree.nodes.len(), 5);
}

#[test]
fn test_train_tree_gamma() {
	// The only useful split has a gain of 8 before gamma is subtracted.
	let features = arr2(&[[1.0], [2.0], [3.0], [4.0]]);
	let gradients = [2.0, 2.0, -2.0, -2.0];
	let hessians = [1.0; 4];
	let train_options = TrainOptions {
		gamma: 8.0,
		..scenario_options()
	};
	let output = train_tree(features.view(), &gradients, &hessians, &train_options);
	assert_eq!(output.tree.nodes.len(), 1);
	let train_options = TrainOptions {
		gamma: 7.9,
		..scenario_options()
	};
	let output = train_tree(features.view(), &gradients, &hessians, &train_options);
	match &output.tree.nodes[0] {
		Node::Branch(branch) => {
			assert_eq!(branch.split_value, 2.5);
			assert!((branch.gain - 0.1).abs() < 1e-9);
		}
		Node::Leaf(_) => panic!("expected the root to split"),
	}
	assert_eq!(output.tree.n_leaves(), 2);
}

#[test]
fn test_train_tree_huge_min_data_in_leaf() {
	let features = arr2(&[[1.0], [2.0], [3.0], [4.0]]);
	let gradients = [2.0, 2.0, -2.0, -2.0];
	let hessians = [1.0; 4];
	let train_options = TrainOptions {
		min_data_in_leaf: usize::MAX / 2 + 1,
		..scenario_options()
	};
	let output = train_tree(features.view(), &gradients, &hessians, &train_options);
	assert_eq!(output.tree.nodes.len(), 1);
}
