/*!
This crate implements a gradient boosted decision tree regressor. Trees are grown leaf-wise: at every step the leaf whose best split has the greatest gain is split next, until the tree reaches `max_leaves` leaves or no split improves the loss. Splits are found with an exact search over every distinct value of every feature, without binning.

```
use leafwise_tree::{Regressor, TrainOptions};
use ndarray::prelude::*;

let features = arr2(&[[1.0], [2.0], [3.0], [4.0]]);
let labels = arr1(&[1.0, 1.0, 5.0, 5.0]);
let mut model = Regressor::new(TrainOptions {
	n_estimators: 1,
	learning_rate: 0.1,
	max_leaves: 2,
	min_data_in_leaf: 1,
	lam: 0.0,
	gamma: 0.0,
});
model.fit(features.view(), labels.view()).unwrap();
let predictions = model.predict(features.view()).unwrap();
assert!((predictions[0] - 2.8).abs() < 1e-12);
```
*/

#![allow(clippy::tabs_in_doc_comments)]

use ndarray::prelude::*;
use thiserror::Error;

mod estimator;
mod feature_importances;
mod regressor;
mod split;
mod train;
mod train_tree;

pub use estimator::{Estimator, ParamValue, Params};
pub use regressor::{Ensemble, Regressor};
pub use split::{choose_best_split, ChooseBestSplitOptions, ChooseBestSplitOutput};
pub use train::{train, TrainOutput};
pub use train_tree::{compute_leaf_value, train_tree, TrainTreeOutput};

/// These are the options passed to `Regressor::new` and `train`.
#[derive(Clone, Debug, PartialEq)]
pub struct TrainOptions {
	/// This is the number of boosting rounds. Exactly this many trees are trained.
	pub n_estimators: usize,
	/// The learning rate scales the output of each tree before it is added to the running prediction.
	pub learning_rate: f64,
	/// The number of leaf nodes in a single tree will never exceed this value.
	pub max_leaves: usize,
	/// A split will only be considered valid if the number of training examples sent to each of the resulting children is at least this value.
	pub min_data_in_leaf: usize,
	/// This is the L2 regularization added to the sum of hessians when computing leaf values and split gains.
	pub lam: f64,
	/// This is subtracted from the gain of every split, so a split must reduce the loss by more than this to be used.
	pub gamma: f64,
}

impl Default for TrainOptions {
	fn default() -> Self {
		Self {
			n_estimators: 50,
			learning_rate: 0.03,
			max_leaves: 20,
			min_data_in_leaf: 1,
			lam: 1.0,
			gamma: 0.0,
		}
	}
}

/// This struct reports the training progress.
#[derive(Clone, Debug, PartialEq)]
pub enum TrainProgress {
	Initializing {
		n_examples: usize,
		n_features: usize,
	},
	Round(RoundProgress),
}

/// This is reported after every boosting round.
#[derive(Clone, Debug, PartialEq)]
pub struct RoundProgress {
	pub round_index: usize,
	pub n_rounds: usize,
	/// This is the number of leaves in the tree trained in this round.
	pub n_leaves: usize,
	/// This is the mean squared error on the training data after this round.
	pub loss: f64,
}

/// Trees are stored as a `Vec` of `Node`s. Each branch in the tree has two indexes into the `Vec`, one for each of its children. The root is always at index 0.
#[derive(Clone, Debug, PartialEq)]
pub struct Tree {
	pub nodes: Vec<Node>,
}

impl Tree {
	/// Make a prediction for a given example.
	pub fn predict(&self, features: ArrayView1<f64>) -> f64 {
		// Start at the root node.
		let mut node_index = 0;
		// Traverse the tree until we get to a leaf.
		loop {
			match &self.nodes[node_index] {
				Node::Branch(BranchNode {
					feature_index,
					split_value,
					left_child_index,
					right_child_index,
					..
				}) => {
					node_index = if features[*feature_index] <= *split_value {
						*left_child_index
					} else {
						*right_child_index
					};
				}
				// We made it to a leaf! The prediction is the leaf's value.
				Node::Leaf(LeafNode { value, .. }) => return *value,
			}
		}
	}

	pub fn leaves(&self) -> impl Iterator<Item = &LeafNode> {
		self.nodes.iter().filter_map(|node| match node {
			Node::Leaf(leaf) => Some(leaf),
			Node::Branch(_) => None,
		})
	}

	pub fn branches(&self) -> impl Iterator<Item = &BranchNode> {
		self.nodes.iter().filter_map(|node| match node {
			Node::Branch(branch) => Some(branch),
			Node::Leaf(_) => None,
		})
	}

	pub fn n_leaves(&self) -> usize {
		self.leaves().count()
	}
}

/// A node is either a branch or a leaf.
#[derive(Clone, Debug, PartialEq)]
pub enum Node {
	Branch(BranchNode),
	Leaf(LeafNode),
}

/// A `BranchNode` is a branch in a tree. An example whose value for `feature_index` is <= `split_value` is sent to the left child, otherwise it is sent to the right child.
#[derive(Clone, Debug, PartialEq)]
pub struct BranchNode {
	/// This is the index of the feature to get the value for.
	pub feature_index: usize,
	/// This is the threshold value of the split.
	pub split_value: f64,
	/// This is the index in the tree's node vector for this node's left child.
	pub left_child_index: usize,
	/// This is the index in the tree's node vector for this node's right child.
	pub right_child_index: usize,
	/// This is the gain of the split that turned this node from a leaf into a branch.
	pub gain: f64,
}

/// The leaves in a tree hold the values to output for examples that get sent to them.
#[derive(Clone, Debug, PartialEq)]
pub struct LeafNode {
	/// This is the value to output.
	pub value: f64,
	/// This is the number of training examples that were sent to this leaf.
	pub n_examples: usize,
}

#[derive(Clone, Debug, Error, PartialEq)]
pub enum Error {
	#[error("invalid input: {0}")]
	InvalidInput(String),
	#[error("expected {expected} features but got {actual}")]
	ShapeMismatch { expected: usize, actual: usize },
	#[error("the model must be fit before it can make predictions")]
	ModelNotFitted,
	#[error("invalid value {value} for parameter \"{name}\"")]
	InvalidParameter { name: String, value: String },
}

/// Build a feature matrix from rows, checking that every row has the same number of columns.
pub fn features_from_rows(rows: &[Vec<f64>]) -> Result<Array2<f64>, Error> {
	let n_columns = rows.first().map(|row| row.len()).unwrap_or(0);
	if let Some((row_index, row)) = rows
		.iter()
		.enumerate()
		.find(|(_, row)| row.len() != n_columns)
	{
		return Err(Error::InvalidInput(format!(
			"row {} has {} columns but row 0 has {}",
			row_index,
			row.len(),
			n_columns
		)));
	}
	let values = rows.iter().flatten().cloned().collect();
	Array2::from_shape_vec((rows.len(), n_columns), values)
		.map_err(|error| Error::InvalidInput(error.to_string()))
}

#[test]
fn test_features_from_rows() {
	let features = features_from_rows(&[vec![1.0, 2.0], vec![3.0, 4.0]]).unwrap();
	assert_eq!(features, arr2(&[[1.0, 2.0], [3.0, 4.0]]));
	let error = features_from_rows(&[vec![1.0, 2.0], vec![3.0]]).unwrap_err();
	insta::assert_debug_snapshot!(error, @r###"
 InvalidInput(
     "row 1 has 1 columns but row 0 has 2",
 )
 "###);
}

#[test]
fn test_tree_predict() {
	let tree = Tree {
		nodes: vec![
			Node::Branch(BranchNode {
				feature_index: 1,
				split_value: 0.5,
				left_child_index: 1,
				right_child_index: 2,
				gain: 1.0,
			}),
			Node::Leaf(LeafNode {
				value: -1.0,
				n_examples: 3,
			}),
			Node::Leaf(LeafNode {
				value: 1.0,
				n_examples: 3,
			}),
		],
	};
	assert_eq!(tree.predict(arr1(&[9.0, 0.5]).view()), -1.0);
	assert_eq!(tree.predict(arr1(&[9.0, 0.6]).view()), 1.0);
	assert_eq!(tree.n_leaves(), 2);
}
