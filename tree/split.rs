use crate::TrainOptions;
use ndarray::prelude::*;
use rayon::prelude::*;

/// The search fans out across features once a node has at least this many values to scan.
const MIN_VALUES_TO_PARALLELIZE: usize = 1 << 14;

pub struct ChooseBestSplitOptions<'a> {
	pub features: ArrayView2<'a, f64>,
	pub gradients: &'a [f64],
	pub hessians: &'a [f64],
	/// These are the indexes of the examples in the node being split.
	pub examples_index: &'a [usize],
	pub sum_gradients: f64,
	pub sum_hessians: f64,
	pub train_options: &'a TrainOptions,
}

#[derive(Clone, Debug, PartialEq)]
pub struct ChooseBestSplitOutput {
	pub gain: f64,
	pub feature_index: usize,
	pub split_value: f64,
	pub left_examples_index: Vec<usize>,
	pub left_sum_gradients: f64,
	pub left_sum_hessians: f64,
	pub right_examples_index: Vec<usize>,
	pub right_sum_gradients: f64,
	pub right_sum_hessians: f64,
}

struct ChooseBestSplitForFeatureOutput {
	gain: f64,
	feature_index: usize,
	split_value: f64,
	left_sum_gradients: f64,
	left_sum_hessians: f64,
}

/// Find the split with the highest positive gain over every feature and every threshold between consecutive distinct values. Returns `None` if no split has positive gain.
pub fn choose_best_split(options: ChooseBestSplitOptions) -> Option<ChooseBestSplitOutput> {
	let ChooseBestSplitOptions {
		features,
		examples_index,
		sum_gradients,
		sum_hessians,
		..
	} = options;
	let n_features = features.ncols();
	let n_values = examples_index.len() * n_features;
	let best_split_for_each_feature: Vec<Option<ChooseBestSplitForFeatureOutput>> =
		if n_values >= MIN_VALUES_TO_PARALLELIZE {
			(0..n_features)
				.into_par_iter()
				.map(|feature_index| choose_best_split_for_feature(&options, feature_index))
				.collect()
		} else {
			(0..n_features)
				.map(|feature_index| choose_best_split_for_feature(&options, feature_index))
				.collect()
		};
	// Reduce in feature order so the first feature wins ties.
	let mut best_split: Option<ChooseBestSplitForFeatureOutput> = None;
	for split in best_split_for_each_feature.into_iter().flatten() {
		let is_better = best_split
			.as_ref()
			.map(|best_split| split.gain > best_split.gain)
			.unwrap_or(true);
		if is_better {
			best_split = Some(split);
		}
	}
	let best_split = best_split?;
	let (left_examples_index, right_examples_index): (Vec<usize>, Vec<usize>) = examples_index
		.iter()
		.copied()
		.partition(|example_index| {
			features[(*example_index, best_split.feature_index)] <= best_split.split_value
		});
	Some(ChooseBestSplitOutput {
		gain: best_split.gain,
		feature_index: best_split.feature_index,
		split_value: best_split.split_value,
		left_examples_index,
		left_sum_gradients: best_split.left_sum_gradients,
		left_sum_hessians: best_split.left_sum_hessians,
		right_examples_index,
		right_sum_gradients: sum_gradients - best_split.left_sum_gradients,
		right_sum_hessians: sum_hessians - best_split.left_sum_hessians,
	})
}

fn choose_best_split_for_feature(
	options: &ChooseBestSplitOptions,
	feature_index: usize,
) -> Option<ChooseBestSplitForFeatureOutput> {
	let ChooseBestSplitOptions {
		features,
		gradients,
		hessians,
		examples_index,
		sum_gradients,
		sum_hessians,
		train_options,
	} = options;
	let column = features.column(feature_index);
	// Sort the examples in this node by their value for this feature.
	let mut entries: Vec<(f64, f64, f64)> = examples_index
		.iter()
		.map(|example_index| {
			(
				column[*example_index],
				gradients[*example_index],
				hessians[*example_index],
			)
		})
		.collect();
	entries.sort_by(|a, b| a.0.total_cmp(&b.0));
	let n_examples = entries.len();
	let mut left_sum_gradients = 0.0;
	let mut left_sum_hessians = 0.0;
	let mut best_gain = 0.0;
	let mut best_split_for_feature: Option<ChooseBestSplitForFeatureOutput> = None;
	for (left_n_examples, window) in (1..).zip(entries.windows(2)) {
		let (value, gradient, hessian) = window[0];
		let next_value = window[1].0;
		left_sum_gradients += gradient;
		left_sum_hessians += hessian;
		// Thresholds only fall between distinct values.
		if value == next_value {
			continue;
		}
		let right_n_examples = n_examples - left_n_examples;
		if left_n_examples < train_options.min_data_in_leaf
			|| right_n_examples < train_options.min_data_in_leaf
		{
			continue;
		}
		let gain = compute_gain(
			*sum_gradients,
			*sum_hessians,
			left_sum_gradients,
			left_sum_hessians,
			sum_gradients - left_sum_gradients,
			sum_hessians - left_sum_hessians,
			train_options,
		);
		if gain > best_gain {
			best_gain = gain;
			let midpoint = (value + next_value) / 2.0;
			// The midpoint of two adjacent floats can round up to the larger one.
			let split_value = if midpoint < next_value { midpoint } else { value };
			best_split_for_feature = Some(ChooseBestSplitForFeatureOutput {
				gain,
				feature_index,
				split_value,
				left_sum_gradients,
				left_sum_hessians,
			});
		}
	}
	best_split_for_feature
}

/// Compute the gain for a candidate split.
pub fn compute_gain(
	sum_gradients: f64,
	sum_hessians: f64,
	left_sum_gradients: f64,
	left_sum_hessians: f64,
	right_sum_gradients: f64,
	right_sum_hessians: f64,
	train_options: &TrainOptions,
) -> f64 {
	let lam = train_options.lam;
	let left = compute_score(left_sum_gradients, left_sum_hessians, lam);
	let right = compute_score(right_sum_gradients, right_sum_hessians, lam);
	let parent = compute_score(sum_gradients, sum_hessians, lam);
	0.5 * (left + right - parent) - train_options.gamma
}

/// The score of a node is the negative of its loss, up to a constant, when its leaf value is chosen optimally.
fn compute_score(sum_gradients: f64, sum_hessians: f64, lam: f64) -> f64 {
	(sum_gradients * sum_gradients) / (sum_hessians + lam)
}

#[cfg(test)]
fn test_options() -> TrainOptions {
	TrainOptions {
		lam: 0.0,
		..Default::default()
	}
}

#[test]
fn test_choose_best_split() {
	let features = arr2(&[[1.0], [2.0], [3.0], [4.0]]);
	let gradients = [2.0, 2.0, -2.0, -2.0];
	let hessians = [1.0; 4];
	let train_options = test_options();
	let split = choose_best_split(ChooseBestSplitOptions {
		features: features.view(),
		gradients: &gradients,
		hessians: &hessians,
		examples_index: &[0, 1, 2, 3],
		sum_gradients: 0.0,
		sum_hessians: 4.0,
		train_options: &train_options,
	});
	insta::assert_debug_snapshot!(split, @r###"
 Some(
     ChooseBestSplitOutput {
         gain: 8.0,
         feature_index: 0,
         split_value: 2.5,
         left_examples_index: [
             0,
             1,
         ],
         left_sum_gradients: 4.0,
         left_sum_hessians: 2.0,
         right_examples_index: [
             2,
             3,
         ],
         right_sum_gradients: -4.0,
         right_sum_hessians: 2.0,
     },
 )
 "###);
}

#[test]
fn test_choose_best_split_skips_constant_features() {
	// The first feature is constant, so the only candidates come from the second.
	let features = arr2(&[[7.0, 3.0], [7.0, 1.0], [7.0, 2.0]]);
	let gradients = [-1.0, 1.0, 1.0];
	let hessians = [1.0; 3];
	let train_options = test_options();
	let split = choose_best_split(ChooseBestSplitOptions {
		features: features.view(),
		gradients: &gradients,
		hessians: &hessians,
		examples_index: &[0, 1, 2],
		sum_gradients: 1.0,
		sum_hessians: 3.0,
		train_options: &train_options,
	})
	.unwrap();
	assert_eq!(split.feature_index, 1);
	assert_eq!(split.split_value, 2.5);
	assert_eq!(split.left_examples_index, vec![1, 2]);
	assert_eq!(split.right_examples_index, vec![0]);
}

#[test]
fn test_choose_best_split_ties_go_to_first_feature() {
	let features = arr2(&[[1.0, 10.0], [2.0, 20.0], [3.0, 30.0], [4.0, 40.0]]);
	let gradients = [2.0, 2.0, -2.0, -2.0];
	let hessians = [1.0; 4];
	let train_options = test_options();
	let split = choose_best_split(ChooseBestSplitOptions {
		features: features.view(),
		gradients: &gradients,
		hessians: &hessians,
		examples_index: &[0, 1, 2, 3],
		sum_gradients: 0.0,
		sum_hessians: 4.0,
		train_options: &train_options,
	})
	.unwrap();
	assert_eq!(split.feature_index, 0);
}

#[test]
fn test_choose_best_split_respects_min_data_in_leaf() {
	let features = arr2(&[[1.0], [2.0], [3.0], [4.0]]);
	let gradients = [5.0, -1.0, -2.0, -2.0];
	let hessians = [1.0; 4];
	let train_options = TrainOptions {
		min_data_in_leaf: 2,
		..test_options()
	};
	let split = choose_best_split(ChooseBestSplitOptions {
		features: features.view(),
		gradients: &gradients,
		hessians: &hessians,
		examples_index: &[0, 1, 2, 3],
		sum_gradients: 0.0,
		sum_hessians: 4.0,
		train_options: &train_options,
	})
	.unwrap();
	// Splitting off the first example alone would be better, but it is too small.
	assert_eq!(split.split_value, 2.5);
}

#[test]
fn test_choose_best_split_none_without_positive_gain() {
	let features = arr2(&[[1.0], [2.0], [3.0]]);
	let gradients = [0.0; 3];
	let hessians = [1.0; 3];
	let train_options = test_options();
	let split = choose_best_split(ChooseBestSplitOptions {
		features: features.view(),
		gradients: &gradients,
		hessians: &hessians,
		examples_index: &[0, 1, 2],
		sum_gradients: 0.0,
		sum_hessians: 3.0,
		train_options: &train_options,
	});
	assert_eq!(split, None);
}

#[test]
fn test_choose_best_split_respects_min_data_in_leaf_on_the_right() {
	let features = arr2(&[[1.0], [2.0], [3.0], [4.0]]);
	let gradients = [-2.0, -2.0, -1.0, 5.0];
	let hessians = [1.0; 4];
	let train_options = TrainOptions {
		min_data_in_leaf: 2,
		..test_options()
	};
	let split = choose_best_split(ChooseBestSplitOptions {
		features: features.view(),
		gradients: &gradients,
		hessians: &hessians,
		examples_index: &[0, 1, 2, 3],
		sum_gradients: 0.0,
		sum_hessians: 4.0,
		train_options: &train_options,
	})
	.unwrap();
	// Splitting off the last example alone would be better, but it is too small.
	assert_eq!(split.split_value, 2.5);
	assert_eq!(split.right_examples_index, vec![2, 3]);
}
