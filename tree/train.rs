use crate::{
	train_tree::{train_tree, TrainTreeOutput},
	Error, RoundProgress, TrainOptions, TrainProgress, Tree,
};
use itertools::izip;
use ndarray::prelude::*;
use num_traits::ToPrimitive;

#[derive(Clone, Debug, PartialEq)]
pub struct TrainOutput {
	/// This is the mean of the labels. Every prediction starts here.
	pub bias: f64,
	pub trees: Vec<Tree>,
	/// This is the mean squared error on the training data after each round.
	pub losses: Vec<f64>,
}

/// Train a gradient boosted tree ensemble with squared error loss. Exactly `n_estimators` trees are trained.
pub fn train(
	features: ArrayView2<f64>,
	labels: ArrayView1<f64>,
	train_options: &TrainOptions,
	update_progress: &mut dyn FnMut(TrainProgress),
) -> Result<TrainOutput, Error> {
	validate_input(features, labels)?;
	let n_examples = features.nrows();
	update_progress(TrainProgress::Initializing {
		n_examples,
		n_features: features.ncols(),
	});

	let bias = compute_bias(labels)?;
	let mut predictions = Array1::from_elem(n_examples, bias);
	let mut gradients = vec![0.0; n_examples];
	let mut hessians = vec![0.0; n_examples];
	let mut trees = Vec::with_capacity(train_options.n_estimators);
	let mut losses = Vec::with_capacity(train_options.n_estimators);

	for round_index in 0..train_options.n_estimators {
		compute_gradients_and_hessians(
			&mut gradients,
			&mut hessians,
			labels,
			predictions.view(),
		);
		let TrainTreeOutput { tree, leaf_values } =
			train_tree(features, &gradients, &hessians, train_options);
		// Every training example reached exactly one leaf, so update the predictions from the leaves directly.
		for (examples_index, value) in leaf_values {
			for example_index in examples_index {
				predictions[example_index] += train_options.learning_rate * value;
			}
		}
		let loss = compute_loss(labels, predictions.view());
		update_progress(TrainProgress::Round(RoundProgress {
			round_index,
			n_rounds: train_options.n_estimators,
			n_leaves: tree.n_leaves(),
			loss,
		}));
		trees.push(tree);
		losses.push(loss);
	}

	Ok(TrainOutput {
		bias,
		trees,
		losses,
	})
}

fn validate_input(features: ArrayView2<f64>, labels: ArrayView1<f64>) -> Result<(), Error> {
	if features.nrows() == 0 {
		return Err(Error::InvalidInput(
			"the features must have at least one row".to_owned(),
		));
	}
	if features.ncols() == 0 {
		return Err(Error::InvalidInput(
			"the features must have at least one column".to_owned(),
		));
	}
	if labels.len() != features.nrows() {
		return Err(Error::InvalidInput(format!(
			"there are {} labels but {} rows of features",
			labels.len(),
			features.nrows()
		)));
	}
	if let Some(((row_index, column_index), value)) =
		features.indexed_iter().find(|(_, value)| !value.is_finite())
	{
		return Err(Error::InvalidInput(format!(
			"the feature value at row {} column {} is {}",
			row_index, column_index, value
		)));
	}
	if let Some((row_index, label)) = labels.iter().enumerate().find(|(_, label)| !label.is_finite()) {
		return Err(Error::InvalidInput(format!(
			"the label at row {} is {}",
			row_index, label
		)));
	}
	Ok(())
}

/// The bias is the value that minimizes the squared error before any trees are trained.
fn compute_bias(labels: ArrayView1<f64>) -> Result<f64, Error> {
	labels
		.mean()
		.ok_or_else(|| Error::InvalidInput("there are no labels".to_owned()))
}

/// For squared error, the gradient is the residual and the hessian is always one.
fn compute_gradients_and_hessians(
	gradients: &mut [f64],
	hessians: &mut [f64],
	labels: ArrayView1<f64>,
	predictions: ArrayView1<f64>,
) {
	for (gradient, hessian, label, prediction) in
		izip!(gradients, hessians, labels.iter(), predictions.iter())
	{
		*gradient = prediction - label;
		*hessian = 1.0;
	}
}

pub(crate) fn compute_loss(labels: ArrayView1<f64>, predictions: ArrayView1<f64>) -> f64 {
	let mut loss = 0.0;
	for (label, prediction) in labels.iter().zip(predictions.iter()) {
		loss += (label - prediction).powi(2);
	}
	loss / labels.len().to_f64().unwrap_or(f64::NAN)
}

#[test]
fn test_train_scenario() {
	let features = arr2(&[[1.0], [2.0], [3.0], [4.0]]);
	let labels = arr1(&[1.0, 1.0, 5.0, 5.0]);
	let train_options = TrainOptions {
		n_estimators: 1,
		learning_rate: 0.1,
		max_leaves: 2,
		min_data_in_leaf: 1,
		lam: 0.0,
		gamma: 0.0,
	};
	let mut progress: Vec<TrainProgress> = Vec::new();
	let output = train(
		features.view(),
		labels.view(),
		&train_options,
		&mut |event| progress.push(event),
	)
	.unwrap();
	assert_eq!(output.bias, 3.0);
	assert_eq!(output.trees.len(), 1);
	assert_eq!(output.trees[0].n_leaves(), 2);
	assert_eq!(progress.len(), 2);
	assert_eq!(
		progress[0],
		TrainProgress::Initializing {
			n_examples: 4,
			n_features: 1,
		}
	);
	// Each prediction moves 0.2 toward its label, leaving an error of 1.8 everywhere.
	assert!((output.losses[0] - 3.24).abs() < 1e-9);
}

#[test]
fn test_train_leaf_values_match_tree_predictions() {
	let features = arr2(&[[3.0, 1.0], [1.0, 4.0], [4.0, 1.0], [5.0, 9.0], [2.0, 6.0], [5.0, 3.0]]);
	let labels = arr1(&[2.0, 7.0, 1.0, 8.0, 2.0, 8.0]);
	let train_options = TrainOptions {
		n_estimators: 5,
		learning_rate: 0.5,
		max_leaves: 3,
		..Default::default()
	};
	let output = train(features.view(), labels.view(), &train_options, &mut |_| {}).unwrap();
	let predictions: Vec<f64> = features
		.axis_iter(Axis(0))
		.map(|row| {
			output.bias
				+ output
					.trees
					.iter()
					.map(|tree| train_options.learning_rate * tree.predict(row))
					.sum::<f64>()
		})
		.collect();
	let loss = compute_loss(labels.view(), Array1::from(predictions).view());
	assert!((loss - output.losses[4]).abs() < 1e-9);
}

#[test]
fn test_train_invalid_input() {
	let train_options = TrainOptions::default();
	let features = Array2::<f64>::zeros((0, 2));
	let labels = Array1::<f64>::zeros(0);
	assert!(matches!(
		train(features.view(), labels.view(), &train_options, &mut |_| {}),
		Err(Error::InvalidInput(_))
	));
	let features = arr2(&[[1.0], [2.0]]);
	let labels = arr1(&[1.0]);
	assert!(matches!(
		train(features.view(), labels.view(), &train_options, &mut |_| {}),
		Err(Error::InvalidInput(_))
	));
	let features = arr2(&[[1.0], [f64::NAN]]);
	let labels = arr1(&[1.0, 2.0]);
	insta::assert_debug_snapshot!(
		train(features.view(), labels.view(), &train_options, &mut |_| {}).unwrap_err(),
		@r###"
 InvalidInput(
     "the feature value at row 1 column 0 is NaN",
 )
 "###
	);
}
