use anyhow::{format_err, Context, Result};
use leafwise_metrics::{r2_score, Mean, StreamingMetric};
use leafwise_tree::{Estimator, Params};
use ndarray::prelude::*;
use std::ops::Range;

/// The train and validation r-squared of one grid item on one fold.
#[derive(Clone, Debug, PartialEq)]
pub struct FoldMetrics {
	pub grid_item_index: usize,
	pub fold_index: usize,
	pub train_r2: f64,
	pub val_r2: f64,
}

/// This is reported before each model is fit. `fold_index` is `None` when the best grid item is refit on all the data.
#[derive(Clone, Debug, PartialEq)]
pub struct GridSearchProgress {
	pub grid_item_index: usize,
	pub n_grid_items: usize,
	pub fold_index: Option<usize>,
}

#[derive(Debug)]
pub struct GridSearchOutput<E> {
	pub best_grid_item_index: usize,
	pub best_params: Params,
	/// This estimator was fit with the best params on all the data.
	pub best_estimator: E,
	/// The mean validation r-squared of each grid item.
	pub mean_val_r2: Vec<f64>,
	pub fold_metrics: Vec<FoldMetrics>,
}

/// Split `0..n_examples` into `n_folds` contiguous ranges. The first `n_examples % n_folds` folds get one extra example.
pub fn k_fold_indices(n_examples: usize, n_folds: usize) -> Result<Vec<Range<usize>>> {
	if n_folds < 2 {
		return Err(format_err!(
			"the number of folds must be at least 2, but it is {}",
			n_folds
		));
	}
	if n_examples < n_folds {
		return Err(format_err!(
			"cannot split {} examples into {} folds",
			n_examples,
			n_folds
		));
	}
	let fold_size = n_examples / n_folds;
	let remainder = n_examples % n_folds;
	let mut start = 0;
	let folds = (0..n_folds)
		.map(|fold_index| {
			let size = if fold_index < remainder {
				fold_size + 1
			} else {
				fold_size
			};
			let fold = start..start + size;
			start += size;
			fold
		})
		.collect();
	Ok(folds)
}

/// Fit a clone of `estimator` for every grid item on every fold, choose the grid item with the highest mean validation r-squared, and refit it on all the data.
pub fn grid_search<E>(
	estimator: &E,
	grid: &[Params],
	features: ArrayView2<f64>,
	labels: ArrayView1<f64>,
	n_folds: usize,
	update_progress: &mut dyn FnMut(GridSearchProgress),
) -> Result<GridSearchOutput<E>>
where
	E: Estimator + Clone,
{
	if grid.is_empty() {
		return Err(format_err!("the hyperparameter grid is empty"));
	}
	let folds = k_fold_indices(features.nrows(), n_folds)?;
	let n_grid_items = grid.len();
	let mut fold_metrics = Vec::with_capacity(n_grid_items * n_folds);
	let mut mean_val_r2 = Vec::with_capacity(n_grid_items);
	for (grid_item_index, params) in grid.iter().enumerate() {
		let mut val_r2 = Mean::default();
		for (fold_index, fold) in folds.iter().enumerate() {
			update_progress(GridSearchProgress {
				grid_item_index,
				n_grid_items,
				fold_index: Some(fold_index),
			});
			let train_indices: Vec<usize> = (0..fold.start).chain(fold.end..features.nrows()).collect();
			let features_train = features.select(Axis(0), &train_indices);
			let labels_train = labels.select(Axis(0), &train_indices);
			let features_val = features.slice(s![fold.clone(), ..]);
			let labels_val = labels.slice(s![fold.clone()]);
			let mut model = estimator.clone();
			model
				.set_params(params.clone())
				.and_then(|model| model.fit(features_train.view(), labels_train.view()))
				.with_context(|| {
					format!(
						"failed to train grid item {} on fold {}",
						grid_item_index, fold_index
					)
				})?;
			let train_r2 = r2_score(
				model.predict(features_train.view())?.view(),
				labels_train.view(),
			);
			let fold_val_r2 = r2_score(model.predict(features_val)?.view(), labels_val);
			val_r2.update(fold_val_r2);
			fold_metrics.push(FoldMetrics {
				grid_item_index,
				fold_index,
				train_r2,
				val_r2: fold_val_r2,
			});
		}
		mean_val_r2.push(val_r2.finalize().unwrap_or(f64::NAN));
	}

	// NaN never compares greater, so a grid item whose score is NaN is only chosen if every score is NaN.
	let mut best_grid_item_index = 0;
	let mut best_score = f64::NEG_INFINITY;
	for (grid_item_index, score) in mean_val_r2.iter().enumerate() {
		if *score > best_score {
			best_score = *score;
			best_grid_item_index = grid_item_index;
		}
	}
	let best_params = grid[best_grid_item_index].clone();

	update_progress(GridSearchProgress {
		grid_item_index: best_grid_item_index,
		n_grid_items,
		fold_index: None,
	});
	let mut best_estimator = estimator.clone();
	best_estimator
		.set_params(best_params.clone())
		.and_then(|model| model.fit(features, labels))
		.context("failed to refit the best grid item")?;

	Ok(GridSearchOutput {
		best_grid_item_index,
		best_params,
		best_estimator,
		mean_val_r2,
		fold_metrics,
	})
}

/// Count the folds where the train r-squared exceeds the validation r-squared by more than `threshold`.
pub fn count_overfit_folds(fold_metrics: &[FoldMetrics], threshold: f64) -> usize {
	fold_metrics
		.iter()
		.filter(|fold_metrics| fold_metrics.train_r2 - fold_metrics.val_r2 > threshold)
		.count()
}

#[cfg(test)]
use leafwise_tree::{ParamValue, Regressor};
#[cfg(test)]
use maplit::btreemap;

#[test]
fn test_k_fold_indices() {
	assert_eq!(k_fold_indices(10, 3).unwrap(), vec![0..4, 4..7, 7..10]);
	assert_eq!(k_fold_indices(4, 4).unwrap(), vec![0..1, 1..2, 2..3, 3..4]);
	assert!(k_fold_indices(10, 1).is_err());
	assert!(k_fold_indices(3, 5).is_err());
}

#[test]
fn test_count_overfit_folds() {
	let fold_metrics = vec![
		FoldMetrics {
			grid_item_index: 0,
			fold_index: 0,
			train_r2: 0.95,
			val_r2: 0.9,
		},
		FoldMetrics {
			grid_item_index: 0,
			fold_index: 1,
			train_r2: 0.99,
			val_r2: 0.6,
		},
		FoldMetrics {
			grid_item_index: 0,
			fold_index: 2,
			train_r2: 0.8,
			val_r2: f64::NAN,
		},
	];
	assert_eq!(count_overfit_folds(&fold_metrics, 0.1), 1);
}

#[test]
fn test_grid_search() {
	// The label is a step function of the first feature, which needs more than one leaf to fit.
	let n_examples = 60;
	let features = Array2::from_shape_fn((n_examples, 2), |(example_index, feature_index)| {
		((example_index * (feature_index * 5 + 7)) % 19) as f64
	});
	let labels = Array1::from_shape_fn(n_examples, |example_index| {
		if features[(example_index, 0)] > 9.0 {
			10.0
		} else {
			0.0
		}
	});
	let estimator = Regressor::default();
	let grid = vec![
		btreemap! {
			"max_leaves".to_owned() => ParamValue::Int(1),
			"n_estimators".to_owned() => ParamValue::Int(10),
		},
		btreemap! {
			"max_leaves".to_owned() => ParamValue::Int(4),
			"n_estimators".to_owned() => ParamValue::Int(30),
			"learning_rate".to_owned() => ParamValue::Float(0.3),
		},
	];
	let mut progress: Vec<GridSearchProgress> = Vec::new();
	let output = grid_search(
		&estimator,
		&grid,
		features.view(),
		labels.view(),
		3,
		&mut |event| progress.push(event),
	)
	.unwrap();
	assert_eq!(output.best_grid_item_index, 1);
	assert_eq!(output.best_params, grid[1]);
	assert_eq!(output.best_estimator.options.max_leaves, 4);
	assert_eq!(output.best_estimator.trees().len(), 30);
	assert_eq!(output.fold_metrics.len(), 6);
	assert!(output.mean_val_r2[1] > output.mean_val_r2[0]);
	assert_eq!(progress.len(), 7);
	assert_eq!(
		progress[6],
		GridSearchProgress {
			grid_item_index: 1,
			n_grid_items: 2,
			fold_index: None,
		}
	);
	// The base estimator is never fit.
	assert!(estimator.ensemble.is_none());
}
