/*!
This module replaces or drops the missing values in a dataset after it has been split into train and test, so the regressor only ever sees finite values. A missing value is a `NaN`, which is what [`load_dataset`](../train/fn.load_dataset.html) stores for empty cells.
*/

use crate::config::MissingValues;
use anyhow::{format_err, Result};
use leafwise_metrics::{Mean, StreamingMetric};
use ndarray::prelude::*;

/// The features and labels of one split.
#[derive(Clone, Debug, PartialEq)]
pub struct Split {
	pub features: Array2<f64>,
	pub labels: Array1<f64>,
}

#[derive(Debug)]
pub struct HandleMissingValuesOutput {
	pub train: Split,
	pub test: Split,
	/// This is the number of examples removed from both splits together.
	pub n_examples_dropped: usize,
}

/// Handle the missing values in both splits. Fill values come from the train split, so nothing about the test split leaks into training.
pub fn handle_missing_values(
	train: Split,
	test: Split,
	missing_values: MissingValues,
	feature_names: &[String],
) -> Result<HandleMissingValuesOutput> {
	let n_examples = train.labels.len() + test.labels.len();
	let (train, test) = match missing_values {
		MissingValues::Drop => (drop_missing(train, true), drop_missing(test, true)),
		MissingValues::Mean | MissingValues::Median => {
			let train = drop_missing(train, false);
			let test = drop_missing(test, false);
			let fill_values =
				compute_fill_values(train.features.view(), missing_values, feature_names)?;
			(fill_missing(train, &fill_values), fill_missing(test, &fill_values))
		}
	};
	if train.labels.is_empty() {
		return Err(format_err!(
			"no examples are left in the train split after handling missing values"
		));
	}
	if test.labels.is_empty() {
		return Err(format_err!(
			"no examples are left in the test split after handling missing values"
		));
	}
	let n_examples_dropped = n_examples - train.labels.len() - test.labels.len();
	Ok(HandleMissingValuesOutput {
		train,
		test,
		n_examples_dropped,
	})
}

/// Drop the examples whose label is missing and, if `features` is true, the examples with any missing feature value.
fn drop_missing(split: Split, features: bool) -> Split {
	let examples_index: Vec<usize> = split
		.labels
		.iter()
		.enumerate()
		.filter(|(example_index, label)| {
			let has_missing_feature = features
				&& split
					.features
					.row(*example_index)
					.iter()
					.any(|value| value.is_nan());
			!label.is_nan() && !has_missing_feature
		})
		.map(|(example_index, _)| example_index)
		.collect();
	if examples_index.len() == split.labels.len() {
		return split;
	}
	Split {
		features: split.features.select(Axis(0), &examples_index),
		labels: split.labels.select(Axis(0), &examples_index),
	}
}

/// Compute the value to fill in for each feature column. A column with no values at all is an error.
fn compute_fill_values(
	features: ArrayView2<f64>,
	missing_values: MissingValues,
	feature_names: &[String],
) -> Result<Vec<f64>> {
	features
		.axis_iter(Axis(1))
		.zip(feature_names)
		.map(|(column, feature_name)| {
			let values = column.iter().copied().filter(|value| !value.is_nan());
			let fill_value = match missing_values {
				MissingValues::Median => compute_median(values.collect()),
				_ => {
					let mut mean = Mean::default();
					values.for_each(|value| mean.update(value));
					mean.finalize()
				}
			};
			fill_value.ok_or_else(|| {
				format_err!(
					"every value in column \"{}\" of the train split is missing",
					feature_name
				)
			})
		})
		.collect()
}

/// The median of an even number of values is the mean of the middle two.
fn compute_median(mut values: Vec<f64>) -> Option<f64> {
	if values.is_empty() {
		return None;
	}
	values.sort_by(|a, b| a.total_cmp(b));
	let middle = values.len() / 2;
	if values.len() % 2 == 0 {
		Some((values[middle - 1] + values[middle]) / 2.0)
	} else {
		Some(values[middle])
	}
}

fn fill_missing(mut split: Split, fill_values: &[f64]) -> Split {
	for ((_, column_index), value) in split.features.indexed_iter_mut() {
		if value.is_nan() {
			*value = fill_values[column_index];
		}
	}
	split
}

#[cfg(test)]
fn test_splits() -> (Split, Split, Vec<String>) {
	let nan = f64::NAN;
	let train = Split {
		features: arr2(&[[1.0, 10.0], [nan, 20.0], [3.0, nan], [8.0, 40.0], [4.0, 50.0]]),
		labels: arr1(&[1.0, 2.0, 3.0, nan, 5.0]),
	};
	let test = Split {
		features: arr2(&[[nan, 1.0], [2.0, 2.0], [nan, nan]]),
		labels: arr1(&[1.0, 2.0, nan]),
	};
	(train, test, vec!["a".to_owned(), "b".to_owned()])
}

#[cfg(test)]
fn assert_all_close(actual: ArrayView2<f64>, expected: ArrayView2<f64>) {
	assert_eq!(actual.dim(), expected.dim());
	for (actual, expected) in actual.iter().zip(expected.iter()) {
		assert!((actual - expected).abs() < 1e-12, "{} != {}", actual, expected);
	}
}

#[test]
fn test_handle_missing_values_mean() {
	let (train, test, feature_names) = test_splits();
	let output = handle_missing_values(train, test, MissingValues::Mean, &feature_names).unwrap();
	// The row with a missing label is dropped before the fill values are computed.
	assert_all_close(
		output.train.features.view(),
		arr2(&[[1.0, 10.0], [8.0 / 3.0, 20.0], [3.0, 80.0 / 3.0], [4.0, 50.0]]).view(),
	);
	assert_eq!(output.train.labels, arr1(&[1.0, 2.0, 3.0, 5.0]));
	assert_all_close(
		output.test.features.view(),
		arr2(&[[8.0 / 3.0, 1.0], [2.0, 2.0]]).view(),
	);
	assert_eq!(output.test.labels, arr1(&[1.0, 2.0]));
	assert_eq!(output.n_examples_dropped, 2);
}

#[test]
fn test_handle_missing_values_median() {
	let (train, test, feature_names) = test_splits();
	let output =
		handle_missing_values(train, test, MissingValues::Median, &feature_names).unwrap();
	assert_eq!(
		output.train.features,
		arr2(&[[1.0, 10.0], [3.0, 20.0], [3.0, 20.0], [4.0, 50.0]])
	);
	assert_eq!(output.test.features, arr2(&[[3.0, 1.0], [2.0, 2.0]]));
	assert!(output.train.features.iter().all(|value| value.is_finite()));
}

#[test]
fn test_handle_missing_values_drop() {
	let (train, test, feature_names) = test_splits();
	let output = handle_missing_values(train, test, MissingValues::Drop, &feature_names).unwrap();
	assert_eq!(output.train.features, arr2(&[[1.0, 10.0], [4.0, 50.0]]));
	assert_eq!(output.train.labels, arr1(&[1.0, 5.0]));
	assert_eq!(output.test.features, arr2(&[[2.0, 2.0]]));
	assert_eq!(output.test.labels, arr1(&[2.0]));
	assert_eq!(output.n_examples_dropped, 5);
}

#[test]
fn test_handle_missing_values_errors() {
	let nan = f64::NAN;
	let feature_names = vec!["a".to_owned(), "b".to_owned()];
	let train = Split {
		features: arr2(&[[1.0, nan], [2.0, nan]]),
		labels: arr1(&[1.0, 2.0]),
	};
	let test = Split {
		features: arr2(&[[1.0, 1.0]]),
		labels: arr1(&[1.0]),
	};
	let error = handle_missing_values(
		train.clone(),
		test.clone(),
		MissingValues::Mean,
		&feature_names,
	)
	.unwrap_err();
	assert_eq!(
		error.to_string(),
		"every value in column \"b\" of the train split is missing"
	);
	let error =
		handle_missing_values(train, test, MissingValues::Drop, &feature_names).unwrap_err();
	assert_eq!(
		error.to_string(),
		"no examples are left in the train split after handling missing values"
	);
}

#[test]
fn test_compute_median() {
	assert_eq!(compute_median(vec![]), None);
	assert_eq!(compute_median(vec![3.0, 1.0, 2.0]), Some(2.0));
	assert_eq!(compute_median(vec![4.0, 1.0, 3.0, 2.0]), Some(2.5));
}
