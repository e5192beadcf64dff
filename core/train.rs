use crate::{
	config::{self, load_config, Config},
	cross_validation::{count_overfit_folds, grid_search, FoldMetrics, GridSearchOutput},
	grid::{compute_hyperparameter_grid, default_hyperparameter_grid},
	missing_values::{handle_missing_values, HandleMissingValuesOutput, Split},
	progress::Progress,
};
use anyhow::{format_err, Context, Result};
use leafwise_metrics::{
	RegressionMetrics, RegressionMetricsInput, RegressionMetricsOutput, StreamingMetric,
};
use leafwise_tree::{features_from_rows, Params, Regressor};
use ndarray::prelude::*;
use num_traits::ToPrimitive;
use rand::{seq::SliceRandom, SeedableRng};
use rand_xoshiro::Xoshiro256Plus;
use std::path::Path;

const DEFAULT_SEED: u64 = 42;
const DEFAULT_TEST_FRACTION: f64 = 0.2;
const DEFAULT_N_FOLDS: usize = 5;
/// A fold is counted as overfit when its train r-squared exceeds its validation r-squared by more than this.
const OVERFIT_THRESHOLD: f64 = 0.1;

#[derive(Debug)]
pub struct TrainOutput {
	pub feature_names: Vec<String>,
	pub target_column_name: String,
	pub best_params: Params,
	pub fold_metrics: Vec<FoldMetrics>,
	pub n_overfit_folds: usize,
	/// This is the number of examples dropped because of missing values.
	pub n_examples_dropped: usize,
	pub test_metrics: RegressionMetricsOutput,
	/// This model was trained with the best params on the whole train split.
	pub model: Regressor,
}

/// A dataset with numeric features and a numeric target.
#[derive(Debug)]
pub struct Dataset {
	pub feature_names: Vec<String>,
	pub features: Array2<f64>,
	pub labels: Array1<f64>,
}

pub fn train(
	file_path: &Path,
	target_column_name: &str,
	config_path: Option<&Path>,
	update_progress: &mut dyn FnMut(Progress),
) -> Result<TrainOutput> {
	// Load the config from the config file, if provided.
	let config: Config = load_config(config_path)?.unwrap_or_default();

	// Load the dataset from the csv file.
	update_progress(Progress::Loading);
	let mut dataset = load_dataset(file_path, target_column_name)?;

	// Shuffle the dataset if enabled.
	shuffle(&mut dataset, &config, update_progress);

	// Split the dataset into train and test.
	let test_fraction = config.test_fraction.unwrap_or(DEFAULT_TEST_FRACTION);
	let n_examples_train = compute_n_examples_train(dataset.features.nrows(), test_fraction)?;
	let train_split = Split {
		features: dataset.features.slice(s![..n_examples_train, ..]).to_owned(),
		labels: dataset.labels.slice(s![..n_examples_train]).to_owned(),
	};
	let test_split = Split {
		features: dataset.features.slice(s![n_examples_train.., ..]).to_owned(),
		labels: dataset.labels.slice(s![n_examples_train..]).to_owned(),
	};

	// Fill or drop missing values using statistics from the train split.
	let HandleMissingValuesOutput {
		train: train_split,
		test: test_split,
		n_examples_dropped,
	} = handle_missing_values(
		train_split,
		test_split,
		config.missing_values.unwrap_or_default(),
		&dataset.feature_names,
	)?;

	// Create the base estimator and the hyperparameter grid.
	let mut estimator = Regressor::default();
	if let Some(params) = &config.params {
		estimator
			.set_params(params.clone())
			.context("invalid params in config")?;
	}
	let grid = match &config.grid {
		Some(grid) => compute_hyperparameter_grid(grid),
		None => compute_hyperparameter_grid(&default_hyperparameter_grid()),
	};

	// Choose the best grid item with cross validation on the train split.
	let n_folds = config.n_folds.unwrap_or(DEFAULT_N_FOLDS);
	let GridSearchOutput {
		best_params,
		best_estimator,
		fold_metrics,
		..
	} = grid_search(
		&estimator,
		&grid,
		train_split.features.view(),
		train_split.labels.view(),
		n_folds,
		&mut |progress| update_progress(Progress::Training(progress)),
	)?;
	let n_overfit_folds = count_overfit_folds(&fold_metrics, OVERFIT_THRESHOLD);

	// Test the best model.
	update_progress(Progress::Testing);
	let predictions = best_estimator.predict(test_split.features.view())?;
	let mut metrics = RegressionMetrics::new();
	metrics.update(RegressionMetricsInput {
		predictions: predictions.view(),
		labels: test_split.labels.view(),
	});
	let test_metrics = metrics.finalize();

	Ok(TrainOutput {
		feature_names: dataset.feature_names,
		target_column_name: target_column_name.to_owned(),
		best_params,
		fold_metrics,
		n_overfit_folds,
		n_examples_dropped,
		test_metrics,
		model: best_estimator,
	})
}

/// Load a csv file with a header row. Every value must be a finite number or missing. Missing values are stored as `NaN`. The target column becomes the labels and every other column is a feature.
pub fn load_dataset(file_path: &Path, target_column_name: &str) -> Result<Dataset> {
	let mut reader = csv::Reader::from_path(file_path)
		.with_context(|| format!("failed to open csv file {}", file_path.display()))?;
	let column_names: Vec<String> = reader
		.headers()
		.context("failed to read the csv header")?
		.iter()
		.map(|column_name| column_name.to_owned())
		.collect();
	// Find the target column.
	let target_column_index = column_names
		.iter()
		.position(|column_name| *column_name == target_column_name)
		.ok_or_else(|| {
			format_err!(
				"did not find target column \"{}\" among column names \"{}\"",
				target_column_name,
				column_names.join(", ")
			)
		})?;
	if column_names.len() < 2 {
		return Err(format_err!(
			"the csv file must have at least one column besides the target column"
		));
	}
	let mut rows = Vec::new();
	let mut labels = Vec::new();
	for (row_index, record) in reader.records().enumerate() {
		let record = record.with_context(|| format!("failed to read row {}", row_index))?;
		let mut row = Vec::with_capacity(column_names.len() - 1);
		for (column_index, value) in record.iter().enumerate() {
			let column_name = &column_names[column_index];
			let value = parse_value(value).with_context(|| {
				format!(
					"failed to parse value \"{}\" in column \"{}\" on row {}",
					value, column_name, row_index
				)
			})?;
			if value.is_infinite() {
				return Err(format_err!(
					"the value in column \"{}\" on row {} is infinite",
					column_name,
					row_index
				));
			}
			if column_index == target_column_index {
				labels.push(value);
			} else {
				row.push(value);
			}
		}
		rows.push(row);
	}
	let features = features_from_rows(&rows)?;
	let feature_names = column_names
		.into_iter()
		.enumerate()
		.filter(|(column_index, _)| *column_index != target_column_index)
		.map(|(_, column_name)| column_name)
		.collect();
	Ok(Dataset {
		feature_names,
		features,
		labels: Array1::from(labels),
	})
}

/// Empty cells and the usual spellings of a missing value parse as `NaN`.
fn parse_value(value: &str) -> Result<f64, std::num::ParseFloatError> {
	let value = value.trim();
	let is_missing = ["", "na", "n/a", "nan", "null"]
		.iter()
		.any(|missing| value.eq_ignore_ascii_case(missing));
	if is_missing {
		Ok(f64::NAN)
	} else {
		value.parse()
	}
}

fn shuffle(dataset: &mut Dataset, config: &Config, update_progress: &mut dyn FnMut(Progress)) {
	// Check if shuffling is enabled in the config and use the seed from the config if provided.
	let seed = match &config.shuffle {
		None | Some(config::Shuffle::Enabled(true)) => Some(DEFAULT_SEED),
		Some(config::Shuffle::Enabled(false)) => None,
		Some(config::Shuffle::Options { seed }) => Some(*seed),
	};
	if let Some(seed) = seed {
		update_progress(Progress::Shuffling);
		let mut rng = Xoshiro256Plus::seed_from_u64(seed);
		let mut permutation: Vec<usize> = (0..dataset.labels.len()).collect();
		permutation.shuffle(&mut rng);
		dataset.features = dataset.features.select(Axis(0), &permutation);
		dataset.labels = dataset.labels.select(Axis(0), &permutation);
	}
}

/// The train split is the first `(1 - test_fraction) * n_examples` examples, rounded down. Both splits must be non-empty.
fn compute_n_examples_train(n_examples: usize, test_fraction: f64) -> Result<usize> {
	if !(test_fraction > 0.0 && test_fraction < 1.0) {
		return Err(format_err!(
			"the test fraction must be between 0 and 1, but it is {}",
			test_fraction
		));
	}
	let n_examples_train = n_examples
		.to_f64()
		.map(|n_examples| (1.0 - test_fraction) * n_examples)
		.and_then(|n_examples_train| n_examples_train.to_usize())
		.ok_or_else(|| format_err!("failed to compute the size of the train split"))?;
	if n_examples_train == 0 || n_examples_train == n_examples {
		return Err(format_err!(
			"a test fraction of {} leaves an empty split of the {} examples",
			test_fraction,
			n_examples
		));
	}
	Ok(n_examples_train)
}

#[test]
fn test_compute_n_examples_train() {
	assert_eq!(compute_n_examples_train(100, 0.2).unwrap(), 80);
	assert_eq!(compute_n_examples_train(9, 0.25).unwrap(), 6);
	assert!(compute_n_examples_train(100, 0.0).is_err());
	assert!(compute_n_examples_train(100, 1.5).is_err());
	assert!(compute_n_examples_train(1, 0.5).is_err());
}

#[cfg(test)]
fn write_temp_file(name: &str, contents: &str) -> std::path::PathBuf {
	let path = std::env::temp_dir().join(format!("leafwise_{}_{}", std::process::id(), name));
	std::fs::write(&path, contents).unwrap();
	path
}

#[test]
fn test_load_dataset() {
	let path = write_temp_file("load.csv", "a,price,b\n1,10,2\n3,30.5,4\n");
	let dataset = load_dataset(&path, "price").unwrap();
	assert_eq!(dataset.feature_names, vec!["a".to_owned(), "b".to_owned()]);
	assert_eq!(dataset.features, arr2(&[[1.0, 2.0], [3.0, 4.0]]));
	assert_eq!(dataset.labels, arr1(&[10.0, 30.5]));
	let error = load_dataset(&path, "cost").unwrap_err();
	assert_eq!(
		error.to_string(),
		"did not find target column \"cost\" among column names \"a, price, b\""
	);
	std::fs::remove_file(&path).unwrap();

	let path = write_temp_file("load_invalid.csv", "a,price\n1,10\nx,30\n");
	let error = load_dataset(&path, "price").unwrap_err();
	assert_eq!(
		error.to_string(),
		"failed to parse value \"x\" in column \"a\" on row 1"
	);
	std::fs::remove_file(&path).unwrap();
}

#[test]
fn test_train() {
	let mut csv = "x,noise,y\n".to_owned();
	for example_index in 0..100 {
		let x = (example_index * 37 % 100) as f64 / 10.0;
		let noise = (example_index * 11 % 7) as f64;
		let y = if x > 5.0 { 3.0 * x } else { x };
		csv.push_str(&format!("{},{},{}\n", x, noise, y));
	}
	let data_path = write_temp_file("train.csv", &csv);
	let config_path = write_temp_file(
		"train.yaml",
		"grid:\n  max_leaves: [2, 8]\n  n_estimators: [40]\n  learning_rate: [0.3]\nn_folds: 4\n",
	);
	let mut progress: Vec<Progress> = Vec::new();
	let output = train(&data_path, "y", Some(&config_path), &mut |event| {
		progress.push(event)
	})
	.unwrap();
	std::fs::remove_file(&data_path).unwrap();
	std::fs::remove_file(&config_path).unwrap();
	assert_eq!(output.feature_names, vec!["x".to_owned(), "noise".to_owned()]);
	assert_eq!(output.fold_metrics.len(), 8);
	assert_eq!(output.model.trees().len(), 40);
	assert!(output.test_metrics.r2 > 0.9);
	assert_eq!(progress.first(), Some(&Progress::Loading));
	assert_eq!(progress.get(1), Some(&Progress::Shuffling));
	assert_eq!(progress.last(), Some(&Progress::Testing));
}

#[test]
fn test_load_dataset_missing_values() {
	let path = write_temp_file("load_missing.csv", "a,price\n1,10\n,20\nNA,\n");
	let dataset = load_dataset(&path, "price").unwrap();
	std::fs::remove_file(&path).unwrap();
	assert_eq!(dataset.features[(0, 0)], 1.0);
	assert!(dataset.features[(1, 0)].is_nan());
	assert!(dataset.features[(2, 0)].is_nan());
	assert_eq!(dataset.labels[1], 20.0);
	assert!(dataset.labels[2].is_nan());
	let path = write_temp_file("load_infinite.csv", "a,price\n1,10\ninf,20\n");
	let error = load_dataset(&path, "price").unwrap_err();
	std::fs::remove_file(&path).unwrap();
	assert_eq!(
		error.to_string(),
		"the value in column \"a\" on row 1 is infinite"
	);
}

#[test]
fn test_train_with_missing_values() {
	let mut csv = "x,noise,y\n".to_owned();
	for example_index in 0..100 {
		let x = (example_index * 37 % 100) as f64 / 10.0;
		let noise = if example_index % 9 == 0 {
			String::new()
		} else {
			((example_index * 11 % 7) as f64).to_string()
		};
		let y = if example_index % 25 == 3 {
			String::new()
		} else {
			(2.0 * x).to_string()
		};
		csv.push_str(&format!("{},{},{}\n", x, noise, y));
	}
	let data_path = write_temp_file("train_missing.csv", &csv);
	let median_config_path = write_temp_file(
		"train_missing_median.yaml",
		"grid:\n  n_estimators: [20]\n  learning_rate: [0.3]\nn_folds: 3\nmissing_values: median\n",
	);
	let output = train(&data_path, "y", Some(&median_config_path), &mut |_| {}).unwrap();
	// Only the four examples without a label are dropped.
	assert_eq!(output.n_examples_dropped, 4);
	assert!(output.test_metrics.mse.is_finite());
	let drop_config_path = write_temp_file(
		"train_missing_drop.yaml",
		"grid:\n  n_estimators: [20]\nn_folds: 3\nmissing_values: drop\n",
	);
	let output = train(&data_path, "y", Some(&drop_config_path), &mut |_| {}).unwrap();
	// Twelve examples are missing noise and four others are missing a label.
	assert_eq!(output.n_examples_dropped, 16);
	std::fs::remove_file(&data_path).unwrap();
	std::fs::remove_file(&median_config_path).unwrap();
	std::fs::remove_file(&drop_config_path).unwrap();
}
