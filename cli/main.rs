//! This module contains the main entrypoint to the leafwise cli.

use anyhow::Result;
use clap::Parser;
use colored::Colorize;
use leafwise_core::{cross_validation::GridSearchProgress, Progress, TrainOutput};
use std::{collections::BTreeMap, path::PathBuf};

#[derive(Parser)]
#[clap(
	name = "leafwise",
	about = "Train gradient boosted tree regressors from csv files."
)]
enum Options {
	#[clap(name = "train")]
	Train(TrainOptions),
}

#[derive(Parser, Debug)]
#[clap(about = "train a model")]
#[clap(
	long_about = "train a regressor from a csv file, choosing hyperparameters with k-fold cross validation"
)]
struct TrainOptions {
	#[clap(short, long, help = "the path to your .csv file")]
	file: PathBuf,
	#[clap(short, long, help = "the name of the column to predict")]
	target: String,
	#[clap(short, long, help = "the path to a .yaml or .json config file")]
	config: Option<PathBuf>,
}

fn main() {
	let env = env_logger::Env::default().filter_or("LEAFWISE_LOG", "info");
	env_logger::Builder::from_env(env).init();
	let options = Options::parse();
	let result = match options {
		Options::Train(options) => cli_train(options),
	};
	if let Err(error) = result {
		eprintln!("{}: {:#}", "error".red().bold(), error);
		std::process::exit(1);
	}
}

fn cli_train(options: TrainOptions) -> Result<()> {
	let output = leafwise_core::train(
		&options.file,
		&options.target,
		options.config.as_deref(),
		&mut log_progress,
	)?;
	for fold_metrics in &output.fold_metrics {
		log::info!(
			"grid item {} fold {}: train r2 {:.4}, validation r2 {:.4}",
			fold_metrics.grid_item_index,
			fold_metrics.fold_index,
			fold_metrics.train_r2,
			fold_metrics.val_r2,
		);
	}
	if output.n_examples_dropped > 0 {
		log::info!(
			"dropped {} examples with missing values",
			output.n_examples_dropped
		);
	}
	if output.n_overfit_folds > 0 {
		log::warn!(
			"{} of {} folds may be overfit",
			output.n_overfit_folds,
			output.fold_metrics.len()
		);
	}
	if let Some(mean_leaves_per_tree) = output.model.mean_leaves_per_tree() {
		log::debug!("the final model has {:.1} leaves per tree", mean_leaves_per_tree);
	}
	println!("{}", serde_json::to_string_pretty(&summarize(&output))?);
	Ok(())
}

fn log_progress(progress: Progress) {
	match progress {
		Progress::Loading => log::info!("loading the dataset"),
		Progress::Shuffling => log::info!("shuffling the dataset"),
		Progress::Training(GridSearchProgress {
			grid_item_index,
			n_grid_items,
			fold_index: Some(fold_index),
		}) => log::debug!(
			"training grid item {} of {} on fold {}",
			grid_item_index + 1,
			n_grid_items,
			fold_index
		),
		Progress::Training(GridSearchProgress {
			grid_item_index,
			fold_index: None,
			..
		}) => log::info!(
			"refitting grid item {} on the full train split",
			grid_item_index
		),
		Progress::Testing => log::info!("testing the best model"),
	}
}

fn summarize(output: &TrainOutput) -> serde_json::Value {
	let feature_importances: BTreeMap<&str, f64> = output
		.feature_names
		.iter()
		.map(|feature_name| feature_name.as_str())
		.zip(output.model.feature_importances().unwrap_or_default())
		.collect();
	let test_metrics = &output.test_metrics;
	serde_json::json!({
		"target": output.target_column_name,
		"best_params": output.best_params,
		"test_metrics": {
			"mse": test_metrics.mse,
			"rmse": test_metrics.rmse,
			"mae": test_metrics.mae,
			"r2": test_metrics.r2,
			"baseline_mse": test_metrics.baseline_mse,
			"baseline_rmse": test_metrics.baseline_rmse,
		},
		"feature_importances": feature_importances,
		"n_overfit_folds": output.n_overfit_folds,
		"n_examples_dropped": output.n_examples_dropped,
	})
}

#[test]
fn test_parse_options() {
	let options =
		Options::try_parse_from(&["leafwise", "train", "--file", "data.csv", "-t", "price"])
			.unwrap();
	match options {
		Options::Train(options) => {
			assert_eq!(options.file, PathBuf::from("data.csv"));
			assert_eq!(options.target, "price");
			assert_eq!(options.config, None);
		}
	}
	assert!(Options::try_parse_from(&["leafwise", "train", "--file", "data.csv"]).is_err());
}
