/*!
This crate trains `leafwise_tree` regressors from CSV files. It loads and shuffles the data, holds out a test split, chooses hyperparameters with a k-fold cross validated grid search, and reports metrics for the chosen model on the test split.
*/

#![allow(clippy::tabs_in_doc_comments)]

pub mod config;
pub mod cross_validation;
pub mod grid;
pub mod missing_values;
pub mod progress;
pub mod train;

pub use self::{
	cross_validation::{count_overfit_folds, grid_search, k_fold_indices, FoldMetrics},
	grid::compute_hyperparameter_grid,
	progress::Progress,
	train::{train, TrainOutput},
};
