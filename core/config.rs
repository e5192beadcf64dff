/*!
This module defines the `Config` struct, which is used to configure training a model with [`train`](../train/fn.train.html).
*/

use anyhow::{Context, Result};
use leafwise_tree::{ParamValue, Params};
use std::{collections::BTreeMap, path::Path};

#[derive(Debug, Default, serde::Deserialize)]
pub struct Config {
	/// These hyperparameters are applied to the regressor before any grid item.
	pub params: Option<Params>,
	/// Each hyperparameter name maps to the values to try for it.
	pub grid: Option<BTreeMap<String, Vec<ParamValue>>>,
	pub n_folds: Option<usize>,
	pub test_fraction: Option<f64>,
	pub shuffle: Option<Shuffle>,
	/// This is how empty and NaN cells in feature columns are handled. The default is `mean`.
	pub missing_values: Option<MissingValues>,
}

#[derive(Debug, PartialEq, serde::Deserialize)]
#[serde(untagged)]
pub enum Shuffle {
	Enabled(bool),
	Options { seed: u64 },
}

/// Examples with a missing label are always dropped. Fill values are computed from the train split only.
#[derive(Clone, Copy, Debug, PartialEq, serde::Deserialize)]
pub enum MissingValues {
	/// Drop every example with a missing feature value.
	#[serde(rename = "drop")]
	Drop,
	/// Replace missing feature values with the mean of the column.
	#[serde(rename = "mean")]
	Mean,
	/// Replace missing feature values with the median of the column.
	#[serde(rename = "median")]
	Median,
}

impl Default for MissingValues {
	fn default() -> MissingValues {
		MissingValues::Mean
	}
}

/// Load the config from a YAML or JSON file, if a path is provided.
pub fn load_config(config_path: Option<&Path>) -> Result<Option<Config>> {
	if let Some(config_path) = config_path {
		let config = std::fs::read_to_string(config_path)
			.with_context(|| format!("failed to read config file {}", config_path.display()))?;
		let config = serde_yaml::from_str(&config)
			.with_context(|| format!("failed to parse config file {}", config_path.display()))?;
		Ok(Some(config))
	} else {
		Ok(None)
	}
}

#[test]
fn test_parse_config() {
	let config: Config = serde_yaml::from_str(
		r#"
params:
  lam: 2
grid:
  max_leaves: [4, 8]
  learning_rate: [0.1]
n_folds: 3
shuffle:
  seed: 7
missing_values: median
"#,
	)
	.unwrap();
	insta::assert_debug_snapshot!(config, @r###"
 Config {
     params: Some(
         {
             "lam": Int(
                 2,
             ),
         },
     ),
     grid: Some(
         {
             "learning_rate": [
                 Float(
                     0.1,
                 ),
             ],
             "max_leaves": [
                 Int(
                     4,
                 ),
                 Int(
                     8,
                 ),
             ],
         },
     ),
     n_folds: Some(
         3,
     ),
     test_fraction: None,
     shuffle: Some(
         Options {
             seed: 7,
         },
     ),
     missing_values: Some(
         Median,
     ),
 }
 "###);
	let config: Config = serde_yaml::from_str(r#"{"shuffle": false}"#).unwrap();
	assert_eq!(config.shuffle, Some(Shuffle::Enabled(false)));
	assert_eq!(config.missing_values, None);
	assert!(serde_yaml::from_str::<Config>("missing_values: mode").is_err());
}
