use itertools::Itertools;
use leafwise_tree::{ParamValue, Params};
use std::collections::BTreeMap;

/// This is the grid searched when the config does not provide one.
pub fn default_hyperparameter_grid() -> BTreeMap<String, Vec<ParamValue>> {
	let mut grid = BTreeMap::new();
	grid.insert(
		"n_estimators".to_owned(),
		vec![ParamValue::Int(50), ParamValue::Int(100)],
	);
	grid.insert(
		"learning_rate".to_owned(),
		vec![ParamValue::Float(0.03), ParamValue::Float(0.05)],
	);
	grid.insert(
		"max_leaves".to_owned(),
		vec![ParamValue::Int(15), ParamValue::Int(20)],
	);
	grid
}

/// Expand a map from hyperparameter name to candidate values into every combination. The last name in key order varies fastest. An empty map produces a single empty grid item.
pub fn compute_hyperparameter_grid(grid: &BTreeMap<String, Vec<ParamValue>>) -> Vec<Params> {
	if grid.is_empty() {
		return vec![Params::new()];
	}
	grid.iter()
		.map(|(name, values)| values.iter().map(move |value| (name.clone(), value.clone())))
		.multi_cartesian_product()
		.map(|grid_item| grid_item.into_iter().collect())
		.collect()
}

#[cfg(test)]
use maplit::btreemap;

#[test]
fn test_compute_hyperparameter_grid() {
	let grid = compute_hyperparameter_grid(&btreemap! {
		"max_leaves".to_owned() => vec![ParamValue::Int(4), ParamValue::Int(8)],
		"lam".to_owned() => vec![ParamValue::Float(0.0), ParamValue::Float(1.0)],
	});
	insta::assert_debug_snapshot!(grid, @r###"
 [
     {
         "lam": Float(
             0.0,
         ),
         "max_leaves": Int(
             4,
         ),
     },
     {
         "lam": Float(
             0.0,
         ),
         "max_leaves": Int(
             8,
         ),
     },
     {
         "lam": Float(
             1.0,
         ),
         "max_leaves": Int(
             4,
         ),
     },
     {
         "lam": Float(
             1.0,
         ),
         "max_leaves": Int(
             8,
         ),
     },
 ]
 "###);
}

#[test]
fn test_default_hyperparameter_grid() {
	let grid = compute_hyperparameter_grid(&default_hyperparameter_grid());
	assert_eq!(grid.len(), 8);
	assert_eq!(compute_hyperparameter_grid(&BTreeMap::new()), vec![Params::new()]);
}
