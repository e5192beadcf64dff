use crate::{
	estimator::{Estimator, Params},
	feature_importances::{compute_feature_importances, mean_leaves_per_tree},
	train::{train, TrainOutput},
	Error, TrainOptions, TrainProgress, Tree,
};
use ndarray::prelude::*;
use rayon::prelude::*;

const MIN_EXAMPLES_TO_PARALLELIZE: usize = 1024;

/// `Regressor`s predict continuous target values, for example the selling price of a home.
#[derive(Clone, Debug, Default)]
pub struct Regressor {
	/// These are the hyperparameters used by the next call to `fit`.
	pub options: TrainOptions,
	/// Parameters passed to `set_params` that the regressor does not use are kept here and returned by `get_params`.
	pub extra_params: Params,
	/// This is `None` until `fit` succeeds.
	pub ensemble: Option<Ensemble>,
}

/// The trees trained by a single call to `fit`.
#[derive(Clone, Debug, PartialEq)]
pub struct Ensemble {
	/// The initial prediction of the model given no trained trees. This is the mean of the labels in the training data.
	pub init_pred: f64,
	/// This is the learning rate the trees were trained with. Every tree's output is scaled by it.
	pub learning_rate: f64,
	/// This is the number of features in the training data.
	pub n_features: usize,
	/// The trees for this model, in the order they were trained.
	pub trees: Vec<Tree>,
	/// The training losses in each round of training this model.
	pub losses: Vec<f64>,
}

impl Regressor {
	pub fn new(options: TrainOptions) -> Regressor {
		Regressor {
			options,
			extra_params: Params::new(),
			ensemble: None,
		}
	}

	/// Train a regressor, replacing any trees from a previous call. If training fails, the previous trees are kept.
	pub fn fit(
		&mut self,
		features: ArrayView2<f64>,
		labels: ArrayView1<f64>,
	) -> Result<&mut Self, Error> {
		self.fit_with_progress(features, labels, &mut |_| {})
	}

	/// Train a regressor, reporting progress after every round.
	pub fn fit_with_progress(
		&mut self,
		features: ArrayView2<f64>,
		labels: ArrayView1<f64>,
		update_progress: &mut dyn FnMut(TrainProgress),
	) -> Result<&mut Self, Error> {
		let TrainOutput {
			bias,
			trees,
			losses,
		} = train(features, labels, &self.options, update_progress)?;
		self.ensemble = Some(Ensemble {
			init_pred: bias,
			learning_rate: self.options.learning_rate,
			n_features: features.ncols(),
			trees,
			losses,
		});
		Ok(self)
	}

	/// Make predictions.
	pub fn predict(&self, features: ArrayView2<f64>) -> Result<Array1<f64>, Error> {
		self.ensemble
			.as_ref()
			.ok_or(Error::ModelNotFitted)?
			.predict(features)
	}

	pub fn get_params(&self) -> Params {
		let mut params = self.extra_params.clone();
		params.insert(
			"n_estimators".to_owned(),
			self.options.n_estimators.into(),
		);
		params.insert(
			"learning_rate".to_owned(),
			self.options.learning_rate.into(),
		);
		params.insert("max_leaves".to_owned(), self.options.max_leaves.into());
		params.insert(
			"min_data_in_leaf".to_owned(),
			self.options.min_data_in_leaf.into(),
		);
		params.insert("lam".to_owned(), self.options.lam.into());
		params.insert("gamma".to_owned(), self.options.gamma.into());
		params
	}

	/// Update any subset of the hyperparameters. Nothing is changed if any value is invalid. The trees from a previous call to `fit` are not affected.
	pub fn set_params(&mut self, params: Params) -> Result<&mut Self, Error> {
		let mut options = self.options.clone();
		let mut extra_params = self.extra_params.clone();
		for (name, value) in params {
			match name.as_str() {
				"n_estimators" => options.n_estimators = value.to_count(&name)?,
				"learning_rate" => options.learning_rate = value.to_float(&name)?,
				"max_leaves" => options.max_leaves = value.to_count(&name)?,
				"min_data_in_leaf" => options.min_data_in_leaf = value.to_count(&name)?,
				"lam" => options.lam = value.to_float(&name)?,
				"gamma" => options.gamma = value.to_float(&name)?,
				_ => {
					extra_params.insert(name, value);
				}
			}
		}
		self.options = options;
		self.extra_params = extra_params;
		Ok(self)
	}

	/// The importance of each feature as measured by the number of times the feature was used in a branch node. This is `None` before the model is fit.
	pub fn feature_importances(&self) -> Option<Vec<f64>> {
		self.ensemble
			.as_ref()
			.map(|ensemble| compute_feature_importances(&ensemble.trees, ensemble.n_features))
	}

	pub fn trees(&self) -> &[Tree] {
		self.ensemble
			.as_ref()
			.map(|ensemble| ensemble.trees.as_slice())
			.unwrap_or(&[])
	}

	pub fn init_pred(&self) -> Option<f64> {
		self.ensemble.as_ref().map(|ensemble| ensemble.init_pred)
	}

	pub fn mean_leaves_per_tree(&self) -> Option<f64> {
		mean_leaves_per_tree(self.trees())
	}
}

impl Ensemble {
	/// Make predictions. The features must have the same number of columns as the training data.
	pub fn predict(&self, features: ArrayView2<f64>) -> Result<Array1<f64>, Error> {
		if features.ncols() != self.n_features {
			return Err(Error::ShapeMismatch {
				expected: self.n_features,
				actual: features.ncols(),
			});
		}
		let n_examples = features.nrows();
		let predictions: Vec<f64> = if n_examples >= MIN_EXAMPLES_TO_PARALLELIZE {
			(0..n_examples)
				.into_par_iter()
				.map(|example_index| self.predict_example(features.row(example_index)))
				.collect()
		} else {
			features
				.axis_iter(Axis(0))
				.map(|example| self.predict_example(example))
				.collect()
		};
		Ok(Array1::from(predictions))
	}

	fn predict_example(&self, example: ArrayView1<f64>) -> f64 {
		let mut prediction = self.init_pred;
		for tree in &self.trees {
			prediction += self.learning_rate * tree.predict(example);
		}
		prediction
	}
}

impl Estimator for Regressor {
	fn fit(
		&mut self,
		features: ArrayView2<f64>,
		labels: ArrayView1<f64>,
	) -> Result<&mut Self, Error> {
		Regressor::fit(self, features, labels)
	}

	fn predict(&self, features: ArrayView2<f64>) -> Result<Array1<f64>, Error> {
		Regressor::predict(self, features)
	}

	fn get_params(&self) -> Params {
		Regressor::get_params(self)
	}

	fn set_params(&mut self, params: Params) -> Result<&mut Self, Error> {
		Regressor::set_params(self, params)
	}
}

#[cfg(test)]
use crate::ParamValue;
#[cfg(test)]
use maplit::btreemap;

#[test]
fn test_scenario() {
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
	assert_eq!(model.init_pred(), Some(3.0));
	let predictions = model.predict(features.view()).unwrap();
	for (prediction, expected) in predictions.iter().zip(&[2.8, 2.8, 3.2, 3.2]) {
		assert!((prediction - expected).abs() < 1e-12);
	}
	assert_eq!(model.feature_importances(), Some(vec![1.0]));
}

#[test]
fn test_predict_errors() {
	let model = Regressor::default();
	assert_eq!(
		model.predict(arr2(&[[1.0]]).view()).unwrap_err(),
		Error::ModelNotFitted
	);
	let mut model = Regressor::default();
	model
		.fit(arr2(&[[1.0, 2.0], [3.0, 4.0]]).view(), arr1(&[1.0, 2.0]).view())
		.unwrap();
	assert_eq!(
		model.predict(arr2(&[[1.0, 2.0, 3.0]]).view()).unwrap_err(),
		Error::ShapeMismatch {
			expected: 2,
			actual: 3,
		}
	);
}

#[test]
fn test_failed_fit_keeps_previous_ensemble() {
	let mut model = Regressor::default();
	model
		.fit(arr2(&[[1.0], [2.0]]).view(), arr1(&[1.0, 2.0]).view())
		.unwrap();
	let ensemble = model.ensemble.clone();
	assert!(model
		.fit(arr2(&[[1.0], [2.0]]).view(), arr1(&[1.0]).view())
		.is_err());
	assert_eq!(model.ensemble, ensemble);
}

#[test]
fn test_get_params() {
	let model = Regressor::default();
	insta::assert_debug_snapshot!(model.get_params(), @r###"
 {
     "gamma": Float(
         0.0,
     ),
     "lam": Float(
         1.0,
     ),
     "learning_rate": Float(
         0.03,
     ),
     "max_leaves": Int(
         20,
     ),
     "min_data_in_leaf": Int(
         1,
     ),
     "n_estimators": Int(
         50,
     ),
 }
 "###);
}

#[test]
fn test_set_params() {
	let mut model = Regressor::default();
	model
		.set_params(btreemap! {
			"n_estimators".to_owned() => ParamValue::Float(100.7),
			"max_leaves".to_owned() => ParamValue::String("15".to_owned()),
			"lam".to_owned() => ParamValue::Int(2),
			"verbose".to_owned() => ParamValue::Bool(false),
		})
		.unwrap();
	assert_eq!(model.options.n_estimators, 100);
	assert_eq!(model.options.max_leaves, 15);
	assert_eq!(model.options.lam, 2.0);
	assert_eq!(
		model.get_params().get("verbose"),
		Some(&ParamValue::Bool(false))
	);
	// Setting the params a model reports is a no-op.
	let before = model.clone();
	model.set_params(before.get_params()).unwrap();
	assert_eq!(model.options, before.options);
	assert_eq!(model.extra_params, before.extra_params);
}

#[test]
fn test_set_params_is_atomic() {
	let mut model = Regressor::default();
	let error = model
		.set_params(btreemap! {
			"gamma".to_owned() => ParamValue::Float(0.5),
			"n_estimators".to_owned() => ParamValue::Int(-3),
		})
		.unwrap_err();
	assert_eq!(
		error,
		Error::InvalidParameter {
			name: "n_estimators".to_owned(),
			value: "-3".to_owned(),
		}
	);
	assert_eq!(model.options, TrainOptions::default());
}

#[test]
fn test_set_params_does_not_affect_fitted_trees() {
	let features = arr2(&[[1.0], [2.0], [3.0], [4.0]]);
	let labels = arr1(&[1.0, 1.0, 5.0, 5.0]);
	let mut model = Regressor::default();
	model.fit(features.view(), labels.view()).unwrap();
	let before = model.predict(features.view()).unwrap();
	model
		.set_params(btreemap! {
			"learning_rate".to_owned() => ParamValue::Float(0.9),
		})
		.unwrap();
	assert_eq!(model.predict(features.view()).unwrap(), before);
}

#[test]
fn test_fit_with_huge_min_data_in_leaf() {
	let features = arr2(&[[1.0], [2.0], [3.0], [4.0]]);
	let labels = arr1(&[1.0, 1.0, 5.0, 5.0]);
	let mut model = Regressor::default();
	model
		.set_params(btreemap! {
			"min_data_in_leaf".to_owned() => ParamValue::Float(1e19),
		})
		.unwrap();
	assert_eq!(model.options.min_data_in_leaf, 10_000_000_000_000_000_000);
	model.fit(features.view(), labels.view()).unwrap();
	assert!(model.trees().iter().all(|tree| tree.nodes.len() == 1));
	for prediction in model.predict(features.view()).unwrap().iter() {
		assert!((prediction - 3.0).abs() < 1e-12);
	}
}
