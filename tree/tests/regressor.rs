use leafwise_tree::{Estimator, Node, Params, Regressor, TrainOptions};
use ndarray::prelude::*;

/// A small deterministic dataset with one informative continuous feature, one step feature, and a little noise.
fn dataset(n_examples: usize) -> (Array2<f64>, Array1<f64>) {
	let mut features = Array2::zeros((n_examples, 3));
	let mut labels = Array1::zeros(n_examples);
	for example_index in 0..n_examples {
		let x0 = ((example_index * 7) % 23) as f64;
		let x1 = ((example_index * 13) % 17) as f64 / 3.0;
		let x2 = 1.0;
		let noise = ((example_index * 31) % 7) as f64 * 0.1;
		features[(example_index, 0)] = x0;
		features[(example_index, 1)] = x1;
		features[(example_index, 2)] = x2;
		labels[example_index] = 0.5 * x0 + if x1 > 2.0 { 3.0 } else { 0.0 } + noise;
	}
	(features, labels)
}

fn mean_squared_error(predictions: ArrayView1<f64>, labels: ArrayView1<f64>) -> f64 {
	let sum: f64 = predictions
		.iter()
		.zip(labels.iter())
		.map(|(prediction, label)| (prediction - label).powi(2))
		.sum();
	sum / labels.len() as f64
}

fn fit(options: TrainOptions, features: ArrayView2<f64>, labels: ArrayView1<f64>) -> Regressor {
	let mut model = Regressor::new(options);
	model.fit(features, labels).unwrap();
	model
}

#[test]
fn test_training_is_deterministic() {
	let (features, labels) = dataset(80);
	let options = TrainOptions {
		n_estimators: 10,
		max_leaves: 6,
		..Default::default()
	};
	let a = fit(options.clone(), features.view(), labels.view());
	let b = fit(options, features.view(), labels.view());
	assert_eq!(a.ensemble, b.ensemble);
	assert_eq!(
		a.predict(features.view()).unwrap(),
		b.predict(features.view()).unwrap()
	);
}

#[test]
fn test_training_loss_does_not_increase() {
	let (features, labels) = dataset(80);
	let options = TrainOptions {
		n_estimators: 20,
		learning_rate: 0.3,
		max_leaves: 4,
		..Default::default()
	};
	let model = fit(options.clone(), features.view(), labels.view());
	let losses = &model.ensemble.as_ref().unwrap().losses;
	assert_eq!(losses.len(), 20);
	for window in losses.windows(2) {
		assert!(window[1] <= window[0] + 1e-12);
	}
	let fewer_rounds = fit(
		TrainOptions {
			n_estimators: 5,
			..options
		},
		features.view(),
		labels.view(),
	);
	let mse_fewer = mean_squared_error(
		fewer_rounds.predict(features.view()).unwrap().view(),
		labels.view(),
	);
	let mse_more = mean_squared_error(
		model.predict(features.view()).unwrap().view(),
		labels.view(),
	);
	assert!(mse_more < mse_fewer);
}

#[test]
fn test_trees_respect_max_leaves_and_min_data_in_leaf() {
	let (features, labels) = dataset(120);
	for &(max_leaves, min_data_in_leaf) in &[(2, 1), (5, 3), (12, 10), (31, 1)] {
		let model = fit(
			TrainOptions {
				n_estimators: 8,
				learning_rate: 0.2,
				max_leaves,
				min_data_in_leaf,
				..Default::default()
			},
			features.view(),
			labels.view(),
		);
		for tree in model.trees() {
			assert!(tree.n_leaves() <= max_leaves);
			assert_eq!(tree.nodes.len(), 2 * tree.n_leaves() - 1);
			for leaf in tree.leaves() {
				assert!(leaf.n_examples >= min_data_in_leaf);
			}
			let n_examples: usize = tree.leaves().map(|leaf| leaf.n_examples).sum();
			assert_eq!(n_examples, 120);
		}
	}
}

#[test]
fn test_large_lam_shrinks_leaf_values() {
	let (features, labels) = dataset(50);
	let model = fit(
		TrainOptions {
			n_estimators: 3,
			lam: 1e12,
			..Default::default()
		},
		features.view(),
		labels.view(),
	);
	for tree in model.trees() {
		for leaf in tree.leaves() {
			assert!(leaf.value.abs() < 1e-8);
		}
	}
}

#[test]
fn test_single_leaf_trees() {
	let (features, labels) = dataset(40);
	let model = fit(
		TrainOptions {
			n_estimators: 4,
			max_leaves: 1,
			..Default::default()
		},
		features.view(),
		labels.view(),
	);
	let mean = labels.mean().unwrap();
	for tree in model.trees() {
		match tree.nodes.as_slice() {
			[Node::Leaf(leaf)] => {
				assert_eq!(leaf.n_examples, 40);
				assert!(leaf.value.abs() < 1e-9);
			}
			nodes => panic!("expected a single leaf but got {:?}", nodes),
		}
	}
	for prediction in model.predict(features.view()).unwrap().iter() {
		assert!((prediction - mean).abs() < 1e-9);
	}
}

#[test]
fn test_constant_features_produce_no_splits() {
	let features = Array2::from_elem((10, 2), 4.0);
	let labels = Array1::from((0..10).map(|i| i as f64).collect::<Vec<f64>>());
	let model = fit(TrainOptions::default(), features.view(), labels.view());
	assert!(model.trees().iter().all(|tree| tree.nodes.len() == 1));
	assert_eq!(model.feature_importances(), Some(vec![0.0, 0.0]));
}

#[test]
fn test_refit_replaces_trees() {
	let (features, labels) = dataset(30);
	let mut model = Regressor::new(TrainOptions {
		n_estimators: 3,
		..Default::default()
	});
	model.fit(features.view(), labels.view()).unwrap();
	model.options.n_estimators = 2;
	model.fit(features.view(), labels.view()).unwrap();
	assert_eq!(model.trees().len(), 2);
}

/// Model selection code only sees the `Estimator` trait.
fn fit_and_score<E: Estimator + Clone>(
	estimator: &E,
	params: Params,
	features: ArrayView2<f64>,
	labels: ArrayView1<f64>,
) -> f64 {
	let mut estimator = estimator.clone();
	estimator.set_params(params).unwrap();
	estimator.fit(features, labels).unwrap();
	let predictions = estimator.predict(features).unwrap();
	mean_squared_error(predictions.view(), labels.view())
}

#[test]
fn test_estimator_trait() {
	let (features, labels) = dataset(60);
	let base = Regressor::default();
	let mut params = Params::new();
	params.insert("n_estimators".to_owned(), 40usize.into());
	params.insert("learning_rate".to_owned(), 0.2f64.into());
	let strong = fit_and_score(&base, params, features.view(), labels.view());
	let weak = fit_and_score(&base, Params::new(), features.view(), labels.view());
	assert!(strong < weak);
	assert!(base.ensemble.is_none());
}
