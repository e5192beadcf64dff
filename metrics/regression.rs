use super::{mean_variance::merge_mean_m2, StreamingMetric};
use ndarray::prelude::*;
use num_traits::ToPrimitive;

/// `RegressionMetrics` computes metrics used to evaluate regressors.
#[derive(Clone, Debug, Default)]
pub struct RegressionMetrics {
	mean_variance: Option<MeanVariance>,
	absolute_error: f64,
	squared_error: f64,
}

#[derive(Clone, Debug)]
struct MeanVariance {
	n: u64,
	m2: f64,
	mean: f64,
}

/// The input to [`RegressionMetrics`](struct.RegressionMetrics.html).
pub struct RegressionMetricsInput<'a> {
	pub predictions: ArrayView1<'a, f64>,
	pub labels: ArrayView1<'a, f64>,
}

/// The output from [`RegressionMetrics`](struct.RegressionMetrics.html).
#[derive(Clone, Debug, PartialEq)]
pub struct RegressionMetricsOutput {
	/// The mean squared error is equal to the mean of the squared errors. For a given example, the error is the difference between the true value and the model's predicted value.
	pub mse: f64,
	/// The root mean squared error is equal to the square root of the mean squared error.
	pub rmse: f64,
	/// The mean of the absolute value of the errors.
	pub mae: f64,
	/// The r-squared value. https://en.wikipedia.org/wiki/Coefficient_of_determination. It is NaN if every label is the same.
	pub r2: f64,
	/// The mean squared error of a model that always predicts the mean of the labels.
	pub baseline_mse: f64,
	pub baseline_rmse: f64,
}

impl RegressionMetrics {
	pub fn new() -> RegressionMetrics {
		RegressionMetrics::default()
	}
}

impl<'a> StreamingMetric<'a> for RegressionMetrics {
	type Input = RegressionMetricsInput<'a>;
	type Output = RegressionMetricsOutput;

	fn update(&mut self, input: Self::Input) {
		let RegressionMetricsInput {
			predictions,
			labels,
		} = input;
		for (prediction, label) in predictions.iter().zip(labels.iter()) {
			match &mut self.mean_variance {
				Some(mean_variance) => {
					let (mean, m2) = merge_mean_m2(
						mean_variance.n,
						mean_variance.mean,
						mean_variance.m2,
						1,
						*label,
						0.0,
					);
					mean_variance.n += 1;
					mean_variance.mean = mean;
					mean_variance.m2 = m2;
				}
				None => {
					self.mean_variance = Some(MeanVariance {
						n: 1,
						mean: *label,
						m2: 0.0,
					})
				}
			}
			let error = prediction - label;
			self.absolute_error += error.abs();
			self.squared_error += error * error;
		}
	}

	fn merge(&mut self, other: Self) {
		match &mut self.mean_variance {
			Some(mean_variance) => {
				if let Some(other) = other.mean_variance {
					let (mean, m2) = merge_mean_m2(
						mean_variance.n,
						mean_variance.mean,
						mean_variance.m2,
						other.n,
						other.mean,
						other.m2,
					);
					mean_variance.mean = mean;
					mean_variance.m2 = m2;
					mean_variance.n += other.n;
				}
			}
			None => {
				self.mean_variance = other.mean_variance;
			}
		}
		self.absolute_error += other.absolute_error;
		self.squared_error += other.squared_error;
	}

	fn finalize(self) -> Self::Output {
		let (n, variance) = match self.mean_variance {
			Some(m) => {
				let n = m.n.to_f64().unwrap_or(f64::NAN);
				(n, m.m2 / n)
			}
			None => (0.0, f64::NAN),
		};
		let mae = self.absolute_error / n;
		let mse = self.squared_error / n;
		let rmse = mse.sqrt();
		// r-squared is undefined when the labels do not vary.
		let r2 = if variance > 0.0 {
			1.0 - self.squared_error / (variance * n)
		} else {
			f64::NAN
		};
		let baseline_mse = variance;
		let baseline_rmse = baseline_mse.sqrt();
		RegressionMetricsOutput {
			mse,
			rmse,
			mae,
			r2,
			baseline_mse,
			baseline_rmse,
		}
	}
}

/// Compute the r-squared value of `predictions` against `labels` in one pass.
pub fn r2_score(predictions: ArrayView1<f64>, labels: ArrayView1<f64>) -> f64 {
	let mut metrics = RegressionMetrics::new();
	metrics.update(RegressionMetricsInput {
		predictions: predictions.view(),
		labels: labels.view(),
	});
	metrics.finalize().r2
}

#[test]
fn test_regression_metrics() {
	let predictions = arr1(&[1.0, 2.0, 3.0, 5.0]);
	let labels = arr1(&[1.0, 2.0, 3.0, 4.0]);
	let mut metrics = RegressionMetrics::new();
	metrics.update(RegressionMetricsInput {
		predictions: predictions.view(),
		labels: labels.view(),
	});
	let metrics = metrics.finalize();
	insta::assert_debug_snapshot!(metrics, @r###"
 RegressionMetricsOutput {
     mse: 0.25,
     rmse: 0.5,
     mae: 0.25,
     r2: 0.8,
     baseline_mse: 1.25,
     baseline_rmse: 1.118033988749895,
 }
 "###);
}

#[test]
fn test_regression_metrics_merge() {
	let predictions = arr1(&[2.5, 0.0, 2.1, 7.8]);
	let labels = arr1(&[3.0, -0.5, 2.0, 7.0]);
	let mut a = RegressionMetrics::new();
	a.update(RegressionMetricsInput {
		predictions: predictions.slice(s![..1]),
		labels: labels.slice(s![..1]),
	});
	let mut b = RegressionMetrics::new();
	b.update(RegressionMetricsInput {
		predictions: predictions.slice(s![1..]),
		labels: labels.slice(s![1..]),
	});
	a.merge(b);
	let merged = a.finalize();
	assert!((merged.mse - 0.2875).abs() < 1e-12);
	assert!((merged.mae - 0.475).abs() < 1e-12);
	assert!((merged.baseline_mse - 7.296875).abs() < 1e-12);
	assert!((merged.r2 - r2_score(predictions.view(), labels.view())).abs() < 1e-12);
}

#[test]
fn test_r2_score_constant_labels() {
	let predictions = arr1(&[1.0, 2.0]);
	let labels = arr1(&[3.0, 3.0]);
	assert!(r2_score(predictions.view(), labels.view()).is_nan());
	assert_eq!(r2_score(labels.view(), arr1(&[1.0, 5.0]).view()), 0.0);
}
