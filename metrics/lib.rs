/*!
This crate defines the [`StreamingMetric`](trait.StreamingMetric.html) trait and the regression metrics used to evaluate models, such as [`MeanSquaredError`](struct.MeanSquaredError.html) and [`RegressionMetrics`](struct.RegressionMetrics.html).
*/

#![allow(clippy::tabs_in_doc_comments)]

mod mean;
mod mean_squared_error;
mod mean_variance;
mod regression;

pub use self::mean::Mean;
pub use self::mean_squared_error::MeanSquaredError;
pub use self::mean_variance::{m2_to_variance, merge_mean_m2};
pub use self::regression::{
	r2_score, RegressionMetrics, RegressionMetricsInput, RegressionMetricsOutput,
};

/**
The `StreamingMetric` trait defines a common interface to metrics that can be computed in a streaming manner, where the input is available in chunks, such as mean squared error.

After being initialized, a value of type `T` implementing the `StreamingMetric` trait can have `update()` called on it with values of the associated type `Input`. Multiple values of `T` can be merged together by calling `merge()`. This is useful when computing a metric across multiple threads. When finished aggregating, you can call `finalize()` on the metric to produce the associated type `Output`.

# Examples

Here is a basic example implementation of a `Max` metric, which takes `f64`s as input and produces an `f64` as output that is the maximum of all the inputs.

```
use leafwise_metrics::StreamingMetric;

struct Max(f64);

impl StreamingMetric<'_> for Max {
	type Input = f64;
	type Output = f64;
	fn update(&mut self, input: Self::Input) {
		self.0 = self.0.max(input)
	}
	fn merge(&mut self, other: Self) { self.0 = self.0.max(other.0) }
	fn finalize(self) -> Self::Output { self.0 }
}
```

The generic lifetime `'a` allows `Input`s to borrow from their enclosing scope, as `RegressionMetricsInput` does.
*/
pub trait StreamingMetric<'a> {
	/// `Input` is the type to aggregate in calls to `update()`.
	type Input;
	/// `Output` is the return type of `finalize()`.
	type Output;
	/// Update this streaming metric with the `Input` `input`.
	fn update(&mut self, input: Self::Input);
	/// Merge multiple independently computed streaming metrics.
	fn merge(&mut self, other: Self);
	/// When you are done aggregating `Input`s, call `finalize()` to produce an `Output`.
	fn finalize(self) -> Self::Output;
}
