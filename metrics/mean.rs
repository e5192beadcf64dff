use super::{mean_variance::merge_mean_m2, StreamingMetric};
use num_traits::ToPrimitive;

/// The arithmetic mean of the values passed to `update`. It is `None` if there were none.
#[derive(Clone, Debug, Default)]
pub struct Mean {
	n: u64,
	mean: f64,
}

impl StreamingMetric<'_> for Mean {
	type Input = f64;
	type Output = Option<f64>;

	fn update(&mut self, value: Self::Input) {
		self.n += 1;
		self.mean += (value - self.mean) / self.n.to_f64().unwrap_or(f64::NAN);
	}

	fn merge(&mut self, other: Self) {
		if other.n == 0 {
			return;
		}
		if self.n == 0 {
			*self = other;
			return;
		}
		let (mean, _) = merge_mean_m2(self.n, self.mean, 0.0, other.n, other.mean, 0.0);
		self.n += other.n;
		self.mean = mean;
	}

	fn finalize(self) -> Self::Output {
		if self.n == 0 {
			None
		} else {
			Some(self.mean)
		}
	}
}

#[test]
fn test_mean() {
	let mut a = Mean::default();
	assert_eq!(a.clone().finalize(), None);
	for value in &[1.0, 2.0, 3.0] {
		a.update(*value);
	}
	let mut b = Mean::default();
	b.update(10.0);
	a.merge(b);
	a.merge(Mean::default());
	assert_eq!(a.finalize(), Some(4.0));
}
