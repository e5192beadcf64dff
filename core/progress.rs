use crate::cross_validation::GridSearchProgress;

/// This enum reports the progress of [`train`](../train/fn.train.html).
#[derive(Clone, Debug, PartialEq)]
pub enum Progress {
	Loading,
	Shuffling,
	Training(GridSearchProgress),
	Testing,
}
