use crate::Error;
use ndarray::prelude::*;
use num_traits::ToPrimitive;
use std::{collections::BTreeMap, fmt};

/// Hyperparameters by name, as returned by `get_params` and accepted by `set_params`.
pub type Params = BTreeMap<String, ParamValue>;

/// A single hyperparameter value. Values read from JSON or YAML deserialize into the first variant that fits.
#[derive(Clone, Debug, PartialEq, serde::Serialize, serde::Deserialize)]
#[serde(untagged)]
pub enum ParamValue {
	Bool(bool),
	Int(i64),
	Float(f64),
	String(String),
}

/// Every model that can be trained and evaluated by the model selection code implements this trait.
pub trait Estimator {
	fn fit(
		&mut self,
		features: ArrayView2<f64>,
		labels: ArrayView1<f64>,
	) -> Result<&mut Self, Error>;
	fn predict(&self, features: ArrayView2<f64>) -> Result<Array1<f64>, Error>;
	fn get_params(&self) -> Params;
	fn set_params(&mut self, params: Params) -> Result<&mut Self, Error>;
}

impl fmt::Display for ParamValue {
	fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
		match self {
			ParamValue::Bool(value) => write!(f, "{}", value),
			ParamValue::Int(value) => write!(f, "{}", value),
			ParamValue::Float(value) => write!(f, "{}", value),
			ParamValue::String(value) => write!(f, "\"{}\"", value),
		}
	}
}

impl From<usize> for ParamValue {
	fn from(value: usize) -> Self {
		ParamValue::Int(value.to_i64().unwrap_or(i64::MAX))
	}
}

impl From<f64> for ParamValue {
	fn from(value: f64) -> Self {
		ParamValue::Float(value)
	}
}

impl ParamValue {
	/// Interpret this value as a count. Floats are truncated toward zero and text must hold an integer.
	pub fn to_count(&self, name: &str) -> Result<usize, Error> {
		let invalid = || Error::InvalidParameter {
			name: name.to_owned(),
			value: self.to_string(),
		};
		let value = match self {
			ParamValue::Bool(value) => Some(*value as usize),
			ParamValue::Int(value) => value.to_usize(),
			ParamValue::Float(value) if value.is_finite() => value.trunc().to_usize(),
			ParamValue::Float(_) => None,
			ParamValue::String(value) => value.trim().parse::<i64>().ok().and_then(|v| v.to_usize()),
		};
		value.ok_or_else(invalid)
	}

	/// Interpret this value as a finite float.
	pub fn to_float(&self, name: &str) -> Result<f64, Error> {
		let value = match self {
			ParamValue::Bool(value) => Some(if *value { 1.0 } else { 0.0 }),
			ParamValue::Int(value) => value.to_f64(),
			ParamValue::Float(value) => Some(*value),
			ParamValue::String(value) => value.trim().parse::<f64>().ok(),
		};
		match value {
			Some(value) if value.is_finite() => Ok(value),
			_ => Err(Error::InvalidParameter {
				name: name.to_owned(),
				value: self.to_string(),
			}),
		}
	}
}

#[test]
fn test_to_count() {
	assert_eq!(ParamValue::Int(7).to_count("n").unwrap(), 7);
	assert_eq!(ParamValue::Float(7.9).to_count("n").unwrap(), 7);
	assert_eq!(ParamValue::String(" 12 ".to_owned()).to_count("n").unwrap(), 12);
	assert_eq!(ParamValue::Bool(true).to_count("n").unwrap(), 1);
	assert_eq!(
		ParamValue::Int(-1).to_count("n").unwrap_err(),
		Error::InvalidParameter {
			name: "n".to_owned(),
			value: "-1".to_owned(),
		}
	);
	assert!(ParamValue::String("1.5".to_owned()).to_count("n").is_err());
	assert!(ParamValue::Float(f64::NAN).to_count("n").is_err());
}

#[test]
fn test_to_float() {
	assert_eq!(ParamValue::Int(2).to_float("lam").unwrap(), 2.0);
	assert_eq!(ParamValue::String("0.05".to_owned()).to_float("lam").unwrap(), 0.05);
	assert!(ParamValue::String("inf".to_owned()).to_float("lam").is_err());
	assert!(ParamValue::String("fast".to_owned()).to_float("lam").is_err());
}

#[test]
fn test_deserialize_params() {
	let params: Params = serde_json::from_str(
		r#"{"n_estimators": 100, "learning_rate": 0.05, "verbose": true, "objective": "l2"}"#,
	)
	.unwrap();
	insta::assert_debug_snapshot!(params, @r###"
 {
     "learning_rate": Float(
         0.05,
     ),
     "n_estimators": Int(
         100,
     ),
     "objective": String(
         "l2",
     ),
     "verbose": Bool(
         true,
     ),
 }
 "###);
}
