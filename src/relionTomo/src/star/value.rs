
use std::fmt;
use std::path::Path;

use crate::schema::ValueKind;


/// One cell of a STAR table
#[derive(Debug, Clone, PartialEq)]
pub enum Value {
	Int(i64),
	Float(f64),
	Str(String)
}

impl Value {

	/// parses a token according to the kind of its column, or None if the token doesn't fit
	pub fn parse(kind: ValueKind, token: &str) -> Option<Self> {
		match kind {
			ValueKind::Int => {
				if let Ok(i) = token.parse::<i64>() {
					return Some(Self::Int(i));
				}
				// RELION sometimes prints integer columns with a fixed-point format
				let f = token.parse::<f64>().ok()?;
				if f.is_finite() && f.fract() == 0.0 {
					Some(Self::Int(f as i64))
				} else {
					None
				}
			}
			ValueKind::Float => token.parse::<f64>()
				.ok()
				.map(Self::Float),
			ValueKind::Str => Some(Self::Str(token.to_string()))
		}
	}

	pub fn kind(&self) -> ValueKind {
		match self {
			Self::Int(_) => ValueKind::Int,
			Self::Float(_) => ValueKind::Float,
			Self::Str(_) => ValueKind::Str
		}
	}

	/// converts the value into the kind a column demands, if that loses nothing
	pub fn coerce(self, kind: ValueKind) -> Option<Self> {
		match (self, kind) {
			(v @ Self::Int(_), ValueKind::Int) => Some(v),
			(v @ Self::Float(_), ValueKind::Float) => Some(v),
			(v @ Self::Str(_), ValueKind::Str) => Some(v),
			(Self::Int(i), ValueKind::Float) => Some(Self::Float(i as f64)),
			(Self::Float(f), ValueKind::Int) =>
				if f.is_finite() && f.fract() == 0.0 {
					Some(Self::Int(f as i64))
				} else {
					None
				},
			(Self::Str(s), kind) => Self::parse(kind, &s),
			(v, ValueKind::Str) => Some(Self::Str(v.to_string()))
		}
	}

	pub fn as_f64(&self) -> Option<f64> {
		match self {
			Self::Int(i) => Some(*i as f64),
			Self::Float(f) => Some(*f),
			Self::Str(_) => None
		}
	}

	pub fn as_i64(&self) -> Option<i64> {
		match self {
			Self::Int(i) => Some(*i),
			_ => None
		}
	}

	pub fn as_str(&self) -> Option<&str> {
		match self {
			Self::Str(s) => Some(s.as_str()),
			_ => None
		}
	}
}

impl fmt::Display for Value {

	fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
		match self {
			Self::Int(i) => write!(f, "{}", i),
			Self::Float(v) => f.write_str(&format_float(*v)),
			Self::Str(s) => f.write_str(s)
		}
	}
}

impl From<f64> for Value {
	fn from(value: f64) -> Self {
		Self::Float(value)
	}
}

impl From<i64> for Value {
	fn from(value: i64) -> Self {
		Self::Int(value)
	}
}

impl From<i32> for Value {
	fn from(value: i32) -> Self {
		Self::Int(value as i64)
	}
}

impl From<u32> for Value {
	fn from(value: u32) -> Self {
		Self::Int(value as i64)
	}
}

impl From<u8> for Value {
	fn from(value: u8) -> Self {
		Self::Int(value as i64)
	}
}

impl From<usize> for Value {
	fn from(value: usize) -> Self {
		Self::Int(value as i64)
	}
}

impl From<&str> for Value {
	fn from(value: &str) -> Self {
		Self::Str(value.to_string())
	}
}

impl From<String> for Value {
	fn from(value: String) -> Self {
		Self::Str(value)
	}
}

impl From<&String> for Value {
	fn from(value: &String) -> Self {
		Self::Str(value.clone())
	}
}

impl From<&Path> for Value {
	fn from(value: &Path) -> Self {
		Self::Str(value.to_string_lossy().to_string())
	}
}


/// Formats a float with six significant digits, like C's `%g`
pub fn format_float(v: f64) -> String {

	if v == 0.0 {
		return "0".to_string();
	}
	if !v.is_finite() {
		return v.to_string();
	}

	// round to six digits first, the rounding can carry into the next power of ten
	let s = format!("{:.5e}", v);
	let Some((mantissa, exp)) = s.split_once('e')
		.and_then(|(m, e)| Some((m, e.parse::<i32>().ok()?)))
		else { return s; };

	if exp < -4 || exp >= 6 {
		// C writes the exponent signed, with at least two digits
		format!("{}e{:+03}", trim_zeros(mantissa), exp)
	} else {
		let decimals = (5 - exp).max(0) as usize;
		trim_zeros(&format!("{:.*}", decimals, v))
	}
}

fn trim_zeros(s: &str) -> String {
	if s.contains('.') {
		s.trim_end_matches('0')
			.trim_end_matches('.')
			.to_string()
	} else {
		s.to_string()
	}
}


/// Formats a vector-valued cell, eg `[1,0,0,-512]`
pub fn format_vector(values: &[f64]) -> String {
	let parts = values.iter()
		.map(|v| format_float(*v))
		.collect::<Vec<_>>();
	format!("[{}]", parts.join(","))
}

/// Parses a vector-valued cell, eg `[1.0,0.0,0.0,-512.0]`
pub fn parse_vector(s: &str) -> Option<Vec<f64>> {
	let inner = s.trim()
		.strip_prefix('[')?
		.strip_suffix(']')?;
	if inner.trim().is_empty() {
		return Some(Vec::new());
	}
	inner.split(',')
		.map(|part| part.trim().parse::<f64>().ok())
		.collect()
}


#[cfg(test)]
mod test {

	use galvanic_assert::{assert_that, matchers::*};

	use super::*;


	#[test]
	fn floats() {
		assert_that!(&format_float(0.0), eq("0".to_string()));
		assert_that!(&format_float(1.0), eq("1".to_string()));
		assert_that!(&format_float(-2.5), eq("-2.5".to_string()));
		assert_that!(&format_float(1.0/3.0), eq("0.333333".to_string()));
		assert_that!(&format_float(123456.0), eq("123456".to_string()));
		assert_that!(&format_float(1234567.0), eq("1.23457e+06".to_string()));
		assert_that!(&format_float(0.000015), eq("1.5e-05".to_string()));
		assert_that!(&format_float(10000.0), eq("10000".to_string()));
	}


	#[test]
	fn floats_rounding_up_a_power_of_ten() {
		assert_that!(&format_float(999999.5), eq("1e+06".to_string()));
		assert_that!(&format_float(-999999.7), eq("-1e+06".to_string()));
		assert_that!(&format_float(9.999996e-5), eq("0.0001".to_string()));
		assert_that!(&format_float(0.99999999), eq("1".to_string()));
	}


	#[test]
	fn vectors() {
		assert_that!(&format_vector(&[1.0, 0.0, -0.5, 512.0]), eq("[1,0,-0.5,512]".to_string()));
		assert_that!(&parse_vector("[1.0, 0.0,-0.5,512]"), eq(Some(vec![1.0, 0.0, -0.5, 512.0])));
		assert_that!(&parse_vector("[]"), eq(Some(vec![])));
		assert_that!(&parse_vector("1,2"), eq(None));
		assert_that!(&parse_vector("[1,x]"), eq(None));
	}


	#[test]
	fn parse_by_kind() {
		assert_that!(&Value::parse(ValueKind::Int, "3"), eq(Some(Value::Int(3))));
		assert_that!(&Value::parse(ValueKind::Int, "3.000000"), eq(Some(Value::Int(3))));
		assert_that!(&Value::parse(ValueKind::Int, "3.5"), eq(None));
		assert_that!(&Value::parse(ValueKind::Float, "1e3"), eq(Some(Value::Float(1000.0))));
		assert_that!(&Value::parse(ValueKind::Float, "nope"), eq(None));
		assert_that!(&Value::parse(ValueKind::Str, "3"), eq(Some(Value::Str("3".to_string()))));
	}


	#[test]
	fn coerce() {
		assert_that!(&Value::Int(2).coerce(ValueKind::Float), eq(Some(Value::Float(2.0))));
		assert_that!(&Value::Float(2.0).coerce(ValueKind::Int), eq(Some(Value::Int(2))));
		assert_that!(&Value::Float(2.5).coerce(ValueKind::Int), eq(None));
		assert_that!(&Value::Float(2.5).coerce(ValueKind::Str), eq(Some(Value::Str("2.5".to_string()))));
		assert_that!(&Value::Str("7".to_string()).coerce(ValueKind::Int), eq(Some(Value::Int(7))));
	}
}
