
// Structural and numerical differences between one table of two STAR files.

use std::fmt;
use std::path::Path;

use tracing::debug;

use crate::error::Result;
use crate::star::{StarDocument, StarTable, Value};


/// floats closer than this are equal
pub const FLOAT_TOLERANCE: f64 = 1e-2;


#[derive(Debug, Clone, PartialEq)]
pub struct ValueDiff {
	/// 0-based
	pub row: usize,
	pub label: String,
	pub a: Value,
	pub b: Value
}


#[derive(Debug, Clone, PartialEq, Default)]
pub struct CompareReport {
	pub table: String,
	pub rows_a: usize,
	pub rows_b: usize,
	/// labels of B that A doesn't have
	pub missing_in_a: Vec<String>,
	/// labels of A that B doesn't have
	pub missing_in_b: Vec<String>,
	pub values: Vec<ValueDiff>
}

impl CompareReport {

	pub fn size_differs(&self) -> bool {
		self.rows_a != self.rows_b
	}

	pub fn labels_differ(&self) -> bool {
		!self.missing_in_a.is_empty() || !self.missing_in_b.is_empty()
	}

	pub fn is_equal(&self) -> bool {
		!self.size_differs() && !self.labels_differ() && self.values.is_empty()
	}
}

impl fmt::Display for CompareReport {

	fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {

		if self.is_equal() {
			return writeln!(f, "FILES EQUAL");
		}

		if self.size_differs() {
			writeln!(f, "DIFF SIZE: {} != {}", self.rows_a, self.rows_b)?;
		}

		if self.labels_differ() {
			writeln!(f, "DIFF LABELS")?;
			if !self.missing_in_a.is_empty() {
				writeln!(f, "\tmissing in A: {}", self.missing_in_a.join(" "))?;
			}
			if !self.missing_in_b.is_empty() {
				writeln!(f, "\tmissing in B: {}", self.missing_in_b.join(" "))?;
			}
		}

		if !self.values.is_empty() {
			writeln!(f, "DIFF VALUES")?;
			for diff in &self.values {
				writeln!(f, "\trow {}, {}: {} != {}", diff.row, diff.label, diff.a, diff.b)?;
			}
		}

		Ok(())
	}
}


/// Compares the named table of two files, ignoring the excluded labels.
/// Fails only when a file or the table can't be read.
pub fn compare(path_a: impl AsRef<Path>, path_b: impl AsRef<Path>, table: &str, excluded: &[String]) -> Result<CompareReport> {

	let doc_a = StarDocument::read(path_a)?;
	let doc_b = StarDocument::read(path_b)?;
	let table_a = doc_a.table(table)?;
	let table_b = doc_b.table(table)?;

	let report = compare_tables(table_a, table_b, excluded);
	debug!("Compared table data_{}: {} value differences", table, report.values.len());
	Ok(report)
}


pub fn compare_tables(a: &StarTable, b: &StarTable, excluded: &[String]) -> CompareReport {

	let is_excluded = |label: &str| excluded.iter().any(|e| e == label);

	let missing_in_b = a.columns().iter()
		.filter(|label| !is_excluded(label.as_str()) && !b.has_column(label.as_str()))
		.cloned()
		.collect::<Vec<_>>();
	let missing_in_a = b.columns().iter()
		.filter(|label| !is_excluded(label.as_str()) && !a.has_column(label.as_str()))
		.cloned()
		.collect::<Vec<_>>();

	// only the labels both sides have
	let shared = a.columns().iter()
		.filter(|label| !is_excluded(label.as_str()) && b.has_column(label.as_str()))
		.collect::<Vec<_>>();

	let mut values = Vec::new();
	for (row_a, row_b) in a.rows().zip(b.rows()) {
		for &label in &shared {
			let (Ok(va), Ok(vb)) = (row_a.get(label), row_b.get(label))
				else { continue; };
			if !values_equal(va, vb) {
				values.push(ValueDiff {
					row: row_a.index(),
					label: label.clone(),
					a: va.clone(),
					b: vb.clone()
				});
			}
		}
	}

	CompareReport {
		table: a.name().to_string(),
		rows_a: a.len(),
		rows_b: b.len(),
		missing_in_a,
		missing_in_b,
		values
	}
}


/// ints and strings exactly, anything with a float within the tolerance
pub fn values_equal(a: &Value, b: &Value) -> bool {
	match (a, b) {
		(Value::Int(a), Value::Int(b)) => a == b,
		(Value::Str(a), Value::Str(b)) => a == b,
		(a, b) => match (a.as_f64(), b.as_f64()) {
			(Some(a), Some(b)) => (a - b).abs() <= FLOAT_TOLERANCE || a == b,
			_ => false
		}
	}
}
