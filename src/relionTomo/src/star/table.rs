
use std::collections::HashMap;

use crate::error::{Error, Result};
use crate::schema::{kind_of, ValueKind};
use crate::star::value::{parse_vector, Value};


#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Layout {
	/// `loop_` with labels then rows
	Loop,
	/// a single row written as `_label value` pairs
	Block
}


/// A named STAR table: ordered columns, typed rows
#[derive(Debug, Clone)]
pub struct StarTable {
	name: String,
	layout: Layout,
	columns: Vec<String>,
	index: HashMap<String,usize>,
	rows: Vec<Vec<Value>>
}

impl StarTable {

	pub fn new(name: impl Into<String>, columns: impl IntoIterator<Item=impl Into<String>>) -> Result<Self> {
		let mut table = Self::empty(name, Layout::Loop);
		for label in columns {
			table.add_column(label)?;
		}
		Ok(table)
	}

	/// a single-row table written without `loop_`
	pub fn block(name: impl Into<String>, pairs: impl IntoIterator<Item=(impl Into<String>, Value)>) -> Result<Self> {
		let mut table = Self::empty(name, Layout::Block);
		let mut row = Vec::new();
		for (label, value) in pairs {
			let label = label.into();
			let kind = kind_of(&label);
			let value = coerce(&table.name, &label, value, kind)?;
			table.add_column(label)?;
			row.push(value);
		}
		table.rows.push(row);
		Ok(table)
	}

	pub(crate) fn empty(name: impl Into<String>, layout: Layout) -> Self {
		Self {
			name: name.into(),
			layout,
			columns: Vec::new(),
			index: HashMap::new(),
			rows: Vec::new()
		}
	}

	pub(crate) fn set_layout(&mut self, layout: Layout) {
		self.layout = layout;
	}

	pub fn name(&self) -> &str {
		&self.name
	}

	pub fn layout(&self) -> Layout {
		self.layout
	}

	pub fn columns(&self) -> &[String] {
		&self.columns
	}

	pub fn len(&self) -> usize {
		self.rows.len()
	}

	pub fn is_empty(&self) -> bool {
		self.rows.is_empty()
	}

	pub fn has_column(&self, label: &str) -> bool {
		self.index.contains_key(label)
	}

	pub fn column_index(&self, label: &str) -> Option<usize> {
		self.index.get(label).copied()
	}

	pub(crate) fn add_column(&mut self, label: impl Into<String>) -> Result<()> {
		let label = label.into();
		if self.index.contains_key(&label) {
			return Err(Error::SchemaMismatch(format!("duplicate column {} in table data_{}", label, self.name)));
		}
		self.index.insert(label.clone(), self.columns.len());
		self.columns.push(label);
		Ok(())
	}

	pub fn column(&self, label: &str) -> Result<Column<'_>> {
		let index = self.column_index(label)
			.ok_or_else(|| self.missing(label))?;
		Ok(Column {
			table: self,
			index
		})
	}

	pub fn row(&self, index: usize) -> Option<Row<'_>> {
		if index < self.rows.len() {
			Some(Row {
				table: self,
				index
			})
		} else {
			None
		}
	}

	pub fn rows(&self) -> impl Iterator<Item=Row<'_>> {
		(0 .. self.rows.len())
			.map(|index| Row {
				table: self,
				index
			})
	}

	/// appends a row given in column order, converting each value to its column's kind
	pub fn push_row(&mut self, values: Vec<Value>) -> Result<()> {
		if values.len() != self.columns.len() {
			return Err(Error::SchemaMismatch(format!(
				"row has {} values, but table data_{} has {} columns",
				values.len(), self.name, self.columns.len()
			)));
		}
		let row = values.into_iter()
			.zip(self.columns.iter())
			.map(|(value, label)| coerce(&self.name, label, value, kind_of(label)))
			.collect::<Result<Vec<_>>>()?;
		self.rows.push(row);
		Ok(())
	}

	/// Appends a row filled in by label.
	/// Labels the table doesn't have are ignored, so one writer can serve several schemas,
	/// but every column of the table must be set.
	pub fn push_with<F>(&mut self, f: F) -> Result<()>
		where
			F: FnOnce(&mut RowValues) -> Result<()>
	{
		let mut values = RowValues {
			table: &self.name,
			index: &self.index,
			values: vec![None; self.columns.len()]
		};
		f(&mut values)?;
		let values = values.values;

		let row = values.into_iter()
			.zip(self.columns.iter())
			.map(|(value, label)| value.ok_or_else(|| Error::SchemaMismatch(format!(
				"writer left required column {} of table data_{} empty", label, self.name
			))))
			.collect::<Result<Vec<_>>>()?;
		self.rows.push(row);
		Ok(())
	}

	pub fn get(&self, row: usize, label: &str) -> Result<&Value> {
		let col = self.column_index(label)
			.ok_or_else(|| self.missing(label))?;
		self.rows.get(row)
			.map(|r| &r[col])
			.ok_or_else(|| Error::SchemaMismatch(format!("table data_{} has no row {}", self.name, row)))
	}

	pub fn set(&mut self, row: usize, label: &str, value: impl Into<Value>) -> Result<()> {
		let col = self.column_index(label)
			.ok_or_else(|| self.missing(label))?;
		let value = coerce(&self.name, label, value.into(), kind_of(label))?;
		let r = self.rows.get_mut(row)
			.ok_or_else(|| Error::SchemaMismatch(format!("table data_{} has no row {}", self.name, row)))?;
		r[col] = value;
		Ok(())
	}

	pub fn remove_column(&mut self, label: &str) -> Result<()> {
		let col = self.column_index(label)
			.ok_or_else(|| self.missing(label))?;
		self.columns.remove(col);
		for row in &mut self.rows {
			row.remove(col);
		}
		self.index = self.columns.iter()
			.enumerate()
			.map(|(i, label)| (label.clone(), i))
			.collect();
		Ok(())
	}

	pub fn truncate(&mut self, len: usize) {
		self.rows.truncate(len);
	}

	fn missing(&self, label: &str) -> Error {
		Error::MissingColumn {
			table: self.name.clone(),
			label: label.to_string()
		}
	}
}

impl PartialEq for StarTable {

	fn eq(&self, other: &Self) -> bool {
		self.name == other.name
			&& self.layout == other.layout
			&& self.columns == other.columns
			&& self.rows == other.rows
	}
}


fn coerce(table: &str, label: &str, value: Value, kind: ValueKind) -> Result<Value> {
	let described = format!("{:?}", value);
	value.coerce(kind)
		.ok_or_else(|| Error::SchemaMismatch(format!(
			"value {} doesn't fit {:?} column {} of table data_{}", described, kind, label, table
		)))
}


/// The values of a row under construction, see [`StarTable::push_with`]
pub struct RowValues<'t> {
	table: &'t str,
	index: &'t HashMap<String,usize>,
	values: Vec<Option<Value>>
}

impl<'t> RowValues<'t> {

	pub fn set(&mut self, label: &str, value: impl Into<Value>) -> Result<()> {
		let Some(&col) = self.index.get(label)
			else { return Ok(()); };
		self.values[col] = Some(coerce(self.table, label, value.into(), kind_of(label))?);
		Ok(())
	}

	pub fn wants(&self, label: &str) -> bool {
		self.index.contains_key(label)
	}
}


/// One column of a table
#[derive(Clone, Copy)]
pub struct Column<'t> {
	table: &'t StarTable,
	index: usize
}

impl<'t> Column<'t> {

	pub fn label(&self) -> &'t str {
		&self.table.columns[self.index]
	}

	pub fn values(&self) -> impl Iterator<Item=&'t Value> + 't {
		let index = self.index;
		let table = self.table;
		table.rows.iter()
			.map(move |row| &row[index])
	}
}


/// One row of a table, with typed accessors by label
#[derive(Clone, Copy)]
pub struct Row<'t> {
	table: &'t StarTable,
	index: usize
}

impl<'t> Row<'t> {

	pub fn index(&self) -> usize {
		self.index
	}

	pub fn table(&self) -> &'t StarTable {
		self.table
	}

	pub fn get(&self, label: &str) -> Result<&'t Value> {
		let col = self.table.column_index(label)
			.ok_or_else(|| self.table.missing(label))?;
		Ok(&self.table.rows[self.index][col])
	}

	pub fn get_opt(&self, label: &str) -> Option<&'t Value> {
		self.table.column_index(label)
			.map(|col| &self.table.rows[self.index][col])
	}

	pub fn values(&self) -> &'t [Value] {
		&self.table.rows[self.index]
	}

	pub fn f64(&self, label: &str) -> Result<f64> {
		self.get(label)?
			.as_f64()
			.ok_or_else(|| self.wrong_kind(label, "a number"))
	}

	pub fn f64_opt(&self, label: &str) -> Result<Option<f64>> {
		match self.get_opt(label) {
			Some(v) => v.as_f64()
				.map(Some)
				.ok_or_else(|| self.wrong_kind(label, "a number")),
			None => Ok(None)
		}
	}

	/// the first of several alternative labels the table has
	pub fn f64_any(&self, labels: &[&str]) -> Result<Option<f64>> {
		for label in labels {
			if let Some(v) = self.f64_opt(label)? {
				return Ok(Some(v));
			}
		}
		Ok(None)
	}

	pub fn i64(&self, label: &str) -> Result<i64> {
		self.get(label)?
			.as_i64()
			.ok_or_else(|| self.wrong_kind(label, "an integer"))
	}

	pub fn i64_opt(&self, label: &str) -> Result<Option<i64>> {
		match self.get_opt(label) {
			Some(v) => v.as_i64()
				.map(Some)
				.ok_or_else(|| self.wrong_kind(label, "an integer")),
			None => Ok(None)
		}
	}

	pub fn str(&self, label: &str) -> Result<&'t str> {
		self.get(label)?
			.as_str()
			.ok_or_else(|| self.wrong_kind(label, "a string"))
	}

	pub fn str_opt(&self, label: &str) -> Option<&'t str> {
		self.get_opt(label)
			.and_then(Value::as_str)
	}

	pub fn str_any(&self, labels: &[&str]) -> Option<&'t str> {
		labels.iter()
			.find_map(|label| self.str_opt(label))
	}

	/// a vector-valued cell, eg a projection matrix row
	pub fn vector(&self, label: &str) -> Result<Vec<f64>> {
		let s = self.str(label)?;
		parse_vector(s)
			.ok_or_else(|| self.wrong_kind(label, "a vector"))
	}

	fn wrong_kind(&self, label: &str, expected: &str) -> Error {
		Error::SchemaMismatch(format!(
			"column {} of table data_{} is not {} in row {}", label, self.table.name, expected, self.index
		))
	}
}
