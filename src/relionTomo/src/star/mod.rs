
// STAR files: the column-oriented text metadata format of RELION
// https://relion.readthedocs.io/en/latest/Reference/Conventions.html

pub mod value;
pub mod table;
mod parse;
mod write;

use std::fs;
use std::io::ErrorKind;
use std::path::Path;

use tracing::debug;

use crate::error::{Error, Result};

pub use table::{Column, Layout, Row, RowValues, StarTable};
pub use value::{format_float, format_vector, parse_vector, Value};
pub use write::write_atomic;


/// The tables of one STAR file, in file order
#[derive(Debug, Clone, Default, PartialEq)]
pub struct StarDocument {
	tables: Vec<StarTable>
}

impl StarDocument {

	pub fn new() -> Self {
		Self::default()
	}

	pub fn read(path: impl AsRef<Path>) -> Result<Self> {
		let path = path.as_ref();
		let text = fs::read_to_string(path)
			.map_err(|e| match e.kind() {
				ErrorKind::NotFound => Error::FileNotFound(path.to_path_buf()),
				_ => Error::io(path, e)
			})?;
		let doc = parse::parse(&text, path)?;
		debug!("Read {} tables from {}", doc.tables.len(), path.to_string_lossy());
		Ok(doc)
	}

	/// parses STAR text, naming the given path in errors
	pub fn parse(text: &str, path: impl AsRef<Path>) -> Result<Self> {
		parse::parse(text, path.as_ref())
	}

	pub fn write(&self, path: impl AsRef<Path>) -> Result<()> {
		write::write_atomic(path.as_ref(), &self.render())
	}

	pub fn render(&self) -> String {
		write::render(self)
	}

	/// adds a table, replacing any table with the same name in place
	pub fn push(&mut self, table: StarTable) {
		match self.tables.iter_mut().find(|t| t.name() == table.name()) {
			Some(existing) => *existing = table,
			None => self.tables.push(table)
		}
	}

	pub fn tables(&self) -> &[StarTable] {
		&self.tables
	}

	pub fn has_table(&self, name: &str) -> bool {
		self.tables.iter().any(|t| t.name() == name)
	}

	pub fn table(&self, name: &str) -> Result<&StarTable> {
		self.tables.iter()
			.find(|t| t.name() == name)
			.ok_or_else(|| Error::MissingTable(name.to_string()))
	}

	pub fn table_mut(&mut self, name: &str) -> Result<&mut StarTable> {
		self.tables.iter_mut()
			.find(|t| t.name() == name)
			.ok_or_else(|| Error::MissingTable(name.to_string()))
	}

	/// the first table with the given column, for files whose table names vary between RELION versions
	pub fn table_with_column(&self, label: &str) -> Option<&StarTable> {
		self.tables.iter()
			.find(|t| t.has_column(label))
	}
}


pub fn read_document(path: impl AsRef<Path>) -> Result<StarDocument> {
	StarDocument::read(path)
}

pub fn write_document(doc: &StarDocument, path: impl AsRef<Path>) -> Result<()> {
	doc.write(path)
}

pub fn get_table<'d>(doc: &'d StarDocument, name: &str) -> Result<&'d StarTable> {
	doc.table(name)
}

pub fn get_column<'t>(table: &'t StarTable, label: &str) -> Result<Column<'t>> {
	table.column(label)
}

pub fn get_row(table: &StarTable, index: usize) -> Option<Row<'_>> {
	table.row(index)
}
