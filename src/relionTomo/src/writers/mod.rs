
// Object model -> STAR documents, one writer per kind of file RELION reads.
// Every writer takes its column list from the schema registry and fills rows by label,
// so a writer never emits a column the schema doesn't have, nor leaves one out.

pub mod coordinates;
pub mod particles;
pub mod tilt_series;
pub mod tomograms;
pub mod optimisation;

use std::path::Path;

use crate::config::RandomSubsetMode;
use crate::error::Result;
use crate::metadata::FILE_NOT_FOUND;
use crate::schema::{SchemaVersion, TableKind};
use crate::star::{StarTable, Value};

pub use coordinates::{coordinates_document, write_coordinates};
pub use optimisation::{optimisation_set_document, write_optimisation_set};
pub use particles::{particles_document, write_particles};
pub use tilt_series::{tilt_series_table, write_tilt_series};
pub use tomograms::{tomograms_documents, write_tomograms, TomogramsDocuments};


/// an empty table with the registry's columns for the kind
pub(crate) fn table_for(schema: SchemaVersion, kind: TableKind, name: &str) -> Result<StarTable> {
	let columns = schema.registry().columns(kind)?;
	StarTable::new(name, columns.iter().copied())
}


/// the half-set of a row: 1,2,1,2... unless the record's own subset is kept
pub(crate) fn random_subset(row: usize, existing: Option<i64>, mode: RandomSubsetMode) -> i64 {
	match (mode, existing) {
		(RandomSubsetMode::Preserve, Some(subset @ (1 | 2))) => subset,
		_ => (row % 2) as i64 + 1
	}
}


/// a path cell, or RELION's marker for a file that doesn't exist
pub(crate) fn path_value(path: Option<&Path>) -> Value {
	match path {
		Some(path) => Value::from(path),
		None => Value::from(FILE_NOT_FOUND)
	}
}
