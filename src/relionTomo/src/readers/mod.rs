
// STAR documents -> object model.
// Readers take whichever generation of labels a file has, newest first,
// skip rows they can't interpret with a warning, and fail on structural problems.

pub mod coordinates;
pub mod particles;
pub mod tomograms;
pub mod optimisation;

use std::path::{Path, PathBuf};

use crate::error::{Result, Warning};
use crate::metadata::FILE_NOT_FOUND;
use crate::star::{StarDocument, StarTable};

pub use coordinates::{coordinates_from_document, read_coordinates};
pub use optimisation::read_optimisation_set;
pub use particles::{particles_from_document, read_particles};
pub use tomograms::{read_tomograms, tomograms_from_document};


/// What a reader produced, and what it had to skip
#[derive(Debug, Clone)]
pub struct ReadOutcome<T> {
	pub records: T,
	pub warnings: Vec<Warning>,
	/// tilt-series ids rows referred to that the tomogram set doesn't have
	pub skipped_tomograms: Vec<String>
}

impl<T> ReadOutcome<T> {

	pub fn new(records: T) -> Self {
		Self {
			records,
			warnings: Vec::new(),
			skipped_tomograms: Vec::new()
		}
	}

	/// records one warning per unknown tilt-series, however many rows mention it
	pub(crate) fn skip_tomogram(&mut self, row: usize, ts_id: &str) {
		if self.skipped_tomograms.iter().any(|id| id == ts_id) {
			return;
		}
		self.skipped_tomograms.push(ts_id.to_string());
		self.warnings.push(Warning::row(row, ts_id, "tomogram is not in the tomogram set, skipping its particles"));
	}
}


/// Relative paths in a STAR file are relative to the folder of the STAR file
pub fn resolve_path(star_path: &Path, value: &str) -> PathBuf {
	let path = Path::new(value);
	if path.is_absolute() {
		return path.to_path_buf();
	}
	match star_path.parent() {
		Some(dir) if !dir.as_os_str().is_empty() => dir.join(path),
		_ => path.to_path_buf()
	}
}

/// like [`resolve_path`], but RELION's missing-file marker becomes None
pub fn resolve_optional_path(star_path: &Path, value: Option<&str>) -> Option<PathBuf> {
	match value {
		None | Some("") | Some(FILE_NOT_FOUND) => None,
		Some(value) => Some(resolve_path(star_path, value))
	}
}


/// The table a reader wants: the conventional name first, then any table with the telltale column
pub(crate) fn find_table<'d>(doc: &'d StarDocument, name: &str, telltale: &str) -> Result<&'d StarTable> {
	match doc.table(name) {
		Ok(table) => Ok(table),
		Err(e) => doc.table_with_column(telltale)
			.ok_or(e)
	}
}
