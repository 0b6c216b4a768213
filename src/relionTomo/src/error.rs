
use std::io;
use std::path::{Path, PathBuf};


/// Everything that can go wrong while moving metadata between the object model and STAR files
#[derive(Debug, thiserror::Error)]
pub enum Error {

	#[error("malformed STAR file {}, line {line}: {reason}", path.to_string_lossy())]
	MalformedStar {
		path: PathBuf,
		line: usize,
		reason: String
	},

	#[error("missing table: data_{0}")]
	MissingTable(String),

	#[error("missing column _{label} in table data_{table}")]
	MissingColumn {
		table: String,
		label: String
	},

	#[error("schema mismatch: {0}")]
	SchemaMismatch(String),

	#[error("inconsistent geometry in row {row} of tomogram {tomo}: {reason}")]
	GeometryInconsistent {
		row: usize,
		tomo: String,
		reason: String
	},

	#[error("file not found: {}", .0.to_string_lossy())]
	FileNotFound(PathBuf),

	#[error("unknown tomogram: {0}")]
	UnknownTomogram(String),

	#[error("external program failed (exit code {}) in {}:\n\t{command}\n{stderr}", code.map(|c| c.to_string()).unwrap_or("none".to_string()), dir.to_string_lossy())]
	ExternalProgramFailed {
		command: String,
		code: Option<i32>,
		stderr: String,
		dir: PathBuf
	},

	#[error("step precondition failed: {0}")]
	StepPreconditionFailed(String),

	#[error("I/O error on {}", path.to_string_lossy())]
	Io {
		path: PathBuf,
		#[source]
		source: io::Error
	}
}

impl Error {

	pub fn malformed(path: impl AsRef<Path>, line: usize, reason: impl Into<String>) -> Self {
		Self::MalformedStar {
			path: path.as_ref().to_path_buf(),
			line,
			reason: reason.into()
		}
	}

	pub fn io(path: impl AsRef<Path>, source: io::Error) -> Self {
		Self::Io {
			path: path.as_ref().to_path_buf(),
			source
		}
	}

	/// true for errors describing the file structure rather than its environment
	pub fn is_structural(&self) -> bool {
		matches!(self,
			Self::MalformedStar { .. }
			| Self::MissingTable(..)
			| Self::MissingColumn { .. }
			| Self::SchemaMismatch(..)
		)
	}
}


pub type Result<T> = std::result::Result<T,Error>;


/// A row-level problem that didn't stop the parse
#[derive(Debug, Clone, PartialEq)]
pub struct Warning {
	pub row: Option<usize>,
	pub tomo: Option<String>,
	pub message: String
}

impl Warning {

	pub fn row(row: usize, tomo: impl Into<String>, message: impl Into<String>) -> Self {
		Self {
			row: Some(row),
			tomo: Some(tomo.into()),
			message: message.into()
		}
	}

	pub fn general(message: impl Into<String>) -> Self {
		Self {
			row: None,
			tomo: None,
			message: message.into()
		}
	}
}

impl std::fmt::Display for Warning {

	fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
		match (&self.row, &self.tomo) {
			(Some(row), Some(tomo)) => write!(f, "row {}, tomogram {}: {}", row, tomo, self.message),
			(Some(row), None) => write!(f, "row {}: {}", row, self.message),
			(None, Some(tomo)) => write!(f, "tomogram {}: {}", tomo, self.message),
			(None, None) => write!(f, "{}", self.message)
		}
	}
}
