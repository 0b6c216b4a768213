
use std::fs;
use std::path::{Path, PathBuf};

use anyhow::Context;
use tracing::{debug, info};

use crate::config::RelionConfig;
use crate::error::Warning;
use crate::schema::SchemaVersion;
use crate::star::{write_atomic, StarDocument};


/// A file a step produced, under the name downstream steps know it by
#[derive(Debug, Clone, PartialEq)]
pub struct RegisteredOutput {
	pub name: String,
	pub path: PathBuf
}


/// The working state of one step execution. The directory belongs to this execution alone.
#[derive(Debug)]
pub struct StepContext {
	dir: PathBuf,
	config: RelionConfig,
	schema: SchemaVersion,
	warnings: Vec<Warning>,
	outputs: Vec<RegisteredOutput>
}

impl StepContext {

	/// creates the step directory if needed
	pub fn new(dir: impl Into<PathBuf>, config: RelionConfig, schema: SchemaVersion) -> anyhow::Result<Self> {
		let dir = dir.into();
		fs::create_dir_all(&dir)
			.with_context(|| format!("Failed to create step directory: {}", dir.to_string_lossy()))?;
		Ok(Self {
			dir,
			config,
			schema,
			warnings: Vec::new(),
			outputs: Vec::new()
		})
	}

	pub fn dir(&self) -> &Path {
		&self.dir
	}

	pub fn path(&self, name: impl AsRef<Path>) -> PathBuf {
		self.dir.join(name)
	}

	pub fn config(&self) -> &RelionConfig {
		&self.config
	}

	pub fn schema(&self) -> SchemaVersion {
		self.schema
	}

	pub fn warnings(&self) -> &[Warning] {
		&self.warnings
	}

	pub fn warn(&mut self, warnings: impl IntoIterator<Item=Warning>) {
		self.warnings.extend(warnings);
	}

	/// Writes an input file into the step directory, unless the same content is already there.
	/// Returns the path of the file.
	pub fn write_input(&mut self, name: impl AsRef<Path>, doc: &StarDocument) -> anyhow::Result<PathBuf> {
		self.write_input_text(name, &doc.render())
	}

	pub fn write_input_text(&mut self, name: impl AsRef<Path>, text: &str) -> anyhow::Result<PathBuf> {

		let path = self.path(name);

		if let Ok(existing) = fs::read(&path) {
			if blake3::hash(&existing) == blake3::hash(text.as_bytes()) {
				debug!("Reusing input file: {}", path.to_string_lossy());
				return Ok(path);
			}
		}

		if let Some(parent) = path.parent() {
			fs::create_dir_all(parent)
				.with_context(|| format!("Failed to create folder: {}", parent.to_string_lossy()))?;
		}
		write_atomic(&path, text)
			.with_context(|| format!("Failed to write input file: {}", path.to_string_lossy()))?;
		debug!("Wrote input file: {}", path.to_string_lossy());
		Ok(path)
	}

	/// Records an output of the step. Fails if the program didn't make the file.
	pub fn register_output(&mut self, name: impl Into<String>, path: impl Into<PathBuf>) -> anyhow::Result<()> {
		let name = name.into();
		let path = path.into();
		if !path.exists() {
			anyhow::bail!("Step output {} is missing: {}", name, path.to_string_lossy());
		}
		info!("Registered output {}: {}", name, path.to_string_lossy());
		self.outputs.retain(|o| o.name != name);
		self.outputs.push(RegisteredOutput {
			name,
			path
		});
		Ok(())
	}

	pub fn outputs(&self) -> &[RegisteredOutput] {
		&self.outputs
	}

	pub(crate) fn into_parts(self) -> (PathBuf, Vec<Warning>, Vec<RegisteredOutput>) {
		(self.dir, self.warnings, self.outputs)
	}
}
