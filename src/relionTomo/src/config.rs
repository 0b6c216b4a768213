
use std::env;
use std::fs;
use std::path::{Path, PathBuf};
use std::process::Command;

use anyhow::{bail, Context};
use semver::Version;
use toml::Table;
use tracing::{debug, info};

use crate::geometry::GeometryConvention;
use crate::metadata::Dimensionality;
use crate::schema::SchemaVersion;


pub const CONFIG_FILENAME: &str = "relion_tomo.toml";
pub const ENV_HOME: &str = "RELIONTOMO_HOME";

/// the program whose version decides the schema
const VERSION_PROGRAM: &str = "relion_refine";


/// Where the RELION binaries are, and how to run them
#[derive(Debug, Clone, PartialEq)]
pub struct RelionConfig {
	/// directory of the RELION binaries, or None to search the PATH
	pub home: Option<PathBuf>,
	pub threads: u32,
	pub mpi: u32,
	/// GPU ids, in RELION's `0:1:2` syntax
	pub gpus: Option<String>,
	pub mpirun: String,
	/// skips version detection
	pub schema: Option<SchemaVersion>
}

impl Default for RelionConfig {

	fn default() -> Self {
		Self {
			home: None,
			threads: 1,
			mpi: 1,
			gpus: None,
			mpirun: "mpirun".to_string(),
			schema: None
		}
	}
}

impl RelionConfig {

	/// reads the config file in the CWD if there is one, then applies the environment
	pub fn load() -> Result<Self,anyhow::Error> {
		let path = Path::new(".").join(CONFIG_FILENAME);
		let config = if path.exists() {
			Self::read(&path)?
		} else {
			Self::default()
		};
		Ok(config.with_env())
	}

	pub fn read(path: impl AsRef<Path>) -> Result<Self,anyhow::Error> {
		let path = path.as_ref();
		let toml = fs::read_to_string(path)
			.with_context(|| format!("Failed to read config file at: {}", path.to_string_lossy()))?;
		Self::parse(&toml)
			.with_context(|| format!("Failed to parse config file at: {}", path.to_string_lossy()))
	}

	pub fn parse(toml: &str) -> Result<Self,anyhow::Error> {

		let toml = toml.parse::<Table>()
			.context("Invalid TOML")?;
		let mut config = Self::default();

		let Some(relion) = toml.get("relion")
			else { return Ok(config); };
		let relion = relion.as_table()
			.context("relion key is not a table")?;

		if let Some(home) = relion.get("home") {
			let home = home.as_str()
				.context("relion.home was not a string")?;
			config.home = Some(PathBuf::from(home));
		}

		if let Some(threads) = relion.get("threads") {
			let threads = threads.as_integer()
				.context("relion.threads was not an integer")?;
			config.threads = u32::try_from(threads)
				.ok()
				.filter(|&t| t >= 1)
				.with_context(|| format!("relion.threads must be at least 1, not {}", threads))?;
		}

		if let Some(mpi) = relion.get("mpi") {
			let mpi = mpi.as_integer()
				.context("relion.mpi was not an integer")?;
			config.mpi = u32::try_from(mpi)
				.ok()
				.filter(|&m| m >= 1)
				.with_context(|| format!("relion.mpi must be at least 1, not {}", mpi))?;
		}

		if let Some(gpus) = relion.get("gpus") {
			let gpus = gpus.as_str()
				.context("relion.gpus was not a string")?;
			config.gpus = Some(gpus.to_string())
				.filter(|g| !g.trim().is_empty());
		}

		if let Some(mpirun) = relion.get("mpirun") {
			config.mpirun = mpirun.as_str()
				.context("relion.mpirun was not a string")?
				.to_string();
		}

		if let Some(schema) = relion.get("schema") {
			let schema = schema.as_str()
				.context("relion.schema was not a string")?;
			config.schema = Some(schema.parse::<SchemaVersion>()?);
		}

		Ok(config)
	}

	/// RELIONTOMO_HOME wins over the config file
	pub fn with_env(mut self) -> Self {
		if let Some(home) = env::var_os(ENV_HOME) {
			if !home.is_empty() {
				self.home = Some(PathBuf::from(home));
			}
		}
		self
	}

	/// the path to run a RELION program by
	pub fn program(&self, name: &str) -> PathBuf {
		match &self.home {
			Some(home) => home.join(name),
			None => PathBuf::from(name)
		}
	}

	/// the schema to read and write, from the config or by asking the binaries
	#[tracing::instrument(skip_all, level = 5, name = "DetectSchema")]
	pub fn schema(&self) -> Result<SchemaVersion,anyhow::Error> {

		if let Some(schema) = self.schema {
			return Ok(schema);
		}

		let program = self.program(VERSION_PROGRAM);
		let output = Command::new(&program)
			.arg("--version")
			.output()
			.with_context(|| format!("Failed to run {}", program.to_string_lossy()))?;
		let text = format!("{}{}", String::from_utf8_lossy(&output.stdout), String::from_utf8_lossy(&output.stderr));
		debug!("{} --version:\n{}", program.to_string_lossy(), text);

		let Some(version) = parse_version(&text)
			else { bail!("No version number in the output of {} --version:\n{}", program.to_string_lossy(), text); };
		let schema = SchemaVersion::for_binary(&version)?;
		info!("Found RELION {}, using schema {}", version, schema);
		Ok(schema)
	}
}


/// the first `major.minor(.patch)` number in a program's version banner
pub fn parse_version(text: &str) -> Option<Version> {
	text.split(|c: char| !(c.is_ascii_digit() || c == '.'))
		.map(|token| token.trim_matches('.'))
		.filter(|token| token.contains('.'))
		.find_map(|token| {
			let mut parts = token.split('.')
				.map(|part| part.parse::<u64>());
			let major = parts.next()?.ok()?;
			let minor = parts.next()?.ok()?;
			let patch = match parts.next() {
				Some(patch) => patch.ok()?,
				None => 0
			};
			Some(Version::new(major, minor, patch))
		})
}


#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum RandomSubsetMode {
	/// always 1,2,1,2,... by row, even over existing half-sets
	Alternate,
	/// keep the subset a record already has, alternating only where it has none
	#[default]
	Preserve
}


/// How records become STAR rows for one step
#[derive(Debug, Clone, PartialEq)]
pub struct ConvertOptions {
	pub binning: f64,
	pub box_size: u32,
	pub cropped_box_size: u32,
	pub random_subset_mode: RandomSubsetMode,
	pub dimensionality: Dimensionality,
	pub convention: GeometryConvention,
	/// swap Y and Z of coordinates
	pub flip_yz: bool,
	/// mirror Z of coordinates, after any swap
	pub flip_z: bool,
	/// fail when a referenced image file is missing
	pub check_files: bool
}

impl Default for ConvertOptions {

	fn default() -> Self {
		Self {
			binning: 1.0,
			box_size: 128,
			cropped_box_size: 128,
			random_subset_mode: RandomSubsetMode::default(),
			dimensionality: Dimensionality::Stack2D,
			convention: GeometryConvention::Internal,
			flip_yz: false,
			flip_z: false,
			check_files: false
		}
	}
}

impl ConvertOptions {

	pub const MIN_BOX_SIZE: u32 = 16;

	pub fn validate(&self) -> Result<(),anyhow::Error> {
		if !(self.binning.is_finite() && self.binning > 0.0) {
			bail!("binning must be positive, not {}", self.binning);
		}
		if self.box_size < Self::MIN_BOX_SIZE {
			bail!("box size must be at least {}, not {}", Self::MIN_BOX_SIZE, self.box_size);
		}
		if self.cropped_box_size < Self::MIN_BOX_SIZE || self.cropped_box_size > self.box_size {
			bail!("cropped box size must be between {} and the box size {}, not {}", Self::MIN_BOX_SIZE, self.box_size, self.cropped_box_size);
		}
		Ok(())
	}
}
