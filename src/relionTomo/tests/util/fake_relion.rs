
use std::fs;
use std::os::unix::fs::PermissionsExt;
use std::path::{Path, PathBuf};

use assert_fs::TempDir;

use relion_tomo::config::RelionConfig;
use relion_tomo::schema::SchemaVersion;


/// A folder of shell scripts standing in for the RELION binaries
pub struct FakeRelion {
	dir: TempDir
}

impl FakeRelion {

	pub fn new() -> FakeRelion {
		Self {
			dir: TempDir::new()
				.expect("Failed to make temp folder")
		}
	}

	pub fn home(&self) -> &Path {
		self.dir.path()
	}

	/// writes an executable `sh` script under the program's name
	pub fn program(&self, name: &str, script: impl AsRef<str>) -> PathBuf {
		let path = self.dir.path().join(name);
		fs::write(&path, format!("#!/bin/sh\n{}\n", script.as_ref()))
			.expect(&format!("Failed to write program: {}", path.to_string_lossy()));
		fs::set_permissions(&path, fs::Permissions::from_mode(0o755))
			.expect(&format!("Failed to make program executable: {}", path.to_string_lossy()));
		path
	}

	pub fn config(&self, schema: SchemaVersion) -> RelionConfig {
		RelionConfig {
			home: Some(self.home().to_path_buf()),
			schema: Some(schema),
			.. RelionConfig::default()
		}
	}
}
