
use std::fs;
use std::path::{Path, PathBuf};

use assert_fs::TempDir;
use galvanic_assert::{assert_that, matchers::*};

use relion_tomo::star::StarDocument;


/// A scratch folder for STAR files, deleted when dropped
pub struct WorkDir {
	dir: TempDir
}

impl WorkDir {

	pub fn new() -> WorkDir {
		Self {
			dir: TempDir::new()
				.expect("Failed to make temp folder")
		}
	}

	pub fn path(&self) -> &Path {
		self.dir.path()
	}

	pub fn file(&self, path: impl AsRef<Path>) -> WorkFile {
		WorkFile {
			_dir: self,
			path: self.dir.path().join(path.as_ref())
		}
	}

	pub fn print(&self) {
		let path = self.dir.path();
		println!("Work Folder: {}", path.to_string_lossy());
		print_dir(path, 1);
	}
}

impl AsRef<Path> for WorkDir {
	fn as_ref(&self) -> &Path {
		self.dir.path()
	}
}


fn print_dir(path: &Path, depth: usize) {
	let dir = fs::read_dir(path)
		.expect(&format!("Failed to read dir: {}", path.to_string_lossy()));
	for entry in dir {
		match entry {
			Ok(entry) => {
				println!("{}{}", "\t".repeat(depth), entry.file_name().to_string_lossy());
				if entry.path().is_dir() {
					print_dir(&entry.path(), depth + 1);
				}
			}
			Err(e) => println!("{}Error: {}", "\t".repeat(depth), e)
		}
	}
}


pub struct WorkFile<'d> {
	_dir: &'d WorkDir,
	path: PathBuf
}

impl<'d> WorkFile<'d> {

	pub fn path(&self) -> &Path {
		&self.path
	}

	pub fn write(&self, txt: impl AsRef<str>) {
		if let Some(parent) = self.path.parent() {
			fs::create_dir_all(parent)
				.expect(&format!("Failed to create folder: {}", parent.to_string_lossy()));
		}
		fs::write(self.path(), txt.as_ref())
			.expect(&format!("Failed to write file: {}", self.path().to_string_lossy()));
	}

	pub fn exists(&self) -> bool {
		self.path.exists()
	}

	pub fn read(&self) -> String {
		fs::read_to_string(self.path())
			.expect(&format!("Failed to read file: {}", self.path().to_string_lossy()))
	}

	pub fn read_star(&self) -> StarDocument {
		StarDocument::read(self.path())
			.expect(&format!("Failed to read STAR file: {}", self.path().to_string_lossy()))
	}

	pub fn print(&self) {
		println!("{}:\n{}", self.path.to_string_lossy(), self.read());
	}

	pub fn assert_eq(&self, exp: impl AsRef<str>) {
		let obs = self.read();
		let exp = exp.as_ref();
		assert_that!(&obs.as_str(), eq(exp));
	}
}
