
mod util;


use std::path::Path;

use assert_cmd::assert::Assert;
use indoc::indoc;
use predicates::prelude::*;

use crate::util::cmd::{cmd, AssertExt};
use crate::util::work_dir::WorkDir;


const A: &str = indoc! { r#"
	data_particles

	loop_
	_rlnTomoName #1
	_rlnCoordinateX #2
	_rlnClassNumber #3
	TS_01  40.0    1
	TS_01  80.5    2
"# };


fn cmd_compare(dir: impl AsRef<Path>, args: &[&str]) -> Assert {
	cmd()
		.current_dir(dir)
		.arg("compare")
		.args(args)
		.assert()
		.print_stderr()
		.print_stdout()
}


#[test]
fn equal() {
	let dir = WorkDir::new();
	dir.file("a.star").write(A);
	// same values, different spacing and float formatting
	dir.file("b.star").write(indoc! { r#"
		data_particles
		loop_
		_rlnTomoName
		_rlnCoordinateX
		_rlnClassNumber
		TS_01 40.001 1
		TS_01 80.5 2
	"# });

	cmd_compare(&dir, &["a.star", "b.star"])
		.code(0)
		.stdout("FILES EQUAL\n");
}


#[test]
fn different_values() {
	let dir = WorkDir::new();
	dir.file("a.star").write(A);
	dir.file("b.star").write(indoc! { r#"
		data_particles
		loop_
		_rlnTomoName
		_rlnCoordinateX
		_rlnClassNumber
		TS_01 40.0 1
		TS_01 81.5 3
	"# });

	cmd_compare(&dir, &["a.star", "b.star"])
		.code(1)
		.stdout(predicate::str::starts_with("DIFF VALUES\n"))
		.stdout(predicate::str::contains("\trow 1, rlnCoordinateX: 80.5 != 81.5\n"))
		.stdout(predicate::str::contains("\trow 1, rlnClassNumber: 2 != 3\n"));

	// unless we don't care about them
	cmd_compare(&dir, &["a.star", "b.star", "--exclude", "rlnCoordinateX", "--exclude", "rlnClassNumber"])
		.code(0)
		.stdout("FILES EQUAL\n");
}


#[test]
fn different_structure() {
	let dir = WorkDir::new();
	dir.file("a.star").write(A);
	dir.file("b.star").write(indoc! { r#"
		data_particles
		loop_
		_rlnTomoName
		_rlnCoordinateX
		_rlnRandomSubset
		TS_01 40.0 1
	"# });

	cmd_compare(&dir, &["a.star", "b.star"])
		.code(1)
		.stdout(predicate::str::contains("DIFF SIZE: 2 != 1\n"))
		.stdout(predicate::str::contains("DIFF LABELS\n"))
		.stdout(predicate::str::contains("\tmissing in A: rlnRandomSubset\n"))
		.stdout(predicate::str::contains("\tmissing in B: rlnClassNumber\n"));
}


#[test]
fn other_tables() {
	let dir = WorkDir::new();
	let optics = indoc! { r#"

		data_optics

		_rlnOpticsGroup 1
		_rlnImagePixelSize 2.7
	"# };
	dir.file("a.star").write(format!("{}{}", A, optics));
	dir.file("b.star").write(format!("{}{}", A, optics.replace("2.7", "5.4")));

	cmd_compare(&dir, &["a.star", "b.star"])
		.code(0);
	cmd_compare(&dir, &["--table", "optics", "a.star", "b.star"])
		.code(1)
		.stdout(predicate::str::contains("\trow 0, rlnImagePixelSize: 2.7 != 5.4\n"));
}


#[test]
fn unreadable() {
	let dir = WorkDir::new();
	dir.file("a.star").write(A);
	dir.file("bad.star").write("data_particles\nloop_\n_rlnTomoName\n_rlnCoordinateX\nTS_01\n");

	// missing file
	cmd_compare(&dir, &["a.star", "b.star"])
		.code(2)
		.stdout("");

	// missing table
	cmd_compare(&dir, &["--table", "optics", "a.star", "a.star"])
		.code(2)
		.stderr(predicate::str::contains("data_optics"));

	// malformed
	cmd_compare(&dir, &["a.star", "bad.star"])
		.code(2)
		.stderr(predicate::str::contains("line 5"));
}
