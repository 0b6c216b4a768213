
mod util;


use std::fs;
use std::path::PathBuf;

use galvanic_assert::{assert_that, matchers::*};

use relion_tomo::config::{ConvertOptions, RelionConfig};
use relion_tomo::dispatch::{run_step, ExternalCommand, StepContext, StepRun, StepState};
use relion_tomo::error::Error;
use relion_tomo::logging;
use relion_tomo::metadata::{Coordinate3D, Dimensionality};
use relion_tomo::mrc::{Mrc, MrcHeader};
use relion_tomo::readers::read_optimisation_set;
use relion_tomo::schema::SchemaVersion;
use relion_tomo::steps::refine::{check_sampling, promote_last_iteration};
use relion_tomo::steps::{outputs, ExtractParams, ExtractSubtomos, ImportParams, ImportParticles, ReconstructParams, ReconstructParticle, Refine, RefineParams};
use relion_tomo::writers::write_particles;

use crate::util::fake_relion::FakeRelion;
use crate::util::fixtures;
use crate::util::work_dir::WorkDir;


fn coordinates() -> Vec<Coordinate3D> {
	let mut coordinates = fixtures::coordinates("TS_01", 4);
	coordinates.extend(fixtures::coordinates("TS_02", 2));
	coordinates
}


fn import_params() -> ImportParams {
	ImportParams {
		coordinates: coordinates(),
		inputs: fixtures::tomo_inputs(&["TS_01", "TS_02"]),
		options: ConvertOptions::default()
	}
}


/// a single volume whose header claims to be a stack of images
fn stack_labelled_map(dir: &WorkDir, voxel_size: f64) -> PathBuf {
	let path = dir.path().join("map.mrc");
	Mrc::new(8, 8, 8, voxel_size)
		.as_image_stack()
		.save(&path)
		.unwrap();
	path
}


#[test]
fn state_machine() {

	assert_that!(&StepState::Pending.next(), eq(Some(StepState::Preparing)));
	assert_that!(&StepState::Parsing.next(), eq(Some(StepState::Done)));
	assert_that!(&StepState::Done.next(), eq(None));
	assert_that!(&StepState::Running.can_become(StepState::Failed), eq(true));
	assert_that!(&StepState::Done.can_become(StepState::Failed), eq(false));
	assert_that!(&StepState::Pending.can_become(StepState::Running), eq(false));

	let mut run = StepRun::new();
	assert_that!(&run.advance(StepState::Preparing).is_ok(), eq(true));
	assert_that!(&run.advance(StepState::Parsing).is_ok(), eq(false));
	assert_that!(&run.state(), eq(StepState::Preparing));
	assert_that!(&run.advance(StepState::Failed).is_ok(), eq(true));
	assert_that!(&run.advance(StepState::Failed).is_ok(), eq(false));
}


#[test]
fn command_lines() {

	let config = RelionConfig {
		home: Some(PathBuf::from("/opt/relion/bin")),
		threads: 4,
		mpi: 3,
		gpus: Some("0:1".to_string()),
		.. RelionConfig::default()
	};

	let cmd = ExternalCommand::new("relion_refine")
		.arg("--i")
		.arg("my particles.star")
		.parallel(&config);
	assert_that!(&cmd.argv(&config), eq(vec![
		"mpirun", "-np", "3", "/opt/relion/bin/relion_refine_mpi",
		"--i", "my particles.star",
		"--j", "4",
		"--gpu", "0:1"
	].into_iter().map(String::from).collect::<Vec<_>>()));
	let line = cmd.command_line(&config);
	assert_that!(&line.as_str(), eq(
		"mpirun -np 3 /opt/relion/bin/relion_refine_mpi --i \"my particles.star\" --j 4 --gpu 0:1"
	));

	// one worker runs the plain build, and an empty GPU list lets RELION pick
	let cmd = ExternalCommand::new("relion_tomo_subtomo")
		.gpus("");
	let line = cmd.command_line(&RelionConfig::default());
	assert_that!(&line.as_str(), eq("relion_tomo_subtomo --gpu \"\""));
}


#[test]
fn run_program() {
	let _logging = logging::init_test();

	let relion = FakeRelion::new();
	relion.program("relion_hello", r#"echo "hello $1"; echo "progress" >&2"#);
	let dir = WorkDir::new();

	ExternalCommand::new("relion_hello")
		.arg("world")
		.run(dir.path(), &relion.config(SchemaVersion::V4))
		.unwrap();

	dir.file("run.out").assert_eq("hello world\n");
	dir.file("run.err").assert_eq("progress\n");
}


#[test]
fn program_fails() {
	let _logging = logging::init_test();

	let relion = FakeRelion::new();
	relion.program("relion_grumpy", r#"for i in $(seq 1 30); do echo "complaint $i" >&2; done; exit 3"#);
	let dir = WorkDir::new();

	let result = ExternalCommand::new("relion_grumpy")
		.run(dir.path(), &relion.config(SchemaVersion::V4));
	let Err(Error::ExternalProgramFailed { code, stderr, dir: err_dir, .. }) = result
		else { panic!("expected the program to fail") };
	assert_that!(&code, eq(Some(3)));
	assert_that!(&err_dir, eq(dir.path().to_path_buf()));

	// just the tail
	let lines = stderr.lines().collect::<Vec<_>>();
	assert_that!(&lines.len(), eq(20));
	assert_that!(&lines[0], eq("complaint 11"));
	assert_that!(&lines[19], eq("complaint 30"));

	// missing programs fail the same way
	let result = ExternalCommand::new("relion_missing")
		.run(dir.path(), &relion.config(SchemaVersion::V4));
	assert_that!(&matches!(result, Err(Error::ExternalProgramFailed { code: None, .. })), eq(true));
}


#[test]
fn detect_schema() {
	let _logging = logging::init_test();

	let relion = FakeRelion::new();
	relion.program("relion_refine", r#"echo "RELION version: 4.0.1-commit-a1b2c3""#);
	let config = RelionConfig {
		home: Some(relion.home().to_path_buf()),
		.. RelionConfig::default()
	};
	assert_that!(&config.schema().unwrap(), eq(SchemaVersion::V4));

	// unless the config says
	let config = relion.config(SchemaVersion::V5);
	assert_that!(&config.schema().unwrap(), eq(SchemaVersion::V5));
}


#[test]
fn reuse_inputs() {
	let _logging = logging::init_test();

	let dir = WorkDir::new();
	let mut ctx = StepContext::new(dir.path().join("step"), RelionConfig::default(), SchemaVersion::V4)
		.unwrap();

	let path = ctx.write_input_text("in.star", "data_a\n").unwrap();
	let modified = fs::metadata(&path).unwrap().modified().unwrap();
	std::thread::sleep(std::time::Duration::from_millis(20));

	// same content, the file is left alone
	ctx.write_input_text("in.star", "data_a\n").unwrap();
	assert_that!(&fs::metadata(&path).unwrap().modified().unwrap(), eq(modified));

	ctx.write_input_text("in.star", "data_b\n").unwrap();
	let contents = fs::read_to_string(&path).unwrap();
	assert_that!(&contents.as_str(), eq("data_b\n"));

	// outputs must exist
	assert_that!(&ctx.register_output("thing", dir.path().join("nope.star")).is_ok(), eq(false));
	assert_that!(&ctx.register_output("thing", path.clone()).is_ok(), eq(true));
	assert_that!(&ctx.outputs().len(), eq(1));
}


#[test]
fn import_particles() {
	let _logging = logging::init_test();

	let relion = FakeRelion::new();
	// --i <coords> --t <tomograms> --o <dir>/
	relion.program("relion_tomo_import_particles", r#"cp "$2" "$6particles.star"; cp "$4" "$6tomograms.star""#);
	let dir = WorkDir::new();
	let step_dir = dir.path().join("import");

	let step = ImportParticles::new(import_params());
	let ctx = StepContext::new(&step_dir, relion.config(SchemaVersion::V5), SchemaVersion::V5)
		.unwrap();
	let result = run_step(&step, ctx);
	dir.print();

	assert_that!(&result.errors, eq(Vec::<String>::new()));
	assert_that!(&result.status, eq(StepState::Done));
	{
		let expected = step_dir.join("particles.star");
		assert_that!(&result.output(outputs::PARTICLES), eq(Some(&expected)));
	}
	{
		let expected = step_dir.join("tomograms.star");
		assert_that!(&result.output(outputs::TOMOGRAMS), eq(Some(&expected)));
	}

	// v5 inputs come with their tilt-series files
	assert_that!(&step_dir.join("tilt_series/TS_02.star").exists(), eq(true));
	assert_that!(&step_dir.join("run.out").exists(), eq(true));

	let set = read_optimisation_set(result.output(outputs::OPTIMISATION_SET).unwrap())
		.unwrap();
	assert_that!(&set.particles, eq(step_dir.join("particles.star")));

	let json = result.to_json();
	assert_that!(&json["status"].as_str(), eq(Some("done")));
	assert_that!(&json["outputsRegistered"].as_array().map(|a| a.len()), eq(Some(3)));
	assert_that!(&json["outputsRegistered"][0]["name"].as_str(), eq(Some("tomograms")));
	assert_that!(&json["errors"].as_array().map(|a| a.len()), eq(Some(0)));
}


#[test]
fn import_particles_fails() {
	let _logging = logging::init_test();

	let relion = FakeRelion::new();
	relion.program("relion_tomo_import_particles", r#"echo "no tomograms, no particles" >&2; exit 1"#);
	let dir = WorkDir::new();

	let ctx = StepContext::new(dir.path(), relion.config(SchemaVersion::V4), SchemaVersion::V4)
		.unwrap();
	let result = run_step(&ImportParticles::new(import_params()), ctx);

	assert_that!(&result.status, eq(StepState::Failed));
	assert_that!(&result.errors.len(), eq(1));
	assert_that!(&result.errors[0].contains("no tomograms, no particles"), eq(true));
	assert_that!(&result.errors[0].contains("exit code 1"), eq(true));
	assert_that!(&result.outputs.is_empty(), eq(true));
	let json = result.to_json();
	assert_that!(&json["status"].as_str(), eq(Some("failed")));
}


#[test]
fn import_needs_v4() {
	let _logging = logging::init_test();

	let relion = FakeRelion::new();
	relion.program("relion_tomo_import_particles", "exit 0");
	let dir = WorkDir::new();

	let ctx = StepContext::new(dir.path(), relion.config(SchemaVersion::V3), SchemaVersion::V3)
		.unwrap();
	let result = run_step(&ImportParticles::new(import_params()), ctx);

	assert_that!(&result.status, eq(StepState::Failed));
	assert_that!(&result.errors[0].contains("RELION 4 or later"), eq(true));
	// never got as far as running anything
	assert_that!(&dir.file("run.out").exists(), eq(false));
}


#[test]
fn extract_subtomos() {
	let _logging = logging::init_test();

	// what the extractor will "write"
	let src = WorkDir::new();
	let tomograms = fixtures::tomograms(&["TS_01", "TS_02"]);
	let particles = fixtures::particles(&["TS_01", "TS_02"], 2, Dimensionality::Volume3D);
	let extracted = src.path().join("particles.star");
	write_particles(&extracted, &particles, &tomograms, SchemaVersion::V4, &ConvertOptions::default())
		.unwrap();

	let relion = FakeRelion::new();
	// --p <particles> --t <tomograms> --o <dir>/ ...
	relion.program("relion_tomo_subtomo", format!(r#"cp "{}" "$6particles.star""#, extracted.to_string_lossy()));
	let dir = WorkDir::new();

	let params = ExtractParams {
		options: ConvertOptions {
			dimensionality: Dimensionality::Volume3D,
			binning: 2.0,
			box_size: 64,
			cropped_box_size: 48,
			.. ConvertOptions::default()
		},
		coordinates: coordinates(),
		inputs: fixtures::tomo_inputs(&["TS_01", "TS_02"])
	};
	let ctx = StepContext::new(dir.path(), relion.config(SchemaVersion::V4), SchemaVersion::V4)
		.unwrap();
	let result = run_step(&ExtractSubtomos::new(params), ctx);

	assert_that!(&result.status, eq(StepState::Done));
	{
		let expected = dir.path().join("particles.star");
		assert_that!(&result.output(outputs::PARTICLES), eq(Some(&expected)));
	}
	{
		let expected = dir.path().join("in_tomograms.star");
		assert_that!(&result.output(outputs::TOMOGRAMS), eq(Some(&expected)));
	}
	assert_that!(&dir.file("in_particles.star").exists(), eq(true));
}


#[test]
fn extract_stacks_need_v5() {
	let _logging = logging::init_test();

	let relion = FakeRelion::new();
	let dir = WorkDir::new();

	// stacks are the default
	let params = ExtractParams {
		coordinates: coordinates(),
		inputs: fixtures::tomo_inputs(&["TS_01", "TS_02"]),
		.. ExtractParams::default()
	};
	let ctx = StepContext::new(dir.path(), relion.config(SchemaVersion::V4), SchemaVersion::V4)
		.unwrap();
	let result = run_step(&ExtractSubtomos::new(params), ctx);

	assert_that!(&result.status, eq(StepState::Failed));
	assert_that!(&result.errors[0].contains("RELION 5"), eq(true));
}


#[test]
fn reconstruct_particle() {
	let _logging = logging::init_test();

	let maps = WorkDir::new();
	let map = stack_labelled_map(&maps, 2.7);

	let relion = FakeRelion::new();
	relion.program("relion_tomo_reconstruct_particle", format!(
		r#"for f in merged half1 half2; do cp "{}" "$6$f.mrc"; done"#,
		map.to_string_lossy()
	));
	let dir = WorkDir::new();

	let params = ReconstructParams {
		particles: fixtures::particles(&["TS_01", "TS_02"], 3, Dimensionality::Volume3D),
		inputs: fixtures::tomo_inputs(&["TS_01", "TS_02"]),
		.. ReconstructParams::default()
	};
	let ctx = StepContext::new(dir.path(), relion.config(SchemaVersion::V4), SchemaVersion::V4)
		.unwrap();
	let result = run_step(&ReconstructParticle::new(params), ctx);

	assert_that!(&result.status, eq(StepState::Done));
	for name in [outputs::MAP, outputs::HALF1, outputs::HALF2] {
		let path = result.output(name).unwrap();
		assert_that!(&MrcHeader::read(path).unwrap().is_image_stack(), eq(false));
	}
	let set = read_optimisation_set(result.output(outputs::OPTIMISATION_SET).unwrap())
		.unwrap();
	assert_that!(&set.reference_map2, eq(Some(dir.path().join("half2.mrc"))));
}


#[test]
fn reconstruct_without_maps() {
	let _logging = logging::init_test();

	let relion = FakeRelion::new();
	relion.program("relion_tomo_reconstruct_particle", "exit 0");
	let dir = WorkDir::new();

	let params = ReconstructParams {
		particles: fixtures::particles(&["TS_01"], 1, Dimensionality::Volume3D),
		inputs: fixtures::tomo_inputs(&["TS_01"]),
		.. ReconstructParams::default()
	};
	let ctx = StepContext::new(dir.path(), relion.config(SchemaVersion::V4), SchemaVersion::V4)
		.unwrap();
	let result = run_step(&ReconstructParticle::new(params), ctx);

	assert_that!(&result.status, eq(StepState::Failed));
	assert_that!(&result.errors[0].contains("merged.mrc"), eq(true));
}


#[test]
fn refine_sampling() {
	let maps = WorkDir::new();
	let particles = fixtures::particles(&["TS_01"], 1, Dimensionality::Volume3D);

	// particles at 2.7 Å/px
	assert_that!(&check_sampling(&particles, &stack_labelled_map(&maps, 2.705)).is_ok(), eq(true));
	assert_that!(&check_sampling(&particles, &stack_labelled_map(&maps, 5.4)).is_ok(), eq(false));
	assert_that!(&check_sampling(&particles, &maps.path().join("nope.mrc")).is_ok(), eq(false));
}


#[test]
fn promote_iterations() {
	let dir = WorkDir::new();
	for name in ["run_it001_data.star", "run_it002_data.star", "run_it002_class001.mrc", "run_it010_data.star", "run_it010_class001.mrc", "run_class001.mrc", "run_model.star"] {
		dir.file(name).write(name);
	}

	let renamed = promote_last_iteration(dir.path(), "run").unwrap();
	// the final map was already there
	assert_that!(&renamed, eq(vec![dir.path().join("run_data.star")]));
	dir.file("run_data.star").assert_eq("run_it010_data.star");
	dir.file("run_class001.mrc").assert_eq("run_class001.mrc");

	// nothing to do
	let empty = WorkDir::new();
	assert_that!(&promote_last_iteration(empty.path(), "run").unwrap().is_empty(), eq(true));
}


#[test]
fn refine() {
	let _logging = logging::init_test();

	let maps = WorkDir::new();
	let reference = stack_labelled_map(&maps, 2.7);

	let relion = FakeRelion::new();
	// --ios <set> --o <dir>/run --ref <map> ... ; stops before writing the final names
	relion.program("relion_refine", indoc::indoc! { r#"
		case "$1" in --ios) ;; *) echo "expected an optimisation set" >&2; exit 1;; esac
		cp in_particles.star "$4_it002_data.star"
		cp in_particles.star "$4_it003_data.star"
		for f in class001 half1_class001_unfil half2_class001_unfil; do cp "$6" "$4_it003_$f.mrc"; done
	"# });
	let dir = WorkDir::new();

	let params = RefineParams::new(
		fixtures::particles(&["TS_01", "TS_02"], 2, Dimensionality::Volume3D),
		fixtures::tomo_inputs(&["TS_01", "TS_02"]),
		&reference
	);
	let ctx = StepContext::new(dir.path(), relion.config(SchemaVersion::V4), SchemaVersion::V4)
		.unwrap();
	let result = run_step(&Refine::new(params), ctx);
	dir.print();

	assert_that!(&result.errors, eq(Vec::<String>::new()));
	assert_that!(&result.status, eq(StepState::Done));
	{
		let expected = dir.path().join("run_data.star");
		assert_that!(&result.output(outputs::PARTICLES), eq(Some(&expected)));
	}
	let map = result.output(outputs::MAP).unwrap();
	assert_that!(map, eq(dir.path().join("run_class001.mrc")));
	assert_that!(&MrcHeader::read(map).unwrap().is_image_stack(), eq(false));
	assert_that!(&dir.file("in_optimisation_set.star").exists(), eq(true));
	assert_that!(&dir.file("run_it002_data.star").exists(), eq(true));
}


#[test]
fn refine_wrong_sampling() {
	let _logging = logging::init_test();

	let maps = WorkDir::new();
	let reference = stack_labelled_map(&maps, 5.4);

	let relion = FakeRelion::new();
	relion.program("relion_refine", "exit 0");
	let dir = WorkDir::new();

	let params = RefineParams::new(
		fixtures::particles(&["TS_01"], 2, Dimensionality::Volume3D),
		fixtures::tomo_inputs(&["TS_01"]),
		&reference
	);
	let ctx = StepContext::new(dir.path(), relion.config(SchemaVersion::V4), SchemaVersion::V4)
		.unwrap();
	let result = run_step(&Refine::new(params), ctx);

	assert_that!(&result.status, eq(StepState::Failed));
	assert_that!(&result.errors[0].contains("precondition"), eq(true));
	assert_that!(&dir.file("in_particles.star").exists(), eq(false));
}
