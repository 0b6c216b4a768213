
use std::fs;
use std::path::{Path, PathBuf};

use anyhow::Context;
use tracing::{debug, info};

use crate::config::ConvertOptions;
use crate::dispatch::{ExternalCommand, Step, StepContext};
use crate::error::Error;
use crate::metadata::{OptimisationSet, ParticleSet};
use crate::mrc::{self, MrcHeader};
use crate::readers::read_particles;
use crate::schema::SchemaVersion;
use crate::star::format_float;
use crate::steps::{outputs, register_optimisation_set, write_particles_input, write_tomograms_input, TomoInputs, IN_OPTIMISATION_SET, IN_PARTICLES, IN_TOMOGRAMS};
use crate::writers::optimisation_set_document;


pub const ID: &str = "refine";

const PROGRAM: &str = "relion_refine";

/// RELION names everything it writes after this, inside the step folder
pub const OUTPUT_ROOT: &str = "run";

/// Å of disagreement between the particles and the reference that still counts as the same sampling
pub const PIXEL_SIZE_TOLERANCE: f64 = 1e-2;


#[derive(Debug, Clone)]
pub struct RefineParams {
	pub particles: ParticleSet,
	pub inputs: TomoInputs,
	pub reference: PathBuf,
	pub mask: Option<PathBuf>,
	pub symmetry: String,
	/// Å
	pub particle_diameter: f64,
	/// Å, the resolution the reference gets low-pass filtered to
	pub initial_resolution: f64,
	pub options: ConvertOptions
}

impl RefineParams {

	pub fn new(particles: ParticleSet, inputs: TomoInputs, reference: impl Into<PathBuf>) -> Self {
		Self {
			particles,
			inputs,
			reference: reference.into(),
			mask: None,
			symmetry: "C1".to_string(),
			particle_diameter: 200.0,
			initial_resolution: 40.0,
			options: ConvertOptions::default()
		}
	}
}


/// 3D auto-refinement of the particles against a reference map
#[derive(Debug, Clone)]
pub struct Refine {
	pub params: RefineParams
}

impl Refine {

	pub fn new(params: RefineParams) -> Self {
		Self {
			params
		}
	}

	fn output(&self, ctx: &StepContext, suffix: &str) -> PathBuf {
		ctx.path(format!("{}_{}", OUTPUT_ROOT, suffix))
	}
}

impl Step for Refine {

	fn name(&self) -> &str {
		ID
	}

	fn prepare_inputs(&self, ctx: &mut StepContext) -> anyhow::Result<()> {

		let params = &self.params;
		if params.particles.particles.is_empty() {
			return Err(Error::StepPreconditionFailed("no particles to refine".to_string()).into());
		}
		params.options.validate()?;
		check_sampling(&params.particles, &params.reference)?;
		if let Some(mask) = &params.mask {
			if !mask.exists() {
				return Err(Error::FileNotFound(mask.clone()).into());
			}
		}

		let tomograms = write_tomograms_input(ctx, &params.inputs)?;
		let particles = write_particles_input(ctx, &params.particles, &params.inputs.tomograms, &params.options)?;
		if ctx.schema() != SchemaVersion::V3 {
			let doc = optimisation_set_document(&OptimisationSet::new(tomograms, particles))?;
			ctx.write_input(IN_OPTIMISATION_SET, &doc)?;
		}
		Ok(())
	}

	fn build_command(&self, ctx: &StepContext) -> anyhow::Result<ExternalCommand> {

		let params = &self.params;
		let mut cmd = ExternalCommand::new(PROGRAM);
		cmd = match ctx.schema() {
			SchemaVersion::V3 => cmd.path_arg("--i", &ctx.path(IN_PARTICLES)),
			_ => cmd.path_arg("--ios", &ctx.path(IN_OPTIMISATION_SET))
		};
		cmd = cmd
			.path_arg("--o", &ctx.path(OUTPUT_ROOT))
			.path_arg("--ref", &params.reference)
			.arg("--auto_refine")
			.arg("--split_random_halves")
			.arg("--firstiter_cc")
			.arg("--sym")
			.arg(&params.symmetry)
			.arg("--particle_diameter")
			.arg(format_float(params.particle_diameter))
			.arg("--ini_high")
			.arg(format_float(params.initial_resolution))
			.arg("--flatten_solvent")
			.arg("--zero_mask");
		if let Some(mask) = &params.mask {
			cmd = cmd.path_arg("--solvent_mask", mask);
		}

		Ok(cmd.parallel(ctx.config()))
	}

	fn parse_outputs(&self, ctx: &mut StepContext) -> anyhow::Result<()> {

		let renamed = promote_last_iteration(ctx.dir(), OUTPUT_ROOT)?;
		if !renamed.is_empty() {
			info!("RELION left its final results under iteration names, renamed {} files", renamed.len());
		}

		let particles = self.output(ctx, "data.star");
		let outcome = read_particles(&particles, &self.params.inputs.tomograms, &self.params.options)
			.context("Failed to read the refined particles")?;
		info!("Refined {} particles", outcome.records.particles.len());
		ctx.warn(outcome.warnings);

		let map = self.output(ctx, "class001.mrc");
		let half1 = self.output(ctx, "half1_class001_unfil.mrc");
		let half2 = self.output(ctx, "half2_class001_unfil.mrc");
		for (name, path) in [(outputs::MAP, &map), (outputs::HALF1, &half1), (outputs::HALF2, &half2)] {
			if path.exists() {
				mrc::fix_volume_header(path)?;
			}
			ctx.register_output(name, path)?;
		}

		let mut set = OptimisationSet::new(ctx.path(IN_TOMOGRAMS), particles);
		set.reference_map1 = Some(half1);
		set.reference_map2 = Some(half2);
		set.reference_mask = self.params.mask.clone();
		register_optimisation_set(ctx, &set)
	}
}


/// The reference must be sampled like the particles, or RELION refines garbage
pub fn check_sampling(particles: &ParticleSet, reference: &Path) -> anyhow::Result<()> {

	if !reference.exists() {
		return Err(Error::FileNotFound(reference.to_path_buf()).into());
	}
	let header = MrcHeader::read(reference)?;
	let Some(voxel_size) = header.voxel_size()
		else {
			return Err(Error::StepPreconditionFailed(format!("reference map {} has no voxel size", reference.to_string_lossy())).into());
		};

	for group in &particles.optics {
		if (group.image_pixel_size - voxel_size).abs() > PIXEL_SIZE_TOLERANCE {
			return Err(Error::StepPreconditionFailed(format!(
				"particles of optics group {} are sampled at {} Å/px, but the reference map {} at {} Å/px",
				group.number,
				format_float(group.image_pixel_size),
				reference.to_string_lossy(),
				format_float(voxel_size)
			)).into());
		}
	}

	Ok(())
}


/// When auto-refine stops without writing its final files, its results are only under
/// iteration names like `run_it017_data.star`. Renames the newest iteration's files
/// to the final names (`run_data.star`) wherever those are missing.
/// Returns the new paths.
pub fn promote_last_iteration(dir: &Path, root: &str) -> anyhow::Result<Vec<PathBuf>> {

	let names = fs::read_dir(dir)
		.with_context(|| format!("Failed to list {}", dir.to_string_lossy()))?
		.filter_map(|entry| entry.ok())
		.map(|entry| entry.file_name().to_string_lossy().to_string())
		.collect::<Vec<_>>();

	let iteration_prefix = format!("{}_it", root);
	let last = names.iter()
		.filter_map(|name| name.strip_prefix(&iteration_prefix))
		.filter_map(|rest| rest.split_once('_'))
		.filter_map(|(num, _)| num.parse::<u32>().ok())
		.max();
	let Some(last) = last
		else { return Ok(Vec::new()); };

	let prefix = format!("{}_it{:03}_", root, last);
	let mut renamed = Vec::new();
	for name in &names {
		let Some(suffix) = name.strip_prefix(&prefix)
			else { continue; };
		let to = dir.join(format!("{}_{}", root, suffix));
		if to.exists() {
			continue;
		}
		let from = dir.join(name);
		fs::rename(&from, &to)
			.with_context(|| format!("Failed to rename {} to {}", from.to_string_lossy(), to.to_string_lossy()))?;
		debug!("Renamed {} to {}", from.to_string_lossy(), to.to_string_lossy());
		renamed.push(to);
	}

	Ok(renamed)
}
