
use std::path::Path;

use anyhow::Context;

use crate::config::ConvertOptions;
use crate::dispatch::{ExternalCommand, Step, StepContext};
use crate::error::Error;
use crate::metadata::{OptimisationSet, ParticleSet};
use crate::mrc;
use crate::schema::SchemaVersion;
use crate::star::format_float;
use crate::steps::{outputs, output_dir, register_optimisation_set, write_particles_input, write_tomograms_input, TomoInputs, IN_PARTICLES, IN_TOMOGRAMS};


pub const ID: &str = "reconstruct-particle";

const PROGRAM: &str = "relion_tomo_reconstruct_particle";

pub const OUT_MERGED: &str = "merged.mrc";
pub const OUT_HALF1: &str = "half1.mrc";
pub const OUT_HALF2: &str = "half2.mrc";


#[derive(Debug, Clone)]
pub struct ReconstructParams {
	pub particles: ParticleSet,
	pub inputs: TomoInputs,
	pub symmetry: String,
	/// box size and binning of the map
	pub options: ConvertOptions
}

impl Default for ReconstructParams {

	fn default() -> Self {
		Self {
			particles: ParticleSet::default(),
			inputs: TomoInputs::default(),
			symmetry: "C1".to_string(),
			options: ConvertOptions::default()
		}
	}
}


/// Averages the particles into a map, and two half-maps
#[derive(Debug, Clone)]
pub struct ReconstructParticle {
	pub params: ReconstructParams
}

impl ReconstructParticle {

	pub fn new(params: ReconstructParams) -> Self {
		Self {
			params
		}
	}
}

impl Step for ReconstructParticle {

	fn name(&self) -> &str {
		ID
	}

	fn prepare_inputs(&self, ctx: &mut StepContext) -> anyhow::Result<()> {

		if ctx.schema() == SchemaVersion::V3 {
			return Err(Error::StepPreconditionFailed("reconstructing particles needs RELION 4 or later".to_string()).into());
		}
		if self.params.particles.particles.is_empty() {
			return Err(Error::StepPreconditionFailed("no particles to reconstruct".to_string()).into());
		}
		self.params.options.validate()?;

		write_tomograms_input(ctx, &self.params.inputs)?;
		write_particles_input(ctx, &self.params.particles, &self.params.inputs.tomograms, &self.params.options)?;
		Ok(())
	}

	fn build_command(&self, ctx: &StepContext) -> anyhow::Result<ExternalCommand> {
		let options = &self.params.options;
		Ok(ExternalCommand::new(PROGRAM)
			.path_arg("--p", &ctx.path(IN_PARTICLES))
			.path_arg("--t", &ctx.path(IN_TOMOGRAMS))
			.arg("--o")
			.arg(output_dir(ctx))
			.arg("--b")
			.arg(options.box_size)
			.arg("--bin")
			.arg(format_float(options.binning))
			.arg("--sym")
			.arg(&self.params.symmetry)
			.mpi(ctx.config().mpi)
			.threads(ctx.config().threads))
	}

	fn parse_outputs(&self, ctx: &mut StepContext) -> anyhow::Result<()> {

		let maps = [
			(outputs::MAP, OUT_MERGED),
			(outputs::HALF1, OUT_HALF1),
			(outputs::HALF2, OUT_HALF2)
		];
		for (name, filename) in maps {
			let path = ctx.path(filename);
			fix_header(&path)?;
			ctx.register_output(name, path)?;
		}

		let mut set = OptimisationSet::new(ctx.path(IN_TOMOGRAMS), ctx.path(IN_PARTICLES));
		set.reference_map1 = Some(ctx.path(OUT_HALF1));
		set.reference_map2 = Some(ctx.path(OUT_HALF2));
		register_optimisation_set(ctx, &set)
	}
}


/// maps sometimes come out labelled as image stacks
fn fix_header(path: &Path) -> anyhow::Result<()> {
	if !path.exists() {
		anyhow::bail!("RELION didn't write the map: {}", path.to_string_lossy());
	}
	mrc::fix_volume_header(path)
		.with_context(|| format!("Failed to fix the header of {}", path.to_string_lossy()))?;
	Ok(())
}
