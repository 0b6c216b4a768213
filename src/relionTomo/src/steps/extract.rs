
use anyhow::Context;
use tracing::info;

use crate::config::ConvertOptions;
use crate::dispatch::{ExternalCommand, Step, StepContext};
use crate::error::Error;
use crate::metadata::{Coordinate3D, Dimensionality, OptimisationSet};
use crate::readers::read_particles;
use crate::schema::SchemaVersion;
use crate::star::format_float;
use crate::steps::{output_dir, register_optimisation_set, write_coordinates_input, write_tomograms_input, TomoInputs, IN_PARTICLES, IN_TOMOGRAMS};


pub const ID: &str = "extract-subtomos";

const PROGRAM: &str = "relion_tomo_subtomo";

const OUT_PARTICLES: &str = "particles.star";


#[derive(Debug, Clone, Default)]
pub struct ExtractParams {
	pub coordinates: Vec<Coordinate3D>,
	pub inputs: TomoInputs,
	/// box sizes, binning and whether to extract 2D stacks
	pub options: ConvertOptions
}


/// Cuts a pseudo-subtomogram out of the tilt-series for every particle
#[derive(Debug, Clone)]
pub struct ExtractSubtomos {
	pub params: ExtractParams
}

impl ExtractSubtomos {

	pub fn new(params: ExtractParams) -> Self {
		Self {
			params
		}
	}
}

impl Step for ExtractSubtomos {

	fn name(&self) -> &str {
		ID
	}

	fn prepare_inputs(&self, ctx: &mut StepContext) -> anyhow::Result<()> {

		let options = &self.params.options;
		options.validate()?;
		match (ctx.schema(), options.dimensionality) {
			(SchemaVersion::V3, _) =>
				return Err(Error::StepPreconditionFailed("extracting subtomograms needs RELION 4 or later".to_string()).into()),
			(SchemaVersion::V4, Dimensionality::Stack2D) =>
				return Err(Error::StepPreconditionFailed("2D particle stacks need RELION 5".to_string()).into()),
			_ => ()
		}

		write_tomograms_input(ctx, &self.params.inputs)?;
		write_coordinates_input(ctx, IN_PARTICLES, &self.params.coordinates, &self.params.inputs.tomograms, options)?;
		Ok(())
	}

	fn build_command(&self, ctx: &StepContext) -> anyhow::Result<ExternalCommand> {

		let options = &self.params.options;
		let mut cmd = ExternalCommand::new(PROGRAM)
			.path_arg("--p", &ctx.path(IN_PARTICLES))
			.path_arg("--t", &ctx.path(IN_TOMOGRAMS))
			.arg("--o")
			.arg(output_dir(ctx))
			.arg("--b")
			.arg(options.box_size)
			.arg("--crop")
			.arg(options.cropped_box_size)
			.arg("--bin")
			.arg(format_float(options.binning));
		if options.dimensionality == Dimensionality::Stack2D {
			cmd = cmd.arg("--stack2d");
		}

		// no GPU code in the extractor
		Ok(cmd.mpi(ctx.config().mpi)
			.threads(ctx.config().threads))
	}

	fn parse_outputs(&self, ctx: &mut StepContext) -> anyhow::Result<()> {

		let particles = ctx.path(OUT_PARTICLES);
		let outcome = read_particles(&particles, &self.params.inputs.tomograms, &self.params.options)
			.context("Failed to read the extracted particles")?;
		info!("Extracted {} particles", outcome.records.particles.len());
		ctx.warn(outcome.warnings);

		let tomograms = ctx.path(IN_TOMOGRAMS);
		register_optimisation_set(ctx, &OptimisationSet::new(tomograms, particles))
	}
}
