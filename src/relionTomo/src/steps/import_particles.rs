
use anyhow::Context;
use tracing::info;

use crate::config::ConvertOptions;
use crate::dispatch::{ExternalCommand, Step, StepContext};
use crate::error::Error;
use crate::metadata::{Coordinate3D, OptimisationSet};
use crate::readers::read_coordinates;
use crate::schema::SchemaVersion;
use crate::steps::{output_dir, register_optimisation_set, write_coordinates_input, write_tomograms_input, TomoInputs, IN_COORDS, IN_TOMOGRAMS};


pub const ID: &str = "import-particles";

const PROGRAM: &str = "relion_tomo_import_particles";

const OUT_PARTICLES: &str = "particles.star";
const OUT_TOMOGRAMS: &str = "tomograms.star";


#[derive(Debug, Clone, Default)]
pub struct ImportParams {
	pub coordinates: Vec<Coordinate3D>,
	pub inputs: TomoInputs,
	pub options: ConvertOptions
}


/// Hands picked coordinates and their tomograms to RELION
#[derive(Debug, Clone)]
pub struct ImportParticles {
	pub params: ImportParams
}

impl ImportParticles {

	pub fn new(params: ImportParams) -> Self {
		Self {
			params
		}
	}
}

impl Step for ImportParticles {

	fn name(&self) -> &str {
		ID
	}

	fn prepare_inputs(&self, ctx: &mut StepContext) -> anyhow::Result<()> {

		if ctx.schema() == SchemaVersion::V3 {
			return Err(Error::StepPreconditionFailed("importing particles needs RELION 4 or later".to_string()).into());
		}
		if self.params.coordinates.is_empty() {
			return Err(Error::StepPreconditionFailed("no coordinates to import".to_string()).into());
		}
		self.params.options.validate()?;

		write_tomograms_input(ctx, &self.params.inputs)?;
		write_coordinates_input(ctx, IN_COORDS, &self.params.coordinates, &self.params.inputs.tomograms, &self.params.options)?;
		Ok(())
	}

	fn build_command(&self, ctx: &StepContext) -> anyhow::Result<ExternalCommand> {
		Ok(ExternalCommand::new(PROGRAM)
			.path_arg("--i", &ctx.path(IN_COORDS))
			.path_arg("--t", &ctx.path(IN_TOMOGRAMS))
			.arg("--o")
			.arg(output_dir(ctx)))
	}

	fn parse_outputs(&self, ctx: &mut StepContext) -> anyhow::Result<()> {

		let particles = ctx.path(OUT_PARTICLES);
		let coords = read_coordinates(&particles, &self.params.inputs.tomograms, None, &self.params.options)
			.context("Failed to read the imported particles")?;
		info!("Imported {} particles", coords.records.len());
		ctx.warn(coords.warnings);

		// RELION 4 copies the tomograms file, later versions may not
		let tomograms = match ctx.path(OUT_TOMOGRAMS) {
			path if path.exists() => path,
			_ => ctx.path(IN_TOMOGRAMS)
		};

		register_optimisation_set(ctx, &OptimisationSet::new(tomograms, particles))
	}
}
