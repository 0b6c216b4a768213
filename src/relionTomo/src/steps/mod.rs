
// The RELION programs the dispatcher knows how to drive.

pub mod import_particles;
pub mod extract;
pub mod reconstruct;
pub mod refine;

use std::path::PathBuf;

use anyhow::Context;

use crate::config::ConvertOptions;
use crate::dispatch::StepContext;
use crate::dose::DoseTable;
use crate::metadata::{Coordinate3D, CtfSeries, OptimisationSet, ParticleSet, TiltSeries, TomogramSet};
use crate::writers::{coordinates_document, optimisation_set_document, particles_document, tomograms_documents};

pub use extract::{ExtractParams, ExtractSubtomos};
pub use import_particles::{ImportParams, ImportParticles};
pub use reconstruct::{ReconstructParams, ReconstructParticle};
pub use refine::{Refine, RefineParams};


pub const IN_TOMOGRAMS: &str = "in_tomograms.star";
pub const IN_PARTICLES: &str = "in_particles.star";
pub const IN_COORDS: &str = "in_coords.star";
pub const IN_OPTIMISATION_SET: &str = "in_optimisation_set.star";
pub const OPTIMISATION_SET: &str = "optimisation_set.star";

/// names of registered outputs
pub mod outputs {
	pub const TOMOGRAMS: &str = "tomograms";
	pub const PARTICLES: &str = "particles";
	pub const OPTIMISATION_SET: &str = "optimisation_set";
	pub const MAP: &str = "map";
	pub const HALF1: &str = "half1";
	pub const HALF2: &str = "half2";
}

pub const IDS: [&str; 4] = [
	import_particles::ID,
	extract::ID,
	reconstruct::ID,
	refine::ID
];


/// What every step needs to describe the tomograms to RELION
#[derive(Debug, Clone, Default)]
pub struct TomoInputs {
	pub tomograms: TomogramSet,
	pub tilt_series: Vec<TiltSeries>,
	pub ctfs: Vec<CtfSeries>,
	pub doses: Option<DoseTable>
}


/// Writes in_tomograms.star, and the tilt-series files it points to
pub(crate) fn write_tomograms_input(ctx: &mut StepContext, inputs: &TomoInputs) -> anyhow::Result<PathBuf> {

	let docs = tomograms_documents(&inputs.tomograms, &inputs.tilt_series, &inputs.ctfs, inputs.doses.as_ref(), ctx.schema())
		.context("Failed to describe the tomograms")?;

	for (rel_path, doc) in &docs.tilt_series {
		ctx.write_input(rel_path, doc)?;
	}
	ctx.warn(docs.warnings);
	ctx.write_input(IN_TOMOGRAMS, &docs.tomograms)
}


pub(crate) fn write_particles_input(ctx: &mut StepContext, particles: &ParticleSet, tomograms: &TomogramSet, options: &ConvertOptions) -> anyhow::Result<PathBuf> {
	let doc = particles_document(particles, tomograms, ctx.schema(), options)
		.context("Failed to describe the particles")?;
	ctx.write_input(IN_PARTICLES, &doc)
}


pub(crate) fn write_coordinates_input(ctx: &mut StepContext, name: &str, coords: &[Coordinate3D], tomograms: &TomogramSet, options: &ConvertOptions) -> anyhow::Result<PathBuf> {
	let doc = coordinates_document(coords, tomograms, ctx.schema(), options)
		.context("Failed to describe the coordinates")?;
	ctx.write_input(name, &doc)
}


/// Writes the step's optimisation_set.star and registers it with the files it names
pub(crate) fn register_optimisation_set(ctx: &mut StepContext, set: &OptimisationSet) -> anyhow::Result<()> {

	let doc = optimisation_set_document(set)?;
	let path = ctx.path(OPTIMISATION_SET);
	doc.write(&path)
		.context("Failed to write the optimisation set")?;

	ctx.register_output(outputs::TOMOGRAMS, &set.tomograms)?;
	ctx.register_output(outputs::PARTICLES, &set.particles)?;
	ctx.register_output(outputs::OPTIMISATION_SET, path)?;
	Ok(())
}


/// RELION wants output folders with a trailing separator
pub(crate) fn output_dir(ctx: &StepContext) -> String {
	let mut dir = ctx.dir().to_string_lossy().to_string();
	if !dir.ends_with('/') {
		dir.push('/');
	}
	dir
}
