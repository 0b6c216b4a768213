
use anyhow::Context;
use gumdrop::Options;
use tracing::info;

use crate::logging::log_warnings;
use crate::projector::project;


#[derive(Options)]
pub struct Args {

	/// write the projections here instead of printing them
	output: Option<String>,

	/// particles or coordinates STAR file, with tomogram names
	#[options(free, required)]
	particles: String,

	/// tomograms STAR file, with projection matrices or tilt-series files
	#[options(free, required)]
	tomograms: String
}


pub fn run(args: Args) -> Result<(),anyhow::Error> {

	let projections = project(&args.particles, &args.tomograms)
		.with_context(|| format!("Failed to project {} onto the tilts of {}", args.particles, args.tomograms))?;
	log_warnings(&projections.warnings);

	let doc = projections.to_document()?;
	match &args.output {
		Some(path) => {
			doc.write(path)
				.with_context(|| format!("Failed to write projections to {}", path))?;
			info!("Wrote {} projected points to {}", projections.points.len(), path);
		}
		None => print!("{}", doc.render())
	}

	Ok(())
}
