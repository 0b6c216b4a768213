
use std::path::Path;

use tracing::info;

use crate::config::ConvertOptions;
use crate::error::{Error, Result};
use crate::geometry::{at_row, relion_from_matrix, RelionPose};
use crate::metadata::{Dimensionality, OpticsGroup, ParticleSet, TomogramSet};
use crate::schema::labels::*;
use crate::schema::{SchemaVersion, TableKind};
use crate::star::{format_vector, StarDocument, StarTable};
use crate::writers::{path_value, random_subset, table_for};


/// RELION's nominal magnification, which v3 files pair with the detector pixel size
pub const V3_MAGNIFICATION: f64 = 10000.0;


/// The optics table followed by the particles table.
/// v4 and v5 place particles by centered coordinates in Å, v3 by bin-1 pixels.
pub fn particles_document(set: &ParticleSet, tomograms: &TomogramSet, schema: SchemaVersion, options: &ConvertOptions) -> Result<StarDocument> {

	let kind = match set.dimensionality() {
		Dimensionality::Stack2D => TableKind::Particles2D,
		Dimensionality::Volume3D => TableKind::Particles3D
	};

	let mut doc = StarDocument::new();
	if schema != SchemaVersion::V3 {
		doc.push(optics_table(&set.optics, schema)?);
	}

	let mut table = table_for(schema, kind, "particles")?;

	for (i, particle) in set.particles.iter().enumerate() {

		let tomo = tomograms.require(&particle.ts_id)?;
		let ts_pixel_size = tomo.ts_pixel_size()?;
		let optics = set.optics_group(particle.optics_group)
			.ok_or_else(|| Error::SchemaMismatch(format!(
				"particle {} is in optics group {}, which the set doesn't have", particle.name(), particle.optics_group
			)))?;
		let sampling_rate = optics.image_pixel_size;

		let size = tomo.unbinned_dims();
		let size = [size.x as f64, size.y as f64, size.z as f64];
		let centered = [0, 1, 2]
			.map(|d| (particle.coords[d] - size[d]/2.0)*ts_pixel_size.0);

		let pose = match &particle.transform {
			Some(m) => relion_from_matrix(m, sampling_rate, options.convention)
				.map_err(|e| at_row(e, i, &particle.ts_id))?,
			None => RelionPose::default()
		};

		let micrograph = tomo.path.as_ref()
			.map(|p| p.to_string_lossy().to_string())
			.unwrap_or_else(|| particle.ts_id.clone());
		let visible_frames = particle.visible_frames.iter()
			.map(|&v| v as f64)
			.collect::<Vec<_>>();

		table.push_with(|row| {
			row.set(TOMO_NAME, &particle.ts_id)?;
			row.set(MICROGRAPH_NAME, micrograph)?;
			row.set(TOMO_PARTICLE_NAME, particle.name())?;
			row.set(SUBTOMO_ROT, particle.subtomo_angles[0])?;
			row.set(SUBTOMO_TILT, particle.subtomo_angles[1])?;
			row.set(SUBTOMO_PSI, particle.subtomo_angles[2])?;
			row.set(ANGLE_ROT, pose.rot)?;
			row.set(ANGLE_TILT, pose.tilt)?;
			row.set(ANGLE_PSI, pose.psi)?;
			row.set(ANGLE_TILT_PRIOR, particle.tilt_prior.unwrap_or(pose.tilt))?;
			row.set(ANGLE_PSI_PRIOR, particle.psi_prior.unwrap_or(pose.psi))?;
			row.set(OPTICS_GROUP, particle.optics_group)?;
			row.set(IMAGE_NAME, particle.path.as_path())?;
			row.set(CTF_IMAGE, path_value(particle.ctf_path.as_deref()))?;
			row.set(MAGNIFICATION, V3_MAGNIFICATION)?;
			row.set(DETECTOR_PIXEL_SIZE, sampling_rate)?;
			row.set(COORD_X, particle.coords[0])?;
			row.set(COORD_Y, particle.coords[1])?;
			row.set(COORD_Z, particle.coords[2])?;
			row.set(CENTERED_COORD_X_ANGST, centered[0])?;
			row.set(CENTERED_COORD_Y_ANGST, centered[1])?;
			row.set(CENTERED_COORD_Z_ANGST, centered[2])?;
			row.set(ORIGIN_X_ANGST, pose.shift_x)?;
			row.set(ORIGIN_Y_ANGST, pose.shift_y)?;
			row.set(ORIGIN_Z_ANGST, pose.shift_z)?;
			// pixels at the particle sampling
			row.set(ORIGIN_X, pose.shift_x/sampling_rate)?;
			row.set(ORIGIN_Y, pose.shift_y/sampling_rate)?;
			row.set(ORIGIN_Z, pose.shift_z/sampling_rate)?;
			row.set(GROUP_NUMBER, particle.group_number)?;
			row.set(CLASS_NUMBER, particle.extensions.class_number().unwrap_or(-1))?;
			row.set(NORM_CORRECTION, particle.norm_correction)?;
			row.set(RANDOM_SUBSET, random_subset(i, particle.extensions.random_subset(), options.random_subset_mode))?;
			row.set(LOG_LIKELIHOOD, particle.log_likelihood)?;
			row.set(MAX_PROB, particle.max_prob)?;
			row.set(N_SIGNIFICANT, particle.n_significant)?;
			row.set(TOMO_VISIBLE_FRAMES, format_vector(&visible_frames))?;
			Ok(())
		})?;
	}

	doc.push(table);
	Ok(doc)
}


fn optics_table(groups: &[OpticsGroup], schema: SchemaVersion) -> Result<StarTable> {

	let mut table = schema.registry().columns(TableKind::Optics)
		.and_then(|columns| StarTable::new("optics", columns.iter().copied()))?;

	for group in groups {
		table.push_with(|row| {
			row.set(OPTICS_GROUP, group.number)?;
			row.set(OPTICS_GROUP_NAME, &group.name)?;
			row.set(CS, group.cs)?;
			row.set(VOLTAGE, group.voltage)?;
			row.set(AMPLITUDE_CONTRAST, group.amplitude_contrast)?;
			row.set(ORIGINAL_PIXEL_SIZE, group.original_pixel_size)?;
			row.set(TOMO_TS_PIXEL_SIZE, group.ts_pixel_size)?;
			row.set(IMAGE_PIXEL_SIZE, group.image_pixel_size)?;
			row.set(IMAGE_SIZE, group.image_size)?;
			row.set(IMAGE_DIMENSIONALITY, group.dimensionality.as_int())?;
			row.set(SUBTOMO_BINNING, group.binning().0)?;
			row.set(CTF_PREMULTIPLIED, group.ctf_premultiplied as i64)?;
			Ok(())
		})?;
	}

	Ok(table)
}


pub fn write_particles(path: impl AsRef<Path>, set: &ParticleSet, tomograms: &TomogramSet, schema: SchemaVersion, options: &ConvertOptions) -> Result<()> {
	let path = path.as_ref();
	let doc = particles_document(set, tomograms, schema, options)?;
	doc.write(path)?;
	info!("Wrote {} particles to {}", set.particles.len(), path.to_string_lossy());
	Ok(())
}
