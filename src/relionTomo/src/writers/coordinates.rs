
use std::path::Path;

use tracing::info;

use crate::config::ConvertOptions;
use crate::error::Result;
use crate::geometry::{apply_flips, at_row, relion_from_matrix, RelionPose};
use crate::metadata::{CoordOrigin, Coordinate3D, TomogramSet};
use crate::scale::{Binning, PixelSize, ValueBinnedF};
use crate::schema::labels::*;
use crate::schema::{SchemaVersion, TableKind};
use crate::star::StarDocument;
use crate::writers::{random_subset, table_for};


/// Picked coordinates as a RELION coordinates file.
/// Positions are written in bin-1 pixels with a corner origin, whatever they were picked at.
pub fn coordinates_document(coords: &[Coordinate3D], tomograms: &TomogramSet, schema: SchemaVersion, options: &ConvertOptions) -> Result<StarDocument> {

	let mut table = table_for(schema, TableKind::Coordinates, "particles")?;

	for (i, coord) in coords.iter().enumerate() {

		let tomo = tomograms.require(&coord.tomo_id)?;
		let ts_pixel_size = tomo.ts_pixel_size()?;
		let binning = Binning::between(PixelSize::new(coord.sampling_rate)?, ts_pixel_size);

		// to bin 1, then to the corner origin, then into the flipped frame
		let size = tomo.unbinned_dims();
		let size = [size.x as f64, size.y as f64, size.z as f64];
		let mut pos = coord.position()
			.map(|v| ValueBinnedF(v).to_unbinned(binning).0);
		if coord.origin == CoordOrigin::Center {
			for d in 0 .. 3 {
				pos[d] += size[d]/2.0;
			}
		}
		let [x, y, z] = apply_flips(pos, size, options.flip_yz, options.flip_z);

		let pose = match &coord.transform {
			Some(m) => relion_from_matrix(m, coord.sampling_rate, options.convention)
				.map_err(|e| at_row(e, i, &coord.tomo_id))?,
			None => RelionPose::default()
		};

		let micrograph = tomo.path.as_ref()
			.map(|p| p.to_string_lossy().to_string())
			.unwrap_or_else(|| coord.tomo_id.clone());
		let native = coord.extensions.native_coords()
			.unwrap_or(coord.position());

		table.push_with(|row| {
			row.set(TOMO_NAME, &coord.tomo_id)?;
			row.set(MICROGRAPH_NAME, micrograph)?;
			row.set(TOMO_PARTICLE_ID, coord.particle_id.unwrap_or(i as i64 + 1))?;
			row.set(TOMO_MANIFOLD_INDEX, coord.manifold_index.unwrap_or(1))?;
			row.set(COORD_X, x)?;
			row.set(COORD_Y, y)?;
			row.set(COORD_Z, z)?;
			row.set(ORIGIN_X_ANGST, pose.shift_x)?;
			row.set(ORIGIN_Y_ANGST, pose.shift_y)?;
			row.set(ORIGIN_Z_ANGST, pose.shift_z)?;
			// bin-1 pixels
			row.set(ORIGIN_X, pose.shift_x/ts_pixel_size.0)?;
			row.set(ORIGIN_Y, pose.shift_y/ts_pixel_size.0)?;
			row.set(ORIGIN_Z, pose.shift_z/ts_pixel_size.0)?;
			row.set(ANGLE_ROT, pose.rot)?;
			row.set(ANGLE_TILT, pose.tilt)?;
			row.set(ANGLE_PSI, pose.psi)?;
			row.set(CLASS_NUMBER, coord.extensions.class_number().unwrap_or(-1))?;
			row.set(RANDOM_SUBSET, random_subset(i, coord.extensions.random_subset(), options.random_subset_mode))?;
			row.set(SCI_COORD_X, native[0])?;
			row.set(SCI_COORD_Y, native[1])?;
			row.set(SCI_COORD_Z, native[2])?;
			row.set(SCI_GROUP_ID, coord.extensions.group_id().unwrap_or(-1))?;
			Ok(())
		})?;
	}

	let mut doc = StarDocument::new();
	doc.push(table);
	Ok(doc)
}


pub fn write_coordinates(path: impl AsRef<Path>, coords: &[Coordinate3D], tomograms: &TomogramSet, schema: SchemaVersion, options: &ConvertOptions) -> Result<()> {
	let path = path.as_ref();
	let doc = coordinates_document(coords, tomograms, schema, options)?;
	doc.write(path)?;
	info!("Wrote {} coordinates to {}", coords.len(), path.to_string_lossy());
	Ok(())
}
