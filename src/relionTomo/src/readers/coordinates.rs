
use std::path::Path;

use tracing::{debug, warn};

use crate::config::ConvertOptions;
use crate::error::{Result, Warning};
use crate::geometry::{matrix_from_relion, undo_flips, RelionPose};
use crate::metadata::{CoordOrigin, Coordinate3D, Extensions, TomogramSet};
use crate::readers::{find_table, ReadOutcome};
use crate::scale::{Binning, PixelSize, ValueUnbinnedF};
use crate::schema::labels::*;
use crate::star::{Row, StarDocument};


/// Reads a coordinates file into coordinates at `sampling_rate`,
/// or at the sampling of each coordinate's tomogram when None
pub fn read_coordinates(path: impl AsRef<Path>, tomograms: &TomogramSet, sampling_rate: Option<f64>, options: &ConvertOptions) -> Result<ReadOutcome<Vec<Coordinate3D>>> {
	let path = path.as_ref();
	let doc = StarDocument::read(path)?;
	let outcome = coordinates_from_document(&doc, tomograms, sampling_rate, options)?;
	debug!("Read {} coordinates from {}", outcome.records.len(), path.to_string_lossy());
	Ok(outcome)
}


pub fn coordinates_from_document(doc: &StarDocument, tomograms: &TomogramSet, sampling_rate: Option<f64>, options: &ConvertOptions) -> Result<ReadOutcome<Vec<Coordinate3D>>> {

	let table = find_table(doc, "particles", COORD_X)?;

	// v4 and later name tomograms, v3 points to their files
	let named = table.has_column(TOMO_NAME);

	let mut outcome = ReadOutcome::new(Vec::new());

	for row in table.rows() {

		let i = row.index();
		let key = if named {
			row.str(TOMO_NAME)?
		} else {
			row.str(MICROGRAPH_NAME)?
		};
		let tomo = if named {
			tomograms.get(key)
		} else {
			tomograms.find_by_path(Path::new(key))
		};
		let Some(tomo) = tomo
			else {
				outcome.skip_tomogram(i, key);
				continue;
			};

		let unbinned = [row.f64(COORD_X)?, row.f64(COORD_Y)?, row.f64(COORD_Z)?];
		if unbinned.iter().any(|v| !v.is_finite()) {
			outcome.warnings.push(Warning::row(i, &tomo.ts_id, "coordinate is not finite, skipping it"));
			continue;
		}

		let size = tomo.unbinned_dims();
		let size = [size.x as f64, size.y as f64, size.z as f64];
		let unbinned = undo_flips(unbinned, size, options.flip_yz, options.flip_z);

		let target = sampling_rate.unwrap_or(tomo.sampling_rate);
		let ts_pixel_size = tomo.ts_pixel_size()?;
		let binning = Binning::between(PixelSize::new(target)?, ts_pixel_size);
		let [x, y, z] = unbinned.map(|v| ValueUnbinnedF(v).to_binned(binning).0);

		let transform = match pose(&row, ts_pixel_size)? {
			Some(pose) => match matrix_from_relion(&pose, target, options.convention) {
				Ok(m) => Some(m),
				Err(e) => {
					warn!("Skipping coordinate {} of tomogram {}: {}", i, tomo.ts_id, e);
					outcome.warnings.push(Warning::row(i, &tomo.ts_id, e.to_string()));
					continue;
				}
			},
			None => None
		};

		let mut extensions = Extensions::default();
		extensions.set_class_number(row.i64_opt(CLASS_NUMBER)?.unwrap_or(-1));
		extensions.set_random_subset(row.i64_opt(RANDOM_SUBSET)?.unwrap_or((i % 2) as i64 + 1));
		if let Some(group) = row.i64_opt(SCI_GROUP_ID)? {
			extensions.set_group_id(group);
		}
		if let (Some(nx), Some(ny), Some(nz)) = (row.f64_opt(SCI_COORD_X)?, row.f64_opt(SCI_COORD_Y)?, row.f64_opt(SCI_COORD_Z)?) {
			extensions.set_native_coords([nx, ny, nz]);
		}

		outcome.records.push(Coordinate3D {
			tomo_id: tomo.ts_id.clone(),
			x,
			y,
			z,
			origin: CoordOrigin::BottomLeftCorner,
			sampling_rate: target,
			transform,
			particle_id: Some(row.i64_opt(TOMO_PARTICLE_ID)?.unwrap_or(i as i64 + 1)),
			manifold_index: Some(row.i64_opt(TOMO_MANIFOLD_INDEX)?.unwrap_or(1)),
			extensions
		});
	}

	Ok(outcome)
}


/// The row's pose, if it has one. Shifts in Å win over the older pixel shifts, which are at bin 1.
fn pose(row: &Row, ts_pixel_size: PixelSize) -> Result<Option<RelionPose>> {

	let angles = [
		row.f64_opt(ANGLE_ROT)?,
		row.f64_opt(ANGLE_TILT)?,
		row.f64_opt(ANGLE_PSI)?
	];
	let shifts_a = [
		row.f64_opt(ORIGIN_X_ANGST)?,
		row.f64_opt(ORIGIN_Y_ANGST)?,
		row.f64_opt(ORIGIN_Z_ANGST)?
	];
	let shifts_px = [
		row.f64_opt(ORIGIN_X)?,
		row.f64_opt(ORIGIN_Y)?,
		row.f64_opt(ORIGIN_Z)?
	];

	if angles.iter().chain(&shifts_a).chain(&shifts_px).all(Option::is_none) {
		return Ok(None);
	}

	let shift = |d: usize| shifts_a[d]
		.or(shifts_px[d].map(|px| px*ts_pixel_size.0))
		.unwrap_or(0.0);

	Ok(Some(RelionPose {
		rot: angles[0].unwrap_or(0.0),
		tilt: angles[1].unwrap_or(0.0),
		psi: angles[2].unwrap_or(0.0),
		shift_x: shift(0),
		shift_y: shift(1),
		shift_z: shift(2)
	}))
}
