
use std::path::Path;

use tracing::{debug, warn};

use crate::config::ConvertOptions;
use crate::error::{Error, Result, Warning};
use crate::geometry::{matrix_from_relion, RelionPose};
use crate::metadata::{Dimensionality, Extensions, OpticsGroup, ParticleSet, PseudoSubtomogram, TomogramSet};
use crate::mrc;
use crate::readers::{find_table, resolve_optional_path, resolve_path, ReadOutcome};
use crate::schema::labels::*;
use crate::star::{parse_vector, Row, StarDocument, StarTable};
use crate::writers::particles::V3_MAGNIFICATION;


/// Reads a particles file. Relative image paths are relative to the file's folder.
/// Positions stay in bin-1 pixels, the frame the particles writer expects them in;
/// poses stay at each optics group's image sampling.
/// Single volumes whose headers claim to be image stacks get their headers fixed.
pub fn read_particles(path: impl AsRef<Path>, tomograms: &TomogramSet, options: &ConvertOptions) -> Result<ReadOutcome<ParticleSet>> {

	let path = path.as_ref();
	let doc = StarDocument::read(path)?;
	let outcome = particles_from_document(&doc, path, tomograms, options)?;

	if outcome.records.dimensionality() == Dimensionality::Volume3D {
		for particle in &outcome.records.particles {
			fix_header(&particle.path)?;
		}
	}

	debug!("Read {} particles from {}", outcome.records.particles.len(), path.to_string_lossy());
	Ok(outcome)
}


fn fix_header(path: &Path) -> Result<()> {
	let is_mrc = path.extension()
		.is_some_and(|ext| ext.eq_ignore_ascii_case("mrc"));
	if is_mrc && path.is_file() {
		mrc::fix_volume_header(path)?;
	}
	Ok(())
}


/// `path` is where the document came from, for resolving the paths in it
pub fn particles_from_document(doc: &StarDocument, path: &Path, tomograms: &TomogramSet, options: &ConvertOptions) -> Result<ReadOutcome<ParticleSet>> {

	let table = find_table(doc, "particles", IMAGE_NAME)?;

	let optics = match doc.table("optics") {
		Ok(optics) => read_optics(optics)?,
		Err(_) => v3_optics(table, tomograms)?
	};

	// v4 and later place particles by centered Å coordinates
	let centered = table.has_column(CENTERED_COORD_X_ANGST);
	let named = table.has_column(TOMO_NAME);

	let mut outcome = ReadOutcome::new(ParticleSet {
		optics,
		particles: Vec::new()
	});

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
			tomograms.find_by_path(&resolve_path(path, key))
				.or_else(|| tomograms.find_by_path(Path::new(key)))
		};
		let Some(tomo) = tomo
			else {
				outcome.skip_tomogram(i, key);
				continue;
			};

		let optics_group = row.i64_opt(OPTICS_GROUP)?.unwrap_or(1);
		let sampling_rate = outcome.records.optics_group(optics_group)
			.map(|g| g.image_pixel_size)
			.ok_or_else(|| Error::SchemaMismatch(format!("row {} is in optics group {}, which table data_optics doesn't have", i, optics_group)))?;

		let coords = if centered {
			let center = tomo.unbinned_dims().center();
			let ts_pixel_size = tomo.ts_pixel_size()?;
			[
				row.f64(CENTERED_COORD_X_ANGST)?/ts_pixel_size.0 + center[0],
				row.f64(CENTERED_COORD_Y_ANGST)?/ts_pixel_size.0 + center[1],
				row.f64(CENTERED_COORD_Z_ANGST)?/ts_pixel_size.0 + center[2]
			]
		} else {
			[row.f64(COORD_X)?, row.f64(COORD_Y)?, row.f64(COORD_Z)?]
		};
		if coords.iter().any(|v| !v.is_finite()) {
			outcome.warnings.push(Warning::row(i, &tomo.ts_id, "coordinate is not finite, skipping it"));
			continue;
		}

		let pose = pose(&row, sampling_rate)?;
		let transform = match matrix_from_relion(&pose, sampling_rate, options.convention) {
			Ok(m) => m,
			Err(e) => {
				warn!("Skipping particle {} of tomogram {}: {}", i, tomo.ts_id, e);
				outcome.warnings.push(Warning::row(i, &tomo.ts_id, e.to_string()));
				continue;
			}
		};

		let image = resolve_path(path, row.str(IMAGE_NAME)?);
		if options.check_files && !image.exists() {
			return Err(Error::FileNotFound(image));
		}

		let mut extensions = Extensions::default();
		extensions.set_class_number(row.i64_opt(CLASS_NUMBER)?.unwrap_or(-1));
		extensions.set_random_subset(row.i64_opt(RANDOM_SUBSET)?.unwrap_or((i % 2) as i64 + 1));

		let visible_frames = match row.str_opt(TOMO_VISIBLE_FRAMES) {
			Some(s) => {
				let flags = parse_vector(s)
					.ok_or_else(|| Error::SchemaMismatch(format!("row {} has an unreadable {}: {}", i, TOMO_VISIBLE_FRAMES, s)))?;
				let Some(flags) = visibility_flags(&flags)
					else {
						warn!("Skipping particle {} of tomogram {}: visible frames aren't all 0 or 1: {}", i, tomo.ts_id, s);
						outcome.warnings.push(Warning::row(i, &tomo.ts_id, format!("{} must hold only 0 or 1, not {}", TOMO_VISIBLE_FRAMES, s)));
						continue;
					};
				flags
			}
			None => Vec::new()
		};

		outcome.records.particles.push(PseudoSubtomogram {
			particle_id: particle_id(&row)?,
			ts_id: tomo.ts_id.clone(),
			path: image,
			ctf_path: resolve_optional_path(path, row.str_opt(CTF_IMAGE)),
			coords,
			transform: Some(transform),
			tilt_prior: row.f64_opt(ANGLE_TILT_PRIOR)?,
			psi_prior: row.f64_opt(ANGLE_PSI_PRIOR)?,
			subtomo_angles: [
				row.f64_opt(SUBTOMO_ROT)?.unwrap_or(0.0),
				row.f64_opt(SUBTOMO_TILT)?.unwrap_or(0.0),
				row.f64_opt(SUBTOMO_PSI)?.unwrap_or(0.0)
			],
			manifold_index: row.i64_opt(TOMO_MANIFOLD_INDEX)?.unwrap_or(1),
			optics_group,
			group_number: row.i64_opt(GROUP_NUMBER)?.unwrap_or(1),
			norm_correction: row.f64_opt(NORM_CORRECTION)?.unwrap_or(1.0),
			log_likelihood: row.f64_opt(LOG_LIKELIHOOD)?.unwrap_or(0.0),
			max_prob: row.f64_opt(MAX_PROB)?.unwrap_or(0.0),
			n_significant: row.i64_opt(N_SIGNIFICANT)?.unwrap_or(0),
			visible_frames,
			extensions
		});
	}

	Ok(outcome)
}


/// None unless every entry is exactly 0 or 1
fn visibility_flags(values: &[f64]) -> Option<Vec<u8>> {
	values.iter()
		.map(|&v| if v == 0.0 {
			Some(0)
		} else if v == 1.0 {
			Some(1)
		} else {
			None
		})
		.collect()
}


/// the id at the end of a `<tomo>/<id>` particle name, or the id column, or the row number
fn particle_id(row: &Row) -> Result<i64> {
	if let Some(id) = row.str_opt(TOMO_PARTICLE_NAME)
		.and_then(|name| name.rsplit('/').next())
		.and_then(|id| id.parse::<i64>().ok())
	{
		return Ok(id);
	}
	Ok(row.i64_opt(TOMO_PARTICLE_ID)?
		.unwrap_or(row.index() as i64 + 1))
}


/// Shifts in Å win over the older pixel shifts, which are at the particle sampling
fn pose(row: &Row, sampling_rate: f64) -> Result<RelionPose> {
	let shift = |a: &str, px: &str| -> Result<f64> {
		match row.f64_opt(a)? {
			Some(v) => Ok(v),
			None => Ok(row.f64_opt(px)?.unwrap_or(0.0)*sampling_rate)
		}
	};
	Ok(RelionPose {
		rot: row.f64_opt(ANGLE_ROT)?.unwrap_or(0.0),
		tilt: row.f64_opt(ANGLE_TILT)?.unwrap_or(0.0),
		psi: row.f64_opt(ANGLE_PSI)?.unwrap_or(0.0),
		shift_x: shift(ORIGIN_X_ANGST, ORIGIN_X)?,
		shift_y: shift(ORIGIN_Y_ANGST, ORIGIN_Y)?,
		shift_z: shift(ORIGIN_Z_ANGST, ORIGIN_Z)?
	})
}


fn read_optics(table: &StarTable) -> Result<Vec<OpticsGroup>> {
	table.rows()
		.map(|row| {
			let dimensionality = row.i64_opt(IMAGE_DIMENSIONALITY)?.unwrap_or(2);
			let dimensionality = Dimensionality::from_int(dimensionality)
				.ok_or_else(|| Error::SchemaMismatch(format!("unknown image dimensionality {}", dimensionality)))?;
			let ts_pixel_size = row.f64(TOMO_TS_PIXEL_SIZE)?;
			Ok(OpticsGroup {
				number: row.i64(OPTICS_GROUP)?,
				name: row.str_opt(OPTICS_GROUP_NAME)
					.unwrap_or("opticsGroup1")
					.to_string(),
				voltage: row.f64(VOLTAGE)?,
				cs: row.f64(CS)?,
				amplitude_contrast: row.f64(AMPLITUDE_CONTRAST)?,
				original_pixel_size: row.f64_opt(ORIGINAL_PIXEL_SIZE)?.unwrap_or(ts_pixel_size),
				ts_pixel_size,
				image_pixel_size: row.f64(IMAGE_PIXEL_SIZE)?,
				image_size: row.i64_opt(IMAGE_SIZE)?
					.and_then(|s| u32::try_from(s).ok())
					.unwrap_or(0),
				dimensionality,
				ctf_premultiplied: row.i64_opt(CTF_PREMULTIPLIED)?.unwrap_or(0) != 0
			})
		})
		.collect()
}


/// v3 files have no optics table: every particle is a subtomogram at the pixel size of its row
fn v3_optics(table: &StarTable, tomograms: &TomogramSet) -> Result<Vec<OpticsGroup>> {

	let Some(row) = table.row(0)
		else { return Ok(Vec::new()); };

	let detector = row.f64(DETECTOR_PIXEL_SIZE)?;
	let mag = row.f64_opt(MAGNIFICATION)?.unwrap_or(V3_MAGNIFICATION);
	let image_pixel_size = detector*V3_MAGNIFICATION/mag;
	let ts_pixel_size = tomograms.iter()
		.next()
		.map(|t| t.ts_sampling_rate)
		.unwrap_or(image_pixel_size);

	Ok(vec![OpticsGroup {
		number: 1,
		name: "opticsGroup1".to_string(),
		voltage: 0.0,
		cs: 0.0,
		amplitude_contrast: 0.0,
		original_pixel_size: ts_pixel_size,
		ts_pixel_size,
		image_pixel_size,
		image_size: 0,
		dimensionality: Dimensionality::Volume3D,
		ctf_premultiplied: false
	}])
}
