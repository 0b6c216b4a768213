
use std::collections::HashMap;
use std::path::{Path, PathBuf};

use tracing::info;

use crate::dose::{pre_exposures, tilt_doses, DoseTable};
use crate::error::{Result, Warning};
use crate::metadata::{CtfSeries, TiltSeries};
use crate::schema::labels::*;
use crate::schema::{SchemaVersion, TableKind};
use crate::star::{StarDocument, StarTable};
use crate::writers::{path_value, table_for};


/// The per-tilt table of one tilt-series, named by its id.
/// Excluded views are left out. Tilts without a CTF estimate get RELION's missing-file
/// marker in their CTF file columns and zeros in the numeric ones.
pub fn tilt_series_table(ts: &TiltSeries, ctf: Option<&CtfSeries>, doses: Option<&DoseTable>, schema: SchemaVersion, warnings: &mut Vec<Warning>) -> Result<StarTable> {

	let mut table = table_for(schema, TableKind::TiltSeries, &ts.ts_id)?;

	let tilt_doses = tilt_doses(ts, doses, warnings);
	let pre_exposures = pre_exposures(ts, &tilt_doses);

	for (i, tilt) in ts.enabled_tilts() {

		let estimate = ctf.and_then(|c| c.tilt(i));
		if estimate.is_none() && ctf.is_some() {
			warnings.push(Warning::row(i, &ts.ts_id, "no CTF estimate for this tilt"));
		}
		let [shift_x, shift_y] = tilt.shift_px();

		table.push_with(|row| {
			row.set(MICROGRAPH_MOVIE_NAME, tilt.movie.as_deref().unwrap_or(&tilt.micrograph))?;
			row.set(TILT_MOVIE_FRAME_COUNT, tilt.frame_count)?;
			row.set(NOMINAL_STAGE_TILT_ANGLE, tilt.tilt_angle)?;
			row.set(NOMINAL_TILT_AXIS_ANGLE, ts.tilt_axis_angle)?;
			row.set(PRE_EXPOSURE, pre_exposures[i])?;
			row.set(NOMINAL_DEFOCUS, tilt.nominal_defocus)?;
			row.set(MICROGRAPH_NAME, tilt.micrograph.as_path())?;
			row.set(MICROGRAPH_NAME_EVEN, path_value(tilt.even.as_deref()))?;
			row.set(MICROGRAPH_NAME_ODD, path_value(tilt.odd.as_deref()))?;
			let psd = estimate.and_then(|e| e.psd.as_deref());
			row.set(CTF_IMAGE, path_value(psd))?;
			row.set(CTF_POWER_SPECTRUM, path_value(psd))?;
			row.set(DEFOCUS_U, estimate.map_or(0.0, |e| e.defocus_u))?;
			row.set(DEFOCUS_V, estimate.map_or(0.0, |e| e.defocus_v))?;
			row.set(CTF_ASTIGMATISM, estimate.map_or(0.0, |e| e.astigmatism()))?;
			row.set(DEFOCUS_ANGLE, estimate.map_or(0.0, |e| e.defocus_angle))?;
			row.set(CTF_FIGURE_OF_MERIT, estimate.map_or(0.0, |e| e.fit_quality))?;
			row.set(CTF_MAX_RESOLUTION, estimate.map_or(0.0, |e| e.resolution))?;
			row.set(CTF_SCALE_FACTOR, tilt.ctf_scale_factor())?;
			row.set(TOMO_X_TILT, 0.0)?;
			row.set(TOMO_Y_TILT, tilt.tilt_angle)?;
			row.set(TOMO_Z_ROT, tilt.rotation_deg().unwrap_or(ts.tilt_axis_angle))?;
			row.set(TOMO_X_SHIFT_ANGST, shift_x*ts.sampling_rate)?;
			row.set(TOMO_Y_SHIFT_ANGST, shift_y*ts.sampling_rate)?;
			Ok(())
		})?;
	}

	Ok(table)
}


/// Writes one STAR file per tilt-series into the folder, named `<tsId>.star`.
/// Returns the paths written, in series order.
pub fn write_tilt_series(dir: impl AsRef<Path>, series: &[TiltSeries], ctfs: &[CtfSeries], doses: Option<&DoseTable>, schema: SchemaVersion, warnings: &mut Vec<Warning>) -> Result<Vec<PathBuf>> {

	let dir = dir.as_ref();
	let ctfs = ctfs.iter()
		.map(|c| (c.ts_id.as_str(), c))
		.collect::<HashMap<_,_>>();

	let mut paths = Vec::new();
	for ts in series {
		let ctf = ctfs.get(ts.ts_id.as_str()).copied();
		if ctf.is_none() {
			warnings.push(Warning {
				row: None,
				tomo: Some(ts.ts_id.clone()),
				message: "no CTF series, CTF columns will be empty".to_string()
			});
		}
		let mut doc = StarDocument::new();
		doc.push(tilt_series_table(ts, ctf, doses, schema, warnings)?);
		let path = dir.join(format!("{}.star", ts.ts_id));
		doc.write(&path)?;
		paths.push(path);
	}

	info!("Wrote {} tilt-series to {}", paths.len(), dir.to_string_lossy());
	Ok(paths)
}
