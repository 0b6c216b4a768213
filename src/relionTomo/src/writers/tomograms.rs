
use std::collections::HashMap;
use std::path::{Path, PathBuf};

use tracing::info;

use crate::dose::{pre_exposures, tilt_doses, DoseTable};
use crate::error::{Error, Result, Warning};
use crate::metadata::{CtfSeries, TiltSeries, Tomogram, TomogramSet};
use crate::projector::{matrix_rows, tilt_projection};
use crate::schema::labels::*;
use crate::schema::{SchemaVersion, TableKind};
use crate::star::{format_vector, StarDocument, StarTable};
use crate::writers::particles::V3_MAGNIFICATION;
use crate::writers::tilt_series::tilt_series_table;
use crate::writers::{path_value, table_for};


/// v5 tomograms files point to their tilt-series files in this folder, next to the tomograms file
pub const TILT_SERIES_DIR: &str = "tilt_series";


/// The tomograms file, and the tilt-series files it refers to
#[derive(Debug, Clone)]
pub struct TomogramsDocuments {
	pub tomograms: StarDocument,
	/// paths relative to the folder of the tomograms file
	pub tilt_series: Vec<(PathBuf,StarDocument)>,
	pub warnings: Vec<Warning>
}


/// One `global` row per tomogram, with sizes at bin 1.
/// v4 adds a table of per-tilt projections for each tomogram,
/// v5 a tilt-series file for each tomogram instead.
pub fn tomograms_documents(tomograms: &TomogramSet, series: &[TiltSeries], ctfs: &[CtfSeries], doses: Option<&DoseTable>, schema: SchemaVersion) -> Result<TomogramsDocuments> {

	let series = series.iter()
		.map(|ts| (ts.ts_id.as_str(), ts))
		.collect::<HashMap<_,_>>();
	let ctfs = ctfs.iter()
		.map(|c| (c.ts_id.as_str(), c))
		.collect::<HashMap<_,_>>();

	let mut out = TomogramsDocuments {
		tomograms: StarDocument::new(),
		tilt_series: Vec::new(),
		warnings: Vec::new()
	};
	let mut global = table_for(schema, TableKind::Tomograms, "global")?;
	let mut per_tomogram = Vec::<StarTable>::new();

	for tomo in tomograms.iter() {

		let ts = *series.get(tomo.ts_id.as_str())
			.ok_or_else(|| Error::StepPreconditionFailed(format!("no tilt-series for tomogram {}", tomo.ts_id)))?;
		let ctf = ctfs.get(tomo.ts_id.as_str()).copied();

		let ts_star = match schema {
			SchemaVersion::V5 => {
				let rel_path = Path::new(TILT_SERIES_DIR).join(format!("{}.star", ts.ts_id));
				let mut doc = StarDocument::new();
				doc.push(tilt_series_table(ts, ctf, doses, schema, &mut out.warnings)?);
				out.tilt_series.push((rel_path.clone(), doc));
				Some(rel_path)
			}
			SchemaVersion::V4 => {
				per_tomogram.push(tomogram_tilts_table(tomo, ts, ctf, doses, schema, &mut out.warnings)?);
				None
			}
			SchemaVersion::V3 => None
		};

		push_tomogram(&mut global, tomo, ts, ts_star.as_deref())?;
	}

	out.tomograms.push(global);
	for table in per_tomogram {
		out.tomograms.push(table);
	}
	Ok(out)
}


fn push_tomogram(global: &mut StarTable, tomo: &Tomogram, ts: &TiltSeries, ts_star: Option<&Path>) -> Result<()> {

	let binning = tomo.binning();
	let size = tomo.unbinned_dims();
	let tomo_path = path_value(tomo.path.as_deref());

	global.push_with(|row| {
		row.set(TOMO_NAME, &tomo.ts_id)?;
		row.set(TOMO_TILT_SERIES_NAME, path_value(ts.stack.as_deref()))?;
		row.set(TOMO_FRAME_COUNT, ts.enabled_tilts().count())?;
		row.set(TOMO_SIZE_X, size.x)?;
		row.set(TOMO_SIZE_Y, size.y)?;
		row.set(TOMO_SIZE_Z, size.z)?;
		row.set(TOMO_HAND, tomo.hand)?;
		row.set(OPTICS_GROUP_NAME, &tomo.optics_group)?;
		row.set(TOMO_TS_PIXEL_SIZE, ts.sampling_rate)?;
		row.set(ORIGINAL_PIXEL_SIZE, ts.sampling_rate)?;
		row.set(VOLTAGE, ts.voltage)?;
		row.set(CS, ts.cs)?;
		row.set(AMPLITUDE_CONTRAST, ts.amplitude_contrast)?;
		row.set(TOMO_IMPORT_FRACTIONAL_DOSE, ts.dose_per_tilt)?;
		row.set(TOMO_TS_STAR_FILE, path_value(ts_star))?;
		row.set(TOMO_ETOMO_DIRECTIVE, path_value(tomo.etomo_directive.as_deref()))?;
		row.set(TOMO_BINNING, binning.0)?;
		row.set(TOMO_RECONSTRUCTED, tomo_path.clone())?;
		// v3 names tomograms by file, at bin 1
		row.set(MICROGRAPH_NAME, tomo_path)?;
		row.set(DETECTOR_PIXEL_SIZE, ts.sampling_rate)?;
		row.set(MAGNIFICATION, V3_MAGNIFICATION)?;
		Ok(())
	})
}


/// v4: the projection, CTF and dose of every enabled tilt of one tomogram
fn tomogram_tilts_table(tomo: &Tomogram, ts: &TiltSeries, ctf: Option<&CtfSeries>, doses: Option<&DoseTable>, schema: SchemaVersion, warnings: &mut Vec<Warning>) -> Result<StarTable> {

	let mut table = table_for(schema, TableKind::TomogramTilts, &tomo.ts_id)?;

	let size = tomo.unbinned_dims();
	let size = [size.x as f64, size.y as f64, size.z as f64];
	let tilt_doses = tilt_doses(ts, doses, warnings);
	let pre_exposures = pre_exposures(ts, &tilt_doses);

	for (i, tilt) in ts.enabled_tilts() {
		let [px, py, pz, pw] = matrix_rows(&tilt_projection(ts, tilt, size));
		let estimate = ctf.and_then(|c| c.tilt(i));
		table.push_with(|row| {
			row.set(TOMO_PROJ_X, format_vector(&px))?;
			row.set(TOMO_PROJ_Y, format_vector(&py))?;
			row.set(TOMO_PROJ_Z, format_vector(&pz))?;
			row.set(TOMO_PROJ_W, format_vector(&pw))?;
			row.set(DEFOCUS_U, estimate.map_or(0.0, |e| e.defocus_u))?;
			row.set(DEFOCUS_V, estimate.map_or(0.0, |e| e.defocus_v))?;
			row.set(DEFOCUS_ANGLE, estimate.map_or(0.0, |e| e.defocus_angle))?;
			row.set(CTF_SCALE_FACTOR, tilt.ctf_scale_factor())?;
			row.set(PRE_EXPOSURE, pre_exposures[i])?;
			Ok(())
		})?;
	}

	Ok(table)
}


/// Writes the tomograms file and, for v5, its tilt-series files.
/// Returns the warnings about missing CTFs and doses.
pub fn write_tomograms(path: impl AsRef<Path>, tomograms: &TomogramSet, series: &[TiltSeries], ctfs: &[CtfSeries], doses: Option<&DoseTable>, schema: SchemaVersion) -> Result<Vec<Warning>> {

	let path = path.as_ref();
	let docs = tomograms_documents(tomograms, series, ctfs, doses, schema)?;
	let dir = path.parent()
		.unwrap_or(Path::new(""));

	// the tilt-series files first, so the tomograms file never points at a missing file
	for (rel_path, doc) in &docs.tilt_series {
		doc.write(dir.join(rel_path))?;
	}
	docs.tomograms.write(path)?;

	info!("Wrote {} tomograms to {}", tomograms.len(), path.to_string_lossy());
	Ok(docs.warnings)
}
