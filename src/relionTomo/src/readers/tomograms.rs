
use std::path::Path;

use tracing::debug;

use crate::error::{Result, Warning};
use crate::metadata::{Tomogram, TomogramSet};
use crate::readers::{find_table, resolve_optional_path, ReadOutcome};
use crate::scale::{Binning, Dims};
use crate::schema::labels::*;
use crate::schema::SchemaVersion;
use crate::star::{Row, StarDocument};
use crate::writers::particles::V3_MAGNIFICATION;


pub fn read_tomograms(path: impl AsRef<Path>) -> Result<ReadOutcome<TomogramSet>> {
	let path = path.as_ref();
	let doc = StarDocument::read(path)?;
	let outcome = tomograms_from_document(&doc, path)?;
	debug!("Read {} tomograms from {}", outcome.records.len(), path.to_string_lossy());
	Ok(outcome)
}


/// `path` is where the document came from, for resolving the paths in it
pub fn tomograms_from_document(doc: &StarDocument, path: &Path) -> Result<ReadOutcome<TomogramSet>> {

	let table = find_table(doc, "global", TOMO_NAME)?;
	let schema = detect_schema(table.columns());

	let mut outcome = ReadOutcome::new(TomogramSet::default());
	for row in table.rows() {
		let ts_id = row.str(TOMO_NAME)?;
		match tomogram(&row, ts_id, schema, path)? {
			Ok(tomo) => outcome.records.push(tomo),
			Err(msg) => outcome.warnings.push(Warning::row(row.index(), ts_id, msg))
		}
	}

	Ok(outcome)
}


/// the oldest schema whose tomograms table has every column seen
pub fn detect_schema(columns: &[String]) -> SchemaVersion {
	let has = |label: &str| columns.iter().any(|c| c == label);
	if has(TOMO_BINNING) || has(TOMO_RECONSTRUCTED) {
		SchemaVersion::V5
	} else if has(TOMO_TS_PIXEL_SIZE) {
		SchemaVersion::V4
	} else {
		SchemaVersion::V3
	}
}


/// Ok(Err(..)) for a row that has the columns but values that make no sense
fn tomogram(row: &Row, ts_id: &str, schema: SchemaVersion, path: &Path) -> Result<std::result::Result<Tomogram,String>> {

	let x = row.i64(TOMO_SIZE_X)?;
	let y = row.i64(TOMO_SIZE_Y)?;
	let z = row.i64(TOMO_SIZE_Z)?;
	let Some(unbinned) = [x, y, z].iter()
		.all(|&v| v > 0 && v <= u32::MAX as i64)
		.then(|| Dims::new(x as u32, y as u32, z as u32))
		else { return Ok(Err(format!("invalid size {}x{}x{}", x, y, z))); };

	let (ts_pixel_size, binning) = match schema {
		SchemaVersion::V3 => {
			let detector = row.f64(DETECTOR_PIXEL_SIZE)?;
			let mag = row.f64_opt(MAGNIFICATION)?
				.unwrap_or(V3_MAGNIFICATION);
			(detector*V3_MAGNIFICATION/mag, 1.0)
		}
		_ => (
			row.f64(TOMO_TS_PIXEL_SIZE)?,
			row.f64_opt(TOMO_BINNING)?.unwrap_or(1.0)
		)
	};
	if !(ts_pixel_size.is_finite() && ts_pixel_size > 0.0) {
		return Ok(Err(format!("invalid tilt-series pixel size {}", ts_pixel_size)));
	}
	let Ok(binning) = Binning::new(binning)
		else { return Ok(Err(format!("invalid binning {}", binning))); };

	let tomo_path = match schema {
		SchemaVersion::V3 => row.str_opt(MICROGRAPH_NAME),
		_ => row.str_opt(TOMO_RECONSTRUCTED)
	};

	Ok(Ok(Tomogram {
		ts_id: ts_id.to_string(),
		path: resolve_optional_path(path, tomo_path),
		dims: unbinned.to_binned(binning),
		sampling_rate: ts_pixel_size*binning.0,
		ts_sampling_rate: ts_pixel_size,
		hand: row.f64_opt(TOMO_HAND)?.unwrap_or(-1.0),
		optics_group: row.str_opt(OPTICS_GROUP_NAME)
			.unwrap_or("opticsGroup1")
			.to_string(),
		origin: None,
		etomo_directive: resolve_optional_path(path, row.str_opt(TOMO_ETOMO_DIRECTIVE))
	}))
}
