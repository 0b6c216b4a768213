
// Projects 3D particle positions onto the tilt images, through the per-tilt
// projection matrices of a tomograms file.

use std::collections::HashMap;
use std::path::Path;

use nalgebra::{Matrix4, Vector4};
use tracing::{debug, info};

use crate::error::{Error, Result, Warning};
use crate::geometry::{rotation_x, rotation_y, rotation_z, translation_matrix};
use crate::metadata::{TiltImage, TiltSeries, Tomogram, TomogramSet};
use crate::readers::{find_table, resolve_path, tomograms_from_document};
use crate::schema::labels::*;
use crate::star::{Row, StarDocument, StarTable};


/// The projection of a tilt in bin-1 pixels:
/// tomogram centre to the origin, tilt about Y, tilt axis about Z, then into the aligned image
pub fn tilt_projection(ts: &TiltSeries, tilt: &TiltImage, tomo_size: [f64; 3]) -> Matrix4<f64> {
	let [cx, cy] = ts.image_center();
	let [sx, sy] = tilt.shift_px();
	translation_matrix(cx + sx, cy + sy, 0.0)
		* rotation_z(ts.tilt_axis_angle)
		* rotation_y(tilt.tilt_angle)
		* translation_matrix(-tomo_size[0]/2.0, -tomo_size[1]/2.0, -tomo_size[2]/2.0)
}


/// The projection RELION 5 describes per tilt with angles and Å shifts.
/// Its tilt-series files don't record the image size, so (u,v) is relative to the image centre.
pub fn angles_projection(x_tilt: f64, y_tilt: f64, z_rot: f64, shift_px: [f64; 2], tomo_size: [f64; 3]) -> Matrix4<f64> {
	translation_matrix(shift_px[0], shift_px[1], 0.0)
		* rotation_z(z_rot)
		* rotation_y(y_tilt)
		* rotation_x(x_tilt)
		* translation_matrix(-tomo_size[0]/2.0, -tomo_size[1]/2.0, -tomo_size[2]/2.0)
}


/// (P·[x,y,z,1]) in the first two components
pub fn project_point(p: &Matrix4<f64>, [x, y, z]: [f64; 3]) -> [f64; 2] {
	let q = p*Vector4::new(x, y, z, 1.0);
	[q.x, q.y]
}


/// the four `[a,b,c,d]` rows of a projection matrix, as RELION writes them
pub fn matrix_rows(p: &Matrix4<f64>) -> [Vec<f64>; 4] {
	[0, 1, 2, 3].map(|r| (0 .. 4).map(|c| p[(r, c)]).collect())
}


fn matrix_from_row(row: &Row) -> Result<Matrix4<f64>> {
	let mut m = Matrix4::zeros();
	for (r, label) in [TOMO_PROJ_X, TOMO_PROJ_Y, TOMO_PROJ_Z, TOMO_PROJ_W].into_iter().enumerate() {
		let v = row.vector(label)?;
		if v.len() != 4 {
			return Err(Error::SchemaMismatch(format!(
				"{} in row {} of table data_{} has {} components instead of 4", label, row.index(), row.table().name(), v.len()
			)));
		}
		for c in 0 .. 4 {
			m[(r, c)] = v[c];
		}
	}
	Ok(m)
}


/// Per tilt-series id, the projection matrix of every tilt, in tilt order.
/// v4 files carry the matrices in a table per tomogram,
/// v5 files point to a tilt-series file per tomogram.
pub fn read_projections(doc: &StarDocument, path: &Path, tomograms: &TomogramSet, warnings: &mut Vec<Warning>) -> Result<HashMap<String,Vec<Matrix4<f64>>>> {

	let mut projections = HashMap::new();
	let global = find_table(doc, "global", TOMO_NAME)?;

	for row in global.rows() {

		let ts_id = row.str(TOMO_NAME)?;
		let Some(tomo) = tomograms.get(ts_id)
			else { continue; };

		let matrices = if let Ok(table) = doc.table(ts_id) {
			table.rows()
				.map(|r| matrix_from_row(&r))
				.collect::<Result<Vec<_>>>()?
		} else if let Some(ts_path) = row.str_opt(TOMO_TS_STAR_FILE) {
			let ts_path = resolve_path(path, ts_path);
			let ts_doc = StarDocument::read(&ts_path)?;
			let table = find_table(&ts_doc, ts_id, TOMO_Y_TILT)?;
			table.rows()
				.map(|r| angles_matrix(&r, tomo))
				.collect::<Result<Vec<_>>>()?
		} else {
			warnings.push(Warning {
				row: Some(row.index()),
				tomo: Some(ts_id.to_string()),
				message: "no projection matrices for this tomogram".to_string()
			});
			continue;
		};

		debug!("{} projections for tomogram {}", matrices.len(), ts_id);
		projections.insert(ts_id.to_string(), matrices);
	}

	Ok(projections)
}


fn angles_matrix(row: &Row, tomo: &Tomogram) -> Result<Matrix4<f64>> {
	let size = tomo.unbinned_dims();
	let shift = [
		row.f64_opt(TOMO_X_SHIFT_ANGST)?.unwrap_or(0.0)/tomo.ts_sampling_rate,
		row.f64_opt(TOMO_Y_SHIFT_ANGST)?.unwrap_or(0.0)/tomo.ts_sampling_rate
	];
	Ok(angles_projection(
		row.f64_opt(TOMO_X_TILT)?.unwrap_or(0.0),
		row.f64(TOMO_Y_TILT)?,
		row.f64_opt(TOMO_Z_ROT)?.unwrap_or(0.0),
		shift,
		[size.x as f64, size.y as f64, size.z as f64]
	))
}


#[derive(Debug, Clone, PartialEq)]
pub struct ProjectedPoint {
	pub tomo: String,
	/// 0-based, in the order of the projection table
	pub tilt_index: usize,
	/// 0-based row of the particles table
	pub particle_index: usize,
	pub u: f64,
	pub v: f64
}


#[derive(Debug, Clone, Default)]
pub struct Projections {
	pub points: Vec<ProjectedPoint>,
	pub warnings: Vec<Warning>
}

impl Projections {

	pub fn to_table(&self) -> Result<StarTable> {
		let mut table = StarTable::new("projections", [TOMO_NAME, SCI_TILT_INDEX, SCI_PARTICLE_INDEX, SCI_PROJECTED_U, SCI_PROJECTED_V])?;
		for p in &self.points {
			table.push_with(|row| {
				row.set(TOMO_NAME, &p.tomo)?;
				row.set(SCI_TILT_INDEX, p.tilt_index)?;
				row.set(SCI_PARTICLE_INDEX, p.particle_index)?;
				row.set(SCI_PROJECTED_U, p.u)?;
				row.set(SCI_PROJECTED_V, p.v)?;
				Ok(())
			})?;
		}
		Ok(table)
	}

	pub fn to_document(&self) -> Result<StarDocument> {
		let mut doc = StarDocument::new();
		doc.push(self.to_table()?);
		Ok(doc)
	}
}


/// Projects every particle of a particles or coordinates table through its tomogram's matrices
pub fn project_particles(particles: &StarTable, tomograms: &TomogramSet, projections: &HashMap<String,Vec<Matrix4<f64>>>) -> Result<Projections> {

	let mut out = Projections::default();
	let mut unknown = Vec::<String>::new();

	for row in particles.rows() {

		let ts_id = match row.str_opt(TOMO_NAME) {
			Some(id) => id.to_string(),
			None => {
				let micrograph = row.str(MICROGRAPH_NAME)?;
				match tomograms.find_by_path(Path::new(micrograph)) {
					Some(tomo) => tomo.ts_id.clone(),
					None => micrograph.to_string()
				}
			}
		};

		let (Some(tomo), Some(matrices)) = (tomograms.get(&ts_id), projections.get(&ts_id))
			else {
				if !unknown.contains(&ts_id) {
					out.warnings.push(Warning::row(row.index(), &ts_id, "no projections for this tomogram, skipping its particles"));
					unknown.push(ts_id);
				}
				continue;
			};

		let pos = unbinned_position(&row, tomo)?;
		if pos.iter().any(|v| !v.is_finite()) {
			out.warnings.push(Warning::row(row.index(), &ts_id, "position is not finite"));
			continue;
		}

		for (tilt_index, p) in matrices.iter().enumerate() {
			let [u, v] = project_point(p, pos);
			out.points.push(ProjectedPoint {
				tomo: ts_id.clone(),
				tilt_index,
				particle_index: row.index(),
				u,
				v
			});
		}
	}

	Ok(out)
}


/// bin-1 Cartesian pixels, from either pixel coordinates or centered Å coordinates
fn unbinned_position(row: &Row, tomo: &Tomogram) -> Result<[f64; 3]> {
	if row.table().has_column(COORD_X) {
		Ok([row.f64(COORD_X)?, row.f64(COORD_Y)?, row.f64(COORD_Z)?])
	} else {
		let size = tomo.unbinned_dims().center();
		let centered = [
			row.f64(CENTERED_COORD_X_ANGST)?,
			row.f64(CENTERED_COORD_Y_ANGST)?,
			row.f64(CENTERED_COORD_Z_ANGST)?
		];
		Ok([0, 1, 2].map(|d| centered[d]/tomo.ts_sampling_rate + size[d]))
	}
}


/// Reads both files and projects every particle
#[tracing::instrument(skip_all, level = 5, name = "Project")]
pub fn project(particles_path: impl AsRef<Path>, tomograms_path: impl AsRef<Path>) -> Result<Projections> {

	let particles_path = particles_path.as_ref();
	let tomograms_path = tomograms_path.as_ref();

	let tomograms_doc = StarDocument::read(tomograms_path)?;
	let tomograms = tomograms_from_document(&tomograms_doc, tomograms_path)?;
	let mut warnings = tomograms.warnings;
	let projections = read_projections(&tomograms_doc, tomograms_path, &tomograms.records, &mut warnings)?;

	let particles_doc = StarDocument::read(particles_path)?;
	let particles = find_table(&particles_doc, "particles", TOMO_NAME)?;

	let mut out = project_particles(particles, &tomograms.records, &projections)?;
	warnings.append(&mut out.warnings);
	out.warnings = warnings;

	info!("Projected {} particles onto {} points", particles.len(), out.points.len());
	Ok(out)
}
