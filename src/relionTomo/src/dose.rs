
// Electron dose per tilt, and the accumulated pre-exposure RELION weights each tilt by.

use std::fs;
use std::io::ErrorKind;
use std::path::Path;

use tracing::debug;

use crate::error::{Error, Result, Warning};
use crate::metadata::TiltSeries;


/// tilts match a dose file entry only when their angles are this close, in degrees
pub const ANGLE_TOLERANCE: f64 = 0.5;


/// Dose per tilt angle, from a two-column text file: `angle dose` or `angle,dose`
#[derive(Debug, Clone, Default, PartialEq)]
pub struct DoseTable {
	entries: Vec<(f64,f64)>
}

impl DoseTable {

	pub fn new(entries: Vec<(f64,f64)>) -> Self {
		Self {
			entries
		}
	}

	pub fn read(path: impl AsRef<Path>) -> Result<Self> {
		let path = path.as_ref();
		let text = fs::read_to_string(path)
			.map_err(|e| match e.kind() {
				ErrorKind::NotFound => Error::FileNotFound(path.to_path_buf()),
				_ => Error::io(path, e)
			})?;
		let table = Self::parse(&text, path)?;
		debug!("Read {} doses from {}", table.entries.len(), path.to_string_lossy());
		Ok(table)
	}

	pub fn parse(text: &str, path: &Path) -> Result<Self> {

		let mut entries = Vec::new();

		for (line_i, line) in text.lines().enumerate() {

			let line = line.trim();
			if line.is_empty() || line.starts_with('#') {
				continue;
			}

			let fields = line.split(|c: char| c == ',' || c.is_whitespace())
				.filter(|s| !s.is_empty())
				.collect::<Vec<_>>();
			let [angle, dose] = fields.as_slice()
				else { return Err(Error::malformed(path, line_i + 1, format!("expected two columns, not {}", fields.len()))); };

			match (angle.parse::<f64>(), dose.parse::<f64>()) {
				(Ok(angle), Ok(dose)) => entries.push((angle, dose)),
				// allow a header line
				_ if entries.is_empty() && line_i == 0 => continue,
				_ => return Err(Error::malformed(path, line_i + 1, format!("not a number pair: {}", line)))
			}
		}

		Ok(Self {
			entries
		})
	}

	/// the dose listed for the angle nearest the given one, if within tolerance
	pub fn lookup(&self, angle: f64) -> Option<f64> {
		self.entries.iter()
			.map(|&(a, dose)| ((a - angle).abs(), dose))
			.filter(|(d, _)| *d <= ANGLE_TOLERANCE)
			.min_by(|a, b| a.0.total_cmp(&b.0))
			.map(|(_, dose)| dose)
	}

	pub fn len(&self) -> usize {
		self.entries.len()
	}

	pub fn is_empty(&self) -> bool {
		self.entries.is_empty()
	}
}


/// The dose of every tilt of the series, in tilt order.
/// A dose table, when given, wins over what the images recorded.
pub fn tilt_doses(ts: &TiltSeries, table: Option<&DoseTable>, warnings: &mut Vec<Warning>) -> Vec<f64> {
	ts.tilts.iter()
		.enumerate()
		.map(|(i, tilt)| {
			if let Some(table) = table {
				if let Some(dose) = table.lookup(tilt.tilt_angle) {
					return dose;
				}
				warnings.push(Warning {
					row: Some(i),
					tomo: Some(ts.ts_id.clone()),
					message: format!("no dose listed within {}° of tilt angle {}", ANGLE_TOLERANCE, tilt.tilt_angle)
				});
			}
			tilt.dose.unwrap_or(ts.dose_per_tilt)
		})
		.collect()
}


/// The dose each tilt received before it was imaged, in tilt order:
/// the initial dose plus the doses of every tilt acquired earlier
pub fn pre_exposures(ts: &TiltSeries, doses: &[f64]) -> Vec<f64> {
	ts.tilts.iter()
		.map(|tilt| {
			let earlier = ts.tilts.iter()
				.zip(doses)
				.filter(|(other, _)| other.acq_order < tilt.acq_order)
				.map(|(_, dose)| dose)
				.sum::<f64>();
			ts.initial_dose + earlier
		})
		.collect()
}


#[cfg(test)]
mod test {

	use std::path::PathBuf;

	use galvanic_assert::{assert_that, matchers::*};
	use indoc::indoc;

	use super::*;
	use crate::metadata::TiltImage;


	fn tilt_series(angles_in_acq_order: &[f64]) -> TiltSeries {
		let mut tilts = angles_in_acq_order.iter()
			.enumerate()
			.map(|(i, &angle)| TiltImage::new(i as u32 + 1, angle, format!("tilt_{}.mrc", i)))
			.collect::<Vec<_>>();
		// files list tilts by angle
		tilts.sort_by(|a, b| a.tilt_angle.total_cmp(&b.tilt_angle));
		TiltSeries {
			ts_id: "TS_01".to_string(),
			sampling_rate: 1.35,
			voltage: 300.0,
			cs: 2.7,
			amplitude_contrast: 0.1,
			tilt_axis_angle: 85.0,
			dose_per_tilt: 3.0,
			initial_dose: 0.0,
			image_size: (1000, 1000),
			stack: None,
			tilts
		}
	}


	#[test]
	fn parse() {

		let table = DoseTable::parse(indoc! { r#"
			angle,dose
			# comment
			0.0, 2.5
			3.0 2.0

			-3.0	2.0
		"# }, &PathBuf::from("doses.txt")).unwrap();

		assert_that!(&table.len(), eq(3));
		assert_that!(&table.lookup(0.0), eq(Some(2.5)));
		assert_that!(&table.lookup(2.7), eq(Some(2.0)));
		assert_that!(&table.lookup(1.5), eq(None));

		let result = DoseTable::parse("0 1\n3 x\n", &PathBuf::from("doses.txt"));
		assert_that!(&matches!(result, Err(Error::MalformedStar { line: 2, .. })), eq(true));

		let result = DoseTable::parse("0 1 2\n", &PathBuf::from("doses.txt"));
		assert_that!(&result.is_err(), eq(true));
	}


	#[test]
	fn doses_and_pre_exposure() {

		// dose-symmetric-ish order: 0, 3, -3
		let ts = tilt_series(&[0.0, 3.0, -3.0]);
		let mut warnings = Vec::new();

		let doses = tilt_doses(&ts, None, &mut warnings);
		assert_that!(&doses, eq(vec![3.0, 3.0, 3.0]));

		// tilts are ordered -3, 0, 3, acquired third, first, second
		let pre = pre_exposures(&ts, &doses);
		assert_that!(&pre, eq(vec![6.0, 0.0, 3.0]));
		assert_that!(&warnings.is_empty(), eq(true));
	}


	#[test]
	fn table_wins() {

		let mut ts = tilt_series(&[0.0, 3.0, -3.0]);
		ts.tilts[0].dose = Some(10.0);
		ts.initial_dose = 1.0;
		let table = DoseTable::new(vec![(-3.0, 4.0), (0.0, 2.0)]);
		let mut warnings = Vec::new();

		let doses = tilt_doses(&ts, Some(&table), &mut warnings);
		// +3 isn't in the table, so the series' dose per tilt fills in
		assert_that!(&doses, eq(vec![4.0, 2.0, 3.0]));
		assert_that!(&warnings.len(), eq(1));
		assert_that!(&warnings[0].row, eq(Some(2)));

		let pre = pre_exposures(&ts, &doses);
		assert_that!(&pre, eq(vec![1.0 + 2.0 + 3.0, 1.0, 1.0 + 2.0]));
	}
}
