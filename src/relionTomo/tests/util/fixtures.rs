
// Small, consistent metadata for the tests: tomograms 1000x1000x300 at bin 1,
// reconstructed at bin 4 from tilt-series sampled at 1.35 Å/px.

use std::path::PathBuf;

use nalgebra::Matrix3;

use relion_tomo::geometry::{matrix_from_relion, GeometryConvention, RelionPose};
use relion_tomo::metadata::{Coordinate3D, CtfSeries, CtfTilt, Dimensionality, OpticsGroup, ParticleSet, PseudoSubtomogram, TiltImage, TiltSeries, Tomogram, TomogramSet};
use relion_tomo::scale::Dims;
use relion_tomo::steps::TomoInputs;


pub const TS_PIXEL_SIZE: f64 = 1.35;
pub const BINNING: f64 = 4.0;
pub const TOMO_PIXEL_SIZE: f64 = TS_PIXEL_SIZE*BINNING;
pub const UNBINNED_SIZE: [u32; 3] = [1000, 1000, 300];
pub const IMAGE_SIZE: (u32, u32) = (1024, 1024);
pub const NUM_TILTS: usize = 41;
pub const TILT_AXIS: f64 = 85.0;
pub const DOSE_PER_TILT: f64 = 3.0;


/// -60° to +60° every 3°, acquired from 0° outwards, alternating sides
pub fn tilt_series(ts_id: &str) -> TiltSeries {

	let angles = (0 .. NUM_TILTS)
		.map(|i| -60.0 + 3.0*i as f64)
		.collect::<Vec<_>>();

	let tilts = angles.iter()
		.map(|&angle| {
			let step = (angle/3.0).round() as i64;
			let acq_order = if step == 0 {
				1
			} else if step > 0 {
				(2*step) as u32
			} else {
				(2*(-step) + 1) as u32
			};
			let mut tilt = TiltImage::new(acq_order, angle, format!("{}/tilt_{:+03}.mrc", ts_id, angle as i64));
			tilt.nominal_defocus = -3.0;
			tilt
		})
		.collect();

	TiltSeries {
		ts_id: ts_id.to_string(),
		sampling_rate: TS_PIXEL_SIZE,
		voltage: 300.0,
		cs: 2.7,
		amplitude_contrast: 0.1,
		tilt_axis_angle: TILT_AXIS,
		dose_per_tilt: DOSE_PER_TILT,
		initial_dose: 0.0,
		image_size: IMAGE_SIZE,
		stack: Some(PathBuf::from(format!("{}.mrcs", ts_id))),
		tilts
	}
}


/// shifts every tilt image by the same number of pixels
pub fn shift_tilts(ts: &mut TiltSeries, dx: f64, dy: f64) {
	for tilt in &mut ts.tilts {
		let mut m = Matrix3::identity();
		m[(0, 2)] = dx;
		m[(1, 2)] = dy;
		tilt.transform = Some(m);
	}
}


pub fn ctf_series(ts: &TiltSeries) -> CtfSeries {
	CtfSeries {
		ts_id: ts.ts_id.clone(),
		tilts: ts.tilts.iter()
			.map(|tilt| Some(CtfTilt {
				defocus_u: 30000.0 + tilt.tilt_angle,
				defocus_v: 29500.0 + tilt.tilt_angle,
				defocus_angle: 45.0,
				resolution: 8.5,
				fit_quality: 0.9,
				psd: Some(PathBuf::from(format!("{}/psd_{:+03}.mrc", ts.ts_id, tilt.tilt_angle as i64)))
			}))
			.collect()
	}
}


pub fn tomogram(ts_id: &str) -> Tomogram {
	let [x, y, z] = UNBINNED_SIZE;
	Tomogram {
		ts_id: ts_id.to_string(),
		path: Some(PathBuf::from(format!("tomograms/{}.mrc", ts_id))),
		dims: Dims::new(x, y, z).to_binned(relion_tomo::scale::Binning(BINNING)),
		sampling_rate: TOMO_PIXEL_SIZE,
		ts_sampling_rate: TS_PIXEL_SIZE,
		hand: -1.0,
		optics_group: "opticsGroup1".to_string(),
		origin: None,
		etomo_directive: None
	}
}


pub fn tomograms(ids: &[&str]) -> TomogramSet {
	TomogramSet::new(ids.iter().map(|id| tomogram(id)))
}


pub fn tomo_inputs(ids: &[&str]) -> TomoInputs {
	let tilt_series = ids.iter()
		.map(|id| tilt_series(id))
		.collect::<Vec<_>>();
	let ctfs = tilt_series.iter()
		.map(ctf_series)
		.collect();
	TomoInputs {
		tomograms: tomograms(ids),
		tilt_series,
		ctfs,
		doses: None
	}
}


pub fn pose(i: usize) -> RelionPose {
	let f = i as f64;
	RelionPose {
		rot: -170.0 + 37.0*f % 340.0,
		tilt: 10.0 + 23.0*f % 160.0,
		psi: -150.0 + 51.0*f % 300.0,
		shift_x: 1.5*f,
		shift_y: -2.0,
		shift_z: 0.5
	}
}


/// `n` coordinates spread through the tomogram, picked at the tomogram sampling
pub fn coordinates(ts_id: &str, n: usize) -> Vec<Coordinate3D> {
	(0 .. n)
		.map(|i| {
			let f = i as f64;
			let mut coord = Coordinate3D::new(ts_id, [20.0 + 17.0*f, 200.0 - 9.0*f, 10.0 + 5.0*f], TOMO_PIXEL_SIZE);
			coord.transform = Some(matrix_from_relion(&pose(i), TOMO_PIXEL_SIZE, GeometryConvention::Internal).unwrap());
			coord.extensions.set_class_number(1 + (i % 3) as i64);
			coord
		})
		.collect()
}


pub fn optics_group(dimensionality: Dimensionality, image_pixel_size: f64) -> OpticsGroup {
	OpticsGroup {
		number: 1,
		name: "opticsGroup1".to_string(),
		voltage: 300.0,
		cs: 2.7,
		amplitude_contrast: 0.1,
		original_pixel_size: TS_PIXEL_SIZE,
		ts_pixel_size: TS_PIXEL_SIZE,
		image_pixel_size,
		image_size: 64,
		dimensionality,
		ctf_premultiplied: dimensionality == Dimensionality::Stack2D
	}
}


/// `n` particles per tomogram, extracted at bin 2
pub fn particles(ids: &[&str], n: usize, dimensionality: Dimensionality) -> ParticleSet {

	let image_pixel_size = TS_PIXEL_SIZE*2.0;
	let ext = match dimensionality {
		Dimensionality::Stack2D => "mrcs",
		Dimensionality::Volume3D => "mrc"
	};

	let particles = ids.iter()
		.flat_map(|&ts_id| (0 .. n).map(move |i| (ts_id, i)))
		.map(|(ts_id, i)| {
			let f = i as f64;
			let id = i as i64 + 1;
			let path = format!("Subtomograms/{}/{}_data.{}", ts_id, id, ext);
			let mut p = PseudoSubtomogram::new(id, ts_id, path, [100.0 + 40.0*f, 800.0 - 30.0*f, 150.0 + 2.0*f]);
			p.transform = Some(matrix_from_relion(&pose(i), image_pixel_size, GeometryConvention::Internal).unwrap());
			if dimensionality == Dimensionality::Volume3D {
				p.ctf_path = Some(PathBuf::from(format!("Subtomograms/{}/{}_ctf.mrc", ts_id, id)));
			} else {
				p.visible_frames = (0 .. NUM_TILTS)
					.map(|t| if t < 3 { 0 } else { 1 })
					.collect();
			}
			p.extensions.set_class_number(1);
			p
		})
		.collect();

	ParticleSet {
		optics: vec![optics_group(dimensionality, image_pixel_size)],
		particles
	}
}
