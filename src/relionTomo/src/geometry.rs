
// Pose conventions.
//
// In memory, a particle pose is a 4x4 homogeneous matrix that aligns the reference to the particle,
// with its translation in pixels at the particle's own sampling rate.
// RELION stores the inverse: ZYZ Euler angles (rot, tilt, psi) in degrees and an origin shift in Å
// that is the negated translation of the inverted matrix.

use nalgebra::{Matrix3, Matrix4, Vector3};

use crate::error::{Error, Result};


/// below this, the first and third Euler axes are treated as coincident
const EULER_EPSILON: f64 = 4.0*f64::EPSILON;


/// A pose the way RELION writes it
#[derive(Debug, Clone, Copy, PartialEq, Default)]
pub struct RelionPose {
	/// degrees
	pub rot: f64,
	pub tilt: f64,
	pub psi: f64,
	/// Å
	pub shift_x: f64,
	pub shift_y: f64,
	pub shift_z: f64
}

impl RelionPose {

	pub fn angles(&self) -> [f64; 3] {
		[self.rot, self.tilt, self.psi]
	}

	pub fn shifts(&self) -> [f64; 3] {
		[self.shift_x, self.shift_y, self.shift_z]
	}

	pub fn is_finite(&self) -> bool {
		self.angles().iter()
			.chain(self.shifts().iter())
			.all(|v| v.is_finite())
	}
}


/// Which way the in-memory matrix of a record points
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum GeometryConvention {
	/// the matrix aligns the reference to the particle; RELION's values are its inverse
	#[default]
	Internal,
	/// the matrix already holds RELION's transform and is used without inversion
	Relion
}


/// Rotation matrix for static-frame ZYZ Euler angles (radians)
pub fn euler_matrix_zyz(ai: f64, aj: f64, ak: f64) -> Matrix4<f64> {

	// the second axis of ZYZ is odd-parity, which negates every angle
	let (ai, aj, ak) = (-ai, -aj, -ak);
	let (si, sj, sk) = (ai.sin(), aj.sin(), ak.sin());
	let (ci, cj, ck) = (ai.cos(), aj.cos(), ak.cos());
	let (cc, cs) = (ci*ck, ci*sk);
	let (sc, ss) = (si*ck, si*sk);

	// axis indices: i = z, j = y, k = x
	let (i, j, k) = (2, 1, 0);
	let mut m = Matrix4::<f64>::identity();
	m[(i, i)] = cj;
	m[(i, j)] = sj*si;
	m[(i, k)] = sj*ci;
	m[(j, i)] = sj*sk;
	m[(j, j)] = -cj*ss + cc;
	m[(j, k)] = -cj*cs - sc;
	m[(k, i)] = -sj*ck;
	m[(k, j)] = cj*sc + cs;
	m[(k, k)] = cj*cc - ss;
	m
}


/// Static-frame ZYZ Euler angles (radians) of the rotation part of a matrix.
/// The middle angle comes back in [-π, 0], the image of a tilt in [0°, 180°].
pub fn euler_from_matrix_zyz(m: &Matrix4<f64>) -> [f64; 3] {

	let (i, j, k) = (2, 1, 0);
	let sy = (m[(i, j)]*m[(i, j)] + m[(i, k)]*m[(i, k)]).sqrt();
	let (ax, ay, az) = if sy > EULER_EPSILON {
		(
			m[(i, j)].atan2(m[(i, k)]),
			sy.atan2(m[(i, i)]),
			m[(j, i)].atan2(-m[(k, i)])
		)
	} else {
		// gimbal lock: fold the whole in-plane rotation into the first angle
		(
			(-m[(j, k)]).atan2(m[(j, j)]),
			sy.atan2(m[(i, i)]),
			0.0
		)
	};

	[-ax, -ay, -az]
}


pub fn translation_of(m: &Matrix4<f64>) -> Vector3<f64> {
	Vector3::new(m[(0, 3)], m[(1, 3)], m[(2, 3)])
}


pub fn invert(m: &Matrix4<f64>) -> Result<Matrix4<f64>> {
	m.try_inverse()
		.ok_or_else(|| Error::GeometryInconsistent {
			row: 0,
			tomo: String::new(),
			reason: format!("transform is singular (determinant {:e})", m.determinant())
		})
}


/// The in-memory matrix for a pose RELION wrote, with shifts in pixels at `sampling_rate`
pub fn matrix_from_relion(pose: &RelionPose, sampling_rate: f64, convention: GeometryConvention) -> Result<Matrix4<f64>> {

	if !pose.is_finite() {
		return Err(inconsistent(format!("non-finite pose {:?}", pose)));
	}
	if !(sampling_rate > 0.0) {
		return Err(inconsistent(format!("invalid sampling rate {}", sampling_rate)));
	}

	let shifts = Vector3::from(pose.shifts())/sampling_rate;
	let [rot, tilt, psi] = pose.angles()
		.map(|a| -a.to_radians());

	let mut m = euler_matrix_zyz(rot, tilt, psi);
	m[(0, 3)] = -shifts.x;
	m[(1, 3)] = -shifts.y;
	m[(2, 3)] = -shifts.z;

	match convention {
		GeometryConvention::Internal => invert(&m),
		GeometryConvention::Relion => Ok(m)
	}
}


/// The RELION pose for an in-memory matrix whose shifts are in pixels at `sampling_rate`
pub fn relion_from_matrix(m: &Matrix4<f64>, sampling_rate: f64, convention: GeometryConvention) -> Result<RelionPose> {

	if m.iter().any(|v| !v.is_finite()) {
		return Err(inconsistent("transform has non-finite entries".to_string()));
	}
	check_rotation(m)?;

	let m = match convention {
		GeometryConvention::Internal => invert(m)?,
		GeometryConvention::Relion => *m
	};

	let shifts = -translation_of(&m)*sampling_rate;
	let [rot, tilt, psi] = euler_from_matrix_zyz(&m)
		.map(|a| -a.to_degrees());

	Ok(RelionPose {
		rot,
		tilt,
		psi,
		shift_x: shifts.x,
		shift_y: shifts.y,
		shift_z: shifts.z
	})
}


/// the rotation block must be orthonormal for the angles to mean anything
fn check_rotation(m: &Matrix4<f64>) -> Result<()> {
	let r: Matrix3<f64> = m.fixed_view::<3, 3>(0, 0).into_owned();
	let err = (r.transpose()*r - Matrix3::identity()).amax();
	if err > 1e-3 {
		return Err(inconsistent(format!("rotation part is not orthonormal (error {:.3e})", err)));
	}
	Ok(())
}


fn inconsistent(reason: String) -> Error {
	Error::GeometryInconsistent {
		row: 0,
		tomo: String::new(),
		reason
	}
}


/// Attaches the row and tomogram a geometry error came from
pub fn at_row(e: Error, row: usize, tomo: &str) -> Error {
	match e {
		Error::GeometryInconsistent { reason, .. } => Error::GeometryInconsistent {
			row,
			tomo: tomo.to_string(),
			reason
		},
		e => e
	}
}


/// A pure translation, in pixels
pub fn translation_matrix(x: f64, y: f64, z: f64) -> Matrix4<f64> {
	let mut m = Matrix4::identity();
	m[(0, 3)] = x;
	m[(1, 3)] = y;
	m[(2, 3)] = z;
	m
}

/// Rotation about Z, degrees
pub fn rotation_z(degrees: f64) -> Matrix4<f64> {
	let (s, c) = degrees.to_radians().sin_cos();
	let mut m = Matrix4::identity();
	m[(0, 0)] = c;
	m[(0, 1)] = -s;
	m[(1, 0)] = s;
	m[(1, 1)] = c;
	m
}

/// Rotation about X, degrees
pub fn rotation_x(degrees: f64) -> Matrix4<f64> {
	let (s, c) = degrees.to_radians().sin_cos();
	let mut m = Matrix4::identity();
	m[(1, 1)] = c;
	m[(1, 2)] = -s;
	m[(2, 1)] = s;
	m[(2, 2)] = c;
	m
}

/// Rotation about Y, degrees
pub fn rotation_y(degrees: f64) -> Matrix4<f64> {
	let (s, c) = degrees.to_radians().sin_cos();
	let mut m = Matrix4::identity();
	m[(0, 0)] = c;
	m[(0, 2)] = s;
	m[(2, 0)] = -s;
	m[(2, 2)] = c;
	m
}


/// Moves a corner-origin position into the flipped frame: Y and Z swap first, then Z mirrors.
/// `dims` is the volume size in the unflipped frame, in the same units as the position.
pub fn apply_flips(pos: [f64; 3], dims: [f64; 3], flip_yz: bool, flip_z: bool) -> [f64; 3] {
	let [x, mut y, mut z] = pos;
	let mut size_z = dims[2];
	if flip_yz {
		std::mem::swap(&mut y, &mut z);
		size_z = dims[1];
	}
	if flip_z {
		z = size_z - z;
	}
	[x, y, z]
}

/// The inverse of [`apply_flips`]
pub fn undo_flips(pos: [f64; 3], dims: [f64; 3], flip_yz: bool, flip_z: bool) -> [f64; 3] {
	let [x, mut y, mut z] = pos;
	if flip_z {
		let size_z = if flip_yz { dims[1] } else { dims[2] };
		z = size_z - z;
	}
	if flip_yz {
		std::mem::swap(&mut y, &mut z);
	}
	[x, y, z]
}


#[cfg(test)]
mod test {

	use approx::assert_relative_eq;
	use galvanic_assert::{assert_that, matchers::*};

	use super::*;


	fn random_pose(rng: &mut fastrand::Rng) -> RelionPose {
		let mut angle = |lo: f64, hi: f64| lo + rng.f64()*(hi - lo);
		RelionPose {
			rot: angle(-179.0, 179.0),
			tilt: angle(1.0, 179.0),
			psi: angle(-179.0, 179.0),
			shift_x: angle(-50.0, 50.0),
			shift_y: angle(-50.0, 50.0),
			shift_z: angle(-50.0, 50.0)
		}
	}


	#[test]
	fn pose_to_matrix_and_back() {

		let mut rng = fastrand::Rng::with_seed(12345);

		for convention in [GeometryConvention::Internal, GeometryConvention::Relion] {
			for _ in 0 .. 200 {

				let pose = random_pose(&mut rng);
				let sampling = 0.5 + rng.f64()*10.0;

				let m = matrix_from_relion(&pose, sampling, convention).unwrap();
				let pose2 = relion_from_matrix(&m, sampling, convention).unwrap();

				// away from gimbal lock, the angles themselves come back
				assert_relative_eq!(pose2.rot, pose.rot, epsilon = 1e-6);
				assert_relative_eq!(pose2.tilt, pose.tilt, epsilon = 1e-6);
				assert_relative_eq!(pose2.psi, pose.psi, epsilon = 1e-6);
				assert_relative_eq!(pose2.shift_x, pose.shift_x, epsilon = 1e-6);
				assert_relative_eq!(pose2.shift_y, pose.shift_y, epsilon = 1e-6);
				assert_relative_eq!(pose2.shift_z, pose.shift_z, epsilon = 1e-6);

				let m2 = matrix_from_relion(&pose2, sampling, convention).unwrap();
				assert_relative_eq!(m2, m, epsilon = 1e-9);
			}
		}
	}


	#[test]
	fn matrix_to_pose_and_back() {

		let mut rng = fastrand::Rng::with_seed(42);

		for _ in 0 .. 200 {
			let m = matrix_from_relion(&random_pose(&mut rng), 1.0, GeometryConvention::Relion).unwrap();
			let sampling = 0.5 + rng.f64()*10.0;
			let pose = relion_from_matrix(&m, sampling, GeometryConvention::Internal).unwrap();
			let m2 = matrix_from_relion(&pose, sampling, GeometryConvention::Internal).unwrap();
			assert_relative_eq!(m2, m, epsilon = 1e-9);
		}
	}


	#[test]
	fn shift_only() {

		let pose = RelionPose {
			shift_x: 10.0,
			shift_y: -4.0,
			.. RelionPose::default()
		};

		// RELION's origin is the negated translation of the inverse
		let m = matrix_from_relion(&pose, 2.0, GeometryConvention::Internal).unwrap();
		assert_relative_eq!(m, translation_matrix(5.0, -2.0, 0.0), epsilon = 1e-12);

		let m = matrix_from_relion(&pose, 2.0, GeometryConvention::Relion).unwrap();
		assert_relative_eq!(m, translation_matrix(-5.0, 2.0, 0.0), epsilon = 1e-12);
	}


	#[test]
	fn gimbal_lock() {

		// tilt 0 only defines rot + psi
		let pose = RelionPose {
			rot: 30.0,
			tilt: 0.0,
			psi: 15.0,
			.. RelionPose::default()
		};
		let m = matrix_from_relion(&pose, 1.0, GeometryConvention::Internal).unwrap();
		let pose2 = relion_from_matrix(&m, 1.0, GeometryConvention::Internal).unwrap();
		assert_relative_eq!(pose2.tilt, 0.0, epsilon = 1e-9);
		assert_relative_eq!(pose2.rot + pose2.psi, 45.0, epsilon = 1e-9);
		let m2 = matrix_from_relion(&pose2, 1.0, GeometryConvention::Internal).unwrap();
		assert_relative_eq!(m2, m, epsilon = 1e-9);
	}


	#[test]
	fn bad_input() {

		let pose = RelionPose {
			rot: f64::NAN,
			.. RelionPose::default()
		};
		assert_that!(&matrix_from_relion(&pose, 1.0, GeometryConvention::Internal).is_err(), eq(true));
		assert_that!(&matrix_from_relion(&RelionPose::default(), 0.0, GeometryConvention::Internal).is_err(), eq(true));

		let mut skewed = Matrix4::identity();
		skewed[(0, 1)] = 0.5;
		assert_that!(&relion_from_matrix(&skewed, 1.0, GeometryConvention::Internal).is_err(), eq(true));

		let result = relion_from_matrix(&Matrix4::zeros(), 1.0, GeometryConvention::Internal);
		assert_that!(&matches!(result, Err(Error::GeometryInconsistent { .. })), eq(true));
	}


	#[test]
	fn flips() {

		let dims = [100.0, 200.0, 50.0];
		let pos = [10.0, 20.0, 30.0];

		assert_that!(&apply_flips(pos, dims, false, false), eq(pos));
		assert_that!(&apply_flips(pos, dims, true, false), eq([10.0, 30.0, 20.0]));
		assert_that!(&apply_flips(pos, dims, false, true), eq([10.0, 20.0, 20.0]));
		// swap first, then mirror along the new Z, which was Y
		assert_that!(&apply_flips(pos, dims, true, true), eq([10.0, 30.0, 180.0]));

		for (flip_yz, flip_z) in [(false, false), (true, false), (false, true), (true, true)] {
			let flipped = apply_flips(pos, dims, flip_yz, flip_z);
			assert_that!(&undo_flips(flipped, dims, flip_yz, flip_z), eq(pos));
		}
	}


	#[test]
	fn rotations() {
		let p = rotation_z(90.0)*nalgebra::Vector4::new(1.0, 0.0, 0.0, 1.0);
		assert_relative_eq!(p, nalgebra::Vector4::new(0.0, 1.0, 0.0, 1.0), epsilon = 1e-12);
		let p = rotation_y(90.0)*nalgebra::Vector4::new(1.0, 0.0, 0.0, 1.0);
		assert_relative_eq!(p, nalgebra::Vector4::new(0.0, 0.0, -1.0, 1.0), epsilon = 1e-12);
		let p = rotation_x(90.0)*nalgebra::Vector4::new(0.0, 1.0, 0.0, 1.0);
		assert_relative_eq!(p, nalgebra::Vector4::new(0.0, 0.0, 1.0, 1.0), epsilon = 1e-12);
	}
}
