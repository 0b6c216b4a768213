
// Lengths carry their unit in the type: Å, pixels at the unbinned tilt-series sampling,
// or pixels at some binned sampling. Binning factors are real-valued,
// since coordinates can be picked on tomograms of any pixel size.

use crate::error::{Error, Result};


/// A length in Å
#[derive(Debug, Clone, Copy, PartialEq, PartialOrd, Default)]
pub struct ValueA(pub f64);

impl ValueA {

	pub fn to_unbinned(self, pixel_size: PixelSize) -> ValueUnbinnedF {
		ValueUnbinnedF(self.0/pixel_size.0)
	}
}


/// A length in pixels at the unbinned (bin-1) tilt-series sampling
#[derive(Debug, Clone, Copy, PartialEq, PartialOrd, Default)]
pub struct ValueUnbinnedF(pub f64);

impl ValueUnbinnedF {

	pub fn to_binned(self, binning: Binning) -> ValueBinnedF {
		ValueBinnedF(self.0/binning.0)
	}

	pub fn to_a(self, pixel_size: PixelSize) -> ValueA {
		ValueA(self.0*pixel_size.0)
	}
}


/// A length in pixels at a binned sampling
#[derive(Debug, Clone, Copy, PartialEq, PartialOrd, Default)]
pub struct ValueBinnedF(pub f64);

impl ValueBinnedF {

	pub fn to_unbinned(self, binning: Binning) -> ValueUnbinnedF {
		ValueUnbinnedF(self.0*binning.0)
	}
}


/// Sampling rate, in Å per pixel
#[derive(Debug, Clone, Copy, PartialEq, PartialOrd)]
pub struct PixelSize(pub f64);

impl PixelSize {

	pub fn new(angstroms_per_pixel: f64) -> Result<Self> {
		if angstroms_per_pixel.is_finite() && angstroms_per_pixel > 0.0 {
			Ok(Self(angstroms_per_pixel))
		} else {
			Err(Error::StepPreconditionFailed(format!("invalid sampling rate: {}", angstroms_per_pixel)))
		}
	}

	/// the pixel size after binning by the given factor
	pub fn binned(self, binning: Binning) -> PixelSize {
		PixelSize(self.0*binning.0)
	}
}


/// Ratio of a binned sampling rate to the unbinned one: current = unbinned × binning
#[derive(Debug, Clone, Copy, PartialEq, PartialOrd)]
pub struct Binning(pub f64);

impl Binning {

	pub const NONE: Binning = Binning(1.0);

	pub fn between(current: PixelSize, unbinned: PixelSize) -> Self {
		Self(current.0/unbinned.0)
	}

	pub fn new(factor: f64) -> Result<Self> {
		if factor.is_finite() && factor > 0.0 {
			Ok(Self(factor))
		} else {
			Err(Error::StepPreconditionFailed(format!("invalid binning factor: {}", factor)))
		}
	}

	pub fn inverse(self) -> Self {
		Self(1.0/self.0)
	}
}


/// Tomogram size in pixels, at whatever sampling the tomogram has
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct Dims {
	pub x: u32,
	pub y: u32,
	pub z: u32
}

impl Dims {

	pub fn new(x: u32, y: u32, z: u32) -> Self {
		Self { x, y, z }
	}

	/// the size of the same volume at bin 1
	pub fn to_unbinned(self, binning: Binning) -> Dims {
		let scale = |v: u32| (v as f64*binning.0).round() as u32;
		Dims {
			x: scale(self.x),
			y: scale(self.y),
			z: scale(self.z)
		}
	}

	pub fn to_binned(self, binning: Binning) -> Dims {
		self.to_unbinned(binning.inverse())
	}

	pub fn center(&self) -> [f64; 3] {
		[self.x as f64/2.0, self.y as f64/2.0, self.z as f64/2.0]
	}

	pub fn swap_yz(self) -> Dims {
		Dims {
			x: self.x,
			y: self.z,
			z: self.y
		}
	}
}


#[cfg(test)]
mod test {

	use approx::assert_relative_eq;
	use galvanic_assert::{assert_that, matchers::*};

	use super::*;


	#[test]
	fn lengths() {

		let ts = PixelSize::new(1.35).unwrap();
		let binning = Binning::between(PixelSize(5.4), ts);
		assert_relative_eq!(binning.0, 4.0, epsilon = 1e-12);

		let binned = ValueBinnedF(100.0);
		let unbinned = binned.to_unbinned(binning);
		assert_relative_eq!(unbinned.0, 400.0, epsilon = 1e-9);
		assert_relative_eq!(unbinned.to_a(ts).0, 540.0, epsilon = 1e-9);
		assert_relative_eq!(ValueA(540.0).to_unbinned(ts).to_binned(binning).0, 100.0, epsilon = 1e-9);
	}


	#[test]
	fn dims() {
		let dims = Dims::new(250, 250, 75);
		assert_that!(&dims.to_unbinned(Binning(4.0)), eq(Dims::new(1000, 1000, 300)));
		assert_that!(&Dims::new(1000, 1000, 300).to_binned(Binning(4.0)), eq(dims));
		assert_that!(&dims.swap_yz(), eq(Dims::new(250, 75, 250)));
		assert_that!(&dims.center(), eq([125.0, 125.0, 37.5]));
	}


	#[test]
	fn invalid() {
		assert_that!(&PixelSize::new(0.0).is_err(), eq(true));
		assert_that!(&PixelSize::new(f64::NAN).is_err(), eq(true));
		assert_that!(&Binning::new(-2.0).is_err(), eq(true));
		assert_that!(&Binning::new(2.0).unwrap().inverse(), eq(Binning(0.5)));
	}
}
