
// The workflow manager's object model, as flat records keyed by tilt-series id.

use std::collections::{BTreeMap, HashMap};
use std::path::{Path, PathBuf};

use nalgebra::{Matrix3, Matrix4};

use crate::error::{Error, Result};
use crate::scale::{Binning, Dims, PixelSize};
use crate::schema::labels::*;
use crate::star::Value;


/// Marks a path or file column whose file doesn't exist, the way RELION does
pub const FILE_NOT_FOUND: &str = "FileNotFound";


#[derive(Debug, Clone, PartialEq)]
pub struct TiltImage {
	/// 1 for the first image acquired
	pub acq_order: u32,
	/// degrees
	pub tilt_angle: f64,
	pub micrograph: PathBuf,
	pub movie: Option<PathBuf>,
	pub even: Option<PathBuf>,
	pub odd: Option<PathBuf>,
	/// 2D rigid alignment of the image, translation in pixels at the tilt-series sampling
	pub transform: Option<Matrix3<f64>>,
	pub frame_count: u32,
	/// e/Å², when the acquisition recorded it per image
	pub dose: Option<f64>,
	/// µm
	pub nominal_defocus: f64,
	/// false for excluded views
	pub enabled: bool
}

impl TiltImage {

	pub fn new(acq_order: u32, tilt_angle: f64, micrograph: impl Into<PathBuf>) -> Self {
		Self {
			acq_order,
			tilt_angle,
			micrograph: micrograph.into(),
			movie: None,
			even: None,
			odd: None,
			transform: None,
			frame_count: 1,
			dose: None,
			nominal_defocus: 0.0,
			enabled: true
		}
	}

	/// the X,Y alignment shift in pixels
	pub fn shift_px(&self) -> [f64; 2] {
		match &self.transform {
			Some(m) => [m[(0, 2)], m[(1, 2)]],
			None => [0.0, 0.0]
		}
	}

	/// the in-plane rotation of the alignment, in degrees
	pub fn rotation_deg(&self) -> Option<f64> {
		self.transform.as_ref()
			.map(|m| m[(1, 0)].atan2(m[(0, 0)]).to_degrees())
	}

	pub fn ctf_scale_factor(&self) -> f64 {
		self.tilt_angle.abs().to_radians().cos()
	}
}


#[derive(Debug, Clone, PartialEq)]
pub struct TiltSeries {
	pub ts_id: String,
	/// Å/px
	pub sampling_rate: f64,
	/// kV
	pub voltage: f64,
	/// mm
	pub cs: f64,
	pub amplitude_contrast: f64,
	/// degrees
	pub tilt_axis_angle: f64,
	/// e/Å²
	pub dose_per_tilt: f64,
	pub initial_dose: f64,
	/// size of each tilt image, in pixels
	pub image_size: (u32, u32),
	/// the aligned stack, when one exists
	pub stack: Option<PathBuf>,
	pub tilts: Vec<TiltImage>
}

impl TiltSeries {

	pub fn pixel_size(&self) -> Result<PixelSize> {
		PixelSize::new(self.sampling_rate)
	}

	pub fn enabled_tilts(&self) -> impl Iterator<Item=(usize,&TiltImage)> {
		self.tilts.iter()
			.enumerate()
			.filter(|(_, tilt)| tilt.enabled)
	}

	pub fn image_center(&self) -> [f64; 2] {
		[self.image_size.0 as f64/2.0, self.image_size.1 as f64/2.0]
	}
}


#[derive(Debug, Clone, PartialEq)]
pub struct CtfTilt {
	/// Å
	pub defocus_u: f64,
	pub defocus_v: f64,
	/// degrees
	pub defocus_angle: f64,
	/// Å
	pub resolution: f64,
	pub fit_quality: f64,
	/// the power spectrum the estimate was fitted on
	pub psd: Option<PathBuf>
}

impl CtfTilt {

	pub fn astigmatism(&self) -> f64 {
		(self.defocus_u - self.defocus_v).abs()
	}
}


/// Per-tilt CTF estimates, indexed like the tilts of the tilt-series
#[derive(Debug, Clone, PartialEq, Default)]
pub struct CtfSeries {
	pub ts_id: String,
	pub tilts: Vec<Option<CtfTilt>>
}

impl CtfSeries {

	pub fn tilt(&self, index: usize) -> Option<&CtfTilt> {
		self.tilts.get(index)
			.and_then(Option::as_ref)
	}
}


#[derive(Debug, Clone, PartialEq)]
pub struct Tomogram {
	pub ts_id: String,
	pub path: Option<PathBuf>,
	/// at the tomogram's own sampling
	pub dims: Dims,
	/// Å/px of the tomogram
	pub sampling_rate: f64,
	/// Å/px of the tilt-series it was reconstructed from
	pub ts_sampling_rate: f64,
	/// +1 or -1
	pub hand: f64,
	pub optics_group: String,
	/// shift of the volume origin, in Å
	pub origin: Option<[f64; 3]>,
	pub etomo_directive: Option<PathBuf>
}

impl Tomogram {

	/// tomogram sampling = tilt-series sampling × binning
	pub fn binning(&self) -> Binning {
		Binning::between(PixelSize(self.sampling_rate), PixelSize(self.ts_sampling_rate))
	}

	pub fn ts_pixel_size(&self) -> Result<PixelSize> {
		PixelSize::new(self.ts_sampling_rate)
	}

	pub fn unbinned_dims(&self) -> Dims {
		self.dims.to_unbinned(self.binning())
	}
}


/// The tomograms of one step, indexed by tilt-series id
#[derive(Debug, Clone, Default, PartialEq)]
pub struct TomogramSet {
	tomograms: Vec<Tomogram>,
	index: HashMap<String,usize>
}

impl TomogramSet {

	pub fn new(tomograms: impl IntoIterator<Item=Tomogram>) -> Self {
		let mut set = Self::default();
		for tomo in tomograms {
			set.push(tomo);
		}
		set
	}

	/// adds a tomogram, replacing any with the same tilt-series id
	pub fn push(&mut self, tomo: Tomogram) {
		match self.index.get(&tomo.ts_id) {
			Some(&i) => self.tomograms[i] = tomo,
			None => {
				self.index.insert(tomo.ts_id.clone(), self.tomograms.len());
				self.tomograms.push(tomo);
			}
		}
	}

	pub fn get(&self, ts_id: &str) -> Option<&Tomogram> {
		self.index.get(ts_id)
			.map(|&i| &self.tomograms[i])
	}

	pub fn require(&self, ts_id: &str) -> Result<&Tomogram> {
		self.get(ts_id)
			.ok_or_else(|| Error::UnknownTomogram(ts_id.to_string()))
	}

	/// v3 files name tomograms by path instead of by id
	pub fn find_by_path(&self, path: &Path) -> Option<&Tomogram> {
		self.tomograms.iter()
			.find(|t| t.path.as_deref() == Some(path))
			.or_else(|| {
				let stem = path.file_stem()?.to_string_lossy();
				self.get(&stem)
			})
	}

	pub fn iter(&self) -> impl Iterator<Item=&Tomogram> {
		self.tomograms.iter()
	}

	pub fn len(&self) -> usize {
		self.tomograms.len()
	}

	pub fn is_empty(&self) -> bool {
		self.tomograms.is_empty()
	}
}


/// Extra per-record values the workflow manager attaches and expects back
#[derive(Debug, Clone, Default, PartialEq)]
pub struct Extensions {
	values: BTreeMap<String,Value>
}

impl Extensions {

	pub fn get(&self, label: &str) -> Option<&Value> {
		self.values.get(label)
	}

	pub fn set(&mut self, label: impl Into<String>, value: impl Into<Value>) {
		self.values.insert(label.into(), value.into());
	}

	pub fn remove(&mut self, label: &str) -> Option<Value> {
		self.values.remove(label)
	}

	pub fn iter(&self) -> impl Iterator<Item=(&str,&Value)> {
		self.values.iter()
			.map(|(k, v)| (k.as_str(), v))
	}

	fn int(&self, label: &str) -> Option<i64> {
		self.get(label)
			.and_then(|v| v.as_i64().or_else(|| v.as_f64().map(|f| f as i64)))
	}

	pub fn class_number(&self) -> Option<i64> {
		self.int(CLASS_NUMBER)
	}

	pub fn set_class_number(&mut self, class: i64) {
		self.set(CLASS_NUMBER, class);
	}

	pub fn random_subset(&self) -> Option<i64> {
		self.int(RANDOM_SUBSET)
	}

	pub fn set_random_subset(&mut self, subset: i64) {
		self.set(RANDOM_SUBSET, subset);
	}

	pub fn group_id(&self) -> Option<i64> {
		self.int(SCI_GROUP_ID)
	}

	pub fn set_group_id(&mut self, group: i64) {
		self.set(SCI_GROUP_ID, group);
	}

	/// the coordinate as the picker gave it, before any rescaling
	pub fn native_coords(&self) -> Option<[f64; 3]> {
		let x = self.get(SCI_COORD_X)?.as_f64()?;
		let y = self.get(SCI_COORD_Y)?.as_f64()?;
		let z = self.get(SCI_COORD_Z)?.as_f64()?;
		Some([x, y, z])
	}

	pub fn set_native_coords(&mut self, [x, y, z]: [f64; 3]) {
		self.set(SCI_COORD_X, x);
		self.set(SCI_COORD_Y, y);
		self.set(SCI_COORD_Z, z);
	}
}


#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum CoordOrigin {
	/// pixel (0,0,0) is the corner of the volume, as RELION expects
	#[default]
	BottomLeftCorner,
	/// pixel (0,0,0) is the center of the volume
	Center
}


#[derive(Debug, Clone, PartialEq)]
pub struct Coordinate3D {
	pub tomo_id: String,
	/// pixels at `sampling_rate`
	pub x: f64,
	pub y: f64,
	pub z: f64,
	pub origin: CoordOrigin,
	/// Å/px the coordinate was picked at
	pub sampling_rate: f64,
	/// orientation, in the convention of the conversion options
	pub transform: Option<Matrix4<f64>>,
	pub particle_id: Option<i64>,
	pub manifold_index: Option<i64>,
	pub extensions: Extensions
}

impl Coordinate3D {

	pub fn new(tomo_id: impl Into<String>, [x, y, z]: [f64; 3], sampling_rate: f64) -> Self {
		Self {
			tomo_id: tomo_id.into(),
			x,
			y,
			z,
			origin: CoordOrigin::BottomLeftCorner,
			sampling_rate,
			transform: None,
			particle_id: None,
			manifold_index: None,
			extensions: Extensions::default()
		}
	}

	pub fn position(&self) -> [f64; 3] {
		[self.x, self.y, self.z]
	}
}


#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum Dimensionality {
	/// a stack of 2D patches, one per tilt
	#[default]
	Stack2D,
	/// one 3D subtomogram
	Volume3D
}

impl Dimensionality {

	pub fn as_int(&self) -> i64 {
		match self {
			Self::Stack2D => 2,
			Self::Volume3D => 3
		}
	}

	pub fn from_int(i: i64) -> Option<Self> {
		match i {
			2 => Some(Self::Stack2D),
			3 => Some(Self::Volume3D),
			_ => None
		}
	}
}


#[derive(Debug, Clone, PartialEq)]
pub struct OpticsGroup {
	/// 1-based
	pub number: i64,
	pub name: String,
	pub voltage: f64,
	pub cs: f64,
	pub amplitude_contrast: f64,
	pub original_pixel_size: f64,
	pub ts_pixel_size: f64,
	/// Å/px of the particle images
	pub image_pixel_size: f64,
	pub image_size: u32,
	pub dimensionality: Dimensionality,
	pub ctf_premultiplied: bool
}

impl OpticsGroup {

	pub fn binning(&self) -> Binning {
		Binning::between(PixelSize(self.image_pixel_size), PixelSize(self.ts_pixel_size))
	}
}


/// A particle image RELION extracted, with its alignment
#[derive(Debug, Clone, PartialEq)]
pub struct PseudoSubtomogram {
	pub particle_id: i64,
	pub ts_id: String,
	pub path: PathBuf,
	pub ctf_path: Option<PathBuf>,
	/// bin-1 pixels, corner origin
	pub coords: [f64; 3],
	/// refined pose, translation in pixels at the optics group's image sampling
	pub transform: Option<Matrix4<f64>>,
	/// degrees
	pub tilt_prior: Option<f64>,
	pub psi_prior: Option<f64>,
	pub subtomo_angles: [f64; 3],
	pub manifold_index: i64,
	pub optics_group: i64,
	pub group_number: i64,
	pub norm_correction: f64,
	pub log_likelihood: f64,
	pub max_prob: f64,
	pub n_significant: i64,
	/// one entry per tilt, 1 where the particle is visible
	pub visible_frames: Vec<u8>,
	pub extensions: Extensions
}

impl PseudoSubtomogram {

	pub fn new(particle_id: i64, ts_id: impl Into<String>, path: impl Into<PathBuf>, coords: [f64; 3]) -> Self {
		Self {
			particle_id,
			ts_id: ts_id.into(),
			path: path.into(),
			ctf_path: None,
			coords,
			transform: None,
			tilt_prior: None,
			psi_prior: None,
			subtomo_angles: [0.0; 3],
			manifold_index: 1,
			optics_group: 1,
			group_number: 1,
			norm_correction: 1.0,
			log_likelihood: 0.0,
			max_prob: 0.0,
			n_significant: 0,
			visible_frames: Vec::new(),
			extensions: Extensions::default()
		}
	}

	/// the name RELION gives the particle: `<tomo>/<id>`
	pub fn name(&self) -> String {
		format!("{}/{}", self.ts_id, self.particle_id)
	}

	pub fn visible_frame_count(&self) -> usize {
		self.visible_frames.iter()
			.filter(|&&v| v != 0)
			.count()
	}
}


#[derive(Debug, Clone, PartialEq, Default)]
pub struct ParticleSet {
	pub optics: Vec<OpticsGroup>,
	pub particles: Vec<PseudoSubtomogram>
}

impl ParticleSet {

	pub fn optics_group(&self, number: i64) -> Option<&OpticsGroup> {
		self.optics.iter()
			.find(|g| g.number == number)
	}

	pub fn dimensionality(&self) -> Dimensionality {
		self.optics.first()
			.map(|g| g.dimensionality)
			.unwrap_or_default()
	}
}


/// The STAR files one pipeline stage produced, for the next stage to find
#[derive(Debug, Clone, PartialEq, Default)]
pub struct OptimisationSet {
	pub tomograms: PathBuf,
	pub particles: PathBuf,
	pub trajectories: Option<PathBuf>,
	pub manifolds: Option<PathBuf>,
	pub reference_map1: Option<PathBuf>,
	pub reference_map2: Option<PathBuf>,
	pub reference_mask: Option<PathBuf>,
	pub reference_fsc: Option<PathBuf>
}

impl OptimisationSet {

	pub fn new(tomograms: impl Into<PathBuf>, particles: impl Into<PathBuf>) -> Self {
		Self {
			tomograms: tomograms.into(),
			particles: particles.into(),
			.. Self::default()
		}
	}

	/// every path in the set, labelled, in write order
	pub fn entries(&self) -> Vec<(&'static str, &Path)> {
		let mut entries = vec![
			(OPT_TOMOGRAMS_FILE, self.tomograms.as_path()),
			(OPT_PARTICLES_FILE, self.particles.as_path())
		];
		let optional = [
			(OPT_TRAJECTORIES_FILE, &self.trajectories),
			(OPT_MANIFOLDS_FILE, &self.manifolds),
			(OPT_REFERENCE_MAP1_FILE, &self.reference_map1),
			(OPT_REFERENCE_MAP2_FILE, &self.reference_map2),
			(OPT_REFERENCE_MASK_FILE, &self.reference_mask),
			(OPT_REFERENCE_FSC_FILE, &self.reference_fsc)
		];
		for (label, path) in optional {
			if let Some(path) = path {
				entries.push((label, path.as_path()));
			}
		}
		entries
	}
}
