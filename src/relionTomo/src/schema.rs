
// The catalog of STAR labels RELION tomography understands, and which of them each
// schema generation requires for each kind of table.

use std::fmt;
use std::str::FromStr;

use semver::Version;

use crate::error::{Error, Result};


#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub enum SchemaVersion {
	V3,
	V4,
	V5
}

impl SchemaVersion {

	pub const ALL: [SchemaVersion; 3] = [Self::V3, Self::V4, Self::V5];

	/// picks the schema written and read by a RELION binary of the given version
	pub fn for_binary(version: &Version) -> Result<Self> {
		match version.major {
			3 => Ok(Self::V3),
			4 => Ok(Self::V4),
			m if m >= 5 => Ok(Self::V5),
			_ => Err(Error::SchemaMismatch(format!("RELION {} has no tomography support", version)))
		}
	}

	pub fn name(&self) -> &'static str {
		match self {
			Self::V3 => "v3",
			Self::V4 => "v4",
			Self::V5 => "v5"
		}
	}

	pub fn registry(self) -> &'static SchemaRegistry {
		match self {
			Self::V3 => &REGISTRY_V3,
			Self::V4 => &REGISTRY_V4,
			Self::V5 => &REGISTRY_V5
		}
	}
}

impl fmt::Display for SchemaVersion {

	fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
		f.write_str(self.name())
	}
}

impl FromStr for SchemaVersion {

	type Err = Error;

	fn from_str(s: &str) -> Result<Self> {
		match s.trim().to_ascii_lowercase().as_str() {
			"v3" | "3" => Ok(Self::V3),
			"v4" | "4" => Ok(Self::V4),
			"v5" | "5" => Ok(Self::V5),
			_ => Err(Error::SchemaMismatch(format!("unrecognized schema: {}", s)))
		}
	}
}


#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum TableKind {
	/// per-tilt table of one tilt-series
	TiltSeries,
	/// one row per tomogram
	Tomograms,
	/// per-tilt table of one tomogram, stored next to the tomograms table (v4)
	TomogramTilts,
	Coordinates,
	Particles2D,
	Particles3D,
	Optics,
	OptimisationSet
}

impl TableKind {

	pub const ALL: [TableKind; 8] = [
		Self::TiltSeries,
		Self::Tomograms,
		Self::TomogramTilts,
		Self::Coordinates,
		Self::Particles2D,
		Self::Particles3D,
		Self::Optics,
		Self::OptimisationSet
	];

	/// the data block name, for tables that don't take their name from a tilt-series
	pub fn table_name(&self) -> Option<&'static str> {
		match self {
			Self::TiltSeries | Self::TomogramTilts => None,
			Self::Tomograms => Some("global"),
			Self::Coordinates | Self::Particles2D | Self::Particles3D => Some("particles"),
			Self::Optics => Some("optics"),
			Self::OptimisationSet => Some("optimisation_set")
		}
	}
}


#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ValueKind {
	Int,
	Float,
	Str
}


#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LabelOrigin {
	/// read and written by the RELION binaries
	Relion,
	/// carried along for the workflow manager, ignored by RELION
	Scipion
}


pub mod labels {

	// tomograms
	pub const TOMO_NAME: &str = "rlnTomoName";
	pub const TOMO_TILT_SERIES_NAME: &str = "rlnTomoTiltSeriesName";
	pub const TOMO_FRAME_COUNT: &str = "rlnTomoFrameCount";
	pub const TOMO_SIZE_X: &str = "rlnTomoSizeX";
	pub const TOMO_SIZE_Y: &str = "rlnTomoSizeY";
	pub const TOMO_SIZE_Z: &str = "rlnTomoSizeZ";
	pub const TOMO_HAND: &str = "rlnTomoHand";
	pub const TOMO_TS_PIXEL_SIZE: &str = "rlnTomoTiltSeriesPixelSize";
	pub const TOMO_TS_STAR_FILE: &str = "rlnTomoTiltSeriesStarFile";
	pub const TOMO_ETOMO_DIRECTIVE: &str = "rlnEtomoDirectiveFile";
	pub const TOMO_BINNING: &str = "rlnTomoTomogramBinning";
	pub const TOMO_RECONSTRUCTED: &str = "rlnTomoReconstructedTomogram";
	pub const TOMO_IMPORT_FRACTIONAL_DOSE: &str = "rlnTomoImportFractionalDose";
	pub const VOLTAGE: &str = "rlnVoltage";
	pub const CS: &str = "rlnSphericalAberration";
	pub const AMPLITUDE_CONTRAST: &str = "rlnAmplitudeContrast";
	pub const ORIGINAL_PIXEL_SIZE: &str = "rlnMicrographOriginalPixelSize";
	pub const DETECTOR_PIXEL_SIZE: &str = "rlnDetectorPixelSize";
	pub const MAGNIFICATION: &str = "rlnMagnification";

	// projections
	pub const TOMO_PROJ_X: &str = "rlnTomoProjX";
	pub const TOMO_PROJ_Y: &str = "rlnTomoProjY";
	pub const TOMO_PROJ_Z: &str = "rlnTomoProjZ";
	pub const TOMO_PROJ_W: &str = "rlnTomoProjW";

	// tilt images
	pub const MICROGRAPH_NAME: &str = "rlnMicrographName";
	pub const MICROGRAPH_MOVIE_NAME: &str = "rlnMicrographMovieName";
	pub const MICROGRAPH_NAME_EVEN: &str = "rlnMicrographNameEven";
	pub const MICROGRAPH_NAME_ODD: &str = "rlnMicrographNameOdd";
	pub const TILT_MOVIE_FRAME_COUNT: &str = "rlnTomoTiltMovieFrameCount";
	pub const NOMINAL_STAGE_TILT_ANGLE: &str = "rlnTomoNominalStageTiltAngle";
	pub const NOMINAL_TILT_AXIS_ANGLE: &str = "rlnTomoNominalTiltAxisAngle";
	pub const PRE_EXPOSURE: &str = "rlnMicrographPreExposure";
	pub const NOMINAL_DEFOCUS: &str = "rlnTomoNominalDefocus";
	pub const CTF_POWER_SPECTRUM: &str = "rlnCtfPowerSpectrum";
	pub const DEFOCUS_U: &str = "rlnDefocusU";
	pub const DEFOCUS_V: &str = "rlnDefocusV";
	pub const CTF_ASTIGMATISM: &str = "rlnCtfAstigmatism";
	pub const DEFOCUS_ANGLE: &str = "rlnDefocusAngle";
	pub const CTF_FIGURE_OF_MERIT: &str = "rlnCtfFigureOfMerit";
	pub const CTF_MAX_RESOLUTION: &str = "rlnCtfMaxResolution";
	pub const CTF_SCALE_FACTOR: &str = "rlnCtfScalefactor";
	pub const TOMO_X_TILT: &str = "rlnTomoXTilt";
	pub const TOMO_Y_TILT: &str = "rlnTomoYTilt";
	pub const TOMO_Z_ROT: &str = "rlnTomoZRot";
	pub const TOMO_X_SHIFT_ANGST: &str = "rlnTomoXShiftAngst";
	pub const TOMO_Y_SHIFT_ANGST: &str = "rlnTomoYShiftAngst";

	// particles
	pub const TOMO_PARTICLE_ID: &str = "rlnTomoParticleId";
	pub const TOMO_PARTICLE_NAME: &str = "rlnTomoParticleName";
	pub const TOMO_MANIFOLD_INDEX: &str = "rlnTomoManifoldIndex";
	pub const TOMO_VISIBLE_FRAMES: &str = "rlnTomoVisibleFrames";
	pub const COORD_X: &str = "rlnCoordinateX";
	pub const COORD_Y: &str = "rlnCoordinateY";
	pub const COORD_Z: &str = "rlnCoordinateZ";
	pub const CENTERED_COORD_X_ANGST: &str = "rlnCenteredCoordinateXAngst";
	pub const CENTERED_COORD_Y_ANGST: &str = "rlnCenteredCoordinateYAngst";
	pub const CENTERED_COORD_Z_ANGST: &str = "rlnCenteredCoordinateZAngst";
	pub const ORIGIN_X: &str = "rlnOriginX";
	pub const ORIGIN_Y: &str = "rlnOriginY";
	pub const ORIGIN_Z: &str = "rlnOriginZ";
	pub const ORIGIN_X_ANGST: &str = "rlnOriginXAngst";
	pub const ORIGIN_Y_ANGST: &str = "rlnOriginYAngst";
	pub const ORIGIN_Z_ANGST: &str = "rlnOriginZAngst";
	pub const ANGLE_ROT: &str = "rlnAngleRot";
	pub const ANGLE_TILT: &str = "rlnAngleTilt";
	pub const ANGLE_PSI: &str = "rlnAnglePsi";
	pub const ANGLE_TILT_PRIOR: &str = "rlnAngleTiltPrior";
	pub const ANGLE_PSI_PRIOR: &str = "rlnAnglePsiPrior";
	pub const SUBTOMO_ROT: &str = "rlnTomoSubtomogramRot";
	pub const SUBTOMO_TILT: &str = "rlnTomoSubtomogramTilt";
	pub const SUBTOMO_PSI: &str = "rlnTomoSubtomogramPsi";
	pub const IMAGE_NAME: &str = "rlnImageName";
	pub const CTF_IMAGE: &str = "rlnCtfImage";
	pub const GROUP_NUMBER: &str = "rlnGroupNumber";
	pub const CLASS_NUMBER: &str = "rlnClassNumber";
	pub const NORM_CORRECTION: &str = "rlnNormCorrection";
	pub const RANDOM_SUBSET: &str = "rlnRandomSubset";
	pub const LOG_LIKELIHOOD: &str = "rlnLogLikeliContribution";
	pub const MAX_PROB: &str = "rlnMaxValueProbDistribution";
	pub const N_SIGNIFICANT: &str = "rlnNrOfSignificantSamples";

	// optics
	pub const OPTICS_GROUP: &str = "rlnOpticsGroup";
	pub const OPTICS_GROUP_NAME: &str = "rlnOpticsGroupName";
	pub const IMAGE_PIXEL_SIZE: &str = "rlnImagePixelSize";
	pub const IMAGE_SIZE: &str = "rlnImageSize";
	pub const IMAGE_DIMENSIONALITY: &str = "rlnImageDimensionality";
	pub const SUBTOMO_BINNING: &str = "rlnTomoSubtomogramBinning";
	pub const CTF_PREMULTIPLIED: &str = "rlnCtfDataAreCtfPremultiplied";

	// optimisation set
	pub const OPT_TOMOGRAMS_FILE: &str = "rlnTomoTomogramsFile";
	pub const OPT_PARTICLES_FILE: &str = "rlnTomoParticlesFile";
	pub const OPT_TRAJECTORIES_FILE: &str = "rlnTomoTrajectoriesFile";
	pub const OPT_MANIFOLDS_FILE: &str = "rlnTomoManifoldsFile";
	pub const OPT_REFERENCE_MAP1_FILE: &str = "rlnTomoReferenceMap1File";
	pub const OPT_REFERENCE_MAP2_FILE: &str = "rlnTomoReferenceMap2File";
	pub const OPT_REFERENCE_MASK_FILE: &str = "rlnTomoReferenceMaskFile";
	pub const OPT_REFERENCE_FSC_FILE: &str = "rlnTomoReferenceFscFile";

	// scipion extensions
	pub const SCI_COORD_X: &str = "sciXCoord";
	pub const SCI_COORD_Y: &str = "sciYCoord";
	pub const SCI_COORD_Z: &str = "sciZCoord";
	pub const SCI_GROUP_ID: &str = "sciGroupId";
	pub const SCI_TILT_INDEX: &str = "sciTiltIndex";
	pub const SCI_PARTICLE_INDEX: &str = "sciParticleIndex";
	pub const SCI_PROJECTED_U: &str = "sciProjectedU";
	pub const SCI_PROJECTED_V: &str = "sciProjectedV";
}

use labels::*;


const INT_LABELS: &[&str] = &[
	TOMO_FRAME_COUNT, TOMO_SIZE_X, TOMO_SIZE_Y, TOMO_SIZE_Z,
	TILT_MOVIE_FRAME_COUNT,
	TOMO_PARTICLE_ID, TOMO_MANIFOLD_INDEX, GROUP_NUMBER, CLASS_NUMBER, RANDOM_SUBSET, N_SIGNIFICANT,
	OPTICS_GROUP, IMAGE_SIZE, IMAGE_DIMENSIONALITY, CTF_PREMULTIPLIED,
	SCI_GROUP_ID, SCI_TILT_INDEX, SCI_PARTICLE_INDEX
];

const FLOAT_LABELS: &[&str] = &[
	TOMO_HAND, TOMO_TS_PIXEL_SIZE, TOMO_BINNING, TOMO_IMPORT_FRACTIONAL_DOSE,
	VOLTAGE, CS, AMPLITUDE_CONTRAST, ORIGINAL_PIXEL_SIZE, DETECTOR_PIXEL_SIZE, MAGNIFICATION,
	NOMINAL_STAGE_TILT_ANGLE, NOMINAL_TILT_AXIS_ANGLE, PRE_EXPOSURE, NOMINAL_DEFOCUS,
	DEFOCUS_U, DEFOCUS_V, CTF_ASTIGMATISM, DEFOCUS_ANGLE, CTF_FIGURE_OF_MERIT, CTF_MAX_RESOLUTION, CTF_SCALE_FACTOR,
	TOMO_X_TILT, TOMO_Y_TILT, TOMO_Z_ROT, TOMO_X_SHIFT_ANGST, TOMO_Y_SHIFT_ANGST,
	COORD_X, COORD_Y, COORD_Z,
	CENTERED_COORD_X_ANGST, CENTERED_COORD_Y_ANGST, CENTERED_COORD_Z_ANGST,
	ORIGIN_X, ORIGIN_Y, ORIGIN_Z, ORIGIN_X_ANGST, ORIGIN_Y_ANGST, ORIGIN_Z_ANGST,
	ANGLE_ROT, ANGLE_TILT, ANGLE_PSI, ANGLE_TILT_PRIOR, ANGLE_PSI_PRIOR,
	SUBTOMO_ROT, SUBTOMO_TILT, SUBTOMO_PSI,
	NORM_CORRECTION, LOG_LIKELIHOOD, MAX_PROB,
	IMAGE_PIXEL_SIZE, SUBTOMO_BINNING,
	SCI_COORD_X, SCI_COORD_Y, SCI_COORD_Z, SCI_PROJECTED_U, SCI_PROJECTED_V
];


/// The numeric kind of a label. Labels not in the catalog are strings.
pub fn kind_of(label: &str) -> ValueKind {
	if INT_LABELS.contains(&label) {
		ValueKind::Int
	} else if FLOAT_LABELS.contains(&label) {
		ValueKind::Float
	} else {
		ValueKind::Str
	}
}

pub fn origin_of(label: &str) -> LabelOrigin {
	if label.starts_with("sci") {
		LabelOrigin::Scipion
	} else {
		LabelOrigin::Relion
	}
}


// column lists

const TILT_SERIES_V4: &[&str] = &[
	MICROGRAPH_MOVIE_NAME, TILT_MOVIE_FRAME_COUNT, NOMINAL_STAGE_TILT_ANGLE, NOMINAL_TILT_AXIS_ANGLE,
	PRE_EXPOSURE, NOMINAL_DEFOCUS, MICROGRAPH_NAME, CTF_IMAGE,
	DEFOCUS_U, DEFOCUS_V, CTF_ASTIGMATISM, DEFOCUS_ANGLE, CTF_FIGURE_OF_MERIT, CTF_MAX_RESOLUTION,
	CTF_SCALE_FACTOR
];

const TILT_SERIES_V5: &[&str] = &[
	MICROGRAPH_MOVIE_NAME, TILT_MOVIE_FRAME_COUNT, NOMINAL_STAGE_TILT_ANGLE, NOMINAL_TILT_AXIS_ANGLE,
	PRE_EXPOSURE, NOMINAL_DEFOCUS, MICROGRAPH_NAME, MICROGRAPH_NAME_EVEN, MICROGRAPH_NAME_ODD,
	CTF_IMAGE, CTF_POWER_SPECTRUM,
	DEFOCUS_U, DEFOCUS_V, CTF_ASTIGMATISM, DEFOCUS_ANGLE, CTF_FIGURE_OF_MERIT, CTF_MAX_RESOLUTION,
	CTF_SCALE_FACTOR,
	TOMO_X_TILT, TOMO_Y_TILT, TOMO_Z_ROT, TOMO_X_SHIFT_ANGST, TOMO_Y_SHIFT_ANGST
];

const TOMOGRAMS_V3: &[&str] = &[
	TOMO_NAME, MICROGRAPH_NAME, TOMO_SIZE_X, TOMO_SIZE_Y, TOMO_SIZE_Z, TOMO_HAND,
	VOLTAGE, CS, AMPLITUDE_CONTRAST, DETECTOR_PIXEL_SIZE, MAGNIFICATION
];

const TOMOGRAMS_V4: &[&str] = &[
	TOMO_NAME, TOMO_TILT_SERIES_NAME, TOMO_FRAME_COUNT, TOMO_SIZE_X, TOMO_SIZE_Y, TOMO_SIZE_Z,
	TOMO_HAND, OPTICS_GROUP_NAME, TOMO_TS_PIXEL_SIZE, VOLTAGE, CS, AMPLITUDE_CONTRAST,
	TOMO_IMPORT_FRACTIONAL_DOSE
];

const TOMOGRAMS_V5: &[&str] = &[
	TOMO_NAME, VOLTAGE, CS, AMPLITUDE_CONTRAST, ORIGINAL_PIXEL_SIZE, TOMO_HAND, OPTICS_GROUP_NAME,
	TOMO_TS_PIXEL_SIZE, TOMO_TS_STAR_FILE, TOMO_ETOMO_DIRECTIVE, TOMO_BINNING,
	TOMO_SIZE_X, TOMO_SIZE_Y, TOMO_SIZE_Z, TOMO_RECONSTRUCTED
];

const TOMOGRAM_TILTS_V4: &[&str] = &[
	TOMO_PROJ_X, TOMO_PROJ_Y, TOMO_PROJ_Z, TOMO_PROJ_W,
	DEFOCUS_U, DEFOCUS_V, DEFOCUS_ANGLE, CTF_SCALE_FACTOR, PRE_EXPOSURE
];

const COORDINATES_V3: &[&str] = &[
	MICROGRAPH_NAME, COORD_X, COORD_Y, COORD_Z, ORIGIN_X, ORIGIN_Y, ORIGIN_Z,
	ANGLE_ROT, ANGLE_TILT, ANGLE_PSI, CLASS_NUMBER, RANDOM_SUBSET,
	SCI_COORD_X, SCI_COORD_Y, SCI_COORD_Z, SCI_GROUP_ID
];

const COORDINATES_V4: &[&str] = &[
	TOMO_NAME, TOMO_PARTICLE_ID, TOMO_MANIFOLD_INDEX, COORD_X, COORD_Y, COORD_Z,
	ORIGIN_X_ANGST, ORIGIN_Y_ANGST, ORIGIN_Z_ANGST,
	ANGLE_ROT, ANGLE_TILT, ANGLE_PSI, CLASS_NUMBER, RANDOM_SUBSET,
	SCI_COORD_X, SCI_COORD_Y, SCI_COORD_Z, SCI_GROUP_ID
];

const PARTICLES_3D_V3: &[&str] = &[
	MICROGRAPH_NAME, COORD_X, COORD_Y, COORD_Z, IMAGE_NAME, CTF_IMAGE, MAGNIFICATION, DETECTOR_PIXEL_SIZE,
	ANGLE_ROT, ANGLE_TILT, ANGLE_PSI, ORIGIN_X, ORIGIN_Y, ORIGIN_Z,
	GROUP_NUMBER, CLASS_NUMBER, RANDOM_SUBSET
];

const PARTICLES_3D_V4: &[&str] = &[
	TOMO_NAME, SUBTOMO_ROT, SUBTOMO_TILT, SUBTOMO_PSI, ANGLE_ROT, ANGLE_TILT, ANGLE_PSI,
	ANGLE_TILT_PRIOR, ANGLE_PSI_PRIOR, OPTICS_GROUP, TOMO_PARTICLE_NAME, CTF_IMAGE, IMAGE_NAME,
	ORIGIN_X_ANGST, ORIGIN_Y_ANGST, ORIGIN_Z_ANGST,
	CENTERED_COORD_X_ANGST, CENTERED_COORD_Y_ANGST, CENTERED_COORD_Z_ANGST,
	GROUP_NUMBER, CLASS_NUMBER, NORM_CORRECTION, RANDOM_SUBSET,
	LOG_LIKELIHOOD, MAX_PROB, N_SIGNIFICANT
];

const PARTICLES_2D_V4: &[&str] = &[
	TOMO_NAME, SUBTOMO_ROT, SUBTOMO_TILT, SUBTOMO_PSI, ANGLE_ROT, ANGLE_TILT, ANGLE_PSI,
	ANGLE_TILT_PRIOR, ANGLE_PSI_PRIOR, OPTICS_GROUP, TOMO_PARTICLE_NAME, IMAGE_NAME,
	ORIGIN_X_ANGST, ORIGIN_Y_ANGST, ORIGIN_Z_ANGST,
	CENTERED_COORD_X_ANGST, CENTERED_COORD_Y_ANGST, CENTERED_COORD_Z_ANGST,
	GROUP_NUMBER, CLASS_NUMBER, NORM_CORRECTION, RANDOM_SUBSET,
	LOG_LIKELIHOOD, MAX_PROB, N_SIGNIFICANT
];

const PARTICLES_2D_V5: &[&str] = &[
	TOMO_NAME, SUBTOMO_ROT, SUBTOMO_TILT, SUBTOMO_PSI, ANGLE_ROT, ANGLE_TILT, ANGLE_PSI,
	ANGLE_TILT_PRIOR, ANGLE_PSI_PRIOR, OPTICS_GROUP, TOMO_PARTICLE_NAME, IMAGE_NAME,
	ORIGIN_X_ANGST, ORIGIN_Y_ANGST, ORIGIN_Z_ANGST,
	CENTERED_COORD_X_ANGST, CENTERED_COORD_Y_ANGST, CENTERED_COORD_Z_ANGST,
	GROUP_NUMBER, CLASS_NUMBER, NORM_CORRECTION, RANDOM_SUBSET,
	LOG_LIKELIHOOD, MAX_PROB, N_SIGNIFICANT, TOMO_VISIBLE_FRAMES
];

const OPTICS_V4: &[&str] = &[
	OPTICS_GROUP, OPTICS_GROUP_NAME, CS, VOLTAGE, AMPLITUDE_CONTRAST, ORIGINAL_PIXEL_SIZE,
	TOMO_TS_PIXEL_SIZE, IMAGE_PIXEL_SIZE, IMAGE_SIZE, IMAGE_DIMENSIONALITY, SUBTOMO_BINNING,
	CTF_PREMULTIPLIED
];

/// every label an optimisation set may carry, in write order; all but the first two are optional
pub const OPTIMISATION_SET: &[&str] = &[
	OPT_TOMOGRAMS_FILE, OPT_PARTICLES_FILE, OPT_TRAJECTORIES_FILE, OPT_MANIFOLDS_FILE,
	OPT_REFERENCE_MAP1_FILE, OPT_REFERENCE_MAP2_FILE, OPT_REFERENCE_MASK_FILE, OPT_REFERENCE_FSC_FILE
];


/// Labels whose values live in a record's extensions map and survive a STAR round trip
pub const ROUND_TRIP_EXTENSIONS: &[&str] = &[
	CLASS_NUMBER, RANDOM_SUBSET, SCI_GROUP_ID, SCI_COORD_X, SCI_COORD_Y, SCI_COORD_Z
];


/// The column catalog for one schema generation
#[derive(Debug)]
pub struct SchemaRegistry {
	version: SchemaVersion
}

static REGISTRY_V3: SchemaRegistry = SchemaRegistry { version: SchemaVersion::V3 };
static REGISTRY_V4: SchemaRegistry = SchemaRegistry { version: SchemaVersion::V4 };
static REGISTRY_V5: SchemaRegistry = SchemaRegistry { version: SchemaVersion::V5 };

impl SchemaRegistry {

	pub fn version(&self) -> SchemaVersion {
		self.version
	}

	/// the ordered column labels a table of this kind must have
	pub fn columns(&self, kind: TableKind) -> Result<&'static [&'static str]> {
		use SchemaVersion::*;
		let columns = match (kind, self.version) {
			(TableKind::TiltSeries, V3) => None,
			(TableKind::TiltSeries, V4) => Some(TILT_SERIES_V4),
			(TableKind::TiltSeries, V5) => Some(TILT_SERIES_V5),
			(TableKind::Tomograms, V3) => Some(TOMOGRAMS_V3),
			(TableKind::Tomograms, V4) => Some(TOMOGRAMS_V4),
			(TableKind::Tomograms, V5) => Some(TOMOGRAMS_V5),
			(TableKind::TomogramTilts, V4) => Some(TOMOGRAM_TILTS_V4),
			(TableKind::TomogramTilts, _) => None,
			(TableKind::Coordinates, V3) => Some(COORDINATES_V3),
			(TableKind::Coordinates, _) => Some(COORDINATES_V4),
			(TableKind::Particles3D, V3) => Some(PARTICLES_3D_V3),
			(TableKind::Particles3D, _) => Some(PARTICLES_3D_V4),
			(TableKind::Particles2D, V3) => None,
			(TableKind::Particles2D, V4) => Some(PARTICLES_2D_V4),
			(TableKind::Particles2D, V5) => Some(PARTICLES_2D_V5),
			(TableKind::Optics, V3) => None,
			(TableKind::Optics, _) => Some(OPTICS_V4),
			(TableKind::OptimisationSet, V3) => None,
			(TableKind::OptimisationSet, _) => Some(OPTIMISATION_SET)
		};
		columns.ok_or_else(|| Error::SchemaMismatch(format!("schema {} has no {:?} table", self.version, kind)))
	}

	pub fn kind_of(&self, label: &str) -> ValueKind {
		kind_of(label)
	}

	/// fails with SchemaMismatch naming the first required column the labels lack
	pub fn check_columns<'a>(&self, kind: TableKind, present: impl IntoIterator<Item=&'a str> + Clone) -> Result<()> {
		for required in self.columns(kind)? {
			if !present.clone().into_iter().any(|label| label == *required) {
				return Err(Error::SchemaMismatch(format!("{:?} table for schema {} lacks required column {}", kind, self.version, required)));
			}
		}
		Ok(())
	}
}


#[cfg(test)]
mod test {

	use galvanic_assert::{assert_that, matchers::*};

	use super::*;
	use super::labels::*;


	#[test]
	fn binaries() {
		assert_that!(&SchemaVersion::for_binary(&Version::new(3, 1, 4)).unwrap(), eq(SchemaVersion::V3));
		assert_that!(&SchemaVersion::for_binary(&Version::new(4, 0, 1)).unwrap(), eq(SchemaVersion::V4));
		assert_that!(&SchemaVersion::for_binary(&Version::new(5, 0, 0)).unwrap(), eq(SchemaVersion::V5));
		assert_that!(&SchemaVersion::for_binary(&Version::new(6, 2, 0)).unwrap(), eq(SchemaVersion::V5));
		assert_that!(&SchemaVersion::for_binary(&Version::new(2, 1, 0)).is_err(), eq(true));
	}


	#[test]
	fn parse_names() {
		assert_that!(&"v4".parse::<SchemaVersion>().unwrap(), eq(SchemaVersion::V4));
		assert_that!(&"5".parse::<SchemaVersion>().unwrap(), eq(SchemaVersion::V5));
		assert_that!(&" V3 ".parse::<SchemaVersion>().unwrap(), eq(SchemaVersion::V3));
		assert_that!(&"v7".parse::<SchemaVersion>().is_err(), eq(true));
	}


	#[test]
	fn kinds() {
		assert_that!(&kind_of(TOMO_SIZE_X), eq(ValueKind::Int));
		assert_that!(&kind_of(CLASS_NUMBER), eq(ValueKind::Int));
		assert_that!(&kind_of(COORD_X), eq(ValueKind::Float));
		assert_that!(&kind_of(TOMO_HAND), eq(ValueKind::Float));
		assert_that!(&kind_of(TOMO_NAME), eq(ValueKind::Str));
		assert_that!(&kind_of("rlnSomethingNew"), eq(ValueKind::Str));
		assert_that!(&origin_of(SCI_GROUP_ID), eq(LabelOrigin::Scipion));
		assert_that!(&origin_of(TOMO_NAME), eq(LabelOrigin::Relion));
	}


	#[test]
	fn generations_differ() {

		let v3 = SchemaVersion::V3.registry();
		let v4 = SchemaVersion::V4.registry();
		let v5 = SchemaVersion::V5.registry();

		// v3 had no tilt-series files and no 2D stacks
		assert_that!(&v3.columns(TableKind::TiltSeries).is_err(), eq(true));
		assert_that!(&v3.columns(TableKind::Particles2D).is_err(), eq(true));
		assert_that!(&v5.columns(TableKind::TomogramTilts).is_err(), eq(true));

		// v3 coordinates point to tomograms by file
		let coords = v3.columns(TableKind::Coordinates).unwrap();
		assert_that!(&coords.contains(&MICROGRAPH_NAME), eq(true));
		assert_that!(&coords.contains(&TOMO_NAME), eq(false));

		// only v5 tracks the tilts each particle is visible in
		assert_that!(&v4.columns(TableKind::Particles2D).unwrap().contains(&TOMO_VISIBLE_FRAMES), eq(false));
		assert_that!(&v5.columns(TableKind::Particles2D).unwrap().contains(&TOMO_VISIBLE_FRAMES), eq(true));

		// only v5 tomograms point to tilt-series files
		assert_that!(&v4.columns(TableKind::Tomograms).unwrap().contains(&TOMO_TS_STAR_FILE), eq(false));
		assert_that!(&v5.columns(TableKind::Tomograms).unwrap().contains(&TOMO_TS_STAR_FILE), eq(true));
	}


	#[test]
	fn no_duplicate_columns() {
		for version in SchemaVersion::ALL {
			for kind in TableKind::ALL {
				let Ok(columns) = version.registry().columns(kind)
					else { continue; };
				for (i, label) in columns.iter().enumerate() {
					assert_that!(&columns[i + 1 ..].contains(label), eq(false));
				}
			}
		}
	}


	#[test]
	fn check() {
		let registry = SchemaVersion::V4.registry();
		let columns = registry.columns(TableKind::Optics).unwrap();
		assert_that!(&registry.check_columns(TableKind::Optics, columns.iter().copied()).is_ok(), eq(true));
		let result = registry.check_columns(TableKind::Optics, columns[1 ..].iter().copied());
		assert_that!(&matches!(result, Err(Error::SchemaMismatch(..))), eq(true));
	}
}
