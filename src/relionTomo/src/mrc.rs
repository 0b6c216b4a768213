
// MRC file (from the Medical Research Council, in the UK)
// https://en.wikipedia.org/wiki/MRC_(file_format)

// format specification:
// https://www.ccpem.ac.uk/mrc_format/mrc2014.php

use std::fs::{File, OpenOptions};
use std::io::{BufWriter, Cursor, Read, Seek, SeekFrom, Write};
use std::path::Path;

use byteorder::{ByteOrder, ReadBytesExt, WriteBytesExt, BE, LE};
use tracing::{debug, info};

use crate::error::{Error, Result};


pub const HEADER_SIZE: usize = 1024;

/// byte offset of ISPG (word 23)
const ISPG_OFFSET: u64 = 4*22;

/// space group 0 means a stack of 2D images, 1 a single volume
pub const ISPG_IMAGE_STACK: i32 = 0;
pub const ISPG_VOLUME: i32 = 1;

const MACHST_LE: [u8; 4] = [0x44, 0x44, 0x00, 0x00];
const MACHST_BE: [u8; 4] = [0x11, 0x11, 0x00, 0x00];


#[derive(Debug, Clone, PartialEq)]
pub struct MrcHeader {
	pub nx: i32,
	pub ny: i32,
	pub nz: i32,
	pub mode: i32,
	/// sampling along each axis
	pub mx: i32,
	pub my: i32,
	pub mz: i32,
	/// cell dimensions, in Å
	pub cella: [f32; 3],
	pub ispg: i32,
	pub nsymbt: i32,
	pub big_endian: bool
}

impl MrcHeader {

	pub fn read(path: impl AsRef<Path>) -> Result<Self> {

		let path = path.as_ref();
		let mut file = File::open(path)
			.map_err(|e| match e.kind() {
				std::io::ErrorKind::NotFound => Error::FileNotFound(path.to_path_buf()),
				_ => Error::io(path, e)
			})?;

		let mut buf = [0u8; HEADER_SIZE];
		file.read_exact(&mut buf)
			.map_err(|e| Error::io(path, e))?;

		Self::parse(&buf)
			.map_err(|e| Error::io(path, e))
	}

	pub fn parse(buf: &[u8; HEADER_SIZE]) -> std::io::Result<Self> {

		// the machine stamp is word 54
		let big_endian = buf[212 .. 216] == MACHST_BE;
		if big_endian {
			Self::parse_as::<BE>(buf, true)
		} else {
			Self::parse_as::<LE>(buf, false)
		}
	}

	fn parse_as<B:ByteOrder>(buf: &[u8; HEADER_SIZE], big_endian: bool) -> std::io::Result<Self> {

		let mut r = Cursor::new(&buf[..]);

		// words 1-4
		let nx = r.read_i32::<B>()?;
		let ny = r.read_i32::<B>()?;
		let nz = r.read_i32::<B>()?;
		let mode = r.read_i32::<B>()?;

		// skip nxstart, nystart, nzstart, then words 8-13
		r.seek(SeekFrom::Start(4*7))?;
		let mx = r.read_i32::<B>()?;
		let my = r.read_i32::<B>()?;
		let mz = r.read_i32::<B>()?;
		let cella = [r.read_f32::<B>()?, r.read_f32::<B>()?, r.read_f32::<B>()?];

		// words 23-24
		r.seek(SeekFrom::Start(ISPG_OFFSET))?;
		let ispg = r.read_i32::<B>()?;
		let nsymbt = r.read_i32::<B>()?;

		Ok(Self {
			nx,
			ny,
			nz,
			mode,
			mx,
			my,
			mz,
			cella,
			ispg,
			nsymbt,
			big_endian
		})
	}

	/// Å per voxel along X, or None if the header doesn't say
	pub fn voxel_size(&self) -> Option<f64> {
		if self.mx > 0 && self.cella[0] > 0.0 {
			Some(self.cella[0] as f64/self.mx as f64)
		} else {
			None
		}
	}

	pub fn is_image_stack(&self) -> bool {
		self.ispg == ISPG_IMAGE_STACK
	}
}


/// Rewrites the space group of a single-volume file that claims to be an image stack.
/// Returns true if the header was changed.
pub fn fix_volume_header(path: impl AsRef<Path>) -> Result<bool> {

	let path = path.as_ref();
	let header = MrcHeader::read(path)?;
	if !header.is_image_stack() {
		return Ok(false);
	}

	let mut file = OpenOptions::new()
		.write(true)
		.open(path)
		.map_err(|e| Error::io(path, e))?;
	file.seek(SeekFrom::Start(ISPG_OFFSET))
		.map_err(|e| Error::io(path, e))?;
	let result = if header.big_endian {
		file.write_i32::<BE>(ISPG_VOLUME)
	} else {
		file.write_i32::<LE>(ISPG_VOLUME)
	};
	result.map_err(|e| Error::io(path, e))?;
	file.sync_all()
		.map_err(|e| Error::io(path, e))?;

	info!("Marked {} as a volume", path.to_string_lossy());
	Ok(true)
}


/// A float32 volume, written little-endian
pub struct Mrc {
	nx: u32,
	ny: u32,
	nz: u32,
	/// Å
	voxel_size: f32,
	ispg: i32,
	voxels: Vec<f32>
}

impl Mrc {

	pub fn new(nx: u32, ny: u32, nz: u32, voxel_size: f64) -> Self {
		Self {
			nx,
			ny,
			nz,
			voxel_size: voxel_size as f32,
			ispg: ISPG_VOLUME,
			voxels: vec![0f32; (nx as usize)*(ny as usize)*(nz as usize)]
		}
	}

	/// writes the header as an image stack, the way some RELION versions do for single volumes
	pub fn as_image_stack(mut self) -> Self {
		self.ispg = ISPG_IMAGE_STACK;
		self
	}

	fn index(&self, x: u32, y: u32, z: u32) -> usize {
		let x = x as usize;
		let y = y as usize;
		let z = z as usize;
		let nx = self.nx as usize;
		let ny = self.ny as usize;
		z*nx*ny + y*nx + x
	}

	pub fn get(&self, x: u32, y: u32, z: u32) -> f32 {
		self.voxels[self.index(x, y, z)]
	}

	pub fn set(&mut self, x: u32, y: u32, z: u32, val: f32) {
		let i = self.index(x, y, z);
		self.voxels[i] = val;
	}

	pub fn save(&self, path: impl AsRef<Path>) -> Result<()> {

		let path = path.as_ref();
		let file = File::create(path)
			.map_err(|e| Error::io(path, e))?;
		let mut writer = BufWriter::new(file);
		self.write_to(&mut writer)
			.and_then(|_| writer.flush())
			.map_err(|e| Error::io(path, e))?;

		debug!("Wrote {}", path.to_string_lossy());
		Ok(())
	}

	fn write_to(&self, writer: &mut impl Write) -> std::io::Result<()> {

		// the header is 256 (4-byte) words, 1024 bytes total

		// dimensions (words 1-3)
		writer.write_u32::<LE>(self.nx)?;
		writer.write_u32::<LE>(self.ny)?;
		writer.write_u32::<LE>(self.nz)?;

		// mode 2: 32 bit float
		writer.write_u32::<LE>(2)?;

		// nxstart, nystart, nzstart
		writer.write_all(&[0u8; 4*3])?;

		// sampling (words 8-10), then cell dimensions (words 11-13) and angles (words 14-16)
		writer.write_u32::<LE>(self.nx)?;
		writer.write_u32::<LE>(self.ny)?;
		writer.write_u32::<LE>(self.nz)?;
		writer.write_f32::<LE>(self.nx as f32*self.voxel_size)?;
		writer.write_f32::<LE>(self.ny as f32*self.voxel_size)?;
		writer.write_f32::<LE>(self.nz as f32*self.voxel_size)?;
		for _ in 0 .. 3 {
			writer.write_f32::<LE>(90.0)?;
		}

		// axis order (words 17-19)
		writer.write_u32::<LE>(1)?;
		writer.write_u32::<LE>(2)?;
		writer.write_u32::<LE>(3)?;

		// density statistics (words 20-22)
		let (min, max, mean) = self.stats();
		writer.write_f32::<LE>(min)?;
		writer.write_f32::<LE>(max)?;
		writer.write_f32::<LE>(mean)?;

		// space group, then no extended header (words 23-24)
		writer.write_i32::<LE>(self.ispg)?;
		writer.write_u32::<LE>(0)?;

		// we're at word 25 now: skip to word 53
		writer.write_all(&[0u8; 4*(53 - 25)])?;

		// the MAP marker, then the machine stamp
		writer.write_all(b"MAP ")?;
		writer.write_all(&MACHST_LE)?;

		// we're at word 55 now: skip to the end of the header (word 257)
		writer.write_all(&[0u8; 4*(257 - 55)])?;

		// voxels in z(y(x)) order
		for v in &self.voxels {
			writer.write_f32::<LE>(*v)?;
		}

		Ok(())
	}

	fn stats(&self) -> (f32, f32, f32) {
		if self.voxels.is_empty() {
			return (0.0, 0.0, 0.0);
		}
		let min = self.voxels.iter().copied().fold(f32::INFINITY, f32::min);
		let max = self.voxels.iter().copied().fold(f32::NEG_INFINITY, f32::max);
		let mean = self.voxels.iter().sum::<f32>()/self.voxels.len() as f32;
		(min, max, mean)
	}
}
