// Released under MIT License.
// Copyright (c) 2023-2025 Ladislav Bartos

//! Implementation of functions for reading and writing XTC files.
//!
//! Each XTC frame consists of big-endian XDR words:
//! `magic (1995) | natoms | step | time | box (9 floats, nm) | natoms | coordinates`.
//! Coordinates of systems with at most 9 atoms are stored as plain floats.
//! Coordinates of larger systems are compressed using `CoordCodec`.
//!
//! Frames have variable length, so the whole file is scanned when it is opened
//! and the offset of each frame is stored to allow random access.

use std::fs::{File, OpenOptions};
use std::io::{BufReader, BufWriter, Read, Seek, SeekFrom, Write};
use std::path::Path;

use crate::errors::{ReadTrajError, WriteTrajError};
use crate::io::binary::{BinaryError, BinaryReader, BinaryWriter, Endianness};
use crate::io::traj_read::{TrajRead, TrajReader};
use crate::io::traj_write::TrajWrite;
use crate::io::xtc_codec::{CompressedCoords, CoordCodec};
use crate::structures::{group::AtomicGroup, simbox::SimBox, vector3d::Vector3D};

/// Magic number starting every XTC frame.
const XTC_MAGIC: i32 = 1995;
/// Largest number of atoms stored without compression.
const MAX_UNCOMPRESSED: usize = 9;
/// Default precision of the compressed coordinates.
pub const DEFAULT_PRECISION: f32 = 1000.0;
/// Conversion factor from nanometers to Ångströms.
const NM_TO_ANGSTROM: f32 = 10.0;

/// Header of an XTC frame. The box is stored in nanometers.
#[derive(Debug, Clone, PartialEq, Default)]
pub struct XtcHeader {
    pub natoms: usize,
    pub step: i32,
    pub time: f32,
    pub box_matrix: [[f32; 3]; 3],
}

/// Reader of XTC trajectories. Use `TrajReader` (`XtcReader`) to iterate through the frames.
///
/// ## Example
/// Reading every 10th frame of an XTC file.
/// ```no_run
/// use trajstream::prelude::*;
///
/// let mut traj = XtcReader::open("trajectory.xtc").unwrap();
/// for i in (0..traj.nframes()).step_by(10) {
///     traj.read_frame_at(i).unwrap();
///     println!("{} {}", traj.format().step(), traj.format().precision());
/// }
/// ```
#[derive(Debug)]
pub struct Xtc<R = BufReader<File>> {
    filename: String,
    reader: BinaryReader<R>,
    natoms: usize,
    offsets: Vec<u64>,
    timestep: f32,
    header: XtcHeader,
    precision: f32,
    /// Coordinates of the current frame in Å.
    coords: Vec<[f32; 3]>,
    raw: Vec<f32>,
    block: CompressedCoords,
    codec: CoordCodec,
    next_frame: usize,
}

/// `TrajReader` for XTC files.
pub type XtcReader = TrajReader<Xtc>;

impl Xtc {
    /// Open an XTC file and scan its frames.
    pub fn open(filename: impl AsRef<Path>) -> Result<Self, ReadTrajError> {
        let path = filename.as_ref();
        let name = path.to_string_lossy().into_owned();

        let file = File::open(path).map_err(|_| ReadTrajError::FileNotFound(name.clone()))?;
        Xtc::from_stream(BufReader::new(file), name)
    }
}

impl XtcReader {
    /// Open an XTC file and read its first frame.
    pub fn open(filename: impl AsRef<Path>) -> Result<Self, ReadTrajError> {
        TrajReader::new(Xtc::open(filename)?)
    }
}

impl<R: Read + Seek> Xtc<R> {
    /// Scan an XTC trajectory stored in any seekable stream.
    /// The stream is scanned from its start.
    pub fn from_reader(stream: R) -> Result<Self, ReadTrajError> {
        Xtc::from_stream(stream, String::from("stream"))
    }

    fn from_stream(stream: R, filename: String) -> Result<Self, ReadTrajError> {
        let mut xtc = Xtc {
            filename,
            reader: BinaryReader::new(stream, Endianness::Big),
            natoms: 0,
            offsets: Vec::new(),
            timestep: 0.0,
            header: XtcHeader::default(),
            precision: 0.0,
            coords: Vec::new(),
            raw: Vec::new(),
            block: CompressedCoords::default(),
            codec: CoordCodec::new(),
            next_frame: 0,
        };

        xtc.scan_frames()?;
        xtc.seek_frame(0)?;
        Ok(xtc)
    }

    /// Walk through the file, checking the frame headers and recording the offset of each frame.
    fn scan_frames(&mut self) -> Result<(), ReadTrajError> {
        let scan_error = |e: BinaryError, filename: &str| e.into_read_error(filename, "scanning frames");

        let file_size = self
            .reader
            .stream_len()
            .map_err(|e| scan_error(e, &self.filename))?;
        if file_size == 0 {
            return Err(ReadTrajError::FileEmpty(self.filename.clone()));
        }

        self.reader
            .seek_to(0)
            .map_err(|e| scan_error(e, &self.filename))?;
        self.offsets.clear();
        let mut timestep = None;

        loop {
            let position = self
                .reader
                .position()
                .map_err(|e| scan_error(e, &self.filename))?;

            let header = match self.read_header(self.offsets.len()) {
                Ok(Some(header)) => header,
                Ok(None) => break,
                Err(e) => return Err(e),
            };

            if self.offsets.is_empty() {
                self.natoms = header.natoms;
            } else if header.natoms != self.natoms {
                return Err(ReadTrajError::AtomsNumberMismatch(
                    self.filename.clone(),
                    self.natoms,
                    header.natoms,
                ));
            }

            if timestep.is_none() && header.step != 0 {
                timestep = Some(header.time / header.step as f32);
            }

            self.read_atom_count(self.offsets.len())?;

            let skip = if header.natoms <= MAX_UNCOMPRESSED {
                header.natoms as u64 * 12
            } else {
                // precision, minint, maxint, smallidx
                self.reader
                    .skip(32)
                    .map_err(|e| scan_error(e, &self.filename))?;
                let nbytes = self
                    .reader
                    .read_u32()
                    .map_err(|e| scan_error(e, &self.filename))? as u64;
                // every atom occupies at least one bit of the compressed block
                if header.natoms as u64 > nbytes * 8 {
                    return Err(ReadTrajError::CorruptedFrame(
                        self.filename.clone(),
                        format!(
                            "frame {} declares '{}' atoms but its compressed block only has '{}' bytes",
                            self.offsets.len(),
                            header.natoms,
                            nbytes
                        ),
                    ));
                }
                nbytes.div_ceil(4) * 4
            };

            self.reader
                .skip(skip)
                .map_err(|e| scan_error(e, &self.filename))?;
            let end = self
                .reader
                .position()
                .map_err(|e| scan_error(e, &self.filename))?;
            if end > file_size {
                return Err(ReadTrajError::CorruptedFrame(
                    self.filename.clone(),
                    format!("frame {} is truncated", self.offsets.len()),
                ));
            }

            self.offsets.push(position);
        }

        self.timestep = timestep.unwrap_or(0.0);

        crate::colog_info!(
            "Scanned XTC file '{}': '{}' frames of '{}' atoms.",
            self.filename,
            self.offsets.len(),
            self.natoms
        );

        Ok(())
    }

    /// Read the header of a frame.
    /// Returns `Ok(None)` if the stream ended before the frame.
    fn read_header(&mut self, frame: usize) -> Result<Option<XtcHeader>, ReadTrajError> {
        let context = format!("reading frame {}", frame);
        let to_error = |e: BinaryError, filename: &str| e.into_read_error(filename, &context);

        let magic = match self.reader.try_read_i32() {
            Ok(Some(magic)) => magic,
            Ok(None) => return Ok(None),
            Err(e) => return Err(to_error(e, &self.filename)),
        };

        if magic != XTC_MAGIC {
            return Err(ReadTrajError::InvalidMagic(
                self.filename.clone(),
                magic,
                XTC_MAGIC,
            ));
        }

        let mut header = XtcHeader::default();
        let mut box_matrix = [0.0f32; 9];
        let natoms = self
            .reader
            .read_i32()
            .and_then(|natoms| {
                header.step = self.reader.read_i32()?;
                header.time = self.reader.read_f32()?;
                self.reader.read_f32_into(&mut box_matrix)?;
                Ok(natoms)
            })
            .map_err(|e| to_error(e, &self.filename))?;

        header.natoms = usize::try_from(natoms).map_err(|_| {
            ReadTrajError::CorruptedFrame(
                self.filename.clone(),
                format!("negative number of atoms '{}'", natoms),
            )
        })?;

        for (i, row) in header.box_matrix.iter_mut().enumerate() {
            row.copy_from_slice(&box_matrix[3 * i..3 * i + 3]);
        }

        Ok(Some(header))
    }

    /// Read the atom count preceding the coordinates and check it against the header.
    fn read_atom_count(&mut self, frame: usize) -> Result<(), ReadTrajError> {
        let lsize = self
            .reader
            .read_i32()
            .map_err(|e| e.into_read_error(&self.filename, &format!("reading frame {}", frame)))?;

        if lsize < 0 || lsize as usize != self.natoms {
            return Err(ReadTrajError::CorruptedFrame(
                self.filename.clone(),
                format!(
                    "frame {} declares '{}' atoms in its coordinate block but '{}' in its header",
                    frame, lsize, self.natoms
                ),
            ));
        }

        Ok(())
    }

    /// Read the compressed coordinate block of the current frame.
    fn read_compressed(&mut self) -> Result<(), BinaryError> {
        self.block.precision = self.reader.read_f32()?;
        for value in self.block.minint.iter_mut() {
            *value = self.reader.read_i32()?;
        }
        for value in self.block.maxint.iter_mut() {
            *value = self.reader.read_i32()?;
        }
        self.block.smallidx = self.reader.read_i32()?;
        let nbytes = self.reader.read_u32()? as usize;
        self.reader.read_opaque(nbytes, &mut self.block.bytes)
    }
}

impl<R> Xtc<R> {
    /// Header of the current frame.
    pub fn header(&self) -> &XtcHeader {
        &self.header
    }

    /// Simulation step of the current frame.
    pub fn step(&self) -> i32 {
        self.header.step
    }

    /// Simulation time of the current frame (in ps).
    pub fn time(&self) -> f32 {
        self.header.time
    }

    /// Precision of the coordinates of the current frame.
    /// Frames with at most 9 atoms are not compressed and report a precision of 0.
    pub fn precision(&self) -> f32 {
        self.precision
    }

    /// Box matrix of the current frame as stored in the file (in nm).
    pub fn box_matrix(&self) -> [[f32; 3]; 3] {
        self.header.box_matrix
    }

    /// Byte offsets of all frames in the file.
    pub fn frame_offsets(&self) -> &[u64] {
        &self.offsets
    }
}

impl<R: Read + Seek> TrajRead for Xtc<R> {
    fn filename(&self) -> &str {
        &self.filename
    }

    fn description(&self) -> &'static str {
        "XTC"
    }

    fn natoms(&self) -> usize {
        self.natoms
    }

    fn frame_count(&self) -> Option<usize> {
        Some(self.offsets.len())
    }

    fn has_periodic_box(&self) -> bool {
        true
    }

    fn periodic_box(&self) -> Vector3D {
        let m = &self.header.box_matrix;
        Vector3D::new(m[0][0], m[1][1], m[2][2]) * NM_TO_ANGSTROM
    }

    fn simbox(&self) -> Option<SimBox> {
        Some(SimBox::from_matrix(self.header.box_matrix).scaled(NM_TO_ANGSTROM))
    }

    fn timestep(&self) -> f32 {
        self.timestep
    }

    fn current_step(&self) -> i64 {
        self.header.step as i64
    }

    fn current_time(&self) -> f32 {
        self.header.time
    }

    #[inline(always)]
    fn coord(&self, index: usize) -> Vector3D {
        self.coords[index].into()
    }

    fn parse_frame(&mut self) -> Result<bool, ReadTrajError> {
        let frame = self.next_frame;
        let header = match self.read_header(frame)? {
            Some(header) => header,
            None => return Ok(false),
        };

        if header.natoms != self.natoms {
            return Err(ReadTrajError::AtomsNumberMismatch(
                self.filename.clone(),
                self.natoms,
                header.natoms,
            ));
        }

        self.read_atom_count(frame)?;
        let context = format!("reading frame {}", frame);

        if self.natoms <= MAX_UNCOMPRESSED {
            self.raw.resize(3 * self.natoms, 0.0);
            self.reader
                .read_f32_into(&mut self.raw)
                .map_err(|e| e.into_read_error(&self.filename, &context))?;

            self.coords.clear();
            self.coords.extend(self.raw.chunks_exact(3).map(|c| [c[0], c[1], c[2]]));
            self.precision = 0.0;
        } else {
            self.read_compressed()
                .map_err(|e| e.into_read_error(&self.filename, &context))?;

            self.codec
                .decompress(&self.block, self.natoms, &mut self.coords)
                .map_err(|e| {
                    ReadTrajError::CorruptedFrame(
                        self.filename.clone(),
                        format!("frame {}: {}", frame, e),
                    )
                })?;

            if self.coords.len() != self.natoms {
                return Err(ReadTrajError::CorruptedFrame(
                    self.filename.clone(),
                    format!(
                        "frame {} contains '{}' atoms instead of '{}'",
                        frame,
                        self.coords.len(),
                        self.natoms
                    ),
                ));
            }
            self.precision = self.block.precision;
        }

        self.coords
            .iter_mut()
            .flat_map(|c| c.iter_mut())
            .for_each(|x| *x *= NM_TO_ANGSTROM);

        self.header = header;
        self.next_frame += 1;
        Ok(true)
    }

    fn seek_frame(&mut self, index: usize) -> Result<(), ReadTrajError> {
        let offset = *self
            .offsets
            .get(index)
            .ok_or_else(|| ReadTrajError::SeekFailed(self.filename.clone(), index))?;

        self.reader
            .seek_to(offset)
            .map_err(|_| ReadTrajError::SeekFailed(self.filename.clone(), index))?;
        self.next_frame = index;
        Ok(())
    }

    fn rewind_stream(&mut self) -> Result<(), ReadTrajError> {
        self.seek_frame(0)
    }
}

/******************************/
/*         XTC WRITER         */
/******************************/

/// Writer of XTC trajectories.
///
/// Every frame requires a simulation box. Coordinates of systems with more than
/// 9 atoms are compressed using the precision of the writer.
///
/// ## Example
/// ```no_run
/// use trajstream::prelude::*;
///
/// let group = AtomicGroup::with_n_atoms(100).with_box([50.0, 50.0, 50.0].into());
/// let mut writer = XtcWriter::create("output.xtc")
///     .unwrap()
///     .with_time_per_step(0.002)
///     .with_steps_per_frame(500);
///
/// for _ in 0..10 {
///     writer.write_frame(&group).unwrap();
/// }
/// ```
#[derive(Debug)]
pub struct XtcWriter<W: Write = BufWriter<File>> {
    filename: String,
    writer: BinaryWriter<W>,
    natoms: Option<usize>,
    precision: f32,
    time_per_step: f32,
    step: i32,
    steps_per_frame: i32,
    /// Step of the last frame of an appended file.
    resume_from: Option<i32>,
    current: usize,
    codec: CoordCodec,
    coords: Vec<[f32; 3]>,
}

impl XtcWriter {
    /// Create a new XTC file. An existing file is truncated.
    pub fn create(filename: impl AsRef<Path>) -> Result<Self, WriteTrajError> {
        let path = filename.as_ref();
        let name = path.to_string_lossy().into_owned();
        let file = File::create(path).map_err(|_| WriteTrajError::CouldNotCreate(name.clone()))?;

        Ok(XtcWriter::new(BufWriter::new(file), name))
    }

    /// Open an XTC file for appending. The file is created if it does not exist.
    pub fn append(filename: impl AsRef<Path>) -> Result<Self, WriteTrajError> {
        let path = filename.as_ref();
        let name = path.to_string_lossy().into_owned();
        let mut file = OpenOptions::new()
            .read(true)
            .write(true)
            .create(true)
            .truncate(false)
            .open(path)
            .map_err(|_| WriteTrajError::CouldNotCreate(name.clone()))?;

        let state = read_append_state(&mut file, &name)?;
        file.seek(SeekFrom::End(0))
            .map_err(|_| WriteTrajError::CouldNotWrite(name.clone()))?;

        Ok(XtcWriter::new(BufWriter::new(file), name).resume(state))
    }
}

impl<W: Write> XtcWriter<W> {
    /// Write a new XTC trajectory into any stream.
    pub fn from_writer(stream: W) -> Self {
        XtcWriter::new(stream, String::from("stream"))
    }

    fn new(stream: W, filename: String) -> Self {
        XtcWriter {
            filename,
            writer: BinaryWriter::new(stream, Endianness::Big),
            natoms: None,
            precision: DEFAULT_PRECISION,
            time_per_step: 1.0,
            step: 0,
            steps_per_frame: 1,
            resume_from: None,
            current: 0,
            codec: CoordCodec::new(),
            coords: Vec::new(),
        }
    }

    fn resume(mut self, state: Option<(usize, usize, i32)>) -> Self {
        if let Some((natoms, nframes, last_step)) = state {
            self.natoms = Some(natoms);
            self.current = nframes;
            self.resume_from = Some(last_step);
        }
        self
    }

    /// Set the precision of the compressed coordinates. Non-positive values select the default (1000).
    pub fn with_precision(mut self, precision: f32) -> Self {
        self.precision = if precision <= 0.0 {
            DEFAULT_PRECISION
        } else {
            precision
        };
        self
    }

    /// Set the simulation time between two steps.
    pub fn with_time_per_step(mut self, time_per_step: f32) -> Self {
        self.time_per_step = time_per_step;
        self
    }

    /// Set the number of simulation steps between two written frames.
    pub fn with_steps_per_frame(mut self, steps_per_frame: i32) -> Self {
        self.steps_per_frame = steps_per_frame;
        self
    }

    /// Set the simulation step of the next written frame.
    pub fn with_current_step(mut self, step: i32) -> Self {
        self.step = step;
        self.resume_from = None;
        self
    }

    /// Precision of the compressed coordinates.
    pub fn precision(&self) -> f32 {
        self.precision
    }

    /// Simulation time between two steps.
    pub fn time_per_step(&self) -> f32 {
        self.time_per_step
    }

    /// Number of simulation steps between two written frames.
    pub fn steps_per_frame(&self) -> i32 {
        self.steps_per_frame
    }

    /// Simulation step of the next written frame.
    pub fn current_step(&self) -> i32 {
        match self.resume_from {
            Some(last) => last + self.steps_per_frame,
            None => self.step,
        }
    }

    /// Number of frames in the file, including frames present before appending.
    pub fn frames_written(&self) -> usize {
        self.current
    }

    /// Write the group as a new frame at the current step.
    /// The time of the frame is `current_step * time_per_step`.
    /// The current step is then advanced by `steps_per_frame`.
    pub fn write_frame(&mut self, group: &AtomicGroup) -> Result<(), WriteTrajError> {
        let step = self.current_step();
        self.write_frame_with(group, step, step as f32 * self.time_per_step)?;

        self.resume_from = None;
        self.step = step + self.steps_per_frame;
        Ok(())
    }

    /// Write the group as a new frame with explicit step and time.
    /// The current step of the writer is not changed.
    pub fn write_frame_with(
        &mut self,
        group: &AtomicGroup,
        step: i32,
        time: f32,
    ) -> Result<(), WriteTrajError> {
        let natoms = group.len();
        if let Some(expected) = self.natoms {
            if expected != natoms {
                return Err(WriteTrajError::AtomsNumberMismatch(
                    self.filename.clone(),
                    natoms,
                    expected,
                ));
            }
        }

        let simbox = group
            .get_box()
            .ok_or_else(|| WriteTrajError::MissingBox(self.filename.clone()))?;
        let box_matrix = simbox.scaled(1.0 / NM_TO_ANGSTROM).to_matrix();

        self.coords.clear();
        self.coords.extend(group.iter().map(|atom| {
            let position = atom.get_position();
            [
                position.x / NM_TO_ANGSTROM,
                position.y / NM_TO_ANGSTROM,
                position.z / NM_TO_ANGSTROM,
            ]
        }));

        // compress before writing anything so that a failure leaves the file intact
        let block = if natoms > MAX_UNCOMPRESSED {
            Some(
                self.codec
                    .compress(&self.coords, self.precision)
                    .map_err(|e| WriteTrajError::CoordinateOverflow(self.filename.clone(), e))?,
            )
        } else {
            None
        };

        self.write_frame_data(natoms, step, time, &box_matrix, block.as_ref())
            .map_err(|_| WriteTrajError::CouldNotWrite(self.filename.clone()))?;

        self.natoms = Some(natoms);
        self.current += 1;
        Ok(())
    }

    fn write_frame_data(
        &mut self,
        natoms: usize,
        step: i32,
        time: f32,
        box_matrix: &[[f32; 3]; 3],
        block: Option<&CompressedCoords>,
    ) -> std::io::Result<()> {
        self.writer.write_i32(XTC_MAGIC)?;
        self.writer.write_i32(natoms as i32)?;
        self.writer.write_i32(step)?;
        self.writer.write_f32(time)?;
        for row in box_matrix {
            self.writer.write_f32_slice(row)?;
        }
        self.writer.write_i32(natoms as i32)?;

        match block {
            None => {
                for coord in &self.coords {
                    self.writer.write_f32_slice(coord)?;
                }
            }
            Some(block) => {
                self.writer.write_f32(block.precision)?;
                for &value in block.minint.iter().chain(block.maxint.iter()) {
                    self.writer.write_i32(value)?;
                }
                self.writer.write_i32(block.smallidx)?;
                self.writer.write_u32(block.bytes.len() as u32)?;
                self.writer.write_opaque(&block.bytes)?;
            }
        }

        self.writer.flush()
    }
}

impl<W: Read + Write + Seek> XtcWriter<W> {
    /// Append frames to an XTC trajectory stored in any seekable stream.
    /// An empty stream is treated as a new trajectory.
    pub fn append_to(mut stream: W) -> Result<Self, WriteTrajError> {
        let name = String::from("stream");
        let state = read_append_state(&mut stream, &name)?;
        stream
            .seek(SeekFrom::End(0))
            .map_err(|_| WriteTrajError::CouldNotWrite(name.clone()))?;

        Ok(XtcWriter::new(stream, name).resume(state))
    }
}

/// Scan an existing XTC file. Returns the number of atoms, the number of frames
/// and the step of the last frame, or `None` for an empty stream.
fn read_append_state<S: Read + Seek>(
    stream: &mut S,
    filename: &str,
) -> Result<Option<(usize, usize, i32)>, WriteTrajError> {
    let append_error = |message: String| WriteTrajError::CouldNotAppend(filename.to_owned(), message);

    let file_size = stream
        .seek(SeekFrom::End(0))
        .map_err(|e| append_error(e.to_string()))?;
    if file_size == 0 {
        return Ok(None);
    }

    let mut xtc = Xtc::from_stream(&mut *stream, filename.to_owned())
        .map_err(|e| append_error(e.to_string()))?;

    let nframes = xtc.offsets.len();
    if nframes == 0 {
        return Ok(None);
    }

    xtc.seek_frame(nframes - 1)
        .and_then(|_| xtc.parse_frame())
        .map_err(|e| append_error(e.to_string()))?;

    crate::colog_info!(
        "Appending to XTC file '{}' containing '{}' frames of '{}' atoms (last step '{}').",
        filename,
        nframes,
        xtc.natoms,
        xtc.step()
    );

    Ok(Some((xtc.natoms, nframes, xtc.step())))
}

impl<W: Write> TrajWrite for XtcWriter<W> {
    fn filename(&self) -> &str {
        &self.filename
    }

    fn write_frame(&mut self, group: &AtomicGroup) -> Result<(), WriteTrajError> {
        XtcWriter::write_frame(self, group)
    }

    fn frames_written(&self) -> usize {
        self.current
    }

    fn flush(&mut self) -> Result<(), WriteTrajError> {
        self.writer
            .flush()
            .map_err(|_| WriteTrajError::CouldNotWrite(self.filename.clone()))
    }
}

/******************************/
/*         UNIT TESTS         */
/******************************/
