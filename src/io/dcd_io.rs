// Released under MIT License.
// Copyright (c) 2023-2025 Ladislav Bartos

//! Implementation of functions for reading and writing DCD files.
//!
//! DCD files consist of Fortran unformatted records:
//! - header record (84 bytes): the `CORD` marker followed by 20 control words,
//! - title record: number of titles followed by 80-byte title lines,
//! - atom count record (4 bytes),
//! - for each frame: optional unit cell record (6 doubles) followed by X, Y, and Z records.
//!
//! Coordinates are stored in Ångströms. Files of both byte orders can be read.

use std::fs::{File, OpenOptions};
use std::io::{BufReader, BufWriter, Read, Seek, SeekFrom, Write};
use std::path::Path;

use crate::errors::{ReadTrajError, WriteTrajError};
use crate::io::binary::{BinaryError, BinaryReader, BinaryWriter, Endianness};
use crate::io::traj_read::{checked_index, TrajRead, TrajReader};
use crate::io::traj_write::TrajWrite;
use crate::structures::{group::AtomicGroup, simbox::SimBox, vector3d::Vector3D};

/// Length of the header record.
const HEADER_SIZE: u32 = 84;
/// Length of the unit cell record.
const CRYSTAL_SIZE: u32 = 48;
/// Length of one title line.
const TITLE_LENGTH: usize = 80;
/// Version number written into the last control word.
const DCD_VERSION: u32 = 24;
/// Operation reported by errors of `Dcd::mapped_coords`.
const MAPPING_COORDS: &str = "mapping coords";
/// Largest number of atoms whose coordinate record length fits into a 32-bit marker.
const MAX_NATOMS: usize = (u32::MAX / 4) as usize;

/// Reader of DCD trajectories. Use `TrajReader` (`DcdReader`) to iterate through the frames.
///
/// ## Example
/// ```no_run
/// use trajstream::prelude::*;
///
/// let mut traj = DcdReader::open("trajectory.dcd").unwrap();
/// println!("{:?}", traj.format().titles());
///
/// while traj.read_frame().unwrap() {
///     println!("{:?}", traj.format().xcoords());
/// }
/// ```
#[derive(Debug)]
pub struct Dcd<R = BufReader<File>> {
    filename: String,
    reader: BinaryReader<R>,
    titles: Vec<String>,
    icntrl: [u32; 20],
    natoms: usize,
    nframes: Option<usize>,
    first_frame_pos: u64,
    frame_size: u64,
    has_box: bool,
    /// Unit cell of the current frame: `[a, b, c, dp1, dp3, dp4]`.
    qcrys: [f64; 6],
    x: Vec<f32>,
    y: Vec<f32>,
    z: Vec<f32>,
    velocity_factor: f32,
    /// Index of the frame stored in the buffers.
    frame_index: usize,
    /// Index of the frame the stream is positioned at.
    next_frame: usize,
}

/// `TrajReader` for DCD files.
pub type DcdReader = TrajReader<Dcd>;

impl Dcd {
    /// Open a DCD file and read its header.
    pub fn open(filename: impl AsRef<Path>) -> Result<Self, ReadTrajError> {
        let path = filename.as_ref();
        let name = path.to_string_lossy().into_owned();

        let file = File::open(path).map_err(|_| ReadTrajError::FileNotFound(name.clone()))?;
        match file.metadata() {
            Ok(metadata) if metadata.len() == 0 => return Err(ReadTrajError::FileEmpty(name)),
            Ok(_) => (),
            Err(_) => return Err(ReadTrajError::FileNotFound(name)),
        }

        Dcd::from_stream(BufReader::new(file), name)
    }
}

impl DcdReader {
    /// Open a DCD file and read its first frame.
    pub fn open(filename: impl AsRef<Path>) -> Result<Self, ReadTrajError> {
        TrajReader::new(Dcd::open(filename)?)
    }
}

impl<R: Read + Seek> Dcd<R> {
    /// Read the header of a DCD trajectory from any seekable stream.
    /// The stream is expected to be positioned at the start of the file.
    pub fn from_reader(stream: R) -> Result<Self, ReadTrajError> {
        Dcd::from_stream(stream, String::from("stream"))
    }

    fn from_stream(stream: R, filename: String) -> Result<Self, ReadTrajError> {
        let mut reader = BinaryReader::new(stream, Endianness::native());

        // byte order
        let word = match reader.read_raw_word() {
            Ok(word) => word,
            Err(BinaryError::Eof) => return Err(ReadTrajError::FileEmpty(filename)),
            Err(_) => return Err(ReadTrajError::UnknownEndianness(filename)),
        };
        let endian = Endianness::detect(word, HEADER_SIZE)
            .ok_or_else(|| ReadTrajError::UnknownEndianness(filename.clone()))?;
        reader.set_endianness(endian);

        // header record
        let mut header = [0u8; HEADER_SIZE as usize];
        reader
            .read_exact(&mut header)
            .and_then(|_| reader.end_record(HEADER_SIZE))
            .map_err(|e| e.into_read_error(&filename, "reading the header"))?;

        if &header[0..4] != b"CORD" {
            return Err(ReadTrajError::MissingCordMarker(filename));
        }

        let mut icntrl = [0u32; 20];
        for (i, word) in icntrl.iter_mut().enumerate() {
            let start = 4 + 4 * i;
            *word = reader.decode_u32([
                header[start],
                header[start + 1],
                header[start + 2],
                header[start + 3],
            ]);
        }

        if icntrl[8] != 0 {
            return Err(ReadTrajError::FixedAtomsUnsupported(filename, icntrl[8]));
        }

        let has_box = icntrl[10] == 1;

        // titles
        let titles = Dcd::<R>::read_titles(&mut reader, &filename)?;

        // number of atoms
        let natoms_record = reader
            .read_record_bytes(Some(4))
            .map_err(|e| e.into_read_error(&filename, "reading the number of atoms"))?;
        let natoms = reader.decode_u32([
            natoms_record[0],
            natoms_record[1],
            natoms_record[2],
            natoms_record[3],
        ]) as usize;

        if natoms > MAX_NATOMS {
            return Err(ReadTrajError::InvalidHeader(
                filename,
                format!("number of atoms '{}' is too large", natoms),
            ));
        }

        let (first_frame_pos, file_size) = reader
            .position()
            .and_then(|position| Ok((position, reader.stream_len()?)))
            .map_err(|e| e.into_read_error(&filename, "reading the header"))?;

        let mut frame_size = 12 * (natoms as u64 + 2);
        if has_box {
            frame_size += CRYSTAL_SIZE as u64 + 8;
        }

        // the atom count must be consistent with the amount of frame data
        let data = file_size.saturating_sub(first_frame_pos);
        if data != 0 && data < frame_size {
            return Err(ReadTrajError::InvalidHeader(
                filename,
                format!(
                    "'{}' atoms require '{}' bytes per frame but the file only contains '{}' bytes of frame data",
                    natoms, frame_size, data
                ),
            ));
        }

        let nframes = match icntrl[0] {
            0 => derive_nframes(file_size, first_frame_pos, frame_size, &filename),
            n => Some(n as usize),
        };

        // buffers of files without frame data are allocated when a frame appears
        let buffer_len = if data == 0 { 0 } else { natoms };

        Ok(Dcd {
            filename,
            reader,
            titles,
            icntrl,
            natoms,
            nframes,
            first_frame_pos,
            frame_size,
            has_box,
            qcrys: [0.0; 6],
            x: vec![0.0; buffer_len],
            y: vec![0.0; buffer_len],
            z: vec![0.0; buffer_len],
            velocity_factor: 1.0,
            frame_index: 0,
            next_frame: 0,
        })
    }

    /// Size the coordinate buffers for the number of atoms once a whole frame is available.
    /// Returns `Ok(false)` if the stream contains no further data.
    fn allocate_buffers(&mut self) -> Result<bool, ReadTrajError> {
        let (position, len) = self
            .reader
            .position()
            .and_then(|position| Ok((position, self.reader.stream_len()?)))
            .map_err(|e| e.into_read_error(&self.filename, &self.frame_context()))?;

        match len.saturating_sub(position) {
            0 => Ok(false),
            remaining if remaining < self.frame_size => Err(ReadTrajError::UnexpectedEof(
                self.filename.clone(),
                self.frame_context(),
            )),
            _ => {
                self.x.resize(self.natoms, 0.0);
                self.y.resize(self.natoms, 0.0);
                self.z.resize(self.natoms, 0.0);
                Ok(true)
            }
        }
    }

    fn read_titles(
        reader: &mut BinaryReader<R>,
        filename: &str,
    ) -> Result<Vec<String>, ReadTrajError> {
        let record = reader
            .read_record_bytes(None)
            .map_err(|e| e.into_read_error(filename, "reading the title block"))?;

        if record.len() < 4 || (record.len() - 4) % TITLE_LENGTH != 0 {
            return Err(ReadTrajError::InvalidHeader(
                filename.to_owned(),
                format!("title block has invalid length '{}'", record.len()),
            ));
        }

        let ntitle = reader.decode_u32([record[0], record[1], record[2], record[3]]) as usize;
        if ntitle * TITLE_LENGTH != record.len() - 4 {
            return Err(ReadTrajError::InvalidHeader(
                filename.to_owned(),
                format!(
                    "title block declares '{}' titles but contains '{}'",
                    ntitle,
                    (record.len() - 4) / TITLE_LENGTH
                ),
            ));
        }

        Ok(record[4..]
            .chunks(TITLE_LENGTH)
            .map(|line| {
                String::from_utf8_lossy(line)
                    .trim_end_matches([' ', '\0'])
                    .to_owned()
            })
            .collect())
    }
}

/// Compute the number of frames from the size of the file.
/// Returns `None` if the file does not contain a whole number of frames.
fn derive_nframes(
    file_size: u64,
    first_frame_pos: u64,
    frame_size: u64,
    filename: &str,
) -> Option<usize> {
    let data = file_size.saturating_sub(first_frame_pos);
    if data % frame_size == 0 {
        let nframes = (data / frame_size) as usize;
        crate::colog_info!(
            "DCD file '{}' does not declare the number of frames. Derived '{}' frames from the file size.",
            filename,
            nframes
        );
        Some(nframes)
    } else {
        crate::colog_warn!(
            "Could not derive the number of frames of DCD file '{}': '{}' bytes of frame data is not a multiple of the frame size '{}'. The file can only be read sequentially.",
            filename,
            data,
            frame_size
        );
        None
    }
}

impl<R> Dcd<R> {
    /// Title lines of the file (trailing blanks removed).
    pub fn titles(&self) -> &[String] {
        &self.titles
    }

    /// Control word of the header with the given index (0-19).
    pub fn icntrl(&self, index: usize) -> Option<u32> {
        self.icntrl.get(index).copied()
    }

    /// Change a control word of the in-memory header. The file is not modified.
    ///
    /// ## Panics
    /// Panics if `index` is not lower than 20.
    pub fn set_icntrl(&mut self, index: usize, value: u32) {
        match self.icntrl.get_mut(index) {
            Some(word) => *word = value,
            None => panic!(
                "FATAL TRAJSTREAM ERROR | Dcd::set_icntrl | Control word index '{}' is out of range.",
                index
            ),
        }
    }

    /// Number of frames declared in the header.
    pub fn nfile(&self) -> u32 {
        self.icntrl[0]
    }

    /// Simulation step of the first frame.
    pub fn istart(&self) -> u32 {
        self.icntrl[1]
    }

    /// Number of simulation steps between frames.
    pub fn nsavc(&self) -> u32 {
        self.icntrl[2]
    }

    /// Total number of simulation steps.
    pub fn nsteps(&self) -> u32 {
        self.icntrl[3]
    }

    /// Number of fixed atoms. Always 0 for readable files.
    pub fn nfixed(&self) -> u32 {
        self.icntrl[8]
    }

    /// Time between simulation steps as stored in the header.
    pub fn delta(&self) -> f32 {
        f32::from_bits(self.icntrl[9])
    }

    /// Byte order of the file.
    pub fn endianness(&self) -> Endianness {
        self.reader.endianness()
    }

    /// Returns `true` if the byte order of the file matches the byte order of the machine.
    pub fn native_format(&self) -> bool {
        !self.reader.endianness().is_swapped()
    }

    /// Unit cell parameters of the current frame in the order `[a, b, c, dp1, dp3, dp4]`.
    /// The last three values are the angles (`gamma`, `beta`, `alpha`) in degrees or their cosines.
    pub fn crystal_params(&self) -> [f64; 6] {
        self.qcrys
    }

    /// X coordinates of the current frame.
    pub fn xcoords(&self) -> &[f32] {
        &self.x
    }

    /// Y coordinates of the current frame.
    pub fn ycoords(&self) -> &[f32] {
        &self.y
    }

    /// Z coordinates of the current frame.
    pub fn zcoords(&self) -> &[f32] {
        &self.z
    }

    /// Coordinates of the atoms with the given indices in the current frame.
    pub fn mapped_coords(&self, indices: &[usize]) -> Result<Vec<Vector3D>, ReadTrajError> {
        indices
            .iter()
            .map(|&i| match (self.x.get(i), self.y.get(i), self.z.get(i)) {
                (Some(&x), Some(&y), Some(&z)) => Ok(Vector3D::new(x, y, z)),
                _ => Err(ReadTrajError::AtomIndexOutOfRange(
                    self.filename.clone(),
                    MAPPING_COORDS.to_owned(),
                    i,
                    self.x.len(),
                )),
            })
            .collect()
    }

    /// Set the factor converting coordinates into velocities.
    /// Useful for velocity DCD files written by NAMD (factor 20.45482706).
    pub fn set_velocity_conversion_factor(&mut self, factor: f32) {
        self.velocity_factor = factor;
    }

    pub(crate) fn first_frame_pos(&self) -> u64 {
        self.first_frame_pos
    }

    pub(crate) fn frame_size(&self) -> u64 {
        self.frame_size
    }

    fn frame_context(&self) -> String {
        format!("reading frame {}", self.next_frame)
    }
}

impl<R: Read + Seek> TrajRead for Dcd<R> {
    fn filename(&self) -> &str {
        &self.filename
    }

    fn description(&self) -> &'static str {
        "DCD"
    }

    fn natoms(&self) -> usize {
        self.natoms
    }

    fn frame_count(&self) -> Option<usize> {
        self.nframes
    }

    fn has_periodic_box(&self) -> bool {
        self.has_box
    }

    fn periodic_box(&self) -> Vector3D {
        Vector3D::new(
            self.qcrys[0] as f32,
            self.qcrys[1] as f32,
            self.qcrys[2] as f32,
        )
    }

    fn simbox(&self) -> Option<SimBox> {
        if !self.has_box {
            return None;
        }

        let lengths = self.periodic_box();
        // stored as gamma, beta, alpha
        let raw = [self.qcrys[5], self.qcrys[4], self.qcrys[3]];
        let angles = if raw.iter().all(|a| (-1.0..=1.0).contains(a)) {
            raw.map(|cos| cos.acos().to_degrees() as f32)
        } else {
            raw.map(|a| a as f32)
        };

        Some(SimBox::from_lengths_angles(lengths, angles.into()))
    }

    fn timestep(&self) -> f32 {
        self.delta()
    }

    fn current_step(&self) -> i64 {
        self.istart() as i64 + self.frame_index as i64 * self.nsavc() as i64
    }

    fn current_time(&self) -> f32 {
        self.current_step() as f32 * self.delta()
    }

    #[inline(always)]
    fn coord(&self, index: usize) -> Vector3D {
        Vector3D::new(self.x[index], self.y[index], self.z[index])
    }

    fn velocity_conversion_factor(&self) -> f32 {
        self.velocity_factor
    }

    fn parse_frame(&mut self) -> Result<bool, ReadTrajError> {
        if self.x.len() != self.natoms && !self.allocate_buffers()? {
            return Ok(false);
        }

        if self.has_box {
            let mut dp = [0.0f64; 6];
            match self.reader.read_record_f64(&mut dp) {
                Ok(()) => (),
                Err(BinaryError::Eof) => return Ok(false),
                Err(e) => return Err(e.into_read_error(&self.filename, &self.frame_context())),
            }
            self.qcrys = [dp[0], dp[2], dp[5], dp[1], dp[3], dp[4]];
        }

        match self.reader.read_record_f32(&mut self.x) {
            Ok(()) => (),
            Err(BinaryError::Eof) if !self.has_box => return Ok(false),
            Err(e) => return Err(e.into_read_error(&self.filename, &self.frame_context())),
        }

        self.reader
            .read_record_f32(&mut self.y)
            .and_then(|_| self.reader.read_record_f32(&mut self.z))
            .map_err(|e| e.into_read_error(&self.filename, &self.frame_context()))?;

        self.frame_index = self.next_frame;
        self.next_frame += 1;
        Ok(true)
    }

    fn seek_frame(&mut self, index: usize) -> Result<(), ReadTrajError> {
        let position = self.first_frame_pos + index as u64 * self.frame_size;
        self.reader
            .seek_to(position)
            .map_err(|_| ReadTrajError::SeekFailed(self.filename.clone(), index))?;
        self.next_frame = index;
        Ok(())
    }

    fn rewind_stream(&mut self) -> Result<(), ReadTrajError> {
        self.seek_frame(0)
    }

    fn copy_group_coords(&self, group: &mut AtomicGroup) -> Result<(), ReadTrajError> {
        for atom in group.iter_mut() {
            let index = checked_index(
                atom,
                self.x.len(),
                &self.filename,
                crate::io::traj_read::UPDATING_COORDS,
            )?;
            atom.set_position(Vector3D::new(self.x[index], self.y[index], self.z[index]));
        }

        if let Some(simbox) = self.simbox() {
            group.set_box(simbox);
        }

        Ok(())
    }
}

/******************************/
/*         DCD WRITER         */
/******************************/

/// Properties of an existing DCD file needed to append frames to it.
struct AppendState {
    natoms: usize,
    has_box: bool,
    timestep: f32,
    nframes: usize,
    titles: Vec<String>,
    endian: Endianness,
}

/// Writer of DCD trajectories.
///
/// The number of atoms and the presence of the unit cell are set by the first written frame.
/// The header is rewritten whenever a frame is added, so the file is valid at all times.
///
/// ## Example
/// ```no_run
/// use trajstream::prelude::*;
///
/// let group = AtomicGroup::with_n_atoms(10).with_box([40.0, 40.0, 40.0].into());
/// let mut writer = DcdWriter::create("output.dcd").unwrap().with_timestep(0.002);
/// writer.write_frame(&group).unwrap();
/// ```
#[derive(Debug)]
pub struct DcdWriter<W: Write + Seek = BufWriter<File>> {
    filename: String,
    writer: BinaryWriter<W>,
    titles: Vec<String>,
    timestep: f32,
    natoms: Option<usize>,
    has_box: bool,
    /// Number of frames declared in the header on disk.
    nsteps: usize,
    /// Number of frames in the file.
    current: usize,
    buffer: Vec<f32>,
}

impl DcdWriter {
    /// Create a new DCD file. An existing file is truncated.
    pub fn create(filename: impl AsRef<Path>) -> Result<Self, WriteTrajError> {
        let path = filename.as_ref();
        let name = path.to_string_lossy().into_owned();
        let file = File::create(path).map_err(|_| WriteTrajError::CouldNotCreate(name.clone()))?;

        Ok(DcdWriter::new(BufWriter::new(file), name, Endianness::native()))
    }

    /// Open a DCD file for appending. The file is created if it does not exist.
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

        Ok(DcdWriter::from_state(BufWriter::new(file), name, state))
    }
}

impl<W: Write + Seek> DcdWriter<W> {
    /// Write a new DCD trajectory into any seekable stream.
    pub fn from_writer(stream: W) -> Self {
        DcdWriter::new(stream, String::from("stream"), Endianness::native())
    }

    fn new(stream: W, filename: String, endian: Endianness) -> Self {
        DcdWriter {
            filename,
            writer: BinaryWriter::new(stream, endian),
            titles: vec![String::from("REMARKS Created by trajstream")],
            timestep: 1.0,
            natoms: None,
            has_box: false,
            nsteps: 0,
            current: 0,
            buffer: Vec::new(),
        }
    }

    fn from_state(stream: W, filename: String, state: Option<AppendState>) -> Self {
        match state {
            None => DcdWriter::new(stream, filename, Endianness::native()),
            Some(state) => {
                let mut writer = DcdWriter::new(stream, filename, state.endian);
                writer.titles = state.titles;
                writer.timestep = state.timestep;
                writer.natoms = Some(state.natoms);
                writer.has_box = state.has_box;
                writer.nsteps = state.nframes;
                writer.current = state.nframes;
                writer
            }
        }
    }

    /// Set the title lines of the file. Lines are padded or truncated to 80 characters.
    /// Has no effect once the first frame has been written.
    pub fn with_titles(mut self, titles: Vec<String>) -> Self {
        if self.natoms.is_none() {
            self.titles = titles;
        }
        self
    }

    /// Set the time between simulation steps stored in the header.
    pub fn with_timestep(mut self, timestep: f32) -> Self {
        self.timestep = timestep;
        self
    }

    /// Title lines of the file.
    pub fn titles(&self) -> &[String] {
        &self.titles
    }

    /// Write the positions (and the box) of the atoms of the group as a new frame.
    pub fn write_frame(&mut self, group: &AtomicGroup) -> Result<(), WriteTrajError> {
        match self.natoms {
            None => {
                self.natoms = Some(group.len());
                self.has_box = group.has_box();
            }
            Some(natoms) if natoms != group.len() => {
                return Err(WriteTrajError::AtomsNumberMismatch(
                    self.filename.clone(),
                    group.len(),
                    natoms,
                ))
            }
            Some(_) => (),
        }

        let simbox = match (self.has_box, group.get_box()) {
            (true, None) => return Err(WriteTrajError::MissingBox(self.filename.clone())),
            (false, Some(_)) => return Err(WriteTrajError::UnexpectedBox(self.filename.clone())),
            (true, Some(simbox)) => Some(simbox),
            (false, None) => None,
        };

        if self.current >= self.nsteps {
            self.nsteps = self.current + 1;
            self.write_header()?;
        }

        if let Some(simbox) = simbox {
            let lengths = simbox.lengths();
            let angles = if simbox.is_orthogonal() {
                Vector3D::new(90.0, 90.0, 90.0)
            } else {
                simbox.angles()
            };
            let unit_cell = [
                lengths.x as f64,
                angles.z as f64,
                lengths.y as f64,
                angles.y as f64,
                angles.x as f64,
                lengths.z as f64,
            ];
            self.writer
                .write_record_f64(&unit_cell)
                .map_err(|_| self.io_error())?;
        }

        for axis in 0..3 {
            self.buffer.clear();
            self.buffer
                .extend(group.iter().map(|atom| atom.get_position().0[axis]));
            self.writer
                .write_record_f32(&self.buffer)
                .map_err(|_| self.io_error())?;
        }

        self.writer.flush().map_err(|_| self.io_error())?;
        self.current += 1;
        Ok(())
    }

    /// Write the header, title and atom count records at the start of the file
    /// and move back to the end of the file.
    fn write_header(&mut self) -> Result<(), WriteTrajError> {
        let natoms = self.natoms.unwrap_or(0);
        let nsteps = self.nsteps as u32;

        let mut icntrl = [0u32; 20];
        icntrl[0] = nsteps;
        icntrl[1] = 1;
        icntrl[2] = 1;
        icntrl[3] = nsteps;
        icntrl[7] = (3 * natoms as u32).saturating_sub(6);
        icntrl[9] = self.timestep.to_bits();
        icntrl[10] = self.has_box as u32;
        icntrl[19] = DCD_VERSION;

        let mut header = Vec::with_capacity(HEADER_SIZE as usize);
        header.extend_from_slice(b"CORD");
        for word in icntrl {
            header.extend_from_slice(&self.writer.encode_u32(word));
        }

        let mut title_block = Vec::with_capacity(4 + TITLE_LENGTH * self.titles.len());
        title_block.extend_from_slice(&self.writer.encode_u32(self.titles.len() as u32));
        for title in &self.titles {
            let mut line = title.as_bytes().to_vec();
            line.resize(TITLE_LENGTH, b' ');
            title_block.extend_from_slice(&line);
        }

        let natoms_block = self.writer.encode_u32(natoms as u32);

        self.writer
            .get_mut()
            .seek(SeekFrom::Start(0))
            .and_then(|_| self.writer.write_record(&header))
            .and_then(|_| self.writer.write_record(&title_block))
            .and_then(|_| self.writer.write_record(&natoms_block))
            .and_then(|_| self.writer.get_mut().seek(SeekFrom::End(0)))
            .map_err(|_| self.io_error())?;

        Ok(())
    }

    fn io_error(&self) -> WriteTrajError {
        WriteTrajError::CouldNotWrite(self.filename.clone())
    }
}

impl<W: Read + Write + Seek> DcdWriter<W> {
    /// Append frames to a DCD trajectory stored in any seekable stream.
    /// An empty stream is treated as a new trajectory.
    pub fn append_to(mut stream: W) -> Result<Self, WriteTrajError> {
        let name = String::from("stream");
        let state = read_append_state(&mut stream, &name)?;
        stream
            .seek(SeekFrom::End(0))
            .map_err(|_| WriteTrajError::CouldNotWrite(name.clone()))?;

        Ok(DcdWriter::from_state(stream, name, state))
    }
}

/// Read the header of an existing DCD file. Returns `None` for an empty stream.
/// The number of frames is always computed from the size of the file.
fn read_append_state<S: Read + Seek>(
    stream: &mut S,
    filename: &str,
) -> Result<Option<AppendState>, WriteTrajError> {
    let append_error = |message: String| WriteTrajError::CouldNotAppend(filename.to_owned(), message);

    let file_size = stream
        .seek(SeekFrom::End(0))
        .and_then(|size| stream.seek(SeekFrom::Start(0)).map(|_| size))
        .map_err(|e| append_error(e.to_string()))?;

    if file_size == 0 {
        return Ok(None);
    }

    let dcd = Dcd::from_stream(&mut *stream, filename.to_owned())
        .map_err(|e| append_error(e.to_string()))?;

    let data = file_size - dcd.first_frame_pos();
    if data % dcd.frame_size() != 0 {
        return Err(append_error(format!(
            "file contains '{}' bytes of frame data which is not a multiple of the frame size '{}'",
            data,
            dcd.frame_size()
        )));
    }
    let nframes = (data / dcd.frame_size()) as usize;

    crate::colog_info!(
        "Appending to DCD file '{}' containing '{}' frames of '{}' atoms.",
        filename,
        nframes,
        dcd.natoms()
    );

    Ok(Some(AppendState {
        natoms: dcd.natoms(),
        has_box: dcd.has_periodic_box(),
        timestep: dcd.delta(),
        nframes,
        titles: dcd.titles().to_vec(),
        endian: dcd.endianness(),
    }))
}

impl<W: Write + Seek> TrajWrite for DcdWriter<W> {
    fn filename(&self) -> &str {
        &self.filename
    }

    fn write_frame(&mut self, group: &AtomicGroup) -> Result<(), WriteTrajError> {
        DcdWriter::write_frame(self, group)
    }

    fn frames_written(&self) -> usize {
        self.current
    }

    fn flush(&mut self) -> Result<(), WriteTrajError> {
        self.writer.flush().map_err(|_| self.io_error())
    }
}

/******************************/
/*         UNIT TESTS         */
/******************************/

#[cfg(test)]
mod tests {
    use std::io::Cursor;

    use float_cmp::assert_approx_eq;
    use tempfile::NamedTempFile;

    use super::*;
    use crate::structures::atom::Atom;

    /// Build a DCD file by hand.
    fn build_dcd(
        endian: Endianness,
        icntrl: [u32; 20],
        titles: &[&str],
        natoms: usize,
        frames: &[(Option<[f64; 6]>, Vec<[f32; 3]>)],
    ) -> Vec<u8> {
        let mut writer = BinaryWriter::new(Vec::new(), endian);

        let mut header = b"CORD".to_vec();
        for word in icntrl {
            header.extend_from_slice(&writer.encode_u32(word));
        }
        writer.write_record(&header).unwrap();

        let mut title_block = writer.encode_u32(titles.len() as u32).to_vec();
        for title in titles {
            let mut line = title.as_bytes().to_vec();
            line.resize(80, b' ');
            title_block.extend_from_slice(&line);
        }
        writer.write_record(&title_block).unwrap();

        let natoms_block = writer.encode_u32(natoms as u32);
        writer.write_record(&natoms_block).unwrap();

        for (cell, coords) in frames {
            if let Some(cell) = cell {
                writer.write_record_f64(cell).unwrap();
            }
            for axis in 0..3 {
                let values: Vec<f32> = coords.iter().map(|c| c[axis]).collect();
                writer.write_record_f32(&values).unwrap();
            }
        }

        std::mem::take(writer.get_mut())
    }

    fn scenario_frames() -> Vec<Vec<[f32; 3]>> {
        vec![
            vec![[1.0, 2.0, 3.0], [4.0, 5.0, 6.0], [7.0, 8.0, 9.0]],
            vec![[1.5, 2.5, 3.5], [-4.0, -5.0, -6.0], [0.125, 0.25, 0.5]],
            vec![[10.0, 20.0, 30.0], [40.0, 50.0, 60.0], [70.0, 80.0, 90.0]],
        ]
    }

    fn group_from(coords: &[[f32; 3]]) -> AtomicGroup {
        coords
            .iter()
            .enumerate()
            .map(|(i, c)| Atom::new(i + 1, "CA", (*c).into()).with_index(i))
            .collect()
    }

    fn write_to_bytes(frames: &[AtomicGroup]) -> Vec<u8> {
        let mut cursor = Cursor::new(Vec::new());
        {
            let mut writer = DcdWriter::from_writer(&mut cursor).with_timestep(0.5);
            for frame in frames {
                writer.write_frame(frame).unwrap();
            }
        }
        cursor.into_inner()
    }

    fn reader_from(bytes: Vec<u8>) -> TrajReader<Dcd<Cursor<Vec<u8>>>> {
        TrajReader::new(Dcd::from_reader(Cursor::new(bytes)).unwrap()).unwrap()
    }

    #[test]
    fn read_three_atoms_two_frames() {
        let frames = scenario_frames();
        let groups: Vec<AtomicGroup> = frames[..2].iter().map(|f| group_from(f)).collect();
        let mut traj = reader_from(write_to_bytes(&groups));

        assert_eq!(traj.natoms(), 3);
        assert_eq!(traj.nframes(), 2);
        assert!(!traj.has_periodic_box());
        assert!(traj.simbox().is_none());

        for expected in frames[..2].iter() {
            assert!(traj.read_frame().unwrap());
            let coords = traj.coords();
            for (c, e) in coords.iter().zip(expected.iter()) {
                assert_eq!(<[f32; 3]>::from(*c), *e);
            }
        }

        assert!(!traj.read_frame().unwrap());
        assert!(traj.at_end());
    }

    #[test]
    fn header_fields() {
        let groups: Vec<AtomicGroup> = scenario_frames().iter().map(|f| group_from(f)).collect();
        let bytes = write_to_bytes(&groups);

        assert_eq!(u32::from_ne_bytes(bytes[0..4].try_into().unwrap()), 84);
        assert_eq!(&bytes[4..8], b"CORD");

        let traj = reader_from(bytes);
        let dcd = traj.format();
        assert_eq!(dcd.nfile(), 3);
        assert_eq!(dcd.istart(), 1);
        assert_eq!(dcd.nsavc(), 1);
        assert_eq!(dcd.nsteps(), 3);
        assert_eq!(dcd.nfixed(), 0);
        assert_eq!(dcd.icntrl(7), Some(3));
        assert_eq!(dcd.icntrl(19), Some(24));
        assert_eq!(dcd.icntrl(20), None);
        assert_eq!(dcd.delta(), 0.5);
        assert!(dcd.native_format());
        assert_eq!(dcd.titles(), &["REMARKS Created by trajstream".to_owned()]);
    }

    #[test]
    fn step_and_time() {
        let groups: Vec<AtomicGroup> = scenario_frames().iter().map(|f| group_from(f)).collect();
        let mut traj = reader_from(write_to_bytes(&groups));

        assert!(traj.read_frame().unwrap());
        assert_eq!(traj.current_step(), 1);
        assert!(traj.read_frame().unwrap());
        assert_eq!(traj.current_step(), 2);
        assert_approx_eq!(f32, traj.current_time(), 1.0);
        assert_approx_eq!(f32, traj.timestep(), 0.5);
    }

    #[test]
    fn byte_swapped() {
        let mut icntrl = [0u32; 20];
        icntrl[0] = 2;
        icntrl[1] = 10;
        icntrl[2] = 5;
        icntrl[9] = 2.0f32.to_bits();
        icntrl[10] = 1;

        let frames = scenario_frames();
        let cell = Some([12.0, 90.0, 14.0, 90.0, 90.0, 16.0]);
        let bytes = build_dcd(
            Endianness::Big,
            icntrl,
            &["big endian title"],
            3,
            &[(cell, frames[0].clone()), (cell, frames[1].clone())],
        );

        let mut traj = reader_from(bytes);
        assert!(!traj.format().native_format());
        assert_eq!(traj.format().endianness(), Endianness::Big);
        assert_eq!(traj.format().titles(), &["big endian title".to_owned()]);
        assert_eq!(traj.nframes(), 2);
        assert!(traj.has_periodic_box());
        assert_approx_eq!(f32, traj.timestep(), 2.0);

        assert!(traj.read_frame().unwrap());
        assert!(traj.read_frame().unwrap());
        assert_eq!(traj.current_step(), 15);
        assert_eq!(traj.periodic_box(), Vector3D::new(12.0, 14.0, 16.0));
        assert_eq!(traj.format().xcoords(), &[1.5, -4.0, 0.125]);
        assert_eq!(traj.format().ycoords(), &[2.5, -5.0, 0.25]);
        assert_eq!(traj.format().zcoords(), &[3.5, -6.0, 0.5]);
        assert!(!traj.read_frame().unwrap());
    }

    #[test]
    fn fixed_atoms_rejected() {
        let mut icntrl = [0u32; 20];
        icntrl[0] = 1;
        icntrl[8] = 2;
        let bytes = build_dcd(
            Endianness::Little,
            icntrl,
            &[],
            3,
            &[(None, scenario_frames()[0].clone())],
        );

        match Dcd::from_reader(Cursor::new(bytes)) {
            Err(ReadTrajError::FixedAtomsUnsupported(file, n)) => {
                assert_eq!(file, "stream");
                assert_eq!(n, 2);
            }
            other => panic!("Unexpected result: {:?}", other),
        }
    }

    #[test]
    fn invalid_headers() {
        assert_eq!(
            Dcd::from_reader(Cursor::new(Vec::new())).unwrap_err(),
            ReadTrajError::FileEmpty("stream".to_owned())
        );

        assert_eq!(
            Dcd::from_reader(Cursor::new(vec![1u8, 2, 3, 4, 5, 6, 7, 8])).unwrap_err(),
            ReadTrajError::UnknownEndianness("stream".to_owned())
        );

        let mut bytes = build_dcd(Endianness::Little, [0; 20], &[], 3, &[]);
        bytes[4..8].copy_from_slice(b"VELD");
        assert_eq!(
            Dcd::from_reader(Cursor::new(bytes)).unwrap_err(),
            ReadTrajError::MissingCordMarker("stream".to_owned())
        );

        let bytes = build_dcd(Endianness::Little, [0; 20], &[], 3, &[]);
        assert!(matches!(
            Dcd::from_reader(Cursor::new(bytes[..60].to_vec())),
            Err(ReadTrajError::UnexpectedEof(_, _))
        ));
    }

    #[test]
    fn first_frame_missing() {
        let bytes = build_dcd(Endianness::Little, [0; 20], &["no frames"], 3, &[]);
        let dcd = Dcd::from_reader(Cursor::new(bytes)).unwrap();
        assert_eq!(dcd.frame_count(), Some(0));

        assert_eq!(
            TrajReader::new(dcd).err(),
            Some(ReadTrajError::FirstFrameMissing("stream".to_owned()))
        );
    }

    #[test]
    fn atom_count_too_large() {
        let mut icntrl = [0u32; 20];
        icntrl[0] = 1;

        let bytes = build_dcd(Endianness::Little, icntrl, &[], u32::MAX as usize, &[]);
        assert_eq!(bytes.len(), 116);
        assert_eq!(
            Dcd::from_reader(Cursor::new(bytes)).unwrap_err(),
            ReadTrajError::InvalidHeader(
                "stream".to_owned(),
                "number of atoms '4294967295' is too large".to_owned()
            )
        );

        let bytes = build_dcd(
            Endianness::Little,
            icntrl,
            &[],
            100_000_000,
            &[(None, scenario_frames()[0].clone())],
        );
        assert_eq!(
            Dcd::from_reader(Cursor::new(bytes)).unwrap_err(),
            ReadTrajError::InvalidHeader(
                "stream".to_owned(),
                "'100000000' atoms require '1200000024' bytes per frame but the file only contains '60' bytes of frame data"
                    .to_owned()
            )
        );
    }

    #[test]
    fn large_atom_count_without_frames() {
        let mut icntrl = [0u32; 20];
        icntrl[0] = 1;

        let bytes = build_dcd(Endianness::Little, icntrl, &[], 1_000_000_000, &[]);
        let dcd = Dcd::from_reader(Cursor::new(bytes)).unwrap();
        assert_eq!(dcd.natoms(), 1_000_000_000);
        assert!(dcd.xcoords().is_empty());
        assert_eq!(
            dcd.mapped_coords(&[0]).unwrap_err(),
            ReadTrajError::AtomIndexOutOfRange(
                "stream".to_owned(),
                "mapping coords".to_owned(),
                0,
                0
            )
        );

        assert_eq!(
            TrajReader::new(dcd).err(),
            Some(ReadTrajError::FirstFrameMissing("stream".to_owned()))
        );
    }

    #[test]
    fn derived_frame_count() {
        let frames = scenario_frames();
        let data: Vec<_> = frames.iter().map(|f| (None, f.clone())).collect();
        let bytes = build_dcd(Endianness::Little, [0; 20], &[], 3, &data);

        let mut traj = reader_from(bytes);
        assert_eq!(traj.frame_count(), Some(3));
        assert!(traj.read_frame_at(2).unwrap());
        assert_eq!(traj.format().xcoords(), &[10.0, 40.0, 70.0]);
    }

    #[test]
    fn unknown_frame_count() {
        let frames = scenario_frames();
        let data: Vec<_> = frames[..2].iter().map(|f| (None, f.clone())).collect();
        let mut bytes = build_dcd(Endianness::Little, [0; 20], &[], 3, &data);
        bytes.extend_from_slice(&[0, 0, 0]);

        let mut traj = reader_from(bytes);
        assert_eq!(traj.frame_count(), None);
        assert_eq!(traj.nframes(), 0);

        assert_eq!(
            traj.read_frame_at(1).unwrap_err(),
            ReadTrajError::IndexedAccessUnavailable("stream".to_owned(), 1)
        );
        assert_eq!(
            traj.seek_frame(0).unwrap_err(),
            ReadTrajError::IndexedAccessUnavailable("stream".to_owned(), 0)
        );

        assert!(traj.read_frame().unwrap());
        assert!(traj.read_frame().unwrap());
        assert_eq!(traj.format().zcoords(), &[3.5, -6.0, 0.5]);
        assert!(matches!(
            traj.read_frame(),
            Err(ReadTrajError::UnexpectedEof(_, _))
        ));
    }

    #[test]
    fn truncated_frame() {
        let groups: Vec<AtomicGroup> = scenario_frames().iter().map(|f| group_from(f)).collect();
        let mut bytes = write_to_bytes(&groups);
        bytes.truncate(bytes.len() - 20);

        let mut traj = reader_from(bytes);
        assert!(traj.read_frame().unwrap());
        assert!(traj.read_frame().unwrap());
        assert_eq!(
            traj.read_frame().unwrap_err(),
            ReadTrajError::UnexpectedEof("stream".to_owned(), "reading frame 2".to_owned())
        );
    }

    #[test]
    fn orthogonal_box_roundtrip() {
        let frames = scenario_frames();
        let groups: Vec<AtomicGroup> = frames
            .iter()
            .map(|f| group_from(f).with_box([10.0, 20.0, 30.0].into()))
            .collect();

        let mut traj = reader_from(write_to_bytes(&groups));
        assert!(traj.has_periodic_box());
        assert_eq!(traj.nframes(), 3);

        let mut group = AtomicGroup::with_n_atoms(3);
        while traj.read_frame().unwrap() {
            traj.update_group_coords(&mut group).unwrap();
            assert_eq!(traj.periodic_box(), Vector3D::new(10.0, 20.0, 30.0));
            assert_eq!(traj.format().crystal_params(), [10.0, 20.0, 30.0, 90.0, 90.0, 90.0]);

            let simbox = group.get_box().unwrap();
            assert_approx_eq!(f32, simbox.v1x, 10.0, epsilon = 1e-5);
            assert_approx_eq!(f32, simbox.v2y, 20.0, epsilon = 1e-5);
            assert_approx_eq!(f32, simbox.v3z, 30.0, epsilon = 1e-5);
            assert_approx_eq!(f32, simbox.v2x, 0.0, epsilon = 1e-5);
            assert_approx_eq!(f32, simbox.v3x, 0.0, epsilon = 1e-5);
            assert_approx_eq!(f32, simbox.v3y, 0.0, epsilon = 1e-5);
        }
    }

    #[test]
    fn triclinic_box_roundtrip() {
        let simbox = SimBox::from_lengths_angles([50.0, 40.0, 30.0].into(), [80.0, 70.0, 120.0].into());
        let group = group_from(&scenario_frames()[0]).with_box(simbox.clone());

        let traj = reader_from(write_to_bytes(&[group]));
        let read = traj.simbox().unwrap();
        assert_approx_eq!(f32, read.v1x, simbox.v1x, epsilon = 1e-2);
        assert_approx_eq!(f32, read.v2x, simbox.v2x, epsilon = 1e-2);
        assert_approx_eq!(f32, read.v2y, simbox.v2y, epsilon = 1e-2);
        assert_approx_eq!(f32, read.v3x, simbox.v3x, epsilon = 1e-2);
        assert_approx_eq!(f32, read.v3y, simbox.v3y, epsilon = 1e-2);
        assert_approx_eq!(f32, read.v3z, simbox.v3z, epsilon = 1e-2);
    }

    #[test]
    fn box_angles_as_cosines() {
        let mut icntrl = [0u32; 20];
        icntrl[10] = 1;
        let cell = Some([25.0, 0.0, 26.0, 0.0, 0.0, 27.0]);
        let bytes = build_dcd(
            Endianness::Little,
            icntrl,
            &[],
            3,
            &[(cell, scenario_frames()[0].clone())],
        );

        let traj = reader_from(bytes);
        let simbox = traj.simbox().unwrap();
        assert_approx_eq!(f32, simbox.v1x, 25.0, epsilon = 1e-4);
        assert_approx_eq!(f32, simbox.v2y, 26.0, epsilon = 1e-4);
        assert_approx_eq!(f32, simbox.v3z, 27.0, epsilon = 1e-4);
        assert_approx_eq!(f32, simbox.v2x, 0.0, epsilon = 1e-4);
        assert_approx_eq!(f32, simbox.v3x, 0.0, epsilon = 1e-4);
        assert_approx_eq!(f32, simbox.v3y, 0.0, epsilon = 1e-4);
    }

    #[test]
    fn writer_requires_box() {
        let frames = scenario_frames();
        let mut cursor = Cursor::new(Vec::new());
        let mut writer = DcdWriter::from_writer(&mut cursor);

        writer
            .write_frame(&group_from(&frames[0]).with_box([5.0, 5.0, 5.0].into()))
            .unwrap();
        assert_eq!(
            writer.write_frame(&group_from(&frames[1])),
            Err(WriteTrajError::MissingBox("stream".to_owned()))
        );
        assert_eq!(
            writer.write_frame(&AtomicGroup::with_n_atoms(4).with_box([5.0, 5.0, 5.0].into())),
            Err(WriteTrajError::AtomsNumberMismatch("stream".to_owned(), 4, 3))
        );
        assert_eq!(writer.frames_written(), 1);
    }

    #[test]
    fn writer_rejects_late_box() {
        let frames = scenario_frames();
        let mut cursor = Cursor::new(Vec::new());
        {
            let mut writer = DcdWriter::from_writer(&mut cursor);

            writer.write_frame(&group_from(&frames[0])).unwrap();
            assert_eq!(
                writer.write_frame(&group_from(&frames[1]).with_box([5.0, 5.0, 5.0].into())),
                Err(WriteTrajError::UnexpectedBox("stream".to_owned()))
            );
            writer.write_frame(&group_from(&frames[2])).unwrap();
            assert_eq!(writer.frames_written(), 2);
        }

        let traj = reader_from(cursor.into_inner());
        assert!(!traj.has_periodic_box());
        assert_eq!(traj.nframes(), 2);
    }

    #[test]
    fn boundaries_and_rewind() {
        let frames = scenario_frames();
        let groups: Vec<AtomicGroup> = frames.iter().map(|f| group_from(f)).collect();
        let mut traj = reader_from(write_to_bytes(&groups));

        while traj.read_frame().unwrap() {}
        assert!(traj.at_end());
        assert!(!traj.read_frame().unwrap());
        assert!(!traj.read_frame().unwrap());

        for _ in 0..2 {
            assert!(traj.rewind().unwrap());
            assert_eq!(traj.current_frame(), 0);
            assert!(!traj.at_end());
            assert!(traj.read_frame().unwrap());
            assert_eq!(traj.format().xcoords(), &[1.0, 4.0, 7.0]);
            assert!(traj.read_frame().unwrap());
            assert_eq!(traj.format().xcoords(), &[1.5, -4.0, 0.125]);
        }

        assert_eq!(
            traj.read_frame_at(3).unwrap_err(),
            ReadTrajError::FrameOutOfRange("stream".to_owned(), 3, 3)
        );
    }

    #[test]
    fn seek_matches_sequential() {
        let frames = scenario_frames();
        let groups: Vec<AtomicGroup> = frames.iter().map(|f| group_from(f)).collect();
        let bytes = write_to_bytes(&groups);

        let mut sequential = reader_from(bytes.clone());
        let mut expected = Vec::new();
        while sequential.read_frame().unwrap() {
            expected.push(sequential.coords());
        }

        let mut traj = reader_from(bytes);
        assert!(traj.read_frame_at(1).unwrap());
        assert_eq!(traj.coords(), expected[1]);
        assert_eq!(traj.current_step(), 2);
        assert!(traj.read_frame().unwrap());
        assert_eq!(traj.coords(), expected[2]);
        assert!(!traj.read_frame().unwrap());

        assert!(traj.read_frame_at(0).unwrap());
        assert_eq!(traj.coords(), expected[0]);

        traj.seek_frame(2).unwrap();
        assert!(traj.parse_frame().unwrap());
        assert_eq!(traj.coords(), expected[2]);
    }

    #[test]
    fn group_index_errors() {
        let groups: Vec<AtomicGroup> = scenario_frames().iter().map(|f| group_from(f)).collect();
        let traj = reader_from(write_to_bytes(&groups));

        let mut group = AtomicGroup::from_atoms(vec![
            Atom::new(1, "CA", Vector3D::default()).with_index(0),
            Atom::new(2, "CB", Vector3D::default()).with_index(5),
        ]);
        assert_eq!(
            traj.update_group_coords(&mut group).unwrap_err(),
            ReadTrajError::AtomIndexOutOfRange(
                "stream".to_owned(),
                "updating group coords".to_owned(),
                5,
                3
            )
        );

        let mut group = AtomicGroup::from_atoms(vec![Atom::new(8, "CA", Vector3D::default())]);
        assert_eq!(
            traj.update_group_coords(&mut group).unwrap_err(),
            ReadTrajError::AtomIndexNotSet(
                "stream".to_owned(),
                "updating group coords".to_owned(),
                8
            )
        );

        assert_eq!(
            traj.format().mapped_coords(&[2, 3]).unwrap_err(),
            ReadTrajError::AtomIndexOutOfRange(
                "stream".to_owned(),
                "mapping coords".to_owned(),
                3,
                3
            )
        );
    }

    #[test]
    fn sparse_group_update() {
        let frames = scenario_frames();
        let groups: Vec<AtomicGroup> = frames.iter().map(|f| group_from(f)).collect();
        let mut traj = reader_from(write_to_bytes(&groups));

        let mut subset = AtomicGroup::with_n_atoms(3).subset(&[2, 0]);
        assert!(traj.read_frame().unwrap());
        traj.update_group_coords(&mut subset).unwrap();
        assert_eq!(*subset[0].get_position(), Vector3D::new(7.0, 8.0, 9.0));
        assert_eq!(*subset[1].get_position(), Vector3D::new(1.0, 2.0, 3.0));
        assert!(!subset.has_box());

        assert_eq!(
            traj.format().mapped_coords(&[1]).unwrap(),
            vec![Vector3D::new(4.0, 5.0, 6.0)]
        );
    }

    #[test]
    fn velocities_from_coordinates() {
        let groups: Vec<AtomicGroup> = scenario_frames().iter().map(|f| group_from(f)).collect();
        let mut dcd = Dcd::from_reader(Cursor::new(write_to_bytes(&groups))).unwrap();
        dcd.set_velocity_conversion_factor(2.0);
        let mut traj = TrajReader::new(dcd).unwrap();

        assert!(!traj.has_velocities());
        assert_eq!(
            traj.velocity_source(),
            crate::io::traj_read::VelocitySource::FromCoordinates { factor: 2.0 }
        );

        assert!(traj.read_frame().unwrap());
        let mut group = AtomicGroup::with_n_atoms(3);
        traj.update_group_velocities(&mut group).unwrap();
        assert_eq!(
            *group[1].get_velocity().unwrap(),
            Vector3D::new(8.0, 10.0, 12.0)
        );
        assert_eq!(traj.velocities()[2], Vector3D::new(14.0, 16.0, 18.0));
    }

    #[test]
    fn append_to_file() {
        let frames = scenario_frames();
        let file = NamedTempFile::new().unwrap();
        let path = file.path();

        {
            let mut writer = DcdWriter::create(path)
                .unwrap()
                .with_titles(vec!["first".to_owned(), "second".to_owned()])
                .with_timestep(0.25);
            writer.write_frame(&group_from(&frames[0])).unwrap();
            writer.write_frame(&group_from(&frames[1])).unwrap();
        }

        {
            let mut writer = DcdWriter::append(path).unwrap();
            assert_eq!(writer.titles(), &["first".to_owned(), "second".to_owned()]);
            assert_eq!(
                writer.write_frame(&AtomicGroup::with_n_atoms(5)),
                Err(WriteTrajError::AtomsNumberMismatch(
                    path.to_string_lossy().into_owned(),
                    5,
                    3
                ))
            );
            writer.write_frame(&group_from(&frames[2])).unwrap();
        }

        let mut traj = DcdReader::open(path).unwrap();
        assert_eq!(traj.nframes(), 3);
        assert_eq!(traj.format().nfile(), 3);
        assert_eq!(traj.format().titles().len(), 2);
        assert_approx_eq!(f32, traj.timestep(), 0.25);

        let mut read = Vec::new();
        while traj.read_frame().unwrap() {
            read.push(traj.format().xcoords().to_vec());
        }
        assert_eq!(
            read,
            vec![
                vec![1.0, 4.0, 7.0],
                vec![1.5, -4.0, 0.125],
                vec![10.0, 40.0, 70.0]
            ]
        );
    }

    #[test]
    fn append_to_swapped_stream() {
        let mut icntrl = [0u32; 20];
        icntrl[0] = 1;
        icntrl[1] = 1;
        icntrl[2] = 1;
        let bytes = build_dcd(
            Endianness::Big,
            icntrl,
            &["swapped"],
            3,
            &[(None, scenario_frames()[0].clone())],
        );

        let mut cursor = Cursor::new(bytes);
        {
            let mut writer = DcdWriter::append_to(&mut cursor).unwrap();
            writer
                .write_frame(&group_from(&scenario_frames()[1]))
                .unwrap();
            assert_eq!(writer.frames_written(), 2);
        }

        let mut traj = reader_from(cursor.into_inner());
        assert_eq!(traj.format().endianness(), Endianness::Big);
        assert_eq!(traj.nframes(), 2);
        assert_eq!(traj.format().titles(), &["swapped".to_owned()]);
        assert!(traj.read_frame_at(1).unwrap());
        assert_eq!(traj.format().ycoords(), &[2.5, -5.0, 0.25]);
    }

    #[test]
    fn append_to_empty_stream() {
        let mut cursor = Cursor::new(Vec::new());
        {
            let mut writer = DcdWriter::append_to(&mut cursor).unwrap();
            writer
                .write_frame(&group_from(&scenario_frames()[0]))
                .unwrap();
        }

        let traj = reader_from(cursor.into_inner());
        assert_eq!(traj.nframes(), 1);
        assert_eq!(traj.natoms(), 3);
    }

    #[test]
    fn open_missing_file() {
        assert!(matches!(
            DcdReader::open("this_file_does_not_exist.dcd"),
            Err(ReadTrajError::FileNotFound(_))
        ));
    }
}
