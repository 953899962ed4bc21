// Released under MIT License.
// Copyright (c) 2023-2025 Ladislav Bartos

//! Implementation of the generic trajectory reader.
//!
//! `TrajRead` is implemented by every supported trajectory format and describes how to parse,
//! seek and access one frame. `TrajReader` wraps any `TrajRead` implementation and provides
//! the frame iteration state machine shared by all formats:
//!
//! - the first frame is parsed when the reader is constructed (and cached),
//! - `read_frame` advances exactly one frame and returns `Ok(false)` at the end of the trajectory,
//! - `read_frame_at` jumps to an arbitrary frame and continues the sequential reading from there,
//! - `rewind` returns to the first frame.
//!
//! A trajectory reader owns its stream and frame buffers and performs no internal synchronization.
//! **Do not share one reader between threads.** To analyze a trajectory in parallel,
//! open a separate reader for each worker thread.

use std::path::Path;

use getset::{CopyGetters, Getters};

use crate::errors::ReadTrajError;
use crate::io::{dcd_io::DcdReader, xtc_io::XtcReader};
use crate::progress::{ProgressPrinter, ProgressStatus};
use crate::structures::{atom::Atom, group::AtomicGroup, simbox::SimBox, vector3d::Vector3D};

/// Operation name reported by atom index errors when updating coordinates.
pub(crate) const UPDATING_COORDS: &str = "updating group coords";
/// Operation name reported by atom index errors when updating velocities.
pub(crate) const UPDATING_VELOCITIES: &str = "updating group velocities";

/// Any trajectory format must implement this trait to be readable using `TrajReader`.
///
/// Implementations own the stream and the buffers of the current frame.
/// `parse_frame` is the only method allowed to modify the frame buffers.
pub trait TrajRead {
    /// Name of the file that is read, or `"stream"` for borrowed streams.
    fn filename(&self) -> &str;

    /// Short description of the trajectory format.
    fn description(&self) -> &'static str;

    /// Number of atoms in each frame. Constant for the whole trajectory.
    fn natoms(&self) -> usize;

    /// Total number of frames or `None` if the number of frames could not be determined.
    fn frame_count(&self) -> Option<usize>;

    /// Returns `true` if the trajectory contains periodic box information.
    fn has_periodic_box(&self) -> bool;

    /// Dimensions of the periodic box of the current frame (in Å).
    fn periodic_box(&self) -> Vector3D;

    /// Full simulation box of the current frame (in Å), if present.
    fn simbox(&self) -> Option<SimBox>;

    /// Time between two simulation steps.
    fn timestep(&self) -> f32;

    /// Simulation step of the current frame.
    fn current_step(&self) -> i64;

    /// Simulation time of the current frame.
    fn current_time(&self) -> f32;

    /// Position of the atom with the given index in the current frame (in Å).
    /// `index` must be lower than `natoms()`.
    fn coord(&self, index: usize) -> Vector3D;

    /// Returns `true` if the format stores velocities natively.
    fn has_velocities(&self) -> bool {
        false
    }

    /// Native velocity of the atom with the given index in the current frame.
    fn velocity(&self, _index: usize) -> Option<Vector3D> {
        None
    }

    /// Factor converting values stored in the coordinate channel into velocities.
    fn velocity_conversion_factor(&self) -> f32 {
        1.0
    }

    /// Parse the frame at the current position of the stream into the frame buffers.
    ///
    /// Returns
    /// - `Ok(true)` if the frame has been read,
    /// - `Ok(false)` if the stream ended before the frame started (normal end of the trajectory),
    /// - `Err` if the frame is malformed or truncated.
    fn parse_frame(&mut self) -> Result<bool, ReadTrajError>;

    /// Position the stream at the start of the frame with the given index.
    fn seek_frame(&mut self, index: usize) -> Result<(), ReadTrajError>;

    /// Position the stream at the start of the first frame.
    fn rewind_stream(&mut self) -> Result<(), ReadTrajError>;

    /// Copy positions from the current frame into the atoms of the group
    /// using their `index` property. Also sets the simulation box of the group
    /// if the trajectory is periodic.
    fn copy_group_coords(&self, group: &mut AtomicGroup) -> Result<(), ReadTrajError> {
        let natoms = self.natoms();
        for atom in group.iter_mut() {
            let index = checked_index(atom, natoms, self.filename(), UPDATING_COORDS)?;
            atom.set_position(self.coord(index));
        }

        if self.has_periodic_box() {
            if let Some(simbox) = self.simbox() {
                group.set_box(simbox);
            }
        }

        Ok(())
    }
}

/// Get the index of the atom and check that it addresses a valid slot of a frame.
pub(crate) fn checked_index(
    atom: &Atom,
    natoms: usize,
    filename: &str,
    operation: &str,
) -> Result<usize, ReadTrajError> {
    match atom.get_index() {
        None => Err(ReadTrajError::AtomIndexNotSet(
            filename.to_owned(),
            operation.to_owned(),
            atom.get_id(),
        )),
        Some(index) if index >= natoms => Err(ReadTrajError::AtomIndexOutOfRange(
            filename.to_owned(),
            operation.to_owned(),
            index,
            natoms,
        )),
        Some(index) => Ok(index),
    }
}

/// Check that the atoms of the group can be used to read a trajectory.
///
/// In debug builds, all atoms are checked. In release builds, only the first atom is checked.
/// Indices of the remaining atoms are still bounds-checked when the coordinates are copied.
pub(crate) fn validate_group(
    group: &AtomicGroup,
    natoms: usize,
    filename: &str,
    operation: &str,
) -> Result<(), ReadTrajError> {
    if cfg!(debug_assertions) {
        for atom in group.iter() {
            checked_index(atom, natoms, filename, operation)?;
        }
    } else if let Some(atom) = group.get_atoms().first() {
        checked_index(atom, natoms, filename, operation)?;
    }

    Ok(())
}

/// Source of the velocities provided by a trajectory reader.
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum VelocitySource {
    /// The trajectory stores velocities.
    Native,
    /// The trajectory stores velocities in the coordinate channel.
    /// Velocities are obtained by scaling the coordinates using the conversion factor.
    FromCoordinates { factor: f32 },
}

/// Position of a `TrajReader` in the trajectory.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, CopyGetters)]
pub struct FrameCursor {
    /// Index of the frame currently stored in the buffers.
    /// Equal to the number of frames once the end of the trajectory is reached.
    #[getset(get_copy = "pub")]
    current_frame: usize,
    /// The first frame has been parsed but not yet returned by `read_frame`.
    #[getset(get_copy = "pub")]
    cached_first: bool,
    /// End of stream has been reached (only used if the number of frames is unknown).
    exhausted: bool,
}

/// Frame-by-frame reader of a trajectory of any supported format.
///
/// ## Example
/// Reading all frames of a trajectory and updating a group of atoms.
/// ```no_run
/// use trajstream::prelude::*;
///
/// let mut model = AtomicGroup::with_n_atoms(1024);
/// let mut traj = XtcReader::open("trajectory.xtc").unwrap();
///
/// while traj.read_frame().unwrap() {
///     traj.update_group_coords(&mut model).unwrap();
///     // analyze the frame
/// }
/// ```
pub struct TrajReader<F: TrajRead + ?Sized> {
    cursor: FrameCursor,
    velocity_logged: bool,
    format: F,
}

impl<F: TrajRead> TrajReader<F> {
    /// Wrap a trajectory format into `TrajReader` and read its first frame.
    ///
    /// The stream of the format must be positioned at the start of the first frame.
    /// Returns `ReadTrajError::FirstFrameMissing` if the first frame could not be read.
    pub fn new(mut format: F) -> Result<Self, ReadTrajError> {
        if !format.parse_frame()? {
            return Err(ReadTrajError::FirstFrameMissing(
                format.filename().to_owned(),
            ));
        }

        Ok(TrajReader {
            cursor: FrameCursor {
                current_frame: 0,
                cached_first: true,
                exhausted: false,
            },
            velocity_logged: false,
            format,
        })
    }

    /// Unwrap the trajectory format.
    pub fn into_inner(self) -> F {
        self.format
    }
}

impl<F: TrajRead + ?Sized> TrajReader<F> {
    /// Access the format-specific part of the reader.
    pub fn format(&self) -> &F {
        &self.format
    }

    /// Name of the trajectory file.
    pub fn filename(&self) -> &str {
        self.format.filename()
    }

    /// Short description of the trajectory format.
    pub fn description(&self) -> &'static str {
        self.format.description()
    }

    /// Number of atoms in each frame.
    pub fn natoms(&self) -> usize {
        self.format.natoms()
    }

    /// Total number of frames in the trajectory.
    /// Returns 0 if the number of frames could not be determined
    /// (the trajectory can still be read sequentially).
    pub fn nframes(&self) -> usize {
        self.format.frame_count().unwrap_or(0)
    }

    /// Total number of frames in the trajectory or `None` if it is not known.
    pub fn frame_count(&self) -> Option<usize> {
        self.format.frame_count()
    }

    /// Index of the frame currently stored in the reader.
    pub fn current_frame(&self) -> usize {
        self.cursor.current_frame
    }

    /// Current position of the reader.
    pub fn cursor(&self) -> FrameCursor {
        self.cursor
    }

    /// Returns `true` if all frames have been read.
    pub fn at_end(&self) -> bool {
        match self.format.frame_count() {
            Some(n) => self.cursor.current_frame >= n,
            None => self.cursor.exhausted,
        }
    }

    /// Read the next frame of the trajectory.
    ///
    /// ## Returns
    /// - `Ok(true)` if the frame has been read,
    /// - `Ok(false)` if there are no more frames to read,
    /// - `Err(ReadTrajError)` if a frame was expected to exist but could not be read.
    pub fn read_frame(&mut self) -> Result<bool, ReadTrajError> {
        if self.at_end() {
            return Ok(false);
        }

        if self.cursor.cached_first {
            self.cursor.cached_first = false;
            return Ok(true);
        }

        self.cursor.current_frame += 1;
        if self.at_end() {
            return Ok(false);
        }

        match self.format.parse_frame()? {
            true => Ok(true),
            false => match self.format.frame_count() {
                Some(_) => Err(ReadTrajError::UnexpectedEof(
                    self.filename().to_owned(),
                    format!("reading frame {}", self.cursor.current_frame),
                )),
                None => {
                    self.cursor.exhausted = true;
                    Ok(false)
                }
            },
        }
    }

    /// Read the frame with the specified index.
    /// Sequential reading using `read_frame` continues from the following frame.
    ///
    /// Returns `ReadTrajError::FrameOutOfRange` if the frame does not exist
    /// and `ReadTrajError::IndexedAccessUnavailable` if the number of frames is not known.
    pub fn read_frame_at(&mut self, index: usize) -> Result<bool, ReadTrajError> {
        if index == 0 && self.cursor.cached_first {
            self.cursor.cached_first = false;
            return Ok(true);
        }

        self.seek_frame(index)?;
        if self.format.parse_frame()? {
            Ok(true)
        } else {
            Err(ReadTrajError::SeekFailed(self.filename().to_owned(), index))
        }
    }

    /// Position the reader at the frame with the specified index without reading it.
    /// Use `parse_frame` to read the frame.
    ///
    /// Returns `ReadTrajError::IndexedAccessUnavailable` if the number of frames
    /// of the trajectory is not known. Such trajectories can only be read sequentially.
    pub fn seek_frame(&mut self, index: usize) -> Result<(), ReadTrajError> {
        match self.format.frame_count() {
            Some(n) if index >= n => {
                return Err(ReadTrajError::FrameOutOfRange(
                    self.filename().to_owned(),
                    index,
                    n,
                ))
            }
            Some(_) => (),
            None => {
                return Err(ReadTrajError::IndexedAccessUnavailable(
                    self.filename().to_owned(),
                    index,
                ))
            }
        }

        self.cursor.cached_first = false;
        self.cursor.exhausted = false;
        self.cursor.current_frame = index;
        self.format.seek_frame(index)
    }

    /// Parse the frame at the current position of the reader.
    /// Returns `Ok(false)` at the end of the stream.
    pub fn parse_frame(&mut self) -> Result<bool, ReadTrajError> {
        self.format.parse_frame()
    }

    /// Return to the first frame of the trajectory and read it.
    /// The next call to `read_frame` returns the first frame again.
    pub fn rewind(&mut self) -> Result<bool, ReadTrajError> {
        self.format.rewind_stream()?;
        self.cursor = FrameCursor::default();

        if !self.format.parse_frame()? {
            return Err(ReadTrajError::FirstFrameMissing(
                self.filename().to_owned(),
            ));
        }

        self.cursor.cached_first = true;
        Ok(true)
    }

    /// Returns `true` if the trajectory contains periodic box information.
    pub fn has_periodic_box(&self) -> bool {
        self.format.has_periodic_box()
    }

    /// Periodic box dimensions of the current frame (in Å).
    pub fn periodic_box(&self) -> Vector3D {
        self.format.periodic_box()
    }

    /// Full simulation box of the current frame (in Å).
    pub fn simbox(&self) -> Option<SimBox> {
        self.format.simbox()
    }

    /// Time between two simulation steps.
    pub fn timestep(&self) -> f32 {
        self.format.timestep()
    }

    /// Simulation step of the current frame.
    pub fn current_step(&self) -> i64 {
        self.format.current_step()
    }

    /// Simulation time of the current frame.
    pub fn current_time(&self) -> f32 {
        self.format.current_time()
    }

    /// Copy of the coordinates of the current frame (in Å).
    pub fn coords(&self) -> Vec<Vector3D> {
        (0..self.natoms()).map(|i| self.format.coord(i)).collect()
    }

    /// Returns `true` if the trajectory stores velocities natively.
    pub fn has_velocities(&self) -> bool {
        self.format.has_velocities()
    }

    /// Factor used to convert coordinates into velocities for formats without native velocities.
    pub fn velocity_conversion_factor(&self) -> f32 {
        self.format.velocity_conversion_factor()
    }

    /// Where the velocities returned by the reader come from.
    pub fn velocity_source(&self) -> VelocitySource {
        if self.format.has_velocities() {
            VelocitySource::Native
        } else {
            VelocitySource::FromCoordinates {
                factor: self.format.velocity_conversion_factor(),
            }
        }
    }

    /// Velocities of the current frame.
    ///
    /// If the format does not store velocities, the coordinates
    /// scaled by `velocity_conversion_factor` are returned.
    /// Check `velocity_source` before treating them as real velocities.
    pub fn velocities(&self) -> Vec<Vector3D> {
        (0..self.natoms()).map(|i| self.velocity_of(i)).collect()
    }

    #[inline]
    fn velocity_of(&self, index: usize) -> Vector3D {
        match self.format.velocity(index) {
            Some(velocity) => velocity,
            None => self.format.coord(index) * self.format.velocity_conversion_factor(),
        }
    }

    /// Update the positions of the atoms of the group using the current frame.
    ///
    /// The `index` property of each atom selects the atom of the frame.
    /// Returns `ReadTrajError::AtomIndexNotSet` if an atom has no index and
    /// `ReadTrajError::AtomIndexOutOfRange` if an index exceeds the number of atoms in the frame.
    ///
    /// ## Notes
    /// - Presence of the index property is checked for all atoms only in debug builds.
    /// In release builds, only the first atom is checked up front.
    pub fn update_group_coords(&self, group: &mut AtomicGroup) -> Result<(), ReadTrajError> {
        validate_group(group, self.natoms(), self.filename(), UPDATING_COORDS)?;
        self.format.copy_group_coords(group)
    }

    /// Update the velocities of the atoms of the group using the current frame.
    /// See `velocities` for the source of the velocities.
    pub fn update_group_velocities(
        &mut self,
        group: &mut AtomicGroup,
    ) -> Result<(), ReadTrajError> {
        validate_group(group, self.natoms(), self.filename(), UPDATING_VELOCITIES)?;

        if !self.velocity_logged {
            if let VelocitySource::FromCoordinates { factor } = self.velocity_source() {
                crate::colog_debug!(
                    "Trajectory '{}' has no velocities. Using coordinates scaled by '{}'.",
                    self.filename(),
                    factor
                );
            }
            self.velocity_logged = true;
        }

        let natoms = self.natoms();
        for atom in group.iter_mut() {
            let index = checked_index(atom, natoms, self.format.filename(), UPDATING_VELOCITIES)?;
            atom.set_velocity(self.velocity_of(index));
        }

        Ok(())
    }

    /// Snapshot of the current frame.
    pub fn frame(&self) -> Frame {
        Frame {
            index: self.cursor.current_frame,
            step: self.current_step(),
            time: self.current_time(),
            coords: self.coords(),
            periodic_box: if self.has_periodic_box() {
                self.simbox()
            } else {
                None
            },
        }
    }

    /// Iterate over the remaining frames of the trajectory.
    ///
    /// ## Example
    /// ```no_run
    /// use trajstream::prelude::*;
    ///
    /// let mut traj = DcdReader::open("trajectory.dcd").unwrap();
    /// for frame in traj.frames().print_progress(ProgressPrinter::new()) {
    ///     let frame = frame.unwrap();
    ///     println!("{} {}", frame.index(), frame.coords()[0].x);
    /// }
    /// ```
    pub fn frames(&mut self) -> FrameIterator<'_, F> {
        FrameIterator {
            reader: self,
            printer: None,
            finished: false,
        }
    }
}

/// Owned copy of a single trajectory frame.
#[derive(Debug, Clone, PartialEq, Getters, CopyGetters)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub struct Frame {
    /// Index of the frame in the trajectory.
    #[getset(get_copy = "pub")]
    index: usize,
    /// Simulation step of the frame.
    #[getset(get_copy = "pub")]
    step: i64,
    /// Simulation time of the frame.
    #[getset(get_copy = "pub")]
    time: f32,
    /// Coordinates of all atoms (in Å).
    #[getset(get = "pub")]
    coords: Vec<Vector3D>,
    /// Simulation box of the frame (in Å).
    #[getset(get = "pub")]
    periodic_box: Option<SimBox>,
}

/// Iterator over the frames of a trajectory. Constructed using `TrajReader::frames`.
pub struct FrameIterator<'a, F: TrajRead + ?Sized> {
    reader: &'a mut TrajReader<F>,
    printer: Option<ProgressPrinter>,
    finished: bool,
}

impl<'a, F: TrajRead + ?Sized> FrameIterator<'a, F> {
    /// Print the progress of the iteration using the provided `ProgressPrinter`.
    pub fn print_progress(mut self, printer: ProgressPrinter) -> Self {
        self.printer = Some(printer);
        self
    }

    fn report(&mut self, status: ProgressStatus) {
        if let Some(printer) = self.printer.as_mut() {
            printer.set_status(status);
            printer.print(
                self.reader.current_frame(),
                self.reader.current_step(),
                self.reader.current_time(),
            );
        }
    }
}

impl<'a, F: TrajRead + ?Sized> Iterator for FrameIterator<'a, F> {
    type Item = Result<Frame, ReadTrajError>;

    fn next(&mut self) -> Option<Self::Item> {
        if self.finished {
            return None;
        }

        match self.reader.read_frame() {
            Ok(true) => {
                self.report(ProgressStatus::Running);
                Some(Ok(self.reader.frame()))
            }
            Ok(false) => {
                self.finished = true;
                self.report(ProgressStatus::Completed);
                None
            }
            Err(e) => {
                self.finished = true;
                self.report(ProgressStatus::Failed);
                Some(Err(e))
            }
        }
    }
}

/// Open a trajectory file, selecting the format based on the file extension
/// (`dcd` or `xtc`), and check that `model` can be used to read it.
///
/// ## Example
/// ```no_run
/// use trajstream::prelude::*;
///
/// let mut model = AtomicGroup::with_n_atoms(3000);
/// let mut traj = open_trajectory("md.xtc", &model).unwrap();
///
/// while traj.read_frame().unwrap() {
///     traj.update_group_coords(&mut model).unwrap();
/// }
/// ```
pub fn open_trajectory(
    filename: impl AsRef<Path>,
    model: &AtomicGroup,
) -> Result<Box<TrajReader<dyn TrajRead>>, ReadTrajError> {
    let path = filename.as_ref();
    let extension = path
        .extension()
        .and_then(|ext| ext.to_str())
        .map(|ext| ext.to_ascii_lowercase());

    let reader: Box<TrajReader<dyn TrajRead>> = match extension.as_deref() {
        Some("dcd") => Box::new(DcdReader::open(path)?),
        Some("xtc") => Box::new(XtcReader::open(path)?),
        _ => {
            return Err(ReadTrajError::UnknownFormat(
                path.to_string_lossy().into_owned(),
            ))
        }
    };

    validate_group(model, reader.natoms(), reader.filename(), UPDATING_COORDS)?;
    Ok(reader)
}

/******************************/
/*         UNIT TESTS         */
/******************************/
