// Released under MIT License.
// Copyright (c) 2023-2025 Ladislav Bartos

//! Traits and functions for writing trajectory files.

use std::path::Path;

use crate::errors::WriteTrajError;
use crate::io::{dcd_io::DcdWriter, xtc_io::XtcWriter};
use crate::structures::group::AtomicGroup;

/// Any trajectory writer must implement this trait.
///
/// Writers take coordinates in Å. Every call to `write_frame` appends one frame
/// to the output and the written data are readable as soon as `flush` returns.
pub trait TrajWrite {
    /// Name of the file that is written, or `"stream"` for borrowed streams.
    fn filename(&self) -> &str;

    /// Append the positions of the atoms of the group (and its simulation box) as a new frame.
    fn write_frame(&mut self, group: &AtomicGroup) -> Result<(), WriteTrajError>;

    /// Number of frames in the output, including frames that were present before appending.
    fn frames_written(&self) -> usize;

    /// Flush all buffered data into the output.
    fn flush(&mut self) -> Result<(), WriteTrajError>;
}

/// Open a trajectory writer, selecting the format based on the file extension (`dcd` or `xtc`).
///
/// If `append` is `true`, frames are appended to an existing file (which is created if it does not exist).
/// Otherwise, the file is truncated.
///
/// ## Example
/// ```no_run
/// use trajstream::prelude::*;
///
/// let group = AtomicGroup::with_n_atoms(16).with_box(SimBox::from([40.0, 40.0, 40.0]));
/// let mut writer = open_writer("output.dcd", false).unwrap();
/// writer.write_frame(&group).unwrap();
/// writer.flush().unwrap();
/// ```
pub fn open_writer(
    filename: impl AsRef<Path>,
    append: bool,
) -> Result<Box<dyn TrajWrite>, WriteTrajError> {
    let path = filename.as_ref();
    let extension = path
        .extension()
        .and_then(|ext| ext.to_str())
        .map(|ext| ext.to_ascii_lowercase());

    match (extension.as_deref(), append) {
        (Some("dcd"), false) => Ok(Box::new(DcdWriter::create(path)?)),
        (Some("dcd"), true) => Ok(Box::new(DcdWriter::append(path)?)),
        (Some("xtc"), false) => Ok(Box::new(XtcWriter::create(path)?)),
        (Some("xtc"), true) => Ok(Box::new(XtcWriter::append(path)?)),
        _ => Err(WriteTrajError::UnknownFormat(
            path.to_string_lossy().into_owned(),
        )),
    }
}

/******************************/
/*         UNIT TESTS         */
/******************************/
