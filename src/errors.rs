// Released under MIT License.
// Copyright (c) 2023-2025 Ladislav Bartos

//! Implementation of errors that can be returned by the library.

use colored::{ColoredString, Colorize};
use thiserror::Error;

/// Name of the file or stream highlighted for an error message.
fn file_to_yellow(name: &str) -> ColoredString {
    name.yellow()
}

/// Errors that can occur when opening or reading a trajectory file.
#[derive(Error, Debug, PartialEq, Eq)]
pub enum ReadTrajError {
    #[error("{} file '{}' was not found or could not be opened", "error:".red().bold(), file_to_yellow(.0))]
    FileNotFound(String),

    #[error("{} file '{}' is empty", "error:".red().bold(), file_to_yellow(.0))]
    FileEmpty(String),

    #[error("{} could not detect endianness of file '{}' (first record marker is not 84)", "error:".red().bold(), file_to_yellow(.0))]
    UnknownEndianness(String),

    #[error("{} invalid header in file '{}': {}", "error:".red().bold(), file_to_yellow(.0), .1)]
    InvalidHeader(String, String),

    #[error("{} file '{}' does not contain the 'CORD' marker", "error:".red().bold(), file_to_yellow(.0))]
    MissingCordMarker(String),

    #[error("{} record length mismatch in file '{}': expected '{}' bytes, found '{}' bytes", "error:".red().bold(), file_to_yellow(.0), .1.to_string().yellow(), .2.to_string().yellow())]
    RecordLengthMismatch(String, u32, u32),

    #[error("{} file '{}' ended unexpectedly while {}", "error:".red().bold(), file_to_yellow(.0), .1)]
    UnexpectedEof(String, String),

    #[error("{} invalid magic number '{}' in file '{}' (expected '{}')", "error:".red().bold(), .1.to_string().yellow(), file_to_yellow(.0), .2.to_string().yellow())]
    InvalidMagic(String, i32, i32),

    #[error("{} file '{}' contains '{}' fixed atoms which are not supported", "error:".red().bold(), file_to_yellow(.0), .1.to_string().yellow())]
    FixedAtomsUnsupported(String, u32),

    #[error("{} number of atoms in file '{}' changed from '{}' to '{}'", "error:".red().bold(), file_to_yellow(.0), .1.to_string().yellow(), .2.to_string().yellow())]
    AtomsNumberMismatch(String, usize, usize),

    #[error("{} corrupted frame in file '{}': {}", "error:".red().bold(), file_to_yellow(.0), .1)]
    CorruptedFrame(String, String),

    #[error("{} could not seek to frame '{}' in file '{}'", "error:".red().bold(), .1.to_string().yellow(), file_to_yellow(.0))]
    SeekFailed(String, usize),

    #[error("{} could not read the first frame of file '{}'", "error:".red().bold(), file_to_yellow(.0))]
    FirstFrameMissing(String),

    #[error("{} frame '{}' is out of range for file '{}' containing '{}' frames", "error:".red().bold(), .1.to_string().yellow(), file_to_yellow(.0), .2.to_string().yellow())]
    FrameOutOfRange(String, usize, usize),

    #[error("{} {} for file '{}': atom with id '{}' has no index set", "error:".red().bold(), .1, file_to_yellow(.0), .2.to_string().yellow())]
    AtomIndexNotSet(String, String, usize),

    #[error("{} {} for file '{}': atom index '{}' is out of range for '{}' atoms", "error:".red().bold(), .1, file_to_yellow(.0), .2.to_string().yellow(), .3.to_string().yellow())]
    AtomIndexOutOfRange(String, String, usize, usize),

    #[error("{} frame '{}' can not be accessed directly in file '{}' with an unknown number of frames", "error:".red().bold(), .1.to_string().yellow(), file_to_yellow(.0))]
    IndexedAccessUnavailable(String, usize),

    #[error("{} file '{}' has unknown or unsupported trajectory format", "error:".red().bold(), file_to_yellow(.0))]
    UnknownFormat(String),
}

/// Errors that can occur when writing a trajectory file.
#[derive(Error, Debug, PartialEq, Eq)]
pub enum WriteTrajError {
    #[error("{} file '{}' could not be created", "error:".red().bold(), file_to_yellow(.0))]
    CouldNotCreate(String),

    #[error("{} could not write frame into file '{}'", "error:".red().bold(), file_to_yellow(.0))]
    CouldNotWrite(String),

    #[error("{} frame with '{}' atoms can not be written into file '{}' containing '{}' atoms", "error:".red().bold(), .1.to_string().yellow(), file_to_yellow(.0), .2.to_string().yellow())]
    AtomsNumberMismatch(String, usize, usize),

    #[error("{} group has no simulation box but file '{}' requires one", "error:".red().bold(), file_to_yellow(.0))]
    MissingBox(String),

    #[error("{} group has a simulation box but file '{}' was started without one", "error:".red().bold(), file_to_yellow(.0))]
    UnexpectedBox(String),

    #[error("{} could not compress coordinates for file '{}': {}", "error:".red().bold(), file_to_yellow(.0), .1)]
    CoordinateOverflow(String, CodecError),

    #[error("{} file '{}' has unknown or unsupported trajectory format", "error:".red().bold(), file_to_yellow(.0))]
    UnknownFormat(String),

    #[error("{} could not append to file '{}': {}", "error:".red().bold(), file_to_yellow(.0), .1)]
    CouldNotAppend(String, String),
}

/// Errors raised by the XTC integer compression codec.
#[derive(Error, Debug, PartialEq, Eq, Clone)]
pub enum CodecError {
    #[error("scaled coordinate or coordinate range exceeds the 32-bit integer budget")]
    Overflow,

    #[error("value '{}' does not fit into size '{}'", .0.to_string().yellow(), .1.to_string().yellow())]
    SizeMismatch(u64, u64),

    #[error("attempted to read past the end of the compressed buffer")]
    BufferOverrun,

    #[error("small index '{}' is outside of the lookup table", .0.to_string().yellow())]
    InvalidSmallIndex(i32),

    #[error("invalid integer range: minimum '{}' is larger than maximum '{}'", .0.to_string().yellow(), .1.to_string().yellow())]
    InvalidRange(i32, i32),

    #[error("decoded more atoms than the frame declares ('{}')", .0.to_string().yellow())]
    RunOverflow(usize),
}
