// Released under MIT License.
// Copyright (c) 2023-2025 Ladislav Bartos

//! # trajstream: Streaming DCD and XTC trajectory I/O
//!
//! Rust library for reading and writing molecular simulation trajectories
//! in the CHARMM/NAMD DCD format and the Gromacs XTC format.
//!
//! ## Usage
//!
//! Run
//!
//! ```bash
//! $ cargo add trajstream
//! ```
//!
//! Import the crate in your Rust code:
//! ```
//! use trajstream::prelude::*;
//! ```
//!
//! ## Examples
//!
//! #### Reading a trajectory
//!
//! Read a DCD trajectory frame by frame and calculate the center of geometry of all atoms in each frame.
//!
//! ```no_run
//! use trajstream::prelude::*;
//! use std::error::Error;
//!
//! fn main() -> Result<(), Box<dyn Error>> {
//!     let mut traj = DcdReader::open("trajectory.dcd")?;
//!     let mut atoms = AtomicGroup::with_n_atoms(traj.natoms());
//!
//!     while traj.read_frame()? {
//!         traj.update_group_coords(&mut atoms)?;
//!
//!         let sum = atoms
//!             .iter()
//!             .fold(Vector3D::default(), |acc, atom| acc + *atom.get_position());
//!         let center = sum * (1.0 / atoms.len() as f32);
//!
//!         println!("{:8} {:12.3} {:?}", traj.current_step(), traj.current_time(), center);
//!     }
//!
//!     Ok(())
//! }
//! ```
//!
//! #### Random access
//!
//! XTC and DCD readers support jumping to any frame of the trajectory.
//! Sequential reading then continues from the following frame.
//!
//! ```no_run
//! use trajstream::prelude::*;
//! use std::error::Error;
//!
//! fn main() -> Result<(), Box<dyn Error>> {
//!     let mut traj = XtcReader::open("trajectory.xtc")?;
//!
//!     traj.read_frame_at(traj.nframes() / 2)?;
//!     println!("Middle frame at {} ps.", traj.current_time());
//!
//!     while traj.read_frame()? {
//!         // frames of the second half
//!     }
//!
//!     Ok(())
//! }
//! ```
//!
//! #### Converting a trajectory
//!
//! Read any supported trajectory and write it into an XTC file.
//!
//! ```no_run
//! use trajstream::prelude::*;
//! use std::error::Error;
//!
//! fn main() -> Result<(), Box<dyn Error>> {
//!     let mut atoms = AtomicGroup::with_n_atoms(2048);
//!     let mut traj = open_trajectory("input.dcd", &atoms)?;
//!     let mut writer = XtcWriter::create("output.xtc")?
//!         .with_precision(1000.0)
//!         .with_time_per_step(traj.timestep());
//!
//!     while traj.read_frame()? {
//!         traj.update_group_coords(&mut atoms)?;
//!         writer.write_frame(&atoms)?;
//!     }
//!
//!     Ok(())
//! }
//! ```
//!
//! ## Units
//! All coordinates and box dimensions accepted and returned by the library are in Ångströms.
//! XTC files store nanometers and the conversion is performed internally.
//!
//! ## Threading
//! Readers and writers are not synchronized. To process a trajectory in parallel,
//! open a separate reader for each thread.
//!
//! ## Features
//! - `serde`: serialization and deserialization of `Vector3D`, `SimBox`, `Atom`, `AtomicGroup`, `Endianness` and `Frame`.

/// Current version of the `trajstream` library.
pub const TRAJSTREAM_VERSION: &str = env!("CARGO_PKG_VERSION");

pub mod errors;
pub mod io {
    pub mod binary;
    pub mod dcd_io;
    pub mod traj_read;
    pub mod traj_write;
    pub mod xtc_codec;
    pub mod xtc_io;
}
pub mod progress;
pub mod structures {
    pub mod atom;
    pub mod group;
    pub mod simbox;
    pub mod vector3d;
}
mod test_utilities;

/// Log colored info message.
#[macro_export]
macro_rules! colog_info {
    ($msg:expr) => {
        log::info!($msg)
    };
    ($msg:expr, $($arg:expr),+ $(,)?) => {{
        use colored::Colorize;
        log::info!($msg, $( $arg.to_string().cyan() ),+)
    }};
}

/// Log colored warning message.
#[macro_export]
macro_rules! colog_warn {
    ($msg:expr) => {
        log::warn!($msg)
    };
    ($msg:expr, $($arg:expr),+ $(,)?) => {{
        use colored::Colorize;
        log::warn!($msg, $( $arg.to_string().yellow() ),+)
    }};
}

/// Log colored debug message.
#[macro_export]
macro_rules! colog_debug {
    ($msg:expr) => {
        log::debug!($msg)
    };
    ($msg:expr, $($arg:expr),+ $(,)?) => {{
        use colored::Colorize;
        log::debug!($msg, $( $arg.to_string().blue() ),+)
    }};
}

/// Reexported basic `trajstream` structures, traits and functions.
pub mod prelude {
    pub use crate::errors::{CodecError, ReadTrajError, WriteTrajError};
    pub use crate::io::binary::Endianness;
    pub use crate::io::dcd_io::{Dcd, DcdReader, DcdWriter};
    pub use crate::io::traj_read::{
        open_trajectory, Frame, FrameCursor, FrameIterator, TrajRead, TrajReader, VelocitySource,
    };
    pub use crate::io::traj_write::{open_writer, TrajWrite};
    pub use crate::io::xtc_codec::{CompressedCoords, CoordCodec};
    pub use crate::io::xtc_io::{Xtc, XtcHeader, XtcReader, XtcWriter};
    pub use crate::progress::{ProgressPrinter, ProgressStatus};
    pub use crate::structures::atom::Atom;
    pub use crate::structures::group::AtomicGroup;
    pub use crate::structures::simbox::SimBox;
    pub use crate::structures::vector3d::Vector3D;
}
