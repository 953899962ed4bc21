// Released under MIT License.
// Copyright (c) 2023-2025 Ladislav Bartos

//! Endian-aware primitives for reading and writing binary trajectory files.
//!
//! Two framing conventions are supported:
//! - Fortran unformatted records (`[len][payload][len]`) used by DCD files,
//! - packed big-endian XDR words with opaque blocks padded to 4 bytes used by XTC files.
//!
//! Every multi-byte value goes through a single endian-aware conversion so that
//! swapped and unswapped reads can never be mixed within one file.

use std::io::{ErrorKind, Read, Seek, SeekFrom, Write};

use crate::errors::ReadTrajError;

/// Byte order of a binary file.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub enum Endianness {
    Little,
    Big,
}

impl Endianness {
    /// Byte order of the machine the code is running on.
    pub fn native() -> Self {
        if cfg!(target_endian = "big") {
            Endianness::Big
        } else {
            Endianness::Little
        }
    }

    /// Returns `true` if values in this byte order must be swapped on the current machine.
    pub fn is_swapped(&self) -> bool {
        *self != Endianness::native()
    }

    /// Detect the byte order of a file from its first 4-byte word which must equal `expected`.
    /// Returns `None` if the word matches `expected` in neither byte order.
    pub fn detect(word: [u8; 4], expected: u32) -> Option<Self> {
        if u32::from_le_bytes(word) == expected {
            Some(Endianness::Little)
        } else if u32::from_be_bytes(word) == expected {
            Some(Endianness::Big)
        } else {
            None
        }
    }
}

/// Low-level failure of a binary read.
#[derive(Debug, Clone, PartialEq, Eq)]
pub(crate) enum BinaryError {
    /// Stream ended before the first byte of the requested item.
    Eof,
    /// Stream ended in the middle of the requested item.
    Truncated,
    /// Fortran record marker does not match the expected length.
    LengthMismatch { expected: u32, found: u32 },
    /// Record of this many values can not be described by a 32-bit length marker.
    RecordTooLong(usize),
    /// Any other I/O failure.
    Io(ErrorKind),
}

impl From<std::io::Error> for BinaryError {
    fn from(e: std::io::Error) -> Self {
        match e.kind() {
            ErrorKind::UnexpectedEof => BinaryError::Truncated,
            kind => BinaryError::Io(kind),
        }
    }
}

impl BinaryError {
    /// Convert a low-level failure into an error reported to the user.
    /// `context` describes what was being read (e.g. `"reading frame 3"`).
    pub(crate) fn into_read_error(self, filename: &str, context: &str) -> ReadTrajError {
        match self {
            BinaryError::Eof | BinaryError::Truncated => {
                ReadTrajError::UnexpectedEof(filename.to_owned(), context.to_owned())
            }
            BinaryError::LengthMismatch { expected, found } => {
                ReadTrajError::RecordLengthMismatch(filename.to_owned(), expected, found)
            }
            BinaryError::RecordTooLong(n) => ReadTrajError::CorruptedFrame(
                filename.to_owned(),
                format!("record of '{}' values is too long while {}", n, context),
            ),
            BinaryError::Io(kind) => ReadTrajError::CorruptedFrame(
                filename.to_owned(),
                format!("i/o failure ({}) while {}", kind, context),
            ),
        }
    }
}

macro_rules! read_primitive {
    ($name:ident, $try_name:ident, $t:ty, $size:expr) => {
        #[allow(dead_code)]
        #[inline]
        pub(crate) fn $name(&mut self) -> Result<$t, BinaryError> {
            let bytes = self.read_array::<{ $size }>()?;
            Ok(match self.endian {
                Endianness::Little => <$t>::from_le_bytes(bytes),
                Endianness::Big => <$t>::from_be_bytes(bytes),
            })
        }

        #[allow(dead_code)]
        #[inline]
        pub(crate) fn $try_name(&mut self) -> Result<Option<$t>, BinaryError> {
            match self.$name() {
                Ok(value) => Ok(Some(value)),
                Err(BinaryError::Eof) => Ok(None),
                Err(e) => Err(e),
            }
        }
    };
}

/// Endian-aware reader of binary trajectory data.
#[derive(Debug)]
pub(crate) struct BinaryReader<R> {
    inner: R,
    endian: Endianness,
    /// Scratch buffer reused for bulk reads.
    scratch: Vec<u8>,
}

impl<R> BinaryReader<R> {
    /// Wrap a stream. The byte order can be changed later using `set_endianness`.
    pub(crate) fn new(inner: R, endian: Endianness) -> Self {
        BinaryReader {
            inner,
            endian,
            scratch: Vec::new(),
        }
    }

    pub(crate) fn endianness(&self) -> Endianness {
        self.endian
    }

    pub(crate) fn set_endianness(&mut self, endian: Endianness) {
        self.endian = endian;
    }

    /// Decode a 32-bit unsigned value from 4 bytes using the byte order of the reader.
    pub(crate) fn decode_u32(&self, bytes: [u8; 4]) -> u32 {
        match self.endian {
            Endianness::Little => u32::from_le_bytes(bytes),
            Endianness::Big => u32::from_be_bytes(bytes),
        }
    }
}

impl<R: Read> BinaryReader<R> {

    /// Read as many bytes as possible into `buf`. Returns the number of bytes read.
    fn fill(&mut self, buf: &mut [u8]) -> Result<usize, BinaryError> {
        let mut filled = 0;
        while filled < buf.len() {
            match self.inner.read(&mut buf[filled..]) {
                Ok(0) => break,
                Ok(n) => filled += n,
                Err(e) if e.kind() == ErrorKind::Interrupted => continue,
                Err(e) => return Err(e.into()),
            }
        }

        Ok(filled)
    }

    /// Read exactly `buf.len()` bytes. Distinguishes clean end of stream from truncation.
    pub(crate) fn read_exact(&mut self, buf: &mut [u8]) -> Result<(), BinaryError> {
        match self.fill(buf)? {
            n if n == buf.len() => Ok(()),
            0 => Err(BinaryError::Eof),
            _ => Err(BinaryError::Truncated),
        }
    }

    #[inline]
    fn read_array<const N: usize>(&mut self) -> Result<[u8; N], BinaryError> {
        let mut bytes = [0u8; N];
        self.read_exact(&mut bytes)?;
        Ok(bytes)
    }

    /// Read a raw 4-byte word without any byte order conversion.
    pub(crate) fn read_raw_word(&mut self) -> Result<[u8; 4], BinaryError> {
        self.read_array::<4>()
    }

    read_primitive!(read_u32, try_read_u32, u32, 4);
    read_primitive!(read_i32, try_read_i32, i32, 4);
    read_primitive!(read_f32, try_read_f32, f32, 4);
    read_primitive!(read_f64, try_read_f64, f64, 8);

    /// Fill `out` with consecutive 32-bit floats.
    pub(crate) fn read_f32_into(&mut self, out: &mut [f32]) -> Result<(), BinaryError> {
        let mut scratch = std::mem::take(&mut self.scratch);
        scratch.resize(out.len() * 4, 0);

        let result = self.read_exact(&mut scratch);
        if result.is_ok() {
            let endian = self.endian;
            for (value, chunk) in out.iter_mut().zip(scratch.chunks_exact(4)) {
                let bytes = [chunk[0], chunk[1], chunk[2], chunk[3]];
                *value = match endian {
                    Endianness::Little => f32::from_le_bytes(bytes),
                    Endianness::Big => f32::from_be_bytes(bytes),
                };
            }
        }

        self.scratch = scratch;
        result
    }

    /// Fill `out` with consecutive 64-bit floats.
    pub(crate) fn read_f64_into(&mut self, out: &mut [f64]) -> Result<(), BinaryError> {
        for value in out.iter_mut() {
            *value = self.read_f64().map_err(|e| match e {
                BinaryError::Eof => BinaryError::Truncated,
                other => other,
            })?;
        }

        Ok(())
    }

    /// Read an XDR opaque block of `len` bytes into `out` and skip the padding to 4 bytes.
    pub(crate) fn read_opaque(&mut self, len: usize, out: &mut Vec<u8>) -> Result<(), BinaryError> {
        out.resize(len, 0);
        self.read_exact(out)?;

        let padding = (4 - len % 4) % 4;
        if padding > 0 {
            let mut pad = [0u8; 4];
            self.read_exact(&mut pad[..padding])
                .map_err(|_| BinaryError::Truncated)?;
        }

        Ok(())
    }

    /// Read the leading marker of a Fortran record.
    /// Returns `BinaryError::Eof` if the stream ended cleanly before the record.
    pub(crate) fn begin_record(&mut self, expected: Option<u32>) -> Result<u32, BinaryError> {
        let len = self.read_u32()?;
        match expected {
            Some(exp) if exp != len => Err(BinaryError::LengthMismatch {
                expected: exp,
                found: len,
            }),
            _ => Ok(len),
        }
    }

    /// Read the trailing marker of a Fortran record and check it against the leading one.
    pub(crate) fn end_record(&mut self, len: u32) -> Result<(), BinaryError> {
        let trailing = self.read_u32().map_err(|e| match e {
            BinaryError::Eof => BinaryError::Truncated,
            other => other,
        })?;

        if trailing != len {
            return Err(BinaryError::LengthMismatch {
                expected: len,
                found: trailing,
            });
        }

        Ok(())
    }

    /// Read a complete Fortran record of raw bytes.
    pub(crate) fn read_record_bytes(
        &mut self,
        expected: Option<u32>,
    ) -> Result<Vec<u8>, BinaryError> {
        let len = self.begin_record(expected)?;
        let mut payload = vec![0u8; len as usize];
        self.read_exact(&mut payload).map_err(truncated)?;
        self.end_record(len)?;
        Ok(payload)
    }

    /// Read a complete Fortran record containing exactly `out.len()` 32-bit floats.
    pub(crate) fn read_record_f32(&mut self, out: &mut [f32]) -> Result<(), BinaryError> {
        let len = self.begin_record(Some(record_length(out.len(), 4)?))?;
        self.read_f32_into(out).map_err(truncated)?;
        self.end_record(len)
    }

    /// Read a complete Fortran record containing exactly `out.len()` 64-bit floats.
    pub(crate) fn read_record_f64(&mut self, out: &mut [f64]) -> Result<(), BinaryError> {
        let len = self.begin_record(Some(record_length(out.len(), 8)?))?;
        self.read_f64_into(out)?;
        self.end_record(len)
    }
}

impl<R: Read + Seek> BinaryReader<R> {
    /// Current position in the stream.
    pub(crate) fn position(&mut self) -> Result<u64, BinaryError> {
        Ok(self.inner.stream_position()?)
    }

    /// Jump to an absolute position in the stream.
    pub(crate) fn seek_to(&mut self, position: u64) -> Result<(), BinaryError> {
        self.inner.seek(SeekFrom::Start(position))?;
        Ok(())
    }

    /// Skip `len` bytes forward.
    pub(crate) fn skip(&mut self, len: u64) -> Result<(), BinaryError> {
        self.inner.seek(SeekFrom::Current(len as i64))?;
        Ok(())
    }

    /// Total length of the stream. The current position is preserved.
    pub(crate) fn stream_len(&mut self) -> Result<u64, BinaryError> {
        let current = self.inner.stream_position()?;
        let len = self.inner.seek(SeekFrom::End(0))?;
        self.inner.seek(SeekFrom::Start(current))?;
        Ok(len)
    }
}

/// Length in bytes of a record holding `n` values of `size` bytes.
#[inline]
fn record_length(n: usize, size: u32) -> Result<u32, BinaryError> {
    u32::try_from(n)
        .ok()
        .and_then(|n| n.checked_mul(size))
        .ok_or(BinaryError::RecordTooLong(n))
}

/// Clean end of stream inside an already started item means truncation.
#[inline]
fn truncated(e: BinaryError) -> BinaryError {
    match e {
        BinaryError::Eof => BinaryError::Truncated,
        other => other,
    }
}

/// Endian-aware writer of binary trajectory data.
#[derive(Debug)]
pub(crate) struct BinaryWriter<W> {
    inner: W,
    endian: Endianness,
}

impl<W: Write> BinaryWriter<W> {
    pub(crate) fn new(inner: W, endian: Endianness) -> Self {
        BinaryWriter { inner, endian }
    }

    pub(crate) fn get_mut(&mut self) -> &mut W {
        &mut self.inner
    }

    pub(crate) fn write_u32(&mut self, value: u32) -> std::io::Result<()> {
        match self.endian {
            Endianness::Little => self.inner.write_all(&value.to_le_bytes()),
            Endianness::Big => self.inner.write_all(&value.to_be_bytes()),
        }
    }

    pub(crate) fn write_i32(&mut self, value: i32) -> std::io::Result<()> {
        self.write_u32(value as u32)
    }

    pub(crate) fn write_f32(&mut self, value: f32) -> std::io::Result<()> {
        self.write_u32(value.to_bits())
    }

    pub(crate) fn write_f64(&mut self, value: f64) -> std::io::Result<()> {
        match self.endian {
            Endianness::Little => self.inner.write_all(&value.to_le_bytes()),
            Endianness::Big => self.inner.write_all(&value.to_be_bytes()),
        }
    }

    pub(crate) fn write_f32_slice(&mut self, values: &[f32]) -> std::io::Result<()> {
        let mut buffer = Vec::with_capacity(values.len() * 4);
        for value in values {
            match self.endian {
                Endianness::Little => buffer.extend_from_slice(&value.to_le_bytes()),
                Endianness::Big => buffer.extend_from_slice(&value.to_be_bytes()),
            }
        }
        self.inner.write_all(&buffer)
    }

    /// Write an XDR opaque block padded with zeros to a multiple of 4 bytes.
    pub(crate) fn write_opaque(&mut self, bytes: &[u8]) -> std::io::Result<()> {
        self.inner.write_all(bytes)?;
        let padding = (4 - bytes.len() % 4) % 4;
        self.inner.write_all(&[0u8; 4][..padding])
    }

    /// Write a Fortran record containing raw bytes.
    pub(crate) fn write_record(&mut self, payload: &[u8]) -> std::io::Result<()> {
        self.write_u32(payload.len() as u32)?;
        self.inner.write_all(payload)?;
        self.write_u32(payload.len() as u32)
    }

    /// Write a Fortran record containing 32-bit floats.
    pub(crate) fn write_record_f32(&mut self, values: &[f32]) -> std::io::Result<()> {
        let len = values.len() as u32 * 4;
        self.write_u32(len)?;
        self.write_f32_slice(values)?;
        self.write_u32(len)
    }

    /// Write a Fortran record containing 64-bit floats.
    pub(crate) fn write_record_f64(&mut self, values: &[f64]) -> std::io::Result<()> {
        let len = values.len() as u32 * 8;
        self.write_u32(len)?;
        for &value in values {
            self.write_f64(value)?;
        }
        self.write_u32(len)
    }

    /// Encode a 32-bit unsigned value into 4 bytes using the byte order of the writer.
    pub(crate) fn encode_u32(&self, value: u32) -> [u8; 4] {
        match self.endian {
            Endianness::Little => value.to_le_bytes(),
            Endianness::Big => value.to_be_bytes(),
        }
    }

    pub(crate) fn flush(&mut self) -> std::io::Result<()> {
        self.inner.flush()
    }
}

/******************************/
/*         UNIT TESTS         */
/******************************/
