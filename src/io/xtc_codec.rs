// Released under MIT License.
// Copyright (c) 2023-2025 Ladislav Bartos

//! Integer compression codec used by the XTC format.
//!
//! Coordinates are scaled by a precision factor and rounded to integers.
//! Every atom is either written directly (packed using the bounding box of the frame)
//! or, if it lies close to the previous atom, as a small delta inside a "run".
//! The width of the small deltas adapts between atoms using the `MAGICINTS` table.
//!
//! The codec works in file units (nanometers). Conversion to Ångströms happens in the XTC reader and writer.

use crate::errors::CodecError;

/// Lookup table of the small-delta ranges. Each entry is approximately 2^(1/3) times larger than the previous one.
pub const MAGICINTS: [i32; 73] = [
    0, 0, 0, 0, 0, 0, 0, 0, 0, 8, 10, 12, 16, 20, 25, 32, 40, 50, 64, 80, 101, 128, 161, 203, 256,
    322, 406, 512, 645, 812, 1024, 1290, 1625, 2048, 2580, 3250, 4096, 5060, 6501, 8192, 10321,
    13003, 16384, 20642, 26007, 32768, 41285, 52015, 65536, 82570, 104031, 131072, 165140, 208063,
    262144, 330280, 416127, 524287, 660561, 832255, 1048576, 1321122, 1664510, 2097152, 2642245,
    3329021, 4194304, 5284491, 6658042, 8388607, 10568983, 13316085, 16777216,
];

/// First usable index into `MAGICINTS`.
pub const FIRSTIDX: usize = 9;
/// Number of entries in `MAGICINTS`.
pub const LASTIDX: usize = MAGICINTS.len();

/// Largest valid small index.
const MAX_SMALLIDX: usize = LASTIDX - 1;

/// Maximal number of run-length encoded values (8 atoms, 3 values each).
const MAX_RUN: usize = 24;

/// Scaled coordinates must stay below this absolute value.
const MAX_SCALED: f32 = (i32::MAX - 2) as f32;

/// Calculate the number of bits necessary to represent `size`.
pub fn size_of_int(size: u32) -> u32 {
    let mut num: u64 = 1;
    let mut bits = 0;
    while size as u64 >= num && bits < 32 {
        bits += 1;
        num <<= 1;
    }

    bits
}

/// Calculate the number of bits necessary to represent the product of `sizes`
/// (i.e. the number of bits needed to pack one value of each size together).
pub fn size_of_ints(sizes: &[u32]) -> u32 {
    let mut bytes = [0u32; 32];
    bytes[0] = 1;
    let mut nbytes = 1;

    for &size in sizes {
        let mut tmp: u64 = 0;
        let mut bytecnt = 0;
        while bytecnt < nbytes {
            tmp += bytes[bytecnt] as u64 * size as u64;
            bytes[bytecnt] = (tmp & 0xff) as u32;
            tmp >>= 8;
            bytecnt += 1;
        }

        while tmp != 0 {
            bytes[bytecnt] = (tmp & 0xff) as u32;
            bytecnt += 1;
            tmp >>= 8;
        }

        nbytes = bytecnt;
    }

    let mut num = 1;
    let mut bits = 0;
    nbytes -= 1;
    while bytes[nbytes] >= num {
        bits += 1;
        num *= 2;
    }

    bits + nbytes as u32 * 8
}

/// How the directly written atoms of a frame are packed.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PackingMode {
    /// All three axes are packed together into one multibyte integer of `bitsize` bits.
    Combined { bitsize: u32 },
    /// The range of the frame is too large to multiply the axis sizes together.
    /// Each axis is written separately with its own bit width.
    PerAxis { bits: [u32; 3] },
}

impl PackingMode {
    /// Select packing mode for the given axis sizes.
    pub fn from_sizes(sizes: &[u32; 3]) -> Self {
        if (sizes[0] | sizes[1] | sizes[2]) > 0xffffff {
            let bits = [
                size_of_int(sizes[0]),
                size_of_int(sizes[1]),
                size_of_int(sizes[2]),
            ];
            crate::colog_debug!(
                "Frame range too large for combined packing, using per-axis bit widths {}.",
                format!("{:?}", bits)
            );
            PackingMode::PerAxis { bits }
        } else {
            PackingMode::Combined {
                bitsize: size_of_ints(sizes),
            }
        }
    }
}

/******************************/
/*          BIT WRITER        */
/******************************/

/// Appends values of arbitrary bit widths into a byte buffer.
#[derive(Debug, Clone, Default)]
pub struct BitWriter {
    bytes: Vec<u8>,
    last_bits: u32,
    last_byte: u32,
}

impl BitWriter {
    pub fn new() -> Self {
        BitWriter::default()
    }

    /// Remove all data from the writer while keeping the allocated buffer.
    pub fn clear(&mut self) {
        self.bytes.clear();
        self.last_bits = 0;
        self.last_byte = 0;
    }

    /// Append the lowest `nbits` bits of `num`.
    pub fn encode_bits(&mut self, nbits: u32, num: u32) {
        let mut nbits = nbits;
        while nbits >= 8 {
            self.last_byte = (self.last_byte << 8) | ((num >> (nbits - 8)) & 0xff);
            self.bytes.push((self.last_byte >> self.last_bits) as u8);
            nbits -= 8;
        }

        if nbits > 0 {
            self.last_byte = (self.last_byte << nbits) | (num & ((1 << nbits) - 1));
            self.last_bits += nbits;
            if self.last_bits >= 8 {
                self.last_bits -= 8;
                self.bytes.push((self.last_byte >> self.last_bits) as u8);
            }
        }
    }

    /// Pack three integers, each smaller than the corresponding size,
    /// into one multibyte integer written using `nbits` bits.
    pub fn encode_ints(
        &mut self,
        nbits: u32,
        sizes: &[u32; 3],
        nums: &[u32],
    ) -> Result<(), CodecError> {
        for (&num, &size) in nums.iter().zip(sizes.iter()) {
            if num >= size {
                return Err(CodecError::SizeMismatch(num as u64, size as u64));
            }
        }

        let mut bytes = [0u32; 32];
        let mut nbytes = 0;

        let mut tmp = nums[0];
        loop {
            bytes[nbytes] = tmp & 0xff;
            nbytes += 1;
            tmp >>= 8;
            if tmp == 0 {
                break;
            }
        }

        for i in 1..3 {
            let mut tmp = nums[i] as u64;
            let mut bytecnt = 0;
            while bytecnt < nbytes {
                tmp += bytes[bytecnt] as u64 * sizes[i] as u64;
                bytes[bytecnt] = (tmp & 0xff) as u32;
                tmp >>= 8;
                bytecnt += 1;
            }

            while tmp != 0 {
                bytes[bytecnt] = (tmp & 0xff) as u32;
                bytecnt += 1;
                tmp >>= 8;
            }

            nbytes = bytecnt;
        }

        let nbytes_bits = nbytes as u32 * 8;
        if nbits >= nbytes_bits {
            for &byte in bytes.iter().take(nbytes) {
                self.encode_bits(8, byte);
            }
            self.encode_bits(nbits - nbytes_bits, 0);
        } else {
            for &byte in bytes.iter().take(nbytes - 1) {
                self.encode_bits(8, byte);
            }
            self.encode_bits(nbits - (nbytes_bits - 8), bytes[nbytes - 1]);
        }

        Ok(())
    }

    /// Number of bytes the finished buffer will contain.
    pub fn len(&self) -> usize {
        self.bytes.len() + usize::from(self.last_bits > 0)
    }

    /// Returns `true` if nothing has been written.
    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Flush the partially filled last byte and return the complete buffer.
    pub fn finish(&mut self) -> &[u8] {
        if self.last_bits > 0 {
            self.bytes
                .push((self.last_byte << (8 - self.last_bits)) as u8);
            self.last_bits = 0;
            self.last_byte = 0;
        }

        &self.bytes
    }
}

/******************************/
/*          BIT READER        */
/******************************/

/// Reads values of arbitrary bit widths from a byte buffer.
#[derive(Debug, Clone)]
pub struct BitReader<'a> {
    data: &'a [u8],
    cnt: usize,
    last_bits: u32,
    last_byte: u32,
}

impl<'a> BitReader<'a> {
    pub fn new(data: &'a [u8]) -> Self {
        BitReader {
            data,
            cnt: 0,
            last_bits: 0,
            last_byte: 0,
        }
    }

    #[inline]
    fn next_byte(&mut self) -> Result<u32, CodecError> {
        let byte = *self.data.get(self.cnt).ok_or(CodecError::BufferOverrun)?;
        self.cnt += 1;
        Ok(byte as u32)
    }

    /// Read `nbits` bits (at most 32).
    pub fn decode_bits(&mut self, nbits: u32) -> Result<u32, CodecError> {
        let mask = if nbits >= 32 {
            u32::MAX
        } else {
            (1u32 << nbits) - 1
        };

        let mut nbits = nbits;
        let mut num = 0u32;
        while nbits >= 8 {
            self.last_byte = (self.last_byte << 8) | self.next_byte()?;
            num |= (self.last_byte >> self.last_bits) << (nbits - 8);
            nbits -= 8;
        }

        if nbits > 0 {
            if self.last_bits < nbits {
                self.last_bits += 8;
                self.last_byte = (self.last_byte << 8) | self.next_byte()?;
            }
            self.last_bits -= nbits;
            num |= (self.last_byte >> self.last_bits) & ((1 << nbits) - 1);
        }

        Ok(num & mask)
    }

    /// Unpack three integers packed together using `nbits` bits.
    pub fn decode_ints(&mut self, nbits: u32, sizes: &[u32; 3]) -> Result<[u32; 3], CodecError> {
        let mut bytes = [0u32; 32];
        let mut nbytes = 0;
        let mut nbits = nbits;

        while nbits > 8 {
            bytes[nbytes] = self.decode_bits(8)?;
            nbytes += 1;
            nbits -= 8;
        }

        if nbits > 0 {
            bytes[nbytes] = self.decode_bits(nbits)?;
            nbytes += 1;
        }

        let mut nums = [0u32; 3];
        for i in (1..3).rev() {
            let mut num = 0u32;
            for j in (0..nbytes).rev() {
                num = (num << 8) | bytes[j];
                let p = num / sizes[i];
                bytes[j] = p;
                num -= p * sizes[i];
            }
            nums[i] = num;
        }

        nums[0] = bytes[0] | (bytes[1] << 8) | (bytes[2] << 16) | (bytes[3] << 24);
        Ok(nums)
    }
}

/******************************/
/*     COMPRESSED COORDINATES */
/******************************/

/// Compressed coordinate block of a single XTC frame, as stored in the file
/// (without the atom count).
#[derive(Debug, Clone, PartialEq, Default)]
pub struct CompressedCoords {
    pub precision: f32,
    pub minint: [i32; 3],
    pub maxint: [i32; 3],
    pub smallidx: i32,
    pub bytes: Vec<u8>,
}

impl CompressedCoords {
    /// Size of each axis of the integer bounding box.
    pub fn sizes(&self) -> Result<[u32; 3], CodecError> {
        let mut sizes = [0u32; 3];
        for (d, size) in sizes.iter_mut().enumerate() {
            let range = self.maxint[d] as i64 - self.minint[d] as i64 + 1;
            if range <= 0 {
                return Err(CodecError::InvalidRange(self.minint[d], self.maxint[d]));
            }
            *size = u32::try_from(range).map_err(|_| CodecError::Overflow)?;
        }

        Ok(sizes)
    }

    /// Packing mode used for the directly written atoms of this block.
    pub fn packing_mode(&self) -> Result<PackingMode, CodecError> {
        Ok(PackingMode::from_sizes(&self.sizes()?))
    }
}

/******************************/
/*         COORD CODEC        */
/******************************/

/// Compressor and decompressor of XTC coordinates.
/// Owns scratch buffers which are reused between frames.
#[derive(Debug, Clone, Default)]
pub struct CoordCodec {
    ints: Vec<i32>,
    writer: BitWriter,
}

#[inline(always)]
fn abs_diff(a: i32, b: i32) -> i64 {
    (a as i64 - b as i64).abs()
}

/// Scale a coordinate to integer rounding half away from zero.
#[inline(always)]
fn scale(value: f32, precision: f32) -> Result<i32, CodecError> {
    let lf = if value >= 0.0 {
        value * precision + 0.5
    } else {
        value * precision - 0.5
    };

    if !lf.is_finite() || lf.abs() > MAX_SCALED {
        return Err(CodecError::Overflow);
    }

    Ok(lf as i32)
}

impl CoordCodec {
    pub fn new() -> Self {
        CoordCodec::default()
    }

    /// Compress coordinates (in nm) using the given precision.
    /// Non-positive precision is replaced by the default precision of 1000.
    pub fn compress(
        &mut self,
        coords: &[[f32; 3]],
        precision: f32,
    ) -> Result<CompressedCoords, CodecError> {
        let precision = if precision <= 0.0 { 1000.0 } else { precision };
        let natoms = coords.len();

        self.ints.clear();
        self.ints.reserve(natoms * 3);
        self.writer.clear();

        let mut minint = [i32::MAX; 3];
        let mut maxint = [i32::MIN; 3];
        let mut mindiff = i64::from(i32::MAX);
        let mut old = [0i32; 3];

        for (i, xyz) in coords.iter().enumerate() {
            let mut lint = [0i32; 3];
            for d in 0..3 {
                lint[d] = scale(xyz[d], precision)?;
                minint[d] = minint[d].min(lint[d]);
                maxint[d] = maxint[d].max(lint[d]);
            }

            self.ints.extend_from_slice(&lint);

            let diff: i64 = (0..3).map(|d| abs_diff(old[d], lint[d])).sum();
            if i >= 1 && diff < mindiff {
                mindiff = diff;
            }
            old = lint;
        }

        if natoms == 0 {
            minint = [0; 3];
            maxint = [0; 3];
        }

        if (0..3).any(|d| maxint[d] as i64 - minint[d] as i64 >= i64::from(i32::MAX - 2)) {
            return Err(CodecError::Overflow);
        }

        let sizeint = [
            (maxint[0] - minint[0] + 1) as u32,
            (maxint[1] - minint[1] + 1) as u32,
            (maxint[2] - minint[2] + 1) as u32,
        ];
        let packing = PackingMode::from_sizes(&sizeint);

        let mut smallidx = FIRSTIDX;
        while smallidx < MAX_SMALLIDX && i64::from(MAGICINTS[smallidx]) < mindiff {
            smallidx += 1;
        }
        let initial_smallidx = smallidx;

        let maxidx = MAX_SMALLIDX.min(smallidx + 8);
        let minidx = maxidx - 8;
        let mut smaller = MAGICINTS[FIRSTIDX.max(smallidx - 1)] / 2;
        let mut smallnum = MAGICINTS[smallidx] / 2;
        let mut sizesmall = [MAGICINTS[smallidx] as u32; 3];
        let larger = i64::from(MAGICINTS[maxidx] / 2);

        let ints = &mut self.ints;
        let writer = &mut self.writer;

        let mut prev = [0i32; 3];
        let mut prevrun: i32 = -1;
        let mut run_values = [0u32; MAX_RUN];
        let mut i = 0;

        while i < natoms {
            let base = 3 * i;
            let mut is_small = false;

            let mut is_smaller: i32 = if smallidx < maxidx
                && i >= 1
                && (0..3).all(|d| abs_diff(ints[base + d], prev[d]) < larger)
            {
                1
            } else if smallidx > minidx {
                -1
            } else {
                0
            };

            if i + 1 < natoms
                && (0..3).all(|d| abs_diff(ints[base + d], ints[base + 3 + d]) < smallnum as i64)
            {
                // first and second atom are interchanged for better compression of water molecules
                for d in 0..3 {
                    ints.swap(base + d, base + 3 + d);
                }
                is_small = true;
            }

            let shifted = [
                (ints[base] as i64 - minint[0] as i64) as u32,
                (ints[base + 1] as i64 - minint[1] as i64) as u32,
                (ints[base + 2] as i64 - minint[2] as i64) as u32,
            ];

            match packing {
                PackingMode::PerAxis { bits } => {
                    for d in 0..3 {
                        writer.encode_bits(bits[d], shifted[d]);
                    }
                }
                PackingMode::Combined { bitsize } => {
                    writer.encode_ints(bitsize, &sizeint, &shifted)?
                }
            }

            prev.copy_from_slice(&ints[base..base + 3]);
            i += 1;

            let mut run = 0;
            if !is_small && is_smaller == -1 {
                is_smaller = 0;
            }

            while is_small && run < MAX_RUN {
                let base = 3 * i;
                let sum_sq: i64 = (0..3)
                    .map(|d| {
                        let delta = ints[base + d] as i64 - prev[d] as i64;
                        delta * delta
                    })
                    .sum();

                if is_smaller == -1 && sum_sq >= i64::from(smaller) * i64::from(smaller) {
                    is_smaller = 0;
                }

                for d in 0..3 {
                    run_values[run] = (ints[base + d] - prev[d] + smallnum) as u32;
                    run += 1;
                }

                prev.copy_from_slice(&ints[base..base + 3]);
                i += 1;

                is_small = i < natoms
                    && (0..3).all(|d| abs_diff(ints[3 * i + d], prev[d]) < smallnum as i64);
            }

            if run as i32 != prevrun || is_smaller != 0 {
                prevrun = run as i32;
                writer.encode_bits(1, 1);
                writer.encode_bits(5, (run as i32 + is_smaller + 1) as u32);
            } else {
                writer.encode_bits(1, 0);
            }

            for triple in run_values[..run].chunks_exact(3) {
                writer.encode_ints(smallidx as u32, &sizesmall, triple)?;
            }

            if is_smaller != 0 {
                smallidx = (smallidx as i32 + is_smaller) as usize;
                if is_smaller < 0 {
                    smallnum = smaller;
                    smaller = MAGICINTS[smallidx - 1] / 2;
                } else {
                    smaller = smallnum;
                    smallnum = MAGICINTS[smallidx] / 2;
                }
                sizesmall = [MAGICINTS[smallidx] as u32; 3];
            }
        }

        Ok(CompressedCoords {
            precision,
            minint,
            maxint,
            smallidx: initial_smallidx as i32,
            bytes: writer.finish().to_vec(),
        })
    }

    /// Decompress `natoms` coordinates from `block` into `out` (in nm).
    pub fn decompress(
        &mut self,
        block: &CompressedCoords,
        natoms: usize,
        out: &mut Vec<[f32; 3]>,
    ) -> Result<(), CodecError> {
        out.clear();
        if natoms > block.bytes.len().saturating_mul(8) {
            return Err(CodecError::BufferOverrun);
        }
        out.reserve(natoms);

        let sizeint = block.sizes()?;
        let packing = PackingMode::from_sizes(&sizeint);

        let mut smallidx = checked_smallidx(block.smallidx)?;
        let mut smaller = MAGICINTS[FIRSTIDX.max(smallidx - 1)] / 2;
        let mut smallnum = MAGICINTS[smallidx] / 2;
        let mut sizesmall = [MAGICINTS[smallidx] as u32; 3];

        let inv_precision = 1.0 / block.precision;
        let to_float = |c: [i32; 3]| {
            [
                c[0] as f32 * inv_precision,
                c[1] as f32 * inv_precision,
                c[2] as f32 * inv_precision,
            ]
        };

        let mut reader = BitReader::new(&block.bytes);
        let mut run: i32 = 0;
        let mut i = 0;

        while i < natoms {
            let raw = match packing {
                PackingMode::PerAxis { bits } => [
                    reader.decode_bits(bits[0])?,
                    reader.decode_bits(bits[1])?,
                    reader.decode_bits(bits[2])?,
                ],
                PackingMode::Combined { bitsize } => reader.decode_ints(bitsize, &sizeint)?,
            };
            i += 1;

            let mut this = [
                (raw[0] as i32).wrapping_add(block.minint[0]),
                (raw[1] as i32).wrapping_add(block.minint[1]),
                (raw[2] as i32).wrapping_add(block.minint[2]),
            ];
            let mut prev = this;

            let mut is_smaller = 0;
            if reader.decode_bits(1)? == 1 {
                run = reader.decode_bits(5)? as i32;
                is_smaller = run % 3;
                run -= is_smaller;
                is_smaller -= 1;
            }

            if run > 0 {
                if i + (run / 3) as usize > natoms {
                    return Err(CodecError::RunOverflow(natoms));
                }

                for k in (0..run).step_by(3) {
                    let small = reader.decode_ints(smallidx as u32, &sizesmall)?;
                    i += 1;

                    for d in 0..3 {
                        this[d] = (small[d] as i32)
                            .wrapping_add(prev[d])
                            .wrapping_sub(smallnum);
                    }

                    if k == 0 {
                        // first two atoms of a run are interchanged
                        std::mem::swap(&mut this, &mut prev);
                        out.push(to_float(prev));
                    } else {
                        prev = this;
                    }

                    out.push(to_float(this));
                }
            } else {
                out.push(to_float(this));
            }

            if is_smaller != 0 {
                smallidx = checked_smallidx(smallidx as i32 + is_smaller)?;
                if is_smaller < 0 {
                    smallnum = smaller;
                    smaller = if smallidx > FIRSTIDX {
                        MAGICINTS[smallidx - 1] / 2
                    } else {
                        0
                    };
                } else {
                    smaller = smallnum;
                    smallnum = MAGICINTS[smallidx] / 2;
                }
                sizesmall = [MAGICINTS[smallidx] as u32; 3];
            }
        }

        Ok(())
    }
}

#[inline]
fn checked_smallidx(smallidx: i32) -> Result<usize, CodecError> {
    if smallidx < FIRSTIDX as i32 || smallidx > MAX_SMALLIDX as i32 {
        Err(CodecError::InvalidSmallIndex(smallidx))
    } else {
        Ok(smallidx as usize)
    }
}

/******************************/
/*         UNIT TESTS         */
/******************************/
