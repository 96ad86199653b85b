//! VP9 superframe demultiplexing
//!
//! A superframe packs several coded frames into one access unit and appends a
//! trailing index:
//!
//! ```text
//! [frame 0][frame 1]...[frame N-1][marker][size 0]...[size N-1][marker]
//! ```
//!
//! The marker byte is `0b110m_mfff`: `mm + 1` is the width of each size field
//! in bytes and `fff + 1` is the frame count. Sizes are little-endian. Anything
//! that does not validate is treated as a single plain frame.

use std::ops::Range;

use bytes::Bytes;

/// Top three bits of a superframe marker byte.
const SUPERFRAME_MARKER_MASK: u8 = 0xe0;
const SUPERFRAME_MARKER: u8 = 0xc0;

/// Maximum frames a single superframe can carry (3-bit count).
pub const MAX_SUPERFRAME_FRAMES: usize = 8;

/// Byte range of one coded frame inside an access unit.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct SubFrame {
    pub offset: usize,
    pub size: usize,
}

impl SubFrame {
    pub fn new(offset: usize, size: usize) -> Self {
        Self { offset, size }
    }

    pub fn range(&self) -> Range<usize> {
        self.offset..self.offset + self.size
    }

    /// Zero-copy view of this sub-frame's bytes.
    ///
    /// The returned buffer shares storage with `access_unit`.
    pub fn slice(&self, access_unit: &Bytes) -> Bytes {
        access_unit.slice(self.range())
    }
}

/// Decoded trailing index of a superframe.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SuperframeIndex {
    /// Number of frames declared by the marker (1-8)
    pub frame_count: usize,
    /// Width of each size field in bytes (1-4)
    pub size_field_width: usize,
    /// Total index size including both marker bytes
    pub index_size: usize,
    /// Declared size of every frame, in order
    pub frame_sizes: Vec<usize>,
}

impl SuperframeIndex {
    /// Parse the trailing index of `data`.
    ///
    /// Returns `None` when the buffer is not a superframe: no marker at the end,
    /// an index larger than the buffer, a mismatching leading marker, or frame
    /// sizes that overrun the payload.
    pub fn parse(data: &[u8]) -> Option<Self> {
        let marker = *data.last()?;
        if marker & SUPERFRAME_MARKER_MASK != SUPERFRAME_MARKER {
            return None;
        }

        let frame_count = ((marker & 0x07) + 1) as usize;
        let size_field_width = (((marker >> 3) & 0x03) + 1) as usize;
        let index_size = 2 + frame_count * size_field_width;

        if index_size > data.len() {
            tracing::debug!(
                "Superframe index of {} bytes exceeds buffer of {} bytes",
                index_size,
                data.len()
            );
            return None;
        }

        let index_start = data.len() - index_size;
        if data[index_start] != marker {
            tracing::debug!(
                "Superframe marker 0x{:02x} not repeated at offset {}",
                marker,
                index_start
            );
            return None;
        }

        let frame_sizes: Vec<usize> = data[index_start + 1..data.len() - 1]
            .chunks_exact(size_field_width)
            .map(read_le_uint)
            .collect();

        let payload: usize = frame_sizes.iter().sum();
        if payload > index_start {
            tracing::debug!(
                "Superframe frame sizes ({} bytes) overrun payload of {} bytes",
                payload,
                index_start
            );
            return None;
        }

        Some(Self {
            frame_count,
            size_field_width,
            index_size,
            frame_sizes,
        })
    }

    /// Lay the declared frame sizes out as consecutive sub-frames from offset 0.
    pub fn sub_frames(&self) -> Vec<SubFrame> {
        let mut offset = 0;
        self.frame_sizes
            .iter()
            .map(|&size| {
                let frame = SubFrame::new(offset, size);
                offset += size;
                frame
            })
            .collect()
    }
}

/// Split one access unit into its constituent coded frames.
///
/// Always returns at least one sub-frame for a non-empty buffer. A missing or
/// corrupt index yields a single sub-frame spanning the whole buffer.
pub fn split_superframe(data: &[u8]) -> Vec<SubFrame> {
    match SuperframeIndex::parse(data) {
        Some(index) => index.sub_frames(),
        None => vec![SubFrame::new(0, data.len())],
    }
}

/// Read a little-endian unsigned integer of 1-4 bytes.
fn read_le_uint(bytes: &[u8]) -> usize {
    bytes
        .iter()
        .rev()
        .fold(0usize, |acc, &b| (acc << 8) | b as usize)
}

/// Append a superframe index for `frame_sizes` to `out`.
///
/// Picks the narrowest size field that fits the largest frame. Used by the
/// probe tooling and tests to build packed access units.
pub fn write_superframe_index(out: &mut Vec<u8>, frame_sizes: &[usize]) {
    debug_assert!(!frame_sizes.is_empty() && frame_sizes.len() <= MAX_SUPERFRAME_FRAMES);

    let largest = frame_sizes.iter().copied().max().unwrap_or(0);
    let width = match largest {
        0..=0xff => 1,
        0x100..=0xffff => 2,
        0x1_0000..=0xff_ffff => 3,
        _ => 4,
    };

    let marker = SUPERFRAME_MARKER | (((width - 1) as u8) << 3) | ((frame_sizes.len() - 1) as u8);
    out.push(marker);
    for &size in frame_sizes {
        out.extend_from_slice(&(size as u32).to_le_bytes()[..width]);
    }
    out.push(marker);
}
