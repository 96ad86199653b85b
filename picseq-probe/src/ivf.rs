//! Minimal IVF container reader
//!
//! ```text
//! file header (32 bytes):
//!   "DKIF" | version u16 | header len u16 | fourcc | width u16 | height u16
//!   | rate u32 | scale u32 | frame count u32 | unused u32
//! frame header (12 bytes):
//!   size u32 | pts u64
//! ```
//! All fields little-endian.

use std::io::{ErrorKind, Read};

use anyhow::{bail, Context, Result};
use bytes::Bytes;

const IVF_SIGNATURE: &[u8; 4] = b"DKIF";
const IVF_FILE_HEADER_LEN: usize = 32;
const IVF_FRAME_HEADER_LEN: usize = 12;

/// Refuse frames larger than this; a corrupt size field would otherwise
/// trigger a huge allocation.
const MAX_FRAME_SIZE: usize = 64 * 1024 * 1024;

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct IvfHeader {
    pub fourcc: [u8; 4],
    pub width: u16,
    pub height: u16,
    pub rate: u32,
    pub scale: u32,
    pub frame_count: u32,
}

impl IvfHeader {
    pub fn fourcc_str(&self) -> String {
        String::from_utf8_lossy(&self.fourcc).into_owned()
    }
}

#[derive(Debug, Clone)]
pub struct IvfFrame {
    pub pts: u64,
    pub data: Bytes,
}

pub struct IvfReader<R: Read> {
    reader: R,
    header: IvfHeader,
}

impl<R: Read> IvfReader<R> {
    pub fn new(mut reader: R) -> Result<Self> {
        let mut buf = [0u8; IVF_FILE_HEADER_LEN];
        reader.read_exact(&mut buf).context("Truncated IVF file header")?;

        if &buf[0..4] != IVF_SIGNATURE {
            bail!("Not an IVF file (signature {:02x?})", &buf[0..4]);
        }

        let header_len = u16::from_le_bytes([buf[6], buf[7]]) as usize;
        if header_len < IVF_FILE_HEADER_LEN {
            bail!("IVF header length {} too small", header_len);
        }
        // skip any extension of the file header
        if header_len > IVF_FILE_HEADER_LEN {
            let mut extra = vec![0u8; header_len - IVF_FILE_HEADER_LEN];
            reader.read_exact(&mut extra).context("Truncated IVF file header")?;
        }

        let header = IvfHeader {
            fourcc: [buf[8], buf[9], buf[10], buf[11]],
            width: u16::from_le_bytes([buf[12], buf[13]]),
            height: u16::from_le_bytes([buf[14], buf[15]]),
            rate: u32::from_le_bytes([buf[16], buf[17], buf[18], buf[19]]),
            scale: u32::from_le_bytes([buf[20], buf[21], buf[22], buf[23]]),
            frame_count: u32::from_le_bytes([buf[24], buf[25], buf[26], buf[27]]),
        };

        Ok(Self { reader, header })
    }

    pub fn header(&self) -> &IvfHeader {
        &self.header
    }

    /// Next frame, `None` at a clean end of file.
    pub fn next_frame(&mut self) -> Result<Option<IvfFrame>> {
        let mut buf = [0u8; IVF_FRAME_HEADER_LEN];
        let mut filled = 0;
        while filled < buf.len() {
            match self.reader.read(&mut buf[filled..]) {
                Ok(0) => break,
                Ok(n) => filled += n,
                Err(e) if e.kind() == ErrorKind::Interrupted => {}
                Err(e) => return Err(e).context("IVF read error"),
            }
        }
        match filled {
            0 => return Ok(None),
            IVF_FRAME_HEADER_LEN => {}
            n => bail!("Truncated IVF frame header ({} of {} bytes)", n, IVF_FRAME_HEADER_LEN),
        }

        let size = u32::from_le_bytes([buf[0], buf[1], buf[2], buf[3]]) as usize;
        let pts = u64::from_le_bytes([
            buf[4], buf[5], buf[6], buf[7], buf[8], buf[9], buf[10], buf[11],
        ]);

        if size > MAX_FRAME_SIZE {
            bail!("IVF frame of {} bytes exceeds limit", size);
        }

        let mut data = vec![0u8; size];
        self.reader
            .read_exact(&mut data)
            .with_context(|| format!("Truncated IVF frame at pts {}", pts))?;

        Ok(Some(IvfFrame {
            pts,
            data: Bytes::from(data),
        }))
    }
}

/// Serialize an IVF stream, used by tests and fixtures.
pub fn write_ivf(header: &IvfHeader, frames: &[(u64, Vec<u8>)]) -> Vec<u8> {
    let mut out = Vec::new();
    out.extend_from_slice(IVF_SIGNATURE);
    out.extend_from_slice(&0u16.to_le_bytes());
    out.extend_from_slice(&(IVF_FILE_HEADER_LEN as u16).to_le_bytes());
    out.extend_from_slice(&header.fourcc);
    out.extend_from_slice(&header.width.to_le_bytes());
    out.extend_from_slice(&header.height.to_le_bytes());
    out.extend_from_slice(&header.rate.to_le_bytes());
    out.extend_from_slice(&header.scale.to_le_bytes());
    out.extend_from_slice(&(frames.len() as u32).to_le_bytes());
    out.extend_from_slice(&0u32.to_le_bytes());

    for (pts, data) in frames {
        out.extend_from_slice(&(data.len() as u32).to_le_bytes());
        out.extend_from_slice(&pts.to_le_bytes());
        out.extend_from_slice(data);
    }
    out
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Cursor;

    fn header() -> IvfHeader {
        IvfHeader {
            fourcc: *b"VP90",
            width: 352,
            height: 288,
            rate: 30,
            scale: 1,
            frame_count: 2,
        }
    }

    #[test]
    fn test_read_frames() {
        let bytes = write_ivf(&header(), &[(0, vec![1, 2, 3]), (1, vec![4])]);
        let mut reader = IvfReader::new(Cursor::new(bytes)).unwrap();
        assert_eq!(reader.header(), &header());
        assert_eq!(reader.header().fourcc_str(), "VP90");

        let f0 = reader.next_frame().unwrap().unwrap();
        assert_eq!((f0.pts, &f0.data[..]), (0, &[1u8, 2, 3][..]));
        let f1 = reader.next_frame().unwrap().unwrap();
        assert_eq!((f1.pts, &f1.data[..]), (1, &[4u8][..]));
        assert!(reader.next_frame().unwrap().is_none());
    }

    #[test]
    fn test_bad_signature() {
        let mut bytes = write_ivf(&header(), &[]);
        bytes[0] = b'X';
        assert!(IvfReader::new(Cursor::new(bytes)).is_err());
    }

    #[test]
    fn test_truncated_frame_header() {
        let mut bytes = write_ivf(&header(), &[(0, vec![1, 2]), (1, vec![3])]);
        // keep 5 of the second frame's 12 header bytes
        bytes.truncate(IVF_FILE_HEADER_LEN + IVF_FRAME_HEADER_LEN + 2 + 5);
        let mut reader = IvfReader::new(Cursor::new(bytes)).unwrap();
        assert!(reader.next_frame().unwrap().is_some());
        let err = reader.next_frame().unwrap_err();
        assert!(err.to_string().contains("Truncated IVF frame header"));
    }

    #[test]
    fn test_truncated_frame() {
        let mut bytes = write_ivf(&header(), &[(0, vec![9; 10])]);
        bytes.truncate(bytes.len() - 4);
        let mut reader = IvfReader::new(Cursor::new(bytes)).unwrap();
        assert!(reader.next_frame().is_err());
    }
}
