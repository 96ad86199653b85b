//! Frame header model and the parser seam.
//!
//! Bit-level header parsing belongs to the codec parser; the sequencer only
//! needs the handful of fields below.

use serde::{Deserialize, Serialize};
use thiserror::Error;

#[derive(Debug, Clone, PartialEq, Eq, Error)]
#[error("Frame header parse failed: {0}")]
pub struct ParseError(pub String);

impl ParseError {
    pub fn new(msg: impl Into<String>) -> Self {
        Self(msg.into())
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
pub enum FrameType {
    Key,
    #[default]
    Inter,
}

/// The header fields the sequencer depends on.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct FrameHeader {
    pub profile: u8,
    pub width: u32,
    pub height: u32,
    pub frame_type: FrameType,
    pub intra_only: bool,
    /// Hidden frames (e.g. alt-ref) are decoded and stored but never output
    pub show_frame: bool,
    /// Re-emit the picture in `frame_to_show` instead of decoding
    pub show_existing_frame: bool,
    /// DPB slot to re-emit, valid only with `show_existing_frame`
    pub frame_to_show: u8,
    /// Bit `n` set means the decoded picture will occupy DPB slot `n`
    pub refresh_frame_flags: u32,
}

impl Default for FrameHeader {
    fn default() -> Self {
        Self {
            profile: 0,
            width: 0,
            height: 0,
            frame_type: FrameType::Inter,
            intra_only: false,
            show_frame: true,
            show_existing_frame: false,
            frame_to_show: 0,
            refresh_frame_flags: 0,
        }
    }
}

impl FrameHeader {
    pub fn is_keyframe(&self) -> bool {
        self.frame_type == FrameType::Key
    }

    /// Whether this frame can start decoding without prior references
    pub fn is_random_access_point(&self) -> bool {
        self.is_keyframe() || self.intra_only
    }

    /// True when size or profile differ from the given values.
    pub fn format_differs(&self, width: u32, height: u32, profile: u8) -> bool {
        self.width != width || self.height != height || self.profile != profile
    }
}

/// Turns raw sub-frame bytes into a [`FrameHeader`].
///
/// Implementations must be pure functions of the input bytes and must not
/// read past the end of the slice.
pub trait HeaderParser {
    fn parse_frame_header(&self, data: &[u8]) -> Result<FrameHeader, ParseError>;
}

impl<F> HeaderParser for F
where
    F: Fn(&[u8]) -> Result<FrameHeader, ParseError>,
{
    fn parse_frame_header(&self, data: &[u8]) -> Result<FrameHeader, ParseError> {
        self(data)
    }
}
