//! Backend capability interface
//!
//! A backend performs the actual pixel decode (VA-API, NVDEC, D3D11, a
//! software decoder...). The sequencer drives it through a fixed lifecycle per
//! coded frame:
//!
//! ```text
//! new_sequence?  ->  new_picture -> start_picture -> decode_picture -> end_picture -> output_picture
//!                    duplicate_picture -> output_picture          (show existing frame)
//! ```
//!
//! Every call is synchronous. A backend that submits to hardware
//! asynchronously must wait inside the call until the picture is safe to be
//! used as a reference.

use std::fmt;

use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::dpb::Dpb;
use crate::header::FrameHeader;
use crate::picture::{Picture, PictureRef};
use crate::reorder::ReorderInfo;

#[derive(Debug, Error)]
pub enum BackendError {
    #[error("Unsupported stream: {0}")]
    Unsupported(String),
    #[error("No free surfaces")]
    OutOfSurfaces,
    #[error("Decode failed: {0}")]
    DecodeFailed(String),
    #[error("Output rejected: {0}")]
    OutputRejected(String),
}

/// Lifecycle stage a backend call belongs to.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum BackendStage {
    NewSequence,
    NewPicture,
    StartPicture,
    DecodePicture,
    EndPicture,
    OutputPicture,
}

impl fmt::Display for BackendStage {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            Self::NewSequence => "new_sequence",
            Self::NewPicture => "new_picture",
            Self::StartPicture => "start_picture",
            Self::DecodePicture => "decode_picture",
            Self::EndPicture => "end_picture",
            Self::OutputPicture => "output_picture",
        };
        f.write_str(name)
    }
}

/// Decoder backend trait - implemented by every hardware or software decoder
pub trait Backend: Send {
    /// Stream format changed (or first frame): (re)configure the decoder.
    fn new_sequence(&mut self, header: &FrameHeader) -> Result<(), BackendError>;

    /// Allocate backend resources for a fresh picture.
    fn new_picture(&mut self, picture: &mut Picture) -> Result<(), BackendError>;

    fn start_picture(&mut self, picture: &mut Picture) -> Result<(), BackendError>;

    /// Decode `picture` using the references currently held in `dpb`.
    fn decode_picture(&mut self, picture: &mut Picture, dpb: &Dpb) -> Result<(), BackendError>;

    fn end_picture(&mut self, picture: &mut Picture) -> Result<(), BackendError>;

    /// Hand a finished picture downstream.
    fn output_picture(&mut self, picture: PictureRef) -> Result<(), BackendError>;

    /// Create a picture that shows `source` again without decoding it.
    ///
    /// The default shares the backend payload. Backends that need per-output
    /// bookkeeping can override this, but must not decode.
    fn duplicate_picture(&mut self, source: &Picture) -> Picture {
        source.duplicate()
    }

    /// Reorder parameters of the sequence just configured by `new_sequence`.
    ///
    /// Codecs that reorder in output (H.264 style) return the SPS fields so the
    /// sequencer can seed its expected reorder depth. `None` means frames are
    /// output in decode order.
    fn reorder_info(&self, _header: &FrameHeader) -> Option<ReorderInfo> {
        None
    }

    /// Backend name for logging
    fn name(&self) -> &str;
}

// ============================================================================
// Null Backend (no pixel decode)
// ============================================================================

/// Payload attached by [`NullBackend`]: the order pictures were decoded in.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct NullSurface {
    pub decode_index: u64,
}

/// Backend that accepts every call without touching pixels.
///
/// Useful for stream analysis and for exercising the sequencing logic.
#[derive(Debug, Default)]
pub struct NullBackend {
    sequences: Vec<FrameHeader>,
    decoded: u64,
    output: Vec<PictureRef>,
}

impl NullBackend {
    pub fn new() -> Self {
        Self::default()
    }

    /// Headers that started a new sequence, oldest first.
    pub fn sequences(&self) -> &[FrameHeader] {
        &self.sequences
    }

    pub fn decoded_count(&self) -> u64 {
        self.decoded
    }

    pub fn output(&self) -> &[PictureRef] {
        &self.output
    }

    /// Drain collected output pictures.
    pub fn take_output(&mut self) -> Vec<PictureRef> {
        std::mem::take(&mut self.output)
    }
}

impl Backend for NullBackend {
    fn new_sequence(&mut self, header: &FrameHeader) -> Result<(), BackendError> {
        if header.width == 0 || header.height == 0 {
            return Err(BackendError::Unsupported(format!(
                "{}x{} frame size",
                header.width, header.height
            )));
        }
        self.sequences.push(header.clone());
        Ok(())
    }

    fn new_picture(&mut self, picture: &mut Picture) -> Result<(), BackendError> {
        picture.set_backend_data(NullSurface {
            decode_index: self.decoded,
        });
        Ok(())
    }

    fn start_picture(&mut self, _picture: &mut Picture) -> Result<(), BackendError> {
        Ok(())
    }

    fn decode_picture(&mut self, _picture: &mut Picture, _dpb: &Dpb) -> Result<(), BackendError> {
        self.decoded += 1;
        Ok(())
    }

    fn end_picture(&mut self, _picture: &mut Picture) -> Result<(), BackendError> {
        Ok(())
    }

    fn output_picture(&mut self, picture: PictureRef) -> Result<(), BackendError> {
        self.output.push(picture);
        Ok(())
    }

    fn name(&self) -> &str {
        "null"
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use bytes::Bytes;

    #[test]
    fn test_null_backend_tags_decode_order() {
        let mut backend = NullBackend::new();
        let dpb = Dpb::default();

        for expected in 0..3u64 {
            let mut pic = Picture::new(Bytes::new(), FrameHeader::default(), None);
            backend.new_picture(&mut pic).unwrap();
            backend.decode_picture(&mut pic, &dpb).unwrap();
            assert_eq!(
                pic.backend_data::<NullSurface>(),
                Some(&NullSurface { decode_index: expected })
            );
            backend.output_picture(pic.into_ref()).unwrap();
        }

        assert_eq!(backend.decoded_count(), 3);
        assert_eq!(backend.take_output().len(), 3);
        assert!(backend.output().is_empty());
    }

    #[test]
    fn test_null_backend_rejects_empty_frame_size() {
        let mut backend = NullBackend::new();
        assert!(matches!(
            backend.new_sequence(&FrameHeader::default()),
            Err(BackendError::Unsupported(_))
        ));
        assert!(backend.sequences().is_empty());
    }

    #[test]
    fn test_default_duplicate_shares_payload() {
        let mut backend = NullBackend::new();
        let mut pic = Picture::new(Bytes::new(), FrameHeader::default(), Some(5));
        backend.new_picture(&mut pic).unwrap();

        let dup = backend.duplicate_picture(&pic);
        assert!(dup.is_duplicate());
        assert!(dup.shares_backend_data(&pic));
        assert_eq!(backend.decoded_count(), 0);
    }

    #[test]
    fn test_stage_names() {
        assert_eq!(BackendStage::DecodePicture.to_string(), "decode_picture");
        assert_eq!(BackendStage::NewSequence.to_string(), "new_sequence");
    }
}
