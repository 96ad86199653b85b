//! Picture - the unit of decode
//!
//! A picture is shared between DPB slots and the output path, so it lives
//! behind an `Arc` once decoding finishes. The backend payload (surface,
//! texture, host buffer...) is opaque to the sequencer and is itself shared,
//! which is what lets a duplicate point at the same decoded pixels without
//! owning them twice.

use std::any::Any;
use std::fmt;
use std::sync::Arc;

use bytes::Bytes;

use crate::header::FrameHeader;

/// Shared handle to a finished picture.
pub type PictureRef = Arc<Picture>;

/// Backend-owned payload attached to a picture.
pub type BackendData = Arc<dyn Any + Send + Sync>;

pub struct Picture {
    data: Bytes,
    header: FrameHeader,
    pts: Option<i64>,
    coded_size: usize,
    /// Order in which fresh pictures were created, used for reorder depth
    reorder_frame_number: u64,
    duplicate: bool,
    backend_data: Option<BackendData>,
}

impl Picture {
    /// Create a fresh picture for the normal decode path.
    ///
    /// `data` is normally a slice sharing storage with the access unit.
    pub fn new(data: Bytes, header: FrameHeader, pts: Option<i64>) -> Self {
        let coded_size = data.len();
        Self {
            data,
            header,
            pts,
            coded_size,
            reorder_frame_number: 0,
            duplicate: false,
            backend_data: None,
        }
    }

    /// Value-copy header and metadata, share the backend payload.
    ///
    /// The result is flagged as a duplicate and must never be decoded.
    pub fn duplicate(&self) -> Self {
        Self {
            data: self.data.clone(),
            header: self.header.clone(),
            pts: self.pts,
            coded_size: self.coded_size,
            reorder_frame_number: self.reorder_frame_number,
            duplicate: true,
            backend_data: self.backend_data.clone(),
        }
    }

    pub fn data(&self) -> &Bytes {
        &self.data
    }

    pub fn header(&self) -> &FrameHeader {
        &self.header
    }

    pub fn pts(&self) -> Option<i64> {
        self.pts
    }

    pub fn set_pts(&mut self, pts: Option<i64>) {
        self.pts = pts;
    }

    /// Size in bytes of the coded data that produced this picture.
    pub fn coded_size(&self) -> usize {
        self.coded_size
    }

    pub fn set_coded_size(&mut self, size: usize) {
        self.coded_size = size;
    }

    pub fn reorder_frame_number(&self) -> u64 {
        self.reorder_frame_number
    }

    pub(crate) fn set_reorder_frame_number(&mut self, number: u64) {
        self.reorder_frame_number = number;
    }

    pub fn is_duplicate(&self) -> bool {
        self.duplicate
    }

    pub fn width(&self) -> u32 {
        self.header.width
    }

    pub fn height(&self) -> u32 {
        self.header.height
    }

    /// Attach a backend payload, replacing any previous one.
    pub fn set_backend_data<T: Any + Send + Sync>(&mut self, data: T) {
        self.backend_data = Some(Arc::new(data));
    }

    /// Attach an already shared payload.
    pub fn set_backend_handle(&mut self, handle: BackendData) {
        self.backend_data = Some(handle);
    }

    pub fn backend_handle(&self) -> Option<&BackendData> {
        self.backend_data.as_ref()
    }

    pub fn backend_data<T: Any>(&self) -> Option<&T> {
        self.backend_data.as_deref()?.downcast_ref::<T>()
    }

    /// True when both pictures point at the same backend payload.
    pub fn shares_backend_data(&self, other: &Picture) -> bool {
        match (&self.backend_data, &other.backend_data) {
            (Some(a), Some(b)) => Arc::ptr_eq(a, b),
            _ => false,
        }
    }

    pub fn into_ref(self) -> PictureRef {
        Arc::new(self)
    }
}

impl fmt::Debug for Picture {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Picture")
            .field("width", &self.header.width)
            .field("height", &self.header.height)
            .field("pts", &self.pts)
            .field("coded_size", &self.coded_size)
            .field("reorder_frame_number", &self.reorder_frame_number)
            .field("duplicate", &self.duplicate)
            .field("has_backend_data", &self.backend_data.is_some())
            .finish()
    }
}
