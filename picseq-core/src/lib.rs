//! # picseq Core
//!
//! Decode sequencing for stateless video decoder backends: superframe
//! splitting, the decoded picture buffer, and the per-frame backend lifecycle.
//! Pixel decoding itself is left to a pluggable [`backend::Backend`].

// ============================================================================
// Bitstream
// ============================================================================
pub mod superframe;
pub mod header;

// ============================================================================
// Pictures / Reference Storage
// ============================================================================
pub mod picture;
pub mod dpb;
pub mod reorder;

// ============================================================================
// Decoding
// ============================================================================
pub mod backend;
pub mod config;
pub mod sequencer;

pub use backend::{Backend, BackendError, BackendStage, NullBackend};
pub use config::SequencerConfig;
pub use dpb::{Dpb, DpbError};
pub use header::{FrameHeader, FrameType, HeaderParser, ParseError};
pub use picture::{Picture, PictureRef};
pub use sequencer::{AccessUnit, SequenceError, Sequencer, SequencerStats, SubFrameOutcome};
pub use superframe::{split_superframe, SubFrame};

// ============================================================================
// Version
// ============================================================================
pub const VERSION: &str = env!("CARGO_PKG_VERSION");
