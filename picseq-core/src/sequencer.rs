//! # Decode Sequencer
//!
//! Turns access units into an ordered series of backend calls.
//!
//! ## Per sub-frame flow
//!
//! ```text
//!                    ┌──────────────┐
//!  access unit ────► │ split        │ ──► sub-frame 0, 1, ... (in order)
//!                    └──────────────┘
//!                           │ parse header
//!            ┌──────────────┴───────────────┐
//!   show_existing_frame                normal frame
//!            │                              │
//!   DPB lookup + duplicate        codec change? -> new_sequence
//!            │                    new/start/decode/end_picture
//!            │                              │
//!      output_picture          output_picture (unless hidden)
//!                                   DPB refresh
//! ```
//!
//! Any failure aborts the rest of the access unit. Pictures already stored
//! in the DPB by earlier sub-frames stay there; the failing sub-frame never
//! touches it.

use bytes::Bytes;
use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::backend::{Backend, BackendError, BackendStage};
use crate::config::{ConfigError, SequencerConfig};
use crate::dpb::{Dpb, DpbError};
use crate::header::{FrameHeader, HeaderParser, ParseError};
use crate::picture::{Picture, PictureRef};
use crate::reorder::{max_num_reorder_frames, ReorderTracker};
use crate::superframe::{SubFrame, SuperframeIndex};

// ============================================================================
// Errors
// ============================================================================

#[derive(Debug, Error)]
pub enum SequenceError {
    #[error("Empty access unit")]
    EmptyAccessUnit,
    #[error("Sub-frame {index}: {source}")]
    Parse { index: usize, source: ParseError },
    #[error("Sub-frame {index}: invalid reference index: {source}")]
    InvalidReferenceIndex { index: usize, source: DpbError },
    #[error("Sub-frame {index}: new_sequence rejected: {source}")]
    CodecChangeRejected { index: usize, source: BackendError },
    #[error("Sub-frame {index}: {stage} failed: {source}")]
    BackendLifecycle {
        index: usize,
        stage: BackendStage,
        source: BackendError,
    },
}

impl SequenceError {
    /// Index of the failing sub-frame within its access unit.
    pub fn sub_frame_index(&self) -> Option<usize> {
        match self {
            Self::EmptyAccessUnit => None,
            Self::Parse { index, .. }
            | Self::InvalidReferenceIndex { index, .. }
            | Self::CodecChangeRejected { index, .. }
            | Self::BackendLifecycle { index, .. } => Some(*index),
        }
    }
}

fn lifecycle(index: usize, stage: BackendStage) -> impl FnOnce(BackendError) -> SequenceError {
    move |source| SequenceError::BackendLifecycle { index, stage, source }
}

// ============================================================================
// Input / Output
// ============================================================================

/// One buffer of compressed data from the transport layer.
#[derive(Debug, Clone)]
pub struct AccessUnit {
    pub data: Bytes,
    pub pts: Option<i64>,
    pub end_of_stream: bool,
}

impl AccessUnit {
    pub fn new(data: impl Into<Bytes>, pts: Option<i64>) -> Self {
        Self {
            data: data.into(),
            pts,
            end_of_stream: false,
        }
    }

    pub fn end_of_stream() -> Self {
        Self {
            data: Bytes::new(),
            pts: None,
            end_of_stream: true,
        }
    }
}

/// What happened to one sub-frame.
#[derive(Debug, Clone)]
pub enum SubFrameOutcome {
    /// Freshly decoded and output
    Decode(PictureRef),
    /// Freshly decoded, stored for reference, not output
    DecodeOnly(PictureRef),
    /// Existing picture shown again without decoding
    Duplicate(PictureRef),
    /// Dropped while waiting for a keyframe
    Skipped,
}

impl SubFrameOutcome {
    pub fn picture(&self) -> Option<&PictureRef> {
        match self {
            Self::Decode(p) | Self::DecodeOnly(p) | Self::Duplicate(p) => Some(p),
            Self::Skipped => None,
        }
    }

    pub fn is_output(&self) -> bool {
        matches!(self, Self::Decode(_) | Self::Duplicate(_))
    }
}

// ============================================================================
// State
// ============================================================================

/// Superframe split of the access unit being processed.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SuperframeSplit {
    pub frame_sizes: Vec<usize>,
    /// Trailing index size, 0 for a plain frame
    pub index_size: usize,
    /// Sub-frame currently (or last) being processed
    pub cursor: usize,
}

impl SuperframeSplit {
    pub fn remaining(&self) -> usize {
        self.frame_sizes.len().saturating_sub(self.cursor + 1)
    }
}

/// Per-session mutable state.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct SequencerState {
    pub width: u32,
    pub height: u32,
    pub profile: u8,
    pub sequence_started: bool,
    pub waiting_for_keyframe: bool,
    /// Left in place after an abort so callers can see where it stopped
    pub split: Option<SuperframeSplit>,
}

impl SequencerState {
    fn new(wait_for_keyframe: bool) -> Self {
        Self {
            waiting_for_keyframe: wait_for_keyframe,
            ..Default::default()
        }
    }
}

/// Counters over the lifetime of a session.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct SequencerStats {
    pub access_units: u64,
    pub sub_frames: u64,
    pub decoded: u64,
    pub duplicated: u64,
    pub hidden: u64,
    pub skipped: u64,
    pub aborted_access_units: u64,
    pub sequences: u64,
}

// ============================================================================
// Sequencer
// ============================================================================

pub struct Sequencer<B: Backend, P: HeaderParser> {
    backend: B,
    parser: P,
    config: SequencerConfig,
    dpb: Dpb,
    state: SequencerState,
    reorder: ReorderTracker,
    stats: SequencerStats,
}

impl<B: Backend, P: HeaderParser> Sequencer<B, P> {
    pub fn new(backend: B, parser: P, config: SequencerConfig) -> Result<Self, ConfigError> {
        config.validate()?;
        tracing::debug!(
            "Sequencer starting with {} backend, {} DPB slots",
            backend.name(),
            config.dpb_size
        );

        Ok(Self {
            dpb: Dpb::new(config.dpb_size),
            state: SequencerState::new(config.wait_for_keyframe),
            reorder: ReorderTracker::new(
                config.frame_rate_n,
                config.frame_rate_d,
                config.preferred_output_delay,
            ),
            stats: SequencerStats::default(),
            backend,
            parser,
            config,
        })
    }

    pub fn backend(&self) -> &B {
        &self.backend
    }

    pub fn backend_mut(&mut self) -> &mut B {
        &mut self.backend
    }

    pub fn dpb(&self) -> &Dpb {
        &self.dpb
    }

    pub fn state(&self) -> &SequencerState {
        &self.state
    }

    pub fn stats(&self) -> &SequencerStats {
        &self.stats
    }

    pub fn config(&self) -> &SequencerConfig {
        &self.config
    }

    pub fn reorder(&self) -> &ReorderTracker {
        &self.reorder
    }

    /// Process one access unit.
    ///
    /// On error the remaining sub-frames of this unit are dropped; the session
    /// stays usable for the next unit.
    pub fn decode(&mut self, unit: &AccessUnit) -> Result<Vec<SubFrameOutcome>, SequenceError> {
        self.stats.access_units += 1;

        let result = self.decode_access_unit(unit);
        if let Err(e) = &result {
            self.stats.aborted_access_units += 1;
            tracing::warn!("Dropping access unit (pts {:?}): {}", unit.pts, e);
        }
        result
    }

    fn decode_access_unit(&mut self, unit: &AccessUnit) -> Result<Vec<SubFrameOutcome>, SequenceError> {
        if unit.data.is_empty() {
            if unit.end_of_stream {
                tracing::debug!("End of stream");
                return Ok(Vec::new());
            }
            return Err(SequenceError::EmptyAccessUnit);
        }

        let (sub_frames, index_size) = match SuperframeIndex::parse(&unit.data) {
            Some(index) => (index.sub_frames(), index.index_size),
            None => (vec![SubFrame::new(0, unit.data.len())], 0),
        };

        if sub_frames.len() > 1 {
            tracing::trace!(
                "Superframe with {} frames, index {} bytes",
                sub_frames.len(),
                index_size
            );
        }

        self.state.split = Some(SuperframeSplit {
            frame_sizes: sub_frames.iter().map(|f| f.size).collect(),
            index_size,
            cursor: 0,
        });

        let mut outcomes = Vec::with_capacity(sub_frames.len());
        for (index, sub_frame) in sub_frames.iter().enumerate() {
            if let Some(split) = self.state.split.as_mut() {
                split.cursor = index;
            }
            let outcome = self.decode_sub_frame(index, sub_frame.slice(&unit.data), unit.pts)?;
            outcomes.push(outcome);
        }

        self.state.split = None;
        Ok(outcomes)
    }

    fn decode_sub_frame(
        &mut self,
        index: usize,
        data: Bytes,
        pts: Option<i64>,
    ) -> Result<SubFrameOutcome, SequenceError> {
        self.stats.sub_frames += 1;

        let header = self
            .parser
            .parse_frame_header(&data)
            .map_err(|source| SequenceError::Parse { index, source })?;

        if self.state.waiting_for_keyframe {
            if header.show_existing_frame || !header.is_random_access_point() {
                tracing::debug!("Drop sub-frame {} before initial random access point", index);
                self.stats.skipped += 1;
                return Ok(SubFrameOutcome::Skipped);
            }
            self.state.waiting_for_keyframe = false;
        }

        if header.show_existing_frame {
            self.show_existing_frame(index, &header, data.len(), pts)
        } else {
            self.decode_picture(index, header, data, pts)
        }
    }

    /// Re-emit a DPB picture. Never reaches start/decode/end_picture.
    fn show_existing_frame(
        &mut self,
        index: usize,
        header: &FrameHeader,
        coded_size: usize,
        pts: Option<i64>,
    ) -> Result<SubFrameOutcome, SequenceError> {
        let slot = header.frame_to_show as usize;
        let source = self
            .dpb
            .get_occupied(slot)
            .map_err(|source| SequenceError::InvalidReferenceIndex { index, source })?;

        tracing::debug!("Sub-frame {}: show existing frame from slot {}", index, slot);

        let mut picture = self.backend.duplicate_picture(&source);
        picture.set_pts(pts);
        picture.set_coded_size(coded_size);
        let picture = picture.into_ref();

        self.output(index, picture.clone())?;
        self.stats.duplicated += 1;
        Ok(SubFrameOutcome::Duplicate(picture))
    }

    fn decode_picture(
        &mut self,
        index: usize,
        header: FrameHeader,
        data: Bytes,
        pts: Option<i64>,
    ) -> Result<SubFrameOutcome, SequenceError> {
        let refresh = header.refresh_frame_flags;
        self.dpb
            .validate_mask(refresh)
            .map_err(|source| SequenceError::InvalidReferenceIndex { index, source })?;

        self.check_codec_change(index, &header)?;

        let mut picture = Picture::new(data, header, pts);

        self.backend
            .new_picture(&mut picture)
            .map_err(lifecycle(index, BackendStage::NewPicture))?;
        picture.set_reorder_frame_number(self.reorder.next_frame_number());

        self.backend
            .start_picture(&mut picture)
            .map_err(lifecycle(index, BackendStage::StartPicture))?;
        self.backend
            .decode_picture(&mut picture, &self.dpb)
            .map_err(lifecycle(index, BackendStage::DecodePicture))?;
        self.backend
            .end_picture(&mut picture)
            .map_err(lifecycle(index, BackendStage::EndPicture))?;

        let picture = picture.into_ref();
        self.stats.decoded += 1;

        let shown = picture.header().show_frame;
        if shown {
            self.output(index, picture.clone())?;
        } else {
            tracing::trace!("Sub-frame {}: decode only picture", index);
            self.stats.hidden += 1;
        }

        self.dpb
            .refresh(refresh, &picture)
            .map_err(|source| SequenceError::InvalidReferenceIndex { index, source })?;

        Ok(if shown {
            SubFrameOutcome::Decode(picture)
        } else {
            SubFrameOutcome::DecodeOnly(picture)
        })
    }

    fn check_codec_change(&mut self, index: usize, header: &FrameHeader) -> Result<(), SequenceError> {
        let state = &self.state;
        if state.sequence_started && !header.format_differs(state.width, state.height, state.profile) {
            return Ok(());
        }

        tracing::info!(
            "New sequence: {}x{} profile {} (was {}x{} profile {})",
            header.width,
            header.height,
            header.profile,
            state.width,
            state.height,
            state.profile
        );

        self.backend
            .new_sequence(header)
            .map_err(|source| SequenceError::CodecChangeRejected { index, source })?;

        self.state.width = header.width;
        self.state.height = header.height;
        self.state.profile = header.profile;
        self.state.sequence_started = true;
        self.stats.sequences += 1;

        // reorder depth of the previous sequence no longer applies
        self.reorder.reset();
        if let Some(info) = self.backend.reorder_info(header) {
            let max_dpb_frames = self.dpb.capacity() as u32;
            let depth = max_num_reorder_frames(&info, max_dpb_frames, self.config.compliance);
            tracing::debug!("Expecting reorder depth {} for new sequence", depth);
            self.reorder.set_max_reorder_count(depth);
        }
        Ok(())
    }

    fn output(&mut self, index: usize, picture: PictureRef) -> Result<(), SequenceError> {
        if let Some(latency) = self.reorder.on_output(picture.reorder_frame_number()) {
            tracing::info!(
                "Reorder depth now {} frames, latency {:?}",
                self.reorder.max_reorder_count(),
                latency
            );
        }
        self.backend
            .output_picture(picture)
            .map_err(lifecycle(index, BackendStage::OutputPicture))
    }

    /// Flush: drop all references and forget the stream format.
    ///
    /// Must not be called while a backend call is in progress.
    pub fn reset(&mut self) {
        tracing::debug!("Sequencer reset, releasing {} DPB pictures", self.dpb.len());
        self.dpb.clear();
        self.state = SequencerState::new(self.config.wait_for_keyframe);
        self.reorder.reset();
    }

    /// Tear the session down and return its statistics.
    pub fn stop(&mut self) -> SequencerStats {
        self.reset();
        let stats = std::mem::take(&mut self.stats);
        tracing::info!(
            "Sequencer stopped: {} access units, {} decoded, {} duplicated, {} aborted",
            stats.access_units,
            stats.decoded,
            stats.duplicated,
            stats.aborted_access_units
        );
        stats
    }

    pub fn into_backend(self) -> B {
        self.backend
    }
}

// ============================================================================
// Tests
// ============================================================================
