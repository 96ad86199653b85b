//! Reorder depth and output latency tracking
//!
//! Every freshly created picture gets the next reorder frame number. When a
//! picture is output, the distance between the newest number handed out and
//! the picture's own number is how many frames the decoder had to hold it
//! back. The largest distance seen so far bounds the latency downstream
//! elements must budget for.

use std::time::Duration;

use serde::{Deserialize, Serialize};

/// How strictly to follow the H.264 inference rules for reorder depth.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
pub enum Compliance {
    /// Follow the standard only
    Strict,
    /// Also assume baseline-family streams never reorder
    #[default]
    Normal,
}

/// The SPS fields reorder inference depends on.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct ReorderInfo {
    pub profile_idc: u8,
    pub constraint_set3_flag: bool,
    /// `num_reorder_frames` when VUI bitstream restriction is present
    pub num_reorder_frames: Option<u32>,
}

/// Maximum number of frames that may precede any frame in decode order and
/// follow it in output order.
pub fn max_num_reorder_frames(info: &ReorderInfo, max_dpb_frames: u32, compliance: Compliance) -> u32 {
    if let Some(num_reorder_frames) = info.num_reorder_frames {
        if num_reorder_frames > max_dpb_frames {
            tracing::warn!(
                "num_reorder_frames present, but larger than MaxDpbFrames ({} > {})",
                num_reorder_frames,
                max_dpb_frames
            );
            return max_dpb_frames;
        }
        return num_reorder_frames;
    }

    // Intra profiles with constraint_set3 never reorder
    if info.constraint_set3_flag && matches!(info.profile_idc, 44 | 86 | 100 | 110 | 122 | 244) {
        return 0;
    }

    // Baseline, constrained baseline and scalable baseline only carry I/P
    if compliance != Compliance::Strict && matches!(info.profile_idc, 66 | 83) {
        return 0;
    }

    max_dpb_frames
}

#[derive(Debug, Clone)]
pub struct ReorderTracker {
    last_reorder_frame_number: u64,
    max_reorder_count: u32,
    preferred_output_delay: u32,
    fps_n: u32,
    fps_d: u32,
}

impl ReorderTracker {
    /// `fps_n == 0` falls back to 25/1.
    pub fn new(fps_n: u32, fps_d: u32, preferred_output_delay: u32) -> Self {
        let (fps_n, fps_d) = if fps_n == 0 || fps_d == 0 { (25, 1) } else { (fps_n, fps_d) };
        Self {
            last_reorder_frame_number: 0,
            max_reorder_count: 0,
            preferred_output_delay,
            fps_n,
            fps_d,
        }
    }

    /// Hand out the reorder number for a freshly created picture.
    pub fn next_frame_number(&mut self) -> u64 {
        self.last_reorder_frame_number += 1;
        self.last_reorder_frame_number
    }

    pub fn last_frame_number(&self) -> u64 {
        self.last_reorder_frame_number
    }

    pub fn max_reorder_count(&self) -> u32 {
        self.max_reorder_count
    }

    /// Seed the expected reorder depth, e.g. from [`max_num_reorder_frames`].
    pub fn set_max_reorder_count(&mut self, count: u32) {
        self.max_reorder_count = count;
    }

    /// Record the output of a picture. Returns the new latency when the
    /// observed reorder depth grew.
    pub fn on_output(&mut self, reorder_frame_number: u64) -> Option<Duration> {
        if self.last_reorder_frame_number <= reorder_frame_number {
            return None;
        }

        let diff = self.last_reorder_frame_number - reorder_frame_number;
        let total_delay = diff + self.preferred_output_delay as u64;
        if diff <= self.max_reorder_count as u64 || total_delay >= u32::MAX as u64 {
            return None;
        }

        self.max_reorder_count = diff as u32;
        let latency = self.frames_to_duration(total_delay);
        tracing::debug!(
            "Updating latency to {:?}, reorder count: {}, output-delay: {}",
            latency,
            diff,
            self.preferred_output_delay
        );
        Some(latency)
    }

    /// Latency implied by the current reorder depth plus the output delay.
    pub fn latency(&self) -> Duration {
        self.frames_to_duration(self.max_reorder_count as u64 + self.preferred_output_delay as u64)
    }

    fn frames_to_duration(&self, frames: u64) -> Duration {
        let nanos = frames as u128 * 1_000_000_000 * self.fps_d as u128 / self.fps_n as u128;
        Duration::from_nanos(nanos.min(u64::MAX as u128) as u64)
    }

    pub fn reset(&mut self) {
        self.last_reorder_frame_number = 0;
        self.max_reorder_count = 0;
    }
}

impl Default for ReorderTracker {
    fn default() -> Self {
        Self::new(25, 1, 0)
    }
}
