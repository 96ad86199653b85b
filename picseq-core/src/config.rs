//! Sequencer configuration

use std::path::Path;

use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::dpb::VP9_NUM_REF_FRAMES;
use crate::reorder::Compliance;

/// Largest DPB the refresh mask can address.
pub const MAX_DPB_SIZE: usize = 32;

#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("Failed to read config: {0}")]
    Io(#[from] std::io::Error),
    #[error("Failed to parse config: {0}")]
    Parse(#[from] serde_json::Error),
    #[error("Invalid config: {0}")]
    Invalid(String),
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct SequencerConfig {
    /// Number of reference slots
    pub dpb_size: usize,
    /// Skip non-keyframes until the first keyframe after start or reset
    pub wait_for_keyframe: bool,
    /// Used for latency reporting when the stream carries no rate
    pub frame_rate_n: u32,
    pub frame_rate_d: u32,
    /// Extra frames the backend wants to hold before output
    pub preferred_output_delay: u32,
    /// Reorder depth inference rules for backends that report [`ReorderInfo`]
    ///
    /// [`ReorderInfo`]: crate::reorder::ReorderInfo
    pub compliance: Compliance,
}

impl Default for SequencerConfig {
    fn default() -> Self {
        Self {
            dpb_size: VP9_NUM_REF_FRAMES,
            wait_for_keyframe: false,
            frame_rate_n: 25,
            frame_rate_d: 1,
            preferred_output_delay: 0,
            compliance: Compliance::Normal,
        }
    }
}

impl SequencerConfig {
    pub fn from_json_str(json: &str) -> Result<Self, ConfigError> {
        let config: Self = serde_json::from_str(json)?;
        config.validate()?;
        Ok(config)
    }

    pub fn load(path: &Path) -> Result<Self, ConfigError> {
        let content = std::fs::read_to_string(path)?;
        Self::from_json_str(&content)
    }

    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.dpb_size == 0 || self.dpb_size > MAX_DPB_SIZE {
            return Err(ConfigError::Invalid(format!(
                "dpb_size must be within 1..={}, got {}",
                MAX_DPB_SIZE, self.dpb_size
            )));
        }
        if self.frame_rate_d == 0 {
            return Err(ConfigError::Invalid("frame_rate_d must be non-zero".into()));
        }
        Ok(())
    }
}
