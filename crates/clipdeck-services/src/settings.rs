//! Engine output settings

use serde::{Deserialize, Serialize};

/// Output settings for the playback engine
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct EngineSettings {
    /// Sample rate used when rendering offline; live output follows the device
    pub sample_rate: u32,
    /// Channel count used when rendering offline
    pub channels: u16,
    /// Gain applied to the summed voices
    pub master_gain: f32,
    /// Extra seconds rendered after the last clip ends
    pub render_tail: f64,
}

impl Default for EngineSettings {
    fn default() -> Self {
        Self {
            sample_rate: 44100,
            channels: 2,
            master_gain: 1.0,
            render_tail: 0.0,
        }
    }
}
