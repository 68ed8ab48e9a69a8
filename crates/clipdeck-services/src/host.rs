//! The audio host capability the playback engine runs against

use std::sync::Arc;

use clipdeck_core::{AudioBuffer, ClipId, GainPoint};
use crossbeam_channel::Receiver;
use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::decoder::{self, DecodeError};

#[derive(Debug, Error)]
pub enum HostError {
    #[error("Voice {0} is not active")]
    VoiceNotActive(u64),
    #[error("Failed to resume audio clock: {0}")]
    Resume(String),
    #[error("Audio host unavailable: {0}")]
    Unavailable(String),
    #[error("Resample error: {0}")]
    Resample(String),
}

/// Identifies one started voice on a host
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct VoiceId(pub u64);

/// When and what part of a buffer a voice plays. All values in seconds;
/// `when` is on the host clock.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct VoiceSchedule {
    pub when: f64,
    pub offset: f64,
    pub duration: f64,
}

/// Everything a host needs to start a voice
#[derive(Debug, Clone)]
pub struct VoiceRequest {
    pub clip: ClipId,
    pub buffer: Arc<AudioBuffer>,
    pub schedule: VoiceSchedule,
    /// Clip envelope, clip-relative times
    pub envelope: Vec<GainPoint>,
    /// Clip-relative time at which the voice starts (non-zero when starting mid-clip)
    pub envelope_start: f64,
}

/// Sent by a host when a voice stops sounding, either naturally or via `stop_voice`
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct VoiceEnded {
    pub clip: ClipId,
    pub voice: VoiceId,
}

/// Hardware (or simulated) audio clock plus voice scheduling
pub trait AudioHost {
    /// Current clock time in seconds. Only moves while the host is running.
    fn current_time(&self) -> f64;

    fn is_suspended(&self) -> bool;

    fn resume(&mut self) -> Result<(), HostError>;

    /// Queue a voice to start at `request.schedule.when`
    fn start_voice(&mut self, request: VoiceRequest) -> Result<VoiceId, HostError>;

    /// Stop a voice. Errors if the voice already ended.
    fn stop_voice(&mut self, voice: VoiceId) -> Result<(), HostError>;

    /// Channel on which ended voices are reported
    fn voice_events(&self) -> Receiver<VoiceEnded>;

    fn set_master_gain(&mut self, gain: f32);

    /// Decode raw file bytes into a buffer
    fn decode_audio_data(&self, bytes: &[u8]) -> Result<AudioBuffer, DecodeError> {
        decoder::decode_wav(bytes)
    }
}
