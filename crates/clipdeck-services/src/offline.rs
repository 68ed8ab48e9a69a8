//! Manually clocked host for rendering to memory and for deterministic tests

use clipdeck_core::AudioBuffer;
use crossbeam_channel::Receiver;
use tracing::warn;

use crate::host::{AudioHost, HostError, VoiceEnded, VoiceId, VoiceRequest};
use crate::mixer::VoiceMixer;
use crate::resample::ResampleCache;

/// Host whose clock only moves when [`OfflineHost::advance`] is called
#[derive(Debug)]
pub struct OfflineHost {
    mixer: VoiceMixer,
    resampled: ResampleCache,
    suspended: bool,
    capture: bool,
    rendered: Vec<f32>,
}

impl OfflineHost {
    /// A running host that discards what it renders
    pub fn new(sample_rate: u32, channels: u16) -> Self {
        Self {
            mixer: VoiceMixer::new(sample_rate, channels),
            resampled: ResampleCache::new(),
            suspended: false,
            capture: false,
            rendered: Vec::new(),
        }
    }

    /// A running host that keeps everything it renders for [`OfflineHost::take_rendered`]
    pub fn capturing(sample_rate: u32, channels: u16) -> Self {
        Self {
            capture: true,
            ..Self::new(sample_rate, channels)
        }
    }

    /// A host that starts suspended, like an output device that has not been started yet
    pub fn suspended(sample_rate: u32, channels: u16) -> Self {
        Self {
            suspended: true,
            ..Self::new(sample_rate, channels)
        }
    }

    pub fn mixer(&self) -> &VoiceMixer {
        &self.mixer
    }

    /// Render `secs` of audio and move the clock forward. A suspended host does not advance.
    pub fn advance(&mut self, secs: f64) {
        if self.suspended {
            warn!(secs, "offline host is suspended; clock not advanced");
            return;
        }
        let frames = (secs.max(0.0) * self.mixer.sample_rate() as f64).round() as usize;
        let mut block = vec![0.0f32; frames * self.mixer.channels() as usize];
        self.mixer.render(&mut block);
        if self.capture {
            self.rendered.extend_from_slice(&block);
        }
    }

    /// Advance until no voice is active, in `step` sized blocks, for at most `limit` seconds
    pub fn run_until_idle(&mut self, step: f64, limit: f64) {
        if step <= 0.0 || !step.is_finite() {
            warn!(step, "render step must be positive");
            return;
        }
        let start = self.current_time();
        while self.mixer.active_voices() > 0 && self.current_time() - start < limit {
            self.advance(step);
            if self.suspended {
                break;
            }
        }
    }

    /// Drain the captured output into a buffer
    pub fn take_rendered(&mut self) -> clipdeck_core::Result<AudioBuffer> {
        let samples = std::mem::take(&mut self.rendered);
        AudioBuffer::from_interleaved(&samples, self.mixer.channels(), self.mixer.sample_rate())
    }
}

impl AudioHost for OfflineHost {
    fn current_time(&self) -> f64 {
        self.mixer.current_time()
    }

    fn is_suspended(&self) -> bool {
        self.suspended
    }

    fn resume(&mut self) -> Result<(), HostError> {
        self.suspended = false;
        Ok(())
    }

    fn start_voice(&mut self, mut request: VoiceRequest) -> Result<VoiceId, HostError> {
        request.buffer = self.resampled.conform(request.buffer, self.mixer.sample_rate())?;
        Ok(self.mixer.start(request))
    }

    fn stop_voice(&mut self, voice: VoiceId) -> Result<(), HostError> {
        self.mixer.stop(voice)
    }

    fn voice_events(&self) -> Receiver<VoiceEnded> {
        self.mixer.events()
    }

    fn set_master_gain(&mut self, gain: f32) {
        self.mixer.set_master_gain(gain);
    }
}
