//! Real-time host on the default cpal output device

use std::sync::{Arc, Mutex, MutexGuard};

use cpal::traits::{DeviceTrait, HostTrait, StreamTrait};
use cpal::StreamConfig;
use crossbeam_channel::Receiver;
use thiserror::Error;
use tracing::{error, info};

use crate::host::{AudioHost, HostError, VoiceEnded, VoiceId, VoiceRequest};
use crate::mixer::VoiceMixer;
use crate::resample::ResampleCache;

#[derive(Debug, Error)]
pub enum AudioOutputError {
    #[error("No audio output devices found")]
    NoDevices,
    #[error("Failed to get default output config: {0}")]
    ConfigError(String),
    #[error("Failed to build output stream: {0}")]
    StreamError(String),
}

/// Host backed by a cpal output stream. The clock is the number of frames the
/// device has pulled, so it only advances while the stream is playing.
pub struct CpalHost {
    mixer: Arc<Mutex<VoiceMixer>>,
    resampled: ResampleCache,
    sample_rate: u32,
    events: Receiver<VoiceEnded>,
    stream: cpal::Stream,
    suspended: bool,
    device_name: String,
}

impl CpalHost {
    /// Open the default output device. The stream is built paused; `resume` starts it.
    pub fn open_default() -> Result<Self, AudioOutputError> {
        let host = cpal::default_host();
        let device = host
            .default_output_device()
            .ok_or(AudioOutputError::NoDevices)?;

        let supported_config = device
            .default_output_config()
            .map_err(|e| AudioOutputError::ConfigError(e.to_string()))?;

        let sample_rate = supported_config.sample_rate().0;
        let channels = supported_config.channels();
        let device_name = device.name().unwrap_or_default();

        let mixer = VoiceMixer::new(sample_rate, channels);
        let events = mixer.events();
        let mixer = Arc::new(Mutex::new(mixer));
        let render_mixer = mixer.clone();

        let config: StreamConfig = supported_config.into();

        let stream = device
            .build_output_stream(
                &config,
                move |data: &mut [f32], _: &cpal::OutputCallbackInfo| {
                    let Ok(mut mixer) = render_mixer.lock() else {
                        data.fill(0.0);
                        return;
                    };
                    mixer.render(data);
                },
                move |err| error!("Output stream error: {}", err),
                None,
            )
            .map_err(|e| AudioOutputError::StreamError(e.to_string()))?;

        // Some backends start streams immediately; hold it until resume
        let _ = stream.pause();

        info!(device = %device_name, sample_rate, channels, "Opened output device");

        Ok(Self {
            mixer,
            resampled: ResampleCache::new(),
            sample_rate,
            events,
            stream,
            suspended: true,
            device_name,
        })
    }

    pub fn device_name(&self) -> &str {
        &self.device_name
    }

    /// Number of voices still queued or sounding
    pub fn active_voices(&self) -> usize {
        self.lock().map(|m| m.active_voices()).unwrap_or(0)
    }

    fn lock(&self) -> Result<MutexGuard<'_, VoiceMixer>, HostError> {
        self.mixer
            .lock()
            .map_err(|_| HostError::Unavailable("voice mixer has been poisoned".into()))
    }
}

impl AudioHost for CpalHost {
    fn current_time(&self) -> f64 {
        self.lock().map(|m| m.current_time()).unwrap_or(0.0)
    }

    fn is_suspended(&self) -> bool {
        self.suspended
    }

    fn resume(&mut self) -> Result<(), HostError> {
        self.stream
            .play()
            .map_err(|e| HostError::Resume(e.to_string()))?;
        self.suspended = false;
        Ok(())
    }

    fn start_voice(&mut self, mut request: VoiceRequest) -> Result<VoiceId, HostError> {
        // Convert before taking the lock the render callback needs
        request.buffer = self.resampled.conform(request.buffer, self.sample_rate)?;
        Ok(self.lock()?.start(request))
    }

    fn stop_voice(&mut self, voice: VoiceId) -> Result<(), HostError> {
        self.lock()?.stop(voice)
    }

    fn voice_events(&self) -> Receiver<VoiceEnded> {
        self.events.clone()
    }

    fn set_master_gain(&mut self, gain: f32) {
        if let Ok(mut mixer) = self.lock() {
            mixer.set_master_gain(gain);
        }
    }
}

impl Drop for CpalHost {
    fn drop(&mut self) {
        let _ = self.stream.pause();
    }
}
