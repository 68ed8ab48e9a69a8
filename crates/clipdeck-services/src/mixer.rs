//! Sample-accurate mixing of scheduled voices, shared by every host

use crossbeam_channel::{unbounded, Receiver, Sender};
use clipdeck_core::envelope_gain;
use tracing::trace;

use crate::host::{HostError, VoiceEnded, VoiceId, VoiceRequest};

#[derive(Debug)]
struct ActiveVoice {
    id: VoiceId,
    request: VoiceRequest,
    start_frame: u64,
    end_frame: u64,
}

/// Renders scheduled voices into interleaved output blocks and keeps the
/// host clock (frames rendered so far). Hosts hand it buffers already at
/// the mixer rate; reads between frames are interpolated.
#[derive(Debug)]
pub struct VoiceMixer {
    sample_rate: u32,
    channels: u16,
    frames_rendered: u64,
    voices: Vec<ActiveVoice>,
    master_gain: f32,
    next_voice: u64,
    events: Sender<VoiceEnded>,
    events_rx: Receiver<VoiceEnded>,
}

impl VoiceMixer {
    pub fn new(sample_rate: u32, channels: u16) -> Self {
        let (events, events_rx) = unbounded();
        Self {
            sample_rate: sample_rate.max(1),
            channels: channels.max(1),
            frames_rendered: 0,
            voices: Vec::new(),
            master_gain: 1.0,
            next_voice: 1,
            events,
            events_rx,
        }
    }

    pub fn sample_rate(&self) -> u32 {
        self.sample_rate
    }

    pub fn channels(&self) -> u16 {
        self.channels
    }

    /// Clock time in seconds
    pub fn current_time(&self) -> f64 {
        self.frames_rendered as f64 / self.sample_rate as f64
    }

    pub fn frames_rendered(&self) -> u64 {
        self.frames_rendered
    }

    pub fn events(&self) -> Receiver<VoiceEnded> {
        self.events_rx.clone()
    }

    pub fn set_master_gain(&mut self, gain: f32) {
        self.master_gain = gain.max(0.0);
    }

    pub fn active_voices(&self) -> usize {
        self.voices.len()
    }

    fn secs_to_frames(&self, secs: f64) -> u64 {
        (secs.max(0.0) * self.sample_rate as f64).round() as u64
    }

    pub fn start(&mut self, request: VoiceRequest) -> VoiceId {
        let id = VoiceId(self.next_voice);
        self.next_voice += 1;

        // A start time already in the past begins at the next rendered frame
        let start_frame = self.secs_to_frames(request.schedule.when).max(self.frames_rendered);
        let end_frame = start_frame + self.secs_to_frames(request.schedule.duration);

        trace!(voice = id.0, clip = request.clip.0, start_frame, end_frame, "voice queued");
        self.voices.push(ActiveVoice { id, request, start_frame, end_frame });
        id
    }

    pub fn stop(&mut self, voice: VoiceId) -> Result<(), HostError> {
        let pos = self
            .voices
            .iter()
            .position(|v| v.id == voice)
            .ok_or(HostError::VoiceNotActive(voice.0))?;
        let stopped = self.voices.remove(pos);
        self.notify_ended(&stopped);
        Ok(())
    }

    fn notify_ended(&self, voice: &ActiveVoice) {
        let _ = self.events.send(VoiceEnded {
            clip: voice.request.clip,
            voice: voice.id,
        });
    }

    /// Mix every sounding voice into `out` (interleaved, `channels` wide),
    /// advance the clock, and retire voices that have finished.
    pub fn render(&mut self, out: &mut [f32]) {
        out.fill(0.0);
        let channels = self.channels as usize;
        let frames = (out.len() / channels) as u64;
        let block_start = self.frames_rendered;
        let block_end = block_start + frames;
        let rate = self.sample_rate as f64;

        for voice in &self.voices {
            let from = voice.start_frame.max(block_start);
            let to = voice.end_frame.min(block_end);
            if from >= to {
                continue;
            }

            let request = &voice.request;
            for frame in from..to {
                let elapsed = (frame - voice.start_frame) as f64 / rate;
                let source_time = request.schedule.offset + elapsed;
                let gain = envelope_gain(&request.envelope, request.envelope_start + elapsed)
                    * self.master_gain;

                let base = (frame - block_start) as usize * channels;
                for ch in 0..channels {
                    out[base + ch] += request.buffer.sample_at(ch, source_time) * gain;
                }
            }
        }

        self.frames_rendered = block_end;

        let (finished, running): (Vec<_>, Vec<_>) = std::mem::take(&mut self.voices)
            .into_iter()
            .partition(|v| v.end_frame <= block_end);
        self.voices = running;
        for voice in &finished {
            self.notify_ended(voice);
        }
    }
}

#[cfg(test)]
mod tests {
    use std::sync::Arc;

    use clipdeck_core::{AudioBuffer, ClipId, GainPoint};

    use super::*;
    use crate::host::VoiceSchedule;

    fn request(clip: u64, samples: Vec<f32>, when: f64, offset: f64, duration: f64) -> VoiceRequest {
        VoiceRequest {
            clip: ClipId(clip),
            buffer: Arc::new(AudioBuffer::from_mono(samples, 10).unwrap()),
            schedule: VoiceSchedule { when, offset, duration },
            envelope: vec![GainPoint::new(0.0, 1.0), GainPoint::new(duration, 1.0)],
            envelope_start: 0.0,
        }
    }

    #[test]
    fn test_voice_starts_on_its_frame() {
        let mut mixer = VoiceMixer::new(10, 1);
        mixer.start(request(1, vec![1.0; 10], 0.3, 0.0, 0.2));

        let mut out = vec![0.0; 10];
        mixer.render(&mut out);
        assert_eq!(out, vec![0.0, 0.0, 0.0, 1.0, 1.0, 0.0, 0.0, 0.0, 0.0, 0.0]);
        assert_eq!(mixer.active_voices(), 0);
        assert!((mixer.current_time() - 1.0).abs() < 1e-9);
    }

    #[test]
    fn test_offset_reads_into_buffer() {
        let mut mixer = VoiceMixer::new(10, 2);
        let ramp: Vec<f32> = (0..10).map(|i| i as f32).collect();
        mixer.start(request(1, ramp, 0.0, 0.4, 0.3));

        let mut out = vec![0.0; 8];
        mixer.render(&mut out);
        // Mono source fans out to both output channels
        assert_eq!(out, vec![4.0, 4.0, 5.0, 5.0, 6.0, 6.0, 0.0, 0.0]);
    }

    #[test]
    fn test_reports_natural_and_stopped_ends() {
        let mut mixer = VoiceMixer::new(10, 1);
        let events = mixer.events();
        let short = mixer.start(request(1, vec![0.5; 10], 0.0, 0.0, 0.1));
        let long = mixer.start(request(2, vec![0.5; 10], 0.0, 0.0, 1.0));

        let mut out = vec![0.0; 2];
        mixer.render(&mut out);
        assert_eq!(events.try_recv().unwrap(), VoiceEnded { clip: ClipId(1), voice: short });

        mixer.stop(long).unwrap();
        assert_eq!(events.try_recv().unwrap(), VoiceEnded { clip: ClipId(2), voice: long });
        assert!(matches!(mixer.stop(long), Err(HostError::VoiceNotActive(_))));
    }

    #[test]
    fn test_envelope_and_master_gain() {
        let mut mixer = VoiceMixer::new(10, 1);
        let mut req = request(1, vec![1.0; 10], 0.0, 0.0, 0.4);
        req.envelope = vec![GainPoint::new(0.0, 0.0), GainPoint::new(0.4, 1.0)];
        mixer.start(req);
        mixer.set_master_gain(0.5);

        let mut out = vec![0.0; 4];
        mixer.render(&mut out);
        let expected = [0.0, 0.125, 0.25, 0.375];
        for (a, b) in out.iter().zip(expected) {
            assert!((a - b).abs() < 1e-6);
        }
    }
}
