//! Playback engine: schedules project clips against the host clock

use std::collections::HashMap;

use clipdeck_core::{AudioBuffer, Clip, ClipId, Project};
use crossbeam_channel::Receiver;
use serde::{Deserialize, Serialize};
use thiserror::Error;
use tracing::{debug, info, trace, warn};

use crate::decoder::DecodeError;
use crate::host::{AudioHost, VoiceEnded, VoiceId, VoiceRequest, VoiceSchedule};

#[derive(Debug, Error)]
pub enum AudioEngineError {
    #[error("Decode failed: {0}")]
    Decode(#[from] DecodeError),
}

/// Engine transport state. There is no paused state: pausing is a stop that keeps the playhead.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
pub enum EngineState {
    #[default]
    Stopped,
    Playing,
}

/// Clock time and playhead captured when playback started
#[derive(Debug, Clone, Copy, PartialEq)]
struct PlayAnchor {
    clock_time: f64,
    playhead: f64,
}

/// Work out when and from where a clip should sound if playback starts at
/// `playhead` with the host clock at `now`. `None` if nothing of the clip is left to play.
pub fn schedule_clip(clip: &Clip, playhead: f64, now: f64) -> Option<VoiceSchedule> {
    if clip.end_time() <= playhead {
        return None;
    }

    let schedule = if clip.start_time >= playhead {
        VoiceSchedule {
            when: now + (clip.start_time - playhead),
            offset: clip.offset,
            duration: clip.duration,
        }
    } else {
        let already_passed = playhead - clip.start_time;
        VoiceSchedule {
            when: now,
            offset: clip.offset + already_passed,
            duration: clip.duration - already_passed,
        }
    };

    (schedule.duration > 0.0).then_some(schedule)
}

/// Schedules for every clip of the project, in collection order. Clips whose
/// buffer is missing are left out.
pub fn plan(project: &Project, now: f64) -> Vec<(ClipId, VoiceSchedule)> {
    project
        .clips
        .iter()
        .filter(|clip| project.buffers.contains(&clip.buffer_key))
        .filter_map(|clip| schedule_clip(clip, project.playhead, now).map(|s| (clip.id, s)))
        .collect()
}

/// Drives playback of a [`Project`] on an [`AudioHost`]
pub struct PlaybackEngine<H: AudioHost> {
    host: H,
    state: EngineState,
    active: HashMap<ClipId, VoiceId>,
    anchor: Option<PlayAnchor>,
    events: Receiver<VoiceEnded>,
}

impl<H: AudioHost> PlaybackEngine<H> {
    pub fn new(host: H) -> Self {
        let events = host.voice_events();
        Self {
            host,
            state: EngineState::Stopped,
            active: HashMap::new(),
            anchor: None,
            events,
        }
    }

    pub fn host(&self) -> &H {
        &self.host
    }

    pub fn host_mut(&mut self) -> &mut H {
        &mut self.host
    }

    pub fn state(&self) -> EngineState {
        self.state
    }

    pub fn is_playing(&self) -> bool {
        self.state == EngineState::Playing
    }

    /// Voice currently tracked for a clip
    pub fn active_voice(&self, clip: ClipId) -> Option<VoiceId> {
        self.active.get(&clip).copied()
    }

    pub fn active_voice_count(&self) -> usize {
        self.active.len()
    }

    pub fn set_master_gain(&mut self, gain: f32) {
        self.host.set_master_gain(gain);
    }

    /// Decode raw file bytes with the host decoder. Failures leave every project untouched.
    pub fn decode_audio_data(&self, bytes: &[u8]) -> Result<AudioBuffer, AudioEngineError> {
        Ok(self.host.decode_audio_data(bytes)?)
    }

    /// Start playback of every clip from `project.playhead`. Restarts if already playing.
    /// Returns the number of voices scheduled.
    pub fn play(&mut self, project: &mut Project) -> usize {
        if project.is_playing || self.is_playing() {
            self.stop(project);
        }

        if self.host.is_suspended() {
            if let Err(e) = self.host.resume() {
                warn!(error = %e, "Could not resume audio clock");
            }
        }

        let playhead = project.playhead;
        let now = self.host.current_time();

        for clip in &project.clips {
            let Some(buffer) = project.buffers.get(&clip.buffer_key) else {
                warn!(clip = clip.id.0, key = %clip.buffer_key, "Clip buffer missing, skipping");
                continue;
            };
            let Some(schedule) = schedule_clip(clip, playhead, now) else {
                trace!(clip = clip.id.0, "Clip outside play range");
                continue;
            };

            let request = VoiceRequest {
                clip: clip.id,
                buffer,
                schedule,
                envelope: clip.gain_points.clone(),
                envelope_start: schedule.offset - clip.offset,
            };

            match self.host.start_voice(request) {
                Ok(voice) => {
                    debug!(
                        clip = clip.id.0,
                        voice = voice.0,
                        when = schedule.when,
                        offset = schedule.offset,
                        duration = schedule.duration,
                        "Scheduled voice"
                    );
                    if let Some(previous) = self.active.insert(clip.id, voice) {
                        warn!(clip = clip.id.0, voice = previous.0, "Duplicate clip id, dropping earlier voice");
                        if let Err(e) = self.host.stop_voice(previous) {
                            trace!(clip = clip.id.0, voice = previous.0, error = %e, "Voice already ended");
                        }
                    }
                }
                Err(e) => warn!(clip = clip.id.0, error = %e, "Failed to start voice"),
            }
        }

        self.anchor = Some(PlayAnchor { clock_time: now, playhead });
        self.state = EngineState::Playing;
        project.is_playing = true;

        info!(playhead, voices = self.active.len(), "Playback started");
        self.active.len()
    }

    /// Stop every voice and move the playhead to where playback actually got to
    pub fn stop(&mut self, project: &mut Project) {
        for (clip, voice) in self.active.drain() {
            if let Err(e) = self.host.stop_voice(voice) {
                trace!(clip = clip.0, voice = voice.0, error = %e, "Voice already ended");
            }
        }

        if project.is_playing {
            if let Some(anchor) = self.anchor {
                let elapsed = self.host.current_time() - anchor.clock_time;
                project.set_playhead(anchor.playhead + elapsed);
            }
            project.is_playing = false;
            info!(playhead = project.playhead, "Playback stopped");
        }

        self.anchor = None;
        self.state = EngineState::Stopped;
    }

    /// Move the playhead, restarting playback from there if it was running
    pub fn seek(&mut self, project: &mut Project, secs: f64) {
        let was_playing = project.is_playing;
        if was_playing {
            self.stop(project);
        }
        project.set_playhead(secs);
        if was_playing {
            self.play(project);
        }
    }

    /// Logical playhead right now, for display while playing
    pub fn current_playhead(&self, project: &Project) -> f64 {
        match (project.is_playing, self.anchor) {
            (true, Some(anchor)) => anchor.playhead + (self.host.current_time() - anchor.clock_time),
            _ => project.playhead,
        }
    }

    /// Apply ended-voice reports from the host. An entry is only cleared if it
    /// still refers to the voice that ended, so late reports from replaced voices are ignored.
    pub fn poll_completions(&mut self) -> usize {
        let mut cleared = 0;
        while let Ok(ended) = self.events.try_recv() {
            if self.active.get(&ended.clip) == Some(&ended.voice) {
                self.active.remove(&ended.clip);
                cleared += 1;
            } else {
                trace!(clip = ended.clip.0, voice = ended.voice.0, "Stale voice end ignored");
            }
        }
        cleared
    }
}
