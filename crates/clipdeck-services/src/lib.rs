//! clipdeck-services: Playback engine, audio hosts, codecs and effects

pub mod audio_effects;
pub mod audio_engine;
pub mod audio_io;
pub mod decoder;
pub mod host;
pub mod mixer;
pub mod offline;
pub mod resample;
mod settings;

pub use audio_effects::{Effect, EffectError, EffectParam, EffectParams, EffectRegistry};
pub use audio_engine::{plan, schedule_clip, AudioEngineError, EngineState, PlaybackEngine};
pub use audio_io::{AudioOutputError, CpalHost};
pub use decoder::{decode_wav, encode_wav, read_wav_file, DecodeError};
pub use host::{AudioHost, HostError, VoiceEnded, VoiceId, VoiceRequest, VoiceSchedule};
pub use mixer::VoiceMixer;
pub use offline::OfflineHost;
pub use resample::{resample, ResampleCache};
pub use settings::EngineSettings;
