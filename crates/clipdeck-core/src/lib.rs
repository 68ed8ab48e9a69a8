//! clipdeck-core: Domain types for the clipdeck timeline engine

mod buffer;
mod clip;
mod error;
mod project;
mod settings;
mod time;

pub use buffer::{AudioBuffer, BufferKey, BufferStore};
pub use clip::{envelope_gain, Clip, ClipId, GainPoint, GAIN_POINT_TOLERANCE, MIN_CLIP_DURATION};
pub use error::{ClipdeckError, Result};
pub use project::{Project, IMPORT_GAP, MIN_TAIL};
pub use settings::ProjectSettings;
pub use time::format_time;
