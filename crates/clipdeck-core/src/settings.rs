//! Project defaults

use serde::{Deserialize, Serialize};

/// Timeline defaults for a new project
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct ProjectSettings {
    /// Initial timeline length in seconds
    #[serde(default = "default_duration")]
    pub default_duration: f64,
    /// Space kept after the last clip, in seconds
    #[serde(default = "default_padding")]
    pub timeline_padding: f64,
}

fn default_duration() -> f64 {
    60.0
}

fn default_padding() -> f64 {
    10.0
}

impl Default for ProjectSettings {
    fn default() -> Self {
        Self {
            default_duration: default_duration(),
            timeline_padding: default_padding(),
        }
    }
}
