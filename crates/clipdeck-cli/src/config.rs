//! Config file loading

use std::path::{Path, PathBuf};

use clipdeck_core::ProjectSettings;
use clipdeck_services::EngineSettings;

#[derive(serde::Serialize, serde::Deserialize, Default, Debug)]
pub(crate) struct AppConfig {
    #[serde(default)]
    pub project: ProjectSettings,
    #[serde(default)]
    pub engine: EngineSettings,
}

pub(crate) fn config_path() -> PathBuf {
    dirs::config_dir()
        .unwrap_or_else(|| PathBuf::from("."))
        .join("clipdeck")
        .join("config.toml")
}

/// Load from `path` (or the default location). Missing or broken files give defaults.
pub(crate) fn load_config(path: Option<&Path>) -> AppConfig {
    let path = path.map(Path::to_path_buf).unwrap_or_else(config_path);
    let Ok(text) = std::fs::read_to_string(&path) else {
        return AppConfig::default();
    };
    match toml::from_str(&text) {
        Ok(config) => config,
        Err(e) => {
            tracing::warn!(path = %path.display(), error = %e, "Ignoring unreadable config");
            AppConfig::default()
        }
    }
}
