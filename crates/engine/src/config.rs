use std::fs;
use std::path::{Path, PathBuf};
use std::time::Duration;

use serde::{Deserialize, Serialize};

use crate::error::{EngineError, Result};
use crate::sync::{DEFAULT_FADE_DURATION, DEFAULT_ZOOM_FACTOR};

/// Engine tuning and connection settings. Every field has a default, so a
/// config file only needs the values it changes.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct EngineConfig {
    pub api_base_url: String,
    /// Playback tick cadence; 50 ms gives 20 updates per second.
    pub tick_interval_ms: u64,
    pub export_poll_interval_ms: u64,
    pub fade_duration_secs: f64,
    pub zoom_factor: f64,
    pub request_timeout_secs: u64,
    /// Overrides the platform data directory location of the session key.
    pub session_file: Option<PathBuf>,
}

impl Default for EngineConfig {
    fn default() -> Self {
        Self {
            api_base_url: "http://localhost:8001".to_owned(),
            tick_interval_ms: 50,
            export_poll_interval_ms: 1_000,
            fade_duration_secs: DEFAULT_FADE_DURATION,
            zoom_factor: DEFAULT_ZOOM_FACTOR,
            request_timeout_secs: 30,
            session_file: None,
        }
    }
}

impl EngineConfig {
    /// Reads a JSON config file.
    pub fn from_json_file(path: &Path) -> Result<Self> {
        let bytes = fs::read(path).map_err(|source| EngineError::Io {
            context: "failed to read config file",
            path: path.to_path_buf(),
            source,
        })?;
        serde_json::from_slice(&bytes).map_err(|source| EngineError::Json {
            path: path.to_path_buf(),
            source,
        })
    }

    pub fn tick_interval(&self) -> Duration {
        Duration::from_millis(self.tick_interval_ms.max(1))
    }

    pub fn export_poll_interval(&self) -> Duration {
        Duration::from_millis(self.export_poll_interval_ms.max(1))
    }

    pub fn request_timeout(&self) -> Duration {
        Duration::from_secs(self.request_timeout_secs)
    }
}

#[cfg(test)]
mod tests {
    use std::time::Duration;

    use super::EngineConfig;

    #[test]
    fn partial_json_keeps_defaults_for_missing_fields() {
        let config: EngineConfig =
            serde_json::from_str(r#"{"api_base_url": "http://render.local", "tick_interval_ms": 16}"#)
                .expect("decode config");

        assert_eq!(config.api_base_url, "http://render.local");
        assert_eq!(config.tick_interval(), Duration::from_millis(16));
        assert_eq!(config.export_poll_interval(), Duration::from_secs(1));
        assert_eq!(config.fade_duration_secs, 1.5);
        assert_eq!(config.zoom_factor, 0.08);
    }

    #[test]
    fn zero_intervals_are_raised_to_one_millisecond() {
        let config = EngineConfig {
            tick_interval_ms: 0,
            export_poll_interval_ms: 0,
            ..EngineConfig::default()
        };
        assert_eq!(config.tick_interval(), Duration::from_millis(1));
        assert_eq!(config.export_poll_interval(), Duration::from_millis(1));
    }
}
