//! Runtime settings: an optional JSON file plus environment overrides.

use std::path::{Path, PathBuf};
use std::time::Duration;

use serde::{Deserialize, Serialize};

use crate::editor::EditorSettings;
use crate::error::ConfigError;

pub const DEFAULT_ENDPOINT: &str = "https://generativelanguage.googleapis.com/v1beta";
pub const DEFAULT_MODEL: &str = "gemini-2.5-flash-image-preview";

#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct Config {
    pub api_key: Option<String>,
    pub endpoint: String,
    pub model: String,
    /// Uploads larger than this on either side are downscaled.
    pub max_dimension: u32,
    pub request_timeout_secs: u64,
    pub stroke_width: f32,
    pub min_box_size: f32,
    pub history_limit: usize,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            api_key: None,
            endpoint: DEFAULT_ENDPOINT.to_owned(),
            model: DEFAULT_MODEL.to_owned(),
            max_dimension: 2048,
            request_timeout_secs: 120,
            stroke_width: 4.0,
            min_box_size: 8.0,
            history_limit: 100,
        }
    }
}

impl Config {
    /// `<config_dir>/redline-edit/config.json`
    pub fn default_path() -> Option<PathBuf> {
        dirs::config_dir().map(|dir| dir.join("redline-edit").join("config.json"))
    }

    /// Read `path` if it exists; a missing file yields the defaults.
    pub fn from_file(path: &Path) -> Result<Self, ConfigError> {
        if !path.exists() {
            return Ok(Self::default());
        }
        let data = std::fs::read_to_string(path).map_err(|source| ConfigError::Read {
            path: path.display().to_string(),
            source,
        })?;
        serde_json::from_str(&data).map_err(|source| ConfigError::Parse {
            path: path.display().to_string(),
            source,
        })
    }

    /// Load from the default location and apply the process environment.
    /// A broken file is logged and replaced by defaults.
    pub fn load() -> Self {
        let mut config = match Self::default_path() {
            Some(path) => match Self::from_file(&path) {
                Ok(config) => {
                    log::debug!("config loaded from {}", path.display());
                    config
                }
                Err(err) => {
                    log::warn!("{err}; using defaults");
                    Self::default()
                }
            },
            None => Self::default(),
        };
        config.apply_env(|key| std::env::var(key).ok());
        config
    }

    pub fn apply_env(&mut self, var: impl Fn(&str) -> Option<String>) {
        let non_empty = |key: &str| var(key).filter(|v| !v.trim().is_empty());
        if let Some(key) = non_empty("GEMINI_API_KEY").or_else(|| non_empty("GOOGLE_API_KEY")) {
            self.api_key = Some(key);
        }
        if let Some(endpoint) = non_empty("REDLINE_ENDPOINT") {
            self.endpoint = endpoint;
        }
        if let Some(model) = non_empty("REDLINE_MODEL") {
            self.model = model;
        }
    }

    pub fn request_timeout(&self) -> Duration {
        Duration::from_secs(self.request_timeout_secs)
    }

    pub fn editor_settings(&self) -> EditorSettings {
        EditorSettings {
            min_box_size: self.min_box_size,
            history_limit: self.history_limit,
        }
    }
}
