use std::path::PathBuf;

use serde::{Deserialize, Serialize};

use crate::spectra::transform::TransformMode;

/// Environment variable naming an optional JSON settings file.
pub const CONFIG_ENV: &str = "SPECTRA_EXPLORER_CONFIG";

/// Viewer settings. Every field has a default, so a partial file is valid.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct ViewerConfig {
    pub window_width: f32,
    pub window_height: f32,
    /// Spectroscopy marker radius on the image plot (points).
    pub marker_radius: f32,
    /// How far from a marker a click still selects it (screen pixels).
    pub pick_radius_px: f32,
    pub mean_line_width: f32,
    pub default_mode: TransformMode,
}

impl Default for ViewerConfig {
    fn default() -> Self {
        Self {
            window_width: 1600.0,
            window_height: 900.0,
            marker_radius: 3.0,
            pick_radius_px: 8.0,
            mean_line_width: 4.0,
            default_mode: TransformMode::Raw,
        }
    }
}

impl ViewerConfig {
    pub fn from_json(text: &str) -> serde_json::Result<Self> {
        serde_json::from_str(text)
    }

    /// Read the file named by [`CONFIG_ENV`], falling back to defaults.
    pub fn load() -> Self {
        let Some(path) = std::env::var_os(CONFIG_ENV).map(PathBuf::from) else {
            return Self::default();
        };
        let parsed = std::fs::read_to_string(&path)
            .map_err(|e| e.to_string())
            .and_then(|text| Self::from_json(&text).map_err(|e| e.to_string()));
        match parsed {
            Ok(config) => {
                log::info!("Loaded settings from {}", path.display());
                config
            }
            Err(e) => {
                log::warn!("Ignoring settings file {}: {e}", path.display());
                Self::default()
            }
        }
    }
}
