//! Cardboard project settings
//!
//! Mirrors the plugin's project settings. Most values can also be changed at
//! run-time through `CardboardHmd`, which refreshes the native UI afterwards.

use std::fs;
use std::path::Path;

use log::info;
use serde::{Deserialize, Serialize};

use crate::error::Result;

/// Tunable parameters for the HMD, native overlay and distortion pass
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct CardboardSettings {
    /// Show the native overlay (settings gear, optional back / stereo toggle buttons)
    pub show_native_ui: bool,
    /// Show the back button in the native overlay
    pub show_back_button: bool,
    /// Show the stereo mode toggle button in the native overlay
    pub show_toggle_stereo_mode_button: bool,
    /// Open the QR scanner when stereo is first enabled and no viewer was ever saved
    pub always_show_qr_scanner_first_time: bool,
    /// URL-safe base64 device params to force at startup. Empty = scan-or-default flow.
    pub encoded_device_params: String,
    /// Enable the HMD vignette on the distortion mesh
    pub vignette_enabled: bool,
    /// Larger values reduce the vignette effect
    pub vignette_hardness: f32,
    /// Engine units per meter
    pub world_to_meters: f32,
    /// Renderer near clip distance (engine units)
    pub near_clip: f32,
    /// Pointer-driven preview multiplier, clamped to [0.1, 10.0] when used
    pub preview_sensitivity: f32,
    /// How far ahead native poses are predicted
    pub prediction_horizon_nanos: i64,
}

impl Default for CardboardSettings {
    fn default() -> Self {
        Self {
            show_native_ui: true,
            show_back_button: false,
            show_toggle_stereo_mode_button: true,
            always_show_qr_scanner_first_time: true,
            encoded_device_params: String::new(),
            vignette_enabled: true,
            vignette_hardness: 25.0,
            world_to_meters: 100.0,
            near_clip: 10.0,
            preview_sensitivity: 1.0,
            prediction_horizon_nanos: 50_000_000,
        }
    }
}

impl CardboardSettings {
    /// Load settings from a JSON file. A missing file yields the defaults.
    pub fn load(path: impl AsRef<Path>) -> Result<Self> {
        let path = path.as_ref();
        if !path.exists() {
            info!("No settings at {}, using defaults", path.display());
            return Ok(Self::default());
        }
        let text = fs::read_to_string(path)?;
        let settings = serde_json::from_str(&text)?;
        info!("Loaded Cardboard settings from {}", path.display());
        Ok(settings)
    }

    /// Write settings as pretty JSON
    pub fn save(&self, path: impl AsRef<Path>) -> Result<()> {
        let text = serde_json::to_string_pretty(self)?;
        fs::write(path, text)?;
        Ok(())
    }

    pub fn clamped_preview_sensitivity(&self) -> f32 {
        self.preview_sensitivity.clamp(0.1, 10.0)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::tempdir;

    #[test]
    fn test_defaults_match_project_settings() {
        let settings = CardboardSettings::default();
        assert!(settings.show_native_ui);
        assert!(!settings.show_back_button);
        assert!(settings.show_toggle_stereo_mode_button);
        assert!(settings.vignette_enabled);
        assert_eq!(settings.vignette_hardness, 25.0);
        assert!(settings.encoded_device_params.is_empty());
    }

    #[test]
    fn test_missing_file_gives_defaults() {
        let dir = tempdir().unwrap();
        let settings = CardboardSettings::load(dir.path().join("nope.json")).unwrap();
        assert_eq!(settings, CardboardSettings::default());
    }

    #[test]
    fn test_partial_file_fills_defaults() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("cardboard.json");
        fs::write(&path, r#"{ "vignette_hardness": 8.0, "show_back_button": true }"#).unwrap();

        let settings = CardboardSettings::load(&path).unwrap();
        assert_eq!(settings.vignette_hardness, 8.0);
        assert!(settings.show_back_button);
        assert!(settings.show_native_ui);
    }

    #[test]
    fn test_save_then_load() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("cardboard.json");
        let mut settings = CardboardSettings::default();
        settings.encoded_device_params = "CgZHb29nbGU".to_string();
        settings.save(&path).unwrap();

        assert_eq!(CardboardSettings::load(&path).unwrap(), settings);
    }

    #[test]
    fn test_malformed_file_is_settings_error() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("cardboard.json");
        fs::write(&path, "{ not json").unwrap();
        assert!(matches!(
            CardboardSettings::load(&path),
            Err(crate::error::CardboardError::Settings(_))
        ));
    }

    #[test]
    fn test_preview_sensitivity_clamped() {
        let mut settings = CardboardSettings::default();
        settings.preview_sensitivity = 50.0;
        assert_eq!(settings.clamped_preview_sensitivity(), 10.0);
        settings.preview_sensitivity = 0.0;
        assert_eq!(settings.clamped_preview_sensitivity(), 0.1);
    }
}
