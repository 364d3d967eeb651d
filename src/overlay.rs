//! Native UI overlay and game-side collaborators
//!
//! The HMD never talks to widgets or player controllers directly. It derives
//! a `NativeUiState` from the settings and hands it to whatever overlay the
//! host installed.

use log::info;

use crate::settings::CardboardSettings;

/// What the native overlay should show
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct NativeUiState {
    pub visible: bool,
    pub stereo_enabled: bool,
    pub settings_button_visible: bool,
    pub back_button_visible: bool,
    pub toggle_stereo_button_visible: bool,
    /// Ask the user to scan the viewer QR code again
    pub rescan_prompt_visible: bool,
}

impl NativeUiState {
    pub fn from_settings(settings: &CardboardSettings, stereo_enabled: bool) -> Self {
        Self {
            visible: settings.show_native_ui,
            stereo_enabled,
            settings_button_visible: true,
            back_button_visible: settings.show_back_button,
            toggle_stereo_button_visible: settings.show_toggle_stereo_mode_button,
            rescan_prompt_visible: false,
        }
    }
}

/// Host overlay (gear, back arrow, stereo toggle, divider line)
pub trait NativeOverlay: Send {
    fn apply(&mut self, state: &NativeUiState);
}

/// Overlay for hosts without native widgets: logs and remembers the last state
#[derive(Debug, Default)]
pub struct LoggingOverlay {
    last: Option<NativeUiState>,
}

impl LoggingOverlay {
    pub fn last_state(&self) -> Option<NativeUiState> {
        self.last
    }
}

impl NativeOverlay for LoggingOverlay {
    fn apply(&mut self, state: &NativeUiState) {
        info!(
            "Native UI - Stereo={} Visible={} SettingsButton={} BackButton={} ToggleStereoButton={} RescanPrompt={}",
            state.stereo_enabled,
            state.visible,
            state.settings_button_visible,
            state.back_button_visible,
            state.toggle_stereo_button_visible,
            state.rescan_prompt_visible
        );
        self.last = Some(*state);
    }
}

/// Player view rotation in degrees
#[derive(Debug, Clone, Copy, Default, PartialEq)]
pub struct ControlRotation {
    pub pitch: f32,
    pub yaw: f32,
    pub roll: f32,
}

impl ControlRotation {
    /// Each angle wrapped into (-180, 180]
    pub fn normalized(self) -> Self {
        Self {
            pitch: normalize_axis(self.pitch),
            yaw: normalize_axis(self.yaw),
            roll: normalize_axis(self.roll),
        }
    }

    /// Drop pitch and roll, keeping the heading
    pub fn leveled(self) -> Self {
        let normalized = self.normalized();
        Self {
            pitch: 0.0,
            roll: 0.0,
            ..normalized
        }
    }
}

fn normalize_axis(angle: f32) -> f32 {
    let wrapped = angle.rem_euclid(360.0);
    if wrapped > 180.0 {
        wrapped - 360.0
    } else {
        wrapped
    }
}

/// The local player's view controller
pub trait ViewController: Send {
    fn control_rotation(&self) -> ControlRotation;
    fn set_control_rotation(&mut self, rotation: ControlRotation);
    /// On-screen touch controls, hidden while in stereo
    fn set_touch_interface_enabled(&mut self, enabled: bool);
    /// Platform back key
    fn input_back_key(&mut self, pressed: bool);
}

/// Viewer QR code scanner
pub trait QrScanner: Send {
    /// The calibration URL read from the code, `None` if the user cancelled
    fn scan_viewer_url(&mut self) -> Option<String>;
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_ui_state_follows_settings() {
        let mut settings = CardboardSettings::default();
        let state = NativeUiState::from_settings(&settings, true);
        assert!(state.visible);
        assert!(state.stereo_enabled);
        assert!(state.settings_button_visible);
        assert!(!state.back_button_visible);
        assert!(state.toggle_stereo_button_visible);
        assert!(!state.rescan_prompt_visible);

        settings.show_native_ui = false;
        settings.show_back_button = true;
        settings.show_toggle_stereo_mode_button = false;
        let state = NativeUiState::from_settings(&settings, false);
        assert!(!state.visible);
        assert!(state.settings_button_visible);
        assert!(state.back_button_visible);
        assert!(!state.toggle_stereo_button_visible);
    }

    #[test]
    fn test_logging_overlay_remembers() {
        let mut overlay = LoggingOverlay::default();
        assert!(overlay.last_state().is_none());
        let state = NativeUiState::from_settings(&CardboardSettings::default(), false);
        overlay.apply(&state);
        assert_eq!(overlay.last_state(), Some(state));
    }

    #[test]
    fn test_leveled_keeps_yaw() {
        let rotation = ControlRotation {
            pitch: 30.0,
            yaw: 370.0,
            roll: -15.0,
        };
        let leveled = rotation.leveled();
        assert_eq!(leveled.pitch, 0.0);
        assert_eq!(leveled.roll, 0.0);
        assert!((leveled.yaw - 10.0).abs() < 1e-4);

        assert!((normalize_axis(-190.0) - 170.0).abs() < 1e-4);
        assert_eq!(normalize_axis(180.0), 180.0);
    }
}
