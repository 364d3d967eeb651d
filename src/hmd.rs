//! Cardboard HMD
//!
//! The context object tying everything together. It owns the device-params
//! store handle, the head tracker and the stereo coordinator, and is driven
//! from the game thread: lifecycle events are queued by the platform and
//! handled in [`CardboardHmd::drain_events`].

use std::sync::Arc;
use std::thread::{self, ThreadId};

use crossbeam_channel::Receiver;
use glam::{Mat4, Quat, Vec3};
use log::{error, info, warn};

use crate::coordinator::{RenderSnapshot, StereoRenderCoordinator};
use crate::device_params::{encode_device_params, DeviceParameterStore};
use crate::error::{CardboardError, Result};
use crate::events::{EventQueue, EventSender, HmdNotification, LifecycleEvent, NotificationHub};
use crate::handoff::SnapshotReader;
use crate::lens::Eye;
use crate::overlay::{LoggingOverlay, NativeOverlay, NativeUiState, QrScanner, ViewController};
use crate::platform::Platform;
use crate::settings::CardboardSettings;
use crate::tracker::{HeadPose, HeadPoseTracker};
use crate::viewer::cardboard_v1_device_params;

/// Consecutive failed viewer scans before the overlay asks for a rescan
pub const RESCAN_PROMPT_AFTER_FAILURES: u32 = 3;

/// Host-side pieces the HMD drives but does not own the logic of
pub struct HmdCollaborators {
    pub overlay: Box<dyn NativeOverlay>,
    pub view_controller: Option<Box<dyn ViewController>>,
    pub qr_scanner: Option<Box<dyn QrScanner>>,
}

impl Default for HmdCollaborators {
    fn default() -> Self {
        Self {
            overlay: Box::new(LoggingOverlay::default()),
            view_controller: None,
            qr_scanner: None,
        }
    }
}

pub struct CardboardHmd {
    settings: CardboardSettings,
    platform: Box<dyn Platform>,
    store: Arc<DeviceParameterStore>,
    tracker: HeadPoseTracker,
    coordinator: StereoRenderCoordinator,
    overlay: Box<dyn NativeOverlay>,
    view_controller: Option<Box<dyn ViewController>>,
    qr_scanner: Option<Box<dyn QrScanner>>,
    events: EventQueue,
    notifications: NotificationHub,
    stereo_enabled: bool,
    scan_failures: u32,
    rescan_prompt: bool,
    main_thread: ThreadId,
}

impl CardboardHmd {
    /// Bring up the HMD on the calling (game) thread.
    ///
    /// Returns the render thread's end of the calibration hand-off. Fails only
    /// when no calibration at all can be built.
    pub fn new(
        settings: CardboardSettings,
        platform: Box<dyn Platform>,
        store: Arc<DeviceParameterStore>,
        collaborators: HmdCollaborators,
    ) -> Result<(Self, SnapshotReader<RenderSnapshot>)> {
        info!("Initializing Cardboard HMD");
        apply_configured_device_params(&settings, &store);

        let mut tracker = HeadPoseTracker::from_platform(platform.as_ref(), &settings);
        tracker.start()?;

        let (coordinator, reader) = StereoRenderCoordinator::new(store.clone(), platform.screen_size(), &settings);

        let mut hmd = Self {
            settings,
            platform,
            store,
            tracker,
            coordinator,
            overlay: collaborators.overlay,
            view_controller: collaborators.view_controller,
            qr_scanner: collaborators.qr_scanner,
            events: EventQueue::new(),
            notifications: NotificationHub::new(),
            stereo_enabled: false,
            scan_failures: 0,
            rescan_prompt: false,
            main_thread: thread::current().id(),
        };

        hmd.coordinator.begin_frame()?;
        info!("IPD = {}", hmd.coordinator.interpupillary_distance());
        // Non-stereo start still needs the overlay set up
        hmd.refresh_native_ui();

        Ok((hmd, reader))
    }

    /// Handle for platform callbacks to queue lifecycle events
    pub fn event_sender(&self) -> EventSender {
        self.events.sender()
    }

    pub fn subscribe(&mut self) -> Receiver<HmdNotification> {
        self.notifications.subscribe()
    }

    pub fn settings(&self) -> &CardboardSettings {
        &self.settings
    }

    pub fn store(&self) -> &Arc<DeviceParameterStore> {
        &self.store
    }

    pub fn tracker(&self) -> &HeadPoseTracker {
        &self.tracker
    }

    pub fn coordinator(&self) -> &StereoRenderCoordinator {
        &self.coordinator
    }

    /// Handle every queued lifecycle event, oldest first. Returns how many ran.
    ///
    /// A failing event is logged and does not stop the ones after it.
    pub fn drain_events(&mut self) -> Result<usize> {
        self.ensure_main_thread("drain_events")?;
        let events = self.events.drain();
        for event in &events {
            if let Err(e) = self.handle_event(*event) {
                warn!("Lifecycle event {:?} failed: {}", event, e);
            }
        }
        Ok(events.len())
    }

    fn handle_event(&mut self, event: LifecycleEvent) -> Result<()> {
        info!("Lifecycle event {:?}", event);
        match event {
            LifecycleEvent::ApplicationCreated => {
                self.tracker.start()?;
                self.refresh_native_ui();
            }
            LifecycleEvent::ApplicationPause => self.tracker.pause()?,
            LifecycleEvent::ApplicationResume => self.tracker.resume()?,
            LifecycleEvent::BackButtonPressed => self.handle_back_event(),
            LifecycleEvent::SettingsMenuOpened => {
                self.notifications.broadcast(HmdNotification::SettingsMenuOpened);
            }
            LifecycleEvent::ToggleStereoModeButtonPressed => {
                self.toggle_stereo_rendering()?;
            }
            LifecycleEvent::SwitchViewerButtonPressed => self.scan_for_qr_viewer_profile(),
            LifecycleEvent::DisplayOrientationChanged => {
                let screen = self.platform.screen_size();
                self.coordinator.set_screen_size(screen);
            }
        }
        Ok(())
    }

    /// Per-frame update; rebuilds and publishes the calibration when the
    /// device params changed.
    pub fn begin_frame(&mut self) -> Result<bool> {
        self.ensure_main_thread("begin_frame")?;
        self.coordinator.begin_frame()
    }

    // --- Stereo ---

    pub fn is_stereo_enabled(&self) -> bool {
        self.stereo_enabled
    }

    /// Switch stereo rendering. Game thread only; enabling needs a calibration.
    pub fn enable_stereo(&mut self, stereo: bool) -> Result<bool> {
        self.ensure_main_thread("enable_stereo")?;
        if stereo && !self.coordinator.has_calibration() {
            error!("Cannot enable stereo without a lens calibration");
            return Err(CardboardError::LifecycleMisuse(
                "stereo enabled before a calibration was published".to_string(),
            ));
        }

        self.stereo_enabled = stereo;
        self.refresh_native_ui();
        if let Some(controller) = self.view_controller.as_mut() {
            controller.set_touch_interface_enabled(!stereo);
        }

        if stereo {
            self.handle_qr_scanning_automatically();
        } else {
            self.reset_control_rotation();
        }
        Ok(self.stereo_enabled)
    }

    /// Flip stereo, notifying listeners if the state actually changed.
    pub fn toggle_stereo_rendering(&mut self) -> Result<bool> {
        let was_enabled = self.stereo_enabled;
        let enabled = self.enable_stereo(!was_enabled)?;
        if enabled != was_enabled {
            self.notifications.broadcast(HmdNotification::StereoModeChanged(enabled));
        }
        Ok(enabled)
    }

    fn reset_control_rotation(&mut self) {
        if let Some(controller) = self.view_controller.as_mut() {
            let leveled = controller.control_rotation().leveled();
            controller.set_control_rotation(leveled);
        }
    }

    fn handle_back_event(&mut self) {
        match self.view_controller.as_mut() {
            Some(controller) => {
                controller.input_back_key(true);
                controller.input_back_key(false);
            }
            None => info!("Back pressed with no view controller"),
        }
    }

    // --- Viewer profile ---

    /// First stereo session with nothing saved: store the v1 profile so this
    /// only happens once, then offer the scanner.
    fn handle_qr_scanning_automatically(&mut self) {
        if !self.stereo_enabled
            || !self.settings.always_show_qr_scanner_first_time
            || !self.settings.encoded_device_params.is_empty()
        {
            return;
        }
        if !self.store.saved_parameters().is_empty() {
            return;
        }
        if let Err(e) = self.store.save_encoded("") {
            warn!("Failed to save default device params: {}", e);
        }
        self.scan_for_qr_viewer_profile();
    }

    pub fn scan_for_qr_viewer_profile(&mut self) {
        info!("Scanning for viewer profile");
        let url = match self.qr_scanner.as_mut() {
            Some(scanner) => scanner.scan_viewer_url(),
            None => {
                warn!("No QR scanner on this platform");
                return;
            }
        };
        match url {
            Some(url) => {
                // Failures are logged and counted by the save
                let _ = self.save_device_params_from_url(&url);
            }
            None => info!("Viewer scan cancelled"),
        }
    }

    /// Save URL-safe base64 params; empty selects Cardboard v1.
    pub fn save_device_params(&self, encoded: &str) -> Result<bool> {
        self.store.save_encoded(encoded)
    }

    /// Save params from a scanned calibration URL.
    ///
    /// A malformed URL keeps the previous params. After
    /// [`RESCAN_PROMPT_AFTER_FAILURES`] failures in a row the overlay shows a
    /// rescan prompt and `HmdNotification::RescanRequested` goes out once; the
    /// next successful save clears it.
    pub fn save_device_params_from_url(&mut self, uri: &str) -> Result<bool> {
        match self.store.save_parameters_from_url(uri) {
            Ok(changed) => {
                self.scan_failures = 0;
                if self.rescan_prompt {
                    self.rescan_prompt = false;
                    self.refresh_native_ui();
                }
                Ok(changed)
            }
            Err(e) => {
                self.scan_failures += 1;
                warn!("Viewer scan failed ({} in a row)", self.scan_failures);
                if self.scan_failures == RESCAN_PROMPT_AFTER_FAILURES {
                    info!("Prompting for a viewer rescan");
                    self.rescan_prompt = true;
                    self.refresh_native_ui();
                    self.notifications.broadcast(HmdNotification::RescanRequested);
                }
                Err(e)
            }
        }
    }

    pub fn saved_device_params(&self) -> String {
        self.store.saved_device_params_encoded()
    }

    pub fn cardboard_v1_device_params(&self) -> String {
        encode_device_params(&cardboard_v1_device_params())
    }

    // --- Native UI ---

    pub fn native_ui_state(&self) -> NativeUiState {
        NativeUiState {
            rescan_prompt_visible: self.rescan_prompt,
            ..NativeUiState::from_settings(&self.settings, self.stereo_enabled)
        }
    }

    fn refresh_native_ui(&mut self) {
        let state = self.native_ui_state();
        self.overlay.apply(&state);
    }

    pub fn set_native_ui_visibility(&mut self, visible: bool) {
        self.settings.show_native_ui = visible;
        self.refresh_native_ui();
    }

    pub fn set_back_button_visibility(&mut self, visible: bool) {
        self.settings.show_back_button = visible;
        self.refresh_native_ui();
    }

    pub fn set_toggle_stereo_mode_button_visibility(&mut self, visible: bool) {
        self.settings.show_toggle_stereo_mode_button = visible;
        self.refresh_native_ui();
    }

    // --- Tracking ---

    pub fn current_pose(&mut self) -> Result<HeadPose> {
        let now = self.platform.boot_time_nanos();
        self.tracker.current_pose(now)
    }

    pub fn add_pointer_delta(&mut self, dx: f32, dy: f32, dt: f32) {
        self.tracker.add_pointer_delta(dx, dy, dt);
    }

    pub fn reset_orientation_and_position(&mut self, yaw: f32) -> Result<()> {
        self.tracker.reset_orientation_and_position(yaw)
    }

    pub fn set_base_orientation(&mut self, orientation: Quat) {
        self.tracker.set_base_orientation(orientation);
    }

    pub fn base_orientation(&self) -> Quat {
        self.tracker.base_orientation()
    }

    pub fn set_base_rotation_yaw(&mut self, yaw_degrees: f32) {
        self.tracker.set_base_rotation_yaw(yaw_degrees);
    }

    pub fn set_world_to_meters(&mut self, world_to_meters: f32) {
        self.settings.world_to_meters = world_to_meters;
        self.tracker.set_world_to_meters(world_to_meters);
        self.coordinator.set_world_to_meters(world_to_meters);
    }

    // --- Rendering queries ---

    pub fn projection_matrix(&self, eye: Eye) -> Option<Mat4> {
        self.coordinator.projection_matrix(eye)
    }

    pub fn relative_eye_pose(&self, eye: Eye) -> (Quat, Vec3) {
        self.coordinator.relative_eye_pose(eye)
    }

    pub fn interpupillary_distance(&self) -> f32 {
        self.coordinator.interpupillary_distance()
    }

    pub fn stereo_view_offset(&self, eye: Eye, view_rotation: Quat, view_location: Vec3) -> (Quat, Vec3) {
        self.coordinator.stereo_view_offset(eye, view_rotation, view_location)
    }

    /// Tear down tracking. Further pose queries fail.
    pub fn shutdown(&mut self) {
        self.tracker.destroy();
    }

    fn ensure_main_thread(&self, what: &str) -> Result<()> {
        if thread::current().id() == self.main_thread {
            Ok(())
        } else {
            error!("{} called off the game thread", what);
            Err(CardboardError::LifecycleMisuse(format!("{what} called off the game thread")))
        }
    }
}

/// Startup overwrite: force the configured params if the saved ones differ.
fn apply_configured_device_params(settings: &CardboardSettings, store: &DeviceParameterStore) {
    let configured = &settings.encoded_device_params;
    if configured.is_empty() {
        return;
    }
    let saved = store.saved_device_params_encoded();
    if &saved == configured {
        return;
    }
    info!("Overwrite device params: {} --> {}", saved, configured);
    if let Err(e) = store.save_encoded(configured) {
        warn!("Configured device params rejected: {}", e);
    }
}
