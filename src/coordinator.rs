//! Per-frame stereo coordination
//!
//! Once per frame, before views are set up, the coordinator checks whether the
//! saved device params changed, rebuilds the lens calibration if so and
//! publishes the new pair of eyes to the render thread in a single swap.
//! Projection and eye queries always answer from the last published pair.

use std::sync::Arc;

use glam::{Mat4, Quat, Vec2, Vec3};
use log::{debug, info};

use crate::coords::sensor_matrix_to_engine;
use crate::device_params::{ChangeWatcher, DeviceParameterStore};
use crate::distortion::Vignette;
use crate::error::Result;
use crate::handoff::{snapshot_channel, SnapshotPublisher, SnapshotReader};
use crate::lens::{self, Eye, EyeCalibration, LensCalibration};
use crate::platform::ScreenSize;
use crate::settings::CardboardSettings;

/// Used for eye placement before any calibration exists
const DEFAULT_IPD_METERS: f32 = 0.064;

/// Immutable calibration state shared with the render thread
#[derive(Debug, Clone, PartialEq)]
pub struct RenderSnapshot {
    /// Store generation the calibration was built from
    pub generation: u64,
    pub screen: ScreenSize,
    pub eyes: [EyeCalibration; 2],
}

impl RenderSnapshot {
    pub fn eye(&self, eye: Eye) -> &EyeCalibration {
        &self.eyes[eye.index()]
    }
}

/// Pixel rectangle of one eye's view
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ViewRect {
    pub x: i32,
    pub y: i32,
    pub width: u32,
    pub height: u32,
}

/// Side-by-side split of the full view: half width each, right eye shifted.
pub fn adjust_view_rect(eye: Eye, rect: ViewRect) -> ViewRect {
    let width = rect.width / 2;
    let x = match eye {
        Eye::Left => rect.x,
        Eye::Right => rect.x + width as i32,
    };
    ViewRect { x, width, ..rect }
}

/// (scale, offset) mapping an eye's UV into the combined render target
pub fn eye_uv_params(eye: Eye) -> (Vec2, Vec2) {
    let scale = Vec2::new(0.5, 1.0);
    match eye {
        Eye::Left => (scale, Vec2::ZERO),
        Eye::Right => (scale, Vec2::new(0.5, 0.0)),
    }
}

pub struct StereoRenderCoordinator {
    store: Arc<DeviceParameterStore>,
    watcher: ChangeWatcher,
    publisher: SnapshotPublisher<RenderSnapshot>,
    current: Option<Arc<RenderSnapshot>>,
    eye_matrices: [Mat4; 2],
    screen: ScreenSize,
    vignette: Vignette,
    world_to_meters: f32,
    near_clip: f32,
    rebuild_requested: bool,
}

impl StereoRenderCoordinator {
    /// Coordinator plus the render thread's end of the hand-off.
    ///
    /// Nothing is built until the first [`begin_frame`](Self::begin_frame).
    pub fn new(
        store: Arc<DeviceParameterStore>,
        screen: ScreenSize,
        settings: &CardboardSettings,
    ) -> (Self, SnapshotReader<RenderSnapshot>) {
        let (publisher, reader) = snapshot_channel();
        let watcher = store.watcher();
        let coordinator = Self {
            store,
            watcher,
            publisher,
            current: None,
            eye_matrices: [Mat4::IDENTITY; 2],
            screen,
            vignette: Vignette {
                enabled: settings.vignette_enabled,
                hardness: settings.vignette_hardness,
            },
            world_to_meters: settings.world_to_meters,
            near_clip: settings.near_clip,
            rebuild_requested: true,
        };
        (coordinator, reader)
    }

    /// Run the per-frame protocol. Returns whether a new calibration was published.
    ///
    /// Only `FatalCalibration` (or a zero-sized screen) fails here; the last
    /// published calibration stays in place when it does.
    pub fn begin_frame(&mut self) -> Result<bool> {
        let changed = self.watcher.has_changed_since_last_check(&self.store);
        if !changed && !self.rebuild_requested {
            return Ok(false);
        }
        if let Err(e) = self.rebuild() {
            // The store change is already consumed; retry it next frame
            self.rebuild_requested = true;
            return Err(e);
        }
        Ok(true)
    }

    /// Rebuild on the next frame regardless of the store
    pub fn invalidate(&mut self) {
        self.rebuild_requested = true;
    }

    pub fn set_screen_size(&mut self, screen: ScreenSize) {
        if screen != self.screen {
            info!("Screen size changed to {}x{}", screen.width, screen.height);
            self.screen = screen;
            self.invalidate();
        }
    }

    pub fn screen_size(&self) -> ScreenSize {
        self.screen
    }

    pub fn set_vignette(&mut self, vignette: Vignette) {
        if vignette != self.vignette {
            self.vignette = vignette;
            self.invalidate();
        }
    }

    pub fn set_world_to_meters(&mut self, world_to_meters: f32) {
        self.world_to_meters = world_to_meters;
        self.eye_matrices = self.convert_eye_matrices();
    }

    pub fn world_to_meters(&self) -> f32 {
        self.world_to_meters
    }

    fn rebuild(&mut self) -> Result<()> {
        let params = self.store.effective_parameters();
        let generation = self.watcher.last_seen();
        let eyes = LensCalibration::build_with_fallback(params.bytes(), self.screen, self.vignette)?;

        let version = self.publisher.publish(RenderSnapshot {
            generation,
            screen: self.screen,
            eyes,
        });
        self.current = self.publisher.current();
        self.eye_matrices = self.convert_eye_matrices();
        self.rebuild_requested = false;

        info!(
            "Published calibration v{} ({:?} params, generation {})",
            version,
            params.source(),
            generation
        );
        Ok(())
    }

    fn convert_eye_matrices(&self) -> [Mat4; 2] {
        match &self.current {
            Some(snapshot) => Eye::BOTH.map(|eye| {
                sensor_matrix_to_engine(&snapshot.eye(eye).eye_from_head, self.world_to_meters)
            }),
            None => [Mat4::IDENTITY; 2],
        }
    }

    pub fn has_calibration(&self) -> bool {
        self.current.is_some()
    }

    /// Latest published snapshot
    pub fn snapshot(&self) -> Option<Arc<RenderSnapshot>> {
        self.current.clone()
    }

    pub fn eye_calibration(&self, eye: Eye) -> Option<&EyeCalibration> {
        self.current.as_deref().map(|snapshot| snapshot.eye(eye))
    }

    /// Off-axis projection for the eye, if calibrated
    pub fn projection_matrix(&self, eye: Eye) -> Option<Mat4> {
        let calibration = self.eye_calibration(eye)?;
        let projection = lens::projection_matrix(&calibration.fov, self.near_clip);
        debug!("{:?} eye projection {:?}", eye, projection);
        Some(projection)
    }

    /// Eye-from-head in engine space and units
    pub fn eye_matrix(&self, eye: Eye) -> Option<Mat4> {
        self.current.as_ref().map(|_| self.eye_matrices[eye.index()])
    }

    /// Eye position and orientation relative to the head, engine space
    pub fn relative_eye_pose(&self, eye: Eye) -> (Quat, Vec3) {
        match self.eye_matrix(eye) {
            Some(matrix) => {
                let (_, rotation, translation) = matrix.to_scale_rotation_translation();
                (rotation, -translation)
            }
            None => {
                let half = 0.5 * DEFAULT_IPD_METERS * self.world_to_meters;
                let side = match eye {
                    Eye::Left => -half,
                    Eye::Right => half,
                };
                (Quat::IDENTITY, Vec3::new(0.0, side, 0.0))
            }
        }
    }

    /// Twice the distance from the head to the left eye, engine units
    pub fn interpupillary_distance(&self) -> f32 {
        self.relative_eye_pose(Eye::Left).1.length() * 2.0
    }

    /// Camera rotation and location for one eye given the head camera
    pub fn stereo_view_offset(&self, eye: Eye, view_rotation: Quat, view_location: Vec3) -> (Quat, Vec3) {
        let (eye_rotation, eye_position) = self.relative_eye_pose(eye);
        (
            view_rotation * eye_rotation,
            view_location + view_rotation * eye_position,
        )
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::viewer::ViewerProfile;

    const EPS: f32 = 1e-4;

    fn coordinator() -> (StereoRenderCoordinator, SnapshotReader<RenderSnapshot>, Arc<DeviceParameterStore>) {
        let store = Arc::new(DeviceParameterStore::in_memory());
        let (coordinator, reader) = StereoRenderCoordinator::new(
            store.clone(),
            ScreenSize::new(1920, 1080, 400.0),
            &CardboardSettings::default(),
        );
        (coordinator, reader, store)
    }

    #[test]
    fn test_first_frame_publishes_default() {
        let (mut coordinator, mut reader, _) = coordinator();
        assert!(!coordinator.has_calibration());
        assert!(coordinator.projection_matrix(Eye::Left).is_none());

        assert!(coordinator.begin_frame().unwrap());
        assert!(coordinator.has_calibration());
        let snapshot = reader.take_update().unwrap();
        assert_eq!(snapshot.generation, 0);
        assert!(!snapshot.eye(Eye::Right).mesh.is_empty());

        assert!(!coordinator.begin_frame().unwrap());
        assert!(reader.take_update().is_none());
    }

    #[test]
    fn test_rebuild_once_per_change() {
        let (mut coordinator, mut reader, store) = coordinator();
        coordinator.begin_frame().unwrap();
        reader.take_update();

        let mut profile = ViewerProfile::cardboard_v1();
        profile.inter_lens_distance = 0.064;
        store.save_parameters(&profile.to_bytes()).unwrap();

        assert!(coordinator.begin_frame().unwrap());
        let snapshot = reader.take_update().unwrap();
        assert_eq!(snapshot.generation, 1);
        assert!(!coordinator.begin_frame().unwrap());

        // Identical bytes do not trigger another rebuild
        store.save_parameters(&profile.to_bytes()).unwrap();
        assert!(!coordinator.begin_frame().unwrap());
    }

    #[test]
    fn test_failed_rebuild_retries_store_change() {
        let (mut coordinator, mut reader, store) = coordinator();
        coordinator.begin_frame().unwrap();
        reader.take_update();

        // Unbuildable screen without going through invalidate
        coordinator.screen = ScreenSize::new(0, 0, 400.0);
        let mut profile = ViewerProfile::cardboard_v1();
        profile.inter_lens_distance = 0.064;
        store.save_parameters(&profile.to_bytes()).unwrap();
        assert!(coordinator.begin_frame().is_err());
        assert!(reader.take_update().is_none());

        coordinator.screen = ScreenSize::new(1920, 1080, 400.0);
        assert!(coordinator.begin_frame().unwrap());
        let snapshot = reader.take_update().unwrap();
        assert_eq!(snapshot.generation, 1);
        assert!((coordinator.interpupillary_distance() - 6.4).abs() < EPS);
    }

    #[test]
    fn test_screen_change_rebuilds() {
        let (mut coordinator, _reader, _) = coordinator();
        coordinator.begin_frame().unwrap();
        coordinator.set_screen_size(ScreenSize::new(1920, 1080, 400.0));
        assert!(!coordinator.begin_frame().unwrap());
        coordinator.set_screen_size(ScreenSize::new(2560, 1440, 560.0));
        assert!(coordinator.begin_frame().unwrap());
        assert_eq!(coordinator.snapshot().unwrap().screen.width, 2560);
    }

    #[test]
    fn test_eye_poses_from_calibration() {
        let (mut coordinator, _reader, _) = coordinator();
        // Uncalibrated: 64mm default
        assert!((coordinator.interpupillary_distance() - 6.4).abs() < EPS);

        coordinator.begin_frame().unwrap();
        // Cardboard v1 lenses are 60mm apart, 100 units per meter
        assert!((coordinator.interpupillary_distance() - 6.0).abs() < EPS);

        let (rotation, left) = coordinator.relative_eye_pose(Eye::Left);
        assert!((left - Vec3::new(0.0, -3.0, 0.0)).length() < EPS);
        assert!(rotation.dot(Quat::IDENTITY).abs() > 1.0 - EPS);
        let (_, right) = coordinator.relative_eye_pose(Eye::Right);
        assert!((right - Vec3::new(0.0, 3.0, 0.0)).length() < EPS);

        coordinator.set_world_to_meters(1.0);
        assert!((coordinator.interpupillary_distance() - 0.06).abs() < 1e-6);
    }

    #[test]
    fn test_stereo_view_offset_rotates_eye() {
        let (mut coordinator, _reader, _) = coordinator();
        coordinator.begin_frame().unwrap();
        let yaw = Quat::from_rotation_z(std::f32::consts::FRAC_PI_2);
        let (_, location) = coordinator.stereo_view_offset(Eye::Left, yaw, Vec3::new(100.0, 0.0, 0.0));
        // Left is -Y; after a quarter turn it points along +X
        assert!((location - Vec3::new(103.0, 0.0, 0.0)).length() < EPS);
    }

    #[test]
    fn test_view_split() {
        let full = ViewRect {
            x: 0,
            y: 0,
            width: 1920,
            height: 1080,
        };
        assert_eq!(
            adjust_view_rect(Eye::Left, full),
            ViewRect {
                x: 0,
                y: 0,
                width: 960,
                height: 1080
            }
        );
        assert_eq!(adjust_view_rect(Eye::Right, full).x, 960);

        assert_eq!(eye_uv_params(Eye::Left), (Vec2::new(0.5, 1.0), Vec2::ZERO));
        assert_eq!(eye_uv_params(Eye::Right).1, Vec2::new(0.5, 0.0));
    }

    #[test]
    fn test_projection_uses_near_clip() {
        let (mut coordinator, _reader, _) = coordinator();
        coordinator.begin_frame().unwrap();
        let projection = coordinator.projection_matrix(Eye::Right).unwrap();
        assert_eq!(projection.w_axis.z, CardboardSettings::default().near_clip);
    }
}
