//! Head pose tracking
//!
//! Wraps the platform's native head tracker (if any) and hands out poses in
//! engine space. Without a native tracker the head is driven by pointer
//! deltas, which is what desktop previews use.

use glam::{Quat, Vec3};
use log::{error, info, warn};

use crate::coords::{sensor_quat_to_engine, sensor_vector_to_engine};
use crate::error::{CardboardError, Result};
use crate::platform::Platform;
use crate::settings::CardboardSettings;

/// Keeps simulated pitch off the poles
pub const PITCH_EPSILON_DEGREES: f32 = 1e-4;

/// Pose as reported by a native tracker: sensor space, meters
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct SensorPose {
    pub position: Vec3,
    pub orientation: Quat,
}

impl Default for SensorPose {
    fn default() -> Self {
        Self {
            position: Vec3::ZERO,
            orientation: Quat::IDENTITY,
        }
    }
}

/// Native head tracker (sensor fusion lives on the platform side)
pub trait NativeHeadTracker: Send {
    /// Pose predicted for `timestamp_nanos` on the boot clock
    fn pose(&mut self, timestamp_nanos: i64) -> SensorPose;
    fn pause(&mut self);
    fn resume(&mut self);
    fn recenter(&mut self);
}

/// Pose in engine space and units
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct HeadPose {
    pub position: Vec3,
    pub orientation: Quat,
}

impl Default for HeadPose {
    fn default() -> Self {
        Self {
            position: Vec3::ZERO,
            orientation: Quat::IDENTITY,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TrackerState {
    Uninitialized,
    Active,
    Paused,
    Destroyed,
}

/// Integrate a constant angular velocity (rad/s, body frame) over `dt` seconds.
pub fn predict_orientation(orientation: Quat, angular_velocity: Vec3, dt: f32) -> Quat {
    let rate = angular_velocity.length();
    let angle = rate * dt;
    if rate <= f32::EPSILON || angle.abs() <= f32::EPSILON {
        return orientation;
    }
    (orientation * Quat::from_axis_angle(angular_velocity / rate, angle)).normalize()
}

/// Pointer-driven yaw/pitch accumulator, degrees
#[derive(Debug, Clone, Copy, Default, PartialEq)]
struct PointerSimulation {
    yaw: f32,
    pitch: f32,
}

impl PointerSimulation {
    fn apply(&mut self, dx: f32, dy: f32, dt: f32, sensitivity: f32) {
        self.yaw += (dx * dt * 4.0).to_degrees() * sensitivity;
        self.pitch += (dy * dt * 4.0).to_degrees() * sensitivity;
        let limit = 90.0 - PITCH_EPSILON_DEGREES;
        self.pitch = self.pitch.clamp(-limit, limit);
    }

    fn orientation(&self) -> Quat {
        // Positive pitch raises +X toward +Z
        Quat::from_rotation_z(self.yaw.to_radians()) * Quat::from_rotation_y(-self.pitch.to_radians())
    }
}

pub struct HeadPoseTracker {
    state: TrackerState,
    native: Option<Box<dyn NativeHeadTracker>>,
    simulation: PointerSimulation,
    base_orientation: Quat,
    last_raw_pose: HeadPose,
    world_to_meters: f32,
    prediction_horizon_nanos: i64,
    preview_sensitivity: f32,
}

impl HeadPoseTracker {
    pub fn new(native: Option<Box<dyn NativeHeadTracker>>, settings: &CardboardSettings) -> Self {
        Self {
            state: TrackerState::Uninitialized,
            native,
            simulation: PointerSimulation::default(),
            base_orientation: Quat::IDENTITY,
            last_raw_pose: HeadPose::default(),
            world_to_meters: settings.world_to_meters,
            prediction_horizon_nanos: settings.prediction_horizon_nanos,
            preview_sensitivity: settings.clamped_preview_sensitivity(),
        }
    }

    /// Open the platform tracker, falling back to pointer simulation.
    pub fn from_platform(platform: &dyn Platform, settings: &CardboardSettings) -> Self {
        let native = match platform.create_head_tracker() {
            Ok(tracker) => Some(tracker),
            Err(CardboardError::TrackerUnavailable) => {
                info!("No native head tracker, simulating head pose from pointer input");
                None
            }
            Err(e) => {
                warn!("Failed to open native head tracker: {}", e);
                None
            }
        };
        Self::new(native, settings)
    }

    pub fn state(&self) -> TrackerState {
        self.state
    }

    pub fn is_simulated(&self) -> bool {
        self.native.is_none()
    }

    /// Uninitialized -> Active
    pub fn start(&mut self) -> Result<()> {
        match self.state {
            TrackerState::Uninitialized => {
                if let Some(native) = self.native.as_mut() {
                    native.resume();
                }
                self.state = TrackerState::Active;
                info!("Head tracker started (simulated: {})", self.is_simulated());
                Ok(())
            }
            TrackerState::Active | TrackerState::Paused => Ok(()),
            TrackerState::Destroyed => Err(self.misuse("start")),
        }
    }

    /// Active -> Paused. Pausing twice is a no-op.
    pub fn pause(&mut self) -> Result<()> {
        match self.state {
            TrackerState::Active => {
                if let Some(native) = self.native.as_mut() {
                    native.pause();
                }
                self.state = TrackerState::Paused;
                info!("Head tracker paused");
                Ok(())
            }
            TrackerState::Paused => Ok(()),
            TrackerState::Uninitialized | TrackerState::Destroyed => Err(self.misuse("pause")),
        }
    }

    /// Paused -> Active. Resuming an active tracker is a no-op.
    pub fn resume(&mut self) -> Result<()> {
        match self.state {
            TrackerState::Paused => {
                if let Some(native) = self.native.as_mut() {
                    native.resume();
                }
                self.state = TrackerState::Active;
                info!("Head tracker resumed");
                Ok(())
            }
            TrackerState::Active => Ok(()),
            TrackerState::Uninitialized | TrackerState::Destroyed => Err(self.misuse("resume")),
        }
    }

    pub fn destroy(&mut self) {
        if self.state == TrackerState::Destroyed {
            return;
        }
        if self.state == TrackerState::Active {
            if let Some(native) = self.native.as_mut() {
                native.pause();
            }
        }
        self.native = None;
        self.state = TrackerState::Destroyed;
        info!("Head tracker destroyed");
    }

    /// Feed pointer movement into the simulated head (ignored by native tracking).
    pub fn add_pointer_delta(&mut self, dx: f32, dy: f32, dt: f32) {
        self.simulation.apply(dx, dy, dt, self.preview_sensitivity);
    }

    /// Simulated (yaw, pitch) in degrees
    pub fn simulated_yaw_pitch(&self) -> (f32, f32) {
        (self.simulation.yaw, self.simulation.pitch)
    }

    /// Tracker pose without the base orientation.
    ///
    /// Native poses are predicted `prediction_horizon_nanos` past `now_nanos`.
    /// A paused tracker keeps returning its last pose.
    pub fn raw_pose(&mut self, now_nanos: i64) -> Result<HeadPose> {
        match self.state {
            TrackerState::Active => {}
            TrackerState::Paused => return Ok(self.last_raw_pose),
            TrackerState::Uninitialized | TrackerState::Destroyed => return Err(self.misuse("pose query")),
        }

        let pose = match self.native.as_mut() {
            Some(native) => {
                let sensor = native.pose(now_nanos + self.prediction_horizon_nanos);
                let q = sensor.orientation;
                HeadPose {
                    position: sensor_vector_to_engine(sensor.position, self.world_to_meters),
                    orientation: sensor_quat_to_engine(q.w, q.x, q.y, q.z),
                }
            }
            None => HeadPose {
                position: Vec3::ZERO,
                orientation: self.simulation.orientation(),
            },
        };
        self.last_raw_pose = pose;
        Ok(pose)
    }

    /// Pose with the base orientation applied to both rotation and position.
    pub fn current_pose(&mut self, now_nanos: i64) -> Result<HeadPose> {
        let raw = self.raw_pose(now_nanos)?;
        Ok(HeadPose {
            position: self.base_orientation * raw.position,
            orientation: self.base_orientation * raw.orientation,
        })
    }

    /// Zero simulated yaw and recenter the native tracker. Base orientation is kept.
    pub fn recenter(&mut self) -> Result<()> {
        if self.state == TrackerState::Destroyed {
            return Err(self.misuse("recenter"));
        }
        if let Some(native) = self.native.as_mut() {
            native.recenter();
        }
        self.simulation.yaw = 0.0;
        info!("Head tracker recentered");
        Ok(())
    }

    /// Position reset is a no-op for 3-DoF tracking.
    pub fn reset_orientation_and_position(&mut self, _yaw: f32) -> Result<()> {
        self.recenter()
    }

    pub fn set_base_orientation(&mut self, orientation: Quat) {
        self.base_orientation = orientation;
    }

    pub fn base_orientation(&self) -> Quat {
        self.base_orientation
    }

    /// Keep only the yaw of a base rotation
    pub fn set_base_rotation_yaw(&mut self, yaw_degrees: f32) {
        self.base_orientation = Quat::from_rotation_z(yaw_degrees.to_radians());
    }

    pub fn set_world_to_meters(&mut self, world_to_meters: f32) {
        self.world_to_meters = world_to_meters;
    }

    fn misuse(&self, what: &str) -> CardboardError {
        error!("Head tracker {} while {:?}", what, self.state);
        CardboardError::LifecycleMisuse(format!("head tracker {what} while {:?}", self.state))
    }
}

impl Drop for HeadPoseTracker {
    fn drop(&mut self) {
        self.destroy();
    }
}
