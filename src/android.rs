//! Android platform glue
//!
//! Head tracking from the NDK Game Rotation Vector sensor (no magnetic
//! interference), the boot clock, and the JNI entry points called by
//! `CardboardJavaHelper` on lifecycle events.

use std::ptr;

use glam::{Quat, Vec3};
use jni::objects::JObject;
use jni::JNIEnv;
use lazy_static::lazy_static;
use log::{info, warn};
use parking_lot::Mutex;

use crate::coords::{device_rate_to_display, device_rotation_to_sensor};
use crate::error::{CardboardError, Result};
use crate::events::{EventSender, LifecycleEvent};
use crate::platform::{Platform, ScreenSize};
use crate::tracker::{predict_orientation, NativeHeadTracker, SensorPose};

// Sensor type constants
const ASENSOR_TYPE_GAME_ROTATION_VECTOR: i32 = 15;
const ASENSOR_TYPE_GYROSCOPE: i32 = 4;

/// ~200Hz, in microseconds
const SENSOR_RATE_USEC: i32 = 5000;

/// Never extrapolate further than this
const MAX_PREDICTION_SECS: f32 = 0.1;

/// `CLOCK_BOOTTIME` in nanoseconds, the clock sensor events are stamped with
pub fn boot_time_nanos() -> i64 {
    let mut ts = libc::timespec { tv_sec: 0, tv_nsec: 0 };
    // Safety: ts is a valid out-pointer
    let rc = unsafe { libc::clock_gettime(libc::CLOCK_BOOTTIME, &mut ts) };
    if rc != 0 {
        return 0;
    }
    ts.tv_sec as i64 * 1_000_000_000 + ts.tv_nsec as i64
}

/// Android host capabilities
pub struct AndroidPlatform {
    screen: Mutex<ScreenSize>,
    package: String,
}

impl AndroidPlatform {
    pub fn new(screen: ScreenSize, package: impl Into<String>) -> Self {
        Self {
            screen: Mutex::new(screen),
            package: package.into(),
        }
    }

    /// Update after a display change, before `DisplayOrientationChanged` is handled
    pub fn set_screen_size(&self, screen: ScreenSize) {
        *self.screen.lock() = screen;
    }
}

impl Platform for AndroidPlatform {
    fn screen_size(&self) -> ScreenSize {
        *self.screen.lock()
    }

    fn boot_time_nanos(&self) -> i64 {
        boot_time_nanos()
    }

    fn create_head_tracker(&self) -> Result<Box<dyn NativeHeadTracker>> {
        let tracker = SensorHeadTracker::open(&self.package)?;
        Ok(Box::new(tracker))
    }
}

/// Head tracker on the NDK sensor queue
pub struct SensorHeadTracker {
    sensor_manager: *mut ndk_sys::ASensorManager,
    event_queue: *mut ndk_sys::ASensorEventQueue,
    rotation_sensor: *const ndk_sys::ASensor,
    gyro_sensor: *const ndk_sys::ASensor,

    // Latest rotation sample, sensor space
    orientation: Quat,
    sample_timestamp: i64,
    // Display-frame angular rate, rad/s
    angular_velocity: Vec3,
    // Applied on top of the sensor orientation after a recenter
    recenter: Quat,
    enabled: bool,
}

// Safety: sensor pointers are only touched by the thread that owns the tracker
unsafe impl Send for SensorHeadTracker {}

impl SensorHeadTracker {
    pub fn open(package: &str) -> Result<Self> {
        info!("Initializing head tracking sensors...");
        let package = std::ffi::CString::new(package)
            .map_err(|_| CardboardError::LifecycleMisuse("package name contains NUL".to_string()))?;

        unsafe {
            let mut sensor_manager = ndk_sys::ASensorManager_getInstanceForPackage(package.as_ptr().cast());
            if sensor_manager.is_null() {
                info!("Failed to get ASensorManager, trying fallback");
                sensor_manager = ndk_sys::ASensorManager_getInstance();
            }
            if sensor_manager.is_null() {
                warn!("ASensorManager not available");
                return Err(CardboardError::TrackerUnavailable);
            }

            let rotation_sensor =
                ndk_sys::ASensorManager_getDefaultSensor(sensor_manager, ASENSOR_TYPE_GAME_ROTATION_VECTOR);
            if rotation_sensor.is_null() {
                warn!("Game Rotation Vector not available");
                return Err(CardboardError::TrackerUnavailable);
            }
            // Optional, only sharpens prediction
            let gyro_sensor = ndk_sys::ASensorManager_getDefaultSensor(sensor_manager, ASENSOR_TYPE_GYROSCOPE);

            let mut looper = ndk_sys::ALooper_forThread();
            if looper.is_null() {
                looper = ndk_sys::ALooper_prepare(0);
            }
            if looper.is_null() {
                warn!("Failed to get ALooper");
                return Err(CardboardError::TrackerUnavailable);
            }

            let event_queue =
                ndk_sys::ASensorManager_createEventQueue(sensor_manager, looper, 0, None, ptr::null_mut());
            if event_queue.is_null() {
                warn!("Failed to create sensor event queue");
                return Err(CardboardError::TrackerUnavailable);
            }

            info!("Head tracking sensors ready (gyroscope: {})", !gyro_sensor.is_null());
            Ok(Self {
                sensor_manager,
                event_queue,
                rotation_sensor,
                gyro_sensor,
                orientation: Quat::IDENTITY,
                sample_timestamp: 0,
                angular_velocity: Vec3::ZERO,
                recenter: Quat::IDENTITY,
                enabled: false,
            })
        }
    }

    fn enable_sensor(&self, sensor: *const ndk_sys::ASensor) {
        if sensor.is_null() {
            return;
        }
        unsafe {
            let result = ndk_sys::ASensorEventQueue_enableSensor(self.event_queue, sensor);
            if result < 0 {
                warn!("Failed to enable sensor: {}", result);
                return;
            }
            ndk_sys::ASensorEventQueue_setEventRate(self.event_queue, sensor, SENSOR_RATE_USEC);
        }
    }

    fn disable_sensor(&self, sensor: *const ndk_sys::ASensor) {
        if !sensor.is_null() {
            unsafe {
                ndk_sys::ASensorEventQueue_disableSensor(self.event_queue, sensor);
            }
        }
    }

    /// Drain pending sensor events into the latest sample
    fn poll(&mut self) {
        unsafe {
            let mut event: ndk_sys::ASensorEvent = std::mem::zeroed();
            while ndk_sys::ASensorEventQueue_getEvents(self.event_queue, &mut event, 1) > 0 {
                let data = event.__bindgen_anon_1.__bindgen_anon_1.data;
                match event.type_ {
                    ASENSOR_TYPE_GAME_ROTATION_VECTOR => {
                        let (x, y, z) = (data[0], data[1], data[2]);
                        // Compute w from unit quaternion constraint
                        let w = (1.0 - x * x - y * y - z * z).max(0.0).sqrt();
                        self.orientation = device_rotation_to_sensor(Quat::from_xyzw(x, y, z, w));
                        self.sample_timestamp = event.timestamp;
                    }
                    ASENSOR_TYPE_GYROSCOPE => {
                        self.angular_velocity = device_rate_to_display(Vec3::new(data[0], data[1], data[2]));
                    }
                    _ => {}
                }
            }
        }
    }

    /// Yaw-only correction that makes the current heading forward
    fn heading_correction(&self) -> Quat {
        let forward = self.orientation * Vec3::new(0.0, 0.0, -1.0);
        let yaw = (-forward.x).atan2(-forward.z);
        Quat::from_rotation_y(-yaw)
    }
}

impl NativeHeadTracker for SensorHeadTracker {
    fn pose(&mut self, timestamp_nanos: i64) -> SensorPose {
        if self.enabled {
            self.poll();
        }
        let dt = if self.sample_timestamp > 0 {
            ((timestamp_nanos - self.sample_timestamp) as f32 / 1e9).clamp(0.0, MAX_PREDICTION_SECS)
        } else {
            0.0
        };
        let predicted = predict_orientation(self.orientation, self.angular_velocity, dt);
        SensorPose {
            position: Vec3::ZERO,
            orientation: self.recenter * predicted,
        }
    }

    fn pause(&mut self) {
        if !self.enabled {
            return;
        }
        self.disable_sensor(self.rotation_sensor);
        self.disable_sensor(self.gyro_sensor);
        self.enabled = false;
        info!("Head tracking sensors paused");
    }

    fn resume(&mut self) {
        if self.enabled {
            return;
        }
        self.enable_sensor(self.rotation_sensor);
        self.enable_sensor(self.gyro_sensor);
        self.enabled = true;
        info!("Head tracking sensors resumed");
    }

    fn recenter(&mut self) {
        self.poll();
        self.recenter = self.heading_correction();
        info!("Head tracking recentered");
    }
}

impl Drop for SensorHeadTracker {
    fn drop(&mut self) {
        self.pause();
        unsafe {
            if !self.event_queue.is_null() && !self.sensor_manager.is_null() {
                ndk_sys::ASensorManager_destroyEventQueue(self.sensor_manager, self.event_queue);
            }
        }
    }
}

// --- JNI ---

lazy_static! {
    // JNI entry points carry no context, so the HMD registers its queue here
    static ref EVENT_SINK: Mutex<Option<EventSender>> = Mutex::new(None);
}

/// Route Java lifecycle callbacks into this sender
pub fn register_event_sender(sender: EventSender) {
    *EVENT_SINK.lock() = Some(sender);
}

pub fn unregister_event_sender() {
    *EVENT_SINK.lock() = None;
}

fn forward(event: LifecycleEvent) {
    match EVENT_SINK.lock().as_ref() {
        Some(sender) => sender.send(event),
        None => warn!("{:?} arrived before the HMD registered", event),
    }
}

#[no_mangle]
pub extern "C" fn Java_com_cardboard_vr_CardboardJavaHelper_onApplicationCreated(_env: JNIEnv, _this: JObject) {
    forward(LifecycleEvent::ApplicationCreated);
}

#[no_mangle]
pub extern "C" fn Java_com_cardboard_vr_CardboardJavaHelper_onApplicationPause(_env: JNIEnv, _this: JObject) {
    forward(LifecycleEvent::ApplicationPause);
}

#[no_mangle]
pub extern "C" fn Java_com_cardboard_vr_CardboardJavaHelper_onApplicationResume(_env: JNIEnv, _this: JObject) {
    forward(LifecycleEvent::ApplicationResume);
}

#[no_mangle]
pub extern "C" fn Java_com_cardboard_vr_CardboardJavaHelper_onBackButtonPressed(_env: JNIEnv, _this: JObject) {
    forward(LifecycleEvent::BackButtonPressed);
}

#[no_mangle]
pub extern "C" fn Java_com_cardboard_vr_CardboardJavaHelper_onSettingsMenuOpened(_env: JNIEnv, _this: JObject) {
    forward(LifecycleEvent::SettingsMenuOpened);
}

#[no_mangle]
pub extern "C" fn Java_com_cardboard_vr_CardboardJavaHelper_onToggleStereoModeButtonPressed(
    _env: JNIEnv,
    _this: JObject,
) {
    forward(LifecycleEvent::ToggleStereoModeButtonPressed);
}

#[no_mangle]
pub extern "C" fn Java_com_cardboard_vr_CardboardJavaHelper_onSwitchViewerButtonPressed(
    _env: JNIEnv,
    _this: JObject,
) {
    forward(LifecycleEvent::SwitchViewerButtonPressed);
}

#[no_mangle]
pub extern "C" fn Java_com_cardboard_vr_CardboardJavaHelper_onDisplayOrientationChanged(
    _env: JNIEnv,
    _this: JObject,
) {
    forward(LifecycleEvent::DisplayOrientationChanged);
}
