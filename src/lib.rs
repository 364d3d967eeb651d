//! Cardboard VR core
//!
//! Head tracking, lens calibration and distortion meshes for Cardboard-style
//! phone viewers. The game thread owns a [`CardboardHmd`]; the render thread
//! reads calibration snapshots from the [`SnapshotReader`] it hands out.

pub mod coordinator;
pub mod coords;
pub mod device_params;
pub mod distortion;
pub mod error;
pub mod events;
pub mod handoff;
pub mod hmd;
pub mod lens;
pub mod overlay;
pub mod platform;
pub mod settings;
pub mod tracker;
pub mod viewer;

#[cfg(target_os = "android")]
pub mod android;

pub use coordinator::{adjust_view_rect, eye_uv_params, RenderSnapshot, StereoRenderCoordinator, ViewRect};
pub use device_params::{DeviceParameterStore, DeviceParameters, FileStorage, MemoryStorage, ParamSource, ParamStorage};
pub use distortion::{DistortionMesh, DistortionVertex, Vignette};
pub use error::{CardboardError, Result};
pub use events::{EventSender, HmdNotification, LifecycleEvent};
pub use handoff::SnapshotReader;
pub use hmd::{CardboardHmd, HmdCollaborators, RESCAN_PROMPT_AFTER_FAILURES};
pub use lens::{Eye, EyeCalibration, Fov, LensCalibration};
pub use platform::{DesktopPlatform, Platform, ScreenSize};
pub use settings::CardboardSettings;
pub use tracker::{HeadPose, HeadPoseTracker, NativeHeadTracker, SensorPose, TrackerState};

/// Install the logger: logcat on Android, `env_logger` elsewhere. Safe to call twice.
pub fn init_logging() {
    #[cfg(target_os = "android")]
    android_logger::init_once(
        android_logger::Config::default()
            .with_max_level(log::LevelFilter::Info)
            .with_tag("CardboardVR"),
    );

    #[cfg(not(target_os = "android"))]
    {
        let _ = env_logger::Builder::from_env(env_logger::Env::default().default_filter_or("info")).try_init();
    }

    log::info!("Cardboard VR core starting...");
}
