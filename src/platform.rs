//! Platform capabilities used by the HMD core
//!
//! Screen metrics, the boot clock used for pose prediction and the native head
//! tracker are the only things that differ between hosts.

use std::time::Instant;

use crate::error::{CardboardError, Result};
use crate::tracker::NativeHeadTracker;

const METERS_PER_INCH: f32 = 0.0254;

/// Used when the host cannot report its pixel density
pub const DEFAULT_DPI: f32 = 400.0;

/// Physical screen in landscape orientation
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct ScreenSize {
    pub width: u32,
    pub height: u32,
    pub dpi: f32,
}

impl ScreenSize {
    pub fn new(width: u32, height: u32, dpi: f32) -> Self {
        Self { width, height, dpi }
    }

    pub fn with_default_dpi(width: u32, height: u32) -> Self {
        Self::new(width, height, DEFAULT_DPI)
    }

    /// (width, height) in meters
    pub fn size_meters(&self) -> (f32, f32) {
        let dpi = if self.dpi > 0.0 { self.dpi } else { DEFAULT_DPI };
        (
            self.width as f32 / dpi * METERS_PER_INCH,
            self.height as f32 / dpi * METERS_PER_INCH,
        )
    }
}

/// Host capabilities
pub trait Platform: Send {
    fn screen_size(&self) -> ScreenSize;

    /// Monotonic clock matching the sensor timestamps
    fn boot_time_nanos(&self) -> i64;

    /// Open the native head tracker. `TrackerUnavailable` selects the simulated pose.
    fn create_head_tracker(&self) -> Result<Box<dyn NativeHeadTracker>>;
}

/// Desktop / editor host: fixed screen, no sensors
pub struct DesktopPlatform {
    screen: ScreenSize,
    started: Instant,
}

impl DesktopPlatform {
    pub fn new(screen: ScreenSize) -> Self {
        Self {
            screen,
            started: Instant::now(),
        }
    }
}

impl Default for DesktopPlatform {
    fn default() -> Self {
        Self::new(ScreenSize::with_default_dpi(1920, 1080))
    }
}

impl Platform for DesktopPlatform {
    fn screen_size(&self) -> ScreenSize {
        self.screen
    }

    fn boot_time_nanos(&self) -> i64 {
        self.started.elapsed().as_nanos() as i64
    }

    fn create_head_tracker(&self) -> Result<Box<dyn NativeHeadTracker>> {
        Err(CardboardError::TrackerUnavailable)
    }
}
