//! Lens calibration
//!
//! Turns a viewer profile plus the physical screen into a pair of eye
//! calibrations: field of view, eye-from-head transform and distortion mesh.
//! Everything here is a pure function of its inputs.

use glam::{Mat4, Vec4};
use log::{info, warn};

use crate::distortion::{DistortionMesh, EyeMeshGeometry, NativeMesh, PolynomialRadialDistortion, Vignette};
use crate::error::{CardboardError, Result};
use crate::platform::ScreenSize;
use crate::viewer::{cardboard_v1_device_params, VerticalAlignment, ViewerProfile};

/// Gap between the tray and the bottom of the display
const BORDER_SIZE_METERS: f32 = 0.003;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Eye {
    Left,
    Right,
}

impl Eye {
    pub const BOTH: [Eye; 2] = [Eye::Left, Eye::Right];

    pub fn index(self) -> usize {
        match self {
            Eye::Left => 0,
            Eye::Right => 1,
        }
    }
}

/// Field of view half-angles in radians, all positive
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Fov {
    pub left: f32,
    pub right: f32,
    pub bottom: f32,
    pub top: f32,
}

impl Fov {
    /// From `[left, right, bottom, top]`
    pub fn from_array(angles: [f32; 4]) -> Self {
        Self {
            left: angles[0],
            right: angles[1],
            bottom: angles[2],
            top: angles[3],
        }
    }

    pub fn to_array(self) -> [f32; 4] {
        [self.left, self.right, self.bottom, self.top]
    }

    pub fn horizontal_span(&self) -> f32 {
        self.left + self.right
    }

    pub fn vertical_span(&self) -> f32 {
        self.bottom + self.top
    }

    fn mirrored(self) -> Self {
        Self {
            left: self.right,
            right: self.left,
            ..self
        }
    }
}

/// Everything the renderer needs for one eye
#[derive(Debug, Clone, PartialEq)]
pub struct EyeCalibration {
    pub eye: Eye,
    pub fov: Fov,
    /// Column-major, sensor space, meters
    pub eye_from_head: [f32; 16],
    pub mesh: DistortionMesh,
}

/// Builds eye calibrations from device-params bytes
pub struct LensCalibration;

impl LensCalibration {
    /// Build both eyes from a viewer profile.
    ///
    /// Fails with `CalibrationParse` when the bytes are not a usable profile.
    pub fn build(bytes: &[u8], screen: ScreenSize, vignette: Vignette) -> Result<[EyeCalibration; 2]> {
        if screen.width == 0 || screen.height == 0 {
            return Err(CardboardError::LifecycleMisuse(
                "calibration requested before the screen size is known".to_string(),
            ));
        }
        let profile = ViewerProfile::parse(bytes)?;
        Ok(Self::build_profile(&profile, screen, vignette))
    }

    /// Like [`LensCalibration::build`], substituting the default profile for
    /// empty or unparsable bytes.
    pub fn build_with_fallback(
        bytes: &[u8],
        screen: ScreenSize,
        vignette: Vignette,
    ) -> Result<[EyeCalibration; 2]> {
        if !bytes.is_empty() {
            match Self::build(bytes, screen, vignette) {
                Ok(eyes) => return Ok(eyes),
                Err(CardboardError::CalibrationParse(reason)) => {
                    warn!("Saved viewer profile unusable ({}), using the default viewer", reason);
                }
                Err(e) => return Err(e),
            }
        }

        match Self::build(&cardboard_v1_device_params(), screen, vignette) {
            Ok(eyes) => Ok(eyes),
            Err(CardboardError::CalibrationParse(reason)) => Err(CardboardError::FatalCalibration(reason)),
            Err(e) => Err(e),
        }
    }

    pub fn build_profile(profile: &ViewerProfile, screen: ScreenSize, vignette: Vignette) -> [EyeCalibration; 2] {
        let distortion = PolynomialRadialDistortion::new(&profile.distortion_coefficients);
        let (screen_width, screen_height) = screen.size_meters();
        let s2l = profile.screen_to_lens_distance;
        let half_ipd = profile.inter_lens_distance / 2.0;
        let y_offset = eye_offset_y(profile, screen_height);

        let left_fov = left_eye_fov(profile, &distortion, screen_width, screen_height, y_offset);
        let fovs = [left_fov, left_fov.mirrored()];

        info!(
            "Lens calibration for {} {}: screen {:.4}x{:.4} m, fov {:?}",
            profile.vendor, profile.model, screen_width, screen_height, left_fov
        );

        Eye::BOTH.map(|eye| {
            let fov = fovs[eye.index()];
            let x_eye_offset_screen = match eye {
                Eye::Left => (screen_width / 2.0 - half_ipd) / s2l,
                Eye::Right => half_ipd / s2l,
            };
            let geometry = EyeMeshGeometry {
                screen_width: (screen_width / 2.0) / s2l,
                screen_height: screen_height / s2l,
                x_eye_offset_screen,
                y_eye_offset_screen: y_offset / s2l,
                texture_width: fov.left.tan() + fov.right.tan(),
                texture_height: fov.bottom.tan() + fov.top.tan(),
                x_eye_offset_texture: fov.left.tan(),
                y_eye_offset_texture: fov.bottom.tan(),
            };
            let native = NativeMesh::generate(&distortion, &geometry);

            EyeCalibration {
                eye,
                fov,
                eye_from_head: eye_from_head(eye, half_ipd),
                mesh: DistortionMesh::from_native(&native, vignette),
            }
        })
    }
}

/// Lens center height above the bottom of the screen
fn eye_offset_y(profile: &ViewerProfile, screen_height: f32) -> f32 {
    match profile.vertical_alignment {
        VerticalAlignment::Bottom => profile.tray_to_lens_distance - BORDER_SIZE_METERS,
        VerticalAlignment::Center => screen_height / 2.0,
        VerticalAlignment::Top => screen_height - (profile.tray_to_lens_distance - BORDER_SIZE_METERS),
    }
}

fn left_eye_fov(
    profile: &ViewerProfile,
    distortion: &PolynomialRadialDistortion,
    screen_width: f32,
    screen_height: f32,
    bottom_distance: f32,
) -> Fov {
    let s2l = profile.screen_to_lens_distance;
    let outer = (screen_width - profile.inter_lens_distance) / 2.0;
    let inner = profile.inter_lens_distance / 2.0;
    let top_distance = screen_height - bottom_distance;

    let angle = |distance: f32| distortion.distort_radius(distance / s2l).atan();
    let limits = profile.fov_limits_degrees.map(f32::to_radians);

    Fov {
        left: angle(outer).min(limits[0]),
        right: angle(inner).min(limits[1]),
        bottom: angle(bottom_distance).min(limits[2]),
        top: angle(top_distance).min(limits[3]),
    }
}

fn eye_from_head(eye: Eye, half_ipd: f32) -> [f32; 16] {
    let offset = match eye {
        Eye::Left => half_ipd,
        Eye::Right => -half_ipd,
    };
    Mat4::from_translation(glam::Vec3::new(offset, 0.0, 0.0)).to_cols_array()
}

/// Off-axis projection for an eye (reversed Z, infinite far plane).
///
/// Left/right and bottom/top are swapped to match the engine's axes.
pub fn projection_matrix(fov: &Fov, near_clip: f32) -> Mat4 {
    let left = -fov.right.tan();
    let right = fov.left.tan();
    let bottom = -fov.top.tan();
    let top = fov.bottom.tan();

    let sum_rl = right + left;
    let sum_tb = top + bottom;
    let inv_rl = 1.0 / (right - left);
    let inv_tb = 1.0 / (top - bottom);

    Mat4::from_cols(
        Vec4::new(2.0 * inv_rl, 0.0, 0.0, 0.0),
        Vec4::new(0.0, 2.0 * inv_tb, 0.0, 0.0),
        Vec4::new(sum_rl * inv_rl, sum_tb * inv_tb, 0.0, 1.0),
        Vec4::new(0.0, 0.0, near_clip, 0.0),
    )
}

#[cfg(test)]
mod tests {
    use super::*;

    const EPS: f32 = 1e-5;

    fn phone() -> ScreenSize {
        ScreenSize::new(1920, 1080, 400.0)
    }

    fn wide_fov_profile() -> ViewerProfile {
        let mut profile = ViewerProfile::cardboard_v1();
        profile.fov_limits_degrees = [60.0; 4];
        profile
    }

    #[test]
    fn test_default_profile_builds() {
        let eyes = LensCalibration::build(&cardboard_v1_device_params(), phone(), Vignette::default()).unwrap();
        for (i, eye) in eyes.iter().enumerate() {
            assert_eq!(eye.eye.index(), i);
            assert!(eye.fov.horizontal_span() > 0.0);
            assert!(eye.fov.vertical_span() > 0.0);
            assert!(!eye.mesh.is_empty());
        }
        // 40 degree limits clamp every angle on a 1080p phone
        let limit = 40.0_f32.to_radians();
        for angle in eyes[0].fov.to_array() {
            assert!((angle - limit).abs() < EPS);
        }
    }

    #[test]
    fn test_build_is_deterministic() {
        let bytes = wide_fov_profile().to_bytes();
        let a = LensCalibration::build(&bytes, phone(), Vignette::default()).unwrap();
        let b = LensCalibration::build(&bytes, phone(), Vignette::default()).unwrap();
        assert_eq!(a, b);
    }

    #[test]
    fn test_right_eye_mirrors_left() {
        let eyes = LensCalibration::build_profile(&wide_fov_profile(), phone(), Vignette::default());
        let (left, right) = (eyes[0].fov, eyes[1].fov);
        // Outer edge sees further than the inner edge
        assert!(left.left > left.right);
        assert_eq!(right.left, left.right);
        assert_eq!(right.right, left.left);
        assert_eq!(right.bottom, left.bottom);
        assert_eq!(right.top, left.top);
    }

    #[test]
    fn test_eye_from_head_translation() {
        let eyes = LensCalibration::build_profile(&ViewerProfile::cardboard_v1(), phone(), Vignette::default());
        assert!((eyes[0].eye_from_head[12] - 0.03).abs() < EPS);
        assert!((eyes[1].eye_from_head[12] + 0.03).abs() < EPS);
        assert_eq!(eyes[0].eye_from_head[13], 0.0);
        assert_eq!(eyes[0].eye_from_head[0], 1.0);
    }

    #[test]
    fn test_fallback_on_garbage_and_empty() {
        let expected = LensCalibration::build(&cardboard_v1_device_params(), phone(), Vignette::default()).unwrap();
        for bytes in [&[][..], &[0x01, 0xB0, 0x9D][..], &b"junk"[..]] {
            let eyes = LensCalibration::build_with_fallback(bytes, phone(), Vignette::default()).unwrap();
            assert_eq!(eyes, expected);
        }
    }

    #[test]
    fn test_parse_error_without_fallback() {
        assert!(matches!(
            LensCalibration::build(b"junk", phone(), Vignette::default()),
            Err(CardboardError::CalibrationParse(_))
        ));
    }

    #[test]
    fn test_zero_screen_rejected() {
        let err = LensCalibration::build_with_fallback(
            &cardboard_v1_device_params(),
            ScreenSize::new(0, 0, 400.0),
            Vignette::default(),
        );
        assert!(matches!(err, Err(CardboardError::LifecycleMisuse(_))));
    }

    #[test]
    fn test_vertical_alignment_moves_lens_center() {
        let screen_height = 0.0686;
        let mut profile = ViewerProfile::cardboard_v1();
        assert!((eye_offset_y(&profile, screen_height) - 0.032).abs() < EPS);
        profile.vertical_alignment = VerticalAlignment::Center;
        assert!((eye_offset_y(&profile, screen_height) - screen_height / 2.0).abs() < EPS);
        profile.vertical_alignment = VerticalAlignment::Top;
        assert!((eye_offset_y(&profile, screen_height) - (screen_height - 0.032)).abs() < EPS);
    }

    #[test]
    fn test_symmetric_projection() {
        let fov = Fov::from_array([45.0_f32.to_radians(); 4]);
        let m = projection_matrix(&fov, 10.0);
        assert!((m.x_axis.x - 1.0).abs() < EPS);
        assert!((m.y_axis.y - 1.0).abs() < EPS);
        assert!(m.z_axis.x.abs() < EPS);
        assert!(m.z_axis.y.abs() < EPS);
        assert_eq!(m.z_axis.w, 1.0);
        assert_eq!(m.w_axis.z, 10.0);
    }

    #[test]
    fn test_asymmetric_projection_per_eye() {
        let eyes = LensCalibration::build_profile(&wide_fov_profile(), phone(), Vignette::default());
        let left = projection_matrix(&eyes[0].fov, 10.0);
        let right = projection_matrix(&eyes[1].fov, 10.0);
        assert!(left.z_axis.x.abs() > 1e-3);
        assert!((left.z_axis.x + right.z_axis.x).abs() < EPS);
        assert!((left.x_axis.x - right.x_axis.x).abs() < EPS);
    }
}
