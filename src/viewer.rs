//! Viewer profile (Cardboard `DeviceParams` protobuf)
//!
//! The lens geometry itself comes from the profile; only structural
//! well-formedness is checked here, the math lives in `lens` and `distortion`.

use prost::Message;

use crate::error::{CardboardError, Result};

/// Vertical alignment of the lenses relative to the phone
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, PartialOrd, Ord, prost::Enumeration)]
#[repr(i32)]
pub enum VerticalAlignment {
    /// Lens centers measured from the tray (bottom edge of the phone)
    Bottom = 0,
    Center = 1,
    Top = 2,
}

/// Viewer trigger button
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, PartialOrd, Ord, prost::Enumeration)]
#[repr(i32)]
pub enum ButtonType {
    NoButton = 0,
    Magnet = 1,
    Touch = 2,
    IndirectTouch = 3,
}

/// Wire message for a viewer calibration record
#[derive(Clone, PartialEq, Message)]
pub struct DeviceParamsProto {
    #[prost(string, optional, tag = "1")]
    pub vendor: Option<String>,
    #[prost(string, optional, tag = "2")]
    pub model: Option<String>,
    /// Meters
    #[prost(float, optional, tag = "3")]
    pub screen_to_lens_distance: Option<f32>,
    /// Meters
    #[prost(float, optional, tag = "4")]
    pub inter_lens_distance: Option<f32>,
    /// Degrees: outer, inner, bottom, top
    #[prost(float, repeated, packed = "true", tag = "5")]
    pub left_eye_field_of_view_angles: Vec<f32>,
    /// Meters
    #[prost(float, optional, tag = "6")]
    pub tray_to_lens_distance: Option<f32>,
    #[prost(float, repeated, packed = "true", tag = "7")]
    pub distortion_coefficients: Vec<f32>,
    #[prost(bool, optional, tag = "10")]
    pub has_magnet: Option<bool>,
    #[prost(enumeration = "VerticalAlignment", optional, tag = "11")]
    pub vertical_alignment: Option<i32>,
    #[prost(enumeration = "ButtonType", optional, tag = "12")]
    pub primary_button: Option<i32>,
}

/// Validated viewer profile, ready for lens math
#[derive(Clone, Debug, PartialEq)]
pub struct ViewerProfile {
    pub vendor: String,
    pub model: String,
    pub screen_to_lens_distance: f32,
    pub inter_lens_distance: f32,
    /// Left eye FOV limits in degrees: outer, inner, bottom, top
    pub fov_limits_degrees: [f32; 4],
    pub tray_to_lens_distance: f32,
    pub vertical_alignment: VerticalAlignment,
    pub distortion_coefficients: Vec<f32>,
    pub primary_button: ButtonType,
}

impl ViewerProfile {
    /// Decode and validate a profile from raw device-params bytes.
    pub fn parse(bytes: &[u8]) -> Result<Self> {
        if bytes.is_empty() {
            return Err(CardboardError::CalibrationParse("empty device params".to_string()));
        }
        let proto = DeviceParamsProto::decode(bytes)
            .map_err(|e| CardboardError::CalibrationParse(e.to_string()))?;
        Self::from_proto(proto)
    }

    fn from_proto(proto: DeviceParamsProto) -> Result<Self> {
        let screen_to_lens_distance = positive("screen_to_lens_distance", proto.screen_to_lens_distance)?;
        let inter_lens_distance = positive("inter_lens_distance", proto.inter_lens_distance)?;
        let tray_to_lens_distance = positive("tray_to_lens_distance", proto.tray_to_lens_distance)?;

        let fov_limits_degrees: [f32; 4] = proto
            .left_eye_field_of_view_angles
            .as_slice()
            .try_into()
            .map_err(|_| {
                CardboardError::CalibrationParse(format!(
                    "expected 4 field of view angles, got {}",
                    proto.left_eye_field_of_view_angles.len()
                ))
            })?;
        if let Some(angle) = fov_limits_degrees.iter().find(|a| !(**a > 0.0 && **a < 90.0)) {
            return Err(CardboardError::CalibrationParse(format!(
                "field of view angle out of range: {angle}"
            )));
        }

        if proto.distortion_coefficients.iter().any(|k| !k.is_finite()) {
            return Err(CardboardError::CalibrationParse(
                "non-finite distortion coefficient".to_string(),
            ));
        }

        let vertical_alignment = match proto.vertical_alignment {
            None => VerticalAlignment::Bottom,
            Some(raw) => VerticalAlignment::try_from(raw).map_err(|_| {
                CardboardError::CalibrationParse(format!("unknown vertical alignment {raw}"))
            })?,
        };
        let primary_button = proto
            .primary_button
            .and_then(|raw| ButtonType::try_from(raw).ok())
            .unwrap_or(ButtonType::Magnet);

        Ok(Self {
            vendor: proto.vendor.unwrap_or_default(),
            model: proto.model.unwrap_or_default(),
            screen_to_lens_distance,
            inter_lens_distance,
            fov_limits_degrees,
            tray_to_lens_distance,
            vertical_alignment,
            distortion_coefficients: proto.distortion_coefficients,
            primary_button,
        })
    }

    /// Encode back to device-params bytes.
    pub fn to_bytes(&self) -> Vec<u8> {
        DeviceParamsProto {
            vendor: Some(self.vendor.clone()),
            model: Some(self.model.clone()),
            screen_to_lens_distance: Some(self.screen_to_lens_distance),
            inter_lens_distance: Some(self.inter_lens_distance),
            left_eye_field_of_view_angles: self.fov_limits_degrees.to_vec(),
            tray_to_lens_distance: Some(self.tray_to_lens_distance),
            distortion_coefficients: self.distortion_coefficients.clone(),
            has_magnet: Some(self.primary_button == ButtonType::Magnet),
            vertical_alignment: Some(self.vertical_alignment as i32),
            primary_button: Some(self.primary_button as i32),
        }
        .encode_to_vec()
    }

    /// The original Cardboard viewer
    pub fn cardboard_v1() -> Self {
        Self {
            vendor: "Google, Inc.".to_string(),
            model: "Cardboard v1".to_string(),
            screen_to_lens_distance: 0.042,
            inter_lens_distance: 0.06,
            fov_limits_degrees: [40.0, 40.0, 40.0, 40.0],
            tray_to_lens_distance: 0.035,
            vertical_alignment: VerticalAlignment::Bottom,
            distortion_coefficients: vec![0.441, 0.156],
            primary_button: ButtonType::Magnet,
        }
    }
}

/// Device-params bytes of the built-in Cardboard v1 profile
pub fn cardboard_v1_device_params() -> Vec<u8> {
    ViewerProfile::cardboard_v1().to_bytes()
}

fn positive(name: &str, value: Option<f32>) -> Result<f32> {
    match value {
        Some(v) if v.is_finite() && v > 0.0 => Ok(v),
        Some(v) => Err(CardboardError::CalibrationParse(format!("{name} must be positive, got {v}"))),
        None => Err(CardboardError::CalibrationParse(format!("missing {name}"))),
    }
}
