//! Conversions between sensor space and engine space
//!
//! Sensor space (tracker and lens SDK): right-handed, +X right, +Y up, -Z forward.
//! Engine space: +X forward, +Y right, +Z up, left-handed, in engine units.
//! Android device frames are brought into sensor space here as well.

use std::f32::consts::FRAC_PI_2;

use glam::{Mat4, Quat, Vec3, Vec4};

/// Maps sensor (OpenGL-style) axes onto engine axes: x -> Y, y -> Z, z -> -X.
pub const SENSOR_TO_ENGINE_BASIS: Mat4 = Mat4::from_cols(
    Vec4::new(0.0, 1.0, 0.0, 0.0),
    Vec4::new(0.0, 0.0, 1.0, 0.0),
    Vec4::new(-1.0, 0.0, 0.0, 0.0),
    Vec4::new(0.0, 0.0, 0.0, 1.0),
);

/// Sensor-space vector to engine space, scaled to engine units.
pub fn sensor_vector_to_engine(v: Vec3, world_to_meters: f32) -> Vec3 {
    // Sensor: -Z forward, +X right, +Y up
    Vec3::new(-v.z, v.x, v.y) * world_to_meters
}

/// Inverse of [`sensor_vector_to_engine`].
pub fn engine_vector_to_sensor(v: Vec3, world_to_meters: f32) -> Vec3 {
    Vec3::new(v.y, v.z, -v.x) / world_to_meters
}

/// Sensor-space rotation (w, x, y, z) to an engine-space quaternion.
///
/// The handedness flip is a component remap plus one sign change; unit inputs
/// stay unit, so no renormalization happens here.
pub fn sensor_quat_to_engine(w: f32, x: f32, y: f32, z: f32) -> Quat {
    Quat::from_xyzw(-z, x, y, w)
}

/// Column-major sensor-space matrix (as returned by the lens SDK) to engine space.
///
/// The basis change is applied on both sides, then the translation is scaled to
/// engine units.
pub fn sensor_matrix_to_engine(columns: &[f32; 16], world_to_meters: f32) -> Mat4 {
    let input = Mat4::from_cols_array(columns);
    let mut result = SENSOR_TO_ENGINE_BASIS * input * SENSOR_TO_ENGINE_BASIS.transpose();
    let origin = result.w_axis.truncate() * world_to_meters;
    result.w_axis = origin.extend(1.0);
    result
}

/// Android rotation-vector orientation (device in a Z-up world) to a sensor-space
/// head orientation, for a display in landscape-left.
pub fn device_rotation_to_sensor(device: Quat) -> Quat {
    let world_to_sensor = Quat::from_rotation_x(-FRAC_PI_2);
    let display_to_device = Quat::from_rotation_z(-FRAC_PI_2);
    (world_to_sensor * device * display_to_device).normalize()
}

/// Device-frame angular rate to the landscape-left display frame
pub fn device_rate_to_display(rate: Vec3) -> Vec3 {
    Quat::from_rotation_z(FRAC_PI_2) * rate
}

#[cfg(test)]
mod tests {
    use super::*;

    const EPS: f32 = 1e-5;

    #[test]
    fn test_vector_axes() {
        let forward = sensor_vector_to_engine(Vec3::new(0.0, 0.0, -1.0), 1.0);
        assert_eq!(forward, Vec3::X);
        let right = sensor_vector_to_engine(Vec3::X, 1.0);
        assert_eq!(right, Vec3::Y);
        let up = sensor_vector_to_engine(Vec3::Y, 1.0);
        assert_eq!(up, Vec3::Z);
    }

    #[test]
    fn test_vector_round_trip() {
        let samples = [
            Vec3::new(0.1, -0.25, 3.0),
            Vec3::new(-7.5, 0.0, 0.003),
            Vec3::new(1e-3, 2e3, -4.0),
        ];
        for v in samples {
            let back = engine_vector_to_sensor(sensor_vector_to_engine(v, 100.0), 100.0);
            assert!((back - v).length() < EPS * v.length().max(1.0), "{v:?} -> {back:?}");
        }
    }

    #[test]
    fn test_quat_remap_keeps_unit_length() {
        let q = Quat::from_axis_angle(Vec3::new(1.0, 2.0, 3.0).normalize(), 0.7);
        let converted = sensor_quat_to_engine(q.w, q.x, q.y, q.z);
        assert_eq!(converted.x, -q.z);
        assert_eq!(converted.y, q.x);
        assert_eq!(converted.z, q.y);
        assert_eq!(converted.w, q.w);
        assert!((converted.length() - 1.0).abs() < EPS);
    }

    #[test]
    fn test_matrix_translation_follows_vector_conversion() {
        // Eye-from-head for a left eye 3cm to the left
        let mut columns = Mat4::IDENTITY.to_cols_array();
        columns[12] = 0.03;
        let m = sensor_matrix_to_engine(&columns, 100.0);

        let expected = sensor_vector_to_engine(Vec3::new(0.03, 0.0, 0.0), 100.0);
        assert!((m.w_axis.truncate() - expected).length() < EPS);
        assert!((m.x_axis.truncate() - Vec3::X).length() < EPS);
        assert!((m.y_axis.truncate() - Vec3::Y).length() < EPS);
        assert!((m.z_axis.truncate() - Vec3::Z).length() < EPS);
    }

    #[test]
    fn test_phone_flat_looks_down() {
        let head = device_rotation_to_sensor(Quat::IDENTITY);
        let forward = head * Vec3::new(0.0, 0.0, -1.0);
        assert!((forward - Vec3::new(0.0, -1.0, 0.0)).length() < EPS);
    }

    #[test]
    fn test_phone_upright_facing_north_is_identity() {
        // Landscape-left: display right is east, display up is world up
        let device = Quat::from_mat3(&glam::Mat3::from_cols(
            Vec3::new(0.0, 0.0, 1.0),
            Vec3::new(-1.0, 0.0, 0.0),
            Vec3::new(0.0, -1.0, 0.0),
        ));
        let head = device_rotation_to_sensor(device);
        assert!(head.dot(Quat::IDENTITY).abs() > 1.0 - EPS);
    }

    #[test]
    fn test_rate_about_device_x_is_display_yaw() {
        // Device +X is display up, so turning about it is a yaw
        let display = device_rate_to_display(Vec3::X);
        assert!((display - Vec3::Y).length() < EPS);
    }

    #[test]
    fn test_matrix_rotation_conjugated() {
        // A 90 degree turn about sensor +Y (up) becomes a turn about engine +Z (up)
        let sensor = Mat4::from_rotation_y(std::f32::consts::FRAC_PI_2);
        let m = sensor_matrix_to_engine(&sensor.to_cols_array(), 1.0);

        let sensor_forward = Vec3::new(0.0, 0.0, -1.0);
        let rotated_sensor = sensor.transform_vector3(sensor_forward);
        let via_engine = m.transform_vector3(sensor_vector_to_engine(sensor_forward, 1.0));
        assert!((via_engine - sensor_vector_to_engine(rotated_sensor, 1.0)).length() < EPS);
    }
}
