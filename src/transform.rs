//! Device frame → display frame
//!
//! The device reports in its own sensing frame. The display frame is reached
//! with one fixed rotation, the projection quaternion `Rx(90°)·Rz(90°)`.
//! Every function here is pure: same raw input, same output, no state.

use nalgebra::{Quaternion, Rotation3, Unit, UnitQuaternion, Vector3};
use std::f32::consts::FRAC_PI_2;

use crate::config::ConnectorConfig;

/// Rotation of `angle` radians about `axis`.
fn rotate_on_axis(axis: Vector3<f32>, angle: f32) -> UnitQuaternion<f32> {
    UnitQuaternion::from_axis_angle(&Unit::new_normalize(axis), angle)
}

/// `Rx(90°) · Rz(90°)` (Hamilton product, X factor on the left).
pub fn projection_quaternion() -> UnitQuaternion<f32> {
    rotate_on_axis(Vector3::x(), FRAC_PI_2) * rotate_on_axis(Vector3::z(), FRAC_PI_2)
}

/// Euler angles in XYZ order (rotation matrix `Rx·Ry·Rz`), radians.
pub fn euler_xyz(q: &UnitQuaternion<f32>) -> Vector3<f32> {
    let m: Rotation3<f32> = q.to_rotation_matrix();
    let m = m.matrix();
    let m13 = m[(0, 2)].clamp(-1.0, 1.0);
    let y = m13.asin();
    if m13.abs() < 0.999_999_9 {
        Vector3::new(
            (-m[(1, 2)]).atan2(m[(2, 2)]),
            y,
            (-m[(0, 1)]).atan2(m[(0, 0)]),
        )
    } else {
        // gimbal lock: fold Z into X
        Vector3::new(m[(2, 1)].atan2(m[(1, 1)]), y, 0.0)
    }
}

#[derive(Clone, Debug, PartialEq)]
pub struct FrameTransform {
    projection: UnitQuaternion<f32>,
    position_scale: f32,
    euler_x_offset_deg: f32,
}

impl FrameTransform {
    pub fn new(position_scale: f32, euler_x_offset_deg: f32) -> Self {
        Self {
            projection: projection_quaternion(),
            position_scale,
            euler_x_offset_deg,
        }
    }

    pub fn from_config(config: &ConnectorConfig) -> Self {
        Self::new(config.position_scale, config.euler_x_offset_deg)
    }

    pub fn projection(&self) -> UnitQuaternion<f32> {
        self.projection
    }

    /// `projection · raw`, renormalised.
    pub fn orientation(&self, raw: &Quaternion<f32>) -> UnitQuaternion<f32> {
        UnitQuaternion::new_normalize(self.projection.quaternion() * raw)
    }

    /// Euler angles of a display orientation, in degrees, X offset applied.
    pub fn orientation_euler_deg(&self, display: &UnitQuaternion<f32>) -> Vector3<f32> {
        let mut euler = euler_xyz(display).map(f32::to_degrees);
        euler.x += self.euler_x_offset_deg;
        euler
    }

    pub fn linear_accel(&self, raw: &Vector3<f32>) -> Vector3<f32> {
        self.projection * raw
    }

    pub fn optical_flow(&self, raw: &Vector3<f32>) -> Vector3<f32> {
        self.projection * raw
    }

    /// Y and Z flipped, projected, then scaled to display units.
    pub fn position(&self, raw: &Vector3<f32>) -> Vector3<f32> {
        let flipped = Vector3::new(raw.x, -raw.y, -raw.z);
        (self.projection * flipped) * self.position_scale
    }
}

impl Default for FrameTransform {
    fn default() -> Self {
        Self::from_config(&ConnectorConfig::default())
    }
}
