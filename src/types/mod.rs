pub mod linalg;

pub use linalg::*;

use nalgebra::{Quaternion, UnitQuaternion, Vector3};
use serde::{Deserialize, Serialize};

// ─── Wire shapes ─────────────────────────────────────────────────────────────

#[derive(Clone, Copy, Debug, Serialize, Deserialize)]
pub struct WireQuat {
    pub x: f64,
    pub y: f64,
    pub z: f64,
    pub w: f64,
}

#[derive(Clone, Copy, Debug, Serialize, Deserialize)]
pub struct WireVec3 {
    pub x: f64,
    pub y: f64,
    pub z: f64,
}

#[derive(Clone, Copy, Debug, Serialize, Deserialize)]
pub struct WireState {
    pub x: f64,
    pub y: f64,
    pub z: f64,
    pub vx: f64,
    pub vy: f64,
    pub vz: f64,
    pub dt: f64,
}

impl WireQuat {
    /// nalgebra stores (w, i, j, k); the wire sends (x, y, z, w).
    pub fn narrow(&self) -> Quaternion<f32> {
        Quaternion::new(self.w as f32, self.x as f32, self.y as f32, self.z as f32)
    }
}

impl WireVec3 {
    pub fn narrow(&self) -> Vector3<f32> {
        Vector3::new(self.x as f32, self.y as f32, self.z as f32)
    }
}

// ─── Decoded, device-frame values ────────────────────────────────────────────

/// Raw IMU / optical-flow sample. Any subset may be present in one record.
#[derive(Clone, Debug, Default, PartialEq)]
pub struct SensorInput {
    pub quat: Option<Quaternion<f32>>,
    pub accel: Option<Vector3<f32>>,
    pub optical_flow: Option<Vector3<f32>>,
}

/// Kalman state as reported by the device, plus the step duration.
#[derive(Clone, Copy, Debug, PartialEq)]
pub struct StateSample {
    pub x: StateVec6,
    pub dt: f32,
}

impl StateSample {
    pub fn position(&self) -> Vector3<f32> {
        Vector3::new(self.x[0], self.x[1], self.x[2])
    }
}

impl From<WireState> for StateSample {
    fn from(s: WireState) -> Self {
        StateSample {
            x: StateVec6::new(
                s.x as f32,
                s.y as f32,
                s.z as f32,
                s.vx as f32,
                s.vy as f32,
                s.vz as f32,
            ),
            dt: s.dt as f32,
        }
    }
}

/// Latest value of every Kalman field the device has reported.
#[derive(Clone, Debug, PartialEq)]
pub struct KalmanSnapshot {
    pub x: StateVec6,
    pub p: CovarianceMat6,
    pub f: TransitionDiag6,
    pub k: GainMat3x6,
    pub yh: InnovationVec3,
}

impl Default for KalmanSnapshot {
    fn default() -> Self {
        Self {
            x: StateVec6::zeros(),
            p: CovarianceMat6::zeros(),
            f: TransitionDiag6::zeros(),
            k: GainMat3x6::zeros(),
            yh: InnovationVec3::zeros(),
        }
    }
}

// ─── Render-facing state ─────────────────────────────────────────────────────

/// Everything a render tick needs, already in the display frame.
#[derive(Clone, Debug, PartialEq)]
pub struct DisplayState {
    pub position: Vector3<f32>,
    pub orientation: UnitQuaternion<f32>,
    pub orientation_euler_deg: Vector3<f32>,
    pub linear_accel: Vector3<f32>,
    pub optical_flow: Vector3<f32>,
    pub kalman: KalmanSnapshot,
    pub predict_cpu: f32,
    pub update_cpu: f32,
    /// Device clock of the last state-bearing record, seconds.
    pub device_time_s: Option<f64>,
    pub records_applied: u64,
}

impl Default for DisplayState {
    fn default() -> Self {
        Self {
            position: Vector3::zeros(),
            orientation: UnitQuaternion::identity(),
            orientation_euler_deg: Vector3::zeros(),
            linear_accel: Vector3::zeros(),
            optical_flow: Vector3::zeros(),
            kalman: KalmanSnapshot::default(),
            predict_cpu: 0.0,
            update_cpu: 0.0,
            device_time_s: None,
            records_applied: 0,
        }
    }
}
