//! Linear algebra type system for the connector
//!
//! Fixed-size aliases for the quantities the device's Kalman filter emits.
//! Everything is stored in `f32`; the wire carries `f64` and is narrowed on decode.

use nalgebra::{SMatrix, SVector};

// ===== Dimensions =====
pub const STATE_DIM: usize = 6; // (x, y, z, vx, vy, vz)
pub const MEASURE_DIM: usize = 3; // optical-flow position fix

// ===== Flattened wire lengths (row-major) =====
pub const COVARIANCE_LEN: usize = STATE_DIM * STATE_DIM; // 36
pub const GAIN_LEN: usize = MEASURE_DIM * STATE_DIM; // 18

// ===== Kalman quantities =====
pub type StateVec6 = SVector<f32, STATE_DIM>;
pub type CovarianceMat6 = SMatrix<f32, STATE_DIM, STATE_DIM>;
pub type TransitionDiag6 = SVector<f32, STATE_DIM>;
pub type GainMat3x6 = SMatrix<f32, MEASURE_DIM, STATE_DIM>; // 3×6
pub type InnovationVec3 = SVector<f32, MEASURE_DIM>;
