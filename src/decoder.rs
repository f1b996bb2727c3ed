//! Record decoder
//!
//! One input line is one JSON object. Known top-level keys are pulled out
//! independently: a broken `K` does not cost us the `state` in the same line.

use serde::de::DeserializeOwned;
use serde_json::{Map, Value};

use crate::error::DecodeError;
use crate::types::{
    CovarianceMat6, GainMat3x6, InnovationVec3, SensorInput, StateSample, TransitionDiag6,
    WireQuat, WireState, WireVec3, COVARIANCE_LEN, GAIN_LEN, MEASURE_DIM, STATE_DIM,
};

/// Parsed but not yet interpreted document; discarded after extraction.
pub type RawRecord = Map<String, Value>;

pub const KEY_SENSOR_INPUT: &str = "sensor_input";
pub const KEY_STATE: &str = "state";
pub const KEY_MICROS: &str = "micros";
pub const KEY_COVARIANCE: &str = "P";
pub const KEY_TRANSITION: &str = "f";
pub const KEY_GAIN: &str = "K";
pub const KEY_INNOVATION: &str = "y-h";

/// Typed view of one record. `None` means "not reported in this record".
#[derive(Clone, Debug, Default, PartialEq)]
pub struct DecodedRecord {
    pub sensor: Option<SensorInput>,
    pub state: Option<StateSample>,
    pub micros: Option<f64>,
    pub covariance: Option<CovarianceMat6>,
    pub transition: Option<TransitionDiag6>,
    pub gain: Option<GainMat3x6>,
    pub innovation: Option<InnovationVec3>,
    /// Sub-fields that were present but could not be decoded.
    pub errors: Vec<DecodeError>,
}

impl DecodedRecord {
    /// Predict-step messages carry the transition diagonal.
    pub fn is_predict_step(&self) -> bool {
        self.transition.is_some()
    }

    /// Measurement-update messages carry the innovation.
    pub fn is_update_step(&self) -> bool {
        !self.is_predict_step() && self.innovation.is_some()
    }

    pub fn is_empty(&self) -> bool {
        self.sensor.is_none()
            && self.state.is_none()
            && self.micros.is_none()
            && self.covariance.is_none()
            && self.transition.is_none()
            && self.gain.is_none()
            && self.innovation.is_none()
    }
}

/// Parse a line into a raw document.
pub fn decode(line: &str) -> Result<RawRecord, DecodeError> {
    let value: Value =
        serde_json::from_str(line.trim()).map_err(|e| DecodeError::Malformed(e.to_string()))?;
    match value {
        Value::Object(map) => Ok(map),
        _ => Err(DecodeError::NotAnObject),
    }
}

/// Parse and extract in one go. Only a malformed document is an error here;
/// sub-field failures are collected in [`DecodedRecord::errors`].
pub fn decode_line(line: &str) -> Result<DecodedRecord, DecodeError> {
    decode(line).map(|raw| extract(&raw))
}

/// Pull every known field out of a raw document.
pub fn extract(raw: &RawRecord) -> DecodedRecord {
    let mut out = DecodedRecord::default();
    let mut errors = Vec::new();

    if let Some(value) = present(raw, KEY_SENSOR_INPUT) {
        out.sensor = extract_sensor_input(value, &mut errors);
    }

    out.state = keep(
        typed_field::<WireState>(raw, KEY_STATE).map(|r| {
            r.map(StateSample::from).and_then(|s| {
                require_finite(KEY_STATE, s.x.as_slice())?;
                require_finite(KEY_STATE, &[s.dt])?;
                Ok(s)
            })
        }),
        &mut errors,
    );
    out.micros = keep(typed_field::<f64>(raw, KEY_MICROS), &mut errors);

    out.covariance = keep(
        array_field(raw, KEY_COVARIANCE, COVARIANCE_LEN)
            .map(|r| r.map(|v| CovarianceMat6::from_row_slice(&v))),
        &mut errors,
    );
    out.transition = keep(
        array_field(raw, KEY_TRANSITION, STATE_DIM)
            .map(|r| r.map(|v| TransitionDiag6::from_column_slice(&v))),
        &mut errors,
    );
    out.gain = keep(
        array_field(raw, KEY_GAIN, GAIN_LEN).map(|r| r.map(|v| GainMat3x6::from_row_slice(&v))),
        &mut errors,
    );
    out.innovation = keep(
        array_field(raw, KEY_INNOVATION, MEASURE_DIM)
            .map(|r| r.map(|v| InnovationVec3::from_column_slice(&v))),
        &mut errors,
    );

    out.errors = errors;
    out
}

fn extract_sensor_input(value: &Value, errors: &mut Vec<DecodeError>) -> Option<SensorInput> {
    let Some(map) = value.as_object() else {
        errors.push(DecodeError::InvalidField {
            field: KEY_SENSOR_INPUT,
            reason: "expected an object".to_string(),
        });
        return None;
    };

    let quat = keep(
        typed_field::<WireQuat>(map, "quat").map(|r| {
            r.map_err(|e| rename(e, "sensor_input.quat")).and_then(|q| {
                let q = q.narrow();
                require_finite("sensor_input.quat", q.coords.as_slice())?;
                if q.norm() > f32::EPSILON {
                    Ok(q)
                } else {
                    Err(DecodeError::InvalidField {
                        field: "sensor_input.quat",
                        reason: "zero-norm quaternion".to_string(),
                    })
                }
            })
        }),
        errors,
    );
    let accel = keep(
        typed_field::<WireVec3>(map, "accel").map(|r| {
            r.map_err(|e| rename(e, "sensor_input.accel")).and_then(|v| {
                let v = v.narrow();
                require_finite("sensor_input.accel", v.as_slice())?;
                Ok(v)
            })
        }),
        errors,
    );
    let optical_flow = keep(
        typed_field::<WireVec3>(map, "of").map(|r| {
            r.map_err(|e| rename(e, "sensor_input.of")).and_then(|v| {
                let v = v.narrow();
                require_finite("sensor_input.of", v.as_slice())?;
                Ok(v)
            })
        }),
        errors,
    );

    Some(SensorInput {
        quat,
        accel,
        optical_flow,
    })
}

/// A key counts as absent when missing or explicitly `null`.
fn present<'a>(raw: &'a RawRecord, key: &str) -> Option<&'a Value> {
    raw.get(key).filter(|v| !v.is_null())
}

fn typed_field<T: DeserializeOwned>(
    raw: &RawRecord,
    key: &'static str,
) -> Option<Result<T, DecodeError>> {
    present(raw, key).map(|value| {
        T::deserialize(value).map_err(|e| DecodeError::InvalidField {
            field: key,
            reason: e.to_string(),
        })
    })
}

/// Flattened numeric array of at least `expected` elements, narrowed to f32.
/// Trailing extras are ignored.
fn array_field(
    raw: &RawRecord,
    key: &'static str,
    expected: usize,
) -> Option<Result<Vec<f32>, DecodeError>> {
    present(raw, key).map(|value| {
        let items = value.as_array().ok_or_else(|| DecodeError::InvalidField {
            field: key,
            reason: "expected an array".to_string(),
        })?;
        if items.len() < expected {
            return Err(DecodeError::Length {
                field: key,
                expected,
                found: items.len(),
            });
        }
        items
            .iter()
            .take(expected)
            .enumerate()
            .map(|(i, item)| {
                let v = item.as_f64().map(|v| v as f32).ok_or_else(|| {
                    DecodeError::InvalidField {
                        field: key,
                        reason: format!("element {} is not a number", i),
                    }
                })?;
                if !v.is_finite() {
                    return Err(DecodeError::InvalidField {
                        field: key,
                        reason: format!("element {} is out of f32 range", i),
                    });
                }
                Ok(v)
            })
            .collect()
    })
}

/// Values beyond f32 range narrow to infinity; those never reach the store.
fn require_finite(field: &'static str, values: &[f32]) -> Result<(), DecodeError> {
    if values.iter().all(|v| v.is_finite()) {
        Ok(())
    } else {
        Err(DecodeError::InvalidField {
            field,
            reason: "value out of f32 range".to_string(),
        })
    }
}

fn keep<T>(result: Option<Result<T, DecodeError>>, errors: &mut Vec<DecodeError>) -> Option<T> {
    match result? {
        Ok(value) => Some(value),
        Err(err) => {
            errors.push(err);
            None
        }
    }
}

fn rename(err: DecodeError, field: &'static str) -> DecodeError {
    match err {
        DecodeError::InvalidField { reason, .. } => DecodeError::InvalidField { field, reason },
        other => other,
    }
}
