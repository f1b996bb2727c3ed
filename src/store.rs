//! State Store
//!
//! Single current snapshot of everything decoded so far, plus the histories.
//! One `RwLock` covers both, so a render tick never sees half of an `apply`.

use nalgebra::Vector3;
use std::sync::{RwLock, RwLockReadGuard, RwLockWriteGuard};

use crate::config::ConnectorConfig;
use crate::decoder::DecodedRecord;
use crate::error::{CResult, ConnectorError};
use crate::history::{Histories, Signal};
use crate::transform::FrameTransform;
use crate::types::DisplayState;

struct StoreInner {
    display: DisplayState,
    histories: Histories,
    /// Device-frame position as last reported, before the offset.
    raw_position: Vector3<f32>,
    /// Display-only offset set by `zero_position`, device frame.
    position_offset: Vector3<f32>,
}

pub struct StateStore {
    inner: RwLock<StoreInner>,
    transform: FrameTransform,
    predict_rate_hz: f32,
    update_rate_hz: f32,
}

impl StateStore {
    pub fn new(config: &ConnectorConfig) -> Self {
        StateStore {
            inner: RwLock::new(StoreInner {
                display: DisplayState::default(),
                histories: Histories::new(config.history_capacity, config.display_length),
                raw_position: Vector3::zeros(),
                position_offset: Vector3::zeros(),
            }),
            transform: FrameTransform::from_config(config),
            predict_rate_hz: config.predict_rate_hz,
            update_rate_hz: config.update_rate_hz,
        }
    }

    pub fn transform(&self) -> &FrameTransform {
        &self.transform
    }

    fn write(&self) -> CResult<RwLockWriteGuard<'_, StoreInner>> {
        self.inner
            .write()
            .map_err(|_| ConnectorError::Internal("Failed to acquire state write lock".to_string()))
    }

    fn read(&self) -> CResult<RwLockReadGuard<'_, StoreInner>> {
        self.inner
            .read()
            .map_err(|_| ConnectorError::Internal("Failed to acquire state read lock".to_string()))
    }

    /// Apply one decoded record and push every history, as one critical section.
    /// Returns the resulting snapshot.
    pub fn apply(&self, record: &DecodedRecord) -> CResult<DisplayState> {
        // Transform outside the lock; only the publish step is serialized.
        let sensor = record.sensor.as_ref();
        let orientation = sensor.and_then(|s| s.quat).map(|q| {
            let display = self.transform.orientation(&q);
            (display, self.transform.orientation_euler_deg(&display))
        });
        let accel = sensor
            .and_then(|s| s.accel)
            .map(|a| self.transform.linear_accel(&a));
        let flow = sensor
            .and_then(|s| s.optical_flow)
            .map(|f| self.transform.optical_flow(&f));

        let mut inner = self.write()?;
        let StoreInner {
            display,
            histories,
            raw_position,
            position_offset,
        } = &mut *inner;

        if let Some((q, euler)) = orientation {
            display.orientation = q;
            display.orientation_euler_deg = euler;
        }
        if let Some(a) = accel {
            display.linear_accel = a;
        }
        if let Some(f) = flow {
            display.optical_flow = f;
        }

        if let Some(state) = record.state {
            display.kalman.x = state.x;
            *raw_position = state.position();
            display.position = self.transform.position(&(*raw_position + *position_offset));
            if record.is_predict_step() {
                display.predict_cpu = state.dt * self.predict_rate_hz;
            } else if record.is_update_step() {
                display.update_cpu = state.dt * self.update_rate_hz;
            }
            if let Some(micros) = record.micros {
                display.device_time_s = Some(micros / 1e6);
            }
        }

        if let Some(p) = record.covariance {
            display.kalman.p = p;
        }
        if let Some(f) = record.transition {
            display.kalman.f = f;
        }
        if let Some(k) = record.gain {
            display.kalman.k = k;
        }
        if let Some(yh) = record.innovation {
            display.kalman.yh = yh;
        }

        display.records_applied += 1;
        histories.push_all(
            display.linear_accel,
            display.orientation_euler_deg,
            display.optical_flow,
            display.position,
        );

        log::trace!(
            "applied record #{}: predict_cpu={:.2} update_cpu={:.2}",
            display.records_applied,
            display.predict_cpu,
            display.update_cpu
        );

        Ok(display.clone())
    }

    /// Make the current raw position the display origin.
    ///
    /// Only the display position changes; the Kalman state and the session
    /// log keep the device's values. The position trail restarts empty.
    pub fn zero_position(&self) -> CResult<Vector3<f32>> {
        let mut inner = self.write()?;
        inner.position_offset = -inner.raw_position;
        let shifted = inner.raw_position + inner.position_offset;
        inner.display.position = self.transform.position(&shifted);
        inner.histories.buffer_mut(Signal::Position).clear();
        log::info!(
            "Position zeroed at raw ({:.3}, {:.3}, {:.3})",
            inner.raw_position.x,
            inner.raw_position.y,
            inner.raw_position.z
        );
        Ok(inner.position_offset)
    }

    pub fn snapshot(&self) -> CResult<DisplayState> {
        Ok(self.read()?.display.clone())
    }

    pub fn history(&self, signal: Signal, count: usize) -> CResult<Vec<Vector3<f32>>> {
        Ok(self.read()?.histories.read(signal, count))
    }

    pub fn display_history(&self, signal: Signal) -> CResult<Vec<Vector3<f32>>> {
        Ok(self.read()?.histories.read_display(signal))
    }

    pub fn set_display_length(&self, length: usize) -> CResult<usize> {
        Ok(self.write()?.histories.set_display_length(length))
    }

    /// Consistent view of state and histories for one render tick.
    pub fn with_view<R>(&self, f: impl FnOnce(&DisplayState, &Histories) -> R) -> CResult<R> {
        let inner = self.read()?;
        Ok(f(&inner.display, &inner.histories))
    }
}
