// config.rs: tunables for the connector pipeline
//
// Defaults reproduce the device firmware's published rates and the viewer's
// historical display constants. Everything can be overridden from a JSON file
// and, in the binary, from the command line.

use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use std::time::Duration;

use crate::error::{CResult, ConnectorError};

#[derive(Clone, Debug, Serialize, Deserialize)]
#[serde(default)]
pub struct ConnectorConfig {
    // ── Serial link ──
    pub baud_rate: u32,
    pub read_timeout_ms: u64,
    pub read_chunk_size: usize,
    /// Unterminated bytes kept while waiting for a newline.
    pub max_pending_bytes: usize,

    // ── Endpoint enumeration ──
    pub enumerate_retry_ms: u64,

    // ── Supervised reconnect ──
    pub reconnect_base_cooldown_ms: u64,
    pub reconnect_max_cooldown_ms: u64,
    pub reconnect_max_attempts: u32,

    // ── Apply pipeline ──
    pub line_queue_depth: usize,

    // ── Histories ──
    pub history_capacity: usize,
    pub display_length: usize,

    // ── Frame transform ──
    pub position_scale: f32,
    /// Added to the X Euler angle after conversion. Empirical; pending calibration review.
    pub euler_x_offset_deg: f32,

    // ── Device update rates (diagnostic CPU ratios) ──
    pub predict_rate_hz: f32,
    pub update_rate_hz: f32,

    // ── Session log ──
    pub log_dir: PathBuf,
    pub enable_session_log: bool,
}

impl Default for ConnectorConfig {
    fn default() -> Self {
        Self {
            baud_rate: 115_200,
            read_timeout_ms: 1_000,
            read_chunk_size: 1_024,
            max_pending_bytes: 64 * 1_024,
            enumerate_retry_ms: 1_000,
            reconnect_base_cooldown_ms: 1_000,
            reconnect_max_cooldown_ms: 30_000,
            reconnect_max_attempts: 60,
            line_queue_depth: 1_024,
            history_capacity: 2_000,
            display_length: 100,
            position_scale: 100.0,
            euler_x_offset_deg: 90.0,
            predict_rate_hz: 50.0,
            update_rate_hz: 10.0,
            log_dir: PathBuf::from("log"),
            enable_session_log: true,
        }
    }
}

impl ConnectorConfig {
    /// Load from a JSON file; missing keys keep their defaults.
    pub fn from_json_file(path: &Path) -> CResult<Self> {
        let text = std::fs::read_to_string(path).map_err(|e| {
            ConnectorError::Config(format!("cannot read {}: {}", path.display(), e))
        })?;
        Self::from_json_str(&text)
    }

    pub fn from_json_str(text: &str) -> CResult<Self> {
        let config: ConnectorConfig =
            serde_json::from_str(text).map_err(|e| ConnectorError::Config(e.to_string()))?;
        config.validate()?;
        Ok(config)
    }

    pub fn validate(&self) -> CResult<()> {
        if self.baud_rate == 0 {
            return Err(ConnectorError::Config("baud_rate must be > 0".into()));
        }
        if self.read_timeout_ms == 0 {
            return Err(ConnectorError::Config("read_timeout_ms must be > 0".into()));
        }
        if self.read_chunk_size == 0 {
            return Err(ConnectorError::Config("read_chunk_size must be > 0".into()));
        }
        if self.max_pending_bytes < self.read_chunk_size {
            return Err(ConnectorError::Config(
                "max_pending_bytes must be at least read_chunk_size".into(),
            ));
        }
        if self.line_queue_depth == 0 {
            return Err(ConnectorError::Config("line_queue_depth must be > 0".into()));
        }
        if self.history_capacity == 0 {
            return Err(ConnectorError::Config("history_capacity must be > 0".into()));
        }
        if self.display_length > self.history_capacity {
            return Err(ConnectorError::Config(format!(
                "display_length {} exceeds history_capacity {}",
                self.display_length, self.history_capacity
            )));
        }
        if !(self.position_scale.is_finite() && self.position_scale > 0.0) {
            return Err(ConnectorError::Config("position_scale must be > 0".into()));
        }
        if !(self.predict_rate_hz > 0.0 && self.update_rate_hz > 0.0) {
            return Err(ConnectorError::Config("update rates must be > 0".into()));
        }
        if self.reconnect_base_cooldown_ms > self.reconnect_max_cooldown_ms {
            return Err(ConnectorError::Config(
                "reconnect base cooldown exceeds max cooldown".into(),
            ));
        }
        Ok(())
    }

    pub fn read_timeout(&self) -> Duration {
        Duration::from_millis(self.read_timeout_ms)
    }

    pub fn enumerate_retry(&self) -> Duration {
        Duration::from_millis(self.enumerate_retry_ms)
    }
}
