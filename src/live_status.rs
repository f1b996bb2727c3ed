use serde::{Deserialize, Serialize};
use std::fs;
use std::path::Path;

use crate::connector::LinkState;
use crate::metrics::MetricsSnapshot;
use crate::types::DisplayState;

/// Flat JSON view of the latest display state, for external dashboards.
#[derive(Serialize, Deserialize, Clone, Debug, PartialEq)]
pub struct LiveStatus {
    pub timestamp: String,
    pub endpoint: Option<String>,
    pub link: LinkState,
    // Display frame
    pub position: [f32; 3],
    /// x, y, z, w
    pub orientation: [f32; 4],
    pub orientation_euler_deg: [f32; 3],
    pub linear_accel: [f32; 3],
    pub optical_flow: [f32; 3],
    // Device filter
    pub kalman_x: [f32; 6],
    pub predict_cpu: f32,
    pub update_cpu: f32,
    pub device_time_s: Option<f64>,
    // Ingest
    pub metrics: MetricsSnapshot,
}

impl LiveStatus {
    pub fn new(
        state: &DisplayState,
        metrics: MetricsSnapshot,
        endpoint: Option<String>,
        link: LinkState,
    ) -> Self {
        let q = state.orientation.quaternion();
        let mut kalman_x = [0.0; 6];
        kalman_x.copy_from_slice(state.kalman.x.as_slice());
        Self {
            timestamp: current_timestamp(),
            endpoint,
            link,
            position: state.position.into(),
            orientation: [q.i, q.j, q.k, q.w],
            orientation_euler_deg: state.orientation_euler_deg.into(),
            linear_accel: state.linear_accel.into(),
            optical_flow: state.optical_flow.into(),
            kalman_x,
            predict_cpu: state.predict_cpu,
            update_cpu: state.update_cpu,
            device_time_s: state.device_time_s,
            metrics,
        }
    }

    /// Write via a sibling temp file so readers never see a half-written file.
    pub fn save(&self, path: &Path) -> std::io::Result<()> {
        let json = serde_json::to_string_pretty(self)?;
        let tmp = path.with_extension("json.tmp");
        fs::write(&tmp, json)?;
        fs::rename(&tmp, path)?;
        Ok(())
    }
}

pub fn current_timestamp() -> String {
    chrono::Local::now().to_rfc3339()
}

#[cfg(test)]
mod tests {
    use super::*;
    use nalgebra::Vector3;

    #[test]
    fn test_status_from_state() {
        let mut state = DisplayState::default();
        state.position = Vector3::new(1.0, -2.0, 3.0);
        state.kalman.x[4] = 0.25;
        let status = LiveStatus::new(&state, MetricsSnapshot::default(), Some("mem0".into()), LinkState::Connected);

        assert_eq!(status.position, [1.0, -2.0, 3.0]);
        assert_eq!(status.orientation, [0.0, 0.0, 0.0, 1.0]);
        assert_eq!(status.kalman_x[4], 0.25);
        assert_eq!(status.link, LinkState::Connected);
    }

    #[test]
    fn test_save_writes_json() {
        let path = std::env::temp_dir().join(format!("locationcore_status_{}.json", std::process::id()));
        let status = LiveStatus::new(&DisplayState::default(), MetricsSnapshot::default(), None, LinkState::Idle);
        status.save(&path).unwrap();

        let text = fs::read_to_string(&path).unwrap();
        let back: LiveStatus = serde_json::from_str(&text).unwrap();
        assert_eq!(back.link, LinkState::Idle);
        assert_eq!(back.endpoint, None);
        fs::remove_file(&path).ok();
    }
}
