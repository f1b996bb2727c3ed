//! Host-side ingest and display-state core for a serial-attached location device.
//!
//! The device streams newline-delimited JSON records (IMU quaternion, linear
//! acceleration, optical flow, Kalman state and diagnostics). A [`Connector`]
//! reads them off a serial endpoint, keeps the latest display-frame state and
//! per-signal histories, and writes a CSV log per session.

pub mod config;
pub mod connector;
pub mod decoder;
pub mod endpoint;
pub mod error;
pub mod framer;
pub mod history;
pub mod live_status;
pub mod metrics;
pub mod restart_manager;
pub mod session_log;
pub mod store;
pub mod transform;
pub mod types;

pub use config::ConnectorConfig;
pub use connector::{Connector, ConnectorEvent, LinkState};
pub use endpoint::{PortProvider, SerialPorts};
pub use error::{CResult, ConnectorError, DecodeError};
pub use history::Signal;
pub use types::DisplayState;
