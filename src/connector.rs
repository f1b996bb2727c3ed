//! Connector
//!
//! Owns the State Store and drives ingestion for one endpoint at a time.
//!
//! Threads per connection:
//! - supervisor/reader: opens the endpoint, frames lines and queues them;
//!   on a transport error it re-opens the same endpoint with backoff.
//! - apply worker: decodes, applies and logs queued lines strictly in
//!   receive order. A panic while handling one line is contained there.
//!
//! Consumers only ever take read snapshots; nothing here blocks on them.

use crossbeam::channel::{self, Receiver, Sender, TrySendError};
use nalgebra::Vector3;
use serde::{Deserialize, Serialize};
use std::panic::{self, AssertUnwindSafe};
use std::path::PathBuf;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex, RwLock};
use std::thread::{self, JoinHandle};
use std::time::{Duration, Instant};

use crate::config::ConnectorConfig;
use crate::decoder::{decode_line, DecodedRecord};
use crate::endpoint::{self, ByteStream, PortProvider};
use crate::error::{CResult, ConnectorError, DecodeError};
use crate::framer::LineFramer;
use crate::history::{Histories, Signal};
use crate::metrics::{IngestMetrics, MetricsSnapshot};
use crate::restart_manager::RestartState;
use crate::session_log::SessionLogger;
use crate::store::StateStore;
use crate::types::DisplayState;

const EVENT_QUEUE_DEPTH: usize = 256;
/// Granularity of interruptible sleeps during reconnect backoff.
const STOP_POLL: Duration = Duration::from_millis(20);

/// Notifications for the consumer's log/notification panel.
#[derive(Clone, Debug, PartialEq)]
pub enum ConnectorEvent {
    SessionStarted { path: PathBuf },
    Connected { endpoint: String },
    Disconnected { endpoint: String, reason: String },
    Reconnecting { endpoint: String, attempt: u32, wait: Duration },
    GaveUp { endpoint: String, attempts: u32 },
    DecodeFailed { error: DecodeError },
    LogWriteFailed { reason: String },
}

#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub enum LinkState {
    Idle,
    Connected,
    Reconnecting,
    GaveUp,
}

pub type UpdateCallback = Arc<dyn Fn(&DisplayState) + Send + Sync>;

struct Shared {
    config: ConnectorConfig,
    store: StateStore,
    metrics: IngestMetrics,
    events: Sender<ConnectorEvent>,
    callback: RwLock<Option<UpdateCallback>>,
    link: Mutex<LinkState>,
}

impl Shared {
    fn emit(&self, event: ConnectorEvent) {
        match self.events.try_send(event) {
            Ok(()) => {}
            Err(TrySendError::Full(event)) => {
                log::debug!("Event queue full, dropping {:?}", event);
            }
            Err(TrySendError::Disconnected(_)) => {}
        }
    }

    fn set_link(&self, state: LinkState) {
        if let Ok(mut link) = self.link.lock() {
            *link = state;
        }
    }
}

struct ActiveConnection {
    endpoint: String,
    stop: Arc<AtomicBool>,
    supervisor: JoinHandle<()>,
    worker: JoinHandle<()>,
}

pub struct Connector {
    shared: Arc<Shared>,
    provider: Arc<dyn PortProvider>,
    events_rx: Receiver<ConnectorEvent>,
    /// Held for the whole of `connect`/`disconnect` so at most one reader
    /// and one apply worker ever exist.
    lifecycle: Mutex<()>,
    active: Mutex<Option<ActiveConnection>>,
}

impl Connector {
    pub fn new(config: ConnectorConfig, provider: Arc<dyn PortProvider>) -> CResult<Self> {
        config.validate()?;
        let (events_tx, events_rx) = channel::bounded(EVENT_QUEUE_DEPTH);
        let shared = Shared {
            store: StateStore::new(&config),
            metrics: IngestMetrics::new(),
            events: events_tx,
            callback: RwLock::new(None),
            link: Mutex::new(LinkState::Idle),
            config,
        };
        Ok(Connector {
            shared: Arc::new(shared),
            provider,
            events_rx,
            lifecycle: Mutex::new(()),
            active: Mutex::new(None),
        })
    }

    pub fn config(&self) -> &ConnectorConfig {
        &self.shared.config
    }

    /// Available endpoints; waits until at least one exists.
    pub fn list_endpoints(&self) -> CResult<Vec<String>> {
        endpoint::list_endpoints(self.provider.as_ref(), self.shared.config.enumerate_retry())
    }

    /// Open `endpoint` and start a new session on it.
    ///
    /// Any current connection is shut down first. Failing to open the
    /// endpoint is returned directly; later transport failures are handled
    /// by reconnecting in the background.
    pub fn connect(&self, endpoint: &str) -> CResult<()> {
        let _lifecycle = self.lifecycle_guard()?;
        self.shutdown_active()?;

        let stream = self.provider.open(endpoint)?;
        let shared = &self.shared;
        let logger = start_session_log(shared);

        let (line_tx, line_rx) = channel::bounded::<String>(shared.config.line_queue_depth);
        let stop = Arc::new(AtomicBool::new(false));

        let worker = {
            let shared = shared.clone();
            thread::Builder::new()
                .name("apply-worker".to_string())
                .spawn(move || apply_loop(&shared, line_rx, logger))
                .map_err(|e| ConnectorError::Internal(format!("cannot spawn apply worker: {}", e)))?
        };

        let supervisor = {
            let shared = shared.clone();
            let provider = self.provider.clone();
            let stop = stop.clone();
            let endpoint = endpoint.to_string();
            thread::Builder::new()
                .name(format!("reader-{}", endpoint))
                .spawn(move || supervise(&shared, provider.as_ref(), &endpoint, stream, &line_tx, &stop))
                .map_err(|e| ConnectorError::Internal(format!("cannot spawn reader: {}", e)))?
        };

        let mut active = self.active_slot()?;
        *active = Some(ActiveConnection {
            endpoint: endpoint.to_string(),
            stop,
            supervisor,
            worker,
        });
        Ok(())
    }

    /// Stop reading and wait until every queued line has been applied.
    /// The last known state stays in the store.
    pub fn disconnect(&self) -> CResult<()> {
        let _lifecycle = self.lifecycle_guard()?;
        self.shutdown_active()
    }

    fn shutdown_active(&self) -> CResult<()> {
        let Some(conn) = self.active_slot()?.take() else {
            return Ok(());
        };
        conn.stop.store(true, Ordering::SeqCst);
        if conn.supervisor.join().is_err() {
            log::error!("Reader thread for {} panicked", conn.endpoint);
        }
        if conn.worker.join().is_err() {
            log::error!("Apply worker for {} panicked", conn.endpoint);
        }
        self.shared.set_link(LinkState::Idle);
        log::info!("Disconnected from {}", conn.endpoint);
        Ok(())
    }

    /// Endpoint of the current connection, if any.
    pub fn endpoint(&self) -> Option<String> {
        self.active
            .lock()
            .ok()
            .and_then(|a| a.as_ref().map(|c| c.endpoint.clone()))
    }

    pub fn link_state(&self) -> LinkState {
        self.shared
            .link
            .lock()
            .map(|l| *l)
            .unwrap_or(LinkState::Idle)
    }

    pub fn snapshot(&self) -> CResult<DisplayState> {
        self.shared.store.snapshot()
    }

    pub fn history(&self, signal: Signal, count: usize) -> CResult<Vec<Vector3<f32>>> {
        self.shared.store.history(signal, count)
    }

    pub fn display_history(&self, signal: Signal) -> CResult<Vec<Vector3<f32>>> {
        self.shared.store.display_history(signal)
    }

    pub fn set_display_length(&self, length: usize) -> CResult<usize> {
        self.shared.store.set_display_length(length)
    }

    pub fn with_view<R>(&self, f: impl FnOnce(&DisplayState, &Histories) -> R) -> CResult<R> {
        self.shared.store.with_view(f)
    }

    pub fn zero_position(&self) -> CResult<Vector3<f32>> {
        self.shared.store.zero_position()
    }

    pub fn metrics(&self) -> MetricsSnapshot {
        self.shared.metrics.snapshot()
    }

    /// Event stream. Every clone competes for the same events.
    pub fn events(&self) -> Receiver<ConnectorEvent> {
        self.events_rx.clone()
    }

    /// Called on the apply worker after each applied record.
    pub fn set_update_callback(&self, callback: impl Fn(&DisplayState) + Send + Sync + 'static) {
        if let Ok(mut slot) = self.shared.callback.write() {
            *slot = Some(Arc::new(callback));
        }
    }

    pub fn clear_update_callback(&self) {
        if let Ok(mut slot) = self.shared.callback.write() {
            *slot = None;
        }
    }

    fn lifecycle_guard(&self) -> CResult<std::sync::MutexGuard<'_, ()>> {
        self.lifecycle
            .lock()
            .map_err(|_| ConnectorError::Internal("Failed to acquire lifecycle lock".to_string()))
    }

    fn active_slot(&self) -> CResult<std::sync::MutexGuard<'_, Option<ActiveConnection>>> {
        self.active
            .lock()
            .map_err(|_| ConnectorError::Internal("Failed to acquire connection lock".to_string()))
    }
}

impl Drop for Connector {
    fn drop(&mut self) {
        if let Err(e) = self.disconnect() {
            log::error!("Shutdown failed: {}", e);
        }
    }
}

fn start_session_log(shared: &Shared) -> Option<SessionLogger> {
    let config = &shared.config;
    if !config.enable_session_log {
        return None;
    }
    match SessionLogger::start(
        &config.log_dir,
        chrono::Local::now(),
        config.predict_rate_hz,
        config.update_rate_hz,
    ) {
        Ok(logger) => {
            shared.emit(ConnectorEvent::SessionStarted {
                path: logger.path().to_path_buf(),
            });
            Some(logger)
        }
        Err(e) => {
            log::warn!("Session log unavailable, continuing without it: {}", e);
            shared.metrics.log_failed();
            shared.emit(ConnectorEvent::LogWriteFailed {
                reason: e.to_string(),
            });
            None
        }
    }
}

/// Reader loop with supervised reconnect. Returns when stopped or when the
/// endpoint cannot be re-opened within the attempt budget.
fn supervise(
    shared: &Shared,
    provider: &dyn PortProvider,
    endpoint: &str,
    first: ByteStream,
    lines: &Sender<String>,
    stop: &AtomicBool,
) {
    let config = &shared.config;
    let mut restart = RestartState::from_config(endpoint, config);
    let mut stream = Some(first);

    while !stop.load(Ordering::SeqCst) {
        let reader = match stream.take() {
            Some(s) => s,
            None => match provider.open(endpoint) {
                Ok(s) => s,
                Err(e) => {
                    log::error!("Reopen of {} failed: {}", endpoint, e);
                    if !backoff(shared, &mut restart, stop) {
                        break;
                    }
                    continue;
                }
            },
        };

        restart.record_success();
        shared.set_link(LinkState::Connected);
        shared.emit(ConnectorEvent::Connected {
            endpoint: endpoint.to_string(),
        });
        log::info!("Connected to {}", endpoint);

        let mut framer = LineFramer::new(reader, endpoint, config.read_chunk_size, config.max_pending_bytes);
        let result = read_until_error(shared, &mut framer, lines, stop);

        if let Err(e) = result {
            if !e.is_fatal_to_connection() {
                log::error!("Reader for {} stopping: {}", endpoint, e);
                break;
            }
            log::error!("{}", e);
            shared.metrics.transport_failed();
            shared.emit(ConnectorEvent::Disconnected {
                endpoint: endpoint.to_string(),
                reason: e.to_string(),
            });
            if !backoff(shared, &mut restart, stop) {
                break;
            }
        }
    }
}

fn read_until_error<R: std::io::Read>(
    shared: &Shared,
    framer: &mut LineFramer<R>,
    lines: &Sender<String>,
    stop: &AtomicBool,
) -> CResult<()> {
    while !stop.load(Ordering::SeqCst) {
        let mut closed = false;
        framer.poll(|line| {
            shared.metrics.line_received();
            if lines.send(line).is_err() {
                closed = true;
            }
        })?;
        if closed {
            return Err(ConnectorError::Internal("apply worker is gone".to_string()));
        }
    }
    Ok(())
}

/// Wait out the next cooldown. False means give up (budget spent or stopped).
fn backoff(shared: &Shared, restart: &mut RestartState, stop: &AtomicBool) -> bool {
    if !restart.can_restart() {
        log::error!("Giving up on {}", restart.status());
        shared.set_link(LinkState::GaveUp);
        shared.emit(ConnectorEvent::GaveUp {
            endpoint: restart.endpoint.clone(),
            attempts: restart.attempts,
        });
        return false;
    }
    let wait = restart.record_failed_attempt();
    shared.set_link(LinkState::Reconnecting);
    shared.emit(ConnectorEvent::Reconnecting {
        endpoint: restart.endpoint.clone(),
        attempt: restart.attempts,
        wait,
    });
    sleep_unless_stopped(wait, stop)
}

fn sleep_unless_stopped(wait: Duration, stop: &AtomicBool) -> bool {
    let deadline = Instant::now() + wait;
    loop {
        if stop.load(Ordering::SeqCst) {
            return false;
        }
        let now = Instant::now();
        if now >= deadline {
            return true;
        }
        thread::sleep(STOP_POLL.min(deadline - now));
    }
}

/// Drains the line queue until every sender is gone.
fn apply_loop(shared: &Shared, lines: Receiver<String>, mut logger: Option<SessionLogger>) {
    for line in lines {
        let outcome = panic::catch_unwind(AssertUnwindSafe(|| {
            handle_line(shared, &mut logger, &line)
        }));
        match outcome {
            Ok(Ok(())) => {}
            Ok(Err(e)) => log::error!("Apply failed: {}", e),
            Err(_) => log::error!("Panic while applying record, skipped: {:.80}", line),
        }
    }
    if let Some(logger) = logger {
        log::info!(
            "Session log closed: {} ({} rows)",
            logger.path().display(),
            logger.rows_written()
        );
    }
}

fn handle_line(shared: &Shared, logger: &mut Option<SessionLogger>, line: &str) -> CResult<()> {
    let record = match decode_line(line) {
        Ok(r) => r,
        Err(e) => {
            report_decode_failure(shared, e);
            return Ok(());
        }
    };
    for e in &record.errors {
        report_decode_failure(shared, e.clone());
    }
    if record.is_empty() {
        return Ok(());
    }

    let snapshot = shared.store.apply(&record)?;
    shared.metrics.record_applied();
    append_log_row(shared, logger, &record);

    let callback = shared.callback.read().ok().and_then(|c| c.clone());
    if let Some(callback) = callback {
        callback(&snapshot);
    }
    Ok(())
}

fn report_decode_failure(shared: &Shared, error: DecodeError) {
    log::warn!("Dropped input: {}", error);
    shared.metrics.decode_failed();
    shared.emit(ConnectorEvent::DecodeFailed { error });
}

fn append_log_row(shared: &Shared, logger: &mut Option<SessionLogger>, record: &DecodedRecord) {
    let Some(log) = logger.as_mut() else {
        return;
    };
    if let Err(e) = log.append(record) {
        log::warn!("Log write failed: {}", e);
        shared.metrics.log_failed();
        shared.emit(ConnectorEvent::LogWriteFailed {
            reason: e.to_string(),
        });
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::VecDeque;
    use std::fs;
    use std::io::Cursor;
    use std::io::{self, Read};
    use std::sync::atomic::AtomicUsize;
    use std::sync::Barrier;
    use std::time::{SystemTime, UNIX_EPOCH};

    /// Hands out one scripted stream per open; once empty, opens fail.
    struct MemoryPorts {
        streams: Mutex<VecDeque<Vec<u8>>>,
        opens: AtomicUsize,
    }

    impl MemoryPorts {
        fn new(streams: Vec<&str>) -> Arc<Self> {
            Arc::new(MemoryPorts {
                streams: Mutex::new(streams.into_iter().map(|s| s.as_bytes().to_vec()).collect()),
                opens: AtomicUsize::new(0),
            })
        }
    }

    impl PortProvider for MemoryPorts {
        fn available(&self) -> CResult<Vec<String>> {
            Ok(vec!["mem0".to_string()])
        }

        fn open(&self, endpoint: &str) -> CResult<ByteStream> {
            self.opens.fetch_add(1, Ordering::SeqCst);
            match self.streams.lock().unwrap().pop_front() {
                Some(bytes) => Ok(Box::new(Cursor::new(bytes))),
                None => Err(ConnectorError::transport(endpoint, "no such device")),
            }
        }
    }

    /// A link that never ends: every read times out after a short wait.
    struct QuietLink(Arc<AtomicUsize>);

    impl Read for QuietLink {
        fn read(&mut self, _buf: &mut [u8]) -> io::Result<usize> {
            self.0.fetch_add(1, Ordering::SeqCst);
            thread::sleep(Duration::from_millis(2));
            Err(io::Error::new(io::ErrorKind::TimedOut, "no data"))
        }
    }

    struct QuietPorts {
        reads: Arc<AtomicUsize>,
    }

    impl PortProvider for QuietPorts {
        fn available(&self) -> CResult<Vec<String>> {
            Ok(vec!["quiet0".to_string()])
        }

        fn open(&self, _endpoint: &str) -> CResult<ByteStream> {
            Ok(Box::new(QuietLink(self.reads.clone())))
        }
    }

    fn scratch_dir(tag: &str) -> PathBuf {
        let nanos = SystemTime::now()
            .duration_since(UNIX_EPOCH)
            .unwrap_or_default()
            .as_nanos();
        std::env::temp_dir().join(format!(
            "locationcore_conn_{}_{}_{}",
            tag,
            std::process::id(),
            nanos
        ))
    }

    fn config(log_dir: PathBuf) -> ConnectorConfig {
        ConnectorConfig {
            reconnect_base_cooldown_ms: 1,
            reconnect_max_cooldown_ms: 2,
            reconnect_max_attempts: 2,
            history_capacity: 32,
            display_length: 16,
            log_dir,
            ..ConnectorConfig::default()
        }
    }

    /// Collect events until one matches `done` (or time runs out).
    fn wait_for(rx: &Receiver<ConnectorEvent>, done: impl Fn(&ConnectorEvent) -> bool) -> Vec<ConnectorEvent> {
        let mut seen = Vec::new();
        while let Ok(event) = rx.recv_timeout(Duration::from_secs(5)) {
            let finished = done(&event);
            seen.push(event);
            if finished {
                break;
            }
        }
        seen
    }

    fn gave_up(e: &ConnectorEvent) -> bool {
        matches!(e, ConnectorEvent::GaveUp { .. })
    }

    const ACCEL: &str = r#"{"sensor_input": {"accel": {"x": 0.0, "y": 0.0, "z": 9.8}}}"#;
    const STATE: &str = r#"{"sensor_input": {"quat": {"x": 0, "y": 0, "z": 0, "w": 1}}, "state": {"x": 1, "y": 2, "z": 3, "vx": 0, "vy": 0, "vz": 0, "dt": 0.02}, "f": [1, 1, 1, 1, 1, 1], "micros": 1000}"#;

    #[test]
    fn test_pipeline_applies_logs_and_skips_malformed() {
        let dir = scratch_dir("pipeline");
        let stream = format!("{}\n{{not json\n{}\n", ACCEL, STATE);
        let connector = Connector::new(config(dir.clone()), MemoryPorts::new(vec![stream.as_str()])).unwrap();
        let events = connector.events();

        connector.connect("mem0").unwrap();
        let seen = wait_for(&events, gave_up);
        connector.disconnect().unwrap();

        assert!(seen.iter().any(|e| matches!(e, ConnectorEvent::SessionStarted { .. })));
        assert!(seen.iter().any(|e| matches!(e, ConnectorEvent::Connected { .. })));
        assert!(seen
            .iter()
            .any(|e| matches!(e, ConnectorEvent::DecodeFailed { error: DecodeError::Malformed(_) })));

        let snap = connector.snapshot().unwrap();
        assert_eq!(snap.records_applied, 2);
        assert_eq!(snap.kalman.x[0], 1.0);
        assert!(snap.linear_accel.norm() > 9.0);

        let m = connector.metrics();
        assert_eq!(m.lines_received, 3);
        assert_eq!(m.records_applied, 2);
        assert_eq!(m.decode_failures, 1);
        assert_eq!(connector.history(Signal::LinearAccel, 32).unwrap().len(), 2);

        let files: Vec<_> = fs::read_dir(&dir).unwrap().collect();
        assert_eq!(files.len(), 1);
        let text = fs::read_to_string(files[0].as_ref().unwrap().path()).unwrap();
        assert_eq!(text.lines().count(), 2);
        fs::remove_dir_all(&dir).ok();
    }

    #[test]
    fn test_reconnects_after_transport_error() {
        let dir = scratch_dir("reconnect");
        let first = format!("{}\n", ACCEL);
        let second = format!("{}\n", STATE);
        let ports = MemoryPorts::new(vec![first.as_str(), second.as_str()]);
        let connector = Connector::new(config(dir.clone()), ports.clone()).unwrap();
        let events = connector.events();

        connector.connect("mem0").unwrap();
        let seen = wait_for(&events, gave_up);
        connector.disconnect().unwrap();

        let connects = seen
            .iter()
            .filter(|e| matches!(e, ConnectorEvent::Connected { .. }))
            .count();
        assert_eq!(connects, 2);
        assert!(seen.iter().any(|e| matches!(e, ConnectorEvent::Reconnecting { .. })));
        // Both streams landed in the same session log.
        assert_eq!(fs::read_dir(&dir).unwrap().count(), 1);
        assert_eq!(connector.snapshot().unwrap().records_applied, 2);
        // 2 streams + 2 failed reopens.
        assert_eq!(ports.opens.load(Ordering::SeqCst), 4);
        assert_eq!(connector.link_state(), LinkState::Idle);
        fs::remove_dir_all(&dir).ok();
    }

    #[test]
    fn test_initial_open_failure_is_returned() {
        let dir = scratch_dir("noopen");
        let connector = Connector::new(config(dir.clone()), MemoryPorts::new(vec![])).unwrap();
        let err = connector.connect("mem0").unwrap_err();
        assert!(matches!(err, ConnectorError::Transport { .. }));
        assert!(connector.endpoint().is_none());
        assert!(!dir.exists());
    }

    #[test]
    fn test_callback_runs_per_record_and_panics_are_contained() {
        let dir = scratch_dir("callback");
        let stream = format!("{}\n{}\n{}\n", ACCEL, STATE, ACCEL);
        let connector = Connector::new(config(dir.clone()), MemoryPorts::new(vec![stream.as_str()])).unwrap();
        let calls = Arc::new(AtomicUsize::new(0));
        {
            let calls = calls.clone();
            connector.set_update_callback(move |state| {
                let n = calls.fetch_add(1, Ordering::SeqCst);
                if n == 0 {
                    panic!("consumer bug at record {}", state.records_applied);
                }
            });
        }
        let events = connector.events();
        connector.connect("mem0").unwrap();
        wait_for(&events, gave_up);
        connector.disconnect().unwrap();

        assert_eq!(calls.load(Ordering::SeqCst), 3);
        assert_eq!(connector.snapshot().unwrap().records_applied, 3);
        fs::remove_dir_all(&dir).ok();
    }

    #[test]
    fn test_log_start_failure_does_not_stop_ingestion() {
        let blocker = scratch_dir("blocker");
        fs::write(&blocker, "not a directory").unwrap();
        let stream = format!("{}\n", STATE);
        let connector = Connector::new(config(blocker.clone()), MemoryPorts::new(vec![stream.as_str()])).unwrap();
        let events = connector.events();

        connector.connect("mem0").unwrap();
        let seen = wait_for(&events, gave_up);
        connector.disconnect().unwrap();

        assert!(seen.iter().any(|e| matches!(e, ConnectorEvent::LogWriteFailed { .. })));
        assert_eq!(connector.snapshot().unwrap().records_applied, 1);
        assert_eq!(connector.metrics().log_failures, 1);
        fs::remove_file(&blocker).ok();
    }

    #[test]
    fn test_zero_position_through_connector() {
        let dir = scratch_dir("zero");
        let stream = format!("{}\n", STATE);
        let connector = Connector::new(config(dir.clone()), MemoryPorts::new(vec![stream.as_str()])).unwrap();
        let events = connector.events();
        connector.connect("mem0").unwrap();
        wait_for(&events, gave_up);

        let offset = connector.zero_position().unwrap();
        assert_eq!(offset, Vector3::new(-1.0, -2.0, -3.0));
        let snap = connector.snapshot().unwrap();
        assert!(snap.position.norm() < 1e-4);
        assert_eq!(snap.kalman.x[0], 1.0);
        connector.disconnect().unwrap();
        fs::remove_dir_all(&dir).ok();
    }

    #[test]
    fn test_invalid_config_rejected() {
        let cfg = ConnectorConfig {
            history_capacity: 0,
            ..ConnectorConfig::default()
        };
        assert!(matches!(
            Connector::new(cfg, MemoryPorts::new(vec![])),
            Err(ConnectorError::Config(_))
        ));
    }

    #[test]
    fn test_concurrent_connects_leave_no_stray_reader() {
        let dir = scratch_dir("race");
        let reads = Arc::new(AtomicUsize::new(0));
        let ports = Arc::new(QuietPorts { reads: reads.clone() });
        let connector = Arc::new(Connector::new(config(dir.clone()), ports).unwrap());
        let barrier = Arc::new(Barrier::new(2));

        let callers: Vec<_> = (0..2)
            .map(|_| {
                let connector = connector.clone();
                let barrier = barrier.clone();
                thread::spawn(move || {
                    barrier.wait();
                    connector.connect("quiet0").unwrap();
                })
            })
            .collect();
        for caller in callers {
            caller.join().unwrap();
        }
        assert_eq!(connector.endpoint().as_deref(), Some("quiet0"));

        connector.disconnect().unwrap();
        let at_disconnect = reads.load(Ordering::SeqCst);
        thread::sleep(Duration::from_millis(200));
        assert_eq!(reads.load(Ordering::SeqCst), at_disconnect);
        assert!(connector.endpoint().is_none());
        // The second session retired the first one's file.
        assert_eq!(fs::read_dir(&dir).unwrap().count(), 1);
        fs::remove_dir_all(&dir).ok();
    }

    #[test]
    fn test_view_pairs_state_with_histories() {
        let dir = scratch_dir("view");
        let stream = format!("{}\n{}\n", ACCEL, STATE);
        let connector = Connector::new(config(dir.clone()), MemoryPorts::new(vec![stream.as_str()])).unwrap();
        let events = connector.events();
        connector.connect("mem0").unwrap();
        wait_for(&events, gave_up);
        connector.disconnect().unwrap();

        let (applied, trail) = connector
            .with_view(|state, histories| (state.records_applied, histories.read_display(Signal::Position)))
            .unwrap();
        assert_eq!(applied, 2);
        assert_eq!(trail.len(), 2);
        fs::remove_dir_all(&dir).ok();
    }
}
