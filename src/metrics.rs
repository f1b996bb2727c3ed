use serde::{Deserialize, Serialize};
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Mutex;
use std::time::{Duration, Instant};

/// Records/second over a rolling window of `span`.
#[derive(Debug)]
struct RateWindow {
    span: Duration,
    window_start: Instant,
    count: u64,
    last_rate: f64,
}

impl RateWindow {
    fn new(span: Duration) -> Self {
        RateWindow {
            span,
            window_start: Instant::now(),
            count: 0,
            last_rate: 0.0,
        }
    }

    /// Returns the freshly closed rate when a window rolls over.
    fn tick(&mut self, now: Instant) -> Option<f64> {
        self.count += 1;
        let elapsed = now.saturating_duration_since(self.window_start);
        if elapsed < self.span {
            return None;
        }
        self.last_rate = self.count as f64 / elapsed.as_secs_f64();
        self.count = 0;
        self.window_start = now;
        Some(self.last_rate)
    }
}

/// Ingest throughput and failure counters, owned by one connector.
#[derive(Debug)]
pub struct IngestMetrics {
    lines_received: AtomicU64,
    records_applied: AtomicU64,
    decode_failures: AtomicU64,
    log_failures: AtomicU64,
    transport_failures: AtomicU64,
    rate: Mutex<RateWindow>,
    last_record: Mutex<Option<Instant>>,
}

#[derive(Clone, Debug, Default, PartialEq, Serialize, Deserialize)]
pub struct MetricsSnapshot {
    pub lines_received: u64,
    pub records_applied: u64,
    pub decode_failures: u64,
    pub log_failures: u64,
    pub transport_failures: u64,
    pub records_per_second: f64,
    /// Seconds since the last applied record, if any.
    pub silence_secs: Option<f64>,
}

impl IngestMetrics {
    pub fn new() -> Self {
        Self::with_window(Duration::from_secs(1))
    }

    pub fn with_window(span: Duration) -> Self {
        IngestMetrics {
            lines_received: AtomicU64::new(0),
            records_applied: AtomicU64::new(0),
            decode_failures: AtomicU64::new(0),
            log_failures: AtomicU64::new(0),
            transport_failures: AtomicU64::new(0),
            rate: Mutex::new(RateWindow::new(span)),
            last_record: Mutex::new(None),
        }
    }

    pub fn line_received(&self) {
        self.lines_received.fetch_add(1, Ordering::Relaxed);
    }

    pub fn record_applied(&self) {
        self.records_applied.fetch_add(1, Ordering::Relaxed);
        let now = Instant::now();
        if let Ok(mut last) = self.last_record.lock() {
            *last = Some(now);
        }
        if let Ok(mut rate) = self.rate.lock() {
            if let Some(per_sec) = rate.tick(now) {
                log::debug!("Ingest rate: {:.1} records/s", per_sec);
            }
        }
    }

    pub fn decode_failed(&self) {
        self.decode_failures.fetch_add(1, Ordering::Relaxed);
    }

    pub fn log_failed(&self) {
        self.log_failures.fetch_add(1, Ordering::Relaxed);
    }

    pub fn transport_failed(&self) {
        self.transport_failures.fetch_add(1, Ordering::Relaxed);
    }

    pub fn snapshot(&self) -> MetricsSnapshot {
        MetricsSnapshot {
            lines_received: self.lines_received.load(Ordering::Relaxed),
            records_applied: self.records_applied.load(Ordering::Relaxed),
            decode_failures: self.decode_failures.load(Ordering::Relaxed),
            log_failures: self.log_failures.load(Ordering::Relaxed),
            transport_failures: self.transport_failures.load(Ordering::Relaxed),
            records_per_second: self.rate.lock().map(|r| r.last_rate).unwrap_or(0.0),
            silence_secs: self
                .last_record
                .lock()
                .ok()
                .and_then(|t| *t)
                .map(|t| t.elapsed().as_secs_f64()),
        }
    }
}

impl Default for IngestMetrics {
    fn default() -> Self {
        Self::new()
    }
}
