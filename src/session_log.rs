//! Session Logger
//!
//! One CSV file per session in a fixed directory. Starting a session removes
//! every other file there first, so at most one log exists at any time.
//! Each row is flushed and fsynced before `append` returns.

use chrono::{DateTime, Local};
use std::fs::{self, File};
use std::path::{Path, PathBuf};

use crate::decoder::DecodedRecord;
use crate::error::{CResult, ConnectorError};
use crate::types::COVARIANCE_LEN;

/// Fixed precision for every numeric cell.
const PRECISION: usize = 7;

pub struct SessionLogger {
    path: PathBuf,
    writer: csv::Writer<File>,
    rows_written: u64,
    predict_rate_hz: f32,
    update_rate_hz: f32,
}

impl SessionLogger {
    /// `log_DDMMYY_HHMMSS.csv`
    pub fn file_name(now: &DateTime<Local>) -> String {
        format!("log_{}.csv", now.format("%d%m%y_%H%M%S"))
    }

    pub fn header() -> Vec<String> {
        let mut header: Vec<String> = [
            "t",
            "predict_cpu",
            "update_cpu",
            "quat_x",
            "quat_y",
            "quat_z",
            "quat_w",
            "accel_x",
            "accel_y",
            "accel_z",
            "of_x",
            "of_y",
            "of_z",
            "x_x",
            "x_y",
            "x_z",
            "x_vx",
            "x_vy",
            "x_vz",
            "dt",
        ]
        .iter()
        .map(|s| s.to_string())
        .collect();
        header.extend((0..COVARIANCE_LEN).map(|i| format!("P_{}", i)));
        header
    }

    /// Retire old logs in `dir`, create the new session file and write its header.
    pub fn start(
        dir: &Path,
        now: DateTime<Local>,
        predict_rate_hz: f32,
        update_rate_hz: f32,
    ) -> CResult<Self> {
        fs::create_dir_all(dir).map_err(|e| {
            ConnectorError::LogIo(format!("cannot create {}: {}", dir.display(), e))
        })?;

        let name = Self::file_name(&now);
        let removed = retire_other_logs(dir, &name)?;
        if removed > 0 {
            log::info!("Removed {} old log file(s) from {}", removed, dir.display());
        }

        let path = dir.join(&name);
        let file = File::create(&path).map_err(|e| {
            ConnectorError::LogIo(format!("cannot create {}: {}", path.display(), e))
        })?;

        let mut logger = SessionLogger {
            path,
            writer: csv::Writer::from_writer(file),
            rows_written: 0,
            predict_rate_hz,
            update_rate_hz,
        };
        logger.writer.write_record(Self::header())?;
        logger.flush_and_sync()?;

        log::info!("Log file: {}", logger.path.display());
        Ok(logger)
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    pub fn rows_written(&self) -> u64 {
        self.rows_written
    }

    /// Append a row if the record carries `state`. Returns whether a row was written.
    pub fn append(&mut self, record: &DecodedRecord) -> CResult<bool> {
        let Some(row) = format_row(record, self.predict_rate_hz, self.update_rate_hz) else {
            return Ok(false);
        };
        self.writer.write_record(&row)?;
        self.flush_and_sync()?;
        self.rows_written += 1;
        Ok(true)
    }

    fn flush_and_sync(&mut self) -> CResult<()> {
        self.writer.flush()?;
        self.writer.get_ref().sync_all()?;
        Ok(())
    }
}

fn retire_other_logs(dir: &Path, keep: &str) -> CResult<usize> {
    let entries = fs::read_dir(dir).map_err(|e| {
        ConnectorError::LogIo(format!("cannot read {}: {}", dir.display(), e))
    })?;
    let mut removed = 0;
    for entry in entries {
        let entry = entry?;
        if !entry.file_type()?.is_file() || entry.file_name() == keep {
            continue;
        }
        fs::remove_file(entry.path()).map_err(|e| {
            ConnectorError::LogIo(format!("cannot remove {}: {}", entry.path().display(), e))
        })?;
        removed += 1;
    }
    Ok(removed)
}

fn cell(value: f32) -> String {
    format!("{:.*}", PRECISION, value)
}

fn cells<I: IntoIterator<Item = f32>>(values: I) -> impl Iterator<Item = String> {
    values.into_iter().map(cell)
}

fn empty(count: usize) -> impl Iterator<Item = String> {
    std::iter::repeat(String::new()).take(count)
}

/// Build one log row. Sub-structures absent from the record become empty
/// cells, never zeros.
pub fn format_row(
    record: &DecodedRecord,
    predict_rate_hz: f32,
    update_rate_hz: f32,
) -> Option<Vec<String>> {
    let state = record.state?;
    let mut row = Vec::with_capacity(SessionLogger::header().len());

    row.push(
        record
            .micros
            .map(|m| format!("{:.*}", PRECISION, m / 1e6))
            .unwrap_or_default(),
    );

    if record.is_predict_step() {
        row.push(cell(state.dt * predict_rate_hz));
        row.push(String::new());
    } else if record.is_update_step() {
        row.push(String::new());
        row.push(cell(state.dt * update_rate_hz));
    } else {
        row.extend(empty(2));
    }

    let sensor = record.sensor.as_ref();
    match sensor.and_then(|s| s.quat) {
        Some(q) => row.extend(cells([q.i, q.j, q.k, q.w])),
        None => row.extend(empty(4)),
    }
    match sensor.and_then(|s| s.accel) {
        Some(a) => row.extend(cells(a.iter().copied())),
        None => row.extend(empty(3)),
    }
    match sensor.and_then(|s| s.optical_flow) {
        Some(f) => row.extend(cells(f.iter().copied())),
        None => row.extend(empty(3)),
    }

    row.extend(cells(state.x.iter().copied()));
    row.push(cell(state.dt));

    match record.covariance {
        Some(p) => row.extend(cells(p.transpose().iter().copied())),
        None => row.extend(empty(COVARIANCE_LEN)),
    }

    Some(row)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::decoder::decode_line;
    use chrono::TimeZone;
    use std::time::{SystemTime, UNIX_EPOCH};

    fn scratch_dir(tag: &str) -> PathBuf {
        let nanos = SystemTime::now()
            .duration_since(UNIX_EPOCH)
            .unwrap_or_default()
            .as_nanos();
        let dir = std::env::temp_dir().join(format!(
            "locationcore_{}_{}_{}",
            tag,
            std::process::id(),
            nanos
        ));
        fs::create_dir_all(&dir).unwrap();
        dir
    }

    fn at(h: u32, m: u32, s: u32) -> DateTime<Local> {
        Local.with_ymd_and_hms(2024, 3, 7, h, m, s).unwrap()
    }

    fn read_rows(path: &Path) -> Vec<Vec<String>> {
        let mut reader = csv::ReaderBuilder::new()
            .has_headers(false)
            .from_path(path)
            .unwrap();
        reader
            .records()
            .map(|r| r.unwrap().iter().map(|c| c.to_string()).collect())
            .collect()
    }

    #[test]
    fn test_file_name_pattern() {
        assert_eq!(SessionLogger::file_name(&at(9, 5, 3)), "log_070324_090503.csv");
    }

    #[test]
    fn test_header_shape() {
        let header = SessionLogger::header();
        assert_eq!(header.len(), 20 + 36);
        assert_eq!(header[0], "t");
        assert_eq!(header[19], "dt");
        assert_eq!(header[55], "P_35");
    }

    #[test]
    fn test_new_session_leaves_exactly_one_file() {
        let dir = scratch_dir("rotate");
        fs::write(dir.join("log_010124_000000.csv"), "old").unwrap();
        fs::write(dir.join("notes.txt"), "stale").unwrap();

        let logger = SessionLogger::start(&dir, at(12, 0, 0), 50.0, 10.0).unwrap();

        let names: Vec<String> = fs::read_dir(&dir)
            .unwrap()
            .map(|e| e.unwrap().file_name().to_string_lossy().into_owned())
            .collect();
        assert_eq!(names, vec!["log_070324_120000.csv".to_string()]);
        assert_eq!(logger.path(), dir.join("log_070324_120000.csv"));

        // Header is on disk before any row is appended.
        let rows = read_rows(logger.path());
        assert_eq!(rows.len(), 1);
        assert_eq!(rows[0], SessionLogger::header());
        fs::remove_dir_all(&dir).ok();
    }

    #[test]
    fn test_second_session_retires_first() {
        let dir = scratch_dir("second");
        let first = SessionLogger::start(&dir, at(12, 0, 0), 50.0, 10.0).unwrap();
        let first_path = first.path().to_path_buf();
        drop(first);
        let second = SessionLogger::start(&dir, at(12, 0, 5), 50.0, 10.0).unwrap();
        assert!(!first_path.exists());
        assert_eq!(fs::read_dir(&dir).unwrap().count(), 1);
        assert!(second.path().exists());
        fs::remove_dir_all(&dir).ok();
    }

    #[test]
    fn test_row_without_state_not_written() {
        let dir = scratch_dir("nostate");
        let mut logger = SessionLogger::start(&dir, at(1, 2, 3), 50.0, 10.0).unwrap();
        let rec = decode_line(r#"{"sensor_input": {"accel": {"x": 1, "y": 2, "z": 3}}}"#).unwrap();
        assert!(!logger.append(&rec).unwrap());
        assert_eq!(logger.rows_written(), 0);
        fs::remove_dir_all(&dir).ok();
    }

    #[test]
    fn test_quat_without_accel_has_empty_accel_cells() {
        let dir = scratch_dir("cells");
        let mut logger = SessionLogger::start(&dir, at(1, 2, 3), 50.0, 10.0).unwrap();
        let rec = decode_line(
            r#"{"sensor_input": {"quat": {"x": 0.0, "y": 0.0, "z": 0.0, "w": 1.0}},
                "state": {"x": 0.0, "y": 0.5, "z": -1.25, "vx": 0, "vy": 0, "vz": 0, "dt": 0.02},
                "f": [1, 1, 1, 1, 1, 1],
                "micros": 1500000}"#,
        )
        .unwrap();
        assert!(logger.append(&rec).unwrap());

        let rows = read_rows(logger.path());
        assert_eq!(rows.len(), 2);
        let row = &rows[1];
        assert_eq!(row.len(), 56);
        assert_eq!(row[0], "1.5000000");
        assert_eq!(row[1], "1.0000000"); // 0.02 s at 50 Hz
        assert_eq!(row[2], "");
        assert_eq!(&row[3..7], &["0.0000000", "0.0000000", "0.0000000", "1.0000000"]);
        assert!(row[7..10].iter().all(|c| c.is_empty()));
        assert!(row[10..13].iter().all(|c| c.is_empty()));
        assert_eq!(row[14], "0.5000000");
        assert_eq!(row[15], "-1.2500000");
        assert!(row[20..].iter().all(|c| c.is_empty()));
        fs::remove_dir_all(&dir).ok();
    }

    #[test]
    fn test_covariance_cells_row_major() {
        let cells: Vec<String> = (0..36).map(|i| format!("{}", i)).collect();
        let line = format!(
            r#"{{"state": {{"x": 0, "y": 0, "z": 0, "vx": 0, "vy": 0, "vz": 0, "dt": 0.1}}, "y-h": [0, 0, 0], "P": [{}]}}"#,
            cells.join(",")
        );
        let rec = decode_line(&line).unwrap();
        let row = format_row(&rec, 50.0, 10.0).unwrap();
        assert_eq!(row[1], "");
        assert_eq!(row[2], "1.0000000");
        assert_eq!(row[20], "0.0000000");
        assert_eq!(row[21], "1.0000000");
        assert_eq!(row[26], "6.0000000");
        assert_eq!(row[55], "35.0000000");
    }
}
