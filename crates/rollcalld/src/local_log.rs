//! Append-only CSV log, one file per session.

use chrono::{DateTime, Local};
use rollcall_core::AttendanceRecord;
use std::fs::{File, OpenOptions};
use std::io::Write;
use std::path::{Path, PathBuf};
use thiserror::Error;

const HEADER: &str = "Name,RegNo,Branch,Time";

#[derive(Error, Debug)]
pub enum LogError {
    #[error("cannot open attendance log {path}: {source}")]
    Open {
        path: PathBuf,
        source: std::io::Error,
    },
    #[error("attendance log {0} is unavailable")]
    Unavailable(PathBuf),
    #[error("write to attendance log failed: {0}")]
    Write(#[from] std::io::Error),
}

pub struct LocalLog {
    path: PathBuf,
    file: Option<File>,
}

impl LocalLog {
    /// Create (or reopen) the log for a session started at `started_at`,
    /// writing the header if the file is new.
    pub fn open(dir: &Path, started_at: &DateTime<Local>) -> Result<Self, LogError> {
        let path = log_path(dir, started_at);
        let open_err = |source| LogError::Open {
            path: path.clone(),
            source,
        };

        std::fs::create_dir_all(dir).map_err(open_err)?;
        let mut file = OpenOptions::new()
            .create(true)
            .append(true)
            .open(&path)
            .map_err(open_err)?;

        if file.metadata().map_err(open_err)?.len() == 0 {
            writeln!(file, "{HEADER}").map_err(open_err)?;
        }

        tracing::info!(path = %path.display(), "attendance log opened");
        Ok(Self {
            path,
            file: Some(file),
        })
    }

    /// A log whose file could not be opened; every append fails.
    pub fn detached(dir: &Path, started_at: &DateTime<Local>) -> Self {
        Self {
            path: log_path(dir, started_at),
            file: None,
        }
    }

    pub fn append(&mut self, record: &AttendanceRecord) -> Result<(), LogError> {
        let file = self
            .file
            .as_mut()
            .ok_or_else(|| LogError::Unavailable(self.path.clone()))?;

        writeln!(
            file,
            "{},{},{},{}",
            csv_field(&record.name),
            csv_field(&record.identity_id),
            csv_field(&record.group),
            record.arrived_at.format("%Y-%m-%d %H:%M:%S"),
        )?;
        file.flush()?;
        Ok(())
    }

    pub fn path(&self) -> &Path {
        &self.path
    }
}

fn log_path(dir: &Path, started_at: &DateTime<Local>) -> PathBuf {
    dir.join(started_at.format("Attendance_%Y%m%d_%H%M%S.csv").to_string())
}

/// Quote a field if it contains a delimiter, quote, or line break.
fn csv_field(value: &str) -> String {
    if value.contains([',', '"', '\n', '\r']) {
        format!("\"{}\"", value.replace('"', "\"\""))
    } else {
        value.to_string()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;

    fn started() -> DateTime<Local> {
        Local.with_ymd_and_hms(2024, 3, 5, 9, 15, 2).unwrap()
    }

    fn record(seq: usize, name: &str, id: &str) -> AttendanceRecord {
        AttendanceRecord {
            identity_id: id.into(),
            name: name.into(),
            group: "CSE".into(),
            arrived_at: Local.with_ymd_and_hms(2024, 3, 5, 9, 20, seq as u32).unwrap(),
            sequence: seq,
        }
    }

    #[test]
    fn test_open_writes_header_once() {
        let dir = tempfile::tempdir().unwrap();
        let log = LocalLog::open(dir.path(), &started()).unwrap();
        assert!(log.path().ends_with("Attendance_20240305_091502.csv"));
        drop(log);
        LocalLog::open(dir.path(), &started()).unwrap();

        let text =
            std::fs::read_to_string(dir.path().join("Attendance_20240305_091502.csv")).unwrap();
        assert_eq!(text, "Name,RegNo,Branch,Time\n");
    }

    #[test]
    fn test_append_rows_in_order() {
        let dir = tempfile::tempdir().unwrap();
        let mut log = LocalLog::open(&dir.path().join("nested"), &started()).unwrap();
        log.append(&record(0, "Asha Rao", "21CS001")).unwrap();
        log.append(&record(1, "Bilal Khan", "21CS002")).unwrap();

        let text = std::fs::read_to_string(log.path()).unwrap();
        let lines: Vec<&str> = text.lines().collect();
        assert_eq!(
            lines,
            [
                "Name,RegNo,Branch,Time",
                "Asha Rao,21CS001,CSE,2024-03-05 09:20:00",
                "Bilal Khan,21CS002,CSE,2024-03-05 09:20:01",
            ]
        );
    }

    #[test]
    fn test_fields_with_commas_are_quoted() {
        assert_eq!(csv_field("Rao, Asha"), "\"Rao, Asha\"");
        assert_eq!(csv_field("say \"hi\""), "\"say \"\"hi\"\"\"");
        assert_eq!(csv_field("plain"), "plain");
    }

    #[test]
    fn test_detached_log_reports_unavailable() {
        let dir = tempfile::tempdir().unwrap();
        let mut log = LocalLog::detached(dir.path(), &started());
        let err = log.append(&record(0, "Asha", "R1")).unwrap_err();
        assert!(matches!(err, LogError::Unavailable(_)));
    }
}
