//! Elapsed-Time Log
//!
//! Append-only JSON lines file recording the measured duration of every run.
//! The selector and the automatic timeout read the snapshot loaded at open
//! time; appends go to disk one line at a time under a mutex, so concurrent
//! tests never interleave and never observe their own write.

use crate::record::{ExitStatus, RunRecord};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::fs::{File, OpenOptions};
use std::io::Write;
use std::path::{Path, PathBuf};
use std::sync::Mutex;
use std::time::Duration;
use thiserror::Error;

/// Default file name, relative to the corpus root
pub const TIME_LOG_FILE: &str = "time.log";

/// Time log errors
#[derive(Debug, Error)]
pub enum TimeLogError {
    /// The log could not be read or appended to
    #[error("I/O error on {path}: {source}")]
    Io {
        /// Log file
        path: PathBuf,
        /// Underlying error
        #[source]
        source: std::io::Error,
    },

    /// An entry could not be encoded
    #[error("Serialization error: {0}")]
    Serialization(#[from] serde_json::Error),
}

/// One line of the log
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TimeLogEntry {
    /// Test identifier
    pub test: String,
    /// Measured duration in seconds
    pub elapsed_secs: f64,
    /// How the run ended
    pub status: ExitStatus,
    /// When the entry was written
    pub recorded_at: DateTime<Utc>,
}

impl TimeLogEntry {
    /// Entry for a finalized run
    pub fn from_record(record: &RunRecord) -> Self {
        Self {
            test: record.test_id().to_string(),
            elapsed_secs: record.elapsed.as_secs_f64(),
            status: record.exit_status,
            recorded_at: record.end_time,
        }
    }
}

/// Historical durations plus the shared append handle
#[derive(Debug)]
pub struct TimeLog {
    path: PathBuf,
    history: HashMap<String, Duration>,
    writer: Mutex<Option<File>>,
}

impl TimeLog {
    /// Load the log at `path`. A missing file is an empty history.
    ///
    /// The last entry for a test wins. Malformed lines are skipped with a
    /// warning.
    pub fn open(path: impl Into<PathBuf>) -> Result<Self, TimeLogError> {
        let path = path.into();
        let mut history = HashMap::new();

        match std::fs::read_to_string(&path) {
            Ok(content) => {
                for (index, line) in content.lines().enumerate() {
                    if line.trim().is_empty() {
                        continue;
                    }
                    match serde_json::from_str::<TimeLogEntry>(line) {
                        Ok(entry) => match Duration::try_from_secs_f64(entry.elapsed_secs) {
                            Ok(elapsed) => {
                                history.insert(entry.test, elapsed);
                            }
                            Err(e) => {
                                tracing::warn!(
                                    path = %path.display(),
                                    line = index + 1,
                                    "skipping time log entry for {}: {}",
                                    entry.test,
                                    e
                                );
                            }
                        },
                        Err(e) => {
                            tracing::warn!(
                                path = %path.display(),
                                line = index + 1,
                                "skipping malformed time log line: {}",
                                e
                            );
                        }
                    }
                }
            }
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => {}
            Err(source) => return Err(TimeLogError::Io { path, source }),
        }

        Ok(Self {
            path,
            history,
            writer: Mutex::new(None),
        })
    }

    /// Path of the log file
    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Last measured duration of a test, as loaded at open time
    pub fn history(&self, test_id: &str) -> Option<Duration> {
        self.history.get(test_id).copied()
    }

    /// Number of tests with a recorded duration
    pub fn len(&self) -> usize {
        self.history.len()
    }

    /// Whether no test has a recorded duration
    pub fn is_empty(&self) -> bool {
        self.history.is_empty()
    }

    /// Append one entry. Writers are serialized; each line is flushed.
    pub fn append(&self, entry: &TimeLogEntry) -> Result<(), TimeLogError> {
        let mut line = serde_json::to_string(entry)?;
        line.push('\n');

        let mut guard = self.writer.lock().unwrap_or_else(|e| e.into_inner());
        if guard.is_none() {
            let file = OpenOptions::new()
                .create(true)
                .append(true)
                .open(&self.path)
                .map_err(|source| self.io_error(source))?;
            *guard = Some(file);
        }
        if let Some(file) = guard.as_mut() {
            file.write_all(line.as_bytes())
                .and_then(|_| file.flush())
                .map_err(|source| self.io_error(source))?;
        }
        Ok(())
    }

    /// Append the measured duration of a finalized run
    pub fn record(&self, record: &RunRecord) -> Result<(), TimeLogError> {
        self.append(&TimeLogEntry::from_record(record))
    }

    fn io_error(&self, source: std::io::Error) -> TimeLogError {
        TimeLogError::Io {
            path: self.path.clone(),
            source,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::Arc;
    use tempfile::TempDir;

    fn entry(test: &str, secs: f64) -> TimeLogEntry {
        TimeLogEntry {
            test: test.to_string(),
            elapsed_secs: secs,
            status: ExitStatus::Ok,
            recorded_at: Utc::now(),
        }
    }

    #[test]
    fn test_missing_file_is_empty_history() {
        let temp = TempDir::new().unwrap();
        let log = TimeLog::open(temp.path().join(TIME_LOG_FILE)).unwrap();
        assert!(log.is_empty());
        assert_eq!(log.history("anything"), None);
    }

    #[test]
    fn test_last_entry_wins_and_bad_lines_are_skipped() {
        let temp = TempDir::new().unwrap();
        let path = temp.path().join(TIME_LOG_FILE);
        let log = TimeLog::open(&path).unwrap();
        log.append(&entry("a", 1.0)).unwrap();
        log.append(&entry("b", 2.5)).unwrap();
        log.append(&entry("a", 4.0)).unwrap();
        std::fs::OpenOptions::new()
            .append(true)
            .open(&path)
            .unwrap()
            .write_all(b"{not json\n")
            .unwrap();

        let reloaded = TimeLog::open(&path).unwrap();
        assert_eq!(reloaded.len(), 2);
        assert_eq!(reloaded.history("a"), Some(Duration::from_secs(4)));
        assert_eq!(reloaded.history("b"), Some(Duration::from_millis(2500)));
    }

    #[test]
    fn test_out_of_range_durations_are_skipped() {
        let temp = TempDir::new().unwrap();
        let path = temp.path().join(TIME_LOG_FILE);
        std::fs::write(
            &path,
            concat!(
                r#"{"test":"huge","elapsed_secs":1e30,"status":"ok","recorded_at":"2024-01-01T00:00:00Z"}"#,
                "\n",
                r#"{"test":"negative","elapsed_secs":-1.0,"status":"ok","recorded_at":"2024-01-01T00:00:00Z"}"#,
                "\n",
                r#"{"test":"fine","elapsed_secs":3.0,"status":"ok","recorded_at":"2024-01-01T00:00:00Z"}"#,
                "\n",
            ),
        )
        .unwrap();

        let log = TimeLog::open(&path).unwrap();
        assert_eq!(log.len(), 1);
        assert_eq!(log.history("huge"), None);
        assert_eq!(log.history("negative"), None);
        assert_eq!(log.history("fine"), Some(Duration::from_secs(3)));
    }

    #[test]
    fn test_appends_do_not_change_loaded_snapshot() {
        let temp = TempDir::new().unwrap();
        let log = TimeLog::open(temp.path().join(TIME_LOG_FILE)).unwrap();
        log.append(&entry("a", 1.0)).unwrap();
        assert_eq!(log.history("a"), None);
    }

    #[test]
    fn test_concurrent_appends_keep_lines_whole() {
        let temp = TempDir::new().unwrap();
        let path = temp.path().join(TIME_LOG_FILE);
        let log = Arc::new(TimeLog::open(&path).unwrap());

        let handles: Vec<_> = (0..8)
            .map(|t| {
                let log = Arc::clone(&log);
                std::thread::spawn(move || {
                    for i in 0..50 {
                        log.append(&entry(&format!("t{}-{}", t, i), i as f64)).unwrap();
                    }
                })
            })
            .collect();
        for handle in handles {
            handle.join().unwrap();
        }

        let content = std::fs::read_to_string(&path).unwrap();
        assert_eq!(content.lines().count(), 400);
        for line in content.lines() {
            serde_json::from_str::<TimeLogEntry>(line).unwrap();
        }
    }
}
