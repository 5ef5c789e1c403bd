//! Run Records
//!
//! One [`RunRecord`] per execution attempt of a test case. The supervisor
//! owns the record until it is finalized; afterwards it is only read.

use crate::catalog::TestCase;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::path::PathBuf;
use std::time::Duration;

/// Terminal status of a toolkit execution
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ExitStatus {
    /// Exited with code 0
    Ok,
    /// Exited normally with a nonzero code
    NonzeroExit,
    /// Killed by the watchdog
    TimedOut,
    /// Abnormal termination (signal, spawn failure, or any parallel worker failure)
    Crashed,
}

impl ExitStatus {
    /// Whether results produced by this run may be compared against references
    pub fn is_comparable(self) -> bool {
        matches!(self, ExitStatus::Ok | ExitStatus::NonzeroExit)
    }

    /// Short label for logs and reports
    pub fn label(self) -> &'static str {
        match self {
            ExitStatus::Ok => "ok",
            ExitStatus::NonzeroExit => "nonzero exit",
            ExitStatus::TimedOut => "timed out",
            ExitStatus::Crashed => "crashed",
        }
    }
}

impl std::fmt::Display for ExitStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.label())
    }
}

/// Outcome of one toolkit execution
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RunRecord {
    /// The test case that was executed
    pub test_case: TestCase,
    /// Wall clock start
    pub start_time: DateTime<Utc>,
    /// Wall clock end
    pub end_time: DateTime<Utc>,
    /// Measured duration (monotonic clock)
    pub elapsed: Duration,
    /// Limit the watchdog enforced
    pub timeout: Duration,
    /// Terminal status
    pub exit_status: ExitStatus,
    /// Process exit code, when the process exited normally
    pub exit_code: Option<i32>,
    /// Terminating signal, when the process was killed
    pub signal: Option<i32>,
    /// Directory holding the produced results
    pub produced_results_path: PathBuf,
    /// Captured standard output
    pub stdout: String,
    /// Captured standard error
    pub stderr: String,
    /// Set when the run was cut short by an operator interrupt
    pub aborted: bool,
}

impl RunRecord {
    /// Test identifier
    pub fn test_id(&self) -> &str {
        &self.test_case.id
    }

    /// One line description of how the process ended
    pub fn describe_exit(&self) -> String {
        match (self.exit_status, self.exit_code, self.signal) {
            (ExitStatus::TimedOut, _, _) => {
                format!("timed out after {:.1}s", self.timeout.as_secs_f64())
            }
            (_, _, Some(signal)) => format!("{} (signal {})", self.exit_status, signal),
            (_, Some(code), _) => format!("{} (code {})", self.exit_status, code),
            (status, None, None) => status.to_string(),
        }
    }
}
