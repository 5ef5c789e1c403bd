//! Report Data Structures

use chrono::{DateTime, Utc};
use learntest_compare::{ComparisonVerdict, Outcome};
use learntest_core::{ExitStatus, Platform, RunRecord, TelemetrySample};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::time::Duration;

/// Complete regression run report
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Report {
    /// Run metadata
    pub meta: ReportMeta,
    /// One entry per selected test, in catalog order
    pub results: Vec<TestReportResult>,
    /// Counts and exit class
    pub summary: RunSummary,
}

/// Report metadata
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ReportMeta {
    /// JSON schema version
    pub schema_version: u32,
    /// LearnTest version
    pub version: String,
    /// When the report was built
    pub timestamp: DateTime<Utc>,
    /// Corpus root
    pub root: String,
    /// Host description
    pub system: SystemInfo,
    /// Effective run settings
    pub config: ReportConfig,
}

/// Run configuration captured in report metadata
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ReportConfig {
    /// Toolkit binary
    pub toolkit: String,
    /// Platform whose reference trees were used
    pub comparison_platform: Platform,
    /// Launcher process count (1 means serial)
    pub parallel_process_count: u32,
    /// Tests run concurrently
    pub jobs: usize,
    /// Timeout policy as configured
    pub timeout_policy: String,
    /// Absolute numeric tolerance
    pub absolute_tolerance: f64,
    /// Relative numeric tolerance
    pub relative_tolerance: f64,
}

/// System information
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SystemInfo {
    /// Operating system
    pub os: String,
    /// CPU architecture
    pub arch: String,
    /// Detected platform
    pub platform: Platform,
    /// Available parallelism
    pub cpu_cores: u32,
}

/// Final classification of one test in the report
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum TestOutcome {
    /// Every file matched
    Passed,
    /// At least one file differs
    Mismatch,
    /// No reference tree for the comparison platform
    MissingReference,
    /// The run left no results to compare
    MissingProduced,
    /// Killed by the watchdog
    TimedOut,
    /// Died on a signal, failed to start, or was aborted
    Crashed,
}

impl TestOutcome {
    /// Classify a finalized run and its verdict
    pub fn classify(status: ExitStatus, verdict: Option<&ComparisonVerdict>) -> Self {
        match (status, verdict) {
            (ExitStatus::TimedOut, _) => TestOutcome::TimedOut,
            (ExitStatus::Crashed, _) => TestOutcome::Crashed,
            (_, Some(v)) => match v.outcome {
                Outcome::Pass => TestOutcome::Passed,
                Outcome::Mismatch => TestOutcome::Mismatch,
                Outcome::MissingReference => TestOutcome::MissingReference,
                Outcome::MissingProduced => TestOutcome::MissingProduced,
            },
            // A comparable run always carries a verdict
            (_, None) => TestOutcome::MissingProduced,
        }
    }

    /// Severity class of this outcome
    pub fn exit_class(self) -> ExitClass {
        match self {
            TestOutcome::Passed => ExitClass::Pass,
            TestOutcome::Mismatch => ExitClass::Mismatch,
            TestOutcome::MissingReference | TestOutcome::MissingProduced => {
                ExitClass::MissingResults
            }
            TestOutcome::TimedOut => ExitClass::TimedOut,
            TestOutcome::Crashed => ExitClass::Crashed,
        }
    }

    /// Short label for terminal output
    pub fn label(self) -> &'static str {
        match self {
            TestOutcome::Passed => "passed",
            TestOutcome::Mismatch => "mismatch",
            TestOutcome::MissingReference => "missing reference",
            TestOutcome::MissingProduced => "missing produced",
            TestOutcome::TimedOut => "timed out",
            TestOutcome::Crashed => "crashed",
        }
    }
}

/// Process exit code classes, ordered by severity.
///
/// The run exits with the code of the worst class seen.
#[derive(
    Debug, Clone, Copy, Default, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize,
)]
#[serde(rename_all = "snake_case")]
pub enum ExitClass {
    /// Every selected test passed
    #[default]
    Pass = 0,
    /// Content differs from the reference
    Mismatch = 1,
    /// Reference or produced results are missing
    MissingResults = 2,
    /// A toolkit run was killed by the watchdog
    TimedOut = 3,
    /// A toolkit run crashed
    Crashed = 4,
}

impl ExitClass {
    /// Process exit code
    pub fn code(self) -> i32 {
        self as i32
    }
}

/// Exit code for a configuration error detected before any test runs
pub const INVALID_CONFIGURATION_EXIT_CODE: i32 = 64;

/// Individual test result in the report
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TestReportResult {
    /// Test identifier
    pub id: String,
    /// Final classification
    pub outcome: TestOutcome,
    /// How the toolkit process ended
    pub exit_status: ExitStatus,
    /// Exit code, if the process exited normally
    pub exit_code: Option<i32>,
    /// Terminating signal, if any
    pub signal: Option<i32>,
    /// Wall-clock run time
    pub elapsed: Duration,
    /// Limit the watchdog applied
    pub timeout: Duration,
    /// Spawn time
    pub start_time: DateTime<Utc>,
    /// Exit time
    pub end_time: DateTime<Utc>,
    /// Cut short by an operator abort
    pub aborted: bool,
    /// Nonzero exit whose outputs matched the reference
    pub expected_failure: bool,
    /// Comparison verdict, absent for timed out or crashed runs
    pub comparison: Option<ComparisonVerdict>,
    /// Allocator statistics, when collection was enabled
    pub telemetry: Option<TelemetrySample>,
    /// Captured toolkit error output
    pub stderr: String,
}

impl TestReportResult {
    /// Build from the three per-test products of the pipeline
    pub fn from_run(
        record: &RunRecord,
        verdict: Option<ComparisonVerdict>,
        telemetry: Option<TelemetrySample>,
    ) -> Self {
        let outcome = TestOutcome::classify(record.exit_status, verdict.as_ref());
        Self {
            id: record.test_id().to_string(),
            outcome,
            exit_status: record.exit_status,
            exit_code: record.exit_code,
            signal: record.signal,
            elapsed: record.elapsed,
            timeout: record.timeout,
            start_time: record.start_time,
            end_time: record.end_time,
            aborted: record.aborted,
            expected_failure: verdict.as_ref().is_some_and(|v| v.expected_failure),
            comparison: verdict,
            telemetry,
            stderr: record.stderr.clone(),
        }
    }

    /// Whether the test counts as passed
    pub fn passed(&self) -> bool {
        self.outcome == TestOutcome::Passed
    }
}

/// Counts per outcome class plus elapsed time per test
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct RunSummary {
    /// Tests that ran
    pub total: usize,
    /// Tests that passed
    pub passed: usize,
    /// Tests that did not pass
    pub failed: usize,
    /// Killed by the watchdog
    pub timed_out: usize,
    /// Crashed or aborted
    pub crashed: usize,
    /// Content differences
    pub mismatched: usize,
    /// No reference tree
    pub missing_reference: usize,
    /// No produced results
    pub missing_produced: usize,
    /// Passed despite a nonzero exit
    pub expected_failures: usize,
    /// Selected but never started (operator abort)
    pub skipped: usize,
    /// Cut short by an operator abort
    pub aborted: usize,
    /// Elapsed time keyed by test id
    pub per_test_elapsed: BTreeMap<String, Duration>,
    /// Wall-clock time of the whole run
    pub total_duration: Duration,
}

impl RunSummary {
    /// Count one finalized test
    pub fn record(&mut self, result: &TestReportResult) {
        self.total += 1;
        self.per_test_elapsed.insert(result.id.clone(), result.elapsed);
        if result.aborted {
            self.aborted += 1;
        }
        match result.outcome {
            TestOutcome::Passed => {
                self.passed += 1;
                if result.expected_failure {
                    self.expected_failures += 1;
                }
                return;
            }
            TestOutcome::Mismatch => self.mismatched += 1,
            TestOutcome::MissingReference => self.missing_reference += 1,
            TestOutcome::MissingProduced => self.missing_produced += 1,
            TestOutcome::TimedOut => self.timed_out += 1,
            TestOutcome::Crashed => self.crashed += 1,
        }
        self.failed += 1;
    }

    /// Count a selected test that never started
    pub fn record_skipped(&mut self) {
        self.skipped += 1;
    }

    /// Worst class seen. Selected tests that never started mean the run was
    /// interrupted, which counts as `Crashed`.
    pub fn exit_class(&self) -> ExitClass {
        if self.crashed > 0 || self.skipped > 0 {
            ExitClass::Crashed
        } else if self.timed_out > 0 {
            ExitClass::TimedOut
        } else if self.missing_reference + self.missing_produced > 0 {
            ExitClass::MissingResults
        } else if self.mismatched > 0 {
            ExitClass::Mismatch
        } else {
            ExitClass::Pass
        }
    }

    /// Process exit code
    pub fn exit_code(&self) -> i32 {
        self.exit_class().code()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn result(id: &str, outcome: TestOutcome) -> TestReportResult {
        let now = Utc::now();
        TestReportResult {
            id: id.to_string(),
            outcome,
            exit_status: ExitStatus::Ok,
            exit_code: Some(0),
            signal: None,
            elapsed: Duration::from_secs(2),
            timeout: Duration::from_secs(60),
            start_time: now,
            end_time: now,
            aborted: false,
            expected_failure: false,
            comparison: None,
            telemetry: None,
            stderr: String::new(),
        }
    }

    #[test]
    fn test_exit_class_is_monotone() {
        assert!(ExitClass::Pass < ExitClass::Mismatch);
        assert!(ExitClass::Mismatch < ExitClass::MissingResults);
        assert!(ExitClass::MissingResults < ExitClass::TimedOut);
        assert!(ExitClass::TimedOut < ExitClass::Crashed);
        assert_eq!(ExitClass::Crashed.code(), 4);
    }

    #[test]
    fn test_worst_class_wins() {
        let mut summary = RunSummary::default();
        summary.record(&result("a", TestOutcome::Passed));
        assert_eq!(summary.exit_code(), 0);
        summary.record(&result("b", TestOutcome::Mismatch));
        assert_eq!(summary.exit_class(), ExitClass::Mismatch);
        summary.record(&result("c", TestOutcome::TimedOut));
        summary.record(&result("d", TestOutcome::MissingReference));
        assert_eq!(summary.exit_class(), ExitClass::TimedOut);
        summary.record(&result("e", TestOutcome::Crashed));
        assert_eq!(summary.exit_code(), 4);

        assert_eq!(summary.total, 5);
        assert_eq!(summary.passed, 1);
        assert_eq!(summary.failed, 4);
        assert_eq!(summary.per_test_elapsed.len(), 5);
    }

    #[test]
    fn test_skipped_tests_are_not_a_pass() {
        let mut summary = RunSummary::default();
        summary.record_skipped();
        summary.record_skipped();
        assert_eq!(summary.total, 0);
        assert_eq!(summary.exit_class(), ExitClass::Crashed);
        assert_eq!(summary.exit_code(), 4);

        let mut summary = RunSummary::default();
        summary.record(&result("a", TestOutcome::Passed));
        summary.record_skipped();
        assert_eq!(summary.exit_class(), ExitClass::Crashed);
    }

    #[test]
    fn test_expected_failures_count_as_passed() {
        let mut summary = RunSummary::default();
        let mut r = result("a", TestOutcome::Passed);
        r.exit_status = ExitStatus::NonzeroExit;
        r.expected_failure = true;
        summary.record(&r);
        assert_eq!(summary.passed, 1);
        assert_eq!(summary.expected_failures, 1);
        assert_eq!(summary.exit_class(), ExitClass::Pass);
    }

    #[test]
    fn test_classify_never_compares_failed_runs() {
        assert_eq!(
            TestOutcome::classify(ExitStatus::TimedOut, None),
            TestOutcome::TimedOut
        );
        assert_eq!(
            TestOutcome::classify(ExitStatus::Crashed, None),
            TestOutcome::Crashed
        );
    }
}
