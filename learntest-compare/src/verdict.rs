//! Comparison Verdicts
//!
//! [`ResultComparator`] turns a finalized run into a [`ComparisonVerdict`]
//! against the reference tree of the comparison platform.

use crate::diff::{DiffDetail, IgnoreSet, diff_trees, list_files};
use crate::tolerance::Tolerance;
use learntest_core::{
    ExitStatus, OUTPUT_SCENARIO_FILE, Platform, RunConfiguration, RunRecord, TASK_LOG_FILE,
};
use serde::{Deserialize, Serialize};
use std::path::PathBuf;

/// Classification of a compared run
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Outcome {
    /// Every file matches within tolerance
    Pass,
    /// At least one difference
    Mismatch,
    /// No reference tree for the comparison platform
    MissingReference,
    /// The run produced no comparable file
    MissingProduced,
}

impl Outcome {
    /// Short label for logs and reports
    pub fn label(self) -> &'static str {
        match self {
            Outcome::Pass => "pass",
            Outcome::Mismatch => "mismatch",
            Outcome::MissingReference => "missing reference",
            Outcome::MissingProduced => "missing produced",
        }
    }
}

impl std::fmt::Display for Outcome {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.label())
    }
}

/// Result of comparing one run against its references
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ComparisonVerdict {
    /// Test identifier
    pub test_id: String,
    /// Classification
    pub outcome: Outcome,
    /// Platform whose references were used
    pub platform: Platform,
    /// Reference tree compared against, when one was found
    pub reference_path: Option<PathBuf>,
    /// Results matched but the toolkit exited with a nonzero code
    pub expected_failure: bool,
    /// Every difference found, in file then line order
    pub diff_details: Vec<DiffDetail>,
}

impl ComparisonVerdict {
    /// Whether the verdict counts as passed (expected failures included)
    pub fn passed(&self) -> bool {
        self.outcome == Outcome::Pass
    }
}

/// Compares produced results with the reference tree of one platform
#[derive(Debug, Clone)]
pub struct ResultComparator {
    platform: Platform,
    tolerance: Tolerance,
    ignored: IgnoreSet,
}

impl ResultComparator {
    /// Comparator for a run configuration.
    ///
    /// Diagnostic artifacts (task log, output scenario, memory statistics
    /// log) are never compared.
    pub fn new(config: &RunConfiguration) -> Self {
        let mut ignored = IgnoreSet::new([TASK_LOG_FILE, OUTPUT_SCENARIO_FILE]);
        if let Some(name) = &config.mem_stats.log_file_name {
            ignored.insert(name.clone());
        }
        Self {
            platform: config.effective_platform(),
            tolerance: Tolerance::default(),
            ignored,
        }
    }

    /// Use a different numeric tolerance
    pub fn with_tolerance(mut self, tolerance: Tolerance) -> Self {
        self.tolerance = tolerance;
        self
    }

    /// Exclude more files, by name or relative path
    pub fn with_ignored_files<I, S>(mut self, files: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        for file in files {
            self.ignored.insert(file);
        }
        self
    }

    /// Comparison platform
    pub fn platform(&self) -> Platform {
        self.platform
    }

    /// Numeric tolerance in use
    pub fn tolerance(&self) -> Tolerance {
        self.tolerance
    }

    /// Compare a finalized run. Runs that timed out or crashed are never
    /// compared and yield `None`.
    pub fn compare(&self, record: &RunRecord) -> Option<ComparisonVerdict> {
        if !record.exit_status.is_comparable() {
            return None;
        }

        let mut verdict = ComparisonVerdict {
            test_id: record.test_id().to_string(),
            outcome: Outcome::Pass,
            platform: self.platform,
            reference_path: None,
            expected_failure: false,
            diff_details: Vec::new(),
        };

        let reference = match record.test_case.reference_for(self.platform) {
            Some(path) if path.is_dir() => path.to_path_buf(),
            _ => {
                verdict.outcome = Outcome::MissingReference;
                return Some(verdict);
            }
        };
        verdict.reference_path = Some(reference.clone());

        let produced = &record.produced_results_path;
        let has_produced = list_files(produced, &self.ignored)
            .map(|files| !files.is_empty())
            .unwrap_or(false);
        if !has_produced {
            verdict.outcome = Outcome::MissingProduced;
            return Some(verdict);
        }

        match diff_trees(&reference, produced, &self.ignored, &self.tolerance) {
            Ok(details) => verdict.diff_details = details,
            Err(e) => {
                tracing::warn!(test = %verdict.test_id, "comparison failed: {}", e);
                verdict.diff_details.push(DiffDetail {
                    file: produced.display().to_string(),
                    location: "read error".to_string(),
                    expected: String::new(),
                    actual: e.to_string(),
                });
            }
        }

        if verdict.diff_details.is_empty() {
            verdict.expected_failure = record.exit_status == ExitStatus::NonzeroExit;
        } else {
            verdict.outcome = Outcome::Mismatch;
        }

        tracing::debug!(
            test = %verdict.test_id,
            platform = %self.platform,
            outcome = %verdict.outcome,
            differences = verdict.diff_details.len(),
            "compared results"
        );
        Some(verdict)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::Utc;
    use learntest_core::{REFERENCE_DIR, RESULTS_DIR, TestCase};
    use std::fs;
    use std::path::Path;
    use std::time::Duration;
    use tempfile::TempDir;

    fn record(case: TestCase, status: ExitStatus) -> RunRecord {
        let now = Utc::now();
        RunRecord {
            produced_results_path: case.produced_results_dir(),
            test_case: case,
            start_time: now,
            end_time: now,
            elapsed: Duration::from_millis(10),
            timeout: Duration::from_secs(60),
            exit_status: status,
            exit_code: Some(if status == ExitStatus::Ok { 0 } else { 1 }),
            signal: None,
            stdout: String::new(),
            stderr: String::new(),
            aborted: false,
        }
    }

    fn write(dir: &Path, name: &str, content: &str) {
        fs::create_dir_all(dir).unwrap();
        fs::write(dir.join(name), content).unwrap();
    }

    fn linux_config() -> RunConfiguration {
        RunConfiguration {
            comparison_platform: Some(Platform::LinuxGcc),
            ..Default::default()
        }
    }

    fn case_with(temp: &TempDir, reference: &str, produced: &str) -> TestCase {
        let dir = temp.path().join("Iris");
        let ref_dir = dir.join("results.ref.linux-gcc");
        write(&ref_dir, "Eval.txt", reference);
        write(&dir.join(RESULTS_DIR), "Eval.txt", produced);
        TestCase::new("Iris", &dir).with_reference(Platform::LinuxGcc, ref_dir)
    }

    #[test]
    fn test_pass_within_tolerance() {
        let temp = TempDir::new().unwrap();
        let case = case_with(&temp, "Accuracy\t0.3\n", "Accuracy\t0.30000001\n");
        let verdict = ResultComparator::new(&linux_config())
            .compare(&record(case, ExitStatus::Ok))
            .unwrap();
        assert_eq!(verdict.outcome, Outcome::Pass);
        assert!(!verdict.expected_failure);
        assert!(verdict.diff_details.is_empty());
    }

    #[test]
    fn test_mismatch_records_exact_triple() {
        let temp = TempDir::new().unwrap();
        let case = case_with(&temp, "Accuracy\t0.31\n", "Accuracy\t0.30000001\n");
        let verdict = ResultComparator::new(&linux_config())
            .compare(&record(case, ExitStatus::Ok))
            .unwrap();
        assert_eq!(verdict.outcome, Outcome::Mismatch);
        assert_eq!(verdict.diff_details.len(), 1);
        let detail = &verdict.diff_details[0];
        assert_eq!(detail.file, "Eval.txt");
        assert_eq!(detail.location, "line 1, field 2");
        assert_eq!(detail.expected, "0.31");
        assert_eq!(detail.actual, "0.30000001");
    }

    #[test]
    fn test_missing_reference_for_requested_platform() {
        let temp = TempDir::new().unwrap();
        let dir = temp.path().join("T");
        write(&dir.join("results.ref.linux-gcc"), "a.txt", "1\n");
        write(&dir.join("results.ref.windows-msvc"), "a.txt", "1\n");
        write(&dir.join(RESULTS_DIR), "a.txt", "1\n");
        let case = TestCase::new("T", &dir)
            .with_reference(Platform::LinuxGcc, dir.join("results.ref.linux-gcc"))
            .with_reference(Platform::WindowsMsvc, dir.join("results.ref.windows-msvc"));

        let config = RunConfiguration {
            comparison_platform: Some(Platform::MacosClang),
            ..Default::default()
        };
        let verdict = ResultComparator::new(&config)
            .compare(&record(case, ExitStatus::Ok))
            .unwrap();
        assert_eq!(verdict.outcome, Outcome::MissingReference);
        assert_eq!(verdict.platform, Platform::MacosClang);
    }

    #[test]
    fn test_unset_platform_uses_current() {
        let temp = TempDir::new().unwrap();
        let dir = temp.path().join("T");
        write(&dir.join(REFERENCE_DIR), "a.txt", "1\n");
        write(&dir.join(RESULTS_DIR), "a.txt", "1\n");
        let case = TestCase::new("T", &dir).with_reference(Platform::current(), dir.join(REFERENCE_DIR));

        let comparator = ResultComparator::new(&RunConfiguration::default());
        assert_eq!(comparator.platform(), Platform::current());
        let verdict = comparator.compare(&record(case, ExitStatus::Ok)).unwrap();
        assert_eq!(verdict.outcome, Outcome::Pass);
    }

    #[test]
    fn test_missing_produced() {
        let temp = TempDir::new().unwrap();
        let dir = temp.path().join("T");
        write(&dir.join("results.ref.linux-gcc"), "a.txt", "1\n");
        // Only ignored diagnostics were written
        write(&dir.join(RESULTS_DIR), TASK_LOG_FILE, "progress\n");
        let case = TestCase::new("T", &dir)
            .with_reference(Platform::LinuxGcc, dir.join("results.ref.linux-gcc"));

        let verdict = ResultComparator::new(&linux_config())
            .compare(&record(case, ExitStatus::Ok))
            .unwrap();
        assert_eq!(verdict.outcome, Outcome::MissingProduced);
    }

    #[test]
    fn test_nonzero_exit_with_matching_results_is_expected_failure() {
        let temp = TempDir::new().unwrap();
        let case = case_with(&temp, "error : bad dictionary\n", "error : bad dictionary\n");
        let verdict = ResultComparator::new(&linux_config())
            .compare(&record(case, ExitStatus::NonzeroExit))
            .unwrap();
        assert!(verdict.passed());
        assert!(verdict.expected_failure);
    }

    #[test]
    fn test_nonzero_exit_with_different_results_is_mismatch() {
        let temp = TempDir::new().unwrap();
        let case = case_with(&temp, "ok\n", "error : crash\n");
        let verdict = ResultComparator::new(&linux_config())
            .compare(&record(case, ExitStatus::NonzeroExit))
            .unwrap();
        assert_eq!(verdict.outcome, Outcome::Mismatch);
        assert!(!verdict.expected_failure);
    }

    #[test]
    fn test_timed_out_and_crashed_are_not_compared() {
        let temp = TempDir::new().unwrap();
        let case = case_with(&temp, "a\n", "a\n");
        let comparator = ResultComparator::new(&linux_config());
        assert!(comparator.compare(&record(case.clone(), ExitStatus::TimedOut)).is_none());
        assert!(comparator.compare(&record(case, ExitStatus::Crashed)).is_none());
    }

    #[test]
    fn test_comparison_is_idempotent() {
        let temp = TempDir::new().unwrap();
        let case = case_with(&temp, "a 1\nb 2\n", "a 1\nb 3\n");
        let comparator = ResultComparator::new(&linux_config());
        let run = record(case, ExitStatus::Ok);
        assert_eq!(comparator.compare(&run), comparator.compare(&run));
    }

    #[test]
    fn test_configured_ignored_files_and_mem_stats_log() {
        let temp = TempDir::new().unwrap();
        let case = case_with(&temp, "a\n", "a\n");
        let results = case.produced_results_dir();
        write(&results, "stats.log", "Time\n0.1\n");
        write(&results, "timings.txt", "12.3s\n");

        let mut config = linux_config();
        config.mem_stats.log_file_name = Some("stats.log".to_string());
        let verdict = ResultComparator::new(&config)
            .with_ignored_files(["timings.txt"])
            .compare(&record(case, ExitStatus::Ok))
            .unwrap();
        assert_eq!(verdict.outcome, Outcome::Pass);
    }
}
