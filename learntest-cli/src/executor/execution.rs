//! Test Execution
//!
//! Runs the planned tests on a bounded worker pool. Each worker drives one
//! test through the whole pipeline:
//!
//! ```text
//!   TestCase
//!      │
//!      ▼
//! ┌────────────┐
//! │ Supervisor │  toolkit process, watchdog, time log
//! └─────┬──────┘
//!       ▼
//! ┌────────────┐
//! │ Comparator │  only for ok / nonzero exit
//! └─────┬──────┘
//!       ▼
//! ┌────────────┐
//! │ Telemetry  │  only when the memory statistics log is enabled
//! └─────┬──────┘
//!       ▼
//!  RunReporter (keyed by test id)
//! ```
//!
//! Tests that have not started when an abort is requested are never
//! launched; the reporter counts them as skipped.

use super::report::RunReporter;
use crate::supervisor::Supervisor;
use indicatif::{ProgressBar, ProgressStyle};
use learntest_compare::{ComparisonVerdict, ResultComparator};
use learntest_core::{RunRecord, TelemetrySample, TestCase, telemetry};
use rayon::ThreadPoolBuilder;
use rayon::prelude::*;
use std::sync::Mutex;

/// Configuration for test execution
#[derive(Debug, Clone)]
pub struct ExecutionConfig {
    /// Tests run concurrently
    pub jobs: usize,
    /// Draw a progress bar on stderr
    pub show_progress: bool,
}

impl Default for ExecutionConfig {
    fn default() -> Self {
        Self {
            jobs: 1,
            show_progress: true,
        }
    }
}

/// Everything produced for one executed test
#[derive(Debug, Clone)]
pub struct TestExecutionResult {
    /// Supervisor record
    pub record: RunRecord,
    /// Comparison verdict, absent for timed-out or crashed runs
    pub verdict: Option<ComparisonVerdict>,
    /// Memory statistics, when collection is enabled
    pub telemetry: Option<TelemetrySample>,
}

/// Execute tests and feed the results to a reporter
pub struct Executor {
    supervisor: Supervisor,
    comparator: ResultComparator,
    config: ExecutionConfig,
}

impl Executor {
    /// Create an executor
    pub fn new(supervisor: Supervisor, comparator: ResultComparator, config: ExecutionConfig) -> Self {
        Self {
            supervisor,
            comparator,
            config,
        }
    }

    /// Supervisor used for every test
    pub fn supervisor(&self) -> &Supervisor {
        &self.supervisor
    }

    /// Execute all provided tests. Results arrive in completion order and
    /// are keyed by test id in the reporter.
    pub fn execute(&self, tests: &[TestCase]) -> anyhow::Result<RunReporter> {
        let reporter = Mutex::new(RunReporter::new());
        let pb = self.progress_bar(tests.len());

        let run = |case: &TestCase| {
            if self.supervisor.abort_signal().is_requested() {
                return;
            }
            pb.set_message(case.id.clone());
            let result = self.execute_single(case);
            if !result.record.exit_status.is_comparable()
                || result.verdict.as_ref().is_some_and(|v| !v.passed())
            {
                pb.println(format!("  ✗ {}", case.id));
            }
            reporter
                .lock()
                .unwrap_or_else(|e| e.into_inner())
                .record(result);
            pb.inc(1);
        };

        let jobs = self.config.jobs.max(1);
        if jobs == 1 || tests.len() <= 1 {
            tests.iter().for_each(run);
        } else {
            let pool = ThreadPoolBuilder::new()
                .num_threads(jobs.min(tests.len()))
                .build()
                .map_err(|e| anyhow::anyhow!("Failed to build worker pool: {}", e))?;
            pool.install(|| tests.par_iter().for_each(run));
        }

        if self.supervisor.abort_signal().is_requested() {
            pb.abandon_with_message("Aborted");
        } else {
            pb.finish_with_message("Complete");
        }
        Ok(reporter.into_inner().unwrap_or_else(|e| e.into_inner()))
    }

    /// Run one test through supervisor, comparator and telemetry
    pub fn execute_single(&self, case: &TestCase) -> TestExecutionResult {
        let record = self.supervisor.run_test(case);
        let verdict = self.comparator.compare(&record);

        let mem_stats = &self.supervisor.config().mem_stats;
        let telemetry = self
            .supervisor
            .mem_stats_log_path(case)
            .map(|path| telemetry::collect(&case.id, &path, mem_stats));

        TestExecutionResult {
            record,
            verdict,
            telemetry,
        }
    }

    fn progress_bar(&self, len: usize) -> ProgressBar {
        if !self.config.show_progress {
            return ProgressBar::hidden();
        }
        let pb = ProgressBar::new(len as u64);
        pb.set_style(
            ProgressStyle::default_bar()
                .template(
                    "{spinner:.green} [{elapsed_precise}] [{bar:40.cyan/blue}] {pos}/{len} {msg}",
                )
                .unwrap_or_else(|_| ProgressStyle::default_bar())
                .progress_chars("#>-"),
        );
        pb
    }
}
