//! Report Building
//!
//! [`RunReporter`] accumulates per-test results keyed by test id, so the
//! final report does not depend on the order in which the worker pool
//! finished. The report lists tests in plan order; planned tests with no
//! result (never started after an abort) count as skipped.

use super::execution::TestExecutionResult;
use learntest_core::TestCase;
use learntest_report::{Report, ReportMeta, RunSummary, TestReportResult};
use std::collections::BTreeMap;
use std::time::Duration;

/// Accumulates finalized test results
#[derive(Debug, Default)]
pub struct RunReporter {
    results: BTreeMap<String, TestReportResult>,
}

impl RunReporter {
    /// Create an empty reporter
    pub fn new() -> Self {
        Self::default()
    }

    /// Add the result of one test
    pub fn record(&mut self, result: TestExecutionResult) {
        let TestExecutionResult {
            record,
            verdict,
            telemetry,
        } = result;
        let entry = TestReportResult::from_run(&record, verdict, telemetry);
        self.results.insert(entry.id.clone(), entry);
    }

    /// Number of results received
    pub fn len(&self) -> usize {
        self.results.len()
    }

    /// Whether no result was received
    pub fn is_empty(&self) -> bool {
        self.results.is_empty()
    }

    /// Build the report, listing results in plan order
    pub fn build_report(
        mut self,
        plan: &[TestCase],
        meta: ReportMeta,
        total_duration: Duration,
    ) -> Report {
        let mut summary = RunSummary {
            total_duration,
            ..Default::default()
        };
        let mut results = Vec::with_capacity(plan.len());

        for case in plan {
            match self.results.remove(&case.id) {
                Some(result) => {
                    summary.record(&result);
                    results.push(result);
                }
                None => summary.record_skipped(),
            }
        }

        Report {
            meta,
            results,
            summary,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use super::super::metadata::tests::sample_meta;
    use chrono::Utc;
    use learntest_compare::{ComparisonVerdict, Outcome};
    use learntest_core::{ExitStatus, Platform, RunRecord};
    use learntest_report::TestOutcome;

    fn result(id: &str, status: ExitStatus, outcome: Option<Outcome>) -> TestExecutionResult {
        let case = TestCase::new(id, format!("/corpus/{}", id));
        let now = Utc::now();
        TestExecutionResult {
            record: RunRecord {
                produced_results_path: case.produced_results_dir(),
                test_case: case,
                start_time: now,
                end_time: now,
                elapsed: Duration::from_secs(1),
                timeout: Duration::from_secs(60),
                exit_status: status,
                exit_code: None,
                signal: None,
                stdout: String::new(),
                stderr: String::new(),
                aborted: false,
            },
            verdict: outcome.map(|outcome| ComparisonVerdict {
                test_id: id.to_string(),
                outcome,
                platform: Platform::LinuxGcc,
                reference_path: None,
                expected_failure: false,
                diff_details: Vec::new(),
            }),
            telemetry: None,
        }
    }

    #[test]
    fn test_report_follows_plan_order_not_completion_order() {
        let plan: Vec<_> = ["a", "b", "c"]
            .iter()
            .map(|id| TestCase::new(*id, format!("/corpus/{}", id)))
            .collect();

        let mut forward = RunReporter::new();
        let mut backward = RunReporter::new();
        let make = || {
            vec![
                result("a", ExitStatus::Ok, Some(Outcome::Pass)),
                result("b", ExitStatus::TimedOut, None),
                result("c", ExitStatus::Ok, Some(Outcome::Mismatch)),
            ]
        };
        for r in make() {
            forward.record(r);
        }
        for r in make().into_iter().rev() {
            backward.record(r);
        }

        let a = forward.build_report(&plan, sample_meta(), Duration::ZERO);
        let b = backward.build_report(&plan, sample_meta(), Duration::ZERO);

        let ids: Vec<_> = a.results.iter().map(|r| r.id.as_str()).collect();
        assert_eq!(ids, vec!["a", "b", "c"]);
        assert_eq!(a.summary, b.summary);
        assert_eq!(a.results[1].outcome, TestOutcome::TimedOut);
        assert_eq!(a.summary.exit_code(), 3);
    }

    #[test]
    fn test_unstarted_tests_are_skipped() {
        let plan: Vec<_> = ["a", "b"]
            .iter()
            .map(|id| TestCase::new(*id, format!("/corpus/{}", id)))
            .collect();
        let mut reporter = RunReporter::new();
        reporter.record(result("a", ExitStatus::Ok, Some(Outcome::Pass)));

        let report = reporter.build_report(&plan, sample_meta(), Duration::ZERO);

        assert_eq!(report.summary.total, 1);
        assert_eq!(report.summary.skipped, 1);
        assert_eq!(report.results.len(), 1);
        assert_eq!(report.summary.exit_code(), 4);
    }
}
