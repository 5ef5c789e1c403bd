//! Output Formatting
//!
//! Human-readable output for run reports and execution plans.
//!
//! Generates terminal-friendly output with:
//! - One line per test with a status icon (✓/✗/⏱/💥)
//! - Diff details for mismatched tests
//! - Telemetry peaks when memory statistics were collected
//! - Summary counts and the process exit code

use crate::planner::ExecutionPlan;
use learntest_report::{Report, TestOutcome, TestReportResult};

/// Diff lines shown per failing test before truncation
const MAX_DIFF_LINES: usize = 10;

/// Format a report for human-readable terminal display
pub fn format_human_output(report: &Report) -> String {
    let mut output = String::new();

    output.push('\n');
    output.push_str("LearnTest Results\n");
    output.push_str(&"=".repeat(60));
    output.push_str("\n\n");
    output.push_str(&format!(
        "Toolkit: {}  Platform: {}  Jobs: {}\n\n",
        report.meta.config.toolkit,
        report.meta.config.comparison_platform,
        report.meta.config.jobs
    ));

    for result in &report.results {
        format_result(&mut output, result);
    }

    let s = &report.summary;
    output.push('\n');
    output.push_str("Summary\n");
    output.push_str(&"-".repeat(60));
    output.push('\n');
    output.push_str(&format!(
        "  Total: {}  Passed: {}  Failed: {}  Skipped: {}\n",
        s.total, s.passed, s.failed, s.skipped
    ));
    if s.failed > 0 {
        output.push_str(&format!(
            "  Mismatch: {}  Missing reference: {}  Missing produced: {}  Timed out: {}  Crashed: {}\n",
            s.mismatched, s.missing_reference, s.missing_produced, s.timed_out, s.crashed
        ));
    }
    if s.expected_failures > 0 {
        output.push_str(&format!("  Expected failures: {}\n", s.expected_failures));
    }
    if s.aborted > 0 || s.skipped > 0 {
        output.push_str("  Run aborted by operator\n");
    }
    output.push_str(&format!(
        "  Duration: {:.1}s  Exit code: {}\n",
        s.total_duration.as_secs_f64(),
        s.exit_code()
    ));

    output
}

fn format_result(output: &mut String, result: &TestReportResult) {
    let icon = match result.outcome {
        TestOutcome::Passed => "✓",
        TestOutcome::Mismatch | TestOutcome::MissingReference | TestOutcome::MissingProduced => {
            "✗"
        }
        TestOutcome::TimedOut => "⏱",
        TestOutcome::Crashed => "💥",
    };

    let mut line = format!(
        "  {} {} ({:.2}s)",
        icon,
        result.id,
        result.elapsed.as_secs_f64()
    );
    if !result.passed() {
        line.push_str(&format!(" {}", result.outcome.label()));
    }
    if result.expected_failure {
        line.push_str(" [expected failure]");
    }
    if result.aborted {
        line.push_str(" [aborted]");
    }
    output.push_str(&line);
    output.push('\n');

    match result.outcome {
        TestOutcome::TimedOut => {
            output.push_str(&format!(
                "      killed after {:.1}s limit\n",
                result.timeout.as_secs_f64()
            ));
        }
        TestOutcome::Crashed => {
            if let Some(signal) = result.signal {
                output.push_str(&format!("      signal: {}\n", signal));
            } else if let Some(code) = result.exit_code {
                output.push_str(&format!("      exit code: {}\n", code));
            }
            if let Some(first) = result.stderr.lines().find(|l| !l.trim().is_empty()) {
                output.push_str(&format!("      stderr: {}\n", first.trim()));
            }
        }
        _ => {}
    }

    if let Some(verdict) = result.comparison.as_ref().filter(|v| !v.passed()) {
        match &verdict.reference_path {
            Some(path) => output.push_str(&format!("      reference: {}\n", path.display())),
            None => output.push_str(&format!(
                "      no reference registered for {}\n",
                verdict.platform
            )),
        }
        for detail in verdict.diff_details.iter().take(MAX_DIFF_LINES) {
            output.push_str(&format!("      {}\n", detail));
        }
        if verdict.diff_details.len() > MAX_DIFF_LINES {
            output.push_str(&format!(
                "      ... {} more differences\n",
                verdict.diff_details.len() - MAX_DIFF_LINES
            ));
        }
    }

    if let Some(sample) = &result.telemetry {
        let peaks: Vec<String> = sample
            .allocator_stats
            .iter()
            .map(|(name, value)| format!("{}={}", name, value))
            .collect();
        if !peaks.is_empty() {
            output.push_str(&format!("      memory: {}\n", peaks.join(" ")));
        }
        if sample.is_partial() {
            output.push_str(&format!(
                "      telemetry: {} warning(s)\n",
                sample.warnings.len()
            ));
        }
    }
}

/// Format the execution plan for `list` and `--dry-run`
pub fn format_plan(plan: &ExecutionPlan) -> String {
    let mut output = String::new();

    output.push_str(&format!("Selected tests ({}):\n", plan.tests.len()));
    for case in &plan.tests {
        match case.historical_run_time {
            Some(elapsed) => output.push_str(&format!(
                "  {} ({:.2}s last run)\n",
                case.id,
                elapsed.as_secs_f64()
            )),
            None => output.push_str(&format!("  {}\n", case.id)),
        }
    }

    if !plan.skipped.is_empty() {
        output.push_str(&format!("\nSkipped tests ({}):\n", plan.skipped.len()));
        for (case, reason) in &plan.skipped {
            output.push_str(&format!("  {} ({})\n", case.id, reason));
        }
    }

    output
}

#[cfg(test)]
mod tests {
    use super::*;
    use super::super::metadata::tests::sample_meta;
    use crate::planner::SkipReason;
    use chrono::Utc;
    use learntest_compare::{ComparisonVerdict, Outcome, diff_text, Tolerance};
    use learntest_core::{ExitStatus, Platform, TestCase};
    use learntest_report::RunSummary;
    use std::time::Duration;

    fn result(id: &str, outcome: TestOutcome) -> TestReportResult {
        let now = Utc::now();
        TestReportResult {
            id: id.to_string(),
            outcome,
            exit_status: ExitStatus::Ok,
            exit_code: Some(0),
            signal: None,
            elapsed: Duration::from_millis(1500),
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
    fn test_human_output_lists_failures_with_diffs() {
        let mut mismatch = result("Standard/Iris", TestOutcome::Mismatch);
        mismatch.comparison = Some(ComparisonVerdict {
            test_id: "Standard/Iris".to_string(),
            outcome: Outcome::Mismatch,
            platform: Platform::LinuxGcc,
            reference_path: Some("/corpus/Standard/Iris/results.ref".into()),
            expected_failure: false,
            diff_details: diff_text("report.txt", "x\t0.3\n", "x\t0.31\n", &Tolerance::default()),
        });
        let passed = result("Standard/Adult", TestOutcome::Passed);

        let mut summary = RunSummary::default();
        summary.record(&passed);
        summary.record(&mismatch);
        let report = Report {
            meta: sample_meta(),
            results: vec![passed, mismatch],
            summary,
        };

        let text = format_human_output(&report);
        assert!(text.contains("✓ Standard/Adult"));
        assert!(text.contains("✗ Standard/Iris"));
        assert!(text.contains("report.txt"));
        assert!(text.contains("0.31"));
        assert!(text.contains("Exit code: 1"));
    }

    #[test]
    fn test_timeout_line_shows_limit() {
        let mut timed_out = result("Slow/Case", TestOutcome::TimedOut);
        timed_out.timeout = Duration::from_secs(2);
        let mut summary = RunSummary::default();
        summary.record(&timed_out);
        let report = Report {
            meta: sample_meta(),
            results: vec![timed_out],
            summary,
        };
        let text = format_human_output(&report);
        assert!(text.contains("killed after 2.0s limit"));
        assert!(text.contains("Exit code: 3"));
    }

    #[test]
    fn test_plan_lists_skip_reasons() {
        let plan = ExecutionPlan {
            tests: vec![TestCase::new("A/a", "/corpus/A/a").with_history(Duration::from_secs(12))],
            skipped: vec![(
                TestCase::new("A/b", "/corpus/A/b"),
                SkipReason::TooFast(Duration::from_secs(2)),
            )],
        };
        let text = format_plan(&plan);
        assert!(text.contains("Selected tests (1)"));
        assert!(text.contains("A/a (12.00s last run)"));
        assert!(text.contains("Skipped tests (1)"));
        assert!(text.contains("A/b"));
    }
}
