//! GitHub Step Summary
//!
//! Markdown suitable for `$GITHUB_STEP_SUMMARY`: a counts table followed by
//! one section per non-passing test.

use crate::report::{Report, TestOutcome};
use std::fmt::Write;

/// Differences shown per test before truncating
const MAX_DIFFS_PER_TEST: usize = 20;

/// Generate the Markdown summary of a report
pub fn generate_github_summary(report: &Report) -> String {
    let mut md = String::new();
    let s = &report.summary;
    let icon = if s.exit_code() == 0 { "✅" } else { "❌" };

    let _ = writeln!(md, "## {} LearnTest Results\n", icon);
    let _ = writeln!(
        md,
        "Platform `{}`, {} test(s) in {:.1}s\n",
        report.meta.config.comparison_platform,
        s.total,
        s.total_duration.as_secs_f64()
    );
    md.push_str("| Outcome | Count |\n|---|---:|\n");
    for (label, count) in [
        ("Passed", s.passed),
        ("Expected failures", s.expected_failures),
        ("Mismatch", s.mismatched),
        ("Missing reference", s.missing_reference),
        ("Missing produced", s.missing_produced),
        ("Timed out", s.timed_out),
        ("Crashed", s.crashed),
        ("Skipped", s.skipped),
    ] {
        if count > 0 || label == "Passed" {
            let _ = writeln!(md, "| {} | {} |", label, count);
        }
    }

    let failures: Vec<_> = report.results.iter().filter(|r| !r.passed()).collect();
    if failures.is_empty() {
        return md;
    }

    md.push_str("\n### Failures\n");
    for result in failures {
        let _ = writeln!(
            md,
            "\n<details><summary><code>{}</code>: {}</summary>\n",
            result.id,
            result.outcome.label()
        );
        match result.outcome {
            TestOutcome::TimedOut => {
                let _ = writeln!(
                    md,
                    "Killed after {:.1}s (limit {:.1}s)",
                    result.elapsed.as_secs_f64(),
                    result.timeout.as_secs_f64()
                );
            }
            TestOutcome::Crashed if result.aborted => md.push_str("Aborted by operator\n"),
            TestOutcome::Crashed => {
                let _ = writeln!(md, "```\n{}\n```", result.stderr.trim_end());
            }
            _ => {}
        }
        if let Some(verdict) = &result.comparison {
            if !verdict.diff_details.is_empty() {
                md.push_str("| File | Location | Expected | Actual |\n|---|---|---|---|\n");
                for d in verdict.diff_details.iter().take(MAX_DIFFS_PER_TEST) {
                    let _ = writeln!(
                        md,
                        "| `{}` | {} | `{}` | `{}` |",
                        d.file,
                        d.location,
                        escape(&d.expected),
                        escape(&d.actual)
                    );
                }
                if verdict.diff_details.len() > MAX_DIFFS_PER_TEST {
                    let _ = writeln!(
                        md,
                        "\n... and {} more",
                        verdict.diff_details.len() - MAX_DIFFS_PER_TEST
                    );
                }
            }
        }
        md.push_str("\n</details>\n");
    }
    md
}

fn escape(cell: &str) -> String {
    cell.replace('|', "\\|").replace('`', "'")
}
