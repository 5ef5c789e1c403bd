//! Test Planner
//!
//! Builds the execution plan by filtering the catalog.
//!
//! Filtering options:
//! - Historical run time against the min/max thresholds
//! - Regex pattern matching on test ID
//!
//! Ordering: tests keep catalog order, never reordered by cost, so failures
//! show up at the same place in every report.

use learntest_core::{RunConfiguration, TestCase};
use std::time::Duration;

/// Why a test was left out of the plan
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SkipReason {
    /// Test ID does not match the filter
    Filtered,
    /// Historical run time below the minimum
    TooFast(Duration),
    /// Historical run time above the maximum
    TooSlow(Duration),
}

impl std::fmt::Display for SkipReason {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            SkipReason::Filtered => write!(f, "filtered out"),
            SkipReason::TooFast(t) => write!(f, "below min test time ({:.1}s)", t.as_secs_f64()),
            SkipReason::TooSlow(t) => write!(f, "above max test time ({:.1}s)", t.as_secs_f64()),
        }
    }
}

/// Execution plan for a regression run
#[derive(Debug, Default)]
pub struct ExecutionPlan {
    /// Ordered list of tests to run
    pub tests: Vec<TestCase>,
    /// Tests left out, with the reason
    pub skipped: Vec<(TestCase, SkipReason)>,
}

/// Build execution plan from the catalog
///
/// A test with no historical run time is always selected: its cost is
/// unknown and must be measured.
pub fn build_plan(
    catalog: impl IntoIterator<Item = TestCase>,
    config: &RunConfiguration,
    filter: Option<&regex::Regex>,
) -> ExecutionPlan {
    let mut plan = ExecutionPlan::default();

    for case in catalog {
        // Apply regex filter on test ID
        if let Some(re) = filter {
            if !re.is_match(&case.id) {
                plan.skipped.push((case, SkipReason::Filtered));
                continue;
            }
        }

        match time_window_reason(case.historical_run_time, config) {
            Some(reason) => plan.skipped.push((case, reason)),
            None => plan.tests.push(case),
        }
    }

    tracing::debug!(
        selected = plan.tests.len(),
        skipped = plan.skipped.len(),
        "built execution plan"
    );
    plan
}

fn time_window_reason(history: Option<Duration>, config: &RunConfiguration) -> Option<SkipReason> {
    if config.complete_tests {
        return None;
    }
    let t = history?;
    if config.min_test_time.is_some_and(|min| t < min) {
        return Some(SkipReason::TooFast(t));
    }
    if config.max_test_time.is_some_and(|max| t > max) {
        return Some(SkipReason::TooSlow(t));
    }
    None
}

#[cfg(test)]
mod tests {
    use super::*;

    fn make_test(id: &str, history: Option<u64>) -> TestCase {
        let case = TestCase::new(id, format!("/corpus/{}", id));
        match history {
            Some(secs) => case.with_history(Duration::from_secs(secs)),
            None => case,
        }
    }

    fn ids(plan: &ExecutionPlan) -> Vec<&str> {
        plan.tests.iter().map(|t| t.id.as_str()).collect()
    }

    #[test]
    fn test_no_filter_keeps_catalog_order() {
        let catalog = vec![
            make_test("c_test", Some(1)),
            make_test("a_test", Some(100)),
            make_test("b_test", None),
        ];

        let plan = build_plan(catalog, &RunConfiguration::default(), None);

        assert_eq!(ids(&plan), vec!["c_test", "a_test", "b_test"]);
        assert!(plan.skipped.is_empty());
    }

    #[test]
    fn test_min_threshold_scenario() {
        let config = RunConfiguration {
            min_test_time: Some(Duration::from_secs(10)),
            ..Default::default()
        };
        let catalog = vec![
            make_test("fast", Some(5)),
            make_test("slow", Some(15)),
            make_test("unknown", None),
        ];

        let plan = build_plan(catalog, &config, None);

        assert_eq!(ids(&plan), vec!["slow", "unknown"]);
        assert_eq!(
            plan.skipped[0].1,
            SkipReason::TooFast(Duration::from_secs(5))
        );
    }

    #[test]
    fn test_window_bounds_are_inclusive() {
        let config = RunConfiguration {
            min_test_time: Some(Duration::from_secs(10)),
            max_test_time: Some(Duration::from_secs(20)),
            ..Default::default()
        };
        let catalog = vec![
            make_test("t9", Some(9)),
            make_test("t10", Some(10)),
            make_test("t20", Some(20)),
            make_test("t21", Some(21)),
        ];

        let plan = build_plan(catalog, &config, None);

        assert_eq!(ids(&plan), vec!["t10", "t20"]);
        assert!(matches!(plan.skipped[1].1, SkipReason::TooSlow(_)));
    }

    #[test]
    fn test_complete_tests_ignores_thresholds() {
        let config = RunConfiguration {
            min_test_time: Some(Duration::from_secs(10)),
            max_test_time: Some(Duration::from_secs(20)),
            complete_tests: true,
            ..Default::default()
        };
        let catalog = vec![make_test("t1", Some(1)), make_test("t99", Some(99))];

        let plan = build_plan(catalog, &config, None);

        assert_eq!(plan.tests.len(), 2);
    }

    #[test]
    fn test_regex_filter() {
        let catalog = vec![
            make_test("Standard/Iris", None),
            make_test("Standard/Adult", None),
            make_test("Bugs/B12", None),
        ];
        let re = regex::Regex::new("^Standard/").unwrap();

        let plan = build_plan(catalog, &RunConfiguration::default(), Some(&re));

        assert_eq!(ids(&plan), vec!["Standard/Iris", "Standard/Adult"]);
        assert_eq!(plan.skipped[0].1, SkipReason::Filtered);
    }

    #[test]
    fn test_selection_matches_window_property() {
        let config = RunConfiguration {
            min_test_time: Some(Duration::from_secs(3)),
            max_test_time: Some(Duration::from_secs(7)),
            ..Default::default()
        };
        let catalog: Vec<_> = (0..12)
            .map(|i| make_test(&format!("t{}", i), if i == 11 { None } else { Some(i) }))
            .collect();

        let plan = build_plan(catalog.clone(), &config, None);

        for case in catalog {
            let expected = match case.historical_run_time {
                None => true,
                Some(t) => t >= Duration::from_secs(3) && t <= Duration::from_secs(7),
            };
            assert_eq!(plan.tests.contains(&case), expected, "{}", case.id);
        }
    }
}
