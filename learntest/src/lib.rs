#![warn(missing_docs)]
//! # LearnTest
//!
//! Regression test runner for native analytics toolkits.
//!
//! LearnTest drives a corpus of scenario-based tests against a toolkit binary:
//! - **Selection**: historical run times from an elapsed-time log filter the catalog
//! - **Supervision**: each run is watched, killed with its whole process group on timeout
//! - **Parallel mode**: the toolkit is started under a message-passing launcher
//! - **Comparison**: produced results are diffed against per-platform references with a numeric tolerance
//! - **Telemetry**: optional allocator statistics logs are parsed into per-test samples
//! - **CI Integration**: JSON reports, GitHub step summaries and a severity-ordered exit code
//!
//! ## Quick Start
//!
//! ```text
//! KHIOPS_MPI_PROCESS_NUMBER=4 learntest ./LearningTest --toolkit ./bin/MODL --jobs 2
//! ```
//!
//! ## Library Use
//!
//! ```ignore
//! use learntest::prelude::*;
//!
//! let config = RunConfiguration::resolve(&EnvSettings)?;
//! let time_log = TimeLog::open("LearningTest/time.log")?;
//! let catalog = discover(Path::new("LearningTest"), &time_log)?;
//! let plan = build_plan(catalog, &config, None);
//! ```

// Re-export core types
pub use learntest_core::{
    CatalogError, ConfigError, EnvSettings, ExitStatus, MemStatsConfig, Platform, RunConfiguration,
    RunRecord, SettingsSource, TelemetrySample, TestCase, TimeLog, TimeLogEntry, TimeoutLimit,
    discover, telemetry,
};

// Re-export comparison
pub use learntest_compare::{ComparisonVerdict, DiffDetail, Outcome, ResultComparator, Tolerance};

// Re-export reporting
pub use learntest_report::{
    ExitClass, OutputFormat, Report, RunSummary, TestOutcome, TestReportResult,
    generate_github_summary, generate_json_report, parse_json_report,
};

// Re-export the runner
pub use learntest_cli::{
    AbortSignal, ExecutionConfig, ExecutionPlan, Executor, Supervisor, ToolkitCommand, build_plan,
    exit_code_for_error, run, run_with_cli,
};

/// Prelude for convenient imports
pub mod prelude {
    pub use crate::{
        AbortSignal, EnvSettings, ExecutionConfig, Executor, Platform, ResultComparator,
        RunConfiguration, Supervisor, TestCase, TimeLog, ToolkitCommand, build_plan, discover,
    };
}
