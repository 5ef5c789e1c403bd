#![warn(missing_docs)]
//! LearnTest Report - Run Summaries and Output
//!
//! Generates various output formats:
//! - Human-readable terminal output (rendered by the CLI)
//! - JSON (machine-readable)
//! - GitHub Summary (Markdown for $GITHUB_STEP_SUMMARY)

mod github;
mod json;
mod report;

pub use github::generate_github_summary;
pub use json::{SCHEMA_VERSION, generate_json_report, parse_json_report};
pub use report::{
    ExitClass, INVALID_CONFIGURATION_EXIT_CODE, Report, ReportConfig, ReportMeta, RunSummary,
    SystemInfo, TestOutcome, TestReportResult,
};

/// Output format selection
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum OutputFormat {
    /// Human-readable terminal output
    #[default]
    Human,
    /// JSON with full schema
    Json,
    /// Markdown for GitHub Actions
    GithubSummary,
}

impl std::str::FromStr for OutputFormat {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_lowercase().as_str() {
            "json" => Ok(OutputFormat::Json),
            "github" | "github-summary" => Ok(OutputFormat::GithubSummary),
            "human" | "text" => Ok(OutputFormat::Human),
            other => Err(format!("Unknown output format: {}", other)),
        }
    }
}
