#![warn(missing_docs)]
//! LearnTest Core - Data Model
//!
//! This crate holds everything the orchestrator shares between stages:
//! - `RunConfiguration` resolved once from the named settings
//! - Test catalog discovery and per-platform reference trees
//! - `RunRecord` produced by the supervisor for every execution
//! - The append-only elapsed-time log
//! - Memory statistics / I/O trace telemetry parsing

pub mod catalog;
pub mod config;
pub mod platform;
pub mod record;
pub mod telemetry;
pub mod time_log;

pub use catalog::{
    CatalogError, ERROR_FILE, OUTPUT_SCENARIO_FILE, REFERENCE_DIR, RESULTS_DIR, SCENARIO_FILE,
    STDOUT_ERROR_FILE, TASK_LOG_FILE, TestCase, discover,
};
pub use config::{
    ConfigError, EnvSettings, MemStatsConfig, RunConfiguration, SettingsSource, TimeoutLimit,
    parse_duration, vars,
};
pub use platform::Platform;
pub use record::{ExitStatus, RunRecord};
pub use telemetry::{IoEvent, TelemetryParseWarning, TelemetrySample};
pub use time_log::{TIME_LOG_FILE, TimeLog, TimeLogEntry, TimeLogError};
