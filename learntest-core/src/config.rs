//! Run Configuration
//!
//! Resolves the named settings that drive a regression run into a single
//! immutable [`RunConfiguration`]. Settings come from any [`SettingsSource`];
//! the CLI reads them from the process environment once at startup and never
//! consults the environment again during the run.

use crate::platform::Platform;
use crate::telemetry::STATS_ALL;
use serde::{Deserialize, Serialize};
use std::collections::{BTreeMap, HashMap};
use std::time::Duration;
use thiserror::Error;

/// Names of the settings understood by the resolver
pub mod vars {
    /// Number of cooperating processes in message-passing mode
    pub const MPI_PROCESS_NUMBER: &str = "KHIOPS_MPI_PROCESS_NUMBER";
    /// Lower bound on historical run time for a test to be selected
    pub const MIN_TEST_TIME: &str = "KHIOPS_MIN_TEST_TIME";
    /// Upper bound on historical run time for a test to be selected
    pub const MAX_TEST_TIME: &str = "KHIOPS_MAX_TEST_TIME";
    /// Per-test timeout, or `automatic`
    pub const TEST_TIMEOUT_LIMIT: &str = "KHIOPS_TEST_TIMEOUT_LIMIT";
    /// Run the toolkit in batch mode
    pub const BATCH_MODE: &str = "KHIOPS_BATCH_MODE";
    /// Emit `task.log`
    pub const TASK_FILE_MODE: &str = "KHIOPS_TASK_FILE_MODE";
    /// Emit an output scenario file (the spelling is the toolkit's own)
    pub const OUTPUT_SCENARIO_MODE: &str = "KHIOPS_OUTPOUT_SCENARIO_MODE";
    /// Platform whose reference tree is used for comparison
    pub const COMPARISON_PLATFORM: &str = "KHIOPS_COMPARISON_PLATFORM";
    /// Run every test regardless of time thresholds
    pub const COMPLETE_TESTS: &str = "KHIOPS_COMPLETE_TESTS";
    /// Toolkit trace for preparation task dimensioning
    pub const PREPARATION_TRACE_MODE: &str = "KHIOPS_PREPARATION_TRACE_MODE";
    /// Toolkit trace level for parallel tasks (0 to 3)
    pub const PARALLEL_TRACE: &str = "KHIOPS_PARALLEL_TRACE";
    /// Memory statistics log file name
    pub const MEM_STATS_LOG_FILE_NAME: &str = "KHIOPS_MEM_STATS_LOG_FILE_NAME";
    /// Allocator statistics sampling frequency
    pub const MEM_STATS_LOG_FREQUENCY: &str = "KHIOPS_MEM_STATS_LOG_FREQUENCY";
    /// Bitmask of statistics to collect
    pub const MEM_STATS_LOG_TO_COLLECT: &str = "KHIOPS_MEM_STATS_LOG_TO_COLLECT";
    /// Collect I/O traces in the memory statistics log
    pub const IO_TRACE_MODE: &str = "KHIOPS_IO_TRACE_MODE";

    /// Every setting name, in documentation order
    pub const ALL: [&str; 15] = [
        MPI_PROCESS_NUMBER,
        MIN_TEST_TIME,
        MAX_TEST_TIME,
        TEST_TIMEOUT_LIMIT,
        BATCH_MODE,
        TASK_FILE_MODE,
        OUTPUT_SCENARIO_MODE,
        COMPARISON_PLATFORM,
        COMPLETE_TESTS,
        PREPARATION_TRACE_MODE,
        PARALLEL_TRACE,
        MEM_STATS_LOG_FILE_NAME,
        MEM_STATS_LOG_FREQUENCY,
        MEM_STATS_LOG_TO_COLLECT,
        IO_TRACE_MODE,
    ];
}

/// Floor applied to automatic timeouts so quick tests are not killed by noise
pub const AUTOMATIC_TIMEOUT_FLOOR: Duration = Duration::from_secs(60);

/// Multiplier applied to the historical run time for automatic timeouts
pub const AUTOMATIC_TIMEOUT_FACTOR: u32 = 5;

/// Automatic timeout for tests that have never been measured
pub const AUTOMATIC_TIMEOUT_FALLBACK: Duration = Duration::from_secs(3600);

/// Configuration errors. Any of these aborts the run before a test starts.
#[derive(Debug, Error, PartialEq, Eq)]
pub enum ConfigError {
    /// A setting has a value that cannot be used
    #[error("Invalid configuration: {name}={value:?}: {reason}")]
    InvalidConfiguration {
        /// Setting name
        name: String,
        /// Rejected value
        value: String,
        /// Why it was rejected
        reason: String,
    },
}

impl ConfigError {
    fn invalid(name: &str, value: &str, reason: impl Into<String>) -> Self {
        ConfigError::InvalidConfiguration {
            name: name.to_string(),
            value: value.to_string(),
            reason: reason.into(),
        }
    }
}

/// A source of named settings
pub trait SettingsSource {
    /// Raw value of a setting, if present
    fn get(&self, name: &str) -> Option<String>;
}

impl SettingsSource for BTreeMap<String, String> {
    fn get(&self, name: &str) -> Option<String> {
        BTreeMap::get(self, name).cloned()
    }
}

impl SettingsSource for HashMap<String, String> {
    fn get(&self, name: &str) -> Option<String> {
        HashMap::get(self, name).cloned()
    }
}

/// Settings read from the process environment
#[derive(Debug, Clone, Copy, Default)]
pub struct EnvSettings;

impl SettingsSource for EnvSettings {
    fn get(&self, name: &str) -> Option<String> {
        std::env::var(name).ok()
    }
}

/// Per-test timeout policy
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Default)]
#[serde(rename_all = "lowercase")]
pub enum TimeoutLimit {
    /// Derived from the test's historical run time
    #[default]
    Automatic,
    /// Same explicit limit for every test
    Fixed(Duration),
}

impl TimeoutLimit {
    /// Limit for a test with the given historical run time.
    ///
    /// Automatic limits are `max(60s, 5 × historical)`, or one hour when the
    /// test has no history yet.
    pub fn for_history(self, historical: Option<Duration>) -> Duration {
        match self {
            TimeoutLimit::Fixed(limit) => limit,
            TimeoutLimit::Automatic => match historical {
                Some(t) => t
                    .saturating_mul(AUTOMATIC_TIMEOUT_FACTOR)
                    .max(AUTOMATIC_TIMEOUT_FLOOR),
                None => AUTOMATIC_TIMEOUT_FALLBACK,
            },
        }
    }
}

/// Memory statistics collected by the toolkit
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct MemStatsConfig {
    /// Log file name; telemetry is disabled when absent
    pub log_file_name: Option<String>,
    /// Allocator sampling frequency (0 = only labelled events)
    pub collection_frequency: u64,
    /// Categories of statistics to collect
    pub stats_bitmask: u32,
    /// Record I/O events in the log
    pub io_trace_mode: bool,
}

impl Default for MemStatsConfig {
    fn default() -> Self {
        Self {
            log_file_name: None,
            collection_frequency: 0,
            stats_bitmask: STATS_ALL,
            io_trace_mode: false,
        }
    }
}

impl MemStatsConfig {
    /// Whether the toolkit is asked to write a statistics log
    pub fn is_enabled(&self) -> bool {
        self.log_file_name.is_some()
    }
}

/// Immutable configuration for one regression run
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RunConfiguration {
    /// Cooperating processes in message-passing mode (0 = serial)
    pub parallel_process_count: u32,
    /// Select only tests whose historical time is at least this
    pub min_test_time: Option<Duration>,
    /// Select only tests whose historical time is at most this
    pub max_test_time: Option<Duration>,
    /// Timeout policy
    pub timeout_limit: TimeoutLimit,
    /// Run the toolkit in batch mode
    pub batch_mode: bool,
    /// Ask the toolkit for a `task.log`
    pub task_file_mode: bool,
    /// Ask the toolkit for an output scenario
    pub output_scenario_mode: bool,
    /// Platform whose references are compared (current platform when absent)
    pub comparison_platform: Option<Platform>,
    /// Ignore time thresholds and run every test
    pub complete_tests: bool,
    /// Preparation task trace in the toolkit
    pub preparation_trace_mode: bool,
    /// Parallel task trace level in the toolkit (0 to 3)
    pub parallel_trace_level: u8,
    /// Memory statistics sub-configuration
    pub mem_stats: MemStatsConfig,
}

impl Default for RunConfiguration {
    fn default() -> Self {
        Self {
            parallel_process_count: 0,
            min_test_time: None,
            max_test_time: None,
            timeout_limit: TimeoutLimit::Automatic,
            batch_mode: true,
            task_file_mode: false,
            output_scenario_mode: false,
            comparison_platform: None,
            complete_tests: false,
            preparation_trace_mode: false,
            parallel_trace_level: 0,
            mem_stats: MemStatsConfig::default(),
        }
    }
}

impl RunConfiguration {
    /// Resolve a configuration from named settings.
    ///
    /// Absent or empty settings take their defaults; any value outside its
    /// domain is reported as [`ConfigError::InvalidConfiguration`].
    pub fn resolve(source: &impl SettingsSource) -> Result<Self, ConfigError> {
        let get = |name: &str| {
            source
                .get(name)
                .map(|v| v.trim().to_string())
                .filter(|v| !v.is_empty())
        };
        let defaults = Self::default();

        let parallel_process_count = match get(vars::MPI_PROCESS_NUMBER) {
            Some(v) => parse_integer::<u32>(vars::MPI_PROCESS_NUMBER, &v)?,
            None => defaults.parallel_process_count,
        };

        let min_test_time = get(vars::MIN_TEST_TIME)
            .map(|v| parse_setting_duration(vars::MIN_TEST_TIME, &v))
            .transpose()?;
        let max_test_time = get(vars::MAX_TEST_TIME)
            .map(|v| parse_setting_duration(vars::MAX_TEST_TIME, &v))
            .transpose()?;
        if let (Some(min), Some(max)) = (min_test_time, max_test_time) {
            if min > max {
                return Err(ConfigError::invalid(
                    vars::MIN_TEST_TIME,
                    &format!("{}", min.as_secs_f64()),
                    format!("greater than {} ({}s)", vars::MAX_TEST_TIME, max.as_secs_f64()),
                ));
            }
        }

        let timeout_limit = match get(vars::TEST_TIMEOUT_LIMIT) {
            Some(v) if v.eq_ignore_ascii_case("automatic") => TimeoutLimit::Automatic,
            Some(v) => {
                let limit = parse_setting_duration(vars::TEST_TIMEOUT_LIMIT, &v)?;
                if limit.is_zero() {
                    return Err(ConfigError::invalid(
                        vars::TEST_TIMEOUT_LIMIT,
                        &v,
                        "timeout must be positive",
                    ));
                }
                TimeoutLimit::Fixed(limit)
            }
            None => defaults.timeout_limit,
        };

        let flag = |name: &str, default: bool| -> Result<bool, ConfigError> {
            match get(name) {
                Some(v) => parse_bool(name, &v),
                None => Ok(default),
            }
        };

        let comparison_platform = get(vars::COMPARISON_PLATFORM)
            .map(|v| {
                v.parse::<Platform>()
                    .map_err(|reason| ConfigError::invalid(vars::COMPARISON_PLATFORM, &v, reason))
            })
            .transpose()?;

        let parallel_trace_level = match get(vars::PARALLEL_TRACE) {
            Some(v) => {
                let level = parse_integer::<u8>(vars::PARALLEL_TRACE, &v)?;
                if level > 3 {
                    return Err(ConfigError::invalid(
                        vars::PARALLEL_TRACE,
                        &v,
                        "expected a level between 0 and 3",
                    ));
                }
                level
            }
            None => defaults.parallel_trace_level,
        };

        let mem_stats = MemStatsConfig {
            log_file_name: get(vars::MEM_STATS_LOG_FILE_NAME),
            collection_frequency: match get(vars::MEM_STATS_LOG_FREQUENCY) {
                Some(v) => parse_integer::<u64>(vars::MEM_STATS_LOG_FREQUENCY, &v)?,
                None => defaults.mem_stats.collection_frequency,
            },
            stats_bitmask: match get(vars::MEM_STATS_LOG_TO_COLLECT) {
                Some(v) => parse_integer::<u32>(vars::MEM_STATS_LOG_TO_COLLECT, &v)?,
                None => defaults.mem_stats.stats_bitmask,
            },
            io_trace_mode: flag(vars::IO_TRACE_MODE, defaults.mem_stats.io_trace_mode)?,
        };

        Ok(Self {
            parallel_process_count,
            min_test_time,
            max_test_time,
            timeout_limit,
            batch_mode: flag(vars::BATCH_MODE, defaults.batch_mode)?,
            task_file_mode: flag(vars::TASK_FILE_MODE, defaults.task_file_mode)?,
            output_scenario_mode: flag(vars::OUTPUT_SCENARIO_MODE, defaults.output_scenario_mode)?,
            comparison_platform,
            complete_tests: flag(vars::COMPLETE_TESTS, defaults.complete_tests)?,
            preparation_trace_mode: flag(
                vars::PREPARATION_TRACE_MODE,
                defaults.preparation_trace_mode,
            )?,
            parallel_trace_level,
            mem_stats,
        })
    }

    /// Whether tests run under the message-passing launcher
    pub fn is_parallel(&self) -> bool {
        self.parallel_process_count > 0
    }

    /// Platform whose reference tree is used for comparison
    pub fn effective_platform(&self) -> Platform {
        self.comparison_platform.unwrap_or_else(Platform::current)
    }

    /// Environment passed to the toolkit process.
    ///
    /// Only settings that change toolkit behaviour are surfaced; selection and
    /// timeout settings stay with the orchestrator. The memory statistics log
    /// path is supplied by the caller since it is resolved per test.
    pub fn toolkit_env(&self, mem_stats_log_path: Option<&str>) -> Vec<(&'static str, String)> {
        let mut env = vec![
            (vars::BATCH_MODE, self.batch_mode.to_string()),
            (vars::TASK_FILE_MODE, self.task_file_mode.to_string()),
            (vars::OUTPUT_SCENARIO_MODE, self.output_scenario_mode.to_string()),
            (
                vars::PREPARATION_TRACE_MODE,
                self.preparation_trace_mode.to_string(),
            ),
            (vars::PARALLEL_TRACE, self.parallel_trace_level.to_string()),
        ];
        if self.is_parallel() {
            env.push((
                vars::MPI_PROCESS_NUMBER,
                self.parallel_process_count.to_string(),
            ));
        }
        if let Some(path) = mem_stats_log_path {
            env.push((vars::MEM_STATS_LOG_FILE_NAME, path.to_string()));
            env.push((
                vars::MEM_STATS_LOG_FREQUENCY,
                self.mem_stats.collection_frequency.to_string(),
            ));
            env.push((
                vars::MEM_STATS_LOG_TO_COLLECT,
                self.mem_stats.stats_bitmask.to_string(),
            ));
            env.push((vars::IO_TRACE_MODE, self.mem_stats.io_trace_mode.to_string()));
        }
        env
    }
}

fn parse_bool(name: &str, value: &str) -> Result<bool, ConfigError> {
    match value.to_lowercase().as_str() {
        "true" | "1" | "yes" | "on" => Ok(true),
        "false" | "0" | "no" | "off" => Ok(false),
        _ => Err(ConfigError::invalid(name, value, "expected true or false")),
    }
}

fn parse_integer<T: std::str::FromStr>(name: &str, value: &str) -> Result<T, ConfigError> {
    value
        .parse::<T>()
        .map_err(|_| ConfigError::invalid(name, value, "expected a non-negative integer"))
}

fn parse_setting_duration(name: &str, value: &str) -> Result<Duration, ConfigError> {
    parse_duration(value).map_err(|reason| ConfigError::invalid(name, value, reason))
}

/// Parse a duration: a bare number of seconds, or a number with a unit
/// (`ns`, `us`, `ms`, `s`, `m`/`min`, `h`).
pub fn parse_duration(s: &str) -> Result<Duration, String> {
    let s = s.trim();
    if s.is_empty() {
        return Err("empty duration".to_string());
    }

    // Find where the number ends and unit begins
    let (num_part, unit_part) = s
        .char_indices()
        .find(|(_, c)| c.is_alphabetic())
        .map(|(i, _)| s.split_at(i))
        .unwrap_or((s, "s"));

    let value: f64 = num_part
        .trim()
        .parse()
        .map_err(|_| format!("invalid duration number: {}", num_part))?;
    if !value.is_finite() || value < 0.0 {
        return Err(format!("duration must be non-negative: {}", num_part));
    }

    let multiplier: u64 = match unit_part.to_lowercase().as_str() {
        "ns" => 1,
        "us" | "µs" => 1_000,
        "ms" => 1_000_000,
        "s" | "" => 1_000_000_000,
        "m" | "min" => 60_000_000_000,
        "h" => 3_600_000_000_000,
        _ => return Err(format!("unknown duration unit: {}", unit_part)),
    };

    Ok(Duration::from_nanos((value * multiplier as f64) as u64))
}
