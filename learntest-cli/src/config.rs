//! Configuration loading from learntest.toml
//!
//! Settings that describe the local installation (toolkit binary, launcher,
//! worker pool width, comparison tolerance) live in a `learntest.toml` file,
//! discovered by walking up from the current directory. Settings that change
//! what the toolkit does stay in the `KHIOPS_*` environment variables.

use serde::{Deserialize, Serialize};
use std::path::Path;

/// Configuration file name
pub const CONFIG_FILE: &str = "learntest.toml";

/// LearnTest configuration
#[derive(Debug, Clone, Serialize, Deserialize, Default)]
pub struct LearnTestConfig {
    /// Toolkit and launcher
    #[serde(default)]
    pub toolkit: ToolkitConfig,
    /// Runner configuration
    #[serde(default)]
    pub runner: RunnerConfig,
    /// Result comparison
    #[serde(default)]
    pub comparison: ComparisonConfig,
    /// Output configuration
    #[serde(default)]
    pub output: OutputConfig,
}

/// Toolkit executable and message-passing launcher
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ToolkitConfig {
    /// Toolkit binary, a path or a name looked up in PATH
    #[serde(default = "default_binary")]
    pub binary: String,
    /// Launcher used when KHIOPS_MPI_PROCESS_NUMBER is set
    #[serde(default = "default_launcher")]
    pub launcher: String,
    /// Extra launcher arguments, placed before `-n N`
    #[serde(default)]
    pub launcher_args: Vec<String>,
}

impl Default for ToolkitConfig {
    fn default() -> Self {
        Self {
            binary: default_binary(),
            launcher: default_launcher(),
            launcher_args: Vec::new(),
        }
    }
}

fn default_binary() -> String {
    "MODL".to_string()
}
fn default_launcher() -> String {
    "mpiexec".to_string()
}

/// Runner configuration for test execution
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RunnerConfig {
    /// Number of tests run concurrently (default: 1)
    #[serde(default)]
    pub jobs: Option<usize>,
    /// Elapsed-time log, relative to the corpus root
    #[serde(default = "default_time_log")]
    pub time_log: String,
    /// Delay between SIGTERM and SIGKILL when a run is killed (e.g. "500ms")
    #[serde(default = "default_kill_grace")]
    pub kill_grace: String,
}

impl Default for RunnerConfig {
    fn default() -> Self {
        Self {
            jobs: None,
            time_log: default_time_log(),
            kill_grace: default_kill_grace(),
        }
    }
}

fn default_time_log() -> String {
    learntest_core::TIME_LOG_FILE.to_string()
}
fn default_kill_grace() -> String {
    "500ms".to_string()
}

/// Result comparison configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ComparisonConfig {
    /// Largest accepted absolute difference between numeric fields
    #[serde(default = "default_tolerance")]
    pub absolute_tolerance: f64,
    /// Largest accepted relative difference between numeric fields
    #[serde(default = "default_tolerance")]
    pub relative_tolerance: f64,
    /// Files never compared, by name or path relative to the results directory
    #[serde(default)]
    pub ignored_files: Vec<String>,
}

impl Default for ComparisonConfig {
    fn default() -> Self {
        Self {
            absolute_tolerance: default_tolerance(),
            relative_tolerance: default_tolerance(),
            ignored_files: Vec::new(),
        }
    }
}

fn default_tolerance() -> f64 {
    1e-6
}

/// Output configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct OutputConfig {
    /// Default output format: "human", "json", "github"
    #[serde(default = "default_format")]
    pub format: String,
    /// Write the report to this file instead of stdout
    #[serde(default)]
    pub report_path: Option<String>,
}

impl Default for OutputConfig {
    fn default() -> Self {
        Self {
            format: default_format(),
            report_path: None,
        }
    }
}

fn default_format() -> String {
    "human".to_string()
}

impl LearnTestConfig {
    /// Load configuration from a TOML file
    pub fn load(path: impl AsRef<Path>) -> anyhow::Result<Self> {
        let content = std::fs::read_to_string(path.as_ref())?;
        let config: Self = toml::from_str(&content)?;
        Ok(config)
    }

    /// Try to discover and load configuration by walking up from current directory
    pub fn discover() -> Option<Self> {
        let dir = std::env::current_dir().ok()?;
        Self::discover_from(&dir)
    }

    /// Walk up from `start` and load the first configuration file found
    pub fn discover_from(start: &Path) -> Option<Self> {
        let mut dir = start.to_path_buf();
        loop {
            let config_path = dir.join(CONFIG_FILE);
            if config_path.exists() {
                return match Self::load(&config_path) {
                    Ok(config) => {
                        tracing::debug!(path = %config_path.display(), "loaded configuration");
                        Some(config)
                    }
                    Err(e) => {
                        tracing::warn!(path = %config_path.display(), "ignoring configuration: {}", e);
                        None
                    }
                };
            }
            if !dir.pop() {
                break;
            }
        }
        None
    }

    /// Generate a default configuration as TOML string
    pub fn default_toml() -> String {
        r#"# LearnTest Configuration

[toolkit]
# Toolkit binary (path, or name looked up in PATH)
binary = "MODL"
# Message-passing launcher, used when KHIOPS_MPI_PROCESS_NUMBER is set
launcher = "mpiexec"
# Extra launcher arguments (uncomment to enable)
# launcher_args = ["--oversubscribe"]

[runner]
# Number of tests run concurrently (uncomment to enable)
# jobs = 4
# Elapsed-time log, relative to the test root
time_log = "time.log"
# Delay between SIGTERM and SIGKILL when a run is killed
kill_grace = "500ms"

[comparison]
# Numeric fields match within the absolute OR the relative tolerance
absolute_tolerance = 1e-6
relative_tolerance = 1e-6
# Files never compared (uncomment to enable)
# ignored_files = ["timings.txt"]

[output]
# Default output format: human, json, github
format = "human"
# Write the report to a file (uncomment to enable)
# report_path = "learntest-report.json"
"#
        .to_string()
    }
}
