//! System Metadata Collection
//!
//! Collects the run configuration and host information recorded at the top
//! of every report.

use crate::supervisor::ToolkitCommand;
use chrono::Utc;
use learntest_compare::Tolerance;
use learntest_core::{Platform, RunConfiguration, TimeoutLimit};
use learntest_report::{ReportConfig, ReportMeta, SCHEMA_VERSION, SystemInfo};
use std::path::Path;

/// Build report metadata including system info and the run configuration
pub fn build_report_meta(
    root: &Path,
    config: &RunConfiguration,
    command: &ToolkitCommand,
    jobs: usize,
    tolerance: Tolerance,
) -> ReportMeta {
    let system = SystemInfo {
        os: std::env::consts::OS.to_string(),
        arch: std::env::consts::ARCH.to_string(),
        platform: Platform::current(),
        cpu_cores: num_cpus(),
    };

    let timeout_policy = match config.timeout_limit {
        TimeoutLimit::Automatic => "automatic".to_string(),
        TimeoutLimit::Fixed(limit) => format!("{}s", limit.as_secs_f64()),
    };

    ReportMeta {
        schema_version: SCHEMA_VERSION,
        version: env!("CARGO_PKG_VERSION").to_string(),
        timestamp: Utc::now(),
        root: root.display().to_string(),
        system,
        config: ReportConfig {
            toolkit: command.binary.display().to_string(),
            comparison_platform: config.effective_platform(),
            parallel_process_count: config.parallel_process_count,
            jobs,
            timeout_policy,
            absolute_tolerance: tolerance.absolute,
            relative_tolerance: tolerance.relative,
        },
    }
}

/// Get number of available CPU cores
fn num_cpus() -> u32 {
    std::thread::available_parallelism()
        .map(|n| n.get() as u32)
        .unwrap_or(1)
}

#[cfg(test)]
pub(crate) mod tests {
    use super::*;
    use std::time::Duration;

    pub(crate) fn sample_meta() -> ReportMeta {
        build_report_meta(
            Path::new("/corpus"),
            &RunConfiguration::default(),
            &ToolkitCommand::new("MODL"),
            1,
            Tolerance::default(),
        )
    }

    #[test]
    fn test_meta_records_configuration() {
        let config = RunConfiguration {
            timeout_limit: TimeoutLimit::Fixed(Duration::from_secs(90)),
            comparison_platform: Some(Platform::WindowsMsvc),
            parallel_process_count: 4,
            ..Default::default()
        };
        let meta = build_report_meta(
            Path::new("/corpus"),
            &config,
            &ToolkitCommand::new("MODL"),
            2,
            Tolerance::default(),
        );
        assert_eq!(meta.config.timeout_policy, "90s");
        assert_eq!(meta.config.comparison_platform, Platform::WindowsMsvc);
        assert_eq!(meta.config.parallel_process_count, 4);
        assert_eq!(meta.config.jobs, 2);
        assert!(meta.system.cpu_cores >= 1);
    }

    #[test]
    fn test_automatic_timeout_policy() {
        assert_eq!(sample_meta().config.timeout_policy, "automatic");
    }
}
