#![warn(missing_docs)]
//! LearnTest CLI Library
//!
//! Command line front end of the regression runner. Use `learntest_cli::run()`
//! in a main function to get the full CLI: settings resolution, catalog
//! discovery, planning, supervised execution, comparison and reporting.
//!
//! # Example
//!
//! ```ignore
//! fn main() {
//!     match learntest_cli::run() {
//!         Ok(code) => std::process::exit(code),
//!         Err(e) => {
//!             eprintln!("Error: {:#}", e);
//!             std::process::exit(learntest_cli::exit_code_for_error(&e));
//!         }
//!     }
//! }
//! ```

mod abort;
mod config;
mod executor;
mod planner;
mod supervisor;

pub use abort::{AbortSignal, install_abort_handler};
pub use config::*;
pub use executor::{
    ExecutionConfig, Executor, RunReporter, TestExecutionResult, build_report_meta,
    format_human_output, format_plan,
};
pub use planner::{ExecutionPlan, SkipReason, build_plan};
pub use supervisor::*;

use clap::{Parser, Subcommand};
use learntest_compare::{ResultComparator, Tolerance};
use learntest_core::{
    CatalogError, ConfigError, EnvSettings, RunConfiguration, TimeLog, discover, parse_duration,
};
use learntest_report::{
    INVALID_CONFIGURATION_EXIT_CODE, OutputFormat, Report, generate_github_summary,
    generate_json_report,
};
use regex::Regex;
use std::io::Write;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::Instant;

/// Exit code for failures that are neither test outcomes nor configuration
/// errors (unreadable time log, unwritable report, ...)
pub const INTERNAL_ERROR_EXIT_CODE: i32 = 70;

/// LearnTest CLI arguments
#[derive(Parser, Debug)]
#[command(name = "learntest")]
#[command(
    author,
    version,
    about = "LearnTest - regression test runner for native analytics toolkits"
)]
pub struct Cli {
    /// Optional subcommand (List, Run); defaults to Run
    #[command(subcommand)]
    pub command: Option<Commands>,

    /// Root of the test tree
    #[arg(default_value = ".")]
    pub root: PathBuf,

    /// Run only tests whose ID matches this regex
    #[arg(long)]
    pub filter: Option<String>,

    /// Output format: human, json, github
    #[arg(long)]
    pub format: Option<OutputFormat>,

    /// Output file (stdout if not specified)
    #[arg(short, long)]
    pub output: Option<PathBuf>,

    /// Number of tests run concurrently
    #[arg(short, long)]
    pub jobs: Option<usize>,

    /// Toolkit binary
    #[arg(long)]
    pub toolkit: Option<String>,

    /// Message-passing launcher used in parallel mode
    #[arg(long)]
    pub launcher: Option<String>,

    /// Dry run - list selected tests without executing
    #[arg(long)]
    pub dry_run: bool,

    /// Verbose output
    #[arg(short, long)]
    pub verbose: bool,
}

/// CLI subcommands
#[derive(Subcommand, Debug, Clone, Copy, PartialEq, Eq)]
pub enum Commands {
    /// List the selected tests and why others were skipped
    List,
    /// Run the selected tests (default)
    Run,
}

/// Run the LearnTest CLI with the process arguments.
///
/// # Returns
/// The process exit code: the worst outcome class of the run, or 0 for
/// listings.
pub fn run() -> anyhow::Result<i32> {
    let cli = Cli::parse();
    run_with_cli(cli)
}

/// Run the LearnTest CLI with pre-parsed arguments.
pub fn run_with_cli(cli: Cli) -> anyhow::Result<i32> {
    init_logging(cli.verbose);

    // Settings come from the environment; nothing runs on a bad value
    let settings = RunConfiguration::resolve(&EnvSettings)?;

    let root = std::path::absolute(&cli.root).unwrap_or_else(|_| cli.root.clone());
    if !root.is_dir() {
        return Err(CatalogError::RootNotFound(root).into());
    }

    // learntest.toml near the test tree, else near the current directory
    let config = LearnTestConfig::discover_from(&root)
        .or_else(LearnTestConfig::discover)
        .unwrap_or_default();

    let time_log_path = resolve_against(&root, &config.runner.time_log);
    let time_log = Arc::new(TimeLog::open(&time_log_path)?);
    tracing::debug!(path = %time_log_path.display(), entries = time_log.len(), "loaded time log");

    let filter = cli
        .filter
        .as_deref()
        .map(Regex::new)
        .transpose()
        .map_err(|e| ConfigError::InvalidConfiguration {
            name: "--filter".to_string(),
            value: cli.filter.clone().unwrap_or_default(),
            reason: e.to_string(),
        })?;

    let catalog = discover(&root, &time_log)?;
    let plan = build_plan(catalog, &settings, filter.as_ref());

    match cli.command {
        Some(Commands::List) => list_tests(&plan),
        Some(Commands::Run) | None if cli.dry_run => list_tests(&plan),
        Some(Commands::Run) | None => run_tests(&cli, &root, &config, settings, time_log, &plan),
    }
}

/// Process exit code for an error returned by [`run_with_cli`]
pub fn exit_code_for_error(error: &anyhow::Error) -> i32 {
    if error.downcast_ref::<ConfigError>().is_some()
        || matches!(
            error.downcast_ref::<CatalogError>(),
            Some(CatalogError::RootNotFound(_))
        )
    {
        INVALID_CONFIGURATION_EXIT_CODE
    } else {
        INTERNAL_ERROR_EXIT_CODE
    }
}

fn init_logging(verbose: bool) {
    let filter = if verbose {
        "learntest=debug"
    } else {
        "learntest=info"
    };
    // Logs go to stderr so JSON reports on stdout stay parseable
    let _ = tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(std::io::stderr)
        .try_init();
}

fn list_tests(plan: &ExecutionPlan) -> anyhow::Result<i32> {
    println!("LearnTest Plan:");
    print!("{}", format_plan(plan));
    Ok(0)
}

/// Relative paths are taken from the test root
fn resolve_against(root: &Path, path: &str) -> PathBuf {
    let path = Path::new(path);
    if path.is_absolute() {
        path.to_path_buf()
    } else {
        root.join(path)
    }
}

/// Build the toolkit command: learntest.toml first, CLI flags override
fn build_toolkit_command(cli: &Cli, config: &LearnTestConfig) -> ToolkitCommand {
    let binary = cli.toolkit.as_deref().unwrap_or(&config.toolkit.binary);
    let launcher = cli.launcher.as_deref().unwrap_or(&config.toolkit.launcher);

    let kill_grace = match parse_duration(&config.runner.kill_grace) {
        Ok(grace) => grace,
        Err(e) => {
            tracing::warn!(
                value = %config.runner.kill_grace,
                "invalid kill_grace ({}), using {:?}",
                e,
                DEFAULT_KILL_GRACE
            );
            DEFAULT_KILL_GRACE
        }
    };

    ToolkitCommand::new(binary)
        .with_launcher(launcher, config.toolkit.launcher_args.clone())
        .with_kill_grace(kill_grace)
}

fn resolve_format(cli: &Cli, config: &LearnTestConfig) -> OutputFormat {
    cli.format.unwrap_or_else(|| {
        config.output.format.parse().unwrap_or_else(|e| {
            tracing::warn!("{} in {}, using human output", e, CONFIG_FILE);
            OutputFormat::Human
        })
    })
}

fn run_tests(
    cli: &Cli,
    root: &Path,
    config: &LearnTestConfig,
    settings: RunConfiguration,
    time_log: Arc<TimeLog>,
    plan: &ExecutionPlan,
) -> anyhow::Result<i32> {
    let format = resolve_format(cli, config);
    let jobs = cli.jobs.or(config.runner.jobs).unwrap_or(1).max(1);
    let tolerance = Tolerance::new(
        config.comparison.absolute_tolerance,
        config.comparison.relative_tolerance,
    );

    let settings = Arc::new(settings);
    let command = build_toolkit_command(cli, config);
    let meta = build_report_meta(root, &settings, &command, jobs, tolerance);

    if plan.tests.is_empty() {
        println!("No tests selected.");
        return Ok(0);
    }

    let mode = if settings.is_parallel() {
        format!("parallel, {} processes", settings.parallel_process_count)
    } else {
        "serial".to_string()
    };
    eprintln!(
        "Running {} tests ({}), {} job(s), platform {}...\n",
        plan.tests.len(),
        mode,
        jobs,
        settings.effective_platform()
    );

    let abort = AbortSignal::new();
    install_abort_handler();

    let comparator = ResultComparator::new(&settings)
        .with_tolerance(tolerance)
        .with_ignored_files(config.comparison.ignored_files.iter());
    let supervisor = Supervisor::new(settings, command, time_log, abort.clone());
    let executor = Executor::new(
        supervisor,
        comparator,
        ExecutionConfig {
            jobs,
            show_progress: !cli.verbose,
        },
    );

    let start_time = Instant::now();
    let reporter = executor.execute(&plan.tests)?;
    let report = reporter.build_report(&plan.tests, meta, start_time.elapsed());

    if abort.is_requested() {
        tracing::warn!(
            completed = report.summary.total,
            skipped = report.summary.skipped,
            "run aborted"
        );
    }

    let output_path = cli
        .output
        .clone()
        .or_else(|| config.output.report_path.as_ref().map(PathBuf::from));
    write_output(&report, format, output_path.as_deref())?;

    let code = report.summary.exit_code();
    if code != 0 {
        eprintln!(
            "\n{} of {} test(s) failed (exit code {})",
            report.summary.failed, report.summary.total, code
        );
    }
    Ok(code)
}

fn render(report: &Report, format: OutputFormat) -> anyhow::Result<String> {
    Ok(match format {
        OutputFormat::Json => generate_json_report(report)?,
        OutputFormat::GithubSummary => generate_github_summary(report),
        OutputFormat::Human => format_human_output(report),
    })
}

fn write_output(report: &Report, format: OutputFormat, path: Option<&Path>) -> anyhow::Result<()> {
    let output = render(report, format)?;

    match path {
        Some(path) => {
            if let Some(parent) = path.parent().filter(|p| !p.as_os_str().is_empty()) {
                std::fs::create_dir_all(parent)?;
            }
            let mut file = std::fs::File::create(path)?;
            file.write_all(output.as_bytes())?;
            if format != OutputFormat::Human {
                print!("{}", format_human_output(report));
            }
            println!("Report written to: {}", path.display());
        }
        None => print!("{}", output),
    }

    Ok(())
}
