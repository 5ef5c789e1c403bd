//! Supervisor Process
//!
//! Runs the toolkit once per test case and turns whatever happens into
//! exactly one [`RunRecord`].
//!
//! Each run is placed in its own process group, so the launcher and every
//! cooperating worker it starts can be signalled as one unit. The
//! supervisor never polls the child directly: a waiter thread reports the
//! exit through a channel and the supervisor blocks on that channel in
//! short slices, checking the deadline and the abort flag in between.
//!
//! On timeout or abort: SIGTERM to the group, a grace period, then SIGKILL.

use crate::abort::AbortSignal;
use chrono::Utc;
use learntest_core::{
    ERROR_FILE, ExitStatus, OUTPUT_SCENARIO_FILE, RESULTS_DIR, RunConfiguration, RunRecord,
    SCENARIO_FILE, STDOUT_ERROR_FILE, TASK_LOG_FILE, TestCase, TimeLog, vars,
};
use std::io::Read;
use std::os::unix::process::{CommandExt, ExitStatusExt};
use std::path::{Path, PathBuf};
use std::process::{Child, Command, Stdio};
use std::sync::Arc;
use std::sync::mpsc::{self, Receiver, RecvTimeoutError};
use std::thread::JoinHandle;
use std::time::{Duration, Instant};
use thiserror::Error;

/// Longest uninterrupted wait on the child
const WAIT_SLICE: Duration = Duration::from_millis(100);

/// Default delay between SIGTERM and SIGKILL
pub const DEFAULT_KILL_GRACE: Duration = Duration::from_millis(500);

/// Launcher exit codes from this value up report a worker killed by a signal
const LAUNCHER_SIGNAL_EXIT: i32 = 128;

/// Errors that keep a toolkit run from completing normally
#[derive(Debug, Error)]
pub enum SupervisorError {
    /// The results directory could not be cleared or created
    #[error("Failed to prepare results directory {path}: {source}")]
    PrepareFailed {
        /// Results directory
        path: PathBuf,
        /// Underlying error
        #[source]
        source: std::io::Error,
    },

    /// The toolkit or launcher could not be started
    #[error("Failed to spawn {program}: {source}")]
    SpawnFailed {
        /// Program that failed to start
        program: String,
        /// Underlying error
        #[source]
        source: std::io::Error,
    },

    /// Waiting on the child failed
    #[error("Failed to wait for toolkit: {0}")]
    WaitFailed(#[source] std::io::Error),
}

/// How to start the toolkit
#[derive(Debug, Clone)]
pub struct ToolkitCommand {
    /// Toolkit executable
    pub binary: PathBuf,
    /// Message-passing launcher, used in parallel mode
    pub launcher: PathBuf,
    /// Extra launcher arguments, placed before `-n N`
    pub launcher_args: Vec<String>,
    /// Delay between SIGTERM and SIGKILL
    pub kill_grace: Duration,
}

impl ToolkitCommand {
    /// Toolkit command with the default launcher
    pub fn new(binary: impl AsRef<str>) -> Self {
        Self {
            binary: resolve_program(binary.as_ref()),
            launcher: resolve_program("mpiexec"),
            launcher_args: Vec::new(),
            kill_grace: DEFAULT_KILL_GRACE,
        }
    }

    /// Use another launcher
    pub fn with_launcher(mut self, launcher: impl AsRef<str>, args: Vec<String>) -> Self {
        self.launcher = resolve_program(launcher.as_ref());
        self.launcher_args = args;
        self
    }

    /// Use another kill grace period
    pub fn with_kill_grace(mut self, grace: Duration) -> Self {
        self.kill_grace = grace;
        self
    }
}

/// Relative paths with a directory part are anchored at the current
/// directory, since the toolkit runs from the test directory. Bare names are
/// left to PATH lookup.
fn resolve_program(program: &str) -> PathBuf {
    let path = Path::new(program);
    if path.is_relative() && path.components().count() > 1 {
        std::path::absolute(path).unwrap_or_else(|_| path.to_path_buf())
    } else {
        path.to_path_buf()
    }
}

/// How the wait loop ended
enum WaitOutcome {
    Exited(std::io::Result<std::process::ExitStatus>),
    TimedOut(Option<std::process::ExitStatus>),
    Aborted(Option<std::process::ExitStatus>),
}

/// Runs test cases under a shared configuration
pub struct Supervisor {
    config: Arc<RunConfiguration>,
    command: ToolkitCommand,
    time_log: Arc<TimeLog>,
    abort: AbortSignal,
}

impl Supervisor {
    /// Create a new supervisor
    pub fn new(
        config: Arc<RunConfiguration>,
        command: ToolkitCommand,
        time_log: Arc<TimeLog>,
        abort: AbortSignal,
    ) -> Self {
        Self {
            config,
            command,
            time_log,
            abort,
        }
    }

    /// Shared run configuration
    pub fn config(&self) -> &RunConfiguration {
        &self.config
    }

    /// Abort flag of this run
    pub fn abort_signal(&self) -> &AbortSignal {
        &self.abort
    }

    /// Watchdog limit for a test case
    pub fn timeout_for(&self, case: &TestCase) -> Duration {
        self.config.timeout_limit.for_history(case.historical_run_time)
    }

    /// Absolute path of the memory statistics log for a test, when enabled
    pub fn mem_stats_log_path(&self, case: &TestCase) -> Option<PathBuf> {
        let name = self.config.mem_stats.log_file_name.as_ref()?;
        let path = case.produced_results_dir().join(name);
        Some(std::path::absolute(&path).unwrap_or(path))
    }

    /// Full command line for a test case: program, then arguments
    pub fn command_line(&self) -> (PathBuf, Vec<String>) {
        let mut toolkit_args = Vec::new();
        if self.config.batch_mode {
            toolkit_args.push("-b".to_string());
        }
        toolkit_args.push("-i".to_string());
        toolkit_args.push(SCENARIO_FILE.to_string());
        toolkit_args.push("-e".to_string());
        toolkit_args.push(format!("{}/{}", RESULTS_DIR, ERROR_FILE));
        if self.config.task_file_mode {
            toolkit_args.push("-t".to_string());
            toolkit_args.push(format!("{}/{}", RESULTS_DIR, TASK_LOG_FILE));
        }
        if self.config.output_scenario_mode {
            toolkit_args.push("-o".to_string());
            toolkit_args.push(format!("{}/{}", RESULTS_DIR, OUTPUT_SCENARIO_FILE));
        }

        if !self.config.is_parallel() {
            return (self.command.binary.clone(), toolkit_args);
        }

        let mut args = self.command.launcher_args.clone();
        args.push("-n".to_string());
        args.push(self.config.parallel_process_count.to_string());
        args.push(self.command.binary.to_string_lossy().into_owned());
        args.extend(toolkit_args);
        (self.command.launcher.clone(), args)
    }

    /// Execute one test case. Never fails: every problem becomes the status
    /// of the returned record.
    pub fn run_test(&self, case: &TestCase) -> RunRecord {
        let timeout = self.timeout_for(case);
        let start_time = Utc::now();
        let start = Instant::now();

        let mut record = RunRecord {
            test_case: case.clone(),
            start_time,
            end_time: start_time,
            elapsed: Duration::ZERO,
            timeout,
            exit_status: ExitStatus::Crashed,
            exit_code: None,
            signal: None,
            produced_results_path: case.produced_results_dir(),
            stdout: String::new(),
            stderr: String::new(),
            aborted: false,
        };

        tracing::debug!(test = %case.id, timeout_secs = timeout.as_secs_f64(), "starting toolkit");

        match self.execute(case, timeout, start) {
            Ok((outcome, stdout, stderr)) => {
                record.stdout = stdout;
                record.stderr = stderr;
                self.classify(&mut record, outcome);
            }
            Err(e) => {
                tracing::warn!(test = %case.id, "{}", e);
                record.stderr = e.to_string();
            }
        }

        record.elapsed = start.elapsed();
        record.end_time = Utc::now();

        write_output_capture(&record);

        if record.aborted {
            tracing::info!(test = %case.id, "aborted");
        } else {
            if let Err(e) = self.time_log.record(&record) {
                tracing::warn!(test = %case.id, "failed to update time log: {}", e);
            }
            tracing::info!(
                test = %case.id,
                status = %record.exit_status,
                elapsed_secs = record.elapsed.as_secs_f64(),
                "toolkit finished"
            );
        }
        record
    }

    fn execute(
        &self,
        case: &TestCase,
        timeout: Duration,
        start: Instant,
    ) -> Result<(WaitOutcome, String, String), SupervisorError> {
        let results = case.produced_results_dir();
        prepare_results_dir(&results)?;

        let mut child = self.spawn(case)?;
        let pgid = child.id() as libc::pid_t;

        let stdout = drain(child.stdout.take());
        let stderr = drain(child.stderr.take());
        let exit = wait_in_background(child);

        // No deadline when the limit is beyond what the clock can represent
        let deadline = start.checked_add(timeout);
        let outcome = loop {
            if self.abort.is_requested() {
                break WaitOutcome::Aborted(self.kill_group(pgid, &exit));
            }
            let remaining = deadline.map(|d| d.saturating_duration_since(Instant::now()));
            if remaining == Some(Duration::ZERO) {
                tracing::warn!(test = %case.id, "timeout after {:.1}s, killing", timeout.as_secs_f64());
                break WaitOutcome::TimedOut(self.kill_group(pgid, &exit));
            }
            let slice = remaining.map_or(WAIT_SLICE, |r| r.min(WAIT_SLICE));
            match exit.recv_timeout(slice) {
                Ok(status) => break WaitOutcome::Exited(status),
                Err(RecvTimeoutError::Timeout) => continue,
                Err(RecvTimeoutError::Disconnected) => {
                    break WaitOutcome::Exited(Err(std::io::Error::other("waiter thread exited")));
                }
            }
        };

        // Stray workers of the group must not outlive the run
        signal_group(pgid, libc::SIGKILL);

        Ok((outcome, join_output(stdout), join_output(stderr)))
    }

    fn spawn(&self, case: &TestCase) -> Result<Child, SupervisorError> {
        let (program, args) = self.command_line();
        let mut command = Command::new(&program);
        command
            .args(&args)
            .current_dir(&case.dir)
            .stdin(Stdio::null())
            .stdout(Stdio::piped())
            .stderr(Stdio::piped())
            .process_group(0);

        for name in vars::ALL {
            command.env_remove(name);
        }
        let mem_stats_log = self
            .mem_stats_log_path(case)
            .map(|p| p.to_string_lossy().into_owned());
        for (name, value) in self.config.toolkit_env(mem_stats_log.as_deref()) {
            command.env(name, value);
        }

        command.spawn().map_err(|source| SupervisorError::SpawnFailed {
            program: program.display().to_string(),
            source,
        })
    }

    /// SIGTERM, grace period, SIGKILL. Returns the exit status if the
    /// waiter reported one.
    fn kill_group(
        &self,
        pgid: libc::pid_t,
        exit: &Receiver<std::io::Result<std::process::ExitStatus>>,
    ) -> Option<std::process::ExitStatus> {
        signal_group(pgid, libc::SIGTERM);
        if let Ok(status) = exit.recv_timeout(self.command.kill_grace) {
            return status.ok();
        }
        signal_group(pgid, libc::SIGKILL);
        exit.recv().ok().and_then(Result::ok)
    }

    fn classify(&self, record: &mut RunRecord, outcome: WaitOutcome) {
        let status = match outcome {
            WaitOutcome::TimedOut(status) => {
                record.exit_status = ExitStatus::TimedOut;
                record.signal = status.and_then(|s| s.signal());
                return;
            }
            WaitOutcome::Aborted(status) => {
                record.exit_status = ExitStatus::Crashed;
                record.aborted = true;
                record.signal = status.and_then(|s| s.signal());
                return;
            }
            WaitOutcome::Exited(Err(e)) => {
                record.exit_status = ExitStatus::Crashed;
                record.stderr.push_str(&SupervisorError::WaitFailed(e).to_string());
                return;
            }
            WaitOutcome::Exited(Ok(status)) => status,
        };

        record.exit_code = status.code();
        record.signal = status.signal();
        record.exit_status = match (status.code(), status.signal()) {
            (Some(0), _) => ExitStatus::Ok,
            // The launcher reports a worker killed by a signal as 128 + signal
            (Some(code), _) if self.config.is_parallel() && code >= LAUNCHER_SIGNAL_EXIT => {
                ExitStatus::Crashed
            }
            (Some(_), _) => ExitStatus::NonzeroExit,
            (None, _) => ExitStatus::Crashed,
        };
    }
}

fn prepare_results_dir(path: &Path) -> Result<(), SupervisorError> {
    let prepare = || -> std::io::Result<()> {
        if path.exists() {
            std::fs::remove_dir_all(path)?;
        }
        std::fs::create_dir_all(path)
    };
    prepare().map_err(|source| SupervisorError::PrepareFailed {
        path: path.to_path_buf(),
        source,
    })
}

/// Send a signal to a whole process group. ESRCH (already gone) is ignored.
fn signal_group(pgid: libc::pid_t, signal: libc::c_int) {
    if pgid <= 0 {
        return;
    }
    unsafe {
        libc::kill(-pgid, signal);
    }
}

fn wait_in_background(
    mut child: Child,
) -> Receiver<std::io::Result<std::process::ExitStatus>> {
    let (tx, rx) = mpsc::channel();
    std::thread::spawn(move || {
        let _ = tx.send(child.wait());
    });
    rx
}

fn drain<R: Read + Send + 'static>(pipe: Option<R>) -> Option<JoinHandle<String>> {
    let mut pipe = pipe?;
    Some(std::thread::spawn(move || {
        let mut buf = Vec::new();
        let _ = pipe.read_to_end(&mut buf);
        String::from_utf8_lossy(&buf).into_owned()
    }))
}

fn join_output(handle: Option<JoinHandle<String>>) -> String {
    handle
        .and_then(|h| h.join().ok())
        .unwrap_or_default()
}

/// Keep the toolkit's textual output next to its results, where
/// expected-failure references capture it.
fn write_output_capture(record: &RunRecord) {
    if record.stdout.is_empty() && record.stderr.is_empty() {
        return;
    }
    let dir = &record.produced_results_path;
    if !dir.is_dir() {
        return;
    }
    let content = format!("{}{}", record.stdout, record.stderr);
    if let Err(e) = std::fs::write(dir.join(STDOUT_ERROR_FILE), content) {
        tracing::warn!(test = %record.test_id(), "failed to write {}: {}", STDOUT_ERROR_FILE, e);
    }
}
