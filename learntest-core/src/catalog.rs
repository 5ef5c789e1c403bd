//! Test Catalog
//!
//! Discovers test cases under a corpus root. A test case is any directory
//! holding a scenario file; its reference results live next to it, one tree
//! per platform (`results.ref.linux-gcc`, ...) with an optional plain
//! `results.ref` shared by every platform that has no tree of its own.

use crate::platform::Platform;
use crate::time_log::TimeLog;
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::path::{Path, PathBuf};
use std::time::Duration;
use thiserror::Error;
use walkdir::WalkDir;

/// Scenario file that marks a directory as a test case
pub const SCENARIO_FILE: &str = "test.prm";

/// Directory the toolkit writes its results into
pub const RESULTS_DIR: &str = "results";

/// Prefix of reference result directories
pub const REFERENCE_DIR: &str = "results.ref";

/// Error log the toolkit writes into the results directory
pub const ERROR_FILE: &str = "err.txt";

/// Task progress log, written when task file mode is on
pub const TASK_LOG_FILE: &str = "task.log";

/// Replayable output scenario, written when output scenario mode is on
pub const OUTPUT_SCENARIO_FILE: &str = "test.output.prm";

/// Captured standard output and error of the toolkit
pub const STDOUT_ERROR_FILE: &str = "stdout_error.log";

/// Catalog discovery errors
#[derive(Debug, Error)]
pub enum CatalogError {
    /// The corpus root does not exist or is not a directory
    #[error("Test root not found: {0}")]
    RootNotFound(PathBuf),

    /// Directory traversal failed
    #[error("Failed to walk test tree: {0}")]
    Walk(#[from] walkdir::Error),

    /// Any other I/O failure
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),
}

/// A single regression test case
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TestCase {
    /// Identifier: the test directory relative to the corpus root, `/` separated
    pub id: String,
    /// Test directory (working directory of the toolkit)
    pub dir: PathBuf,
    /// Scenario script given to the toolkit
    pub scenario_path: PathBuf,
    /// Last measured run time, from the elapsed-time log
    pub historical_run_time: Option<Duration>,
    /// Reference result tree per platform
    pub reference_results_by_platform: BTreeMap<Platform, PathBuf>,
}

impl TestCase {
    /// Create a test case rooted at `dir` with no history and no references
    pub fn new(id: impl Into<String>, dir: impl Into<PathBuf>) -> Self {
        let dir = dir.into();
        Self {
            id: id.into(),
            scenario_path: dir.join(SCENARIO_FILE),
            dir,
            historical_run_time: None,
            reference_results_by_platform: BTreeMap::new(),
        }
    }

    /// Set the historical run time
    pub fn with_history(mut self, elapsed: Duration) -> Self {
        self.historical_run_time = Some(elapsed);
        self
    }

    /// Register a reference tree for a platform
    pub fn with_reference(mut self, platform: Platform, path: impl Into<PathBuf>) -> Self {
        self.reference_results_by_platform.insert(platform, path.into());
        self
    }

    /// Where the toolkit writes results for this test
    pub fn produced_results_dir(&self) -> PathBuf {
        self.dir.join(RESULTS_DIR)
    }

    /// Reference tree registered for `platform`
    pub fn reference_for(&self, platform: Platform) -> Option<&Path> {
        self.reference_results_by_platform
            .get(&platform)
            .map(PathBuf::as_path)
    }
}

/// Discover every test case under `root`, in deterministic catalog order.
///
/// Directories are walked sorted by name; result and reference trees are not
/// descended into.
pub fn discover(root: &Path, time_log: &TimeLog) -> Result<Vec<TestCase>, CatalogError> {
    if !root.is_dir() {
        return Err(CatalogError::RootNotFound(root.to_path_buf()));
    }

    let mut cases = Vec::new();
    let walker = WalkDir::new(root)
        .sort_by_file_name()
        .into_iter()
        .filter_entry(|entry| {
            entry.depth() == 0 || !(entry.file_type().is_dir() && is_results_dir(entry.file_name()))
        });

    for entry in walker {
        let entry = entry?;
        if !entry.file_type().is_file() || entry.file_name() != SCENARIO_FILE {
            continue;
        }
        let Some(dir) = entry.path().parent() else {
            continue;
        };

        let id = test_id(root, dir);
        let mut case = TestCase::new(id, dir);
        case.reference_results_by_platform = find_references(dir)?;
        case.historical_run_time = time_log.history(&case.id);
        tracing::debug!(
            test = %case.id,
            references = case.reference_results_by_platform.len(),
            "discovered test case"
        );
        cases.push(case);
    }

    Ok(cases)
}

fn is_results_dir(name: &std::ffi::OsStr) -> bool {
    name.to_str()
        .is_some_and(|n| n == RESULTS_DIR || n.starts_with(REFERENCE_DIR))
}

fn test_id(root: &Path, dir: &Path) -> String {
    let relative = dir.strip_prefix(root).unwrap_or(dir);
    let parts: Vec<String> = relative
        .components()
        .map(|c| c.as_os_str().to_string_lossy().into_owned())
        .collect();
    if parts.is_empty() {
        // The root itself is a test case
        root.file_name()
            .map(|n| n.to_string_lossy().into_owned())
            .unwrap_or_else(|| ".".to_string())
    } else {
        parts.join("/")
    }
}

fn find_references(dir: &Path) -> Result<BTreeMap<Platform, PathBuf>, CatalogError> {
    let mut shared = None;
    let mut references = BTreeMap::new();

    for entry in std::fs::read_dir(dir)? {
        let entry = entry?;
        if !entry.file_type()?.is_dir() {
            continue;
        }
        let name = entry.file_name();
        let Some(name) = name.to_str() else {
            continue;
        };

        if name == REFERENCE_DIR {
            shared = Some(entry.path());
        } else if let Some(suffix) = name.strip_prefix(REFERENCE_DIR) {
            let suffix = suffix.trim_start_matches(['.', '-', '_']);
            match suffix.parse::<Platform>() {
                Ok(platform) => {
                    references.insert(platform, entry.path());
                }
                Err(reason) => {
                    tracing::warn!(dir = %entry.path().display(), "ignoring reference tree: {}", reason);
                }
            }
        }
    }

    if let Some(shared) = shared {
        for platform in Platform::ALL {
            references.entry(platform).or_insert_with(|| shared.clone());
        }
    }

    Ok(references)
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::fs;
    use tempfile::TempDir;

    fn make_test(root: &Path, id: &str, refs: &[&str]) {
        let dir = root.join(id);
        fs::create_dir_all(&dir).unwrap();
        fs::write(dir.join(SCENARIO_FILE), "// scenario\n").unwrap();
        for r in refs {
            fs::create_dir_all(dir.join(r)).unwrap();
        }
    }

    #[test]
    fn test_discovery_order_and_ids() {
        let temp = TempDir::new().unwrap();
        make_test(temp.path(), "Standard/Iris", &[REFERENCE_DIR]);
        make_test(temp.path(), "Standard/Adult", &[REFERENCE_DIR]);
        make_test(temp.path(), "Bugs/B12", &[]);
        // A scenario inside a results tree is not a test
        make_test(temp.path(), "Standard/Iris/results", &[]);

        let log = TimeLog::open(temp.path().join("time.log")).unwrap();
        let cases = discover(temp.path(), &log).unwrap();
        let ids: Vec<_> = cases.iter().map(|c| c.id.as_str()).collect();

        assert_eq!(ids, vec!["Bugs/B12", "Standard/Adult", "Standard/Iris"]);
        assert_eq!(
            cases[2].scenario_path,
            temp.path().join("Standard/Iris").join(SCENARIO_FILE)
        );
    }

    #[test]
    fn test_platform_specific_references_override_shared() {
        let temp = TempDir::new().unwrap();
        make_test(
            temp.path(),
            "T1",
            &[REFERENCE_DIR, "results.ref.windows-msvc", "results.ref-Darwin"],
        );

        let log = TimeLog::open(temp.path().join("time.log")).unwrap();
        let cases = discover(temp.path(), &log).unwrap();
        let case = &cases[0];
        let dir = temp.path().join("T1");

        assert_eq!(
            case.reference_for(Platform::LinuxGcc),
            Some(dir.join(REFERENCE_DIR).as_path())
        );
        assert_eq!(
            case.reference_for(Platform::WindowsMsvc),
            Some(dir.join("results.ref.windows-msvc").as_path())
        );
        assert_eq!(
            case.reference_for(Platform::MacosClang),
            Some(dir.join("results.ref-Darwin").as_path())
        );
    }

    #[test]
    fn test_no_shared_reference_means_missing_platforms() {
        let temp = TempDir::new().unwrap();
        make_test(temp.path(), "T1", &["results.ref.linux-gcc"]);

        let log = TimeLog::open(temp.path().join("time.log")).unwrap();
        let cases = discover(temp.path(), &log).unwrap();
        assert!(cases[0].reference_for(Platform::LinuxGcc).is_some());
        assert!(cases[0].reference_for(Platform::MacosClang).is_none());
    }

    #[test]
    fn test_missing_root() {
        let temp = TempDir::new().unwrap();
        let log = TimeLog::open(temp.path().join("time.log")).unwrap();
        let err = discover(&temp.path().join("nope"), &log).unwrap_err();
        assert!(matches!(err, CatalogError::RootNotFound(_)));
    }
}
