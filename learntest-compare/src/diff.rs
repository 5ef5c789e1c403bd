//! Structural Diff
//!
//! Walks a reference tree and a produced tree side by side. Every relative
//! path present on either side is compared; text files line by line and
//! field by field, anything else byte for byte. All differences are
//! collected, not just the first.

use crate::tolerance::{Tolerance, split_tokens};
use serde::{Deserialize, Serialize};
use std::collections::{BTreeSet, HashSet};
use std::path::{Path, PathBuf};
use thiserror::Error;
use walkdir::WalkDir;

/// Placeholder for the side of a difference that has no content
pub const ABSENT: &str = "<missing>";

/// Errors from reading result trees
#[derive(Debug, Error)]
pub enum CompareError {
    /// A result file could not be read
    #[error("Failed to read {path}: {source}")]
    Io {
        /// File being read
        path: PathBuf,
        /// Underlying error
        #[source]
        source: std::io::Error,
    },

    /// A result tree could not be walked
    #[error("Failed to walk {root}: {source}")]
    Walk {
        /// Tree root
        root: PathBuf,
        /// Underlying error
        #[source]
        source: walkdir::Error,
    },
}

/// One difference between a produced and a reference file
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct DiffDetail {
    /// Path relative to the result tree, `/` separated
    pub file: String,
    /// Where in the file: `file`, `content`, `line N`, `line N, field M`
    /// or `line N, field M, token K`
    pub location: String,
    /// Reference value
    pub expected: String,
    /// Produced value
    pub actual: String,
}

impl DiffDetail {
    fn new(
        file: &str,
        location: impl Into<String>,
        expected: impl Into<String>,
        actual: impl Into<String>,
    ) -> Self {
        Self {
            file: file.to_string(),
            location: location.into(),
            expected: expected.into(),
            actual: actual.into(),
        }
    }
}

impl std::fmt::Display for DiffDetail {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(
            f,
            "{} [{}]: expected {:?}, got {:?}",
            self.file, self.location, self.expected, self.actual
        )
    }
}

/// Files never compared, matched on file name or relative path
#[derive(Debug, Clone, Default)]
pub struct IgnoreSet {
    names: HashSet<String>,
}

impl IgnoreSet {
    /// Build from names or relative paths
    pub fn new<I, S>(names: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        Self {
            names: names.into_iter().map(Into::into).collect(),
        }
    }

    /// Add one entry
    pub fn insert(&mut self, name: impl Into<String>) {
        self.names.insert(name.into());
    }

    /// Whether a relative path is ignored
    pub fn contains(&self, relative: &str) -> bool {
        if self.names.contains(relative) {
            return true;
        }
        let file_name = relative.rsplit('/').next().unwrap_or(relative);
        self.names.contains(file_name)
    }
}

/// Relative paths of every comparable file under `root`, sorted.
///
/// A missing root is an empty tree.
pub fn list_files(root: &Path, ignored: &IgnoreSet) -> Result<BTreeSet<String>, CompareError> {
    let mut files = BTreeSet::new();
    if !root.is_dir() {
        return Ok(files);
    }

    for entry in WalkDir::new(root).sort_by_file_name() {
        let entry = entry.map_err(|source| CompareError::Walk {
            root: root.to_path_buf(),
            source,
        })?;
        if !entry.file_type().is_file() {
            continue;
        }
        let Ok(relative) = entry.path().strip_prefix(root) else {
            continue;
        };
        let relative = relative
            .components()
            .map(|c| c.as_os_str().to_string_lossy().into_owned())
            .collect::<Vec<_>>()
            .join("/");
        if !ignored.contains(&relative) {
            files.insert(relative);
        }
    }
    Ok(files)
}

/// Diff two result trees over the union of their files
pub fn diff_trees(
    reference_root: &Path,
    produced_root: &Path,
    ignored: &IgnoreSet,
    tolerance: &Tolerance,
) -> Result<Vec<DiffDetail>, CompareError> {
    let reference = list_files(reference_root, ignored)?;
    let produced = list_files(produced_root, ignored)?;

    let mut details = Vec::new();
    for file in reference.union(&produced) {
        match (reference.contains(file), produced.contains(file)) {
            (true, false) => details.push(DiffDetail::new(file, "file", "present", ABSENT)),
            (false, true) => details.push(DiffDetail::new(file, "file", ABSENT, "present")),
            _ => {
                let expected = read(&reference_root.join(file))?;
                let actual = read(&produced_root.join(file))?;
                details.extend(diff_contents(file, &expected, &actual, tolerance));
            }
        }
    }
    Ok(details)
}

fn read(path: &Path) -> Result<Vec<u8>, CompareError> {
    std::fs::read(path).map_err(|source| CompareError::Io {
        path: path.to_path_buf(),
        source,
    })
}

/// Diff two file contents. Text when both sides are UTF-8, bytes otherwise.
pub fn diff_contents(
    file: &str,
    expected: &[u8],
    actual: &[u8],
    tolerance: &Tolerance,
) -> Vec<DiffDetail> {
    if expected == actual {
        return Vec::new();
    }
    match (std::str::from_utf8(expected), std::str::from_utf8(actual)) {
        (Ok(e), Ok(a)) => diff_text(file, e, a, tolerance),
        _ => vec![DiffDetail::new(
            file,
            "content",
            format!("{} bytes", expected.len()),
            format!("{} bytes (binary content differs)", actual.len()),
        )],
    }
}

/// Diff two texts line by line after CRLF normalisation
pub fn diff_text(file: &str, expected: &str, actual: &str, tolerance: &Tolerance) -> Vec<DiffDetail> {
    let expected: Vec<&str> = normalized_lines(expected);
    let actual: Vec<&str> = normalized_lines(actual);

    let mut details = Vec::new();
    for index in 0..expected.len().max(actual.len()) {
        let line = index + 1;
        match (expected.get(index), actual.get(index)) {
            (Some(e), Some(a)) => diff_line(&mut details, file, line, e, a, tolerance),
            (Some(e), None) => {
                details.push(DiffDetail::new(file, format!("line {}", line), *e, ABSENT))
            }
            (None, Some(a)) => {
                details.push(DiffDetail::new(file, format!("line {}", line), ABSENT, *a))
            }
            (None, None) => {}
        }
    }
    details
}

fn normalized_lines(text: &str) -> Vec<&str> {
    text.lines()
        .map(|l| l.strip_suffix('\r').unwrap_or(l))
        .collect()
}

fn diff_line(
    details: &mut Vec<DiffDetail>,
    file: &str,
    line: usize,
    expected: &str,
    actual: &str,
    tolerance: &Tolerance,
) {
    if expected == actual {
        return;
    }

    let expected_fields: Vec<&str> = expected.split_whitespace().collect();
    let actual_fields: Vec<&str> = actual.split_whitespace().collect();
    if expected_fields.len() != actual_fields.len() {
        details.push(DiffDetail::new(file, format!("line {}", line), expected, actual));
        return;
    }

    for (index, (e, a)) in expected_fields.iter().zip(&actual_fields).enumerate() {
        if tolerance.fields_match(e, a) {
            continue;
        }
        let location = format!("line {}, field {}", line, index + 1);

        // Numbers glued to punctuation (`"auc": 0.3,`) are compared token by token
        let expected_tokens = split_tokens(e);
        let actual_tokens = split_tokens(a);
        if expected_tokens.len() < 2 || expected_tokens.len() != actual_tokens.len() {
            details.push(DiffDetail::new(file, location, *e, *a));
            continue;
        }
        for (token, (et, at)) in expected_tokens.iter().zip(&actual_tokens).enumerate() {
            if !tolerance.fields_match(et, at) {
                details.push(DiffDetail::new(
                    file,
                    format!("{}, token {}", location, token + 1),
                    *et,
                    *at,
                ));
            }
        }
    }
}
