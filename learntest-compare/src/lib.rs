#![warn(missing_docs)]
//! LearnTest Result Comparator
//!
//! Compares the results a toolkit run produced with the stored reference
//! results of the comparison platform:
//! - Reference tree selection per platform
//! - File-by-file structural diff over the union of both trees
//! - Numeric fields compared with an absolute/relative tolerance
//! - Every difference recorded, not just the first

mod diff;
mod tolerance;
mod verdict;

pub use diff::{
    ABSENT, CompareError, DiffDetail, IgnoreSet, diff_contents, diff_text, diff_trees, list_files,
};
pub use tolerance::{
    DEFAULT_ABSOLUTE_TOLERANCE, DEFAULT_RELATIVE_TOLERANCE, TOKEN_DELIMITERS, Tolerance,
    parse_number, split_tokens,
};
pub use verdict::{ComparisonVerdict, Outcome, ResultComparator};

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_constants() {
        assert!((DEFAULT_ABSOLUTE_TOLERANCE - 1e-6).abs() < f64::EPSILON);
        assert!((DEFAULT_RELATIVE_TOLERANCE - 1e-6).abs() < f64::EPSILON);
    }
}
