//! Numeric Tolerance
//!
//! Floating point results legitimately drift between compilers and
//! platforms. Two numeric fields match when they are within the absolute
//! OR the relative bound.

use serde::{Deserialize, Serialize};

/// Default absolute bound
pub const DEFAULT_ABSOLUTE_TOLERANCE: f64 = 1e-6;

/// Default relative bound
pub const DEFAULT_RELATIVE_TOLERANCE: f64 = 1e-6;

/// Absolute and relative epsilon applied to numeric fields
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct Tolerance {
    /// Largest accepted `|actual - expected|`
    pub absolute: f64,
    /// Largest accepted `|actual - expected| / max(|actual|, |expected|)`
    pub relative: f64,
}

impl Default for Tolerance {
    fn default() -> Self {
        Self {
            absolute: DEFAULT_ABSOLUTE_TOLERANCE,
            relative: DEFAULT_RELATIVE_TOLERANCE,
        }
    }
}

impl Tolerance {
    /// Exact comparison
    pub const EXACT: Tolerance = Tolerance {
        absolute: 0.0,
        relative: 0.0,
    };

    /// Create a tolerance, clamping negative bounds to zero
    pub fn new(absolute: f64, relative: f64) -> Self {
        Self {
            absolute: absolute.max(0.0),
            relative: relative.max(0.0),
        }
    }

    /// Whether two numbers match
    pub fn accepts(&self, expected: f64, actual: f64) -> bool {
        if expected == actual {
            return true;
        }
        let delta = (actual - expected).abs();
        delta <= self.absolute || delta <= self.relative * actual.abs().max(expected.abs())
    }

    /// Whether two text fields match: equal text, or both finite numbers
    /// within tolerance
    pub fn fields_match(&self, expected: &str, actual: &str) -> bool {
        if expected == actual {
            return true;
        }
        match (parse_number(expected), parse_number(actual)) {
            (Some(e), Some(a)) => self.accepts(e, a),
            _ => false,
        }
    }
}

/// Parse a field as a finite number
pub fn parse_number(field: &str) -> Option<f64> {
    field.parse::<f64>().ok().filter(|v| v.is_finite())
}

/// Characters that separate values inside one whitespace-delimited field
pub const TOKEN_DELIMITERS: &[char] = &[',', ':', ';', '(', ')', '[', ']', '{', '}', '"', '\'', '='];

/// Split a field into alternating runs of delimiters and values.
///
/// `"auc":0.3,` gives `["\"", "auc", "\":", "0.3", ","]`. Concatenating the
/// tokens gives the field back.
pub fn split_tokens(field: &str) -> Vec<&str> {
    let mut tokens = Vec::new();
    let mut start = 0;
    let mut in_delimiters = None;
    for (offset, c) in field.char_indices() {
        let is_delimiter = TOKEN_DELIMITERS.contains(&c);
        match in_delimiters {
            Some(previous) if previous != is_delimiter => {
                tokens.push(&field[start..offset]);
                start = offset;
            }
            _ => {}
        }
        in_delimiters = Some(is_delimiter);
    }
    if start < field.len() {
        tokens.push(&field[start..]);
    }
    tokens
}
