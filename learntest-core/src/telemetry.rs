//! Memory Statistics Telemetry
//!
//! The toolkit writes allocator statistics and I/O traces to a tab-separated
//! log when asked to through the memory statistics settings. The first line
//! names the columns selected by the statistics bitmask; every further line
//! is one record. A `Label` column carries free text, and labels starting
//! with `IO ` describe I/O events.
//!
//! Parsing is tolerant: the log may have been cut mid-record when the
//! watchdog killed the toolkit, so bad lines are dropped with a warning and
//! whatever parsed cleanly is kept.

use crate::config::MemStatsConfig;
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::fmt;
use std::path::Path;

/// Elapsed time column
pub const STATS_TIME: u32 = 1;

/// Free text label column
pub const STATS_LABELS: u32 = 8192;

/// Every statistics category
pub const STATS_ALL: u32 = 16383;

const TIME_COLUMN: &str = "Time";
const LABEL_COLUMN: &str = "Label";
const IO_LABEL_PREFIX: &str = "IO ";

/// Column name for each bit of the statistics bitmask, in log order
pub const STAT_COLUMNS: [(u32, &str); 14] = [
    (STATS_TIME, TIME_COLUMN),
    (2, "HeapMem"),
    (4, "MaxHeapRequestedMem"),
    (8, "TotalHeapRequestedMem"),
    (16, "AllocNumber"),
    (32, "MaxAllocNumber"),
    (64, "TotalAllocNumber"),
    (128, "FreeNumber"),
    (256, "TotalFreeNumber"),
    (512, "GrantedSize"),
    (1024, "MaxGrantedSize"),
    (2048, "TotalGrantedSize"),
    (4096, "RequestedSize"),
    (STATS_LABELS, LABEL_COLUMN),
];

/// Columns the toolkit writes for a given bitmask
pub fn columns_for_bitmask(bitmask: u32) -> Vec<&'static str> {
    STAT_COLUMNS
        .iter()
        .filter(|(bit, _)| bitmask & bit != 0)
        .map(|(_, name)| *name)
        .collect()
}

/// Non-fatal problem found while parsing a statistics log
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TelemetryParseWarning {
    /// 1-based line number (0 when the warning concerns the whole file)
    pub line: usize,
    /// What was wrong
    pub message: String,
}

impl fmt::Display for TelemetryParseWarning {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        if self.line == 0 {
            write!(f, "{}", self.message)
        } else {
            write!(f, "line {}: {}", self.line, self.message)
        }
    }
}

/// One I/O event from the trace
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct IoEvent {
    /// Elapsed time when the event was logged, if the time column is present
    pub time: Option<f64>,
    /// Operation (`Open`, `Read`, `Write`, ...)
    pub operation: String,
    /// Remainder of the label, typically a file name and a size
    pub detail: String,
}

/// Statistics harvested from one run
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct TelemetrySample {
    /// Test identifier
    pub test_id: String,
    /// Records accepted
    pub records: usize,
    /// Peak value of every numeric column (`Time` holds the last timestamp)
    pub allocator_stats: BTreeMap<String, f64>,
    /// I/O events in log order
    pub io_trace: Vec<IoEvent>,
    /// Lines that were dropped, and why
    pub warnings: Vec<TelemetryParseWarning>,
}

impl TelemetrySample {
    /// Whether anything was dropped while parsing
    pub fn is_partial(&self) -> bool {
        !self.warnings.is_empty()
    }
}

/// Read and parse the statistics log written for `test_id`.
///
/// A missing or unreadable log yields an empty sample carrying one warning.
pub fn collect(test_id: &str, log_path: &Path, config: &MemStatsConfig) -> TelemetrySample {
    match std::fs::read(log_path) {
        Ok(bytes) => parse_log(test_id, &String::from_utf8_lossy(&bytes), config),
        Err(e) => {
            let warning = TelemetryParseWarning {
                line: 0,
                message: format!("cannot read {}: {}", log_path.display(), e),
            };
            tracing::warn!(test = test_id, "telemetry: {}", warning);
            TelemetrySample {
                test_id: test_id.to_string(),
                warnings: vec![warning],
                ..Default::default()
            }
        }
    }
}

/// Parse the content of a statistics log
pub fn parse_log(test_id: &str, content: &str, config: &MemStatsConfig) -> TelemetrySample {
    let mut sample = TelemetrySample {
        test_id: test_id.to_string(),
        ..Default::default()
    };

    let mut lines: Vec<(usize, &str)> = content
        .split('\n')
        .enumerate()
        .map(|(i, l)| (i + 1, l.strip_suffix('\r').unwrap_or(l)))
        .collect();

    // Content after the final newline is a record the writer never finished
    if let Some((line, last)) = lines.pop() {
        if !last.trim().is_empty() {
            sample.warnings.push(TelemetryParseWarning {
                line,
                message: "truncated trailing record".to_string(),
            });
        }
    }

    let mut records = lines.into_iter().filter(|(_, l)| !l.trim().is_empty());

    let header: Vec<String> = match records.next() {
        None => {
            finish(&mut sample);
            return sample;
        }
        Some((_, first)) if is_header(first) => first.split('\t').map(str::to_string).collect(),
        Some((line, first)) => {
            // Headerless log: the bitmask says which columns to expect
            let header: Vec<String> = columns_for_bitmask(config.stats_bitmask)
                .into_iter()
                .map(str::to_string)
                .collect();
            accept_record(&mut sample, &header, line, first, config);
            header
        }
    };

    for (line, record) in records {
        accept_record(&mut sample, &header, line, record, config);
    }

    finish(&mut sample);
    sample
}

fn is_header(line: &str) -> bool {
    line.split('\t')
        .all(|field| STAT_COLUMNS.iter().any(|(_, name)| *name == field))
}

fn accept_record(
    sample: &mut TelemetrySample,
    header: &[String],
    line: usize,
    record: &str,
    config: &MemStatsConfig,
) {
    let fields: Vec<&str> = record.split('\t').collect();
    if fields.len() != header.len() {
        sample.warnings.push(TelemetryParseWarning {
            line,
            message: format!(
                "expected {} fields, found {}",
                header.len(),
                fields.len()
            ),
        });
        return;
    }

    // Validate the whole record before applying any of it
    let mut numbers = Vec::with_capacity(fields.len());
    let mut label = None;
    let mut time = None;
    for (column, field) in header.iter().zip(&fields) {
        if column == LABEL_COLUMN {
            label = Some(*field);
            continue;
        }
        match field.trim().parse::<f64>() {
            Ok(value) if value.is_finite() => {
                if column == TIME_COLUMN {
                    time = Some(value);
                }
                numbers.push((column.as_str(), value));
            }
            _ => {
                sample.warnings.push(TelemetryParseWarning {
                    line,
                    message: format!("invalid value {:?} for {}", field, column),
                });
                return;
            }
        }
    }

    sample.records += 1;
    for (column, value) in numbers {
        let entry = sample
            .allocator_stats
            .entry(column.to_string())
            .or_insert(value);
        if column == TIME_COLUMN || value > *entry {
            *entry = value;
        }
    }

    if config.io_trace_mode {
        if let Some(io) = label.and_then(|l| l.strip_prefix(IO_LABEL_PREFIX)) {
            let mut parts = io.trim().splitn(2, char::is_whitespace);
            let operation = parts.next().unwrap_or_default().to_string();
            let detail = parts.next().unwrap_or_default().trim().to_string();
            sample.io_trace.push(IoEvent {
                time,
                operation,
                detail,
            });
        }
    }
}

fn finish(sample: &mut TelemetrySample) {
    for warning in &sample.warnings {
        tracing::warn!(test = %sample.test_id, "telemetry: {}", warning);
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn config(io_trace_mode: bool) -> MemStatsConfig {
        MemStatsConfig {
            log_file_name: Some("stats.log".to_string()),
            io_trace_mode,
            ..Default::default()
        }
    }

    const LOG: &str = "Time\tHeapMem\tAllocNumber\tLabel\n\
                       0.0\t1024\t10\tStart\n\
                       0.5\t4096\t42\tIO Open data/Iris.txt\n\
                       1.0\t2048\t40\tIO Read data/Iris.txt 4500\n";

    #[test]
    fn test_columns_for_bitmask() {
        assert_eq!(columns_for_bitmask(8193), vec!["Time", "Label"]);
        assert_eq!(columns_for_bitmask(STATS_ALL).len(), 14);
        assert!(columns_for_bitmask(0).is_empty());
    }

    #[test]
    fn test_parse_complete_log() {
        let sample = parse_log("Iris", LOG, &config(true));
        assert!(!sample.is_partial());
        assert_eq!(sample.records, 3);
        assert_eq!(sample.allocator_stats["HeapMem"], 4096.0);
        assert_eq!(sample.allocator_stats["AllocNumber"], 42.0);
        assert_eq!(sample.allocator_stats["Time"], 1.0);
        assert_eq!(sample.io_trace.len(), 2);
        assert_eq!(sample.io_trace[0].operation, "Open");
        assert_eq!(sample.io_trace[1].detail, "data/Iris.txt 4500");
        assert_eq!(sample.io_trace[1].time, Some(1.0));
    }

    #[test]
    fn test_io_events_ignored_without_io_trace_mode() {
        let sample = parse_log("Iris", LOG, &config(false));
        assert!(sample.io_trace.is_empty());
        assert_eq!(sample.records, 3);
    }

    #[test]
    fn test_truncated_trailing_record_is_dropped() {
        let truncated = format!("{}1.5\t81", LOG);
        let sample = parse_log("Iris", &truncated, &config(true));
        assert!(sample.is_partial());
        assert_eq!(sample.records, 3);
        assert_eq!(sample.warnings.len(), 1);
        assert!(sample.warnings[0].message.contains("truncated"));
    }

    #[test]
    fn test_malformed_records_are_dropped_individually() {
        let log = "Time\tHeapMem\n0.1\t100\n0.2\tlots\n0.3\n0.4\t300\n";
        let sample = parse_log("T", log, &config(false));
        assert_eq!(sample.records, 2);
        assert_eq!(sample.warnings.len(), 2);
        assert_eq!(sample.warnings[0].line, 3);
        assert_eq!(sample.warnings[1].line, 4);
        assert_eq!(sample.allocator_stats["HeapMem"], 300.0);
    }

    #[test]
    fn test_headerless_log_uses_bitmask() {
        let cfg = MemStatsConfig {
            stats_bitmask: STATS_TIME | STATS_LABELS,
            ..config(false)
        };
        let sample = parse_log("T", "0.25\tStart\n0.75\tEnd\n", &cfg);
        assert_eq!(sample.records, 2);
        assert_eq!(sample.allocator_stats["Time"], 0.75);
    }

    #[test]
    fn test_empty_log() {
        let sample = parse_log("T", "", &config(false));
        assert_eq!(sample.records, 0);
        assert!(!sample.is_partial());
    }

    #[test]
    fn test_missing_log_is_a_warning() {
        let sample = collect("T", Path::new("/nonexistent/stats.log"), &config(false));
        assert_eq!(sample.records, 0);
        assert_eq!(sample.warnings.len(), 1);
    }
}
