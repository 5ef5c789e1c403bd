//! Test Executor
//!
//! Runs the planned tests and turns their outcomes into a report.
//!
//! ## Pipeline Overview
//!
//! ```text
//! ExecutionPlan (catalog order)
//!       │
//!       ▼
//! ┌─────────────┐
//! │  execution  │  Supervise, compare, collect telemetry (worker pool)
//! └──────┬──────┘
//!        │
//!        ▼
//! ┌─────────────┐
//! │   report    │  Keyed by test id, emitted in plan order
//! └──────┬──────┘
//!        │
//!        ▼
//! ┌─────────────┐
//! │ formatting  │  Human-readable output
//! └─────────────┘
//! ```
//!
//! ## Modules
//!
//! - [`execution`] - Worker pool driving each test through the pipeline
//! - [`report`] - Deterministic report building
//! - [`formatting`] - Human-readable output formatting
//! - [`metadata`] - System metadata collection

mod execution;
mod formatting;
mod metadata;
mod report;

// Re-export public API
pub use execution::{ExecutionConfig, Executor, TestExecutionResult};
pub use formatting::{format_human_output, format_plan};
pub use metadata::build_report_meta;
pub use report::RunReporter;
