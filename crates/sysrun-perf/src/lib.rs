//! The performance reporter: component 4.F of the sysrun engine.
//!
//! Validates and persists performance measurements a test reports during
//! `execute()`, keyed by `resultKey`, to a CSV file shared by the whole
//! run. [`aggregate`] separately merges such files across runs using a
//! numerically stable pooled mean/variance formula.

mod aggregate;
mod csv;
mod error;
mod record;
mod reporter;
mod unit;

pub use aggregate::{aggregate_files, aggregate_results, aggregate_run_details, combine, read_performance_file};
pub use csv::{format_header, format_row};
pub use error::PerfError;
pub use record::{format_value_for_display, validate_result_key, PerformanceResult};
pub use reporter::{render_summary_path, PerfReporter};
pub use unit::PerfUnit;
