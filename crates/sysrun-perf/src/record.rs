use regex::Regex;
use std::sync::LazyLock;

use crate::error::PerfError;
use crate::unit::PerfUnit;

/// One validated performance measurement, ready to be formatted as a CSV
/// row and/or merged by [`crate::aggregate`].
#[derive(Clone, Debug, PartialEq)]
pub struct PerformanceResult {
    pub result_key: String,
    pub test_id: String,
    pub value: f64,
    pub unit: PerfUnit,
    pub tolerance_std_devs: Option<f64>,
    pub samples: u32,
    pub std_dev: f64,
    pub result_details: Vec<(String, String)>,
}

static DATE_TIME_RE: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"\d{4}[-/]\d{2}[-/]\d{2} \d{2}[:/]\d{2}[:/]\d{2}").unwrap());

/// Reject `resultKey`s that would make CSV columns or cross-run comparison
/// ambiguous: a double space, a stray format token (`%s`/`%d`/`%f`, a sign
/// a careless test author left in a template string), an embedded newline,
/// or a literal date/time stamp (which would make the key different on
/// every run and defeat cross-run aggregation by key).
pub fn validate_result_key(key: &str) -> Result<(), PerfError> {
    if key.contains("  ") {
        return Err(PerfError::InvalidResultKey { key: key.to_string(), reason: "contains a double space".to_string() });
    }
    if key.contains("%s") || key.contains("%d") || key.contains("%f") {
        return Err(PerfError::InvalidResultKey {
            key: key.to_string(),
            reason: "contains an unsubstituted format token".to_string(),
        });
    }
    if key.contains('\n') {
        return Err(PerfError::InvalidResultKey { key: key.to_string(), reason: "contains a newline".to_string() });
    }
    if DATE_TIME_RE.is_match(key) {
        return Err(PerfError::InvalidResultKey { key: key.to_string(), reason: "contains an embedded date/time stamp".to_string() });
    }
    Ok(())
}

/// Pretty-print a value for human-facing summary lines: grouped thousands
/// above 1000, otherwise four significant figures without exponential
/// notation. Never used by the CSV writer, which always emits the raw
/// float — this is purely a display helper (grounded in the original's
/// `valueToDisplayString`).
pub fn format_value_for_display(value: f64) -> String {
    if value.abs() >= 1000.0 {
        let rounded = value.round() as i64;
        group_thousands(rounded)
    } else {
        format_significant(value, 4)
    }
}

fn group_thousands(value: i64) -> String {
    let negative = value < 0;
    let digits = value.unsigned_abs().to_string();
    let mut grouped = String::new();
    for (i, c) in digits.chars().rev().enumerate() {
        if i > 0 && i % 3 == 0 {
            grouped.push(',');
        }
        grouped.push(c);
    }
    let grouped: String = grouped.chars().rev().collect();
    if negative {
        format!("-{grouped}")
    } else {
        grouped
    }
}

fn format_significant(value: f64, sig_figs: u32) -> String {
    if value == 0.0 {
        return "0".to_string();
    }
    let magnitude = value.abs().log10().floor() as i32;
    let decimals = (sig_figs as i32 - 1 - magnitude).max(0) as usize;
    format!("{value:.decimals$}")
}
