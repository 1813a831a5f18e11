use crate::error::PerfError;
use crate::record::PerformanceResult;
use crate::unit::PerfUnit;

const RESULT_DETAILS_SENTINEL: &str = "#resultDetails:#";
const RUN_DETAILS_SENTINEL: &str = "#runDetails:#";
const COLUMNS: &str = "resultKey,testId,value,unit,biggerIsBetter,toleranceStdDevs,samples,stdDev";

/// `,` -> `;`, `"` -> `_`, per spec.md §6's field sanitization rule.
fn sanitize(field: &str) -> String {
    field.replace(',', ";").replace('"', "_")
}

/// Header line for either the per-test `performance_results.csv` (no run
/// details) or the run summary file (run details appended after the
/// `#runDetails:#` sentinel).
pub fn format_header(run_details: &[(String, String)]) -> String {
    let mut line = format!("#{COLUMNS}");
    if !run_details.is_empty() {
        line.push(',');
        line.push_str(RUN_DETAILS_SENTINEL);
        for (k, v) in run_details {
            line.push(',');
            line.push_str(&sanitize(k));
            line.push('=');
            line.push_str(&sanitize(v));
        }
    }
    line
}

pub fn format_row(result: &PerformanceResult) -> String {
    let tolerance = result.tolerance_std_devs.map(|t| t.to_string()).unwrap_or_default();
    let mut columns = vec![
        sanitize(&result.result_key),
        sanitize(&result.test_id),
        result.value.to_string(),
        sanitize(&result.unit.name),
        result.unit.bigger_is_better.to_string(),
        tolerance,
        result.samples.to_string(),
        result.std_dev.to_string(),
    ];
    if !result.result_details.is_empty() {
        columns.push(RESULT_DETAILS_SENTINEL.to_string());
        for (k, v) in &result.result_details {
            columns.push(format!("{}={}", sanitize(k), sanitize(v)));
        }
    }
    columns.join(",")
}

/// Parse a single (non-header) data line back into a [`PerformanceResult`].
/// This is the identity transform for already-sanitized input: testable
/// property 7.
pub fn parse_row(path: &std::path::Path, line_no: usize, line: &str) -> Result<PerformanceResult, PerfError> {
    let fields: Vec<&str> = line.split(',').collect();
    if fields.len() < 8 {
        return Err(PerfError::Parse {
            path: path.to_path_buf(),
            line: line_no,
            reason: format!("expected at least 8 columns, found {}", fields.len()),
        });
    }
    let parse_f64 = |s: &str, what: &str| -> Result<f64, PerfError> {
        s.parse().map_err(|_| PerfError::Parse {
            path: path.to_path_buf(),
            line: line_no,
            reason: format!("invalid {what} '{s}'"),
        })
    };
    let value = parse_f64(fields[2], "value")?;
    let bigger_is_better = fields[4] == "true";
    let tolerance_std_devs = if fields[5].is_empty() { None } else { Some(parse_f64(fields[5], "toleranceStdDevs")?) };
    let samples: u32 = fields[6].parse().map_err(|_| PerfError::Parse {
        path: path.to_path_buf(),
        line: line_no,
        reason: format!("invalid samples '{}'", fields[6]),
    })?;
    let std_dev = parse_f64(fields[7], "stdDev")?;

    let mut result_details = Vec::new();
    if fields.len() > 8 && fields[8] == RESULT_DETAILS_SENTINEL {
        for field in &fields[9..] {
            if let Some((k, v)) = field.split_once('=') {
                result_details.push((k.to_string(), v.to_string()));
            }
        }
    }

    Ok(PerformanceResult {
        result_key: fields[0].to_string(),
        test_id: fields[1].to_string(),
        value,
        unit: PerfUnit::new(fields[3].to_string(), bigger_is_better),
        tolerance_std_devs,
        samples,
        std_dev,
        result_details,
    })
}

/// Parse a header line's run-details (`k=v` pairs following
/// `#runDetails:#`), ignoring the leading column-name list.
pub fn parse_header_run_details(line: &str) -> Vec<(String, String)> {
    let line = line.strip_prefix('#').unwrap_or(line);
    let fields: Vec<&str> = line.split(',').collect();
    let Some(marker) = fields.iter().position(|f| *f == RUN_DETAILS_SENTINEL) else {
        return Vec::new();
    };
    fields[marker + 1..]
        .iter()
        .filter_map(|f| f.split_once('=').map(|(k, v)| (k.to_string(), v.to_string())))
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::path::Path;

    fn sample() -> PerformanceResult {
        PerformanceResult {
            result_key: "startup time".to_string(),
            test_id: "perf_001".to_string(),
            value: 1.5,
            unit: PerfUnit::seconds(),
            tolerance_std_devs: Some(2.0),
            samples: 1,
            std_dev: 0.0,
            result_details: vec![("cpu".to_string(), "x86_64".to_string())],
        }
    }

    #[test]
    fn round_trip_is_identity_on_sanitized_input() {
        let result = sample();
        let row = format_row(&result);
        let parsed = parse_row(Path::new("perf.csv"), 2, &row).unwrap();
        assert_eq!(parsed, result);
    }

    #[test]
    fn header_includes_run_details() {
        let header = format_header(&[("hostname".to_string(), "box1".to_string())]);
        assert!(header.starts_with('#'));
        assert!(header.contains(RUN_DETAILS_SENTINEL));
        let parsed = parse_header_run_details(&header);
        assert_eq!(parsed, vec![("hostname".to_string(), "box1".to_string())]);
    }

    #[test]
    fn sanitizes_commas_and_quotes() {
        let mut result = sample();
        result.result_key = "a, b \"quoted\"".to_string();
        let row = format_row(&result);
        assert!(!row.contains('"'));
        // The sanitized key is the first comma-delimited field.
        assert_eq!(row.split(',').next().unwrap(), "a; b _quoted_");
    }
}
