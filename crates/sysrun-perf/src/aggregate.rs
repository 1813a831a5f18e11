use std::collections::BTreeMap;
use std::io::BufRead;
use std::path::Path;

use crate::csv::{parse_header_run_details, parse_row};
use crate::error::PerfError;
use crate::record::PerformanceResult;

/// Combine two samples of the same `resultKey` using the numerically
/// careful pooled mean/stddev formula from spec.md §4.F. `result_details`
/// from the more recent input wins; `samples` becomes the sum.
pub fn combine(a: &PerformanceResult, b: &PerformanceResult) -> PerformanceResult {
    let n1 = a.samples as f64;
    let n2 = b.samples as f64;
    let combined_mean = (n1 * a.value + n2 * b.value) / (n1 + n2);
    let combined_variance = ((n1 - 1.0) * a.std_dev.powi(2)
        + (n2 - 1.0) * b.std_dev.powi(2)
        + n1 * (a.value - combined_mean).powi(2)
        + n2 * (b.value - combined_mean).powi(2))
        / (n1 + n2 - 1.0);

    PerformanceResult {
        result_key: a.result_key.clone(),
        test_id: b.test_id.clone(),
        value: combined_mean,
        unit: a.unit.clone(),
        tolerance_std_devs: b.tolerance_std_devs.or(a.tolerance_std_devs),
        samples: a.samples + b.samples,
        std_dev: combined_variance.sqrt(),
        result_details: b.result_details.clone(),
    }
}

/// Merge N sets of performance results into one row per `resultKey`,
/// folding every subsequent sample of the same key through [`combine`] in
/// input order (so `result_details` from the *last* set that mentions a
/// key wins, per spec.md §4.F). Testable property 8: aggregating a single
/// set is the identity modulo `result_details` field ordering.
pub fn aggregate_results(sets: &[Vec<PerformanceResult>]) -> Vec<PerformanceResult> {
    let mut merged: BTreeMap<String, PerformanceResult> = BTreeMap::new();
    for set in sets {
        for result in set {
            merged
                .entry(result.result_key.clone())
                .and_modify(|existing| *existing = combine(existing, result))
                .or_insert_with(|| result.clone());
        }
    }
    merged.into_values().collect()
}

/// Merge run-details headers from N input files: each key's distinct
/// values, sorted, joined with `"; "`.
pub fn aggregate_run_details(headers: &[Vec<(String, String)>]) -> Vec<(String, String)> {
    let mut by_key: BTreeMap<String, Vec<String>> = BTreeMap::new();
    for header in headers {
        for (k, v) in header {
            let values = by_key.entry(k.clone()).or_default();
            if !values.contains(v) {
                values.push(v.clone());
            }
        }
    }
    by_key
        .into_iter()
        .map(|(k, mut values)| {
            values.sort();
            (k, values.join("; "))
        })
        .collect()
}

/// Read one performance CSV file: its header's run-details and every data
/// row.
pub fn read_performance_file(path: &Path) -> Result<(Vec<(String, String)>, Vec<PerformanceResult>), PerfError> {
    let file = std::fs::File::open(path).map_err(|source| PerfError::Read { path: path.to_path_buf(), source })?;
    let reader = std::io::BufReader::new(file);
    let mut run_details = Vec::new();
    let mut results = Vec::new();
    for (i, line) in reader.lines().enumerate() {
        let line = line.map_err(|source| PerfError::Read { path: path.to_path_buf(), source })?;
        if line.is_empty() {
            continue;
        }
        if line.starts_with('#') {
            run_details = parse_header_run_details(&line);
            continue;
        }
        results.push(parse_row(path, i + 1, &line)?);
    }
    Ok((run_details, results))
}

/// Read and merge N performance CSV files end to end, returning the merged
/// run-details and result rows ready to be written out by a caller via
/// [`crate::csv::format_header`]/[`crate::csv::format_row`].
pub fn aggregate_files(paths: &[std::path::PathBuf]) -> Result<(Vec<(String, String)>, Vec<PerformanceResult>), PerfError> {
    if paths.is_empty() {
        return Err(PerfError::EmptyAggregateInput);
    }
    let mut all_details = Vec::new();
    let mut all_results = Vec::new();
    for path in paths {
        let (details, results) = read_performance_file(path)?;
        all_details.push(details);
        all_results.push(results);
    }
    Ok((aggregate_run_details(&all_details), aggregate_results(&all_results)))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::unit::PerfUnit;

    fn result(key: &str, value: f64, samples: u32, std_dev: f64) -> PerformanceResult {
        PerformanceResult {
            result_key: key.to_string(),
            test_id: "perf_001".to_string(),
            value,
            unit: PerfUnit::seconds(),
            tolerance_std_devs: None,
            samples,
            std_dev,
            result_details: Vec::new(),
        }
    }

    #[test]
    fn combining_two_single_samples_matches_known_formula() {
        let a = result("k", 10.0, 1, 0.0);
        let b = result("k", 20.0, 1, 0.0);
        let merged = combine(&a, &b);
        assert_eq!(merged.samples, 2);
        assert!((merged.value - 15.0).abs() < 1e-9);
        assert!((merged.std_dev - 7.0710678).abs() < 1e-5);
    }

    #[test]
    fn aggregating_single_set_is_identity() {
        let set = vec![result("k", 5.0, 3, 1.0)];
        let merged = aggregate_results(std::slice::from_ref(&set));
        assert_eq!(merged.len(), 1);
        assert_eq!(merged[0], set[0]);
    }

    #[test]
    fn aggregate_run_details_joins_distinct_sorted_values() {
        let headers = vec![
            vec![("hostname".to_string(), "boxB".to_string())],
            vec![("hostname".to_string(), "boxA".to_string())],
        ];
        let merged = aggregate_run_details(&headers);
        assert_eq!(merged, vec![("hostname".to_string(), "boxA; boxB".to_string())]);
    }
}
