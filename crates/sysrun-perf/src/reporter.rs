use std::collections::HashMap;
use std::fs::OpenOptions;
use std::io::Write as _;
use std::path::PathBuf;
use std::sync::Mutex;

use sysrun_core::Outcome;
use sysrun_user::ProcessUser;

use crate::csv::{format_header, format_row};
use crate::error::PerfError;
use crate::record::{validate_result_key, PerformanceResult};
use crate::unit::PerfUnit;

/// A single already-reported key: who reported it (`test_id` +
/// `object_identity`) and what the result looked like, for the duplicate
/// policy in [`PerfReporter::report_result`].
struct Reported {
    object_identity: u64,
    test_id: String,
    result_details: Vec<(String, String)>,
}

/// Component 4.F. One instance lives for the whole run (shared via `Arc`
/// across every test's `execute()`), accumulating results into an
/// in-memory table and persisting each to a per-run CSV file as it
/// arrives. Thread-safe: tests execute concurrently across worker threads.
pub struct PerfReporter {
    csv_path: PathBuf,
    state: Mutex<State>,
}

#[derive(Default)]
struct State {
    seen: HashMap<String, Reported>,
}

impl PerfReporter {
    /// `csv_path` is the run's summary file, resolved from
    /// [`sysrun_core::RunnerConfig::perf_summary_template`] by the caller
    /// (template substitution is the CLI's job, not this crate's).
    pub fn new(csv_path: PathBuf) -> Self {
        Self { csv_path, state: Mutex::new(State::default()) }
    }

    /// Record one performance measurement taken by `user`'s test.
    ///
    /// Validates the key, then applies the duplicate-key policy and claims
    /// the key (same object reporting the same key twice is always
    /// rejected; the same key reported by two different objects is only
    /// accepted when both share `test_id` and `result_details`, i.e. it
    /// looks like a second cycle of the same test) *before* looking at
    /// `user`'s outcome, so a key is claimed even by a test that has
    /// already failed — otherwise a later, unrelated test could reuse the
    /// same key undetected. Only after the key is claimed does it skip
    /// persistence when the outcome so far is a failure (a failed test's
    /// numbers aren't meaningful) and otherwise resolve the unit and
    /// append a CSV row.
    pub fn report_result(
        &self,
        user: &mut ProcessUser,
        result_key: &str,
        value: f64,
        unit: &str,
        tolerance_std_devs: Option<f64>,
        result_details: Vec<(String, String)>,
    ) -> Result<(), PerfError> {
        if let Err(reason) = validate_result_key(result_key) {
            user.add_outcome(Outcome::Blocked, reason.to_string(), true, None, Default::default())
                .ok();
            return Err(reason);
        }

        // The duplicate-key check and registration happen before the
        // failure-outcome check, matching the Python ground truth
        // (`perfreporter.py`'s `reportResult` inserts into
        // `__previousResultKeys` unconditionally inside its lock, then
        // checks `FAILS` afterward): a key must be claimed even when the
        // reporting test has already failed, so a later, unrelated test
        // can't silently reuse it.
        let mut state = self.state.lock().expect("perf reporter mutex poisoned");
        if let Some(prior) = state.seen.get(result_key) {
            if prior.object_identity == user.object_identity() {
                let reason = format!("result key '{result_key}' already reported by this test");
                drop(state);
                user.add_outcome(Outcome::Blocked, reason.clone(), true, None, Default::default()).ok();
                return Err(PerfError::InvalidResultKey { key: result_key.to_string(), reason });
            }
            if prior.test_id != user.test_id() || prior.result_details != result_details {
                let reason = format!("result key '{result_key}' must be unique across tests and modes");
                drop(state);
                user.add_outcome(Outcome::Blocked, reason.clone(), true, None, Default::default()).ok();
                return Err(PerfError::InvalidResultKey { key: result_key.to_string(), reason });
            }
        }
        state.seen.insert(
            result_key.to_string(),
            Reported { object_identity: user.object_identity(), test_id: user.test_id().to_string(), result_details: result_details.clone() },
        );
        drop(state);

        if user.outcomes().overall().is_failure() {
            return Ok(());
        }

        let result = PerformanceResult {
            result_key: result_key.to_string(),
            test_id: user.test_id().to_string(),
            value,
            unit: PerfUnit::resolve(unit),
            tolerance_std_devs,
            samples: 1,
            std_dev: 0.0,
            result_details,
        };

        self.append_row(&self.csv_path, &result)?;
        self.append_row(&user.output.join("performance_results.csv"), &result)?;
        Ok(())
    }

    /// Append one row to `path`, writing the column header first if `path`
    /// doesn't exist yet. Used for both the per-test
    /// `performance_results.csv` and the shared run summary file.
    fn append_row(&self, path: &std::path::Path, result: &PerformanceResult) -> Result<(), PerfError> {
        if let Some(parent) = path.parent() {
            std::fs::create_dir_all(parent).map_err(|source| PerfError::Write { path: path.to_path_buf(), source })?;
        }
        let header_needed = !path.exists();
        let mut file = OpenOptions::new()
            .create(true)
            .append(true)
            .open(path)
            .map_err(|source| PerfError::Write { path: path.to_path_buf(), source })?;

        if header_needed {
            writeln!(file, "{}", format_header(&[])).map_err(|source| PerfError::Write { path: path.to_path_buf(), source })?;
        }
        writeln!(file, "{}", format_row(result)).map_err(|source| PerfError::Write { path: path.to_path_buf(), source })?;
        Ok(())
    }

    pub fn csv_path(&self) -> &std::path::Path {
        &self.csv_path
    }
}

/// Substitute `@OUTDIR@`/`@HOSTNAME@`/`@DATE@`/`@TIME@`/`@TESTID@` tokens in
/// the run summary filename template (spec.md §4.F default:
/// `performance_output/@OUTDIR@_@HOSTNAME@/perf_@DATE@_@TIME@.csv`).
pub fn render_summary_path(template: &str, outdir: &str, hostname: &str, date: &str, time: &str, test_id: &str) -> PathBuf {
    let rendered = template
        .replace("@OUTDIR@", outdir)
        .replace("@HOSTNAME@", hostname)
        .replace("@DATE@", date)
        .replace("@TIME@", time)
        .replace("@TESTID@", test_id);
    PathBuf::from(rendered)
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::Arc;
    use sysrun_user::TcpPortAllocator;

    fn user() -> ProcessUser {
        let dir = tempfile::tempdir().unwrap().into_path();
        ProcessUser::new(dir.clone(), dir, Arc::new(TcpPortAllocator::new())).with_test_id("perf_001")
    }

    #[test]
    fn reports_and_persists_a_single_result() {
        let dir = tempfile::tempdir().unwrap();
        let reporter = PerfReporter::new(dir.path().join("perf.csv"));
        let mut u = user();
        reporter.report_result(&mut u, "startup time", 1.5, "s", None, Vec::new()).unwrap();
        let contents = std::fs::read_to_string(reporter.csv_path()).unwrap();
        assert!(contents.contains("startup time"));
        assert_eq!(u.outcomes().entries().len(), 0);
        let per_test = std::fs::read_to_string(u.output.join("performance_results.csv")).unwrap();
        assert!(per_test.contains("startup time"));
    }

    #[test]
    fn summary_path_template_substitutes_all_tokens() {
        let path = render_summary_path(
            "performance_output/@OUTDIR@_@HOSTNAME@/perf_@DATE@_@TIME@.csv",
            "myoutput",
            "buildbox",
            "2026-07-28",
            "120000",
            "perf_001",
        );
        assert_eq!(path, PathBuf::from("performance_output/myoutput_buildbox/perf_2026-07-28_120000.csv"));
    }

    #[test]
    fn same_object_reporting_same_key_twice_is_blocked() {
        let dir = tempfile::tempdir().unwrap();
        let reporter = PerfReporter::new(dir.path().join("perf.csv"));
        let mut u = user();
        reporter.report_result(&mut u, "startup time", 1.5, "s", None, Vec::new()).unwrap();
        let err = reporter.report_result(&mut u, "startup time", 2.0, "s", None, Vec::new());
        assert!(err.is_err());
        assert_eq!(u.outcomes().overall(), Outcome::Blocked);
    }

    #[test]
    fn different_object_same_test_id_and_details_is_accepted() {
        let dir = tempfile::tempdir().unwrap();
        let reporter = PerfReporter::new(dir.path().join("perf.csv"));
        let mut first = user();
        let mut second = user();
        reporter.report_result(&mut first, "startup time", 1.5, "s", None, Vec::new()).unwrap();
        reporter.report_result(&mut second, "startup time", 1.6, "s", None, Vec::new()).unwrap();
        assert_eq!(second.outcomes().entries().len(), 0);
    }

    #[test]
    fn different_object_different_test_id_is_blocked() {
        let dir = tempfile::tempdir().unwrap();
        let reporter = PerfReporter::new(dir.path().join("perf.csv"));
        let mut first = user();
        let dir2 = tempfile::tempdir().unwrap().into_path();
        let mut second = ProcessUser::new(dir2.clone(), dir2, Arc::new(TcpPortAllocator::new())).with_test_id("perf_002");
        reporter.report_result(&mut first, "startup time", 1.5, "s", None, Vec::new()).unwrap();
        let err = reporter.report_result(&mut second, "startup time", 1.6, "s", None, Vec::new());
        assert!(err.is_err());
        assert_eq!(second.outcomes().overall(), Outcome::Blocked);
    }

    #[test]
    fn invalid_key_is_rejected_and_blocks() {
        let dir = tempfile::tempdir().unwrap();
        let reporter = PerfReporter::new(dir.path().join("perf.csv"));
        let mut u = user();
        let err = reporter.report_result(&mut u, "bad  key", 1.0, "s", None, Vec::new());
        assert!(err.is_err());
        assert_eq!(u.outcomes().overall(), Outcome::Blocked);
    }

    #[test]
    fn failed_test_outcome_skips_persistence() {
        let dir = tempfile::tempdir().unwrap();
        let reporter = PerfReporter::new(dir.path().join("perf.csv"));
        let mut u = user();
        u.add_outcome(Outcome::Failed, "broken", true, None, Default::default()).unwrap();
        reporter.report_result(&mut u, "startup time", 1.5, "s", None, Vec::new()).unwrap();
        assert!(!reporter.csv_path().exists());
    }

    #[test]
    fn key_is_claimed_even_when_reporting_test_already_failed() {
        let dir = tempfile::tempdir().unwrap();
        let reporter = PerfReporter::new(dir.path().join("perf.csv"));
        let mut failed = user();
        failed.add_outcome(Outcome::Failed, "broken", true, None, Default::default()).unwrap();
        reporter.report_result(&mut failed, "startup time", 1.5, "s", None, Vec::new()).unwrap();
        assert!(!reporter.csv_path().exists());

        let dir2 = tempfile::tempdir().unwrap().into_path();
        let mut unrelated = ProcessUser::new(dir2.clone(), dir2, Arc::new(TcpPortAllocator::new())).with_test_id("perf_other");
        let err = reporter.report_result(&mut unrelated, "startup time", 2.0, "s", None, Vec::new());
        assert!(err.is_err());
        assert_eq!(unrelated.outcomes().overall(), Outcome::Blocked);
    }
}
