use std::collections::HashMap;
use std::time::Duration;

/// The explicit "environment" value called for by Design Note "Global
/// ambient state": everything the original relied on a module-scoped
/// project/logger/constants singleton for, gathered into one value passed
/// by `Arc` to the runner, every container, and every test.
#[derive(Clone, Debug)]
pub struct RunnerConfig {
    /// Number of passes over the descriptor list. Must be >= 1.
    pub cycles: usize,
    /// Worker pool size. Must be >= 1; `1` bypasses the pool entirely.
    pub threads: usize,
    /// The run mode requested for this invocation (e.g. `"release"`).
    /// Descriptors whose `modes` is non-empty and excludes this value are
    /// skipped.
    pub mode: String,
    /// Default timeout applied to `start_process`/`wait_process` calls that
    /// don't specify their own.
    pub default_timeout: Duration,
    /// Default for `abort_on_error` across the process-user substrate,
    /// unless a call overrides it.
    pub default_abort_on_error: bool,
    /// Default for `ignore_exit_status` on `start_process`.
    pub default_ignore_exit_status: bool,
    /// Whether `test_complete` should purge non-zero-length output files
    /// for all-`Passed` tests (zero-length files are always purged).
    pub purge: bool,
    /// Whether results should be forwarded to writers and the performance
    /// reporter at all (a dry-run / `--norecord` switch).
    pub record: bool,
    /// If a keyboard interrupt arrives, whether to prompt the operator
    /// (`true`) or print the summary and exit immediately (`false`).
    pub prompt_on_interrupt: bool,
    /// Filename template for the performance summary CSV. Supports
    /// `@OUTDIR@`, `@HOSTNAME@`, `@DATE@`, `@TIME@`, `@TESTID@`.
    pub perf_summary_template: String,
    /// Extra key/value arguments a catalog loader or CLI wants visible to
    /// test bodies, read explicitly by key (there is no `setattr`
    /// equivalent on a `RunnerConfig`).
    pub xargs: HashMap<String, String>,
}

impl Default for RunnerConfig {
    fn default() -> Self {
        Self {
            cycles: 1,
            threads: 1,
            mode: String::new(),
            default_timeout: Duration::from_secs(600),
            default_abort_on_error: false,
            default_ignore_exit_status: true,
            purge: false,
            record: true,
            prompt_on_interrupt: true,
            perf_summary_template: "performance_output/@OUTDIR@_@HOSTNAME@/perf_@DATE@_@TIME@.csv".to_string(),
            xargs: HashMap::new(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn defaults_are_single_cycle_single_thread() {
        let cfg = RunnerConfig::default();
        assert_eq!(cfg.cycles, 1);
        assert_eq!(cfg.threads, 1);
        assert!(cfg.record);
    }
}
