//! Built-in demo test factories, registered under `sysrun-cli`'s own
//! registry so the binary runs end to end without needing a separate
//! descriptor-discovery crate. Grounded in the three
//! `pysys-examples/internal/testcases/PySys_internal_0{44,53,58}` fixtures
//! kept in `original_source/` — a diff-with-ignores test, a process-output
//! grep test, and a perf-reporting test.

use std::sync::Arc;

use sysrun_container::{Test, TestFactory};
use sysrun_perf::PerfReporter;
use sysrun_user::{Abort, ProcessUser, StartRequest};

/// Mirrors `PySys_internal_044`: diffs a candidate file against a baseline,
/// ignoring lines that match a fixed regex, then asserts the diff passes.
pub struct DiffIgnoreTest;

impl Test for DiffIgnoreTest {
    fn execute(&mut self, user: &mut ProcessUser) -> Result<(), Abort> {
        let baseline = user.output.join("baseline.txt");
        let candidate = user.output.join("candidate.txt");
        std::fs::write(&baseline, "hello\n(on my Vespa 300 GTS today)\nbye\n").ok();
        std::fs::write(&candidate, "hello\n(on my Vespa 300 GTS yesterday)\nbye\n").ok();
        let ignores = vec![regex::Regex::new(r"\(on my Vespa 300 GTS .*\)").unwrap()];
        user.assert_diff(&baseline, &candidate, &ignores, Some(false))?;
        Ok(())
    }
}

/// Mirrors `PySys_internal_053`/`_058`: run a short-lived process, capture
/// its stdout, then grep the capture for an expected line.
#[derive(Default)]
pub struct EchoGrepTest {
    stdout_path: std::path::PathBuf,
}

impl Test for EchoGrepTest {
    fn execute(&mut self, user: &mut ProcessUser) -> Result<(), Abort> {
        let (stdout, stderr) = user.allocate_unique_stdout_err("echo");
        self.stdout_path = stdout.clone();
        let mut req = StartRequest::new("echo", vec!["Looking for Fi ... failed".to_string()]);
        req.stdout = Some(stdout);
        req.stderr = Some(stderr);
        user.start_process(req).map_err(|e| Abort::new(sysrun_core::Outcome::Blocked, e.to_string(), Vec::new()))?;
        Ok(())
    }

    fn validate(&mut self, user: &mut ProcessUser) -> Result<(), Abort> {
        user.assert_grep(&self.stdout_path, "Looking for Fi.*failed", ">=1", Some(false))?;
        Ok(())
    }
}

/// Reports one synthetic timing measurement through the shared
/// [`PerfReporter`], exercising component 4.F end to end.
pub struct TimingTest {
    pub reporter: Arc<PerfReporter>,
}

impl Test for TimingTest {
    fn execute(&mut self, user: &mut ProcessUser) -> Result<(), Abort> {
        let started = std::time::Instant::now();
        let mut req = StartRequest::new("sleep", vec!["0".to_string()]);
        req.ignore_exit_status = Some(true);
        user.start_process(req).map_err(|e| Abort::new(sysrun_core::Outcome::Blocked, e.to_string(), Vec::new()))?;
        let elapsed = started.elapsed().as_secs_f64();
        self.reporter
            .report_result(user, "demo startup time", elapsed, "s", Some(2.0), Vec::new())
            .ok();
        Ok(())
    }
}

/// Build the built-in registry entry for each demo class name. `reporter`
/// is shared by every `TimingTest` instance across the run.
pub fn register_builtins(registry: &mut sysrun_container::TestRegistry, reporter: Arc<PerfReporter>) {
    registry.register("DiffIgnoreTest", Box::new(|_d, _o| Box::new(DiffIgnoreTest) as Box<dyn Test>) as TestFactory);
    registry.register("EchoGrepTest", Box::new(|_d, _o| Box::new(EchoGrepTest::default()) as Box<dyn Test>) as TestFactory);
    registry.register(
        "TimingTest",
        Box::new(move |_d, _o| Box::new(TimingTest { reporter: Arc::clone(&reporter) }) as Box<dyn Test>) as TestFactory,
    );
}
