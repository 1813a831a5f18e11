use std::fs;
use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::Instant;

use tracing::{info, Level};

use sysrun_core::{Descriptor, DescriptorState, Outcome, OutcomeList, RunnerConfig};
use sysrun_user::{ProcessUser, TcpPortAllocator};

use crate::registry::{PlaceholderTest, Test, TestRegistry};
use crate::sink::{bind_scoped_sink, ContainerLogSink};

/// Everything the runner needs back from one (descriptor, cycle)
/// invocation. Never constructed with a partial outcome: by the time this
/// is returned, `outcomes` always reflects the test's final state.
pub struct ContainerRecord {
    pub index: usize,
    pub descriptor: Descriptor,
    pub cycle: usize,
    pub output_subdir: PathBuf,
    pub outcomes: OutcomeList,
    pub elapsed_secs: f64,
    pub log_lines: Vec<String>,
    pub kbrd_int: bool,
}

impl ContainerRecord {
    pub fn overall_outcome(&self) -> Outcome {
        self.outcomes.overall()
    }
}

/// A single-use executor for one (descriptor, cycle) pair. `cycle` is
/// 1-based, matching the `cycle<N>` directory naming in spec.md §6: the
/// first pass is cycle 1 and uses `descriptor.output` directly; cycle 2
/// onward nest inside `descriptor.output/cycleN/`. Purging stale content
/// from a previous run only happens on cycle 1 — later cycles always get a
/// fresh, never-before-used subdirectory, so there is nothing to purge
/// (this resolves the spec's "cycle 0" wording as the zero-indexed first
/// pass; see DESIGN.md).
pub struct TestContainer {
    pub index: usize,
    pub descriptor: Descriptor,
    pub cycle: usize,
    pub registry: Arc<TestRegistry>,
    pub config: Arc<RunnerConfig>,
    pub port_allocator: Arc<TcpPortAllocator>,
    pub cancel: Arc<AtomicBool>,
    pub log_level: Level,
}

impl TestContainer {
    fn output_subdir(&self) -> PathBuf {
        if self.cycle > 1 {
            self.descriptor.output.join(format!("cycle{}", self.cycle))
        } else {
            self.descriptor.output.clone()
        }
    }

    /// Run the container to completion. Never panics to its caller: any
    /// panic inside test phases is caught at this boundary and recorded as
    /// `Blocked`, per spec.md §4.C step 8.
    pub fn run(self) -> ContainerRecord {
        let started = Instant::now();
        let output_subdir = self.output_subdir();
        let mut outcomes = OutcomeList::new();
        let mut kbrd_int = false;

        if let Err(e) = self.prepare_output_dir(&output_subdir) {
            outcomes.push(Outcome::Blocked, format!("could not prepare output directory: {e}"));
            return ContainerRecord {
                index: self.index,
                descriptor: self.descriptor,
                cycle: self.cycle,
                output_subdir,
                outcomes,
                elapsed_secs: round2(started.elapsed().as_secs_f64()),
                log_lines: Vec::new(),
                kbrd_int,
            };
        }

        let sink = match ContainerLogSink::open(&output_subdir, self.log_level) {
            Ok(s) => Some(Arc::new(s)),
            Err(e) => {
                tracing::warn!(error = %e, "failed to open per-test log sink");
                None
            }
        };
        let _guard = sink.clone().map(bind_scoped_sink);

        let mut user = ProcessUser::new(self.descriptor.input.clone(), output_subdir.clone(), Arc::clone(&self.port_allocator))
            .with_test_id(self.descriptor.id.clone());
        user.default_abort_on_error = self.config.default_abort_on_error;
        user.default_ignore_exit_status = self.config.default_ignore_exit_status;

        let test = self.registry.construct(&self.descriptor, &output_subdir);
        let (mut test, construction_failed) = match test {
            Some(t) => (t, false),
            None => (Box::new(PlaceholderTest) as Box<dyn Test>, true),
        };

        let outcome = std::panic::catch_unwind(std::panic::AssertUnwindSafe(|| {
            self.dispatch(&mut *test, &mut user, construction_failed, &output_subdir)
        }));

        match outcome {
            Ok(Ok(())) => {}
            Ok(Err(flag)) => kbrd_int = flag,
            Err(panic) => {
                let message = panic_message(&panic);
                let _ = user.add_outcome(Outcome::Blocked, format!("unhandled panic: {message}"), true, Some(false), Vec::new());
            }
        }

        // cleanup always runs, even after a panic or keyboard interrupt.
        std::panic::catch_unwind(std::panic::AssertUnwindSafe(|| test.cleanup(&mut user))).ok();
        user.cleanup();

        let elapsed_secs = round2(started.elapsed().as_secs_f64());
        let overall = user.outcome();
        info!(test_id = %self.descriptor.id, outcome = %overall, elapsed_secs, "test complete");

        let log_lines = sink.map(|s| s.take_lines()).unwrap_or_default();

        ContainerRecord {
            index: self.index,
            descriptor: self.descriptor,
            cycle: self.cycle,
            output_subdir,
            outcomes: user.outcomes().clone(),
            elapsed_secs,
            log_lines,
            kbrd_int,
        }
    }

    fn prepare_output_dir(&self, output_subdir: &Path) -> std::io::Result<()> {
        if self.cycle <= 1 && output_subdir.exists() {
            purge_recursive_contents(output_subdir)?;
        }
        fs::create_dir_all(output_subdir)
    }

    /// Dispatches on descriptor state/mode, then `setup`/`execute`/
    /// `validate`. Returns `Ok(true)` if a keyboard interrupt was observed,
    /// `Ok(false)` otherwise. Errors from `add_outcome`/`Abort` are
    /// swallowed here since they've already updated `user`'s outcome list —
    /// the container only cares about the final state, not the control-flow
    /// signal.
    fn dispatch(
        &self,
        test: &mut dyn Test,
        user: &mut ProcessUser,
        construction_failed: bool,
        output_subdir: &Path,
    ) -> Result<(), bool> {
        if self.descriptor.state != DescriptorState::Runnable {
            let _ = user.add_outcome(Outcome::Skipped, "descriptor is not runnable", true, Some(false), Vec::new());
            return Ok(());
        }
        if !self.descriptor.supports_mode(&self.config.mode) {
            tracing::info!(mode = %self.config.mode, test_id = %self.descriptor.id, "skipping: mode not supported");
            let _ = user.add_outcome(Outcome::Skipped, format!("mode '{}' not supported", self.config.mode), true, Some(false), Vec::new());
            return Ok(());
        }
        if construction_failed {
            let _ = user.add_outcome(
                Outcome::Blocked,
                format!("no test factory registered for class '{}'", self.descriptor.class_name),
                true,
                Some(false),
                Vec::new(),
            );
            return Ok(());
        }

        for phase in ["setup", "execute", "validate"] {
            if self.cancel.load(Ordering::SeqCst) {
                let _ = user.add_outcome(Outcome::Blocked, "interrupted by keyboard interrupt", true, Some(false), Vec::new());
                return Err(true);
            }
            let result = match phase {
                "setup" => test.setup(user),
                "execute" => test.execute(user),
                _ => test.validate(user),
            };
            if result.is_err() {
                // The Abort has already been recorded into `user`'s outcome
                // list by the call site that raised it; nothing further to
                // do but stop running subsequent phases. The core-file scan
                // below still runs: a test can abort after having already
                // dumped core.
                break;
            }
        }
        scan_for_core_files(output_subdir, user);
        Ok(())
    }
}

fn scan_for_core_files(output_subdir: &Path, user: &mut ProcessUser) {
    let Ok(entries) = fs::read_dir(output_subdir) else {
        return;
    };
    for entry in entries.flatten() {
        let Ok(file_type) = entry.file_type() else {
            continue;
        };
        if !file_type.is_file() {
            continue;
        }
        if entry.file_name().to_string_lossy().starts_with("core") {
            let _ = user.add_outcome(
                Outcome::DumpedCore,
                format!("core file found: {}", entry.file_name().to_string_lossy()),
                true,
                Some(false),
                Vec::new(),
            );
            break;
        }
    }
}

/// Recursively remove everything inside `dir` (symlinks unlinked, regular
/// files removed, subdirectories recursed into and removed), leaving `dir`
/// itself in place so the "output directory exists" invariant holds even
/// mid-purge.
fn purge_recursive_contents(dir: &Path) -> std::io::Result<()> {
    for entry in fs::read_dir(dir)? {
        let entry = entry?;
        let path = entry.path();
        let file_type = entry.file_type()?;
        if file_type.is_symlink() || file_type.is_file() {
            fs::remove_file(&path)?;
        } else if file_type.is_dir() {
            fs::remove_dir_all(&path)?;
        }
    }
    Ok(())
}

fn round2(value: f64) -> f64 {
    (value * 100.0).round() / 100.0
}

fn panic_message(panic: &(dyn std::any::Any + Send)) -> String {
    if let Some(s) = panic.downcast_ref::<&str>() {
        (*s).to_string()
    } else if let Some(s) = panic.downcast_ref::<String>() {
        s.clone()
    } else {
        "non-string panic payload".to_string()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::AtomicBool;
    use sysrun_core::{Descriptor, DescriptorState};
    use sysrun_user::Abort;

    fn descriptor(output: &Path) -> Descriptor {
        Descriptor {
            id: "t1".into(),
            module: "demo".into(),
            class_name: "Demo".into(),
            input: output.to_path_buf(),
            output: output.to_path_buf(),
            modes: vec![],
            state: DescriptorState::Runnable,
            purpose: String::new(),
            title: String::new(),
        }
    }

    struct PassingTest;
    impl Test for PassingTest {
        fn execute(&mut self, user: &mut ProcessUser) -> Result<(), Abort> {
            user.assert_true(true, "ok", Some(false))?;
            Ok(())
        }
    }

    struct PanickingTest;
    impl Test for PanickingTest {
        fn execute(&mut self, _user: &mut ProcessUser) -> Result<(), Abort> {
            panic!("boom");
        }
    }

    fn container(output: &Path, registry: TestRegistry) -> TestContainer {
        TestContainer {
            index: 0,
            descriptor: descriptor(output),
            cycle: 1,
            registry: Arc::new(registry),
            config: Arc::new(RunnerConfig::default()),
            port_allocator: Arc::new(TcpPortAllocator::new()),
            cancel: Arc::new(AtomicBool::new(false)),
            log_level: Level::INFO,
        }
    }

    #[test]
    fn passing_test_produces_run_log_and_passed_outcome() {
        let dir = tempfile::tempdir().unwrap();
        let mut registry = TestRegistry::new();
        registry.register("Demo", Box::new(|_d, _o| Box::new(PassingTest) as Box<dyn Test>));
        let record = container(dir.path(), registry).run();
        assert_eq!(record.overall_outcome(), Outcome::Passed);
        assert!(dir.path().join("run.log").exists());
        assert!(!record.kbrd_int);
    }

    #[test]
    fn unknown_class_name_blocks_but_still_writes_run_log() {
        let dir = tempfile::tempdir().unwrap();
        let registry = TestRegistry::new();
        let record = container(dir.path(), registry).run();
        assert_eq!(record.overall_outcome(), Outcome::Blocked);
        assert!(dir.path().join("run.log").exists());
    }

    #[test]
    fn panic_during_execute_is_caught_and_recorded_as_blocked() {
        let dir = tempfile::tempdir().unwrap();
        let mut registry = TestRegistry::new();
        registry.register("Demo", Box::new(|_d, _o| Box::new(PanickingTest) as Box<dyn Test>));
        let record = container(dir.path(), registry).run();
        assert_eq!(record.overall_outcome(), Outcome::Blocked);
    }

    #[test]
    fn not_runnable_descriptor_is_skipped() {
        let dir = tempfile::tempdir().unwrap();
        let mut d = descriptor(dir.path());
        d.state = DescriptorState::Deprecated;
        let mut registry = TestRegistry::new();
        registry.register("Demo", Box::new(|_d, _o| Box::new(PassingTest) as Box<dyn Test>));
        let c = TestContainer {
            index: 0,
            descriptor: d,
            cycle: 1,
            registry: Arc::new(registry),
            config: Arc::new(RunnerConfig::default()),
            port_allocator: Arc::new(TcpPortAllocator::new()),
            cancel: Arc::new(AtomicBool::new(false)),
            log_level: Level::INFO,
        };
        let record = c.run();
        assert_eq!(record.overall_outcome(), Outcome::Skipped);
    }

    #[test]
    fn second_cycle_nests_in_cyclen_subdir() {
        let dir = tempfile::tempdir().unwrap();
        let mut registry = TestRegistry::new();
        registry.register("Demo", Box::new(|_d, _o| Box::new(PassingTest) as Box<dyn Test>));
        let mut c = container(dir.path(), registry);
        c.cycle = 2;
        let record = c.run();
        assert_eq!(record.output_subdir, dir.path().join("cycle2"));
        assert!(record.output_subdir.join("run.log").exists());
    }

    #[test]
    fn core_file_triggers_dumped_core() {
        let dir = tempfile::tempdir().unwrap();
        let mut registry = TestRegistry::new();
        registry.register(
            "Demo",
            Box::new(|_d, o| {
                std::fs::write(o.join("core.1234"), b"").unwrap();
                Box::new(PassingTest) as Box<dyn Test>
            }),
        );
        let record = container(dir.path(), registry).run();
        assert_eq!(record.overall_outcome(), Outcome::DumpedCore);
    }
}
