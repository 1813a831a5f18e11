use std::collections::VecDeque;
use std::path::Path;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{mpsc, Arc, Mutex};
use std::thread;
use std::time::{Duration, Instant};

use tracing::Level;

use sysrun_container::{ContainerRecord, TestContainer, TestRegistry};
use sysrun_core::{Descriptor, RunnerConfig};
use sysrun_user::TcpPortAllocator;
use sysrun_writer::Writer;

use crate::hooks::{NoopHooks, RunnerHooks};
use crate::interrupt::watch_sigint;
use crate::results::{PublishedResult, RunResults};

/// Drives the whole test run: one or more cycles over a fixed descriptor
/// list, dispatched either inline or across a worker pool, with results
/// published to every registered [`Writer`] in submission order regardless
/// of completion order. This is component 4.D of the engine, matching the
/// original's `BaseRunner.start` loop (`for cycle in range(cycles): for
/// descriptor in descriptors: ...`) plus its `ThreadPoolExecutor`-backed
/// concurrent mode.
pub struct Runner {
    config: Arc<RunnerConfig>,
    registry: Arc<TestRegistry>,
    descriptors: Vec<Descriptor>,
    writers: Vec<Box<dyn Writer>>,
    port_allocator: Arc<TcpPortAllocator>,
    cancel: Arc<AtomicBool>,
    log_level: Level,
    hooks: Box<dyn RunnerHooks>,
}

impl Runner {
    pub fn new(config: RunnerConfig, registry: TestRegistry, descriptors: Vec<Descriptor>) -> Self {
        Self {
            config: Arc::new(config),
            registry: Arc::new(registry),
            descriptors,
            writers: Vec::new(),
            port_allocator: Arc::new(TcpPortAllocator::new()),
            cancel: Arc::new(AtomicBool::new(false)),
            log_level: Level::INFO,
            hooks: Box::new(NoopHooks),
        }
    }

    pub fn with_writer(mut self, writer: Box<dyn Writer>) -> Self {
        self.writers.push(writer);
        self
    }

    pub fn with_hooks(mut self, hooks: Box<dyn RunnerHooks>) -> Self {
        self.hooks = hooks;
        self
    }

    pub fn with_log_level(mut self, level: Level) -> Self {
        self.log_level = level;
        self
    }

    /// A clone of the cancellation flag this runner honors. Callers that
    /// want `Ctrl-C` to interrupt a run should pass this to
    /// [`watch_sigint`] (or [`Self::enable_interrupt_watch`]) before calling
    /// [`Self::run`].
    pub fn cancel_handle(&self) -> Arc<AtomicBool> {
        Arc::clone(&self.cancel)
    }

    /// Convenience wrapper around [`watch_sigint`] wired to this runner's
    /// own cancellation flag.
    pub fn enable_interrupt_watch(&self) {
        watch_sigint(self.cancel_handle());
    }

    /// Run every cycle to completion (or until an unresolved interrupt
    /// stops the run early) and return the accumulated [`RunResults`].
    pub fn run(&mut self) -> RunResults {
        let cycles = self.config.cycles.max(1);
        let total_tests = self.descriptors.len() * cycles;
        for writer in &mut self.writers {
            if let Err(e) = writer.setup(total_tests) {
                tracing::warn!(error = %e, "writer setup failed");
            }
        }
        self.hooks.setup();

        let mut results = RunResults::new();
        let wall_started = Instant::now();

        for cycle in 1..=cycles {
            if self.cancel.load(Ordering::SeqCst) && !self.resolve_interrupt(&mut results) {
                break;
            }

            if self.config.threads <= 1 {
                self.dispatch_inline(cycle, &mut results);
            } else {
                self.dispatch_pooled(cycle, &mut results);
            }

            self.hooks.cycle_complete(cycle);

            if self.cancel.load(Ordering::SeqCst) && !self.resolve_interrupt(&mut results) {
                break;
            }
        }

        self.hooks.cleanup();
        for writer in &mut self.writers {
            if let Err(e) = writer.cleanup() {
                tracing::warn!(error = %e, "writer cleanup failed");
            }
        }
        results.wall_clock_secs = round2(wall_started.elapsed().as_secs_f64());
        results
    }

    /// Asks the operator whether to keep going past an interrupt, per
    /// `RunnerConfig::prompt_on_interrupt`. Returns `true` to resume (and
    /// resets the cancel flag so a later `Ctrl-C` is observable again),
    /// `false` to stop the run here.
    fn resolve_interrupt(&mut self, results: &mut RunResults) -> bool {
        if !self.config.prompt_on_interrupt {
            results.interrupted = true;
            return false;
        }
        if prompt_continue() {
            self.cancel.store(false, Ordering::SeqCst);
            true
        } else {
            results.interrupted = true;
            false
        }
    }

    fn make_container(&self, index: usize, descriptor: Descriptor, cycle: usize) -> TestContainer {
        TestContainer {
            index,
            descriptor,
            cycle,
            registry: Arc::clone(&self.registry),
            config: Arc::clone(&self.config),
            port_allocator: Arc::clone(&self.port_allocator),
            cancel: Arc::clone(&self.cancel),
            log_level: self.log_level,
        }
    }

    /// `threads == 1`: skip the pool machinery entirely. Containers finish
    /// in submission order by construction, so results publish immediately
    /// as each one completes.
    fn dispatch_inline(&mut self, cycle: usize, results: &mut RunResults) {
        for index in 0..self.descriptors.len() {
            if self.cancel.load(Ordering::SeqCst) {
                break;
            }
            let descriptor = self.descriptors[index].clone();
            let container = self.make_container(index, descriptor, cycle);
            let record = container.run();
            self.publish_one(record, results);
        }
    }

    /// `threads > 1`: a fixed pool of worker threads pulls containers off a
    /// shared queue and reports completions over an `mpsc` channel, which
    /// completes out of order. Results are staged by index and released to
    /// `publish_one` only as the publish cursor reaches them, so writers and
    /// hooks see the same submission-ordered sequence [`dispatch_inline`]
    /// would have produced, with no `tokio::task::JoinSet` involved since
    /// nothing else in this crate is async.
    fn dispatch_pooled(&mut self, cycle: usize, results: &mut RunResults) {
        let n = self.descriptors.len();
        if n == 0 {
            return;
        }
        let worker_count = self.config.threads.min(n);

        let queue: VecDeque<TestContainer> = (0..n)
            .map(|i| self.make_container(i, self.descriptors[i].clone(), cycle))
            .collect();
        let queue = Arc::new(Mutex::new(queue));
        let (tx, rx) = mpsc::channel::<ContainerRecord>();

        let mut handles = Vec::with_capacity(worker_count);
        for _ in 0..worker_count {
            let queue = Arc::clone(&queue);
            let tx = tx.clone();
            let cancel = Arc::clone(&self.cancel);
            handles.push(thread::spawn(move || loop {
                if cancel.load(Ordering::SeqCst) {
                    break;
                }
                let next = queue.lock().expect("container queue poisoned").pop_front();
                let Some(container) = next else {
                    break;
                };
                let record = container.run();
                if tx.send(record).is_err() {
                    break;
                }
            }));
        }
        drop(tx);

        let mut staged: Vec<Option<ContainerRecord>> = (0..n).map(|_| None).collect();
        let mut cursor = 0usize;
        while cursor < n {
            match rx.recv() {
                Ok(record) => {
                    let index = record.index;
                    staged[index] = Some(record);
                    while cursor < n {
                        let Some(record) = staged[cursor].take() else {
                            break;
                        };
                        self.publish_one(record, results);
                        cursor += 1;
                    }
                }
                Err(_) => break,
            }
        }

        for handle in handles {
            let _ = handle.join();
        }
    }

    /// Forward one completed result to every writer and hook, in the order
    /// [`Self::run`] guarantees. Never called directly by dispatch loops out
    /// of order — see [`Self::dispatch_pooled`]'s staging buffer.
    fn publish_one(&mut self, record: ContainerRecord, results: &mut RunResults) {
        if self.config.threads > 1 {
            for line in &record.log_lines {
                tracing::info!(test_id = %record.descriptor.id, "{line}");
            }
        }

        if self.config.record {
            for writer in &mut self.writers {
                if let Err(e) = writer.process_result(&record) {
                    tracing::warn!(error = %e, test_id = %record.descriptor.id, "writer failed to process result");
                }
            }
        }

        purge_output(&record.output_subdir, self.config.purge, record.outcomes.all_passed());

        results.total_duration_secs = round2(results.total_duration_secs + record.elapsed_secs);
        self.hooks.test_complete(&record);
        results.record(PublishedResult {
            index: record.index,
            test_id: record.descriptor.id.clone(),
            cycle: record.cycle,
            outcome: record.overall_outcome(),
            reason: record.outcomes.overall_reason().to_string(),
            output_subdir: record.output_subdir.clone(),
        });
    }
}

/// Zero-length files are always removed, regardless of `purge`: they are
/// typically just-created capture files a test never wrote anything to.
/// When `purge` is set and the test's overall outcome was all-`Passed`,
/// every other file except `run.log` is removed too, matching the
/// original's `purge` option on `BaseRunner`. Removal retries a few times
/// with a short sleep since a just-closed process capture file can still be
/// briefly held open by the OS after the owning process exits.
fn purge_output(output_subdir: &Path, purge: bool, all_passed: bool) {
    let Ok(entries) = std::fs::read_dir(output_subdir) else {
        return;
    };
    for entry in entries.flatten() {
        let Ok(metadata) = entry.metadata() else {
            continue;
        };
        if !metadata.is_file() {
            continue;
        }
        let is_run_log = entry.file_name() == "run.log";
        let zero_length = metadata.len() == 0;
        let purge_as_passed = purge && all_passed && !is_run_log;
        if zero_length || purge_as_passed {
            remove_with_retries(&entry.path());
        }
    }
}

fn remove_with_retries(path: &Path) {
    for attempt in 0..3 {
        if std::fs::remove_file(path).is_ok() {
            return;
        }
        if attempt < 2 {
            thread::sleep(Duration::from_millis(100));
        }
    }
}

fn prompt_continue() -> bool {
    use std::io::{BufRead, Write};
    print!("run interrupted - continue? [y/N] ");
    if std::io::stdout().flush().is_err() {
        return false;
    }
    let mut line = String::new();
    if std::io::stdin().lock().read_line(&mut line).is_err() {
        return false;
    }
    matches!(line.trim().to_ascii_lowercase().as_str(), "y" | "yes")
}

fn round2(value: f64) -> f64 {
    (value * 100.0).round() / 100.0
}

#[cfg(test)]
mod tests {
    use super::*;
    use sysrun_core::{DescriptorState, Outcome};
    use sysrun_user::{Abort, ProcessUser};
    use sysrun_container::Test;

    fn descriptor(id: &str, output: &Path) -> Descriptor {
        Descriptor {
            id: id.to_string(),
            module: "demo".into(),
            class_name: "Demo".into(),
            input: output.to_path_buf(),
            output: output.join(id),
            modes: vec![],
            state: DescriptorState::Runnable,
            purpose: String::new(),
            title: String::new(),
        }
    }

    struct SleepyTest {
        millis: u64,
    }
    impl Test for SleepyTest {
        fn execute(&mut self, user: &mut ProcessUser) -> Result<(), Abort> {
            thread::sleep(Duration::from_millis(self.millis));
            user.assert_true(true, "ok", Some(false))?;
            Ok(())
        }
    }

    /// One factory shared by every descriptor: the delay is derived from
    /// the numeric suffix of the descriptor id (`"t3"` sleeps longer than
    /// `"t1"`) so dispatch tests can force completion order to differ from
    /// submission order.
    fn registry_with_sleepers() -> TestRegistry {
        let mut registry = TestRegistry::new();
        registry.register(
            "Demo",
            Box::new(move |d, _o| {
                let millis = d.id.trim_start_matches('t').parse::<u64>().unwrap_or(0) * 20;
                Box::new(SleepyTest { millis }) as Box<dyn Test>
            }),
        );
        registry
    }

    #[test]
    fn inline_dispatch_publishes_in_submission_order() {
        let dir = tempfile::tempdir().unwrap();
        let descriptors = vec![descriptor("t3", dir.path()), descriptor("t1", dir.path()), descriptor("t2", dir.path())];
        let registry = registry_with_sleepers();
        let config = RunnerConfig { threads: 1, ..RunnerConfig::default() };
        let mut runner = Runner::new(config, registry, descriptors);
        let results = runner.run();
        let ids: Vec<_> = results.published.iter().map(|r| r.test_id.clone()).collect();
        assert_eq!(ids, vec!["t3", "t1", "t2"]);
    }

    #[test]
    fn pooled_dispatch_still_publishes_in_submission_order() {
        let dir = tempfile::tempdir().unwrap();
        // "t3" sorts last but is constructed to take the longest, so a
        // naive completion-order publish would report it last among
        // workers racing to finish; the staging buffer must still emit
        // index order 0,1,2.
        let descriptors = vec![descriptor("t3", dir.path()), descriptor("t1", dir.path()), descriptor("t2", dir.path())];
        let registry = registry_with_sleepers();
        let config = RunnerConfig { threads: 4, ..RunnerConfig::default() };
        let mut runner = Runner::new(config, registry, descriptors);
        let results = runner.run();
        let ids: Vec<_> = results.published.iter().map(|r| r.test_id.clone()).collect();
        assert_eq!(ids, vec!["t3", "t1", "t2"]);
    }

    #[test]
    fn zero_length_files_are_always_purged() {
        let dir = tempfile::tempdir().unwrap();
        let descriptors = vec![descriptor("t1", dir.path())];
        let registry = registry_with_sleepers();
        let config = RunnerConfig { threads: 1, purge: false, ..RunnerConfig::default() };
        let output = descriptors[0].output.clone();
        let mut runner = Runner::new(config, registry, descriptors);
        std::fs::create_dir_all(&output).unwrap();
        std::fs::write(output.join("empty.out"), b"").unwrap();
        let _ = runner.run();
        assert!(!output.join("empty.out").exists());
        assert!(output.join("run.log").exists());
    }

    #[test]
    fn purge_removes_nonempty_files_only_when_all_passed() {
        let dir = tempfile::tempdir().unwrap();
        let descriptors = vec![descriptor("t1", dir.path())];
        let registry = registry_with_sleepers();
        let config = RunnerConfig { threads: 1, purge: true, ..RunnerConfig::default() };
        let output = descriptors[0].output.clone();
        let mut runner = Runner::new(config, registry, descriptors);
        std::fs::create_dir_all(&output).unwrap();
        std::fs::write(output.join("stdout.out"), b"some output").unwrap();
        let results = runner.run();
        assert_eq!(results.published[0].outcome, Outcome::Passed);
        assert!(!output.join("stdout.out").exists());
        assert!(output.join("run.log").exists());
    }

    #[test]
    fn cancel_handle_stops_inline_dispatch_before_later_descriptors() {
        let dir = tempfile::tempdir().unwrap();
        let descriptors = vec![descriptor("t1", dir.path()), descriptor("t2", dir.path())];
        let registry = registry_with_sleepers();
        let config = RunnerConfig { threads: 1, prompt_on_interrupt: false, ..RunnerConfig::default() };
        let mut runner = Runner::new(config, registry, descriptors);
        runner.cancel_handle().store(true, Ordering::SeqCst);
        let results = runner.run();
        assert!(results.interrupted);
        assert!(results.published.is_empty());
    }
}
