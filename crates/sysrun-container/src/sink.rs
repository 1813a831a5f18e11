use std::cell::RefCell;
use std::fs::{File, OpenOptions};
use std::io::Write as _;
use std::path::Path;
use std::sync::{Arc, Mutex};

use tracing::field::{Field, Visit};
use tracing::{Event, Level, Subscriber};
use tracing_subscriber::layer::Context;
use tracing_subscriber::Layer;

/// A per-test log sink: every event recorded while a container has it bound
/// is formatted and written to `run.log`, and also kept in memory so the
/// runner can replay it contiguously into the global log once the test is
/// published (see spec.md §4.D's "flush buffered log lines").
///
/// Realizes Design Note "Per-test log capture": rather than attach/detach
/// on a single process-wide logger object (Rust has no such mutable
/// singleton), this is a value bound into a thread-local slot that
/// [`ContainerLogLayer`] consults on every event. Binding/unbinding a
/// thread-local is the direct analogue of the original's
/// `logger.addHandler`/`removeHandler`.
pub struct ContainerLogSink {
    file: Mutex<File>,
    lines: Mutex<Vec<String>>,
    level: Level,
}

impl ContainerLogSink {
    /// Open (create/truncate) `run.log` inside `output_subdir`. `level`
    /// mirrors the global stdout sink's level: `DEBUG` if that is `DEBUG`,
    /// else `INFO`, per spec.md §4.C.3.
    pub fn open(output_subdir: &Path, level: Level) -> std::io::Result<Self> {
        let path = output_subdir.join("run.log");
        let file = OpenOptions::new().create(true).write(true).truncate(true).open(path)?;
        Ok(Self {
            file: Mutex::new(file),
            lines: Mutex::new(Vec::new()),
            level,
        })
    }

    fn write_line(&self, line: String) {
        if let Ok(mut f) = self.file.lock() {
            let _ = writeln!(f, "{line}");
        }
        if let Ok(mut lines) = self.lines.lock() {
            lines.push(line);
        }
    }

    /// Drain the in-memory buffer, for the runner to replay into the global
    /// log when this test's result is published.
    pub fn take_lines(&self) -> Vec<String> {
        self.lines.lock().map(|mut l| std::mem::take(&mut *l)).unwrap_or_default()
    }
}

thread_local! {
    static CURRENT_SINK: RefCell<Option<Arc<ContainerLogSink>>> = const { RefCell::new(None) };
}

/// Bind `sink` to the calling thread until the returned guard drops.
/// Containers run one-per-worker-thread (or inline, for `threads == 1`), so
/// a thread-local slot is sufficient to scope the sink to exactly the
/// container using it, with no cross-test leakage even under the worker
/// pool. This is the direct analogue of the original's
/// `logger.addHandler`/`removeHandler` pair.
#[must_use]
pub fn bind_scoped_sink(sink: Arc<ContainerLogSink>) -> SinkGuard {
    CURRENT_SINK.with(|cell| *cell.borrow_mut() = Some(sink));
    SinkGuard(())
}

pub struct SinkGuard(());

impl Drop for SinkGuard {
    fn drop(&mut self) {
        CURRENT_SINK.with(|cell| *cell.borrow_mut() = None);
    }
}

/// A `tracing_subscriber::Layer` installed once, globally, at process
/// start. It writes every event to whichever [`ContainerLogSink`] (if any)
/// is currently bound on the emitting thread, in addition to whatever the
/// global fmt layer does with the same event.
pub struct ContainerLogLayer;

impl<S: Subscriber> Layer<S> for ContainerLogLayer {
    fn on_event(&self, event: &Event<'_>, _ctx: Context<'_, S>) {
        CURRENT_SINK.with(|cell| {
            let Some(sink) = cell.borrow().clone() else {
                return;
            };
            if *event.metadata().level() > sink.level {
                return;
            }
            let mut visitor = MessageVisitor::default();
            event.record(&mut visitor);
            let line = format!(
                "{} {:>5} {}: {}",
                chrono::Local::now().format("%Y-%m-%d %H:%M:%S%.3f"),
                event.metadata().level(),
                event.metadata().target(),
                visitor.message,
            );
            sink.write_line(line);
        });
    }
}

#[derive(Default)]
struct MessageVisitor {
    message: String,
}

impl Visit for MessageVisitor {
    fn record_debug(&mut self, field: &Field, value: &dyn std::fmt::Debug) {
        if field.name() == "message" {
            self.message = format!("{value:?}");
        } else if self.message.is_empty() {
            self.message = format!("{}={:?}", field.name(), value);
        } else {
            self.message.push_str(&format!(" {}={:?}", field.name(), value));
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn sink_writes_run_log_and_buffers_lines() {
        let dir = tempfile::tempdir().unwrap();
        let sink = Arc::new(ContainerLogSink::open(dir.path(), Level::INFO).unwrap());
        sink.write_line("hello".to_string());
        let contents = std::fs::read_to_string(dir.path().join("run.log")).unwrap();
        assert_eq!(contents, "hello\n");
        assert_eq!(sink.take_lines(), vec!["hello".to_string()]);
        assert!(sink.take_lines().is_empty());
    }
}
