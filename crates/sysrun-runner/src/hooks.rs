use sysrun_container::ContainerRecord;

/// Lifecycle callbacks a caller of [`crate::Runner`] can observe a run
/// through, matching the original's `BaseRunner.setup`/`cycleComplete`/
/// `cleanup` override points plus a per-test completion hook the original
/// exposed via `BaseRunner.testComplete`. All methods default to doing
/// nothing, so a caller only implements what it needs.
pub trait RunnerHooks: Send {
    fn setup(&mut self) {}

    /// Invoked once every descriptor in a cycle has been dispatched (not
    /// necessarily published — see §4.D ordering) and that cycle's results
    /// have all been published.
    fn cycle_complete(&mut self, cycle: usize) {
        let _ = cycle;
    }

    /// Invoked once, after the final cycle completes (or the run is
    /// interrupted), before writers are torn down.
    fn cleanup(&mut self) {}

    /// Invoked once per published result, after it has been forwarded to
    /// every writer.
    fn test_complete(&mut self, record: &ContainerRecord) {
        let _ = record;
    }
}

/// The default, used when a caller has no hooks of its own.
pub struct NoopHooks;

impl RunnerHooks for NoopHooks {}
