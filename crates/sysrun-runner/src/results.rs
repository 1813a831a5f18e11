use std::collections::HashMap;

use sysrun_core::Outcome;

/// One published (descriptor, cycle) result, in the order it was handed to
/// writers — which is submission order, not completion order (see the
/// publish-cursor invariant in [`crate::Runner::run`]).
#[derive(Clone, Debug)]
pub struct PublishedResult {
    pub index: usize,
    pub test_id: String,
    pub cycle: usize,
    pub outcome: Outcome,
    pub reason: String,
    pub output_subdir: std::path::PathBuf,
}

/// Everything a caller of [`crate::Runner::run`] gets back: every published
/// result in order, a tally by (cycle, outcome), and whether the run was
/// cut short by a keyboard interrupt the operator chose not to continue
/// past.
#[derive(Debug, Default)]
pub struct RunResults {
    pub published: Vec<PublishedResult>,
    tally: HashMap<(usize, Outcome), usize>,
    pub total_duration_secs: f64,
    pub wall_clock_secs: f64,
    pub interrupted: bool,
}

impl RunResults {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn record(&mut self, result: PublishedResult) {
        *self.tally.entry((result.cycle, result.outcome)).or_insert(0) += 1;
        self.published.push(result);
    }

    pub fn count(&self, cycle: usize, outcome: Outcome) -> usize {
        self.tally.get(&(cycle, outcome)).copied().unwrap_or(0)
    }

    /// True if any published result in any cycle is outcome-failure-class
    /// (see [`Outcome::is_failure`]). Drives the process exit code.
    pub fn has_failures(&self) -> bool {
        self.published.iter().any(|r| r.outcome.is_failure())
    }
}
