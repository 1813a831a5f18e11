use std::fmt;

/// A terminal classification for a test or sub-step.
///
/// Variants are declared in precedence order, highest first: the overall
/// outcome of a test is whichever recorded outcome appears earliest in this
/// list. `Ord`/`PartialOrd` are implemented explicitly against [`PRECEDENCE`]
/// rather than derived, so that reordering variants for readability can
/// never silently change precedence semantics.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub enum Outcome {
    Skipped,
    Blocked,
    DumpedCore,
    TimedOut,
    Failed,
    NotVerified,
    Inspect,
    Passed,
}

/// Declares outcome precedence, highest (worst) first. [`Outcome::precedence_rank`]
/// indexes into this to compare two outcomes.
pub const PRECEDENCE: [Outcome; 8] = [
    Outcome::Skipped,
    Outcome::Blocked,
    Outcome::DumpedCore,
    Outcome::TimedOut,
    Outcome::Failed,
    Outcome::NotVerified,
    Outcome::Inspect,
    Outcome::Passed,
];

impl Outcome {
    /// Position in [`PRECEDENCE`]; lower is more severe / higher precedence.
    pub fn precedence_rank(self) -> usize {
        PRECEDENCE.iter().position(|o| *o == self).expect("exhaustive PRECEDENCE table")
    }

    /// True for the outcomes that represent a definitive failure of a test
    /// or validation step (as opposed to a deliberate skip, a lack of
    /// validation, or a manual-inspection request). Failure-class outcomes
    /// are what trigger `abortOnError` in [`crate::AppError`]-raising call
    /// sites.
    pub fn is_failure(self) -> bool {
        matches!(self, Outcome::Blocked | Outcome::DumpedCore | Outcome::TimedOut | Outcome::Failed)
    }

    /// Short upper-case name, matching the original `LOOKUP` table strings
    /// used in summaries and writers.
    pub fn label(self) -> &'static str {
        match self {
            Outcome::Skipped => "SKIPPED",
            Outcome::Blocked => "BLOCKED",
            Outcome::DumpedCore => "DUMPEDCORE",
            Outcome::TimedOut => "TIMEDOUT",
            Outcome::Failed => "FAILED",
            Outcome::NotVerified => "NOTVERIFIED",
            Outcome::Inspect => "INSPECT",
            Outcome::Passed => "PASSED",
        }
    }
}

impl fmt::Display for Outcome {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.label())
    }
}

impl PartialOrd for Outcome {
    fn partial_cmp(&self, other: &Self) -> Option<std::cmp::Ordering> {
        Some(self.cmp(other))
    }
}

impl Ord for Outcome {
    /// Orders by precedence so that `Iterator::min` yields the overall
    /// (worst) outcome of a list, matching
    /// `sorted(outcomes, key=PRECEDENT.index)[0]` in the original.
    fn cmp(&self, other: &Self) -> std::cmp::Ordering {
        self.precedence_rank().cmp(&other.precedence_rank())
    }
}

/// One entry in a [`crate::OutcomeList`]: the outcome plus an optional reason
/// string, in call order.
#[derive(Clone, Debug)]
pub struct OutcomeEntry {
    pub outcome: Outcome,
    pub reason: String,
}

/// Append-only, order-preserving list of outcomes recorded against a single
/// test or actor, with a cache of the current overall (worst) outcome and
/// its reason so that `overall()` is O(1) rather than re-scanning on every
/// call.
#[derive(Clone, Debug, Default)]
pub struct OutcomeList {
    entries: Vec<OutcomeEntry>,
    cached_overall: Option<Outcome>,
    cached_reason: String,
}

impl OutcomeList {
    pub fn new() -> Self {
        Self::default()
    }

    /// Append a new outcome. Returns `true` if this changed the overall
    /// (worst) outcome, in which case `reason` becomes the new cached
    /// outcome reason (see invariant in `sysrun-core`'s data model: the
    /// reason always tracks the current worst outcome). A second push at
    /// the *same* precedence as the current overall does not change it
    /// either — the reason captured when that precedence was first reached
    /// is what sticks, not whichever push happened last.
    pub fn push(&mut self, outcome: Outcome, reason: impl Into<String>) -> bool {
        let reason = reason.into();
        let changed = match self.cached_overall {
            Some(prev) if outcome < prev => true,
            Some(_) => false,
            None => true,
        };
        if changed {
            self.cached_overall = Some(outcome);
            self.cached_reason = reason.clone();
        }
        self.entries.push(OutcomeEntry { outcome, reason });
        changed
    }

    /// The overall outcome, or [`Outcome::NotVerified`] if nothing has been
    /// recorded yet.
    pub fn overall(&self) -> Outcome {
        self.cached_overall.unwrap_or(Outcome::NotVerified)
    }

    /// The reason string captured when the current overall outcome was
    /// first reached, or an empty string if none was given.
    pub fn overall_reason(&self) -> &str {
        &self.cached_reason
    }

    pub fn entries(&self) -> &[OutcomeEntry] {
        &self.entries
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    /// True if every recorded outcome is [`Outcome::Passed`] (used by the
    /// runner's purge policy). An empty list is not considered all-passed.
    pub fn all_passed(&self) -> bool {
        !self.entries.is_empty() && self.entries.iter().all(|e| e.outcome == Outcome::Passed)
    }

    /// Drop every entry from `len` onward and recompute the cached overall
    /// and its reason from what remains, replaying the same
    /// first-to-reach-this-precedence-wins rule [`Self::push`] applies so
    /// the cached reason still reflects whichever entry first reached the
    /// surviving worst precedence, not merely the last one at that
    /// precedence. Used by `sysrun_user::ProcessUser::expect_failure` to
    /// replace a scoped sub-outcome with its inverse without disturbing
    /// outcomes recorded before the scope began.
    pub fn truncate(&mut self, len: usize) {
        self.entries.truncate(len);
        self.cached_overall = None;
        self.cached_reason.clear();
        for entry in &self.entries {
            let changed = match self.cached_overall {
                Some(prev) if entry.outcome < prev => true,
                Some(_) => false,
                None => true,
            };
            if changed {
                self.cached_overall = Some(entry.outcome);
                self.cached_reason = entry.reason.clone();
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn precedence_orders_skipped_above_passed() {
        assert!(Outcome::Skipped < Outcome::Passed);
        assert!(Outcome::Blocked < Outcome::Failed);
        assert!(Outcome::Failed < Outcome::NotVerified);
    }

    #[test]
    fn empty_list_is_not_verified() {
        let list = OutcomeList::new();
        assert_eq!(list.overall(), Outcome::NotVerified);
        assert_eq!(list.overall_reason(), "");
    }

    #[test]
    fn overall_tracks_minimum_precedence() {
        let mut list = OutcomeList::new();
        list.push(Outcome::Passed, "ok");
        assert_eq!(list.overall(), Outcome::Passed);
        let changed = list.push(Outcome::Blocked, "could not start server");
        assert!(changed);
        assert_eq!(list.overall(), Outcome::Blocked);
        assert_eq!(list.overall_reason(), "could not start server");
    }

    #[test]
    fn lower_precedence_outcome_does_not_replace_reason() {
        let mut list = OutcomeList::new();
        list.push(Outcome::Failed, "assertion failed");
        let changed = list.push(Outcome::Passed, "ignored");
        assert!(!changed);
        assert_eq!(list.overall(), Outcome::Failed);
        assert_eq!(list.overall_reason(), "assertion failed");
    }

    #[test]
    fn equal_precedence_second_push_does_not_replace_reason() {
        let mut list = OutcomeList::new();
        let first = list.push(Outcome::Failed, "reason A");
        assert!(first);
        let second = list.push(Outcome::Failed, "reason B");
        assert!(!second);
        assert_eq!(list.overall(), Outcome::Failed);
        assert_eq!(list.overall_reason(), "reason A");
    }

    #[test]
    fn truncate_recomputes_reason_as_first_to_reach_precedence() {
        let mut list = OutcomeList::new();
        list.push(Outcome::Blocked, "earlier blocked");
        let len = list.entries().len();
        list.push(Outcome::Failed, "reason A");
        list.push(Outcome::Failed, "reason B");
        list.truncate(len);
        assert_eq!(list.overall(), Outcome::Blocked);
        assert_eq!(list.overall_reason(), "earlier blocked");
    }

    #[test]
    fn all_passed_requires_nonempty_and_uniform() {
        let mut list = OutcomeList::new();
        assert!(!list.all_passed());
        list.push(Outcome::Passed, "");
        assert!(list.all_passed());
        list.push(Outcome::Inspect, "check manually");
        assert!(!list.all_passed());
    }

    #[test]
    fn is_failure_matches_abort_classes() {
        assert!(Outcome::Blocked.is_failure());
        assert!(Outcome::DumpedCore.is_failure());
        assert!(Outcome::TimedOut.is_failure());
        assert!(Outcome::Failed.is_failure());
        assert!(!Outcome::Skipped.is_failure());
        assert!(!Outcome::NotVerified.is_failure());
        assert!(!Outcome::Inspect.is_failure());
        assert!(!Outcome::Passed.is_failure());
    }
}
