use std::path::Path;

use regex::Regex;

use sysrun_core::{Condition, Outcome};

use crate::abort::{Abort, CallRecord};
use crate::wait::regex_matches;
use crate::ProcessUser;

impl ProcessUser {
    /// Record `Passed`/`Failed` depending on `condition`, per the
    /// `add_outcome` contract (returns `Err` only if this aborts).
    pub fn assert_true(
        &mut self,
        condition: bool,
        reason: impl Into<String>,
        abort_on_error: Option<bool>,
    ) -> Result<Outcome, Abort> {
        let outcome = if condition { Outcome::Passed } else { Outcome::Failed };
        self.add_outcome(outcome, reason, true, abort_on_error, CallRecord::new())?;
        Ok(outcome)
    }

    /// Compare two text files line-by-line, skipping lines matching any
    /// `ignores` pattern in *either* file before comparing what remains.
    /// `Passed` if every remaining line pairs up identically; `Failed`
    /// naming the first differing line otherwise.
    pub fn assert_diff(
        &mut self,
        path1: &Path,
        path2: &Path,
        ignores: &[Regex],
        abort_on_error: Option<bool>,
    ) -> Result<Outcome, Abort> {
        let filtered = |path: &Path| -> std::io::Result<Vec<String>> {
            let contents = std::fs::read_to_string(path)?;
            Ok(contents
                .lines()
                .filter(|line| !ignores.iter().any(|re| re.is_match(line)))
                .map(str::to_string)
                .collect())
        };

        let (left, right) = match (filtered(path1), filtered(path2)) {
            (Ok(l), Ok(r)) => (l, r),
            (Err(e), _) | (_, Err(e)) => {
                return self.assert_true(false, format!("could not read diff input: {e}"), abort_on_error);
            }
        };

        let reason = if left.len() != right.len() {
            Some(format!(
                "{} has {} line(s) after filtering, {} has {}",
                display(path1),
                left.len(),
                display(path2),
                right.len()
            ))
        } else {
            left.iter()
                .zip(right.iter())
                .enumerate()
                .find(|(_, (l, r))| l != r)
                .map(|(i, (l, r))| format!("line {} differs: {:?} vs {:?}", i + 1, l, r))
        };

        match reason {
            None => self.assert_true(true, format!("{} matches {}", display(path1), display(path2)), abort_on_error),
            Some(reason) => self.assert_true(false, reason, abort_on_error),
        }
    }

    /// Count lines in `path` matching `expr` and evaluate `condition`
    /// against that count immediately (no polling, unlike
    /// [`ProcessUser::wait_for_signal`]).
    pub fn assert_grep(
        &mut self,
        path: &Path,
        expr: &str,
        condition: &str,
        abort_on_error: Option<bool>,
    ) -> Result<Outcome, Abort> {
        let path = self.resolve_output_path(path);
        let cond = match Condition::parse(condition) {
            Ok(c) => c,
            Err(e) => return self.assert_true(false, e.to_string(), abort_on_error),
        };
        let matches = regex_matches(&path, expr).unwrap_or_default();
        let reason = format!("grep on {} for \"{expr}\" {condition}: {} match(es)", display(&path), matches.len());
        self.assert_true(cond.eval(matches.len()), reason, abort_on_error)
    }
}

fn display(path: &Path) -> String {
    path.file_name()
        .map(|n| n.to_string_lossy().into_owned())
        .unwrap_or_else(|| path.display().to_string())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::ProcessUser;
    use std::sync::Arc;

    fn user() -> ProcessUser {
        let dir = tempfile::tempdir().unwrap();
        let output = dir.path().to_path_buf();
        std::mem::forget(dir);
        ProcessUser::new(output.clone(), output, Arc::new(crate::port::TcpPortAllocator::new()))
    }

    #[test]
    fn diff_ignores_matching_lines_on_both_sides() {
        let mut u = user();
        let a = u.output.join("a.txt");
        let b = u.output.join("b.txt");
        std::fs::write(&a, "hello\n(on my Vespa 300 GTS today)\nbye\n").unwrap();
        std::fs::write(&b, "hello\n(on my Vespa 300 GTS yesterday)\nbye\n").unwrap();
        let ignores = vec![Regex::new(r"\(on my Vespa 300 GTS .*\)").unwrap()];
        let outcome = u.assert_diff(&a, &b, &ignores, Some(false)).unwrap();
        assert_eq!(outcome, Outcome::Passed);
    }

    #[test]
    fn diff_fails_without_matching_ignore() {
        let mut u = user();
        let a = u.output.join("a.txt");
        let b = u.output.join("b.txt");
        std::fs::write(&a, "hello\n(on my Vespa 300 GTS today)\nbye\n").unwrap();
        std::fs::write(&b, "hello\n(on my Vespa 300 GTS yesterday)\nbye\n").unwrap();
        let outcome = u.assert_diff(&a, &b, &[], Some(false)).unwrap();
        assert_eq!(outcome, Outcome::Failed);
    }

    #[test]
    fn grep_condition_ge1_matches_present_line() {
        let mut u = user();
        let f = u.output.join("run.log");
        std::fs::write(&f, "Looking for Fi ... failed\n").unwrap();
        let outcome = u.assert_grep(&f, "Looking for Fi.*failed", ">=1", Some(false)).unwrap();
        assert_eq!(outcome, Outcome::Passed);
    }
}
