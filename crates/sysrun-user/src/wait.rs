use std::fs;
use std::net::{TcpStream, ToSocketAddrs};
use std::path::Path;
use std::time::{Duration, Instant};

use regex::Regex;
use tracing::debug;

use sysrun_core::Condition;

use crate::abort::{Abort, CallRecord};
use crate::{ProcessRef, ProcessUser};

pub(crate) const POLL_INTERVAL: Duration = Duration::from_millis(10);

/// Read `path` (if it exists) and return every substring matching `expr`, in
/// file order. A missing file counts as zero matches rather than an error,
/// matching [`wait_for_file`]/[`wait_for_signal`]'s "doesn't exist yet" case.
pub(crate) fn regex_matches(path: &Path, expr: &str) -> std::io::Result<Vec<String>> {
    if !path.exists() {
        return Ok(Vec::new());
    }
    let re = Regex::new(expr).map_err(|e| std::io::Error::new(std::io::ErrorKind::InvalidInput, e))?;
    let contents = fs::read_to_string(path)?;
    Ok(contents
        .lines()
        .filter_map(|line| re.find(line).map(|m| m.as_str().to_string()))
        .collect())
}

impl ProcessUser {
    /// Poll for `path` to exist, at [`POLL_INTERVAL`] cadence, up to
    /// `timeout`. On expiry either aborts with [`sysrun_core::Outcome::TimedOut`]
    /// (if `abort_on_error`) or logs a warning and returns.
    pub fn wait_for_file(
        &mut self,
        path: &Path,
        timeout: Duration,
        abort_on_error: Option<bool>,
    ) -> Result<(), Abort> {
        let abort_on_error = self.resolve_abort_on_error(abort_on_error);
        let path = self.resolve_output_path(path);
        debug!(path = %path.display(), "waiting for file creation");

        let start = Instant::now();
        loop {
            if path.exists() {
                debug!(path = %path.display(), "wait for file creation completed successfully");
                return Ok(());
            }
            if start.elapsed() >= timeout {
                let msg = format!(
                    "Timed out waiting for creation of file {} after {:.0} secs",
                    path.display(),
                    start.elapsed().as_secs_f64()
                );
                return self.timeout_or_warn(abort_on_error, msg);
            }
            std::thread::sleep(POLL_INTERVAL);
        }
    }

    /// Poll `connect((host, port))` until it succeeds, `timeout` elapses, or
    /// the optional watched `process` dies. Matches 4.B's close-on-exec
    /// intent by never keeping a listening socket open across the call —
    /// sysrun only ever connects outward here, it never binds.
    pub fn wait_for_socket(
        &mut self,
        port: u16,
        host: &str,
        timeout: Duration,
        process: Option<ProcessRef>,
        abort_on_error: Option<bool>,
    ) -> Result<(), Abort> {
        let abort_on_error = self.resolve_abort_on_error(abort_on_error);
        debug!(port, host, "waiting for socket creation");

        let start = Instant::now();
        loop {
            if let Ok(addrs) = (host, port).to_socket_addrs() {
                for a in addrs {
                    if TcpStream::connect_timeout(&a, Duration::from_millis(200)).is_ok() {
                        debug!("wait for socket creation completed successfully");
                        return Ok(());
                    }
                }
            }

            if let Some(pref) = process {
                let handle = self.handle_mut(pref);
                if !handle.running() {
                    let msg = format!(
                        "Waiting for socket connection aborted due to unexpected process {} termination",
                        handle.display_name
                    );
                    return self.blocked_or_warn(abort_on_error, msg);
                }
            }

            if start.elapsed() >= timeout {
                let msg = format!(
                    "Timed out waiting for creation of socket after {:.0} secs",
                    start.elapsed().as_secs_f64()
                );
                return self.timeout_or_warn(abort_on_error, msg);
            }
            std::thread::sleep(POLL_INTERVAL);
        }
    }

    /// Wait for `expr` to match `condition` lines of `path`, polling every
    /// `poll` interval up to `timeout`. Returns the collected matches either
    /// way (empty on timeout with nothing found). If any `error_expr` is seen
    /// first, records `Blocked` and returns immediately with whatever matches
    /// had accumulated.
    #[allow(clippy::too_many_arguments)]
    pub fn wait_for_signal(
        &mut self,
        path: &Path,
        expr: &str,
        condition: &str,
        timeout: Duration,
        poll: Duration,
        process: Option<ProcessRef>,
        error_expr: &[String],
        abort_on_error: Option<bool>,
        call_record: CallRecord,
    ) -> Result<Vec<String>, Abort> {
        let abort_on_error = self.resolve_abort_on_error(abort_on_error);
        let cond = Condition::parse(condition)
            .map_err(|e| Abort::new(sysrun_core::Outcome::Blocked, e.to_string(), call_record.clone()))?;
        let path = self.resolve_output_path(path);
        let describe = format!("Wait for signal \"{expr}\" {condition} in {}", basename(&path));

        let start = Instant::now();
        loop {
            if path.exists() {
                let matches = regex_matches(&path, expr).unwrap_or_default();
                if cond.eval(matches.len()) {
                    debug!(path = %path.display(), "wait for signal completed successfully");
                    return Ok(matches);
                }
                for err in error_expr {
                    let err_matches = regex_matches(&path, &format!("{err}.*")).unwrap_or_default();
                    if let Some(first) = err_matches.first() {
                        let msg = format!("{:?} found during {describe}", first.trim());
                        self.add_outcome(
                            sysrun_core::Outcome::Blocked,
                            msg,
                            true,
                            Some(abort_on_error),
                            call_record.clone(),
                        )?;
                        return Ok(matches);
                    }
                }
            }

            if let Some(pref) = process {
                let handle = self.handle_mut(pref);
                if !handle.running() {
                    let msg = format!("{describe} aborted due to process {} termination", handle.display_name);
                    return self.blocked_or_warn(abort_on_error, msg);
                }
            }

            if start.elapsed() >= timeout {
                let matches = regex_matches(&path, expr).unwrap_or_default();
                let msg = format!(
                    "{describe} timed out after {:.0} secs, with {} matches",
                    start.elapsed().as_secs_f64(),
                    matches.len()
                );
                return match self.timeout_or_warn(abort_on_error, msg) {
                    Ok(()) => Ok(matches),
                    Err(abort) => Err(abort),
                };
            }
            std::thread::sleep(poll);
        }
    }

    fn timeout_or_warn(&self, abort_on_error: bool, msg: String) -> Result<(), Abort> {
        if abort_on_error {
            Err(Abort::new(sysrun_core::Outcome::TimedOut, msg, Vec::new()))
        } else {
            tracing::warn!("{msg}");
            Ok(())
        }
    }

    fn blocked_or_warn(&self, abort_on_error: bool, msg: String) -> Result<(), Abort> {
        if abort_on_error {
            Err(Abort::new(sysrun_core::Outcome::Blocked, msg, Vec::new()))
        } else {
            tracing::warn!("{msg}");
            Ok(())
        }
    }
}

fn basename(path: &Path) -> String {
    path.file_name()
        .map(|n| n.to_string_lossy().into_owned())
        .unwrap_or_else(|| path.display().to_string())
}
