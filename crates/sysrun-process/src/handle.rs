use std::collections::HashMap;
use std::fs::{File, OpenOptions};
use std::io::Write as _;
use std::path::PathBuf;
use std::process::{Child, ChildStdin, Command, Stdio};
use std::time::{Duration, Instant};

use tracing::{debug, warn};

use crate::error::ProcessError;

/// Whether a spawned child is waited on synchronously (with a timeout) or
/// left running beyond the call that started it.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum ProcessState {
    Foreground,
    Background,
}

/// Exit status of a terminated process. `signal` is set instead of `code`
/// when the process was killed by a signal (Unix only); a process
/// hard-terminated for exceeding its timeout has neither set, since it was
/// reaped without a meaningful status being attributed to the timeout kill.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub struct ExitOutcome {
    pub code: Option<i32>,
    pub signal: Option<i32>,
}

/// Inputs to [`ProcessHandle::start`].
pub struct StartSpec {
    pub command: PathBuf,
    pub args: Vec<String>,
    pub env: HashMap<String, String>,
    pub working_dir: PathBuf,
    pub state: ProcessState,
    pub timeout: Duration,
    pub stdout_path: Option<PathBuf>,
    pub stderr_path: Option<PathBuf>,
    pub display_name: String,
    pub stdin: StdinMode,
}

/// Whether the child's stdin is connected for later [`ProcessHandle::write`]
/// calls, or left closed.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Default)]
pub enum StdinMode {
    #[default]
    Null,
    Piped,
}

const POLL_INTERVAL: Duration = Duration::from_millis(10);

/// A single supervised child process. Implements 4.A's `start`/`stop`/
/// `signal`/`wait`/`write`/`running` operations directly as methods, since
/// Rust has no mutable-handle-vs-owning-supervisor split the way the
/// original's `ProcessWrapper` needed one.
pub struct ProcessHandle {
    pub display_name: String,
    pid: Option<u32>,
    exit: Option<ExitOutcome>,
    pub stdout_path: Option<PathBuf>,
    pub stderr_path: Option<PathBuf>,
    pub state: ProcessState,
    child: Option<Child>,
    stdin: Option<ChildStdin>,
}

impl ProcessHandle {
    /// Spawn the child described by `spec`. For [`ProcessState::Foreground`]
    /// this blocks until the child exits or `spec.timeout` elapses (in which
    /// case the whole process group is killed and
    /// [`ProcessError::Timeout`] is returned); for
    /// [`ProcessState::Background`] it returns as soon as the pid is known.
    pub fn start(spec: StartSpec) -> Result<Self, ProcessError> {
        let mut cmd = Command::new(&spec.command);
        cmd.args(&spec.args).current_dir(&spec.working_dir);

        cmd.env_clear();
        cmd.envs(&spec.env);

        cmd.stdin(match spec.stdin {
            StdinMode::Piped => Stdio::piped(),
            StdinMode::Null => Stdio::null(),
        });
        cmd.stdout(open_capture(&spec.stdout_path)?);
        cmd.stderr(open_capture(&spec.stderr_path)?);

        // Isolate the child in its own process group so a timeout kill (or
        // an explicit stop) terminates its whole subtree, not just the
        // immediate child.
        #[cfg(unix)]
        {
            use std::os::unix::process::CommandExt;
            cmd.process_group(0);
        }

        let mut child = cmd.spawn().map_err(|source| ProcessError::Spawn {
            display_name: spec.display_name.clone(),
            source,
        })?;
        let pid = child.id();
        let stdin = child.stdin.take();

        let mut handle = ProcessHandle {
            display_name: spec.display_name,
            pid: Some(pid),
            exit: None,
            stdout_path: spec.stdout_path,
            stderr_path: spec.stderr_path,
            state: spec.state,
            child: Some(child),
            stdin,
        };

        if spec.state == ProcessState::Foreground {
            handle.wait(spec.timeout)?;
        } else {
            debug!(pid, name = %handle.display_name, "started background process");
        }

        Ok(handle)
    }

    pub fn pid(&self) -> Option<u32> {
        self.pid
    }

    pub fn exit_status(&self) -> Option<ExitOutcome> {
        self.exit
    }

    /// Poll-then-return: does not block. Reaps the child opportunistically
    /// so `exit_status()` becomes available without an explicit `wait`.
    pub fn running(&mut self) -> bool {
        if self.exit.is_some() {
            return false;
        }
        let Some(child) = self.child.as_mut() else {
            return false;
        };
        match child.try_wait() {
            Ok(Some(status)) => {
                self.exit = Some(exit_outcome(status));
                false
            }
            Ok(None) => true,
            Err(_) => false,
        }
    }

    /// Block until the process terminates or `timeout` elapses. On timeout,
    /// hard-kills the process group and returns [`ProcessError::Timeout`];
    /// the handle's `running()` is `false` either way once this returns.
    pub fn wait(&mut self, timeout: Duration) -> Result<(), ProcessError> {
        let start = Instant::now();
        loop {
            if !self.running() {
                return Ok(());
            }
            if start.elapsed() >= timeout {
                let pid = self.pid.unwrap_or(0);
                warn!(pid, name = %self.display_name, timeout_secs = timeout.as_secs(), "process timed out, killing process group");
                self.kill_process_group();
                let _ = self.child.as_mut().map(|c| c.wait());
                self.exit = Some(ExitOutcome::default());
                return Err(ProcessError::Timeout {
                    display_name: self.display_name.clone(),
                    pid,
                    timeout_secs: timeout.as_secs(),
                });
            }
            std::thread::sleep(POLL_INTERVAL);
        }
    }

    /// Idempotent: stopping an already-stopped process is a no-op.
    pub fn stop(&mut self) -> Result<(), ProcessError> {
        if !self.running() {
            return Ok(());
        }
        self.kill_process_group();
        if let Some(child) = self.child.as_mut() {
            let _ = child.wait();
        }
        self.exit = Some(ExitOutcome::default());
        Ok(())
    }

    #[cfg(unix)]
    fn kill_process_group(&self) {
        if let Some(pid) = self.pid {
            // SAFETY: kill() is async-signal-safe; a negative pid targets
            // the whole process group created via `process_group(0)` at
            // spawn time.
            unsafe {
                libc::kill(-(pid as i32), libc::SIGKILL);
            }
        }
    }

    #[cfg(not(unix))]
    fn kill_process_group(&mut self) {
        if let Some(child) = self.child.as_mut() {
            let _ = child.kill();
        }
    }

    /// Send a POSIX signal to the process. Returns
    /// [`ProcessError::SignalsUnsupported`] on platforms without signals
    /// rather than panicking.
    #[cfg(unix)]
    pub fn signal(&mut self, sig: i32) -> Result<(), ProcessError> {
        if !self.running() {
            return Err(ProcessError::NotRunning(self.display_name.clone()));
        }
        let pid = self.pid.unwrap_or(0) as i32;
        // SAFETY: pid was obtained from a live child we still hold.
        let ret = unsafe { libc::kill(pid, sig) };
        if ret != 0 {
            return Err(ProcessError::Signal {
                display_name: self.display_name.clone(),
                signal: sig,
                source: std::io::Error::last_os_error(),
            });
        }
        Ok(())
    }

    #[cfg(not(unix))]
    pub fn signal(&mut self, _sig: i32) -> Result<(), ProcessError> {
        Err(ProcessError::SignalsUnsupported)
    }

    /// Write bytes to the child's stdin, optionally appending a trailing
    /// newline. The child must have been started with
    /// [`StdinMode::Piped`].
    pub fn write(&mut self, data: &[u8], append_newline: bool) -> Result<(), ProcessError> {
        if !self.running() {
            return Err(ProcessError::NotRunning(self.display_name.clone()));
        }
        let stdin = self
            .stdin
            .as_mut()
            .ok_or_else(|| ProcessError::StdinNotPiped(self.display_name.clone()))?;
        stdin
            .write_all(data)
            .map_err(|source| ProcessError::Write {
                display_name: self.display_name.clone(),
                source,
            })?;
        if append_newline {
            stdin
                .write_all(b"\n")
                .map_err(|source| ProcessError::Write {
                    display_name: self.display_name.clone(),
                    source,
                })?;
        }
        Ok(())
    }
}

fn open_capture(path: &Option<PathBuf>) -> Result<Stdio, ProcessError> {
    match path {
        None => Ok(Stdio::null()),
        Some(path) => {
            let file: File = OpenOptions::new()
                .create(true)
                .truncate(true)
                .write(true)
                .open(path)
                .map_err(|source| ProcessError::OpenCapture {
                    path: path.clone(),
                    source,
                })?;
            Ok(Stdio::from(file))
        }
    }
}

#[cfg(unix)]
fn exit_outcome(status: std::process::ExitStatus) -> ExitOutcome {
    use std::os::unix::process::ExitStatusExt;
    ExitOutcome {
        code: status.code(),
        signal: status.signal(),
    }
}

#[cfg(not(unix))]
fn exit_outcome(status: std::process::ExitStatus) -> ExitOutcome {
    ExitOutcome {
        code: status.code(),
        signal: None,
    }
}
