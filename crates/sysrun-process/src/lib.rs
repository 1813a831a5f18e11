//! Process supervision: spawning, signal handling, timeout enforcement, and
//! stdout/err capture for a single child process.
//!
//! This is component 4.A of the sysrun engine. It knows nothing about
//! outcomes, cleanup stacks, or test sandboxes — that is `sysrun-user`'s
//! job, layered on top.

mod error;
mod handle;

pub use error::ProcessError;
pub use handle::{ExitOutcome, ProcessHandle, ProcessState, StartSpec, StdinMode};
