//! Shared types for the sysrun system-test engine: the outcome model,
//! descriptor metadata, condition parsing, and infrastructure-level errors.
//!
//! This crate has no process-spawning or I/O logic of its own — it is the
//! vocabulary the other `sysrun-*` crates share.

mod condition;
mod config;
mod descriptor;
mod error;
mod host;
mod outcome;

pub use condition::Condition;
pub use config::RunnerConfig;
pub use descriptor::{Descriptor, DescriptorState, RunMode};
pub use error::AppError;
pub use host::hostname;
pub use outcome::{Outcome, OutcomeEntry, OutcomeList, PRECEDENCE};
