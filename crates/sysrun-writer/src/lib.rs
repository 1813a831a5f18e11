//! Result writers: component 4.E of the sysrun engine. A [`Writer`] turns a
//! stream of [`sysrun_container::ContainerRecord`]s into a persisted report,
//! written once per test as results are published in submission order and
//! finalized at [`Writer::cleanup`].

mod error;
mod text;
mod unc;
mod xml;

pub use error::WriterError;
pub use text::TextWriter;
pub use xml::XmlWriter;

use sysrun_container::ContainerRecord;

/// A results sink the runner forwards every published [`ContainerRecord`]
/// to, in publish order. Mirrors the original's `BaseResultsWriter`
/// interface (`setup`/`processResult`/`cleanup`), trimmed to what this
/// crate's runner actually drives: there is no `isValidForCycle` hook here
/// since every writer gets every cycle's results.
pub trait Writer: Send {
    /// Called once before the first result, with the total number of
    /// (descriptor, cycle) pairs this run will attempt. Writers that need
    /// to preallocate or print a fixed-width progress header use this;
    /// the default does nothing.
    fn setup(&mut self, num_tests: usize) -> Result<(), WriterError> {
        let _ = num_tests;
        Ok(())
    }

    fn process_result(&mut self, record: &ContainerRecord) -> Result<(), WriterError>;

    /// Called once after the last result has been processed (or early, if
    /// the run was interrupted). Writers that buffer output until the end
    /// (both of the ones in this crate do) perform their actual file I/O
    /// here.
    fn cleanup(&mut self) -> Result<(), WriterError>;
}
