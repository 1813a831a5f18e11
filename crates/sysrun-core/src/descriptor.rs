use std::path::PathBuf;

/// Whether a descriptor is eligible to be executed.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum DescriptorState {
    Runnable,
    Deprecated,
}

/// A user-defined run mode name (e.g. `"release"`, `"ipv6"`). Descriptors
/// declare which modes they support; the runner is given a single requested
/// mode for the whole run.
pub type RunMode = String;

/// Immutable metadata identifying one test, as consumed by the container and
/// runner. Descriptor discovery (locating these on disk, parsing them out of
/// an XML/TOML catalog) is out of scope for this crate; callers construct
/// `Descriptor` values directly or via a small loader in `sysrun-cli`.
#[derive(Clone, Debug)]
pub struct Descriptor {
    /// Stable identifier, unique within a run (e.g. `"perf_001"`).
    pub id: String,
    /// Logical source location (a module path, file path, or other
    /// human-meaningful reference) shown in diagnostics.
    pub module: String,
    /// Name of the registered test factory to instantiate (see
    /// `sysrun_container::TestFactory`).
    pub class_name: String,
    /// Base directory containing test input fixtures.
    pub input: PathBuf,
    /// Base directory under which per-test output subdirectories are
    /// created.
    pub output: PathBuf,
    /// Run modes this descriptor supports. Empty means "all modes".
    pub modes: Vec<RunMode>,
    pub state: DescriptorState,
    pub purpose: String,
    pub title: String,
}

impl Descriptor {
    /// True if this descriptor declares no mode restriction, or explicitly
    /// lists `mode`.
    pub fn supports_mode(&self, mode: &str) -> bool {
        self.modes.is_empty() || self.modes.iter().any(|m| m == mode)
    }
}
