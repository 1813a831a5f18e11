use std::collections::HashMap;
use std::path::Path;

use sysrun_core::Descriptor;
use sysrun_user::{Abort, ProcessUser};

/// The per-test behavior a descriptor's `class_name` resolves to. Mirrors
/// the original's dynamically-loaded test class: `setup`/`execute`/
/// `validate` run in that order, `cleanup` always runs afterward regardless
/// of outcome.
///
/// Every method is handed the test's [`ProcessUser`] rather than owning one
/// itself, since the container constructs and owns the `ProcessUser` for
/// the lifetime of the call (see Design Note "Cyclic references": the test
/// never holds a back-reference to its container or runner).
pub trait Test: Send {
    fn setup(&mut self, _user: &mut ProcessUser) -> Result<(), Abort> {
        Ok(())
    }

    fn execute(&mut self, user: &mut ProcessUser) -> Result<(), Abort>;

    fn validate(&mut self, _user: &mut ProcessUser) -> Result<(), Abort> {
        Ok(())
    }

    /// Always invoked by the container, even if `setup`/`execute`/`validate`
    /// aborted or a prior step recorded a failure. Errors here are logged
    /// and swallowed, matching `ProcessUser::cleanup`'s own guard.
    fn cleanup(&mut self, _user: &mut ProcessUser) {}
}

/// Constructs a boxed [`Test`] for one (descriptor, output dir) pair. Built
/// once by the catalog loader, per Design Note "Dynamic test loading" — no
/// module loading, no global load lock, just a plain function pointer or
/// closure looked up by `class_name`.
pub type TestFactory = Box<dyn Fn(&Descriptor, &Path) -> Box<dyn Test> + Send + Sync>;

/// Read-only after construction: populated once before a run starts,
/// consulted by every container without any locking (replaces the
/// original's global module-load lock entirely).
#[derive(Default)]
pub struct TestRegistry {
    factories: HashMap<String, TestFactory>,
}

impl TestRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn register(&mut self, class_name: impl Into<String>, factory: TestFactory) {
        self.factories.insert(class_name.into(), factory);
    }

    pub fn construct(&self, descriptor: &Descriptor, output_subdir: &Path) -> Option<Box<dyn Test>> {
        self.factories
            .get(descriptor.class_name.as_str())
            .map(|f| f(descriptor, output_subdir))
    }
}

/// Stand-in test object used when construction fails (unknown class name,
/// or the registered factory itself panics during construction) so that
/// cleanup and result reporting still have something to operate on. It
/// records nothing on its own — the container adds `Blocked` before
/// `execute` is ever reached.
pub struct PlaceholderTest;

impl Test for PlaceholderTest {
    fn execute(&mut self, _user: &mut ProcessUser) -> Result<(), Abort> {
        Ok(())
    }
}
