//! The test container: component 4.C of the sysrun engine.
//!
//! A [`TestContainer`] is a single-use executor for one (descriptor, cycle)
//! pair. It builds the per-test output sandbox, installs a scoped log sink,
//! resolves and runs the test via the [`TestRegistry`], and always returns
//! a [`ContainerRecord`] — it never panics to its caller.

mod container;
mod registry;
mod sink;

pub use container::{ContainerRecord, TestContainer};
pub use registry::{PlaceholderTest, Test, TestFactory, TestRegistry};
pub use sink::{bind_scoped_sink, ContainerLogLayer, ContainerLogSink, SinkGuard};
