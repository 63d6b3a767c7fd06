//! Runners executing actual application logic.

use crate::application::Runtime;
use mitsuki_di::future::BoxFuture;
pub use mitsuki_di::instance_provider::ErrorPtr;
use std::sync::Arc;

pub type ApplicationRunnerPtr = dyn ApplicationRunner + Send + Sync;

/// Runs application logic. Runners are ordinary components discovered from the container by the
/// [Application](crate::application::Application); runners sharing a priority run concurrently.
/// The [Runtime] value carries the frozen container, configuration and scheduler.
pub trait ApplicationRunner {
    /// Runs any application code. Long-running runners (e.g. servers) should complete when the
    /// runtime's shutdown signal fires.
    fn run(&self, runtime: Arc<Runtime>) -> BoxFuture<'_, Result<(), ErrorPtr>>;

    /// Returns the priority for this runner. Higher priorities get run first. Default 0.
    fn priority(&self) -> i8 {
        0
    }
}
