//! Application runtime of the [Mitsuki](https://github.com/mitsuki-rs/mitsuki) framework.
//!
//! This crate ties the pieces of a Mitsuki application together: the layered
//! [configuration store](properties), the [application bootstrap](application) driving the
//! dependency injection container from `mitsuki-di`, the [runner](runner) abstraction executing
//! actual application logic, and the [scheduler](scheduler) for declarative periodic tasks.
//!
//! A typical application registers its components (statically or through a registry), then hands
//! control to [Application](application::Application):
//!
//! ```no_run
//! use mitsuki::application::Application;
//!
//! #[tokio::main]
//! async fn main() {
//!     if let Err(error) = Application::new().run().await {
//!         eprintln!("application error: {error}");
//!         std::process::exit(1);
//!     }
//! }
//! ```

pub mod application;
pub mod properties;
pub mod runner;
pub mod scheduler;

pub use mitsuki_di::inventory;

/// Future-related re-exports, mirroring `mitsuki_di::future`.
pub mod future {
    pub use mitsuki_di::future::{BoxFuture, FutureExt};
}
