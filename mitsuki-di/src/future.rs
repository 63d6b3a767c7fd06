//! Future-related re-exports used across the framework, so downstream crates do not need a
//! direct `futures` dependency for the common cases.

pub use futures::future::BoxFuture;
pub use futures::FutureExt;
