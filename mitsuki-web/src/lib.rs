//! Declarative HTTP controllers for the [Mitsuki](https://github.com/mitsuki-rs/mitsuki)
//! framework, served over [axum].
//!
//! Controllers are ordinary container components enumerating [RouteDescriptor](route::RouteDescriptor)s:
//! path/query/body/multipart bindings with typed coercion, ingress and egress shape contracts,
//! and explicit [ResponseEntity](response::ResponseEntity) shaping. After the container freezes,
//! the [RouteTable](route::RouteTable) validates and orders all routes, the
//! [RequestPipeline](pipeline::RequestPipeline) drives each request through binding, invocation
//! and egress validation, and the built-in [ServerRunner](server::ServerRunner) serves the table
//! until the application's shutdown signal fires.
//!
//! ```
//! use mitsuki_web::controller::Controller;
//! use mitsuki_web::response::ResponseEntity;
//! use mitsuki_web::route::{handler, ParamBinding, RouteDescriptor, ValueType};
//!
//! struct HealthController;
//!
//! impl Controller for HealthController {
//!     fn routes(&self) -> Vec<RouteDescriptor> {
//!         vec![RouteDescriptor::get("/health/{code}")
//!             .with_param(ParamBinding::path("code", ValueType::Integer))
//!             .with_handler(handler::<HealthController, _, _>(|_, args| async move {
//!                 let code: i64 = args.get("code")?;
//!                 ResponseEntity::of(&serde_json::json!({ "status": "ok", "code": code }))
//!             }))]
//!     }
//! }
//! ```

pub mod controller;
pub mod error;
pub mod multipart;
pub mod pipeline;
pub mod request;
pub mod response;
pub mod route;
pub mod serialization;
pub mod server;

pub use axum;
