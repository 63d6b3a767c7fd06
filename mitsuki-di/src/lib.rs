//! The dependency injection engine of the [Mitsuki](https://github.com/mitsuki-rs/mitsuki)
//! framework, inspired by the [Spring Framework](https://spring.io/) in Java.
//!
//! Applications declare *component descriptors* - metadata describing how to construct a
//! component and what it depends on - and the [Container](container::Container) turns the whole
//! set into live instances in a single resolution pass: profile filtering, dependency matching,
//! cycle detection, topological instantiation, singleton caching. After that pass the container
//! is frozen and safe to share between tasks without locking.
//!
//! Descriptors can be registered programmatically through a [ComponentRegistry](registry::ComponentRegistry)
//! or submitted statically with [`submit_component!`], which lets libraries contribute components
//! at link time, the closest explicit equivalent of classpath scanning.
//!
//! ### Simple usage example
//!
//! ```
//! use mitsuki_di::component::ComponentKind;
//! use mitsuki_di::container::Container;
//! use mitsuki_di::descriptor::{ComponentDescriptor, DependencyDescriptor};
//! use mitsuki_di::registry::ComponentRegistry;
//!
//! struct AuditLog;
//!
//! struct OrderService {
//!     audit: mitsuki_di::instance_provider::ComponentInstancePtr<AuditLog>,
//! }
//!
//! let mut registry = ComponentRegistry::new();
//! registry.register(
//!     ComponentDescriptor::new::<AuditLog>("AuditLog", ComponentKind::Generic)
//!         .with_factory(|_| async { Ok(AuditLog) }),
//! );
//! registry.register(
//!     ComponentDescriptor::new::<OrderService>("OrderService", ComponentKind::Service)
//!         .with_dependency(DependencyDescriptor::by_type::<AuditLog>("audit"))
//!         .with_factory(|deps| async move {
//!             Ok(OrderService {
//!                 audit: deps.instance::<AuditLog>("audit")?,
//!             })
//!         }),
//! );
//!
//! let container = futures::executor::block_on(Container::resolve(registry, "")).unwrap();
//! let service = futures::executor::block_on(
//!     container.instance_typed::<OrderService>("OrderService"),
//! )
//! .unwrap();
//! let _ = &service.audit;
//! ```

pub mod component;
pub mod configuration;
pub mod container;
pub mod descriptor;
pub mod error;
pub mod future;
pub mod instance_provider;
pub mod registry;

pub use inventory;
