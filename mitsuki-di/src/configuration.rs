//! Configuration classes and provider methods. A configuration class is an ordinary component
//! whose methods act as factories for further components: each provider method becomes its own
//! [ComponentDescriptor](crate::descriptor::ComponentDescriptor) whose factory first resolves the
//! owning configuration instance and then invokes the method on it. Providers therefore join the
//! same topological resolution as everything else, and may carry any scope.

use crate::component::ComponentKind;
use crate::descriptor::{ComponentDescriptor, DependencyDescriptor, ResolvedDependencies};
use crate::instance_provider::{ComponentInstancePtr, ErrorPtr};
use std::future::Future;
use std::sync::Arc;

/// Parameter name under which the owning configuration instance is injected into providers.
const OWNER_PARAMETER: &str = "configuration";

/// Creates a descriptor for a configuration class. Equivalent to a generic component of kind
/// `configuration`; the helper exists to keep call sites declarative.
pub fn configuration_class<T: Send + Sync + 'static>(
    name: impl Into<String>,
) -> ComponentDescriptor {
    ComponentDescriptor::new::<T>(name, ComponentKind::Configuration)
}

/// Creates a descriptor for a provider method on configuration class `C`, producing `T`.
///
/// The resulting component depends on its owning configuration class by type; additional
/// dependencies can be declared on the returned descriptor and are handed to the method through
/// [ResolvedDependencies].
///
/// ```
/// use mitsuki_di::configuration::{configuration_class, provider};
/// use mitsuki_di::container::Container;
/// use mitsuki_di::registry::ComponentRegistry;
///
/// struct HttpConfiguration {
///     pool_size: usize,
/// }
///
/// struct HttpPool {
///     size: usize,
/// }
///
/// let mut registry = ComponentRegistry::new();
/// registry.register(
///     configuration_class::<HttpConfiguration>("HttpConfiguration")
///         .with_factory(|_| async { Ok(HttpConfiguration { pool_size: 4 }) }),
/// );
/// registry.register(provider::<HttpConfiguration, HttpPool, _, _>(
///     "httpPool",
///     |configuration, _| async move {
///         Ok(HttpPool {
///             size: configuration.pool_size,
///         })
///     },
/// ));
///
/// let container = futures::executor::block_on(Container::resolve(registry, "")).unwrap();
/// let pool =
///     futures::executor::block_on(container.instance_typed::<HttpPool>("httpPool")).unwrap();
/// assert_eq!(pool.size, 4);
/// ```
pub fn provider<C, T, F, Fut>(name: impl Into<String>, method: F) -> ComponentDescriptor
where
    C: Send + Sync + 'static,
    T: Send + Sync + 'static,
    F: Fn(ComponentInstancePtr<C>, ResolvedDependencies) -> Fut + Send + Sync + 'static,
    Fut: Future<Output = Result<T, ErrorPtr>> + Send + 'static,
{
    let method = Arc::new(method);

    ComponentDescriptor::new::<T>(name, ComponentKind::Provider)
        .with_dependency(DependencyDescriptor::by_type::<C>(OWNER_PARAMETER))
        .with_factory(move |dependencies| {
            let method = method.clone();
            async move {
                let owner = dependencies.instance::<C>(OWNER_PARAMETER)?;
                method(owner, dependencies).await
            }
        })
}
