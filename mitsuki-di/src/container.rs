//! The active half of the dependency injection engine. [Container::resolve] executes the one-shot
//! resolution protocol: filter descriptors by profile, match every dependency to a unique active
//! descriptor, reject cycles, then instantiate singletons in topological order. The returned
//! container is frozen: its instance map is write-once and safe for concurrent readers.

use crate::component::Scope;
use crate::descriptor::{
    ComponentDescriptor, DependencyTarget, ResolvedArg, ResolvedDependencies,
};
use crate::error::ContainerError;
use crate::instance_provider::{
    CastFunction, ComponentInstanceAnyPtr, ComponentInstancePtr, ErrorPtr,
};
use crate::registry::ComponentRegistry;
use futures::future::BoxFuture;
use futures::FutureExt;
use fxhash::FxHashMap;
use itertools::Itertools;
use serde_json::Value as JsonValue;
use std::any::{type_name, TypeId};
use std::sync::Arc;
use thiserror::Error;
use tracing::{debug, error, info};

/// Resolves `${...}` value expressions for value-injected dependencies. Implemented by the
/// configuration store; the container itself knows nothing about configuration formats.
pub trait ValueResolver: Send + Sync {
    fn resolve_value(&self, expression: &str) -> Result<JsonValue, ErrorPtr>;
}

#[derive(Error, Debug)]
#[error("no configuration store attached; cannot resolve '{0}'")]
struct UnresolvableValue(String);

/// Resolver used when no configuration store is attached: any value expression is an error.
pub struct NoValueResolver;

impl ValueResolver for NoValueResolver {
    fn resolve_value(&self, expression: &str) -> Result<JsonValue, ErrorPtr> {
        Err(Arc::new(UnresolvableValue(expression.to_string())))
    }
}

enum ResolvedEdge {
    Component { index: usize, cast: CastFunction },
    Absent,
    Value { expression: String },
}

struct ResolvedComponent {
    descriptor: ComponentDescriptor,
    edges: Vec<ResolvedEdge>,
}

/// A frozen set of resolved components. All lookups are read-only; prototype lookups re-run the
/// descriptor factory against the frozen singleton set.
pub struct Container {
    components: Vec<ResolvedComponent>,
    order: Vec<usize>,
    by_name: FxHashMap<String, usize>,
    by_type: FxHashMap<TypeId, Vec<usize>>,
    singletons: Vec<Option<ComponentInstanceAnyPtr>>,
    values: Arc<dyn ValueResolver>,
    profile: String,
}

impl std::fmt::Debug for Container {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Container")
            .field("order", &self.order)
            .field("by_name", &self.by_name)
            .field("by_type", &self.by_type)
            .field("singleton_count", &self.singletons.len())
            .field("profile", &self.profile)
            .finish()
    }
}

impl Container {
    /// Resolves a registry without a configuration store; descriptors using value injection will
    /// fail to instantiate.
    pub async fn resolve(
        registry: ComponentRegistry,
        profile: impl Into<String>,
    ) -> Result<Self, ContainerError> {
        Self::resolve_with_values(registry, profile, Arc::new(NoValueResolver)).await
    }

    /// Executes the full resolution protocol and returns the frozen container.
    pub async fn resolve_with_values(
        registry: ComponentRegistry,
        profile: impl Into<String>,
        values: Arc<dyn ValueResolver>,
    ) -> Result<Self, ContainerError> {
        let profile = profile.into();
        let active = registry
            .into_descriptors()
            .into_iter()
            .filter(|descriptor| descriptor.is_active(&profile))
            .collect_vec();

        debug!(
            %profile,
            active = active.len(),
            "Resolving component graph."
        );

        let by_name = index_names(&active, &profile)?;
        let by_type = index_types(&active);
        let components = link_dependencies(active, &by_name, &by_type)?;
        let order = topological_order(&components)?;

        let mut container = Self {
            singletons: vec![None; components.len()],
            components,
            order: order.clone(),
            by_name,
            by_type,
            values,
            profile,
        };

        for &index in &order {
            if container.components[index].descriptor.scope == Scope::Singleton {
                let instance = container.construct(index).await?;
                container.singletons[index] = Some(instance);
            }
        }

        info!(
            components = container.components.len(),
            profile = %container.profile,
            "Component container resolved."
        );

        Ok(container)
    }

    /// The profile this container was resolved for.
    pub fn profile(&self) -> &str {
        &self.profile
    }

    /// Read-only view of the active descriptors.
    pub fn descriptors(&self) -> impl Iterator<Item = &ComponentDescriptor> {
        self.components.iter().map(|component| &component.descriptor)
    }

    pub fn contains(&self, name: &str) -> bool {
        self.by_name.contains_key(name)
    }

    /// Returns the type-erased instance registered under `name`. Prototype components yield a
    /// fresh instance per call.
    pub async fn instance_by_name(
        &self,
        name: &str,
    ) -> Result<ComponentInstanceAnyPtr, ContainerError> {
        let index = *self
            .by_name
            .get(name)
            .ok_or_else(|| ContainerError::NoSuchComponent(name.to_string()))?;
        self.instantiate(index).await
    }

    /// Returns the instance registered under `name`, viewed as `T` (a concrete type or a
    /// registered trait-object alias).
    pub async fn instance_typed<T: ?Sized + Send + Sync + 'static>(
        &self,
        name: &str,
    ) -> Result<ComponentInstancePtr<T>, ContainerError> {
        let index = *self
            .by_name
            .get(name)
            .ok_or_else(|| ContainerError::NoSuchComponent(name.to_string()))?;
        self.typed_instance_at(index).await
    }

    /// Returns the unique instance providing type `T`.
    pub async fn primary_instance<T: ?Sized + Send + Sync + 'static>(
        &self,
    ) -> Result<ComponentInstancePtr<T>, ContainerError> {
        let indices = self.by_type.get(&TypeId::of::<T>());
        match indices.map(Vec::as_slice) {
            None | Some([]) => Err(ContainerError::NoComponentForType(
                type_name::<T>().to_string(),
            )),
            Some([index]) => self.typed_instance_at(*index).await,
            Some(many) => Err(ContainerError::NoPrimaryInstance {
                requested: type_name::<T>().to_string(),
                candidates: many
                    .iter()
                    .map(|index| self.components[*index].descriptor.name.clone())
                    .collect(),
            }),
        }
    }

    /// Returns all instances providing type `T`, in registration order.
    pub async fn instances_of<T: ?Sized + Send + Sync + 'static>(
        &self,
    ) -> Result<Vec<ComponentInstancePtr<T>>, ContainerError> {
        let mut instances = Vec::new();
        if let Some(indices) = self.by_type.get(&TypeId::of::<T>()) {
            for &index in indices {
                instances.push(self.typed_instance_at(index).await?);
            }
        }
        Ok(instances)
    }

    /// Invokes shutdown hooks in reverse instantiation order. Hook errors are logged and
    /// swallowed; shutdown always completes.
    pub async fn shutdown(&self) {
        for &index in self.order.iter().rev() {
            let component = &self.components[index];
            let (Some(hook), Some(instance)) =
                (&component.descriptor.shutdown, &self.singletons[index])
            else {
                continue;
            };

            debug!(component = %component.descriptor.name, "Shutting down component.");
            if let Err(cause) = (hook)(instance.clone()).await {
                error!(
                    component = %component.descriptor.name,
                    %cause,
                    "Shutdown hook failed; continuing."
                );
            }
        }
    }

    async fn typed_instance_at<T: ?Sized + Send + Sync + 'static>(
        &self,
        index: usize,
    ) -> Result<ComponentInstancePtr<T>, ContainerError> {
        let descriptor = &self.components[index].descriptor;
        let cast = descriptor.cast_for(TypeId::of::<T>()).ok_or_else(|| {
            ContainerError::IncompatibleComponent {
                component: descriptor.name.clone(),
                requested: type_name::<T>().to_string(),
            }
        })?;
        let instance = self.instantiate(index).await?;
        cast_to::<T>(&self.components[index].descriptor.name, instance, &cast)
    }

    fn instantiate(
        &self,
        index: usize,
    ) -> BoxFuture<'_, Result<ComponentInstanceAnyPtr, ContainerError>> {
        async move {
            let component = &self.components[index];
            match component.descriptor.scope {
                Scope::Singleton => self.singletons[index].clone().ok_or_else(|| {
                    ContainerError::Instantiation {
                        component: component.descriptor.name.clone(),
                        message: "singleton requested before initialization".to_string(),
                    }
                }),
                Scope::Prototype => self.construct(index).await,
            }
        }
        .boxed()
    }

    fn construct(
        &self,
        index: usize,
    ) -> BoxFuture<'_, Result<ComponentInstanceAnyPtr, ContainerError>> {
        async move {
            let component = &self.components[index];
            let name = component.descriptor.name.clone();

            let mut entries = Vec::with_capacity(component.edges.len());
            for (dependency, edge) in component
                .descriptor
                .dependencies
                .iter()
                .zip(component.edges.iter())
            {
                let argument = match edge {
                    ResolvedEdge::Component { index, cast } => ResolvedArg::Instance {
                        instance: self.instantiate(*index).await?,
                        cast: cast.clone(),
                    },
                    ResolvedEdge::Absent => ResolvedArg::Absent,
                    ResolvedEdge::Value { expression } => ResolvedArg::Value(
                        self.values.resolve_value(expression).map_err(|cause| {
                            ContainerError::ValueResolution {
                                component: name.clone(),
                                parameter: dependency.parameter.clone(),
                                expression: expression.clone(),
                                message: cause.to_string(),
                            }
                        })?,
                    ),
                };
                entries.push((dependency.parameter.clone(), argument));
            }

            let factory = self.components[index]
                .descriptor
                .factory
                .clone()
                .ok_or_else(|| ContainerError::Instantiation {
                    component: name.clone(),
                    message: "no factory registered".to_string(),
                })?;

            let instance = (factory)(ResolvedDependencies::new(entries))
                .await
                .map_err(|cause| ContainerError::Instantiation {
                    component: name.clone(),
                    message: cause.to_string(),
                })?;

            if instance.as_ref().type_id() != self.components[index].descriptor.provided_type_id()
            {
                return Err(ContainerError::Instantiation {
                    component: name,
                    message: "factory produced an instance of an unexpected type".to_string(),
                });
            }

            Ok(instance)
        }
        .boxed()
    }
}

fn cast_to<T: ?Sized + 'static>(
    component: &str,
    instance: ComponentInstanceAnyPtr,
    cast: &CastFunction,
) -> Result<ComponentInstancePtr<T>, ContainerError> {
    (cast)(instance)
        .ok()
        .and_then(|boxed| boxed.downcast::<ComponentInstancePtr<T>>().ok())
        .map(|pointer| *pointer)
        .ok_or_else(|| ContainerError::IncompatibleComponent {
            component: component.to_string(),
            requested: type_name::<T>().to_string(),
        })
}

fn index_names(
    active: &[ComponentDescriptor],
    profile: &str,
) -> Result<FxHashMap<String, usize>, ContainerError> {
    let mut by_name = FxHashMap::default();
    for (index, descriptor) in active.iter().enumerate() {
        if by_name.insert(descriptor.name.clone(), index).is_some() {
            return Err(ContainerError::DuplicateComponentName {
                name: descriptor.name.clone(),
                profile: profile.to_string(),
            });
        }
    }
    Ok(by_name)
}

fn index_types(active: &[ComponentDescriptor]) -> FxHashMap<TypeId, Vec<usize>> {
    let mut by_type: FxHashMap<TypeId, Vec<usize>> = FxHashMap::default();
    for (index, descriptor) in active.iter().enumerate() {
        for type_id in descriptor.casts.keys() {
            by_type.entry(*type_id).or_default().push(index);
        }
    }
    by_type
}

/// Matches every dependency of every active descriptor to a unique provider, per the resolution
/// protocol: explicit name override first, then a descriptor named like the parameter, then the
/// unique descriptor providing the declared type.
fn link_dependencies(
    active: Vec<ComponentDescriptor>,
    by_name: &FxHashMap<String, usize>,
    by_type: &FxHashMap<TypeId, Vec<usize>>,
) -> Result<Vec<ResolvedComponent>, ContainerError> {
    let mut components = Vec::with_capacity(active.len());

    for descriptor in &active {
        let mut edges = Vec::with_capacity(descriptor.dependencies.len());

        for dependency in &descriptor.dependencies {
            let edge = match &dependency.target {
                DependencyTarget::Value { expression } => ResolvedEdge::Value {
                    expression: expression.clone(),
                },
                DependencyTarget::Component {
                    type_id,
                    type_name,
                    name_hint,
                    required,
                } => {
                    if let Some(hint) = name_hint {
                        let index = *by_name.get(hint).ok_or_else(|| {
                            ContainerError::MissingDependency {
                                component: descriptor.name.clone(),
                                parameter: dependency.parameter.clone(),
                                wanted: format!("component named '{hint}'"),
                            }
                        })?;
                        let cast = active[index].cast_for(*type_id).ok_or_else(|| {
                            ContainerError::IncompatibleDependency {
                                component: descriptor.name.clone(),
                                parameter: dependency.parameter.clone(),
                                requested: type_name.to_string(),
                            }
                        })?;
                        ResolvedEdge::Component { index, cast }
                    } else if let Some(edge) = by_name.get(&dependency.parameter).and_then(|index| {
                        active[*index].cast_for(*type_id).map(|cast| {
                            ResolvedEdge::Component {
                                index: *index,
                                cast,
                            }
                        })
                    }) {
                        edge
                    } else {
                        let candidates = by_type
                            .get(type_id)
                            .map(Vec::as_slice)
                            .unwrap_or_default();
                        match candidates {
                            [] if *required => {
                                return Err(ContainerError::MissingDependency {
                                    component: descriptor.name.clone(),
                                    parameter: dependency.parameter.clone(),
                                    wanted: format!("component of type {type_name}"),
                                })
                            }
                            [] => ResolvedEdge::Absent,
                            [index] => {
                                let cast = active[*index].cast_for(*type_id).ok_or_else(|| {
                                    ContainerError::IncompatibleDependency {
                                        component: descriptor.name.clone(),
                                        parameter: dependency.parameter.clone(),
                                        requested: type_name.to_string(),
                                    }
                                })?;
                                ResolvedEdge::Component {
                                    index: *index,
                                    cast,
                                }
                            }
                            many => {
                                return Err(ContainerError::AmbiguousDependency {
                                    component: descriptor.name.clone(),
                                    parameter: dependency.parameter.clone(),
                                    candidates: many
                                        .iter()
                                        .map(|index| active[*index].name.clone())
                                        .collect(),
                                })
                            }
                        }
                    }
                }
            };
            edges.push(edge);
        }

        components.push(ResolvedComponent {
            descriptor: descriptor.clone(),
            edges,
        });
    }

    Ok(components)
}

/// Depth-first topological sort over component edges, reporting any cycle by the names along it.
fn topological_order(components: &[ResolvedComponent]) -> Result<Vec<usize>, ContainerError> {
    #[derive(Clone, Copy, PartialEq)]
    enum Mark {
        Unvisited,
        InProgress,
        Done,
    }

    fn visit(
        index: usize,
        components: &[ResolvedComponent],
        marks: &mut [Mark],
        path: &mut Vec<usize>,
        order: &mut Vec<usize>,
    ) -> Result<(), ContainerError> {
        marks[index] = Mark::InProgress;
        path.push(index);

        for edge in &components[index].edges {
            let ResolvedEdge::Component { index: next, .. } = edge else {
                continue;
            };
            match marks[*next] {
                Mark::InProgress => {
                    let start = path.iter().position(|i| i == next).unwrap_or(0);
                    let mut cycle: Vec<_> = path[start..]
                        .iter()
                        .map(|i| components[*i].descriptor.name.clone())
                        .collect();
                    cycle.push(components[*next].descriptor.name.clone());
                    return Err(ContainerError::CircularDependency { cycle });
                }
                Mark::Unvisited => visit(*next, components, marks, path, order)?,
                Mark::Done => {}
            }
        }

        path.pop();
        marks[index] = Mark::Done;
        order.push(index);
        Ok(())
    }

    let mut marks = vec![Mark::Unvisited; components.len()];
    let mut order = Vec::with_capacity(components.len());
    let mut path = Vec::new();

    for index in 0..components.len() {
        if marks[index] == Mark::Unvisited {
            visit(index, components, &mut marks, &mut path, &mut order)?;
        }
    }

    Ok(order)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::alias_cast;
    use crate::component::ComponentKind;
    use crate::descriptor::DependencyDescriptor;
    use std::sync::Mutex;

    struct Repository;

    struct Service {
        repository: ComponentInstancePtr<Repository>,
    }

    struct Handler {
        service: ComponentInstancePtr<Service>,
    }

    type Log = Arc<Mutex<Vec<&'static str>>>;

    fn layered_registry(log: Log) -> ComponentRegistry {
        let mut registry = ComponentRegistry::new();

        let repository_log = log.clone();
        registry.register(
            ComponentDescriptor::new::<Repository>("Repository", ComponentKind::Repository)
                .with_factory(move |_| {
                    let log = repository_log.clone();
                    async move {
                        log.lock().unwrap().push("Repository");
                        Ok(Repository)
                    }
                }),
        );

        let service_log = log.clone();
        registry.register(
            ComponentDescriptor::new::<Service>("Service", ComponentKind::Service)
                .with_dependency(DependencyDescriptor::by_type::<Repository>("repository"))
                .with_factory(move |deps| {
                    let log = service_log.clone();
                    async move {
                        log.lock().unwrap().push("Service");
                        Ok(Service {
                            repository: deps.instance::<Repository>("repository")?,
                        })
                    }
                }),
        );

        let handler_log = log;
        registry.register(
            ComponentDescriptor::new::<Handler>("Handler", ComponentKind::Controller)
                .with_dependency(DependencyDescriptor::by_type::<Service>("service"))
                .with_factory(move |deps| {
                    let log = handler_log.clone();
                    async move {
                        log.lock().unwrap().push("Handler");
                        Ok(Handler {
                            service: deps.instance::<Service>("service")?,
                        })
                    }
                }),
        );

        registry
    }

    #[tokio::test]
    async fn should_instantiate_in_dependency_order() {
        let log: Log = Default::default();
        let container = Container::resolve(layered_registry(log.clone()), "")
            .await
            .unwrap();

        assert_eq!(*log.lock().unwrap(), vec!["Repository", "Service", "Handler"]);

        let handler = container.instance_typed::<Handler>("Handler").await.unwrap();
        let service = container.instance_typed::<Service>("Service").await.unwrap();
        assert!(Arc::ptr_eq(&handler.service, &service));
        let _ = &service.repository;
    }

    #[tokio::test]
    async fn should_cache_singletons() {
        let log: Log = Default::default();
        let container = Container::resolve(layered_registry(log), "").await.unwrap();

        let first = container.instance_typed::<Service>("Service").await.unwrap();
        let second = container.instance_typed::<Service>("Service").await.unwrap();
        assert!(Arc::ptr_eq(&first, &second));
    }

    #[tokio::test]
    async fn should_create_prototypes_per_lookup() {
        struct Counter;

        let mut registry = ComponentRegistry::new();
        registry.register(
            ComponentDescriptor::new::<Counter>("Counter", ComponentKind::Generic)
                .with_scope(Scope::Prototype)
                .with_factory(|_| async { Ok(Counter) }),
        );

        let container = Container::resolve(registry, "").await.unwrap();
        let first = container.instance_typed::<Counter>("Counter").await.unwrap();
        let second = container.instance_typed::<Counter>("Counter").await.unwrap();
        assert!(!Arc::ptr_eq(&first, &second));
    }

    #[tokio::test]
    async fn should_reject_duplicate_names_within_profile() {
        struct A;

        let mut registry = ComponentRegistry::new();
        registry
            .register(
                ComponentDescriptor::new::<A>("Same", ComponentKind::Generic)
                    .with_factory(|_| async { Ok(A) }),
            )
            .register(
                ComponentDescriptor::new::<A>("Same", ComponentKind::Generic)
                    .with_factory(|_| async { Ok(A) }),
            );

        assert!(matches!(
            Container::resolve(registry, "").await.unwrap_err(),
            ContainerError::DuplicateComponentName { name, .. } if name == "Same"
        ));
    }

    #[tokio::test]
    async fn should_allow_same_name_in_disjoint_profiles() {
        struct A;

        let mut registry = ComponentRegistry::new();
        registry
            .register(
                ComponentDescriptor::new::<A>("Same", ComponentKind::Generic)
                    .with_profiles(["dev"])
                    .with_factory(|_| async { Ok(A) }),
            )
            .register(
                ComponentDescriptor::new::<A>("Same", ComponentKind::Generic)
                    .with_profiles(["prod"])
                    .with_factory(|_| async { Ok(A) }),
            );

        let container = Container::resolve(registry, "dev").await.unwrap();
        assert!(container.contains("Same"));
        assert_eq!(container.descriptors().count(), 1);
    }

    #[tokio::test]
    async fn should_detect_cycles_naming_participants() {
        struct A;
        struct B;

        let mut registry = ComponentRegistry::new();
        registry
            .register(
                ComponentDescriptor::new::<A>("A", ComponentKind::Generic)
                    .with_dependency(DependencyDescriptor::by_type::<B>("b"))
                    .with_factory(|_| async { Ok(A) }),
            )
            .register(
                ComponentDescriptor::new::<B>("B", ComponentKind::Generic)
                    .with_dependency(DependencyDescriptor::by_type::<A>("a"))
                    .with_factory(|_| async { Ok(B) }),
            );

        let error = Container::resolve(registry, "").await.unwrap_err();
        let ContainerError::CircularDependency { cycle } = error else {
            panic!("expected circular dependency, got {error}");
        };
        assert!(cycle.contains(&"A".to_string()));
        assert!(cycle.contains(&"B".to_string()));
        assert_eq!(cycle.first(), cycle.last());
    }

    #[tokio::test]
    async fn should_report_missing_dependency() {
        struct Needs;
        struct Absent;

        let mut registry = ComponentRegistry::new();
        registry.register(
            ComponentDescriptor::new::<Needs>("Needs", ComponentKind::Generic)
                .with_dependency(DependencyDescriptor::by_type::<Absent>("absent"))
                .with_factory(|_| async { Ok(Needs) }),
        );

        assert!(matches!(
            Container::resolve(registry, "").await.unwrap_err(),
            ContainerError::MissingDependency { parameter, .. } if parameter == "absent"
        ));
    }

    #[tokio::test]
    async fn should_resolve_optional_dependency_as_absent() {
        struct Absent;
        struct Tolerant {
            fallback: bool,
        }

        let mut registry = ComponentRegistry::new();
        registry.register(
            ComponentDescriptor::new::<Tolerant>("Tolerant", ComponentKind::Generic)
                .with_dependency(DependencyDescriptor::by_type::<Absent>("absent").optional())
                .with_factory(|deps| async move {
                    Ok(Tolerant {
                        fallback: deps.optional_instance::<Absent>("absent")?.is_none(),
                    })
                }),
        );

        let container = Container::resolve(registry, "").await.unwrap();
        let tolerant = container.instance_typed::<Tolerant>("Tolerant").await.unwrap();
        assert!(tolerant.fallback);
    }

    #[tokio::test]
    async fn should_report_ambiguous_dependency() {
        trait Port: Send + Sync {}
        struct First;
        struct Second;
        impl Port for First {}
        impl Port for Second {}

        struct Needs;

        let mut registry = ComponentRegistry::new();
        registry
            .register(
                ComponentDescriptor::new::<First>("First", ComponentKind::Generic)
                    .with_alias::<dyn Port + Send + Sync>(
                        alias_cast!(First => dyn Port + Send + Sync),
                    )
                    .with_factory(|_| async { Ok(First) }),
            )
            .register(
                ComponentDescriptor::new::<Second>("Second", ComponentKind::Generic)
                    .with_alias::<dyn Port + Send + Sync>(
                        alias_cast!(Second => dyn Port + Send + Sync),
                    )
                    .with_factory(|_| async { Ok(Second) }),
            )
            .register(
                ComponentDescriptor::new::<Needs>("Needs", ComponentKind::Generic)
                    .with_dependency(DependencyDescriptor::by_type::<dyn Port + Send + Sync>(
                        "port",
                    ))
                    .with_factory(|_| async { Ok(Needs) }),
            );

        let error = Container::resolve(registry, "").await.unwrap_err();
        assert!(matches!(
            error,
            ContainerError::AmbiguousDependency { ref candidates, .. } if candidates.len() == 2
        ));
    }

    #[tokio::test]
    async fn should_break_ambiguity_with_name_override() {
        trait Port: Send + Sync {
            fn id(&self) -> u8;
        }
        struct First;
        struct Second;
        impl Port for First {
            fn id(&self) -> u8 {
                1
            }
        }
        impl Port for Second {
            fn id(&self) -> u8 {
                2
            }
        }

        struct Needs {
            port: ComponentInstancePtr<dyn Port + Send + Sync>,
        }

        let mut registry = ComponentRegistry::new();
        registry
            .register(
                ComponentDescriptor::new::<First>("First", ComponentKind::Generic)
                    .with_alias::<dyn Port + Send + Sync>(
                        alias_cast!(First => dyn Port + Send + Sync),
                    )
                    .with_factory(|_| async { Ok(First) }),
            )
            .register(
                ComponentDescriptor::new::<Second>("Second", ComponentKind::Generic)
                    .with_alias::<dyn Port + Send + Sync>(
                        alias_cast!(Second => dyn Port + Send + Sync),
                    )
                    .with_factory(|_| async { Ok(Second) }),
            )
            .register(
                ComponentDescriptor::new::<Needs>("Needs", ComponentKind::Generic)
                    .with_dependency(
                        DependencyDescriptor::by_type::<dyn Port + Send + Sync>("port")
                            .named("Second"),
                    )
                    .with_factory(|deps| async move {
                        Ok(Needs {
                            port: deps.instance::<dyn Port + Send + Sync>("port")?,
                        })
                    }),
            );

        let container = Container::resolve(registry, "").await.unwrap();
        let needs = container.instance_typed::<Needs>("Needs").await.unwrap();
        assert_eq!(needs.port.id(), 2);
    }

    #[tokio::test]
    async fn should_inject_configuration_values() {
        struct Limits {
            max_users: i64,
        }

        struct FixedValues;

        impl ValueResolver for FixedValues {
            fn resolve_value(&self, expression: &str) -> Result<JsonValue, ErrorPtr> {
                assert_eq!(expression, "${app.max_users:100}");
                Ok(JsonValue::String("250".to_string()))
            }
        }

        let mut registry = ComponentRegistry::new();
        registry.register(
            ComponentDescriptor::new::<Limits>("Limits", ComponentKind::Configuration)
                .with_value("max_users", "${app.max_users:100}")
                .with_factory(|deps| async move {
                    Ok(Limits {
                        max_users: deps.value("max_users")?,
                    })
                }),
        );

        let container = Container::resolve_with_values(registry, "", Arc::new(FixedValues))
            .await
            .unwrap();
        let limits = container.instance_typed::<Limits>("Limits").await.unwrap();
        assert_eq!(limits.max_users, 250);
    }

    #[tokio::test]
    async fn should_surface_factory_errors() {
        struct Broken;

        let mut registry = ComponentRegistry::new();
        registry.register(
            ComponentDescriptor::new::<Broken>("Broken", ComponentKind::Generic).with_factory(
                |_| async {
                    Err::<Broken, ErrorPtr>(Arc::new(std::io::Error::new(
                        std::io::ErrorKind::Other,
                        "boom",
                    )))
                },
            ),
        );

        let error = Container::resolve(registry, "").await.unwrap_err();
        assert!(matches!(
            error,
            ContainerError::Instantiation { ref component, .. } if component == "Broken"
        ));
    }

    #[tokio::test]
    async fn should_run_shutdown_hooks_in_reverse_order() {
        let log: Log = Default::default();

        struct First;
        struct Second;

        let mut registry = ComponentRegistry::new();
        let first_log = log.clone();
        registry.register(
            ComponentDescriptor::new::<First>("First", ComponentKind::Generic)
                .with_factory(|_| async { Ok(First) })
                .with_shutdown::<First, _, _>(move |_| {
                    let log = first_log.clone();
                    async move {
                        log.lock().unwrap().push("First");
                        Ok(())
                    }
                }),
        );
        let second_log = log.clone();
        registry.register(
            ComponentDescriptor::new::<Second>("Second", ComponentKind::Generic)
                .with_dependency(DependencyDescriptor::by_type::<First>("first"))
                .with_factory(|_| async { Ok(Second) })
                .with_shutdown::<Second, _, _>(move |_| {
                    let log = second_log.clone();
                    async move {
                        log.lock().unwrap().push("Second");
                        Ok(())
                    }
                }),
        );

        let container = Container::resolve(registry, "").await.unwrap();
        container.shutdown().await;

        assert_eq!(*log.lock().unwrap(), vec!["Second", "First"]);
    }
}
