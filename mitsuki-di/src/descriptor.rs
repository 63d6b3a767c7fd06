//! Declarative metadata for managed components. A [ComponentDescriptor] is registration-time
//! data only: building one never constructs an instance. The [Container](crate::container::Container)
//! consumes descriptors during its one-shot resolution pass.

use crate::component::{ComponentKind, Scope};
use crate::error::{ContainerError, DependencyError};
use crate::instance_provider::{
    concrete_cast, CastFunction, ComponentInstanceAnyPtr, ComponentInstancePtr, ErrorPtr,
};
use derivative::Derivative;
use futures::future::BoxFuture;
use futures::FutureExt;
use fxhash::{FxHashMap, FxHashSet};
use serde::de::DeserializeOwned;
use serde_json::Value as JsonValue;
use std::any::{type_name, TypeId};
use std::future::Future;
use std::sync::Arc;

/// Constructor for a component: receives resolved dependencies in declaration order and produces
/// a type-erased instance. Factories may suspend on I/O.
pub type FactoryFunction = Arc<
    dyn Fn(ResolvedDependencies) -> BoxFuture<'static, Result<ComponentInstanceAnyPtr, ErrorPtr>>
        + Send
        + Sync,
>;

/// Optional hook invoked during container shutdown, in reverse instantiation order.
pub type ShutdownFunction =
    Arc<dyn Fn(ComponentInstanceAnyPtr) -> BoxFuture<'static, Result<(), ErrorPtr>> + Send + Sync>;

/// What a single dependency declaration points at.
#[derive(Clone, Debug)]
pub enum DependencyTarget {
    /// Another managed component, matched by explicit name, parameter name, or declared type.
    Component {
        type_id: TypeId,
        type_name: &'static str,
        name_hint: Option<String>,
        required: bool,
    },
    /// A configuration value, resolved through the configuration store at instantiation time.
    Value { expression: String },
}

/// One entry of a descriptor's ordered dependency list.
#[derive(Clone, Debug)]
pub struct DependencyDescriptor {
    /// Parameter name, used for matching by name and for factory-side access.
    pub parameter: String,
    pub target: DependencyTarget,
}

impl DependencyDescriptor {
    /// Declares a dependency matched by type (or by a component named like the parameter).
    pub fn by_type<T: ?Sized + 'static>(parameter: impl Into<String>) -> Self {
        Self {
            parameter: parameter.into(),
            target: DependencyTarget::Component {
                type_id: TypeId::of::<T>(),
                type_name: type_name::<T>(),
                name_hint: None,
                required: true,
            },
        }
    }

    /// Declares a dependency on the component with the given registered name.
    pub fn by_name<T: ?Sized + 'static>(
        parameter: impl Into<String>,
        name: impl Into<String>,
    ) -> Self {
        Self::by_type::<T>(parameter).named(name)
    }

    /// Declares a dependency on a configuration value, e.g. `"${server.port:8000}"`.
    pub fn value(parameter: impl Into<String>, expression: impl Into<String>) -> Self {
        Self {
            parameter: parameter.into(),
            target: DependencyTarget::Value {
                expression: expression.into(),
            },
        }
    }

    /// Adds an explicit name override to a component dependency.
    pub fn named(mut self, name: impl Into<String>) -> Self {
        if let DependencyTarget::Component { name_hint, .. } = &mut self.target {
            *name_hint = Some(name.into());
        }
        self
    }

    /// Marks a component dependency as optional: when no matching descriptor is active, the
    /// factory sees an absent value instead of resolution failing.
    pub fn optional(mut self) -> Self {
        if let DependencyTarget::Component { required, .. } = &mut self.target {
            *required = false;
        }
        self
    }
}

/// Metadata for a single managed component.
#[derive(Derivative, Clone)]
#[derivative(Debug)]
pub struct ComponentDescriptor {
    /// Unique identifier within the set of descriptors active for the chosen profile.
    pub name: String,
    pub kind: ComponentKind,
    pub scope: Scope,
    /// Profiles for which this descriptor is active; empty means active everywhere.
    pub profiles: FxHashSet<String>,
    /// Ordered dependency declarations, passed to the factory in this order.
    pub dependencies: Vec<DependencyDescriptor>,
    /// Name of the concrete Rust type this descriptor produces.
    pub type_name: &'static str,
    pub(crate) provides: TypeId,
    #[derivative(Debug = "ignore")]
    pub(crate) casts: FxHashMap<TypeId, CastFunction>,
    #[derivative(Debug = "ignore")]
    pub(crate) factory: Option<FactoryFunction>,
    #[derivative(Debug = "ignore")]
    pub(crate) shutdown: Option<ShutdownFunction>,
}

impl ComponentDescriptor {
    /// Creates a descriptor producing `T`. The descriptor is inert until registered and resolved.
    pub fn new<T: Send + Sync + 'static>(name: impl Into<String>, kind: ComponentKind) -> Self {
        let mut casts = FxHashMap::default();
        casts.insert(TypeId::of::<T>(), concrete_cast::<T>());

        Self {
            name: name.into(),
            kind,
            scope: Scope::default(),
            profiles: FxHashSet::default(),
            dependencies: Vec::new(),
            type_name: type_name::<T>(),
            provides: TypeId::of::<T>(),
            casts,
            factory: None,
            shutdown: None,
        }
    }

    /// Default component name for a type: the type name without its module path.
    pub fn default_name<T: ?Sized>() -> &'static str {
        let full = type_name::<T>();
        full.rsplit("::").next().unwrap_or(full)
    }

    pub fn with_scope(mut self, scope: Scope) -> Self {
        self.scope = scope;
        self
    }

    pub fn with_profiles<I, S>(mut self, profiles: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.profiles = profiles.into_iter().map(Into::into).collect();
        self
    }

    pub fn with_dependency(mut self, dependency: DependencyDescriptor) -> Self {
        self.dependencies.push(dependency);
        self
    }

    /// Shorthand for a configuration-value dependency.
    pub fn with_value(self, parameter: impl Into<String>, expression: impl Into<String>) -> Self {
        self.with_dependency(DependencyDescriptor::value(parameter, expression))
    }

    /// Registers an additional type this component can be looked up as, usually a trait object.
    /// The cast is typically built with [`alias_cast!`](crate::alias_cast).
    pub fn with_alias<A: ?Sized + 'static>(mut self, cast: CastFunction) -> Self {
        self.casts.insert(TypeId::of::<A>(), cast);
        self
    }

    /// Sets the factory constructing the component from its resolved dependencies.
    pub fn with_factory<T, F, Fut>(mut self, factory: F) -> Self
    where
        T: Send + Sync + 'static,
        F: Fn(ResolvedDependencies) -> Fut + Send + Sync + 'static,
        Fut: Future<Output = Result<T, ErrorPtr>> + Send + 'static,
    {
        self.factory = Some(Arc::new(move |dependencies| {
            let instance = factory(dependencies);
            async move { instance.await.map(|i| ComponentInstancePtr::new(i) as ComponentInstanceAnyPtr) }
                .boxed()
        }));
        self
    }

    /// Uses an already-constructed instance. Useful for adapters built outside the container.
    pub fn with_existing<T: Send + Sync + 'static>(
        mut self,
        instance: ComponentInstancePtr<T>,
    ) -> Self {
        self.factory = Some(Arc::new(move |_| {
            let instance = instance.clone() as ComponentInstanceAnyPtr;
            async move { Ok(instance) }.boxed()
        }));
        self
    }

    /// Registers a shutdown hook invoked with the component instance during container shutdown.
    pub fn with_shutdown<T, F, Fut>(mut self, hook: F) -> Self
    where
        T: Send + Sync + 'static,
        F: Fn(ComponentInstancePtr<T>) -> Fut + Send + Sync + 'static,
        Fut: Future<Output = Result<(), ErrorPtr>> + Send + 'static,
    {
        let component = self.name.clone();
        self.shutdown = Some(Arc::new(move |instance: ComponentInstanceAnyPtr| {
            match instance.downcast::<T>() {
                Ok(typed) => hook(typed).boxed(),
                Err(_) => {
                    let error = Arc::new(ContainerError::IncompatibleComponent {
                        component: component.clone(),
                        requested: type_name::<T>().to_string(),
                    }) as ErrorPtr;
                    async move { Err(error) }.boxed()
                }
            }
        }));
        self
    }

    /// Whether this descriptor participates in resolution under the given profile.
    pub fn is_active(&self, profile: &str) -> bool {
        self.profiles.is_empty() || self.profiles.contains(profile)
    }

    /// Whether this component can be looked up as the given type.
    pub fn provides_type(&self, type_id: TypeId) -> bool {
        self.casts.contains_key(&type_id)
    }

    pub(crate) fn cast_for(&self, type_id: TypeId) -> Option<CastFunction> {
        self.casts.get(&type_id).cloned()
    }

    pub(crate) fn provided_type_id(&self) -> TypeId {
        self.provides
    }
}

pub(crate) enum ResolvedArg {
    Instance {
        instance: ComponentInstanceAnyPtr,
        cast: CastFunction,
    },
    Absent,
    Value(JsonValue),
}

/// Dependencies resolved for a single factory invocation, addressable by parameter name.
pub struct ResolvedDependencies {
    entries: Vec<(String, ResolvedArg)>,
}

impl ResolvedDependencies {
    pub(crate) fn new(entries: Vec<(String, ResolvedArg)>) -> Self {
        Self { entries }
    }

    /// An empty dependency set, for factories without declared dependencies.
    pub fn none() -> Self {
        Self {
            entries: Vec::new(),
        }
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    fn entry(&self, parameter: &str) -> Result<&ResolvedArg, DependencyError> {
        self.entries
            .iter()
            .find(|(name, _)| name == parameter)
            .map(|(_, arg)| arg)
            .ok_or_else(|| DependencyError::UnknownParameter(parameter.to_string()))
    }

    /// Returns the injected instance for a required component dependency.
    pub fn instance<T: ?Sized + Send + Sync + 'static>(
        &self,
        parameter: &str,
    ) -> Result<ComponentInstancePtr<T>, ErrorPtr> {
        self.optional_instance::<T>(parameter)?
            .ok_or_else(|| DependencyError::NotAnInstance {
                parameter: parameter.to_string(),
            })
            .map_err(Into::into)
    }

    /// Returns the injected instance for an optional component dependency, or `None` when no
    /// matching component was active.
    pub fn optional_instance<T: ?Sized + Send + Sync + 'static>(
        &self,
        parameter: &str,
    ) -> Result<Option<ComponentInstancePtr<T>>, ErrorPtr> {
        match self.entry(parameter)? {
            ResolvedArg::Absent => Ok(None),
            ResolvedArg::Instance { instance, cast } => (cast)(instance.clone())
                .ok()
                .and_then(|boxed| boxed.downcast::<ComponentInstancePtr<T>>().ok())
                .map(|ptr| Some(*ptr))
                .ok_or_else(|| {
                    DependencyError::IncompatibleInstance {
                        parameter: parameter.to_string(),
                        requested: type_name::<T>().to_string(),
                    }
                    .into()
                }),
            ResolvedArg::Value(_) => Err(DependencyError::NotAnInstance {
                parameter: parameter.to_string(),
            }
            .into()),
        }
    }

    /// Returns a configuration-value dependency coerced into the requested type.
    pub fn value<T: DeserializeOwned>(&self, parameter: &str) -> Result<T, ErrorPtr> {
        match self.entry(parameter)? {
            ResolvedArg::Value(value) => coerce_value(parameter, value).map_err(Into::into),
            _ => Err(DependencyError::NotAValue {
                parameter: parameter.to_string(),
            }
            .into()),
        }
    }
}

/// Coerces a stored configuration value into a caller type. Accepts the stored representation
/// directly, then falls back to the lenient rules for string-typed sources (environment
/// variables): numeric/JSON literals, the truthy/falsy word sets, and comma-separated lists.
pub(crate) fn coerce_value<T: DeserializeOwned>(
    parameter: &str,
    value: &JsonValue,
) -> Result<T, DependencyError> {
    if let Ok(coerced) = serde_json::from_value::<T>(value.clone()) {
        return Ok(coerced);
    }

    if let JsonValue::String(raw) = value {
        let trimmed = raw.trim();

        if let Ok(literal) = serde_json::from_str::<JsonValue>(trimmed) {
            if let Ok(coerced) = serde_json::from_value::<T>(literal) {
                return Ok(coerced);
            }
        }

        let lowered = trimmed.to_ascii_lowercase();
        let as_bool = match lowered.as_str() {
            "true" | "yes" | "on" | "1" => Some(true),
            "false" | "no" | "off" | "0" => Some(false),
            _ => None,
        };
        if let Some(flag) = as_bool {
            if let Ok(coerced) = serde_json::from_value::<T>(JsonValue::Bool(flag)) {
                return Ok(coerced);
            }
        }

        let items = trimmed
            .split(',')
            .map(|item| JsonValue::String(item.trim().to_string()))
            .collect();
        if let Ok(coerced) = serde_json::from_value::<T>(JsonValue::Array(items)) {
            return Ok(coerced);
        }
    }

    Err(DependencyError::Coercion {
        parameter: parameter.to_string(),
        requested: type_name::<T>().to_string(),
        message: format!("incompatible value: {value}"),
    })
}
