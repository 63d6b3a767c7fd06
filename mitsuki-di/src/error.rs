use crate::instance_provider::ErrorPtr;
use thiserror::Error;

/// Errors raised while turning registered descriptors into a frozen container, or while looking
/// up instances afterwards. Every startup-time variant is fatal: no partial container is ever
/// exposed.
#[derive(Error, Clone, Debug)]
pub enum ContainerError {
    #[error("duplicate component name '{name}' among descriptors active for profile '{profile}'")]
    DuplicateComponentName { name: String, profile: String },
    #[error("missing dependency '{parameter}' of component '{component}': wanted {wanted}")]
    MissingDependency {
        component: String,
        parameter: String,
        wanted: String,
    },
    #[error("ambiguous dependency '{parameter}' of component '{component}': candidates are {candidates:?}; disambiguate with a name")]
    AmbiguousDependency {
        component: String,
        parameter: String,
        candidates: Vec<String>,
    },
    #[error("circular component dependency: {}", .cycle.join(" -> "))]
    CircularDependency { cycle: Vec<String> },
    #[error("component '{component}' cannot satisfy dependency '{parameter}' requiring type {requested}")]
    IncompatibleDependency {
        component: String,
        parameter: String,
        requested: String,
    },
    #[error("error instantiating component '{component}': {message}")]
    Instantiation { component: String, message: String },
    #[error("cannot resolve configuration value '{expression}' for '{component}.{parameter}': {message}")]
    ValueResolution {
        component: String,
        parameter: String,
        expression: String,
        message: String,
    },
    #[error("no component named '{0}'")]
    NoSuchComponent(String),
    #[error("multiple components provide type {requested}: {candidates:?}; look one up by name instead")]
    NoPrimaryInstance {
        requested: String,
        candidates: Vec<String>,
    },
    #[error("no component providing type {0}")]
    NoComponentForType(String),
    #[error("component '{component}' cannot be viewed as {requested}")]
    IncompatibleComponent {
        component: String,
        requested: String,
    },
}

/// Errors raised when reading resolved dependencies inside a component factory.
#[derive(Error, Clone, Debug)]
pub enum DependencyError {
    #[error("factory requested unknown dependency parameter '{0}'")]
    UnknownParameter(String),
    #[error("dependency '{parameter}' is not an injected component instance")]
    NotAnInstance { parameter: String },
    #[error("dependency '{parameter}' is not a configuration value")]
    NotAValue { parameter: String },
    #[error("dependency '{parameter}' cannot be viewed as {requested}")]
    IncompatibleInstance {
        parameter: String,
        requested: String,
    },
    #[error("cannot coerce configuration value for '{parameter}' into {requested}: {message}")]
    Coercion {
        parameter: String,
        requested: String,
        message: String,
    },
}

impl From<DependencyError> for ErrorPtr {
    fn from(error: DependencyError) -> Self {
        std::sync::Arc::new(error)
    }
}
