//! Core component classification types shared by descriptors and the container.

use std::fmt::{Display, Formatter};

/// Stereotype of a managed component. The container treats all kinds identically; the kind is
/// metadata for consumers such as the web layer (controllers) or diagnostics output.
#[derive(Clone, Copy, Debug, Eq, PartialEq, Hash)]
pub enum ComponentKind {
    Service,
    Repository,
    Controller,
    Configuration,
    Provider,
    Generic,
}

impl Display for ComponentKind {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        let name = match self {
            ComponentKind::Service => "service",
            ComponentKind::Repository => "repository",
            ComponentKind::Controller => "controller",
            ComponentKind::Configuration => "configuration",
            ComponentKind::Provider => "provider",
            ComponentKind::Generic => "generic",
        };
        f.write_str(name)
    }
}

/// Lifetime of component instances. Singletons are created once during container resolution and
/// cached; prototypes are created anew at every injection point and every lookup.
#[derive(Clone, Copy, Debug, Default, Eq, PartialEq, Hash)]
pub enum Scope {
    #[default]
    Singleton,
    Prototype,
}

impl Display for Scope {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        f.write_str(match self {
            Scope::Singleton => "singleton",
            Scope::Prototype => "prototype",
        })
    }
}
