//! The passive component catalogue. Registration only appends descriptors; all validation
//! (duplicate names, graph faults) happens during container resolution, so registration order is
//! irrelevant and registration itself never constructs anything.

use crate::descriptor::ComponentDescriptor;

/// Statically submitted registration, collected at startup. Libraries use
/// [`submit_component!`](crate::submit_component) so their components are discovered without the
/// application listing them explicitly.
pub struct ComponentRegistrar {
    pub register: fn() -> ComponentDescriptor,
}

inventory::collect!(ComponentRegistrar);

/// Submits a `fn() -> ComponentDescriptor` for static collection.
///
/// ```
/// use mitsuki_di::component::ComponentKind;
/// use mitsuki_di::descriptor::ComponentDescriptor;
///
/// struct Clock;
///
/// fn clock_component() -> ComponentDescriptor {
///     ComponentDescriptor::new::<Clock>("Clock", ComponentKind::Generic)
///         .with_factory(|_| async { Ok(Clock) })
/// }
///
/// mitsuki_di::submit_component!(clock_component);
/// # fn main() {}
/// ```
#[macro_export]
macro_rules! submit_component {
    ($register:path) => {
        $crate::inventory::submit! {
            $crate::registry::ComponentRegistrar {
                register: $register,
            }
        }
    };
}

/// Catalogue of component descriptors awaiting resolution.
#[derive(Default)]
pub struct ComponentRegistry {
    descriptors: Vec<ComponentDescriptor>,
}

impl ComponentRegistry {
    /// An empty registry.
    pub fn new() -> Self {
        Self::default()
    }

    /// A registry pre-populated with all statically submitted registrars.
    pub fn with_submitted() -> Self {
        let mut registry = Self::new();
        for registrar in inventory::iter::<ComponentRegistrar> {
            registry.register((registrar.register)());
        }
        registry
    }

    /// Appends a descriptor. Duplicate names are reported later, at resolution, scoped to the
    /// active profile.
    pub fn register(&mut self, descriptor: ComponentDescriptor) -> &mut Self {
        self.descriptors.push(descriptor);
        self
    }

    pub fn descriptors(&self) -> &[ComponentDescriptor] {
        &self.descriptors
    }

    pub fn len(&self) -> usize {
        self.descriptors.len()
    }

    pub fn is_empty(&self) -> bool {
        self.descriptors.is_empty()
    }

    pub(crate) fn into_descriptors(self) -> Vec<ComponentDescriptor> {
        self.descriptors
    }
}
