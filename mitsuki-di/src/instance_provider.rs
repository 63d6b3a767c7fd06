//! Type-erased component instance handling. Instances are stored as `Arc<dyn Any>` and recovered
//! through [CastFunction]s registered alongside each descriptor, which is what allows a component
//! to be looked up both as its concrete type and as any of its registered trait-object aliases.

use std::any::Any;
use std::error::Error;
use std::sync::Arc;

/// Pointer to a component instance handed out by the container.
pub type ComponentInstancePtr<T> = Arc<T>;

/// Type-erased [ComponentInstancePtr].
pub type ComponentInstanceAnyPtr = ComponentInstancePtr<dyn Any + Send + Sync + 'static>;

/// Type-erased error shared across component boundaries.
pub type ErrorPtr = Arc<dyn Error + Send + Sync>;

/// Converts a type-erased instance pointer into a `Box` containing a
/// [ComponentInstancePtr]`<T>` for the target type of the cast. The boxed pointer is later
/// downcast back by typed accessors. Returns the original pointer on mismatch so callers can
/// produce a precise error.
pub type CastFunction =
    Arc<dyn Fn(ComponentInstanceAnyPtr) -> Result<Box<dyn Any>, ComponentInstanceAnyPtr> + Send + Sync>;

/// Builds the identity [CastFunction] for a concrete component type.
pub fn concrete_cast<T: Send + Sync + 'static>() -> CastFunction {
    Arc::new(|instance: ComponentInstanceAnyPtr| {
        instance
            .downcast::<T>()
            .map(|p| Box::new(p) as Box<dyn Any>)
    })
}

pub fn convert_error<E: Error + Send + Sync + 'static>(error: E) -> ErrorPtr {
    Arc::new(error) as ErrorPtr
}

/// Builds a [CastFunction] viewing a concrete component as one of its trait objects.
///
/// ```
/// use mitsuki_di::alias_cast;
///
/// trait Greeter: Send + Sync {}
/// struct English;
/// impl Greeter for English {}
///
/// let cast = alias_cast!(English => dyn Greeter + Send + Sync);
/// # let _ = cast;
/// ```
#[macro_export]
macro_rules! alias_cast {
    ($concrete:ty => $alias:ty) => {
        ::std::sync::Arc::new(
            |instance: $crate::instance_provider::ComponentInstanceAnyPtr| {
                instance.downcast::<$concrete>().map(|p| {
                    ::std::boxed::Box::new(
                        p as $crate::instance_provider::ComponentInstancePtr<$alias>,
                    ) as ::std::boxed::Box<dyn ::std::any::Any>
                })
            },
        ) as $crate::instance_provider::CastFunction
    };
}

#[cfg(test)]
mod tests {
    use super::*;

    trait Named: Send + Sync {
        fn name(&self) -> &'static str;
    }

    struct Fixed;

    impl Named for Fixed {
        fn name(&self) -> &'static str {
            "fixed"
        }
    }

    #[test]
    fn should_cast_concrete_instance() {
        let cast = concrete_cast::<Fixed>();
        let instance = ComponentInstancePtr::new(Fixed) as ComponentInstanceAnyPtr;

        let boxed = (cast)(instance).unwrap();
        let typed = boxed.downcast::<ComponentInstancePtr<Fixed>>().unwrap();
        assert_eq!(typed.name(), "fixed");
    }

    #[test]
    fn should_cast_alias_instance() {
        let cast = alias_cast!(Fixed => dyn Named + Send + Sync);
        let instance = ComponentInstancePtr::new(Fixed) as ComponentInstanceAnyPtr;

        let boxed = (cast)(instance).unwrap();
        let typed = boxed
            .downcast::<ComponentInstancePtr<dyn Named + Send + Sync>>()
            .unwrap();
        assert_eq!(typed.name(), "fixed");
    }

    #[test]
    fn should_return_original_pointer_on_mismatch() {
        let cast = concrete_cast::<Fixed>();
        let instance = ComponentInstancePtr::new(0_i8) as ComponentInstanceAnyPtr;

        assert!((cast)(instance).is_err());
    }
}
