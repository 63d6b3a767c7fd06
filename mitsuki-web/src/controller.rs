//! Functionality related to defining controllers.

use crate::route::RouteDescriptor;
#[cfg(test)]
use mockall::automock;

/// Main trait for components used as controllers - collections of routed handlers grouped under a
/// base path. Controllers are ordinary components of kind
/// [Controller](mitsuki_di::component::ComponentKind::Controller) registered with a
/// `dyn Controller + Send + Sync` alias, so they can inject services like any other component.
#[cfg_attr(test, automock)]
pub trait Controller {
    /// Prefix for all route paths of this controller, e.g. a base of `/api/users` and a route
    /// path of `/{id}` yield `/api/users/{id}`.
    fn base_path(&self) -> Option<String> {
        None
    }

    /// Security tags applied to every route of this controller, merged with per-route tags.
    /// Opaque to the core; consumed by security and documentation layers.
    fn security_tags(&self) -> Vec<String> {
        Vec::new()
    }

    /// Enumerates the routed handlers of this controller.
    fn routes(&self) -> Vec<RouteDescriptor>;
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn should_default_to_no_base_path() {
        let mut controller = MockController::new();
        controller.expect_base_path().return_const(None::<String>);
        controller
            .expect_security_tags()
            .return_const(Vec::<String>::new());
        controller
            .expect_routes()
            .return_const(Vec::<RouteDescriptor>::new());

        assert!(controller.base_path().is_none());
        assert!(controller.security_tags().is_empty());
        assert!(controller.routes().is_empty());
    }
}
