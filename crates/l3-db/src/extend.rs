//! Router dict extensions.
//!
//! Extensions are registered once through [`DictExtendRegistryBuilder`]
//! during initialization. The built [`DictExtendRegistry`] is immutable and
//! is shared between request handlers.

use std::fmt;
use std::sync::Arc;

use tracing::debug;

use crate::error::{L3Error, L3Result};
use crate::models::Router;
use crate::view::RouterView;

/// Adds extension-owned keys to a rendered router.
pub trait RouterDictExtension: Send + Sync {
    /// Unique registration name.
    fn name(&self) -> &'static str;

    /// Populates `view` from `router`. Runs after the base fields are set.
    fn extend_router_dict(&self, view: &mut RouterView, router: &Router);
}

/// Collects router extensions before the registry is frozen.
#[derive(Default)]
pub struct DictExtendRegistryBuilder {
    extensions: Vec<Arc<dyn RouterDictExtension>>,
}

impl DictExtendRegistryBuilder {
    pub fn new() -> Self {
        Self::default()
    }

    /// Registers an extension.
    ///
    /// # Errors
    ///
    /// Returns [`L3Error::Internal`] if an extension with the same name is
    /// already registered.
    pub fn register<E>(mut self, extension: E) -> L3Result<Self>
    where
        E: RouterDictExtension + 'static,
    {
        let name = extension.name();
        if self.extensions.iter().any(|e| e.name() == name) {
            return Err(L3Error::internal(format!(
                "router dict extension '{}' registered twice",
                name
            )));
        }
        debug!("Registered router dict extension '{}'", name);
        self.extensions.push(Arc::new(extension));
        Ok(self)
    }

    pub fn build(self) -> DictExtendRegistry {
        DictExtendRegistry {
            extensions: self.extensions,
        }
    }
}

/// Frozen set of router extensions, applied in registration order.
#[derive(Clone, Default)]
pub struct DictExtendRegistry {
    extensions: Vec<Arc<dyn RouterDictExtension>>,
}

impl fmt::Debug for DictExtendRegistry {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_list().entries(self.names()).finish()
    }
}

impl DictExtendRegistry {
    pub fn builder() -> DictExtendRegistryBuilder {
        DictExtendRegistryBuilder::new()
    }

    /// Registered extension names in order.
    pub fn names(&self) -> Vec<&'static str> {
        self.extensions.iter().map(|e| e.name()).collect()
    }

    pub fn len(&self) -> usize {
        self.extensions.len()
    }

    pub fn is_empty(&self) -> bool {
        self.extensions.is_empty()
    }

    /// Runs every extension over an already-rendered router.
    pub fn apply_router(&self, view: &mut RouterView, router: &Router) {
        for extension in &self.extensions {
            extension.extend_router_dict(view, router);
        }
    }

    /// Renders the base fields then applies every extension.
    pub fn make_router_dict(&self, router: &Router) -> RouterView {
        let mut view = RouterView::from_router(router);
        self.apply_router(&mut view, router);
        view
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    struct Rename(&'static str, &'static str);

    impl RouterDictExtension for Rename {
        fn name(&self) -> &'static str {
            self.0
        }

        fn extend_router_dict(&self, view: &mut RouterView, _router: &Router) {
            view.name.push_str(self.1);
        }
    }

    #[test]
    fn test_extensions_run_in_registration_order() {
        let registry = DictExtendRegistry::builder()
            .register(Rename("a", "-a"))
            .unwrap()
            .register(Rename("b", "-b"))
            .unwrap()
            .build();

        assert_eq!(registry.names(), vec!["a", "b"]);
        let view = registry.make_router_dict(&Router::new("r1").with_name("edge"));
        assert_eq!(view.name, "edge-a-b");
    }

    #[test]
    fn test_duplicate_registration_rejected() {
        let result = DictExtendRegistry::builder()
            .register(Rename("a", ""))
            .unwrap()
            .register(Rename("a", ""));
        assert!(matches!(result, Err(L3Error::Internal { .. })));
    }

    #[test]
    fn test_empty_registry_renders_base_fields() {
        let registry = DictExtendRegistry::default();
        assert!(registry.is_empty());
        let view = registry.make_router_dict(&Router::new("r1"));
        assert_eq!(view, RouterView::from_router(&Router::new("r1")));
    }
}
