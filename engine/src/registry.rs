//! Helper Registry
//!
//! Maps stable helper type keys to factories. The registry is filled once at
//! startup by `bootstrap()` and only read afterwards, so every lookup takes
//! `&self` and needs no locking. Tests build their own registry value and
//! register fakes; production code uses the process-wide `global()` instance.

use sdk::{Helper, HelperError, HelperInfo};
use std::collections::HashMap;
use std::sync::OnceLock;
use tracing::debug;

use crate::helpers::register_builtin_helpers;

/// Creates a fresh helper instance per invocation
pub type HelperFactory = fn() -> Box<dyn Helper>;

struct Registration {
    factory: HelperFactory,
    info: HelperInfo,
}

/// Registry of helper types
#[derive(Default)]
pub struct HelperRegistry {
    helpers: HashMap<String, Registration>,
}

impl HelperRegistry {
    /// Create an empty registry
    pub fn new() -> Self {
        Self::default()
    }

    /// Create a registry holding every built-in helper
    pub fn bootstrap() -> Result<Self, HelperError> {
        let mut registry = Self::new();
        register_builtin_helpers(&mut registry)?;
        debug!("Registered {} built-in helpers", registry.len());
        Ok(registry)
    }

    /// Register a helper factory under the helper's own type key
    ///
    /// Metadata is captured once here. Registering the same key twice is an
    /// error.
    pub fn register(&mut self, factory: HelperFactory) -> Result<(), HelperError> {
        let info = factory().info();
        if self.helpers.contains_key(&info.helper_type) {
            return Err(HelperError::DuplicateHelperType(info.helper_type));
        }
        debug!("Registering helper '{}'", info.helper_type);
        self.helpers
            .insert(info.helper_type.clone(), Registration { factory, info });
        Ok(())
    }

    /// Create a new instance of a registered helper
    pub fn new_helper(&self, helper_type: &str) -> Result<Box<dyn Helper>, HelperError> {
        self.helpers
            .get(helper_type)
            .map(|registration| (registration.factory)())
            .ok_or_else(|| HelperError::UnknownHelperType(helper_type.to_string()))
    }

    pub fn is_registered(&self, helper_type: &str) -> bool {
        self.helpers.contains_key(helper_type)
    }

    pub fn helper_info(&self, helper_type: &str) -> Option<&HelperInfo> {
        self.helpers.get(helper_type).map(|r| &r.info)
    }

    /// Catalog of every helper, sorted by category then type key
    pub fn list_helper_info(&self) -> Vec<&HelperInfo> {
        let mut infos: Vec<&HelperInfo> = self.helpers.values().map(|r| &r.info).collect();
        infos.sort_by(|a, b| {
            a.category
                .cmp(&b.category)
                .then_with(|| a.helper_type.cmp(&b.helper_type))
        });
        infos
    }

    /// Registered type keys, sorted
    pub fn types(&self) -> Vec<&str> {
        let mut types: Vec<&str> = self.helpers.keys().map(String::as_str).collect();
        types.sort_unstable();
        types
    }

    pub fn len(&self) -> usize {
        self.helpers.len()
    }

    pub fn is_empty(&self) -> bool {
        self.helpers.is_empty()
    }
}

/// Process-wide registry of built-in helpers
///
/// # Panics
///
/// Panics on first use if two built-in helpers share a type key.
pub fn global() -> &'static HelperRegistry {
    static REGISTRY: OnceLock<HelperRegistry> = OnceLock::new();
    REGISTRY.get_or_init(|| match HelperRegistry::bootstrap() {
        Ok(registry) => registry,
        Err(e) => panic!("built-in helper registration failed: {}", e),
    })
}
