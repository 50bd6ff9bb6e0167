//! Named descriptor registry.
//!
//! Producers that generate layouts (binding generators, schema loaders)
//! register each [`TypeDescriptor`] once under its type name; consumers look
//! them up by name instead of threading `Arc`s through every call.

use std::sync::{Arc, OnceLock};

use indexmap::IndexMap;
use parking_lot::RwLock;

use crate::error::LayoutError;
use crate::layout::TypeDescriptor;

/// Thread-safe map from type name to descriptor.
///
/// Registration order is preserved for [`DescriptorRegistry::names`].
#[derive(Default)]
pub struct DescriptorRegistry {
    descriptors: RwLock<IndexMap<String, Arc<TypeDescriptor>>>,
}

impl DescriptorRegistry {
    /// An empty registry.
    pub fn new() -> Self {
        Self::default()
    }

    /// Register `desc` under its own name.
    ///
    /// Fails if the name is taken, even by an identical layout.
    pub fn register(&self, desc: Arc<TypeDescriptor>) -> Result<(), LayoutError> {
        let mut map = self.descriptors.write();
        if map.contains_key(desc.name()) {
            return Err(LayoutError::DuplicateDescriptor {
                name: desc.name().to_string(),
            });
        }
        tracing::debug!(
            name = desc.name(),
            size = desc.size(),
            fields = desc.len(),
            "registered type descriptor"
        );
        map.insert(desc.name().to_string(), desc);
        Ok(())
    }

    /// Look up a descriptor by name.
    pub fn get(&self, name: &str) -> Option<Arc<TypeDescriptor>> {
        self.descriptors.read().get(name).cloned()
    }

    /// Whether `name` is registered.
    pub fn contains(&self, name: &str) -> bool {
        self.descriptors.read().contains_key(name)
    }

    /// Number of registered descriptors.
    pub fn len(&self) -> usize {
        self.descriptors.read().len()
    }

    /// Whether nothing is registered.
    pub fn is_empty(&self) -> bool {
        self.descriptors.read().is_empty()
    }

    /// Registered names, in registration order.
    pub fn names(&self) -> Vec<String> {
        self.descriptors.read().keys().cloned().collect()
    }
}

static GLOBAL: OnceLock<DescriptorRegistry> = OnceLock::new();

/// The process-wide registry.
pub fn global_registry() -> &'static DescriptorRegistry {
    GLOBAL.get_or_init(DescriptorRegistry::new)
}

const _: fn() = || {
    fn assert<T: Send + Sync>() {}
    assert::<DescriptorRegistry>();
};
