//! Global platform registry mapping platforms to vendor implementations.

use std::collections::HashMap;
use std::sync::{Arc, LazyLock, RwLock};

use super::{Platform, Vendor, vendors};

/// Global vendor registry.
static REGISTRY: LazyLock<RwLock<VendorRegistry>> =
    LazyLock::new(|| RwLock::new(VendorRegistry::with_builtin()));

/// Dispatch table from [`Platform`] to its [`Vendor`] implementation.
#[derive(Default)]
pub struct VendorRegistry {
    vendors: HashMap<Platform, Arc<dyn Vendor>>,
}

impl VendorRegistry {
    /// Create an empty registry.
    pub fn new() -> Self {
        Self::default()
    }

    /// Registry holding the built-in implementation for every platform.
    pub fn with_builtin() -> Self {
        let mut registry = Self::new();
        for platform in Platform::ALL {
            registry.register(vendors::builtin(platform));
        }
        registry
    }

    /// Get the global registry.
    pub fn global() -> &'static RwLock<VendorRegistry> {
        &REGISTRY
    }

    /// Register an implementation, replacing any previous one for its platform.
    pub fn register(&mut self, vendor: Arc<dyn Vendor>) {
        self.vendors.insert(vendor.platform(), vendor);
    }

    pub fn get(&self, platform: Platform) -> Option<Arc<dyn Vendor>> {
        self.vendors.get(&platform).cloned()
    }
}

/// Look up the vendor implementation for `platform` in the global registry.
pub fn vendor_for(platform: Platform) -> Arc<dyn Vendor> {
    let registry = REGISTRY.read().unwrap_or_else(|poisoned| poisoned.into_inner());
    registry
        .get(platform)
        .unwrap_or_else(|| vendors::builtin(platform))
}
