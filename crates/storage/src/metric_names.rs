//! Process-wide metric name interning

use crate::once_map::OnceMap;
use std::sync::Arc;
use tierscope_core::MetricNameHandle;

/// Identity cache from `(plugin_id, name)` to a shared [`MetricNameHandle`]
///
/// Keyed first by plugin, then by name, so a lookup borrows both strings
/// and allocates nothing once the handle exists.
#[derive(Debug, Default)]
pub struct MetricNameCache {
    plugins: OnceMap<String, Arc<OnceMap<String, MetricNameHandle>>>,
}

impl MetricNameCache {
    /// Create an empty cache
    pub fn new() -> Self {
        Self::default()
    }

    /// Shared handle for `(plugin_id, name)`
    ///
    /// Returns the same allocation for the same pair for the lifetime of the
    /// cache, including under concurrent first access.
    pub fn get(&self, plugin_id: &str, name: &str) -> MetricNameHandle {
        let names = self
            .plugins
            .get_or_init(plugin_id, || Arc::new(OnceMap::new()));
        names.get_or_init(name, || MetricNameHandle::allocate(plugin_id, name))
    }

    /// Number of interned names across all plugins
    pub fn len(&self) -> usize {
        self.plugins.values().iter().map(|names| names.len()).sum()
    }

    /// Check if nothing was interned
    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}
