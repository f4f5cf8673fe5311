//! Compute-once-per-key concurrent map
//!
//! [`OnceMap::get_or_init`] guarantees that the initializer runs at most once
//! per key for the lifetime of the map, even when many threads race on first
//! access: the losers block on the winner's shard lock and then receive the
//! winner's value. Duplicate construction would break identity comparisons
//! of interned handles, so this is a correctness guarantee, not an
//! optimization.
//!
//! The hot path (key already present) takes one shard read lock and does not
//! allocate.
//!
//! # Deadlock
//!
//! The initializer runs while the key's shard is write-locked. It must not
//! call back into the same map.

use dashmap::mapref::entry::Entry;
use dashmap::DashMap;
use rustc_hash::FxHasher;
use std::borrow::Borrow;
use std::hash::{BuildHasherDefault, Hash};

/// Concurrent map whose values are constructed exactly once per key
pub struct OnceMap<K, V> {
    map: DashMap<K, V, BuildHasherDefault<FxHasher>>,
}

impl<K, V> OnceMap<K, V>
where
    K: Eq + Hash,
    V: Clone,
{
    /// Create an empty map
    pub fn new() -> Self {
        Self {
            map: DashMap::with_hasher(BuildHasherDefault::default()),
        }
    }

    /// Value for `key`, constructing it with `init` on first access
    pub fn get_or_init<Q>(&self, key: &Q, init: impl FnOnce() -> V) -> V
    where
        K: Borrow<Q>,
        Q: Hash + Eq + ToOwned<Owned = K> + ?Sized,
    {
        if let Some(existing) = self.map.get(key) {
            return existing.value().clone();
        }
        match self.map.entry(key.to_owned()) {
            Entry::Occupied(entry) => entry.get().clone(),
            Entry::Vacant(entry) => {
                let value = init();
                entry.insert(value.clone());
                value
            }
        }
    }

    /// Value for `key` if already constructed
    pub fn get<Q>(&self, key: &Q) -> Option<V>
    where
        K: Borrow<Q>,
        Q: Hash + Eq + ?Sized,
    {
        self.map.get(key).map(|entry| entry.value().clone())
    }

    /// Copy of all constructed values
    pub fn values(&self) -> Vec<V> {
        self.map.iter().map(|entry| entry.value().clone()).collect()
    }

    /// Number of constructed values
    pub fn len(&self) -> usize {
        self.map.len()
    }

    /// Check if nothing was constructed yet
    pub fn is_empty(&self) -> bool {
        self.map.is_empty()
    }
}

impl<K, V> Default for OnceMap<K, V>
where
    K: Eq + Hash,
    V: Clone,
{
    fn default() -> Self {
        Self::new()
    }
}

impl<K, V> std::fmt::Debug for OnceMap<K, V>
where
    K: Eq + Hash,
{
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("OnceMap").field("len", &self.map.len()).finish()
    }
}
