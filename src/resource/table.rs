//! One blob, many alias keys
//!
//! Resources live in an append-only arena; the alias map points keys at arena
//! slots. A key is bound once and never rebound, so the first source to
//! declare a location owns it: bundle and snapshot contents are loaded before
//! any capture or fetch can run and therefore always win.

use std::collections::HashMap;
use std::sync::Arc;

use parking_lot::Mutex;

use super::Resource;

/// Arena slot of a resource
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct ResourceId(usize);

#[derive(Debug, Default)]
struct Inner {
    arena: Vec<Arc<Resource>>,
    keys: HashMap<String, ResourceId>,
}

/// Thread-safe alias → resource map
///
/// Shared as `Arc<ResourceTable>` between the session that built it, the
/// reference resolver and the capture proxy. Every access takes the lock for
/// the duration of one map operation only; returned resources are `Arc`s, so
/// no lock is held while callers use them.
#[derive(Debug, Default)]
pub struct ResourceTable {
    inner: Mutex<Inner>,
}

impl ResourceTable {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Register `resource` under every key that is still free
    ///
    /// Empty keys are ignored. Returns the new slot, or `None` when every key
    /// was already bound (the resource is then dropped, not stored).
    pub fn insert<I, K>(&self, keys: I, resource: Resource) -> Option<ResourceId>
    where
        I: IntoIterator<Item = K>,
        K: Into<String>,
    {
        let mut inner = self.inner.lock();
        let id = ResourceId(inner.arena.len());

        let mut bound = false;
        for key in keys {
            let key = key.into();
            if key.is_empty() || inner.keys.contains_key(&key) {
                continue;
            }
            inner.keys.insert(key, id);
            bound = true;
        }

        if bound {
            inner.arena.push(Arc::new(resource));
            Some(id)
        } else {
            None
        }
    }

    /// Bind more free keys to an existing slot; returns how many were bound
    pub fn alias<I, K>(&self, id: ResourceId, keys: I) -> usize
    where
        I: IntoIterator<Item = K>,
        K: Into<String>,
    {
        let mut inner = self.inner.lock();
        if id.0 >= inner.arena.len() {
            return 0;
        }

        let mut bound = 0;
        for key in keys {
            let key = key.into();
            if key.is_empty() || inner.keys.contains_key(&key) {
                continue;
            }
            inner.keys.insert(key, id);
            bound += 1;
        }
        bound
    }

    #[must_use]
    pub fn get(&self, key: &str) -> Option<Arc<Resource>> {
        let inner = self.inner.lock();
        let id = inner.keys.get(key)?;
        inner.arena.get(id.0).cloned()
    }

    #[must_use]
    pub fn id_of(&self, key: &str) -> Option<ResourceId> {
        self.inner.lock().keys.get(key).copied()
    }

    #[must_use]
    pub fn get_by_id(&self, id: ResourceId) -> Option<Arc<Resource>> {
        self.inner.lock().arena.get(id.0).cloned()
    }

    #[must_use]
    pub fn contains(&self, key: &str) -> bool {
        self.inner.lock().keys.contains_key(key)
    }

    /// Replace the bytes of a slot; every alias sees the new bytes
    ///
    /// The replacement starts with an empty data-URI cache.
    pub fn reset_data(&self, id: ResourceId, data: impl Into<bytes::Bytes>) -> bool {
        let mut inner = self.inner.lock();
        match inner.arena.get_mut(id.0) {
            Some(slot) => {
                *slot = Arc::new(slot.with_data(data));
                true
            }
            None => false,
        }
    }

    /// Snapshot of all stored resources with their slots, in insertion order
    #[must_use]
    pub fn entries(&self) -> Vec<(ResourceId, Arc<Resource>)> {
        self.inner
            .lock()
            .arena
            .iter()
            .enumerate()
            .map(|(i, r)| (ResourceId(i), Arc::clone(r)))
            .collect()
    }

    /// Snapshot of all stored resources, in insertion order
    #[must_use]
    pub fn resources(&self) -> Vec<Arc<Resource>> {
        self.inner.lock().arena.clone()
    }

    /// All keys bound to `id`, sorted
    #[must_use]
    pub fn keys_of(&self, id: ResourceId) -> Vec<String> {
        let inner = self.inner.lock();
        let mut keys: Vec<String> = inner
            .keys
            .iter()
            .filter(|(_, v)| **v == id)
            .map(|(k, _)| k.clone())
            .collect();
        keys.sort();
        keys
    }

    /// Number of distinct resources
    #[must_use]
    pub fn len(&self) -> usize {
        self.inner.lock().arena.len()
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Number of bound keys
    #[must_use]
    pub fn key_count(&self) -> usize {
        self.inner.lock().keys.len()
    }
}
