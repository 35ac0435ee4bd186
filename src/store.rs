use crate::resource::WatchedResource;
use std::collections::{HashMap, HashSet};
use std::sync::{Arc, RwLock};

/// Keyed local cache mirroring a remote collection.
///
/// The reflector is the sole writer; downstream readers share the store
/// through whatever concurrency the implementation provides.
pub trait Store<R>: Send + Sync {
    /// Derive the stable cache key for a resource
    fn get_key(&self, resource: &R) -> String;

    /// Insert a resource observed for the first time
    fn add(&self, resource: R);

    /// Upsert a resource (also used for every item seen during a list pass)
    fn update(&self, resource: R);

    /// Remove a resource
    fn delete(&self, resource: &R);

    /// Remove every entry whose key is absent from `keys`, reconciling
    /// deletions missed while no watch was open
    fn retain_all(&self, keys: &HashSet<String>);
}

/// Thread-safe in-memory store keyed by `namespace/name`.
#[derive(Clone)]
pub struct MemoryStore<R> {
    inner: Arc<RwLock<HashMap<String, R>>>,
}

impl<R: WatchedResource> MemoryStore<R> {
    #[must_use]
    pub fn new() -> Self {
        Self {
            inner: Arc::new(RwLock::new(HashMap::new())),
        }
    }

    fn key_of(resource: &R) -> String {
        match resource.namespace() {
            Some(ns) => format!("{}/{}", ns, resource.name()),
            None => resource.name(),
        }
    }

    /// Get a specific resource
    pub fn get(&self, key: &str) -> Option<R> {
        self.inner.read().map_or(None, |map| map.get(key).cloned())
    }

    /// All keys currently mirrored
    pub fn keys(&self) -> Vec<String> {
        self.inner
            .read()
            .map_or_else(|_| Vec::new(), |map| map.keys().cloned().collect())
    }

    pub fn len(&self) -> usize {
        self.inner.read().map_or(0, |map| map.len())
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

impl<R: WatchedResource> Default for MemoryStore<R> {
    fn default() -> Self {
        Self::new()
    }
}

impl<R: WatchedResource> Store<R> for MemoryStore<R> {
    fn get_key(&self, resource: &R) -> String {
        Self::key_of(resource)
    }

    fn add(&self, resource: R) {
        if let Ok(mut map) = self.inner.write() {
            map.insert(Self::key_of(&resource), resource);
        }
    }

    fn update(&self, resource: R) {
        if let Ok(mut map) = self.inner.write() {
            map.insert(Self::key_of(&resource), resource);
        }
    }

    fn delete(&self, resource: &R) {
        if let Ok(mut map) = self.inner.write() {
            map.remove(&Self::key_of(resource));
        }
    }

    fn retain_all(&self, keys: &HashSet<String>) {
        if let Ok(mut map) = self.inner.write() {
            map.retain(|key, _| keys.contains(key));
        }
    }
}
