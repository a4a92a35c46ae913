//! Per-job resolution cache.

use std::{
    collections::HashMap,
    path::{Path, PathBuf},
};

use crate::reference::ReferenceKey;

/// Mapping `context -> (request -> resolved path)`.
///
/// Once a key holds a value every later lookup returns it without consulting the host. Entries
/// are never evicted; the cache lives and dies with its compile job.
#[derive(Debug, Default, Clone)]
pub struct ResolutionCache {
    entries: HashMap<PathBuf, HashMap<String, PathBuf>>,
}

impl ResolutionCache {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn lookup(&self, context: &Path, request: &str) -> Option<&Path> {
        self.entries
            .get(context)
            .and_then(|requests| requests.get(request))
            .map(PathBuf::as_path)
    }

    pub fn lookup_key(&self, key: &ReferenceKey) -> Option<&Path> {
        self.lookup(&key.context, &key.request)
    }

    pub fn contains(&self, context: &Path, request: &str) -> bool {
        self.lookup(context, request).is_some()
    }

    /// Store a resolution. Storing the same value twice is a no-op. Storing a different value
    /// overwrites the entry and is logged as an error: two resolutions for one key means the
    /// request canonicalization upstream is broken.
    pub fn store(&mut self, context: &Path, request: &str, resolved: &Path) {
        let requests = self.entries.entry(context.to_path_buf()).or_default();
        match requests.get(request) {
            Some(existing) if existing == resolved => {}
            Some(existing) => {
                tracing::error!(
                    "[ResolutionCache] ({}, {}) already resolved to {:?}, overwriting with {:?}",
                    context.display(),
                    request,
                    existing,
                    resolved
                );
                requests.insert(request.to_string(), resolved.to_path_buf());
            }
            None => {
                requests.insert(request.to_string(), resolved.to_path_buf());
            }
        }
    }

    pub fn len(&self) -> usize {
        self.entries.values().map(HashMap::len).sum()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use test_log::test;

    #[test]
    fn test_cache_imports() {
        let mut cache = ResolutionCache::new();
        assert!(cache.lookup(Path::new("x"), "y").is_none());
        cache.store(Path::new("x"), "y", Path::new("foo"));
        assert_eq!(cache.lookup(Path::new("x"), "y"), Some(Path::new("foo")));
        assert!(cache.lookup(Path::new("x"), "z").is_none());
        cache.store(Path::new("x"), "z", Path::new("bar"));
        assert_eq!(cache.lookup(Path::new("x"), "y"), Some(Path::new("foo")));
        assert_eq!(cache.lookup(Path::new("x"), "z"), Some(Path::new("bar")));
        assert_eq!(cache.len(), 2);
    }

    #[test]
    fn test_store_is_idempotent() {
        let mut cache = ResolutionCache::new();
        cache.store(Path::new("/a"), "./b", Path::new("/a/b.styl"));
        cache.store(Path::new("/a"), "./b", Path::new("/a/b.styl"));
        assert_eq!(cache.len(), 1);
        let key = ReferenceKey::new("/a", "./b");
        assert_eq!(cache.lookup_key(&key), Some(Path::new("/a/b.styl")));
    }

    #[test]
    fn test_contexts_are_independent() {
        let mut cache = ResolutionCache::new();
        cache.store(Path::new("/a"), "./b", Path::new("/a/b.styl"));
        assert!(cache.contains(Path::new("/a"), "./b"));
        assert!(!cache.contains(Path::new("/c"), "./b"));
    }
}
