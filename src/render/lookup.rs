use std::{
    collections::BTreeSet,
    path::{Path, PathBuf},
};

use super::{ImportLookup, PendingImport};
use crate::{
    cache::ResolutionCache,
    config::LoaderOptions,
    error::BridgeError,
    host::{normalize_path, SourceTree},
    reference::ReferenceKey,
};

/// Import lookup that backs the compiler's native filesystem search with the job's
/// [`ResolutionCache`].
///
/// Host references (names carrying the dialect's host prefix) are answered from the cache. A
/// host reference that neither the cache nor the native search can locate is reported as a
/// [`PendingImport`] from [`ImportLookup::lookup_index`], the compiler's last resort.
pub struct CachedLookup<'a, T: SourceTree> {
    tree: T,
    cache: &'a ResolutionCache,
    options: &'a LoaderOptions,
    found: BTreeSet<PathBuf>,
}

impl<'a, T: SourceTree> CachedLookup<'a, T> {
    pub fn new(tree: T, cache: &'a ResolutionCache, options: &'a LoaderOptions) -> Self {
        CachedLookup {
            tree,
            cache,
            options,
            found: BTreeSet::new(),
        }
    }

    /// Every file either lookup returned so far.
    pub fn found(&self) -> &BTreeSet<PathBuf> {
        &self.found
    }

    pub fn into_found(self) -> BTreeSet<PathBuf> {
        self.found
    }

    fn native_find(&self, path: &str, paths: &[PathBuf], ignore: Option<&Path>) -> Option<PathBuf> {
        let candidate = Path::new(path);
        if candidate.is_absolute() {
            let candidate = normalize_path(candidate);
            return self.tree.is_file(&candidate).then_some(candidate);
        }
        paths
            .iter()
            .rev()
            .map(|dir| normalize_path(&dir.join(path)))
            .filter(|lookup| Some(lookup.as_path()) != ignore)
            .find(|lookup| self.tree.is_file(lookup))
    }

    fn native_index(&self, name: &str, paths: &[PathBuf], ignore: Option<&Path>) -> Option<PathBuf> {
        let dialect = &self.options.dialect;
        let trimmed = name.trim_end_matches('/');
        let stem = Path::new(trimmed)
            .file_stem()
            .and_then(|s| s.to_str())
            .unwrap_or(trimmed);
        let index_candidates = [
            dialect.index_request(trimmed),
            format!("{trimmed}/{stem}.{}", dialect.extension),
        ];
        if let Some(found) = index_candidates
            .iter()
            .find_map(|candidate| self.native_find(candidate, paths, ignore))
        {
            return Some(found);
        }
        if dialect.is_dialect_file(Path::new(trimmed)) {
            return None;
        }
        self.options.module_dirs.iter().find_map(|module_dir| {
            index_candidates
                .iter()
                .find_map(|candidate| self.native_find(&format!("{module_dir}/{candidate}"), paths, ignore))
        })
    }

    fn host_key(&self, name: &str, paths: &[PathBuf], ignore: Option<&Path>) -> Option<ReferenceKey> {
        if !self.options.dialect.is_host_reference(name) {
            return None;
        }
        let context = paths
            .last()
            .cloned()
            .or_else(|| ignore.and_then(Path::parent).map(Path::to_path_buf))
            .unwrap_or_default();
        Some(ReferenceKey::new(context, self.options.request_for(name)))
    }

    fn record(&mut self, path: PathBuf) -> Option<Vec<PathBuf>> {
        self.found.insert(path.clone());
        Some(vec![path])
    }
}

impl<T: SourceTree> ImportLookup for CachedLookup<'_, T> {
    fn find(
        &mut self,
        path: &str,
        paths: &[PathBuf],
        ignore: Option<&Path>,
    ) -> Result<Option<Vec<PathBuf>>, PendingImport> {
        if let Some(found) = self.native_find(path, paths, ignore) {
            return Ok(self.record(found));
        }
        let cached = self
            .host_key(path, paths, ignore)
            .and_then(|key| self.cache.lookup_key(&key).map(Path::to_path_buf));
        Ok(match cached {
            Some(resolved) => self.record(resolved),
            None => None,
        })
    }

    fn lookup_index(
        &mut self,
        name: &str,
        paths: &[PathBuf],
        ignore: Option<&Path>,
    ) -> Result<Option<Vec<PathBuf>>, PendingImport> {
        let key = self.host_key(name, paths, ignore);
        if let Some(resolved) = key
            .as_ref()
            .and_then(|key| self.cache.lookup_key(key).map(Path::to_path_buf))
        {
            return Ok(self.record(resolved));
        }
        if let Some(found) = self.native_index(name, paths, ignore) {
            return Ok(self.record(found));
        }
        match key {
            Some(key) => {
                tracing::debug!("[CachedLookup] {} is not resolved yet as {}", name, key);
                Err(PendingImport {
                    key,
                    name: name.to_string(),
                    importer: ignore.map(Path::to_path_buf).unwrap_or_default(),
                })
            }
            None => Ok(None),
        }
    }

    fn read_source(&mut self, path: &Path) -> Result<String, BridgeError> {
        self.tree.read_to_string(path)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::host::MemoryHost;
    use test_log::test;

    fn dirs(paths: &[&str]) -> Vec<PathBuf> {
        paths.iter().map(PathBuf::from).collect()
    }

    #[test]
    fn test_find_searches_paths_last_to_first() {
        let tree = MemoryHost::new()
            .with_file("/lib/a.styl", "")
            .with_file("/app/a.styl", "")
            .with_file("/app/b.styl", "");
        let cache = ResolutionCache::new();
        let options = LoaderOptions::default();
        let mut lookup = CachedLookup::new(&tree, &cache, &options);
        let paths = dirs(&["/lib", "/app"]);

        assert_eq!(
            lookup.find("a.styl", &paths, None),
            Ok(Some(vec![PathBuf::from("/app/a.styl")]))
        );
        assert_eq!(
            lookup.find("a.styl", &paths, Some(Path::new("/app/a.styl"))),
            Ok(Some(vec![PathBuf::from("/lib/a.styl")]))
        );
        assert_eq!(
            lookup.find("/app/b.styl", &[], None),
            Ok(Some(vec![PathBuf::from("/app/b.styl")]))
        );
        assert_eq!(lookup.find("c.styl", &paths, None), Ok(None));
        assert_eq!(lookup.found().len(), 3);
    }

    #[test]
    fn test_lookup_index_native_search() {
        let tree = MemoryHost::new()
            .with_file("/app/grid/index.styl", "")
            .with_file("/app/buttons/buttons.styl", "")
            .with_file("/app/node_modules/nib/index.styl", "");
        let cache = ResolutionCache::new();
        let options = LoaderOptions::default();
        let mut lookup = CachedLookup::new(&tree, &cache, &options);
        let paths = dirs(&["/app"]);

        assert_eq!(
            lookup.lookup_index("grid", &paths, None),
            Ok(Some(vec![PathBuf::from("/app/grid/index.styl")]))
        );
        assert_eq!(
            lookup.lookup_index("buttons", &paths, None),
            Ok(Some(vec![PathBuf::from("/app/buttons/buttons.styl")]))
        );
        assert_eq!(
            lookup.lookup_index("nib", &paths, None),
            Ok(Some(vec![PathBuf::from("/app/node_modules/nib/index.styl")]))
        );
        assert_eq!(lookup.lookup_index("missing", &paths, None), Ok(None));
    }

    #[test]
    fn test_host_references_consult_cache_or_raise() {
        let tree = MemoryHost::new();
        let mut cache = ResolutionCache::new();
        cache.store(Path::new("/app"), "pkg/a.styl", Path::new("/modules/pkg/a.styl"));
        cache.store(Path::new("/app"), "pkg/b", Path::new("/modules/pkg/b/index.styl"));
        let options = LoaderOptions::default();
        let mut lookup = CachedLookup::new(&tree, &cache, &options);
        let paths = dirs(&["/styles", "/app"]);
        let importer = Path::new("/app/main.styl");

        assert_eq!(
            lookup.find("~pkg/a.styl", &paths, Some(importer)),
            Ok(Some(vec![PathBuf::from("/modules/pkg/a.styl")]))
        );
        // find never raises; the compiler falls back to lookup_index.
        assert_eq!(lookup.find("~pkg/b.styl", &paths, Some(importer)), Ok(None));
        assert_eq!(
            lookup.lookup_index("~pkg/b", &paths, Some(importer)),
            Ok(Some(vec![PathBuf::from("/modules/pkg/b/index.styl")]))
        );
        assert_eq!(
            lookup.lookup_index("~pkg/c", &paths, Some(importer)),
            Err(PendingImport {
                key: ReferenceKey::new("/app", "pkg/c"),
                name: "~pkg/c".to_string(),
                importer: importer.to_path_buf(),
            })
        );
        assert_eq!(
            lookup.into_found().into_iter().collect::<Vec<_>>(),
            vec![
                PathBuf::from("/modules/pkg/a.styl"),
                PathBuf::from("/modules/pkg/b/index.styl"),
            ]
        );
    }

    #[test]
    fn test_context_falls_back_to_importer_directory() {
        let tree = MemoryHost::new();
        let cache = ResolutionCache::new();
        let options = LoaderOptions::default();
        let mut lookup = CachedLookup::new(&tree, &cache, &options);
        let err = lookup
            .lookup_index("~pkg/a", &[], Some(Path::new("/app/x/main.styl")))
            .unwrap_err();
        assert_eq!(err.key, ReferenceKey::new("/app/x", "pkg/a"));
    }
}
