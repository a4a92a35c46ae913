use parking_lot::Mutex;
use std::{
    collections::{BTreeMap, HashMap},
    future::Future,
    path::{Path, PathBuf},
};

use super::{normalize_path, LoaderHost, SourceTree};
use crate::{error::BridgeError, reference::ReferenceKey};

/// Everything a [`MemoryHost`] was asked to do.
#[derive(Debug, Default, Clone)]
pub struct HostLog {
    pub resolve_calls: Vec<ReferenceKey>,
    pub reads: BTreeMap<PathBuf, usize>,
    pub dependencies: Vec<PathBuf>,
}

/// An in-memory build host.
///
/// Requests resolve through, in order: explicit routes, relative/absolute paths against the
/// stored files, then each module directory. Every call is logged so callers can assert on how
/// often the resolver and file reads were hit.
#[derive(Debug, Default)]
pub struct MemoryHost {
    files: BTreeMap<PathBuf, String>,
    routes: HashMap<ReferenceKey, PathBuf>,
    module_dirs: Vec<PathBuf>,
    log: Mutex<HostLog>,
}

impl MemoryHost {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_file(mut self, path: impl Into<PathBuf>, text: impl Into<String>) -> Self {
        self.insert_file(path, text);
        self
    }

    pub fn insert_file(&mut self, path: impl Into<PathBuf>, text: impl Into<String>) {
        self.files
            .insert(normalize_path(&path.into()), text.into());
    }

    /// Resolve `(context, request)` to `target` regardless of what files exist.
    pub fn with_route(
        mut self,
        context: impl Into<PathBuf>,
        request: impl Into<String>,
        target: impl Into<PathBuf>,
    ) -> Self {
        self.routes
            .insert(ReferenceKey::new(context, request), target.into());
        self
    }

    /// Search `dir` for package-style requests.
    pub fn with_module_dir(mut self, dir: impl Into<PathBuf>) -> Self {
        self.module_dirs.push(dir.into());
        self
    }

    pub fn log(&self) -> HostLog {
        self.log.lock().clone()
    }

    pub fn resolve_count(&self, context: &Path, request: &str) -> usize {
        self.log
            .lock()
            .resolve_calls
            .iter()
            .filter(|key| key.matches(context, request))
            .count()
    }

    pub fn read_count(&self, path: &Path) -> usize {
        self.log.lock().reads.get(path).copied().unwrap_or(0)
    }

    pub fn dependencies(&self) -> Vec<PathBuf> {
        self.log.lock().dependencies.clone()
    }

    fn resolve_now(&self, context: &Path, request: &str) -> Result<PathBuf, BridgeError> {
        let key = ReferenceKey::new(context, request);
        self.log.lock().resolve_calls.push(key.clone());

        if let Some(target) = self.routes.get(&key) {
            return Ok(target.clone());
        }
        let is_relative = request.starts_with("./") || request.starts_with("../");
        let candidates: Vec<PathBuf> = if is_relative {
            vec![normalize_path(&context.join(request))]
        } else if Path::new(request).is_absolute() {
            vec![normalize_path(Path::new(request))]
        } else {
            self.module_dirs
                .iter()
                .map(|dir| normalize_path(&dir.join(request)))
                .collect()
        };
        candidates
            .into_iter()
            .find(|candidate| self.files.contains_key(candidate))
            .ok_or_else(|| {
                BridgeError::resolve(
                    &key,
                    format!("Can't resolve '{request}' in '{}'", context.display()),
                )
            })
    }

    fn read_now(&self, path: &Path) -> Result<String, BridgeError> {
        let path = normalize_path(path);
        *self.log.lock().reads.entry(path.clone()).or_default() += 1;
        self.files
            .get(&path)
            .cloned()
            .ok_or_else(|| BridgeError::NotFound(format!("{}", path.display())))
    }
}

impl LoaderHost for MemoryHost {
    fn resolve(
        &self,
        context: &Path,
        request: &str,
    ) -> impl Future<Output = Result<PathBuf, BridgeError>> + Send {
        async move {
            tokio::task::yield_now().await;
            self.resolve_now(context, request)
        }
    }

    fn read_file(&self, path: &Path) -> impl Future<Output = Result<String, BridgeError>> + Send {
        async move {
            tokio::task::yield_now().await;
            self.read_now(path)
        }
    }

    fn add_dependency(&self, path: &Path) {
        self.log.lock().dependencies.push(path.to_path_buf());
    }
}

impl SourceTree for MemoryHost {
    fn is_file(&self, path: &Path) -> bool {
        self.files.contains_key(&normalize_path(path))
    }

    fn read_to_string(&self, path: &Path) -> Result<String, BridgeError> {
        self.files
            .get(&normalize_path(path))
            .cloned()
            .ok_or_else(|| BridgeError::NotFound(format!("{}", path.display())))
    }
}
