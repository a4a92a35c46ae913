use parking_lot::Mutex;
use std::{
    collections::{BTreeMap, BTreeSet},
    future::Future,
    path::{Path, PathBuf},
};

use super::{normalize_path, LoaderHost, SourceTree};
use crate::{config::LoaderOptions, error::BridgeError, reference::ReferenceKey};

/// Filesystem-backed host.
///
/// Resolves relative and absolute requests directly, package requests through the alias table
/// and then by walking up from the context through each configured module directory.
#[derive(Debug, Default)]
pub struct FsHost {
    aliases: BTreeMap<String, PathBuf>,
    module_dirs: Vec<String>,
    dependencies: Mutex<BTreeSet<PathBuf>>,
}

impl FsHost {
    pub fn new(options: &LoaderOptions) -> Self {
        FsHost {
            aliases: options.aliases.clone(),
            module_dirs: options.module_dirs.clone(),
            dependencies: Mutex::new(BTreeSet::new()),
        }
    }

    pub fn dependencies(&self) -> Vec<PathBuf> {
        self.dependencies.lock().iter().cloned().collect()
    }

    /// Candidate paths for a request, in priority order.
    fn candidates(&self, context: &Path, request: &str) -> Vec<PathBuf> {
        if request.starts_with("./") || request.starts_with("../") {
            return vec![normalize_path(&context.join(request))];
        }
        if Path::new(request).is_absolute() {
            return vec![normalize_path(Path::new(request))];
        }

        let mut out = Vec::new();
        // Longest alias wins.
        if let Some((alias, dir)) = self
            .aliases
            .iter()
            .filter(|(alias, _)| {
                request == alias.as_str()
                    || request
                        .strip_prefix(alias.as_str())
                        .is_some_and(|rest| rest.starts_with('/'))
            })
            .max_by_key(|(alias, _)| alias.len())
        {
            let rest = request[alias.len()..].trim_start_matches('/');
            out.push(normalize_path(&dir.join(rest)));
        }
        for ancestor in context.ancestors() {
            for module_dir in &self.module_dirs {
                out.push(normalize_path(&ancestor.join(module_dir).join(request)));
            }
        }
        out
    }
}

async fn is_file(path: &Path) -> bool {
    tokio::fs::metadata(path)
        .await
        .map(|m| m.is_file())
        .unwrap_or(false)
}

impl LoaderHost for FsHost {
    fn resolve(
        &self,
        context: &Path,
        request: &str,
    ) -> impl Future<Output = Result<PathBuf, BridgeError>> + Send {
        async move {
            for candidate in self.candidates(context, request) {
                if is_file(&candidate).await {
                    tracing::trace!(
                        "[FsHost] ({}, {}) -> {:?}",
                        context.display(),
                        request,
                        candidate
                    );
                    return Ok(candidate);
                }
            }
            Err(BridgeError::resolve(
                &ReferenceKey::new(context, request),
                format!("Can't resolve '{request}' in '{}'", context.display()),
            ))
        }
    }

    fn read_file(&self, path: &Path) -> impl Future<Output = Result<String, BridgeError>> + Send {
        async move { Ok(tokio::fs::read_to_string(path).await?) }
    }

    fn add_dependency(&self, path: &Path) {
        tracing::debug!("[FsHost] dependency {:?}", path);
        self.dependencies.lock().insert(path.to_path_buf());
    }
}

/// The compiler's native view of the filesystem.
#[derive(Debug, Default, Clone, Copy)]
pub struct FsTree;

impl SourceTree for FsTree {
    fn is_file(&self, path: &Path) -> bool {
        path.is_file()
    }

    fn read_to_string(&self, path: &Path) -> Result<String, BridgeError> {
        Ok(std::fs::read_to_string(path)?)
    }
}
