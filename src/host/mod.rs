//! Interfaces to the two worlds this crate bridges.
//!
//! [`LoaderHost`] is the build system: it owns the asynchronous module resolver, file reads and
//! dependency tracking. [`SourceTree`] is the synchronous view of the filesystem the compiler
//! searches natively while it renders.
//!
//! Two implementations ship with the crate: [`MemoryHost`] keeps everything in memory and
//! records every call (tests, embedding), and [`FsHost`]/[`FsTree`] work against the real
//! filesystem (the CLI).

use std::{
    future::Future,
    path::{Component, Path, PathBuf},
};

use crate::error::BridgeError;

pub mod fs;
pub mod memory;

pub use fs::{FsHost, FsTree};
pub use memory::MemoryHost;

/// The build system hosting a compile job.
pub trait LoaderHost: Sync {
    /// Resolve `request` as seen from the directory `context`.
    fn resolve(
        &self,
        context: &Path,
        request: &str,
    ) -> impl Future<Output = Result<PathBuf, BridgeError>> + Send;

    fn read_file(&self, path: &Path) -> impl Future<Output = Result<String, BridgeError>> + Send;

    /// Register `path` as a build dependency of the current job's output.
    fn add_dependency(&self, path: &Path);
}

/// Synchronous filesystem view used by the compiler's own lookup.
pub trait SourceTree {
    fn is_file(&self, path: &Path) -> bool;

    fn read_to_string(&self, path: &Path) -> Result<String, BridgeError>;
}

impl<T: SourceTree + ?Sized> SourceTree for &T {
    fn is_file(&self, path: &Path) -> bool {
        (**self).is_file(path)
    }

    fn read_to_string(&self, path: &Path) -> Result<String, BridgeError> {
        (**self).read_to_string(path)
    }
}

/// Lexically normalize a path: drop `.` components and fold `..` into their parent.
pub fn normalize_path(path: &Path) -> PathBuf {
    let mut out = PathBuf::new();
    for component in path.components() {
        match component {
            Component::CurDir => {}
            Component::ParentDir => match out.components().next_back() {
                Some(Component::Normal(_)) => {
                    out.pop();
                }
                Some(Component::RootDir) | Some(Component::Prefix(_)) => {}
                _ => out.push(component),
            },
            other => out.push(other),
        }
    }
    out
}
