//! The boundary between a compile job and the synchronous document compiler.
//!
//! A render is one opaque, blocking pass over the entry document. Imports the compiler cannot
//! locate on its own surface as [`RenderOutcome::NeedsResolution`] rather than as an error, so
//! the job can resolve them asynchronously and render again. The compiler reaches the
//! filesystem only through the [`ImportLookup`] it is handed for the duration of one call.

use std::path::{Path, PathBuf};

use crate::{config::LoaderOptions, error::BridgeError, reference::ReferenceKey};

pub mod inline;
pub mod lookup;

pub use inline::InlineRenderer;
pub use lookup::CachedLookup;

/// An import the compiler could not locate and that only the host resolver can satisfy.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PendingImport {
    pub key: ReferenceKey,
    /// The import name as the compiler saw it.
    pub name: String,
    /// The document containing the import.
    pub importer: PathBuf,
}

#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct RenderOutput {
    pub css: String,
    /// Serialized source map, when requested.
    pub source_map: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum RenderOutcome {
    Rendered(RenderOutput),
    NeedsResolution(PendingImport),
}

/// The compiler's two pluggable import lookups, plus source reads.
///
/// `find` locates a file named by an import path (extension already applied). `lookup_index`
/// locates a directory-style import. Both search `paths` last-to-first and skip `ignore` (the
/// importing document).
pub trait ImportLookup {
    fn find(
        &mut self,
        path: &str,
        paths: &[PathBuf],
        ignore: Option<&Path>,
    ) -> Result<Option<Vec<PathBuf>>, PendingImport>;

    fn lookup_index(
        &mut self,
        name: &str,
        paths: &[PathBuf],
        ignore: Option<&Path>,
    ) -> Result<Option<Vec<PathBuf>>, PendingImport>;

    fn read_source(&mut self, path: &Path) -> Result<String, BridgeError>;
}

/// A synchronous document compiler.
pub trait DocumentRenderer {
    /// Render `source` (the text of `filename`) from scratch.
    ///
    /// Returns `Err` only for genuine compile failures, which are never retried.
    fn render(
        &mut self,
        source: &str,
        filename: &Path,
        options: &LoaderOptions,
        lookup: &mut dyn ImportLookup,
    ) -> Result<RenderOutcome, BridgeError>;
}
