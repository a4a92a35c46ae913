//! Shared test utilities for integration tests.
//!
//! Import from integration test files as:
//! ```ignore
//! mod common;
//! ```

use std::path::{Path, PathBuf};
use tempfile::TempDir;

/// Initialize tracing for tests, respecting RUST_LOG env var.
///
/// Safe to call multiple times; subsequent calls are no-ops.
#[allow(dead_code)]
pub fn init_logging() {
    tracing_subscriber::fmt()
        .with_env_filter(tracing_subscriber::EnvFilter::from_default_env())
        .with_test_writer()
        .try_init()
        .ok();
}

#[allow(dead_code)]
pub fn write_file(root: &Path, relative: &str, text: &str) -> PathBuf {
    let path = root.join(relative);
    if let Some(parent) = path.parent() {
        std::fs::create_dir_all(parent).unwrap();
    }
    std::fs::write(&path, text).unwrap();
    path
}

/// Create a project directory with an entry document, a local partial, a themed package under
/// `node_modules` and an aliased shared directory.
///
/// ```text
/// <temp>/project/styles/main.styl
/// <temp>/project/styles/partials/reset.styl
/// <temp>/project/node_modules/theme/index.styl
/// <temp>/project/node_modules/theme/colors.styl
/// <temp>/shared/tokens.styl
/// ```
///
/// Returns the project directory.
#[allow(dead_code)]
pub fn create_test_project(temp_dir: &TempDir) -> PathBuf {
    let root = temp_dir.path().join("project");
    write_file(
        &root,
        "styles/main.styl",
        "@import 'partials/reset'\n@import '~theme'\n@import '~tokens/tokens'\n.page\n  color primary\n",
    );
    write_file(&root, "styles/partials/reset.styl", "*\n  margin 0\n");
    write_file(&root, "node_modules/theme/index.styl", "@import 'colors'\n");
    write_file(&root, "node_modules/theme/colors.styl", "primary = #333\n");
    write_file(temp_dir.path(), "shared/tokens.styl", "spacing = 4px\n");
    root
}
