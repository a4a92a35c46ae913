//! Shared test utilities

use crate::host::MemoryHost;

/// Initialize logging for tests
pub fn init_logging() {
    tracing_subscriber::fmt()
        .with_env_filter(tracing_subscriber::EnvFilter::from_default_env())
        .with_test_writer()
        .try_init()
        .ok();
}

/// A small project: an entry importing a local partial and a package, where the package pulls
/// in its own index and a shared mixin file.
///
/// ```text
/// /app/main.styl          -> ./partials/header, ~ui/button
/// /app/partials/header.styl
/// /app/node_modules/ui/button.styl -> ./mixins
/// /app/node_modules/ui/mixins/index.styl
/// ```
pub fn create_test_project() -> (MemoryHost, &'static str) {
    init_logging();
    let host = MemoryHost::new()
        .with_module_dir("/app/node_modules")
        .with_file("/app/partials/header.styl", ".header\n  height 40px\n")
        .with_file(
            "/app/node_modules/ui/button.styl",
            "@import 'mixins'\n.button\n  rounded()\n",
        )
        .with_file("/app/node_modules/ui/mixins/index.styl", "rounded()\n  border-radius 4px\n");
    let entry = "@import 'partials/header'\n@import '~ui/button'\nbody\n  margin 0\n";
    (host, entry)
}
