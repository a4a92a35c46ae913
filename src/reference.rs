//! Reference keys and request canonicalization.
//!
//! A [`ReferenceKey`] is the `(context, request)` identity used by every cache and queue in a
//! compile job. Keys are compared verbatim: `./x` and `x` are different keys, so callers must
//! canonicalize raw import names through [`name_to_request`] before building one.

use once_cell::sync::Lazy;
use regex::Regex;
use serde::{Deserialize, Serialize};
use std::{
    fmt,
    path::{Path, PathBuf},
};

static WINDOWS_ABSOLUTE: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"^(?:[A-Za-z]:[/\\]|\\\\)").expect("static regex"));

static RELATIVE: Lazy<Regex> = Lazy::new(|| Regex::new(r"^\.\.?/").expect("static regex"));

static URL_LIKE: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"^(?:[A-Za-z][A-Za-z0-9+.-]*:|//)").expect("static regex"));

/// A `(context, request)` pair: the directory an import was found in and the host-resolver
/// request it canonicalizes to.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct ReferenceKey {
    pub context: PathBuf,
    pub request: String,
}

impl ReferenceKey {
    pub fn new(context: impl Into<PathBuf>, request: impl Into<String>) -> Self {
        ReferenceKey {
            context: context.into(),
            request: request.into(),
        }
    }

    pub fn matches(&self, context: &Path, request: &str) -> bool {
        self.context == context && self.request == request
    }
}

impl fmt::Display for ReferenceKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "({}, {})", self.context.display(), self.request)
    }
}

/// Convert a raw import name into a host-resolver request.
///
/// - `~pkg/x` becomes the module request `pkg/x`
/// - `./x` and `../x` are kept
/// - absolute names are kept, unless `root` is set and the name starts with `/`, in which case
///   the name is made root-relative (a leading `~` on the root is stripped)
/// - anything else becomes `./x`
pub fn name_to_request(name: &str, root: Option<&str>) -> String {
    if let Some(module) = name.strip_prefix('~') {
        return module.to_string();
    }
    if RELATIVE.is_match(name) || WINDOWS_ABSOLUTE.is_match(name) {
        return name.to_string();
    }
    if name.starts_with('/') {
        return match root {
            Some(root) => {
                let root = root.strip_prefix('~').unwrap_or(root);
                format!("{}{}", root.trim_end_matches('/'), name)
            }
            None => name.to_string(),
        };
    }
    format!("./{name}")
}

/// Names the scanner should never hand to the host resolver: URLs, protocol-relative paths,
/// data URIs, and globs.
pub fn is_unresolvable_name(name: &str) -> bool {
    name.is_empty() || name.contains('*') || (URL_LIKE.is_match(name) && !WINDOWS_ABSOLUTE.is_match(name))
}

#[cfg(test)]
mod tests {
    use super::*;
    use test_log::test;

    #[test]
    fn test_name_to_request() {
        assert_eq!(name_to_request("~pkg/a", None), "pkg/a");
        assert_eq!(name_to_request("./a", None), "./a");
        assert_eq!(name_to_request("../a", None), "../a");
        assert_eq!(name_to_request("a/b", None), "./a/b");
        assert_eq!(name_to_request("/abs/a", None), "/abs/a");
        assert_eq!(name_to_request("/a", Some("/srv/styles/")), "/srv/styles/a");
        assert_eq!(name_to_request("/a", Some("~theme")), "theme/a");
        assert_eq!(name_to_request("C:\\styles\\a", None), "C:\\styles\\a");
    }

    #[test]
    fn test_unresolvable_names() {
        assert!(is_unresolvable_name("http://example.com/a.css"));
        assert!(is_unresolvable_name("//cdn.example.com/a.css"));
        assert!(is_unresolvable_name("data:text/css,a"));
        assert!(is_unresolvable_name("mixins/*"));
        assert!(is_unresolvable_name(""));
        assert!(!is_unresolvable_name("~pkg/a"));
        assert!(!is_unresolvable_name("C:/styles/a"));
        assert!(!is_unresolvable_name("./a"));
    }

    #[test]
    fn test_keys_are_not_normalized() {
        let a = ReferenceKey::new("/s", "./x");
        let b = ReferenceKey::new("/s", "x");
        assert_ne!(a, b);
        assert!(a.matches(Path::new("/s"), "./x"));
        assert_eq!(a.to_string(), "(/s, ./x)");
    }
}
