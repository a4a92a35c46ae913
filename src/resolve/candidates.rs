//! The compiler's filename inference, expressed as host-resolver requests.

use crate::config::DialectConfig;

/// Requests to try, in order, for one import request.
///
/// A request that already names a literal stylesheet or a dialect file is tried as-is.
/// Otherwise the dialect extension is appended, then the request is treated as a directory
/// holding an index file.
pub fn candidate_requests(request: &str, dialect: &DialectConfig) -> Vec<String> {
    if dialect.is_literal_request(request) {
        vec![request.to_string()]
    } else {
        vec![dialect.with_extension(request), dialect.index_request(request)]
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use test_log::test;

    #[test]
    fn test_candidate_requests() {
        let dialect = DialectConfig::default();
        assert_eq!(
            candidate_requests("y", &dialect),
            vec!["y.styl".to_string(), "y/index.styl".to_string()]
        );
        assert_eq!(
            candidate_requests("./pkg/z", &dialect),
            vec!["./pkg/z.styl".to_string(), "./pkg/z/index.styl".to_string()]
        );
        assert_eq!(candidate_requests("a.styl", &dialect), vec!["a.styl".to_string()]);
        assert_eq!(candidate_requests("reset.css", &dialect), vec!["reset.css".to_string()]);
    }

    #[test]
    fn test_custom_dialect() {
        let dialect = DialectConfig {
            extension: "stylus".to_string(),
            index_file: "main".to_string(),
            ..DialectConfig::default()
        };
        assert_eq!(
            candidate_requests("theme", &dialect),
            vec!["theme.stylus".to_string(), "theme/main.stylus".to_string()]
        );
    }
}
