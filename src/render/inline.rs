//! A minimal renderer for the dialect: imports are inlined, everything else passes through.
//!
//! Each `@import`/`@require` statement is replaced by the located document, indented to the
//! statement's line plus one level per brace opened before it on that line. Other text sharing
//! a line with a statement is kept on a line of its own. `@require` includes a file at most once
//! per render. Plain stylesheet and `url(...)` imports are emitted as CSS `@import` rules. Import
//! paths are evaluated against the `define` table and assignments earlier in the document; a
//! path that cannot be evaluated is a compile error, as is an import cycle.

use serde::Serialize;
use sha2::{Digest, Sha256};
use std::{
    collections::{HashMap, HashSet},
    ops::Range,
    path::{Path, PathBuf},
    sync::Arc,
};

use super::{DocumentRenderer, ImportLookup, PendingImport, RenderOutcome, RenderOutput};
use crate::{
    config::LoaderOptions,
    error::BridgeError,
    reference::is_unresolvable_name,
    scan::{import_statements, parse, Expr, ImportKind, ImportStatement, Node, ScanError},
};

/// Parsed documents keyed by the SHA-256 of their text.
#[derive(Debug, Default)]
struct ParseCache {
    documents: HashMap<String, Arc<Node>>,
    parses: usize,
}

impl ParseCache {
    fn parse(&mut self, source: &str) -> Result<Arc<Node>, ScanError> {
        let digest = hex::encode(Sha256::digest(source.as_bytes()));
        if let Some(root) = self.documents.get(&digest) {
            return Ok(root.clone());
        }
        let root = Arc::new(parse(source)?);
        self.parses += 1;
        self.documents.insert(digest, root.clone());
        Ok(root)
    }
}

#[derive(Debug, Default)]
pub struct InlineRenderer {
    cache: ParseCache,
}

impl InlineRenderer {
    pub fn new() -> Self {
        Self::default()
    }

    /// How many distinct document texts have been parsed over the renderer's lifetime.
    pub fn parse_count(&self) -> usize {
        self.cache.parses
    }
}

impl DocumentRenderer for InlineRenderer {
    fn render(
        &mut self,
        source: &str,
        filename: &Path,
        options: &LoaderOptions,
        lookup: &mut dyn ImportLookup,
    ) -> Result<RenderOutcome, BridgeError> {
        let mut pass = Pass {
            options,
            lookup,
            cache: &mut self.cache,
            stack: Vec::new(),
            included: HashSet::new(),
            lines: Vec::new(),
            sources: Vec::new(),
            mappings: Vec::new(),
        };
        match pass.document(filename, source, "") {
            Ok(()) => Ok(RenderOutcome::Rendered(pass.finish(filename)?)),
            Err(Halt::Pending(pending)) => Ok(RenderOutcome::NeedsResolution(pending)),
            Err(Halt::Failed(e)) => Err(e),
        }
    }
}

/// Why a render pass stopped early.
enum Halt {
    Pending(PendingImport),
    Failed(BridgeError),
}

impl From<PendingImport> for Halt {
    fn from(pending: PendingImport) -> Self {
        Halt::Pending(pending)
    }
}

impl From<BridgeError> for Halt {
    fn from(e: BridgeError) -> Self {
        Halt::Failed(e)
    }
}

#[derive(Serialize)]
struct LineMap<'a> {
    version: u8,
    file: String,
    sources: Vec<String>,
    /// `[output line, source index, source line]`, all 0-based.
    mappings: &'a [[usize; 3]],
}

/// State of one render call.
struct Pass<'a> {
    options: &'a LoaderOptions,
    lookup: &'a mut dyn ImportLookup,
    cache: &'a mut ParseCache,
    stack: Vec<PathBuf>,
    included: HashSet<PathBuf>,
    lines: Vec<String>,
    sources: Vec<PathBuf>,
    mappings: Vec<[usize; 3]>,
}

impl Pass<'_> {
    fn document(&mut self, filename: &Path, source: &str, indent: &str) -> Result<(), Halt> {
        let root = self
            .cache
            .parse(source)
            .map_err(|e| BridgeError::Compile(format!("{}: {e}", filename.display())))?;
        let mut statements = import_statements(&root, &self.options.define);
        statements.sort_by_key(|statement| statement.span.start);
        let mut pending = statements.iter().peekable();

        let source_index = self.source_index(filename);
        self.stack.push(filename.to_path_buf());
        // Everything before `cursor` belongs to a statement already spliced.
        let mut cursor = 0;
        for (line_no, range) in line_ranges(source).enumerate() {
            let text = &source[range.clone()];
            let continued = cursor > range.start;
            let has_statement = pending
                .peek()
                .is_some_and(|statement| statement.span.start < range.end);
            if !continued && !has_statement {
                self.emit(indent, text, source_index, line_no);
                continue;
            }

            let leading = &text[..text.len() - text.trim_start().len()];
            let base = format!("{indent}{leading}");
            let mut pos = cursor.clamp(range.start, range.end);
            let mut open = 0;
            while let Some(statement) = pending.next_if(|s| s.span.start < range.end) {
                let before = &source[pos..statement.span.start];
                open = self.fragment(&base, before, open, source_index, line_no);
                let nested = format!("{base}{}", "  ".repeat(open));
                self.import(filename, statement, &nested)?;
                pos = statement.span.end;
            }
            if pos < range.end {
                self.fragment(&base, &source[pos..range.end], open, source_index, line_no);
            }
            cursor = cursor.max(pos);
        }
        self.stack.pop();
        Ok(())
    }

    fn import(&mut self, importer: &Path, statement: &ImportStatement, indent: &str) -> Result<(), Halt> {
        for (expr, name) in statement.exprs.iter().zip(&statement.names) {
            if let Expr::Call { name: function, args } = expr {
                if function == "url" {
                    let target = match args.first() {
                        Some(Expr::Literal(target)) => target.as_str(),
                        _ => "",
                    };
                    self.push_line(format!("{indent}@import url(\"{target}\");"));
                    continue;
                }
            }
            let Some(name) = name else {
                return Err(BridgeError::Compile(format!(
                    "{}:{}: @import path is not statically known",
                    importer.display(),
                    statement.line + 1
                ))
                .into());
            };
            if self.options.dialect.is_plain_stylesheet(name) || is_unresolvable_name(name) {
                self.push_line(format!("{indent}@import \"{name}\";"));
                continue;
            }
            self.include(importer, statement.kind, name, indent)?;
        }
        Ok(())
    }

    fn include(&mut self, importer: &Path, kind: ImportKind, name: &str, indent: &str) -> Result<(), Halt> {
        let options = self.options;
        let dialect = &options.dialect;
        let path = if dialect.is_dialect_file(Path::new(name)) {
            name.to_string()
        } else {
            dialect.with_extension(name)
        };
        let mut paths = options.paths.clone();
        if let Some(dir) = importer.parent() {
            paths.push(dir.to_path_buf());
        }

        let found = match self.lookup.find(&path, &paths, Some(importer))? {
            Some(found) => found,
            None => self
                .lookup
                .lookup_index(name, &paths, Some(importer))?
                .ok_or_else(|| {
                    BridgeError::Compile(format!(
                        "failed to locate @import file {path} (imported from {})",
                        importer.display()
                    ))
                })?,
        };

        for file in found {
            if kind == ImportKind::Require && self.included.contains(&file) {
                continue;
            }
            if self.stack.contains(&file) {
                return Err(BridgeError::Compile(format!(
                    "import loop has been found: {} imports {}",
                    importer.display(),
                    file.display()
                ))
                .into());
            }
            self.included.insert(file.clone());
            let text = self.lookup.read_source(&file)?;
            self.document(&file, &text, indent)?;
        }
        Ok(())
    }

    fn source_index(&mut self, filename: &Path) -> usize {
        match self.sources.iter().position(|s| s == filename) {
            Some(index) => index,
            None => {
                self.sources.push(filename.to_path_buf());
                self.sources.len() - 1
            }
        }
    }

    fn emit(&mut self, indent: &str, line: &str, source_index: usize, line_no: usize) {
        self.mappings.push([self.lines.len(), source_index, line_no]);
        if line.trim().is_empty() {
            self.lines.push(String::new());
        } else {
            self.lines.push(format!("{indent}{line}"));
        }
    }

    /// Emit text that shares a line with a statement, at `open` levels below `base`.
    ///
    /// Returns the braces still open after it.
    fn fragment(
        &mut self,
        base: &str,
        text: &str,
        open: usize,
        source_index: usize,
        line_no: usize,
    ) -> usize {
        let text = text.trim();
        if text.is_empty() {
            return open;
        }
        let closers = text.len() - text.trim_start_matches('}').len();
        let level = open.saturating_sub(closers);
        self.mappings.push([self.lines.len(), source_index, line_no]);
        self.lines.push(format!("{base}{}{text}", "  ".repeat(level)));
        (open + text.matches('{').count()).saturating_sub(text.matches('}').count())
    }

    fn push_line(&mut self, line: String) {
        self.lines.push(line);
    }

    fn finish(self, filename: &Path) -> Result<RenderOutput, BridgeError> {
        let mut css = self.lines.join("\n");
        if !css.is_empty() {
            css.push('\n');
        }
        let source_map = if self.options.source_map {
            let map = LineMap {
                version: 3,
                file: filename.display().to_string(),
                sources: self
                    .sources
                    .iter()
                    .map(|s| s.display().to_string())
                    .collect(),
                mappings: &self.mappings,
            };
            Some(serde_json::to_string(&map)?)
        } else {
            None
        };
        Ok(RenderOutput { css, source_map })
    }
}

/// Byte range of each line, without its line break.
fn line_ranges(source: &str) -> impl Iterator<Item = Range<usize>> + '_ {
    let mut start = 0;
    source.split_inclusive('\n').map(move |chunk| {
        let begin = start;
        start += chunk.len();
        let body = chunk.strip_suffix('\n').unwrap_or(chunk);
        let body = body.strip_suffix('\r').unwrap_or(body);
        begin..begin + body.len()
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::{cache::ResolutionCache, host::MemoryHost, reference::ReferenceKey, render::CachedLookup};
    use test_log::test;

    fn render_with(
        renderer: &mut InlineRenderer,
        tree: &MemoryHost,
        cache: &ResolutionCache,
        options: &LoaderOptions,
        filename: &str,
        source: &str,
    ) -> Result<RenderOutcome, BridgeError> {
        let mut lookup = CachedLookup::new(tree, cache, options);
        renderer.render(source, Path::new(filename), options, &mut lookup)
    }

    fn css(outcome: Result<RenderOutcome, BridgeError>) -> String {
        match outcome {
            Ok(RenderOutcome::Rendered(output)) => output.css,
            other => panic!("expected a rendered document, got {other:?}"),
        }
    }

    #[test]
    fn test_inlines_nested_imports_with_indentation() {
        let tree = MemoryHost::new()
            .with_file("/app/buttons.styl", "@import 'colors'\n.button\n  color brand\n")
            .with_file("/app/colors.styl", "brand = red\n");
        let cache = ResolutionCache::new();
        let options = LoaderOptions::default();
        let mut renderer = InlineRenderer::new();
        let out = css(render_with(
            &mut renderer,
            &tree,
            &cache,
            &options,
            "/app/main.styl",
            ".page\n  @import 'buttons'\n",
        ));
        assert_eq!(out, ".page\n  brand = red\n  .button\n    color brand\n");
    }

    #[test]
    fn test_require_includes_once_and_css_is_verbatim() {
        let tree = MemoryHost::new().with_file("/app/mixins.styl", "m()\n  x y\n");
        let cache = ResolutionCache::new();
        let options = LoaderOptions::default();
        let mut renderer = InlineRenderer::new();
        let out = css(render_with(
            &mut renderer,
            &tree,
            &cache,
            &options,
            "/app/main.styl",
            "@require 'mixins'\n@require 'mixins'\n@import 'reset.css'\n@import url('http://x.test/a.css')\n",
        ));
        assert_eq!(
            out,
            "m()\n  x y\n@import \"reset.css\";\n@import url(\"http://x.test/a.css\");\n"
        );
    }

    #[test]
    fn test_define_variables_drive_import_paths() {
        let tree = MemoryHost::new().with_file("/app/themes/dark.styl", "bg = black\n");
        let cache = ResolutionCache::new();
        let mut options = LoaderOptions::default();
        options.define.insert("theme".to_string(), "dark".to_string());
        let mut renderer = InlineRenderer::new();
        let out = css(render_with(
            &mut renderer,
            &tree,
            &cache,
            &options,
            "/app/main.styl",
            "@import 'themes/' + theme\n",
        ));
        assert_eq!(out, "bg = black\n");
    }

    fn letters() -> MemoryHost {
        MemoryHost::new()
            .with_file("/app/a.styl", "a = 1\n")
            .with_file("/app/b.styl", "b = 2\n")
    }

    #[test]
    fn test_block_comment_above_import_keeps_lines_aligned() {
        let tree = letters();
        let cache = ResolutionCache::new();
        let options = LoaderOptions::default();
        let mut renderer = InlineRenderer::new();
        let render = |renderer: &mut InlineRenderer, source: &str| {
            css(render_with(renderer, &tree, &cache, &options, "/app/main.styl", source))
        };

        assert_eq!(
            render(&mut renderer, "/* one\ntwo */\n@import 'a'\nbody\n  margin 0\n"),
            "/* one\ntwo */\na = 1\nbody\n  margin 0\n"
        );
        assert_eq!(
            render(&mut renderer, "/* don't\n   touch */\n@import 'a'\n"),
            "/* don't\n   touch */\na = 1\n"
        );
    }

    #[test]
    fn test_statements_sharing_a_line() {
        let tree = letters();
        let cache = ResolutionCache::new();
        let options = LoaderOptions::default();
        let mut renderer = InlineRenderer::new();

        let both = css(render_with(
            &mut renderer,
            &tree,
            &cache,
            &options,
            "/app/main.styl",
            "@import 'a'; @import 'b'\n",
        ));
        assert_eq!(both, "a = 1\nb = 2\n");

        let braces = css(render_with(
            &mut renderer,
            &tree,
            &cache,
            &options,
            "/app/main.styl",
            ".x { @import 'a' }\n.y\n  color red\n",
        ));
        assert_eq!(braces, ".x {\n  a = 1\n}\n.y\n  color red\n");
    }

    #[test]
    fn test_import_list_continued_on_next_line() {
        let tree = letters();
        let cache = ResolutionCache::new();
        let options = LoaderOptions {
            source_map: true,
            ..LoaderOptions::default()
        };
        let mut renderer = InlineRenderer::new();
        let outcome = render_with(
            &mut renderer,
            &tree,
            &cache,
            &options,
            "/app/main.styl",
            "@import 'a',\n  'b'\nbody\n",
        );
        let Ok(RenderOutcome::Rendered(output)) = outcome else {
            panic!("expected a rendered document, got {outcome:?}");
        };
        assert_eq!(output.css, "a = 1\nb = 2\nbody\n");
        let map: serde_json::Value = serde_json::from_str(&output.source_map.unwrap()).unwrap();
        assert_eq!(map["mappings"], serde_json::json!([[0, 1, 0], [1, 2, 0], [2, 0, 2]]));
    }

    #[test]
    fn test_host_reference_needs_resolution() {
        let tree = MemoryHost::new();
        let cache = ResolutionCache::new();
        let options = LoaderOptions::default();
        let mut renderer = InlineRenderer::new();
        let outcome = render_with(
            &mut renderer,
            &tree,
            &cache,
            &options,
            "/app/main.styl",
            "@import '~pkg/a'\n",
        )
        .unwrap();
        assert_eq!(
            outcome,
            RenderOutcome::NeedsResolution(PendingImport {
                key: ReferenceKey::new("/app", "pkg/a"),
                name: "~pkg/a".to_string(),
                importer: PathBuf::from("/app/main.styl"),
            })
        );
    }

    #[test]
    fn test_compile_errors() {
        let tree = MemoryHost::new()
            .with_file("/app/a.styl", "@import 'b'\n")
            .with_file("/app/b.styl", "@import 'a'\n");
        let cache = ResolutionCache::new();
        let options = LoaderOptions::default();
        let mut renderer = InlineRenderer::new();

        let missing = render_with(&mut renderer, &tree, &cache, &options, "/app/main.styl", "@import 'nope'\n");
        assert!(matches!(missing, Err(BridgeError::Compile(ref m)) if m.contains("failed to locate @import file nope.styl")));

        let cycle = render_with(&mut renderer, &tree, &cache, &options, "/app/main.styl", "@import 'a'\n");
        assert!(matches!(cycle, Err(BridgeError::Compile(ref m)) if m.contains("import loop")));

        let dynamic = render_with(&mut renderer, &tree, &cache, &options, "/app/main.styl", "@import pick()\n");
        assert!(matches!(dynamic, Err(BridgeError::Compile(ref m)) if m.contains("not statically known")));

        let malformed = render_with(&mut renderer, &tree, &cache, &options, "/app/main.styl", ".a {\n");
        assert!(matches!(malformed, Err(BridgeError::Compile(_))));
    }

    #[test]
    fn test_source_map_and_parse_cache() {
        let tree = MemoryHost::new().with_file("/app/a.styl", "x = 1\n");
        let cache = ResolutionCache::new();
        let options = LoaderOptions {
            source_map: true,
            ..LoaderOptions::default()
        };
        let mut renderer = InlineRenderer::new();
        let source = "@import 'a'\ny = 2\n";
        let first = render_with(&mut renderer, &tree, &cache, &options, "/app/main.styl", source).unwrap();
        let second = render_with(&mut renderer, &tree, &cache, &options, "/app/main.styl", source).unwrap();
        assert_eq!(first, second);
        assert_eq!(renderer.parse_count(), 2);

        let RenderOutcome::Rendered(output) = first else {
            panic!("expected a rendered document");
        };
        let map: serde_json::Value = serde_json::from_str(&output.source_map.unwrap()).unwrap();
        assert_eq!(map["sources"], serde_json::json!(["/app/main.styl", "/app/a.styl"]));
        assert_eq!(map["mappings"], serde_json::json!([[0, 1, 0], [1, 0, 1]]));
    }
}
