//! Best-effort static discovery of imports.
//!
//! The scanner parses a document just far enough to find `@import`/`@require` statements and
//! evaluates their path expressions against literal assignments in the document and a set of
//! configured variable tables. Anything it cannot determine statically is skipped; a document
//! that fails to parse yields no imports. The real compiler render remains the authority, so
//! the scanner only ever speeds things up.
//!
//! ```
//! use std::path::Path;
//! use styl_bridge::{config::{DialectConfig, VariableTable}, scan::scan_imports};
//!
//! let mut variant = VariableTable::new();
//! variant.insert("theme".to_string(), "dark".to_string());
//!
//! let imports = scan_imports(
//!     Path::new("/styles/main.styl"),
//!     "@import 'base'\n@import 'themes/' + theme\n@import mixin-path()\n",
//!     &[variant],
//!     &DialectConfig::default(),
//! );
//! let names: Vec<&str> = imports.iter().map(|i| i.name.as_str()).collect();
//! assert_eq!(names, vec!["base", "themes/dark"]);
//! assert!(imports.iter().all(|i| i.context == Path::new("/styles")));
//! ```

use std::{
    collections::{HashMap, HashSet},
    ops::Range,
    path::{Path, PathBuf},
};

use thiserror::Error;

use crate::{
    config::{DialectConfig, VariableTable},
    error::BridgeError,
    host::LoaderHost,
    reference::is_unresolvable_name,
};

pub mod ast;
pub mod lexer;
pub mod parser;

pub use ast::{Expr, ImportKind, Node};
pub use parser::parse;

/// Why a document could not be scanned. Never leaves the scanner's callers.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum ScanError {
    #[error("unterminated string on line {line}")]
    UnterminatedString { line: usize },
    #[error("unterminated comment on line {line}")]
    UnterminatedComment { line: usize },
    #[error("unbalanced brackets near line {line}")]
    Unbalanced { line: usize },
    #[error("inconsistent indentation on line {line}")]
    Indentation { line: usize },
    #[error("unexpected {found} on line {line}")]
    Unexpected { line: usize, found: String },
}

/// One import statement with each of its path expressions evaluated against a variable table.
#[derive(Debug, Clone, PartialEq)]
pub struct ImportStatement {
    pub kind: ImportKind,
    /// 0-based source line of the keyword.
    pub line: usize,
    /// Source bytes the statement occupies.
    pub span: Range<usize>,
    pub exprs: Vec<Expr>,
    /// `None` where an expression is not statically known.
    pub names: Vec<Option<String>>,
}

/// One statically discovered import.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ImportRef {
    /// Directory of the scanned document.
    pub context: PathBuf,
    /// The import name as written, after variable substitution.
    pub name: String,
    pub kind: ImportKind,
}

#[derive(Debug, Clone)]
enum Binding {
    Value(String),
    Unknown,
}

type Scope = HashMap<String, Binding>;

/// Scan `source` for imports, evaluating path expressions once per variable table.
///
/// Returns the union over all tables, deduplicated by name in first-seen order. Non-dialect
/// files and documents that fail to parse yield an empty list.
pub fn scan_imports(
    filename: &Path,
    source: &str,
    tables: &[VariableTable],
    dialect: &DialectConfig,
) -> Vec<ImportRef> {
    if !dialect.is_dialect_file(filename) {
        return Vec::new();
    }
    let root = match parse(source) {
        Ok(root) => root,
        Err(e) => {
            tracing::debug!("[Scanner] Skipping {:?}: {}", filename, e);
            return Vec::new();
        }
    };

    let context = filename.parent().map(Path::to_path_buf).unwrap_or_default();
    let empty = [VariableTable::new()];
    let tables = if tables.is_empty() { &empty[..] } else { tables };

    let mut seen = HashSet::new();
    let mut out = Vec::new();
    for table in tables {
        for statement in import_statements(&root, table) {
            for name in statement.names.into_iter().flatten() {
                if is_unresolvable_name(&name) || !seen.insert(name.clone()) {
                    continue;
                }
                out.push(ImportRef {
                    context: context.clone(),
                    name,
                    kind: statement.kind,
                });
            }
        }
    }
    tracing::trace!("[Scanner] {:?}: {} import(s)", filename, out.len());
    out
}

/// Scan a document, reading it through the host when its text is not already known.
///
/// Only a failed read is an error; parse failures still yield no imports.
pub async fn scan_file<H: LoaderHost>(
    host: &H,
    filename: PathBuf,
    source: Option<String>,
    tables: &[VariableTable],
    dialect: &DialectConfig,
) -> Result<Vec<ImportRef>, BridgeError> {
    let text = match source {
        Some(text) => text,
        None => host.read_file(&filename).await?,
    };
    Ok(scan_imports(&filename, &text, tables, dialect))
}

/// Every import statement of a parsed document in document order, with local assignments
/// visible at each statement taking precedence over `table`.
pub fn import_statements(root: &Node, table: &VariableTable) -> Vec<ImportStatement> {
    let mut out = Vec::new();
    collect(root, &mut Scope::new(), table, &mut out);
    out
}

fn collect(node: &Node, scope: &mut Scope, table: &VariableTable, out: &mut Vec<ImportStatement>) {
    match node {
        Node::Root(children) => {
            for child in children {
                collect(child, scope, table, out);
            }
        }
        Node::Block(children) => {
            let mut inner = scope.clone();
            for child in children {
                collect(child, &mut inner, table, out);
            }
        }
        Node::Selector { block, .. } => collect(block, scope, table, out),
        Node::Assign { name, op, value } => {
            let defined = scope.contains_key(name) || table.contains_key(name);
            if *op == ast::AssignOp::Default && defined {
                return;
            }
            let binding = evaluate(value, scope, table)
                .map(Binding::Value)
                .unwrap_or(Binding::Unknown);
            scope.insert(name.clone(), binding);
        }
        Node::Import {
            kind,
            exprs,
            line,
            span,
        } => out.push(ImportStatement {
            kind: *kind,
            line: *line,
            span: span.clone(),
            exprs: exprs.clone(),
            names: exprs.iter().map(|e| evaluate(e, scope, table)).collect(),
        }),
        Node::Declaration(_) => {}
    }
}

/// Evaluate an import path expression, or `None` if it is not statically known.
pub fn evaluate_expr(expr: &Expr, table: &VariableTable) -> Option<String> {
    evaluate(expr, &Scope::new(), table)
}

fn evaluate(expr: &Expr, scope: &Scope, table: &VariableTable) -> Option<String> {
    match expr {
        Expr::Literal(text) => Some(text.clone()),
        Expr::Concat(lhs, rhs) => {
            let mut text = evaluate(lhs, scope, table)?;
            text.push_str(&evaluate(rhs, scope, table)?);
            Some(text)
        }
        Expr::Ident(name) => match scope.get(name) {
            Some(Binding::Value(value)) => Some(value.clone()),
            Some(Binding::Unknown) => None,
            None => table.get(name).cloned(),
        },
        Expr::Call { .. } | Expr::Opaque => None,
    }
}
