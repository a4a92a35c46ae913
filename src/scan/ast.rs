//! Syntax tree produced by the import scanner's parser.
//!
//! Only the shapes needed to locate and evaluate imports are modeled; everything else is kept
//! as opaque text.

use std::ops::Range;

/// Import-like statement keyword.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ImportKind {
    Import,
    Require,
}

#[derive(Debug, Clone, PartialEq)]
pub enum Expr {
    /// A quoted string or bare number.
    Literal(String),
    /// `lhs + rhs`
    Concat(Box<Expr>, Box<Expr>),
    Ident(String),
    /// `name(args...)`, including `url(...)`.
    Call { name: String, args: Vec<Expr> },
    /// Any expression the scanner does not model.
    Opaque,
}

/// How a variable assignment binds.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AssignOp {
    /// `name = expr`
    Set,
    /// `name := expr`
    SetLocal,
    /// `name ?= expr`, only when `name` is not yet defined.
    Default,
}

#[derive(Debug, Clone, PartialEq)]
pub enum Node {
    Root(Vec<Node>),
    Block(Vec<Node>),
    Selector {
        selector: String,
        block: Box<Node>,
    },
    Import {
        kind: ImportKind,
        exprs: Vec<Expr>,
        /// 0-based line of the keyword.
        line: usize,
        /// Bytes from the keyword through the last path expression, or its `;`.
        span: Range<usize>,
    },
    Assign {
        name: String,
        op: AssignOp,
        value: Expr,
    },
    /// A property, mixin call or other statement without a block.
    Declaration(String),
}

#[cfg(test)]
impl Node {
    pub(crate) fn children(&self) -> &[Node] {
        match self {
            Node::Root(nodes) | Node::Block(nodes) => nodes,
            Node::Selector { block, .. } => block.children(),
            _ => &[],
        }
    }

    /// Every import statement in document order, depth first.
    pub(crate) fn imports(&self) -> Vec<&Node> {
        let mut out = Vec::new();
        self.collect_imports(&mut out);
        out
    }

    fn collect_imports<'a>(&'a self, out: &mut Vec<&'a Node>) {
        match self {
            Node::Import { .. } => out.push(self),
            _ => {
                for child in self.children() {
                    child.collect_imports(out);
                }
            }
        }
    }
}
