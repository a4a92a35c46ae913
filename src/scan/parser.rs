//! Recursive-descent parser over the layout token stream.

use super::{
    ast::{AssignOp, Expr, ImportKind, Node},
    lexer::{tokenize, RawToken, Spanned, Tok},
    ScanError,
};

/// What closes the statement list being parsed.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum BlockEnd {
    Eof,
    Brace,
    Dedent,
}

pub fn parse(source: &str) -> Result<Node, ScanError> {
    let tokens = tokenize(source)?;
    let mut parser = Parser {
        tokens,
        pos: 0,
        end: 0,
    };
    parser.parse_root()
}

struct Parser {
    tokens: Vec<Spanned>,
    pos: usize,
    /// End offset of the last source token consumed.
    end: usize,
}

impl Parser {
    fn peek(&self) -> &Tok {
        self.tokens
            .get(self.pos)
            .map(|s| &s.tok)
            .unwrap_or(&Tok::Eof)
    }

    fn peek_at(&self, offset: usize) -> &Tok {
        self.tokens
            .get(self.pos + offset)
            .map(|s| &s.tok)
            .unwrap_or(&Tok::Eof)
    }

    fn line(&self) -> usize {
        self.tokens
            .get(self.pos)
            .or_else(|| self.tokens.last())
            .map(|s| s.line)
            .unwrap_or(0)
    }

    fn start(&self) -> usize {
        self.tokens.get(self.pos).map(|s| s.start).unwrap_or(self.end)
    }

    fn advance(&mut self) -> Tok {
        let tok = self.peek().clone();
        if let Some(spanned) = self.tokens.get(self.pos) {
            if matches!(&spanned.tok, Tok::Raw(raw) if *raw != RawToken::Newline) {
                self.end = spanned.end;
            }
            self.pos += 1;
        }
        tok
    }

    fn parse_root(&mut self) -> Result<Node, ScanError> {
        Ok(Node::Root(self.parse_statements(BlockEnd::Eof)?))
    }

    fn parse_statements(&mut self, end: BlockEnd) -> Result<Vec<Node>, ScanError> {
        let mut nodes = Vec::new();
        loop {
            match self.peek() {
                Tok::Eof => {
                    if end == BlockEnd::Eof || end == BlockEnd::Dedent {
                        break;
                    }
                    return Err(ScanError::Unbalanced {
                        line: self.line() + 1,
                    });
                }
                Tok::Dedent => {
                    if end == BlockEnd::Dedent {
                        self.advance();
                        break;
                    }
                    return Err(ScanError::Unexpected {
                        line: self.line() + 1,
                        found: "dedent".to_string(),
                    });
                }
                Tok::Raw(RawToken::RBrace) => {
                    if end == BlockEnd::Brace {
                        self.advance();
                        break;
                    }
                    return Err(ScanError::Unbalanced {
                        line: self.line() + 1,
                    });
                }
                Tok::Raw(RawToken::Newline) | Tok::Raw(RawToken::Semicolon) => {
                    self.advance();
                }
                Tok::Indent => {
                    // Indented continuation of a statement that did not open a block.
                    self.advance();
                    nodes.push(Node::Block(self.parse_statements(BlockEnd::Dedent)?));
                }
                _ => nodes.push(self.parse_statement()?),
            }
        }
        Ok(nodes)
    }

    fn parse_statement(&mut self) -> Result<Node, ScanError> {
        let line = self.line();
        match self.peek().clone() {
            Tok::Raw(RawToken::Import) | Tok::Raw(RawToken::Require) => {
                let start = self.start();
                let kind = if matches!(self.advance(), Tok::Raw(RawToken::Import)) {
                    ImportKind::Import
                } else {
                    ImportKind::Require
                };
                let (exprs, continued) = self.parse_expr_list();
                self.skip_to_statement_end();
                if matches!(self.peek(), Tok::Raw(RawToken::Semicolon)) {
                    self.advance();
                }
                let span = start..self.end;
                self.close_continuation(continued);
                Ok(Node::Import {
                    kind,
                    exprs,
                    line,
                    span,
                })
            }
            Tok::Raw(RawToken::Ident(name))
                if matches!(
                    self.peek_at(1),
                    Tok::Raw(RawToken::Eq) | Tok::Raw(RawToken::ColonEq) | Tok::Raw(RawToken::QuestionEq)
                ) =>
            {
                self.advance();
                let op = match self.advance() {
                    Tok::Raw(RawToken::ColonEq) => AssignOp::SetLocal,
                    Tok::Raw(RawToken::QuestionEq) => AssignOp::Default,
                    _ => AssignOp::Set,
                };
                let value = self.parse_expr();
                self.skip_to_statement_end();
                Ok(Node::Assign { name, op, value })
            }
            _ => self.parse_selector_or_declaration(),
        }
    }

    fn parse_selector_or_declaration(&mut self) -> Result<Node, ScanError> {
        let mut parts: Vec<String> = Vec::new();
        let mut depth = 0usize;
        loop {
            match self.peek() {
                Tok::Raw(RawToken::LBrace) if depth == 0 => {
                    self.advance();
                    let block = Node::Block(self.parse_statements(BlockEnd::Brace)?);
                    return Ok(Node::Selector {
                        selector: parts.join(" "),
                        block: Box::new(block),
                    });
                }
                Tok::Raw(RawToken::Newline) if depth == 0 => {
                    self.advance();
                    if matches!(self.peek(), Tok::Indent) {
                        self.advance();
                        let block = Node::Block(self.parse_statements(BlockEnd::Dedent)?);
                        return Ok(Node::Selector {
                            selector: parts.join(" "),
                            block: Box::new(block),
                        });
                    }
                    return Ok(Node::Declaration(parts.join(" ")));
                }
                Tok::Raw(RawToken::Semicolon) | Tok::Raw(RawToken::RBrace) if depth == 0 => {
                    return Ok(Node::Declaration(parts.join(" ")));
                }
                Tok::Eof | Tok::Dedent | Tok::Indent => {
                    return Ok(Node::Declaration(parts.join(" ")));
                }
                Tok::Raw(RawToken::Newline) => {
                    self.advance();
                }
                Tok::Raw(raw) => {
                    match raw {
                        RawToken::LParen => depth += 1,
                        RawToken::RParen => depth = depth.saturating_sub(1),
                        _ => {}
                    }
                    parts.push(token_text(raw));
                    self.advance();
                }
            }
        }
    }

    fn at_expr_end(&self) -> bool {
        matches!(
            self.peek(),
            Tok::Eof
                | Tok::Indent
                | Tok::Dedent
                | Tok::Raw(RawToken::Newline)
                | Tok::Raw(RawToken::Semicolon)
                | Tok::Raw(RawToken::RBrace)
                | Tok::Raw(RawToken::LBrace)
                | Tok::Raw(RawToken::Comma)
                | Tok::Raw(RawToken::RParen)
        )
    }

    /// Comma-separated path expressions. A trailing comma continues the list on the next
    /// line; the count of indents opened that way is returned with the list.
    fn parse_expr_list(&mut self) -> (Vec<Expr>, usize) {
        let mut exprs = vec![self.parse_expr()];
        let mut continued = 0;
        while matches!(self.peek(), Tok::Raw(RawToken::Comma)) {
            self.advance();
            while matches!(self.peek(), Tok::Raw(RawToken::Newline)) {
                self.advance();
            }
            if matches!(self.peek(), Tok::Indent) {
                self.advance();
                continued += 1;
            }
            exprs.push(self.parse_expr());
        }
        (exprs, continued)
    }

    /// Consume the dedents matching indents opened by a continued import list.
    fn close_continuation(&mut self, continued: usize) {
        for _ in 0..continued {
            while matches!(self.peek(), Tok::Raw(RawToken::Newline)) {
                self.advance();
            }
            if !matches!(self.peek(), Tok::Dedent) {
                return;
            }
            self.advance();
        }
    }

    fn parse_expr(&mut self) -> Expr {
        let mut lhs = self.parse_primary();
        while matches!(self.peek(), Tok::Raw(RawToken::Plus)) {
            self.advance();
            let rhs = self.parse_primary();
            lhs = Expr::Concat(Box::new(lhs), Box::new(rhs));
        }
        if self.at_expr_end() {
            return lhs;
        }
        // Any other operator or trailing media query: the value is not statically known.
        let trailing_media = matches!(self.peek(), Tok::Raw(RawToken::Ident(_)))
            && matches!(lhs, Expr::Literal(_));
        self.skip_expr_rest();
        if trailing_media {
            lhs
        } else {
            Expr::Opaque
        }
    }

    fn parse_primary(&mut self) -> Expr {
        match self.peek().clone() {
            Tok::Raw(RawToken::Str(text)) | Tok::Raw(RawToken::Number(text)) => {
                self.advance();
                Expr::Literal(text)
            }
            Tok::Raw(RawToken::Url(text)) => {
                self.advance();
                let inner = text
                    .strip_prefix("url(")
                    .and_then(|t| t.strip_suffix(')'))
                    .unwrap_or_default()
                    .trim()
                    .trim_matches(['"', '\''])
                    .to_string();
                Expr::Call {
                    name: "url".to_string(),
                    args: vec![Expr::Literal(inner)],
                }
            }
            Tok::Raw(RawToken::Ident(name)) => {
                self.advance();
                if matches!(self.peek(), Tok::Raw(RawToken::LParen)) {
                    self.advance();
                    let mut args = Vec::new();
                    while !matches!(
                        self.peek(),
                        Tok::Raw(RawToken::RParen) | Tok::Eof | Tok::Dedent
                    ) {
                        if matches!(
                            self.peek(),
                            Tok::Raw(RawToken::Comma) | Tok::Raw(RawToken::Newline)
                        ) {
                            self.advance();
                            continue;
                        }
                        let before = self.pos;
                        args.push(self.parse_expr());
                        if self.pos == before {
                            self.advance();
                        }
                    }
                    if matches!(self.peek(), Tok::Raw(RawToken::RParen)) {
                        self.advance();
                    }
                    Expr::Call { name, args }
                } else {
                    Expr::Ident(name)
                }
            }
            Tok::Raw(RawToken::LParen) => {
                self.advance();
                let inner = self.parse_expr();
                if matches!(self.peek(), Tok::Raw(RawToken::RParen)) {
                    self.advance();
                    inner
                } else {
                    self.skip_expr_rest();
                    Expr::Opaque
                }
            }
            _ => {
                if !self.at_expr_end() {
                    self.advance();
                }
                Expr::Opaque
            }
        }
    }

    /// Skip to the next comma or statement terminator at the current nesting level.
    fn skip_expr_rest(&mut self) {
        let mut depth = 0usize;
        loop {
            match self.peek() {
                Tok::Eof | Tok::Indent | Tok::Dedent => return,
                Tok::Raw(RawToken::LParen) => depth += 1,
                Tok::Raw(RawToken::RParen) => {
                    if depth == 0 {
                        return;
                    }
                    depth -= 1;
                }
                _ if depth == 0 && self.at_expr_end() => return,
                _ => {}
            }
            self.advance();
        }
    }

    fn skip_to_statement_end(&mut self) {
        loop {
            match self.peek() {
                Tok::Eof
                | Tok::Indent
                | Tok::Dedent
                | Tok::Raw(RawToken::Newline)
                | Tok::Raw(RawToken::Semicolon)
                | Tok::Raw(RawToken::RBrace)
                | Tok::Raw(RawToken::LBrace) => return,
                _ => {
                    self.advance();
                }
            }
        }
    }
}

fn token_text(token: &RawToken) -> String {
    match token {
        RawToken::Newline => "\n".to_string(),
        RawToken::Import => "@import".to_string(),
        RawToken::Require => "@require".to_string(),
        RawToken::AtRule(name) => format!("@{name}"),
        RawToken::Str(text) => format!("\"{text}\""),
        RawToken::Url(text) | RawToken::Ident(text) | RawToken::Number(text) => text.clone(),
        RawToken::Punct(text) => text.clone(),
        RawToken::Plus => "+".to_string(),
        RawToken::Eq => "=".to_string(),
        RawToken::QuestionEq => "?=".to_string(),
        RawToken::ColonEq => ":=".to_string(),
        RawToken::LParen => "(".to_string(),
        RawToken::RParen => ")".to_string(),
        RawToken::LBrace => "{".to_string(),
        RawToken::RBrace => "}".to_string(),
        RawToken::Comma => ",".to_string(),
        RawToken::Semicolon => ";".to_string(),
        RawToken::LineComment | RawToken::BlockComment => String::new(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use test_log::test;

    #[test]
    fn test_parse_imports_and_assignments() {
        let root = parse("theme = \"dark\"\n@import \"themes/\" + theme\n").unwrap();
        assert_eq!(
            root,
            Node::Root(vec![
                Node::Assign {
                    name: "theme".to_string(),
                    op: AssignOp::Set,
                    value: Expr::Literal("dark".to_string()),
                },
                Node::Import {
                    kind: ImportKind::Import,
                    exprs: vec![Expr::Concat(
                        Box::new(Expr::Literal("themes/".to_string())),
                        Box::new(Expr::Ident("theme".to_string())),
                    )],
                    line: 1,
                    span: 15..40,
                },
            ])
        );
    }

    #[test]
    fn test_parse_nested_blocks() {
        let source = "\
@media print
  .page
    @require 'print/page'
.card {
  @import 'card'
  color red
}
";
        let root = parse(source).unwrap();
        let imports = root.imports();
        assert_eq!(imports.len(), 2);
        assert!(matches!(
            imports[0],
            Node::Import { kind: ImportKind::Require, line: 2, .. }
        ));
        assert!(matches!(
            imports[1],
            Node::Import { kind: ImportKind::Import, line: 4, .. }
        ));
        let Node::Root(top) = &root else {
            panic!("expected root");
        };
        assert!(matches!(&top[0], Node::Selector { selector, .. } if selector == "@media print"));
        assert!(matches!(&top[1], Node::Selector { selector, .. } if selector == ". card"));
    }

    #[test]
    fn test_parse_calls_and_lists() {
        let root = parse("@import url(\"x.css\"), 'a', join('/', parts)\n").unwrap();
        let imports = root.imports();
        let Node::Import { exprs, .. } = imports[0] else {
            panic!("expected import");
        };
        assert_eq!(exprs.len(), 3);
        assert!(matches!(&exprs[0], Expr::Call { name, .. } if name == "url"));
        assert_eq!(exprs[1], Expr::Literal("a".to_string()));
        assert!(matches!(&exprs[2], Expr::Call { name, args } if name == "join" && args.len() == 2));
    }

    #[test]
    fn test_parse_media_suffix_and_operators() {
        let root = parse("@import 'print.css' screen\n@import 'a' * 2\n").unwrap();
        let imports = root.imports();
        let Node::Import { exprs, .. } = imports[0] else {
            panic!("expected import");
        };
        assert_eq!(exprs[0], Expr::Literal("print.css".to_string()));
        let Node::Import { exprs, .. } = imports[1] else {
            panic!("expected import");
        };
        assert_eq!(exprs[0], Expr::Opaque);
    }

    #[test]
    fn test_parse_list_continued_on_indented_lines() {
        let root = parse(".a\n  @import 'x',\n    'y',\n    'z'\n  color red\n.b\n").unwrap();
        let imports = root.imports();
        let Node::Import { exprs, span, .. } = imports[0] else {
            panic!("expected import");
        };
        assert_eq!(
            exprs,
            &vec![
                Expr::Literal("x".to_string()),
                Expr::Literal("y".to_string()),
                Expr::Literal("z".to_string()),
            ]
        );
        assert_eq!(span, &(5..34));
        let Node::Root(top) = &root else {
            panic!("expected root");
        };
        assert_eq!(top.len(), 2);
        assert_eq!(top[0].children().len(), 2);
        assert!(matches!(&top[0].children()[1], Node::Declaration(d) if d == "color red"));
    }

    #[test]
    fn test_parse_statement_spans_on_one_line() {
        let root = parse("@import 'a'; @import 'b'\n.x { @require 'c' }\n").unwrap();
        let spans: Vec<_> = root
            .imports()
            .into_iter()
            .map(|node| match node {
                Node::Import { span, .. } => span.clone(),
                _ => unreachable!(),
            })
            .collect();
        assert_eq!(spans, vec![0..12, 13..24, 30..42]);
    }

    #[test]
    fn test_parse_rejects_malformed() {
        assert!(parse(".a {\n").is_err());
        assert!(parse("@import (\"a\"\n").is_err());
    }
}
