//! Tokenizer for the stylesheet dialect.
//!
//! Raw tokens come from `logos`. A layout pass then turns leading whitespace into
//! [`Tok::Indent`]/[`Tok::Dedent`] pairs for indentation-based blocks; indentation is ignored
//! inside braces and parentheses.

use logos::{FilterResult, Logos};

use super::ScanError;

#[derive(Logos, Debug, Clone, PartialEq)]
#[logos(skip r"[ \t\r\f]+")]
pub enum RawToken {
    #[regex(r"//[^\n]*", logos::skip)]
    LineComment,

    #[token("/*", block_comment)]
    BlockComment,

    #[token("\n")]
    Newline,

    #[token("@import")]
    Import,
    #[token("@require")]
    Require,
    #[regex(r"@[A-Za-z_-][A-Za-z0-9_-]*", |lex| lex.slice()[1..].to_string())]
    AtRule(String),

    #[regex(r#""([^"\\\n]|\\.)*""#, |lex| unquote(lex.slice()))]
    #[regex(r#"'([^'\\\n]|\\.)*'"#, |lex| unquote(lex.slice()))]
    Str(String),

    #[regex(r"url\([^)\n]*\)", |lex| lex.slice().to_string())]
    Url(String),

    #[regex(r"-?[A-Za-z_$][A-Za-z0-9_$-]*", |lex| lex.slice().to_string())]
    Ident(String),

    #[regex(r"[0-9]+(\.[0-9]+)?[A-Za-z%]*", |lex| lex.slice().to_string())]
    Number(String),

    #[token("+")]
    Plus,
    #[token("=")]
    Eq,
    #[token("?=")]
    QuestionEq,
    #[token(":=")]
    ColonEq,
    #[token("(")]
    LParen,
    #[token(")")]
    RParen,
    #[token("{")]
    LBrace,
    #[token("}")]
    RBrace,
    #[token(",")]
    Comma,
    #[token(";")]
    Semicolon,

    #[regex(r"[.#&>~*%!\[\]/|^<:?\-]", |lex| lex.slice().to_string())]
    Punct(String),
}

/// Token after layout.
#[derive(Debug, Clone, PartialEq)]
pub enum Tok {
    Raw(RawToken),
    Indent,
    Dedent,
    Eof,
}

/// A token plus the 0-based line it starts on and its byte range in the source.
///
/// Layout tokens are zero-width.
#[derive(Debug, Clone, PartialEq)]
pub struct Spanned {
    pub tok: Tok,
    pub line: usize,
    pub start: usize,
    pub end: usize,
}

/// Consume a block comment through its closing `*/`.
fn block_comment(lex: &mut logos::Lexer<RawToken>) -> FilterResult<(), ()> {
    match lex.remainder().find("*/") {
        Some(end) => {
            lex.bump(end + 2);
            FilterResult::Skip
        }
        None => {
            lex.bump(lex.remainder().len());
            FilterResult::Error(())
        }
    }
}

fn unquote(quoted: &str) -> String {
    let inner = &quoted[1..quoted.len() - 1];
    let mut out = String::with_capacity(inner.len());
    let mut chars = inner.chars();
    while let Some(c) = chars.next() {
        if c == '\\' {
            if let Some(escaped) = chars.next() {
                out.push(escaped);
            }
        } else {
            out.push(c);
        }
    }
    out
}

/// Lex `source` and apply the layout pass.
pub fn tokenize(source: &str) -> Result<Vec<Spanned>, ScanError> {
    let mut out = Vec::new();
    let mut lexer = RawToken::lexer(source);

    let mut line = 0usize;
    let mut line_start = 0usize;
    let mut cursor = 0usize;
    let mut at_line_start = true;
    let mut indents: Vec<usize> = vec![0];
    let mut brace_depth = 0usize;
    let mut paren_depth = 0usize;

    while let Some(result) = lexer.next() {
        let span = lexer.span();
        let token = match result {
            Ok(token) => token,
            Err(()) => {
                let slice = lexer.slice();
                if slice.starts_with('"') || slice.starts_with('\'') {
                    return Err(ScanError::UnterminatedString { line: line + 1 });
                }
                if slice.starts_with("/*") {
                    return Err(ScanError::UnterminatedComment { line: line + 1 });
                }
                // Characters we do not model stay opaque.
                RawToken::Punct(slice.to_string())
            }
        };

        // Newlines swallowed by block comments still end lines.
        let gap = &source[cursor..span.start];
        if let Some(last) = gap.rfind('\n') {
            let swallowed = gap.matches('\n').count();
            if !at_line_start {
                out.push(Spanned {
                    tok: Tok::Raw(RawToken::Newline),
                    line,
                    start: cursor + last,
                    end: cursor + last + 1,
                });
            }
            line += swallowed;
            line_start = cursor + last + 1;
            at_line_start = true;
        }
        cursor = span.end;

        if token == RawToken::Newline {
            if !at_line_start {
                out.push(Spanned {
                    tok: Tok::Raw(RawToken::Newline),
                    line,
                    start: span.start,
                    end: span.end,
                });
            }
            line += 1;
            line_start = span.end;
            at_line_start = true;
            continue;
        }

        if at_line_start {
            at_line_start = false;
            if brace_depth == 0 && paren_depth == 0 {
                let column = span.start - line_start;
                if column > indents.last().copied().unwrap_or(0) {
                    indents.push(column);
                    out.push(Spanned {
                        tok: Tok::Indent,
                        line,
                        start: span.start,
                        end: span.start,
                    });
                } else {
                    while column < indents.last().copied().unwrap_or(0) {
                        indents.pop();
                        out.push(Spanned {
                            tok: Tok::Dedent,
                            line,
                            start: span.start,
                            end: span.start,
                        });
                    }
                    if column != indents.last().copied().unwrap_or(0) {
                        return Err(ScanError::Indentation { line: line + 1 });
                    }
                }
            }
        }

        match &token {
            RawToken::LBrace => brace_depth += 1,
            RawToken::RBrace => {
                brace_depth = brace_depth
                    .checked_sub(1)
                    .ok_or(ScanError::Unbalanced { line: line + 1 })?;
            }
            RawToken::LParen => paren_depth += 1,
            RawToken::RParen => {
                paren_depth = paren_depth
                    .checked_sub(1)
                    .ok_or(ScanError::Unbalanced { line: line + 1 })?;
            }
            _ => {}
        }

        out.push(Spanned {
            tok: Tok::Raw(token),
            line,
            start: span.start,
            end: span.end,
        });

        // Opaque error slices may run over line breaks.
        let consumed = &source[span.clone()];
        if let Some(last) = consumed.rfind('\n') {
            line += consumed.matches('\n').count();
            line_start = span.start + last + 1;
        }
    }

    if brace_depth != 0 || paren_depth != 0 {
        return Err(ScanError::Unbalanced { line: line + 1 });
    }
    let end = source.len();
    if !at_line_start {
        out.push(Spanned {
            tok: Tok::Raw(RawToken::Newline),
            line,
            start: end,
            end,
        });
    }
    while indents.len() > 1 {
        indents.pop();
        out.push(Spanned {
            tok: Tok::Dedent,
            line,
            start: end,
            end,
        });
    }
    out.push(Spanned {
        tok: Tok::Eof,
        line,
        start: end,
        end,
    });
    Ok(out)
}
