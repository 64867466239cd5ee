#![forbid(unsafe_code)]

use jintt_ast::{span_between, Span};
use logos::Logos;
use miette::Diagnostic;
use thiserror::Error;

use crate::token::{Token, TokenKind};

#[derive(Debug, Error, Diagnostic)]
#[error("lex error: {message}")]
#[diagnostic(code(jintt::lex))]
pub struct LexError {
    pub message: String,
    #[label]
    pub span: Span,
}

/// The six tag delimiter strings, configurable per lexer.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct Delimiters {
    pub stmt_open: String,
    pub stmt_close: String,
    pub var_open: String,
    pub var_close: String,
    pub comment_open: String,
    pub comment_close: String,
}

impl Default for Delimiters {
    fn default() -> Self {
        Self {
            stmt_open: "{%".to_string(),
            stmt_close: "%}".to_string(),
            var_open: "{{".to_string(),
            var_close: "}}".to_string(),
            comment_open: "{#".to_string(),
            comment_close: "#}".to_string(),
        }
    }
}

/// Expression-mode lexemes. The outer `Lexer` feeds this one tag-interior
/// slice at a time; the closing delimiter is a runtime string and is checked
/// before each step, so it never appears in this grammar.
#[derive(Logos, Debug, Clone, PartialEq)]
#[logos(skip r"[ \t\r\n\f]+")]
enum RawToken {
    #[token("==")]
    EqEq,
    #[token("!=")]
    NotEq,
    #[token("<=")]
    LtEq,
    #[token(">=")]
    GtEq,
    #[token("<")]
    Lt,
    #[token(">")]
    Gt,
    #[token("**")]
    Pow,
    #[token("//")]
    FloorDiv,

    #[token("and")]
    KwAnd,
    #[token("or")]
    KwOr,
    #[token("not")]
    KwNot,
    #[token("in")]
    KwIn,
    #[token("is")]
    KwIs,

    #[token("+")]
    Plus,
    #[token("-")]
    Minus,
    #[token("*")]
    Star,
    #[token("/")]
    Slash,
    #[token("%")]
    Percent,

    #[token("|")]
    Pipe,
    #[token("~")]
    Tilde,
    #[token(".")]
    Dot,
    #[token(",")]
    Comma,
    #[token(":")]
    Colon,
    #[token("=")]
    Assign,

    #[token("(")]
    LParen,
    #[token(")")]
    RParen,
    #[token("[")]
    LBracket,
    #[token("]")]
    RBracket,
    #[token("{")]
    LBrace,
    #[token("}")]
    RBrace,

    // The lexeme keeps its quotes; decoding happens in the parser so
    // diagnostics can point at the original text.
    #[regex(r#""([^"\\]|\\.)*""#, |lex| lex.slice().to_string())]
    #[regex(r"'([^'\\]|\\.)*'", |lex| lex.slice().to_string())]
    Str(String),

    #[regex(r"[0-9]+(_[0-9]+)*(\.[0-9]+)?([eE][+-]?[0-9]+)?", |lex| lex.slice().to_string())]
    Number(String),

    #[regex(r"[a-zA-Z_][a-zA-Z0-9_]*", |lex| lex.slice().to_string())]
    Name(String),
}

fn map_raw(raw: RawToken) -> TokenKind {
    match raw {
        RawToken::EqEq => TokenKind::EqEq,
        RawToken::NotEq => TokenKind::NotEq,
        RawToken::LtEq => TokenKind::LtEq,
        RawToken::GtEq => TokenKind::GtEq,
        RawToken::Lt => TokenKind::Lt,
        RawToken::Gt => TokenKind::Gt,
        RawToken::Pow => TokenKind::Pow,
        RawToken::FloorDiv => TokenKind::FloorDiv,
        RawToken::KwAnd => TokenKind::KwAnd,
        RawToken::KwOr => TokenKind::KwOr,
        RawToken::KwNot => TokenKind::KwNot,
        RawToken::KwIn => TokenKind::KwIn,
        RawToken::KwIs => TokenKind::KwIs,
        RawToken::Plus => TokenKind::Plus,
        RawToken::Minus => TokenKind::Minus,
        RawToken::Star => TokenKind::Star,
        RawToken::Slash => TokenKind::Slash,
        RawToken::Percent => TokenKind::Percent,
        RawToken::Pipe => TokenKind::Pipe,
        RawToken::Tilde => TokenKind::Tilde,
        RawToken::Dot => TokenKind::Dot,
        RawToken::Comma => TokenKind::Comma,
        RawToken::Colon => TokenKind::Colon,
        RawToken::Assign => TokenKind::Assign,
        RawToken::LParen => TokenKind::LParen,
        RawToken::RParen => TokenKind::RParen,
        RawToken::LBracket => TokenKind::LBracket,
        RawToken::RBracket => TokenKind::RBracket,
        RawToken::LBrace => TokenKind::LBrace,
        RawToken::RBrace => TokenKind::RBrace,
        RawToken::Str(s) => TokenKind::Str(s),
        RawToken::Number(s) => TokenKind::Number(s),
        RawToken::Name(s) => TokenKind::Name(s),
    }
}

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
enum TagKind {
    Var,
    Stmt,
}

pub struct Lexer<'a> {
    src: &'a str,
    delims: Delimiters,
}

impl<'a> Lexer<'a> {
    pub fn new(src: &'a str) -> Self {
        Self {
            src,
            delims: Delimiters::default(),
        }
    }

    pub fn with_delimiters(src: &'a str, delims: &Delimiters) -> Self {
        Self {
            src,
            delims: delims.clone(),
        }
    }

    pub fn lex(&self) -> Result<Vec<Token>, LexError> {
        let mut tokens = Vec::new();
        let mut pos = 0usize;

        while pos < self.src.len() {
            match self.find_opener(pos) {
                None => {
                    tokens.push(Token {
                        kind: TokenKind::Text(self.src[pos..].to_string()),
                        span: span_between(pos, self.src.len()),
                    });
                    pos = self.src.len();
                }
                Some((at, opener)) => {
                    if at > pos {
                        tokens.push(Token {
                            kind: TokenKind::Text(self.src[pos..at].to_string()),
                            span: span_between(pos, at),
                        });
                    }
                    pos = match opener {
                        Opener::Comment => self.lex_comment(at, &mut tokens)?,
                        Opener::Var => self.lex_tag(at, TagKind::Var, &mut tokens)?,
                        Opener::Stmt => self.lex_tag(at, TagKind::Stmt, &mut tokens)?,
                    };
                }
            }
        }

        tokens.push(Token {
            kind: TokenKind::Eof,
            span: span_between(self.src.len(), self.src.len()),
        });

        Ok(tokens)
    }

    /// Earliest opener at or after `from`. On a tie at the same offset the
    /// longer opener wins, so overlapping custom delimiters stay unambiguous.
    fn find_opener(&self, from: usize) -> Option<(usize, Opener)> {
        let rest = &self.src[from..];
        let mut best: Option<(usize, usize, Opener)> = None;
        let candidates = [
            (&self.delims.comment_open, Opener::Comment),
            (&self.delims.var_open, Opener::Var),
            (&self.delims.stmt_open, Opener::Stmt),
        ];
        for (open, opener) in candidates {
            if let Some(idx) = rest.find(open.as_str()) {
                let better = match best {
                    None => true,
                    Some((best_idx, best_len, _)) => {
                        idx < best_idx || (idx == best_idx && open.len() > best_len)
                    }
                };
                if better {
                    best = Some((idx, open.len(), opener));
                }
            }
        }
        best.map(|(idx, _, opener)| (from + idx, opener))
    }

    fn lex_comment(&self, open_at: usize, tokens: &mut Vec<Token>) -> Result<usize, LexError> {
        let open_len = self.delims.comment_open.len();
        let body_start = open_at + open_len;
        let rest = &self.src[body_start..];

        let Some(close_rel) = rest.find(self.delims.comment_close.as_str()) else {
            return Err(LexError {
                message: "unterminated comment tag".to_string(),
                span: span_between(open_at, body_start),
            });
        };

        let mut inner = &rest[..close_rel];
        // Strip markers sit directly inside the delimiters.
        inner = inner.strip_prefix('-').unwrap_or(inner);
        inner = inner.strip_suffix('-').unwrap_or(inner);

        let end = body_start + close_rel + self.delims.comment_close.len();
        tokens.push(Token {
            kind: TokenKind::Comment(inner.trim().to_string()),
            span: span_between(open_at, end),
        });
        Ok(end)
    }

    fn lex_tag(
        &self,
        open_at: usize,
        kind: TagKind,
        tokens: &mut Vec<Token>,
    ) -> Result<usize, LexError> {
        let (open_len, closer) = match kind {
            TagKind::Var => (self.delims.var_open.len(), &self.delims.var_close),
            TagKind::Stmt => (self.delims.stmt_open.len(), &self.delims.stmt_close),
        };

        let mut cursor = open_at + open_len;
        let strip_before = self.src[cursor..].starts_with('-');
        if strip_before {
            cursor += 1;
        }

        tokens.push(Token {
            kind: match kind {
                TagKind::Var => TokenKind::VarStart {
                    strip: strip_before,
                },
                TagKind::Stmt => TokenKind::StmtStart {
                    strip: strip_before,
                },
            },
            span: span_between(open_at, cursor),
        });

        loop {
            // Whitespace between lexemes is insignificant inside a tag.
            while let Some(c) = self.src[cursor..].chars().next() {
                if c.is_whitespace() {
                    cursor += c.len_utf8();
                } else {
                    break;
                }
            }

            let rest = &self.src[cursor..];
            if rest.is_empty() {
                return Err(LexError {
                    message: match kind {
                        TagKind::Var => "unterminated variable tag".to_string(),
                        TagKind::Stmt => "unterminated statement tag".to_string(),
                    },
                    span: span_between(open_at, open_at + open_len),
                });
            }

            // `-%}` / `-}}` strips whitespace after the tag.
            if let Some(after_dash) = rest.strip_prefix('-') {
                if after_dash.starts_with(closer.as_str()) {
                    let end = cursor + 1 + closer.len();
                    tokens.push(Token {
                        kind: match kind {
                            TagKind::Var => TokenKind::VarEnd { strip: true },
                            TagKind::Stmt => TokenKind::StmtEnd { strip: true },
                        },
                        span: span_between(cursor, end),
                    });
                    return Ok(end);
                }
            }
            if rest.starts_with(closer.as_str()) {
                let end = cursor + closer.len();
                tokens.push(Token {
                    kind: match kind {
                        TagKind::Var => TokenKind::VarEnd { strip: false },
                        TagKind::Stmt => TokenKind::StmtEnd { strip: false },
                    },
                    span: span_between(cursor, end),
                });
                return Ok(end);
            }

            let mut raw = RawToken::lexer(rest);
            match raw.next() {
                Some(Ok(tok)) => {
                    let sp = raw.span();
                    tokens.push(Token {
                        kind: map_raw(tok),
                        span: span_between(cursor + sp.start, cursor + sp.end),
                    });
                    cursor += sp.end;
                }
                _ => {
                    // Unknown character inside an expression: skip it.
                    let c = rest.chars().next().unwrap();
                    cursor += c.len_utf8();
                }
            }
        }
    }
}

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
enum Opener {
    Comment,
    Var,
    Stmt,
}
