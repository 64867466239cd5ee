#![forbid(unsafe_code)]

use jintt_ast::Span;

#[derive(Clone, Debug, PartialEq)]
pub struct Token {
    pub kind: TokenKind,
    pub span: Span,
}

#[derive(Clone, Debug, PartialEq)]
pub enum TokenKind {
    /// Literal template text between tags.
    Text(String),
    /// `{{`, with the whitespace-control flag (`{{-`).
    VarStart { strip: bool },
    /// `}}`, with the whitespace-control flag (`-}}`).
    VarEnd { strip: bool },
    /// `{%` / `{%-`.
    StmtStart { strip: bool },
    /// `%}` / `-%}`.
    StmtEnd { strip: bool },
    /// A whole `{# … #}` tag; value trimmed, strip markers consumed.
    Comment(String),

    // Operators
    EqEq,
    NotEq,
    LtEq,
    GtEq,
    Lt,
    Gt,
    Pow,
    FloorDiv,
    Plus,
    Minus,
    Star,
    Slash,
    Percent,

    // Word operators. Emitted as operators, not names, when matched as
    // whole words in expression mode.
    KwAnd,
    KwOr,
    KwNot,
    KwIn,
    KwIs,

    // Punctuation
    Pipe,
    Tilde,
    Dot,
    Comma,
    Colon,
    Assign,
    LParen,
    RParen,
    LBracket,
    RBracket,
    LBrace,
    RBrace,

    // Literals / identifiers
    Name(String),
    /// String literal, quotes included; decoding happens in the parser.
    Str(String),
    /// Numeric literal as written, digit-group underscores included.
    Number(String),

    Eof,
}

impl TokenKind {
    /// Short human-readable label used in parse error messages.
    pub fn describe(&self) -> &'static str {
        match self {
            TokenKind::Text(_) => "text",
            TokenKind::VarStart { .. } => "'{{'",
            TokenKind::VarEnd { .. } => "'}}'",
            TokenKind::StmtStart { .. } => "'{%'",
            TokenKind::StmtEnd { .. } => "'%}'",
            TokenKind::Comment(_) => "comment",
            TokenKind::EqEq => "'=='",
            TokenKind::NotEq => "'!='",
            TokenKind::LtEq => "'<='",
            TokenKind::GtEq => "'>='",
            TokenKind::Lt => "'<'",
            TokenKind::Gt => "'>'",
            TokenKind::Pow => "'**'",
            TokenKind::FloorDiv => "'//'",
            TokenKind::Plus => "'+'",
            TokenKind::Minus => "'-'",
            TokenKind::Star => "'*'",
            TokenKind::Slash => "'/'",
            TokenKind::Percent => "'%'",
            TokenKind::KwAnd => "'and'",
            TokenKind::KwOr => "'or'",
            TokenKind::KwNot => "'not'",
            TokenKind::KwIn => "'in'",
            TokenKind::KwIs => "'is'",
            TokenKind::Pipe => "'|'",
            TokenKind::Tilde => "'~'",
            TokenKind::Dot => "'.'",
            TokenKind::Comma => "','",
            TokenKind::Colon => "':'",
            TokenKind::Assign => "'='",
            TokenKind::LParen => "'('",
            TokenKind::RParen => "')'",
            TokenKind::LBracket => "'['",
            TokenKind::RBracket => "']'",
            TokenKind::LBrace => "'{'",
            TokenKind::RBrace => "'}'",
            TokenKind::Name(_) => "name",
            TokenKind::Str(_) => "string",
            TokenKind::Number(_) => "number",
            TokenKind::Eof => "end of input",
        }
    }
}
