#![forbid(unsafe_code)]

use jintt_ast::Span;
use miette::Diagnostic;
use thiserror::Error;

#[derive(Debug, Error, Diagnostic)]
pub enum ParseError {
    #[error("parse error: expected {expected}, found {found}")]
    #[diagnostic(code(jintt::parse::unexpected_token))]
    UnexpectedToken {
        expected: String,
        found: String,
        #[label]
        span: Span,
    },

    #[error("parse error: unknown statement '{keyword}'")]
    #[diagnostic(code(jintt::parse::unknown_statement))]
    UnknownStatement {
        keyword: String,
        #[label]
        span: Span,
    },

    #[error("parse error: '{keyword}' without a matching opening statement")]
    #[diagnostic(code(jintt::parse::unmatched_closure))]
    UnmatchedClosure {
        keyword: String,
        #[label]
        span: Span,
    },

    #[error("parse error: expected an expression, found {found}")]
    #[diagnostic(code(jintt::parse::malformed_expression))]
    MalformedExpression {
        found: String,
        #[label]
        span: Span,
    },
}
