#![forbid(unsafe_code)]

mod error;
mod parser;

use jintt_lex::{Delimiters, Lexer};
use miette::IntoDiagnostic;

pub use error::ParseError;
pub use parser::Parser;

/// Lex and parse a template with the default delimiters.
pub fn parse_source(src: &str) -> miette::Result<jintt_ast::Template> {
    let tokens = Lexer::new(src).lex().into_diagnostic()?;
    let mut parser = Parser::new(src, &tokens);
    parser.parse_template().into_diagnostic()
}

/// Lex and parse a template with custom tag delimiters.
pub fn parse_source_with_delimiters(
    src: &str,
    delims: &Delimiters,
) -> miette::Result<jintt_ast::Template> {
    let tokens = Lexer::with_delimiters(src, delims).lex().into_diagnostic()?;
    let mut parser = Parser::new(src, &tokens);
    parser.parse_template().into_diagnostic()
}
