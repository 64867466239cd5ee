#![forbid(unsafe_code)]

//! Source-to-source template transpiler: Jinja2-family syntax in, Template
//! Toolkit 2-family syntax out.
//!
//! The pipeline is three pure stages over strings: tokenize, parse, emit.
//! Nothing is rendered and no data model is consulted.
//!
//! ```
//! let out = jintt::transpile("{% if user %}Hi {{ user.name|upper }}{% endif %}").unwrap();
//! assert_eq!(out, "[% IF user %]Hi [% user.name.upper %][% END %]");
//! ```

use std::fs;
use std::path::Path;

use miette::IntoDiagnostic;

pub use jintt_ast::Template;
pub use jintt_emit::{CustomFn, Emitter, FilterRule, FilterTable};
pub use jintt_lex::{Delimiters, LexError, Lexer};
pub use jintt_parse::{ParseError, Parser};

/// Construction options for a [`Transpiler`].
#[derive(Default)]
pub struct Options {
    /// Tag delimiter overrides.
    pub delimiters: Delimiters,
    /// Additional filter table entries; these shadow the builtins.
    pub filters: Vec<(String, FilterRule)>,
    /// Dump the token stream and AST to stderr during [`Transpiler::transpile`].
    pub debug: bool,
}

/// A configured transpiler. Reusable across inputs: per-call state lives in
/// the lexer and parser constructed inside [`Transpiler::transpile`].
pub struct Transpiler {
    delimiters: Delimiters,
    emitter: Emitter,
    debug: bool,
}

impl Transpiler {
    pub fn new(options: Options) -> Self {
        let mut filters = FilterTable::new();
        for (name, rule) in options.filters {
            filters.insert(name, rule);
        }
        Self {
            delimiters: options.delimiters,
            emitter: Emitter::with_filters(filters),
            debug: options.debug,
        }
    }

    /// Transpiles one template string. Fails on lex or parse errors; emission
    /// is total on any tree the parser produces.
    pub fn transpile(&self, input: &str) -> miette::Result<String> {
        let tokens = Lexer::with_delimiters(input, &self.delimiters)
            .lex()
            .into_diagnostic()?;
        if self.debug {
            eprintln!("tokens: {tokens:#?}");
        }

        let mut parser = Parser::new(input, &tokens);
        let template = parser.parse_template().into_diagnostic()?;
        if self.debug {
            eprintln!("ast: {template:#?}");
        }

        Ok(self.emitter.emit(&template))
    }

    /// Reads a UTF-8 template file and transpiles it. The only I/O in the
    /// library.
    pub fn transpile_file(&self, path: &Path) -> miette::Result<String> {
        let input = fs::read_to_string(path).into_diagnostic()?;
        self.transpile(&input)
    }
}

impl Default for Transpiler {
    fn default() -> Self {
        Self::new(Options::default())
    }
}

/// One-call convenience entry point with the default configuration.
pub fn transpile(input: &str) -> miette::Result<String> {
    Transpiler::default().transpile(input)
}
