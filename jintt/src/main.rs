#![forbid(unsafe_code)]

use std::{
    fs,
    io::{self, Read, Write},
    path::PathBuf,
};

use clap::Parser;
use miette::IntoDiagnostic;

use jintt::{Delimiters, Options, Transpiler};

#[derive(Parser, Debug)]
#[command(
    name = "jintt",
    version,
    about = "Transpile Jinja2-dialect templates to Template Toolkit 2 syntax"
)]
struct Cli {
    /// Input template file; `-` reads stdin
    path: PathBuf,

    /// Write output to PATH instead of stdout
    #[arg(short, long)]
    output: Option<PathBuf>,

    /// Write output alongside the source with a `.tt` extension
    #[arg(short = 'i', long)]
    in_place: bool,

    /// Dump the token stream and AST to stderr
    #[arg(long)]
    debug: bool,

    /// Statement tag opener
    #[arg(long, default_value = "{%")]
    stmt_open: String,

    /// Statement tag closer
    #[arg(long, default_value = "%}")]
    stmt_close: String,

    /// Variable tag opener
    #[arg(long, default_value = "{{")]
    var_open: String,

    /// Variable tag closer
    #[arg(long, default_value = "}}")]
    var_close: String,

    /// Comment tag opener
    #[arg(long, default_value = "{#")]
    comment_open: String,

    /// Comment tag closer
    #[arg(long, default_value = "#}")]
    comment_close: String,
}

fn main() -> miette::Result<()> {
    let cli = Cli::parse();

    let delimiters = Delimiters {
        stmt_open: cli.stmt_open,
        stmt_close: cli.stmt_close,
        var_open: cli.var_open,
        var_close: cli.var_close,
        comment_open: cli.comment_open,
        comment_close: cli.comment_close,
    };
    let transpiler = Transpiler::new(Options {
        delimiters,
        filters: Vec::new(),
        debug: cli.debug,
    });

    let from_stdin = cli.path.as_os_str() == "-";
    let input = if from_stdin {
        let mut buf = String::new();
        io::stdin().read_to_string(&mut buf).into_diagnostic()?;
        buf
    } else {
        fs::read_to_string(&cli.path).into_diagnostic()?
    };

    let output = transpiler.transpile(&input)?;

    if cli.in_place {
        if from_stdin {
            return Err(miette::miette!("cannot write in place when reading stdin"));
        }
        let dest = cli.path.with_extension("tt");
        fs::write(&dest, output).into_diagnostic()?;
    } else if let Some(dest) = &cli.output {
        fs::write(dest, output).into_diagnostic()?;
    } else {
        io::stdout()
            .write_all(output.as_bytes())
            .into_diagnostic()?;
    }

    Ok(())
}
