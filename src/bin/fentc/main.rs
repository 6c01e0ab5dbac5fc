//! Command-line driver.
//!
//! Reads a fent source file, optionally dumps the token list and the syntax
//! tree, and writes the generated assembly. Assembling and linking the output
//! is left to external tools.

use std::{
    borrow::Cow,
    fs,
    io::{self, Write},
    path::{Path, PathBuf},
    process::ExitCode,
};

use anyhow::Context;
use clap::{ArgAction, Parser};
use fent::{
    codegen, lexer, parser,
    util::fmt::{tokens, tree},
};
use tracing::{debug, info, warn, Level};

use crate::target::Target;

mod target;

#[derive(Debug, Parser)]
#[command(version, about = "Compiles fent programs into x86-64 assembly")]
struct Args {
    /// Source file to compile.
    input: PathBuf,

    /// Output file ('-' for stdout).
    #[arg(short, long, value_name = "FILE", default_value = "output.asm")]
    output: PathBuf,

    /// Writes the token list as tokens_<file>.txt.
    #[arg(short, long)]
    lexer: bool,

    /// Writes the syntax tree as ast_<file>.txt.
    #[arg(short, long)]
    ast: bool,

    /// Operating system the program will run on.
    #[arg(short, long, value_enum, default_value_t = Target::x86_64_linux)]
    target: Target,

    /// Raises the log level, once for info and twice for debug.
    #[arg(short, long, action = ArgAction::Count)]
    verbose: u8,
}

fn main() -> ExitCode {
    let args = Args::parse();
    init_logging(args.verbose);

    match run(&args) {
        Ok(()) => ExitCode::SUCCESS,
        Err(error) => {
            eprintln!("error: {error:#}");
            ExitCode::FAILURE
        }
    }
}

fn init_logging(verbosity: u8) {
    let level = match verbosity {
        0 => Level::WARN,
        1 => Level::INFO,
        _ => Level::DEBUG,
    };
    tracing_subscriber::fmt()
        .with_writer(io::stderr)
        .with_target(false)
        .with_max_level(level)
        .init();
}

fn run(args: &Args) -> anyhow::Result<()> {
    let src = fs::read_to_string(&args.input)
        .with_context(|| format!("could not open input file {}", args.input.display()))?;
    let file_name = args
        .input
        .file_name()
        .map_or(Cow::Borrowed("input"), |name| name.to_string_lossy());

    let mut tokens = Vec::with_capacity(lexer::SUGGESTED_TOKENS_CAPACITY);
    lexer::lex(&src, &mut tokens);
    debug!(tokens = tokens.len(), "lexed input");

    if args.lexer {
        let path = format!("tokens_{file_name}.txt");
        write_file(&path, &tokens::print_tokens_string(&src, &tokens))?;
        info!(%path, "lexer output written");
    }

    let program = parser::parse_tokens(&src, &tokens).context("parse error")?;
    info!(
        statements = program.statements.len(),
        "parsed top-level statements"
    );

    if args.ast {
        let path = format!("ast_{file_name}.txt");
        write_file(&path, &tree::print_program_string(&program))?;
        info!(%path, "AST output written");
    }

    let output = codegen::generate(&program, args.target.into());
    for diagnostic in &output.diagnostics {
        warn!(os = %args.target, "{diagnostic}");
    }

    if args.output == Path::new("-") {
        io::stdout()
            .write_all(output.asm.as_bytes())
            .context("could not write assembly to stdout")?;
    } else {
        write_file(&args.output, &output.asm)?;
        info!(path = %args.output.display(), "assembly generated");
    }
    Ok(())
}

fn write_file(path: impl AsRef<Path>, contents: &str) -> anyhow::Result<()> {
    let path = path.as_ref();
    fs::write(path, contents).with_context(|| format!("could not write {}", path.display()))
}
