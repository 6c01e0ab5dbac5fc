//! Lowers a parsed program into NASM x86-64 assembly in a single pass.
//!
//! Values live in `rax`, with `rbx` holding the left operand of binary
//! operators. Every variable gets an 8-byte frame slot, arguments are pushed
//! by the caller and strings are emitted into a read-only data section.
//!
//! Problems found while lowering never abort generation. A `; ERROR: ...`
//! marker is left in the output, the offending expression evaluates to zero
//! and the problem is reported in [`Output::diagnostics`].

use thiserror::Error;
use tracing::debug;

use crate::{ast::Program, codegen::x86_64::Generator};

pub mod tables;
pub mod x86_64;
pub mod x86_64_env;


pub fn generate(program: &Program, target: Target) -> Output {
    type DarwinGenerator = Generator<x86_64_env::Darwin>;
    type LinuxGenerator = Generator<x86_64_env::Linux>;

    debug!(triple = target.triple(), "generating assembly");
    match target {
        Target::x86_64_darwin => DarwinGenerator::new().generate(program),
        Target::x86_64_linux => LinuxGenerator::new().generate(program),
    }
}

#[derive(Debug)]
pub struct Output {
    pub asm: String,
    pub diagnostics: Vec<Diagnostic>,
}

/// A problem which was reported inline in the generated assembly.
#[derive(Clone, Debug, PartialEq, Eq, Error)]
pub enum Diagnostic {
    #[error("Runtime string concatenation not yet implemented")]
    RuntimeConcatenation,
    #[error("Unknown function call: {0}")]
    UnknownFunction(Box<str>),
    #[error("Undefined variable: {0}")]
    UndefinedVariable(Box<str>),
    #[error("Variable already declared: {0}")]
    DuplicateVariable(Box<str>),
    #[error("Function already defined: {0}")]
    DuplicateFunction(Box<str>),
    #[error("print expects exactly one argument, got {0}")]
    PrintArity(usize),
    #[error("Function definitions are only allowed at top level: {0}")]
    NestedFunction(Box<str>),
}

#[allow(non_camel_case_types)]
#[derive(Copy, Clone, Debug, Default, PartialEq, Eq)]
pub enum Target {
    x86_64_darwin,
    #[default]
    x86_64_linux,
}

impl Target {
    pub const ALL: &[Target] = &[Target::x86_64_darwin, Target::x86_64_linux];

    pub const fn triple(&self) -> &'static str {
        match self {
            Target::x86_64_darwin => "x86_64-apple-darwin",
            Target::x86_64_linux => "x86_64-unknown-linux-gnu",
        }
    }
}

impl std::fmt::Display for Target {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Target::x86_64_darwin => f.write_str("x86_64_darwin"),
            Target::x86_64_linux => f.write_str("x86_64_linux"),
        }
    }
}
