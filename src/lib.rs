/// The lexer takes the source input, mapping it into a sequence of tokens.
pub mod lexer;

/// The parser takes a sequence of tokens, mapping it into an AST.
pub mod parser;

/// The code generator takes an AST, lowering it into x86-64 assembly.
pub mod codegen;

pub mod ast;
pub mod token;

pub mod util;
