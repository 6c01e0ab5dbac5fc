//! Human-readable dumps of the intermediate pipeline stages.

/// Indented rendering of the parsed tree.
pub mod tree;

/// One entry per token, with its kind, lexeme, line and literal value.
pub mod tokens;
