use std::io::Write;

use crate::{ast::Literal, token::Token};

pub fn print_tokens_string(src: &str, tokens: &[Token]) -> String {
    let mut buf = Vec::with_capacity(64 * tokens.len());
    print_tokens(&mut buf, src, tokens).unwrap();
    String::from_utf8(buf).unwrap()
}

/// Writes one entry per significant token. Trivia is left out, so indices
/// count only the tokens the parser sees.
pub fn print_tokens(w: &mut impl Write, src: &str, tokens: &[Token]) -> std::io::Result<()> {
    let significant = tokens.iter().filter(|t| !t.kind.is_trivia());
    for (i, token) in significant.enumerate() {
        writeln!(w, "Token {i}:")?;
        writeln!(w, "  Kind: {:?}", token.kind)?;
        writeln!(w, "  Lexeme: {:?}", token.lexeme(src))?;
        writeln!(w, "  Line: {}", token.line())?;
        match token.literal(src) {
            Some(Literal::Int(val)) => writeln!(w, "  Literal (int): {val}")?,
            Some(Literal::Bool(val)) => writeln!(w, "  Literal (bool): {val}")?,
            Some(Literal::String(val)) => writeln!(w, "  Literal (string): {val:?}")?,
            None => {}
        }
        writeln!(w)?;
    }
    Ok(())
}
