use std::{fmt, ops::Range};

use crate::{ast::Literal, lexer::extract};

#[derive(Copy, Clone, PartialEq, Eq)]
pub struct Token {
    pub kind: TokenKind,
    lo: usize,
    len: u32,
    line: u32,
}

impl Token {
    pub fn new(kind: TokenKind, span: Span, line: u32) -> Token {
        Token {
            kind,
            lo: span.lo,
            len: span.len,
            line,
        }
    }

    /// Builds an end-of-input token positioned after the last character of
    /// `src`.
    pub fn eof_for(src: &str) -> Token {
        let line = src.bytes().filter(|&b| b == b'\n').count() + 1;
        let line = u32::try_from(line).expect("source too large");
        Token::new(TokenKind::Eof, Span::new_of_length(src.len(), 0), line)
    }

    pub fn span(&self) -> Span {
        Span {
            len: self.len,
            lo: self.lo,
        }
    }

    /// The 1-based source line where this token starts.
    pub fn line(&self) -> u32 {
        self.line
    }

    pub fn is_eof(&self) -> bool {
        self.kind == TokenKind::Eof
    }

    pub fn lexeme<'src>(&self, src: &'src str) -> &'src str {
        self.span().substr(src)
    }

    /// Returns the literal value carried by this token, if any.
    ///
    /// Numbers that do not fit an `i64` carry no value; the parser reports
    /// those.
    pub fn literal(&self, src: &str) -> Option<Literal> {
        match self.kind {
            TokenKind::Number => extract::int(*self, src).ok().map(Literal::Int),
            TokenKind::String => Some(Literal::String(extract::string(*self, src))),
            TokenKind::EscapedString => {
                Some(Literal::String(extract::escaped_string(*self, src)))
            }
            TokenKind::True => Some(Literal::Bool(true)),
            TokenKind::False => Some(Literal::Bool(false)),
            _ => None,
        }
    }
}

impl fmt::Debug for Token {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "Token({:?}, {}, line {})", self.kind, self.span(), self.line)
    }
}

#[derive(Copy, Clone, PartialEq, Eq)]
pub struct Span {
    pub len: u32,
    pub lo: usize,
}

impl Span {
    pub fn new_of_bounds(Range { start: lo, end: hi }: Range<usize>) -> Span {
        debug_assert!(hi >= lo);
        Self::new_of_length(lo, u32::try_from(hi - lo).unwrap())
    }

    pub fn new_of_length(lo: usize, len: u32) -> Span {
        Span { len, lo }
    }

    pub fn hi(self) -> usize {
        self.lo + self.len as usize
    }

    /// Returns a span that starts at `self` and ends at `other`.
    pub fn to(self, other: Span) -> Span {
        Span::new_of_bounds(self.lo..other.hi())
    }

    /// Shrinks or grows the span on both ends.
    pub fn offset(self, lo: isize, hi: isize) -> Span {
        let new_lo = self.lo.checked_add_signed(lo).unwrap();
        let new_hi = self.hi().checked_add_signed(hi).unwrap();
        Span::new_of_bounds(new_lo..new_hi)
    }

    pub fn substr(self, src: &str) -> &str {
        &src[self.lo..self.hi()]
    }
}

impl fmt::Debug for Span {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "Span({self}, len: {})", self.len)
    }
}

impl fmt::Display for Span {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let lo = self.lo;
        let hi = self.hi();
        write!(f, "{lo}..{hi}")
    }
}

#[derive(Copy, Clone, Debug, PartialEq, Eq)]
pub enum TokenKind {
    Const,
    Define,
    If,
    Else,
    While,
    Return,

    True,
    False,

    Plus,
    Minus,
    Star,
    Slash,
    Percent,
    /// `!`
    Bang,
    Less,
    Greater,
    /// `=`
    Eq,
    /// `==`
    EqEq,
    LParen,
    RParen,
    LBrace,
    RBrace,
    Semicolon,
    Comma,

    Identifier,
    Number,
    String,
    /// A string literal which contains at least one escape sequence.
    EscapedString,

    Whitespace,
    /// `// ...`
    InlineComment,
    Eof,

    ErrorUnexpectedChar,
    ErrorUnterminatedString,
}

impl TokenKind {
    pub fn is_trivia(self) -> bool {
        matches!(self, TokenKind::Whitespace | TokenKind::InlineComment)
    }

    pub fn is_error(self) -> bool {
        matches!(
            self,
            TokenKind::ErrorUnexpectedChar | TokenKind::ErrorUnterminatedString
        )
    }

    /// Describes an error token. Returns an empty string for other kinds.
    pub fn describe(self) -> &'static str {
        match self {
            TokenKind::ErrorUnexpectedChar => "Unexpected character",
            TokenKind::ErrorUnterminatedString => "Unterminated string",
            _ => "",
        }
    }
}

pub static KEYWORDS: phf::Map<&'static str, TokenKind> = phf::phf_map! {
    "const" => TokenKind::Const,
    "define" => TokenKind::Define,
    "if" => TokenKind::If,
    "else" => TokenKind::Else,
    "while" => TokenKind::While,
    "return" => TokenKind::Return,
    "true" => TokenKind::True,
    "false" => TokenKind::False,
};
