use std::{iter::Peekable, num::ParseIntError};

use crate::token::{Span, Token, TokenKind, KEYWORDS};

pub const SUGGESTED_TOKENS_CAPACITY: usize = 8_192;

/// Lexes the provided string, producing the tokens into the provided buffer.
///
/// The buffer always ends with a [`TokenKind::Eof`] token. Lexical problems
/// never abort the scan; they are produced as error tokens instead.
pub fn lex(src: &str, tokens: &mut Vec<Token>) {
    Lexer::new(src, tokens).lex();
}

/// A convenience function that allocates a new buffer per lexed input and
/// returns it.
pub fn lex_in_new(src: &str) -> Vec<Token> {
    let mut tokens = Vec::with_capacity(SUGGESTED_TOKENS_CAPACITY);
    lex(src, &mut tokens);
    tokens
}

/// The fent lexer
struct Lexer<'src, 'tok> {
    src: &'src str,
    iter: Peekable<std::str::Chars<'src>>,
    cursor: usize,
    current_lo: usize,
    line: u32,
    current_line: u32,
    tokens: &'tok mut Vec<Token>,
}

impl Lexer<'_, '_> {
    /// Scans the source string until the input is exhausted.
    ///
    /// Tokens are written into the provided tokens buffer.
    fn lex(mut self) {
        assert_eq!(self.tokens.len(), 0, "must pass clean tokens buffer");
        loop {
            let next = self.scan_token_kind();
            let is_eof = matches!(next, TokenKind::Eof);
            self.produce(next);
            if is_eof {
                break;
            }
        }
    }

    /// Tries to scan the current character.
    fn scan_token_kind(&mut self) -> TokenKind {
        use TokenKind::*;
        if self.is_at_end() {
            self.mark_advance();
            return Eof;
        }
        match self.mark_advance() {
            '+' => Plus,
            '-' => Minus,
            '*' => Star,
            '/' => match self.peek() {
                '/' => self.inline_comment(),
                _ => Slash,
            },
            '%' => Percent,
            '!' => Bang,
            '<' => Less,
            '>' => Greater,
            '=' => match self.peek() {
                '=' => self.advance_with(EqEq),
                _ => Eq,
            },
            '(' => LParen,
            ')' => RParen,
            '{' => LBrace,
            '}' => RBrace,
            ';' => Semicolon,
            ',' => Comma,
            '"' => self.string(),
            c if c.is_ascii_alphabetic() || c == '_' => self.identifier_or_keyword(),
            c if c.is_ascii_digit() => self.number(),
            c if c.is_ascii_whitespace() => self.whitespace(),
            _ => ErrorUnexpectedChar,
        }
    }

    /// Lexes a string token.
    ///
    /// Escapes are not resolved here. The token is only marked as
    /// [`TokenKind::EscapedString`] so that [`extract::escaped_string`] pays
    /// the cost of escaping when the string actually needs it.
    fn string(&mut self) -> TokenKind {
        // Whether any escaping did happen inside this string token
        let mut has_escaped = false;
        // Whether the current character is being escaped
        let mut is_escaping = false;
        loop {
            if self.is_at_end() {
                return TokenKind::ErrorUnterminatedString;
            }
            match (is_escaping, self.advance()) {
                (false, '"') => {
                    return if has_escaped {
                        TokenKind::EscapedString
                    } else {
                        TokenKind::String
                    };
                }
                (false, '\\') => {
                    has_escaped = true;
                    is_escaping = true;
                }
                (_, _) => {
                    is_escaping = false;
                }
            }
        }
    }

    fn identifier_or_keyword(&mut self) -> TokenKind {
        let valid_identifier_suffix = |c: char| c.is_ascii_alphanumeric() || c == '_';

        while valid_identifier_suffix(self.peek()) {
            self.advance();
        }
        KEYWORDS
            .get(self.substr())
            .copied()
            .unwrap_or(TokenKind::Identifier)
    }

    fn number(&mut self) -> TokenKind {
        while self.peek().is_ascii_digit() {
            self.advance();
        }
        TokenKind::Number
    }

    fn whitespace(&mut self) -> TokenKind {
        while self.peek().is_ascii_whitespace() {
            self.advance();
        }
        TokenKind::Whitespace
    }

    fn inline_comment(&mut self) -> TokenKind {
        assert_eq!(self.advance(), '/');
        while !self.is_at_end() && self.peek() != '\n' {
            self.advance();
        }
        TokenKind::InlineComment
    }
}

impl Lexer<'_, '_> {
    /// Constructs a new lexer with the default state.
    fn new<'src, 'tok>(src: &'src str, tokens: &'tok mut Vec<Token>) -> Lexer<'src, 'tok> {
        Lexer {
            src,
            iter: src.chars().peekable(),
            cursor: 0,
            current_lo: 0,
            line: 1,
            current_line: 1,
            tokens,
        }
    }

    /// Starts a new token "mark" and advances the iterator.
    fn mark_advance(&mut self) -> char {
        self.current_lo = self.cursor;
        self.current_line = self.line;
        self.advance()
    }

    /// Returns the next character and advances the iterator. Past the end of
    /// the input this returns `'\0'` without moving.
    fn advance(&mut self) -> char {
        let Some(c) = self.iter.next() else {
            return '\0';
        };
        self.cursor += c.len_utf8();
        if c == '\n' {
            self.line += 1;
        }
        c
    }

    /// Advances and returns the provided value.
    fn advance_with<T>(&mut self, value: T) -> T {
        self.advance();
        value
    }

    /// Returns the next character without advancing the iterator.
    fn peek(&mut self) -> char {
        self.iter.peek().copied().unwrap_or('\0')
    }

    /// A NUL in the source is an ordinary character, so the end of input is
    /// told apart through the iterator.
    fn is_at_end(&mut self) -> bool {
        self.iter.peek().is_none()
    }

    /// Returns the current span.
    fn span(&self) -> Span {
        Span::new_of_bounds(self.current_lo..self.cursor)
    }

    /// Returns the substring of the current marked bounds.
    fn substr(&self) -> &str {
        self.span().substr(self.src)
    }

    /// Produces a token using the marked bounds.
    fn produce(&mut self, kind: TokenKind) {
        let token = Token::new(kind, self.span(), self.current_line);
        self.tokens.push(token);
    }
}

pub mod extract {
    use super::*;

    pub fn int(token: Token, src: &str) -> Result<i64, ParseIntError> {
        debug_assert_eq!(token.kind, TokenKind::Number);
        token.span().substr(src).parse()
    }

    pub fn ident(token: Token, src: &str) -> Box<str> {
        debug_assert_eq!(token.kind, TokenKind::Identifier);
        token.span().substr(src).into()
    }

    pub fn string(token: Token, src: &str) -> Box<str> {
        debug_assert_eq!(token.kind, TokenKind::String);
        token.span().offset(1, -1).substr(src).into()
    }

    pub fn escaped_string(token: Token, src: &str) -> Box<str> {
        debug_assert_eq!(token.kind, TokenKind::EscapedString);
        let s = token.span().offset(1, -1).substr(src);
        perform_escape(s).into_boxed_str()
    }
}

fn perform_escape(raw: &str) -> String {
    let mut buf = String::with_capacity(raw.len());
    let mut escaped = false;
    for char in raw.chars() {
        let char = match (escaped, char) {
            (true, 'n') => '\n',
            (true, 't') => '\t',
            (true, 'r') => '\r',
            (true, '0') => '\0',
            (false, '\\') => {
                escaped = true;
                continue;
            }
            // `\"`, `\\` and any unknown escape map to the character itself
            (_, char) => char,
        };
        escaped = false;
        buf.push(char);
    }
    buf
}
