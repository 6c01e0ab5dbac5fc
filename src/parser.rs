use thiserror::Error;
use tracing::debug;

use crate::{
    ast::{
        BinaryOperator, Expr, ExprKind, FunctionDef, Ident, Literal, Param, Program, Stmt,
        UnaryOperator,
    },
    lexer::{self, extract},
    token::{Span, Token, TokenKind},
};

type Result<T, E = Error> = std::result::Result<T, E>;

/// How deep statements and expressions may nest before the parse is
/// rejected.
pub const MAX_NESTING: u32 = 128;

/// Lexes and parses a whole program.
///
/// `tokens` must be empty; it is filled with the lexed tokens.
pub fn parse_program(src: &str, tokens: &mut Vec<Token>) -> Result<Program> {
    assert!(tokens.is_empty());
    lexer::lex(src, tokens);
    parse_tokens(src, tokens)
}

/// Parses a program from an already lexed token sequence.
///
/// The first error aborts the parse, no partial tree is returned.
pub fn parse_tokens(src: &str, tokens: &[Token]) -> Result<Program> {
    let program = Parser::new(src, tokens).parse_program()?;
    debug!(statements = program.statements.len(), "parsed program");
    Ok(program)
}

/// Lexes and parses a single expression which must span the whole input.
pub fn parse_expr(src: &str, tokens: &mut Vec<Token>) -> Result<Expr> {
    assert!(tokens.is_empty());
    lexer::lex(src, tokens);
    let mut p = Parser::new(src, tokens);
    let expr = p.parse_expr()?;
    p.consume(TokenKind::Eof, "Expected end of input")?;
    Ok(expr)
}

struct Parser<'src, 'tok> {
    src: &'src str,
    tokens: &'tok [Token],
    cursor: usize,
    depth: u32,
}

impl Parser<'_, '_> {
    fn parse_program(&mut self) -> Result<Program> {
        let mut statements = Vec::with_capacity(16);
        while self.except([]) {
            let stmt = if self.is(TokenKind::Define) {
                self.parse_function_def()?
            } else {
                self.parse_stmt()?
            };
            statements.push(stmt);
        }
        Ok(Program { statements })
    }

    fn parse_function_def(&mut self) -> Result<Stmt> {
        self.consume(TokenKind::Define, "Expected 'define'")?;
        let name = self.parse_ident("Expected function name")?;
        self.consume(TokenKind::LParen, "Expected '(' after function name")?;
        let params = self.parse_list(TokenKind::RParen, |p| {
            let name = p.parse_ident("Expected parameter name")?;
            Ok(Param {
                name,
                is_const: true,
            })
        })?;
        self.consume(TokenKind::RParen, "Expected ')' after parameters")?;
        let body = self.parse_stmt()?;

        Ok(Stmt::FunctionDef(FunctionDef {
            name,
            params,
            body: Box::new(body),
        }))
    }

    fn parse_stmt(&mut self) -> Result<Stmt> {
        self.nested(Self::parse_stmt_kind)
    }

    fn parse_stmt_kind(&mut self) -> Result<Stmt> {
        match self.peek().kind {
            TokenKind::Const => self.parse_var_decl(),
            TokenKind::If => self.parse_if(),
            TokenKind::While => self.parse_while(),
            TokenKind::Return => self.parse_return(),
            TokenKind::LBrace => self.parse_block(),
            TokenKind::Define => {
                let token = self.peek();
                Err(self.error_at(token, ErrorKind::NestedFunctionDef))
            }
            TokenKind::Identifier => self.parse_assign_or_expr_stmt(),
            _ => self.parse_expr_stmt(),
        }
    }

    // const NAME = expr;
    fn parse_var_decl(&mut self) -> Result<Stmt> {
        self.advance(); // const
        let name = self.parse_ident("Expected variable name")?;
        self.consume(TokenKind::Eq, "Expected '=' after variable name")?;
        let initializer = self.parse_expr()?;
        self.consume(TokenKind::Semicolon, "Expected ';' after variable declaration")?;

        Ok(Stmt::VarDecl {
            name,
            initializer,
            is_const: true,
        })
    }

    // if (expr) stmt [else stmt]
    fn parse_if(&mut self) -> Result<Stmt> {
        self.advance(); // if
        self.consume(TokenKind::LParen, "Expected '(' after 'if'")?;
        let condition = self.parse_expr()?;
        self.consume(TokenKind::RParen, "Expected ')' after if condition")?;

        let then_branch = Box::new(self.parse_stmt()?);
        let else_branch = if self.take(TokenKind::Else) {
            Some(Box::new(self.parse_stmt()?))
        } else {
            None
        };

        Ok(Stmt::If {
            condition,
            then_branch,
            else_branch,
        })
    }

    // while (expr) stmt
    fn parse_while(&mut self) -> Result<Stmt> {
        self.advance(); // while
        self.consume(TokenKind::LParen, "Expected '(' after 'while'")?;
        let condition = self.parse_expr()?;
        self.consume(TokenKind::RParen, "Expected ')' after while condition")?;
        let body = Box::new(self.parse_stmt()?);

        Ok(Stmt::While { condition, body })
    }

    // return [expr];
    fn parse_return(&mut self) -> Result<Stmt> {
        self.advance(); // return
        let value = if self.is(TokenKind::Semicolon) {
            None
        } else {
            Some(self.parse_expr()?)
        };
        self.consume(TokenKind::Semicolon, "Expected ';' after return statement")?;

        Ok(Stmt::Return(value))
    }

    // { stmt* }
    fn parse_block(&mut self) -> Result<Stmt> {
        self.advance(); // {
        let mut statements = Vec::new();
        while self.except([TokenKind::RBrace]) {
            statements.push(self.parse_stmt()?);
        }
        self.consume(TokenKind::RBrace, "Expected '}' after block")?;

        Ok(Stmt::Block(statements))
    }

    /// `NAME = expr;` needs a second token of lookahead to be told apart from
    /// an expression statement starting with an identifier, so the cursor is
    /// restored if no `=` follows the name.
    fn parse_assign_or_expr_stmt(&mut self) -> Result<Stmt> {
        let saved = self.cursor;
        let target = self.advance();
        if self.take(TokenKind::Eq) {
            let name = self.ident(target);
            let value = self.parse_expr()?;
            self.consume(TokenKind::Semicolon, "Expected ';' after assignment")?;
            return Ok(Stmt::Assign { name, value });
        }
        self.cursor = saved;
        self.parse_expr_stmt()
    }

    // expr;
    fn parse_expr_stmt(&mut self) -> Result<Stmt> {
        let expr = self.parse_expr()?;
        self.consume(TokenKind::Semicolon, "Expected ';' after expression")?;
        Ok(Stmt::Expr(expr))
    }

    fn parse_expr(&mut self) -> Result<Expr> {
        self.nested(Self::parse_equality)
    }

    fn parse_equality(&mut self) -> Result<Expr> {
        self.parse_left_assoc(&[TokenKind::EqEq], Self::parse_comparison)
    }

    fn parse_comparison(&mut self) -> Result<Expr> {
        self.parse_left_assoc(&[TokenKind::Less, TokenKind::Greater], Self::parse_term)
    }

    fn parse_term(&mut self) -> Result<Expr> {
        self.parse_left_assoc(&[TokenKind::Plus, TokenKind::Minus], Self::parse_factor)
    }

    fn parse_factor(&mut self) -> Result<Expr> {
        self.parse_left_assoc(
            &[TokenKind::Star, TokenKind::Slash, TokenKind::Percent],
            Self::parse_unary,
        )
    }

    /// Parses `operand (op operand)*` for one precedence level, folding to the
    /// left.
    fn parse_left_assoc(
        &mut self,
        operators: &[TokenKind],
        parse_operand: impl Fn(&mut Self) -> Result<Expr>,
    ) -> Result<Expr> {
        let mut lhs = parse_operand(self)?;
        while operators.contains(&self.peek().kind) {
            let op = Self::binary_operator(self.advance().kind);
            let rhs = parse_operand(self)?;

            let span = lhs.span.to(rhs.span);
            lhs = Expr {
                kind: ExprKind::Binary {
                    op,
                    lhs: Box::new(lhs),
                    rhs: Box::new(rhs),
                },
                span,
            };
        }
        Ok(lhs)
    }

    fn binary_operator(kind: TokenKind) -> BinaryOperator {
        match kind {
            TokenKind::EqEq => BinaryOperator::Eq,
            TokenKind::Less => BinaryOperator::Lt,
            TokenKind::Greater => BinaryOperator::Gt,
            TokenKind::Plus => BinaryOperator::Add,
            TokenKind::Minus => BinaryOperator::Sub,
            TokenKind::Star => BinaryOperator::Mul,
            TokenKind::Slash => BinaryOperator::Div,
            TokenKind::Percent => BinaryOperator::Mod,
            _ => unreachable!(),
        }
    }

    fn parse_unary(&mut self) -> Result<Expr> {
        let op = match self.peek().kind {
            TokenKind::Minus => UnaryOperator::Neg,
            TokenKind::Bang => UnaryOperator::Not,
            _ => return self.parse_primary(),
        };
        let op_token = self.advance();
        let operand = self.nested(Self::parse_unary)?;

        let span = op_token.span().to(operand.span);
        Ok(Expr {
            kind: ExprKind::Unary {
                op,
                operand: Box::new(operand),
            },
            span,
        })
    }

    fn parse_primary(&mut self) -> Result<Expr> {
        let token = self.advance();
        let kind = match token.kind {
            TokenKind::Number => {
                let Ok(value) = extract::int(token, self.src) else {
                    return Err(self.error_at(token, ErrorKind::ParseInt));
                };
                ExprKind::Literal(Literal::Int(value))
            }
            TokenKind::String => ExprKind::Literal(Literal::String(extract::string(token, self.src))),
            TokenKind::EscapedString => {
                ExprKind::Literal(Literal::String(extract::escaped_string(token, self.src)))
            }
            TokenKind::True => ExprKind::Literal(Literal::Bool(true)),
            TokenKind::False => ExprKind::Literal(Literal::Bool(false)),

            // Call: ID ( [expr [, expr]*] )
            TokenKind::Identifier => {
                let ident = self.ident(token);
                if !self.take(TokenKind::LParen) {
                    return Ok(Expr {
                        kind: ExprKind::Identifier(ident),
                        span: token.span(),
                    });
                }
                let args = self.parse_list(TokenKind::RParen, Self::parse_expr)?;
                let end = self.consume(TokenKind::RParen, "Expected ')' after arguments")?;
                return Ok(Expr {
                    kind: ExprKind::Call {
                        function: ident,
                        args,
                    },
                    span: token.span().to(end.span()),
                });
            }

            // Grouping: ( expr )
            TokenKind::LParen => {
                let mut expr = self.parse_expr()?;
                let end = self.consume(TokenKind::RParen, "Expected ')' after expression")?;
                expr.span = token.span().to(end.span());
                return Ok(expr);
            }

            actual => return Err(self.error_at(token, ErrorKind::ExpectedExpr { actual })),
        };

        Ok(Expr {
            kind,
            span: token.span(),
        })
    }

    /// Parses `item (, item)*` unless `end_delim` is current. Does **NOT**
    /// consume the end delimiter.
    fn parse_list<T>(
        &mut self,
        end_delim: TokenKind,
        parse_item: impl Fn(&mut Self) -> Result<T>,
    ) -> Result<Vec<T>> {
        let mut items = Vec::new();
        if self.is(end_delim) {
            return Ok(items);
        }
        loop {
            items.push(parse_item(self)?);
            if !self.take(TokenKind::Comma) {
                break;
            }
        }
        Ok(items)
    }

    fn parse_ident(&mut self, expected: &'static str) -> Result<Ident> {
        let token = self.consume(TokenKind::Identifier, expected)?;
        Ok(self.ident(token))
    }

    fn ident(&self, token: Token) -> Ident {
        Ident {
            name: extract::ident(token, self.src),
            span: token.span(),
        }
    }
}

impl Parser<'_, '_> {
    fn new<'src, 'tok>(src: &'src str, tokens: &'tok [Token]) -> Parser<'src, 'tok> {
        let mut p = Parser {
            src,
            tokens,
            cursor: 0,
            depth: 0,
        };
        p.setup();
        p
    }

    /// Builds an error located at `token`. Error tokens produced by the lexer
    /// take precedence over the parser's own expectation.
    fn error_at(&self, token: Token, kind: ErrorKind) -> Error {
        let kind = if token.kind.is_error() {
            ErrorKind::Lexer(token.kind)
        } else {
            kind
        };
        Error {
            kind,
            span: token.span(),
            line: token.line(),
        }
    }

    /// Runs `parse` one nesting level deeper, failing once
    /// [`MAX_NESTING`] is reached.
    fn nested<T>(&mut self, parse: impl FnOnce(&mut Self) -> Result<T>) -> Result<T> {
        if self.depth >= MAX_NESTING {
            let token = self.peek();
            return Err(self.error_at(token, ErrorKind::TooDeep));
        }
        self.depth += 1;
        let result = parse(self);
        self.depth -= 1;
        result
    }

    /// Setups the parser, skipping any trivia if necessary.
    fn setup(&mut self) {
        while self.peek().kind.is_trivia() {
            self.cursor += 1;
        }
    }

    /// Returns the current token.
    #[inline]
    fn peek(&self) -> Token {
        match self.tokens.get(self.cursor) {
            Some(token) => *token,
            None => Token::eof_for(self.src),
        }
    }

    /// Returns the current token and advances. Skips any trivia. Never moves
    /// past the end of input.
    fn advance(&mut self) -> Token {
        let c = self.peek(); // Before any advancement
        if !c.is_eof() {
            while {
                self.cursor += 1;
                self.peek().kind.is_trivia()
            } {}
        }
        c
    }

    /// Checks whether the current token matches the given one.
    fn is(&self, expect: TokenKind) -> bool {
        self.peek().kind == expect
    }

    /// Advances if the current token matches the provided one, returning true.
    /// If not, returns false and doesn't advance.
    fn take(&mut self, expect: TokenKind) -> bool {
        if self.is(expect) {
            self.advance();
            true
        } else {
            false
        }
    }

    /// Advances if the current token matches the provided one. If not, fails
    /// with the `expected` message.
    fn consume(&mut self, expect: TokenKind, expected: &'static str) -> Result<Token> {
        let c = self.peek();
        if c.kind == expect {
            self.advance();
            Ok(c)
        } else {
            Err(self.error_at(
                c,
                ErrorKind::Unexpected {
                    expected,
                    actual: c.kind,
                },
            ))
        }
    }

    /// Returns true while the current token does *not* match one of the
    /// provided ones. [`TokenKind::Eof`] is implicitly included in the list.
    ///
    /// This won't advance the cursor.
    fn except(&self, except: impl IntoIterator<Item = TokenKind>) -> bool {
        let c = self.peek();
        for e in except {
            if c.kind == e {
                return false;
            }
        }
        c.kind != TokenKind::Eof
    }
}

/// A parse failure. Displays as `<expectation> at line <line>`.
#[derive(Clone, Debug, PartialEq, Eq, Error)]
#[error("{kind} at line {line}")]
pub struct Error {
    pub kind: ErrorKind,
    pub span: Span,
    pub line: u32,
}

#[derive(Clone, Debug, PartialEq, Eq, Error)]
pub enum ErrorKind {
    #[error("{expected}")]
    Unexpected {
        expected: &'static str,
        actual: TokenKind,
    },
    #[error("Expected expression")]
    ExpectedExpr { actual: TokenKind },
    #[error("Function definitions are only allowed at top level")]
    NestedFunctionDef,
    #[error("Integer literal out of range")]
    ParseInt,
    #[error("Nesting too deep")]
    TooDeep,
    /// A token kind which holds the [`TokenKind::is_error`] property.
    #[error("{}", .0.describe())]
    Lexer(TokenKind),
}
