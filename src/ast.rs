// program ::= (definition | stmt)*
// definition ::= define ID '(' [ID (',' ID)*] ')' stmt
// stmt ::= const ID '=' expr ';'
//        | ID '=' expr ';'
//        | if '(' expr ')' stmt [else stmt]
//        | while '(' expr ')' stmt
//        | return [expr] ';'
//        | '{' stmt* '}'
//        | expr ';'
// expr ::= expr '==' expr
//        | expr '<' expr
//        | expr '>' expr
//        | expr '+' expr
//        | expr '-' expr
//        | expr '*' expr
//        | expr '/' expr
//        | expr '%' expr
//        | '-' expr
//        | '!' expr
//        | ID '(' [expr (',' expr)*] ')'
//        | '(' expr ')'
//        | ID
//        | integer
//        | string
//        | true
//        | false

// Precedence
//
// - !
// * / %
// + -
// < >
// ==

use crate::token::Span;

#[derive(Debug, PartialEq, Default)]
pub struct Program {
    pub statements: Vec<Stmt>,
}

#[derive(Debug, PartialEq)]
pub enum Stmt {
    Expr(Expr),
    VarDecl {
        name: Ident,
        initializer: Expr,
        /// Always set by the parser, which only accepts `const`. Trees built
        /// by hand may declare mutable variables.
        is_const: bool,
    },
    Assign {
        name: Ident,
        value: Expr,
    },
    /// Does not open a new scope.
    Block(Vec<Stmt>),
    If {
        condition: Expr,
        then_branch: Box<Stmt>,
        else_branch: Option<Box<Stmt>>,
    },
    While {
        condition: Expr,
        body: Box<Stmt>,
    },
    Return(Option<Expr>),
    FunctionDef(FunctionDef),
}

#[derive(Debug, PartialEq)]
pub struct FunctionDef {
    pub name: Ident,
    pub params: Vec<Param>,
    pub body: Box<Stmt>,
}

#[derive(Debug, PartialEq)]
pub struct Param {
    pub name: Ident,
    pub is_const: bool,
}

#[derive(Debug, PartialEq)]
pub struct Expr {
    pub kind: ExprKind,
    pub span: Span,
}

#[derive(Debug, PartialEq)]
pub enum ExprKind {
    Literal(Literal),
    Identifier(Ident),
    Binary {
        op: BinaryOperator,
        lhs: Box<Expr>,
        rhs: Box<Expr>,
    },
    Unary {
        op: UnaryOperator,
        operand: Box<Expr>,
    },
    Call {
        function: Ident,
        args: Vec<Expr>,
    },
}

#[derive(Clone, Debug, PartialEq, Eq)]
pub enum Literal {
    Int(i64),
    Bool(bool),
    String(Box<str>),
}

#[derive(Copy, Clone, Debug, PartialEq, Eq)]
pub enum UnaryOperator {
    /// `-`
    Neg,
    /// `!`
    Not,
}

#[derive(Copy, Clone, Debug, PartialEq, Eq)]
pub enum BinaryOperator {
    Add,
    Sub,
    Mul,
    Div,
    Mod,
    Eq,
    Lt,
    Gt,
}

impl BinaryOperator {
    pub fn is_comparison(self) -> bool {
        matches!(self, BinaryOperator::Eq | BinaryOperator::Lt | BinaryOperator::Gt)
    }
}

#[derive(Clone, Debug, PartialEq, Eq)]
pub struct Ident {
    pub name: Box<str>,
    pub span: Span,
}

impl std::fmt::Display for Ident {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(&self.name)
    }
}
