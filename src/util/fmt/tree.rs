use std::io::Write;

use crate::ast::*;

const INDENT_WIDTH: usize = 2;

fn sp(w: &mut impl Write, i: usize) -> std::io::Result<()> {
    write!(w, "{:width$}", "", width = i * INDENT_WIDTH)
}

pub fn print_program_string(program: &Program) -> String {
    let mut buf = Vec::with_capacity(1024);
    print_program(&mut buf, program).unwrap();
    String::from_utf8(buf).unwrap()
}

pub fn print_expr_string(expr: &Expr) -> String {
    let mut buf = Vec::with_capacity(512);
    print_expr(&mut buf, 0, expr).unwrap();
    String::from_utf8(buf).unwrap()
}

pub fn print_program(w: &mut impl Write, program: &Program) -> std::io::Result<()> {
    for stmt in &program.statements {
        print_stmt(w, 0, stmt)?;
    }
    Ok(())
}

fn print_stmt(w: &mut impl Write, i: usize, stmt: &Stmt) -> std::io::Result<()> {
    sp(w, i)?;
    match stmt {
        Stmt::Expr(expr) => {
            writeln!(w, "expr")?;
            print_expr(w, i + 1, expr)?;
        }
        Stmt::VarDecl {
            name,
            initializer,
            is_const,
        } => {
            let keyword = if *is_const { "const" } else { "var" };
            writeln!(w, "{keyword} {name}")?;
            print_expr(w, i + 1, initializer)?;
        }
        Stmt::Assign { name, value } => {
            writeln!(w, "assign {name}")?;
            print_expr(w, i + 1, value)?;
        }
        Stmt::Block(body) => {
            writeln!(w, "block")?;
            for stmt in body {
                print_stmt(w, i + 1, stmt)?;
            }
        }
        Stmt::If {
            condition,
            then_branch,
            else_branch,
        } => {
            writeln!(w, "if")?;
            print_expr(w, i + 1, condition)?;
            sp(w, i + 1)?;
            writeln!(w, "then")?;
            print_stmt(w, i + 2, then_branch)?;
            if let Some(else_branch) = else_branch {
                sp(w, i + 1)?;
                writeln!(w, "else")?;
                print_stmt(w, i + 2, else_branch)?;
            }
        }
        Stmt::While { condition, body } => {
            writeln!(w, "while")?;
            print_expr(w, i + 1, condition)?;
            sp(w, i + 1)?;
            writeln!(w, "do")?;
            print_stmt(w, i + 2, body)?;
        }
        Stmt::Return(value) => {
            writeln!(w, "return")?;
            if let Some(value) = value {
                print_expr(w, i + 1, value)?;
            }
        }
        Stmt::FunctionDef(FunctionDef { name, params, body }) => {
            write!(w, "define {name}(")?;
            for (idx, param) in params.iter().enumerate() {
                if idx > 0 {
                    write!(w, ", ")?;
                }
                write!(w, "{}", param.name)?;
            }
            writeln!(w, ")")?;
            print_stmt(w, i + 1, body)?;
        }
    }
    Ok(())
}

pub fn print_expr(w: &mut impl Write, i: usize, expr: &Expr) -> std::io::Result<()> {
    sp(w, i)?;
    let span = expr.span;
    match &expr.kind {
        ExprKind::Literal(Literal::Int(val)) => {
            writeln!(w, "int {val} ({span})")?;
        }
        ExprKind::Literal(Literal::Bool(val)) => {
            writeln!(w, "bool {val} ({span})")?;
        }
        ExprKind::Literal(Literal::String(val)) => {
            writeln!(w, "string {val:?} ({span})")?;
        }
        ExprKind::Identifier(ident) => {
            writeln!(w, "ident {ident} ({span})")?;
        }
        ExprKind::Binary { op, lhs, rhs } => {
            writeln!(w, "binary {op:?} ({span})")?;
            print_expr(w, i + 1, lhs)?;
            print_expr(w, i + 1, rhs)?;
        }
        ExprKind::Unary { op, operand } => {
            writeln!(w, "unary {op:?} ({span})")?;
            print_expr(w, i + 1, operand)?;
        }
        ExprKind::Call { function, args } => {
            writeln!(w, "call {function} ({span})")?;
            if !args.is_empty() {
                sp(w, i + 1)?;
                writeln!(w, "arguments")?;
                for arg in args {
                    print_expr(w, i + 2, arg)?;
                }
            }
        }
    }
    Ok(())
}
