use std::{fmt::Write, format_args as f, marker::PhantomData, mem};

use tracing::debug;

use crate::{
    ast::{self, BinaryOperator, Expr, ExprKind, FunctionDef, Literal, Stmt, UnaryOperator},
    codegen::{
        tables::{
            CodegenContext, FunctionInfo, FunctionTable, StrLabel, StringTable, SymbolTable,
            ValueKind, SLOT_SIZE,
        },
        x86_64_env, Diagnostic, Output,
    },
};

const DEFAULT_CODE_CAPACITY: usize = 4 * 1024; // 4 KiB

pub struct Generator<E> {
    code: String,
    indent: bool,
    strings: StringTable,
    functions: FunctionTable,
    ctx: CodegenContext,
    diagnostics: Vec<Diagnostic>,
    _env: PhantomData<E>,
}

impl<E> Generator<E>
where
    E: x86_64_env::Env,
{
    pub fn new() -> Generator<E> {
        Generator {
            code: String::with_capacity(DEFAULT_CODE_CAPACITY),
            indent: false,
            strings: StringTable::new(),
            functions: FunctionTable::new(),
            ctx: CodegenContext::default(),
            diagnostics: Vec::new(),
            _env: PhantomData,
        }
    }

    pub fn generate(mut self, program: &ast::Program) -> Output {
        self.g_program_prologue();
        let functions = self.register_functions(program);
        self.g_entry(program);
        for def in functions {
            self.g_function(def);
        }
        self.g_data();

        debug!(
            bytes = self.code.len(),
            functions = self.functions.len(),
            strings = self.strings.len(),
            diagnostics = self.diagnostics.len(),
            "generated assembly",
        );
        Output {
            asm: self.code,
            diagnostics: self.diagnostics,
        }
    }
}

/// Program structure.
impl<E> Generator<E>
where
    E: x86_64_env::Env,
{
    fn g_program_prologue(&mut self) {
        self.out(f!("global {}", E::ENTRY_POINT));
        self.out_line();
        self.out(f!("section {}", E::SECTION_TEXT));
    }

    /// Fills the function table before any call site is lowered, returning
    /// the definitions which must be emitted.
    fn register_functions<'p>(&mut self, program: &'p ast::Program) -> Vec<&'p FunctionDef> {
        let mut defs = Vec::new();
        for stmt in &program.statements {
            let Stmt::FunctionDef(def) = stmt else {
                continue;
            };
            if self.functions.define(FunctionInfo::new(def)).is_ok() {
                defs.push(def);
            } else {
                self.diagnostic(Diagnostic::DuplicateFunction(def.name.name.clone()));
            }
        }
        defs
    }

    /// Lowers the top-level statements into the entry point. Falling off the
    /// end exits with the value of the last declared variable, or zero.
    fn g_entry(&mut self, program: &ast::Program) {
        let top_level: Vec<_> = program
            .statements
            .iter()
            .filter(|stmt| !matches!(stmt, Stmt::FunctionDef(_)))
            .collect();
        let locals: u32 = top_level.iter().map(|stmt| count_declarations(stmt)).sum();
        let mut symbols = SymbolTable::new();

        self.out(f!("{}:", E::ENTRY_POINT));
        self.indented(|this| {
            this.g_frame_setup(locals);
            for stmt in top_level {
                this.g_stmt(stmt, &mut symbols);
            }
            debug_assert!(symbols.locals() <= locals, "frame too small");
            match symbols.last() {
                Some(var) => this.out(f!("mov rdi, {}", var.address())),
                None => this.out("xor rdi, rdi"),
            }
            this.g_exit();
        });
    }

    fn g_function(&mut self, def: &FunctionDef) {
        let locals = count_declarations(&def.body);
        let mut symbols = SymbolTable::with_params(def.params.iter().map(|p| &*p.name.name));

        self.out(f!("{}:", FunctionInfo::label_for(&def.name.name)));
        let outer = mem::replace(&mut self.ctx.in_function, true);
        self.indented(|this| {
            this.g_frame_setup(locals);
            this.g_stmt(&def.body, &mut symbols);
            debug_assert!(symbols.locals() <= locals, "frame too small");
            this.out("xor rax, rax");
            this.g_return();
        });
        self.ctx.in_function = outer;
    }

    fn g_frame_setup(&mut self, locals: u32) {
        self.out("push rbp");
        self.out("mov rbp, rsp");
        if locals > 0 {
            self.out(f!("sub rsp, {}", locals * SLOT_SIZE));
        }
    }

    fn g_return(&mut self) {
        self.out("mov rsp, rbp");
        self.out("pop rbp");
        self.out("ret");
    }

    /// Exits the process with the status held in `rdi`.
    fn g_exit(&mut self) {
        self.out("mov rsp, rbp");
        self.out("pop rbp");
        self.out(f!("mov rax, {}", E::SYS_EXIT));
        self.out("syscall");
    }

    fn g_data(&mut self) {
        if self.strings.is_empty() {
            return;
        }
        let strings = mem::take(&mut self.strings);
        self.out_line();
        self.out(f!("section {}", E::SECTION_READ_ONLY_DATA));
        for data in strings.iter() {
            let label = data.label;
            self.out(f!("{label}: db {}", db_operands(&data.content)));
            self.out(f!("{label}_len equ $ - {label} - 1"));
        }
        self.strings = strings;
    }
}

/// Statements.
impl<E> Generator<E>
where
    E: x86_64_env::Env,
{
    fn g_stmt(&mut self, stmt: &Stmt, symbols: &mut SymbolTable) {
        match stmt {
            Stmt::Expr(expr) => {
                self.g_expr(expr, symbols);
            }
            Stmt::VarDecl {
                name, initializer, ..
            } => {
                let kind = self.infer_kind(initializer, symbols);
                let string_label = self.g_expr(initializer, symbols);
                let address = match symbols.declare(&name.name, kind, string_label) {
                    Ok(var) => var.address(),
                    Err(existing) => {
                        existing.kind = kind;
                        existing.string_label = string_label;
                        let address = existing.address();
                        self.diagnostic(Diagnostic::DuplicateVariable(name.name.clone()));
                        address
                    }
                };
                self.out(f!("mov {address}, rax"));
            }
            Stmt::Assign { name, value } => {
                let kind = self.infer_kind(value, symbols);
                let string_label = self.g_expr(value, symbols);
                // Unknown targets are skipped.
                if let Some(var) = symbols.lookup_mut(&name.name) {
                    var.kind = kind;
                    var.string_label = string_label;
                    let address = var.address();
                    self.out(f!("mov {address}, rax"));
                }
            }
            Stmt::Block(body) => {
                for stmt in body {
                    self.g_stmt(stmt, symbols);
                }
            }
            Stmt::If {
                condition,
                then_branch,
                else_branch,
            } => {
                let else_label = self.ctx.fresh_label("else");
                let end_label = self.ctx.fresh_label("endif");

                self.g_expr(condition, symbols);
                self.out("test rax, rax");
                if let Some(else_branch) = else_branch {
                    self.out(f!("jz {else_label}"));
                    self.g_stmt(then_branch, symbols);
                    self.out(f!("jmp {end_label}"));
                    self.out_label(&else_label);
                    self.g_stmt(else_branch, symbols);
                } else {
                    self.out(f!("jz {end_label}"));
                    self.g_stmt(then_branch, symbols);
                }
                self.out_label(&end_label);
            }
            Stmt::While { condition, body } => {
                let start_label = self.ctx.fresh_label("while_start");
                let end_label = self.ctx.fresh_label("while_end");

                self.out_label(&start_label);
                self.g_expr(condition, symbols);
                self.out("test rax, rax");
                self.out(f!("jz {end_label}"));
                self.g_stmt(body, symbols);
                self.out(f!("jmp {start_label}"));
                self.out_label(&end_label);
            }
            Stmt::Return(value) => {
                match value {
                    Some(value) => {
                        self.g_expr(value, symbols);
                    }
                    None => self.out("xor rax, rax"),
                }
                if self.ctx.in_function {
                    self.g_return();
                } else {
                    self.out("mov rdi, rax");
                    self.g_exit();
                }
            }
            Stmt::FunctionDef(def) => {
                self.diagnostic(Diagnostic::NestedFunction(def.name.name.clone()));
            }
        }
    }
}

/// Expressions. The value is left in `rax`; a string value also reports the
/// label of its data.
impl<E> Generator<E>
where
    E: x86_64_env::Env,
{
    fn g_expr(&mut self, expr: &Expr, symbols: &SymbolTable) -> Option<StrLabel> {
        match &expr.kind {
            ExprKind::Literal(Literal::Int(int)) => {
                self.out(f!("mov rax, {int}"));
                None
            }
            ExprKind::Literal(Literal::Bool(value)) => {
                self.out(f!("mov rax, {}", u8::from(*value)));
                None
            }
            ExprKind::Literal(Literal::String(string)) => {
                let label = self.strings.add(string.clone(), false);
                self.out(f!("lea rax, [rel {label}]"));
                Some(label)
            }
            ExprKind::Identifier(ident) => {
                let Some(var) = symbols.lookup(&ident.name) else {
                    self.soft_error(Diagnostic::UndefinedVariable(ident.name.clone()));
                    return None;
                };
                self.out(f!("mov rax, {}", var.address()));
                var.string_label
            }
            ExprKind::Unary { op, operand } => {
                self.g_expr(operand, symbols);
                match op {
                    UnaryOperator::Neg => self.out("neg rax"),
                    UnaryOperator::Not => {
                        self.out("test rax, rax");
                        self.out("sete al");
                        self.out("movzx rax, al");
                    }
                }
                None
            }
            ExprKind::Binary { op, lhs, rhs } => {
                if *op == BinaryOperator::Add
                    && (self.infer_kind(lhs, symbols) == ValueKind::String
                        || self.infer_kind(rhs, symbols) == ValueKind::String)
                {
                    return self.g_string_concat(expr, symbols);
                }
                self.g_binary(*op, lhs, rhs, symbols);
                None
            }
            ExprKind::Call { function, args } => {
                if &*function.name == "print" {
                    self.g_print(args, symbols);
                } else {
                    self.g_call(&function.name, args, symbols);
                }
                None
            }
        }
    }

    /// Evaluates the left side first, keeping it in `rbx` while the right
    /// side is evaluated into `rax`.
    fn g_binary(&mut self, op: BinaryOperator, lhs: &Expr, rhs: &Expr, symbols: &SymbolTable) {
        self.g_expr(lhs, symbols);
        self.out("push rax");
        self.g_expr(rhs, symbols);
        self.out("pop rbx");

        match op {
            BinaryOperator::Add => self.out("add rax, rbx"),
            BinaryOperator::Sub => {
                self.out("sub rbx, rax");
                self.out("mov rax, rbx");
            }
            BinaryOperator::Mul => self.out("imul rax, rbx"),
            BinaryOperator::Div | BinaryOperator::Mod => {
                self.out("mov rcx, rax");
                self.out("mov rax, rbx");
                self.out("cqo");
                self.out("idiv rcx");
                if op == BinaryOperator::Mod {
                    self.out("mov rax, rdx");
                }
            }
            BinaryOperator::Eq | BinaryOperator::Lt | BinaryOperator::Gt => {
                let set = match op {
                    BinaryOperator::Eq => "sete",
                    BinaryOperator::Lt => "setl",
                    _ => "setg",
                };
                self.out("cmp rbx, rax");
                self.out(f!("{set} al"));
                self.out("movzx rax, al");
            }
        }
    }

    /// Concatenation only happens at compile time, when both sides are known.
    fn g_string_concat(&mut self, expr: &Expr, symbols: &SymbolTable) -> Option<StrLabel> {
        let Some(content) = self.resolve_static(expr, symbols) else {
            self.soft_error(Diagnostic::RuntimeConcatenation);
            return None;
        };
        let label = self.strings.add(content, true);
        self.out(f!("lea rax, [rel {label}]"));
        Some(label)
    }

    /// Folds a string expression whose content is known at compile time.
    /// Nested folds do not register intermediate strings.
    fn resolve_static(&self, expr: &Expr, symbols: &SymbolTable) -> Option<String> {
        match &expr.kind {
            ExprKind::Literal(Literal::String(string)) => Some(string.to_string()),
            ExprKind::Identifier(ident) => {
                let var = symbols.lookup(&ident.name)?;
                if var.kind != ValueKind::String {
                    return None;
                }
                let data = self.strings.get(var.string_label?)?;
                Some(data.content.to_string())
            }
            ExprKind::Binary {
                op: BinaryOperator::Add,
                lhs,
                rhs,
            } => {
                let mut content = self.resolve_static(lhs, symbols)?;
                content.push_str(&self.resolve_static(rhs, symbols)?);
                Some(content)
            }
            _ => None,
        }
    }

    /// Writes a NUL-terminated string to stdout. Yields zero.
    fn g_print(&mut self, args: &[Expr], symbols: &SymbolTable) {
        let [arg] = args else {
            self.soft_error(Diagnostic::PrintArity(args.len()));
            return;
        };
        self.g_expr(arg, symbols);
        self.out("mov rsi, rax");
        // strlen
        self.out("mov rdi, rax");
        self.out("xor rcx, rcx");
        self.out("dec rcx");
        self.out("xor al, al");
        self.out("repne scasb");
        self.out("not rcx");
        self.out("dec rcx");
        self.out("mov rdx, rcx");
        // write(1, rsi, rdx)
        self.out(f!("mov rax, {}", E::SYS_WRITE));
        self.out("mov rdi, 1");
        self.out("syscall");
        self.out("xor rax, rax");
    }

    /// Arguments are pushed last to first and popped by the caller.
    fn g_call(&mut self, name: &str, args: &[Expr], symbols: &SymbolTable) {
        let Some(info) = self.functions.get(name) else {
            self.soft_error(Diagnostic::UnknownFunction(name.into()));
            return;
        };
        let label = info.label.clone();

        for arg in args.iter().rev() {
            self.g_expr(arg, symbols);
            self.out("push rax");
        }
        self.out(f!("call {label}"));
        if !args.is_empty() {
            let pushed = SLOT_SIZE as usize * args.len();
            self.out(f!("add rsp, {pushed}"));
        }
    }

    fn infer_kind(&self, expr: &Expr, symbols: &SymbolTable) -> ValueKind {
        match &expr.kind {
            ExprKind::Literal(Literal::Int(_)) => ValueKind::Int,
            ExprKind::Literal(Literal::Bool(_)) => ValueKind::Bool,
            ExprKind::Literal(Literal::String(_)) => ValueKind::String,
            ExprKind::Identifier(ident) => symbols
                .lookup(&ident.name)
                .map_or(ValueKind::Int, |var| var.kind),
            ExprKind::Binary { op, .. } if op.is_comparison() => ValueKind::Bool,
            ExprKind::Binary {
                op: BinaryOperator::Add,
                lhs,
                rhs,
            } => {
                if self.infer_kind(lhs, symbols) == ValueKind::String
                    || self.infer_kind(rhs, symbols) == ValueKind::String
                {
                    ValueKind::String
                } else {
                    ValueKind::Int
                }
            }
            ExprKind::Binary { .. } => ValueKind::Int,
            ExprKind::Unary {
                op: UnaryOperator::Not,
                ..
            } => ValueKind::Bool,
            ExprKind::Unary { .. } => ValueKind::Int,
            ExprKind::Call { function, .. } => self
                .functions
                .get(&function.name)
                .map_or(ValueKind::Int, |info| info.return_kind),
        }
    }
}

/// Utility functions.
impl<E> Generator<E>
where
    E: x86_64_env::Env,
{
    /// Prints a line.
    fn out(&mut self, f: impl std::fmt::Display) {
        let indent = if self.indent { "    " } else { "" };
        writeln!(self.code, "{indent}{f}").expect("code emit should be infallible");
    }

    /// Prints a label, never indented.
    fn out_label(&mut self, label: &str) {
        writeln!(self.code, "{label}:").expect("code emit should be infallible");
    }

    /// Prints an empty line.
    fn out_line(&mut self) {
        self.code.push('\n');
    }

    /// Writes in an indented block that is finished with an empty line.
    fn indented<T>(&mut self, f: impl FnOnce(&mut Self) -> T) -> T {
        self.indent = true;
        let res = f(self);
        self.indent = false;
        self.out_line();
        res
    }

    /// Records a diagnostic and leaves a marker comment in the output.
    fn diagnostic(&mut self, diagnostic: Diagnostic) {
        self.out(f!("; ERROR: {diagnostic}"));
        self.diagnostics.push(diagnostic);
    }

    /// Records a diagnostic for an expression which evaluates to zero instead.
    fn soft_error(&mut self, diagnostic: Diagnostic) {
        self.diagnostic(diagnostic);
        self.out("xor rax, rax");
    }
}

/// Counts every declaration the statement may execute. Both arms of an `if`
/// are counted, so the result is an upper bound of the slots used.
pub fn count_declarations(stmt: &Stmt) -> u32 {
    match stmt {
        Stmt::VarDecl { .. } => 1,
        Stmt::Block(body) => body.iter().map(count_declarations).sum(),
        Stmt::If {
            then_branch,
            else_branch,
            ..
        } => count_declarations(then_branch) + else_branch.as_deref().map_or(0, count_declarations),
        Stmt::While { body, .. } => count_declarations(body),
        Stmt::Expr(_) | Stmt::Assign { .. } | Stmt::Return(_) | Stmt::FunctionDef(_) => 0,
    }
}

/// Renders the operands of a `db` directive, NUL terminator included.
///
/// Printable bytes are grouped inside double quotes. Every other byte,
/// including `"`, is written as its decimal value.
fn db_operands(content: &str) -> String {
    let mut out = String::with_capacity(content.len() + 8);
    let mut quoted = false;
    for byte in content.bytes() {
        let printable = (byte.is_ascii_graphic() || byte == b' ') && byte != b'"';
        if printable {
            if !quoted {
                if !out.is_empty() {
                    out.push_str(", ");
                }
                out.push('"');
                quoted = true;
            }
            out.push(char::from(byte));
        } else {
            if quoted {
                out.push('"');
                quoted = false;
            }
            if !out.is_empty() {
                out.push_str(", ");
            }
            write!(out, "{byte}").expect("code emit should be infallible");
        }
    }
    if quoted {
        out.push('"');
    }
    if !out.is_empty() {
        out.push_str(", ");
    }
    out.push('0');
    out
}
