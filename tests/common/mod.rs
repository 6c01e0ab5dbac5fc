//! Executes generated assembly without an assembler.
//!
//! Only the instruction subset emitted by the Linux generator is understood.
//! Stack slots are 8 bytes wide and addressed relative to `rbp` or `rsp`;
//! string data is laid out contiguously from [`DATA_BASE`].

use std::{cmp::Ordering, collections::HashMap};

use anyhow::{bail, Context, Result};
use fent::{
    codegen::{self, Output, Target},
    parser,
};

const STACK_TOP: i64 = 0x7fff_0000;
const DATA_BASE: i64 = 0x1000_0000;
const STEP_LIMIT: usize = 1_000_000;

const SYS_WRITE: i64 = 1;
const SYS_EXIT: i64 = 60;

/// Observable effects of a finished run.
#[derive(Debug)]
pub struct Execution {
    /// `rdi` at the exit syscall, not truncated to a byte.
    pub status: i64,
    pub stdout: String,
}

pub fn compile(src: &str) -> Result<Output> {
    let program = parser::parse_program(src, &mut Vec::new())?;
    Ok(codegen::generate(&program, Target::x86_64_linux))
}

pub fn compile_and_run(src: &str) -> Result<Execution> {
    let output = compile(src)?;
    run(&output.asm)
}

pub fn run(asm: &str) -> Result<Execution> {
    Machine::load(asm)?.run()
}

/// The `db` contents of every string label, in emission order.
pub fn data_strings(asm: &str) -> Result<Vec<(String, Vec<u8>)>> {
    asm.lines()
        .filter_map(|line| line.split_once(": db "))
        .map(|(label, operands)| -> Result<_> { Ok((label.to_owned(), parse_db(operands)?)) })
        .collect()
}

#[derive(Copy, Clone, Debug, PartialEq, Eq, Hash)]
enum Reg {
    Rax,
    Rbx,
    Rcx,
    Rdx,
    Rsi,
    Rdi,
    Rbp,
    Rsp,
}

impl Reg {
    fn parse(name: &str) -> Option<Reg> {
        Some(match name {
            "rax" => Reg::Rax,
            "rbx" => Reg::Rbx,
            "rcx" => Reg::Rcx,
            "rdx" => Reg::Rdx,
            "rsi" => Reg::Rsi,
            "rdi" => Reg::Rdi,
            "rbp" => Reg::Rbp,
            "rsp" => Reg::Rsp,
            _ => return None,
        })
    }
}

#[derive(Clone, Debug)]
enum Operand {
    Reg(Reg),
    /// `al`, the low byte of `rax`.
    Al,
    Imm(i64),
    Mem { base: Reg, disp: i64 },
    Rel(String),
}

impl Operand {
    fn parse(text: &str) -> Result<Operand> {
        let text = text.trim();
        if text == "al" {
            return Ok(Operand::Al);
        }
        if let Some(reg) = Reg::parse(text) {
            return Ok(Operand::Reg(reg));
        }
        if let Some(inner) = text.strip_prefix('[').and_then(|t| t.strip_suffix(']')) {
            if let Some(label) = inner.strip_prefix("rel ") {
                return Ok(Operand::Rel(label.trim().to_owned()));
            }
            let parts: Vec<_> = inner.split_whitespace().collect();
            let (base, disp) = match parts.as_slice() {
                [base] => (*base, 0),
                [base, "+", n] => (*base, n.parse::<i64>()?),
                [base, "-", n] => (*base, -n.parse::<i64>()?),
                _ => bail!("unsupported memory operand {text}"),
            };
            let base = Reg::parse(base).with_context(|| format!("bad base in {text}"))?;
            return Ok(Operand::Mem { base, disp });
        }
        let imm = text
            .parse::<i64>()
            .with_context(|| format!("unsupported operand {text:?}"))?;
        Ok(Operand::Imm(imm))
    }
}

struct Instr {
    mnemonic: String,
    operands: Vec<Operand>,
    /// Line number in the assembly text, for error reports.
    line: usize,
}

struct Machine {
    code: Vec<Instr>,
    labels: HashMap<String, usize>,
    data: Vec<u8>,
    regs: HashMap<Reg, i64>,
    stack: HashMap<i64, i64>,
    zf: bool,
    order: Ordering,
    stdout: Vec<u8>,
}

impl Machine {
    fn load(asm: &str) -> Result<Machine> {
        let mut machine = Machine {
            code: Vec::new(),
            labels: HashMap::new(),
            data: Vec::new(),
            regs: HashMap::new(),
            stack: HashMap::new(),
            zf: false,
            order: Ordering::Equal,
            stdout: Vec::new(),
        };

        for (i, raw) in asm.lines().enumerate() {
            let line = raw.trim();
            if line.is_empty()
                || line.starts_with(';')
                || line.starts_with("global ")
                || line.starts_with("section ")
                || line.contains(" equ ")
            {
                continue;
            }
            if let Some((label, operands)) = line.split_once(": db ") {
                let address = DATA_BASE + i64::try_from(machine.data.len())?;
                machine.data.extend(parse_db(operands)?);
                machine.labels.insert(label.to_owned(), usize::try_from(address)?);
                continue;
            }
            if let Some(label) = line.strip_suffix(':') {
                machine.labels.insert(label.to_owned(), machine.code.len());
                continue;
            }

            let (mnemonic, rest) = line.split_once(' ').unwrap_or((line, ""));
            let operands = if mnemonic == "call" || mnemonic.starts_with('j') {
                // Jump targets are kept as labels.
                vec![Operand::Rel(rest.trim().to_owned())]
            } else if mnemonic == "repne" {
                Vec::new()
            } else {
                rest.split(',')
                    .filter(|o| !o.trim().is_empty())
                    .map(Operand::parse)
                    .collect::<Result<_>>()
                    .with_context(|| format!("line {}: {raw}", i + 1))?
            };
            machine.code.push(Instr {
                mnemonic: mnemonic.to_owned(),
                operands,
                line: i + 1,
            });
        }
        Ok(machine)
    }

    fn run(mut self) -> Result<Execution> {
        self.set(Reg::Rsp, STACK_TOP);
        // Returning from the entry point ends in an out-of-range index.
        self.push(-1);
        let mut pc = *self.labels.get("_start").context("missing _start")?;

        for _ in 0..STEP_LIMIT {
            let instr = self
                .code
                .get(pc)
                .with_context(|| format!("fell off the program at {pc}"))?;
            let mnemonic = instr.mnemonic.clone();
            let ops = instr.operands.clone();
            let line = instr.line;
            pc += 1;

            match (mnemonic.as_str(), ops.as_slice()) {
                ("mov", [dst, src]) => {
                    let value = self.read(src)?;
                    self.write(dst, value)?;
                }
                ("movzx", [dst, src]) => {
                    let value = self.read(src)? & 0xff;
                    self.write(dst, value)?;
                }
                ("lea", [Operand::Reg(dst), Operand::Rel(label)]) => {
                    let address = *self.labels.get(label).context("unknown data label")?;
                    self.set(*dst, i64::try_from(address)?);
                }
                ("push", [src]) => {
                    let value = self.read(src)?;
                    self.push(value);
                }
                ("pop", [Operand::Reg(dst)]) => {
                    let value = self.pop()?;
                    self.set(*dst, value);
                }
                ("add", [dst, src]) => self.arith(dst, src, i64::wrapping_add)?,
                ("sub", [dst, src]) => self.arith(dst, src, i64::wrapping_sub)?,
                ("imul", [dst, src]) => self.arith(dst, src, i64::wrapping_mul)?,
                ("xor", [dst, src]) => self.arith(dst, src, |a, b| a ^ b)?,
                ("neg", [Operand::Reg(r)]) => self.set(*r, self.get(*r).wrapping_neg()),
                ("not", [Operand::Reg(r)]) => self.set(*r, !self.get(*r)),
                ("dec", [Operand::Reg(r)]) => self.set(*r, self.get(*r).wrapping_sub(1)),
                ("test", [a, b]) => {
                    self.zf = self.read(a)? & self.read(b)? == 0;
                }
                ("cmp", [a, b]) => {
                    let (a, b) = (self.read(a)?, self.read(b)?);
                    self.zf = a == b;
                    self.order = a.cmp(&b);
                }
                ("sete", [dst]) => self.write(dst, i64::from(self.zf))?,
                ("setl", [dst]) => self.write(dst, i64::from(self.order == Ordering::Less))?,
                ("setg", [dst]) => self.write(dst, i64::from(self.order == Ordering::Greater))?,
                ("cqo", []) => {
                    let sign = if self.get(Reg::Rax) < 0 { -1 } else { 0 };
                    self.set(Reg::Rdx, sign);
                }
                ("idiv", [Operand::Reg(divisor)]) => {
                    let divisor = self.get(*divisor);
                    if divisor == 0 {
                        bail!("line {line}: division by zero");
                    }
                    let dividend = self.get(Reg::Rax);
                    self.set(Reg::Rax, dividend.wrapping_div(divisor));
                    self.set(Reg::Rdx, dividend.wrapping_rem(divisor));
                }
                ("jz", [Operand::Rel(label)]) => {
                    if self.zf {
                        pc = self.label(label)?;
                    }
                }
                ("jmp", [Operand::Rel(label)]) => pc = self.label(label)?,
                ("call", [Operand::Rel(label)]) => {
                    self.push(i64::try_from(pc)?);
                    pc = self.label(label)?;
                }
                ("ret", []) => {
                    let target = self.pop()?;
                    pc = usize::try_from(target).context("returned from the entry point")?;
                }
                ("repne", []) => self.repne_scasb()?,
                ("syscall", []) => match self.get(Reg::Rax) {
                    SYS_EXIT => {
                        return Ok(Execution {
                            status: self.get(Reg::Rdi),
                            stdout: String::from_utf8(self.stdout)?,
                        });
                    }
                    SYS_WRITE => {
                        let fd = self.get(Reg::Rdi);
                        if fd != 1 {
                            bail!("line {line}: write to unexpected descriptor {fd}");
                        }
                        let start = self.get(Reg::Rsi);
                        let len = self.get(Reg::Rdx);
                        for offset in 0..len {
                            let byte = self.byte_at(start + offset)?;
                            self.stdout.push(byte);
                        }
                        self.set(Reg::Rax, len);
                    }
                    other => bail!("line {line}: unsupported syscall {other}"),
                },
                (other, ops) => bail!("line {line}: unsupported instruction {other} {ops:?}"),
            }
        }
        bail!("step limit exceeded")
    }

    /// `repne scasb`: scans bytes at `rdi` until one equals `al` or `rcx`
    /// runs out.
    fn repne_scasb(&mut self) -> Result<()> {
        let needle = self.get(Reg::Rax) & 0xff;
        loop {
            if self.get(Reg::Rcx) == 0 {
                return Ok(());
            }
            let rdi = self.get(Reg::Rdi);
            let byte = i64::from(self.byte_at(rdi)?);
            self.set(Reg::Rdi, rdi + 1);
            self.set(Reg::Rcx, self.get(Reg::Rcx).wrapping_sub(1));
            if byte == needle {
                return Ok(());
            }
        }
    }

    fn arith(&mut self, dst: &Operand, src: &Operand, op: impl Fn(i64, i64) -> i64) -> Result<()> {
        let value = op(self.read(dst)?, self.read(src)?);
        self.write(dst, value)
    }

    fn read(&self, operand: &Operand) -> Result<i64> {
        Ok(match operand {
            Operand::Reg(reg) => self.get(*reg),
            Operand::Al => self.get(Reg::Rax) & 0xff,
            Operand::Imm(imm) => *imm,
            Operand::Mem { base, disp } => {
                let address = self.get(*base) + disp;
                *self
                    .stack
                    .get(&address)
                    .with_context(|| format!("read of uninitialized slot {address:#x}"))?
            }
            Operand::Rel(label) => bail!("cannot read label {label}"),
        })
    }

    fn write(&mut self, operand: &Operand, value: i64) -> Result<()> {
        match operand {
            Operand::Reg(reg) => self.set(*reg, value),
            Operand::Al => {
                let rax = self.get(Reg::Rax);
                self.set(Reg::Rax, (rax & !0xff) | (value & 0xff));
            }
            Operand::Mem { base, disp } => {
                let address = self.get(*base) + disp;
                self.stack.insert(address, value);
            }
            Operand::Imm(_) | Operand::Rel(_) => bail!("cannot write to {operand:?}"),
        }
        Ok(())
    }

    fn get(&self, reg: Reg) -> i64 {
        self.regs.get(&reg).copied().unwrap_or(0)
    }

    fn set(&mut self, reg: Reg, value: i64) {
        self.regs.insert(reg, value);
    }

    fn push(&mut self, value: i64) {
        let rsp = self.get(Reg::Rsp) - 8;
        self.set(Reg::Rsp, rsp);
        self.stack.insert(rsp, value);
    }

    fn pop(&mut self) -> Result<i64> {
        let rsp = self.get(Reg::Rsp);
        let value = self.stack.get(&rsp).copied().context("pop of empty slot")?;
        self.set(Reg::Rsp, rsp + 8);
        Ok(value)
    }

    fn label(&self, label: &str) -> Result<usize> {
        self.labels
            .get(label)
            .copied()
            .with_context(|| format!("unknown label {label}"))
    }

    fn byte_at(&self, address: i64) -> Result<u8> {
        usize::try_from(address - DATA_BASE)
            .ok()
            .and_then(|i| self.data.get(i).copied())
            .with_context(|| format!("read outside data at {address:#x}"))
    }
}

/// Parses the operands of a `db` directive: quoted runs and decimal bytes.
fn parse_db(operands: &str) -> Result<Vec<u8>> {
    let mut bytes = Vec::new();
    let mut rest = operands.trim();
    while !rest.is_empty() {
        if let Some(quoted) = rest.strip_prefix('"') {
            let end = quoted.find('"').context("unterminated db string")?;
            bytes.extend_from_slice(&quoted.as_bytes()[..end]);
            rest = &quoted[end + 1..];
        } else {
            let end = rest.find(',').unwrap_or(rest.len());
            bytes.push(rest[..end].trim().parse()?);
            rest = &rest[end..];
        }
        rest = rest.trim_start().strip_prefix(',').unwrap_or(rest).trim_start();
    }
    Ok(bytes)
}
