//! Bookkeeping shared by one code generation run.

use std::{collections::HashMap, fmt};

use crate::ast::FunctionDef;

/// Size of every stack slot, in bytes.
pub const SLOT_SIZE: u32 = 8;

/// First parameter lives above the saved `rbp` and the return address.
const FIRST_PARAM_OFFSET: u32 = 16;

/// The runtime kind of a value, as far as it can be told at compile time.
#[derive(Copy, Clone, Debug, PartialEq, Eq)]
pub enum ValueKind {
    Int,
    Bool,
    String,
}

#[derive(Clone, Debug, PartialEq, Eq)]
pub struct Variable {
    pub name: Box<str>,
    /// Distance from `rbp`. Added for parameters, subtracted for locals.
    pub offset: u32,
    pub size: u32,
    pub kind: ValueKind,
    /// Where the string currently held by this variable is stored, if known.
    pub string_label: Option<StrLabel>,
    pub is_param: bool,
}

impl Variable {
    pub fn address(&self) -> Address {
        Address {
            offset: self.offset,
            is_param: self.is_param,
        }
    }
}

/// A frame slot as an assembly memory operand, e.g. `[rbp - 8]`.
#[derive(Copy, Clone, Debug, PartialEq, Eq)]
pub struct Address {
    offset: u32,
    is_param: bool,
}

impl fmt::Display for Address {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let sign = if self.is_param { '+' } else { '-' };
        write!(f, "[rbp {sign} {}]", self.offset)
    }
}

/// Variables of one function-like scope, in declaration order.
///
/// Blocks do not open scopes, so names are unique across the whole table.
#[derive(Debug, Default)]
pub struct SymbolTable {
    variables: Vec<Variable>,
    locals: u32,
    /// Index of the most recent declaration, redeclarations included.
    last: Option<usize>,
}

impl SymbolTable {
    pub fn new() -> SymbolTable {
        SymbolTable::default()
    }

    /// Builds the table of a function whose arguments were pushed by the
    /// caller, binding the i-th parameter at `rbp + 16 + 8*i`.
    pub fn with_params<'a>(params: impl IntoIterator<Item = &'a str>) -> SymbolTable {
        let variables = params
            .into_iter()
            .zip(0..)
            .map(|(name, i): (&str, u32)| Variable {
                name: name.into(),
                offset: FIRST_PARAM_OFFSET + SLOT_SIZE * i,
                size: SLOT_SIZE,
                kind: ValueKind::Int,
                string_label: None,
                is_param: true,
            })
            .collect();
        SymbolTable {
            variables,
            locals: 0,
            last: None,
        }
    }

    /// Appends a local in the next free slot below `rbp`.
    ///
    /// On a name clash nothing is appended and the existing variable is
    /// returned as the error. It still counts as the latest declaration.
    pub fn declare(
        &mut self,
        name: &str,
        kind: ValueKind,
        string_label: Option<StrLabel>,
    ) -> Result<&Variable, &mut Variable> {
        if let Some(i) = self.position(name) {
            self.last = Some(i);
            return Err(&mut self.variables[i]);
        }
        self.locals += 1;
        self.variables.push(Variable {
            name: name.into(),
            offset: self.locals * SLOT_SIZE,
            size: SLOT_SIZE,
            kind,
            string_label,
            is_param: false,
        });
        let i = self.variables.len() - 1;
        self.last = Some(i);
        Ok(&self.variables[i])
    }

    pub fn lookup(&self, name: &str) -> Option<&Variable> {
        self.variables.iter().find(|v| &*v.name == name)
    }

    pub fn lookup_mut(&mut self, name: &str) -> Option<&mut Variable> {
        self.variables.iter_mut().find(|v| &*v.name == name)
    }

    /// The most recently declared variable.
    pub fn last(&self) -> Option<&Variable> {
        self.last.map(|i| &self.variables[i])
    }

    /// Number of locals declared so far.
    pub fn locals(&self) -> u32 {
        self.locals
    }

    pub fn iter(&self) -> impl Iterator<Item = &Variable> {
        self.variables.iter()
    }

    fn position(&self, name: &str) -> Option<usize> {
        self.variables.iter().position(|v| &*v.name == name)
    }
}

/// Label of a string table entry. Displays as `str_N`.
#[derive(Copy, Clone, Debug, PartialEq, Eq, Hash)]
pub struct StrLabel(u32);

impl fmt::Display for StrLabel {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "str_{}", self.0)
    }
}

#[derive(Clone, Debug, PartialEq, Eq)]
pub struct StringData {
    pub label: StrLabel,
    pub content: Box<str>,
    /// Whether the content was produced by folding a concatenation.
    pub is_computed: bool,
}

/// Append-only pool of string constants. Equal contents are not merged.
#[derive(Debug, Default)]
pub struct StringTable {
    strings: Vec<StringData>,
}

impl StringTable {
    pub fn new() -> StringTable {
        StringTable::default()
    }

    pub fn add(&mut self, content: impl Into<Box<str>>, is_computed: bool) -> StrLabel {
        let label = StrLabel(u32::try_from(self.strings.len()).expect("too many strings"));
        self.strings.push(StringData {
            label,
            content: content.into(),
            is_computed,
        });
        label
    }

    pub fn get(&self, label: StrLabel) -> Option<&StringData> {
        self.strings.get(label.0 as usize)
    }

    pub fn iter(&self) -> impl Iterator<Item = &StringData> {
        self.strings.iter()
    }

    pub fn len(&self) -> usize {
        self.strings.len()
    }

    pub fn is_empty(&self) -> bool {
        self.strings.is_empty()
    }
}

#[derive(Clone, Debug, PartialEq, Eq)]
pub struct ParamInfo {
    pub name: Box<str>,
    pub kind: ValueKind,
    pub is_const: bool,
}

#[derive(Clone, Debug, PartialEq, Eq)]
pub struct FunctionInfo {
    pub name: Box<str>,
    pub label: Box<str>,
    pub params: Vec<ParamInfo>,
    pub return_kind: ValueKind,
}

impl FunctionInfo {
    pub fn new(def: &FunctionDef) -> FunctionInfo {
        let name = def.name.name.clone();
        FunctionInfo {
            label: Self::label_for(&name).into(),
            params: def
                .params
                .iter()
                .map(|param| ParamInfo {
                    name: param.name.name.clone(),
                    kind: ValueKind::Int,
                    is_const: param.is_const,
                })
                .collect(),
            return_kind: ValueKind::Int,
            name,
        }
    }

    pub fn label_for(name: &str) -> String {
        format!("func_{name}")
    }
}

#[derive(Debug, Default)]
pub struct FunctionTable {
    functions: HashMap<Box<str>, FunctionInfo>,
}

impl FunctionTable {
    pub fn new() -> FunctionTable {
        FunctionTable::default()
    }

    /// Registers a function. Fails, keeping the first definition, if the name
    /// is already taken.
    pub fn define(&mut self, info: FunctionInfo) -> Result<(), ()> {
        if self.functions.contains_key(&info.name) {
            return Err(());
        }
        self.functions.insert(info.name.clone(), info);
        Ok(())
    }

    pub fn get(&self, name: &str) -> Option<&FunctionInfo> {
        self.functions.get(name)
    }

    pub fn len(&self) -> usize {
        self.functions.len()
    }

    pub fn is_empty(&self) -> bool {
        self.functions.is_empty()
    }
}

/// Per-compilation state.
#[derive(Debug, Default)]
pub struct CodegenContext {
    label_counter: u32,
    pub in_function: bool,
}

impl CodegenContext {
    /// Returns `<prefix>_<N>`, with `N` shared by every prefix.
    pub fn fresh_label(&mut self, prefix: &str) -> String {
        let label = format!("{prefix}_{}", self.label_counter);
        self.label_counter += 1;
        label
    }
}
