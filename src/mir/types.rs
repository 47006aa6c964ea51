//! Core MIR types: instructions, basic blocks, functions, and the module.
//!
//! Instructions name their operands and destinations with plain strings
//! (`%x.addr`, `%t3`); within a function every destination is unique.
//! Binary and unary operations carry the lexical operator token; the code
//! generator interprets it together with the operands' carried types, so
//! signed versus unsigned behavior never needs a separate opcode here.

use std::fmt;

use crate::lexer::TokenKind;
use crate::types::Type;

#[derive(Debug, Clone)]
pub enum Inst {
    /// Stack slot of the given type.
    Alloca { dest: String, ty: Type },
    ConstInt { dest: String, value: i64 },
    ConstBool { dest: String, value: bool },
    ConstString { dest: String, value: String },
    ConstDouble { dest: String, value: f64 },
    UnaryOp {
        dest: String,
        operand: String,
        op: TokenKind,
    },
    BinOp {
        dest: String,
        left: String,
        right: String,
        op: TokenKind,
    },
    Store { src: String, dest: String },
    Load { dest: String, src: String },
    /// Address of a named field of a named struct.
    StructGep {
        dest: String,
        base: String,
        struct_name: String,
        field: String,
    },
    /// Address of an indexed element.
    ArrayGep {
        dest: String,
        base: String,
        index: String,
        elem_ty: Type,
    },
    Sizeof { dest: String, ty: Type },
    Alignof { dest: String, ty: Type },
    Offsetof {
        dest: String,
        ty: Type,
        field: String,
    },
    /// Load the discriminant of an enum value in memory.
    VariantTag { dest: String, enum_ptr: String },
    /// Write a discriminant and payload into an enum slot.
    VariantData {
        dest: String,
        enum_ptr: String,
        tag: usize,
        args: Vec<String>,
    },
    /// Read payload element `index` of variant `tag`.
    VariantExtract {
        dest: String,
        enum_ptr: String,
        tag: usize,
        index: usize,
        field_ty: Type,
    },
    /// Call a named function; `dest` is empty for void calls.
    Call {
        dest: String,
        callee: String,
        args: Vec<String>,
    },
    Ret { value: Option<String> },
    Br { target: String },
    CondBr {
        cond: String,
        then_label: String,
        else_label: String,
    },
}

impl Inst {
    /// Whether this instruction ends a basic block.
    pub fn is_terminator(&self) -> bool {
        matches!(self, Inst::Ret { .. } | Inst::Br { .. } | Inst::CondBr { .. })
    }

    /// The destination name this instruction defines, if any.
    pub fn dest(&self) -> Option<&str> {
        let dest = match self {
            Inst::Alloca { dest, .. }
            | Inst::ConstInt { dest, .. }
            | Inst::ConstBool { dest, .. }
            | Inst::ConstString { dest, .. }
            | Inst::ConstDouble { dest, .. }
            | Inst::UnaryOp { dest, .. }
            | Inst::BinOp { dest, .. }
            | Inst::Load { dest, .. }
            | Inst::StructGep { dest, .. }
            | Inst::ArrayGep { dest, .. }
            | Inst::Sizeof { dest, .. }
            | Inst::Alignof { dest, .. }
            | Inst::Offsetof { dest, .. }
            | Inst::VariantTag { dest, .. }
            | Inst::VariantData { dest, .. }
            | Inst::VariantExtract { dest, .. }
            | Inst::Call { dest, .. } => dest,
            Inst::Store { .. } | Inst::Ret { .. } | Inst::Br { .. } | Inst::CondBr { .. } => {
                return None
            }
        };
        if dest.is_empty() {
            None
        } else {
            Some(dest)
        }
    }

    /// The type this instruction carries, when it has one.
    pub fn carried_type(&self) -> Option<&Type> {
        match self {
            Inst::Alloca { ty, .. }
            | Inst::ArrayGep { elem_ty: ty, .. }
            | Inst::Sizeof { ty, .. }
            | Inst::Alignof { ty, .. }
            | Inst::Offsetof { ty, .. }
            | Inst::VariantExtract { field_ty: ty, .. } => Some(ty),
            _ => None,
        }
    }

    /// Operand names this instruction reads.
    pub fn operands(&self) -> Vec<&str> {
        match self {
            Inst::UnaryOp { operand, .. } => vec![operand],
            Inst::BinOp { left, right, .. } => vec![left, right],
            Inst::Store { src, dest } => vec![src, dest],
            Inst::Load { src, .. } => vec![src],
            Inst::StructGep { base, .. } => vec![base],
            Inst::ArrayGep { base, index, .. } => vec![base, index],
            Inst::VariantTag { enum_ptr, .. } => vec![enum_ptr],
            Inst::VariantData { enum_ptr, args, .. } => {
                let mut ops: Vec<&str> = vec![enum_ptr];
                ops.extend(args.iter().map(String::as_str));
                ops
            }
            Inst::VariantExtract { enum_ptr, .. } => vec![enum_ptr],
            Inst::Call { args, .. } => args.iter().map(String::as_str).collect(),
            Inst::Ret { value } => value.iter().map(String::as_str).collect(),
            Inst::CondBr { cond, .. } => vec![cond],
            _ => Vec::new(),
        }
    }

    /// Labels this terminator branches to.
    pub fn branch_targets(&self) -> Vec<&str> {
        match self {
            Inst::Br { target } => vec![target],
            Inst::CondBr {
                then_label,
                else_label,
                ..
            } => vec![then_label, else_label],
            _ => Vec::new(),
        }
    }
}

impl fmt::Display for Inst {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Inst::Alloca { dest, ty } => write!(f, "{dest} = alloca {ty}"),
            Inst::ConstInt { dest, value } => write!(f, "{dest} = const {value}"),
            Inst::ConstBool { dest, value } => write!(f, "{dest} = const {value}"),
            Inst::ConstString { dest, value } => write!(f, "{dest} = const \"{value}\""),
            Inst::ConstDouble { dest, value } => write!(f, "{dest} = const {value}"),
            Inst::UnaryOp { dest, operand, op } => {
                write!(f, "{dest} = unaryop {} {operand}", op.op_str())
            }
            Inst::BinOp {
                dest,
                left,
                right,
                op,
            } => write!(f, "{dest} = binop {} {left}, {right}", op.op_str()),
            Inst::Store { src, dest } => write!(f, "store {src}, {dest}"),
            Inst::Load { dest, src } => write!(f, "{dest} = load {src}"),
            Inst::StructGep {
                dest,
                base,
                struct_name,
                field,
            } => write!(f, "{dest} = struct_gep {base} ({struct_name}), {field}"),
            Inst::ArrayGep {
                dest,
                base,
                index,
                elem_ty,
            } => write!(f, "{dest} = array_gep {base}, {index} ({elem_ty})"),
            Inst::Sizeof { dest, ty } => write!(f, "{dest} = sizeof {ty}"),
            Inst::Alignof { dest, ty } => write!(f, "{dest} = alignof {ty}"),
            Inst::Offsetof { dest, ty, field } => write!(f, "{dest} = offsetof {ty}, {field}"),
            Inst::VariantTag { dest, enum_ptr } => write!(f, "{dest} = variant_tag {enum_ptr}"),
            Inst::VariantData {
                dest,
                enum_ptr,
                tag,
                args,
            } => {
                write!(f, "{dest} = variant_data {enum_ptr}, tag {tag}(")?;
                for (i, arg) in args.iter().enumerate() {
                    if i > 0 {
                        write!(f, ", ")?;
                    }
                    write!(f, "{arg}")?;
                }
                write!(f, ")")
            }
            Inst::VariantExtract {
                dest,
                enum_ptr,
                tag,
                index,
                ..
            } => write!(
                f,
                "{dest} = variant_extract {enum_ptr}, tag {tag}, index {index}"
            ),
            Inst::Call { dest, callee, args } => {
                if dest.is_empty() {
                    write!(f, "call {callee}(")?;
                } else {
                    write!(f, "{dest} = call {callee}(")?;
                }
                for (i, arg) in args.iter().enumerate() {
                    if i > 0 {
                        write!(f, ", ")?;
                    }
                    write!(f, "{arg}")?;
                }
                write!(f, ")")
            }
            Inst::Ret { value } => match value {
                Some(value) => write!(f, "ret {value}"),
                None => write!(f, "ret"),
            },
            Inst::Br { target } => write!(f, "br label %{target}"),
            Inst::CondBr {
                cond,
                then_label,
                else_label,
            } => write!(f, "br {cond}, label %{then_label}, label %{else_label}"),
        }
    }
}

/// A named basic block: instructions in order, the last one a terminator.
#[derive(Debug, Clone)]
pub struct BasicBlock {
    pub name: String,
    pub instructions: Vec<Inst>,
}

impl BasicBlock {
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            instructions: Vec::new(),
        }
    }

    pub fn push(&mut self, inst: Inst) {
        self.instructions.push(inst);
    }

    pub fn has_terminator(&self) -> bool {
        self.instructions
            .last()
            .is_some_and(|inst| inst.is_terminator())
    }
}

impl fmt::Display for BasicBlock {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        writeln!(f, "{}:", self.name)?;
        for inst in &self.instructions {
            writeln!(f, "  {inst}")?;
        }
        Ok(())
    }
}

/// A lowered function. Extern declarations carry no blocks.
#[derive(Debug, Clone)]
pub struct Function {
    pub name: String,
    pub return_type: Type,
    pub params: Vec<(String, Type)>,
    pub is_variadic: bool,
    pub blocks: Vec<BasicBlock>,
}

impl Function {
    pub fn new(name: impl Into<String>, return_type: Type) -> Self {
        Self {
            name: name.into(),
            return_type,
            params: Vec::new(),
            is_variadic: false,
            blocks: Vec::new(),
        }
    }

    pub fn entry_block(&self) -> Option<&BasicBlock> {
        self.blocks.first()
    }

    pub fn find_block(&self, name: &str) -> Option<&BasicBlock> {
        self.blocks.iter().find(|block| block.name == name)
    }

    /// Every instruction of every block, in layout order.
    pub fn instructions(&self) -> impl Iterator<Item = &Inst> {
        self.blocks.iter().flat_map(|block| block.instructions.iter())
    }
}

impl fmt::Display for Function {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "fn {}(", self.name)?;
        for (i, (name, ty)) in self.params.iter().enumerate() {
            if i > 0 {
                write!(f, ", ")?;
            }
            write!(f, "{name}: {ty}")?;
        }
        if self.is_variadic {
            if !self.params.is_empty() {
                write!(f, ", ")?;
            }
            write!(f, "...")?;
        }
        writeln!(f, "): {} {{", self.return_type)?;
        for block in &self.blocks {
            write!(f, "{block}")?;
        }
        writeln!(f, "}}")
    }
}

/// The MIR module: an ordered list of functions.
#[derive(Debug, Clone, Default)]
pub struct Module {
    pub functions: Vec<Function>,
}

impl Module {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn push(&mut self, function: Function) {
        self.functions.push(function);
    }

    pub fn find_function(&self, name: &str) -> Option<&Function> {
        self.functions.iter().find(|func| func.name == name)
    }
}

impl fmt::Display for Module {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        for function in &self.functions {
            writeln!(f, "{function}")?;
        }
        Ok(())
    }
}
