//! Abstract Syntax Tree for Veil.
//!
//! The tree mirrors the surface syntax: declarations are a sub-variant of
//! statements so they can appear inside blocks, expressions carry an
//! optional type slot filled in by the analyzer, and every node is
//! `Clone` so generic declarations can be deep-copied for monomorphization.
//!
//! Binary and unary expressions carry the lexical operator token; the MIR
//! and the code generator interpret it together with the operand types, so
//! the AST never needs a separate operator enum.

use crate::lexer::TokenKind;
use crate::types::Type;
use std::fmt;

// ============================================================
// Declarations
// ============================================================

#[derive(Debug, Clone, PartialEq)]
pub enum Decl {
    Var(VarDecl),
    Function(FunctionDecl),
    Struct(StructDecl),
    Enum(EnumDecl),
    Class(ClassDecl),
    Request(RequestDecl),
    Import(ImportDecl),
    Package(PackageDecl),
    Use(UseDecl),
}

/// `let [mut] name[: T] [= init];`
#[derive(Debug, Clone, PartialEq)]
pub struct VarDecl {
    pub name: String,
    pub ty: Option<Type>,
    pub init: Option<Expr>,
    pub is_mutable: bool,
    pub is_public: bool,
}

#[derive(Debug, Clone, PartialEq)]
pub struct Param {
    pub name: String,
    pub ty: Type,
}

/// A generic parameter, optionally constrained: `T ? Printable && Ordered`.
#[derive(Debug, Clone, PartialEq)]
pub struct GenericParam {
    pub name: String,
    pub constraint: Option<Constraint>,
}

/// A logical combination of request names.
#[derive(Debug, Clone, PartialEq)]
pub struct Constraint {
    pub items: Vec<ConstraintItem>,
}

#[derive(Debug, Clone, PartialEq)]
pub struct ConstraintItem {
    pub trait_name: String,
    /// How this item combines with the previous one. `None` on the first.
    pub logic: ConstraintLogic,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ConstraintLogic {
    None,
    And,
    Or,
}

#[derive(Debug, Clone, PartialEq)]
pub struct FunctionDecl {
    pub name: String,
    pub generic_params: Vec<GenericParam>,
    pub params: Vec<Param>,
    pub return_type: Type,
    /// Absent for `extern` declarations.
    pub body: Option<Block>,
    pub is_extern: bool,
    pub is_public: bool,
    pub is_variadic: bool,
}

impl FunctionDecl {
    /// The function's type as seen by callers.
    pub fn fn_type(&self) -> Type {
        Type::function(
            self.params.iter().map(|p| p.ty.clone()).collect(),
            self.return_type.clone(),
            self.is_variadic,
        )
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct MethodDecl {
    pub name: String,
    pub generic_params: Vec<GenericParam>,
    pub params: Vec<Param>,
    pub return_type: Type,
    /// Absent for request prototypes.
    pub body: Option<Block>,
    pub is_public: bool,
}

impl MethodDecl {
    pub fn fn_type(&self) -> Type {
        Type::function(
            self.params.iter().map(|p| p.ty.clone()).collect(),
            self.return_type.clone(),
            false,
        )
    }

    /// Destructors are methods named `~ClassName`.
    pub fn is_destructor(&self) -> bool {
        self.name.starts_with('~')
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct ConstructorDecl {
    pub name: String,
    pub params: Vec<Param>,
    pub body: Block,
    pub is_public: bool,
}

#[derive(Debug, Clone, PartialEq)]
pub enum ClassMember {
    Field(VarDecl),
    Method(MethodDecl),
    Constructor(ConstructorDecl),
}

#[derive(Debug, Clone, PartialEq)]
pub struct ClassDecl {
    pub name: String,
    pub members: Vec<ClassMember>,
    pub is_public: bool,
    pub generic_params: Vec<GenericParam>,
    pub requirements: Vec<String>,
}

impl ClassDecl {
    pub fn find_method(&self, name: &str) -> Option<&MethodDecl> {
        self.members.iter().find_map(|m| match m {
            ClassMember::Method(method) if method.name == name => Some(method),
            _ => None,
        })
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct StructDecl {
    pub name: String,
    pub members: Vec<VarDecl>,
    pub is_public: bool,
    pub generic_params: Vec<GenericParam>,
    pub requirements: Vec<String>,
}

#[derive(Debug, Clone, PartialEq)]
pub enum VariantBody {
    Unit,
    Tuple(Vec<Type>),
    Struct(Vec<VarDecl>),
}

#[derive(Debug, Clone, PartialEq)]
pub struct EnumVariantDecl {
    pub name: String,
    pub body: VariantBody,
}

#[derive(Debug, Clone, PartialEq)]
pub struct EnumDecl {
    pub name: String,
    pub variants: Vec<EnumVariantDecl>,
    pub is_public: bool,
    pub generic_params: Vec<GenericParam>,
    pub requirements: Vec<String>,
    /// The registered enum type, filled in by the analyzer.
    pub ty: Option<Type>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RequestKind {
    Class,
    Enum,
}

#[derive(Debug, Clone, PartialEq)]
pub enum RequestItem {
    Field(VarDecl),
    Method(MethodDecl),
    Variant(EnumVariantDecl),
}

#[derive(Debug, Clone, PartialEq)]
pub struct RequestMember {
    pub item: RequestItem,
    pub is_default: bool,
}

/// A request: the language's trait-like constraint. Only method signatures
/// are enforced at specialization time; default bodies are carried but not
/// yet instantiated.
#[derive(Debug, Clone, PartialEq)]
pub struct RequestDecl {
    pub name: String,
    pub kind: RequestKind,
    pub members: Vec<RequestMember>,
    pub bases: Vec<String>,
    pub generic_params: Vec<GenericParam>,
    pub is_public: bool,
}

#[derive(Debug, Clone, PartialEq)]
pub struct ImportDecl {
    pub path: String,
    /// `import std::x` paths are a no-op for the core.
    pub is_std: bool,
    pub alias: String,
}

#[derive(Debug, Clone, PartialEq)]
pub struct PackageDecl {
    pub name: String,
}

#[derive(Debug, Clone, PartialEq)]
pub struct UseDecl {
    pub path: String,
    pub alias: String,
}

// ============================================================
// Statements
// ============================================================

#[derive(Debug, Clone, PartialEq)]
pub enum Stmt {
    Decl(Decl),
    Block(Block),
    If(IfStmt),
    While(WhileStmt),
    DoWhile(DoWhileStmt),
    For(ForStmt),
    Switch(SwitchStmt),
    Break,
    Continue,
    Return(ReturnStmt),
    Expr(Expr),
}

/// A sequence of statements; introduces a scope.
#[derive(Debug, Clone, PartialEq)]
pub struct Block {
    pub statements: Vec<Stmt>,
}

#[derive(Debug, Clone, PartialEq)]
pub struct IfStmt {
    pub condition: Expr,
    pub then_block: Block,
    pub else_block: Option<Block>,
}

#[derive(Debug, Clone, PartialEq)]
pub struct WhileStmt {
    pub condition: Expr,
    pub body: Block,
}

#[derive(Debug, Clone, PartialEq)]
pub struct DoWhileStmt {
    pub body: Block,
    pub condition: Expr,
}

/// C-style `for (init; cond; step) { ... }`; every header slot is optional.
#[derive(Debug, Clone, PartialEq)]
pub struct ForStmt {
    pub init: Option<Box<Stmt>>,
    pub condition: Option<Expr>,
    pub step: Option<Expr>,
    pub body: Block,
}

#[derive(Debug, Clone, PartialEq)]
pub struct SwitchStmt {
    pub condition: Expr,
    pub cases: Vec<CaseStmt>,
}

#[derive(Debug, Clone, PartialEq)]
pub struct CaseStmt {
    /// `None` for the `default:` case.
    pub pattern: Option<Pattern>,
    pub body: Block,
    pub is_default: bool,
}

#[derive(Debug, Clone, PartialEq)]
pub struct ReturnStmt {
    pub value: Option<Expr>,
}

// ============================================================
// Expressions
// ============================================================

#[derive(Debug, Clone, PartialEq)]
pub struct Expr {
    pub kind: ExprKind,
    /// The analyzed type, filled in by semantic analysis.
    pub ty: Option<Type>,
}

impl Expr {
    pub fn new(kind: ExprKind) -> Self {
        Self { kind, ty: None }
    }

    pub fn ident(name: impl Into<String>) -> Self {
        Self::new(ExprKind::Identifier(name.into()))
    }

    /// The identifier name, when this expression is a plain identifier.
    pub fn as_ident(&self) -> Option<&str> {
        match &self.kind {
            ExprKind::Identifier(name) => Some(name),
            _ => None,
        }
    }
}

#[derive(Debug, Clone, PartialEq)]
pub enum ExprKind {
    Literal {
        value: LiteralValue,
        /// Set when the token carried a width suffix.
        explicit_ty: Option<Type>,
    },
    Identifier(String),
    Binary {
        op: TokenKind,
        left: Box<Expr>,
        right: Box<Expr>,
    },
    Unary {
        op: TokenKind,
        operand: Box<Expr>,
    },
    AddressOf(Box<Expr>),
    Deref(Box<Expr>),
    Call {
        callee: Box<Expr>,
        args: Vec<Expr>,
    },
    Member {
        base: Box<Expr>,
        member: String,
        /// `true` for `::`, `false` for `.`.
        is_static: bool,
    },
    StructLiteral {
        base: Box<Expr>,
        fields: Vec<FieldInit>,
    },
    ArrayLiteral(Vec<Expr>),
    Index {
        base: Box<Expr>,
        index: Box<Expr>,
    },
    Intrinsic {
        kind: IntrinsicKind,
        type_arg: Option<Type>,
        args: Vec<Expr>,
    },
    /// Fallible propagation: `expr?`.
    Question(Box<Expr>),
    /// `base[T1, ...]`; after analysis `mangled` holds the resolved name.
    Specialization {
        base: Box<Expr>,
        type_args: Vec<Type>,
        mangled: String,
    },
}

#[derive(Debug, Clone, PartialEq)]
pub enum LiteralValue {
    Int(i64),
    Float(f64),
    Bool(bool),
    Str(String),
    NullPtr,
}

#[derive(Debug, Clone, PartialEq)]
pub struct FieldInit {
    pub name: String,
    pub value: Expr,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum IntrinsicKind {
    Sizeof,
    Alignof,
    Offsetof,
    Malloc,
    Alloca,
    Free,
}

impl IntrinsicKind {
    pub fn name(&self) -> &'static str {
        match self {
            IntrinsicKind::Sizeof => "sizeof",
            IntrinsicKind::Alignof => "alignof",
            IntrinsicKind::Offsetof => "offsetof",
            IntrinsicKind::Malloc => "malloc",
            IntrinsicKind::Alloca => "alloca",
            IntrinsicKind::Free => "free",
        }
    }
}

// ============================================================
// Patterns
// ============================================================

#[derive(Debug, Clone, PartialEq)]
pub enum Pattern {
    /// A literal to compare against; boxed expression so the analyzer can
    /// annotate its type.
    Literal(Box<Expr>),
    /// Binds the scrutinee (or a payload element) to a fresh name.
    Identifier(String),
    /// `Enum::Variant(sub, ...)`, `Variant(sub, ...)`, or
    /// `Enum[T]::Variant(...)`; `enum_name` is empty for the bare form.
    Variant {
        enum_name: String,
        variant: String,
        sub_patterns: Vec<Pattern>,
    },
    Wildcard,
}

// ============================================================
// Display (used in diagnostics and MIR symbol derivation)
// ============================================================

impl fmt::Display for Expr {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match &self.kind {
            ExprKind::Literal { value, .. } => write!(f, "{value}"),
            ExprKind::Identifier(name) => write!(f, "{name}"),
            ExprKind::Binary { op, left, right } => {
                write!(f, "({left} {} {right})", op.op_str())
            }
            ExprKind::Unary { op, operand } => write!(f, "{}{operand}", op.op_str()),
            ExprKind::AddressOf(operand) => write!(f, "&{operand}"),
            ExprKind::Deref(operand) => write!(f, "*{operand}"),
            ExprKind::Call { callee, args } => {
                write!(f, "{callee}(")?;
                for (i, arg) in args.iter().enumerate() {
                    if i > 0 {
                        write!(f, ", ")?;
                    }
                    write!(f, "{arg}")?;
                }
                write!(f, ")")
            }
            ExprKind::Member {
                base,
                member,
                is_static,
            } => write!(f, "{base}{}{member}", if *is_static { "::" } else { "." }),
            ExprKind::StructLiteral { base, fields } => {
                write!(f, "{base} {{ ")?;
                for (i, field) in fields.iter().enumerate() {
                    if i > 0 {
                        write!(f, ", ")?;
                    }
                    write!(f, "{}: {}", field.name, field.value)?;
                }
                write!(f, " }}")
            }
            ExprKind::ArrayLiteral(elements) => {
                write!(f, "[")?;
                for (i, e) in elements.iter().enumerate() {
                    if i > 0 {
                        write!(f, ", ")?;
                    }
                    write!(f, "{e}")?;
                }
                write!(f, "]")
            }
            ExprKind::Index { base, index } => write!(f, "{base}[{index}]"),
            ExprKind::Intrinsic {
                kind,
                type_arg,
                args,
            } => {
                write!(f, "{}", kind.name())?;
                if let Some(ty) = type_arg {
                    write!(f, "[{ty}]")?;
                }
                write!(f, "(")?;
                for (i, arg) in args.iter().enumerate() {
                    if i > 0 {
                        write!(f, ", ")?;
                    }
                    write!(f, "{arg}")?;
                }
                write!(f, ")")
            }
            ExprKind::Question(operand) => write!(f, "{operand}?"),
            ExprKind::Specialization {
                base, type_args, ..
            } => {
                write!(f, "{base}[")?;
                for (i, t) in type_args.iter().enumerate() {
                    if i > 0 {
                        write!(f, ", ")?;
                    }
                    write!(f, "{t}")?;
                }
                write!(f, "]")
            }
        }
    }
}

impl fmt::Display for LiteralValue {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            LiteralValue::Int(v) => write!(f, "{v}"),
            LiteralValue::Float(v) => write!(f, "{v}"),
            LiteralValue::Bool(v) => write!(f, "{v}"),
            LiteralValue::Str(v) => write!(f, "{v}"),
            LiteralValue::NullPtr => write!(f, "nullptr"),
        }
    }
}
