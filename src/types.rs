//! The Veil type algebra.
//!
//! Types are immutable, reference-counted handles shared across the AST,
//! the analyzer, and the MIR. Primitives are process-wide singletons.
//! Structural equality requires kind match and recursive equality on
//! children; named struct/class/enum types compare by name. The textual
//! form produced by `Display` is load-bearing: mangled names are derived
//! from it.

use parking_lot::RwLock;
use std::collections::BTreeMap;
use std::fmt;
use std::sync::{Arc, OnceLock};

/// A type-parameter -> concrete-type substitution mapping.
pub type TypeMap = BTreeMap<String, Type>;

/// A shared, immutable type handle.
#[derive(Debug, Clone)]
pub struct Type(Arc<TypeKind>);

#[derive(Debug)]
pub enum TypeKind {
    I8,
    I16,
    I32,
    I64,
    U8,
    U16,
    U32,
    U64,
    F32,
    F64,
    Bool,
    Void,
    Pointer(Type),
    Array(Type, usize),
    Function {
        params: Vec<Type>,
        ret: Type,
        variadic: bool,
    },
    Struct(StructDef),
    Enum(EnumDef),
    /// An unresolved generic parameter, optionally carrying the name of a
    /// request constraint.
    Param { name: String, constraint: String },
}

/// A named struct or class field.
#[derive(Debug, Clone)]
pub struct Field {
    pub name: String,
    pub ty: Type,
    pub is_public: bool,
}

/// A method entry on a class type: name, function type, visibility.
#[derive(Debug, Clone)]
pub struct Method {
    pub name: String,
    pub ty: Type,
    pub is_public: bool,
}

/// A struct or class type. The method table is installed after the type is
/// registered, because method signatures may refer back to the class through
/// `Self`; it is behind a lock so every holder of the handle observes the
/// installed table.
#[derive(Debug)]
pub struct StructDef {
    pub name: String,
    pub fields: Vec<Field>,
    methods: RwLock<Vec<Method>>,
    pub is_class: bool,
}

impl StructDef {
    pub fn find_field_index(&self, field: &str) -> Option<usize> {
        self.fields.iter().position(|f| f.name == field)
    }

    pub fn find_field(&self, field: &str) -> Option<&Field> {
        self.fields.iter().find(|f| f.name == field)
    }

    pub fn find_method(&self, method: &str) -> Option<Method> {
        self.methods.read().iter().find(|m| m.name == method).cloned()
    }

    pub fn methods(&self) -> Vec<Method> {
        self.methods.read().clone()
    }

    pub fn set_methods(&self, methods: Vec<Method>) {
        *self.methods.write() = methods;
    }
}

/// An enum type with its variant list.
#[derive(Debug)]
pub struct EnumDef {
    pub name: String,
    pub variants: Vec<Variant>,
}

impl EnumDef {
    pub fn find_variant(&self, name: &str) -> Option<&Variant> {
        self.variants.iter().find(|v| v.name == name)
    }

    pub fn find_variant_index(&self, name: &str) -> Option<usize> {
        self.variants.iter().position(|v| v.name == name)
    }
}

/// One enum variant: unit, tuple payload, or struct payload.
#[derive(Debug, Clone)]
pub struct Variant {
    pub name: String,
    pub payload: VariantPayload,
}

#[derive(Debug, Clone)]
pub enum VariantPayload {
    Unit,
    Tuple(Vec<Type>),
    Struct(Vec<Field>),
}

impl Variant {
    pub fn field_count(&self) -> usize {
        match &self.payload {
            VariantPayload::Unit => 0,
            VariantPayload::Tuple(tys) => tys.len(),
            VariantPayload::Struct(fields) => fields.len(),
        }
    }

    /// The type of payload element `index`.
    pub fn field_type(&self, index: usize) -> Option<Type> {
        match &self.payload {
            VariantPayload::Unit => None,
            VariantPayload::Tuple(tys) => tys.get(index).cloned(),
            VariantPayload::Struct(fields) => fields.get(index).map(|f| f.ty.clone()),
        }
    }
}

macro_rules! primitive {
    ($fname:ident, $variant:ident) => {
        pub fn $fname() -> Type {
            static CELL: OnceLock<Type> = OnceLock::new();
            CELL.get_or_init(|| Type(Arc::new(TypeKind::$variant))).clone()
        }
    };
}

impl Type {
    primitive!(i8, I8);
    primitive!(i16, I16);
    primitive!(i32, I32);
    primitive!(i64, I64);
    primitive!(u8, U8);
    primitive!(u16, U16);
    primitive!(u32, U32);
    primitive!(u64, U64);
    primitive!(f32, F32);
    primitive!(f64, F64);
    primitive!(bool, Bool);
    primitive!(void, Void);

    /// Pointer-to-`i8`, the type of string literals.
    pub fn i8_ptr() -> Type {
        static CELL: OnceLock<Type> = OnceLock::new();
        CELL.get_or_init(|| Type::pointer(Type::i8())).clone()
    }

    pub fn pointer(base: Type) -> Type {
        Type(Arc::new(TypeKind::Pointer(base)))
    }

    pub fn array(base: Type, size: usize) -> Type {
        Type(Arc::new(TypeKind::Array(base, size)))
    }

    pub fn function(params: Vec<Type>, ret: Type, variadic: bool) -> Type {
        Type(Arc::new(TypeKind::Function {
            params,
            ret,
            variadic,
        }))
    }

    pub fn structure(name: impl Into<String>, fields: Vec<Field>) -> Type {
        Type(Arc::new(TypeKind::Struct(StructDef {
            name: name.into(),
            fields,
            methods: RwLock::new(Vec::new()),
            is_class: false,
        })))
    }

    pub fn class(name: impl Into<String>, fields: Vec<Field>) -> Type {
        Type(Arc::new(TypeKind::Struct(StructDef {
            name: name.into(),
            fields,
            methods: RwLock::new(Vec::new()),
            is_class: true,
        })))
    }

    /// A named placeholder produced by the parser; the analyzer resolves it
    /// against the type table (and may trigger monomorphization when the
    /// name has the form `Base[...]`).
    pub fn named(name: impl Into<String>) -> Type {
        Type::structure(name, Vec::new())
    }

    pub fn enumeration(name: impl Into<String>, variants: Vec<Variant>) -> Type {
        Type(Arc::new(TypeKind::Enum(EnumDef {
            name: name.into(),
            variants,
        })))
    }

    pub fn param(name: impl Into<String>) -> Type {
        Type(Arc::new(TypeKind::Param {
            name: name.into(),
            constraint: String::new(),
        }))
    }

    pub fn param_constrained(name: impl Into<String>, constraint: impl Into<String>) -> Type {
        Type(Arc::new(TypeKind::Param {
            name: name.into(),
            constraint: constraint.into(),
        }))
    }

    pub fn kind(&self) -> &TypeKind {
        &self.0
    }

    // ============================================================
    // Classification
    // ============================================================

    pub fn is_integer(&self) -> bool {
        matches!(
            self.kind(),
            TypeKind::I8
                | TypeKind::I16
                | TypeKind::I32
                | TypeKind::I64
                | TypeKind::U8
                | TypeKind::U16
                | TypeKind::U32
                | TypeKind::U64
        )
    }

    pub fn is_unsigned(&self) -> bool {
        matches!(
            self.kind(),
            TypeKind::U8 | TypeKind::U16 | TypeKind::U32 | TypeKind::U64
        )
    }

    pub fn is_float(&self) -> bool {
        matches!(self.kind(), TypeKind::F32 | TypeKind::F64)
    }

    pub fn is_numeric(&self) -> bool {
        self.is_integer() || self.is_float()
    }

    pub fn is_bool(&self) -> bool {
        matches!(self.kind(), TypeKind::Bool)
    }

    pub fn is_void(&self) -> bool {
        matches!(self.kind(), TypeKind::Void)
    }

    pub fn is_pointer(&self) -> bool {
        matches!(self.kind(), TypeKind::Pointer(_))
    }

    pub fn is_array(&self) -> bool {
        matches!(self.kind(), TypeKind::Array(..))
    }

    pub fn is_function(&self) -> bool {
        matches!(self.kind(), TypeKind::Function { .. })
    }

    pub fn is_struct(&self) -> bool {
        matches!(self.kind(), TypeKind::Struct(_))
    }

    pub fn is_class(&self) -> bool {
        matches!(self.kind(), TypeKind::Struct(def) if def.is_class)
    }

    pub fn is_enum(&self) -> bool {
        matches!(self.kind(), TypeKind::Enum(_))
    }

    pub fn is_type_param(&self) -> bool {
        matches!(self.kind(), TypeKind::Param { .. })
    }

    /// Copy types are bitwise-duplicable: numeric primitives, `bool`, and
    /// pointers. Struct, class, and enum values move.
    pub fn is_copy(&self) -> bool {
        self.is_numeric() || self.is_bool() || self.is_pointer()
    }

    // ============================================================
    // Accessors
    // ============================================================

    pub fn pointee(&self) -> Option<Type> {
        match self.kind() {
            TypeKind::Pointer(base) => Some(base.clone()),
            _ => None,
        }
    }

    pub fn element_type(&self) -> Option<Type> {
        match self.kind() {
            TypeKind::Array(base, _) => Some(base.clone()),
            _ => None,
        }
    }

    pub fn as_struct(&self) -> Option<&StructDef> {
        match self.kind() {
            TypeKind::Struct(def) => Some(def),
            _ => None,
        }
    }

    pub fn as_enum(&self) -> Option<&EnumDef> {
        match self.kind() {
            TypeKind::Enum(def) => Some(def),
            _ => None,
        }
    }

    pub fn fn_params(&self) -> Option<&[Type]> {
        match self.kind() {
            TypeKind::Function { params, .. } => Some(params),
            _ => None,
        }
    }

    pub fn fn_return(&self) -> Option<Type> {
        match self.kind() {
            TypeKind::Function { ret, .. } => Some(ret.clone()),
            _ => None,
        }
    }

    pub fn fn_variadic(&self) -> bool {
        matches!(self.kind(), TypeKind::Function { variadic: true, .. })
    }

    /// Whether any component of this type still refers to an
    /// unsubstituted type parameter. Named placeholders have no fields, so
    /// recursive types cannot loop here.
    pub fn contains_param(&self) -> bool {
        match self.kind() {
            TypeKind::Param { .. } => true,
            TypeKind::Pointer(base) => base.contains_param(),
            TypeKind::Array(base, _) => base.contains_param(),
            TypeKind::Function { params, ret, .. } => {
                params.iter().any(|p| p.contains_param()) || ret.contains_param()
            }
            TypeKind::Struct(def) => def.fields.iter().any(|f| f.ty.contains_param()),
            TypeKind::Enum(def) => def.variants.iter().any(|v| {
                (0..v.field_count()).any(|i| v.field_type(i).is_some_and(|t| t.contains_param()))
            }),
            _ => false,
        }
    }

    /// Apply a type-parameter substitution, producing a new handle. A fresh
    /// parameter substitutes as identity unless the mapping names it. Named
    /// struct placeholders are also mapped by name so `Self` rewrites work.
    pub fn substitute(&self, mapping: &TypeMap) -> Type {
        match self.kind() {
            TypeKind::Pointer(base) => Type::pointer(base.substitute(mapping)),
            TypeKind::Array(base, size) => Type::array(base.substitute(mapping), *size),
            TypeKind::Function {
                params,
                ret,
                variadic,
            } => Type::function(
                params.iter().map(|p| p.substitute(mapping)).collect(),
                ret.substitute(mapping),
                *variadic,
            ),
            TypeKind::Struct(def) => match mapping.get(&def.name) {
                Some(mapped) => mapped.clone(),
                // A `Name[...]` placeholder carries its arguments in the
                // name text; rewrite them so `Box[T]` becomes `Box[i32]`
                // before the analyzer re-resolves the name.
                None => match substituted_placeholder_name(&def.name, mapping) {
                    Some(rewritten) => Type::named(rewritten),
                    None => self.clone(),
                },
            },
            TypeKind::Param { name, .. } => match mapping.get(name) {
                Some(mapped) => mapped.clone(),
                None => self.clone(),
            },
            _ => self.clone(),
        }
    }
}

impl PartialEq for Type {
    fn eq(&self, other: &Self) -> bool {
        use TypeKind::*;
        match (self.kind(), other.kind()) {
            (I8, I8) | (I16, I16) | (I32, I32) | (I64, I64) => true,
            (U8, U8) | (U16, U16) | (U32, U32) | (U64, U64) => true,
            (F32, F32) | (F64, F64) | (Bool, Bool) | (Void, Void) => true,
            (Pointer(a), Pointer(b)) => a == b,
            (Array(a, n), Array(b, m)) => n == m && a == b,
            (
                Function {
                    params: pa,
                    ret: ra,
                    variadic: va,
                },
                Function {
                    params: pb,
                    ret: rb,
                    variadic: vb,
                },
            ) => va == vb && ra == rb && pa == pb,
            (Struct(a), Struct(b)) => a.name == b.name,
            (Enum(a), Enum(b)) => a.name == b.name,
            (Param { name: a, .. }, Param { name: b, .. }) => a == b,
            _ => false,
        }
    }
}

impl Eq for Type {}

impl fmt::Display for Type {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self.kind() {
            TypeKind::I8 => write!(f, "i8"),
            TypeKind::I16 => write!(f, "i16"),
            TypeKind::I32 => write!(f, "i32"),
            TypeKind::I64 => write!(f, "i64"),
            TypeKind::U8 => write!(f, "u8"),
            TypeKind::U16 => write!(f, "u16"),
            TypeKind::U32 => write!(f, "u32"),
            TypeKind::U64 => write!(f, "u64"),
            TypeKind::F32 => write!(f, "f32"),
            TypeKind::F64 => write!(f, "f64"),
            TypeKind::Bool => write!(f, "bool"),
            TypeKind::Void => write!(f, "void"),
            TypeKind::Pointer(base) => write!(f, "{base}*"),
            TypeKind::Array(base, size) => write!(f, "{base}[{size}]"),
            TypeKind::Function {
                params,
                ret,
                variadic,
            } => {
                write!(f, "(")?;
                for (i, p) in params.iter().enumerate() {
                    if i > 0 {
                        write!(f, ", ")?;
                    }
                    write!(f, "{p}")?;
                }
                if *variadic {
                    if !params.is_empty() {
                        write!(f, ", ")?;
                    }
                    write!(f, "...")?;
                }
                write!(f, "): {ret}")
            }
            TypeKind::Struct(def) => write!(f, "{}", def.name),
            TypeKind::Enum(def) => write!(f, "{}", def.name),
            TypeKind::Param { name, .. } => write!(f, "{name}"),
        }
    }
}

/// Rewrite the bracketed argument list of a `Name[...]` placeholder under a
/// substitution, so `Box[T]` with `{T -> i32}` becomes `Box[i32]`. Returns
/// `None` when no argument changes.
fn substituted_placeholder_name(name: &str, mapping: &TypeMap) -> Option<String> {
    let bracket = name.find('[')?;
    if !name.ends_with(']') {
        return None;
    }
    let base = &name[..bracket];
    let args = &name[bracket + 1..name.len() - 1];

    let mut changed = false;
    let mut pieces = Vec::new();
    for piece in split_top_level_args(args) {
        let rewritten = substitute_argument_text(&piece, mapping);
        if rewritten != piece {
            changed = true;
        }
        pieces.push(rewritten);
    }
    changed.then(|| format!("{base}[{}]", pieces.join(", ")))
}

/// Split a bracketed argument list at top-level commas.
fn split_top_level_args(args: &str) -> Vec<String> {
    let mut pieces = Vec::new();
    let mut depth = 0usize;
    let mut current = String::new();
    for c in args.chars() {
        match c {
            '[' => {
                depth += 1;
                current.push(c);
            }
            ']' => {
                depth = depth.saturating_sub(1);
                current.push(c);
            }
            ',' if depth == 0 => {
                pieces.push(current.trim().to_string());
                current = String::new();
            }
            _ => current.push(c),
        }
    }
    if !current.trim().is_empty() {
        pieces.push(current.trim().to_string());
    }
    pieces
}

/// Apply a substitution to one textual argument of a placeholder name:
/// a mapped parameter, a pointer to one, or a nested `Name[...]`.
fn substitute_argument_text(text: &str, mapping: &TypeMap) -> String {
    if let Some(base) = text.strip_suffix('*') {
        return format!("{}*", substitute_argument_text(base.trim_end(), mapping));
    }
    if let Some(mapped) = mapping.get(text) {
        return mapped.to_string();
    }
    if let Some(rewritten) = substituted_placeholder_name(text, mapping) {
        return rewritten;
    }
    text.to_string()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn structural_equality() {
        assert_eq!(Type::i32(), Type::i32());
        assert_ne!(Type::i32(), Type::u32());
        assert_eq!(Type::pointer(Type::i32()), Type::pointer(Type::i32()));
        assert_ne!(Type::pointer(Type::i32()), Type::pointer(Type::i64()));
        assert_eq!(Type::array(Type::f64(), 3), Type::array(Type::f64(), 3));
        assert_ne!(Type::array(Type::f64(), 3), Type::array(Type::f64(), 4));
    }

    #[test]
    fn struct_equality_is_by_name() {
        let a = Type::structure("Point", vec![]);
        let b = Type::structure(
            "Point",
            vec![Field {
                name: "x".into(),
                ty: Type::i32(),
                is_public: true,
            }],
        );
        assert_eq!(a, b);
    }

    #[test]
    fn function_equality() {
        let a = Type::function(vec![Type::i32()], Type::bool(), false);
        let b = Type::function(vec![Type::i32()], Type::bool(), false);
        let c = Type::function(vec![Type::i32()], Type::bool(), true);
        assert_eq!(a, b);
        assert_ne!(a, c);
    }

    #[test]
    fn copy_classification() {
        assert!(Type::i8().is_copy());
        assert!(Type::f64().is_copy());
        assert!(Type::bool().is_copy());
        assert!(Type::pointer(Type::structure("S", vec![])).is_copy());
        assert!(!Type::structure("S", vec![]).is_copy());
        assert!(!Type::enumeration("E", vec![]).is_copy());
    }

    #[test]
    fn display_forms() {
        assert_eq!(Type::pointer(Type::i8()).to_string(), "i8*");
        assert_eq!(Type::array(Type::u64(), 8).to_string(), "u64[8]");
        assert_eq!(
            Type::function(vec![Type::i32(), Type::i32()], Type::void(), true).to_string(),
            "(i32, i32, ...): void"
        );
    }

    #[test]
    fn substitution_replaces_params_everywhere() {
        let mut mapping = TypeMap::new();
        mapping.insert("T".into(), Type::i32());

        let nested = Type::function(
            vec![Type::pointer(Type::param("T")), Type::array(Type::param("T"), 2)],
            Type::param("T"),
            false,
        );
        let result = nested.substitute(&mapping);
        assert_eq!(
            result,
            Type::function(
                vec![Type::pointer(Type::i32()), Type::array(Type::i32(), 2)],
                Type::i32(),
                false,
            )
        );
        assert_eq!(result.to_string(), "(i32*, i32[2]): i32");
    }

    #[test]
    fn substitution_is_identity_for_unmapped_params() {
        let mapping = TypeMap::new();
        let t = Type::param("U");
        assert_eq!(t.substitute(&mapping), t);
    }

    #[test]
    fn substitution_rewrites_bracketed_placeholder_names() {
        let mut mapping = TypeMap::new();
        mapping.insert("T".into(), Type::i32());

        assert_eq!(
            Type::named("Box[T]").substitute(&mapping).to_string(),
            "Box[i32]"
        );
        assert_eq!(
            Type::named("Pair[Box[T], T]").substitute(&mapping).to_string(),
            "Pair[Box[i32], i32]"
        );
        assert_eq!(
            Type::named("Box[T*]").substitute(&mapping).to_string(),
            "Box[i32*]"
        );

        // Placeholders without mapped arguments keep their identity.
        let plain = Type::named("Box[bool]");
        assert_eq!(plain.substitute(&mapping), plain);
    }

    #[test]
    fn substitution_maps_named_placeholders() {
        let mut mapping = TypeMap::new();
        mapping.insert("Self".into(), Type::class("Counter", vec![]));
        let t = Type::pointer(Type::named("Self"));
        assert_eq!(t.substitute(&mapping).to_string(), "Counter*");
    }

    #[test]
    fn primitive_singletons_are_shared() {
        let a = Type::i32();
        let b = Type::i32();
        assert!(Arc::ptr_eq(&a.0, &b.0));
    }
}
