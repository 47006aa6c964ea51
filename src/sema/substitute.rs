//! The AST substituter: a uniform rewrite of every type-bearing position.
//!
//! Monomorphization deep-clones a generic declaration and then runs this
//! pass over the clone, replacing each type with its substituted form:
//! expression annotations, field and parameter types, return types, enum
//! variant payloads, intrinsic and specialization type arguments, and the
//! literals inside patterns. After the pass, no node of the clone refers to
//! a substituted parameter.

use crate::ast::*;
use crate::types::TypeMap;

pub struct Substituter<'a> {
    mapping: &'a TypeMap,
}

impl<'a> Substituter<'a> {
    pub fn new(mapping: &'a TypeMap) -> Self {
        Self { mapping }
    }

    fn subst(&self, ty: &mut crate::types::Type) {
        *ty = ty.substitute(self.mapping);
    }

    fn subst_opt(&self, ty: &mut Option<crate::types::Type>) {
        if let Some(inner) = ty {
            self.subst(inner);
        }
    }

    pub fn apply_stmt(&self, stmt: &mut Stmt) {
        match stmt {
            Stmt::Decl(decl) => self.apply_decl(decl),
            Stmt::Block(block) => self.apply_block(block),
            Stmt::If(if_stmt) => {
                self.apply_expr(&mut if_stmt.condition);
                self.apply_block(&mut if_stmt.then_block);
                if let Some(else_block) = &mut if_stmt.else_block {
                    self.apply_block(else_block);
                }
            }
            Stmt::While(while_stmt) => {
                self.apply_expr(&mut while_stmt.condition);
                self.apply_block(&mut while_stmt.body);
            }
            Stmt::DoWhile(do_while) => {
                self.apply_block(&mut do_while.body);
                self.apply_expr(&mut do_while.condition);
            }
            Stmt::For(for_stmt) => {
                if let Some(init) = &mut for_stmt.init {
                    self.apply_stmt(init);
                }
                if let Some(condition) = &mut for_stmt.condition {
                    self.apply_expr(condition);
                }
                if let Some(step) = &mut for_stmt.step {
                    self.apply_expr(step);
                }
                self.apply_block(&mut for_stmt.body);
            }
            Stmt::Switch(switch) => {
                self.apply_expr(&mut switch.condition);
                for case in &mut switch.cases {
                    if let Some(pattern) = &mut case.pattern {
                        self.apply_pattern(pattern);
                    }
                    self.apply_block(&mut case.body);
                }
            }
            Stmt::Return(ret) => {
                if let Some(value) = &mut ret.value {
                    self.apply_expr(value);
                }
            }
            Stmt::Expr(expr) => self.apply_expr(expr),
            Stmt::Break | Stmt::Continue => {}
        }
    }

    pub fn apply_decl(&self, decl: &mut Decl) {
        match decl {
            Decl::Var(var) => self.apply_var(var),
            Decl::Function(func) => self.apply_function(func),
            Decl::Struct(st) => {
                for member in &mut st.members {
                    self.apply_var(member);
                }
            }
            Decl::Enum(en) => {
                self.subst_opt(&mut en.ty);
                for variant in &mut en.variants {
                    self.apply_variant(variant);
                }
            }
            Decl::Class(class) => {
                for member in &mut class.members {
                    match member {
                        ClassMember::Field(var) => self.apply_var(var),
                        ClassMember::Method(method) => self.apply_method(method),
                        ClassMember::Constructor(ctor) => {
                            for param in &mut ctor.params {
                                self.subst(&mut param.ty);
                            }
                            self.apply_block(&mut ctor.body);
                        }
                    }
                }
            }
            Decl::Request(req) => {
                for member in &mut req.members {
                    match &mut member.item {
                        RequestItem::Field(var) => self.apply_var(var),
                        RequestItem::Method(method) => self.apply_method(method),
                        RequestItem::Variant(variant) => self.apply_variant(variant),
                    }
                }
            }
            Decl::Import(_) | Decl::Package(_) | Decl::Use(_) => {}
        }
    }

    pub fn apply_var(&self, var: &mut VarDecl) {
        self.subst_opt(&mut var.ty);
        if let Some(init) = &mut var.init {
            self.apply_expr(init);
        }
    }

    pub fn apply_function(&self, func: &mut FunctionDecl) {
        for param in &mut func.params {
            self.subst(&mut param.ty);
        }
        self.subst(&mut func.return_type);
        if let Some(body) = &mut func.body {
            self.apply_block(body);
        }
    }

    pub fn apply_method(&self, method: &mut MethodDecl) {
        for param in &mut method.params {
            self.subst(&mut param.ty);
        }
        self.subst(&mut method.return_type);
        if let Some(body) = &mut method.body {
            self.apply_block(body);
        }
    }

    fn apply_variant(&self, variant: &mut EnumVariantDecl) {
        match &mut variant.body {
            VariantBody::Unit => {}
            VariantBody::Tuple(types) => {
                for ty in types {
                    self.subst(ty);
                }
            }
            VariantBody::Struct(fields) => {
                for field in fields {
                    self.apply_var(field);
                }
            }
        }
    }

    pub fn apply_block(&self, block: &mut Block) {
        for stmt in &mut block.statements {
            self.apply_stmt(stmt);
        }
    }

    pub fn apply_expr(&self, expr: &mut Expr) {
        self.subst_opt(&mut expr.ty);
        match &mut expr.kind {
            ExprKind::Literal { explicit_ty, .. } => self.subst_opt(explicit_ty),
            ExprKind::Identifier(_) => {}
            ExprKind::Binary { left, right, .. } => {
                self.apply_expr(left);
                self.apply_expr(right);
            }
            ExprKind::Unary { operand, .. }
            | ExprKind::AddressOf(operand)
            | ExprKind::Deref(operand)
            | ExprKind::Question(operand) => self.apply_expr(operand),
            ExprKind::Call { callee, args } => {
                self.apply_expr(callee);
                for arg in args {
                    self.apply_expr(arg);
                }
            }
            ExprKind::Member { base, .. } => self.apply_expr(base),
            ExprKind::StructLiteral { base, fields } => {
                self.apply_expr(base);
                for field in fields {
                    self.apply_expr(&mut field.value);
                }
            }
            ExprKind::ArrayLiteral(elements) => {
                for element in elements {
                    self.apply_expr(element);
                }
            }
            ExprKind::Index { base, index } => {
                self.apply_expr(base);
                self.apply_expr(index);
            }
            ExprKind::Intrinsic { type_arg, args, .. } => {
                self.subst_opt(type_arg);
                for arg in args {
                    self.apply_expr(arg);
                }
            }
            ExprKind::Specialization {
                base, type_args, ..
            } => {
                self.apply_expr(base);
                for ty in type_args {
                    self.subst(ty);
                }
            }
        }
    }

    pub fn apply_pattern(&self, pattern: &mut Pattern) {
        match pattern {
            Pattern::Literal(literal) => self.apply_expr(literal),
            Pattern::Variant { sub_patterns, .. } => {
                for sub in sub_patterns {
                    self.apply_pattern(sub);
                }
            }
            Pattern::Identifier(_) | Pattern::Wildcard => {}
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::types::{Type, TypeMap, TypeKind};

    fn mapping_t_to_i32() -> TypeMap {
        let mut mapping = TypeMap::new();
        mapping.insert("T".into(), Type::i32());
        mapping
    }

    /// Walk a type looking for any remaining parameter reference.
    fn contains_param(ty: &Type, name: &str) -> bool {
        match ty.kind() {
            TypeKind::Param { name: n, .. } => n == name,
            TypeKind::Pointer(base) => contains_param(base, name),
            TypeKind::Array(base, _) => contains_param(base, name),
            TypeKind::Function { params, ret, .. } => {
                params.iter().any(|p| contains_param(p, name)) || contains_param(ret, name)
            }
            _ => false,
        }
    }

    #[test]
    fn function_substitution_is_complete() {
        let mut parser = crate::parser::Parser::new(
            "fn id[T](x: T): T { let y: T = x; return y; }",
        );
        let program = parser.parse_program().expect("parse failed");
        let Stmt::Decl(Decl::Function(func)) = &program[0] else {
            panic!("expected function");
        };

        let mapping = mapping_t_to_i32();
        let mut clone = func.clone();
        Substituter::new(&mapping).apply_function(&mut clone);

        assert_eq!(clone.params[0].ty, Type::i32());
        assert_eq!(clone.return_type, Type::i32());
        let Some(Stmt::Decl(Decl::Var(var))) =
            clone.body.as_ref().map(|b| &b.statements[0])
        else {
            panic!("expected let");
        };
        assert_eq!(var.ty, Some(Type::i32()));
        assert!(!contains_param(var.ty.as_ref().unwrap(), "T"));
    }

    #[test]
    fn enum_variant_payloads_are_rewritten() {
        let mut parser = crate::parser::Parser::new("enum Option[T] { None, Some(T) }");
        let program = parser.parse_program().expect("parse failed");
        let Stmt::Decl(Decl::Enum(en)) = &program[0] else {
            panic!("expected enum");
        };

        let mapping = mapping_t_to_i32();
        let mut clone = Decl::Enum(en.clone());
        Substituter::new(&mapping).apply_decl(&mut clone);

        let Decl::Enum(en) = clone else { unreachable!() };
        let VariantBody::Tuple(types) = &en.variants[1].body else {
            panic!("expected tuple variant");
        };
        assert_eq!(types[0], Type::i32());
    }

    #[test]
    fn unmapped_params_survive_unchanged() {
        let mapping = mapping_t_to_i32();
        let mut expr = Expr::new(ExprKind::Intrinsic {
            kind: IntrinsicKind::Sizeof,
            type_arg: Some(Type::param("U")),
            args: vec![],
        });
        Substituter::new(&mapping).apply_expr(&mut expr);
        let ExprKind::Intrinsic { type_arg, .. } = &expr.kind else {
            unreachable!()
        };
        assert_eq!(type_arg.clone().unwrap(), Type::param("U"));
    }
}
