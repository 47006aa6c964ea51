//! Expression typing rules.
//!
//! Every checked expression gets its resolved type written back into the
//! AST; the MIR builder reads those annotations instead of re-resolving.
//! Enum variant construction written against a generic base
//! (`Result::Ok(x)`) infers the concrete monomorphization from the
//! enclosing function's return type.

use crate::ast::*;
use crate::lexer::TokenKind;
use crate::sema::{Sema, SemaError, SemaResult, TypeDeclEntry};
use crate::types::{Type, TypeKind, VariantPayload};

impl Sema {
    pub fn check_expr(&mut self, expr: &mut Expr) -> SemaResult<Type> {
        let ty = match &mut expr.kind {
            ExprKind::Literal { value, explicit_ty } => literal_type(value, explicit_ty.as_ref()),
            ExprKind::Identifier(name) => {
                let name = name.clone();
                self.check_identifier(&name)?
            }
            ExprKind::Binary { op, left, right } => {
                let op = *op;
                self.check_binary(op, left, right)?
            }
            ExprKind::Unary { op, operand } => {
                let op = *op;
                self.check_unary(op, operand)?
            }
            ExprKind::AddressOf(operand) => Type::pointer(self.check_expr(operand)?),
            ExprKind::Deref(operand) => {
                let operand_ty = self.check_expr(operand)?;
                operand_ty
                    .pointee()
                    .ok_or_else(|| SemaError::NotAPointer(operand_ty.to_string()))?
            }
            ExprKind::Call { callee, args } => self.check_call(callee, args)?,
            ExprKind::Member { base, member, .. } => {
                let member = member.clone();
                self.check_member(base, &member)?
            }
            ExprKind::StructLiteral { base, fields } => self.check_struct_literal(base, fields)?,
            ExprKind::ArrayLiteral(elements) => self.check_array_literal(elements)?,
            ExprKind::Index { base, index } => self.check_index(base, index)?,
            ExprKind::Intrinsic {
                kind,
                type_arg,
                args,
            } => {
                let kind = *kind;
                self.check_intrinsic(kind, type_arg, args)?
            }
            ExprKind::Question(operand) => self.check_question(operand)?,
            ExprKind::Specialization {
                base,
                type_args,
                mangled,
            } => self.check_specialization(base, type_args, mangled)?,
        };
        expr.ty = Some(ty.clone());
        Ok(ty)
    }

    fn check_identifier(&mut self, name: &str) -> SemaResult<Type> {
        if let Some(symbol) = self.symbols.lookup(name) {
            if symbol.is_moved {
                return Err(SemaError::UseOfMoved(name.to_string()));
            }
            return Ok(symbol.ty.clone());
        }

        if let Some(ty) = self.symbols.lookup_type(name) {
            return Ok(ty);
        }

        // A bare unit-variant name like `Red`.
        if let Some(enum_ty) = self.enum_for_variant(name) {
            return Ok(enum_ty);
        }

        Err(SemaError::UndefinedIdentifier(name.to_string()))
    }

    fn check_binary(
        &mut self,
        op: TokenKind,
        left: &mut Expr,
        right: &mut Expr,
    ) -> SemaResult<Type> {
        if op == TokenKind::Equal {
            // Evaluate the RHS first; the LHS must be a mutable place. A
            // plain-identifier LHS is being re-initialized, which clears
            // any move mark on it.
            let right_ty = self.check_expr(right)?;

            let left_ty = match &left.kind {
                ExprKind::Identifier(name) => {
                    let name = name.clone();
                    let symbol = self
                        .symbols
                        .lookup(&name)
                        .cloned()
                        .ok_or_else(|| SemaError::UndefinedIdentifier(name.clone()))?;
                    if !symbol.is_mutable {
                        return Err(SemaError::AssignToImmutable(name));
                    }
                    self.symbols.mark_accessed(&name);
                    left.ty = Some(symbol.ty.clone());
                    symbol.ty
                }
                ExprKind::Member { .. } | ExprKind::Index { .. } | ExprKind::Deref(_) => {
                    self.check_expr(left)?
                }
                _ => return Err(SemaError::InvalidAssignTarget),
            };

            if left_ty != right_ty {
                return Err(SemaError::TypeMismatch {
                    context: "assignment".into(),
                    expected: left_ty.to_string(),
                    found: right_ty.to_string(),
                });
            }

            if !right_ty.is_copy() {
                if let Some(name) = right.as_ident() {
                    let name = name.to_string();
                    self.symbols.mark_moved(&name);
                }
            }
            return Ok(left_ty);
        }

        let left_ty = self.check_expr(left)?;
        let right_ty = self.check_expr(right)?;

        // No implicit promotion: operand types must match exactly.
        if left_ty != right_ty {
            return Err(SemaError::TypeMismatch {
                context: "binary expression".into(),
                expected: left_ty.to_string(),
                found: right_ty.to_string(),
            });
        }

        match op {
            TokenKind::EqualEqual
            | TokenKind::NotEqual
            | TokenKind::Greater
            | TokenKind::GreaterEqual
            | TokenKind::Less
            | TokenKind::LessEqual
            | TokenKind::AndAnd
            | TokenKind::OrOr => Ok(Type::bool()),
            _ => Ok(left_ty),
        }
    }

    fn check_unary(&mut self, op: TokenKind, operand: &mut Expr) -> SemaResult<Type> {
        let operand_ty = self.check_expr(operand)?;
        let invalid = |expected: &str| SemaError::InvalidOperand {
            op: format!("unary {}", op.op_str()),
            expected: expected.into(),
            found: operand_ty.to_string(),
        };
        match op {
            TokenKind::Minus | TokenKind::Plus => {
                if !operand_ty.is_numeric() {
                    return Err(invalid("a numeric"));
                }
                Ok(operand_ty)
            }
            TokenKind::Not => {
                if !operand_ty.is_bool() {
                    return Err(invalid("a boolean"));
                }
                Ok(operand_ty)
            }
            TokenKind::Tilde => {
                if !operand_ty.is_integer() {
                    return Err(invalid("an integer"));
                }
                Ok(operand_ty)
            }
            _ => Err(SemaError::Other(format!(
                "unknown unary operator: {}",
                op.op_str()
            ))),
        }
    }

    fn check_call(&mut self, callee: &mut Expr, args: &mut [Expr]) -> SemaResult<Type> {
        // (a) The callee names a struct or class type: constructor call.
        if let Some(name) = callee.as_ident().map(str::to_string) {
            if let Some(ty) = self.symbols.lookup_type(&name) {
                if ty.is_struct() {
                    self.check_constructor_args(&name, args)?;
                    return Ok(ty);
                }
            }

            // (b) The callee is a bare variant name of a registered enum.
            if let Some(enum_ty) = self.enum_for_variant(&name) {
                return self.check_variant_construction(enum_ty, &name, args);
            }
        }

        // (c) A member-access callee whose base is an enum value or enum
        // type constructs a variant. Module-qualified calls skip this and
        // resolve through ordinary member access below.
        let module_base = matches!(
            &callee.kind,
            ExprKind::Member { base, .. }
                if base.as_ident().is_some_and(|id| self.modules.contains_key(id))
        );
        if !module_base {
            if let ExprKind::Member { base, member, .. } = &mut callee.kind {
                let member = member.clone();
                let mut base_ty = self.check_expr(base)?;
                if let Some(pointee) = base_ty.pointee() {
                    base_ty = pointee;
                }
                if base_ty
                    .as_enum()
                    .is_some_and(|def| def.find_variant(&member).is_some())
                {
                    let target = if self.enum_is_blueprint(&base_ty) {
                        let base_name = base_ty
                            .as_enum()
                            .map(|d| d.name.clone())
                            .unwrap_or_default();
                        self.infer_concrete_enum(&base_name, &member)
                            .unwrap_or_else(|| base_ty.clone())
                    } else {
                        base_ty
                    };
                    return self.check_variant_construction(target, &member, args);
                }
            }
        }

        // (d) A specialized class as callee is a constructor call on the
        // monomorphization; otherwise an ordinary call through a
        // function-typed callee, where a pointer-to-struct receiver counts
        // as the implicit `self`.
        let callee_ty = self.check_expr(callee)?;
        if callee_ty.is_struct() {
            if matches!(&callee.kind, ExprKind::Specialization { .. }) {
                let name = callee_ty
                    .as_struct()
                    .map(|def| def.name.clone())
                    .unwrap_or_default();
                self.check_constructor_args(&name, args)?;
                return Ok(callee_ty);
            }
        }
        let (params, ret, variadic) = match callee_ty.kind() {
            TypeKind::Function {
                params,
                ret,
                variadic,
            } => (params.clone(), ret.clone(), *variadic),
            _ => return Err(SemaError::NotCallable(callee_ty.to_string())),
        };

        let is_method_call = matches!(&callee.kind, ExprKind::Member { .. })
            && params.len() == args.len() + 1;
        let provided = args.len() + usize::from(is_method_call);

        if provided != params.len() && (!variadic || provided < params.len()) {
            return Err(SemaError::ArgumentCount {
                expected: params.len(),
                found: provided,
            });
        }

        let mut param_index = usize::from(is_method_call);
        for (index, arg) in args.iter_mut().enumerate() {
            let arg_ty = self.check_expr(arg)?;
            if param_index < params.len() {
                if arg_ty != params[param_index] {
                    return Err(SemaError::ArgumentType {
                        index: index + 1,
                        expected: params[param_index].to_string(),
                        found: arg_ty.to_string(),
                    });
                }
                param_index += 1;
            }
        }

        Ok(ret)
    }

    /// Check argument expressions of a variant construction against the
    /// variant's payload. Skipped when the payload still carries type
    /// parameters (a blueprint that could not be made concrete).
    fn check_variant_construction(
        &mut self,
        enum_ty: Type,
        variant_name: &str,
        args: &mut [Expr],
    ) -> SemaResult<Type> {
        let variant = enum_ty
            .as_enum()
            .and_then(|def| def.find_variant(variant_name))
            .cloned()
            .ok_or_else(|| {
                SemaError::Other(format!(
                    "variant '{variant_name}' not found in enum '{enum_ty}'"
                ))
            })?;

        let mut arg_tys = Vec::with_capacity(args.len());
        for arg in args.iter_mut() {
            arg_tys.push(self.check_expr(arg)?);
        }

        let concrete = (0..variant.field_count())
            .all(|i| variant.field_type(i).is_some_and(|t| !t.contains_param()));
        if concrete {
            if arg_tys.len() != variant.field_count() {
                return Err(SemaError::ArgumentCount {
                    expected: variant.field_count(),
                    found: arg_tys.len(),
                });
            }
            for (index, arg_ty) in arg_tys.iter().enumerate() {
                let field_ty = variant
                    .field_type(index)
                    .expect("BUG: variant arity checked above");
                if *arg_ty != field_ty {
                    return Err(SemaError::ArgumentType {
                        index: index + 1,
                        expected: field_ty.to_string(),
                        found: arg_ty.to_string(),
                    });
                }
            }
        }

        Ok(enum_ty)
    }

    fn check_member(&mut self, base: &mut Expr, member: &str) -> SemaResult<Type> {
        // Module-qualified access: only public members are visible.
        if let Some(module_name) = base.as_ident().map(str::to_string) {
            if let Some(table) = self.modules.get(&module_name) {
                if let Some(symbol) = table.public_symbols().get(member) {
                    return Ok(symbol.ty.clone());
                }
                if let Some(ty) = table.public_types().get(member) {
                    return Ok(ty.clone());
                }
                return Err(SemaError::NoSuchModuleMember {
                    module: module_name,
                    member: member.to_string(),
                });
            }
        }

        let mut base_ty = self.check_expr(base)?;
        if let Some(pointee) = base_ty.pointee() {
            base_ty = pointee;
        }
        // A recursive field carries the provisional recursion-breaking
        // handle; the table has the completed definition.
        base_ty = self.canonical_type(&base_ty);

        if let Some(def) = base_ty.as_enum() {
            if def.find_variant(member).is_some() {
                return Ok(base_ty.clone());
            }
        }

        let def = base_ty.as_struct().ok_or_else(|| {
            SemaError::Other(format!("member access on non-struct type: {base_ty}"))
        })?;

        if let Some(field) = def.find_field(member) {
            if !field.is_public && self.current_class.as_ref() != Some(&base_ty) {
                return Err(SemaError::PrivateAccess {
                    what: "field".into(),
                    member: member.to_string(),
                    owner: def.name.clone(),
                });
            }
            return Ok(field.ty.clone());
        }

        if let Some(method) = def.find_method(member) {
            if !method.is_public && self.current_class.as_ref() != Some(&base_ty) {
                return Err(SemaError::PrivateAccess {
                    what: "method".into(),
                    member: member.to_string(),
                    owner: def.name.clone(),
                });
            }
            return Ok(method.ty);
        }

        Err(SemaError::Other(format!(
            "struct '{}' has no member named '{member}'",
            def.name
        )))
    }

    fn check_struct_literal(
        &mut self,
        base: &mut Expr,
        fields: &mut [FieldInit],
    ) -> SemaResult<Type> {
        let base_ty = self.check_expr(base)?;

        if base_ty.is_enum() {
            // `Enum::Variant { ... }` for a struct-bodied variant.
            if let ExprKind::Member { member, .. } = &base.kind {
                let member = member.clone();
                let target = if self.enum_is_blueprint(&base_ty) {
                    let base_name = base_ty
                        .as_enum()
                        .map(|d| d.name.clone())
                        .unwrap_or_default();
                    self.infer_concrete_enum(&base_name, &member)
                        .unwrap_or_else(|| base_ty.clone())
                } else {
                    base_ty.clone()
                };
                let variant = target
                    .as_enum()
                    .and_then(|def| def.find_variant(&member))
                    .cloned();
                if let Some(variant) = variant {
                    let VariantPayload::Struct(expected) = &variant.payload else {
                        return Err(SemaError::Other(format!(
                            "variant '{member}' is not a struct variant"
                        )));
                    };
                    let expected = expected.clone();
                    if fields.len() != expected.len() {
                        return Err(SemaError::Other(format!(
                            "field count mismatch for variant '{member}': expected {}, got {}",
                            expected.len(),
                            fields.len()
                        )));
                    }
                    for field in &expected {
                        let init = fields
                            .iter_mut()
                            .find(|init| init.name == field.name)
                            .ok_or_else(|| {
                                SemaError::Other(format!("missing field '{}'", field.name))
                            })?;
                        let init_ty = self.check_expr(&mut init.value)?;
                        if init_ty != field.ty {
                            return Err(SemaError::TypeMismatch {
                                context: format!("field '{}'", field.name),
                                expected: field.ty.to_string(),
                                found: init_ty.to_string(),
                            });
                        }
                    }
                    base.ty = Some(target.clone());
                    return Ok(target);
                }
            }
            return Ok(base_ty);
        }

        let expected = base_ty
            .as_struct()
            .ok_or_else(|| SemaError::Other(format!("'{base}' is not a struct type")))?
            .fields
            .clone();

        // Every declared field must be provided exactly once.
        if fields.len() != expected.len() {
            return Err(SemaError::Other(format!(
                "field count mismatch for struct '{base_ty}': expected {}, got {}",
                expected.len(),
                fields.len()
            )));
        }
        for field in &expected {
            let init = fields
                .iter_mut()
                .find(|init| init.name == field.name)
                .ok_or_else(|| {
                    SemaError::Other(format!(
                        "missing field '{}' in initializer for struct '{base_ty}'",
                        field.name
                    ))
                })?;
            let init_ty = self.check_expr(&mut init.value)?;
            if init_ty != field.ty {
                return Err(SemaError::TypeMismatch {
                    context: format!("field '{}' in struct '{base_ty}'", field.name),
                    expected: field.ty.to_string(),
                    found: init_ty.to_string(),
                });
            }
        }

        Ok(base_ty)
    }

    fn check_array_literal(&mut self, elements: &mut [Expr]) -> SemaResult<Type> {
        let Some((first, rest)) = elements.split_first_mut() else {
            return Err(SemaError::Other(
                "empty array literals are not supported".into(),
            ));
        };
        let element_ty = self.check_expr(first)?;
        for element in rest {
            let ty = self.check_expr(element)?;
            if ty != element_ty {
                return Err(SemaError::TypeMismatch {
                    context: "array literal".into(),
                    expected: element_ty.to_string(),
                    found: ty.to_string(),
                });
            }
        }
        Ok(Type::array(element_ty, elements.len()))
    }

    fn check_index(&mut self, base: &mut Expr, index: &mut Expr) -> SemaResult<Type> {
        let base_ty = self.check_expr(base)?;
        let index_ty = self.check_expr(index)?;

        if !index_ty.is_integer() {
            return Err(SemaError::NonIntegerIndex(index_ty.to_string()));
        }

        base_ty
            .element_type()
            .or_else(|| base_ty.pointee())
            .ok_or_else(|| SemaError::NotIndexable(base_ty.to_string()))
    }

    fn check_intrinsic(
        &mut self,
        kind: IntrinsicKind,
        type_arg: &mut Option<Type>,
        args: &mut [Expr],
    ) -> SemaResult<Type> {
        if let Some(ty) = type_arg {
            *ty = self.resolve_type(ty)?;
        }

        for (index, arg) in args.iter_mut().enumerate() {
            // The first argument of offsetof is a bare field name.
            if kind == IntrinsicKind::Offsetof && index == 0 {
                continue;
            }
            self.check_expr(arg)?;
        }

        match kind {
            IntrinsicKind::Sizeof | IntrinsicKind::Alignof | IntrinsicKind::Offsetof => {
                Ok(Type::i64())
            }
            IntrinsicKind::Malloc | IntrinsicKind::Alloca => {
                let ty = type_arg.clone().ok_or_else(|| {
                    SemaError::Other(format!("{} requires a type argument", kind.name()))
                })?;
                Ok(Type::pointer(ty))
            }
            IntrinsicKind::Free => Ok(Type::void()),
        }
    }

    fn check_question(&mut self, operand: &mut Expr) -> SemaResult<Type> {
        let operand_ty = self.check_expr(operand)?;
        let def = operand_ty.as_enum().ok_or_else(|| {
            SemaError::InvalidQuestion(format!(
                "`?` can only be applied to a Result value, got {operand_ty}"
            ))
        })?;
        if !def.name.starts_with("Result_") {
            return Err(SemaError::InvalidQuestion(format!(
                "`?` can only be applied to a Result value, got {}",
                def.name
            )));
        }

        let ret = self.current_return.clone().ok_or_else(|| {
            SemaError::InvalidQuestion("`?` used outside of a function".into())
        })?;
        let ret_def = ret
            .as_enum()
            .filter(|d| d.name.starts_with("Result_"))
            .ok_or_else(|| {
                SemaError::InvalidQuestion(
                    "`?` can only be used in functions returning Result".into(),
                )
            })?;

        if def.variants.len() < 2 || ret_def.variants.len() < 2 {
            return Err(SemaError::InvalidQuestion(
                "malformed Result enum: expected Ok and Err variants".into(),
            ));
        }

        let operand_err = def.variants[1]
            .field_type(0)
            .ok_or_else(|| SemaError::InvalidQuestion("Result Err variant carries no value".into()))?;
        let return_err = ret_def.variants[1]
            .field_type(0)
            .ok_or_else(|| SemaError::InvalidQuestion("Result Err variant carries no value".into()))?;
        if operand_err != return_err {
            return Err(SemaError::InvalidQuestion(format!(
                "`?` error type mismatch: {operand_err} vs {return_err}"
            )));
        }

        def.variants[0]
            .field_type(0)
            .ok_or_else(|| SemaError::InvalidQuestion("Result Ok variant carries no value".into()))
    }

    // ============================================================
    // Enum variant resolution helpers
    // ============================================================

    /// The enum type to use for a bare variant name: the enclosing
    /// function's return enum if it has the variant, otherwise the first
    /// concrete registered enum, otherwise any registered enum.
    pub(crate) fn enum_for_variant(&self, variant: &str) -> Option<Type> {
        if let Some(ret) = &self.current_return {
            if ret
                .as_enum()
                .is_some_and(|def| def.find_variant(variant).is_some())
            {
                return Some(ret.clone());
            }
        }
        if let Some(ty) = self.registered_enums.iter().find(|e| {
            !self.enum_is_blueprint(e)
                && e.as_enum().is_some_and(|def| def.find_variant(variant).is_some())
        }) {
            return Some(ty.clone());
        }
        self.registered_enums
            .iter()
            .find(|e| e.as_enum().is_some_and(|def| def.find_variant(variant).is_some()))
            .cloned()
    }

    /// Whether an enum type is a generic blueprint rather than a concrete
    /// monomorphization.
    pub(crate) fn enum_is_blueprint(&self, ty: &Type) -> bool {
        let Some(def) = ty.as_enum() else { return false };
        if let Some(TypeDeclEntry::Enum(decl)) = self.type_decls.get(&def.name) {
            if !decl.generic_params.is_empty() {
                return true;
            }
        }
        def.variants.iter().any(|v| {
            (0..v.field_count()).any(|i| v.field_type(i).is_some_and(|t| t.contains_param()))
        })
    }

    /// Find a concrete monomorphization of `base_name` that has `variant`,
    /// preferring the enclosing function's return type.
    pub(crate) fn infer_concrete_enum(&self, base_name: &str, variant: &str) -> Option<Type> {
        let prefix = format!("{base_name}_");
        if let Some(ret) = &self.current_return {
            if ret.as_enum().is_some_and(|def| {
                (def.name == base_name || def.name.starts_with(&prefix))
                    && def.find_variant(variant).is_some()
            }) {
                return Some(ret.clone());
            }
        }
        self.registered_enums
            .iter()
            .find(|e| {
                !self.enum_is_blueprint(e)
                    && e.as_enum().is_some_and(|def| {
                        def.name.starts_with(&prefix) && def.find_variant(variant).is_some()
                    })
            })
            .cloned()
    }

    /// Check constructor-call arguments against the class's declared
    /// constructor when one exists; plain structs have none, so their
    /// arguments are only type-checked individually.
    fn check_constructor_args(&mut self, class_name: &str, args: &mut [Expr]) -> SemaResult<()> {
        let ctor_params = self.constructor_params(class_name);
        let mut arg_tys = Vec::with_capacity(args.len());
        for arg in args.iter_mut() {
            arg_tys.push(self.check_expr(arg)?);
        }
        if let Some(params) = ctor_params {
            if params.len() != arg_tys.len() {
                return Err(SemaError::ArgumentCount {
                    expected: params.len(),
                    found: arg_tys.len(),
                });
            }
            for (index, (param, arg)) in params.iter().zip(&arg_tys).enumerate() {
                if param != arg {
                    return Err(SemaError::ArgumentType {
                        index: index + 1,
                        expected: param.to_string(),
                        found: arg.to_string(),
                    });
                }
            }
        }
        Ok(())
    }

    /// Parameter types of a class's declared constructor, if any.
    fn constructor_params(&self, class_name: &str) -> Option<Vec<Type>> {
        match self.type_decls.get(class_name) {
            Some(TypeDeclEntry::Class(class)) => class.members.iter().find_map(|m| match m {
                ClassMember::Constructor(ctor) => {
                    Some(ctor.params.iter().map(|p| p.ty.clone()).collect())
                }
                _ => None,
            }),
            _ => None,
        }
    }
}

/// The type of a literal: the explicit suffix type when present, otherwise
/// the defaults (i32, f64, bool, i8*, void*).
fn literal_type(value: &LiteralValue, explicit_ty: Option<&Type>) -> Type {
    if let Some(ty) = explicit_ty {
        return ty.clone();
    }
    match value {
        LiteralValue::Int(_) => Type::i32(),
        LiteralValue::Float(_) => Type::f64(),
        LiteralValue::Bool(_) => Type::bool(),
        LiteralValue::Str(_) => Type::i8_ptr(),
        LiteralValue::NullPtr => Type::pointer(Type::void()),
    }
}
