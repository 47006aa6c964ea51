//! Name mangling and monomorphization.
//!
//! Generic declarations are blueprints; every specialization site asks for
//! a concrete clone keyed by a deterministic mangled name. A cache entry is
//! created before the clone is analyzed, which terminates recursive
//! specializations. Clones are appended to the analyzer's owned-node list
//! so the MIR builder can traverse them.

use crate::ast::*;
use crate::sema::substitute::Substituter;
use crate::sema::{Sema, SemaError, SemaResult, TypeDeclEntry};
use crate::types::{Type, TypeMap};

/// Build the deterministic mangled name for `base` specialized with
/// `type_args`: the textual form of each argument with `*` replaced by
/// `Ptr` and bracket/comma/space/paren/colon collapsed to `_`.
pub fn mangle(base: &str, type_args: &[Type]) -> String {
    let mut mangled = format!("{base}_");
    for (index, arg) in type_args.iter().enumerate() {
        let replaced = arg.to_string().replace('*', "Ptr");
        for c in replaced.chars() {
            mangled.push(match c {
                '[' | ']' | ',' | ' ' | '(' | ')' | ':' => '_',
                other => other,
            });
        }
        if index + 1 < type_args.len() {
            mangled.push('_');
        }
    }
    mangled
}

impl Sema {
    /// Resolve a type against the current tables. A named type of the form
    /// `Base[...]` that is not yet registered triggers monomorphization of
    /// `Base`'s declaration.
    pub(crate) fn resolve_type(&mut self, ty: &Type) -> SemaResult<Type> {
        if let Some(base) = ty.pointee() {
            return Ok(Type::pointer(self.resolve_type(&base)?));
        }
        if let Some(element) = ty.element_type() {
            let size = match ty.kind() {
                crate::types::TypeKind::Array(_, size) => *size,
                _ => 0,
            };
            return Ok(Type::array(self.resolve_type(&element)?, size));
        }

        if !(ty.is_struct() || ty.is_enum() || ty.is_type_param()) {
            return Ok(ty.clone());
        }

        let name = ty.to_string();
        if let Some(bracket) = name.find('[') {
            if name.ends_with(']') {
                if let Some(existing) = self.symbols.lookup_type(&name) {
                    if !existing.is_type_param() {
                        return Ok(existing);
                    }
                }

                let base_name = name[..bracket].to_string();
                let args_str = &name[bracket + 1..name.len() - 1];
                if let Some(entry) = self.type_decls.get(&base_name).cloned() {
                    let type_args = self.parse_type_argument_list(args_str)?;
                    return match entry {
                        TypeDeclEntry::Struct(decl) => self.monomorphize_struct(&decl, &type_args),
                        TypeDeclEntry::Enum(decl) => self.monomorphize_enum(&decl, &type_args),
                        TypeDeclEntry::Class(decl) => self.monomorphize_class(&decl, &type_args),
                        TypeDeclEntry::Request(_) => {
                            Err(SemaError::UndefinedType(name.clone()))
                        }
                    };
                }
            }
        }

        if let Some(existing) = self.symbols.lookup_type(&name) {
            return Ok(existing);
        }
        Ok(ty.clone())
    }

    /// Split a bracketed argument list at top-level commas and resolve each
    /// piece to a type.
    fn parse_type_argument_list(&mut self, args_str: &str) -> SemaResult<Vec<Type>> {
        let mut pieces = Vec::new();
        let mut depth = 0usize;
        let mut current = String::new();
        for c in args_str.chars() {
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

        let mut type_args = Vec::with_capacity(pieces.len());
        for piece in pieces {
            type_args.push(self.type_from_text(&piece)?);
        }
        Ok(type_args)
    }

    fn type_from_text(&mut self, text: &str) -> SemaResult<Type> {
        if let Some(base) = text.strip_suffix('*') {
            return Ok(Type::pointer(self.type_from_text(base)?));
        }
        let ty = match text {
            "i8" => Type::i8(),
            "i16" => Type::i16(),
            "i32" => Type::i32(),
            "i64" => Type::i64(),
            "u8" => Type::u8(),
            "u16" => Type::u16(),
            "u32" => Type::u32(),
            "u64" => Type::u64(),
            "f32" => Type::f32(),
            "f64" => Type::f64(),
            "bool" => Type::bool(),
            "void" => Type::void(),
            _ => self.resolve_type(&Type::named(text))?,
        };
        Ok(ty)
    }

    /// Verify every request named by a generic parameter's constraint, then
    /// record the parameter in the substitution mapping.
    fn build_mapping(
        &mut self,
        what: &str,
        generic_params: &[GenericParam],
        type_args: &[Type],
    ) -> SemaResult<TypeMap> {
        if generic_params.len() != type_args.len() {
            return Err(SemaError::GenericArity(what.to_string()));
        }
        let mut mapping = TypeMap::new();
        for (param, arg) in generic_params.iter().zip(type_args) {
            if let Some(constraint) = &param.constraint {
                for item in &constraint.items {
                    self.check_constraint(&item.trait_name, arg)?;
                }
            }
            mapping.insert(param.name.clone(), arg.clone());
        }
        Ok(mapping)
    }

    pub fn monomorphize_function(
        &mut self,
        decl: &FunctionDecl,
        type_args: &[Type],
    ) -> SemaResult<(String, Type)> {
        let mangled = mangle(&decl.name, type_args);
        if let Some(fn_ty) = self.mono_fns.get(&mangled) {
            return Ok((mangled, fn_ty.clone()));
        }

        let mapping = self.build_mapping(&decl.name, &decl.generic_params, type_args)?;
        let mut spec = decl.clone();
        Substituter::new(&mapping).apply_function(&mut spec);
        spec.name = mangled.clone();
        spec.generic_params.clear();

        // Cache before analysis so recursive uses of the same
        // specialization hit the cache instead of recursing forever.
        let fn_ty = spec.fn_type();
        self.mono_fns.insert(mangled.clone(), fn_ty.clone());
        tracing::debug!(name = %mangled, "monomorphizing function");

        self.analyze_function_decl(&mut spec)?;
        self.owned.push(Stmt::Decl(Decl::Function(spec)));
        Ok((mangled, fn_ty))
    }

    /// Generic methods on (possibly monomorphized) classes become plain
    /// functions named `Class_Method_Args...`, analyzed with the enclosing
    /// class as the privacy context.
    pub fn monomorphize_method(
        &mut self,
        class: &ClassDecl,
        method: &MethodDecl,
        type_args: &[Type],
    ) -> SemaResult<(String, Type)> {
        let base = format!("{}_{}", class.name, method.name);
        let mangled = mangle(&base, type_args);
        if let Some(fn_ty) = self.mono_fns.get(&mangled) {
            return Ok((mangled, fn_ty.clone()));
        }

        let mapping = self.build_mapping(&base, &method.generic_params, type_args)?;
        let mut spec_method = method.clone();
        Substituter::new(&mapping).apply_method(&mut spec_method);
        spec_method.generic_params.clear();

        let mut spec = FunctionDecl {
            name: mangled.clone(),
            generic_params: Vec::new(),
            params: spec_method.params,
            return_type: spec_method.return_type,
            body: spec_method.body,
            is_extern: false,
            is_public: spec_method.is_public,
            is_variadic: false,
        };

        let fn_ty = spec.fn_type();
        self.mono_fns.insert(mangled.clone(), fn_ty.clone());
        tracing::debug!(name = %mangled, "monomorphizing method");

        let old_class = self.current_class.take();
        if let Some(class_ty) = self.symbols.lookup_type(&class.name) {
            if class_ty.is_struct() {
                self.current_class = Some(class_ty);
            }
        }
        let analysis = self.analyze_function_decl(&mut spec);
        self.current_class = old_class;
        analysis?;

        self.owned.push(Stmt::Decl(Decl::Function(spec)));
        Ok((mangled, fn_ty))
    }

    pub fn monomorphize_struct(
        &mut self,
        decl: &StructDecl,
        type_args: &[Type],
    ) -> SemaResult<Type> {
        let mangled = mangle(&decl.name, type_args);
        if let Some(existing) = self.symbols.lookup_type(&mangled) {
            if existing.is_struct() {
                return Ok(existing);
            }
        }

        let mapping = self.build_mapping(&decl.name, &decl.generic_params, type_args)?;
        let mut wrapped = Decl::Struct(decl.clone());
        Substituter::new(&mapping).apply_decl(&mut wrapped);
        let Decl::Struct(mut spec) = wrapped else {
            unreachable!("substituter preserves declaration kinds")
        };
        spec.name = mangled.clone();
        spec.generic_params.clear();
        tracing::debug!(name = %mangled, "monomorphizing struct");

        // Cache before analysis: a provisional entry under the mangled name
        // lets a self-referential field like `next: Node[i32]*` resolve to
        // the shared named handle instead of re-entering monomorphization.
        self.mono_in_progress.insert(mangled.clone());
        self.symbols
            .insert_type_global(&mangled, Some(Type::named(mangled.clone())), decl.is_public);
        let analysis = self.analyze_struct_decl(&mut spec);
        self.mono_in_progress.remove(&mangled);
        analysis?;
        self.owned.push(Stmt::Decl(Decl::Struct(spec)));

        self.symbols
            .lookup_type(&mangled)
            .ok_or(SemaError::UndefinedType(mangled))
    }

    pub fn monomorphize_class(&mut self, decl: &ClassDecl, type_args: &[Type]) -> SemaResult<Type> {
        let mangled = mangle(&decl.name, type_args);
        if let Some(existing) = self.symbols.lookup_type(&mangled) {
            if existing.is_class() {
                return Ok(existing);
            }
        }

        let mapping = self.build_mapping(&decl.name, &decl.generic_params, type_args)?;
        let mut wrapped = Decl::Class(decl.clone());
        Substituter::new(&mapping).apply_decl(&mut wrapped);
        let Decl::Class(mut spec) = wrapped else {
            unreachable!("substituter preserves declaration kinds")
        };
        spec.name = mangled.clone();
        spec.generic_params.clear();

        // Constructors and the destructor carry the class name; keep them
        // in step with the mangled clone.
        let dtor_name = format!("~{}", decl.name);
        for member in &mut spec.members {
            match member {
                ClassMember::Constructor(ctor) if ctor.name == decl.name => {
                    ctor.name = mangled.clone();
                }
                ClassMember::Method(method) if method.name == dtor_name => {
                    method.name = format!("~{mangled}");
                }
                _ => {}
            }
        }
        tracing::debug!(name = %mangled, "monomorphizing class");

        self.mono_in_progress.insert(mangled.clone());
        self.symbols
            .insert_type_global(&mangled, Some(Type::class(mangled.clone(), Vec::new())), decl.is_public);
        let analysis = self.analyze_class_decl(&mut spec);
        self.mono_in_progress.remove(&mangled);
        analysis?;
        self.owned.push(Stmt::Decl(Decl::Class(spec)));

        self.symbols
            .lookup_type(&mangled)
            .ok_or(SemaError::UndefinedType(mangled))
    }

    pub fn monomorphize_enum(&mut self, decl: &EnumDecl, type_args: &[Type]) -> SemaResult<Type> {
        let mangled = mangle(&decl.name, type_args);
        if let Some(existing) = self.symbols.lookup_type(&mangled) {
            if existing.is_enum() {
                return Ok(existing);
            }
        }

        let mapping = self.build_mapping(&decl.name, &decl.generic_params, type_args)?;
        let mut wrapped = Decl::Enum(decl.clone());
        Substituter::new(&mapping).apply_decl(&mut wrapped);
        let Decl::Enum(mut spec) = wrapped else {
            unreachable!("substituter preserves declaration kinds")
        };
        spec.name = mangled.clone();
        spec.generic_params.clear();
        tracing::debug!(name = %mangled, "monomorphizing enum");

        self.mono_in_progress.insert(mangled.clone());
        self.symbols.insert_type_global(
            &mangled,
            Some(Type::enumeration(mangled.clone(), Vec::new())),
            decl.is_public,
        );
        let analysis = self.analyze_enum_decl(&mut spec);
        self.mono_in_progress.remove(&mangled);
        analysis?;
        self.owned.push(Stmt::Decl(Decl::Enum(spec)));

        self.symbols
            .lookup_type(&mangled)
            .ok_or(SemaError::UndefinedType(mangled))
    }

    /// Resolve `Base[Args]` at an expression site and record the mangled
    /// name on the node for the lowering stage.
    pub(crate) fn check_specialization(
        &mut self,
        base: &mut Expr,
        type_args: &mut Vec<Type>,
        mangled: &mut String,
    ) -> SemaResult<Type> {
        let mut resolved_args = Vec::with_capacity(type_args.len());
        for arg in type_args.iter() {
            resolved_args.push(self.resolve_type(arg)?);
        }
        *type_args = resolved_args.clone();

        if let Some(base_name) = base.as_ident().map(str::to_string) {
            if let Some(decl) = self.generic_fns.get(&base_name).cloned() {
                let (name, fn_ty) = self.monomorphize_function(&decl, &resolved_args)?;
                *mangled = name;
                return Ok(fn_ty);
            }
            if let Some(entry) = self.type_decls.get(&base_name).cloned() {
                let ty = match entry {
                    TypeDeclEntry::Struct(decl) => self.monomorphize_struct(&decl, &resolved_args)?,
                    TypeDeclEntry::Class(decl) => self.monomorphize_class(&decl, &resolved_args)?,
                    TypeDeclEntry::Enum(decl) => self.monomorphize_enum(&decl, &resolved_args)?,
                    TypeDeclEntry::Request(_) => {
                        return Err(SemaError::Other(format!(
                            "cannot specialize request '{base_name}'"
                        )))
                    }
                };
                *mangled = ty.to_string();
                return Ok(ty);
            }
            return Err(SemaError::UndefinedIdentifier(base_name));
        }

        // `object.method[Args]` or `Class::method[Args]`: a generic method
        // of a (monomorphized) class.
        if let ExprKind::Member { base: inner, member, .. } = &mut base.kind {
            let member = member.clone();
            let mut base_ty = self.check_expr(inner)?;
            if let Some(pointee) = base_ty.pointee() {
                base_ty = pointee;
            }
            if let Some(def) = base_ty.as_struct() {
                let class_name = def.name.clone();
                if let Some(TypeDeclEntry::Class(class)) =
                    self.type_decls.get(&class_name).cloned()
                {
                    if let Some(method) = class.find_method(&member).cloned() {
                        let (name, fn_ty) =
                            self.monomorphize_method(&class, &method, &resolved_args)?;
                        *mangled = name;
                        return Ok(fn_ty);
                    }
                }
                return Err(SemaError::Other(format!(
                    "no generic method '{member}' on '{class_name}'"
                )));
            }
        }

        Err(SemaError::Other(format!("cannot specialize '{base}'")))
    }

    /// Verify that `ty` satisfies the named request: every listed method
    /// must exist on the candidate with a structurally equal signature
    /// after substituting `Self` (and the request's first generic
    /// parameter) with the candidate.
    pub(crate) fn check_constraint(&mut self, request_name: &str, ty: &Type) -> SemaResult<()> {
        let Some(TypeDeclEntry::Request(request)) = self.type_decls.get(request_name).cloned()
        else {
            return Err(SemaError::UnknownRequest(request_name.to_string()));
        };

        let mut mapping = TypeMap::new();
        mapping.insert("Self".to_string(), ty.clone());
        if let Some(first) = request.generic_params.first() {
            mapping.insert(first.name.clone(), ty.clone());
        }

        for member in &request.members {
            let RequestItem::Method(required) = &member.item else {
                continue;
            };
            let expected = required.fn_type().substitute(&mapping);

            let actual = ty.as_struct().and_then(|def| def.find_method(&required.name));
            let Some(actual) = actual else {
                return Err(SemaError::ConstraintUnsatisfied {
                    ty: ty.to_string(),
                    request: request_name.to_string(),
                    reason: format!("missing method '{}'", required.name),
                });
            };
            if actual.ty != expected {
                return Err(SemaError::ConstraintUnsatisfied {
                    ty: ty.to_string(),
                    request: request_name.to_string(),
                    reason: format!(
                        "method '{}' has signature {}, expected {expected}",
                        required.name, actual.ty
                    ),
                });
            }
        }
        Ok(())
    }
}
