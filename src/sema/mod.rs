//! Semantic analysis.
//!
//! A single walker over the parsed program that resolves names and types,
//! enforces scoping, visibility and move semantics, monomorphizes generic
//! declarations on first use, validates request conformance, and annotates
//! every expression with its type for the MIR builder.
//!
//! The analyzer owns everything it synthesizes: monomorphized clones and
//! imported declarations accumulate in an owned-node list alongside the
//! program so the lowering stage can traverse both. The built-in
//! `enum Result[T, E] { Ok(T), Err(E) }` is parsed and analyzed at
//! construction, so later generic uses monomorphize it like any other enum.

pub mod error;
mod expr;
mod mono;
pub mod substitute;
pub mod symbol_table;

#[cfg(test)]
mod tests;

use std::collections::{HashMap, HashSet};
use std::path::PathBuf;

use crate::ast::*;
use crate::parser::Parser;
use crate::types::{Field, Type, Variant, VariantPayload};

pub use error::SemaError;
pub use symbol_table::{Symbol, SymbolTable};

pub type SemaResult<T> = Result<T, SemaError>;

/// A registered declaration blueprint, looked up by name when a
/// specialization site or a `Base[...]` type needs monomorphizing.
#[derive(Debug, Clone)]
pub enum TypeDeclEntry {
    Struct(StructDecl),
    Enum(EnumDecl),
    Class(ClassDecl),
    Request(RequestDecl),
}

pub struct Sema {
    pub(crate) symbols: SymbolTable,
    /// Every analyzed enum type, used to resolve bare variant names.
    pub(crate) registered_enums: Vec<Type>,
    /// Canonicalized paths already imported; breaks import cycles.
    loaded_modules: HashSet<String>,
    /// Imported modules' symbol tables, keyed by module name.
    modules: HashMap<String, SymbolTable>,
    /// Declarations owned by the analyzer: the built-in Result, imported
    /// units, and monomorphized clones.
    owned: Vec<Stmt>,
    /// Declaration blueprints by name (original and mangled).
    pub(crate) type_decls: HashMap<String, TypeDeclEntry>,
    /// Generic function blueprints by name.
    pub(crate) generic_fns: HashMap<String, FunctionDecl>,
    /// Monomorphized functions and methods: mangled name -> function type.
    pub(crate) mono_fns: HashMap<String, Type>,
    /// Mangled aggregate names whose monomorphization is underway; their
    /// provisional table entries are completed when analysis finishes.
    pub(crate) mono_in_progress: HashSet<String>,
    /// Return type of the function or method under analysis.
    pub(crate) current_return: Option<Type>,
    /// The class type whose members are being analyzed, for private access.
    pub(crate) current_class: Option<Type>,
    loop_depth: u32,
    switch_depth: u32,
    /// Directory against which import paths resolve.
    base_dir: PathBuf,
}

impl Sema {
    pub fn new() -> Self {
        Self::with_base_dir(PathBuf::from("."))
    }

    pub fn with_base_dir(base_dir: PathBuf) -> Self {
        let mut sema = Self {
            symbols: SymbolTable::new(),
            registered_enums: Vec::new(),
            loaded_modules: HashSet::new(),
            modules: HashMap::new(),
            owned: Vec::new(),
            type_decls: HashMap::new(),
            generic_fns: HashMap::new(),
            mono_fns: HashMap::new(),
            mono_in_progress: HashSet::new(),
            current_return: None,
            current_class: None,
            loop_depth: 0,
            switch_depth: 0,
            base_dir,
        };
        sema.inject_builtins();
        sema
    }

    /// Parse and analyze the built-in declarations available without
    /// import.
    fn inject_builtins(&mut self) {
        let mut parser = Parser::new("enum Result[T, E] { Ok(T), Err(E) }");
        let nodes = parser
            .parse_program()
            .expect("BUG: built-in Result source failed to parse");
        for mut node in nodes {
            self.analyze(&mut node)
                .expect("BUG: built-in Result failed analysis");
            self.owned.push(node);
        }
    }

    /// Analyze every top-level node of a unit in source order.
    pub fn analyze_program(&mut self, nodes: &mut [Stmt]) -> SemaResult<()> {
        for node in nodes {
            self.analyze(node)?;
        }
        Ok(())
    }

    pub fn analyze(&mut self, node: &mut Stmt) -> SemaResult<()> {
        match node {
            Stmt::Decl(decl) => match decl {
                Decl::Var(var) => self.analyze_var_decl(var),
                Decl::Function(func) => self.analyze_function_decl(func),
                Decl::Struct(st) => self.analyze_struct_decl(st),
                Decl::Enum(en) => self.analyze_enum_decl(en),
                Decl::Class(class) => self.analyze_class_decl(class),
                Decl::Request(req) => self.analyze_request_decl(req),
                Decl::Import(import) => self.analyze_import_decl(import),
                Decl::Package(_) => Ok(()),
                Decl::Use(use_decl) => self.analyze_use_decl(use_decl),
            },
            Stmt::Block(block) => self.analyze_block(block),
            Stmt::If(if_stmt) => self.analyze_if_stmt(if_stmt),
            Stmt::While(while_stmt) => self.analyze_while_stmt(while_stmt),
            Stmt::DoWhile(do_while) => self.analyze_do_while_stmt(do_while),
            Stmt::For(for_stmt) => self.analyze_for_stmt(for_stmt),
            Stmt::Switch(switch) => self.analyze_switch_stmt(switch),
            Stmt::Break => self.analyze_break(),
            Stmt::Continue => self.analyze_continue(),
            Stmt::Return(ret) => self.analyze_return_stmt(ret),
            Stmt::Expr(expr) => self.check_expr(expr).map(|_| ()),
        }
    }

    // ============================================================
    // Accessors for the lowering stage
    // ============================================================

    /// Declarations owned by the analyzer (built-ins, imports, and
    /// monomorphized clones), in the order they were produced.
    pub fn owned_nodes(&self) -> &[Stmt] {
        &self.owned
    }

    pub fn modules(&self) -> &HashMap<String, SymbolTable> {
        &self.modules
    }

    pub fn symbol_table(&self) -> &SymbolTable {
        &self.symbols
    }

    // ============================================================
    // Declarations
    // ============================================================

    fn analyze_var_decl(&mut self, decl: &mut VarDecl) -> SemaResult<()> {
        let mut ty = match &decl.ty {
            Some(t) => Some(self.resolve_type(t)?),
            None => None,
        };

        if let Some(init) = &mut decl.init {
            let init_ty = self.check_expr(init)?;
            match &ty {
                None => ty = Some(init_ty.clone()),
                Some(expected) if *expected != init_ty => {
                    return Err(SemaError::TypeMismatch {
                        context: "variable declaration".into(),
                        expected: expected.to_string(),
                        found: init_ty.to_string(),
                    });
                }
                _ => {}
            }

            // Initializing from a plain identifier of a move type transfers
            // ownership away from that name.
            if !init_ty.is_copy() {
                if let Some(name) = init.as_ident() {
                    let name = name.to_string();
                    self.symbols.mark_moved(&name);
                }
            }
        }

        decl.ty = ty.clone();
        let ty = ty.ok_or_else(|| {
            SemaError::Other(format!("cannot infer a type for '{}'", decl.name))
        })?;

        if !self.symbols.insert(&decl.name, ty, decl.is_mutable, decl.is_public) {
            return Err(SemaError::Redefinition(decl.name.clone()));
        }
        Ok(())
    }

    pub(crate) fn analyze_function_decl(&mut self, decl: &mut FunctionDecl) -> SemaResult<()> {
        for param in &mut decl.params {
            param.ty = self.resolve_type(&param.ty)?;
        }
        decl.return_type = self.resolve_type(&decl.return_type)?;
        let fn_ty = decl.fn_type();

        if !self
            .symbols
            .insert_global(&decl.name, fn_ty.clone(), false, decl.is_public)
        {
            // Tolerate an identical re-registration (monomorphization cache
            // re-analysis); anything else is a clash.
            match self.symbols.lookup(&decl.name) {
                Some(existing) if existing.ty == fn_ty => {}
                _ => return Err(SemaError::Redefinition(decl.name.clone())),
            }
        }

        // Generic functions are blueprints: registered, never analyzed
        // until a specialization clones them.
        if !decl.generic_params.is_empty() {
            self.generic_fns.insert(decl.name.clone(), decl.clone());
            return Ok(());
        }

        let old_return = self.current_return.replace(decl.return_type.clone());
        self.symbols.push_scope();
        for param in &decl.params {
            if !self.symbols.insert(&param.name, param.ty.clone(), false, false) {
                return Err(SemaError::Redefinition(param.name.clone()));
            }
        }

        if !decl.is_extern {
            if let Some(body) = &mut decl.body {
                self.analyze_block(body)?;
            }
        }

        self.symbols.pop_scope();
        self.current_return = old_return;
        Ok(())
    }

    pub(crate) fn analyze_struct_decl(&mut self, decl: &mut StructDecl) -> SemaResult<()> {
        let mut fields = Vec::new();
        for member in &mut decl.members {
            if let Some(t) = &member.ty {
                let resolved = self.resolve_type(t)?;
                member.ty = Some(resolved.clone());
                fields.push(Field {
                    name: member.name.clone(),
                    ty: resolved,
                    is_public: member.is_public,
                });
            }
        }

        let struct_ty = Type::structure(decl.name.clone(), fields);
        if !self
            .symbols
            .insert_type_global(&decl.name, Some(struct_ty.clone()), decl.is_public)
        {
            // Tolerate an identical re-registration, and complete the
            // provisional entry a recursive monomorphization left behind.
            match self.symbols.lookup_type(&decl.name) {
                Some(existing) if existing == struct_ty => {
                    self.symbols
                        .replace_type_global(&decl.name, struct_ty.clone());
                }
                _ => return Err(SemaError::Redefinition(decl.name.clone())),
            }
        }

        self.type_decls
            .insert(decl.name.clone(), TypeDeclEntry::Struct(decl.clone()));
        Ok(())
    }

    pub(crate) fn analyze_enum_decl(&mut self, decl: &mut EnumDecl) -> SemaResult<()> {
        let mut variants = Vec::new();
        for variant in &mut decl.variants {
            let payload = match &mut variant.body {
                VariantBody::Unit => VariantPayload::Unit,
                VariantBody::Tuple(types) => {
                    for ty in types.iter_mut() {
                        *ty = self.resolve_type(ty)?;
                    }
                    VariantPayload::Tuple(types.clone())
                }
                VariantBody::Struct(fields) => {
                    let mut resolved_fields = Vec::new();
                    for field in fields {
                        if let Some(t) = &field.ty {
                            let resolved = self.resolve_type(t)?;
                            field.ty = Some(resolved.clone());
                            resolved_fields.push(Field {
                                name: field.name.clone(),
                                ty: resolved,
                                is_public: true,
                            });
                        }
                    }
                    VariantPayload::Struct(resolved_fields)
                }
            };
            variants.push(Variant {
                name: variant.name.clone(),
                payload,
            });
        }

        let enum_ty = Type::enumeration(decl.name.clone(), variants);
        decl.ty = Some(enum_ty.clone());
        self.registered_enums.push(enum_ty.clone());
        if !self
            .symbols
            .insert_type_global(&decl.name, Some(enum_ty.clone()), decl.is_public)
        {
            if self.mono_in_progress.contains(&decl.name) {
                self.symbols.replace_type_global(&decl.name, enum_ty);
            } else {
                return Err(SemaError::Redefinition(decl.name.clone()));
            }
        }

        self.type_decls
            .insert(decl.name.clone(), TypeDeclEntry::Enum(decl.clone()));
        Ok(())
    }

    pub(crate) fn analyze_class_decl(&mut self, decl: &mut ClassDecl) -> SemaResult<()> {
        // Fields first, so the class type can register before method
        // signatures (which may mention it through Self) resolve.
        let mut fields = Vec::new();
        for member in &mut decl.members {
            if let ClassMember::Field(var) = member {
                let Some(t) = &var.ty else {
                    return Err(SemaError::Other(format!(
                        "field '{}' must have an explicit type",
                        var.name
                    )));
                };
                let resolved = self.resolve_type(t)?;
                var.ty = Some(resolved.clone());
                fields.push(Field {
                    name: var.name.clone(),
                    ty: resolved,
                    is_public: var.is_public,
                });
            }
        }

        let class_ty = Type::class(decl.name.clone(), fields);
        if !self
            .symbols
            .insert_type_global(&decl.name, Some(class_ty.clone()), decl.is_public)
        {
            if self.mono_in_progress.contains(&decl.name) {
                self.symbols
                    .replace_type_global(&decl.name, class_ty.clone());
            } else {
                return Err(SemaError::Redefinition(decl.name.clone()));
            }
        }

        if !decl.generic_params.is_empty() {
            self.type_decls
                .insert(decl.name.clone(), TypeDeclEntry::Class(decl.clone()));
            return Ok(());
        }

        // Install the method table, rewriting the `Self` receiver
        // placeholder to the class type.
        let mut methods = Vec::new();
        for member in &mut decl.members {
            if let ClassMember::Method(method) = member {
                for param in &mut method.params {
                    let mut resolved = self.resolve_type(&param.ty)?;
                    if is_self_placeholder(&resolved) {
                        resolved = class_ty.clone();
                    } else if let Some(base) = resolved.pointee() {
                        if is_self_placeholder(&base) {
                            resolved = Type::pointer(class_ty.clone());
                        }
                    }
                    param.ty = resolved;
                }
                method.return_type = self.resolve_type(&method.return_type)?;
                methods.push(crate::types::Method {
                    name: method.name.clone(),
                    ty: method.fn_type(),
                    is_public: method.is_public,
                });
            }
        }
        if let Some(def) = class_ty.as_struct() {
            def.set_methods(methods);
        }

        // Analyze bodies with the class set as the privacy context.
        let class_name = decl.name.clone();
        let old_class = self.current_class.replace(class_ty);
        for member in &mut decl.members {
            match member {
                ClassMember::Method(method) => self.analyze_method_decl(method)?,
                ClassMember::Constructor(ctor) => {
                    self.analyze_constructor_decl(ctor, &class_name)?
                }
                ClassMember::Field(var) => {
                    if let Some(init) = &mut var.init {
                        self.check_expr(init)?;
                    }
                }
            }
        }
        self.current_class = old_class;

        self.type_decls
            .insert(class_name, TypeDeclEntry::Class(decl.clone()));
        Ok(())
    }

    fn analyze_method_decl(&mut self, method: &mut MethodDecl) -> SemaResult<()> {
        // Generic methods wait for specialization.
        if !method.generic_params.is_empty() {
            return Ok(());
        }

        let old_return = self.current_return.replace(method.return_type.clone());
        self.symbols.push_scope();
        for param in &method.params {
            if !self.symbols.insert(&param.name, param.ty.clone(), false, false) {
                return Err(SemaError::Redefinition(param.name.clone()));
            }
        }

        if let Some(body) = &mut method.body {
            self.analyze_block(body)?;
        }

        self.symbols.pop_scope();
        self.current_return = old_return;
        Ok(())
    }

    fn analyze_constructor_decl(
        &mut self,
        ctor: &mut ConstructorDecl,
        class_name: &str,
    ) -> SemaResult<()> {
        if ctor.name != class_name {
            return Err(SemaError::Other(
                "constructor name must match class name".into(),
            ));
        }

        // Constructors have no declared return type; return checking is
        // suspended inside them.
        let old_return = self.current_return.take();
        self.symbols.push_scope();
        for param in &mut ctor.params {
            param.ty = self.resolve_type(&param.ty)?;
            if !self.symbols.insert(&param.name, param.ty.clone(), false, false) {
                return Err(SemaError::Redefinition(param.name.clone()));
            }
        }

        let class_ty = self
            .current_class
            .clone()
            .ok_or_else(|| SemaError::Other("constructor outside of a class".into()))?;
        self.symbols
            .insert("self", Type::pointer(class_ty), false, false);

        self.analyze_block(&mut ctor.body)?;

        self.symbols.pop_scope();
        self.current_return = old_return;
        Ok(())
    }

    fn analyze_request_decl(&mut self, decl: &mut RequestDecl) -> SemaResult<()> {
        if !self
            .symbols
            .insert_type_global(&decl.name, None, decl.is_public)
        {
            return Err(SemaError::Redefinition(decl.name.clone()));
        }

        self.symbols.push_scope();
        for param in &decl.generic_params {
            self.symbols
                .insert_type(&param.name, Some(Type::param(param.name.clone())), false);
        }

        for member in &mut decl.members {
            if let RequestItem::Method(method) = &mut member.item {
                for param in &mut method.params {
                    param.ty = self.resolve_type(&param.ty)?;
                }
                method.return_type = self.resolve_type(&method.return_type)?;
            }
        }

        self.symbols.pop_scope();
        self.type_decls
            .insert(decl.name.clone(), TypeDeclEntry::Request(decl.clone()));
        Ok(())
    }

    // ============================================================
    // Imports and `use`
    // ============================================================

    fn analyze_import_decl(&mut self, decl: &ImportDecl) -> SemaResult<()> {
        if decl.is_std {
            return Ok(());
        }

        let path = self.base_dir.join(&decl.path);
        let key = std::fs::canonicalize(&path)
            .unwrap_or_else(|_| path.clone())
            .to_string_lossy()
            .into_owned();
        // A second import of the same file is a no-op; this also breaks
        // import cycles.
        if !self.loaded_modules.insert(key) {
            return Ok(());
        }

        let module_name = if !decl.alias.is_empty() {
            decl.alias.clone()
        } else {
            path.file_stem()
                .map(|s| s.to_string_lossy().into_owned())
                .unwrap_or_else(|| decl.path.clone())
        };
        tracing::debug!(module = %module_name, path = %path.display(), "loading imported module");

        let source = std::fs::read_to_string(&path).map_err(|e| {
            SemaError::Other(format!("could not open imported file {}: {e}", path.display()))
        })?;
        let mut parser = Parser::new(&source);
        let mut nodes = parser.parse_program().map_err(|diag| {
            SemaError::Other(format!("in imported file {}: {diag}", path.display()))
        })?;

        let parent_dir = path
            .parent()
            .map(|p| p.to_path_buf())
            .unwrap_or_else(|| self.base_dir.clone());
        let mut sub = Sema::with_base_dir(parent_dir);
        sub.loaded_modules = std::mem::take(&mut self.loaded_modules);
        let analysis: SemaResult<()> = nodes.iter_mut().try_for_each(|node| sub.analyze(node));
        self.loaded_modules = std::mem::take(&mut sub.loaded_modules);
        analysis?;

        // The sub-analyzer's owned nodes (its built-ins and monos) come
        // first, then the module's own declarations renamed so their MIR
        // symbols link uniquely.
        self.owned.append(&mut sub.owned);
        for mut node in nodes {
            if let Stmt::Decl(decl) = &mut node {
                match decl {
                    Decl::Function(f) => f.name = format!("{module_name}_{}", f.name),
                    Decl::Struct(s) => s.name = format!("{module_name}_{}", s.name),
                    Decl::Enum(e) => e.name = format!("{module_name}_{}", e.name),
                    Decl::Class(c) => c.name = format!("{module_name}_{}", c.name),
                    _ => {}
                }
            }
            self.owned.push(node);
        }

        self.modules.insert(module_name, sub.symbols);
        Ok(())
    }

    fn analyze_use_decl(&mut self, decl: &UseDecl) -> SemaResult<()> {
        let pos = decl.path.rfind("::").ok_or_else(|| {
            SemaError::Other(format!(
                "invalid use path (expected module::member): {}",
                decl.path
            ))
        })?;
        let module_name = &decl.path[..pos];
        let member = &decl.path[pos + 2..];

        let table = self
            .modules
            .get(module_name)
            .ok_or_else(|| SemaError::UnknownModule(module_name.to_string()))?;
        let alias = if decl.alias.is_empty() {
            member.to_string()
        } else {
            decl.alias.clone()
        };

        if let Some(symbol) = table.public_symbols().get(member) {
            let (ty, is_mutable) = (symbol.ty.clone(), symbol.is_mutable);
            if !self.symbols.insert(&alias, ty, is_mutable, false) {
                return Err(SemaError::Redefinition(alias));
            }
            return Ok(());
        }
        if let Some(ty) = table.public_types().get(member) {
            let ty = ty.clone();
            if !self.symbols.insert_type(&alias, Some(ty), false) {
                return Err(SemaError::Redefinition(alias));
            }
            return Ok(());
        }

        Err(SemaError::NoSuchModuleMember {
            module: module_name.to_string(),
            member: member.to_string(),
        })
    }

    // ============================================================
    // Statements
    // ============================================================

    pub(crate) fn analyze_block(&mut self, block: &mut Block) -> SemaResult<()> {
        self.symbols.push_scope();
        for stmt in &mut block.statements {
            self.analyze(stmt)?;
        }
        self.symbols.pop_scope();
        Ok(())
    }

    fn check_condition(&mut self, condition: &mut Expr) -> SemaResult<()> {
        let ty = self.check_expr(condition)?;
        if !ty.is_bool() {
            return Err(SemaError::NonBoolCondition(ty.to_string()));
        }
        Ok(())
    }

    fn analyze_if_stmt(&mut self, stmt: &mut IfStmt) -> SemaResult<()> {
        self.check_condition(&mut stmt.condition)?;
        self.analyze_block(&mut stmt.then_block)?;
        if let Some(else_block) = &mut stmt.else_block {
            self.analyze_block(else_block)?;
        }
        Ok(())
    }

    fn analyze_while_stmt(&mut self, stmt: &mut WhileStmt) -> SemaResult<()> {
        self.check_condition(&mut stmt.condition)?;
        self.loop_depth += 1;
        let result = self.analyze_block(&mut stmt.body);
        self.loop_depth -= 1;
        result
    }

    fn analyze_do_while_stmt(&mut self, stmt: &mut DoWhileStmt) -> SemaResult<()> {
        self.loop_depth += 1;
        let result = self.analyze_block(&mut stmt.body);
        self.loop_depth -= 1;
        result?;
        self.check_condition(&mut stmt.condition)
    }

    fn analyze_for_stmt(&mut self, stmt: &mut ForStmt) -> SemaResult<()> {
        self.symbols.push_scope();
        if let Some(init) = &mut stmt.init {
            self.analyze(init)?;
        }
        if let Some(condition) = &mut stmt.condition {
            self.check_condition(condition)?;
        }
        if let Some(step) = &mut stmt.step {
            self.check_expr(step)?;
        }
        self.loop_depth += 1;
        let result = self.analyze_block(&mut stmt.body);
        self.loop_depth -= 1;
        self.symbols.pop_scope();
        result
    }

    fn analyze_switch_stmt(&mut self, stmt: &mut SwitchStmt) -> SemaResult<()> {
        let scrutinee_ty = self.check_expr(&mut stmt.condition)?;

        self.switch_depth += 1;
        for case in &mut stmt.cases {
            self.symbols.push_scope();
            if let Some(pattern) = &mut case.pattern {
                self.analyze_pattern(pattern, &scrutinee_ty)?;
            }
            let result = self.analyze_block(&mut case.body);
            self.symbols.pop_scope();
            result?;
        }
        self.switch_depth -= 1;
        Ok(())
    }

    fn analyze_break(&mut self) -> SemaResult<()> {
        if self.loop_depth == 0 && self.switch_depth == 0 {
            return Err(SemaError::BreakOutside);
        }
        Ok(())
    }

    fn analyze_continue(&mut self) -> SemaResult<()> {
        if self.loop_depth == 0 {
            return Err(SemaError::ContinueOutside);
        }
        Ok(())
    }

    fn analyze_return_stmt(&mut self, stmt: &mut ReturnStmt) -> SemaResult<()> {
        let found = match &mut stmt.value {
            Some(value) => self.check_expr(value)?,
            None => Type::void(),
        };

        if let Some(expected) = self.current_return.clone() {
            if found != expected {
                return Err(SemaError::TypeMismatch {
                    context: "return".into(),
                    expected: expected.to_string(),
                    found: found.to_string(),
                });
            }
        }
        Ok(())
    }

    // ============================================================
    // Patterns
    // ============================================================

    pub(crate) fn analyze_pattern(
        &mut self,
        pattern: &mut Pattern,
        match_ty: &Type,
    ) -> SemaResult<()> {
        match pattern {
            Pattern::Literal(literal) => {
                let literal_ty = self.check_expr(literal)?;
                if literal_ty != *match_ty {
                    return Err(SemaError::TypeMismatch {
                        context: "pattern".into(),
                        expected: match_ty.to_string(),
                        found: literal_ty.to_string(),
                    });
                }
                Ok(())
            }
            Pattern::Identifier(name) => {
                if !self.symbols.insert(name, match_ty.clone(), false, false) {
                    return Err(SemaError::Redefinition(name.clone()));
                }
                Ok(())
            }
            Pattern::Wildcard => Ok(()),
            Pattern::Variant {
                enum_name,
                variant,
                sub_patterns,
            } => {
                let def = match_ty.as_enum().ok_or_else(|| {
                    SemaError::Other(format!(
                        "cannot match variant against non-enum type: {match_ty}"
                    ))
                })?;

                // The written name may be the generic base (`Result`) or a
                // specialization (`Result[i32, bool]`); either must match
                // the mangled scrutinee type.
                if !enum_name.is_empty() && *enum_name != def.name {
                    let canonical = canonicalize_enum_name(enum_name);
                    let mangled = def.name.trim_end_matches('_');
                    if canonical != mangled && !def.name.starts_with(&format!("{enum_name}_")) {
                        return Err(SemaError::TypeMismatch {
                            context: "enum pattern".into(),
                            expected: def.name.clone(),
                            found: enum_name.clone(),
                        });
                    }
                }

                let variant_def = def
                    .find_variant(variant)
                    .ok_or_else(|| {
                        SemaError::Other(format!(
                            "variant '{variant}' not found in enum '{}'",
                            def.name
                        ))
                    })?
                    .clone();

                if sub_patterns.len() != variant_def.field_count() {
                    return Err(SemaError::ArgumentCount {
                        expected: variant_def.field_count(),
                        found: sub_patterns.len(),
                    });
                }

                for (index, sub) in sub_patterns.iter_mut().enumerate() {
                    let field_ty = variant_def
                        .field_type(index)
                        .expect("BUG: pattern arity checked above");
                    self.analyze_pattern(sub, &field_ty)?;
                }
                Ok(())
            }
        }
    }
}

impl Default for Sema {
    fn default() -> Self {
        Self::new()
    }
}

impl Sema {
    /// Named aggregate references are shared handles; the symbol table
    /// holds the completed definition for the name. Resolving through it
    /// turns a provisional recursion-breaking handle back into the full
    /// type.
    pub(crate) fn canonical_type(&self, ty: &Type) -> Type {
        let name = match (ty.as_struct(), ty.as_enum()) {
            (Some(def), _) => &def.name,
            (_, Some(def)) => &def.name,
            _ => return ty.clone(),
        };
        self.symbols.lookup_type(name).unwrap_or_else(|| ty.clone())
    }
}

/// Whether a resolved type is the `Self` receiver placeholder.
fn is_self_placeholder(ty: &Type) -> bool {
    ty.as_struct().is_some_and(|def| def.name == "Self")
}

/// Rewrite a written enum name (`Result[i32, bool]`) into the mangled form
/// used by the scrutinee type (`Result_i32_bool`) for comparison.
fn canonicalize_enum_name(written: &str) -> String {
    let replaced = written.replace('*', "Ptr");
    let mut out = String::new();
    for c in replaced.chars() {
        let c = if matches!(c, '[' | ']' | ',' | ' ') { '_' } else { c };
        if c == '_' && out.ends_with('_') {
            continue;
        }
        out.push(c);
    }
    out.trim_end_matches('_').to_string()
}
