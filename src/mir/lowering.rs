//! AST to MIR lowering.
//!
//! Walks the analyzed AST (the program's top-level list plus the analyzer's
//! owned monomorphized clones) and emits MIR. Declarations that still carry
//! generic parameters are blueprints and are skipped.
//!
//! The builder keeps its own scope stack mirroring the lexical scopes of
//! the source: each scope records the locals declared in it (for destructor
//! emission on every exit path) and any bindings it shadowed (restored by
//! name on pop so the outer binding becomes visible again).

use std::collections::{BTreeSet, HashMap, HashSet};

use crate::ast::*;
use crate::backend::TypeTable;
use crate::diagnostics::{Diagnostic, ErrorCode};
use crate::lexer::TokenKind;
use crate::mir::types::{BasicBlock, Function, Inst, Module};
use crate::types::Type;

pub type MirResult<T> = Result<T, Diagnostic>;

#[derive(Debug, Clone)]
struct LocalVar {
    name: String,
    ty: Type,
}

#[derive(Debug, Clone)]
struct ShadowedVar {
    name: String,
    old_mir_name: String,
    old_ptr_type: Option<String>,
}

#[derive(Debug, Default)]
struct Scope {
    variables: Vec<LocalVar>,
    shadowed: Vec<ShadowedVar>,
}

#[derive(Debug, Clone)]
struct LoopCtx {
    break_label: String,
    /// Empty for switches, where `continue` is an error.
    continue_label: String,
    /// Scope-stack depth at loop entry; `break`/`continue` run destructors
    /// for every scope deeper than this before branching out.
    scope_depth: usize,
}

#[derive(Debug, Clone)]
struct StructInfo {
    ty: Type,
    has_destructor: bool,
}

pub struct MirBuilder {
    module: Module,
    /// The function under construction and the index of its current block.
    func: Option<Function>,
    cur: usize,
    temp_count: usize,
    block_count: usize,
    /// All destination names used so far in the current function.
    slot_names: HashSet<String>,
    /// Source variable name -> its stack slot.
    var_map: HashMap<String, String>,
    /// Stack slot -> struct/class type name, for GEPs and method dispatch.
    ptr_type_map: HashMap<String, String>,
    scopes: Vec<Scope>,
    loops: Vec<LoopCtx>,
    structs: HashMap<String, StructInfo>,
    enums: HashMap<String, Type>,
    module_names: HashSet<String>,
    used_externals: BTreeSet<String>,
}

impl MirBuilder {
    pub fn new() -> Self {
        Self {
            module: Module::new(),
            func: None,
            cur: 0,
            temp_count: 0,
            block_count: 0,
            slot_names: HashSet::new(),
            var_map: HashMap::new(),
            ptr_type_map: HashMap::new(),
            scopes: Vec::new(),
            loops: Vec::new(),
            structs: HashMap::new(),
            enums: HashMap::new(),
            module_names: HashSet::new(),
            used_externals: BTreeSet::new(),
        }
    }

    /// Register an imported module name so `module::member` calls dispatch
    /// to the `module_member` symbol.
    pub fn add_module_name(&mut self, name: &str) {
        self.module_names.insert(name.to_string());
    }

    /// Consume the builder: the finished module, the type table the code
    /// generator needs for layouts, and the external functions used.
    pub fn finish(self) -> (Module, TypeTable, Vec<String>) {
        let types = TypeTable {
            structs: self
                .structs
                .into_iter()
                .map(|(name, info)| (name, info.ty))
                .collect(),
            enums: self.enums,
        };
        (
            self.module,
            types,
            self.used_externals.into_iter().collect(),
        )
    }

    // ============================================================
    // Infrastructure
    // ============================================================

    fn err(&self, message: impl Into<String>, code: ErrorCode) -> Diagnostic {
        Diagnostic::error(message).with_code(code)
    }

    fn emit(&mut self, inst: Inst) -> MirResult<()> {
        let Some(func) = &mut self.func else {
            return Err(Diagnostic::error("statement outside of a function")
                .with_code(ErrorCode::MalformedMir));
        };
        func.blocks[self.cur].push(inst);
        Ok(())
    }

    fn current_terminated(&self) -> bool {
        self.func
            .as_ref()
            .and_then(|f| f.blocks.get(self.cur))
            .is_some_and(|b| b.has_terminator())
    }

    fn new_temp(&mut self) -> String {
        loop {
            let name = format!("%t{}", self.temp_count);
            self.temp_count += 1;
            if self.slot_names.insert(name.clone()) {
                return name;
            }
        }
    }

    /// A unique stack-slot name derived from a source name. Shadowed
    /// re-declarations get a numeric suffix so destinations stay unique
    /// within the function.
    fn fresh_slot(&mut self, base: &str) -> String {
        let mut name = format!("%{base}");
        let mut counter = 1usize;
        while !self.slot_names.insert(name.clone()) {
            name = format!("%{base}.{counter}");
            counter += 1;
        }
        name
    }

    fn new_block(&mut self, name: &str) -> MirResult<usize> {
        let Some(func) = &mut self.func else {
            return Err(Diagnostic::error("basic block outside of a function")
                .with_code(ErrorCode::MalformedMir));
        };
        let unique = format!("{name}.{}", self.block_count);
        self.block_count += 1;
        func.blocks.push(BasicBlock::new(unique));
        Ok(func.blocks.len() - 1)
    }

    fn label(&self, block: usize) -> String {
        self.func
            .as_ref()
            .and_then(|f| f.blocks.get(block))
            .map(|b| b.name.clone())
            .unwrap_or_default()
    }

    fn reset_function_state(&mut self) {
        self.scopes.clear();
        self.var_map.clear();
        self.ptr_type_map.clear();
        self.loops.clear();
        self.slot_names.clear();
        self.temp_count = 0;
        self.block_count = 0;
        self.cur = 0;
    }

    // ============================================================
    // Scopes and destructors
    // ============================================================

    fn push_scope(&mut self) {
        self.scopes.push(Scope::default());
    }

    /// Leave a scope: run destructors for its class locals in reverse
    /// declaration order, drop its bindings, and restore anything it
    /// shadowed. A block that already ended in a terminator had its
    /// destructors emitted by the exit path (`return`, `break`, `?`), so
    /// only the bookkeeping happens then.
    fn pop_scope(&mut self) -> MirResult<()> {
        let Some(scope) = self.scopes.pop() else {
            return Ok(());
        };
        let emit_dtors = !self.current_terminated();

        for var in scope.variables.iter().rev() {
            if emit_dtors {
                if let Some(call) = self.destructor_call_for(var) {
                    self.emit(call)?;
                }
            }
            let was_shadowing = scope.shadowed.iter().any(|s| s.name == var.name);
            if !was_shadowing {
                if let Some(mir_name) = self.var_map.remove(&var.name) {
                    self.ptr_type_map.remove(&mir_name);
                }
            }
        }

        for shadowed in &scope.shadowed {
            self.var_map
                .insert(shadowed.name.clone(), shadowed.old_mir_name.clone());
            if let Some(old_type) = &shadowed.old_ptr_type {
                self.ptr_type_map
                    .insert(shadowed.old_mir_name.clone(), old_type.clone());
            }
        }
        Ok(())
    }

    fn destructor_call_for(&self, var: &LocalVar) -> Option<Inst> {
        if !var.ty.is_class() {
            return None;
        }
        let class_name = var.ty.as_struct().map(|d| d.name.clone())?;
        if !self
            .structs
            .get(&class_name)
            .is_some_and(|info| info.has_destructor)
        {
            return None;
        }
        let addr = self.var_map.get(&var.name)?.clone();
        Some(Inst::Call {
            dest: String::new(),
            callee: format!("{class_name}_~{class_name}"),
            args: vec![addr],
        })
    }

    /// Destructors for every live class local in every enclosing scope,
    /// innermost first. Used before `return` and on the `?` error path.
    fn emit_all_destructors(&mut self) -> MirResult<()> {
        self.emit_destructors_from(0)
    }

    /// Destructors for scopes at depth `from` and deeper, innermost first.
    /// `break` and `continue` use this to unwind just the scopes inside the
    /// loop or switch.
    fn emit_destructors_from(&mut self, from: usize) -> MirResult<()> {
        let mut calls = Vec::new();
        for scope in self.scopes.iter().skip(from).rev() {
            for var in scope.variables.iter().rev() {
                if let Some(call) = self.destructor_call_for(var) {
                    calls.push(call);
                }
            }
        }
        for call in calls {
            self.emit(call)?;
        }
        Ok(())
    }

    // ============================================================
    // Top-level dispatch
    // ============================================================

    pub fn lower(&mut self, node: &Stmt) -> MirResult<()> {
        match node {
            Stmt::Decl(decl) => match decl {
                Decl::Var(var) => self.lower_var_decl(var),
                Decl::Function(func) => self.lower_function_decl(func),
                Decl::Struct(st) => {
                    if st.generic_params.is_empty() {
                        self.lower_struct_decl(st);
                    }
                    Ok(())
                }
                Decl::Enum(en) => {
                    if en.generic_params.is_empty() {
                        self.lower_enum_decl(en);
                    }
                    Ok(())
                }
                Decl::Class(class) => {
                    if class.generic_params.is_empty() {
                        self.lower_class_decl(class)?;
                    }
                    Ok(())
                }
                Decl::Request(_) | Decl::Import(_) | Decl::Package(_) | Decl::Use(_) => Ok(()),
            },
            Stmt::Block(block) => self.lower_block(block, true),
            Stmt::If(if_stmt) => self.lower_if(if_stmt),
            Stmt::While(while_stmt) => self.lower_while(while_stmt),
            Stmt::DoWhile(do_while) => self.lower_do_while(do_while),
            Stmt::For(for_stmt) => self.lower_for(for_stmt),
            Stmt::Switch(switch) => self.lower_switch(switch),
            Stmt::Break => self.lower_break(),
            Stmt::Continue => self.lower_continue(),
            Stmt::Return(ret) => self.lower_return(ret),
            Stmt::Expr(expr) => self.lower_expr(expr).map(|_| ()),
        }
    }

    // ============================================================
    // Type registration
    // ============================================================

    fn lower_struct_decl(&mut self, decl: &StructDecl) {
        let fields = decl
            .members
            .iter()
            .filter_map(|m| {
                m.ty.clone().map(|ty| crate::types::Field {
                    name: m.name.clone(),
                    ty,
                    is_public: m.is_public,
                })
            })
            .collect();
        let ty = Type::structure(decl.name.clone(), fields);
        self.structs.insert(
            decl.name.clone(),
            StructInfo {
                ty,
                has_destructor: false,
            },
        );
    }

    fn lower_enum_decl(&mut self, decl: &EnumDecl) {
        if let Some(ty) = &decl.ty {
            if ty.is_enum() {
                self.enums.insert(decl.name.clone(), ty.clone());
            }
        }
    }

    fn lower_class_decl(&mut self, decl: &ClassDecl) -> MirResult<()> {
        let fields = decl
            .members
            .iter()
            .filter_map(|m| match m {
                ClassMember::Field(var) => var.ty.clone().map(|ty| crate::types::Field {
                    name: var.name.clone(),
                    ty,
                    is_public: var.is_public,
                }),
                _ => None,
            })
            .collect();
        let ty = Type::class(decl.name.clone(), fields);

        let dtor_name = format!("~{}", decl.name);
        let has_destructor = decl.members.iter().any(
            |m| matches!(m, ClassMember::Method(method) if method.name == dtor_name),
        );

        self.structs.insert(
            decl.name.clone(),
            StructInfo { ty, has_destructor },
        );

        for member in &decl.members {
            match member {
                ClassMember::Method(method) => self.lower_method_decl(method, &decl.name)?,
                ClassMember::Constructor(ctor) => {
                    self.lower_constructor_decl(ctor, &decl.name)?
                }
                ClassMember::Field(_) => {}
            }
        }
        Ok(())
    }

    // ============================================================
    // Functions, methods, constructors
    // ============================================================

    fn spill_param(&mut self, name: &str, ty: &Type) -> MirResult<()> {
        let arg_name = format!("%{name}");
        let stack_name = self.fresh_slot(&format!("{name}.addr"));
        self.emit(Inst::Alloca {
            dest: stack_name.clone(),
            ty: ty.clone(),
        })?;
        self.emit(Inst::Store {
            src: arg_name,
            dest: stack_name.clone(),
        })?;

        self.var_map.insert(name.to_string(), stack_name.clone());
        if let Some(scope) = self.scopes.last_mut() {
            scope.variables.push(LocalVar {
                name: name.to_string(),
                ty: ty.clone(),
            });
        }
        if let Some(def) = ty.as_struct() {
            self.ptr_type_map.insert(stack_name, def.name.clone());
        } else if let Some(base) = ty.pointee() {
            if let Some(def) = base.as_struct() {
                self.ptr_type_map.insert(stack_name, def.name.clone());
            }
        }
        Ok(())
    }

    fn lower_function_decl(&mut self, decl: &FunctionDecl) -> MirResult<()> {
        if !decl.generic_params.is_empty() {
            return Ok(());
        }
        if self.module.find_function(&decl.name).is_some() {
            return Ok(());
        }

        self.reset_function_state();
        let mut func = Function::new(decl.name.clone(), decl.return_type.clone());
        func.is_variadic = decl.is_variadic;
        for param in &decl.params {
            func.params.push((param.name.clone(), param.ty.clone()));
        }

        if decl.is_extern {
            self.module.push(func);
            return Ok(());
        }
        tracing::debug!(function = %decl.name, "lowering function");

        self.func = Some(func);
        self.cur = self.new_block("entry")?;

        self.push_scope();
        for param in &decl.params {
            self.spill_param(&param.name, &param.ty)?;
        }

        if let Some(body) = &decl.body {
            self.lower_block(body, false)?;
        }

        if !self.current_terminated() {
            self.pop_scope()?;
            if decl.return_type.is_void() {
                self.emit(Inst::Ret { value: None })?;
            } else if decl.return_type.is_integer() {
                let temp = self.new_temp();
                self.emit(Inst::ConstInt {
                    dest: temp.clone(),
                    value: 0,
                })?;
                self.emit(Inst::Ret { value: Some(temp) })?;
            }
        }

        let func = self
            .func
            .take()
            .expect("BUG: function under construction disappeared");
        self.module.push(func);
        Ok(())
    }

    fn lower_method_decl(&mut self, method: &MethodDecl, class_name: &str) -> MirResult<()> {
        if !method.generic_params.is_empty() {
            return Ok(());
        }
        let mangled = format!("{class_name}_{}", method.name);
        if self.module.find_function(&mangled).is_some() {
            return Ok(());
        }

        self.reset_function_state();
        let mut func = Function::new(mangled, method.return_type.clone());
        for param in &method.params {
            func.params.push((param.name.clone(), param.ty.clone()));
        }

        self.func = Some(func);
        self.cur = self.new_block("entry")?;

        self.push_scope();
        for param in &method.params {
            self.spill_param(&param.name, &param.ty)?;
        }

        if let Some(body) = &method.body {
            self.lower_block(body, false)?;
        }

        if !self.current_terminated() {
            self.pop_scope()?;
            if method.return_type.is_void() {
                self.emit(Inst::Ret { value: None })?;
            } else if method.return_type.is_integer() {
                let temp = self.new_temp();
                self.emit(Inst::ConstInt {
                    dest: temp.clone(),
                    value: 0,
                })?;
                self.emit(Inst::Ret { value: Some(temp) })?;
            }
        }

        let func = self
            .func
            .take()
            .expect("BUG: function under construction disappeared");
        self.module.push(func);
        Ok(())
    }

    fn lower_constructor_decl(
        &mut self,
        ctor: &ConstructorDecl,
        class_name: &str,
    ) -> MirResult<()> {
        let mangled = format!("{class_name}_{}", ctor.name);
        if self.module.find_function(&mangled).is_some() {
            return Ok(());
        }
        let class_ty = self
            .structs
            .get(class_name)
            .map(|info| info.ty.clone())
            .ok_or_else(|| {
                self.err(
                    format!("unknown class '{class_name}' for constructor"),
                    ErrorCode::UnknownStructInMir,
                )
            })?;

        self.reset_function_state();
        let mut func = Function::new(mangled, Type::void());
        let self_ty = Type::pointer(class_ty);
        func.params.push(("self".to_string(), self_ty.clone()));
        for param in &ctor.params {
            func.params.push((param.name.clone(), param.ty.clone()));
        }

        self.func = Some(func);
        self.cur = self.new_block("entry")?;

        self.push_scope();
        self.spill_param("self", &self_ty)?;
        for param in &ctor.params {
            self.spill_param(&param.name, &param.ty)?;
        }

        self.lower_block(&ctor.body, false)?;

        if !self.current_terminated() {
            self.pop_scope()?;
            self.emit(Inst::Ret { value: None })?;
        }

        let func = self
            .func
            .take()
            .expect("BUG: function under construction disappeared");
        self.module.push(func);
        Ok(())
    }

    // ============================================================
    // Statements
    // ============================================================

    fn lower_var_decl(&mut self, decl: &VarDecl) -> MirResult<()> {
        if self.func.is_none() {
            return Err(self.err(
                format!("no function context for variable '{}'", decl.name),
                ErrorCode::MalformedMir,
            ));
        }

        let mut ty = decl.ty.clone();
        let mut init_val = String::new();
        if let Some(init) = &decl.init {
            init_val = self.lower_expr(init)?;
            if ty.is_none() {
                ty = init.ty.clone();
            }
        }
        let ty = ty.unwrap_or_else(Type::i32);

        let mir_name = self.fresh_slot(&decl.name);
        self.emit(Inst::Alloca {
            dest: mir_name.clone(),
            ty: ty.clone(),
        })?;

        // Record the local for destructor emission, saving any binding it
        // shadows so the pop can uncover it again.
        let shadow = self.var_map.get(&decl.name).map(|old| ShadowedVar {
            name: decl.name.clone(),
            old_mir_name: old.clone(),
            old_ptr_type: self.ptr_type_map.get(old).cloned(),
        });
        if let Some(scope) = self.scopes.last_mut() {
            scope.variables.push(LocalVar {
                name: decl.name.clone(),
                ty: ty.clone(),
            });
            if let Some(shadow) = shadow {
                scope.shadowed.push(shadow);
            }
        }

        self.var_map.insert(decl.name.clone(), mir_name.clone());
        if let Some(def) = ty.as_struct() {
            self.ptr_type_map.insert(mir_name.clone(), def.name.clone());
        } else if let Some(base) = ty.pointee() {
            if let Some(def) = base.as_struct() {
                self.ptr_type_map.insert(mir_name.clone(), def.name.clone());
            }
        }

        if !init_val.is_empty() {
            self.emit(Inst::Store {
                src: init_val,
                dest: mir_name,
            })?;
        }
        Ok(())
    }

    fn lower_block(&mut self, block: &Block, should_push_scope: bool) -> MirResult<()> {
        if should_push_scope {
            self.push_scope();
        }
        for stmt in &block.statements {
            if self.current_terminated() {
                break;
            }
            self.lower(stmt)?;
        }
        if should_push_scope {
            self.pop_scope()?;
        }
        Ok(())
    }

    fn lower_return(&mut self, ret: &ReturnStmt) -> MirResult<()> {
        let value = match &ret.value {
            Some(expr) => Some(self.lower_expr(expr)?),
            None => None,
        };
        self.emit_all_destructors()?;
        self.emit(Inst::Ret {
            value: value.filter(|v| !v.is_empty()),
        })
    }

    fn lower_if(&mut self, stmt: &IfStmt) -> MirResult<()> {
        let cond = self.lower_expr(&stmt.condition)?;

        let then_bb = self.new_block("if.then")?;
        let else_bb = if stmt.else_block.is_some() {
            Some(self.new_block("if.else")?)
        } else {
            None
        };
        let merge_bb = self.new_block("if.merge")?;

        let then_label = self.label(then_bb);
        let else_label = match else_bb {
            Some(bb) => self.label(bb),
            None => self.label(merge_bb),
        };
        self.emit(Inst::CondBr {
            cond,
            then_label,
            else_label,
        })?;

        self.cur = then_bb;
        self.lower_block(&stmt.then_block, true)?;
        if !self.current_terminated() {
            let target = self.label(merge_bb);
            self.emit(Inst::Br { target })?;
        }

        if let (Some(else_bb), Some(else_block)) = (else_bb, &stmt.else_block) {
            self.cur = else_bb;
            self.lower_block(else_block, true)?;
            if !self.current_terminated() {
                let target = self.label(merge_bb);
                self.emit(Inst::Br { target })?;
            }
        }

        self.cur = merge_bb;
        Ok(())
    }

    fn lower_while(&mut self, stmt: &WhileStmt) -> MirResult<()> {
        let cond_bb = self.new_block("while.cond")?;
        let body_bb = self.new_block("while.body")?;
        let merge_bb = self.new_block("while.merge")?;

        let cond_label = self.label(cond_bb);
        self.emit(Inst::Br {
            target: cond_label.clone(),
        })?;

        self.loops.push(LoopCtx {
            break_label: self.label(merge_bb),
            continue_label: cond_label.clone(),
            scope_depth: self.scopes.len(),
        });

        self.cur = cond_bb;
        let cond = self.lower_expr(&stmt.condition)?;
        self.emit(Inst::CondBr {
            cond,
            then_label: self.label(body_bb),
            else_label: self.label(merge_bb),
        })?;

        self.cur = body_bb;
        self.lower_block(&stmt.body, true)?;
        if !self.current_terminated() {
            self.emit(Inst::Br { target: cond_label })?;
        }

        self.loops.pop();
        self.cur = merge_bb;
        Ok(())
    }

    fn lower_do_while(&mut self, stmt: &DoWhileStmt) -> MirResult<()> {
        let body_bb = self.new_block("do.body")?;
        let cond_bb = self.new_block("do.cond")?;
        let merge_bb = self.new_block("do.merge")?;

        self.emit(Inst::Br {
            target: self.label(body_bb),
        })?;

        self.loops.push(LoopCtx {
            break_label: self.label(merge_bb),
            continue_label: self.label(cond_bb),
            scope_depth: self.scopes.len(),
        });

        self.cur = body_bb;
        self.lower_block(&stmt.body, true)?;
        if !self.current_terminated() {
            self.emit(Inst::Br {
                target: self.label(cond_bb),
            })?;
        }

        self.cur = cond_bb;
        let cond = self.lower_expr(&stmt.condition)?;
        self.emit(Inst::CondBr {
            cond,
            then_label: self.label(body_bb),
            else_label: self.label(merge_bb),
        })?;

        self.loops.pop();
        self.cur = merge_bb;
        Ok(())
    }

    fn lower_for(&mut self, stmt: &ForStmt) -> MirResult<()> {
        let cond_bb = self.new_block("for.cond")?;
        let body_bb = self.new_block("for.body")?;
        let step_bb = self.new_block("for.step")?;
        let merge_bb = self.new_block("for.merge")?;

        self.push_scope();
        if let Some(init) = &stmt.init {
            self.lower(init)?;
        }
        self.emit(Inst::Br {
            target: self.label(cond_bb),
        })?;

        self.loops.push(LoopCtx {
            break_label: self.label(merge_bb),
            continue_label: self.label(step_bb),
            scope_depth: self.scopes.len(),
        });

        self.cur = cond_bb;
        match &stmt.condition {
            Some(condition) => {
                let cond = self.lower_expr(condition)?;
                self.emit(Inst::CondBr {
                    cond,
                    then_label: self.label(body_bb),
                    else_label: self.label(merge_bb),
                })?;
            }
            None => {
                self.emit(Inst::Br {
                    target: self.label(body_bb),
                })?;
            }
        }

        self.cur = body_bb;
        self.lower_block(&stmt.body, true)?;
        if !self.current_terminated() {
            self.emit(Inst::Br {
                target: self.label(step_bb),
            })?;
        }

        self.cur = step_bb;
        if let Some(step) = &stmt.step {
            self.lower_expr(step)?;
        }
        self.emit(Inst::Br {
            target: self.label(cond_bb),
        })?;

        self.loops.pop();
        self.cur = merge_bb;
        self.pop_scope()?;
        Ok(())
    }

    fn lower_switch(&mut self, stmt: &SwitchStmt) -> MirResult<()> {
        let cond_addr = self.lower_addr(&stmt.condition)?;
        let cond_ty = stmt.condition.ty.clone().ok_or_else(|| {
            self.err("switch scrutinee has no analyzed type", ErrorCode::MalformedMir)
        })?;

        let end_bb = self.new_block("switch.end")?;
        let end_label = self.label(end_bb);
        self.loops.push(LoopCtx {
            break_label: end_label.clone(),
            continue_label: String::new(),
            scope_depth: self.scopes.len(),
        });

        for (index, case) in stmt.cases.iter().enumerate() {
            let body_bb = self.new_block("case.body")?;
            let body_label = self.label(body_bb);
            let next_case_bb = if index + 1 < stmt.cases.len() {
                Some(self.new_block("case.next")?)
            } else {
                None
            };
            let next_label = match next_case_bb {
                Some(bb) => self.label(bb),
                None => end_label.clone(),
            };

            if case.is_default {
                self.emit(Inst::Br {
                    target: body_label.clone(),
                })?;
            } else if let Some(pattern) = &case.pattern {
                self.lower_case_test(pattern, &cond_ty, &cond_addr, &body_label, &next_label)?;
            }

            self.cur = body_bb;
            if !case.is_default && cond_ty.is_enum() {
                if let Some(Pattern::Variant {
                    variant,
                    sub_patterns,
                    ..
                }) = &case.pattern
                {
                    self.bind_variant_payload(&cond_ty, &cond_addr, variant, sub_patterns)?;
                }
            }

            self.lower_block(&case.body, true)?;
            if !self.current_terminated() {
                self.emit(Inst::Br {
                    target: end_label.clone(),
                })?;
            }

            if let Some(next_bb) = next_case_bb {
                self.cur = next_bb;
            }
        }

        self.loops.pop();
        self.cur = end_bb;
        Ok(())
    }

    fn lower_case_test(
        &mut self,
        pattern: &Pattern,
        cond_ty: &Type,
        cond_addr: &str,
        body_label: &str,
        next_label: &str,
    ) -> MirResult<()> {
        if cond_ty.is_enum() {
            match pattern {
                Pattern::Variant { variant, .. } => {
                    let tag = cond_ty
                        .as_enum()
                        .and_then(|def| def.find_variant_index(variant))
                        .ok_or_else(|| {
                            self.err(
                                format!("unknown variant '{variant}' in switch"),
                                ErrorCode::MalformedMir,
                            )
                        })?;
                    let actual = self.new_temp();
                    self.emit(Inst::VariantTag {
                        dest: actual.clone(),
                        enum_ptr: cond_addr.to_string(),
                    })?;
                    let expected = self.new_temp();
                    self.emit(Inst::ConstInt {
                        dest: expected.clone(),
                        value: tag as i64,
                    })?;
                    let cmp = self.new_temp();
                    self.emit(Inst::BinOp {
                        dest: cmp.clone(),
                        left: actual,
                        right: expected,
                        op: TokenKind::EqualEqual,
                    })?;
                    self.emit(Inst::CondBr {
                        cond: cmp,
                        then_label: body_label.to_string(),
                        else_label: next_label.to_string(),
                    })
                }
                Pattern::Wildcard | Pattern::Identifier(_) => self.emit(Inst::Br {
                    target: body_label.to_string(),
                }),
                _ => self.emit(Inst::Br {
                    target: next_label.to_string(),
                }),
            }
        } else {
            match pattern {
                Pattern::Literal(literal) => {
                    let expected = self.lower_expr(literal)?;
                    let cond_val = self.new_temp();
                    self.emit(Inst::Load {
                        dest: cond_val.clone(),
                        src: cond_addr.to_string(),
                    })?;
                    let cmp = self.new_temp();
                    self.emit(Inst::BinOp {
                        dest: cmp.clone(),
                        left: cond_val,
                        right: expected,
                        op: TokenKind::EqualEqual,
                    })?;
                    self.emit(Inst::CondBr {
                        cond: cmp,
                        then_label: body_label.to_string(),
                        else_label: next_label.to_string(),
                    })
                }
                Pattern::Wildcard | Pattern::Identifier(_) => self.emit(Inst::Br {
                    target: body_label.to_string(),
                }),
                _ => self.emit(Inst::Br {
                    target: next_label.to_string(),
                }),
            }
        }
    }

    /// Extract payload elements bound by identifier sub-patterns into
    /// fresh local slots.
    fn bind_variant_payload(
        &mut self,
        cond_ty: &Type,
        cond_addr: &str,
        variant: &str,
        sub_patterns: &[Pattern],
    ) -> MirResult<()> {
        let Some(def) = cond_ty.as_enum() else {
            return Ok(());
        };
        let Some(tag) = def.find_variant_index(variant) else {
            return Ok(());
        };
        let variant_def = def.variants[tag].clone();

        for (index, sub) in sub_patterns.iter().enumerate() {
            if let Pattern::Identifier(bind_name) = sub {
                let field_ty = variant_def.field_type(index).ok_or_else(|| {
                    self.err(
                        format!("variant '{variant}' has no payload element {index}"),
                        ErrorCode::MalformedMir,
                    )
                })?;
                let field_val = self.new_temp();
                self.emit(Inst::VariantExtract {
                    dest: field_val.clone(),
                    enum_ptr: cond_addr.to_string(),
                    tag,
                    index,
                    field_ty: field_ty.clone(),
                })?;
                let local = self.new_temp();
                self.emit(Inst::Alloca {
                    dest: local.clone(),
                    ty: field_ty,
                })?;
                self.emit(Inst::Store {
                    src: field_val,
                    dest: local.clone(),
                })?;
                self.var_map.insert(bind_name.clone(), local);
            }
        }
        Ok(())
    }

    fn lower_break(&mut self) -> MirResult<()> {
        let Some(ctx) = self.loops.last() else {
            return Err(self.err("break outside of loop or switch", ErrorCode::MalformedMir));
        };
        let target = ctx.break_label.clone();
        let depth = ctx.scope_depth;
        self.emit_destructors_from(depth)?;
        self.emit(Inst::Br { target })
    }

    fn lower_continue(&mut self) -> MirResult<()> {
        let Some(ctx) = self.loops.last() else {
            return Err(self.err("continue outside of a loop", ErrorCode::MalformedMir));
        };
        if ctx.continue_label.is_empty() {
            return Err(self.err(
                "continue inside a switch is not allowed",
                ErrorCode::ContinueInSwitch,
            ));
        }
        let target = ctx.continue_label.clone();
        let depth = ctx.scope_depth;
        self.emit_destructors_from(depth)?;
        self.emit(Inst::Br { target })
    }

    // ============================================================
    // Places
    // ============================================================

    /// Lower an expression to an address: a variable slot, a struct field
    /// address, an array element address, or a dereferenced pointer value.
    fn lower_addr(&mut self, expr: &Expr) -> MirResult<String> {
        match &expr.kind {
            ExprKind::Identifier(name) => {
                self.var_map.get(name).cloned().ok_or_else(|| {
                    self.err(
                        format!("unknown variable in MIR lowering: {name}"),
                        ErrorCode::UnknownVariableInMir,
                    )
                })
            }
            ExprKind::Member { base, member, .. } => {
                let base_addr = self.lower_addr(base)?;
                let struct_name = self.struct_name_for(&base_addr, base)?;
                let dest = self.new_temp();
                self.emit(Inst::StructGep {
                    dest: dest.clone(),
                    base: base_addr,
                    struct_name,
                    field: member.clone(),
                })?;
                Ok(dest)
            }
            ExprKind::Index { base, index } => {
                let base_ty = base.ty.clone().ok_or_else(|| {
                    self.err("indexed expression has no analyzed type", ErrorCode::MalformedMir)
                })?;
                if let Some(elem_ty) = base_ty.element_type() {
                    let base_addr = self.lower_addr(base)?;
                    let index_val = self.lower_expr(index)?;
                    let dest = self.new_temp();
                    self.emit(Inst::ArrayGep {
                        dest: dest.clone(),
                        base: base_addr,
                        index: index_val,
                        elem_ty,
                    })?;
                    Ok(dest)
                } else if let Some(elem_ty) = base_ty.pointee() {
                    let base_val = self.lower_expr(base)?;
                    let index_val = self.lower_expr(index)?;
                    let dest = self.new_temp();
                    self.emit(Inst::ArrayGep {
                        dest: dest.clone(),
                        base: base_val,
                        index: index_val,
                        elem_ty,
                    })?;
                    Ok(dest)
                } else {
                    Err(self.err(
                        format!("cannot index value of type {base_ty}"),
                        ErrorCode::MalformedMir,
                    ))
                }
            }
            ExprKind::Deref(operand) => self.lower_expr(operand),
            _ => Err(self.err("expression is not addressable", ErrorCode::MalformedMir)),
        }
    }

    /// The struct type name behind an address, from the pointer-type map or
    /// the base expression's analyzed type.
    fn struct_name_for(&self, addr: &str, base: &Expr) -> MirResult<String> {
        if let Some(name) = self.ptr_type_map.get(addr) {
            return Ok(name.clone());
        }
        if let Some(ty) = &base.ty {
            if let Some(def) = ty.as_struct() {
                return Ok(def.name.clone());
            }
            if let Some(pointee) = ty.pointee() {
                if let Some(def) = pointee.as_struct() {
                    return Ok(def.name.clone());
                }
            }
        }
        Err(self.err(
            format!("unknown struct type at GEP for '{base}'"),
            ErrorCode::UnknownStructInMir,
        ))
    }

    // ============================================================
    // Expressions
    // ============================================================

    /// Lower an expression to a temporary holding its value.
    pub fn lower_expr(&mut self, expr: &Expr) -> MirResult<String> {
        match &expr.kind {
            ExprKind::Literal { value, .. } => self.lower_literal(value),
            ExprKind::Identifier(name) => self.lower_identifier(name, expr),
            ExprKind::Binary { op, left, right } => self.lower_binary(*op, left, right),
            ExprKind::Unary { op, operand } => {
                let value = self.lower_expr(operand)?;
                let dest = self.new_temp();
                self.emit(Inst::UnaryOp {
                    dest: dest.clone(),
                    operand: value,
                    op: *op,
                })?;
                Ok(dest)
            }
            ExprKind::AddressOf(operand) => self.lower_addr(operand),
            ExprKind::Deref(operand) => {
                let ptr = self.lower_expr(operand)?;
                let dest = self.new_temp();
                self.emit(Inst::Load {
                    dest: dest.clone(),
                    src: ptr,
                })?;
                Ok(dest)
            }
            ExprKind::Call { callee, args } => self.lower_call(expr, callee, args),
            ExprKind::Member { .. } => self.lower_member(expr),
            ExprKind::StructLiteral { base, fields } => {
                self.lower_struct_literal(expr, base, fields)
            }
            ExprKind::ArrayLiteral(elements) => self.lower_array_literal(expr, elements),
            ExprKind::Index { .. } => {
                let addr = self.lower_addr(expr)?;
                let dest = self.new_temp();
                self.emit(Inst::Load {
                    dest: dest.clone(),
                    src: addr,
                })?;
                Ok(dest)
            }
            ExprKind::Intrinsic {
                kind,
                type_arg,
                args,
            } => self.lower_intrinsic(*kind, type_arg.as_ref(), args),
            ExprKind::Question(operand) => self.lower_question(operand),
            ExprKind::Specialization { .. } => Err(self.err(
                "a specialization can only be called, not used as a value",
                ErrorCode::ComplexCallee,
            )),
        }
    }

    fn lower_literal(&mut self, value: &LiteralValue) -> MirResult<String> {
        let dest = self.new_temp();
        let inst = match value {
            LiteralValue::Int(v) => Inst::ConstInt {
                dest: dest.clone(),
                value: *v,
            },
            LiteralValue::Bool(v) => Inst::ConstBool {
                dest: dest.clone(),
                value: *v,
            },
            LiteralValue::Str(v) => Inst::ConstString {
                dest: dest.clone(),
                value: v.clone(),
            },
            LiteralValue::Float(v) => Inst::ConstDouble {
                dest: dest.clone(),
                value: *v,
            },
            LiteralValue::NullPtr => Inst::ConstInt {
                dest: dest.clone(),
                value: 0,
            },
        };
        self.emit(inst)?;
        Ok(dest)
    }

    fn lower_identifier(&mut self, name: &str, expr: &Expr) -> MirResult<String> {
        if let Some(src) = self.var_map.get(name).cloned() {
            let dest = self.new_temp();
            self.emit(Inst::Load {
                dest: dest.clone(),
                src,
            })?;
            return Ok(dest);
        }

        // A bare unit-variant name allocates a fresh enum and writes its
        // tag.
        if let Some((enum_ty, tag)) = self.find_variant(name, expr.ty.as_ref()) {
            return self.build_variant(enum_ty, tag, &[]);
        }

        Err(self.err(
            format!("unknown variable in MIR lowering: {name}"),
            ErrorCode::UnknownVariableInMir,
        ))
    }

    fn lower_binary(&mut self, op: TokenKind, left: &Expr, right: &Expr) -> MirResult<String> {
        if op == TokenKind::Equal {
            let dest = self.lower_addr(left)?;
            let src = self.lower_expr(right)?;
            self.emit(Inst::Store {
                src: src.clone(),
                dest,
            })?;
            // Assignment yields the right operand's value.
            return Ok(src);
        }

        let left_val = self.lower_expr(left)?;
        let right_val = self.lower_expr(right)?;
        let dest = self.new_temp();
        self.emit(Inst::BinOp {
            dest: dest.clone(),
            left: left_val,
            right: right_val,
            op,
        })?;
        Ok(dest)
    }

    /// Find an enum holding the named variant, preferring the expression's
    /// analyzed type (which the analyzer has already made concrete).
    fn find_variant(&self, variant: &str, ty_hint: Option<&Type>) -> Option<(Type, usize)> {
        if let Some(ty) = ty_hint {
            if let Some(tag) = ty.as_enum().and_then(|def| def.find_variant_index(variant)) {
                return Some((ty.clone(), tag));
            }
        }
        self.enums.values().find_map(|ty| {
            ty.as_enum()
                .and_then(|def| def.find_variant_index(variant))
                .map(|tag| (ty.clone(), tag))
        })
    }

    /// Allocate an enum slot, write a variant tag and payload, and load the
    /// aggregate back out.
    fn build_variant(&mut self, enum_ty: Type, tag: usize, args: &[Expr]) -> MirResult<String> {
        let enum_ptr = self.new_temp();
        self.emit(Inst::Alloca {
            dest: enum_ptr.clone(),
            ty: enum_ty,
        })?;

        let mut values = Vec::with_capacity(args.len());
        for arg in args {
            values.push(self.lower_expr(arg)?);
        }

        let void_dest = self.new_temp();
        self.emit(Inst::VariantData {
            dest: void_dest,
            enum_ptr: enum_ptr.clone(),
            tag,
            args: values,
        })?;

        let result = self.new_temp();
        self.emit(Inst::Load {
            dest: result.clone(),
            src: enum_ptr,
        })?;
        Ok(result)
    }

    fn lower_call(&mut self, call: &Expr, callee: &Expr, args: &[Expr]) -> MirResult<String> {
        let callee_name;
        let mut call_args = Vec::new();

        match &callee.kind {
            ExprKind::Identifier(name) => {
                // A type name as callee is a constructor call.
                if let Some(info) = self.structs.get(name).cloned() {
                    let obj = self.new_temp();
                    self.emit(Inst::Alloca {
                        dest: obj.clone(),
                        ty: info.ty,
                    })?;
                    self.ptr_type_map.insert(obj.clone(), name.clone());

                    let mut ctor_args = vec![obj.clone()];
                    for arg in args {
                        ctor_args.push(self.lower_expr(arg)?);
                    }
                    let void_dest = self.new_temp();
                    self.emit(Inst::Call {
                        dest: void_dest,
                        callee: format!("{name}_{name}"),
                        args: ctor_args,
                    })?;
                    let result = self.new_temp();
                    self.emit(Inst::Load {
                        dest: result.clone(),
                        src: obj,
                    })?;
                    return Ok(result);
                }

                // A variant name as callee constructs an enum value.
                if let Some((enum_ty, tag)) = self.find_variant(name, call.ty.as_ref()) {
                    return self.build_variant(enum_ty, tag, args);
                }

                callee_name = name.clone();
                for arg in args {
                    call_args.push(self.lower_expr(arg)?);
                }
            }
            ExprKind::Specialization { base, mangled, .. } => {
                if mangled.is_empty() {
                    return Err(self.err(
                        "specialization was not resolved by analysis",
                        ErrorCode::ComplexCallee,
                    ));
                }

                // A specialized class as callee constructs an instance.
                if let Some(info) = self.structs.get(mangled).cloned() {
                    let obj = self.new_temp();
                    self.emit(Inst::Alloca {
                        dest: obj.clone(),
                        ty: info.ty,
                    })?;
                    self.ptr_type_map.insert(obj.clone(), mangled.clone());

                    let mut ctor_args = vec![obj.clone()];
                    for arg in args {
                        ctor_args.push(self.lower_expr(arg)?);
                    }
                    let void_dest = self.new_temp();
                    self.emit(Inst::Call {
                        dest: void_dest,
                        callee: format!("{mangled}_{mangled}"),
                        args: ctor_args,
                    })?;
                    let result = self.new_temp();
                    self.emit(Inst::Load {
                        dest: result.clone(),
                        src: obj,
                    })?;
                    return Ok(result);
                }

                callee_name = mangled.clone();

                // `obj.method[T](...)`: the object's slot rides along as
                // the implicit first argument.
                if let ExprKind::Member { base: inner, .. } = &base.kind {
                    let self_addr = self.lower_addr(inner)?;
                    call_args.push(self_addr);
                }
                for arg in args {
                    call_args.push(self.lower_expr(arg)?);
                }
            }
            ExprKind::Member { base, member, .. } => {
                let mut base_name = String::new();
                let mut is_variable = false;
                match &base.kind {
                    ExprKind::Identifier(id) => {
                        base_name = id.clone();
                        is_variable = self.var_map.contains_key(id);
                    }
                    ExprKind::Specialization { mangled, .. } => {
                        base_name = mangled.clone();
                    }
                    _ => {}
                }

                if is_variable {
                    let object_slot = self
                        .var_map
                        .get(&base_name)
                        .cloned()
                        .expect("BUG: variable checked above");
                    let class_name = self
                        .ptr_type_map
                        .get(&object_slot)
                        .cloned()
                        .or_else(|| {
                            base.ty.as_ref().and_then(|ty| {
                                ty.as_struct()
                                    .map(|d| d.name.clone())
                                    .or_else(|| ty.pointee().and_then(|p| p.as_struct().map(|d| d.name.clone())))
                            })
                        })
                        .ok_or_else(|| {
                            self.err(
                                format!("unknown type for variable '{base_name}'"),
                                ErrorCode::UnknownStructInMir,
                            )
                        })?;
                    callee_name = format!("{class_name}_{member}");
                    call_args.push(object_slot);
                    for arg in args {
                        call_args.push(self.lower_expr(arg)?);
                    }
                } else if !base_name.is_empty() && self.module_names.contains(&base_name) {
                    callee_name = format!("{base_name}_{member}");
                    for arg in args {
                        call_args.push(self.lower_expr(arg)?);
                    }
                } else if let Some(enum_ty) =
                    (!base_name.is_empty()).then(|| self.enums.get(&base_name).cloned()).flatten()
                {
                    let tag = enum_ty
                        .as_enum()
                        .and_then(|def| def.find_variant_index(member))
                        .ok_or_else(|| {
                            self.err(
                                format!("unknown variant '{member}' of enum '{base_name}'"),
                                ErrorCode::MalformedMir,
                            )
                        })?;
                    return self.build_variant(enum_ty, tag, args);
                } else if !base_name.is_empty() && self.structs.contains_key(&base_name) {
                    // Static method on a (monomorphized) class.
                    callee_name = format!("{base_name}_{member}");
                    for arg in args {
                        call_args.push(self.lower_expr(arg)?);
                    }
                } else if let Some(enum_ty) =
                    call.ty.clone().filter(|ty| ty.is_enum())
                {
                    // Variant construction through a generic base like
                    // `Result::Ok(x)`; the analyzed call type names the
                    // concrete enum.
                    let tag = enum_ty
                        .as_enum()
                        .and_then(|def| def.find_variant_index(member))
                        .ok_or_else(|| {
                            self.err(
                                format!("unknown variant '{member}' of enum '{enum_ty}'"),
                                ErrorCode::MalformedMir,
                            )
                        })?;
                    return self.build_variant(enum_ty, tag, args);
                } else {
                    return Err(self.err(
                        "complex base in method call is not supported",
                        ErrorCode::ComplexCallee,
                    ));
                }
            }
            _ => {
                return Err(self.err(
                    format!("complex callee is not supported: {callee}"),
                    ErrorCode::ComplexCallee,
                ))
            }
        }

        if callee_name == "malloc" || callee_name == "free" {
            self.used_externals.insert(callee_name.clone());
        }

        let dest = self.new_temp();
        self.emit(Inst::Call {
            dest: dest.clone(),
            callee: callee_name,
            args: call_args,
        })?;
        Ok(dest)
    }

    fn lower_member(&mut self, expr: &Expr) -> MirResult<String> {
        let ExprKind::Member { base, member, .. } = &expr.kind else {
            return Err(self.err("not a member expression", ErrorCode::MalformedMir));
        };

        // Unit-variant references: `Color::Red`, `Option[i32]::None`, or a
        // generic base made concrete by the analyzed type.
        let named_enum = match &base.kind {
            ExprKind::Identifier(id) => self.enums.get(id).cloned(),
            ExprKind::Specialization { mangled, .. } => self.enums.get(mangled).cloned(),
            _ => None,
        };
        if let Some(enum_ty) = named_enum {
            if let Some(tag) = enum_ty
                .as_enum()
                .and_then(|def| def.find_variant_index(member))
            {
                return self.build_variant(enum_ty, tag, &[]);
            }
        }
        if let Some(enum_ty) = expr.ty.clone().filter(|ty| ty.is_enum()) {
            if matches!(&base.kind, ExprKind::Identifier(id) if !self.var_map.contains_key(id))
            {
                if let Some(tag) = enum_ty
                    .as_enum()
                    .and_then(|def| def.find_variant_index(member))
                {
                    return self.build_variant(enum_ty, tag, &[]);
                }
            }
        }

        // Ordinary field read.
        let base_ptr = self.lower_addr(base)?;
        let struct_name = self.struct_name_for(&base_ptr, base)?;
        let field_ptr = self.new_temp();
        self.emit(Inst::StructGep {
            dest: field_ptr.clone(),
            base: base_ptr,
            struct_name,
            field: member.clone(),
        })?;
        let dest = self.new_temp();
        self.emit(Inst::Load {
            dest: dest.clone(),
            src: field_ptr,
        })?;
        Ok(dest)
    }

    fn lower_struct_literal(
        &mut self,
        expr: &Expr,
        base: &Expr,
        fields: &[FieldInit],
    ) -> MirResult<String> {
        let name = match &base.kind {
            ExprKind::Specialization { mangled, .. } => mangled.clone(),
            _ => base.to_string(),
        };

        // Plain struct (or monomorphized struct) literal.
        let info = self.structs.get(&name).cloned().or_else(|| {
            expr.ty
                .as_ref()
                .filter(|ty| ty.is_struct())
                .map(|ty| StructInfo {
                    ty: ty.clone(),
                    has_destructor: false,
                })
        });
        if let Some(info) = info {
            let struct_name = info
                .ty
                .as_struct()
                .map(|d| d.name.clone())
                .unwrap_or(name);
            let struct_ptr = self.new_temp();
            self.emit(Inst::Alloca {
                dest: struct_ptr.clone(),
                ty: info.ty,
            })?;
            self.ptr_type_map
                .insert(struct_ptr.clone(), struct_name.clone());

            for init in fields {
                let value = self.lower_expr(&init.value)?;
                let field_ptr = self.new_temp();
                self.emit(Inst::StructGep {
                    dest: field_ptr.clone(),
                    base: struct_ptr.clone(),
                    struct_name: struct_name.clone(),
                    field: init.name.clone(),
                })?;
                self.emit(Inst::Store {
                    src: value,
                    dest: field_ptr,
                })?;
            }

            let dest = self.new_temp();
            self.emit(Inst::Load {
                dest: dest.clone(),
                src: struct_ptr,
            })?;
            return Ok(dest);
        }

        // `Enum::Variant { ... }` with a struct-bodied variant; the enum is
        // named in the base or supplied by the analyzed type.
        if let Some((variant_name, enum_ty)) = self.enum_literal_target(&name, expr) {
            let (tag, payload_fields) = {
                let def = enum_ty.as_enum().ok_or_else(|| {
                    self.err("expected enum type", ErrorCode::MalformedMir)
                })?;
                let tag = def.find_variant_index(&variant_name).ok_or_else(|| {
                    self.err(
                        format!("unknown variant '{variant_name}' of '{}'", def.name),
                        ErrorCode::MalformedMir,
                    )
                })?;
                let payload = match &def.variants[tag].payload {
                    crate::types::VariantPayload::Struct(fields) => fields.clone(),
                    _ => Vec::new(),
                };
                (tag, payload)
            };

            let enum_ptr = self.new_temp();
            self.emit(Inst::Alloca {
                dest: enum_ptr.clone(),
                ty: enum_ty,
            })?;

            // Payload values are written in declared field order.
            let mut values = Vec::new();
            for field in &payload_fields {
                if let Some(init) = fields.iter().find(|init| init.name == field.name) {
                    values.push(self.lower_expr(&init.value)?);
                }
            }
            let void_dest = self.new_temp();
            self.emit(Inst::VariantData {
                dest: void_dest,
                enum_ptr: enum_ptr.clone(),
                tag,
                args: values,
            })?;
            let dest = self.new_temp();
            self.emit(Inst::Load {
                dest: dest.clone(),
                src: enum_ptr,
            })?;
            return Ok(dest);
        }

        Err(self.err(
            format!("unknown struct type in MIR lowering: {name}"),
            ErrorCode::UnknownStructInMir,
        ))
    }

    /// For a `Base::Variant { ... }` literal, the variant name and the enum
    /// type to build into.
    fn enum_literal_target(&self, name: &str, expr: &Expr) -> Option<(String, Type)> {
        let (enum_part, variant_part) = name.rsplit_once("::")?;
        if let Some(enum_ty) = self.enums.get(enum_part) {
            return Some((variant_part.to_string(), enum_ty.clone()));
        }
        let annotated = expr.ty.clone().filter(|ty| ty.is_enum())?;
        Some((variant_part.to_string(), annotated))
    }

    fn lower_array_literal(&mut self, expr: &Expr, elements: &[Expr]) -> MirResult<String> {
        let array_ty = expr
            .ty
            .clone()
            .unwrap_or_else(|| Type::array(Type::i32(), elements.len()));
        let elem_ty = array_ty.element_type().unwrap_or_else(Type::i32);

        let array_ptr = self.new_temp();
        self.emit(Inst::Alloca {
            dest: array_ptr.clone(),
            ty: array_ty,
        })?;

        for (index, element) in elements.iter().enumerate() {
            let value = self.lower_expr(element)?;
            let index_temp = self.new_temp();
            self.emit(Inst::ConstInt {
                dest: index_temp.clone(),
                value: index as i64,
            })?;
            let elem_ptr = self.new_temp();
            self.emit(Inst::ArrayGep {
                dest: elem_ptr.clone(),
                base: array_ptr.clone(),
                index: index_temp,
                elem_ty: elem_ty.clone(),
            })?;
            self.emit(Inst::Store {
                src: value,
                dest: elem_ptr,
            })?;
        }

        let dest = self.new_temp();
        self.emit(Inst::Load {
            dest: dest.clone(),
            src: array_ptr,
        })?;
        Ok(dest)
    }

    fn lower_intrinsic(
        &mut self,
        kind: IntrinsicKind,
        type_arg: Option<&Type>,
        args: &[Expr],
    ) -> MirResult<String> {
        let need_type = |this: &Self| {
            type_arg.cloned().ok_or_else(|| {
                this.err(
                    format!("{} requires a type argument", kind.name()),
                    ErrorCode::MalformedMir,
                )
            })
        };

        match kind {
            IntrinsicKind::Sizeof => {
                let ty = need_type(self)?;
                let dest = self.new_temp();
                self.emit(Inst::Sizeof {
                    dest: dest.clone(),
                    ty,
                })?;
                Ok(dest)
            }
            IntrinsicKind::Alignof => {
                let ty = need_type(self)?;
                let dest = self.new_temp();
                self.emit(Inst::Alignof {
                    dest: dest.clone(),
                    ty,
                })?;
                Ok(dest)
            }
            IntrinsicKind::Offsetof => {
                let ty = need_type(self)?;
                let field = args
                    .first()
                    .and_then(|arg| arg.as_ident())
                    .ok_or_else(|| {
                        self.err("offsetof requires a field name", ErrorCode::MalformedMir)
                    })?
                    .to_string();
                let dest = self.new_temp();
                self.emit(Inst::Offsetof {
                    dest: dest.clone(),
                    ty,
                    field,
                })?;
                Ok(dest)
            }
            IntrinsicKind::Malloc => {
                let size = match args.first() {
                    Some(arg) => self.lower_expr(arg)?,
                    None => {
                        let ty = need_type(self)?;
                        let size_temp = self.new_temp();
                        self.emit(Inst::Sizeof {
                            dest: size_temp.clone(),
                            ty,
                        })?;
                        size_temp
                    }
                };
                self.used_externals.insert("malloc".to_string());
                let dest = self.new_temp();
                self.emit(Inst::Call {
                    dest: dest.clone(),
                    callee: "malloc".to_string(),
                    args: vec![size],
                })?;
                Ok(dest)
            }
            IntrinsicKind::Alloca => {
                let ty = need_type(self)?;
                let dest = self.new_temp();
                self.emit(Inst::Alloca {
                    dest: dest.clone(),
                    ty,
                })?;
                Ok(dest)
            }
            IntrinsicKind::Free => {
                let ptr = args
                    .first()
                    .map(|arg| self.lower_expr(arg))
                    .transpose()?
                    .unwrap_or_default();
                self.used_externals.insert("free".to_string());
                self.emit(Inst::Call {
                    dest: String::new(),
                    callee: "free".to_string(),
                    args: vec![ptr],
                })?;
                Ok(String::new())
            }
        }
    }

    /// Desugar `expr?`: test the Result's tag; on error run all pending
    /// destructors and return the operand unchanged, otherwise extract the
    /// Ok payload and continue.
    fn lower_question(&mut self, operand: &Expr) -> MirResult<String> {
        let result_val = self.lower_expr(operand)?;
        let enum_ty = operand
            .ty
            .clone()
            .filter(|ty| ty.is_enum())
            .ok_or_else(|| {
                self.err("`?` operand has no analyzed Result type", ErrorCode::MalformedMir)
            })?;

        let result_addr = self.new_temp();
        self.emit(Inst::Alloca {
            dest: result_addr.clone(),
            ty: enum_ty.clone(),
        })?;
        self.emit(Inst::Store {
            src: result_val.clone(),
            dest: result_addr.clone(),
        })?;

        let tag = self.new_temp();
        self.emit(Inst::VariantTag {
            dest: tag.clone(),
            enum_ptr: result_addr.clone(),
        })?;

        let ok_bb = self.new_block("q.ok")?;
        let err_bb = self.new_block("q.err")?;
        let merge_bb = self.new_block("q.merge")?;

        // Tag 0 is Ok, anything else is Err.
        let zero = self.new_temp();
        self.emit(Inst::ConstInt {
            dest: zero.clone(),
            value: 0,
        })?;
        let is_err = self.new_temp();
        self.emit(Inst::BinOp {
            dest: is_err.clone(),
            left: tag,
            right: zero,
            op: TokenKind::NotEqual,
        })?;
        self.emit(Inst::CondBr {
            cond: is_err,
            then_label: self.label(err_bb),
            else_label: self.label(ok_bb),
        })?;

        self.cur = err_bb;
        self.emit_all_destructors()?;
        self.emit(Inst::Ret {
            value: Some(result_val),
        })?;

        self.cur = ok_bb;
        let ok_ty = enum_ty
            .as_enum()
            .and_then(|def| def.variants.first())
            .and_then(|variant| variant.field_type(0))
            .ok_or_else(|| {
                self.err("Result Ok variant carries no value", ErrorCode::MalformedMir)
            })?;
        let ok_val = self.new_temp();
        self.emit(Inst::VariantExtract {
            dest: ok_val.clone(),
            enum_ptr: result_addr,
            tag: 0,
            index: 0,
            field_ty: ok_ty,
        })?;
        self.emit(Inst::Br {
            target: self.label(merge_bb),
        })?;

        self.cur = merge_bb;
        Ok(ok_val)
    }
}

impl Default for MirBuilder {
    fn default() -> Self {
        Self::new()
    }
}
