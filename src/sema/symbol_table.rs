//! Stacked lexical scopes for value and type symbols.
//!
//! Each scope holds two disjoint maps: value symbols (variables, functions)
//! and type symbols. Lookup walks the stack top-down. The bottom scope is
//! the module scope; `insert_global`/`insert_type_global` target it
//! directly. Move marks live on the symbol in whichever scope owns it and
//! are cleared on re-assignment.

use std::collections::HashMap;

use crate::types::Type;

/// A value symbol: a variable, parameter, or function.
#[derive(Debug, Clone)]
pub struct Symbol {
    pub name: String,
    pub ty: Type,
    pub is_mutable: bool,
    pub is_moved: bool,
    pub is_public: bool,
}

/// A type symbol. Requests register with no concrete type.
#[derive(Debug, Clone)]
struct TypeEntry {
    ty: Option<Type>,
    is_public: bool,
}

#[derive(Debug, Default)]
struct Scope {
    symbols: HashMap<String, Symbol>,
    types: HashMap<String, TypeEntry>,
}

#[derive(Debug)]
pub struct SymbolTable {
    scopes: Vec<Scope>,
}

impl SymbolTable {
    pub fn new() -> Self {
        Self {
            scopes: vec![Scope::default()],
        }
    }

    pub fn push_scope(&mut self) {
        self.scopes.push(Scope::default());
    }

    pub fn pop_scope(&mut self) {
        if self.scopes.len() > 1 {
            self.scopes.pop();
        }
    }

    // ============================================================
    // Value symbols
    // ============================================================

    /// Insert into the innermost scope. Rejects duplicates within that
    /// scope; shadowing an outer scope is fine.
    pub fn insert(&mut self, name: &str, ty: Type, is_mutable: bool, is_public: bool) -> bool {
        let scope = self.scopes.last_mut().expect("BUG: scope stack is empty");
        if scope.symbols.contains_key(name) {
            return false;
        }
        scope.symbols.insert(
            name.to_string(),
            Symbol {
                name: name.to_string(),
                ty,
                is_mutable,
                is_moved: false,
                is_public,
            },
        );
        true
    }

    /// Insert into the module (bottom) scope.
    pub fn insert_global(&mut self, name: &str, ty: Type, is_mutable: bool, is_public: bool) -> bool {
        let scope = self.scopes.first_mut().expect("BUG: scope stack is empty");
        if scope.symbols.contains_key(name) {
            return false;
        }
        scope.symbols.insert(
            name.to_string(),
            Symbol {
                name: name.to_string(),
                ty,
                is_mutable,
                is_moved: false,
                is_public,
            },
        );
        true
    }

    /// Top-down lookup through the scope stack.
    pub fn lookup(&self, name: &str) -> Option<&Symbol> {
        self.scopes
            .iter()
            .rev()
            .find_map(|scope| scope.symbols.get(name))
    }

    pub fn lookup_current_scope(&self, name: &str) -> Option<&Symbol> {
        self.scopes.last().and_then(|scope| scope.symbols.get(name))
    }

    /// Mark the nearest binding of `name` as moved.
    pub fn mark_moved(&mut self, name: &str) {
        for scope in self.scopes.iter_mut().rev() {
            if let Some(symbol) = scope.symbols.get_mut(name) {
                symbol.is_moved = true;
                return;
            }
        }
    }

    /// Clear a move mark: the name has been re-initialized.
    pub fn mark_accessed(&mut self, name: &str) {
        for scope in self.scopes.iter_mut().rev() {
            if let Some(symbol) = scope.symbols.get_mut(name) {
                symbol.is_moved = false;
                return;
            }
        }
    }

    pub fn is_moved(&self, name: &str) -> bool {
        self.lookup(name).is_some_and(|s| s.is_moved)
    }

    // ============================================================
    // Type symbols
    // ============================================================

    pub fn insert_type(&mut self, name: &str, ty: Option<Type>, is_public: bool) -> bool {
        let scope = self.scopes.last_mut().expect("BUG: scope stack is empty");
        if scope.types.contains_key(name) {
            return false;
        }
        scope.types.insert(name.to_string(), TypeEntry { ty, is_public });
        true
    }

    pub fn insert_type_global(&mut self, name: &str, ty: Option<Type>, is_public: bool) -> bool {
        let scope = self.scopes.first_mut().expect("BUG: scope stack is empty");
        if scope.types.contains_key(name) {
            return false;
        }
        scope.types.insert(name.to_string(), TypeEntry { ty, is_public });
        true
    }

    /// Overwrite a module-scope type entry in place, preserving its
    /// recorded visibility. Completes a provisional entry registered to
    /// break recursive monomorphization.
    pub fn replace_type_global(&mut self, name: &str, ty: Type) -> bool {
        let scope = self.scopes.first_mut().expect("BUG: scope stack is empty");
        match scope.types.get_mut(name) {
            Some(entry) => {
                entry.ty = Some(ty);
                true
            }
            None => false,
        }
    }

    pub fn lookup_type(&self, name: &str) -> Option<Type> {
        self.scopes
            .iter()
            .rev()
            .find_map(|scope| scope.types.get(name))
            .and_then(|entry| entry.ty.clone())
    }

    /// Whether a type name is registered at all (requests register with no
    /// concrete type and still occupy their name).
    pub fn type_name_taken(&self, name: &str) -> bool {
        self.scopes
            .iter()
            .any(|scope| scope.types.contains_key(name))
    }

    // ============================================================
    // Module exports
    // ============================================================

    /// Public value symbols of the module scope; the sole window a parent
    /// unit has into an imported module.
    pub fn public_symbols(&self) -> HashMap<String, Symbol> {
        self.scopes
            .first()
            .map(|scope| {
                scope
                    .symbols
                    .iter()
                    .filter(|(_, s)| s.is_public)
                    .map(|(name, s)| (name.clone(), s.clone()))
                    .collect()
            })
            .unwrap_or_default()
    }

    /// Public type symbols of the module scope.
    pub fn public_types(&self) -> HashMap<String, Type> {
        self.scopes
            .first()
            .map(|scope| {
                scope
                    .types
                    .iter()
                    .filter(|(_, entry)| entry.is_public)
                    .filter_map(|(name, entry)| entry.ty.clone().map(|ty| (name.clone(), ty)))
                    .collect()
            })
            .unwrap_or_default()
    }
}

impl Default for SymbolTable {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn duplicate_in_same_scope_rejected() {
        let mut table = SymbolTable::new();
        assert!(table.insert("x", Type::i32(), false, false));
        assert!(!table.insert("x", Type::i32(), false, false));
    }

    #[test]
    fn shadowing_across_scopes_allowed() {
        let mut table = SymbolTable::new();
        assert!(table.insert("x", Type::i32(), false, false));
        table.push_scope();
        assert!(table.insert("x", Type::bool(), false, false));
        assert_eq!(table.lookup("x").map(|s| s.ty.clone()), Some(Type::bool()));
        table.pop_scope();
        assert_eq!(table.lookup("x").map(|s| s.ty.clone()), Some(Type::i32()));
    }

    #[test]
    fn move_mark_roundtrip() {
        let mut table = SymbolTable::new();
        table.insert("s", Type::structure("S", vec![]), true, false);
        assert!(!table.is_moved("s"));
        table.mark_moved("s");
        assert!(table.is_moved("s"));
        table.mark_accessed("s");
        assert!(!table.is_moved("s"));
    }

    #[test]
    fn global_insert_lands_in_bottom_scope() {
        let mut table = SymbolTable::new();
        table.push_scope();
        assert!(table.insert_global("f", Type::function(vec![], Type::void(), false), false, true));
        table.pop_scope();
        assert!(table.lookup("f").is_some());
    }

    #[test]
    fn public_filtering() {
        let mut table = SymbolTable::new();
        table.insert_global("hidden", Type::i32(), false, false);
        table.insert_global("shown", Type::i32(), false, true);
        table.insert_type_global("Priv", Some(Type::structure("Priv", vec![])), false);
        table.insert_type_global("Pub", Some(Type::structure("Pub", vec![])), true);

        let symbols = table.public_symbols();
        assert!(symbols.contains_key("shown"));
        assert!(!symbols.contains_key("hidden"));

        let types = table.public_types();
        assert!(types.contains_key("Pub"));
        assert!(!types.contains_key("Priv"));
    }

    #[test]
    fn replace_type_global_completes_an_entry() {
        let mut table = SymbolTable::new();
        assert!(table.insert_type_global("Node", Some(Type::named("Node")), true));
        let full = Type::structure(
            "Node",
            vec![crate::types::Field {
                name: "next".into(),
                ty: Type::pointer(Type::named("Node")),
                is_public: true,
            }],
        );
        assert!(table.replace_type_global("Node", full));
        let looked_up = table.lookup_type("Node").expect("entry kept");
        assert_eq!(looked_up.as_struct().expect("struct").fields.len(), 1);
        // Visibility survives the replacement.
        assert!(table.public_types().contains_key("Node"));
        assert!(!table.replace_type_global("Absent", Type::i32()));
    }

    #[test]
    fn request_names_occupy_the_type_namespace() {
        let mut table = SymbolTable::new();
        assert!(table.insert_type_global("Printable", None, true));
        assert!(table.type_name_taken("Printable"));
        assert!(table.lookup_type("Printable").is_none());
        assert!(!table.insert_type_global("Printable", None, true));
    }
}
