use std::collections::HashMap;

use crate::frontend::error::CodegenError;
use crate::frontend::storage::StorageHandle;

/// Symbol table for IR generation
/// Outer table is owned by the current table
/// Top-level table has None as outer
/// Only the most inner table is owned by the compiling session
pub struct SymbolTable {
    level: usize,                          // Scope level for variable shadowing
    table: HashMap<String, StorageHandle>, // Names are unique per scope
    outer: Option<Box<SymbolTable>>,
}

impl SymbolTable {
    /// Creates an empty global symbol table
    pub fn new() -> Self {
        SymbolTable {
            table: HashMap::new(),
            level: 0,
            outer: None,
        }
    }

    pub fn level(&self) -> usize {
        self.level
    }

    pub fn lookup(&self, name: &str) -> Result<StorageHandle, CodegenError> {
        self.lookup_recursive(name)
            .cloned()
            .ok_or_else(|| CodegenError::UndefinedName(name.to_string()))
    }

    /// Whether `name` is bound in any active scope
    pub fn contains(&self, name: &str) -> bool {
        self.lookup_recursive(name).is_some()
    }

    fn lookup_recursive(&self, name: &str) -> Option<&StorageHandle> {
        if let Some(handle) = self.table.get(name) {
            Some(handle)
        } else if let Some(outer_table) = &self.outer {
            outer_table.lookup_recursive(name)
        } else {
            None
        }
    }

    /// Fails if `name` is already bound in the innermost scope
    pub fn check_free(&self, name: &str) -> Result<(), CodegenError> {
        if self.table.contains_key(name) {
            Err(CodegenError::Redefinition(name.to_string()))
        } else {
            Ok(())
        }
    }

    /// Binds `name` in the innermost scope. Outer bindings are only shadowed.
    pub fn define(&mut self, name: &str, handle: StorageHandle) -> Result<(), CodegenError> {
        self.check_free(name)?;
        self.table.insert(name.to_string(), handle);
        Ok(())
    }

    pub fn is_global_scope(&self) -> bool {
        self.level == 0
    }

    pub fn enter_scope(&mut self) {
        let new_table = SymbolTable {
            table: HashMap::new(),
            level: self.level + 1,
            outer: Some(Box::new(std::mem::replace(self, SymbolTable::new()))),
        };
        *self = new_table;
    }

    pub fn exit_scope(&mut self) {
        if let Some(outer_table) = self.outer.take() {
            *self = *outer_table;
        } else {
            panic!("No outer scope to exit to");
        }
    }
}

impl Default for SymbolTable {
    fn default() -> Self {
        SymbolTable::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::frontend::category::Category;
    use crate::frontend::storage::Location;
    use cranelift_codegen::ir::StackSlot;
    use cranelift_codegen::entity::EntityRef;

    fn handle(slot: usize, category: Category) -> StorageHandle {
        StorageHandle::new(
            Location::Local {
                slot: StackSlot::new(slot),
                frame: 0,
            },
            category,
        )
    }

    #[test]
    fn inner_scope_shadows_outer() {
        let mut table = SymbolTable::new();
        table.define("x", handle(0, Category::Int)).unwrap();
        table.enter_scope();
        table.define("x", handle(1, Category::Double)).unwrap();
        assert_eq!(table.lookup("x").unwrap().category, Category::Double);
        table.exit_scope();
        assert_eq!(table.lookup("x").unwrap().category, Category::Int);
        assert!(table.is_global_scope());
    }

    #[test]
    fn redefinition_in_same_scope_fails() {
        let mut table = SymbolTable::new();
        table.define("x", handle(0, Category::Int)).unwrap();
        assert_eq!(
            table.define("x", handle(1, Category::Int)),
            Err(CodegenError::Redefinition("x".into()))
        );
        // the first binding survives
        assert_eq!(table.lookup("x").unwrap().location, handle(0, Category::Int).location);
    }

    #[test]
    fn undefined_name() {
        let mut table = SymbolTable::new();
        table.enter_scope();
        table.define("y", handle(0, Category::Bool)).unwrap();
        table.exit_scope();
        assert!(matches!(
            table.lookup("y"),
            Err(CodegenError::UndefinedName(name)) if name == "y"
        ));
        assert!(!table.contains("y"));
    }
}
