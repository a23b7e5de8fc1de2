use std::collections::HashMap;
use std::rc::Rc;

use crate::frontend::category::{Category, EnumDescriptor, StructDescriptor};
use crate::frontend::error::CodegenError;

/// A user-defined type. Structs and enums share one namespace.
#[derive(Debug, Clone)]
pub enum UserType {
    Struct(Rc<StructDescriptor>),
    Enum(Rc<EnumDescriptor>),
}

impl UserType {
    pub fn category(&self) -> Category {
        match self {
            UserType::Struct(desc) => Category::Struct(Rc::clone(desc)),
            UserType::Enum(desc) => Category::Enum(Rc::clone(desc)),
        }
    }
}

/// Scoped registry of struct and enum descriptors, entered and exited
/// together with the symbol table
pub struct TypeRegistry {
    scopes: Vec<HashMap<String, UserType>>,
}

impl TypeRegistry {
    pub fn new() -> Self {
        TypeRegistry {
            scopes: vec![HashMap::new()],
        }
    }

    pub fn enter_scope(&mut self) {
        self.scopes.push(HashMap::new());
    }

    pub fn exit_scope(&mut self) {
        if self.scopes.len() > 1 {
            self.scopes.pop();
        } else {
            panic!("No outer type scope to exit to");
        }
    }

    pub fn define_struct(&mut self, desc: StructDescriptor) -> Result<Rc<StructDescriptor>, CodegenError> {
        let desc = Rc::new(desc);
        self.define(&desc.name, UserType::Struct(Rc::clone(&desc)))?;
        Ok(desc)
    }

    pub fn define_enum(&mut self, desc: EnumDescriptor) -> Result<Rc<EnumDescriptor>, CodegenError> {
        let desc = Rc::new(desc);
        self.define(&desc.name, UserType::Enum(Rc::clone(&desc)))?;
        Ok(desc)
    }

    fn define(&mut self, name: &str, user_type: UserType) -> Result<(), CodegenError> {
        let Some(scope) = self.scopes.last_mut() else {
            unreachable!("the global type scope is never popped");
        };
        if scope.contains_key(name) {
            return Err(CodegenError::Redefinition(name.to_string()));
        }
        scope.insert(name.to_string(), user_type);
        Ok(())
    }

    pub fn lookup_type(&self, name: &str) -> Result<UserType, CodegenError> {
        self.scopes
            .iter()
            .rev()
            .find_map(|scope| scope.get(name))
            .cloned()
            .ok_or_else(|| CodegenError::UndefinedName(name.to_string()))
    }
}

impl Default for TypeRegistry {
    fn default() -> Self {
        TypeRegistry::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn color() -> EnumDescriptor {
        EnumDescriptor {
            name: "Color".into(),
            members: vec![("Red".into(), 0), ("Green".into(), 1)],
        }
    }

    #[test]
    fn structs_and_enums_share_a_namespace() {
        let mut registry = TypeRegistry::new();
        registry.define_enum(color()).unwrap();
        let clash = StructDescriptor::new("Color", vec![("r".into(), Category::Int)], 8).unwrap();
        assert_eq!(
            registry.define_struct(clash).unwrap_err(),
            CodegenError::Redefinition("Color".into())
        );
        assert!(matches!(registry.lookup_type("Color"), Ok(UserType::Enum(_))));
    }

    #[test]
    fn nested_definitions_disappear_with_their_scope() {
        let mut registry = TypeRegistry::new();
        registry.enter_scope();
        let point = StructDescriptor::new(
            "Point",
            vec![("x".into(), Category::Int), ("y".into(), Category::Int)],
            8,
        )
        .unwrap();
        registry.define_struct(point).unwrap();
        let found = registry.lookup_type("Point").unwrap();
        assert!(matches!(found.category(), Category::Struct(desc) if desc.size == 8));
        registry.exit_scope();
        assert_eq!(
            registry.lookup_type("Point").unwrap_err(),
            CodegenError::UndefinedName("Point".into())
        );
    }
}
