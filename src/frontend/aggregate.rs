use std::collections::HashSet;
use std::rc::Rc;

use cranelift_codegen::ir::types;
use cranelift_module::Module;
use log::debug;

use crate::ast::{Assign, EnumVal, Node};
use crate::frontend::category::{Category, EnumDescriptor, StructDescriptor, TypedValue};
use crate::frontend::context::FunctionContext;
use crate::frontend::error::{unsupported, CodegenError};
use crate::frontend::storage::{declared_name, displace, Place};
use crate::frontend::type_registry::UserType;

fn member_name(node: &Node) -> Result<&str, CodegenError> {
    match node {
        Node::Identifier(name) => Ok(name),
        other => Err(unsupported(format!(
            "`{}` is not a member name",
            other.describe()
        ))),
    }
}

impl<M: Module> FunctionContext<'_, '_, M> {
    pub fn define_struct(&mut self, name: &str, fields: &[Assign]) -> Result<(), CodegenError> {
        let mut members = Vec::with_capacity(fields.len());
        let mut seen = HashSet::new();
        for field in fields {
            let (field_name, is_pointer) = declared_name(&field.target)?;
            if !seen.insert(field_name) {
                return Err(CodegenError::Redefinition(format!("{}.{}", name, field_name)));
            }
            if field.value.is_some() {
                return Err(unsupported(format!(
                    "default value for field `{}.{}`",
                    name, field_name
                )));
            }
            let Some(declared) = &field.declared else {
                return Err(CodegenError::UnknownType(format!("{}.{}", name, field_name)));
            };
            let category = self.declared_category(declared, is_pointer, None)?;
            members.push((field_name.to_string(), category));
        }
        let Some(desc) = StructDescriptor::new(name, members, self.session.pointer_bytes()) else {
            return Err(unsupported(format!("struct {} is too large", name)));
        };
        debug!("struct {}: {} bytes, {} fields", name, desc.size, desc.fields.len());
        self.session.type_registry.define_struct(desc)?;
        Ok(())
    }

    pub fn define_enum(&mut self, name: &str, values: &[EnumVal]) -> Result<(), CodegenError> {
        let mut seen = HashSet::new();
        for value in values {
            if !seen.insert(value.name.as_str()) {
                return Err(CodegenError::Redefinition(format!("{}.{}", name, value.name)));
            }
        }
        let desc = EnumDescriptor {
            name: name.to_string(),
            members: values.iter().map(|v| (v.name.clone(), v.ordinal)).collect(),
        };
        debug!("enum {} with {} members", name, desc.members.len());
        self.session.type_registry.define_enum(desc)?;
        Ok(())
    }

    fn enum_constant(&mut self, desc: &Rc<EnumDescriptor>, member: &str) -> Result<TypedValue, CodegenError> {
        let Some(ordinal) = desc.ordinal(member) else {
            return Err(CodegenError::UndefinedName(format!("{}.{}", desc.name, member)));
        };
        let value = self.iconst(types::I32, i64::from(ordinal));
        Ok(TypedValue::new(value, Category::Enum(Rc::clone(desc))))
    }

    /// `left.right` in value position: a struct field, or an enum member
    /// named through the enum type or one of its instances
    pub fn access(&mut self, left: &Node, right: &Node) -> Result<TypedValue, CodegenError> {
        let member = member_name(right)?;
        if let Node::Identifier(name) = left {
            if !self.session.symbol_table.contains(name) {
                return match self.session.type_registry.lookup_type(name)? {
                    UserType::Enum(desc) => self.enum_constant(&desc, member),
                    UserType::Struct(_) => Err(unsupported(format!(
                        "`{}.{}` names a struct type, not an instance",
                        name, member
                    ))),
                };
            }
            let handle = self.session.symbol_table.lookup(name)?;
            if let Category::Enum(desc) = &handle.category {
                return self.enum_constant(desc, member);
            }
        }
        let place = self.field_place(left, right)?;
        self.load_place(&place)
    }

    /// Memory of field `right` in the struct denoted by `left`
    pub fn field_place(&mut self, left: &Node, right: &Node) -> Result<Place, CodegenError> {
        let member = member_name(right)?;
        if let Node::Identifier(name) = left {
            if !self.session.symbol_table.contains(name) {
                // `Enum.Member` exists, but is a constant
                self.session.type_registry.lookup_type(name)?;
                return Err(unsupported(format!("`{}.{}` is not assignable", name, member)));
            }
        }
        let base = self.place(left)?;
        let Category::Struct(desc) = &base.category else {
            return Err(unsupported(format!(
                "`{}` is a {}, not a struct",
                left.describe(),
                base.category
            )));
        };
        let Some(field) = desc.field(member) else {
            return Err(CodegenError::UndefinedName(format!("{}.{}", desc.name, member)));
        };
        Ok(Place {
            addr: base.addr,
            offset: displace(base.offset, i64::from(field.offset))?,
            category: field.category.clone(),
            is_const: base.is_const,
        })
    }
}
