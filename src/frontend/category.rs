use std::fmt;
use std::rc::Rc;

use cranelift_codegen::ir::{types, Type, Value};

/// Largest object the storage model can address with a 32 bit offset
pub const MAX_OBJECT_SIZE: u32 = i32::MAX as u32;

/// The value category of a storage location or an expression.
/// Decides which instructions are used to load, store and operate on it.
#[derive(Debug, Clone, PartialEq)]
pub enum Category {
    Int,
    Double,
    Char,
    Bool,
    Str,
    Void,
    Array(Box<Category>, u32),
    Pointer(Box<Category>),
    Struct(Rc<StructDescriptor>),
    Enum(Rc<EnumDescriptor>),
}

impl Category {
    /// Array of `len` elements, `None` if it would exceed [`MAX_OBJECT_SIZE`]
    pub fn array(element: Category, len: u32, ptr_bytes: u32) -> Option<Category> {
        element
            .size(ptr_bytes)
            .checked_mul(len)
            .filter(|&size| size <= MAX_OBJECT_SIZE)?;
        Some(Category::Array(Box::new(element), len))
    }

    /// IR type of a scalar category, `None` for aggregates and `void`
    pub fn ir_type(&self, ptr: Type) -> Option<Type> {
        match self {
            Category::Int | Category::Enum(_) => Some(types::I32),
            Category::Double => Some(types::F64),
            Category::Char | Category::Bool => Some(types::I8),
            Category::Str | Category::Pointer(_) => Some(ptr),
            Category::Void | Category::Array(..) | Category::Struct(_) => None,
        }
    }

    pub fn size(&self, ptr_bytes: u32) -> u32 {
        match self {
            Category::Int | Category::Enum(_) => 4,
            Category::Double => 8,
            Category::Char | Category::Bool => 1,
            Category::Str | Category::Pointer(_) => ptr_bytes,
            Category::Void => 0,
            // bounded by `Category::array`
            Category::Array(element, len) => element.size(ptr_bytes).saturating_mul(*len),
            Category::Struct(desc) => desc.size,
        }
    }

    pub fn align(&self, ptr_bytes: u32) -> u32 {
        match self {
            Category::Array(element, _) => element.align(ptr_bytes),
            Category::Struct(desc) => desc.align,
            Category::Void => 1,
            scalar => scalar.size(ptr_bytes),
        }
    }

    pub fn is_scalar(&self) -> bool {
        !matches!(
            self,
            Category::Void | Category::Array(..) | Category::Struct(_)
        )
    }

    /// Categories held in an integer register and converted like C integers
    pub fn is_integral(&self) -> bool {
        matches!(
            self,
            Category::Int | Category::Char | Category::Bool | Category::Enum(_)
        )
    }

    pub fn is_address(&self) -> bool {
        matches!(self, Category::Str | Category::Pointer(_))
    }
}

impl fmt::Display for Category {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Category::Int => write!(f, "i32"),
            Category::Double => write!(f, "idouble"),
            Category::Char => write!(f, "char"),
            Category::Bool => write!(f, "bool"),
            Category::Str => write!(f, "str"),
            Category::Void => write!(f, "void"),
            Category::Array(element, len) => write!(f, "{}[{}]", element, len),
            Category::Pointer(inner) => write!(f, "*{}", inner),
            Category::Struct(desc) => write!(f, "struct {}", desc.name),
            Category::Enum(desc) => write!(f, "enum {}", desc.name),
        }
    }
}

/// An IR value tagged with its category
#[derive(Debug, Clone)]
pub struct TypedValue {
    pub value: Value,
    pub category: Category,
}

impl TypedValue {
    pub fn new(value: Value, category: Category) -> Self {
        TypedValue { value, category }
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct Field {
    pub name: String,
    pub category: Category,
    pub offset: u32,
}

/// Memory layout of a struct. Fields keep declaration order, each one at
/// its natural alignment; the size is rounded up to the struct alignment.
/// A layout larger than [`MAX_OBJECT_SIZE`] is rejected.
#[derive(Debug, Clone, PartialEq)]
pub struct StructDescriptor {
    pub name: String,
    pub fields: Vec<Field>,
    pub size: u32,
    pub align: u32,
}

impl StructDescriptor {
    pub fn new(name: &str, members: Vec<(String, Category)>, ptr_bytes: u32) -> Option<Self> {
        let mut offset = 0u32;
        let mut align = 1;
        let mut fields = Vec::with_capacity(members.len());
        for (field_name, category) in members {
            let field_align = category.align(ptr_bytes);
            offset = align_to(offset, field_align)?;
            align = align.max(field_align);
            let size = category.size(ptr_bytes);
            fields.push(Field {
                name: field_name,
                category,
                offset,
            });
            offset = offset.checked_add(size)?;
        }
        let size = align_to(offset, align).filter(|&size| size <= MAX_OBJECT_SIZE)?;
        Some(StructDescriptor {
            name: name.to_string(),
            fields,
            size,
            align,
        })
    }

    pub fn field(&self, name: &str) -> Option<&Field> {
        self.fields.iter().find(|field| field.name == name)
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct EnumDescriptor {
    pub name: String,
    pub members: Vec<(String, i32)>,
}

impl EnumDescriptor {
    pub fn ordinal(&self, member: &str) -> Option<i32> {
        self.members
            .iter()
            .find(|(name, _)| name == member)
            .map(|&(_, ordinal)| ordinal)
    }
}

fn align_to(offset: u32, align: u32) -> Option<u32> {
    offset.div_ceil(align).checked_mul(align)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn struct_fields_are_naturally_aligned() {
        let desc = StructDescriptor::new(
            "Mixed",
            vec![
                ("tag".into(), Category::Char),
                ("value".into(), Category::Double),
                ("count".into(), Category::Int),
            ],
            8,
        )
        .unwrap();
        let offsets: Vec<u32> = desc.fields.iter().map(|f| f.offset).collect();
        assert_eq!(offsets, vec![0, 8, 16]);
        assert_eq!(desc.align, 8);
        assert_eq!(desc.size, 24);
    }

    #[test]
    fn array_layout_follows_element() {
        let array = Category::Array(Box::new(Category::Int), 5);
        assert_eq!(array.size(8), 20);
        assert_eq!(array.align(8), 4);
        assert!(!array.is_scalar());
        assert_eq!(array.to_string(), "i32[5]");
    }

    #[test]
    fn oversized_layouts_are_rejected() {
        assert!(Category::array(Category::Int, 2_000_000_000, 8).is_none());
        assert!(Category::array(Category::Double, u32::MAX, 8).is_none());
        let big = Category::array(Category::Char, MAX_OBJECT_SIZE, 8).unwrap();
        assert_eq!(big.size(8), MAX_OBJECT_SIZE);
        let two = StructDescriptor::new(
            "Huge",
            vec![("a".into(), big.clone()), ("b".into(), big)],
            8,
        );
        assert!(two.is_none());
    }

    #[test]
    fn scalar_ir_types() {
        assert_eq!(Category::Int.ir_type(types::I64), Some(types::I32));
        assert_eq!(Category::Bool.ir_type(types::I64), Some(types::I8));
        assert_eq!(Category::Str.ir_type(types::I64), Some(types::I64));
        assert_eq!(Category::Void.ir_type(types::I64), None);
    }

    #[test]
    fn enum_members_resolve_to_ordinals() {
        let desc = EnumDescriptor {
            name: "Color".into(),
            members: vec![("Red".into(), 0), ("Green".into(), 4)],
        };
        assert_eq!(desc.ordinal("Green"), Some(4));
        assert_eq!(desc.ordinal("Blue"), None);
    }
}
