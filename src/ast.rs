// Abstract Syntax Tree (AST) definitions for the cinder language

use std::fmt;

#[derive(Debug, Clone, PartialEq)]
pub struct Program {
    pub statements: Vec<Node>,
}

/// Built-in type keywords plus user-defined (struct/enum) type names
#[derive(Debug, Clone, PartialEq)]
pub enum TypeName {
    I32,
    IDouble,
    Char,
    Bool,
    Str,
    Void,
    User(String),
}

#[derive(Debug, Clone, PartialEq)]
pub enum ArraySize {
    Fixed(Box<Node>),
    // `T a[] = ...`, the size comes from the initializer
    Empty,
}

/// The type written in front of a declaration
#[derive(Debug, Clone, PartialEq)]
pub enum DeclaredType {
    Named(TypeName),
    Array { element: TypeName, size: ArraySize },
}

#[derive(Debug, Clone, Copy, PartialEq)]
pub enum Number {
    Int(i32),
    Float(f64),
}

#[derive(Debug, Clone, Copy, PartialEq)]
pub enum ArithOp {
    Add,
    Sub,
    Mul,
    Div,
}

#[derive(Debug, Clone, Copy, PartialEq)]
pub enum CompareOp {
    Eq,
    Neq,
    Lt,
    Leq,
    Gt,
    Geq,
}

#[derive(Debug, Clone, Copy, PartialEq)]
pub enum LogicalOp {
    And,
    Or,
    Not,
}

#[derive(Debug, Clone, Copy, PartialEq)]
pub enum ControlFlow {
    Break,
    Continue,
}

/// A declaration (`declared` is set) or an assignment to an existing name
#[derive(Debug, Clone, PartialEq)]
pub struct Assign {
    pub target: Box<Node>,
    pub value: Option<Box<Node>>,
    pub declared: Option<DeclaredType>,
    pub is_const: bool,
}

impl Assign {
    pub fn declaration(
        type_name: TypeName,
        is_const: bool,
        target: Node,
        size: Option<ArraySize>,
        value: Option<Node>,
    ) -> Assign {
        let declared = match size {
            Some(size) => DeclaredType::Array {
                element: type_name,
                size,
            },
            None => DeclaredType::Named(type_name),
        };
        Assign {
            target: Box::new(target),
            value: value.map(Box::new),
            declared: Some(declared),
            is_const,
        }
    }

    pub fn assignment(target: Node, value: Node) -> Assign {
        Assign {
            target: Box::new(target),
            value: Some(Box::new(value)),
            declared: None,
            is_const: false,
        }
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct IfStatement {
    pub condition: Box<Node>,
    pub then_block: Vec<Node>,
    pub elseifs: Vec<ElseIf>,
    pub else_block: Option<Else>,
}

#[derive(Debug, Clone, PartialEq)]
pub struct ElseIf {
    pub condition: Box<Node>,
    pub block: Vec<Node>,
}

#[derive(Debug, Clone, PartialEq)]
pub struct Else {
    pub block: Vec<Node>,
}

#[derive(Debug, Clone, PartialEq)]
pub struct ForLoop {
    pub init: Box<Node>,
    pub condition: Box<Node>,
    pub step: Box<Node>,
    pub block: Vec<Node>,
}

#[derive(Debug, Clone, PartialEq)]
pub struct EnumVal {
    pub name: String,
    pub ordinal: i32,
}

#[derive(Debug, Clone, PartialEq)]
pub struct FunctionDef {
    pub name: String,
    pub return_type: TypeName,
    pub params: Vec<Assign>,
    pub body: Vec<Node>,
}

#[derive(Debug, Clone, PartialEq)]
pub enum Node {
    Number(Number),
    // Raw text between the quotes, escapes are decoded during lowering
    String(String),
    Character(char),
    Bool(bool),
    Null,
    Identifier(String),
    BinaryOp {
        op: ArithOp,
        left: Box<Node>,
        right: Box<Node>,
    },
    CompareOp {
        op: CompareOp,
        left: Box<Node>,
        right: Box<Node>,
    },
    LogicalOp {
        op: LogicalOp,
        left: Box<Node>,
        right: Option<Box<Node>>,
    },
    Assign(Assign),
    Write(Box<Node>),
    Read(Box<Node>),
    IfStatement(IfStatement),
    WhileLoop {
        condition: Box<Node>,
        block: Vec<Node>,
    },
    ForLoop(ForLoop),
    DoWhileLoop {
        condition: Box<Node>,
        block: Vec<Node>,
    },
    Struct {
        name: String,
        fields: Vec<Assign>,
    },
    Enum {
        name: String,
        values: Vec<EnumVal>,
    },
    GetArray {
        base: Box<Node>,
        index: Box<Node>,
    },
    Group(Vec<Node>),
    Function(FunctionDef),
    FunctionCall {
        name: String,
        args: Vec<Node>,
    },
    Return(Option<Box<Node>>),
    ControlFlow(ControlFlow),
    Access {
        left: Box<Node>,
        right: Box<Node>,
    },
    // `*e`: a pointer declarator on the left of a declaration, a dereference elsewhere
    Pointer(Box<Node>),
    // `&e`
    Reference(Box<Node>),
    Class {
        name: String,
        block: Vec<Node>,
    },
    Define {
        name: String,
        value: Box<Node>,
    },
    Include(String),
}

impl Node {
    /// Unary minus. Literals are folded, everything else becomes `0 - e`.
    pub fn negate(expr: Node) -> Node {
        match expr {
            Node::Number(Number::Int(n)) => Node::Number(Number::Int(n.wrapping_neg())),
            Node::Number(Number::Float(f)) => Node::Number(Number::Float(-f)),
            other => Node::BinaryOp {
                op: ArithOp::Sub,
                left: Box::new(Node::Number(Number::Int(0))),
                right: Box::new(other),
            },
        }
    }

    /// Definitions do not emit instructions into the current block
    pub fn is_definition(&self) -> bool {
        matches!(
            self,
            Node::Function(_) | Node::Struct { .. } | Node::Enum { .. }
        )
    }

    /// Short human readable name used in diagnostics
    pub fn describe(&self) -> String {
        match self {
            Node::Identifier(name) => name.clone(),
            Node::Pointer(inner) => format!("*{}", inner.describe()),
            Node::Reference(inner) => format!("&{}", inner.describe()),
            Node::GetArray { base, .. } => format!("{}[..]", base.describe()),
            Node::Access { left, right } => format!("{}.{}", left.describe(), right.describe()),
            Node::FunctionCall { name, .. } => format!("{}(..)", name),
            Node::Number(Number::Int(n)) => n.to_string(),
            Node::Number(Number::Float(f)) => f.to_string(),
            Node::String(s) => format!("\"{}\"", s),
            Node::Character(c) => format!("'{}'", c),
            Node::Bool(b) => b.to_string(),
            Node::Null => "null".into(),
            _ => "expression".into(),
        }
    }
}

/// Assigns ordinals to enum members: an explicit value resets the counter,
/// members without one continue from the previous ordinal.
pub fn number_enum_values(items: Vec<(String, Option<i32>)>) -> Vec<EnumVal> {
    let mut next = 0;
    items
        .into_iter()
        .map(|(name, explicit)| {
            let ordinal = explicit.unwrap_or(next);
            next = ordinal.wrapping_add(1);
            EnumVal { name, ordinal }
        })
        .collect()
}

fn escape_byte(c: char) -> Option<u8> {
    match c {
        'n' => Some(b'\n'),
        't' => Some(b'\t'),
        'r' => Some(b'\r'),
        '0' => Some(0),
        '\\' => Some(b'\\'),
        '"' => Some(b'"'),
        '\'' => Some(b'\''),
        _ => None,
    }
}

/// Decodes the raw text of a string literal into bytes, resolving escapes.
/// Unknown escapes are kept verbatim. No terminator is appended.
pub fn decode_string(raw: &str) -> Vec<u8> {
    let mut bytes = Vec::with_capacity(raw.len());
    let mut chars = raw.chars();
    while let Some(c) = chars.next() {
        if c != '\\' {
            let mut buf = [0u8; 4];
            bytes.extend_from_slice(c.encode_utf8(&mut buf).as_bytes());
            continue;
        }
        match chars.next() {
            Some(e) => match escape_byte(e) {
                Some(b) => bytes.push(b),
                None => {
                    bytes.push(b'\\');
                    let mut buf = [0u8; 4];
                    bytes.extend_from_slice(e.encode_utf8(&mut buf).as_bytes());
                }
            },
            None => bytes.push(b'\\'),
        }
    }
    bytes
}

/// Decodes a character literal including its quotes, e.g. `'a'` or `'\n'`
pub fn decode_char(literal: &str) -> char {
    let inner = &literal[1..literal.len() - 1];
    let mut chars = inner.chars();
    match (chars.next(), chars.next()) {
        (Some('\\'), Some(e)) => escape_byte(e).map(char::from).unwrap_or(e),
        (Some(c), _) => c,
        (None, _) => '\0',
    }
}

impl fmt::Display for TypeName {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            TypeName::I32 => write!(f, "i32"),
            TypeName::IDouble => write!(f, "idouble"),
            TypeName::Char => write!(f, "char"),
            TypeName::Bool => write!(f, "bool"),
            TypeName::Str => write!(f, "str"),
            TypeName::Void => write!(f, "void"),
            TypeName::User(name) => write!(f, "{}", name),
        }
    }
}

impl fmt::Display for ArithOp {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            ArithOp::Add => "+",
            ArithOp::Sub => "-",
            ArithOp::Mul => "*",
            ArithOp::Div => "/",
        };
        write!(f, "{}", s)
    }
}

impl fmt::Display for CompareOp {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            CompareOp::Eq => "==",
            CompareOp::Neq => "!=",
            CompareOp::Lt => "<",
            CompareOp::Leq => "<=",
            CompareOp::Gt => ">",
            CompareOp::Geq => ">=",
        };
        write!(f, "{}", s)
    }
}

impl fmt::Display for LogicalOp {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            LogicalOp::And => "and",
            LogicalOp::Or => "or",
            LogicalOp::Not => "not",
        };
        write!(f, "{}", s)
    }
}
