use std::sync::{Arc, Mutex, MutexGuard};

use indexmap::IndexMap;

use crate::{
    ast::{Ast, Builtin, NodeId},
    types::Type,
};

/// Locks a runtime mutex.
///
/// Poisoning only happens when another thread panicked mid-update, which the
/// interpreter treats as unrecoverable.
pub(crate) fn lock<T>(mutex: &Mutex<T>) -> MutexGuard<'_, T> {
    mutex.lock().expect("runtime value lock poisoned")
}

/// Insertion-ordered name-to-value map used by structs and instances.
pub(crate) type ValueMap = IndexMap<String, Value>;

/// A struct record.
#[derive(Debug)]
pub(crate) struct StructValue {
    pub name: String,
    pub fields: Mutex<ValueMap>,
}

/// A class instance: its field map plus its class declaration, from which
/// the class scope and class type are reachable.
#[derive(Debug)]
pub(crate) struct Instance {
    pub class: NodeId,
    pub fields: Mutex<ValueMap>,
}

/// Placeholder produced by calling an async function; redeemed by `born`.
#[derive(Debug, Clone, Copy)]
pub(crate) struct UnbornHandle {
    pub fun: NodeId,
    pub thread: u64,
}

/// A Sigh value at run time.
///
/// Primitives are stored inline and compared by value; arrays, structs and
/// instances are reference values shared behind `Arc` and compared by
/// identity, which is also what lets async threads see the same objects as
/// their caller.
#[derive(Debug, Clone)]
pub(crate) enum Value {
    Null,
    Bool(bool),
    Int(i64),
    Float(f64),
    Str(Arc<str>),
    Array(Arc<Mutex<Vec<Value>>>),
    Struct(Arc<StructValue>),
    Instance(Arc<Instance>),
    /// A function or method declaration used as a value.
    Fun(NodeId),
    /// A struct constructor from `$Name`.
    Constructor(NodeId),
    /// A struct or class declaration referenced as a value.
    TypeValue(NodeId),
    /// A built-in function (`print`).
    BuiltinFun(Builtin),
    Unborn(UnbornHandle),
}

impl Value {
    pub fn array(elements: Vec<Self>) -> Self {
        Self::Array(Arc::new(Mutex::new(elements)))
    }

    pub fn str(text: impl Into<Arc<str>>) -> Self {
        Self::Str(text.into())
    }

    /// Runtime `==`: primitives by value (`Int` and `Float` mix), reference
    /// values by identity.
    pub fn equals(&self, other: &Self) -> bool {
        match (self, other) {
            (Self::Null, Self::Null) => true,
            (Self::Bool(a), Self::Bool(b)) => a == b,
            (Self::Int(a), Self::Int(b)) => a == b,
            (Self::Float(a), Self::Float(b)) => a == b,
            (Self::Int(a), Self::Float(b)) | (Self::Float(b), Self::Int(a)) => (*a as f64) == *b,
            (Self::Str(a), Self::Str(b)) => a == b,
            (Self::Array(a), Self::Array(b)) => Arc::ptr_eq(a, b),
            (Self::Struct(a), Self::Struct(b)) => Arc::ptr_eq(a, b),
            (Self::Instance(a), Self::Instance(b)) => Arc::ptr_eq(a, b),
            (Self::Fun(a), Self::Fun(b))
            | (Self::Constructor(a), Self::Constructor(b))
            | (Self::TypeValue(a), Self::TypeValue(b)) => a == b,
            (Self::BuiltinFun(a), Self::BuiltinFun(b)) => a == b,
            (Self::Unborn(a), Self::Unborn(b)) => a.fun == b.fun && a.thread == b.thread,
            _ => false,
        }
    }

    /// Widens an `Int` into a `Float` slot; every other pair is unchanged.
    #[must_use]
    pub fn widen_to(self, target: &Type) -> Self {
        match (&self, target) {
            (Self::Int(v), Type::Float) => Self::Float(*v as f64),
            _ => self,
        }
    }

    /// Textual rendering used by string concatenation and `print`.
    pub fn render(&self, ast: &Ast) -> String {
        match self {
            Self::Null => "null".to_owned(),
            Self::Bool(b) => b.to_string(),
            Self::Int(v) => v.to_string(),
            Self::Float(v) => ryu::Buffer::new().format(*v).to_owned(),
            Self::Str(s) => s.to_string(),
            Self::Array(elements) => {
                let elements = lock(elements);
                let rendered: Vec<String> = elements.iter().map(|e| e.render(ast)).collect();
                format!("[{}]", rendered.join(", "))
            }
            Self::Struct(record) => {
                let fields = lock(&record.fields);
                let rendered: Vec<String> = fields.iter().map(|(name, v)| format!("{name}: {}", v.render(ast))).collect();
                format!("{}({})", record.name, rendered.join(", "))
            }
            Self::Instance(instance) => format!("<{}>", ast.decl_name(instance.class)),
            Self::Fun(decl) | Self::Constructor(decl) | Self::TypeValue(decl) => {
                format!("<{}>", ast.decl_name(*decl))
            }
            Self::BuiltinFun(builtin) => format!("<{builtin}>"),
            Self::Unborn(_) => "<unborn>".to_owned(),
        }
    }
}
