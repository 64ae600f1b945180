use crate::{
    ast::Ast,
    value::{lock, Value},
};

/// Owned, heap-detached mirror of a runtime value.
///
/// This is what embedders and tests see: the interpreter's internal values
/// share state across threads and frames, an `Object` is a plain deep copy
/// taken when execution has finished.
#[derive(Debug, Clone, PartialEq)]
pub enum Object {
    Null,
    Bool(bool),
    Int(i64),
    Float(f64),
    String(String),
    Array(Vec<Object>),
    /// A struct record: type name plus fields in declaration order.
    Struct(String, Vec<(String, Object)>),
    /// A class instance: class name plus fields in declaration order.
    Instance(String, Vec<(String, Object)>),
    /// A function, constructor or type value; carries the declared name.
    Fun(String),
    /// An async result that was never redeemed with `born`.
    Unborn,
}

impl Object {
    pub(crate) fn from_value(value: &Value, ast: &Ast) -> Self {
        match value {
            Value::Null => Self::Null,
            Value::Bool(b) => Self::Bool(*b),
            Value::Int(v) => Self::Int(*v),
            Value::Float(v) => Self::Float(*v),
            Value::Str(s) => Self::String(s.to_string()),
            Value::Array(elements) => {
                let elements = lock(elements);
                Self::Array(elements.iter().map(|e| Self::from_value(e, ast)).collect())
            }
            Value::Struct(record) => {
                let fields = lock(&record.fields);
                Self::Struct(
                    record.name.clone(),
                    fields
                        .iter()
                        .map(|(name, v)| (name.clone(), Self::from_value(v, ast)))
                        .collect(),
                )
            }
            Value::Instance(instance) => {
                let fields = lock(&instance.fields);
                Self::Instance(
                    ast.decl_name(instance.class).to_owned(),
                    fields
                        .iter()
                        .map(|(name, v)| (name.clone(), Self::from_value(v, ast)))
                        .collect(),
                )
            }
            Value::Fun(decl) | Value::Constructor(decl) | Value::TypeValue(decl) => {
                Self::Fun(ast.decl_name(*decl).to_owned())
            }
            Value::BuiltinFun(builtin) => Self::Fun(builtin.to_string()),
            Value::Unborn(_) => Self::Unborn,
        }
    }
}
