use std::fmt;

use indexmap::IndexMap;
use serde::Serialize;

use crate::ast::NodeId;

/// Ordered name-to-type map used for struct fields and class members.
pub type FieldMap = IndexMap<String, Type>;

/// A function type: return type plus ordered parameter types.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct FunType {
    pub ret: Box<Type>,
    pub params: Vec<Type>,
}

impl FunType {
    #[must_use]
    pub fn new(ret: Type, params: Vec<Type>) -> Self {
        Self { ret: Box::new(ret), params }
    }
}

/// A struct type: name plus insertion-ordered fields.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct StructType {
    pub name: String,
    pub fields: FieldMap,
}

/// A nominal handle to a class type.
///
/// The class member map is kept in the analysis attribute store keyed by
/// `decl` rather than inline, so a class whose fields mention the class
/// itself stays representable. Shape compatibility and member lookup go
/// through that map; the handle itself compares nominally.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct ClassHandle {
    pub name: String,
    pub decl: NodeId,
}

/// The closed set of Sigh types.
///
/// Two types are equal iff their variant and structural contents match;
/// classes compare by their declaration (see [`ClassHandle`]).
#[derive(Debug, Clone, PartialEq, Serialize)]
pub enum Type {
    Int,
    Float,
    Bool,
    String,
    Void,
    /// Type of the `null` literal; assignable to every reference type.
    Null,
    /// Type of type-valued expressions (struct and class declarations).
    Type,
    /// Inference placeholder; must not survive variable-declaration
    /// analysis unless an inference failure was reported.
    Auto,
    Array(Box<Type>),
    Unborn(Box<Type>),
    Fun(FunType),
    Struct(StructType),
    Class(ClassHandle),
}

impl Type {
    #[must_use]
    pub fn array(element: Self) -> Self {
        Self::Array(Box::new(element))
    }

    #[must_use]
    pub fn unborn(inner: Self) -> Self {
        Self::Unborn(Box::new(inner))
    }

    /// Primitive types are compared by value at run time.
    #[must_use]
    pub fn is_primitive(&self) -> bool {
        matches!(self, Self::Int | Self::Float | Self::Bool | Self::String | Self::Type)
    }

    /// Reference types are compared by identity at run time and accept `null`.
    #[must_use]
    pub fn is_reference(&self) -> bool {
        matches!(
            self,
            Self::Array(_) | Self::Unborn(_) | Self::Fun(_) | Self::Struct(_) | Self::Class(_)
        )
    }

    #[must_use]
    pub fn is_numeric(&self) -> bool {
        matches!(self, Self::Int | Self::Float)
    }

    /// Strips one `Unborn` layer: the "effective" type of an async result.
    #[must_use]
    pub fn unwrap_unborn(&self) -> &Self {
        match self {
            Self::Unborn(inner) => inner,
            other => other,
        }
    }

    /// Whether a value of type `self` can be assigned to a slot of type
    /// `target`.
    ///
    /// Classes compare nominally here; callers that want duck typing between
    /// distinct classes run [`class_shape_compatible`] over the two member
    /// maps instead.
    #[must_use]
    pub fn assigns_to(&self, target: &Self) -> bool {
        if matches!(target, Self::Auto) {
            return true;
        }
        if matches!(self, Self::Void) {
            return false;
        }
        match (self, target) {
            (Self::Int, Self::Float) => true,
            (Self::Null, t) if t.is_reference() => true,
            (Self::Array(a), Self::Array(b)) | (Self::Unborn(a), Self::Unborn(b)) => a.assigns_to(b),
            // an already-computed value may be stored into an unborn slot,
            // and an unborn value stands in for its payload once born
            (a, Self::Unborn(b)) => a.assigns_to(b),
            (Self::Unborn(a), b) => a.assigns_to(b),
            (a, b) => a == b,
        }
    }

    /// Whether both operands are acceptable to `==` / `!=`.
    ///
    /// Comparable means: both reference types, or structurally equal, or an
    /// `Int`/`Float` pair.
    #[must_use]
    pub fn comparable_with(&self, other: &Self) -> bool {
        if self.is_reference() && other.is_reference() {
            return true;
        }
        if matches!(self, Self::Null) && other.is_reference() || matches!(other, Self::Null) && self.is_reference() {
            return true;
        }
        if self == other {
            return true;
        }
        matches!(
            (self.unwrap_unborn(), other.unwrap_unborn()),
            (Self::Int, Self::Float) | (Self::Float, Self::Int) | (Self::Int, Self::Int) | (Self::Float, Self::Float)
        )
    }
}

impl fmt::Display for Type {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Int => write!(f, "Int"),
            Self::Float => write!(f, "Float"),
            Self::Bool => write!(f, "Bool"),
            Self::String => write!(f, "String"),
            Self::Void => write!(f, "Void"),
            Self::Null => write!(f, "Null"),
            Self::Type => write!(f, "Type"),
            Self::Auto => write!(f, "Auto"),
            Self::Array(element) => write!(f, "{element}[]"),
            Self::Unborn(inner) => write!(f, "Unborn<{inner}>"),
            Self::Fun(fun) => {
                write!(f, "(")?;
                for (i, param) in fun.params.iter().enumerate() {
                    if i > 0 {
                        write!(f, ", ")?;
                    }
                    write!(f, "{param}")?;
                }
                write!(f, ") -> {}", fun.ret)
            }
            Self::Struct(s) => write!(f, "{}", s.name),
            Self::Class(c) => write!(f, "{}", c.name),
        }
    }
}

/// Computes the common supertype of two types, if any.
///
/// Returns `b` when `a` assigns to `b`, `a` when `b` assigns to `a`, and
/// `None` otherwise. Commutative whenever defined.
#[must_use]
pub fn common_supertype(a: &Type, b: &Type) -> Option<Type> {
    if a.assigns_to(b) {
        Some(b.clone())
    } else if b.assigns_to(a) {
        Some(a.clone())
    } else {
        None
    }
}

/// The constructor entry of a class member map; excluded from shape checks.
pub const CONSTRUCTOR_NAME: &str = "<constructor>";

/// Structural class compatibility: may a value shaped like `source` be
/// assigned to a slot declared as `target`?
///
/// Every field of the target class other than the constructor must exist on
/// the source class with an equal type. All missing and mismatched fields
/// are reported together in one message.
pub fn class_shape_compatible(
    target_name: &str,
    target_fields: &FieldMap,
    source_name: &str,
    source_fields: &FieldMap,
) -> Result<(), String> {
    let mut problems = String::new();
    for (field, expected) in target_fields {
        if field == CONSTRUCTOR_NAME {
            continue;
        }
        match source_fields.get(field) {
            None => {
                problems.push_str(&format!("missing field `{field}`; "));
            }
            Some(actual) if actual != expected => {
                problems.push_str(&format!(
                    "field `{field}` has type {actual}, expected {expected}; "
                ));
            }
            Some(_) => {}
        }
    }
    if problems.is_empty() {
        Ok(())
    } else {
        Err(format!(
            "class {source_name} is not shape-compatible with {target_name}: {}",
            problems.trim_end_matches("; ")
        ))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn class(name: &str, decl: usize) -> Type {
        Type::Class(ClassHandle {
            name: name.to_owned(),
            decl: NodeId::new(decl),
        })
    }

    #[test]
    fn assignability_is_reflexive() {
        for ty in [
            Type::Int,
            Type::Float,
            Type::Bool,
            Type::String,
            Type::array(Type::Int),
            Type::unborn(Type::Float),
            class("A", 0),
        ] {
            assert!(ty.assigns_to(&ty), "{ty} should assign to itself");
        }
    }

    #[test]
    fn int_widens_to_float_but_not_back() {
        assert!(Type::Int.assigns_to(&Type::Float));
        assert!(!Type::Float.assigns_to(&Type::Int));
    }

    #[test]
    fn void_never_assigns() {
        assert!(!Type::Void.assigns_to(&Type::Void));
        assert!(!Type::Void.assigns_to(&Type::Auto));
    }

    #[test]
    fn auto_accepts_anything() {
        assert!(Type::Int.assigns_to(&Type::Auto));
        assert!(class("A", 0).assigns_to(&Type::Auto));
    }

    #[test]
    fn null_assigns_to_reference_types_only() {
        assert!(Type::Null.assigns_to(&Type::array(Type::Int)));
        assert!(Type::Null.assigns_to(&class("A", 0)));
        assert!(!Type::Null.assigns_to(&Type::Int));
    }

    #[test]
    fn arrays_and_unborn_are_covariant() {
        assert!(Type::array(Type::Int).assigns_to(&Type::array(Type::Float)));
        assert!(!Type::array(Type::Float).assigns_to(&Type::array(Type::Int)));
        assert!(Type::unborn(Type::Int).assigns_to(&Type::unborn(Type::Float)));
    }

    #[test]
    fn unborn_payload_is_interchangeable() {
        assert!(Type::Int.assigns_to(&Type::unborn(Type::Int)));
        assert!(Type::unborn(Type::Int).assigns_to(&Type::Float));
    }

    #[test]
    fn common_supertype_is_commutative() {
        let pairs = [
            (Type::Int, Type::Float),
            (Type::array(Type::Int), Type::array(Type::Float)),
            (Type::Null, Type::array(Type::Int)),
        ];
        for (a, b) in pairs {
            assert_eq!(common_supertype(&a, &b), common_supertype(&b, &a));
        }
        assert_eq!(common_supertype(&Type::Int, &Type::Float), Some(Type::Float));
        assert_eq!(common_supertype(&Type::Int, &Type::Bool), None);
    }

    #[test]
    fn shape_compat_ignores_constructor_and_accumulates_errors() {
        let mut target = FieldMap::default();
        target.insert(CONSTRUCTOR_NAME.to_owned(), Type::Fun(FunType::new(Type::Void, vec![])));
        target.insert("a".to_owned(), Type::Int);
        target.insert("b".to_owned(), Type::String);

        let mut source = FieldMap::default();
        source.insert("a".to_owned(), Type::Float);

        let err = class_shape_compatible("T", &target, "S", &source).unwrap_err();
        assert!(err.contains("field `a` has type Float, expected Int"));
        assert!(err.contains("missing field `b`"));

        let mut ok = FieldMap::default();
        ok.insert("a".to_owned(), Type::Int);
        ok.insert("b".to_owned(), Type::String);
        ok.insert("extra".to_owned(), Type::Bool);
        assert!(class_shape_compatible("T", &target, "S", &ok).is_ok());
    }

    #[test]
    fn display_formats() {
        assert_eq!(Type::array(Type::Int).to_string(), "Int[]");
        assert_eq!(Type::unborn(Type::Void).to_string(), "Unborn<Void>");
        assert_eq!(
            Type::Fun(FunType::new(Type::Void, vec![Type::Int, Type::Float])).to_string(),
            "(Int, Float) -> Void"
        );
    }
}
