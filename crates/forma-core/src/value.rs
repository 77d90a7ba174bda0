use crate::instance::Instance;
use forma_schema::types::{Literal, TypeRef};
use serde::Serialize;
use std::collections::BTreeMap;

///
/// Value
///
/// Dynamic attribute value. Collections hold their elements inline; model
/// values hold a shared handle. Map keys are strings (the named-values
/// contract and keyed containment only ever produce string keys).
///
/// `Set` keeps insertion order and deduplicates on insert; it is stored as
/// a vector because model values are not ordered.
///

#[derive(Clone, Debug, Default, PartialEq, Serialize)]
pub enum Value {
    #[default]
    Null,
    Bool(bool),
    Int(i64),
    Float(f64),
    Text(String),
    Model(Instance),
    List(Vec<Value>),
    Set(Vec<Value>),
    Map(BTreeMap<String, Value>),
}

impl Value {
    #[must_use]
    pub const fn is_null(&self) -> bool {
        matches!(self, Self::Null)
    }

    /// Empty in the validation sense: null, empty text, or an empty
    /// container. Scalars other than text are never empty.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        match self {
            Self::Null => true,
            Self::Text(s) => s.is_empty(),
            Self::List(xs) | Self::Set(xs) => xs.is_empty(),
            Self::Map(m) => m.is_empty(),
            _ => false,
        }
    }

    /// Short classification used in error messages.
    #[must_use]
    pub fn kind_label(&self) -> String {
        match self {
            Self::Null => "null".to_string(),
            Self::Bool(_) => "bool".to_string(),
            Self::Int(_) => "int".to_string(),
            Self::Float(_) => "float".to_string(),
            Self::Text(_) => "text".to_string(),
            Self::Model(m) => format!("model {}", m.path()),
            Self::List(_) => "list".to_string(),
            Self::Set(_) => "set".to_string(),
            Self::Map(_) => "map".to_string(),
        }
    }

    /// Whether a non-null value satisfies the given type reference. Model
    /// values satisfy any level of their type chain.
    #[must_use]
    pub fn conforms_to(&self, ty: &TypeRef) -> bool {
        match (self, ty) {
            (Self::Bool(_), TypeRef::Bool)
            | (Self::Int(_), TypeRef::Int)
            | (Self::Float(_), TypeRef::Float)
            | (Self::Text(_), TypeRef::Text) => true,
            (Self::Model(m), TypeRef::Model(path)) => m.is_instance_of(path),
            _ => false,
        }
    }

    #[must_use]
    pub fn as_model(&self) -> Option<&Instance> {
        match self {
            Self::Model(m) => Some(m),
            _ => None,
        }
    }

    #[must_use]
    pub fn as_text(&self) -> Option<&str> {
        match self {
            Self::Text(s) => Some(s),
            _ => None,
        }
    }

    #[must_use]
    pub const fn as_int(&self) -> Option<i64> {
        match self {
            Self::Int(n) => Some(*n),
            _ => None,
        }
    }
}

impl From<&Literal> for Value {
    fn from(literal: &Literal) -> Self {
        match literal {
            Literal::Bool(b) => Self::Bool(*b),
            Literal::Int(n) => Self::Int(*n),
            Literal::Float(x) => Self::Float(*x),
            Literal::Text(s) => Self::Text(s.clone()),
        }
    }
}

impl From<bool> for Value {
    fn from(value: bool) -> Self {
        Self::Bool(value)
    }
}

impl From<i64> for Value {
    fn from(value: i64) -> Self {
        Self::Int(value)
    }
}

impl From<i32> for Value {
    fn from(value: i32) -> Self {
        Self::Int(i64::from(value))
    }
}

impl From<f64> for Value {
    fn from(value: f64) -> Self {
        Self::Float(value)
    }
}

impl From<&str> for Value {
    fn from(value: &str) -> Self {
        Self::Text(value.to_string())
    }
}

impl From<String> for Value {
    fn from(value: String) -> Self {
        Self::Text(value)
    }
}

impl From<Instance> for Value {
    fn from(value: Instance) -> Self {
        Self::Model(value)
    }
}

impl<V: Into<Self>> From<Vec<V>> for Value {
    fn from(values: Vec<V>) -> Self {
        Self::List(values.into_iter().map(Into::into).collect())
    }
}

///
/// TESTS
///

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn emptiness_follows_container_contents() {
        assert!(Value::Null.is_empty());
        assert!(Value::Text(String::new()).is_empty());
        assert!(Value::List(vec![]).is_empty());
        assert!(!Value::Bool(false).is_empty());
        assert!(!Value::from("x").is_empty());
    }

    #[test]
    fn scalar_conformance_is_exact() {
        assert!(Value::from(1i64).conforms_to(&TypeRef::Int));
        assert!(!Value::from(1i64).conforms_to(&TypeRef::Float));
        assert!(!Value::Null.conforms_to(&TypeRef::Int));
    }

    #[test]
    fn from_vec_builds_a_list() {
        let v = Value::from(vec!["a", "b"]);
        assert_eq!(v, Value::List(vec![Value::from("a"), Value::from("b")]));
    }
}
