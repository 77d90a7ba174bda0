use serde::Serialize;
use std::fmt;

///
/// TypeRef
///
/// Declared type of a single field, a collection element, or a map value.
/// Model references are by schema path and are checked during build.
///

#[derive(Clone, Debug, Eq, PartialEq, Serialize)]
pub enum TypeRef {
    Bool,
    Int,
    Float,
    Text,
    Model(String),
}

impl TypeRef {
    #[must_use]
    pub const fn is_model(&self) -> bool {
        matches!(self, Self::Model(_))
    }

    /// Model path, when this reference points at a model type.
    #[must_use]
    pub fn model_path(&self) -> Option<&str> {
        match self {
            Self::Model(path) => Some(path),
            _ => None,
        }
    }
}

impl fmt::Display for TypeRef {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Bool => write!(f, "bool"),
            Self::Int => write!(f, "int"),
            Self::Float => write!(f, "float"),
            Self::Text => write!(f, "text"),
            Self::Model(path) => write!(f, "model {path}"),
        }
    }
}

///
/// FieldShape
///
/// Structural classification driving merge dispatch. Maps are string-keyed;
/// the named-values contract and the owner/key machinery only ever produce
/// string keys.
///

#[derive(Clone, Debug, Eq, PartialEq, Serialize)]
pub enum FieldShape {
    Single(TypeRef),
    List(TypeRef),
    Set(TypeRef),
    Map { value: TypeRef },
}

impl FieldShape {
    /// Element type for collections and maps, the value type for singles.
    #[must_use]
    pub const fn element(&self) -> &TypeRef {
        match self {
            Self::Single(ty) | Self::List(ty) | Self::Set(ty) | Self::Map { value: ty } => ty,
        }
    }

    #[must_use]
    pub const fn is_single(&self) -> bool {
        matches!(self, Self::Single(_))
    }

    #[must_use]
    pub const fn is_collection(&self) -> bool {
        matches!(self, Self::List(_) | Self::Set(_))
    }

    #[must_use]
    pub const fn is_map(&self) -> bool {
        matches!(self, Self::Map { .. })
    }

    #[must_use]
    pub const fn label(&self) -> &'static str {
        match self {
            Self::Single(_) => "single",
            Self::List(_) => "list",
            Self::Set(_) => "set",
            Self::Map { .. } => "map",
        }
    }
}

///
/// FieldRole
///

#[derive(Clone, Copy, Debug, Eq, PartialEq, Serialize)]
pub enum FieldRole {
    /// Plain data field; participates in copy, merge, and validation.
    Normal,
    /// Immutable identity, assigned once at construction.
    Key,
    /// Write-once back-reference to the embedding instance.
    Owner,
    /// Real state, but excluded from copy, merge, and default validation.
    Transient,
    /// Schema-internal field outside the public read contract.
    Builder,
}

impl FieldRole {
    /// Fields the copy/merge engine never touches.
    #[must_use]
    pub const fn is_copyable(self) -> bool {
        matches!(self, Self::Normal)
    }
}

///
/// Literal
///
/// Scalar default attached to a field declaration. Applied at allocation,
/// before template seeding runs.
///

#[derive(Clone, Debug, PartialEq, Serialize)]
pub enum Literal {
    Bool(bool),
    Int(i64),
    Float(f64),
    Text(String),
}

impl Literal {
    /// Whether this literal satisfies the given type reference.
    #[must_use]
    pub const fn conforms_to(&self, ty: &TypeRef) -> bool {
        matches!(
            (self, ty),
            (Self::Bool(_), TypeRef::Bool)
                | (Self::Int(_), TypeRef::Int)
                | (Self::Float(_), TypeRef::Float)
                | (Self::Text(_), TypeRef::Text)
        )
    }
}

impl From<&str> for Literal {
    fn from(value: &str) -> Self {
        Self::Text(value.to_string())
    }
}

impl From<i64> for Literal {
    fn from(value: i64) -> Self {
        Self::Int(value)
    }
}

impl From<bool> for Literal {
    fn from(value: bool) -> Self {
        Self::Bool(value)
    }
}

impl From<f64> for Literal {
    fn from(value: f64) -> Self {
        Self::Float(value)
    }
}
