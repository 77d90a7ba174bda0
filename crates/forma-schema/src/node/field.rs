use crate::{
    strategy::{CollectionStrategy, Declared, MapStrategy, OverwriteDefaults, SingleStrategy},
    types::{FieldRole, FieldShape, Literal, TypeRef},
};
use serde::Serialize;

///
/// FieldDef
///
/// One declared field. Key and owner fields are normally added through
/// [`ModelDef::key`](crate::node::ModelDef::key) and
/// [`ModelDef::owner`](crate::node::ModelDef::owner).
///

#[derive(Clone, Debug, Serialize)]
pub struct FieldDef {
    pub name: String,
    pub shape: FieldShape,
    pub role: FieldRole,
    pub required: bool,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub default: Option<Literal>,

    pub overwrite: OverwriteDefaults,
}

impl FieldDef {
    #[must_use]
    pub fn new(name: impl Into<String>, shape: FieldShape) -> Self {
        Self {
            name: name.into(),
            shape,
            role: FieldRole::Normal,
            required: false,
            default: None,
            overwrite: OverwriteDefaults::default(),
        }
    }

    // shape conveniences

    #[must_use]
    pub fn bool(name: impl Into<String>) -> Self {
        Self::new(name, FieldShape::Single(TypeRef::Bool))
    }

    #[must_use]
    pub fn int(name: impl Into<String>) -> Self {
        Self::new(name, FieldShape::Single(TypeRef::Int))
    }

    #[must_use]
    pub fn float(name: impl Into<String>) -> Self {
        Self::new(name, FieldShape::Single(TypeRef::Float))
    }

    #[must_use]
    pub fn text(name: impl Into<String>) -> Self {
        Self::new(name, FieldShape::Single(TypeRef::Text))
    }

    #[must_use]
    pub fn model(name: impl Into<String>, path: impl Into<String>) -> Self {
        Self::new(name, FieldShape::Single(TypeRef::Model(path.into())))
    }

    #[must_use]
    pub fn list(name: impl Into<String>, element: TypeRef) -> Self {
        Self::new(name, FieldShape::List(element))
    }

    #[must_use]
    pub fn set(name: impl Into<String>, element: TypeRef) -> Self {
        Self::new(name, FieldShape::Set(element))
    }

    #[must_use]
    pub fn map(name: impl Into<String>, value: TypeRef) -> Self {
        Self::new(name, FieldShape::Map { value })
    }

    // modifiers

    /// Mark the field as required for default validation.
    #[must_use]
    pub const fn required(mut self) -> Self {
        self.required = true;
        self
    }

    /// Exclude the field from copy, merge, and default validation.
    #[must_use]
    pub const fn transient(mut self) -> Self {
        self.role = FieldRole::Transient;
        self
    }

    /// Mark the field as schema-internal builder state.
    #[must_use]
    pub const fn builder(mut self) -> Self {
        self.role = FieldRole::Builder;
        self
    }

    #[must_use]
    pub fn default_value(mut self, literal: impl Into<Literal>) -> Self {
        self.default = Some(literal.into());
        self
    }

    #[must_use]
    pub const fn overwrite_single(mut self, strategy: SingleStrategy) -> Self {
        self.overwrite.single = Declared::Use(strategy);
        self
    }

    #[must_use]
    pub const fn overwrite_collection(mut self, strategy: CollectionStrategy) -> Self {
        self.overwrite.collection = Declared::Use(strategy);
        self
    }

    #[must_use]
    pub const fn overwrite_map(mut self, strategy: MapStrategy) -> Self {
        self.overwrite.map = Declared::Use(strategy);
        self
    }
}
