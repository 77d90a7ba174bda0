use crate::{
    node::FieldDef,
    strategy::OverwriteDefaults,
    types::{FieldRole, FieldShape, TypeRef},
};
use serde::Serialize;

///
/// ModelDef
///
/// One declared model type. The path is the schema-wide identity and the
/// unit of inheritance: a child names its parent's path and the build step
/// computes the full level chain.
///

#[derive(Clone, Debug, Serialize)]
pub struct ModelDef {
    pub path: String,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub parent: Option<String>,

    pub is_abstract: bool,
    pub overwrite: OverwriteDefaults,
    pub fields: Vec<FieldDef>,
}

impl ModelDef {
    #[must_use]
    pub fn new(path: impl Into<String>) -> Self {
        Self {
            path: path.into(),
            parent: None,
            is_abstract: false,
            overwrite: OverwriteDefaults::default(),
            fields: Vec::new(),
        }
    }

    #[must_use]
    pub fn parent(mut self, path: impl Into<String>) -> Self {
        self.parent = Some(path.into());
        self
    }

    /// Abstract models cannot be created directly, only as templates.
    #[must_use]
    pub const fn abstract_model(mut self) -> Self {
        self.is_abstract = true;
        self
    }

    /// Class-level strategy defaults for fields declared at this level.
    #[must_use]
    pub const fn overwrite(mut self, defaults: OverwriteDefaults) -> Self {
        self.overwrite = defaults;
        self
    }

    #[must_use]
    pub fn field(mut self, field: FieldDef) -> Self {
        self.fields.push(field);
        self
    }

    /// Declare the key field: an immutable text identity assigned once.
    #[must_use]
    pub fn key(mut self, name: impl Into<String>) -> Self {
        let mut field = FieldDef::new(name, FieldShape::Single(TypeRef::Text));
        field.role = FieldRole::Key;
        self.fields.push(field);
        self
    }

    /// Declare the owner field: a write-once back-reference to an
    /// embedding instance of the given model type.
    #[must_use]
    pub fn owner(mut self, name: impl Into<String>, model: impl Into<String>) -> Self {
        let mut field = FieldDef::new(name, FieldShape::Single(TypeRef::Model(model.into())));
        field.role = FieldRole::Owner;
        self.fields.push(field);
        self
    }

    /// Locally declared field by name.
    #[must_use]
    pub fn get_field(&self, name: &str) -> Option<&FieldDef> {
        self.fields.iter().find(|f| f.name == name)
    }
}
