//! Schema layer for Forma: declarative model/field nodes, build-time
//! validation, and resolution of overwrite strategies into the terminal
//! form consumed by the runtime.

pub mod build;
pub mod error;
pub mod node;
pub mod strategy;
pub mod types;
pub mod validate;

/// Maximum length for model schema identifiers.
pub const MAX_MODEL_PATH_LEN: usize = 128;

/// Maximum length for field schema identifiers.
pub const MAX_FIELD_NAME_LEN: usize = 64;

use crate::build::BuildError;
use thiserror::Error as ThisError;

///
/// Prelude
///

pub mod prelude {
    pub use crate::{
        build::{LevelInfo, ModelInfo, ResolvedField, Schema, SchemaBuilder},
        error::ErrorTree,
        node::{FieldDef, ModelDef},
        strategy::{
            CollectionStrategy, Declared, MapStrategy, OverwriteDefaults, ResolvedStrategy,
            SingleStrategy,
        },
        types::{FieldRole, FieldShape, Literal, TypeRef},
    };
    pub use serde::Serialize;
}

///
/// Error
///

#[derive(Debug, ThisError)]
pub enum Error {
    #[error(transparent)]
    BuildError(#[from] BuildError),
}
