//! Core runtime for Forma: dynamic values, model instances, the
//! copy/merge engine, the factory pipeline, and the template registry.

#[macro_use]
pub mod macros;

pub mod error;
pub mod factory;
pub mod instance;
pub mod merge;
pub mod registry;
pub mod template;
pub mod value;

// test
#[cfg(test)]
pub(crate) mod test_fixtures;

///
/// Prelude
///
/// Domain vocabulary for building and merging model graphs, plus the
/// schema-layer declaration types.
///

pub mod prelude {
    pub use crate::{
        error::Error,
        factory::{Factory, Mutate, Mutator, NoMutation, ScriptRunner, Values},
        instance::Instance,
        merge::copy_into,
        registry::ModelRegistry,
        template::TemplateRegistry,
        value::Value,
    };
    pub use forma_schema::prelude::*;
}
