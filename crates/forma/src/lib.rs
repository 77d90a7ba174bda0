//! Forma — schema-driven model graphs with templates, owners, and a
//! strategy-based copy/merge engine.
//!
//! This is the public meta-crate. Downstream users depend on **forma**
//! only.
//!
//! It re-exports the stable public API from:
//!   - `forma-schema`  (model declarations, strategy resolution, build)
//!   - `forma-core`    (instances, copy/merge, factory, templates)

pub use forma_core as core;
pub use forma_schema as schema;

//
// Macros
//

pub use forma_core::values;

//
// Prelude
//

pub mod prelude {
    pub use forma_core::prelude::*;
}
