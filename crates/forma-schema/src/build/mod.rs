use crate::{
    error::ErrorTree,
    node::{FieldDef, ModelDef},
    strategy::{
        CollectionStrategy, Declared, MapStrategy, OverwriteDefaults, ResolvedStrategy,
        SingleStrategy,
    },
    types::{FieldRole, FieldShape, Literal},
    validate,
};
use serde::Serialize;
use std::{collections::BTreeMap, sync::Arc};
use thiserror::Error as ThisError;

///
/// BuildError
///

#[derive(Debug, ThisError)]
pub enum BuildError {
    #[error("schema validation failed: {0}")]
    Validation(ErrorTree),
}

///
/// SchemaBuilder
///
/// Collects model declarations and produces a validated [`Schema`].
/// All problems are reported together in one [`ErrorTree`]; nothing is
/// deferred to merge time.
///

#[derive(Debug, Default)]
pub struct SchemaBuilder {
    defs: BTreeMap<String, ModelDef>,
    duplicates: Vec<String>,
}

impl SchemaBuilder {
    #[must_use]
    pub const fn new() -> Self {
        Self {
            defs: BTreeMap::new(),
            duplicates: Vec::new(),
        }
    }

    #[must_use]
    pub fn model(mut self, def: ModelDef) -> Self {
        let path = def.path.clone();
        if self.defs.insert(path.clone(), def).is_some() {
            self.duplicates.push(path);
        }
        self
    }

    pub fn build(self) -> Result<Schema, BuildError> {
        let mut errs = ErrorTree::new();

        for path in &self.duplicates {
            errs.add(path.clone(), "model path declared more than once");
        }

        for def in self.defs.values() {
            validate::validate_model(def, &self.defs, &mut errs);
        }

        // Chains require acyclic, resolvable parents; bail before resolution
        // when the declarations themselves are broken.
        errs = match errs.result() {
            Ok(()) => ErrorTree::new(),
            Err(errs) => return Err(BuildError::Validation(errs)),
        };

        let mut models = BTreeMap::new();
        for def in self.defs.values() {
            let chain = chain_of(def, &self.defs);
            validate::validate_chain(&chain, &mut errs);

            let info = resolve_model(def, &chain, &mut errs);
            models.insert(def.path.clone(), Arc::new(info));
        }

        errs.result().map_err(BuildError::Validation)?;

        Ok(Schema { models })
    }
}

/// Parent chain of a model, root-first, ending with the model itself.
fn chain_of<'a>(def: &'a ModelDef, defs: &'a BTreeMap<String, ModelDef>) -> Vec<&'a ModelDef> {
    let mut chain = vec![def];
    let mut current = def;

    while let Some(parent) = current.parent.as_ref().and_then(|p| defs.get(p)) {
        chain.push(parent);
        current = parent;
    }

    chain.reverse();
    chain
}

/// Resolve one model's chain into runtime metadata.
fn resolve_model(def: &ModelDef, chain: &[&ModelDef], errs: &mut ErrorTree) -> ModelInfo {
    let mut key_field = None;
    let mut owner_field = None;
    let mut levels = Vec::with_capacity(chain.len());

    for (index, level) in chain.iter().enumerate() {
        let mut fields = Vec::with_capacity(level.fields.len());

        for field in &level.fields {
            match field.role {
                FieldRole::Key => key_field = Some(field.name.clone()),
                FieldRole::Owner => owner_field = Some(field.name.clone()),
                _ => {}
            }

            let strategy = resolve_strategy(field, &chain[..=index]);
            validate::validate_resolved(level, field, strategy, errs);

            fields.push(ResolvedField {
                name: field.name.clone(),
                shape: field.shape.clone(),
                role: field.role,
                required: field.required,
                default: field.default.clone(),
                strategy,
            });
        }

        levels.push(LevelInfo {
            path: level.path.clone(),
            fields,
        });
    }

    ModelInfo {
        path: def.path.clone(),
        is_abstract: def.is_abstract,
        key_field,
        owner_field,
        levels,
    }
}

/// Resolve a field's declared strategy to its terminal form: the field's
/// own declaration first, then class-level defaults from the declaring
/// level outward, then the hard default for the shape.
fn resolve_strategy(field: &FieldDef, enclosing: &[&ModelDef]) -> ResolvedStrategy {
    fn lookup<T: Copy>(
        declared: Declared<T>,
        enclosing: &[&ModelDef],
        slot: impl Fn(&OverwriteDefaults) -> Declared<T>,
        default: T,
    ) -> T {
        if let Some(strategy) = declared.concrete() {
            return strategy;
        }
        enclosing
            .iter()
            .rev()
            .find_map(|level| slot(&level.overwrite).concrete())
            .unwrap_or(default)
    }

    match &field.shape {
        FieldShape::Single(_) => ResolvedStrategy::Single(lookup(
            field.overwrite.single,
            enclosing,
            |o| o.single,
            SingleStrategy::DEFAULT,
        )),
        FieldShape::List(_) | FieldShape::Set(_) => ResolvedStrategy::Collection(lookup(
            field.overwrite.collection,
            enclosing,
            |o| o.collection,
            CollectionStrategy::DEFAULT,
        )),
        FieldShape::Map { .. } => ResolvedStrategy::Map(lookup(
            field.overwrite.map,
            enclosing,
            |o| o.map,
            MapStrategy::DEFAULT,
        )),
    }
}

///
/// Schema
///
/// Immutable, validated output of a build. Shared by reference with the
/// runtime; never mutated afterwards.
///

#[derive(Clone, Debug, Serialize)]
pub struct Schema {
    models: BTreeMap<String, Arc<ModelInfo>>,
}

impl Schema {
    #[must_use]
    pub fn get(&self, path: &str) -> Option<&Arc<ModelInfo>> {
        self.models.get(path)
    }

    pub fn models(&self) -> impl Iterator<Item = &Arc<ModelInfo>> {
        self.models.values()
    }

    #[must_use]
    pub fn len(&self) -> usize {
        self.models.len()
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.models.is_empty()
    }
}

///
/// ModelInfo
///
/// Resolved runtime metadata for one model: the ordered level chain
/// (root-first), the key/owner field names, and every field with its
/// terminal strategy. Computed once at build time.
///

#[derive(Clone, Debug, Serialize)]
pub struct ModelInfo {
    pub path: String,
    pub is_abstract: bool,
    pub key_field: Option<String>,
    pub owner_field: Option<String>,
    pub levels: Vec<LevelInfo>,
}

impl ModelInfo {
    #[must_use]
    pub const fn is_keyed(&self) -> bool {
        self.key_field.is_some()
    }

    /// Whether this model carries the given path as one of its levels.
    #[must_use]
    pub fn is_level(&self, path: &str) -> bool {
        self.levels.iter().any(|level| level.path == path)
    }

    /// Field lookup across the chain, most specific level first.
    #[must_use]
    pub fn field(&self, name: &str) -> Option<&ResolvedField> {
        self.levels
            .iter()
            .rev()
            .find_map(|level| level.fields.iter().find(|f| f.name == name))
    }

    /// All fields across all levels, root-first.
    pub fn fields(&self) -> impl Iterator<Item = &ResolvedField> {
        self.levels.iter().flat_map(|level| level.fields.iter())
    }
}

///
/// LevelInfo
///

#[derive(Clone, Debug, Serialize)]
pub struct LevelInfo {
    pub path: String,
    pub fields: Vec<ResolvedField>,
}

///
/// ResolvedField
///

#[derive(Clone, Debug, Serialize)]
pub struct ResolvedField {
    pub name: String,
    pub shape: FieldShape,
    pub role: FieldRole,
    pub required: bool,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub default: Option<Literal>,

    pub strategy: ResolvedStrategy,
}

///
/// TESTS
///
