//! Build-time schema validation. Everything here reports into an
//! [`ErrorTree`]; nothing is ever deferred to merge time.

use crate::{
    MAX_FIELD_NAME_LEN, MAX_MODEL_PATH_LEN,
    error::ErrorTree,
    node::{FieldDef, ModelDef},
    strategy::{Declared, MapStrategy, ResolvedStrategy},
    types::{FieldRole, FieldShape, TypeRef},
};
use std::collections::{BTreeMap, BTreeSet};

/// Structural and local invariants for one model declaration.
pub(crate) fn validate_model(
    def: &ModelDef,
    defs: &BTreeMap<String, ModelDef>,
    errs: &mut ErrorTree,
) {
    validate_path(def, errs);
    validate_parent(def, defs, errs);

    let mut seen = BTreeSet::new();
    for field in &def.fields {
        let route = format!("{}.{}", def.path, field.name);

        if !seen.insert(field.name.as_str()) {
            errs.add(route.clone(), "field name declared more than once");
        }

        validate_field(def, field, defs, errs, &route);
    }
}

/// Chain-wide invariants: key/owner declared at most once, field names
/// unique across all levels.
pub(crate) fn validate_chain(chain: &[&ModelDef], errs: &mut ErrorTree) {
    let leaf = match chain.last() {
        Some(leaf) => leaf,
        None => return,
    };

    let mut keys = 0usize;
    let mut owners = 0usize;
    let mut seen: BTreeMap<&str, &str> = BTreeMap::new();

    for level in chain {
        for field in &level.fields {
            match field.role {
                FieldRole::Key => keys += 1,
                FieldRole::Owner => owners += 1,
                _ => {}
            }

            // Local duplicates are reported by validate_model; only flag
            // shadowing across distinct levels here.
            if let Some(previous) = seen.insert(field.name.as_str(), level.path.as_str())
                && previous != level.path.as_str()
            {
                errs.add(
                    format!("{}.{}", leaf.path, field.name),
                    format!("field shadows a field declared on ancestor '{previous}'"),
                );
            }
        }
    }

    if keys > 1 {
        errs.add(
            leaf.path.clone(),
            format!("key field declared {keys} times across the hierarchy"),
        );
    }
    if owners > 1 {
        errs.add(
            leaf.path.clone(),
            format!("owner field declared {owners} times across the hierarchy"),
        );
    }
}

/// Invariants that need the terminal strategy of a field.
pub(crate) fn validate_resolved(
    level: &ModelDef,
    field: &FieldDef,
    strategy: ResolvedStrategy,
    errs: &mut ErrorTree,
) {
    if strategy == ResolvedStrategy::Map(MapStrategy::MergeValues)
        && !field.shape.element().is_model()
    {
        errs.add(
            format!("{}.{}", level.path, field.name),
            "MergeValues requires a model-typed map value",
        );
    }
}

fn validate_path(def: &ModelDef, errs: &mut ErrorTree) {
    if def.path.is_empty() {
        errs.add("<schema>", "model path is empty");
    } else if def.path.len() > MAX_MODEL_PATH_LEN {
        errs.add(
            def.path.clone(),
            format!("model path exceeds max length {MAX_MODEL_PATH_LEN}"),
        );
    }
}

fn validate_parent(def: &ModelDef, defs: &BTreeMap<String, ModelDef>, errs: &mut ErrorTree) {
    let Some(parent) = &def.parent else { return };

    if !defs.contains_key(parent) {
        errs.add(def.path.clone(), format!("parent '{parent}' is not declared"));
        return;
    }

    // Cycle detection: the parent walk must terminate within the number of
    // declared models.
    let mut current = def;
    for _ in 0..=defs.len() {
        match current.parent.as_ref().and_then(|p| defs.get(p)) {
            Some(next) if next.path == def.path => {
                errs.add(def.path.clone(), "inheritance cycle detected");
                return;
            }
            Some(next) => current = next,
            None => return,
        }
    }
}

fn validate_field(
    def: &ModelDef,
    field: &FieldDef,
    defs: &BTreeMap<String, ModelDef>,
    errs: &mut ErrorTree,
    route: &str,
) {
    if field.name.is_empty() {
        errs.add(def.path.clone(), "field name is empty");
    } else if field.name.len() > MAX_FIELD_NAME_LEN {
        errs.add(
            route.to_string(),
            format!("field name exceeds max length {MAX_FIELD_NAME_LEN}"),
        );
    }

    // Role/shape contracts.
    match field.role {
        FieldRole::Key => {
            if field.shape != FieldShape::Single(TypeRef::Text) {
                errs.add(route.to_string(), "key field must be a single text value");
            }
            if field.default.is_some() {
                errs.add(route.to_string(), "key field cannot carry a default");
            }
        }
        FieldRole::Owner => {
            if !matches!(&field.shape, FieldShape::Single(ty) if ty.is_model()) {
                errs.add(route.to_string(), "owner field must be a single model reference");
            }
        }
        FieldRole::Transient | FieldRole::Builder => {
            if field.required {
                errs.add(
                    route.to_string(),
                    "required is only meaningful on normal fields",
                );
            }
        }
        FieldRole::Normal => {}
    }

    // Model references must resolve.
    if let Some(path) = field.shape.element().model_path()
        && !defs.contains_key(path)
    {
        errs.add(route.to_string(), format!("references undeclared model '{path}'"));
    }

    // Defaults apply to single scalar fields only.
    if let Some(default) = &field.default {
        match &field.shape {
            FieldShape::Single(ty) if !ty.is_model() => {
                if !default.conforms_to(ty) {
                    errs.add(route.to_string(), format!("default does not conform to {ty}"));
                }
            }
            _ => errs.add(
                route.to_string(),
                "defaults are only supported on single scalar fields",
            ),
        }
    }

    // A declared strategy must match the field's shape.
    let wrong_slot = match &field.shape {
        FieldShape::Single(_) => {
            field.overwrite.collection != Declared::Inherit
                || field.overwrite.map != Declared::Inherit
        }
        FieldShape::List(_) | FieldShape::Set(_) => {
            field.overwrite.single != Declared::Inherit || field.overwrite.map != Declared::Inherit
        }
        FieldShape::Map { .. } => {
            field.overwrite.single != Declared::Inherit
                || field.overwrite.collection != Declared::Inherit
        }
    };
    if wrong_slot {
        errs.add(
            route.to_string(),
            format!(
                "overwrite strategy does not match the {} field shape",
                field.shape.label()
            ),
        );
    }
}

///
/// TESTS
///

#[cfg(test)]
mod tests {
    use crate::{
        build::{BuildError, SchemaBuilder},
        node::{FieldDef, ModelDef},
        strategy::MapStrategy,
        types::TypeRef,
    };

    fn build_err(builder: SchemaBuilder) -> crate::error::ErrorTree {
        match builder.build() {
            Err(BuildError::Validation(errs)) => errs,
            Ok(_) => panic!("schema should not validate"),
        }
    }

    #[test]
    fn rejects_duplicate_key_in_hierarchy() {
        let errs = build_err(
            SchemaBuilder::new()
                .model(ModelDef::new("Base").key("id"))
                .model(ModelDef::new("Child").parent("Base").key("name")),
        );

        assert!(errs.get("Child").is_some(), "duplicate key should be flagged: {errs}");
    }

    #[test]
    fn rejects_merge_values_on_scalar_map() {
        let errs = build_err(SchemaBuilder::new().model(
            ModelDef::new("Env").field(
                FieldDef::map("limits", TypeRef::Int).overwrite_map(MapStrategy::MergeValues),
            ),
        ));

        assert!(errs.get("Env.limits").is_some(), "{errs}");
    }

    #[test]
    fn rejects_unknown_parent_and_model_reference_together() {
        let errs = build_err(
            SchemaBuilder::new().model(
                ModelDef::new("Service")
                    .parent("Ghost")
                    .field(FieldDef::model("db", "Database")),
            ),
        );

        assert!(errs.get("Service").is_some());
        assert!(errs.get("Service.db").is_some());
        assert_eq!(errs.len(), 2);
    }

    #[test]
    fn rejects_inheritance_cycle() {
        let errs = build_err(
            SchemaBuilder::new()
                .model(ModelDef::new("A").parent("B"))
                .model(ModelDef::new("B").parent("A")),
        );

        assert!(errs.get("A").is_some());
        assert!(errs.get("B").is_some());
    }

    #[test]
    fn rejects_owner_with_scalar_shape() {
        let mut field = FieldDef::text("parent");
        field.role = crate::types::FieldRole::Owner;

        let errs = build_err(SchemaBuilder::new().model(ModelDef::new("Env").field(field)));
        assert!(errs.get("Env.parent").is_some());
    }

    #[test]
    fn rejects_required_on_transient_and_builder_fields() {
        let errs = build_err(
            SchemaBuilder::new().model(
                ModelDef::new("Env")
                    .field(FieldDef::text("cache").transient().required())
                    .field(FieldDef::text("internal").builder().required()),
            ),
        );

        assert!(errs.get("Env.cache").is_some());
        assert!(errs.get("Env.internal").is_some());
    }

    #[test]
    fn rejects_default_on_collection() {
        let field = FieldDef::list("tags", TypeRef::Text).default_value("x");
        let errs = build_err(SchemaBuilder::new().model(ModelDef::new("Env").field(field)));

        assert!(errs.get("Env.tags").is_some());
    }

    #[test]
    fn rejects_strategy_on_wrong_shape() {
        let field =
            FieldDef::text("name").overwrite_map(MapStrategy::MergeKeys);
        let errs = build_err(SchemaBuilder::new().model(ModelDef::new("Env").field(field)));

        assert!(errs.get("Env.name").is_some());
    }

    #[test]
    fn rejects_field_shadowing_ancestor() {
        let errs = build_err(
            SchemaBuilder::new()
                .model(ModelDef::new("Base").field(FieldDef::text("name")))
                .model(
                    ModelDef::new("Child")
                        .parent("Base")
                        .field(FieldDef::int("name")),
                ),
        );

        assert!(errs.get("Child.name").is_some());
    }
}
