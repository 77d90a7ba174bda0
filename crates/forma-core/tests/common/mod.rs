#![allow(dead_code)]

use forma_core::prelude::*;
use std::rc::Rc;

///
/// Shared catalogue for the integration suite: an abstract keyed
/// `Resource` root with `Service` below it, an `Env` holding services in
/// a key-merged map, an unkeyed `Widget`, and a `Bag` exercising the
/// additive and replacing container strategies.
///

pub fn catalogue() -> Schema {
    SchemaBuilder::new()
        .model(
            ModelDef::new("Resource")
                .abstract_model()
                .key("id")
                .field(FieldDef::text("name").required())
                .field(FieldDef::set("labels", TypeRef::Text)),
        )
        .model(
            ModelDef::new("Service")
                .parent("Resource")
                .owner("env", "Env")
                .field(FieldDef::text("url"))
                .field(
                    FieldDef::list("endpoints", TypeRef::Text)
                        .overwrite_collection(CollectionStrategy::Add),
                )
                .field(FieldDef::int("replicas").default_value(1i64)),
        )
        .model(
            ModelDef::new("Env")
                .key("id")
                .owner("parent", "Env")
                .field(FieldDef::text("name").required())
                .field(
                    FieldDef::map("services", TypeRef::Model("Service".into()))
                        .overwrite_map(MapStrategy::MergeValues),
                )
                .field(FieldDef::map("settings", TypeRef::Text)),
        )
        .model(
            ModelDef::new("Widget")
                .field(FieldDef::text("name").overwrite_single(SingleStrategy::Replace)),
        )
        .model(
            ModelDef::new("Bag")
                .field(
                    FieldDef::list("items", TypeRef::Int)
                        .overwrite_collection(CollectionStrategy::Add),
                )
                .field(FieldDef::list("pool", TypeRef::Int))
                .field(FieldDef::map("lookup", TypeRef::Text)),
        )
        .build()
        .expect("catalogue builds")
}

pub fn factory() -> Factory {
    Factory::new(
        Rc::new(ModelRegistry::new(catalogue())),
        Rc::new(TemplateRegistry::new()),
    )
}

/// Donor/target pair of the same unkeyed model, bypassing validation.
pub fn bag_pair(factory: &Factory) -> (Instance, Instance) {
    let target = factory.create_as_stub("Bag", None).expect("target stub");
    let donor = factory.create_as_stub("Bag", None).expect("donor stub");
    (target, donor)
}
