use crate::{instance::Instance, registry::ModelRegistry, template::TemplateRegistry};
use forma_schema::prelude::*;
use std::rc::Rc;

///
/// Fixture
///
/// Shared model catalogue for unit tests: an abstract keyed `Resource`
/// root, a `Service` with an owner reference to `Env`, and an `Env` that
/// holds services in a key-merged map.
///

pub struct Fixture {
    pub registry: Rc<ModelRegistry>,
    pub templates: Rc<TemplateRegistry>,
}

impl Fixture {
    /// Bare allocation, bypassing the factory pipeline. Unit tests use
    /// this to get instances without lifecycle side effects; the factory
    /// has its own coverage.
    pub fn stub(&self, path: &str, key: Option<&str>) -> Instance {
        let info = self.registry.type_info(path).expect("model resolves");
        Instance::allocate(info, key.map(str::to_string))
    }
}

pub fn fixture() -> Fixture {
    let schema = schema();
    Fixture {
        registry: Rc::new(ModelRegistry::new(schema)),
        templates: Rc::new(TemplateRegistry::new()),
    }
}

pub fn schema() -> Schema {
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
                .field(FieldDef::list("endpoints", TypeRef::Text))
                .field(FieldDef::int("replicas").default_value(1i64))
                .field(FieldDef::text("note").overwrite_single(SingleStrategy::SetIfNull))
                .field(FieldDef::text("nickname").overwrite_single(SingleStrategy::AlwaysReplace))
                .field(FieldDef::text("cache").transient())
                .field(FieldDef::text("internal").builder()),
        )
        .model(
            ModelDef::new("Env")
                .key("id")
                .owner("parent", "Env")
                .field(FieldDef::text("name").required())
                .field(FieldDef::model("gateway", "Service"))
                .field(FieldDef::list("jobs", TypeRef::Model("Service".into())))
                .field(
                    FieldDef::map("services", TypeRef::Model("Service".into()))
                        .overwrite_map(MapStrategy::MergeKeys),
                )
                .field(FieldDef::map("settings", TypeRef::Text))
                .field(
                    FieldDef::map("annotations", TypeRef::Text)
                        .overwrite_map(MapStrategy::AddMissing),
                ),
        )
        .build()
        .expect("fixture schema is valid")
}
