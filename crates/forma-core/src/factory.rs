use crate::{
    error::Error,
    instance::Instance,
    merge,
    registry::ModelRegistry,
    template::TemplateRegistry,
    value::Value,
};
use derive_more::{Deref, DerefMut, IntoIterator};
use forma_schema::types::FieldShape;
use std::{collections::BTreeMap, ops, rc::Rc};

///
/// Values
///
/// Named-values map applied during creation, one setter call per entry in
/// map order. Setters are independently idempotent, so ordering between
/// distinct fields never matters. Usually built with the [`values!`]
/// macro.
///

#[derive(Clone, Debug, Default, Deref, DerefMut, IntoIterator)]
pub struct Values(BTreeMap<String, Value>);

impl Values {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    #[must_use]
    pub fn with(mut self, name: impl Into<String>, value: impl Into<Value>) -> Self {
        self.0.insert(name.into(), value.into());
        self
    }
}

///
/// Mutator
///
/// The mutation surface handed to creation callbacks and scripts. It
/// dereferences to the instance under construction for the checked
/// set/add/put operations, and adds nested creation: child instances are
/// built through the full factory pipeline, wired to this instance as
/// their owner on insert.
///

pub struct Mutator<'a> {
    factory: &'a Factory,
    instance: &'a Instance,
}

impl Mutator<'_> {
    #[must_use]
    pub const fn instance(&self) -> &Instance {
        self.instance
    }

    /// Create a child for a single model-typed field and set it. `key`
    /// must agree with the child model's key declaration.
    pub fn set_new(
        &self,
        field: &str,
        key: Option<&str>,
        values: Values,
    ) -> Result<Instance, Error> {
        self.set_new_with(field, key, values, NoMutation)
    }

    pub fn set_new_with(
        &self,
        field: &str,
        key: Option<&str>,
        values: Values,
        mutate: impl Mutate,
    ) -> Result<Instance, Error> {
        let path = self.element_model(field, FieldShape::is_single, "single model field")?;
        let child = self.factory.create_with(&path, key, values, mutate)?;
        self.instance
            .set_property(field, Value::Model(child.clone()))?;

        Ok(child)
    }

    /// Create a child for a model-typed list or set field and append it.
    pub fn add_new(
        &self,
        field: &str,
        key: Option<&str>,
        values: Values,
    ) -> Result<Instance, Error> {
        self.add_new_with(field, key, values, NoMutation)
    }

    pub fn add_new_with(
        &self,
        field: &str,
        key: Option<&str>,
        values: Values,
        mutate: impl Mutate,
    ) -> Result<Instance, Error> {
        let path = self.element_model(field, FieldShape::is_collection, "list or set field")?;
        let child = self.factory.create_with(&path, key, values, mutate)?;
        self.instance
            .add_element(field, Value::Model(child.clone()))?;

        Ok(child)
    }

    /// Create a child under a map key. For keyed element types the map
    /// key becomes the child's key.
    pub fn put_new(&self, field: &str, key: &str, values: Values) -> Result<Instance, Error> {
        self.put_new_with(field, key, values, NoMutation)
    }

    pub fn put_new_with(
        &self,
        field: &str,
        key: &str,
        values: Values,
        mutate: impl Mutate,
    ) -> Result<Instance, Error> {
        let path = self.element_model(field, FieldShape::is_map, "map field")?;

        let child_key = self
            .factory
            .registry
            .type_info(&path)?
            .model
            .is_keyed()
            .then_some(key);
        let child = self.factory.create_with(&path, child_key, values, mutate)?;
        self.instance
            .put_entry(field, key, Value::Model(child.clone()))?;

        Ok(child)
    }

    /// Resolve a nested-creation field to its element model path.
    fn element_model(
        &self,
        name: &str,
        shape_ok: fn(&FieldShape) -> bool,
        expected: &str,
    ) -> Result<String, Error> {
        let Some(field) = self.instance.model().field(name) else {
            return Err(Error::UnknownField {
                model: self.instance.path().to_string(),
                field: name.to_string(),
            });
        };

        if !shape_ok(&field.shape) {
            return Err(Error::TypeMismatch {
                field: name.to_string(),
                expected: expected.to_string(),
                found: field.shape.label().to_string(),
            });
        }

        field
            .shape
            .element()
            .model_path()
            .map(str::to_string)
            .ok_or_else(|| Error::NotModelTyped {
                model: self.instance.path().to_string(),
                field: name.to_string(),
            })
    }
}

impl ops::Deref for Mutator<'_> {
    type Target = Instance;

    fn deref(&self) -> &Instance {
        self.instance
    }
}

///
/// Mutate
///
/// Caller-supplied mutation applied after the named values, against the
/// [`Mutator`] surface. Closures implement it directly.
///

pub trait Mutate {
    fn apply(&self, mutator: &Mutator<'_>) -> Result<(), Error>;
}

impl<F: Fn(&Mutator<'_>) -> Result<(), Error>> Mutate for F {
    fn apply(&self, mutator: &Mutator<'_>) -> Result<(), Error> {
        self(mutator)
    }
}

/// No mutation; used by the plain creation entry points.
pub struct NoMutation;

impl Mutate for NoMutation {
    fn apply(&self, _: &Mutator<'_>) -> Result<(), Error> {
        Ok(())
    }
}

///
/// ScriptRunner
///
/// External script-execution collaborator. The runner receives the live
/// instance's mutation surface; for keyed models its name becomes the
/// instance key.
///

pub trait ScriptRunner {
    /// Script name, used as the key for keyed models.
    fn name(&self) -> Option<&str>;

    fn run(&self, mutator: &Mutator<'_>) -> Result<(), Error>;
}

///
/// Factory
///
/// The creation pipeline: allocate, seed from the registered template
/// chain, post-create, apply named values, apply the mutation callback,
/// post-apply, validate. The ordering is load-bearing: template values
/// must be visible to post-create hooks, and user mutation must land
/// after template seeding so templates act as defaults, never overrides.
///
/// The template registry is injected, not ambient. Callers that create
/// instances concurrently must finish registering templates first.
///

#[derive(Clone)]
pub struct Factory {
    registry: Rc<ModelRegistry>,
    templates: Rc<TemplateRegistry>,
}

impl Factory {
    #[must_use]
    pub const fn new(registry: Rc<ModelRegistry>, templates: Rc<TemplateRegistry>) -> Self {
        Self {
            registry,
            templates,
        }
    }

    #[must_use]
    pub const fn registry(&self) -> &Rc<ModelRegistry> {
        &self.registry
    }

    #[must_use]
    pub const fn templates(&self) -> &Rc<TemplateRegistry> {
        &self.templates
    }

    /// Create a fully-initialized instance. `key` presence must agree
    /// with the model's key declaration.
    pub fn create(&self, path: &str, key: Option<&str>, values: Values) -> Result<Instance, Error> {
        self.create_with(path, key, values, NoMutation)
    }

    /// [`Factory::create`] with a mutation callback applied after the
    /// named values.
    pub fn create_with(
        &self,
        path: &str,
        key: Option<&str>,
        values: Values,
        mutate: impl Mutate,
    ) -> Result<Instance, Error> {
        let instance = self.allocate_checked(path, key)?;
        self.run_pipeline(&instance, values, &mutate)?;

        if !instance.skips_post_apply() {
            instance.invoke_post_apply()?;
        }
        if !instance.is_manual_validation() {
            instance.validate()?;
        }

        Ok(instance)
    }

    /// Create a prototype for template registration: no key, no
    /// post-apply, manual validation forced. An incomplete prototype must
    /// not be validated as if complete. Abstract models are allowed; the
    /// result is the minimal stand-in carrying the abstract level's
    /// fields.
    pub fn create_as_template(&self, path: &str, values: Values) -> Result<Instance, Error> {
        self.create_as_template_with(path, values, NoMutation)
    }

    pub fn create_as_template_with(
        &self,
        path: &str,
        values: Values,
        mutate: impl Mutate,
    ) -> Result<Instance, Error> {
        let info = self.registry.type_info(path)?;
        let instance = Instance::allocate(info, None);
        instance.set_manual_validation(true);
        instance.set_skip_post_apply(true);

        self.run_pipeline(&instance, values, &mutate)?;

        Ok(instance)
    }

    /// Allocate identity only, for forward declaration. The body is
    /// expected to be filled in later, so post-apply and validation are
    /// deferred until then.
    pub fn create_as_stub(&self, path: &str, key: Option<&str>) -> Result<Instance, Error> {
        let instance = self.allocate_checked(path, key)?;
        instance.set_manual_validation(true);
        instance.set_skip_post_apply(true);

        Ok(instance)
    }

    /// Create through an external script collaborator. For keyed models
    /// the script's name becomes the key.
    pub fn create_from_script(
        &self,
        path: &str,
        runner: &dyn ScriptRunner,
    ) -> Result<Instance, Error> {
        let key = self
            .registry
            .type_info(path)?
            .model
            .is_keyed()
            .then(|| runner.name())
            .flatten();

        let instance = self.allocate_checked(path, key)?;
        self.seed_from_templates(&instance)?;
        instance.invoke_post_create()?;

        runner.run(&Mutator {
            factory: self,
            instance: &instance,
        })?;

        if !instance.skips_post_apply() {
            instance.invoke_post_apply()?;
        }
        if !instance.is_manual_validation() {
            instance.validate()?;
        }

        Ok(instance)
    }

    // pipeline pieces

    fn allocate_checked(&self, path: &str, key: Option<&str>) -> Result<Instance, Error> {
        let info = self.registry.type_info(path)?;

        if info.model.is_abstract {
            return Err(Error::NotInstantiable {
                model: path.to_string(),
            });
        }
        match (info.model.is_keyed(), key) {
            (true, None) => {
                return Err(Error::KeyRequired {
                    model: path.to_string(),
                });
            }
            (false, Some(_)) => {
                return Err(Error::KeyNotAllowed {
                    model: path.to_string(),
                });
            }
            _ => {}
        }

        Ok(Instance::allocate(info, key.map(str::to_string)))
    }

    fn run_pipeline(
        &self,
        instance: &Instance,
        values: Values,
        mutate: &dyn Mutate,
    ) -> Result<(), Error> {
        self.seed_from_templates(instance)?;
        instance.invoke_post_create()?;

        for (name, value) in values {
            instance.set_property(&name, value)?;
        }
        mutate.apply(&Mutator {
            factory: self,
            instance,
        })?;

        Ok(())
    }

    fn seed_from_templates(&self, instance: &Instance) -> Result<(), Error> {
        for template in self.templates.chain_for(instance.model()) {
            merge::copy_into(instance, &template)?;
        }

        Ok(())
    }
}

///
/// TESTS
///

#[cfg(test)]
mod tests {
    use super::*;
    use crate::test_fixtures::fixture;

    fn factory() -> Factory {
        let fx = fixture();
        Factory::new(fx.registry, fx.templates)
    }

    #[test]
    fn key_contract_is_enforced() {
        let factory = factory();

        let err = factory.create("Env", None, Values::new()).unwrap_err();
        assert!(matches!(err, Error::KeyRequired { .. }));

        let env = factory
            .create("Env", Some("e1"), Values::new().with("name", "prod"))
            .expect("keyed create");
        assert_eq!(env.key(), Some("e1"));
        assert_eq!(env.get_property("id").expect("id"), Value::from("e1"));
    }

    #[test]
    fn abstract_models_are_not_instantiable() {
        let factory = factory();
        let err = factory
            .create("Resource", Some("r"), Values::new())
            .unwrap_err();
        assert!(matches!(err, Error::NotInstantiable { .. }));

        // But a template stand-in for the abstract level is allowed.
        let template = factory
            .create_as_template("Resource", Values::new().with("name", "base"))
            .expect("abstract template");
        assert!(template.is_instance_of("Resource"));
    }

    #[test]
    fn values_are_applied_through_the_property_surface() {
        let factory = factory();
        let err = factory
            .create("Env", Some("e1"), Values::new().with("nope", 1i64))
            .unwrap_err();
        assert!(matches!(err, Error::UnknownField { .. }));
    }

    #[test]
    fn mutation_runs_after_named_values() {
        let factory = factory();
        let env = factory
            .create_with(
                "Env",
                Some("e1"),
                Values::new().with("name", "from-values"),
                |m: &Mutator| m.set_property("name", Value::from("from-mutate")),
            )
            .expect("create");

        assert_eq!(
            env.get_property("name").expect("name"),
            Value::from("from-mutate")
        );
    }

    #[test]
    fn create_validates_but_template_creation_never_does() {
        let factory = factory();

        // "name" is required and empty.
        let err = factory.create("Env", Some("e1"), Values::new()).unwrap_err();
        assert!(matches!(err, Error::Validation { .. }));

        factory
            .create_as_template("Env", Values::new())
            .expect("templates skip validation");
    }

    #[test]
    fn stubs_defer_everything_after_allocation() {
        let factory = factory();
        let stub = factory.create_as_stub("Env", Some("later")).expect("stub");

        assert_eq!(stub.key(), Some("later"));
        assert!(stub.is_manual_validation());
        assert!(stub.validate().is_err());
    }

    #[test]
    fn template_seeding_precedes_user_mutation() {
        let factory = factory();

        let template = factory
            .create_as_template("Env", Values::new().with("name", "default"))
            .expect("template");
        factory
            .templates()
            .register("Env", template)
            .expect("register");

        let seeded = factory
            .create("Env", Some("a"), Values::new())
            .expect("create");
        assert_eq!(seeded.get_property("name").expect("name"), Value::from("default"));

        let overridden = factory
            .create("Env", Some("b"), Values::new().with("name", "custom"))
            .expect("create");
        assert_eq!(
            overridden.get_property("name").expect("name"),
            Value::from("custom")
        );
    }

    #[test]
    fn put_new_derives_the_child_key_from_the_map_slot() {
        let factory = factory();

        let env = factory
            .create_with("Env", Some("e1"), Values::new().with("name", "prod"), |m: &Mutator| {
                m.put_new("services", "svc", Values::new().with("name", "api"))?;
                Ok(())
            })
            .expect("create");

        let services = env.get_property("services").expect("services");
        let Value::Map(m) = services else {
            panic!("map expected");
        };
        let child = m.get("svc").and_then(Value::as_model).expect("child");

        assert_eq!(child.key(), Some("svc"));
        assert_eq!(child.get_property("id").expect("id"), Value::from("svc"));
        let owner = child.owner().expect("owner wired");
        assert!(Instance::ptr_eq(&owner, &env));
    }

    #[test]
    fn set_new_fills_a_single_model_field() {
        let factory = factory();

        let env = factory
            .create_with("Env", Some("e1"), Values::new().with("name", "prod"), |m: &Mutator| {
                let gateway =
                    m.set_new("gateway", Some("gw"), Values::new().with("name", "edge"))?;
                assert_eq!(gateway.key(), Some("gw"));
                Ok(())
            })
            .expect("create");

        let gateway = env.get_property("gateway").expect("gateway");
        let child = gateway.as_model().expect("model value");
        assert_eq!(child.key(), Some("gw"));
        let owner = child.owner().expect("owner wired");
        assert!(Instance::ptr_eq(&owner, &env));
    }

    #[test]
    fn add_new_appends_to_a_model_collection() {
        let factory = factory();

        let env = factory
            .create_with("Env", Some("e1"), Values::new().with("name", "prod"), |m: &Mutator| {
                m.add_new("jobs", Some("job1"), Values::new().with("name", "sync"))?;
                m.add_new("jobs", Some("job2"), Values::new().with("name", "purge"))?;
                Ok(())
            })
            .expect("create");

        let jobs = env.get_property("jobs").expect("jobs");
        let Value::List(xs) = jobs else {
            panic!("list expected");
        };
        let keys: Vec<Option<&str>> = xs
            .iter()
            .map(|v| v.as_model().and_then(Instance::key))
            .collect();
        assert_eq!(keys, vec![Some("job1"), Some("job2")]);
    }

    #[test]
    fn nested_creation_rejects_non_model_fields() {
        let factory = factory();

        let err = factory
            .create_with("Env", Some("e1"), Values::new().with("name", "prod"), |m: &Mutator| {
                m.put_new("settings", "a", Values::new())?;
                Ok(())
            })
            .unwrap_err();
        assert!(matches!(err, Error::NotModelTyped { .. }));
    }

    #[test]
    fn nested_children_run_the_full_pipeline() {
        let factory = factory();

        // "name" is required on Service; the child must be validated.
        let err = factory
            .create_with("Env", Some("e1"), Values::new().with("name", "prod"), |m: &Mutator| {
                m.put_new("services", "svc", Values::new())?;
                Ok(())
            })
            .unwrap_err();
        assert!(matches!(err, Error::Validation { .. }));
    }

    #[test]
    fn scripts_supply_the_key_and_the_body() {
        struct DeployScript;

        impl ScriptRunner for DeployScript {
            fn name(&self) -> Option<&str> {
                Some("deploy")
            }

            fn run(&self, mutator: &Mutator<'_>) -> Result<(), Error> {
                mutator.set_property("name", Value::from("deployed"))?;
                mutator.put_new("services", "svc", Values::new().with("name", "api"))?;
                Ok(())
            }
        }

        let factory = factory();
        let env = factory
            .create_from_script("Env", &DeployScript)
            .expect("script create");

        assert_eq!(env.key(), Some("deploy"));
        assert_eq!(env.get_property("name").expect("name"), Value::from("deployed"));

        let services = env.get_property("services").expect("services");
        let Value::Map(m) = services else {
            panic!("map expected");
        };
        assert!(m.contains_key("svc"));
    }
}
