use crate::{error::Error, instance::Instance};
use forma_schema::build::{ModelInfo, Schema};
use std::{cell::RefCell, collections::BTreeMap, rc::Rc, sync::Arc};

///
/// Hook
///
/// Lifecycle callback bound to one schema level. Hooks receive the live
/// instance and may mutate it through the property surface.
///

pub type Hook = Rc<dyn Fn(&Instance) -> Result<(), Error>>;

///
/// Rule
///
/// Named custom validation check. A failing rule contributes one issue to
/// the validation report; it never aborts the remaining checks.
///

#[derive(Clone)]
pub struct Rule {
    pub name: String,
    pub check: Hook,
}

#[derive(Clone, Default)]
struct Behavior {
    post_create: Vec<Hook>,
    post_apply: Vec<Hook>,
    rules: Vec<Rule>,
}

///
/// TypeInfo
///
/// A model's schema joined with its runtime behaviors, hooks and rules
/// flattened over the whole chain ancestor-first. Shared by every instance
/// of the model.
///

pub struct TypeInfo {
    pub model: Arc<ModelInfo>,
    post_create: Vec<Hook>,
    post_apply: Vec<Hook>,
    rules: Vec<Rule>,
}

impl TypeInfo {
    pub(crate) fn post_create(&self) -> &[Hook] {
        &self.post_create
    }

    pub(crate) fn post_apply(&self) -> &[Hook] {
        &self.post_apply
    }

    pub(crate) fn rules(&self) -> &[Rule] {
        &self.rules
    }
}

///
/// ModelRegistry
///
/// The runtime view over a built [`Schema`]: resolves model paths to
/// [`TypeInfo`], and records the hooks and rules attached to each level.
///
/// Behaviors are registered per declaring level and apply to every model
/// whose chain includes that level. Registration invalidates the resolved
/// cache, so hooks added after instances exist still reach new instances.
///

pub struct ModelRegistry {
    schema: Schema,
    behaviors: RefCell<BTreeMap<String, Behavior>>,
    cache: RefCell<BTreeMap<String, Rc<TypeInfo>>>,
}

impl ModelRegistry {
    #[must_use]
    pub fn new(schema: Schema) -> Self {
        Self {
            schema,
            behaviors: RefCell::new(BTreeMap::new()),
            cache: RefCell::new(BTreeMap::new()),
        }
    }

    #[must_use]
    pub const fn schema(&self) -> &Schema {
        &self.schema
    }

    /// Register a post-create hook on the given level.
    pub fn on_post_create(
        &self,
        path: &str,
        hook: impl Fn(&Instance) -> Result<(), Error> + 'static,
    ) -> Result<(), Error> {
        self.with_behavior(path, |b| b.post_create.push(Rc::new(hook)))
    }

    /// Register a post-apply hook on the given level.
    pub fn on_post_apply(
        &self,
        path: &str,
        hook: impl Fn(&Instance) -> Result<(), Error> + 'static,
    ) -> Result<(), Error> {
        self.with_behavior(path, |b| b.post_apply.push(Rc::new(hook)))
    }

    /// Register a named validation rule on the given level.
    pub fn add_rule(
        &self,
        path: &str,
        name: &str,
        check: impl Fn(&Instance) -> Result<(), Error> + 'static,
    ) -> Result<(), Error> {
        self.with_behavior(path, |b| {
            b.rules.push(Rule {
                name: name.to_string(),
                check: Rc::new(check),
            });
        })
    }

    /// Resolve a concrete model path to its runtime type info, assembling
    /// the chain's behaviors ancestor-first.
    pub fn type_info(&self, path: &str) -> Result<Rc<TypeInfo>, Error> {
        if let Some(info) = self.cache.borrow().get(path) {
            return Ok(info.clone());
        }

        let model = self
            .schema
            .get(path)
            .ok_or_else(|| Error::UnknownModel {
                model: path.to_string(),
            })?
            .clone();

        let mut post_create = Vec::new();
        let mut post_apply = Vec::new();
        let mut rules = Vec::new();

        let behaviors = self.behaviors.borrow();
        for level in &model.levels {
            if let Some(b) = behaviors.get(&level.path) {
                post_create.extend(b.post_create.iter().cloned());
                post_apply.extend(b.post_apply.iter().cloned());
                rules.extend(b.rules.iter().cloned());
            }
        }
        drop(behaviors);

        let info = Rc::new(TypeInfo {
            model,
            post_create,
            post_apply,
            rules,
        });
        self.cache
            .borrow_mut()
            .insert(path.to_string(), info.clone());

        Ok(info)
    }

    fn with_behavior(&self, path: &str, f: impl FnOnce(&mut Behavior)) -> Result<(), Error> {
        if self.schema.get(path).is_none() {
            return Err(Error::UnknownModel {
                model: path.to_string(),
            });
        }

        f(self.behaviors.borrow_mut().entry(path.to_string()).or_default());

        // Assembled chains are stale now.
        self.cache.borrow_mut().clear();

        Ok(())
    }
}

///
/// TESTS
///
