use crate::{error::Error, instance::Instance};
use forma_schema::build::ModelInfo;
use std::{cell::RefCell, collections::BTreeMap, fmt};

///
/// TemplateRegistry
///
/// Per-model storage of the currently active prototype instances. One
/// template per model path; a later registration replaces the earlier one
/// and there is no automatic expiry.
///
/// The registry is the one piece of shared mutable state the runtime
/// carries. It is injected into the factory rather than reached as a
/// global, and it is single-threaded like everything else here; callers
/// who create instances concurrently must register templates up front.
///

#[derive(Default)]
pub struct TemplateRegistry {
    templates: RefCell<BTreeMap<String, Instance>>,
}

impl TemplateRegistry {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Register `template` as the active template for `path`. The template
    /// must carry `path` as one of its levels; a template built for an
    /// abstract level is registered under that level, not under the
    /// stand-in's concrete path.
    pub fn register(&self, path: &str, template: Instance) -> Result<Option<Instance>, Error> {
        if !template.is_instance_of(path) {
            return Err(Error::TemplateMismatch {
                model: path.to_string(),
                found: template.path().to_string(),
            });
        }

        Ok(self
            .templates
            .borrow_mut()
            .insert(path.to_string(), template))
    }

    /// Remove and return the active template for `path`.
    pub fn unregister(&self, path: &str) -> Option<Instance> {
        self.templates.borrow_mut().remove(path)
    }

    #[must_use]
    pub fn get(&self, path: &str) -> Option<Instance> {
        self.templates.borrow().get(path).cloned()
    }

    /// The templates that seed a new instance of `model`: one per level
    /// that has a registration, ancestor-first. Specific templates are
    /// applied after ancestor ones and can override field-by-field.
    #[must_use]
    pub fn chain_for(&self, model: &ModelInfo) -> Vec<Instance> {
        let templates = self.templates.borrow();
        model
            .levels
            .iter()
            .filter_map(|level| templates.get(&level.path).cloned())
            .collect()
    }

    /// Run `f` with `template` registered for `path`, then restore
    /// whatever registration was active before, pass or fail.
    pub fn with_template<R>(
        &self,
        path: &str,
        template: Instance,
        f: impl FnOnce() -> Result<R, Error>,
    ) -> Result<R, Error> {
        let previous = self.register(path, template)?;

        let result = f();

        match previous {
            Some(prev) => {
                self.templates
                    .borrow_mut()
                    .insert(path.to_string(), prev);
            }
            None => {
                self.templates.borrow_mut().remove(path);
            }
        }

        result
    }

    pub fn clear(&self) {
        self.templates.borrow_mut().clear();
    }

    #[must_use]
    pub fn len(&self) -> usize {
        self.templates.borrow().len()
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.templates.borrow().is_empty()
    }
}

impl fmt::Debug for TemplateRegistry {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("TemplateRegistry")
            .field("models", &self.templates.borrow().keys().collect::<Vec<_>>())
            .finish()
    }
}

///
/// TESTS
///

#[cfg(test)]
mod tests {
    use super::*;
    use crate::test_fixtures::fixture;

    #[test]
    fn last_registration_wins() {
        let fx = fixture();
        let registry = TemplateRegistry::new();

        let first = fx.stub("Service", Some("a"));
        let second = fx.stub("Service", Some("b"));

        assert!(registry
            .register("Service", first)
            .expect("register")
            .is_none());
        let replaced = registry
            .register("Service", second.clone())
            .expect("register");
        assert_eq!(replaced.expect("previous").key(), Some("a"));
        assert!(Instance::ptr_eq(
            &registry.get("Service").expect("active"),
            &second
        ));
    }

    #[test]
    fn chain_runs_ancestor_first() {
        let fx = fixture();
        let registry = TemplateRegistry::new();

        let base = fx.stub("Resource", None);
        let specific = fx.stub("Service", Some("t"));
        registry.register("Resource", base).expect("register");
        registry.register("Service", specific).expect("register");

        let model = fx.registry.schema().get("Service").expect("model");
        let chain = registry.chain_for(model);
        assert_eq!(chain.len(), 2);
        assert_eq!(chain[0].path(), "Resource");
        assert_eq!(chain[1].path(), "Service");
    }

    #[test]
    fn registration_checks_the_level() {
        let fx = fixture();
        let registry = TemplateRegistry::new();

        let env = fx.stub("Env", Some("e"));
        let err = registry.register("Service", env).unwrap_err();
        assert!(matches!(err, Error::TemplateMismatch { .. }));
    }

    #[test]
    fn scoped_registration_restores_the_previous_template() {
        let fx = fixture();
        let registry = TemplateRegistry::new();

        let outer = fx.stub("Service", Some("outer"));
        let inner = fx.stub("Service", Some("inner"));
        registry.register("Service", outer).expect("register");

        registry
            .with_template("Service", inner, || {
                assert_eq!(
                    registry.get("Service").expect("active").key(),
                    Some("inner")
                );
                Ok(())
            })
            .expect("scoped run");

        assert_eq!(registry.get("Service").expect("active").key(), Some("outer"));
    }
}
