use crate::{
    error::{Error, ValidationIssue, ValidationIssues},
    merge,
    registry::TypeInfo,
    value::Value,
};
use forma_schema::{
    build::{ModelInfo, ResolvedField},
    types::{FieldRole, FieldShape},
};
use serde::ser::{Serialize, SerializeStruct, Serializer};
use std::{
    cell::{Cell, RefCell},
    collections::BTreeMap,
    fmt,
    rc::{Rc, Weak},
    sync::Arc,
};

///
/// Instance
///
/// A model instance and its proxy in one: the shared handle owns all
/// attribute state, the identity key, the write-once owner back-reference,
/// and the lifecycle flags. Nothing else in the runtime holds field state.
///
/// Instances are single-threaded by construction (`Rc`-based). Equality
/// compares type, key, and attributes; the owner never participates.
/// Identity comparisons use [`Instance::ptr_eq`].
///

#[derive(Clone)]
pub struct Instance {
    inner: Rc<InstanceInner>,
}

struct InstanceInner {
    info: Rc<TypeInfo>,
    key: Option<String>,
    attrs: RefCell<BTreeMap<String, Value>>,
    owner: RefCell<Option<Weak<InstanceInner>>>,
    manual_validation: Cell<bool>,
    skip_post_apply: Cell<bool>,
}

impl Instance {
    /// Allocate a bare instance: key assigned, collections initialized
    /// empty, scalar defaults applied. No hooks run here.
    pub(crate) fn allocate(info: Rc<TypeInfo>, key: Option<String>) -> Self {
        let mut attrs = BTreeMap::new();

        for field in info.model.fields() {
            if matches!(field.role, FieldRole::Key | FieldRole::Owner) {
                continue;
            }

            let initial = match &field.shape {
                FieldShape::Single(_) => {
                    field.default.as_ref().map_or(Value::Null, Value::from)
                }
                FieldShape::List(_) => Value::List(Vec::new()),
                FieldShape::Set(_) => Value::Set(Vec::new()),
                FieldShape::Map { .. } => Value::Map(BTreeMap::new()),
            };
            attrs.insert(field.name.clone(), initial);
        }

        Self {
            inner: Rc::new(InstanceInner {
                info,
                key,
                attrs: RefCell::new(attrs),
                owner: RefCell::new(None),
                manual_validation: Cell::new(false),
                skip_post_apply: Cell::new(false),
            }),
        }
    }

    // identity

    #[must_use]
    pub fn model(&self) -> &Arc<ModelInfo> {
        &self.inner.info.model
    }

    pub(crate) fn info(&self) -> &Rc<TypeInfo> {
        &self.inner.info
    }

    #[must_use]
    pub fn path(&self) -> &str {
        &self.inner.info.model.path
    }

    #[must_use]
    pub fn key(&self) -> Option<&str> {
        self.inner.key.as_deref()
    }

    /// Whether this instance carries the given model path as one of its
    /// schema levels.
    #[must_use]
    pub fn is_instance_of(&self, path: &str) -> bool {
        self.inner.info.model.is_level(path)
    }

    /// Reference identity, as opposed to structural equality.
    #[must_use]
    pub fn ptr_eq(a: &Self, b: &Self) -> bool {
        Rc::ptr_eq(&a.inner, &b.inner)
    }

    // owner

    /// The owning instance, when wired and still alive.
    #[must_use]
    pub fn owner(&self) -> Option<Self> {
        self.inner
            .owner
            .borrow()
            .as_ref()
            .and_then(Weak::upgrade)
            .map(|inner| Self { inner })
    }

    /// Wire the owner back-reference to `host` if this model declares an
    /// owner field, the owner is still unset, and `host` satisfies the
    /// declared owner type. Already-owned instances are left alone.
    pub(crate) fn wire_owner(&self, host: &Self) {
        let Some(owner_field) = self.model().owner_field.clone() else {
            return;
        };
        if self.inner.owner.borrow().is_some() {
            return;
        }

        let accepts = self
            .model()
            .field(&owner_field)
            .and_then(|f| f.shape.element().model_path())
            .is_some_and(|path| host.is_instance_of(path));

        if accepts {
            *self.inner.owner.borrow_mut() = Some(Rc::downgrade(&host.inner));
        }
    }

    /// Explicit owner assignment through the property surface: null is a
    /// no-op, a second assignment fails even with the same reference.
    fn set_owner(&self, field: &ResolvedField, value: Value) -> Result<(), Error> {
        match value {
            Value::Null => Ok(()),
            Value::Model(host) => {
                if self.inner.owner.borrow().is_some() {
                    return Err(Error::OwnerAlreadySet {
                        model: self.path().to_string(),
                    });
                }
                let declared = field.shape.element();
                if !Value::Model(host.clone()).conforms_to(declared) {
                    return Err(Error::TypeMismatch {
                        field: field.name.clone(),
                        expected: declared.to_string(),
                        found: host.path().to_string(),
                    });
                }
                *self.inner.owner.borrow_mut() = Some(Rc::downgrade(&host.inner));

                Ok(())
            }
            other => Err(Error::TypeMismatch {
                field: field.name.clone(),
                expected: field.shape.element().to_string(),
                found: other.kind_label(),
            }),
        }
    }

    // flags

    #[must_use]
    pub fn is_manual_validation(&self) -> bool {
        self.inner.manual_validation.get()
    }

    pub fn set_manual_validation(&self, on: bool) {
        self.inner.manual_validation.set(on);
    }

    #[must_use]
    pub(crate) fn skips_post_apply(&self) -> bool {
        self.inner.skip_post_apply.get()
    }

    pub(crate) fn set_skip_post_apply(&self, on: bool) {
        self.inner.skip_post_apply.set(on);
    }

    // raw attribute access (engine and constructors only)

    /// Raw read: no role dispatch, key and owner are not attributes.
    pub(crate) fn get_attribute(&self, name: &str) -> Result<Value, Error> {
        self.inner
            .attrs
            .borrow()
            .get(name)
            .cloned()
            .ok_or_else(|| self.unknown_field(name))
    }

    /// Raw write: bypasses role, shape, and element checks.
    pub(crate) fn set_attribute(&self, name: &str, value: Value) -> Result<(), Error> {
        let mut attrs = self.inner.attrs.borrow_mut();
        match attrs.get_mut(name) {
            Some(slot) => {
                *slot = value;
                Ok(())
            }
            None => Err(self.unknown_field(name)),
        }
    }

    /// In-place raw mutation; borrows the attribute map only for the
    /// duration of the closure.
    pub(crate) fn attr_mut<R>(
        &self,
        name: &str,
        f: impl FnOnce(&mut Value) -> R,
    ) -> Result<R, Error> {
        let mut attrs = self.inner.attrs.borrow_mut();
        attrs
            .get_mut(name)
            .map(f)
            .ok_or_else(|| self.unknown_field(name))
    }

    // property access (public surface)

    /// Public read. Returns a clone, so collection and map values are
    /// immutable views. The key and owner are readable through their field
    /// names.
    pub fn get_property(&self, name: &str) -> Result<Value, Error> {
        let field = self.field(name)?;

        match field.role {
            FieldRole::Key => Ok(self
                .inner
                .key
                .as_ref()
                .map_or(Value::Null, |k| Value::Text(k.clone()))),
            FieldRole::Owner => Ok(self.owner().map_or(Value::Null, Value::Model)),
            _ => self.get_attribute(name),
        }
    }

    /// Checked write: role dispatch, shape and element type checks, owner
    /// wiring for model values.
    pub fn set_property(&self, name: &str, value: Value) -> Result<(), Error> {
        let field = self.field(name)?.clone();

        match field.role {
            FieldRole::Key => Err(Error::NotWritable {
                model: self.path().to_string(),
                field: name.to_string(),
            }),
            FieldRole::Owner => self.set_owner(&field, value),
            _ => self.set_checked(&field, value),
        }
    }

    /// Append one element to a list or set field, with element type check,
    /// owner wiring, and set deduplication.
    pub fn add_element(&self, name: &str, value: Value) -> Result<(), Error> {
        let field = self.field(name)?.clone();
        if !field.shape.is_collection() {
            return Err(Error::TypeMismatch {
                field: name.to_string(),
                expected: "list or set field".to_string(),
                found: field.shape.label().to_string(),
            });
        }

        merge::assert_element_type(&field, &value)?;
        merge::wire_value_owners(&value, self);

        self.attr_mut(name, |slot| match slot {
            Value::List(xs) => xs.push(value),
            Value::Set(xs) => {
                if !xs.contains(&value) {
                    xs.push(value);
                }
            }
            _ => {}
        })
    }

    /// Put one entry into a map field, with value type check and owner
    /// wiring. The donor entry wins on key collision.
    pub fn put_entry(&self, name: &str, key: &str, value: Value) -> Result<(), Error> {
        let field = self.field(name)?.clone();
        if !field.shape.is_map() {
            return Err(Error::TypeMismatch {
                field: name.to_string(),
                expected: "map field".to_string(),
                found: field.shape.label().to_string(),
            });
        }

        merge::assert_element_type(&field, &value)?;
        merge::wire_value_owners(&value, self);

        self.attr_mut(name, |slot| {
            if let Value::Map(m) = slot {
                m.insert(key.to_string(), value);
            }
        })
    }

    /// Keyed containment: put a keyed child into a map field under the
    /// child's own key.
    pub fn put_keyed(&self, name: &str, child: Self) -> Result<(), Error> {
        let Some(key) = child.key().map(str::to_string) else {
            return Err(Error::KeyRequired {
                model: child.path().to_string(),
            });
        };

        self.put_entry(name, &key, Value::Model(child))
    }

    fn set_checked(&self, field: &ResolvedField, value: Value) -> Result<(), Error> {
        let value = match (&field.shape, value) {
            (FieldShape::Single(ty), value) => {
                if !value.is_null() && !value.conforms_to(ty) {
                    return Err(Error::TypeMismatch {
                        field: field.name.clone(),
                        expected: ty.to_string(),
                        found: value.kind_label(),
                    });
                }
                value
            }
            (FieldShape::List(_), Value::List(xs)) => {
                for x in &xs {
                    merge::assert_element_type(field, x)?;
                }
                Value::List(xs)
            }
            (FieldShape::Set(_), Value::Set(xs) | Value::List(xs)) => {
                let mut set = Vec::with_capacity(xs.len());
                for x in xs {
                    merge::assert_element_type(field, &x)?;
                    if !set.contains(&x) {
                        set.push(x);
                    }
                }
                Value::Set(set)
            }
            (FieldShape::Map { .. }, Value::Map(m)) => {
                for v in m.values() {
                    merge::assert_element_type(field, v)?;
                }
                Value::Map(m)
            }
            (shape, other) => {
                return Err(Error::TypeMismatch {
                    field: field.name.clone(),
                    expected: shape.label().to_string(),
                    found: other.kind_label(),
                });
            }
        };

        merge::wire_value_owners(&value, self);
        self.set_attribute(&field.name, value)
    }

    // lifecycle

    /// Run post-create hooks up the chain, ancestor-first.
    pub fn invoke_post_create(&self) -> Result<(), Error> {
        for hook in self.inner.info.post_create() {
            hook(self)?;
        }
        Ok(())
    }

    /// Run post-apply hooks up the chain, ancestor-first.
    pub fn invoke_post_apply(&self) -> Result<(), Error> {
        for hook in self.inner.info.post_apply() {
            hook(self)?;
        }
        Ok(())
    }

    /// Run required-field checks and custom rules, ancestor-first. All
    /// failures are collected into a single `Validation` error; the
    /// instance itself is left intact for inspection.
    ///
    /// This always validates when called; the factory is what consults the
    /// manual-validation flag.
    pub fn validate(&self) -> Result<(), Error> {
        let mut issues = Vec::new();

        for level in &self.model().levels {
            for field in &level.fields {
                if field.required && field.role == FieldRole::Normal {
                    let value = self.get_attribute(&field.name)?;
                    if value.is_empty() {
                        issues.push(ValidationIssue {
                            name: field.name.clone(),
                            message: "required field is empty".to_string(),
                        });
                    }
                }
            }
        }

        for rule in self.inner.info.rules() {
            if let Err(err) = (rule.check)(self) {
                issues.push(ValidationIssue {
                    name: rule.name.clone(),
                    message: err.to_string(),
                });
            }
        }

        if issues.is_empty() {
            Ok(())
        } else {
            Err(Error::Validation {
                model: self.path().to_string(),
                issues: ValidationIssues(issues),
            })
        }
    }

    /// Allocate a fresh instance of the same concrete type (same key) and
    /// deep-copy every copyable field. Model values are cloned, never
    /// aliased; the clone's nested values are re-owned by the clone.
    pub fn clone_instance(&self) -> Result<Self, Error> {
        let clone = Self::allocate(self.inner.info.clone(), self.inner.key.clone());

        for field in self.model().fields() {
            if !field.role.is_copyable() {
                continue;
            }
            let value = self.get_attribute(&field.name)?;
            if value.is_null() {
                continue;
            }
            let copied = merge::copy_value(&value)?;
            merge::wire_value_owners(&copied, &clone);
            clone.set_attribute(&field.name, copied)?;
        }

        Ok(clone)
    }

    // helpers

    fn field(&self, name: &str) -> Result<&ResolvedField, Error> {
        self.inner
            .info
            .model
            .field(name)
            .ok_or_else(|| self.unknown_field(name))
    }

    fn unknown_field(&self, name: &str) -> Error {
        Error::UnknownField {
            model: self.path().to_string(),
            field: name.to_string(),
        }
    }
}

impl PartialEq for Instance {
    fn eq(&self, other: &Self) -> bool {
        self.path() == other.path()
            && self.inner.key == other.inner.key
            && *self.inner.attrs.borrow() == *other.inner.attrs.borrow()
    }
}

impl fmt::Debug for Instance {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Instance")
            .field("model", &self.path())
            .field("key", &self.inner.key)
            .field("attributes", &self.inner.attrs.borrow())
            .finish_non_exhaustive()
    }
}

impl Serialize for Instance {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        // Owner is deliberately excluded: it is a back-edge and would make
        // the output cyclic.
        let mut state = serializer.serialize_struct("Instance", 3)?;
        state.serialize_field("model", self.path())?;
        state.serialize_field("key", &self.inner.key)?;
        state.serialize_field("attributes", &*self.inner.attrs.borrow())?;
        state.end()
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
    fn property_reads_cover_key_and_owner() {
        let fx = fixture();
        let env = fx.stub("Env", Some("e1"));

        assert_eq!(env.get_property("id").expect("key readable"), Value::from("e1"));
        assert_eq!(env.get_property("parent").expect("owner readable"), Value::Null);
    }

    #[test]
    fn key_is_not_writable_through_the_property_surface() {
        let fx = fixture();
        let env = fx.stub("Env", Some("e1"));

        let err = env.set_property("id", Value::from("other")).unwrap_err();
        assert!(matches!(err, Error::NotWritable { .. }));
    }

    #[test]
    fn owner_set_twice_fails_even_with_the_same_reference() {
        let fx = fixture();
        let env = fx.stub("Env", Some("e1"));
        let svc = fx.stub("Service", Some("svc"));

        svc.set_property("env", Value::Model(env.clone()))
            .expect("first owner assignment");
        let err = svc
            .set_property("env", Value::Model(env.clone()))
            .unwrap_err();
        assert!(matches!(err, Error::OwnerAlreadySet { .. }));

        // Null assignment never fails.
        let other = fx.stub("Service", Some("s2"));
        other.set_property("env", Value::Null).expect("null owner is a no-op");
    }

    #[test]
    fn unknown_fields_are_rejected() {
        let fx = fixture();
        let env = fx.stub("Env", Some("e1"));

        assert!(matches!(
            env.get_property("nope").unwrap_err(),
            Error::UnknownField { .. }
        ));
        assert!(matches!(
            env.set_property("nope", Value::Null).unwrap_err(),
            Error::UnknownField { .. }
        ));
    }

    #[test]
    fn set_field_deduplicates_on_add() {
        let fx = fixture();
        let svc = fx.stub("Service", Some("svc"));

        svc.add_element("labels", Value::from("a")).expect("add");
        svc.add_element("labels", Value::from("a")).expect("dup add");
        svc.add_element("labels", Value::from("b")).expect("add");

        let labels = svc.get_property("labels").expect("labels");
        assert_eq!(labels, Value::Set(vec![Value::from("a"), Value::from("b")]));
    }

    #[test]
    fn collection_elements_are_type_checked() {
        let fx = fixture();
        let svc = fx.stub("Service", Some("svc"));

        let err = svc.add_element("endpoints", Value::from(1i64)).unwrap_err();
        assert!(matches!(err, Error::TypeMismatch { .. }));
    }

    #[test]
    fn clone_is_equal_but_not_identical() {
        let fx = fixture();
        let svc = fx.stub("Service", Some("svc"));
        svc.set_property("url", Value::from("http://x")).expect("set");
        svc.add_element("labels", Value::from("a")).expect("add");

        let copy = svc.clone_instance().expect("clone");
        assert_eq!(copy, svc);
        assert!(!Instance::ptr_eq(&copy, &svc));
        assert_eq!(copy.key(), Some("svc"));
    }

    #[test]
    fn serialization_excludes_owner() {
        let fx = fixture();
        let env = fx.stub("Env", Some("e1"));
        let svc = fx.stub("Service", Some("svc"));
        svc.set_property("env", Value::Model(env)).expect("owner");

        let json = serde_json::to_string(&svc).expect("serializable");
        assert!(json.contains("\"key\":\"svc\""));
        assert!(!json.contains("\"env\""));
    }
}
