use crate::{error::Error, instance::Instance, value::Value};
use forma_schema::{
    build::ResolvedField,
    strategy::{CollectionStrategy, MapStrategy, ResolvedStrategy, SingleStrategy},
};
use std::collections::BTreeMap;

///
/// Copy/Merge Engine
///
/// Transfers field values from a donor instance into a target of a
/// compatible type, level by level, per each field's terminal strategy.
/// Strategies arrive fully resolved from the schema build, so dispatch
/// never sees an inherit placeholder.
///
/// The engine is not transactional. A type mismatch aborts the merge
/// where it happened; fields written before the failure stay written.
///

/// Merge `donor` into `target`.
///
/// Levels of the target's chain that the donor is not an instance of are
/// skipped, not erred, so a donor of a broader type contributes only its
/// own levels. Key, owner, transient, and builder fields never move.
/// Merging an instance into itself is a no-op.
pub fn copy_into(target: &Instance, donor: &Instance) -> Result<(), Error> {
    if Instance::ptr_eq(target, donor) {
        return Ok(());
    }

    for level in &target.model().levels {
        if !donor.is_instance_of(&level.path) {
            continue;
        }

        for field in &level.fields {
            if !field.role.is_copyable() {
                continue;
            }

            merge_field(target, donor, field).map_err(|err| err.with_field(&field.name))?;
        }
    }

    Ok(())
}

fn merge_field(target: &Instance, donor: &Instance, field: &ResolvedField) -> Result<(), Error> {
    match field.strategy {
        ResolvedStrategy::Single(strategy) => merge_single(target, donor, field, strategy),
        ResolvedStrategy::Collection(strategy) => merge_collection(target, donor, field, strategy),
        ResolvedStrategy::Map(strategy) => merge_map(target, donor, field, strategy),
    }
}

// single fields

fn merge_single(
    target: &Instance,
    donor: &Instance,
    field: &ResolvedField,
    strategy: SingleStrategy,
) -> Result<(), Error> {
    let donor_value = donor.get_attribute(&field.name)?;

    match strategy {
        SingleStrategy::Replace => {
            if !donor_value.is_null() {
                set_copied(target, field, donor_value)?;
            }
        }
        SingleStrategy::AlwaysReplace => {
            set_copied(target, field, donor_value)?;
        }
        SingleStrategy::SetIfNull => {
            if target.get_attribute(&field.name)?.is_null() {
                set_copied(target, field, donor_value)?;
            }
        }
        SingleStrategy::Merge => {
            let target_value = target.get_attribute(&field.name)?;
            match (target_value.as_model(), donor_value.as_model()) {
                (Some(existing), Some(incoming)) => copy_into(existing, incoming)?,
                _ => {
                    if !donor_value.is_null() {
                        set_copied(target, field, donor_value)?;
                    }
                }
            }
        }
    }

    Ok(())
}

fn set_copied(target: &Instance, field: &ResolvedField, value: Value) -> Result<(), Error> {
    let copied = copy_value(&value)?;
    wire_value_owners(&copied, target);
    target.set_attribute(&field.name, copied)
}

// collection fields

fn merge_collection(
    target: &Instance,
    donor: &Instance,
    field: &ResolvedField,
    strategy: CollectionStrategy,
) -> Result<(), Error> {
    let donor_elements = collection_elements(donor, field)?;

    match strategy {
        CollectionStrategy::Add => {
            let incoming = copy_elements(target, field, donor_elements)?;
            append_elements(target, field, incoming)
        }
        CollectionStrategy::Replace => {
            if donor_elements.is_empty() {
                return Ok(());
            }
            let incoming = copy_elements(target, field, donor_elements)?;
            replace_elements(target, field, incoming)
        }
        CollectionStrategy::AlwaysReplace => {
            let incoming = copy_elements(target, field, donor_elements)?;
            replace_elements(target, field, incoming)
        }
        CollectionStrategy::SetIfEmpty => {
            let empty = target.get_attribute(&field.name)?.is_empty();
            if !empty {
                return Ok(());
            }
            let incoming = copy_elements(target, field, donor_elements)?;
            replace_elements(target, field, incoming)
        }
    }
}

fn collection_elements(donor: &Instance, field: &ResolvedField) -> Result<Vec<Value>, Error> {
    match donor.get_attribute(&field.name)? {
        Value::List(xs) | Value::Set(xs) => Ok(xs),
        other => Err(Error::Invariant(format!(
            "collection field holds a {} value",
            other.kind_label()
        ))),
    }
}

/// Type-check and duplicate donor elements, cloning nested models and
/// wiring them to the target.
fn copy_elements(
    target: &Instance,
    field: &ResolvedField,
    elements: Vec<Value>,
) -> Result<Vec<Value>, Error> {
    let mut out = Vec::with_capacity(elements.len());

    for (index, element) in elements.into_iter().enumerate() {
        assert_element_type(field, &element).map_err(|err| err.with_index(index))?;
        let copied = copy_value(&element).map_err(|err| err.with_index(index))?;
        wire_value_owners(&copied, target);
        out.push(copied);
    }

    Ok(out)
}

fn append_elements(
    target: &Instance,
    field: &ResolvedField,
    incoming: Vec<Value>,
) -> Result<(), Error> {
    target.attr_mut(&field.name, |slot| match slot {
        Value::List(xs) => xs.extend(incoming),
        Value::Set(xs) => {
            for element in incoming {
                if !xs.contains(&element) {
                    xs.push(element);
                }
            }
        }
        _ => {}
    })
}

fn replace_elements(
    target: &Instance,
    field: &ResolvedField,
    incoming: Vec<Value>,
) -> Result<(), Error> {
    target.attr_mut(&field.name, |slot| match slot {
        Value::List(xs) => *xs = incoming,
        Value::Set(xs) => {
            xs.clear();
            for element in incoming {
                if !xs.contains(&element) {
                    xs.push(element);
                }
            }
        }
        _ => {}
    })
}

// map fields

fn merge_map(
    target: &Instance,
    donor: &Instance,
    field: &ResolvedField,
    strategy: MapStrategy,
) -> Result<(), Error> {
    let donor_entries = map_entries(donor, field)?;

    match strategy {
        MapStrategy::FullReplace => {
            if donor_entries.is_empty() {
                return Ok(());
            }
            let incoming = copy_entries(target, field, donor_entries)?;
            target.set_attribute(&field.name, Value::Map(incoming))
        }
        MapStrategy::AlwaysReplace => {
            let incoming = copy_entries(target, field, donor_entries)?;
            target.set_attribute(&field.name, Value::Map(incoming))
        }
        MapStrategy::SetIfEmpty => {
            if !target.get_attribute(&field.name)?.is_empty() {
                return Ok(());
            }
            let incoming = copy_entries(target, field, donor_entries)?;
            target.set_attribute(&field.name, Value::Map(incoming))
        }
        MapStrategy::MergeKeys => {
            let incoming = copy_entries(target, field, donor_entries)?;
            target.attr_mut(&field.name, |slot| {
                if let Value::Map(m) = slot {
                    m.extend(incoming);
                }
            })
        }
        MapStrategy::AddMissing => {
            let incoming = copy_entries(target, field, donor_entries)?;
            target.attr_mut(&field.name, |slot| {
                if let Value::Map(m) = slot {
                    for (key, value) in incoming {
                        m.entry(key).or_insert(value);
                    }
                }
            })
        }
        MapStrategy::MergeValues => merge_map_values(target, field, donor_entries),
    }
}

/// Recursively merge model values sharing a key; donor-only keys are
/// cloned in. The map value type is model-typed by schema validation.
fn merge_map_values(
    target: &Instance,
    field: &ResolvedField,
    donor_entries: BTreeMap<String, Value>,
) -> Result<(), Error> {
    for (key, donor_value) in donor_entries {
        assert_element_type(field, &donor_value).map_err(|err| err.with_field(&key))?;

        let existing = target.attr_mut(&field.name, |slot| match slot {
            Value::Map(m) => m.get(&key).cloned(),
            _ => None,
        })?;

        match (existing.as_ref().and_then(Value::as_model), donor_value.as_model()) {
            (Some(existing_model), Some(donor_model)) => {
                copy_into(existing_model, donor_model).map_err(|err| err.with_field(&key))?;
            }
            _ => {
                let copied = copy_value(&donor_value).map_err(|err| err.with_field(&key))?;
                wire_value_owners(&copied, target);
                target.attr_mut(&field.name, |slot| {
                    if let Value::Map(m) = slot {
                        m.insert(key.clone(), copied);
                    }
                })?;
            }
        }
    }

    Ok(())
}

fn map_entries(donor: &Instance, field: &ResolvedField) -> Result<BTreeMap<String, Value>, Error> {
    match donor.get_attribute(&field.name)? {
        Value::Map(m) => Ok(m),
        other => Err(Error::Invariant(format!(
            "map field holds a {} value",
            other.kind_label()
        ))),
    }
}

fn copy_entries(
    target: &Instance,
    field: &ResolvedField,
    entries: BTreeMap<String, Value>,
) -> Result<BTreeMap<String, Value>, Error> {
    let mut out = BTreeMap::new();

    for (key, value) in entries {
        assert_element_type(field, &value).map_err(|err| err.with_field(&key))?;
        let copied = copy_value(&value).map_err(|err| err.with_field(&key))?;
        wire_value_owners(&copied, target);
        out.insert(key, copied);
    }

    Ok(out)
}

// shared helpers

/// Duplicate a value: model instances are cloned, never aliased, and
/// containers are rebuilt with every element duplicated by the same rule.
pub(crate) fn copy_value(value: &Value) -> Result<Value, Error> {
    let copied = match value {
        Value::Model(instance) => Value::Model(instance.clone_instance()?),
        Value::List(xs) => Value::List(
            xs.iter()
                .map(copy_value)
                .collect::<Result<Vec<_>, _>>()?,
        ),
        Value::Set(xs) => Value::Set(
            xs.iter()
                .map(copy_value)
                .collect::<Result<Vec<_>, _>>()?,
        ),
        Value::Map(m) => {
            let mut out = BTreeMap::new();
            for (key, v) in m {
                out.insert(key.clone(), copy_value(v)?);
            }
            Value::Map(out)
        }
        scalar => scalar.clone(),
    };

    Ok(copied)
}

/// Collection and map elements must be assignable to the declared element
/// type. Single fields are covered by the property surface instead.
pub(crate) fn assert_element_type(field: &ResolvedField, value: &Value) -> Result<(), Error> {
    let expected = field.shape.element();
    if value.conforms_to(expected) {
        Ok(())
    } else {
        Err(Error::TypeMismatch {
            field: field.name.clone(),
            expected: expected.to_string(),
            found: value.kind_label(),
        })
    }
}

/// Wire model values (directly, or one container level down) to `host` as
/// their owner, where the owner slot is still unset.
pub(crate) fn wire_value_owners(value: &Value, host: &Instance) {
    match value {
        Value::Model(instance) => instance.wire_owner(host),
        Value::List(xs) | Value::Set(xs) => {
            for element in xs {
                if let Value::Model(instance) = element {
                    instance.wire_owner(host);
                }
            }
        }
        Value::Map(m) => {
            for element in m.values() {
                if let Value::Model(instance) = element {
                    instance.wire_owner(host);
                }
            }
        }
        _ => {}
    }
}

///
/// TESTS
///
