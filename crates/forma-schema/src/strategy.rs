use serde::Serialize;
use std::fmt;

///
/// SingleStrategy
///
/// Overwrite policy for single-valued fields.
///

#[derive(Clone, Copy, Debug, Eq, PartialEq, Serialize)]
pub enum SingleStrategy {
    /// Donor replaces target only when the donor value is non-null.
    Replace,
    /// Replace unconditionally, even with null.
    AlwaysReplace,
    /// Write only when the target value is currently null.
    SetIfNull,
    /// Recursively merge model-typed values; otherwise behaves like Replace.
    Merge,
}

impl SingleStrategy {
    pub const DEFAULT: Self = Self::Merge;
}

///
/// CollectionStrategy
///
/// Overwrite policy for list and set fields.
///

#[derive(Clone, Copy, Debug, Eq, PartialEq, Serialize)]
pub enum CollectionStrategy {
    /// Append donor elements after the target's existing elements.
    Add,
    /// Clear-then-add, only when the donor is non-empty.
    Replace,
    /// Clear-then-add unconditionally.
    AlwaysReplace,
    /// Add only when the target is currently empty.
    SetIfEmpty,
}

impl CollectionStrategy {
    pub const DEFAULT: Self = Self::Replace;
}

///
/// MapStrategy
///
/// Overwrite policy for map fields.
///

#[derive(Clone, Copy, Debug, Eq, PartialEq, Serialize)]
pub enum MapStrategy {
    /// Clear-then-put-all, only when the donor is non-empty.
    FullReplace,
    /// Put all entries only when the target is currently empty.
    SetIfEmpty,
    /// Clear-then-put-all unconditionally.
    AlwaysReplace,
    /// Put all entries; donor wins on key collision.
    MergeKeys,
    /// Recursively merge model values sharing a key. Only valid on maps
    /// whose value type is a model type (enforced at build time).
    MergeValues,
    /// Put only keys absent in the target.
    AddMissing,
}

impl MapStrategy {
    pub const DEFAULT: Self = Self::FullReplace;
}

///
/// Declared
///
/// A strategy as written in the schema: either a concrete choice or
/// `Inherit`, deferring to the enclosing model or the hard default.
/// `Inherit` never survives the build step.
///

#[derive(Clone, Copy, Debug, Eq, PartialEq, Serialize)]
pub enum Declared<T> {
    Inherit,
    Use(T),
}

impl<T> Default for Declared<T> {
    fn default() -> Self {
        Self::Inherit
    }
}

impl<T: Copy> Declared<T> {
    #[must_use]
    pub const fn concrete(self) -> Option<T> {
        match self {
            Self::Inherit => None,
            Self::Use(value) => Some(value),
        }
    }
}

///
/// OverwriteDefaults
///
/// Per-model (or per-field) strategy declarations. On a model these act
/// as class-level defaults for fields declared at that level or on any
/// level below it; resolution searches from the field's declaring level
/// outward. On a field only the slot matching the field's shape is
/// consulted.
///

#[derive(Clone, Copy, Debug, Default, Eq, PartialEq, Serialize)]
pub struct OverwriteDefaults {
    pub single: Declared<SingleStrategy>,
    pub collection: Declared<CollectionStrategy>,
    pub map: Declared<MapStrategy>,
}

impl OverwriteDefaults {
    #[must_use]
    pub const fn single(strategy: SingleStrategy) -> Self {
        Self {
            single: Declared::Use(strategy),
            collection: Declared::Inherit,
            map: Declared::Inherit,
        }
    }

    #[must_use]
    pub const fn collection(strategy: CollectionStrategy) -> Self {
        Self {
            single: Declared::Inherit,
            collection: Declared::Use(strategy),
            map: Declared::Inherit,
        }
    }

    #[must_use]
    pub const fn map(strategy: MapStrategy) -> Self {
        Self {
            single: Declared::Inherit,
            collection: Declared::Inherit,
            map: Declared::Use(strategy),
        }
    }
}

///
/// ResolvedStrategy
///
/// Terminal strategy attached to every resolved field. `Inherit` is
/// unrepresentable here, so the merge engine never performs fallback
/// lookups on its hot path.
///

#[derive(Clone, Copy, Debug, Eq, PartialEq, Serialize)]
pub enum ResolvedStrategy {
    Single(SingleStrategy),
    Collection(CollectionStrategy),
    Map(MapStrategy),
}

impl fmt::Display for ResolvedStrategy {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Single(s) => write!(f, "single/{s:?}"),
            Self::Collection(s) => write!(f, "collection/{s:?}"),
            Self::Map(s) => write!(f, "map/{s:?}"),
        }
    }
}
