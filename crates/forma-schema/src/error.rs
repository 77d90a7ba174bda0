use serde::Serialize;
use std::{collections::BTreeMap, fmt};

///
/// ErrorTree
///
/// Build-time issue aggregation, keyed by node route. Validation never
/// stops at the first problem; callers receive every issue at once.
///

#[derive(Clone, Debug, Default, Serialize)]
pub struct ErrorTree {
    issues: BTreeMap<String, Vec<String>>,
}

impl ErrorTree {
    #[must_use]
    pub const fn new() -> Self {
        Self {
            issues: BTreeMap::new(),
        }
    }

    /// Record an issue against a route such as `Env.services`.
    pub fn add(&mut self, route: impl Into<String>, message: impl Into<String>) {
        self.issues.entry(route.into()).or_default().push(message.into());
    }

    /// Fold another tree into this one.
    pub fn merge(&mut self, other: Self) {
        for (route, mut messages) in other.issues {
            self.issues.entry(route).or_default().append(&mut messages);
        }
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.issues.is_empty()
    }

    #[must_use]
    pub fn len(&self) -> usize {
        self.issues.values().map(Vec::len).sum()
    }

    /// Issues recorded for one route, if any.
    #[must_use]
    pub fn get(&self, route: &str) -> Option<&[String]> {
        self.issues.get(route).map(Vec::as_slice)
    }

    /// Convert into a `Result`, failing when any issue was recorded.
    pub fn result(self) -> Result<(), Self> {
        if self.is_empty() { Ok(()) } else { Err(self) }
    }
}

impl fmt::Display for ErrorTree {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{} issue(s)", self.len())?;
        for (route, messages) in &self.issues {
            for message in messages {
                write!(f, "\n  {route}: {message}")?;
            }
        }

        Ok(())
    }
}

impl std::error::Error for ErrorTree {}

///
/// TESTS
///

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn collects_issues_per_route() {
        let mut errs = ErrorTree::new();
        errs.add("Env", "parent not found");
        errs.add("Env.services", "duplicate field");
        errs.add("Env.services", "bad strategy");

        assert_eq!(errs.len(), 3);
        assert_eq!(errs.get("Env.services").map(<[String]>::len), Some(2));
        assert!(errs.result().is_err());
    }

    #[test]
    fn empty_tree_is_ok() {
        assert!(ErrorTree::new().result().is_ok());
    }
}
