use std::fmt;
use thiserror::Error as ThisError;

///
/// Error
///
/// Structured runtime failures. Schema-configuration problems never appear
/// here; they are rejected once, at build time, by `forma-schema`.
///
/// Runtime failures abort the operation in progress and are never retried.
/// The merge engine is not transactional: fields written before a failure
/// stay written.
///

#[derive(Clone, Debug, Eq, PartialEq, ThisError)]
pub enum Error {
    #[error("unknown field '{field}' on {model}")]
    UnknownField { model: String, field: String },

    #[error("unknown model type '{model}'")]
    UnknownModel { model: String },

    #[error("value in '{field}' is not of expected type {expected}: found {found}")]
    TypeMismatch {
        field: String,
        expected: String,
        found: String,
    },

    #[error("owner of {model} is already set and must not be overridden")]
    OwnerAlreadySet { model: String },

    #[error("field '{field}' on {model} is not writable")]
    NotWritable { model: String, field: String },

    #[error("field '{field}' on {model} is not model-typed")]
    NotModelTyped { model: String, field: String },

    #[error("model {model} declares a key; one must be provided at creation")]
    KeyRequired { model: String },

    #[error("model {model} does not declare a key")]
    KeyNotAllowed { model: String },

    #[error("model {model} is abstract; only templates can be created for it")]
    NotInstantiable { model: String },

    #[error("template for {model} is not an instance of it: found {found}")]
    TemplateMismatch { model: String, found: String },

    #[error("validation failed for {model}: {issues}")]
    Validation {
        model: String,
        issues: ValidationIssues,
    },

    #[error("internal invariant violated: {0}")]
    Invariant(String),

    #[error("{0}")]
    Message(String),

    #[error("{path}: {source}")]
    Context {
        path: String,
        #[source]
        source: Box<Self>,
    },
}

impl Error {
    /// Prepend a field segment to the error path.
    #[must_use]
    pub fn with_field(self, field: impl AsRef<str>) -> Self {
        self.with_path_segment(field.as_ref())
    }

    /// Prepend an index segment to the error path.
    #[must_use]
    pub fn with_index(self, index: usize) -> Self {
        self.with_path_segment(format!("[{index}]"))
    }

    /// Full contextual path, if available.
    #[must_use]
    pub const fn path(&self) -> Option<&str> {
        match self {
            Self::Context { path, .. } => Some(path.as_str()),
            _ => None,
        }
    }

    /// Innermost, non-context error variant.
    #[must_use]
    pub fn leaf(&self) -> &Self {
        match self {
            Self::Context { source, .. } => source.leaf(),
            _ => self,
        }
    }

    #[must_use]
    fn with_path_segment(self, segment: impl Into<String>) -> Self {
        let segment = segment.into();
        match self {
            Self::Context { path, source } => Self::Context {
                path: Self::join_segments(segment.as_str(), path.as_str()),
                source,
            },
            source => Self::Context {
                path: segment,
                source: Box::new(source),
            },
        }
    }

    #[must_use]
    fn join_segments(prefix: &str, suffix: &str) -> String {
        if suffix.starts_with('[') {
            format!("{prefix}{suffix}")
        } else {
            format!("{prefix}.{suffix}")
        }
    }
}

///
/// ValidationIssue
///
/// One failed validation rule or required-field check. The originating
/// failure text is preserved verbatim.
///

#[derive(Clone, Debug, Eq, PartialEq)]
pub struct ValidationIssue {
    pub name: String,
    pub message: String,
}

impl fmt::Display for ValidationIssue {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}: {}", self.name, self.message)
    }
}

///
/// ValidationIssues
///

#[derive(Clone, Debug, Default, Eq, PartialEq)]
pub struct ValidationIssues(pub Vec<ValidationIssue>);

impl ValidationIssues {
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }

    #[must_use]
    pub fn len(&self) -> usize {
        self.0.len()
    }

    pub fn iter(&self) -> impl Iterator<Item = &ValidationIssue> {
        self.0.iter()
    }
}

impl fmt::Display for ValidationIssues {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let mut first = true;
        for issue in &self.0 {
            if !first {
                write!(f, "; ")?;
            }
            write!(f, "{issue}")?;
            first = false;
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

    #[test]
    fn context_accumulates_path_segments() {
        let err = Error::TypeMismatch {
            field: "ports".into(),
            expected: "int".into(),
            found: "text".into(),
        };

        let wrapped = err.with_index(2).with_field("services");
        assert_eq!(wrapped.path(), Some("services[2]"));
        assert!(matches!(wrapped.leaf(), Error::TypeMismatch { .. }));
    }

    #[test]
    fn field_segments_join_with_dots() {
        let err = Error::Message("boom".into())
            .with_field("inner")
            .with_field("outer");

        assert_eq!(err.path(), Some("outer.inner"));
    }
}
