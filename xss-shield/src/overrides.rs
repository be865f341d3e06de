//! Fields and parameters that keep their raw value.
//!
//! Overrides are declared up front, either by a payload type through
//! [`HasSanitizationOverride`] or in an [`OverrideTable`]. They are consulted
//! before any policy runs; an overridden value bypasses the policy, the
//! result cache and the error policy.

use crate::error::{Result, XssError};
use std::collections::HashSet;
use tracing::debug;

/// Implemented by structured payload types that exempt some fields.
///
/// Markers belong to the type that declares them: a nested object is only
/// exempted by its own type, reached through [`child_schema`]. Nested
/// objects without a declared schema are sanitized in full.
///
/// ```
/// use xss_shield::{HasSanitizationOverride, OverrideSchema};
///
/// struct Reply {
///     body_html: String,
/// }
///
/// impl HasSanitizationOverride for Reply {
///     fn is_overridden(field: &str) -> bool {
///         field == "body_html"
///     }
/// }
///
/// struct Post {
///     title: String,
///     body_html: String,
///     replies: Vec<Reply>,
/// }
///
/// impl HasSanitizationOverride for Post {
///     fn is_overridden(field: &str) -> bool {
///         field == "body_html"
///     }
///
///     fn child_schema(field: &str) -> Option<OverrideSchema> {
///         match field {
///             "replies" => Some(OverrideSchema::of::<Vec<Reply>>()),
///             _ => None,
///         }
///     }
/// }
///
/// assert!(Post::is_overridden("body_html"));
/// assert!(!Post::is_overridden("title"));
/// assert!(Post::child_schema("replies").is_some_and(|s| s.is_overridden("body_html")));
/// ```
///
/// [`child_schema`]: HasSanitizationOverride::child_schema
pub trait HasSanitizationOverride {
    fn is_overridden(field: &str) -> bool;

    /// Markers of the type stored in `field`, if it declares any.
    fn child_schema(_field: &str) -> Option<OverrideSchema> {
        None
    }
}

impl HasSanitizationOverride for serde_json::Value {
    fn is_overridden(_field: &str) -> bool {
        false
    }
}

// Sequences and wrappers are transparent: their elements carry the markers.
impl<T: HasSanitizationOverride> HasSanitizationOverride for Vec<T> {
    fn is_overridden(field: &str) -> bool {
        T::is_overridden(field)
    }

    fn child_schema(field: &str) -> Option<OverrideSchema> {
        T::child_schema(field)
    }
}

impl<T: HasSanitizationOverride> HasSanitizationOverride for Option<T> {
    fn is_overridden(field: &str) -> bool {
        T::is_overridden(field)
    }

    fn child_schema(field: &str) -> Option<OverrideSchema> {
        T::child_schema(field)
    }
}

impl<T: HasSanitizationOverride> HasSanitizationOverride for Box<T> {
    fn is_overridden(field: &str) -> bool {
        T::is_overridden(field)
    }

    fn child_schema(field: &str) -> Option<OverrideSchema> {
        T::child_schema(field)
    }
}

/// The override markers of one payload type, detached from the type.
#[derive(Debug, Clone, Copy)]
pub struct OverrideSchema {
    overridden: fn(&str) -> bool,
    child: fn(&str) -> Option<OverrideSchema>,
}

impl OverrideSchema {
    pub fn of<T: HasSanitizationOverride + ?Sized>() -> Self {
        Self {
            overridden: T::is_overridden,
            child: T::child_schema,
        }
    }

    pub fn is_overridden(&self, field: &str) -> bool {
        (self.overridden)(field)
    }

    pub fn child(&self, field: &str) -> Option<OverrideSchema> {
        (self.child)(field)
    }
}

/// A source of override declarations that may fail to answer.
pub trait OverrideSource: Send + Sync {
    fn lookup(&self, field: &str) -> Result<bool>;
}

/// Resolve `field` against `source`.
///
/// A failed lookup counts as "not overridden", so the value is sanitized
/// normally instead of failing the request.
pub fn is_overridden(source: &dyn OverrideSource, field: &str) -> bool {
    match source.lookup(field) {
        Ok(overridden) => overridden,
        Err(e) => {
            debug!(field, error = %e, "override lookup failed; sanitizing value");
            false
        }
    }
}

/// Static set of overridden identifiers.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct OverrideTable {
    fields: HashSet<String>,
}

impl OverrideTable {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_field(mut self, field: impl Into<String>) -> Self {
        self.fields.insert(field.into());
        self
    }

    pub fn contains(&self, field: &str) -> bool {
        self.fields.contains(field)
    }

    pub fn len(&self) -> usize {
        self.fields.len()
    }

    pub fn is_empty(&self) -> bool {
        self.fields.is_empty()
    }
}

impl<S: Into<String>> FromIterator<S> for OverrideTable {
    fn from_iter<I: IntoIterator<Item = S>>(iter: I) -> Self {
        Self {
            fields: iter.into_iter().map(Into::into).collect(),
        }
    }
}

impl OverrideSource for OverrideTable {
    fn lookup(&self, field: &str) -> Result<bool> {
        if field.is_empty() {
            return Err(XssError::OverrideLookup(field.to_string()));
        }
        Ok(self.contains(field))
    }
}
