#![forbid(unsafe_code)]

//! Dotted key paths and the resolver that walks them.
//!
//! A [`KeyPath`] is parsed once per distinct string and cached per thread;
//! later parses of the same string return a cheap clone sharing the segment
//! storage. The cache holds at most [`PATH_CACHE_CAPACITY`] entries and is
//! cleared wholesale when a new path would exceed it, so generated paths
//! cannot grow it without bound.
//!
//! # Failure Modes
//!
//! | Situation | Read (`resolve`) | Write (`assign`) |
//! |-----------|------------------|------------------|
//! | Malformed path | `Value::Null` | `MalformedKeyPath` |
//! | Intermediate missing / not an object | `Value::Null` | `MissingIntermediate` |
//! | Intermediate is a selection marker | the marker | `MissingIntermediate` |

use std::cell::RefCell;
use std::collections::HashMap;
use std::fmt;
use std::rc::Rc;
use std::str::FromStr;

use crate::error::{KvoError, KvoResult};
use crate::reactive::observable::KvoObject;
use crate::value::Value;

/// Maximum number of parsed paths kept per thread.
pub const PATH_CACHE_CAPACITY: usize = 4096;

thread_local! {
    static PATH_CACHE: RefCell<HashMap<String, KeyPath>> = RefCell::new(HashMap::new());
}

/// An immutable, parsed sequence of key segments.
#[derive(Clone, PartialEq, Eq, Hash)]
pub struct KeyPath {
    raw: Rc<str>,
    segments: Rc<[Box<str>]>,
}

impl KeyPath {
    /// Parse `path`, consulting the per-thread cache first.
    ///
    /// # Errors
    ///
    /// Returns [`KvoError::MalformedKeyPath`] for an empty path or a path with
    /// an empty segment (`"a..b"`, `".a"`, `"a."`).
    pub fn parse(path: &str) -> KvoResult<Self> {
        if let Some(hit) = PATH_CACHE.with(|cache| cache.borrow().get(path).cloned()) {
            return Ok(hit);
        }
        if path.is_empty() || path.split('.').any(str::is_empty) {
            return Err(KvoError::MalformedKeyPath {
                path: path.to_owned(),
            });
        }
        let parsed = Self {
            raw: Rc::from(path),
            segments: path.split('.').map(Box::from).collect(),
        };
        PATH_CACHE.with(|cache| {
            let mut cache = cache.borrow_mut();
            if cache.len() >= PATH_CACHE_CAPACITY {
                tracing::debug!(entries = cache.len(), "key path cache full, clearing");
                cache.clear();
            }
            cache.insert(path.to_owned(), parsed.clone());
        });
        Ok(parsed)
    }

    #[must_use]
    pub fn as_str(&self) -> &str {
        &self.raw
    }

    /// The first segment; the key observed on the root object.
    #[must_use]
    pub fn first(&self) -> &str {
        &self.segments[0]
    }

    #[must_use]
    pub fn last(&self) -> &str {
        &self.segments[self.segments.len() - 1]
    }

    pub fn segments(&self) -> impl Iterator<Item = &str> {
        self.segments.iter().map(|s| &**s)
    }

    #[must_use]
    pub fn len(&self) -> usize {
        self.segments.len()
    }

    /// Always false; a parsed path has at least one segment.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        false
    }

    #[must_use]
    pub fn is_single_key(&self) -> bool {
        self.segments.len() == 1
    }

    /// Everything after the first segment, or `None` for a single key.
    #[must_use]
    pub fn rest(&self) -> Option<KeyPath> {
        if self.is_single_key() {
            return None;
        }
        let tail = &self.raw[self.first().len() + 1..];
        Self::parse(tail).ok()
    }

    /// Everything before the last segment, or `None` for a single key.
    #[must_use]
    pub fn parent(&self) -> Option<KeyPath> {
        if self.is_single_key() {
            return None;
        }
        let head = &self.raw[..self.raw.len() - self.last().len() - 1];
        Self::parse(head).ok()
    }
}

impl FromStr for KeyPath {
    type Err = KvoError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Self::parse(s)
    }
}

impl fmt::Display for KeyPath {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.raw)
    }
}

impl fmt::Debug for KeyPath {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "KeyPath({:?})", &*self.raw)
    }
}

/// Resolve `path` against `context`. Never fails; a miss yields `Value::Null`.
#[must_use]
pub fn resolve(context: &Value, path: &str) -> Value {
    match KeyPath::parse(path) {
        Ok(path) => resolve_path(context, &path),
        Err(_) => Value::Null,
    }
}

/// Resolve an already-parsed path against `context`.
#[must_use]
pub fn resolve_path(context: &Value, path: &KeyPath) -> Value {
    let mut current = context.clone();
    for segment in path.segments() {
        current = match &current {
            Value::Object(obj) => obj.value_for_key(segment),
            Value::Marker(marker) => return Value::Marker(*marker),
            _ => return Value::Null,
        };
    }
    current
}

/// Assign `value` at `path` relative to `context`.
///
/// Every segment but the last must resolve to an object; the last is written
/// through [`KvoObject::set_value_for_key`], so observers fire as usual.
///
/// # Errors
///
/// [`KvoError::MalformedKeyPath`] for an unparsable path,
/// [`KvoError::MissingIntermediate`] when the walk falls off the object graph,
/// and any error from the final setter.
pub fn assign(context: &KvoObject, path: &str, value: Value) -> KvoResult<()> {
    let parsed = KeyPath::parse(path)?;
    assign_path(context, &parsed, value)
}

pub(crate) fn assign_path(context: &KvoObject, path: &KeyPath, value: Value) -> KvoResult<()> {
    let owner = owner_of(context, path)?;
    owner.set_value_for_key(value, path.last())
}

/// The object that holds the last segment of `path`.
pub(crate) fn owner_of(context: &KvoObject, path: &KeyPath) -> KvoResult<KvoObject> {
    let mut owner = context.clone();
    let count = path.len();
    for segment in path.segments().take(count - 1) {
        let next = owner.value_for_key(segment);
        owner = match next {
            Value::Object(obj) => obj,
            _ => {
                return Err(KvoError::MissingIntermediate {
                    path: path.as_str().to_owned(),
                    segment: segment.to_owned(),
                });
            }
        };
    }
    Ok(owner)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::value::Marker;

    #[test]
    fn parse_splits_segments() {
        let path = KeyPath::parse("a.b.c").unwrap();
        assert_eq!(path.segments().collect::<Vec<_>>(), vec!["a", "b", "c"]);
        assert_eq!(path.first(), "a");
        assert_eq!(path.last(), "c");
        assert_eq!(path.rest().unwrap().as_str(), "b.c");
        assert_eq!(path.parent().unwrap().as_str(), "a.b");
    }

    #[test]
    fn parse_is_cached() {
        let a = KeyPath::parse("person.name").unwrap();
        let b = KeyPath::parse("person.name").unwrap();
        assert!(Rc::ptr_eq(&a.segments, &b.segments));
    }

    #[test]
    fn single_key_has_no_rest() {
        let path = KeyPath::parse("name").unwrap();
        assert!(path.is_single_key());
        assert!(path.rest().is_none());
        assert!(path.parent().is_none());
    }

    #[test]
    fn malformed_paths_are_rejected() {
        for bad in ["", ".", "a..b", ".a", "a."] {
            assert!(
                matches!(KeyPath::parse(bad), Err(KvoError::MalformedKeyPath { .. })),
                "{bad:?} should be malformed"
            );
        }
    }

    #[test]
    fn resolve_walks_objects() {
        let name = KvoObject::adapt([("first", "john")]);
        let root = KvoObject::adapt([("name", Value::from(&name))]);
        assert_eq!(resolve(&Value::from(&root), "name.first"), Value::from("john"));
    }

    #[test]
    fn resolve_missing_intermediate_is_null() {
        let root = KvoObject::adapt([("zero", 0)]);
        let ctx = Value::from(&root);
        assert_eq!(resolve(&ctx, "missing.first"), Value::Null);
        assert_eq!(resolve(&ctx, "zero.first"), Value::Null);
        assert_eq!(resolve(&ctx, "a..b"), Value::Null);
    }

    #[test]
    fn resolve_propagates_markers() {
        let root = KvoObject::adapt([("selection", Marker::MultipleValues)]);
        assert_eq!(
            resolve(&Value::from(&root), "selection.name.first"),
            Value::Marker(Marker::MultipleValues)
        );
    }

    #[test]
    fn assign_sets_leaf() {
        let name = KvoObject::adapt([("first", "john")]);
        let root = KvoObject::adapt([("name", Value::from(&name))]);
        assign(&root, "name.first", Value::from("jane")).unwrap();
        assert_eq!(name.value_for_key("first"), Value::from("jane"));
    }

    #[test]
    fn assign_through_missing_intermediate_fails() {
        let root = KvoObject::new();
        let err = assign(&root, "name.first", Value::from("jane")).unwrap_err();
        assert_eq!(
            err,
            KvoError::MissingIntermediate {
                path: "name.first".into(),
                segment: "name".into()
            }
        );
        assert!(err.is_programming_error());
    }

    #[test]
    fn path_cache_stays_bounded() {
        for i in 0..=PATH_CACHE_CAPACITY + 10 {
            KeyPath::parse(&format!("generated{i}.leaf")).unwrap();
        }
        let cached = PATH_CACHE.with(|cache| cache.borrow().len());
        assert!(cached <= PATH_CACHE_CAPACITY);
        assert!(cached > 0);

        let again = KeyPath::parse("generated0.leaf").unwrap();
        assert_eq!(again.len(), 2);
    }
}
