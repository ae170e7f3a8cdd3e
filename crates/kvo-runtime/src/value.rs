#![forbid(unsafe_code)]

//! Dynamic values stored under observable keys.
//!
//! [`Value`] is the currency of the key-value layer: every getter returns one,
//! every setter takes one. Scalars compare by value; objects and collections
//! compare by identity, so two handles to the same [`KvoObject`] are equal
//! while two structurally identical objects are not.

use std::fmt;

use crate::reactive::collection::KvoArray;
use crate::reactive::observable::KvoObject;

/// Selection markers produced by controllers that expose an aggregate selection.
///
/// Resolving any key through a marker yields the same marker.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Marker {
    /// Nothing is selected.
    NoSelection,
    /// The selection holds more than one distinct value for the key.
    MultipleValues,
}

/// A dynamically typed value.
#[derive(Clone, Default)]
pub enum Value {
    /// Absent or explicitly null.
    #[default]
    Null,
    Bool(bool),
    Int(i64),
    Float(f64),
    String(String),
    /// Handle to an observable object (identity semantics).
    Object(KvoObject),
    /// Handle to an observable collection (identity semantics).
    Array(KvoArray),
    Marker(Marker),
}

impl Value {
    /// Equality for collection membership: like `==`, except that NaN
    /// matches NaN so a set-like `add` stays idempotent.
    #[must_use]
    pub fn same_member(&self, other: &Self) -> bool {
        match (self, other) {
            (Self::Float(a), Self::Float(b)) if a.is_nan() && b.is_nan() => true,
            _ => self == other,
        }
    }

    #[must_use]
    pub fn is_null(&self) -> bool {
        matches!(self, Self::Null)
    }

    #[must_use]
    pub fn as_object(&self) -> Option<&KvoObject> {
        match self {
            Self::Object(obj) => Some(obj),
            _ => None,
        }
    }

    #[must_use]
    pub fn as_array(&self) -> Option<&KvoArray> {
        match self {
            Self::Array(arr) => Some(arr),
            _ => None,
        }
    }

    #[must_use]
    pub fn as_str(&self) -> Option<&str> {
        match self {
            Self::String(s) => Some(s),
            _ => None,
        }
    }

    #[must_use]
    pub fn as_bool(&self) -> Option<bool> {
        match self {
            Self::Bool(b) => Some(*b),
            _ => None,
        }
    }

    #[must_use]
    pub fn as_i64(&self) -> Option<i64> {
        match self {
            Self::Int(i) => Some(*i),
            _ => None,
        }
    }

    /// Numeric view; integers widen to `f64`.
    #[must_use]
    pub fn as_f64(&self) -> Option<f64> {
        match self {
            Self::Float(f) => Some(*f),
            Self::Int(i) => Some(*i as f64),
            _ => None,
        }
    }

    #[must_use]
    pub fn as_marker(&self) -> Option<Marker> {
        match self {
            Self::Marker(m) => Some(*m),
            _ => None,
        }
    }

    /// Short type name used in logs.
    #[must_use]
    pub fn kind_name(&self) -> &'static str {
        match self {
            Self::Null => "null",
            Self::Bool(_) => "bool",
            Self::Int(_) => "int",
            Self::Float(_) => "float",
            Self::String(_) => "string",
            Self::Object(_) => "object",
            Self::Array(_) => "array",
            Self::Marker(_) => "marker",
        }
    }
}

impl PartialEq for Value {
    fn eq(&self, other: &Self) -> bool {
        match (self, other) {
            (Self::Null, Self::Null) => true,
            (Self::Bool(a), Self::Bool(b)) => a == b,
            (Self::Int(a), Self::Int(b)) => a == b,
            (Self::Float(a), Self::Float(b)) => a == b,
            (Self::String(a), Self::String(b)) => a == b,
            (Self::Object(a), Self::Object(b)) => a.ptr_eq(b),
            (Self::Array(a), Self::Array(b)) => a.ptr_eq(b),
            (Self::Marker(a), Self::Marker(b)) => a == b,
            _ => false,
        }
    }
}

impl fmt::Debug for Value {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Null => f.write_str("Null"),
            Self::Bool(b) => write!(f, "Bool({b})"),
            Self::Int(i) => write!(f, "Int({i})"),
            Self::Float(x) => write!(f, "Float({x})"),
            Self::String(s) => write!(f, "String({s:?})"),
            Self::Object(obj) => write!(f, "Object(#{})", obj.id()),
            Self::Array(arr) => write!(f, "Array(#{}, len={})", arr.id(), arr.len()),
            Self::Marker(m) => write!(f, "Marker({m:?})"),
        }
    }
}

/// Plain-text rendering used when a binding has no formatter.
impl fmt::Display for Value {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Null => Ok(()),
            Self::Bool(b) => write!(f, "{b}"),
            Self::Int(i) => write!(f, "{i}"),
            Self::Float(x) => write!(f, "{x}"),
            Self::String(s) => f.write_str(s),
            Self::Object(obj) => write!(f, "[object #{}]", obj.id()),
            Self::Array(arr) => write!(f, "[array len={}]", arr.len()),
            Self::Marker(Marker::NoSelection) => f.write_str("<no selection>"),
            Self::Marker(Marker::MultipleValues) => f.write_str("<multiple values>"),
        }
    }
}

impl From<bool> for Value {
    fn from(v: bool) -> Self {
        Self::Bool(v)
    }
}

impl From<i32> for Value {
    fn from(v: i32) -> Self {
        Self::Int(i64::from(v))
    }
}

impl From<i64> for Value {
    fn from(v: i64) -> Self {
        Self::Int(v)
    }
}

impl From<f64> for Value {
    fn from(v: f64) -> Self {
        Self::Float(v)
    }
}

impl From<&str> for Value {
    fn from(v: &str) -> Self {
        Self::String(v.to_owned())
    }
}

impl From<String> for Value {
    fn from(v: String) -> Self {
        Self::String(v)
    }
}

impl From<KvoObject> for Value {
    fn from(v: KvoObject) -> Self {
        Self::Object(v)
    }
}

impl From<&KvoObject> for Value {
    fn from(v: &KvoObject) -> Self {
        Self::Object(v.clone())
    }
}

impl From<KvoArray> for Value {
    fn from(v: KvoArray) -> Self {
        Self::Array(v)
    }
}

impl From<Marker> for Value {
    fn from(v: Marker) -> Self {
        Self::Marker(v)
    }
}

impl<T: Into<Value>> From<Option<T>> for Value {
    fn from(v: Option<T>) -> Self {
        v.map_or(Self::Null, Into::into)
    }
}

/// Typed extraction from a [`Value`], used by
/// [`ObservedField`](crate::reactive::field::ObservedField).
pub trait FromValue: Sized {
    /// Returns `None` when the value is null or of another kind.
    fn from_value(value: &Value) -> Option<Self>;
}

impl FromValue for Value {
    fn from_value(value: &Value) -> Option<Self> {
        (!value.is_null()).then(|| value.clone())
    }
}

impl FromValue for bool {
    fn from_value(value: &Value) -> Option<Self> {
        value.as_bool()
    }
}

impl FromValue for i64 {
    fn from_value(value: &Value) -> Option<Self> {
        value.as_i64()
    }
}

impl FromValue for f64 {
    fn from_value(value: &Value) -> Option<Self> {
        value.as_f64()
    }
}

impl FromValue for String {
    fn from_value(value: &Value) -> Option<Self> {
        value.as_str().map(str::to_owned)
    }
}

impl FromValue for KvoObject {
    fn from_value(value: &Value) -> Option<Self> {
        value.as_object().cloned()
    }
}

impl FromValue for KvoArray {
    fn from_value(value: &Value) -> Option<Self> {
        value.as_array().cloned()
    }
}
