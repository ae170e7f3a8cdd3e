#![forbid(unsafe_code)]

//! Error type shared by every KVO operation.
//!
//! Two families of failure exist:
//!
//! | Family | Examples | Caller response |
//! |--------|----------|-----------------|
//! | Programming error | malformed path on write, read-only key, dependency cycle | fix the call site |
//! | Data rejection | formatter cannot parse input, bad config file | surface to the user |
//!
//! Data *absence* during a read is not represented here at all: it resolves
//! to [`Value::Null`](crate::Value::Null).

use std::fmt;

/// Convenience alias for results carrying a [`KvoError`].
pub type KvoResult<T> = Result<T, KvoError>;

/// Errors raised by key-value observation and bindings.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum KvoError {
    /// A key path was empty or contained an empty segment.
    MalformedKeyPath { path: String },
    /// A write walked through a segment that did not resolve to an object.
    MissingIntermediate { path: String, segment: String },
    /// The key declares a getter but no setter.
    ReadOnlyKey { key: String },
    /// A class declared a setter for a key without a matching getter.
    SetterWithoutGetter { key: String },
    /// A dependent-key declaration would close a cycle.
    DependencyCycle { cycle: Vec<String> },
    /// A registry name was empty or contained a path separator.
    InvalidModelName { name: String },
    /// A registry lookup by name found nothing.
    UnknownModel { name: String },
    /// A collection index was past the end.
    IndexOutOfBounds { index: usize, len: usize },
    /// The value stored under a to-many key is not a collection.
    NotACollection { key: String },
    /// A two-way binding was given a transformer that cannot reverse.
    IrreversibleTransformer { binding: String },
    /// A binding that initializes from the view has no view getter.
    MissingGetter { binding: String },
    /// A formatter could not turn view input back into a model value.
    RejectedValue { binding: String, input: String },
    /// Binding defaults could not be parsed.
    Config(String),
}

impl KvoError {
    /// Whether this error indicates a defect at the call site rather than bad data.
    #[must_use]
    pub fn is_programming_error(&self) -> bool {
        !matches!(self, Self::RejectedValue { .. } | Self::Config(_))
    }
}

impl fmt::Display for KvoError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::MalformedKeyPath { path } => write!(f, "malformed key path: '{path}'"),
            Self::MissingIntermediate { path, segment } => {
                write!(f, "cannot assign '{path}': '{segment}' is not an object")
            }
            Self::ReadOnlyKey { key } => write!(f, "key '{key}' has a getter but no setter"),
            Self::SetterWithoutGetter { key } => {
                write!(f, "setter declared without getter for key '{key}'")
            }
            Self::DependencyCycle { cycle } => {
                write!(f, "dependent keys form a cycle: {}", cycle.join(" -> "))
            }
            Self::InvalidModelName { name } => write!(f, "invalid model name: '{name}'"),
            Self::UnknownModel { name } => write!(f, "no model registered as '{name}'"),
            Self::IndexOutOfBounds { index, len } => {
                write!(f, "index {index} out of bounds for collection of length {len}")
            }
            Self::NotACollection { key } => write!(f, "value for key '{key}' is not a collection"),
            Self::IrreversibleTransformer { binding } => write!(
                f,
                "two-way binding '{binding}' uses a transformer without a reverse transform"
            ),
            Self::MissingGetter { binding } => {
                write!(f, "binding '{binding}' initializes from the view but has no getter")
            }
            Self::RejectedValue { binding, input } => {
                write!(f, "binding '{binding}' rejected input '{input}'")
            }
            Self::Config(msg) => write!(f, "config error: {msg}"),
        }
    }
}

impl std::error::Error for KvoError {}
