#![forbid(unsafe_code)]

//! Key-value observation engine with dependent keys, observable collections
//! and view bindings.
//!
//! # Role
//! `kvo-runtime` sits between a model layer and a view layer. Models are
//! [`KvoObject`]s whose keys can be observed by key path; views hold
//! [`Binding`]s that mirror one model key path into one view property.
//!
//! # Primary responsibilities
//! - **Key paths**: dotted-path resolution that degrades to null on a miss.
//! - **Observation**: will/did change brackets, coalescing, dependent keys,
//!   chained observation through intermediates.
//! - **Collections**: [`KvoArray`] with insert/remove/replace change records.
//! - **Bindings**: placeholder substitution, transformers, formatters,
//!   two-way write-back.
//!
//! # Feature flags
//! - `tracing`: debug span around every notification fan-out.
//! - `config`: load [`BindingDefaults`] from TOML or JSON.

pub mod config;
pub mod error;
pub mod key_path;
pub mod reactive;
pub mod value;

pub use config::BindingDefaults;
pub use error::{KvoError, KvoResult};
pub use key_path::KeyPath;
pub use reactive::{
    Binding, BindingDirection, BindingOptions, BindingScope, BindingTarget, BoundValue, Change,
    ChangeKind, KvoArray, KvoClass, KvoObject, MarkerType, ObservedField, ObserverId,
    Placeholders, Registry,
};
pub use value::{FromValue, Marker, Value};
