#![forbid(unsafe_code)]

//! Key-value observation and bindings.
//!
//! - [`KvoObject`]: keyed storage with intercepted get/set and key-path
//!   observation.
//! - [`KvoClass`]: per-type accessors and dependent-key declarations.
//! - [`KvoArray`]: an observable collection with element-level change records.
//! - [`ObservedField`]: a typed handle to one observable key.
//! - [`Registry`]: named models addressable from key paths.
//! - [`Binding`] / [`BindingScope`]: keep view properties in sync with model
//!   key paths.
//!
//! # Architecture
//!
//! All handles are `Rc`-based and single-threaded. Mutations notify
//! synchronously: when `set_value_for_key` returns, every listener and
//! dependent key has already been delivered.
//!
//! # Invariants
//!
//! 1. Nested change brackets on a key coalesce into one notification.
//! 2. A dependent key notifies once per outer change, after its prerequisites.
//! 3. Chained observations follow replaced intermediates and leave nothing
//!    registered on the old ones.
//! 4. Removing an observer or unbinding twice is a no-op.

pub mod binding;
pub mod class;
pub mod collection;
pub mod dependents;
pub mod dispatch;
pub mod field;
pub mod observable;
pub mod registry;
pub mod transform;

pub use binding::{
    Binding, BindingDirection, BindingOptions, BindingScope, BindingTarget, BoundValue,
    MarkerType, Placeholders,
};
pub use class::{Getter, KeyCapabilities, KvoClass, KvoClassBuilder, Setter};
pub use collection::{KvoArray, ToManyRelation};
pub use dependents::DependencyGraph;
pub use dispatch::{Change, ChangeKind, ObserverContext, ObserverFn, ObserverId};
pub use field::ObservedField;
pub use observable::KvoObject;
pub use registry::Registry;
pub use transform::{Formatter, FnTransformer, NegateBoolean, NumberFormatter, ValueTransformer};
