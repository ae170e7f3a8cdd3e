#![forbid(unsafe_code)]

//! Per-type descriptors: explicit accessor pairs and dependent-key declarations.
//!
//! A [`KvoClass`] plays the role of a type: many [`KvoObject`]s share one
//! class through an `Rc`. Keys without declared accessors fall back to the
//! object's raw backing store.
//!
//! # Usage
//!
//! ```ignore
//! let person = KvoClass::builder("Person")
//!     .getter("fullName", |obj| {
//!         let first = obj.value_for_key("first");
//!         let last = obj.value_for_key("last");
//!         Value::from(format!("{first} {last}"))
//!     })
//!     .dependent_key("fullName", ["first", "last"])
//!     .build()?;
//!
//! let jane = KvoObject::with_class(&person);
//! ```

use std::collections::HashMap;
use std::fmt;
use std::rc::Rc;

use super::dependents::DependencyGraph;
use super::observable::KvoObject;
use crate::error::{KvoError, KvoResult};
use crate::value::Value;

/// Explicit getter: computes the value for a key.
pub type Getter = Rc<dyn Fn(&KvoObject) -> Value>;
/// Explicit setter: stores a value for a key, usually via
/// [`KvoObject::set_raw_value`]. Runs inside the change bracket.
pub type Setter = Rc<dyn Fn(&KvoObject, Value)>;

/// What a key supports, resolved once per key per object.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct KeyCapabilities {
    pub has_getter: bool,
    pub has_setter: bool,
}

impl KeyCapabilities {
    /// Keys with a getter and no setter cannot be written.
    #[must_use]
    pub fn is_read_only(self) -> bool {
        self.has_getter && !self.has_setter
    }
}

#[derive(Clone, Default)]
struct Accessors {
    getter: Option<Getter>,
    setter: Option<Setter>,
}

/// Shared descriptor for a family of observable objects.
pub struct KvoClass {
    name: String,
    accessors: HashMap<String, Accessors>,
    dependencies: DependencyGraph,
}

impl fmt::Debug for KvoClass {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let mut keys: Vec<&str> = self.accessors.keys().map(String::as_str).collect();
        keys.sort_unstable();
        f.debug_struct("KvoClass")
            .field("name", &self.name)
            .field("accessor_keys", &keys)
            .field("dependencies", &self.dependencies)
            .finish()
    }
}

thread_local! {
    static PLAIN: Rc<KvoClass> = Rc::new(KvoClass {
        name: "Object".to_owned(),
        accessors: HashMap::new(),
        dependencies: DependencyGraph::new(),
    });
}

impl KvoClass {
    #[must_use]
    pub fn builder(name: impl Into<String>) -> KvoClassBuilder {
        KvoClassBuilder {
            name: name.into(),
            accessors: HashMap::new(),
            dependencies: Vec::new(),
        }
    }

    /// The accessor-free class used by adapted plain data.
    #[must_use]
    pub fn plain() -> Rc<KvoClass> {
        PLAIN.with(Rc::clone)
    }

    #[must_use]
    pub fn name(&self) -> &str {
        &self.name
    }

    #[must_use]
    pub fn capabilities(&self, key: &str) -> KeyCapabilities {
        self.accessors
            .get(key)
            .map(|a| KeyCapabilities {
                has_getter: a.getter.is_some(),
                has_setter: a.setter.is_some(),
            })
            .unwrap_or_default()
    }

    #[must_use]
    pub fn dependencies(&self) -> &DependencyGraph {
        &self.dependencies
    }

    pub(crate) fn getter(&self, key: &str) -> Option<Getter> {
        self.accessors.get(key).and_then(|a| a.getter.clone())
    }

    pub(crate) fn setter(&self, key: &str) -> Option<Setter> {
        self.accessors.get(key).and_then(|a| a.setter.clone())
    }
}

/// Builder for [`KvoClass`]. Validation happens in [`build`](Self::build).
pub struct KvoClassBuilder {
    name: String,
    accessors: HashMap<String, Accessors>,
    dependencies: Vec<(String, Vec<String>)>,
}

impl fmt::Debug for KvoClassBuilder {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("KvoClassBuilder")
            .field("name", &self.name)
            .field("accessor_count", &self.accessors.len())
            .field("dependency_count", &self.dependencies.len())
            .finish()
    }
}

impl KvoClassBuilder {
    /// Declare an explicit getter for `key`.
    #[must_use]
    pub fn getter(mut self, key: impl Into<String>, f: impl Fn(&KvoObject) -> Value + 'static) -> Self {
        self.accessors.entry(key.into()).or_default().getter = Some(Rc::new(f));
        self
    }

    /// Declare an explicit setter for `key`. A getter must also be declared.
    #[must_use]
    pub fn setter(mut self, key: impl Into<String>, f: impl Fn(&KvoObject, Value) + 'static) -> Self {
        self.accessors.entry(key.into()).or_default().setter = Some(Rc::new(f));
        self
    }

    /// Declare a getter/setter pair backed by a private raw key.
    ///
    /// Equivalent to a hand-written `key()` / `setKey(value)` pair storing
    /// into `storage_key`.
    #[must_use]
    pub fn stored(self, key: impl Into<String>, storage_key: impl Into<String>) -> Self {
        let key = key.into();
        let storage: Rc<str> = Rc::from(storage_key.into());
        let read = Rc::clone(&storage);
        self.getter(key.clone(), move |obj| obj.raw_value(&read))
            .setter(key, move |obj, value| obj.set_raw_value(&storage, value))
    }

    /// Declare that `key` is derived from `prerequisites`.
    #[must_use]
    pub fn dependent_key<I, S>(mut self, key: impl Into<String>, prerequisites: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.dependencies.push((
            key.into(),
            prerequisites.into_iter().map(Into::into).collect(),
        ));
        self
    }

    /// Validate and freeze the class.
    ///
    /// # Errors
    ///
    /// [`KvoError::SetterWithoutGetter`] for a setter with no getter, and
    /// [`KvoError::DependencyCycle`] for cyclic dependent keys.
    pub fn build(self) -> KvoResult<Rc<KvoClass>> {
        let mut orphaned: Vec<&String> = self
            .accessors
            .iter()
            .filter(|(_, a)| a.setter.is_some() && a.getter.is_none())
            .map(|(k, _)| k)
            .collect();
        orphaned.sort_unstable();
        if let Some(key) = orphaned.first() {
            return Err(KvoError::SetterWithoutGetter {
                key: (*key).clone(),
            });
        }

        let mut dependencies = DependencyGraph::new();
        for (key, prerequisites) in self.dependencies {
            dependencies.declare(&key, prerequisites)?;
        }

        tracing::debug!(class = %self.name, keys = self.accessors.len(), "built kvo class");
        Ok(Rc::new(KvoClass {
            name: self.name,
            accessors: self.accessors,
            dependencies,
        }))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn capabilities_reflect_declarations() {
        let class = KvoClass::builder("Thing")
            .getter("computed", |_| Value::from(1))
            .stored("name", "__name")
            .build()
            .unwrap();
        assert_eq!(
            class.capabilities("computed"),
            KeyCapabilities {
                has_getter: true,
                has_setter: false
            }
        );
        assert!(class.capabilities("computed").is_read_only());
        assert!(!class.capabilities("name").is_read_only());
        assert_eq!(class.capabilities("other"), KeyCapabilities::default());
    }

    #[test]
    fn setter_without_getter_is_rejected() {
        let err = KvoClass::builder("Broken")
            .setter("name", |_, _| {})
            .build()
            .unwrap_err();
        assert_eq!(err, KvoError::SetterWithoutGetter { key: "name".into() });
    }

    #[test]
    fn cyclic_dependencies_fail_at_build() {
        let err = KvoClass::builder("Loop")
            .dependent_key("a", ["b"])
            .dependent_key("b", ["a"])
            .build()
            .unwrap_err();
        assert!(matches!(err, KvoError::DependencyCycle { .. }));
    }

    #[test]
    fn plain_class_is_shared() {
        assert!(Rc::ptr_eq(&KvoClass::plain(), &KvoClass::plain()));
        assert_eq!(KvoClass::plain().name(), "Object");
    }
}
