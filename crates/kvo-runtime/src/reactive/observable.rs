#![forbid(unsafe_code)]

//! Observable objects: keyed storage with intercepted get/set and
//! key-path observation.
//!
//! # Design
//!
//! [`KvoObject`] wraps a backing store (`key -> Value`) in shared,
//! reference-counted storage (`Rc<RefCell<..>>`). Cloning a `KvoObject`
//! creates another handle to the **same** object.
//!
//! Reads go through [`value_for_key`](KvoObject::value_for_key): the class's
//! explicit getter if one is declared, otherwise the raw stored value,
//! otherwise `Value::Null`. Writes go through
//! [`set_value_for_key`](KvoObject::set_value_for_key), which brackets the
//! mutation so listeners and dependent keys are notified.
//!
//! The accessor lookup for a key is installed the first time the key is
//! touched on an instance and reused afterwards.
//!
//! # Observation
//!
//! Observing `a.b.c` registers a listener for `a` here, and a chained
//! registration for `b.c` on whatever object `a` currently holds (and so on
//! down the path). When `a` is replaced the chain moves to the new object and
//! the old chain is removed.
//!
//! # Failure Modes
//!
//! - **Raw writes**: [`set_raw_value`](KvoObject::set_raw_value) bypasses
//!   notification. It is meant for accessor implementations and for
//!   explicitly bracketed updates.
//! - **Read-only keys**: writing a key with a getter and no setter fails with
//!   [`KvoError::ReadOnlyKey`].

use std::cell::RefCell;
use std::collections::HashMap;
use std::fmt;
use std::rc::Rc;
use std::sync::atomic::{AtomicU64, Ordering};

use super::class::{Getter, KeyCapabilities, KvoClass, Setter};
use super::dispatch::{Change, ObserverContext, ObserverEntry, ObserverId, PendingChange};
use crate::error::{KvoError, KvoResult};
use crate::key_path::{self, KeyPath};
use crate::value::Value;

/// Accessors for one key, resolved once per instance.
#[derive(Clone, Default)]
struct InstalledKey {
    capabilities: KeyCapabilities,
    getter: Option<Getter>,
    setter: Option<Setter>,
}

#[derive(Default)]
pub(crate) struct ObjectState {
    store: HashMap<String, Value>,
    installed: HashMap<String, InstalledKey>,
    pub(crate) observers: HashMap<String, Vec<Rc<ObserverEntry>>>,
    pub(crate) pending: HashMap<String, PendingChange>,
}

struct ObjectInner {
    id: u64,
    class: Rc<KvoClass>,
    state: RefCell<ObjectState>,
}

/// A shared handle to an observable object.
///
/// # Invariants
///
/// 1. Accessor interception for a key is installed at most once per instance.
/// 2. `set_value_for_key` completes all listener and dependent-key delivery
///    before returning.
/// 3. Removing a registration that does not exist is a no-op.
pub struct KvoObject {
    inner: Rc<ObjectInner>,
}

impl Clone for KvoObject {
    fn clone(&self) -> Self {
        Self {
            inner: Rc::clone(&self.inner),
        }
    }
}

impl fmt::Debug for KvoObject {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let mut debug = f.debug_struct("KvoObject");
        debug
            .field("id", &self.inner.id)
            .field("class", &self.inner.class.name());
        if let Ok(state) = self.inner.state.try_borrow() {
            debug
                .field("keys", &state.store.len())
                .field("observed_keys", &state.observers.len());
        }
        debug.finish()
    }
}

impl Default for KvoObject {
    fn default() -> Self {
        Self::new()
    }
}

impl KvoObject {
    /// Create an empty object of the plain class.
    #[must_use]
    pub fn new() -> Self {
        Self::with_class(&KvoClass::plain())
    }

    /// Create an empty object of `class`.
    #[must_use]
    pub fn with_class(class: &Rc<KvoClass>) -> Self {
        static NEXT_ID: AtomicU64 = AtomicU64::new(1);
        Self {
            inner: Rc::new(ObjectInner {
                id: NEXT_ID.fetch_add(1, Ordering::Relaxed),
                class: Rc::clone(class),
                state: RefCell::new(ObjectState::default()),
            }),
        }
    }

    /// Adapt plain key/value data into an observable object.
    ///
    /// The pairs become the raw backing store; nothing is notified.
    #[must_use]
    pub fn adapt<I, K, V>(values: I) -> Self
    where
        I: IntoIterator<Item = (K, V)>,
        K: Into<String>,
        V: Into<Value>,
    {
        Self::with_class_and_values(&KvoClass::plain(), values)
    }

    /// Create an object of `class` whose raw store is seeded from `values`.
    #[must_use]
    pub fn with_class_and_values<I, K, V>(class: &Rc<KvoClass>, values: I) -> Self
    where
        I: IntoIterator<Item = (K, V)>,
        K: Into<String>,
        V: Into<Value>,
    {
        let obj = Self::with_class(class);
        {
            let mut state = obj.inner.state.borrow_mut();
            state
                .store
                .extend(values.into_iter().map(|(k, v)| (k.into(), v.into())));
        }
        obj
    }

    /// Process-unique id, used in logs and `Debug` output.
    #[must_use]
    pub fn id(&self) -> u64 {
        self.inner.id
    }

    #[must_use]
    pub fn class(&self) -> &Rc<KvoClass> {
        &self.inner.class
    }

    /// Whether both handles refer to the same object.
    #[must_use]
    pub fn ptr_eq(&self, other: &KvoObject) -> bool {
        Rc::ptr_eq(&self.inner, &other.inner)
    }

    pub(crate) fn state(&self) -> &RefCell<ObjectState> {
        &self.inner.state
    }

    /// Capabilities of `key`, installing its accessors on first use.
    #[must_use]
    pub fn capabilities(&self, key: &str) -> KeyCapabilities {
        self.install(key).capabilities
    }

    fn install(&self, key: &str) -> InstalledKey {
        if let Some(installed) = self.inner.state.borrow().installed.get(key) {
            return installed.clone();
        }
        let class = &self.inner.class;
        let installed = InstalledKey {
            capabilities: class.capabilities(key),
            getter: class.getter(key),
            setter: class.setter(key),
        };
        tracing::trace!(
            object = self.inner.id,
            key,
            has_getter = installed.capabilities.has_getter,
            has_setter = installed.capabilities.has_setter,
            "installed key accessors"
        );
        self.inner
            .state
            .borrow_mut()
            .installed
            .insert(key.to_owned(), installed.clone());
        installed
    }

    /// Number of keys whose accessors have been installed on this instance.
    #[must_use]
    pub fn installed_key_count(&self) -> usize {
        self.inner.state.borrow().installed.len()
    }

    /// The value for `key`. Unknown keys yield `Value::Null`.
    #[must_use]
    pub fn value_for_key(&self, key: &str) -> Value {
        match self.install(key).getter {
            Some(getter) => getter(self),
            None => self.raw_value(key),
        }
    }

    /// Set `key` to `value`, notifying listeners and dependents.
    ///
    /// # Errors
    ///
    /// [`KvoError::ReadOnlyKey`] if the key has a getter but no setter.
    pub fn set_value_for_key(&self, value: Value, key: &str) -> KvoResult<()> {
        let installed = self.install(key);
        if installed.capabilities.is_read_only() {
            return Err(KvoError::ReadOnlyKey {
                key: key.to_owned(),
            });
        }
        self.will_change_value_for_key(key);
        match installed.setter {
            Some(setter) => setter(self, value),
            None => self.set_raw_value(key, value),
        }
        self.did_change_value_for_key(key);
        Ok(())
    }

    /// The value at `path`; a miss anywhere along the path yields `Value::Null`.
    #[must_use]
    pub fn value_for_key_path(&self, path: &str) -> Value {
        key_path::resolve(&Value::Object(self.clone()), path)
    }

    /// Assign `value` at `path`.
    ///
    /// # Errors
    ///
    /// See [`key_path::assign`].
    pub fn set_value_for_key_path(&self, value: Value, path: &str) -> KvoResult<()> {
        key_path::assign(self, path, value)
    }

    /// The raw stored value for `key`, bypassing accessors.
    #[must_use]
    pub fn raw_value(&self, key: &str) -> Value {
        self.inner
            .state
            .borrow()
            .store
            .get(key)
            .cloned()
            .unwrap_or_default()
    }

    /// Store `value` for `key` without notifying anyone.
    pub fn set_raw_value(&self, key: &str, value: Value) {
        self.inner
            .state
            .borrow_mut()
            .store
            .insert(key.to_owned(), value);
    }

    /// Keys present in the raw store, sorted.
    #[must_use]
    pub fn keys(&self) -> Vec<String> {
        let mut keys: Vec<String> = self.inner.state.borrow().store.keys().cloned().collect();
        keys.sort_unstable();
        keys
    }

    /// Register `callback` for changes along `key_path`.
    ///
    /// `context` is handed back on every delivery. Registering the same
    /// `(observer, key_path)` twice yields two independent registrations.
    ///
    /// # Errors
    ///
    /// [`KvoError::MalformedKeyPath`] for an unparsable path.
    pub fn add_observer_for_key_path<F>(
        &self,
        observer: ObserverId,
        key_path: &str,
        context: Option<ObserverContext>,
        callback: F,
    ) -> KvoResult<()>
    where
        F: Fn(&Change, &KeyPath, Option<&ObserverContext>) + 'static,
    {
        let path = KeyPath::parse(key_path)?;
        tracing::debug!(object = self.inner.id, observer = observer.get(), key_path, "add observer");
        self.attach_entry(ObserverEntry::new(observer, path, Rc::new(callback), context));
        Ok(())
    }

    /// Register a callback under a freshly allocated observer id.
    ///
    /// # Errors
    ///
    /// [`KvoError::MalformedKeyPath`] for an unparsable path.
    pub fn observe<F>(&self, key_path: &str, callback: F) -> KvoResult<ObserverId>
    where
        F: Fn(&Change) + 'static,
    {
        let id = ObserverId::next();
        self.add_observer_for_key_path(id, key_path, None, move |change, _, _| callback(change))?;
        Ok(id)
    }

    /// Remove every registration of `observer` for `key_path`, including the
    /// chained registrations it holds on intermediate objects.
    ///
    /// Removing a registration that does not exist is a no-op.
    pub fn remove_observer_for_key_path(&self, observer: ObserverId, key_path: &str) {
        let Ok(path) = KeyPath::parse(key_path) else {
            return;
        };
        let removed: Vec<Rc<ObserverEntry>> = {
            let mut state = self.inner.state.borrow_mut();
            let Some(entries) = state.observers.get_mut(path.first()) else {
                return;
            };
            let (removed, kept): (Vec<_>, Vec<_>) = entries
                .drain(..)
                .partition(|e| e.observer == observer && e.path == path);
            *entries = kept;
            if entries.is_empty() {
                state.observers.remove(path.first());
            }
            removed
        };
        if !removed.is_empty() {
            tracing::debug!(
                object = self.inner.id,
                observer = observer.get(),
                key_path,
                "remove observer"
            );
        }
        for entry in removed {
            entry.deactivate();
        }
    }

    /// Active registrations whose first key is `key`.
    #[must_use]
    pub fn observer_count(&self, key: &str) -> usize {
        self.inner
            .state
            .borrow()
            .observers
            .get(key)
            .map_or(0, |entries| entries.iter().filter(|e| e.is_active()).count())
    }

    /// Whether any key on this object has an active registration.
    #[must_use]
    pub fn has_observers(&self) -> bool {
        self.inner
            .state
            .borrow()
            .observers
            .values()
            .any(|entries| entries.iter().any(|e| e.is_active()))
    }

    pub(crate) fn attach_entry(&self, entry: Rc<ObserverEntry>) {
        let key = entry.path.first().to_owned();
        self.inner
            .state
            .borrow_mut()
            .observers
            .entry(key.clone())
            .or_default()
            .push(Rc::clone(&entry));
        let current = self.value_for_key(&key);
        entry.link_to(&current);
    }
}
