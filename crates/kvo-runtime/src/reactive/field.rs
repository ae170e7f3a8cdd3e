#![forbid(unsafe_code)]

//! Typed handles to a single observable key.
//!
//! An [`ObservedField<T>`] owns no storage of its own: every read and write
//! routes through the object's `value_for_key` / `set_value_for_key`, so a
//! mutation made through the field is always announced to observers.

use std::fmt;
use std::marker::PhantomData;

use super::dispatch::{Change, ObserverId};
use super::observable::KvoObject;
use crate::error::{KvoError, KvoResult};
use crate::value::{FromValue, Value};

/// A typed view of one key on one [`KvoObject`].
pub struct ObservedField<T> {
    object: KvoObject,
    key: String,
    _marker: PhantomData<fn() -> T>,
}

impl<T> Clone for ObservedField<T> {
    fn clone(&self) -> Self {
        Self {
            object: self.object.clone(),
            key: self.key.clone(),
            _marker: PhantomData,
        }
    }
}

impl<T> fmt::Debug for ObservedField<T> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ObservedField")
            .field("object", &self.object.id())
            .field("key", &self.key)
            .finish()
    }
}

impl<T: FromValue + Into<Value>> ObservedField<T> {
    #[must_use]
    pub fn new(object: &KvoObject, key: impl Into<String>) -> Self {
        Self {
            object: object.clone(),
            key: key.into(),
            _marker: PhantomData,
        }
    }

    #[must_use]
    pub fn key(&self) -> &str {
        &self.key
    }

    #[must_use]
    pub fn object(&self) -> &KvoObject {
        &self.object
    }

    /// Current value, or `None` when null or of another type.
    #[must_use]
    pub fn get(&self) -> Option<T> {
        T::from_value(&self.object.value_for_key(&self.key))
    }

    /// Assign and notify.
    ///
    /// # Errors
    ///
    /// Propagates [`KvoObject::set_value_for_key`] errors.
    pub fn set(&self, value: T) -> KvoResult<()> {
        self.object.set_value_for_key(value.into(), &self.key)
    }

    /// Reset the key to null and notify.
    ///
    /// # Errors
    ///
    /// Propagates [`KvoObject::set_value_for_key`] errors.
    pub fn clear(&self) -> KvoResult<()> {
        self.object.set_value_for_key(Value::Null, &self.key)
    }

    /// Read, transform and write back in a single bracketed change.
    ///
    /// # Errors
    ///
    /// [`KvoError::ReadOnlyKey`] before anything is bracketed or notified;
    /// otherwise propagates [`KvoObject::set_value_for_key`] errors.
    pub fn update(&self, f: impl FnOnce(Option<T>) -> T) -> KvoResult<()> {
        if self.object.capabilities(&self.key).is_read_only() {
            return Err(KvoError::ReadOnlyKey {
                key: self.key.clone(),
            });
        }
        self.object.with_changes_for_keys(&[self.key.as_str()], |obj| {
            let next = f(self.get());
            obj.set_value_for_key(next.into(), &self.key)
        })
    }

    /// Observe this key with a typed callback.
    ///
    /// # Errors
    ///
    /// Propagates [`KvoObject::add_observer_for_key_path`] errors.
    pub fn observe(&self, callback: impl Fn(Option<T>, &Change) + 'static) -> KvoResult<ObserverId> {
        self.object
            .observe(&self.key, move |change| callback(T::from_value(&change.new_value), change))
    }

    /// Remove an observation created by [`observe`](Self::observe).
    pub fn unobserve(&self, observer: ObserverId) {
        self.object.remove_observer_for_key_path(observer, &self.key);
    }
}

impl KvoObject {
    /// A typed handle to `key` on this object.
    #[must_use]
    pub fn field<T: FromValue + Into<Value>>(&self, key: impl Into<String>) -> ObservedField<T> {
        ObservedField::new(self, key)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::cell::RefCell;
    use std::rc::Rc;

    #[test]
    fn typed_round_trip() {
        let person = KvoObject::adapt([("age", 41)]);
        let age = person.field::<i64>("age");
        assert_eq!(age.get(), Some(41));
        age.set(42).unwrap();
        assert_eq!(person.value_for_key("age"), Value::from(42));
    }

    #[test]
    fn mismatched_type_reads_as_none() {
        let person = KvoObject::adapt([("age", "old")]);
        assert_eq!(person.field::<i64>("age").get(), None);
        assert_eq!(person.field::<String>("age").get(), Some("old".to_owned()));
    }

    #[test]
    fn field_writes_are_observed() {
        let person = KvoObject::adapt([("name", "john")]);
        let name = person.field::<String>("name");
        let seen = Rc::new(RefCell::new(Vec::new()));
        let sink = Rc::clone(&seen);
        let id = name
            .observe(move |value, _| sink.borrow_mut().push(value))
            .unwrap();

        name.set("jane".to_owned()).unwrap();
        name.clear().unwrap();
        name.unobserve(id);
        name.set("ignored".to_owned()).unwrap();

        assert_eq!(*seen.borrow(), vec![Some("jane".to_owned()), None]);
    }

    #[test]
    fn update_notifies_once() {
        let counter = KvoObject::adapt([("hits", 0)]);
        let hits = counter.field::<i64>("hits");
        let calls = Rc::new(RefCell::new(0));
        let sink = Rc::clone(&calls);
        hits.observe(move |_, _| *sink.borrow_mut() += 1).unwrap();

        hits.update(|n| n.unwrap_or_default() + 1).unwrap();
        assert_eq!(hits.get(), Some(1));
        assert_eq!(*calls.borrow(), 1);
    }

    #[test]
    fn update_on_read_only_key_fails_silently_for_observers() {
        let class = crate::reactive::class::KvoClass::builder("Clock")
            .getter("ticks", |obj| obj.raw_value("__ticks"))
            .build()
            .unwrap();
        let clock = KvoObject::with_class(&class);
        let ticks = clock.field::<i64>("ticks");
        let calls = Rc::new(RefCell::new(0));
        let sink = Rc::clone(&calls);
        ticks.observe(move |_, _| *sink.borrow_mut() += 1).unwrap();

        let err = ticks.update(|n| n.unwrap_or_default() + 1).unwrap_err();
        assert_eq!(err, KvoError::ReadOnlyKey { key: "ticks".into() });
        assert_eq!(*calls.borrow(), 0);
        assert!(!clock.is_changing("ticks"));
    }
}
