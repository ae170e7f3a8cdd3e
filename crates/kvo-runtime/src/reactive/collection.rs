#![forbid(unsafe_code)]

//! Observable collections with structured change records.
//!
//! A [`KvoArray`] reports element-level mutations (`Insert`, `Remove`,
//! `Replace`, each with an index) instead of opaque whole-value replacement.
//! Replacing the array *reference* stored under a key is still a `Set` on the
//! owning object.
//!
//! Observers of a key whose value is a `KvoArray` also receive the array's
//! element-level changes, reported under the observed key path.
//!
//! # Invariants
//!
//! 1. `add_object` of a value already present is a no-op: no duplicate, no
//!    notification. Membership uses [`Value::same_member`], so a float NaN
//!    counts as present once added.
//! 2. Every successful mutation delivers exactly one change record.
//! 3. Failed mutations (index out of bounds) leave the array untouched and
//!    deliver nothing.

use std::cell::{Cell, RefCell};
use std::fmt;
use std::rc::Rc;
use std::sync::atomic::{AtomicU64, Ordering};

use super::dispatch::{Change, ObserverId};
use super::observable::KvoObject;
use crate::error::{KvoError, KvoResult};
use crate::value::Value;

type ArrayCallback = Rc<dyn Fn(&Change)>;

struct ArrayObserver {
    observer: ObserverId,
    callback: ArrayCallback,
    active: Cell<bool>,
}

struct ArrayInner {
    id: u64,
    items: RefCell<Vec<Value>>,
    observers: RefCell<Vec<Rc<ArrayObserver>>>,
}

/// A shared, observable list of values.
///
/// Cloning creates a new handle to the **same** list.
pub struct KvoArray {
    inner: Rc<ArrayInner>,
}

impl Clone for KvoArray {
    fn clone(&self) -> Self {
        Self {
            inner: Rc::clone(&self.inner),
        }
    }
}

impl fmt::Debug for KvoArray {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("KvoArray")
            .field("id", &self.inner.id)
            .field("items", &*self.inner.items.borrow())
            .field("observer_count", &self.observer_count())
            .finish()
    }
}

impl Default for KvoArray {
    fn default() -> Self {
        Self::new()
    }
}

impl<V: Into<Value>> FromIterator<V> for KvoArray {
    fn from_iter<I: IntoIterator<Item = V>>(iter: I) -> Self {
        Self::from_values(iter)
    }
}

impl KvoArray {
    #[must_use]
    pub fn new() -> Self {
        Self::from_values(std::iter::empty::<Value>())
    }

    #[must_use]
    pub fn from_values<I, V>(values: I) -> Self
    where
        I: IntoIterator<Item = V>,
        V: Into<Value>,
    {
        static NEXT_ID: AtomicU64 = AtomicU64::new(1);
        Self {
            inner: Rc::new(ArrayInner {
                id: NEXT_ID.fetch_add(1, Ordering::Relaxed),
                items: RefCell::new(values.into_iter().map(Into::into).collect()),
                observers: RefCell::new(Vec::new()),
            }),
        }
    }

    #[must_use]
    pub fn id(&self) -> u64 {
        self.inner.id
    }

    #[must_use]
    pub fn ptr_eq(&self, other: &KvoArray) -> bool {
        Rc::ptr_eq(&self.inner, &other.inner)
    }

    #[must_use]
    pub fn len(&self) -> usize {
        self.inner.items.borrow().len()
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.inner.items.borrow().is_empty()
    }

    #[must_use]
    pub fn get(&self, index: usize) -> Option<Value> {
        self.inner.items.borrow().get(index).cloned()
    }

    /// Snapshot of the current elements.
    #[must_use]
    pub fn to_vec(&self) -> Vec<Value> {
        self.inner.items.borrow().clone()
    }

    #[must_use]
    pub fn index_of_object(&self, value: &Value) -> Option<usize> {
        self.inner.items.borrow().iter().position(|v| v.same_member(value))
    }

    #[must_use]
    pub fn contains(&self, value: &Value) -> bool {
        self.index_of_object(value).is_some()
    }

    /// Append `value` unless an equal value is already present.
    ///
    /// Returns whether the value was added.
    pub fn add_object(&self, value: impl Into<Value>) -> bool {
        let value = value.into();
        let index = {
            let mut items = self.inner.items.borrow_mut();
            if items.iter().any(|v| v.same_member(&value)) {
                return false;
            }
            items.push(value.clone());
            items.len() - 1
        };
        self.notify(&Change::insert(index, value));
        true
    }

    /// Insert `value` at `index`, shifting later elements.
    ///
    /// # Errors
    ///
    /// [`KvoError::IndexOutOfBounds`] if `index > len`.
    pub fn insert_object_at_index(&self, value: impl Into<Value>, index: usize) -> KvoResult<()> {
        let value = value.into();
        {
            let mut items = self.inner.items.borrow_mut();
            if index > items.len() {
                return Err(KvoError::IndexOutOfBounds {
                    index,
                    len: items.len(),
                });
            }
            items.insert(index, value.clone());
        }
        self.notify(&Change::insert(index, value));
        Ok(())
    }

    /// Remove and return the element at `index`.
    ///
    /// # Errors
    ///
    /// [`KvoError::IndexOutOfBounds`] if `index >= len`.
    pub fn remove_object_at_index(&self, index: usize) -> KvoResult<Value> {
        let removed = {
            let mut items = self.inner.items.borrow_mut();
            if index >= items.len() {
                return Err(KvoError::IndexOutOfBounds {
                    index,
                    len: items.len(),
                });
            }
            items.remove(index)
        };
        self.notify(&Change::remove(index, removed.clone()));
        Ok(removed)
    }

    /// Replace the element at `index`, returning the previous element.
    ///
    /// # Errors
    ///
    /// [`KvoError::IndexOutOfBounds`] if `index >= len`.
    pub fn replace_object_at_index(&self, value: impl Into<Value>, index: usize) -> KvoResult<Value> {
        let value = value.into();
        let previous = {
            let mut items = self.inner.items.borrow_mut();
            let len = items.len();
            let Some(slot) = items.get_mut(index) else {
                return Err(KvoError::IndexOutOfBounds { index, len });
            };
            std::mem::replace(slot, value.clone())
        };
        self.notify(&Change::replace(index, previous.clone(), value));
        Ok(previous)
    }

    /// Remove the first element equal to `value`. Returns whether one was found.
    pub fn remove_object(&self, value: &Value) -> bool {
        match self.index_of_object(value) {
            Some(index) => self.remove_object_at_index(index).is_ok(),
            None => false,
        }
    }

    /// Register `callback` for element-level changes.
    pub fn add_observer(&self, observer: ObserverId, callback: impl Fn(&Change) + 'static) {
        self.inner.observers.borrow_mut().push(Rc::new(ArrayObserver {
            observer,
            callback: Rc::new(callback),
            active: Cell::new(true),
        }));
    }

    /// Remove every registration of `observer`. Idempotent.
    pub fn remove_observer(&self, observer: ObserverId) {
        self.inner.observers.borrow_mut().retain(|entry| {
            if entry.observer == observer {
                entry.active.set(false);
                false
            } else {
                true
            }
        });
    }

    #[must_use]
    pub fn observer_count(&self) -> usize {
        self.inner.observers.borrow().len()
    }

    fn notify(&self, change: &Change) {
        let observers: Vec<Rc<ArrayObserver>> = self.inner.observers.borrow().clone();
        tracing::trace!(
            array = self.inner.id,
            kind = ?change.kind,
            index = change.index,
            observers = observers.len(),
            "collection change"
        );
        for entry in observers {
            if entry.active.get() {
                (entry.callback)(change);
            }
        }
    }
}

/// A to-many relationship stored as a [`KvoArray`] under `key`.
///
/// Relating is idempotent: an already-related object is not added twice.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ToManyRelation {
    key: String,
}

impl ToManyRelation {
    #[must_use]
    pub fn new(key: impl Into<String>) -> Self {
        Self { key: key.into() }
    }

    #[must_use]
    pub fn key(&self) -> &str {
        &self.key
    }

    fn collection(&self, object: &KvoObject) -> KvoResult<KvoArray> {
        match object.value_for_key(&self.key) {
            Value::Array(array) => Ok(array),
            _ => Err(KvoError::NotACollection {
                key: self.key.clone(),
            }),
        }
    }

    /// Add `related` to the collection under `key` unless already present.
    ///
    /// # Errors
    ///
    /// [`KvoError::NotACollection`] if `key` does not hold a `KvoArray`.
    pub fn relate_objects(&self, object: &KvoObject, related: &KvoObject) -> KvoResult<()> {
        self.collection(object)?
            .add_object(Value::Object(related.clone()));
        Ok(())
    }

    /// Remove `related` from the collection under `key` if present.
    ///
    /// # Errors
    ///
    /// [`KvoError::NotACollection`] if `key` does not hold a `KvoArray`.
    pub fn unrelate_objects(&self, object: &KvoObject, related: &KvoObject) -> KvoResult<()> {
        let array = self.collection(object)?;
        if let Some(index) = array.index_of_object(&Value::Object(related.clone())) {
            array.remove_object_at_index(index)?;
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::reactive::dispatch::ChangeKind;

    fn recorded(array: &KvoArray) -> Rc<RefCell<Vec<Change>>> {
        let log = Rc::new(RefCell::new(Vec::new()));
        let sink = Rc::clone(&log);
        array.add_observer(ObserverId::next(), move |change| {
            sink.borrow_mut().push(change.clone());
        });
        log
    }

    #[test]
    fn add_object_emits_insert_at_end() {
        let array = KvoArray::from_values(["a", "b"]);
        let log = recorded(&array);
        assert!(array.add_object("c"));
        assert_eq!(*log.borrow(), vec![Change::insert(2, Value::from("c"))]);
    }

    #[test]
    fn add_object_is_idempotent() {
        let array = KvoArray::from_values([1, 2]);
        let log = recorded(&array);
        assert!(!array.add_object(2));
        assert_eq!(array.len(), 2);
        assert!(log.borrow().is_empty());
    }

    #[test]
    fn add_object_compares_objects_by_identity() {
        let array = KvoArray::new();
        let a = KvoObject::adapt([("n", 1)]);
        let twin = KvoObject::adapt([("n", 1)]);
        assert!(array.add_object(&a));
        assert!(!array.add_object(a.clone()));
        assert!(array.add_object(&twin));
        assert_eq!(array.len(), 2);
    }

    #[test]
    fn insert_and_remove_report_indexes() {
        let array = KvoArray::from_values(["a", "c"]);
        let log = recorded(&array);
        array.insert_object_at_index("b", 1).unwrap();
        let removed = array.remove_object_at_index(0).unwrap();
        assert_eq!(removed, Value::from("a"));
        assert_eq!(array.to_vec(), vec![Value::from("b"), Value::from("c")]);

        let log = log.borrow();
        assert_eq!(log[0].kind, ChangeKind::Insert);
        assert_eq!(log[0].index, Some(1));
        assert_eq!(log[1].kind, ChangeKind::Remove);
        assert_eq!(log[1].index, Some(0));
        assert_eq!(log[1].old_value, Value::from("a"));
    }

    #[test]
    fn insert_allows_duplicates() {
        let array = KvoArray::from_values([1]);
        array.insert_object_at_index(1, 0).unwrap();
        assert_eq!(array.len(), 2);
    }

    #[test]
    fn replace_reports_old_and_new() {
        let array = KvoArray::from_values([1, 2]);
        let log = recorded(&array);
        let previous = array.replace_object_at_index(20, 1).unwrap();
        assert_eq!(previous, Value::from(2));
        assert_eq!(
            *log.borrow(),
            vec![Change::replace(1, Value::from(2), Value::from(20))]
        );
    }

    #[test]
    fn out_of_bounds_leaves_array_untouched() {
        let array = KvoArray::from_values([1]);
        let log = recorded(&array);
        assert_eq!(
            array.insert_object_at_index(9, 2),
            Err(KvoError::IndexOutOfBounds { index: 2, len: 1 })
        );
        assert!(array.remove_object_at_index(1).is_err());
        assert!(array.replace_object_at_index(0, 5).is_err());
        assert_eq!(array.to_vec(), vec![Value::from(1)]);
        assert!(log.borrow().is_empty());
    }

    #[test]
    fn remove_observer_is_idempotent() {
        let array = KvoArray::new();
        let id = ObserverId::next();
        array.add_observer(id, |_| {});
        array.remove_observer(id);
        array.remove_observer(id);
        assert_eq!(array.observer_count(), 0);
    }

    #[test]
    fn key_observers_receive_element_changes() {
        let items = KvoArray::new();
        let owner = KvoObject::adapt([("items", Value::from(items.clone()))]);
        let seen = Rc::new(RefCell::new(Vec::new()));
        let sink = Rc::clone(&seen);
        owner
            .add_observer_for_key_path(ObserverId::next(), "items", None, move |change, path, _| {
                sink.borrow_mut().push((path.to_string(), change.kind, change.index));
            })
            .unwrap();

        items.add_object("x");
        let replacement = KvoArray::from_values(["y"]);
        owner
            .set_value_for_key(Value::from(replacement.clone()), "items")
            .unwrap();
        items.add_object("stale");
        replacement.remove_object_at_index(0).unwrap();

        assert_eq!(
            *seen.borrow(),
            vec![
                ("items".to_owned(), ChangeKind::Insert, Some(0)),
                ("items".to_owned(), ChangeKind::Set, None),
                ("items".to_owned(), ChangeKind::Remove, Some(0)),
            ]
        );
        assert_eq!(items.observer_count(), 0);
    }

    #[test]
    fn to_many_relation_relates_idempotently() {
        let team = KvoObject::adapt([("members", Value::from(KvoArray::new()))]);
        let ada = KvoObject::adapt([("name", "ada")]);
        let relation = ToManyRelation::new("members");

        relation.relate_objects(&team, &ada).unwrap();
        relation.relate_objects(&team, &ada).unwrap();
        let members = team.value_for_key("members");
        assert_eq!(members.as_array().map(KvoArray::len), Some(1));

        relation.unrelate_objects(&team, &ada).unwrap();
        relation.unrelate_objects(&team, &ada).unwrap();
        assert_eq!(members.as_array().map(KvoArray::len), Some(0));
    }

    #[test]
    fn to_many_relation_requires_a_collection() {
        let team = KvoObject::adapt([("members", "nobody")]);
        let ada = KvoObject::new();
        assert_eq!(
            ToManyRelation::new("members").relate_objects(&team, &ada),
            Err(KvoError::NotACollection {
                key: "members".into()
            })
        );
    }

    #[test]
    fn nan_is_added_once() {
        let array = KvoArray::new();
        let log = recorded(&array);
        assert!(array.add_object(f64::NAN));
        assert!(!array.add_object(f64::NAN));
        assert_eq!(array.len(), 1);
        assert_eq!(log.borrow().len(), 1);
        assert_eq!(array.index_of_object(&Value::Float(f64::NAN)), Some(0));
        assert!(array.remove_object(&Value::Float(f64::NAN)));
        assert!(array.is_empty());
    }
}
