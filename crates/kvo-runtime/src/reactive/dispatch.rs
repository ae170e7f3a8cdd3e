#![forbid(unsafe_code)]

//! Change-notification dispatcher: will/did bracketing, coalescing, and
//! dependent-key propagation.
//!
//! # Design
//!
//! Every mutation of a key is wrapped in a `will_change` / `did_change`
//! bracket. Brackets nest: each key carries a depth counter, and only the
//! outermost pair captures the old value and delivers a notification.
//!
//! Opening a bracket on `K` also opens brackets on every transitive dependent
//! of `K` (in topological order), capturing their values before the mutation.
//! Closing `K` notifies `K` first, then closes each dependent in the same
//! order. A dependent shared by several prerequisites in one outer change
//! reaches depth zero only once, so it notifies once, after all of them.
//!
//! ```text
//! will(first)  first:1  fullName:1
//! will(last)   last:1   fullName:2
//! did(last)    last:0 -> notify(last)   fullName:1
//! did(first)   first:0 -> notify(first) fullName:0 -> notify(fullName)
//! ```
//!
//! # Invariants
//!
//! 1. Only the outermost bracket for a key delivers, with the outermost
//!    before-value and the after-value computed when that bracket closes.
//! 2. Delivery iterates a snapshot of the listener list. A listener removed
//!    during delivery receives nothing further; one added during delivery is
//!    first notified on the next change.
//! 3. Chained registrations are rewired before any listener runs, so a
//!    listener that reads through the chain sees the new graph.
//!
//! # Failure Modes
//!
//! - **Listener panic**: there is no error boundary. The panic propagates to
//!   the caller of the mutation; brackets that were open stay open.
//! - **Unmatched `did_change`**: logged at `warn` and treated as a forced
//!   notification of that key alone, whose old value is the current value.
//!   Dependent brackets are left to the change that opened them.

use std::any::Any;
use std::cell::{Cell, RefCell};
use std::fmt;
use std::rc::Rc;
use std::sync::atomic::{AtomicU64, Ordering};

use super::collection::KvoArray;
use super::observable::KvoObject;
use crate::key_path::{KeyPath, resolve_path};
use crate::value::Value;

/// Opaque per-registration context handed back to the callback.
pub type ObserverContext = Rc<dyn Any>;

/// Listener callback: `(change, key_path, context)`.
///
/// `key_path` is the path as registered, relative to the object the
/// observer was added to, even when the change happened further down the chain.
pub type ObserverFn = Rc<dyn Fn(&Change, &KeyPath, Option<&ObserverContext>)>;

/// Identity of an observer; registrations are removed by `(id, path)`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct ObserverId(u64);

impl ObserverId {
    /// Allocate a fresh, process-unique id.
    #[must_use]
    pub fn next() -> Self {
        static NEXT: AtomicU64 = AtomicU64::new(1);
        Self(NEXT.fetch_add(1, Ordering::Relaxed))
    }

    #[must_use]
    pub fn get(self) -> u64 {
        self.0
    }
}

/// What kind of mutation a [`Change`] describes.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ChangeKind {
    /// Whole-value assignment of a key.
    Set,
    /// An element was inserted into a collection.
    Insert,
    /// An element was removed from a collection.
    Remove,
    /// A collection element was replaced in place.
    Replace,
}

/// A single change record delivered to listeners.
#[derive(Debug, Clone, PartialEq)]
pub struct Change {
    pub kind: ChangeKind,
    /// The key that changed, for [`ChangeKind::Set`].
    pub key: Option<String>,
    /// The affected position, for collection changes.
    pub index: Option<usize>,
    pub old_value: Value,
    pub new_value: Value,
}

impl Change {
    #[must_use]
    pub fn set(key: impl Into<String>, old_value: Value, new_value: Value) -> Self {
        Self {
            kind: ChangeKind::Set,
            key: Some(key.into()),
            index: None,
            old_value,
            new_value,
        }
    }

    #[must_use]
    pub fn insert(index: usize, new_value: Value) -> Self {
        Self {
            kind: ChangeKind::Insert,
            key: None,
            index: Some(index),
            old_value: Value::Null,
            new_value,
        }
    }

    #[must_use]
    pub fn remove(index: usize, old_value: Value) -> Self {
        Self {
            kind: ChangeKind::Remove,
            key: None,
            index: Some(index),
            old_value,
            new_value: Value::Null,
        }
    }

    #[must_use]
    pub fn replace(index: usize, old_value: Value, new_value: Value) -> Self {
        Self {
            kind: ChangeKind::Replace,
            key: None,
            index: Some(index),
            old_value,
            new_value,
        }
    }

    #[must_use]
    pub fn is_collection_change(&self) -> bool {
        self.kind != ChangeKind::Set
    }
}

/// Open bracket state for one key.
#[derive(Debug)]
pub(crate) struct PendingChange {
    pub(crate) depth: u32,
    pub(crate) old_value: Value,
}

/// The sub-registration a chained entry currently holds.
enum ChainLink {
    Object(KvoObject),
    Array(KvoArray),
}

/// One listener registration on one object.
pub(crate) struct ObserverEntry {
    pub(crate) observer: ObserverId,
    /// Path relative to the object holding this entry.
    pub(crate) path: KeyPath,
    /// Path reported to the callback.
    report_path: KeyPath,
    callback: ObserverFn,
    context: Option<ObserverContext>,
    active: Cell<bool>,
    link: RefCell<Option<ChainLink>>,
    /// Observer id used for this entry's own sub-registration.
    link_id: ObserverId,
}

impl fmt::Debug for ObserverEntry {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ObserverEntry")
            .field("observer", &self.observer)
            .field("path", &self.path)
            .field("report_path", &self.report_path)
            .field("active", &self.active.get())
            .field("linked", &self.link.borrow().is_some())
            .finish()
    }
}

impl ObserverEntry {
    pub(crate) fn new(
        observer: ObserverId,
        path: KeyPath,
        callback: ObserverFn,
        context: Option<ObserverContext>,
    ) -> Rc<Self> {
        Rc::new(Self {
            observer,
            report_path: path.clone(),
            path,
            callback,
            context,
            active: Cell::new(true),
            link: RefCell::new(None),
            link_id: ObserverId::next(),
        })
    }

    fn chained(&self, rest: KeyPath) -> Rc<Self> {
        Rc::new(Self {
            observer: self.link_id,
            path: rest,
            report_path: self.report_path.clone(),
            callback: Rc::clone(&self.callback),
            context: self.context.clone(),
            active: Cell::new(true),
            link: RefCell::new(None),
            link_id: ObserverId::next(),
        })
    }

    pub(crate) fn is_active(&self) -> bool {
        self.active.get()
    }

    pub(crate) fn deliver(&self, change: &Change) {
        if self.active.get() {
            (self.callback)(change, &self.report_path, self.context.as_ref());
        }
    }

    /// Stop delivering and tear down the chain below this entry.
    pub(crate) fn deactivate(&self) {
        self.active.set(false);
        self.unlink();
    }

    fn wants_link(&self, value: &Value) -> bool {
        match value {
            Value::Object(_) => !self.path.is_single_key(),
            Value::Array(_) => self.path.is_single_key(),
            _ => false,
        }
    }

    /// Install the sub-registration implied by `value`, the current value of
    /// this entry's first key.
    pub(crate) fn link_to(&self, value: &Value) {
        if !self.wants_link(value) {
            return;
        }
        let link = match value {
            Value::Object(child) => {
                let Some(rest) = self.path.rest() else {
                    return;
                };
                child.attach_entry(self.chained(rest));
                ChainLink::Object(child.clone())
            }
            Value::Array(array) => {
                let callback = Rc::clone(&self.callback);
                let path = self.report_path.clone();
                let context = self.context.clone();
                array.add_observer(self.link_id, move |change| {
                    callback(change, &path, context.as_ref());
                });
                ChainLink::Array(array.clone())
            }
            _ => return,
        };
        *self.link.borrow_mut() = Some(link);
    }

    fn unlink(&self) {
        let link = self.link.borrow_mut().take();
        match link {
            Some(ChainLink::Object(child)) => {
                if let Some(rest) = self.path.rest() {
                    child.remove_observer_for_key_path(self.link_id, rest.as_str());
                }
            }
            Some(ChainLink::Array(array)) => array.remove_observer(self.link_id),
            None => {}
        }
    }

    /// Move the sub-registration onto `value` if it is not already there.
    fn relink(&self, value: &Value) {
        let unchanged = match (&*self.link.borrow(), value) {
            (Some(ChainLink::Object(current)), Value::Object(new)) => current.ptr_eq(new),
            (Some(ChainLink::Array(current)), Value::Array(new)) => current.ptr_eq(new),
            (None, _) => !self.wants_link(value),
            _ => false,
        };
        if unchanged {
            return;
        }
        self.unlink();
        self.link_to(value);
    }
}

impl KvoObject {
    /// Open a change bracket for `key` and its dependents.
    pub fn will_change_value_for_key(&self, key: &str) {
        for bracket in self.bracket_keys(key) {
            self.open_change(&bracket);
        }
    }

    /// Close a change bracket for `key` and its dependents, notifying
    /// listeners when the outermost bracket closes.
    pub fn did_change_value_for_key(&self, key: &str) {
        // An unmatched close must not consume dependent brackets opened by
        // another change still in flight.
        if !self.is_changing(key) {
            self.close_change(key);
            return;
        }
        for bracket in self.bracket_keys(key) {
            self.close_change(&bracket);
        }
    }

    /// Notify listeners of `key` (and its dependents) without a tracked
    /// assignment, for derived state that changed behind the store's back.
    pub fn force_change_notification_for_key(&self, key: &str) {
        self.will_change_value_for_key(key);
        self.did_change_value_for_key(key);
    }

    /// Run `f` with brackets open on every key in `keys`.
    ///
    /// Mutations inside `f` coalesce per key, and dependents shared between
    /// the keys notify once after all of them.
    pub fn with_changes_for_keys<R>(&self, keys: &[&str], f: impl FnOnce(&Self) -> R) -> R {
        for key in keys {
            self.will_change_value_for_key(key);
        }
        let result = f(self);
        for key in keys.iter().rev() {
            self.did_change_value_for_key(key);
        }
        result
    }

    /// Whether a bracket for `key` is currently open.
    #[must_use]
    pub fn is_changing(&self, key: &str) -> bool {
        self.state().borrow().pending.contains_key(key)
    }

    fn bracket_keys(&self, key: &str) -> Vec<String> {
        let mut keys = vec![key.to_owned()];
        keys.extend(self.class().dependencies().affected_keys(key));
        keys
    }

    fn open_change(&self, key: &str) {
        let nested = {
            let mut state = self.state().borrow_mut();
            state.pending.get_mut(key).map(|pending| {
                pending.depth += 1;
                pending.depth
            })
        };
        if let Some(depth) = nested {
            tracing::trace!(object = self.id(), key, depth, "nested will_change");
            return;
        }
        let old_value = self.value_for_key(key);
        self.state().borrow_mut().pending.insert(
            key.to_owned(),
            PendingChange {
                depth: 1,
                old_value,
            },
        );
        tracing::trace!(object = self.id(), key, "will_change");
    }

    fn close_change(&self, key: &str) {
        let finished = {
            let mut state = self.state().borrow_mut();
            let remaining = state.pending.get_mut(key).map(|pending| {
                pending.depth -= 1;
                pending.depth
            });
            match remaining {
                Some(0) => state.pending.remove(key).map(|pending| pending.old_value),
                Some(depth) => {
                    tracing::trace!(object = self.id(), key, depth, "nested did_change");
                    return;
                }
                None => None,
            }
        };
        let old_value = match finished {
            Some(old_value) => old_value,
            None => {
                tracing::warn!(
                    object = self.id(),
                    key,
                    "did_change without matching will_change"
                );
                self.value_for_key(key)
            }
        };
        let new_value = self.value_for_key(key);
        tracing::trace!(object = self.id(), key, "did_change");
        self.notify_observers(key, &old_value, &new_value);
    }

    fn notify_observers(&self, key: &str, old_value: &Value, new_value: &Value) {
        let entries: Vec<Rc<ObserverEntry>> = self
            .state()
            .borrow()
            .observers
            .get(key)
            .cloned()
            .unwrap_or_default();
        if entries.is_empty() {
            return;
        }

        #[cfg(feature = "tracing")]
        let _span = tracing::debug_span!(
            "kvo.notify",
            object = self.id(),
            key,
            observers = entries.len()
        )
        .entered();

        for entry in &entries {
            if entry.is_active() {
                entry.relink(new_value);
            }
        }
        for entry in &entries {
            if !entry.is_active() {
                continue;
            }
            let change = match entry.path.rest() {
                None => Change::set(key, old_value.clone(), new_value.clone()),
                Some(rest) => Change::set(
                    key,
                    resolve_path(old_value, &rest),
                    resolve_path(new_value, &rest),
                ),
            };
            entry.deliver(&change);
        }
    }
}
