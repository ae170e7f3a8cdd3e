#![forbid(unsafe_code)]

//! Name-to-model lookup for resolving key paths that start with a model name.
//!
//! The registry is an ordinary value owned by whoever sets up the model
//! layer; there is no process-wide instance. Registering a name twice
//! replaces the earlier model (last writer wins).

use std::collections::BTreeMap;

use super::observable::KvoObject;
use crate::error::{KvoError, KvoResult};
use crate::key_path::{KeyPath, resolve_path};
use crate::value::Value;

/// Named models, addressable as the first segment of a key path.
#[derive(Debug, Default)]
pub struct Registry {
    models: BTreeMap<String, KvoObject>,
}

impl Registry {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Register `model` under `name`, returning the model it replaced.
    ///
    /// # Errors
    ///
    /// [`KvoError::InvalidModelName`] if `name` is empty or contains `.`.
    pub fn register(&mut self, name: &str, model: &KvoObject) -> KvoResult<Option<KvoObject>> {
        if name.is_empty() || name.contains('.') {
            return Err(KvoError::InvalidModelName {
                name: name.to_owned(),
            });
        }
        let previous = self.models.insert(name.to_owned(), model.clone());
        tracing::debug!(
            name,
            object = model.id(),
            replaced = previous.is_some(),
            "registered model"
        );
        Ok(previous)
    }

    /// Remove `name`, returning the model that was registered.
    pub fn unregister(&mut self, name: &str) -> Option<KvoObject> {
        self.models.remove(name)
    }

    #[must_use]
    pub fn lookup(&self, name: &str) -> Option<KvoObject> {
        self.models.get(name).cloned()
    }

    /// Resolve `name.rest.of.path`; a miss yields `Value::Null`.
    #[must_use]
    pub fn resolve(&self, path: &str) -> Value {
        let Ok(parsed) = KeyPath::parse(path) else {
            return Value::Null;
        };
        let Some(model) = self.lookup(parsed.first()) else {
            return Value::Null;
        };
        match parsed.rest() {
            Some(rest) => resolve_path(&Value::Object(model), &rest),
            None => Value::Object(model),
        }
    }

    /// Split `name.rest.of.path` into the named model and the path below it.
    ///
    /// # Errors
    ///
    /// [`KvoError::MalformedKeyPath`] if the path does not reach below the
    /// model name, [`KvoError::UnknownModel`] if the name is not registered.
    pub fn split_path(&self, path: &str) -> KvoResult<(KvoObject, KeyPath)> {
        let parsed = KeyPath::parse(path)?;
        let rest = parsed.rest().ok_or_else(|| KvoError::MalformedKeyPath {
            path: path.to_owned(),
        })?;
        let model = self
            .lookup(parsed.first())
            .ok_or_else(|| KvoError::UnknownModel {
                name: parsed.first().to_owned(),
            })?;
        Ok((model, rest))
    }

    pub fn names(&self) -> impl Iterator<Item = &str> {
        self.models.keys().map(String::as_str)
    }

    #[must_use]
    pub fn len(&self) -> usize {
        self.models.len()
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.models.is_empty()
    }

    /// Drop every registration, returning how many there were.
    pub fn clear(&mut self) -> usize {
        let count = self.models.len();
        self.models.clear();
        tracing::debug!(count, "cleared model registry");
        count
    }
}
