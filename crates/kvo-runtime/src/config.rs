#![forbid(unsafe_code)]

//! Per-binding default placeholders.
//!
//! [`BindingDefaults`] maps binding names (`"text"`, `"html"`, ...) to the
//! [`Placeholders`] a view uses when it binds that name without explicit
//! options. Unlisted names fall back to the default set.
//!
//! With the `config` feature the table can be loaded from TOML or JSON:
//!
//! ```toml
//! [placeholders]
//! null_value = ""
//! no_selection = "No Selection"
//! multiple_values = "Multiple Values"
//!
//! [bindings.text]
//! null_value = "(empty)"
//! ```
//!
//! Omitted fields keep their defaults.

use std::collections::BTreeMap;

use crate::reactive::binding::{BindingOptions, Placeholders};
#[cfg(feature = "config")]
use crate::error::{KvoError, KvoResult};

/// Binding names that receive the default placeholder set out of the box.
pub const TEXT_BINDINGS: [&str; 2] = ["text", "html"];

/// Default placeholders, globally and per binding name.
#[derive(Debug, Clone, PartialEq, Eq)]
#[cfg_attr(feature = "config", derive(serde::Serialize, serde::Deserialize))]
#[cfg_attr(feature = "config", serde(default))]
pub struct BindingDefaults {
    pub placeholders: Placeholders,
    pub bindings: BTreeMap<String, Placeholders>,
}

impl Default for BindingDefaults {
    fn default() -> Self {
        let placeholders = Placeholders::default();
        let bindings = TEXT_BINDINGS
            .iter()
            .map(|name| ((*name).to_owned(), placeholders.clone()))
            .collect();
        Self {
            placeholders,
            bindings,
        }
    }
}

impl BindingDefaults {
    /// Placeholders for the binding called `name`.
    #[must_use]
    pub fn placeholders_for(&self, name: &str) -> &Placeholders {
        self.bindings.get(name).unwrap_or(&self.placeholders)
    }

    /// Override the placeholders for one binding name.
    pub fn set_placeholders_for(&mut self, name: impl Into<String>, placeholders: Placeholders) {
        self.bindings.insert(name.into(), placeholders);
    }

    /// Options for binding `name`, seeded with its placeholders.
    #[must_use]
    pub fn options_for(&self, name: &str) -> BindingOptions {
        BindingOptions::new().placeholders(self.placeholders_for(name).clone())
    }

    /// Parse a TOML table.
    ///
    /// # Errors
    ///
    /// [`KvoError::Config`] with the parser's message.
    #[cfg(feature = "config")]
    pub fn from_toml_str(source: &str) -> KvoResult<Self> {
        let defaults: Self = toml::from_str(source)
            .map_err(|err| KvoError::Config(format!("invalid binding defaults toml: {err}")))?;
        tracing::debug!(bindings = defaults.bindings.len(), "loaded binding defaults");
        Ok(defaults)
    }

    /// Parse a JSON object.
    ///
    /// # Errors
    ///
    /// [`KvoError::Config`] with the parser's message.
    #[cfg(feature = "config")]
    pub fn from_json_str(source: &str) -> KvoResult<Self> {
        let defaults: Self = serde_json::from_str(source)
            .map_err(|err| KvoError::Config(format!("invalid binding defaults json: {err}")))?;
        tracing::debug!(bindings = defaults.bindings.len(), "loaded binding defaults");
        Ok(defaults)
    }
}
