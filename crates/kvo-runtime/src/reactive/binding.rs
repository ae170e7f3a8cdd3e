#![forbid(unsafe_code)]

//! Bindings between a view-exposed property and a model key path.
//!
//! A [`Binding`] observes a key path on a source [`KvoObject`] and pushes the
//! resolved value into a [`BindingTarget`] (the view side). Selection markers
//! and null are replaced by [`Placeholders`]; literal values pass through an
//! optional [`ValueTransformer`] and [`Formatter`]. Two-way bindings also
//! write view input back through the key path.
//!
//! # Usage
//!
//! ```ignore
//! let model = KvoObject::adapt([("name", "john")]);
//! let label = Rc::new(RefCell::new(String::new()));
//! let sink = Rc::clone(&label);
//! let target = BindingTarget::new("text", move |bound| {
//!     *sink.borrow_mut() = bound.value.to_string();
//! });
//! let binding = Binding::new(&model, "name", target, BindingOptions::default())?;
//! binding.sync()?;
//! assert_eq!(*label.borrow(), "john");
//! ```
//!
//! # Invariants
//!
//! 1. A delivered [`BoundValue`] carries a marker exactly when its value is a
//!    placeholder.
//! 2. A write made by the binding itself is not echoed back to the target
//!    (re-entrancy guard).
//! 3. After [`Binding::unbind`] (or drop) no further deliveries happen and the
//!    full observer chain is gone from the model graph.
//!
//! # Failure Modes
//!
//! - Construction rejects two-way bindings on read-only keys, two-way
//!   bindings with an irreversible transformer, `init_from_dom` without a
//!   view getter, and malformed key paths.
//! - A formatter that cannot parse view input yields
//!   [`KvoError::RejectedValue`]; the model is left untouched.

use std::cell::Cell;
use std::fmt;
use std::rc::{Rc, Weak};

use super::dispatch::ObserverId;
use super::observable::KvoObject;
use super::registry::Registry;
use super::transform::{Formatter, ValueTransformer};
use crate::error::{KvoError, KvoResult};
use crate::key_path::{self, KeyPath, resolve_path};
use crate::value::{Marker, Value};

// ---------------------------------------------------------------------------
// Placeholders and markers
// ---------------------------------------------------------------------------

/// Which placeholder a delivered value stands for.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
#[cfg_attr(feature = "config", derive(serde::Serialize, serde::Deserialize))]
#[cfg_attr(feature = "config", serde(rename_all = "snake_case"))]
pub enum MarkerType {
    NullValue,
    NoSelection,
    MultipleValues,
}

/// Display text substituted for null and selection markers.
#[derive(Debug, Clone, PartialEq, Eq)]
#[cfg_attr(feature = "config", derive(serde::Serialize, serde::Deserialize))]
#[cfg_attr(feature = "config", serde(default))]
pub struct Placeholders {
    pub null_value: String,
    pub no_selection: String,
    pub multiple_values: String,
}

impl Default for Placeholders {
    fn default() -> Self {
        Self {
            null_value: String::new(),
            no_selection: "No Selection".to_owned(),
            multiple_values: "Multiple Values".to_owned(),
        }
    }
}

impl Placeholders {
    #[must_use]
    pub fn for_marker(&self, marker: MarkerType) -> &str {
        match marker {
            MarkerType::NullValue => &self.null_value,
            MarkerType::NoSelection => &self.no_selection,
            MarkerType::MultipleValues => &self.multiple_values,
        }
    }
}

/// The value handed to a target setter.
#[derive(Debug, Clone, PartialEq)]
pub struct BoundValue {
    pub value: Value,
    /// Present when `value` is a placeholder.
    pub marker: Option<MarkerType>,
}

impl BoundValue {
    #[must_use]
    pub fn literal(value: Value) -> Self {
        Self {
            value,
            marker: None,
        }
    }

    #[must_use]
    pub fn placeholder(placeholders: &Placeholders, marker: MarkerType) -> Self {
        Self {
            value: Value::from(placeholders.for_marker(marker)),
            marker: Some(marker),
        }
    }

    #[must_use]
    pub fn is_placeholder(&self) -> bool {
        self.marker.is_some()
    }
}

// ---------------------------------------------------------------------------
// Options
// ---------------------------------------------------------------------------

/// Whether view input flows back to the model.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Hash)]
#[cfg_attr(feature = "config", derive(serde::Serialize, serde::Deserialize))]
#[cfg_attr(feature = "config", serde(rename_all = "snake_case"))]
pub enum BindingDirection {
    #[default]
    OneWay,
    TwoWay,
}

/// Construction options for a [`Binding`].
#[derive(Clone, Default)]
pub struct BindingOptions {
    direction: BindingDirection,
    init_from_dom: bool,
    placeholders: Placeholders,
    transformer: Option<Rc<dyn ValueTransformer>>,
    formatter: Option<Rc<dyn Formatter>>,
}

impl fmt::Debug for BindingOptions {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("BindingOptions")
            .field("direction", &self.direction)
            .field("init_from_dom", &self.init_from_dom)
            .field("placeholders", &self.placeholders)
            .field("transformer", &self.transformer.is_some())
            .field("formatter", &self.formatter.is_some())
            .finish()
    }
}

impl BindingOptions {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    #[must_use]
    pub fn one_way(mut self) -> Self {
        self.direction = BindingDirection::OneWay;
        self
    }

    #[must_use]
    pub fn two_way(mut self) -> Self {
        self.direction = BindingDirection::TwoWay;
        self
    }

    #[must_use]
    pub fn direction(mut self, direction: BindingDirection) -> Self {
        self.direction = direction;
        self
    }

    /// Seed the model from the view's current value on the first sync.
    #[must_use]
    pub fn init_from_dom(mut self, init: bool) -> Self {
        self.init_from_dom = init;
        self
    }

    #[must_use]
    pub fn placeholders(mut self, placeholders: Placeholders) -> Self {
        self.placeholders = placeholders;
        self
    }

    #[must_use]
    pub fn null_placeholder(mut self, text: impl Into<String>) -> Self {
        self.placeholders.null_value = text.into();
        self
    }

    #[must_use]
    pub fn transformer(mut self, transformer: impl ValueTransformer + 'static) -> Self {
        self.transformer = Some(Rc::new(transformer));
        self
    }

    #[must_use]
    pub fn formatter(mut self, formatter: impl Formatter + 'static) -> Self {
        self.formatter = Some(Rc::new(formatter));
        self
    }

    #[must_use]
    pub fn get_direction(&self) -> BindingDirection {
        self.direction
    }

    #[must_use]
    pub fn get_placeholders(&self) -> &Placeholders {
        &self.placeholders
    }
}

// ---------------------------------------------------------------------------
// Target
// ---------------------------------------------------------------------------

type TargetSetter = Rc<dyn Fn(&BoundValue)>;
type TargetGetter = Rc<dyn Fn() -> Value>;

/// The view-side accessor pair a binding drives.
#[derive(Clone)]
pub struct BindingTarget {
    name: String,
    setter: TargetSetter,
    getter: Option<TargetGetter>,
}

impl fmt::Debug for BindingTarget {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("BindingTarget")
            .field("name", &self.name)
            .field("has_getter", &self.getter.is_some())
            .finish()
    }
}

impl BindingTarget {
    /// A target named `name` (e.g. `"text"`) that receives values via `setter`.
    pub fn new(name: impl Into<String>, setter: impl Fn(&BoundValue) + 'static) -> Self {
        Self {
            name: name.into(),
            setter: Rc::new(setter),
            getter: None,
        }
    }

    /// Attach a getter for reading the view's current value.
    #[must_use]
    pub fn with_getter(mut self, getter: impl Fn() -> Value + 'static) -> Self {
        self.getter = Some(Rc::new(getter));
        self
    }

    #[must_use]
    pub fn name(&self) -> &str {
        &self.name
    }
}

// ---------------------------------------------------------------------------
// Binding
// ---------------------------------------------------------------------------

struct BindingInner {
    observer: ObserverId,
    source: KvoObject,
    key_path: KeyPath,
    target: BindingTarget,
    options: BindingOptions,
    bound: Cell<bool>,
    synced: Cell<bool>,
    /// Set while the binding itself is writing to either side.
    syncing: Cell<bool>,
    marker: Cell<Option<MarkerType>>,
}

impl BindingInner {
    fn resolved_value(&self) -> BoundValue {
        let placeholders = &self.options.placeholders;
        let raw = resolve_path(&Value::Object(self.source.clone()), &self.key_path);
        let value = match raw {
            Value::Marker(Marker::NoSelection) => {
                return BoundValue::placeholder(placeholders, MarkerType::NoSelection);
            }
            Value::Marker(Marker::MultipleValues) => {
                return BoundValue::placeholder(placeholders, MarkerType::MultipleValues);
            }
            other => match &self.options.transformer {
                Some(transformer) => transformer.transform(&other),
                None => other,
            },
        };
        if value.is_null() {
            return BoundValue::placeholder(placeholders, MarkerType::NullValue);
        }
        match &self.options.formatter {
            Some(formatter) => BoundValue::literal(Value::from(formatter.string_for_value(&value))),
            None => BoundValue::literal(value),
        }
    }

    fn update(&self) {
        if !self.bound.get() || self.syncing.get() {
            return;
        }
        let bound = self.resolved_value();
        tracing::trace!(
            binding = %self.target.name,
            key_path = %self.key_path,
            marker = ?bound.marker,
            "binding update"
        );
        self.marker.set(bound.marker);
        self.synced.set(true);
        self.syncing.set(true);
        (self.target.setter)(&bound);
        self.syncing.set(false);
    }

    fn model_value_for(&self, input: Value) -> KvoResult<Value> {
        let value = match &self.options.formatter {
            Some(formatter) => {
                let text = input.as_str().map_or_else(|| input.to_string(), str::to_owned);
                formatter
                    .value_for_string(&text)
                    .ok_or_else(|| KvoError::RejectedValue {
                        binding: self.target.name.clone(),
                        input: text,
                    })?
            }
            None => input,
        };
        match &self.options.transformer {
            Some(transformer) => {
                transformer
                    .reverse_transform(&value)
                    .ok_or_else(|| KvoError::RejectedValue {
                        binding: self.target.name.clone(),
                        input: value.to_string(),
                    })
            }
            None => Ok(value),
        }
    }

    fn set_value(&self, input: Value) -> KvoResult<()> {
        if !self.bound.get() || self.syncing.get() {
            return Ok(());
        }
        if self.options.direction == BindingDirection::OneWay {
            tracing::trace!(binding = %self.target.name, "one-way binding ignored view input");
            return Ok(());
        }
        let value = self.model_value_for(input)?;
        self.syncing.set(true);
        let result = key_path::assign_path(&self.source, &self.key_path, value);
        self.syncing.set(false);
        result?;
        self.synced.set(true);
        self.marker.set(None);
        Ok(())
    }

    fn unbind(&self) {
        if !self.bound.replace(false) {
            return;
        }
        self.source
            .remove_observer_for_key_path(self.observer, self.key_path.as_str());
        tracing::debug!(
            binding = %self.target.name,
            key_path = %self.key_path,
            object = self.source.id(),
            "unbind"
        );
    }
}

impl Drop for BindingInner {
    fn drop(&mut self) {
        self.unbind();
    }
}

/// Keeps one view property synchronized with one model key path.
///
/// Dropping a `Binding` unbinds it.
pub struct Binding {
    inner: Rc<BindingInner>,
}

impl fmt::Debug for Binding {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Binding")
            .field("target", &self.inner.target.name)
            .field("key_path", &self.inner.key_path)
            .field("object", &self.inner.source.id())
            .field("direction", &self.inner.options.direction)
            .field("bound", &self.inner.bound.get())
            .finish()
    }
}

impl Binding {
    /// Bind `target` to `key_path` relative to `source`.
    ///
    /// Nothing is delivered until the first [`sync`](Self::sync) or
    /// [`update`](Self::update).
    ///
    /// # Errors
    ///
    /// - [`KvoError::MalformedKeyPath`] for an unparsable path.
    /// - [`KvoError::ReadOnlyKey`] for a two-way binding on a read-only key.
    /// - [`KvoError::IrreversibleTransformer`] for a two-way binding whose
    ///   transformer cannot reverse.
    /// - [`KvoError::MissingGetter`] for `init_from_dom` without a target getter.
    pub fn new(
        source: &KvoObject,
        key_path: &str,
        target: BindingTarget,
        options: BindingOptions,
    ) -> KvoResult<Self> {
        let path = KeyPath::parse(key_path)?;
        if options.direction == BindingDirection::TwoWay {
            if options
                .transformer
                .as_ref()
                .is_some_and(|t| !t.allows_reverse())
            {
                return Err(KvoError::IrreversibleTransformer {
                    binding: target.name.clone(),
                });
            }
            // A missing intermediate is data absence, checked again on write.
            if let Ok(owner) = key_path::owner_of(source, &path) {
                if owner.capabilities(path.last()).is_read_only() {
                    return Err(KvoError::ReadOnlyKey {
                        key: path.last().to_owned(),
                    });
                }
            }
        }
        if options.init_from_dom && target.getter.is_none() {
            return Err(KvoError::MissingGetter {
                binding: target.name.clone(),
            });
        }

        let inner = Rc::new(BindingInner {
            observer: ObserverId::next(),
            source: source.clone(),
            key_path: path,
            target,
            options,
            bound: Cell::new(true),
            synced: Cell::new(false),
            syncing: Cell::new(false),
            marker: Cell::new(None),
        });
        let weak: Weak<BindingInner> = Rc::downgrade(&inner);
        source.add_observer_for_key_path(
            inner.observer,
            inner.key_path.as_str(),
            None,
            move |_, _, _| {
                if let Some(inner) = weak.upgrade() {
                    inner.update();
                }
            },
        )?;
        tracing::debug!(
            binding = %inner.target.name,
            key_path = %inner.key_path,
            object = source.id(),
            direction = ?inner.options.direction,
            "bind"
        );
        Ok(Self { inner })
    }

    /// Bind through a registry path of the form `name.rest.of.path`.
    ///
    /// # Errors
    ///
    /// Registry lookup errors, then everything [`Binding::new`] reports.
    pub fn from_registry(
        registry: &Registry,
        path: &str,
        target: BindingTarget,
        options: BindingOptions,
    ) -> KvoResult<Self> {
        let (model, rest) = registry.split_path(path)?;
        Self::new(&model, rest.as_str(), target, options)
    }

    /// Resolve the key path and deliver the result to the target.
    pub fn update(&self) {
        self.inner.update();
    }

    /// What [`update`](Self::update) would deliver right now.
    #[must_use]
    pub fn resolved_value(&self) -> BoundValue {
        self.inner.resolved_value()
    }

    /// Write view input back to the model. One-way bindings ignore the call.
    ///
    /// # Errors
    ///
    /// [`KvoError::RejectedValue`] when the formatter or transformer cannot
    /// map the input back, plus any key-path write error.
    pub fn set_value(&self, value: impl Into<Value>) -> KvoResult<()> {
        self.inner.set_value(value.into())
    }

    /// Whether the next [`sync`](Self::sync) should take its value from the view.
    #[must_use]
    pub fn should_init_from_dom(&self) -> bool {
        self.inner.options.init_from_dom && !self.inner.synced.get()
    }

    /// Push the view value to the model on first sync when requested,
    /// otherwise refresh the view from the model.
    ///
    /// While the binding still initializes from the view, an empty (null)
    /// view value leaves both sides untouched and the binding keeps waiting.
    ///
    /// # Errors
    ///
    /// See [`set_value`](Self::set_value).
    pub fn sync(&self) -> KvoResult<()> {
        if self.should_init_from_dom() {
            let view_value = self
                .inner
                .target
                .getter
                .as_ref()
                .map(|getter| getter())
                .unwrap_or_default();
            // An empty view keeps waiting for its first value.
            if view_value.is_null() {
                tracing::trace!(binding = %self.inner.target.name, "view empty, init deferred");
                return Ok(());
            }
            self.inner.set_value(view_value)?;
            self.inner.synced.set(true);
            return Ok(());
        }
        self.inner.update();
        Ok(())
    }

    /// Stop observing the model. Idempotent.
    pub fn unbind(&self) {
        self.inner.unbind();
    }

    #[must_use]
    pub fn is_bound(&self) -> bool {
        self.inner.bound.get()
    }

    /// Marker of the last delivered value, if it was a placeholder.
    #[must_use]
    pub fn marker_type(&self) -> Option<MarkerType> {
        self.inner.marker.get()
    }

    #[must_use]
    pub fn key_path(&self) -> &KeyPath {
        &self.inner.key_path
    }

    #[must_use]
    pub fn name(&self) -> &str {
        &self.inner.target.name
    }

    #[must_use]
    pub fn direction(&self) -> BindingDirection {
        self.inner.options.direction
    }
}

// ---------------------------------------------------------------------------
// BindingScope
// ---------------------------------------------------------------------------

/// Owns the bindings of one view.
///
/// Bindings are synced and torn down in declaration order. Dropping the
/// scope unbinds everything it holds.
#[derive(Debug, Default)]
pub struct BindingScope {
    bindings: Vec<Binding>,
}

impl BindingScope {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    pub fn add(&mut self, binding: Binding) -> &mut Self {
        self.bindings.push(binding);
        self
    }

    /// Create a binding and hold it in this scope.
    ///
    /// # Errors
    ///
    /// See [`Binding::new`].
    pub fn bind(
        &mut self,
        source: &KvoObject,
        key_path: &str,
        target: BindingTarget,
        options: BindingOptions,
    ) -> KvoResult<&Binding> {
        let binding = Binding::new(source, key_path, target, options)?;
        self.bindings.push(binding);
        Ok(&self.bindings[self.bindings.len() - 1])
    }

    /// Sync every binding, stopping at the first error.
    ///
    /// # Errors
    ///
    /// The first error reported by [`Binding::sync`].
    pub fn sync_all(&self) -> KvoResult<()> {
        for binding in &self.bindings {
            binding.sync()?;
        }
        Ok(())
    }

    /// Unbind and release every binding.
    pub fn unbind_all(&mut self) {
        for binding in self.bindings.drain(..) {
            binding.unbind();
        }
    }

    pub fn iter(&self) -> impl Iterator<Item = &Binding> {
        self.bindings.iter()
    }

    #[must_use]
    pub fn binding_count(&self) -> usize {
        self.bindings.len()
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.bindings.is_empty()
    }
}

impl Drop for BindingScope {
    fn drop(&mut self) {
        self.unbind_all();
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::reactive::class::KvoClass;
    use crate::reactive::transform::{FnTransformer, NegateBoolean, NumberFormatter};
    use std::cell::RefCell;

    type Sink = Rc<RefCell<Vec<BoundValue>>>;

    fn recording_target(name: &str) -> (BindingTarget, Sink) {
        let sink: Sink = Rc::new(RefCell::new(Vec::new()));
        let log = Rc::clone(&sink);
        let target = BindingTarget::new(name, move |bound| log.borrow_mut().push(bound.clone()));
        (target, sink)
    }

    fn last(sink: &Sink) -> BoundValue {
        sink.borrow().last().cloned().unwrap()
    }

    #[test]
    fn placeholder_substitution_sets_marker() {
        let model = KvoObject::adapt([("name", Value::Marker(Marker::MultipleValues))]);
        let (target, sink) = recording_target("text");
        let binding = Binding::new(&model, "name", target, BindingOptions::new()).unwrap();
        binding.update();
        assert_eq!(
            last(&sink),
            BoundValue {
                value: Value::from("Multiple Values"),
                marker: Some(MarkerType::MultipleValues),
            }
        );
        assert_eq!(binding.marker_type(), Some(MarkerType::MultipleValues));

        model
            .set_value_for_key(Value::Marker(Marker::NoSelection), "name")
            .unwrap();
        assert_eq!(last(&sink).marker, Some(MarkerType::NoSelection));
        assert_eq!(last(&sink).value, Value::from("No Selection"));

        model.set_value_for_key(Value::from("Ada"), "name").unwrap();
        assert_eq!(last(&sink), BoundValue::literal(Value::from("Ada")));
        assert_eq!(binding.marker_type(), None);
    }

    #[test]
    fn null_and_missing_intermediate_use_null_placeholder() {
        let model = KvoObject::new();
        let (target, sink) = recording_target("text");
        let options = BindingOptions::new().null_placeholder("(none)");
        let binding = Binding::new(&model, "person.name", target, options).unwrap();
        binding.update();
        assert_eq!(last(&sink).value, Value::from("(none)"));
        assert_eq!(last(&sink).marker, Some(MarkerType::NullValue));

        let person = KvoObject::adapt([("name", "Grace")]);
        model.set_value_for_key(Value::from(&person), "person").unwrap();
        assert_eq!(last(&sink), BoundValue::literal(Value::from("Grace")));
    }

    #[test]
    fn transformer_then_formatter() {
        let model = KvoObject::adapt([("price", 4)]);
        let (target, sink) = recording_target("text");
        let options = BindingOptions::new()
            .transformer(FnTransformer::new(|v| Value::from(v.as_f64().unwrap_or_default() * 1.5)))
            .formatter(NumberFormatter::new(2));
        let binding = Binding::new(&model, "price", target, options).unwrap();
        binding.update();
        assert_eq!(last(&sink).value, Value::from("6.00"));
    }

    #[test]
    fn two_way_writes_back_without_echo() {
        let model = KvoObject::adapt([("enabled", true)]);
        let (target, sink) = recording_target("hidden");
        let options = BindingOptions::new().two_way().transformer(NegateBoolean);
        let binding = Binding::new(&model, "enabled", target, options).unwrap();
        binding.update();
        assert_eq!(last(&sink).value, Value::from(false));

        binding.set_value(true).unwrap();
        assert_eq!(model.value_for_key("enabled"), Value::from(false));
        assert_eq!(sink.borrow().len(), 1, "own write must not echo");

        model.set_value_for_key(Value::from(true), "enabled").unwrap();
        assert_eq!(sink.borrow().len(), 2);
    }

    #[test]
    fn one_way_ignores_set_value() {
        let model = KvoObject::adapt([("name", "john")]);
        let (target, _) = recording_target("text");
        let binding = Binding::new(&model, "name", target, BindingOptions::new()).unwrap();
        binding.set_value("jane").unwrap();
        assert_eq!(model.value_for_key("name"), Value::from("john"));
    }

    #[test]
    fn formatter_rejection_leaves_model_untouched() {
        let model = KvoObject::adapt([("age", 30)]);
        let (target, _) = recording_target("text");
        let options = BindingOptions::new()
            .two_way()
            .formatter(NumberFormatter::new(0));
        let binding = Binding::new(&model, "age", target, options).unwrap();

        binding.set_value("31").unwrap();
        assert_eq!(model.value_for_key("age"), Value::from(31));

        let err = binding.set_value("thirty").unwrap_err();
        assert_eq!(
            err,
            KvoError::RejectedValue {
                binding: "text".into(),
                input: "thirty".into()
            }
        );
        assert!(!err.is_programming_error());
        assert_eq!(model.value_for_key("age"), Value::from(31));
    }

    #[test]
    fn construction_errors() {
        let class = KvoClass::builder("Clock")
            .getter("now", |_| Value::from(0))
            .build()
            .unwrap();
        let clock = KvoObject::with_class(&class);

        let (target, _) = recording_target("text");
        let err = Binding::new(&clock, "now", target, BindingOptions::new().two_way()).unwrap_err();
        assert_eq!(err, KvoError::ReadOnlyKey { key: "now".into() });

        let (target, _) = recording_target("text");
        assert!(Binding::new(&clock, "now", target, BindingOptions::new()).is_ok());

        let model = KvoObject::new();
        let (target, _) = recording_target("text");
        let options = BindingOptions::new()
            .two_way()
            .transformer(FnTransformer::new(|v| v.clone()));
        assert_eq!(
            Binding::new(&model, "x", target, options).unwrap_err(),
            KvoError::IrreversibleTransformer {
                binding: "text".into()
            }
        );

        let (target, _) = recording_target("value");
        assert_eq!(
            Binding::new(&model, "x", target, BindingOptions::new().init_from_dom(true))
                .unwrap_err(),
            KvoError::MissingGetter {
                binding: "value".into()
            }
        );

        let (target, _) = recording_target("text");
        assert!(matches!(
            Binding::new(&model, "a..b", target, BindingOptions::new()),
            Err(KvoError::MalformedKeyPath { .. })
        ));
    }

    #[test]
    fn init_from_dom_seeds_model_once() {
        let model = KvoObject::new();
        let (target, sink) = recording_target("value");
        let target = target.with_getter(|| Value::from("typed"));
        let options = BindingOptions::new().two_way().init_from_dom(true);
        let binding = Binding::new(&model, "query", target, options).unwrap();

        assert!(binding.should_init_from_dom());
        binding.sync().unwrap();
        assert_eq!(model.value_for_key("query"), Value::from("typed"));
        assert!(!binding.should_init_from_dom());
        assert!(sink.borrow().is_empty());

        binding.sync().unwrap();
        assert_eq!(last(&sink).value, Value::from("typed"));
    }

    #[test]
    fn init_from_dom_with_empty_view_waits() {
        let model = KvoObject::adapt([("query", "saved")]);
        let (target, sink) = recording_target("value");
        let view = Rc::new(RefCell::new(Value::Null));
        let reader = Rc::clone(&view);
        let target = target.with_getter(move || reader.borrow().clone());
        let options = BindingOptions::new().two_way().init_from_dom(true);
        let binding = Binding::new(&model, "query", target, options).unwrap();

        binding.sync().unwrap();
        assert!(sink.borrow().is_empty(), "empty view must not be overwritten");
        assert!(binding.should_init_from_dom());
        assert_eq!(model.value_for_key("query"), Value::from("saved"));

        *view.borrow_mut() = Value::from("typed");
        binding.sync().unwrap();
        assert_eq!(model.value_for_key("query"), Value::from("typed"));
        assert!(!binding.should_init_from_dom());
        assert!(sink.borrow().is_empty());
    }

    #[test]
    fn unbind_is_idempotent_and_tears_down_chain() {
        let person = KvoObject::adapt([("name", "john")]);
        let model = KvoObject::adapt([("person", Value::from(&person))]);
        let (target, sink) = recording_target("text");
        let binding = Binding::new(&model, "person.name", target, BindingOptions::new()).unwrap();
        assert!(person.has_observers());

        binding.unbind();
        binding.unbind();
        assert!(!binding.is_bound());
        assert!(!model.has_observers());
        assert!(!person.has_observers());

        person.set_value_for_key(Value::from("jane"), "name").unwrap();
        binding.update();
        assert!(sink.borrow().is_empty());
    }

    #[test]
    fn drop_unbinds() {
        let model = KvoObject::adapt([("name", "john")]);
        let (target, _) = recording_target("text");
        {
            let _binding = Binding::new(&model, "name", target, BindingOptions::new()).unwrap();
            assert_eq!(model.observer_count("name"), 1);
        }
        assert_eq!(model.observer_count("name"), 0);
    }

    #[test]
    fn registry_binding() {
        let mut registry = Registry::new();
        let model = KvoObject::adapt([("title", "Home")]);
        registry.register("page", &model).unwrap();
        let (target, sink) = recording_target("text");
        let binding =
            Binding::from_registry(&registry, "page.title", target, BindingOptions::new()).unwrap();
        binding.sync().unwrap();
        assert_eq!(last(&sink).value, Value::from("Home"));

        let (target, _) = recording_target("text");
        assert_eq!(
            Binding::from_registry(&registry, "nope.title", target, BindingOptions::new())
                .unwrap_err(),
            KvoError::UnknownModel { name: "nope".into() }
        );
    }

    #[test]
    fn scope_syncs_and_unbinds_in_declaration_order() {
        let model = KvoObject::adapt([("a", 1), ("b", 2)]);
        let order = Rc::new(RefCell::new(Vec::new()));
        let mut scope = BindingScope::new();
        for key in ["b", "a"] {
            let log = Rc::clone(&order);
            let target = BindingTarget::new(key, move |_| log.borrow_mut().push(key));
            scope.bind(&model, key, target, BindingOptions::new()).unwrap();
        }
        assert_eq!(scope.binding_count(), 2);

        scope.sync_all().unwrap();
        assert_eq!(*order.borrow(), vec!["b", "a"]);

        scope.unbind_all();
        assert!(scope.is_empty());
        assert!(!model.has_observers());
    }

    #[test]
    fn dropping_scope_unbinds() {
        let model = KvoObject::adapt([("a", 1)]);
        {
            let mut scope = BindingScope::new();
            let (target, _) = recording_target("text");
            scope.bind(&model, "a", target, BindingOptions::new()).unwrap();
            assert!(model.has_observers());
        }
        assert!(!model.has_observers());
    }
}
