#![forbid(unsafe_code)]

//! Value transformers and formatters applied by bindings.
//!
//! A [`ValueTransformer`] maps model values to view values (and optionally
//! back). A [`Formatter`] converts between model values and display strings;
//! its reverse direction may reject input.

use std::fmt;
use std::rc::Rc;

use crate::value::Value;

/// Maps model values to view values.
pub trait ValueTransformer {
    /// Model to view.
    fn transform(&self, value: &Value) -> Value;

    /// View to model. `None` means the input cannot be mapped back.
    fn reverse_transform(&self, _value: &Value) -> Option<Value> {
        None
    }

    /// Whether [`reverse_transform`](Self::reverse_transform) is implemented.
    fn allows_reverse(&self) -> bool {
        false
    }
}

/// Converts between model values and display strings.
pub trait Formatter {
    fn string_for_value(&self, value: &Value) -> String;

    /// Parse display input. `None` rejects the input.
    fn value_for_string(&self, input: &str) -> Option<Value>;
}

type TransformFn = Rc<dyn Fn(&Value) -> Value>;
type ReverseFn = Rc<dyn Fn(&Value) -> Option<Value>>;

/// A transformer built from closures.
#[derive(Clone)]
pub struct FnTransformer {
    forward: TransformFn,
    reverse: Option<ReverseFn>,
}

impl fmt::Debug for FnTransformer {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("FnTransformer")
            .field("reversible", &self.reverse.is_some())
            .finish()
    }
}

impl FnTransformer {
    /// A one-directional transformer.
    pub fn new(forward: impl Fn(&Value) -> Value + 'static) -> Self {
        Self {
            forward: Rc::new(forward),
            reverse: None,
        }
    }

    /// A transformer with both directions.
    pub fn reversible(
        forward: impl Fn(&Value) -> Value + 'static,
        reverse: impl Fn(&Value) -> Option<Value> + 'static,
    ) -> Self {
        Self {
            forward: Rc::new(forward),
            reverse: Some(Rc::new(reverse)),
        }
    }
}

impl ValueTransformer for FnTransformer {
    fn transform(&self, value: &Value) -> Value {
        (self.forward)(value)
    }

    fn reverse_transform(&self, value: &Value) -> Option<Value> {
        self.reverse.as_ref().and_then(|reverse| reverse(value))
    }

    fn allows_reverse(&self) -> bool {
        self.reverse.is_some()
    }
}

/// Boolean negation; null reads as false. Its own inverse.
#[derive(Debug, Clone, Copy, Default)]
pub struct NegateBoolean;

impl ValueTransformer for NegateBoolean {
    fn transform(&self, value: &Value) -> Value {
        Value::Bool(!value.as_bool().unwrap_or(false))
    }

    fn reverse_transform(&self, value: &Value) -> Option<Value> {
        value.as_bool().map(|b| Value::Bool(!b))
    }

    fn allows_reverse(&self) -> bool {
        true
    }
}

/// Fixed-precision number formatting.
///
/// With precision 0 the formatter produces and parses integers.
#[derive(Debug, Clone, Copy, Default)]
pub struct NumberFormatter {
    precision: usize,
}

impl NumberFormatter {
    #[must_use]
    pub fn new(precision: usize) -> Self {
        Self { precision }
    }

    #[must_use]
    pub fn precision(&self) -> usize {
        self.precision
    }
}

impl Formatter for NumberFormatter {
    fn string_for_value(&self, value: &Value) -> String {
        match value {
            Value::Int(n) if self.precision == 0 => n.to_string(),
            Value::Int(_) | Value::Float(_) => {
                let n = value.as_f64().unwrap_or_default();
                format!("{n:.prec$}", prec = self.precision)
            }
            other => other.to_string(),
        }
    }

    fn value_for_string(&self, input: &str) -> Option<Value> {
        let input = input.trim();
        if self.precision == 0 {
            input.parse::<i64>().ok().map(Value::Int)
        } else {
            input
                .parse::<f64>()
                .ok()
                .filter(|n| n.is_finite())
                .map(Value::Float)
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn fn_transformer_reversibility() {
        let upper = FnTransformer::new(|v| Value::from(v.to_string().to_uppercase()));
        assert!(!upper.allows_reverse());
        assert_eq!(upper.transform(&Value::from("ab")), Value::from("AB"));
        assert_eq!(upper.reverse_transform(&Value::from("AB")), None);

        let double = FnTransformer::reversible(
            |v| Value::from(v.as_i64().unwrap_or_default() * 2),
            |v| v.as_i64().map(|n| Value::from(n / 2)),
        );
        assert!(double.allows_reverse());
        assert_eq!(double.reverse_transform(&Value::from(8)), Some(Value::from(4)));
    }

    #[test]
    fn negate_boolean() {
        assert_eq!(NegateBoolean.transform(&Value::from(true)), Value::from(false));
        assert_eq!(NegateBoolean.transform(&Value::Null), Value::from(true));
        assert_eq!(
            NegateBoolean.reverse_transform(&Value::from(false)),
            Some(Value::from(true))
        );
        assert_eq!(NegateBoolean.reverse_transform(&Value::from("x")), None);
    }

    #[test]
    fn number_formatter_precision() {
        let fmt = NumberFormatter::new(2);
        assert_eq!(fmt.string_for_value(&Value::from(3)), "3.00");
        assert_eq!(fmt.string_for_value(&Value::from(2.5)), "2.50");
        assert_eq!(fmt.value_for_string(" 2.50 "), Some(Value::from(2.5)));
        assert_eq!(fmt.value_for_string("abc"), None);
        assert_eq!(fmt.value_for_string("inf"), None);

        let whole = NumberFormatter::new(0);
        assert_eq!(whole.string_for_value(&Value::from(42)), "42");
        assert_eq!(whole.value_for_string("42"), Some(Value::from(42)));
        assert_eq!(whole.value_for_string("4.2"), None);
    }

    #[test]
    fn number_formatter_passes_non_numbers_through() {
        let fmt = NumberFormatter::new(1);
        assert_eq!(fmt.string_for_value(&Value::from("n/a")), "n/a");
    }
}
