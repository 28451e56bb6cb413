//! Runtime values drawn from the data context and literal evaluation.

use crate::{
    error::{Error, Result},
    expression::Lambda,
    token::Span,
};
use core::fmt;
use indexmap::IndexMap;
use std::sync::Arc;

/// An ordered mapping of names to values.
pub type ValueMap = IndexMap<String, Value>;

/// A projection trait for host wrapper types that want to present
/// themselves as a Liquid primitive.
///
/// Comparisons, truthiness, output and iteration consult the projection
/// before falling back to host behavior.
pub trait LiquidRepr: fmt::Debug + Send + Sync {
    /// The Liquid value this object projects to.
    fn to_liquid(&self) -> Value;
}

/// A value flowing through expression evaluation and rendering.
#[derive(Clone, Debug, Default)]
pub enum Value {
    /// The null value. Equal to host null and any other `Null`.
    #[default]
    Null,
    /// A boolean.
    Bool(bool),
    /// An integer.
    Int(i64),
    /// A float.
    Float(f64),
    /// A string.
    String(Arc<str>),
    /// A string exempt from auto-escaping.
    Markup(Arc<str>),
    /// A sequence of values.
    Array(Arc<Vec<Value>>),
    /// An ordered mapping.
    Object(Arc<ValueMap>),
    /// An inclusive integer range. Descending ranges are empty.
    Range(i64, i64),
    /// A lambda passed as a filter argument.
    Lambda(Arc<Lambda>),
    /// A host object projected through [`LiquidRepr`].
    Custom(Arc<dyn LiquidRepr>),
    /// The `empty` sentinel. Equal to any empty sequence, mapping or
    /// string.
    Empty,
    /// The `blank` sentinel. Equal to any whitespace-only string and any
    /// empty sequence or mapping.
    Blank,
    /// The result of a path that did not resolve.
    Undefined(UndefinedValue),
}

/// Details of an unresolved path, carried by [`Value::Undefined`].
#[derive(Clone, Debug)]
pub struct UndefinedValue {
    /// The head name of the path.
    pub name: Arc<str>,
    /// The full path text.
    pub path: Arc<str>,
    /// The source range of the path.
    pub span: Span,
}

impl Value {
    /// Creates a string value.
    pub fn string(text: impl AsRef<str>) -> Self {
        Value::String(Arc::from(text.as_ref()))
    }

    /// Creates a markup value, exempt from auto-escaping.
    pub fn markup(text: impl AsRef<str>) -> Self {
        Value::Markup(Arc::from(text.as_ref()))
    }

    /// Creates an array value.
    pub fn array(items: impl Into<Vec<Value>>) -> Self {
        Value::Array(Arc::new(items.into()))
    }

    /// Creates an object value.
    pub fn object(map: ValueMap) -> Self {
        Value::Object(Arc::new(map))
    }

    /// Resolves a [`Value::Custom`] to its projection; all other values
    /// are returned unchanged.
    pub fn projected(&self) -> Value {
        match self {
            Value::Custom(repr) => {
                let mut value = repr.to_liquid();
                // Wrappers may project to further wrappers.
                while let Value::Custom(repr) = value {
                    value = repr.to_liquid();
                }
                value
            }
            other => other.clone(),
        }
    }

    /// Returns true if this value is undefined.
    pub fn is_undefined(&self) -> bool {
        matches!(self, Value::Undefined(_))
    }

    /// Liquid truthiness: only `false`, `Null` and `Undefined` are falsy.
    pub fn is_truthy(&self) -> bool {
        match self {
            Value::Bool(truthy) => *truthy,
            Value::Null | Value::Undefined(_) => false,
            Value::Custom(repr) => repr.to_liquid().is_truthy(),
            _ => true,
        }
    }

    /// The `size` of the value: the length of a string, sequence, range
    /// or mapping.
    pub fn size(&self) -> Option<usize> {
        match self {
            Value::String(text) | Value::Markup(text) => Some(text.chars().count()),
            Value::Array(items) => Some(items.len()),
            Value::Object(map) => Some(map.len()),
            Value::Range(start, stop) => Some(range_len(*start, *stop)),
            Value::Undefined(_) => Some(0),
            Value::Custom(repr) => repr.to_liquid().size(),
            _ => None,
        }
    }

    /// Returns true for empty sequences, mappings and strings.
    fn is_empty_like(&self) -> bool {
        match self {
            Value::String(text) | Value::Markup(text) => text.is_empty(),
            Value::Array(items) => items.is_empty(),
            Value::Object(map) => map.is_empty(),
            Value::Empty => true,
            _ => false,
        }
    }

    /// Returns true for whitespace-only strings and empty sequences and
    /// mappings.
    fn is_blank_like(&self) -> bool {
        match self {
            Value::String(text) | Value::Markup(text) => {
                text.chars().all(char::is_whitespace)
            }
            Value::Array(items) => items.is_empty(),
            Value::Object(map) => map.is_empty(),
            Value::Blank => true,
            _ => false,
        }
    }

    /// The items and length this value yields when iterated by a loop.
    ///
    /// Mappings iterate as `[key, value]` pairs, strings as a single
    /// item, and null-likes as nothing at all.
    pub fn try_iter(&self, span: Span) -> Result<Vec<Value>> {
        match self {
            Value::Array(items) => Ok(items.as_ref().clone()),
            Value::Object(map) => Ok(map
                .iter()
                .map(|(key, value)| Value::array(vec![Value::string(key), value.clone()]))
                .collect()),
            Value::Range(start, stop) => Ok(range_items(*start, *stop)),
            Value::String(_) | Value::Markup(_) => Ok(vec![self.clone()]),
            Value::Null | Value::Undefined(_) | Value::Empty => Ok(Vec::new()),
            Value::Custom(repr) => repr.to_liquid().try_iter(span),
            other => Err(Error::Type {
                message: format!("expected an iterable, found {}", other.type_name()),
                span,
            }),
        }
    }

    /// A short name for the value's type, used in error messages.
    pub fn type_name(&self) -> &'static str {
        match self {
            Value::Null => "null",
            Value::Bool(_) => "boolean",
            Value::Int(_) => "integer",
            Value::Float(_) => "float",
            Value::String(_) => "string",
            Value::Markup(_) => "markup",
            Value::Array(_) => "array",
            Value::Object(_) => "object",
            Value::Range(..) => "range",
            Value::Lambda(_) => "lambda",
            Value::Custom(_) => "object",
            Value::Empty => "empty",
            Value::Blank => "blank",
            Value::Undefined(_) => "undefined",
        }
    }

    /// The numeric interpretation of the value, if it has one. Strings
    /// parse; undefined counts as zero.
    pub fn to_number(&self) -> Option<Number> {
        match self {
            Value::Int(value) => Some(Number::Int(*value)),
            Value::Float(value) => Some(Number::Float(*value)),
            Value::String(text) | Value::Markup(text) => {
                if let Ok(value) = text.parse::<i64>() {
                    Some(Number::Int(value))
                } else {
                    text.parse::<f64>().ok().map(Number::Float)
                }
            }
            Value::Undefined(_) => Some(Number::Int(0)),
            Value::Custom(repr) => repr.to_liquid().to_number(),
            _ => None,
        }
    }

    /// An approximate size in bytes, used by the local namespace limit.
    pub fn size_estimate(&self) -> u64 {
        match self {
            Value::String(text) | Value::Markup(text) => text.len() as u64,
            Value::Array(items) => items.iter().map(Value::size_estimate).sum::<u64>() + 8,
            Value::Object(map) => {
                map.iter()
                    .map(|(key, value)| key.len() as u64 + value.size_estimate())
                    .sum::<u64>()
                    + 8
            }
            _ => 8,
        }
    }
}

/// An integer or float, produced by numeric coercion.
#[derive(Copy, Clone, Debug, PartialEq)]
pub enum Number {
    /// An integer.
    Int(i64),
    /// A float.
    Float(f64),
}

impl Number {
    /// The value as a float.
    pub fn as_f64(self) -> f64 {
        match self {
            Number::Int(value) => value as f64,
            Number::Float(value) => value,
        }
    }

    /// Converts back to a value, keeping integers integral.
    pub fn into_value(self) -> Value {
        match self {
            Number::Int(value) => Value::Int(value),
            Number::Float(value) => Value::Float(value),
        }
    }
}

/// The number of items in an inclusive range.
fn range_len(start: i64, stop: i64) -> usize {
    if start > stop {
        0
    } else {
        (stop - start + 1) as usize
    }
}

/// Materializes an inclusive range.
pub(crate) fn range_items(start: i64, stop: i64) -> Vec<Value> {
    if start > stop {
        Vec::new()
    } else {
        (start..=stop).map(Value::Int).collect()
    }
}

/// Liquid equality.
///
/// Booleans compare only with booleans, the `empty` and `blank` sentinels
/// compare structurally, undefined equals null-likes, and numbers compare
/// across int/float. Everything else is host equality.
pub fn liquid_eq(left: &Value, right: &Value) -> bool {
    let left = left.projected();
    let right = right.projected();

    // Sentinels drive structural comparison from either side.
    match (&left, &right) {
        (Value::Empty, other) | (other, Value::Empty) => return other.is_empty_like(),
        (Value::Blank, other) | (other, Value::Blank) => return other.is_blank_like(),
        _ => {}
    }

    match (&left, &right) {
        (Value::Undefined(_) | Value::Null, Value::Undefined(_) | Value::Null) => true,
        (Value::Undefined(_), _) | (_, Value::Undefined(_)) => false,
        (Value::Bool(left), Value::Bool(right)) => left == right,
        (Value::Bool(_), _) | (_, Value::Bool(_)) => false,
        (Value::Int(left), Value::Int(right)) => left == right,
        (Value::Float(left), Value::Float(right)) => left == right,
        (Value::Int(left), Value::Float(right)) | (Value::Float(right), Value::Int(left)) => {
            (*left as f64) == *right
        }
        (
            Value::String(left) | Value::Markup(left),
            Value::String(right) | Value::Markup(right),
        ) => left == right,
        (Value::Array(left), Value::Array(right)) => {
            left.len() == right.len()
                && left.iter().zip(right.iter()).all(|(a, b)| liquid_eq(a, b))
        }
        (Value::Object(left), Value::Object(right)) => {
            left.len() == right.len()
                && left
                    .iter()
                    .all(|(key, a)| right.get(key).is_some_and(|b| liquid_eq(a, b)))
        }
        (Value::Range(a, b), Value::Range(c, d)) => a == c && b == d,
        _ => false,
    }
}

/// Liquid ordering for `<`, `>`, `<=`, `>=`.
///
/// Strings order against strings and numbers against numbers; booleans
/// never order; anything else is a type error.
pub fn liquid_lt(left: &Value, right: &Value, span: Span) -> Result<bool> {
    let left = left.projected();
    let right = right.projected();

    match (&left, &right) {
        (
            Value::String(left) | Value::Markup(left),
            Value::String(right) | Value::Markup(right),
        ) => Ok(left < right),
        (Value::Bool(_), _) | (_, Value::Bool(_)) => Ok(false),
        (Value::Undefined(_), _) | (_, Value::Undefined(_)) => Ok(false),
        _ => match (left.to_number(), right.to_number()) {
            (Some(left), Some(right)) => Ok(left.as_f64() < right.as_f64()),
            _ => Err(Error::Type {
                message: format!(
                    "'<' and '>' are not supported between {} and {}",
                    left.type_name(),
                    right.type_name()
                ),
                span,
            }),
        },
    }
}

/// Liquid membership for `contains` and `in`.
pub fn liquid_contains(left: &Value, item: &Value, span: Span) -> Result<bool> {
    let left = left.projected();

    match &left {
        Value::String(text) | Value::Markup(text) => {
            Ok(text.contains(&to_liquid_string(item, false)))
        }
        Value::Array(items) => Ok(items.iter().any(|candidate| liquid_eq(candidate, item))),
        Value::Object(map) => match item.projected() {
            Value::String(key) => Ok(map.contains_key(key.as_ref())),
            _ => Ok(false),
        },
        Value::Range(start, stop) => match item.projected() {
            Value::Int(value) => Ok(value >= *start && value <= *stop),
            _ => Ok(false),
        },
        Value::Undefined(_) | Value::Null => Ok(false),
        other => Err(Error::Type {
            message: format!(
                "'in' and 'contains' are not supported with {}",
                other.type_name()
            ),
            span,
        }),
    }
}

/// Stringifies a value for output.
///
/// When `auto_escape` is true, plain strings are HTML-escaped and markup
/// strings pass through unchanged.
pub fn to_liquid_string(value: &Value, auto_escape: bool) -> String {
    match value {
        Value::Null | Value::Undefined(_) | Value::Empty | Value::Blank | Value::Lambda(_) => {
            String::new()
        }
        Value::Bool(true) => "true".to_string(),
        Value::Bool(false) => "false".to_string(),
        Value::Int(value) => value.to_string(),
        Value::Float(value) => format_float(*value),
        Value::String(text) => {
            if auto_escape {
                html_escape::encode_text(text.as_ref()).into_owned()
            } else {
                text.to_string()
            }
        }
        Value::Markup(text) => text.to_string(),
        Value::Array(items) => items
            .iter()
            .map(|item| to_liquid_string(item, auto_escape))
            .collect(),
        Value::Object(map) => {
            // Mappings rarely reach output directly; render them as JSON
            // so the result is at least unambiguous.
            serde_json::Value::from(Value::Object(Arc::clone(map))).to_string()
        }
        Value::Range(start, stop) => format!("{start}..{stop}"),
        Value::Custom(repr) => to_liquid_string(&repr.to_liquid(), auto_escape),
    }
}

/// Formats a float the way the reference implementation does: integral
/// floats keep a trailing `.0`.
pub(crate) fn format_float(value: f64) -> String {
    if value.is_finite() && value.fract() == 0.0 && value.abs() < 1e16 {
        format!("{value:.1}")
    } else {
        value.to_string()
    }
}

impl PartialEq for Value {
    fn eq(&self, other: &Self) -> bool {
        liquid_eq(self, other)
    }
}

impl From<bool> for Value {
    fn from(value: bool) -> Self {
        Value::Bool(value)
    }
}

impl From<i64> for Value {
    fn from(value: i64) -> Self {
        Value::Int(value)
    }
}

impl From<i32> for Value {
    fn from(value: i32) -> Self {
        Value::Int(value.into())
    }
}

impl From<usize> for Value {
    fn from(value: usize) -> Self {
        Value::Int(value as i64)
    }
}

impl From<f64> for Value {
    fn from(value: f64) -> Self {
        Value::Float(value)
    }
}

impl From<&str> for Value {
    fn from(value: &str) -> Self {
        Value::string(value)
    }
}

impl From<String> for Value {
    fn from(value: String) -> Self {
        Value::String(Arc::from(value.as_str()))
    }
}

impl From<Vec<Value>> for Value {
    fn from(value: Vec<Value>) -> Self {
        Value::array(value)
    }
}

impl From<ValueMap> for Value {
    fn from(value: ValueMap) -> Self {
        Value::object(value)
    }
}

impl From<serde_json::Value> for Value {
    fn from(value: serde_json::Value) -> Self {
        match value {
            serde_json::Value::Null => Value::Null,
            serde_json::Value::Bool(value) => Value::Bool(value),
            serde_json::Value::Number(value) => {
                if let Some(value) = value.as_i64() {
                    Value::Int(value)
                } else {
                    Value::Float(value.as_f64().unwrap_or(f64::NAN))
                }
            }
            serde_json::Value::String(value) => Value::from(value),
            serde_json::Value::Array(items) => {
                Value::array(items.into_iter().map(Value::from).collect::<Vec<_>>())
            }
            serde_json::Value::Object(map) => Value::object(
                map.into_iter()
                    .map(|(key, value)| (key, Value::from(value)))
                    .collect(),
            ),
        }
    }
}

impl From<Value> for serde_json::Value {
    fn from(value: Value) -> Self {
        match value {
            Value::Null
            | Value::Empty
            | Value::Blank
            | Value::Undefined(_)
            | Value::Lambda(_) => serde_json::Value::Null,
            Value::Bool(value) => serde_json::Value::Bool(value),
            Value::Int(value) => serde_json::Value::from(value),
            Value::Float(value) => serde_json::Value::from(value),
            Value::String(text) | Value::Markup(text) => {
                serde_json::Value::String(text.to_string())
            }
            Value::Array(items) => serde_json::Value::Array(
                items.iter().cloned().map(serde_json::Value::from).collect(),
            ),
            Value::Object(map) => serde_json::Value::Object(
                map.iter()
                    .map(|(key, value)| (key.clone(), serde_json::Value::from(value.clone())))
                    .collect(),
            ),
            Value::Range(start, stop) => serde_json::Value::Array(
                range_items(start, stop)
                    .into_iter()
                    .map(serde_json::Value::from)
                    .collect(),
            ),
            Value::Custom(repr) => serde_json::Value::from(repr.to_liquid()),
        }
    }
}

impl serde::Serialize for Value {
    fn serialize<S: serde::Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        serde_json::Value::from(self.clone()).serialize(serializer)
    }
}

/// Converts a JSON object into a [`ValueMap`], the shape expected by
/// render globals.
pub fn globals_from_json(value: serde_json::Value) -> ValueMap {
    match Value::from(value) {
        Value::Object(map) => Arc::try_unwrap(map).unwrap_or_else(|map| map.as_ref().clone()),
        _ => ValueMap::new(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn sentinels_compare_structurally() {
        assert!(liquid_eq(&Value::Empty, &Value::array(vec![])));
        assert!(liquid_eq(&Value::Empty, &Value::string("")));
        assert!(!liquid_eq(&Value::Empty, &Value::string(" ")));
        assert!(liquid_eq(&Value::Blank, &Value::string(" \t\n")));
        assert!(liquid_eq(&Value::Blank, &Value::array(vec![])));
        assert!(!liquid_eq(&Value::Blank, &Value::string("x")));
    }

    #[test]
    fn booleans_only_equal_booleans() {
        assert!(!liquid_eq(&Value::Bool(true), &Value::Int(1)));
        assert!(!liquid_eq(&Value::Bool(false), &Value::Int(0)));
        assert!(liquid_eq(&Value::Bool(true), &Value::Bool(true)));
    }

    #[test]
    fn undefined_equals_null_likes() {
        let undefined = Value::Undefined(UndefinedValue {
            name: Arc::from("x"),
            path: Arc::from("x"),
            span: Span::default(),
        });
        assert!(liquid_eq(&undefined, &Value::Null));
        assert!(liquid_eq(&undefined, &undefined));
        assert!(!liquid_eq(&undefined, &Value::string("hello")));
    }

    #[test]
    fn zero_and_empty_string_are_truthy() {
        assert!(Value::Int(0).is_truthy());
        assert!(Value::string("").is_truthy());
        assert!(!Value::Bool(false).is_truthy());
        assert!(!Value::Null.is_truthy());
    }

    #[test]
    fn float_output_keeps_a_fraction() {
        assert_eq!(format_float(1.0), "1.0");
        assert_eq!(format_float(1.5), "1.5");
        assert_eq!(format_float(-2.0), "-2.0");
    }

    #[test]
    fn custom_values_project() {
        #[derive(Debug)]
        struct Five;
        impl LiquidRepr for Five {
            fn to_liquid(&self) -> Value {
                Value::Int(5)
            }
        }

        let five = Value::Custom(Arc::new(Five));
        assert!(liquid_eq(&five, &Value::Int(5)));
        assert!(five.is_truthy());
        assert_eq!(to_liquid_string(&five, false), "5");
    }

    #[test]
    fn auto_escape_passes_markup_through() {
        assert_eq!(
            to_liquid_string(&Value::string("<b>"), true),
            "&lt;b&gt;"
        );
        assert_eq!(to_liquid_string(&Value::markup("<b>"), true), "<b>");
    }
}
