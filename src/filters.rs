//! The filter contract and the standard filter set.
//!
//! Only the plain transformation filters live here; the exotic libraries
//! (currency, datetime, base64, json, translation) are external
//! collaborators and are not part of the core engine.

use crate::{
    context::RenderContext,
    environment::Environment,
    error::{Error, Result},
    expression::FilterArg,
    token::Span,
    value::{liquid_eq, to_liquid_string, Number, Value, ValueMap},
};
use core::fmt;
use futures::future::BoxFuture;
use std::sync::Arc;

/// Evaluated arguments to one filter application.
#[derive(Clone, Debug)]
pub struct FilterArgs {
    /// Positional arguments, in order.
    pub positional: Vec<Value>,
    /// Keyword arguments.
    pub keyword: ValueMap,
    /// The source range of the filter call.
    pub span: Span,
}

impl FilterArgs {
    /// The positional argument at `index`, if present.
    pub fn get(&self, index: usize) -> Option<&Value> {
        self.positional.get(index)
    }

    /// The positional argument at `index`, or a type error naming the
    /// filter.
    pub fn expect(&self, index: usize, name: &str) -> Result<&Value> {
        self.positional.get(index).ok_or_else(|| Error::Type {
            message: format!("{name}: missing argument {index}", index = index + 1),
            span: self.span,
        })
    }

    /// The keyword argument named `name`, if present.
    pub fn keyword(&self, name: &str) -> Option<&Value> {
        self.keyword.get(name)
    }
}

/// A filter callable.
///
/// Filters receive the render context, so they can extend the scope to
/// evaluate lambda arguments or consult the environment. The async
/// variant is a suspension point for host-supplied filters; the default
/// delegates to the synchronous call.
pub trait Filter: Send + Sync + fmt::Debug {
    /// Applies the filter to `input`.
    fn call(
        &self,
        input: Value,
        args: &FilterArgs,
        ctx: &mut RenderContext<'_>,
        span: Span,
    ) -> Result<Value>;

    /// An async version of [`Filter::call`].
    fn call_async<'a, 'env: 'a>(
        &'a self,
        input: Value,
        args: FilterArgs,
        ctx: &'a mut RenderContext<'env>,
        span: Span,
    ) -> BoxFuture<'a, Result<Value>> {
        Box::pin(core::future::ready(self.call(input, &args, ctx, span)))
    }

    /// Validates a parsed call against this filter, when the environment
    /// asks for parse-time validation.
    fn validate(
        &self,
        _env: &Environment,
        _span: Span,
        _name: &str,
        _args: &[FilterArg],
    ) -> Result<()> {
        Ok(())
    }
}

/// A filter implemented by a plain function.
struct FnFilter {
    name: &'static str,
    f: fn(Value, &FilterArgs, &mut RenderContext<'_>, Span) -> Result<Value>,
}

impl fmt::Debug for FnFilter {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "FnFilter({})", self.name)
    }
}

impl Filter for FnFilter {
    fn call(
        &self,
        input: Value,
        args: &FilterArgs,
        ctx: &mut RenderContext<'_>,
        span: Span,
    ) -> Result<Value> {
        (self.f)(input, args, ctx, span)
    }
}

/// Registers the standard filter set with an environment.
pub fn register_standard_filters(env: &mut Environment) {
    let filters: &[(
        &'static str,
        fn(Value, &FilterArgs, &mut RenderContext<'_>, Span) -> Result<Value>,
    )] = &[
        ("abs", abs),
        ("append", append),
        ("capitalize", capitalize),
        ("ceil", ceil),
        ("compact", compact),
        ("concat", concat),
        ("default", default),
        ("divided_by", divided_by),
        ("downcase", downcase),
        ("escape", escape),
        ("first", first),
        ("floor", floor),
        ("join", join),
        ("last", last),
        ("lstrip", lstrip),
        ("map", map),
        ("minus", minus),
        ("modulo", modulo),
        ("plus", plus),
        ("prepend", prepend),
        ("remove", remove),
        ("replace", replace),
        ("reverse", reverse),
        ("round", round),
        ("rstrip", rstrip),
        ("size", size),
        ("slice", slice),
        ("sort", sort),
        ("sort_natural", sort_natural),
        ("split", split),
        ("strip", strip),
        ("strip_newlines", strip_newlines),
        ("sum", sum),
        ("times", times),
        ("uniq", uniq),
        ("upcase", upcase),
        ("where", where_),
    ];

    for &(name, f) in filters {
        env.add_filter(name, Arc::new(FnFilter { name, f }));
    }
}

// Coercion helpers.

fn string_of(value: &Value) -> String {
    to_liquid_string(value, false)
}

fn number_of(value: &Value) -> Number {
    value.to_number().unwrap_or(Number::Int(0))
}

/// Coerces a filter input to a sequence of items.
fn sequence_of(value: &Value) -> Vec<Value> {
    match value.projected() {
        Value::Array(items) => items.as_ref().clone(),
        Value::Range(start, stop) => crate::value::range_items(start, stop),
        Value::Null | Value::Undefined(_) | Value::Empty => Vec::new(),
        other => vec![other],
    }
}

fn int_arg(args: &FilterArgs, index: usize, name: &str) -> Result<i64> {
    let value = args.expect(index, name)?;
    match value.to_number() {
        Some(Number::Int(value)) => Ok(value),
        Some(Number::Float(value)) => Ok(value as i64),
        None => Err(Error::Type {
            message: format!("{name}: expected an integer, found {}", value.type_name()),
            span: args.span,
        }),
    }
}

/// Applies a binary arithmetic operation, keeping integers integral.
fn arithmetic(
    input: &Value,
    args: &FilterArgs,
    name: &str,
    int_op: fn(i64, i64) -> i64,
    float_op: fn(f64, f64) -> f64,
) -> Result<Value> {
    let left = number_of(input);
    let right = number_of(args.expect(0, name)?);
    match (left, right) {
        (Number::Int(left), Number::Int(right)) => Ok(Value::Int(int_op(left, right))),
        (left, right) => Ok(Value::Float(float_op(left.as_f64(), right.as_f64()))),
    }
}

// The filters.

fn abs(input: Value, _args: &FilterArgs, _ctx: &mut RenderContext<'_>, _span: Span) -> Result<Value> {
    match number_of(&input) {
        Number::Int(value) => Ok(Value::Int(value.abs())),
        Number::Float(value) => Ok(Value::Float(value.abs())),
    }
}

fn append(input: Value, args: &FilterArgs, _ctx: &mut RenderContext<'_>, _span: Span) -> Result<Value> {
    let mut text = string_of(&input);
    text.push_str(&string_of(args.expect(0, "append")?));
    Ok(Value::from(text))
}

fn capitalize(input: Value, _args: &FilterArgs, _ctx: &mut RenderContext<'_>, _span: Span) -> Result<Value> {
    let text = string_of(&input);
    let mut chars = text.chars();
    let capitalized = match chars.next() {
        Some(head) => head.to_uppercase().collect::<String>() + &chars.as_str().to_lowercase(),
        None => String::new(),
    };
    Ok(Value::from(capitalized))
}

fn ceil(input: Value, _args: &FilterArgs, _ctx: &mut RenderContext<'_>, _span: Span) -> Result<Value> {
    match number_of(&input) {
        Number::Int(value) => Ok(Value::Int(value)),
        Number::Float(value) => Ok(Value::Int(value.ceil() as i64)),
    }
}

fn compact(input: Value, _args: &FilterArgs, _ctx: &mut RenderContext<'_>, _span: Span) -> Result<Value> {
    let items = sequence_of(&input)
        .into_iter()
        .filter(|item| !matches!(item, Value::Null | Value::Undefined(_)))
        .collect::<Vec<_>>();
    Ok(Value::array(items))
}

fn concat(input: Value, args: &FilterArgs, _ctx: &mut RenderContext<'_>, _span: Span) -> Result<Value> {
    let mut items = sequence_of(&input);
    items.extend(sequence_of(args.expect(0, "concat")?));
    Ok(Value::array(items))
}

fn default(input: Value, args: &FilterArgs, _ctx: &mut RenderContext<'_>, _span: Span) -> Result<Value> {
    let allow_false = args
        .keyword("allow_false")
        .map_or(false, Value::is_truthy);

    let use_default = match &input {
        Value::Undefined(_) | Value::Null | Value::Empty => true,
        Value::Bool(false) => !allow_false,
        Value::String(text) => text.is_empty(),
        Value::Array(items) => items.is_empty(),
        Value::Object(map) => map.is_empty(),
        _ => false,
    };

    if use_default {
        Ok(args.get(0).cloned().unwrap_or(Value::Null))
    } else {
        Ok(input)
    }
}

fn divided_by(input: Value, args: &FilterArgs, _ctx: &mut RenderContext<'_>, _span: Span) -> Result<Value> {
    let left = number_of(&input);
    let right = number_of(args.expect(0, "divided_by")?);
    match (left, right) {
        (_, Number::Int(0)) => Err(Error::Type {
            message: "divided_by: division by zero".to_string(),
            span: args.span,
        }),
        (Number::Int(left), Number::Int(right)) => Ok(Value::Int(left.div_euclid(right))),
        (left, right) => {
            let divisor = right.as_f64();
            if divisor == 0.0 {
                return Err(Error::Type {
                    message: "divided_by: division by zero".to_string(),
                    span: args.span,
                });
            }
            Ok(Value::Float(left.as_f64() / divisor))
        }
    }
}

fn downcase(input: Value, _args: &FilterArgs, _ctx: &mut RenderContext<'_>, _span: Span) -> Result<Value> {
    Ok(Value::from(string_of(&input).to_lowercase()))
}

fn escape(input: Value, _args: &FilterArgs, _ctx: &mut RenderContext<'_>, _span: Span) -> Result<Value> {
    let escaped = html_escape::encode_quoted_attribute(&string_of(&input)).into_owned();
    Ok(Value::markup(escaped))
}

fn first(input: Value, _args: &FilterArgs, _ctx: &mut RenderContext<'_>, _span: Span) -> Result<Value> {
    match input.projected() {
        Value::Array(items) => Ok(items.first().cloned().unwrap_or(Value::Null)),
        Value::String(text) | Value::Markup(text) => Ok(text
            .chars()
            .next()
            .map_or(Value::Null, |c| Value::from(c.to_string()))),
        _ => Ok(Value::Null),
    }
}

fn floor(input: Value, _args: &FilterArgs, _ctx: &mut RenderContext<'_>, _span: Span) -> Result<Value> {
    match number_of(&input) {
        Number::Int(value) => Ok(Value::Int(value)),
        Number::Float(value) => Ok(Value::Int(value.floor() as i64)),
    }
}

fn join(input: Value, args: &FilterArgs, _ctx: &mut RenderContext<'_>, _span: Span) -> Result<Value> {
    let separator = args.get(0).map_or_else(|| " ".to_string(), string_of);
    let joined = sequence_of(&input)
        .iter()
        .map(string_of)
        .collect::<Vec<_>>()
        .join(&separator);
    Ok(Value::from(joined))
}

fn last(input: Value, _args: &FilterArgs, _ctx: &mut RenderContext<'_>, _span: Span) -> Result<Value> {
    match input.projected() {
        Value::Array(items) => Ok(items.last().cloned().unwrap_or(Value::Null)),
        Value::String(text) | Value::Markup(text) => Ok(text
            .chars()
            .last()
            .map_or(Value::Null, |c| Value::from(c.to_string()))),
        _ => Ok(Value::Null),
    }
}

fn lstrip(input: Value, _args: &FilterArgs, _ctx: &mut RenderContext<'_>, _span: Span) -> Result<Value> {
    Ok(Value::from(string_of(&input).trim_start().to_string()))
}

/// `map` accepts a property name or a lambda.
fn map(input: Value, args: &FilterArgs, ctx: &mut RenderContext<'_>, _span: Span) -> Result<Value> {
    let items = sequence_of(&input);

    match args.expect(0, "map")? {
        Value::Lambda(lambda) => {
            let lambda = Arc::clone(lambda);
            let mapped = lambda.map_over(&items, ctx)?;
            Ok(Value::array(
                mapped
                    .into_iter()
                    .map(|item| {
                        if item.is_undefined() {
                            Value::Null
                        } else {
                            item
                        }
                    })
                    .collect::<Vec<_>>(),
            ))
        }
        key => {
            let key = string_of(key);
            let mapped = items
                .iter()
                .map(|item| match item.projected() {
                    Value::Object(map) => map.get(key.as_str()).cloned().unwrap_or(Value::Null),
                    _ => Value::Null,
                })
                .collect::<Vec<_>>();
            Ok(Value::array(mapped))
        }
    }
}

fn minus(input: Value, args: &FilterArgs, _ctx: &mut RenderContext<'_>, _span: Span) -> Result<Value> {
    arithmetic(&input, args, "minus", |a, b| a - b, |a, b| a - b)
}

fn modulo(input: Value, args: &FilterArgs, _ctx: &mut RenderContext<'_>, _span: Span) -> Result<Value> {
    let right = number_of(args.expect(0, "modulo")?);
    if right.as_f64() == 0.0 {
        return Err(Error::Type {
            message: "modulo: division by zero".to_string(),
            span: args.span,
        });
    }
    arithmetic(
        &input,
        args,
        "modulo",
        i64::rem_euclid,
        f64::rem_euclid,
    )
}

fn plus(input: Value, args: &FilterArgs, _ctx: &mut RenderContext<'_>, _span: Span) -> Result<Value> {
    arithmetic(&input, args, "plus", |a, b| a + b, |a, b| a + b)
}

fn prepend(input: Value, args: &FilterArgs, _ctx: &mut RenderContext<'_>, _span: Span) -> Result<Value> {
    let mut text = string_of(args.expect(0, "prepend")?);
    text.push_str(&string_of(&input));
    Ok(Value::from(text))
}

fn remove(input: Value, args: &FilterArgs, _ctx: &mut RenderContext<'_>, _span: Span) -> Result<Value> {
    let needle = string_of(args.expect(0, "remove")?);
    Ok(Value::from(string_of(&input).replace(&needle, "")))
}

fn replace(input: Value, args: &FilterArgs, _ctx: &mut RenderContext<'_>, _span: Span) -> Result<Value> {
    let needle = string_of(args.expect(0, "replace")?);
    let replacement = args.get(1).map_or_else(String::new, string_of);
    Ok(Value::from(string_of(&input).replace(&needle, &replacement)))
}

fn reverse(input: Value, _args: &FilterArgs, _ctx: &mut RenderContext<'_>, _span: Span) -> Result<Value> {
    match input.projected() {
        Value::Array(items) => {
            let mut items = items.as_ref().clone();
            items.reverse();
            Ok(Value::array(items))
        }
        Value::Range(start, stop) => {
            let mut items = crate::value::range_items(start, stop);
            items.reverse();
            Ok(Value::array(items))
        }
        other => Ok(other),
    }
}

fn round(input: Value, args: &FilterArgs, _ctx: &mut RenderContext<'_>, _span: Span) -> Result<Value> {
    let digits = args
        .get(0)
        .and_then(Value::to_number)
        .map_or(0, |number| number.as_f64() as i32);

    match number_of(&input) {
        Number::Int(value) => Ok(Value::Int(value)),
        Number::Float(value) => {
            if digits <= 0 {
                Ok(Value::Int(value.round() as i64))
            } else {
                let factor = 10f64.powi(digits);
                Ok(Value::Float((value * factor).round() / factor))
            }
        }
    }
}

fn rstrip(input: Value, _args: &FilterArgs, _ctx: &mut RenderContext<'_>, _span: Span) -> Result<Value> {
    Ok(Value::from(string_of(&input).trim_end().to_string()))
}

fn size(input: Value, _args: &FilterArgs, _ctx: &mut RenderContext<'_>, _span: Span) -> Result<Value> {
    Ok(Value::Int(input.size().unwrap_or(0) as i64))
}

fn slice(input: Value, args: &FilterArgs, _ctx: &mut RenderContext<'_>, _span: Span) -> Result<Value> {
    let offset = int_arg(args, 0, "slice")?;
    let length = args
        .get(1)
        .and_then(Value::to_number)
        .map_or(1, |number| number.as_f64() as i64)
        .max(0) as usize;

    let slice_range = |len: usize| -> Option<(usize, usize)> {
        let len = len as i64;
        let start = if offset < 0 { len + offset } else { offset };
        if start < 0 || start >= len {
            return None;
        }
        let start = start as usize;
        let stop = (start + length).min(len as usize);
        Some((start, stop))
    };

    match input.projected() {
        Value::Array(items) => {
            let sliced = slice_range(items.len())
                .map(|(start, stop)| items[start..stop].to_vec())
                .unwrap_or_default();
            Ok(Value::array(sliced))
        }
        Value::String(text) | Value::Markup(text) => {
            let chars: Vec<char> = text.chars().collect();
            let sliced = slice_range(chars.len())
                .map(|(start, stop)| chars[start..stop].iter().collect::<String>())
                .unwrap_or_default();
            Ok(Value::from(sliced))
        }
        other => Ok(other),
    }
}

/// A total order over values for sorting: numbers, then strings, then
/// everything else in input order.
fn compare_for_sort(left: &Value, right: &Value, case_fold: bool) -> core::cmp::Ordering {
    use core::cmp::Ordering;

    match (left.to_number(), right.to_number()) {
        (Some(left), Some(right)) => {
            return left
                .as_f64()
                .partial_cmp(&right.as_f64())
                .unwrap_or(Ordering::Equal)
        }
        (Some(_), None) => return Ordering::Less,
        (None, Some(_)) => return Ordering::Greater,
        (None, None) => {}
    }

    let left = string_of(left);
    let right = string_of(right);
    if case_fold {
        left.to_lowercase().cmp(&right.to_lowercase())
    } else {
        left.cmp(&right)
    }
}

fn sort_impl(input: Value, args: &FilterArgs, case_fold: bool) -> Result<Value> {
    let mut items = sequence_of(&input);

    if let Some(key) = args.get(0) {
        let key = string_of(key);
        items.sort_by(|a, b| {
            let a = match a.projected() {
                Value::Object(map) => map.get(key.as_str()).cloned().unwrap_or(Value::Null),
                other => other,
            };
            let b = match b.projected() {
                Value::Object(map) => map.get(key.as_str()).cloned().unwrap_or(Value::Null),
                other => other,
            };
            compare_for_sort(&a, &b, case_fold)
        });
    } else {
        items.sort_by(|a, b| compare_for_sort(a, b, case_fold));
    }

    Ok(Value::array(items))
}

fn sort(input: Value, args: &FilterArgs, _ctx: &mut RenderContext<'_>, _span: Span) -> Result<Value> {
    sort_impl(input, args, false)
}

fn sort_natural(input: Value, args: &FilterArgs, _ctx: &mut RenderContext<'_>, _span: Span) -> Result<Value> {
    sort_impl(input, args, true)
}

fn split(input: Value, args: &FilterArgs, _ctx: &mut RenderContext<'_>, _span: Span) -> Result<Value> {
    let text = string_of(&input);
    let separator = string_of(args.expect(0, "split")?);

    if text.is_empty() {
        return Ok(Value::array(Vec::new()));
    }

    // An undefined or empty separator splits into characters.
    let parts: Vec<Value> = if separator.is_empty() {
        text.chars().map(|c| Value::from(c.to_string())).collect()
    } else {
        text.split(&separator).map(Value::from).collect()
    };
    Ok(Value::array(parts))
}

fn strip(input: Value, _args: &FilterArgs, _ctx: &mut RenderContext<'_>, _span: Span) -> Result<Value> {
    Ok(Value::from(string_of(&input).trim().to_string()))
}

fn strip_newlines(input: Value, _args: &FilterArgs, _ctx: &mut RenderContext<'_>, _span: Span) -> Result<Value> {
    Ok(Value::from(
        string_of(&input).replace(['\r', '\n'], ""),
    ))
}

fn sum(input: Value, _args: &FilterArgs, _ctx: &mut RenderContext<'_>, _span: Span) -> Result<Value> {
    let mut int_total = 0i64;
    let mut float_total = 0f64;
    let mut any_float = false;

    for item in sequence_of(&input) {
        match item.to_number() {
            Some(Number::Int(value)) => int_total += value,
            Some(Number::Float(value)) => {
                any_float = true;
                float_total += value;
            }
            None => {}
        }
    }

    if any_float {
        Ok(Value::Float(float_total + int_total as f64))
    } else {
        Ok(Value::Int(int_total))
    }
}

fn times(input: Value, args: &FilterArgs, _ctx: &mut RenderContext<'_>, _span: Span) -> Result<Value> {
    arithmetic(&input, args, "times", |a, b| a * b, |a, b| a * b)
}

fn uniq(input: Value, _args: &FilterArgs, _ctx: &mut RenderContext<'_>, _span: Span) -> Result<Value> {
    let mut unique: Vec<Value> = Vec::new();
    for item in sequence_of(&input) {
        if !unique.iter().any(|seen| liquid_eq(seen, &item)) {
            unique.push(item);
        }
    }
    Ok(Value::array(unique))
}

fn upcase(input: Value, _args: &FilterArgs, _ctx: &mut RenderContext<'_>, _span: Span) -> Result<Value> {
    Ok(Value::from(string_of(&input).to_uppercase()))
}

/// `where` accepts a property name with an optional match value, or a
/// lambda used as a predicate.
fn where_(input: Value, args: &FilterArgs, ctx: &mut RenderContext<'_>, _span: Span) -> Result<Value> {
    let items = sequence_of(&input);

    match args.expect(0, "where")? {
        Value::Lambda(lambda) => {
            let lambda = Arc::clone(lambda);
            let verdicts = lambda.map_over(&items, ctx)?;
            let kept = items
                .into_iter()
                .zip(verdicts)
                .filter(|(_, verdict)| verdict.is_truthy())
                .map(|(item, _)| item)
                .collect::<Vec<_>>();
            Ok(Value::array(kept))
        }
        key => {
            let key = string_of(key);
            let want = args.get(1).cloned();
            let kept = items
                .into_iter()
                .filter(|item| {
                    let candidate = match item.projected() {
                        Value::Object(map) => {
                            map.get(key.as_str()).cloned().unwrap_or(Value::Null)
                        }
                        _ => Value::Null,
                    };
                    match &want {
                        Some(want) => liquid_eq(&candidate, want),
                        None => candidate.is_truthy(),
                    }
                })
                .collect::<Vec<_>>();
            Ok(Value::array(kept))
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::environment::Environment;

    fn call(filter_name: &str, input: Value, positional: Vec<Value>) -> Result<Value> {
        let env = Environment::new();
        let mut ctx = crate::context::RenderContext::new(
            &env,
            "test".into(),
            ValueMap::new(),
            ValueMap::new(),
        );
        let args = FilterArgs {
            positional,
            keyword: ValueMap::new(),
            span: Span::default(),
        };
        let filter = env.filters.get(filter_name).unwrap();
        filter.call(input, &args, &mut ctx, Span::default())
    }

    #[test]
    fn join_defaults_to_a_space() {
        let items = Value::array(vec![Value::from("a"), Value::from("b")]);
        assert_eq!(call("join", items.clone(), vec![]).unwrap(), Value::from("a b"));
        assert_eq!(
            call("join", items, vec![Value::from(",")]).unwrap(),
            Value::from("a,b")
        );
    }

    #[test]
    fn arithmetic_keeps_integers_integral() {
        assert_eq!(
            call("plus", Value::Int(1), vec![Value::Int(2)]).unwrap(),
            Value::Int(3)
        );
        assert_eq!(
            call("plus", Value::Float(1.5), vec![Value::Int(2)]).unwrap(),
            Value::Float(3.5)
        );
    }

    #[test]
    fn divided_by_zero_is_a_type_error() {
        assert!(matches!(
            call("divided_by", Value::Int(4), vec![Value::Int(0)]),
            Err(Error::Type { .. })
        ));
    }

    #[test]
    fn where_filters_by_property() {
        let globals = crate::value::globals_from_json(serde_json::json!({
            "x": [{"n": 1, "ok": true}, {"n": 2}]
        }));
        let items = globals["x"].clone();
        let kept = call("where", items, vec![Value::from("ok")]).unwrap();
        let Value::Array(kept) = kept else { panic!() };
        assert_eq!(kept.len(), 1);
    }

    #[test]
    fn uniq_preserves_first_occurrences() {
        let items = Value::array(vec![Value::Int(1), Value::Int(2), Value::Int(1)]);
        let result = call("uniq", items, vec![]).unwrap();
        assert_eq!(
            result,
            Value::array(vec![Value::Int(1), Value::Int(2)])
        );
    }
}
