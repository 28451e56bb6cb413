//! Variable path resolution.
//!
//! A path is a head name plus property, index and computed segments. The
//! head resolves against the innermost scope that contains it; segments
//! then walk into the value. The magic properties `size`, `first` and
//! `last` are tried only after a data lookup fails.

use crate::{
    context::RenderContext,
    error::Result,
    token::{PathSegment, PathToken},
    value::Value,
};

/// A resolved segment key.
enum Key {
    Name(String),
    Index(i64),
}

/// Resolves `path` against the context's scope chain.
///
/// A missing head or segment yields an `Undefined` value, or an error
/// under the strict undefined policy.
pub(crate) fn resolve(path: &PathToken, ctx: &mut RenderContext<'_>) -> Result<Value> {
    let head = path.head();

    let Some(mut value) = ctx.resolve_name(head) else {
        return ctx.undefined(head, &path.to_string(), path.span);
    };

    for segment in &path.segments[1..] {
        let key = match segment {
            PathSegment::Name(name) => Key::Name(name.clone()),
            PathSegment::Index(index) => Key::Index(*index),
            PathSegment::Sub(sub) => match resolve(sub, ctx)?.projected() {
                Value::String(name) | Value::Markup(name) => Key::Name(name.to_string()),
                Value::Int(index) => Key::Index(index),
                _ => return ctx.undefined(head, &path.to_string(), path.span),
            },
        };

        value = match get_item(&value, &key).or_else(|| magic_item(&value, &key)) {
            Some(next) => next,
            None => return ctx.undefined(head, &path.to_string(), path.span),
        };
    }

    Ok(value)
}

/// Looks up one segment in the data itself.
fn get_item(value: &Value, key: &Key) -> Option<Value> {
    match (value, key) {
        (Value::Object(map), Key::Name(name)) => map.get(name.as_str()).cloned(),
        (Value::Array(items), Key::Index(index)) => {
            items.get(sequence_index(*index, items.len())?).cloned()
        }
        (Value::String(text) | Value::Markup(text), Key::Index(index)) => {
            let chars: Vec<char> = text.chars().collect();
            let at = sequence_index(*index, chars.len())?;
            Some(Value::from(chars[at].to_string()))
        }
        (Value::Range(start, stop), Key::Index(index)) => {
            if start > stop {
                return None;
            }
            let len = (stop - start + 1) as usize;
            let at = sequence_index(*index, len)?;
            Some(Value::Int(start + at as i64))
        }
        (Value::Custom(repr), key) => get_item(&repr.to_liquid(), key),
        _ => None,
    }
}

/// Looks up the magic properties available on any sized value.
fn magic_item(value: &Value, key: &Key) -> Option<Value> {
    let Key::Name(name) = key else {
        return None;
    };

    let value = value.projected();
    match name.as_str() {
        "size" => value.size().map(|size| Value::Int(size as i64)),
        "first" => match &value {
            Value::Array(items) => items.first().cloned(),
            Value::String(text) | Value::Markup(text) => {
                text.chars().next().map(|c| Value::from(c.to_string()))
            }
            Value::Range(start, stop) if start <= stop => Some(Value::Int(*start)),
            _ => None,
        },
        "last" => match &value {
            Value::Array(items) => items.last().cloned(),
            Value::String(text) | Value::Markup(text) => {
                text.chars().last().map(|c| Value::from(c.to_string()))
            }
            Value::Range(start, stop) if start <= stop => Some(Value::Int(*stop)),
            _ => None,
        },
        _ => None,
    }
}

/// Converts a possibly-negative index into a vector position.
fn sequence_index(index: i64, len: usize) -> Option<usize> {
    let len = len as i64;
    let at = if index < 0 { len + index } else { index };
    if at < 0 || at >= len {
        None
    } else {
        Some(at as usize)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn negative_indices_count_from_the_end() {
        assert_eq!(sequence_index(-1, 3), Some(2));
        assert_eq!(sequence_index(-3, 3), Some(0));
        assert_eq!(sequence_index(-4, 3), None);
        assert_eq!(sequence_index(2, 3), Some(2));
        assert_eq!(sequence_index(3, 3), None);
    }

    #[test]
    fn magic_size_first_last() {
        let items = Value::array(vec![Value::Int(1), Value::Int(2), Value::Int(3)]);
        assert_eq!(
            magic_item(&items, &Key::Name("size".to_string())),
            Some(Value::Int(3))
        );
        assert_eq!(
            magic_item(&items, &Key::Name("first".to_string())),
            Some(Value::Int(1))
        );
        assert_eq!(
            magic_item(&items, &Key::Name("last".to_string())),
            Some(Value::Int(3))
        );
        assert_eq!(magic_item(&items, &Key::Name("middle".to_string())), None);
    }
}
