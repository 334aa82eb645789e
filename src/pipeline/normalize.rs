//! Key normalisation: snake_case response fields → camelCase.
//!
//! The service speaks snake_case (`original_text`, `ai_response`) while every
//! consumer in this crate reads camelCase, so every JSON payload crosses this
//! single function on its way in. Only keys are rewritten; values, including
//! strings that happen to contain underscores, pass through untouched.
//!
//! The rewrite is the classic `_([a-z])` → uppercase letter substitution.
//! Because the result never contains `_` followed by a lowercase ASCII
//! letter, applying it twice gives the same result as applying it once.

use once_cell::sync::Lazy;
use regex::{Captures, Regex};
use serde_json::{Map, Value};
use std::borrow::Cow;

static SNAKE_SEGMENT: Lazy<Regex> = Lazy::new(|| Regex::new(r"_([a-z])").unwrap());

/// Rewrite a single key from snake_case to camelCase.
///
/// Only `_` followed by a lowercase ASCII letter is consumed: `page_1` and
/// `_Private` are left alone.
pub fn camelize(key: &str) -> Cow<'_, str> {
    SNAKE_SEGMENT.replace_all(key, |caps: &Captures<'_>| caps[1].to_ascii_uppercase())
}

/// Recursively normalise every object key in `value`.
///
/// Arrays are normalised element-wise, objects key-by-key with insertion
/// order preserved; scalars are cloned unchanged. The input is never
/// mutated. When two source keys collapse onto the same camelCase key, the
/// later value wins while the earlier key keeps its position.
pub fn normalize(value: &Value) -> Value {
    match value {
        Value::Array(items) => Value::Array(items.iter().map(normalize).collect()),
        Value::Object(map) => {
            let mut out = Map::with_capacity(map.len());
            for (key, inner) in map {
                out.insert(camelize(key).into_owned(), normalize(inner));
            }
            Value::Object(out)
        }
        other => other.clone(),
    }
}

/// Owned variant of [`normalize`] for payloads the caller no longer needs.
pub fn normalize_owned(value: Value) -> Value {
    match value {
        Value::Array(items) => Value::Array(items.into_iter().map(normalize_owned).collect()),
        Value::Object(map) => {
            let mut out = Map::with_capacity(map.len());
            for (key, inner) in map {
                out.insert(camelize(&key).into_owned(), normalize_owned(inner));
            }
            Value::Object(out)
        }
        other => other,
    }
}
