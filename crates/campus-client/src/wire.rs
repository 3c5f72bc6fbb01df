//! Helpers for reading loosely-shaped backend JSON.
//!
//! Several endpoints return the same concept under different field names
//! depending on the serializer. These helpers pick the first usable value
//! from a list of dotted paths.

use serde::{Deserialize, Deserializer};
use serde_json::Value;

/// Follows a dotted path such as `user.email`.
pub(crate) fn lookup<'a>(raw: &'a Value, path: &str) -> Option<&'a Value> {
    path.split('.').try_fold(raw, |value, key| value.get(key))
}

/// Renders a string or number as text. Anything else yields `None`.
pub(crate) fn scalar(value: &Value) -> Option<String> {
    match value {
        Value::String(s) => Some(s.clone()),
        Value::Number(n) => Some(n.to_string()),
        _ => None,
    }
}

/// First value that is a non-empty string or a number.
pub(crate) fn first_text(raw: &Value, paths: &[&str]) -> Option<String> {
    paths
        .iter()
        .filter_map(|path| lookup(raw, path))
        .filter_map(scalar)
        .find(|s| !s.is_empty())
}

/// First value that is present and not `null`; empty strings count.
pub(crate) fn first_present(raw: &Value, paths: &[&str]) -> Option<String> {
    paths
        .iter()
        .filter_map(|path| lookup(raw, path))
        .find(|value| !value.is_null())
        .and_then(scalar)
}

/// Deserializes an id that may arrive as a string or a number.
pub(crate) fn id<'de, D>(deserializer: D) -> Result<String, D::Error>
where
    D: Deserializer<'de>,
{
    let value = Value::deserialize(deserializer)?;
    scalar(&value).ok_or_else(|| serde::de::Error::custom("expected a string or numeric id"))
}

/// Like [`id`] but tolerates `null` and missing values.
pub(crate) fn opt_id<'de, D>(deserializer: D) -> Result<Option<String>, D::Error>
where
    D: Deserializer<'de>,
{
    let value = Option::<Value>::deserialize(deserializer)?;
    Ok(value.as_ref().and_then(scalar))
}

/// Reads a string, mapping `null` to an empty one.
pub(crate) fn text_or_empty<'de, D>(deserializer: D) -> Result<String, D::Error>
where
    D: Deserializer<'de>,
{
    Ok(Option::<String>::deserialize(deserializer)?.unwrap_or_default())
}

/// Deserializes a number that may arrive as a decimal string.
pub(crate) fn number<'de, D>(deserializer: D) -> Result<f64, D::Error>
where
    D: Deserializer<'de>,
{
    match Value::deserialize(deserializer)? {
        Value::Number(n) => n
            .as_f64()
            .ok_or_else(|| serde::de::Error::custom("number out of range")),
        Value::String(s) => s
            .trim()
            .parse()
            .map_err(|_| serde::de::Error::custom(format!("invalid number '{s}'"))),
        Value::Null => Ok(0.0),
        other => Err(serde::de::Error::custom(format!(
            "expected a number, got {other}"
        ))),
    }
}
