//! Forgiving field deserializers for agent payloads.
//!
//! Models answer with numbers where text was asked for, quote counts as
//! strings and send `null` for unknown values. Scalars are coerced; only a
//! structural mismatch (a string where a list belongs) is an error.

use serde::de::{Deserializer, Error};
use serde::Deserialize;
use serde_json::Value;

fn scalar_text(value: Value) -> Option<String> {
    match value {
        Value::Null => None,
        Value::String(s) => Some(s),
        other => Some(other.to_string()),
    }
}

/// Text that may arrive as a number, a boolean or `null` (empty).
pub fn text<'de, D>(deserializer: D) -> Result<String, D::Error>
where
    D: Deserializer<'de>,
{
    Ok(scalar_text(Value::deserialize(deserializer)?).unwrap_or_default())
}

/// Optional text; blank strings read as `None`.
pub fn opt_text<'de, D>(deserializer: D) -> Result<Option<String>, D::Error>
where
    D: Deserializer<'de>,
{
    Ok(scalar_text(Value::deserialize(deserializer)?).filter(|s| !s.trim().is_empty()))
}

fn numeric_prefix(s: &str) -> &str {
    s.trim().trim_start_matches(['<', '>', '=', '~', ' ']).trim_end_matches('%').trim()
}

/// A number, or a string holding one (`"0.03"`, `"<0.001"`). Anything else is `None`.
pub fn opt_number<'de, D>(deserializer: D) -> Result<Option<f64>, D::Error>
where
    D: Deserializer<'de>,
{
    let number = match Value::deserialize(deserializer)? {
        Value::Number(n) => n.as_f64(),
        Value::String(s) => numeric_prefix(&s).parse::<f64>().ok(),
        _ => None,
    };
    Ok(number.filter(|n| n.is_finite()))
}

/// A non-negative whole count, or a string holding one (`"1,204"`).
#[allow(clippy::cast_possible_truncation, clippy::cast_sign_loss)]
pub fn opt_count<'de, D>(deserializer: D) -> Result<Option<u64>, D::Error>
where
    D: Deserializer<'de>,
{
    let count = match Value::deserialize(deserializer)? {
        Value::Number(n) => n
            .as_u64()
            .or_else(|| n.as_f64().filter(|f| *f >= 0.0 && f.fract() == 0.0).map(|f| f as u64)),
        Value::String(s) => numeric_prefix(&s).replace(',', "").parse::<u64>().ok(),
        _ => None,
    };
    Ok(count)
}

/// A list of texts. `null` is empty and a lone string is a one-item list.
pub fn texts<'de, D>(deserializer: D) -> Result<Vec<String>, D::Error>
where
    D: Deserializer<'de>,
{
    match Value::deserialize(deserializer)? {
        Value::Null => Ok(Vec::new()),
        Value::String(s) => Ok(vec![s]),
        Value::Array(items) => Ok(items.into_iter().filter_map(scalar_text).collect()),
        other => Err(D::Error::custom(format!("expected a list of strings, got {other}"))),
    }
}

/// Table rows. Cells are coerced to text, `null` cells kept as empty so
/// columns stay aligned.
pub fn rows<'de, D>(deserializer: D) -> Result<Vec<Vec<String>>, D::Error>
where
    D: Deserializer<'de>,
{
    let rows = match Value::deserialize(deserializer)? {
        Value::Null => return Ok(Vec::new()),
        Value::Array(rows) => rows,
        other => return Err(D::Error::custom(format!("expected a list of rows, got {other}"))),
    };
    rows.into_iter()
        .map(|row| match row {
            Value::Array(cells) => Ok(cells.into_iter().map(|cell| scalar_text(cell).unwrap_or_default()).collect()),
            other => Err(D::Error::custom(format!("expected a row of cells, got {other}"))),
        })
        .collect()
}

/// A list of records where `null` means none.
pub fn list<'de, D, T>(deserializer: D) -> Result<Vec<T>, D::Error>
where
    D: Deserializer<'de>,
    T: Deserialize<'de>,
{
    Ok(Option::<Vec<T>>::deserialize(deserializer)?.unwrap_or_default())
}
