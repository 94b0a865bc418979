//! Field access on loosely typed rows.
//!
//! Source exports mix strings and numbers for the same column, so ids are read
//! as text from either. A value counts as blank when it is missing, null, an
//! empty string, `"0"`, zero or `false`.

use serde_json::Value;

use crate::connectors::Record;

/// Returns true if the field is missing or blank.
#[must_use]
pub fn is_blank(record: &Record, key: &str) -> bool {
    match record.get(key) {
        None | Some(Value::Null) => true,
        Some(Value::String(s)) => s.is_empty() || s == "0",
        Some(Value::Number(n)) => n.as_f64() == Some(0.0),
        Some(Value::Bool(b)) => !b,
        Some(Value::Array(a)) => a.is_empty(),
        Some(Value::Object(o)) => o.is_empty(),
    }
}

/// Non-empty text of a string or number field.
#[must_use]
pub fn text(record: &Record, key: &str) -> Option<String> {
    match record.get(key)? {
        Value::String(s) if !s.is_empty() => Some(s.clone()),
        Value::Number(n) => Some(n.to_string()),
        _ => None,
    }
}

/// Identifier field; blank values (including `"0"`) are absent.
#[must_use]
pub fn id(record: &Record, key: &str) -> Option<String> {
    if is_blank(record, key) {
        None
    } else {
        text(record, key)
    }
}

/// Numeric field, parsed from a number or a numeric string.
#[must_use]
pub fn number(record: &Record, key: &str) -> Option<f64> {
    match record.get(key)? {
        Value::Number(n) => n.as_f64(),
        Value::String(s) => s.trim().parse().ok(),
        _ => None,
    }
}

/// Sets a string field.
pub fn set_text(record: &mut Record, key: &str, value: impl Into<String>) {
    record.insert(key.to_string(), Value::String(value.into()));
}

/// Adds tax to a net price rounded to two decimals.
#[must_use]
pub fn net_to_gross(net: f64, tax: f64) -> f64 {
    (net * (100.0 + tax) / 100.0 * 100.0).round() / 100.0
}

/// Replaces `net_key` by a gross `gross_key` using the row's `tax` field.
///
/// Without a tax rate the net figure is taken as is and `tax` is removed.
pub fn convert_net_price(record: &mut Record, net_key: &str, gross_key: &str) {
    let Some(net) = record.remove(net_key) else {
        return;
    };
    if is_blank(record, "tax") {
        record.remove("tax");
        record.insert(gross_key.to_string(), net);
        return;
    }
    let (Some(net), Some(tax)) = (value_as_f64(&net), number(record, "tax")) else {
        record.insert(gross_key.to_string(), net);
        return;
    };
    record.insert(gross_key.to_string(), Value::from(net_to_gross(net, tax)));
}

fn value_as_f64(value: &Value) -> Option<f64> {
    match value {
        Value::Number(n) => n.as_f64(),
        Value::String(s) => s.trim().parse().ok(),
        _ => None,
    }
}

/// Removes markup tags, keeping the text between them.
#[must_use]
pub fn strip_tags(input: &str) -> String {
    let mut out = String::with_capacity(input.len());
    let mut in_tag = false;
    for c in input.chars() {
        match c {
            '<' => in_tag = true,
            '>' if in_tag => in_tag = false,
            _ if !in_tag => out.push(c),
            _ => {}
        }
    }
    out
}

/// Lowercases the input and capitalizes the first letter of every word.
#[must_use]
pub fn title_case(input: &str) -> String {
    let mut out = String::with_capacity(input.len());
    let mut word_start = true;
    for c in input.chars() {
        if c.is_whitespace() {
            word_start = true;
            out.push(c);
        } else if word_start {
            out.extend(c.to_uppercase());
            word_start = false;
        } else {
            out.extend(c.to_lowercase());
        }
    }
    out
}
