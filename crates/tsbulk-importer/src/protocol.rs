//! Line protocol rendering
//!
//! Used by the JSON adapters to produce raw lines for the row-write path and by
//! the HTTP client to flatten a column-write request back into text.

use std::collections::BTreeMap;
use tsbulk_core::{FieldValue, Timestamp};

/// Render one line from its parts; `timestamp` is omitted when `None`
pub fn render_line(
    measurement: &str,
    tags: &BTreeMap<String, String>,
    fields: &BTreeMap<String, FieldValue>,
    timestamp: Option<Timestamp>,
) -> String {
    let mut line = escape_measurement(measurement);

    for (key, value) in tags {
        if value.is_empty() {
            continue;
        }
        line.push(',');
        line.push_str(&escape_tag_key(key));
        line.push('=');
        line.push_str(&escape_tag_value(value));
    }

    line.push(' ');
    let fields: Vec<String> = fields
        .iter()
        .map(|(key, value)| format!("{}={}", escape_field_key(key), format_field_value(value)))
        .collect();
    line.push_str(&fields.join(","));

    if let Some(ts) = timestamp {
        line.push(' ');
        line.push_str(&ts.to_string());
    }

    line
}

/// Format a typed field value the way the remote parser expects it
pub fn format_field_value(value: &FieldValue) -> String {
    match value {
        FieldValue::Float(v) => format!("{}", v),
        FieldValue::Integer(v) => format!("{}i", v),
        FieldValue::String(v) => quote_string(v),
        FieldValue::Boolean(v) => format!("{}", v),
    }
}

/// Wrap a string field value in double quotes
pub fn quote_string(s: &str) -> String {
    format!("\"{}\"", escape_string_value(s))
}

/// Escape special characters in measurement names
pub fn escape_measurement(s: &str) -> String {
    s.replace(',', "\\,").replace(' ', "\\ ")
}

/// Escape special characters in tag keys
pub fn escape_tag_key(s: &str) -> String {
    escape_key(s)
}

/// Escape special characters in tag values
pub fn escape_tag_value(s: &str) -> String {
    escape_key(s)
}

/// Escape special characters in field keys
pub fn escape_field_key(s: &str) -> String {
    escape_key(s)
}

fn escape_key(s: &str) -> String {
    let mut out = String::with_capacity(s.len());
    for c in s.chars() {
        if matches!(c, ',' | '=' | ' ') {
            out.push('\\');
        }
        out.push(c);
    }
    out
}

/// Escape special characters in string field values
pub fn escape_string_value(s: &str) -> String {
    s.replace('\\', "\\\\").replace('"', "\\\"")
}
