//! Untyped JSON scalars and their canonical text form

use chrono::DateTime;
use serde::Deserialize;
use tsbulk_core::Precision;

use crate::protocol::quote_string;

/// A JSON scalar, decoded once and then formatted for line protocol.
#[derive(Debug, Clone, PartialEq, Deserialize)]
#[serde(untagged)]
pub enum ScalarValue {
    Bool(bool),
    Int(i64),
    Float(f64),
    String(String),
    Null,
    /// Arrays and objects; never valid as a field or timestamp
    Other(serde_json::Value),
}

impl ScalarValue {
    /// Field value text: numbers and booleans bare, strings quoted, anything
    /// else an empty quoted string
    pub fn to_field_string(&self) -> String {
        match self {
            ScalarValue::Float(v) => format!("{}", v),
            ScalarValue::Int(v) => v.to_string(),
            ScalarValue::Bool(v) => v.to_string(),
            ScalarValue::String(s) => quote_string(s),
            ScalarValue::Null | ScalarValue::Other(_) => "\"\"".to_string(),
        }
    }

    /// Timestamp text in `precision` units.
    ///
    /// Strings must be strict RFC3339; a string that fails to parse yields an
    /// empty result so the record is written without a timestamp.
    pub fn to_timestamp_string(&self, precision: Precision) -> String {
        match self {
            ScalarValue::Float(v) => format!("{}", v),
            ScalarValue::Int(v) => v.to_string(),
            ScalarValue::String(s) => match DateTime::parse_from_rfc3339(s) {
                Ok(dt) => dt
                    .timestamp_nanos_opt()
                    .map(|nanos| precision.from_nanos(nanos).to_string())
                    .unwrap_or_default(),
                Err(_) => String::new(),
            },
            ScalarValue::Bool(_) | ScalarValue::Null | ScalarValue::Other(_) => String::new(),
        }
    }

    /// Unquoted text, used where the source already holds protocol syntax
    pub fn to_raw_string(&self) -> String {
        match self {
            ScalarValue::Float(v) => format!("{}", v),
            ScalarValue::Int(v) => v.to_string(),
            ScalarValue::Bool(v) => v.to_string(),
            ScalarValue::String(s) => s.clone(),
            ScalarValue::Null | ScalarValue::Other(_) => String::new(),
        }
    }
}
