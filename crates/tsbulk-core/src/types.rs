//! Core data types shared by every import path

use crate::error::{CoreError, Result};
use std::collections::BTreeMap;

/// Nanosecond-precision Unix epoch timestamp
pub type Timestamp = i64;

/// Current wall-clock time in nanoseconds since the Unix epoch
pub fn now_nanos() -> Timestamp {
    std::time::SystemTime::now()
        .duration_since(std::time::UNIX_EPOCH)
        .map(|d| d.as_nanos() as i64)
        .unwrap_or(0)
}

/// Field value types accepted by the remote store
#[derive(Debug, Clone, PartialEq)]
pub enum FieldValue {
    /// 64-bit floating point
    Float(f64),
    /// 64-bit signed integer
    Integer(i64),
    /// UTF-8 string
    String(String),
    /// Boolean value
    Boolean(bool),
}

impl From<f64> for FieldValue {
    fn from(v: f64) -> Self {
        FieldValue::Float(v)
    }
}

impl From<i64> for FieldValue {
    fn from(v: i64) -> Self {
        FieldValue::Integer(v)
    }
}

impl From<String> for FieldValue {
    fn from(v: String) -> Self {
        FieldValue::String(v)
    }
}

impl From<&str> for FieldValue {
    fn from(v: &str) -> Self {
        FieldValue::String(v.to_string())
    }
}

impl From<bool> for FieldValue {
    fn from(v: bool) -> Self {
        FieldValue::Boolean(v)
    }
}

/// A single time series record.
///
/// Points are produced by the tokenizer or the structured adapters and are not
/// modified afterwards; they are only read when a batch is assembled.
#[derive(Debug, Clone, PartialEq)]
pub struct Point {
    /// The measurement name (like a table name)
    pub measurement: String,
    /// Tags for series identification, keyed by tag name
    pub tags: BTreeMap<String, String>,
    /// Field values, keyed by field name
    pub fields: BTreeMap<String, FieldValue>,
    /// Timestamp in nanoseconds since Unix epoch
    pub timestamp: Timestamp,
}

impl Point {
    /// Create a new point builder
    pub fn builder(measurement: impl Into<String>) -> PointBuilder {
        PointBuilder::new(measurement)
    }

    /// Validate the point
    pub fn validate(&self) -> Result<()> {
        if self.measurement.is_empty() {
            return Err(CoreError::EmptyMeasurement);
        }
        if self.fields.is_empty() {
            return Err(CoreError::NoFields);
        }
        if self.tags.keys().any(|k| k.is_empty()) {
            return Err(CoreError::EmptyTagKey);
        }
        if self.fields.keys().any(|k| k.is_empty()) {
            return Err(CoreError::EmptyFieldKey);
        }
        Ok(())
    }

    /// Get a tag value by key
    pub fn get_tag(&self, key: &str) -> Option<&str> {
        self.tags.get(key).map(|v| v.as_str())
    }

    /// Get a field value by key
    pub fn get_field(&self, key: &str) -> Option<&FieldValue> {
        self.fields.get(key)
    }
}

/// Builder for constructing Points
#[derive(Debug, Default)]
pub struct PointBuilder {
    measurement: String,
    timestamp: Option<Timestamp>,
    tags: BTreeMap<String, String>,
    fields: BTreeMap<String, FieldValue>,
}

impl PointBuilder {
    /// Create a new point builder
    pub fn new(measurement: impl Into<String>) -> Self {
        Self {
            measurement: measurement.into(),
            ..Default::default()
        }
    }

    /// Set the timestamp
    pub fn timestamp(mut self, ts: Timestamp) -> Self {
        self.timestamp = Some(ts);
        self
    }

    /// Add a tag; a repeated key replaces the earlier value
    pub fn tag(mut self, key: impl Into<String>, value: impl Into<String>) -> Self {
        self.tags.insert(key.into(), value.into());
        self
    }

    /// Add a field; a repeated key replaces the earlier value
    pub fn field(mut self, key: impl Into<String>, value: impl Into<FieldValue>) -> Self {
        self.fields.insert(key.into(), value.into());
        self
    }

    /// Build the point, defaulting the timestamp to the current time
    pub fn build(self) -> Result<Point> {
        let point = Point {
            measurement: self.measurement,
            tags: self.tags,
            fields: self.fields,
            timestamp: self.timestamp.unwrap_or_else(now_nanos),
        };

        point.validate()?;
        Ok(point)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_point_builder() {
        let point = Point::builder("cpu")
            .timestamp(1000)
            .tag("host", "server01")
            .tag("region", "us-west")
            .field("usage", 64.5)
            .field("cores", 8i64)
            .build()
            .unwrap();

        assert_eq!(point.measurement, "cpu");
        assert_eq!(point.timestamp, 1000);
        assert_eq!(point.get_tag("host"), Some("server01"));
        assert_eq!(point.get_field("cores"), Some(&FieldValue::Integer(8)));
    }

    #[test]
    fn test_point_requires_fields() {
        let err = Point::builder("cpu").tag("host", "a").build().unwrap_err();
        assert!(matches!(err, CoreError::NoFields));
    }

    #[test]
    fn test_point_requires_measurement() {
        let err = Point::builder("").field("v", 1.0).build().unwrap_err();
        assert!(matches!(err, CoreError::EmptyMeasurement));
    }

    #[test]
    fn test_default_timestamp() {
        let point = Point::builder("cpu").field("v", 1.0).build().unwrap();
        assert!(point.timestamp > 0);
    }

    #[test]
    fn test_duplicate_keys_keep_last() {
        let point = Point::builder("cpu")
            .tag("host", "a")
            .tag("host", "b")
            .field("v", 1.0)
            .build()
            .unwrap();
        assert_eq!(point.tags.len(), 1);
        assert_eq!(point.get_tag("host"), Some("b"));
    }
}
