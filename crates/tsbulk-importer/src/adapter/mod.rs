//! Format adapters
//!
//! Each adapter turns its native unit into something the import context can
//! buffer: CSV rows become typed `Point`s, JSON series become raw line protocol
//! lines. Column positions are resolved once per header and reused for every
//! following row.

pub mod csv;
pub mod json_influx;
pub mod json_prom;
pub mod value;

pub use value::ScalarValue;

use crate::error::{ImportError, Result};
use chrono::DateTime;
use serde::de::{self, DeserializeSeed, Deserializer, MapAccess, SeqAccess, Visitor};
use serde_json::Value;
use std::collections::BTreeMap;
use std::fmt;
use std::io::Read;
use tsbulk_core::{FieldValue, Precision, Timestamp};

/// Name of a column and its index in the header it was resolved from
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FieldPos {
    pub name: String,
    pub pos: usize,
}

impl FieldPos {
    pub fn new(name: impl Into<String>, pos: usize) -> Self {
        Self {
            name: name.into(),
            pos,
        }
    }
}

/// Resolved tag/field/time columns of a structured header
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ColumnMapping {
    pub tags: BTreeMap<String, FieldPos>,
    pub fields: BTreeMap<String, FieldPos>,
    pub time: Option<FieldPos>,
}

impl ColumnMapping {
    /// Field columns in header order
    pub fn fields_by_position(&self) -> Vec<&FieldPos> {
        let mut fields: Vec<&FieldPos> = self.fields.values().collect();
        fields.sort_by_key(|f| f.pos);
        fields
    }
}

/// Best-effort timestamp resolution for a time column cell.
///
/// Integers and decimals are taken in `precision` units and scaled to
/// nanoseconds; RFC3339 strings are absolute. Returns `None` when nothing
/// usable can be read from the cell, and an error when the cell holds a
/// number that does not fit a nanosecond timestamp.
pub fn parse_timestamp(raw: &str, precision: Precision) -> Result<Option<Timestamp>> {
    let raw = raw.trim();
    if raw.is_empty() {
        return Ok(None);
    }
    if let Ok(v) = raw.parse::<i64>() {
        return Ok(Some(precision.to_nanos(v)?));
    }
    if let Ok(v) = raw.parse::<f64>() {
        if !v.is_finite() {
            return Ok(None);
        }
        // `as` saturates instead of failing
        if v < i64::MIN as f64 || v >= i64::MAX as f64 {
            return Err(ImportError::Parse(format!("timestamp {} is out of range", raw)));
        }
        return Ok(Some(precision.to_nanos(v.trunc() as i64)?));
    }
    Ok(DateTime::parse_from_rfc3339(raw)
        .ok()
        .and_then(|dt| dt.timestamp_nanos_opt()))
}

/// Event produced while streaming a JSON document
#[derive(Debug, Clone, PartialEq)]
pub enum JsonRecord {
    /// An array stored under the record key starts
    Begin,
    /// One element of that array
    Item(Value),
}

const STREAM_STOPPED: &str = "json stream stopped by the consumer";

/// Stream every array stored under `key`, at any depth, one element at a time.
///
/// Only the element being handed to `on_record` is held in memory. The
/// callback returns `false` to stop reading, which surfaces as an error.
pub fn stream_records<R, F>(reader: R, key: &str, mut on_record: F) -> serde_json::Result<()>
where
    R: Read,
    F: FnMut(JsonRecord) -> bool,
{
    let mut deserializer = serde_json::Deserializer::from_reader(reader);
    Walker {
        key,
        on_record: &mut on_record,
        records: false,
    }
    .deserialize(&mut deserializer)?;
    deserializer.end()
}

/// Visits a document, skipping everything but the arrays under `key`
struct Walker<'a, F> {
    key: &'a str,
    on_record: &'a mut F,
    records: bool,
}

impl<'de, F> DeserializeSeed<'de> for Walker<'_, F>
where
    F: FnMut(JsonRecord) -> bool,
{
    type Value = ();

    fn deserialize<D: Deserializer<'de>>(self, deserializer: D) -> std::result::Result<(), D::Error> {
        deserializer.deserialize_any(self)
    }
}

impl<'de, F> Visitor<'de> for Walker<'_, F>
where
    F: FnMut(JsonRecord) -> bool,
{
    type Value = ();

    fn expecting(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str("a JSON document")
    }

    fn visit_bool<E: de::Error>(self, _: bool) -> std::result::Result<(), E> {
        Ok(())
    }

    fn visit_i64<E: de::Error>(self, _: i64) -> std::result::Result<(), E> {
        Ok(())
    }

    fn visit_u64<E: de::Error>(self, _: u64) -> std::result::Result<(), E> {
        Ok(())
    }

    fn visit_f64<E: de::Error>(self, _: f64) -> std::result::Result<(), E> {
        Ok(())
    }

    fn visit_str<E: de::Error>(self, _: &str) -> std::result::Result<(), E> {
        Ok(())
    }

    fn visit_unit<E: de::Error>(self) -> std::result::Result<(), E> {
        Ok(())
    }

    fn visit_seq<A: SeqAccess<'de>>(self, mut seq: A) -> std::result::Result<(), A::Error> {
        let Walker { key, on_record, records } = self;

        if !records {
            while seq
                .next_element_seed(Walker {
                    key,
                    on_record: &mut *on_record,
                    records: false,
                })?
                .is_some()
            {}
            return Ok(());
        }

        if !on_record(JsonRecord::Begin) {
            return Err(de::Error::custom(STREAM_STOPPED));
        }
        while let Some(item) = seq.next_element::<Value>()? {
            if !on_record(JsonRecord::Item(item)) {
                return Err(de::Error::custom(STREAM_STOPPED));
            }
        }
        Ok(())
    }

    fn visit_map<A: MapAccess<'de>>(self, mut map: A) -> std::result::Result<(), A::Error> {
        let Walker { key, on_record, .. } = self;
        while let Some(name) = map.next_key::<String>()? {
            map.next_value_seed(Walker {
                key,
                on_record: &mut *on_record,
                records: name == key,
            })?;
        }
        Ok(())
    }
}

/// Type a CSV cell; empty cells carry no value
pub fn parse_cell(raw: &str) -> Option<FieldValue> {
    let raw = raw.trim();
    match raw {
        "" => None,
        "true" | "True" | "TRUE" => Some(FieldValue::Boolean(true)),
        "false" | "False" | "FALSE" => Some(FieldValue::Boolean(false)),
        _ => match raw.parse::<f64>() {
            Ok(v) if v.is_finite() => Some(FieldValue::Float(v)),
            _ => Some(FieldValue::String(raw.to_string())),
        },
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_timestamp_precision() {
        let cases = [
            ("1234567890", Precision::Seconds, 1234567890000000000),
            ("1234567890", Precision::Millis, 1234567890000000),
            ("1234567890", Precision::Micros, 1234567890000),
            ("1234567890", Precision::Nanos, 1234567890),
            ("1234567890000000000", Precision::Nanos, 1234567890000000000),
        ];
        for (raw, precision, expected) in cases {
            assert_eq!(
                parse_timestamp(raw, precision).unwrap(),
                Some(expected),
                "{} at {}",
                raw,
                precision
            );
        }
    }

    #[test]
    fn test_parse_timestamp_best_effort() {
        assert_eq!(parse_timestamp("12.7", Precision::Seconds).unwrap(), Some(12_000_000_000));
        assert_eq!(
            parse_timestamp("2010-07-01T18:48:00Z", Precision::Seconds).unwrap(),
            Some(1278010080000000000)
        );
        assert_eq!(parse_timestamp("yesterday", Precision::Nanos).unwrap(), None);
        assert_eq!(parse_timestamp("inf", Precision::Nanos).unwrap(), None);
        assert_eq!(parse_timestamp("", Precision::Nanos).unwrap(), None);
    }

    #[test]
    fn test_parse_timestamp_out_of_range() {
        let err = parse_timestamp("1e30", Precision::Nanos).unwrap_err();
        assert!(err.to_string().contains("timestamp 1e30 is out of range"));
        assert!(parse_timestamp("-1e30", Precision::Nanos).is_err());
        assert!(parse_timestamp("9223372036854775808.0", Precision::Nanos).is_err());

        // fits before scaling, overflows after
        assert!(parse_timestamp("1e17", Precision::Seconds).is_err());
        assert!(parse_timestamp("9223372036854775807", Precision::Millis).is_err());

        assert_eq!(
            parse_timestamp("1e15", Precision::Nanos).unwrap(),
            Some(1_000_000_000_000_000)
        );
    }

    #[test]
    fn test_parse_cell() {
        assert_eq!(parse_cell("1.5"), Some(FieldValue::Float(1.5)));
        assert_eq!(parse_cell("42"), Some(FieldValue::Float(42.0)));
        assert_eq!(parse_cell("true"), Some(FieldValue::Boolean(true)));
        assert_eq!(parse_cell("idle"), Some(FieldValue::String("idle".into())));
        assert_eq!(parse_cell("NaN"), Some(FieldValue::String("NaN".into())));
        assert_eq!(parse_cell(" "), None);
    }

    fn collect(doc: &str, key: &str) -> serde_json::Result<Vec<JsonRecord>> {
        let mut records = Vec::new();
        stream_records(doc.as_bytes(), key, |record| {
            records.push(record);
            true
        })?;
        Ok(records)
    }

    fn names(records: &[JsonRecord]) -> Vec<String> {
        records
            .iter()
            .filter_map(|r| match r {
                JsonRecord::Item(v) => v.get("name").and_then(Value::as_str).map(str::to_string),
                JsonRecord::Begin => None,
            })
            .collect()
    }

    #[test]
    fn test_stream_records() {
        let records = collect(
            r#"{"results":[{"statement_id":0,"series":[{"name":"a"},{"name":"b"}]}]}"#,
            "series",
        )
        .unwrap();
        assert_eq!(records[0], JsonRecord::Begin);
        assert_eq!(names(&records), vec!["a", "b"]);

        assert!(collect(r#"{"results":[{"series":[]}]}"#, "result").unwrap().is_empty());

        let prom = collect(
            r#"{"status":"success","data":{"resultType":"matrix","result":[]}}"#,
            "result",
        )
        .unwrap();
        assert_eq!(prom, vec![JsonRecord::Begin]);
    }

    #[test]
    fn test_stream_records_every_statement() {
        let doc = r#"{"results":[
            {"statement_id":0,"series":[{"name":"a"}]},
            {"statement_id":1,"series":[{"name":"b"},{"name":"c"}]}
        ]}"#;
        let records = collect(doc, "series").unwrap();
        let begins = records.iter().filter(|r| **r == JsonRecord::Begin).count();
        assert_eq!(begins, 2);
        assert_eq!(names(&records), vec!["a", "b", "c"]);
    }

    #[test]
    fn test_stream_records_stops_early() {
        let doc = r#"{"series":[{"name":"a"},{"name":"b"},{"name":"c"}]}"#;
        let mut items = 0;
        let err = stream_records(doc.as_bytes(), "series", |record| {
            if let JsonRecord::Item(_) = record {
                items += 1;
            }
            items < 2
        })
        .unwrap_err();
        assert!(err.to_string().contains(STREAM_STOPPED));
        assert_eq!(items, 2);
    }

    #[test]
    fn test_stream_records_malformed() {
        assert!(collect(r#"{"series":[{"name":"a"},"#, "series").is_err());
        assert!(collect(r#"{"series":[]} trailing"#, "series").is_err());
    }

    #[test]
    fn test_fields_by_position() {
        let mut mapping = ColumnMapping::default();
        mapping.fields.insert("b".into(), FieldPos::new("b", 0));
        mapping.fields.insert("a".into(), FieldPos::new("a", 2));
        let names: Vec<&str> = mapping
            .fields_by_position()
            .iter()
            .map(|f| f.name.as_str())
            .collect();
        assert_eq!(names, vec!["b", "a"]);
    }
}
