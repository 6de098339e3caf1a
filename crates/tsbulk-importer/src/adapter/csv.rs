//! CSV adapter
//!
//! The first record of a file is the header. Configured tag, field and time
//! names are matched against it once; every later row is turned into a typed
//! `Point` through the resolved positions.

use super::{parse_cell, parse_timestamp, ColumnMapping, FieldPos};
use crate::error::{ImportError, Result};
use csv::StringRecord;
use tracing::{debug, info};
use tsbulk_core::{now_nanos, Point, Precision};

const BOM: char = '\u{feff}';

/// Resolve header columns against the configured schema.
///
/// Columns matching neither a tag, a field nor the time column become fields
/// when no field list is configured and are ignored otherwise.
pub fn map_header<S: AsRef<str>>(
    header: &[S],
    tags: &[String],
    fields: &[String],
    time_field: &str,
) -> Result<ColumnMapping> {
    if let Some(dup) = fields.iter().find(|f| tags.contains(*f)) {
        return Err(ImportError::Header(format!("{} is in both tags and fields", dup)));
    }

    let mut mapping = ColumnMapping::default();
    for (idx, column) in header.iter().enumerate() {
        let mut name = column.as_ref();
        if idx == 0 {
            name = name.trim_start_matches(BOM);
        }

        if tags.iter().any(|t| t == name) {
            mapping.tags.insert(name.to_string(), FieldPos::new(name, idx));
        } else if fields.iter().any(|f| f == name) {
            mapping.fields.insert(name.to_string(), FieldPos::new(name, idx));
        } else if name == time_field {
            mapping.time = Some(FieldPos::new(name, idx));
        } else if fields.is_empty() {
            mapping.fields.insert(name.to_string(), FieldPos::new(name, idx));
        } else {
            info!(column = %name, "Ignoring column not listed as tag or field");
        }
    }

    for field in fields {
        if !mapping.fields.contains_key(field) {
            return Err(ImportError::Header(format!(
                "field name ({}) not in csv header",
                field
            )));
        }
    }
    for tag in tags {
        if !mapping.tags.contains_key(tag) {
            return Err(ImportError::Header(format!("tag name ({}) not in csv header", tag)));
        }
    }
    if mapping.time.is_none() {
        return Err(ImportError::Header(format!(
            "time name not in csv header {}",
            time_field
        )));
    }

    debug!(
        tags = mapping.tags.len(),
        fields = mapping.fields.len(),
        "Parsed csv header"
    );
    Ok(mapping)
}

/// Build a point from one data row.
///
/// Empty cells are left out; a timestamp that cannot be read falls back to
/// the current time, one that is out of range rejects the row.
pub fn row_to_point(
    row: &StringRecord,
    mapping: &ColumnMapping,
    measurement: &str,
    precision: Precision,
) -> Result<Point> {
    let timestamp = match mapping.time.as_ref().and_then(|t| row.get(t.pos)) {
        Some(raw) => parse_timestamp(raw, precision)?,
        None => None,
    }
    .unwrap_or_else(now_nanos);

    let mut builder = Point::builder(measurement).timestamp(timestamp);
    for tag in mapping.tags.values() {
        match row.get(tag.pos).map(str::trim) {
            Some(value) if !value.is_empty() => builder = builder.tag(tag.name.as_str(), value),
            _ => {}
        }
    }
    for field in mapping.fields.values() {
        if let Some(value) = row.get(field.pos).and_then(parse_cell) {
            builder = builder.field(field.name.as_str(), value);
        }
    }

    Ok(builder.build()?)
}
