//! InfluxDB query-result JSON adapter
//!
//! Input is the document returned by an InfluxDB-compatible `/query`
//! endpoint. Every element of the first `series` array becomes one or more
//! line protocol lines for the row-write path.

use super::{ColumnMapping, FieldPos, ScalarValue};
use crate::protocol::{escape_field_key, escape_measurement, escape_tag_key, escape_tag_value};
use serde::Deserialize;
use std::collections::BTreeMap;
use tsbulk_core::Precision;

/// Key of the array holding the series records
pub const SERIES_KEY: &str = "series";

/// Column carrying the timestamp in a series
pub const TIME_COLUMN: &str = "time";

/// One element of the `series` array
#[derive(Debug, Clone, Deserialize)]
pub struct InfluxSeries {
    pub name: String,
    #[serde(default)]
    pub tags: BTreeMap<String, String>,
    pub columns: Vec<String>,
    #[serde(default)]
    pub values: Vec<Vec<ScalarValue>>,
}

/// Column layout of a single series; every column other than `time` is a field
pub fn column_mapping(columns: &[String]) -> ColumnMapping {
    let mut mapping = ColumnMapping::default();
    for (idx, column) in columns.iter().enumerate() {
        if column == TIME_COLUMN {
            mapping.time = Some(FieldPos::new(column.as_str(), idx));
        } else {
            mapping
                .fields
                .insert(column.clone(), FieldPos::new(column.as_str(), idx));
        }
    }
    mapping
}

/// Render every value row of a series as a line protocol line.
///
/// Rows that carry no field value are dropped. A time cell that cannot be
/// read leaves the line without a timestamp.
pub fn series_to_lines(
    series: &InfluxSeries,
    mapping: &ColumnMapping,
    precision: Precision,
) -> Vec<String> {
    let mut prefix = escape_measurement(&series.name);
    for (key, value) in &series.tags {
        if value.is_empty() {
            continue;
        }
        prefix.push(',');
        prefix.push_str(&escape_tag_key(key));
        prefix.push('=');
        prefix.push_str(&escape_tag_value(value));
    }

    let fields = mapping.fields_by_position();
    let mut lines = Vec::with_capacity(series.values.len());
    for row in &series.values {
        let rendered: Vec<String> = fields
            .iter()
            .filter_map(|f| {
                row.get(f.pos)
                    .map(|v| format!("{}={}", escape_field_key(&f.name), v.to_field_string()))
            })
            .collect();
        if rendered.is_empty() {
            continue;
        }

        let timestamp = mapping
            .time
            .as_ref()
            .and_then(|t| row.get(t.pos))
            .map(|v| v.to_timestamp_string(precision))
            .unwrap_or_default();

        let mut line = format!("{} {}", prefix, rendered.join(","));
        if !timestamp.is_empty() {
            line.push(' ');
            line.push_str(&timestamp);
        }
        lines.push(line);
    }
    lines
}
