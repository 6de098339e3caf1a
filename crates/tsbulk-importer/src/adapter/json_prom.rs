//! Prometheus query-result JSON adapter
//!
//! Each element of the `result` array carries a label set and either a range
//! of `[timestamp, value]` samples or a single instant sample.

use super::ScalarValue;
use crate::protocol::{escape_field_key, escape_measurement, escape_tag_key, escape_tag_value};
use serde::Deserialize;
use std::collections::BTreeMap;
use tracing::debug;
use tsbulk_core::Precision;

/// Key of the array holding the sample records
pub const RESULT_KEY: &str = "result";

/// Field name used when none is configured
pub const DEFAULT_FIELD: &str = "value";

/// One element of the `result` array
#[derive(Debug, Clone, Deserialize)]
pub struct PromSeries {
    #[serde(default)]
    pub metric: BTreeMap<String, String>,
    #[serde(default)]
    pub values: Vec<(ScalarValue, ScalarValue)>,
    #[serde(default)]
    pub value: Option<(ScalarValue, ScalarValue)>,
}

impl PromSeries {
    fn samples(&self) -> Vec<&(ScalarValue, ScalarValue)> {
        if self.values.is_empty() {
            self.value.iter().collect()
        } else {
            self.values.iter().collect()
        }
    }
}

/// Render the samples of one result element.
///
/// With `tags` configured only those labels are kept, otherwise every label
/// becomes a tag. Sample values are copied verbatim.
pub fn series_to_lines(
    series: &PromSeries,
    measurement: &str,
    tags: &[String],
    field: &str,
    precision: Precision,
) -> Vec<String> {
    let mut prefix = escape_measurement(measurement);
    let labels: Vec<(&String, &String)> = if tags.is_empty() {
        series.metric.iter().collect()
    } else {
        tags.iter()
            .filter_map(|t| series.metric.get_key_value(t))
            .collect()
    };
    for (key, value) in labels {
        if value.is_empty() {
            continue;
        }
        prefix.push(',');
        prefix.push_str(&escape_tag_key(key));
        prefix.push('=');
        prefix.push_str(&escape_tag_value(value));
    }

    let field = escape_field_key(field);
    series
        .samples()
        .into_iter()
        .filter_map(|(ts, value)| {
            let value = value.to_raw_string();
            if value.is_empty() {
                debug!(measurement = %measurement, "Skipping sample without value");
                return None;
            }
            let ts = ts.to_timestamp_string(precision);
            if ts.is_empty() {
                Some(format!("{} {}={}", prefix, field, value))
            } else {
                Some(format!("{} {}={} {}", prefix, field, value, ts))
            }
        })
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;

    fn series(json: &str) -> PromSeries {
        serde_json::from_str(json).unwrap()
    }

    #[test]
    fn test_range_samples() {
        let s = series(
            r#"{
                "metric": {"__name__": "up", "job": "node", "instance": "a:9100"},
                "values": [[1566123456.781, "1"], [1566123471.781, "0"]]
            }"#,
        );
        let lines = series_to_lines(&s, "prom", &[], DEFAULT_FIELD, Precision::Seconds);
        assert_eq!(
            lines,
            vec![
                "prom,__name__=up,instance=a:9100,job=node value=1 1566123456.781".to_string(),
                "prom,__name__=up,instance=a:9100,job=node value=0 1566123471.781".to_string(),
            ]
        );
    }

    #[test]
    fn test_instant_sample_with_selected_tags() {
        let s = series(
            r#"{"metric": {"job": "node", "instance": "a"}, "value": [1700000000, "0.25"]}"#,
        );
        let tags = vec!["job".to_string(), "zone".to_string()];
        let lines = series_to_lines(&s, "prom", &tags, "usage", Precision::Seconds);
        assert_eq!(lines, vec!["prom,job=node usage=0.25 1700000000".to_string()]);
    }

    #[test]
    fn test_no_samples() {
        let s = series(r#"{"metric": {"job": "node"}}"#);
        assert!(series_to_lines(&s, "prom", &[], DEFAULT_FIELD, Precision::Nanos).is_empty());
    }
}
