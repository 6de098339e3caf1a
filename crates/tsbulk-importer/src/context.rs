//! Per-file import state machine
//!
//! `ImportContext` owns the schema context of one import run and classifies
//! every input unit. It never talks to the network: each call returns an
//! [`Action`] that the driver carries out, so the phase logic can be tested
//! on its own.

use crate::adapter::json_influx::{self, InfluxSeries};
use crate::adapter::json_prom::{self, PromSeries};
use crate::adapter::{csv as csv_adapter, ColumnMapping};
use crate::config::{ImportConfig, DEFAULT_RETENTION_POLICY};
use crate::error::{ImportError, Result};
use csv::StringRecord;
use std::mem;
use tracing::{debug, info, warn};
use tsbulk_core::{Point, Precision};

/// Enter the schema-definition phase
pub const TOKEN_DDL: &str = "# DDL";
/// Enter the data phase
pub const TOKEN_DML: &str = "# DML";
pub const TOKEN_DATABASE: &str = "# CONTEXT-DATABASE:";
pub const TOKEN_RETENTION_POLICY: &str = "# CONTEXT-RETENTION-POLICY:";

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Phase {
    Ddl,
    Dml,
}

/// Which pending buffer an action refers to
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum BufferKind {
    /// Raw line protocol text
    Lines,
    /// Typed points
    Points,
}

/// Database and retention policy a batch is written to
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub struct Target {
    pub database: String,
    pub retention_policy: String,
}

/// Side effect requested by the state machine
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Action {
    None,
    /// Run a statement through the query client
    Query(String),
    /// A buffer reached the batch size
    Flush(BufferKind),
    /// The target changes; send the pending lines to the previous one first
    DrainLines(Target),
}

/// Schema context and pending buffers of one import run
#[derive(Debug)]
pub struct ImportContext {
    phase: Phase,
    database: String,
    retention_policy: String,
    measurement: String,
    mapping: ColumnMapping,
    lines: Vec<String>,
    points: Vec<Point>,
    batch_size: usize,
    precision: Precision,
    config: ImportConfig,
}

impl ImportContext {
    pub fn new(config: &ImportConfig) -> Self {
        Self {
            phase: Phase::Ddl,
            database: config.database.clone(),
            retention_policy: config.retention_policy.clone(),
            measurement: config.measurement.clone(),
            mapping: ColumnMapping::default(),
            lines: Vec::new(),
            points: Vec::new(),
            batch_size: config.batch_size(),
            precision: config.precision,
            config: config.clone(),
        }
    }

    pub fn phase(&self) -> Phase {
        self.phase
    }

    pub fn database(&self) -> &str {
        &self.database
    }

    pub fn retention_policy(&self) -> &str {
        &self.retention_policy
    }

    pub fn mapping(&self) -> &ColumnMapping {
        &self.mapping
    }

    pub fn batch_size(&self) -> usize {
        self.batch_size
    }

    pub fn target(&self) -> Target {
        Target {
            database: self.database.clone(),
            retention_policy: self.retention_policy.clone(),
        }
    }

    pub fn lines_pending(&self) -> usize {
        self.lines.len()
    }

    pub fn points_pending(&self) -> usize {
        self.points.len()
    }

    /// Whether `kind` holds at least one full batch
    pub fn batch_ready(&self, kind: BufferKind) -> bool {
        let len = match kind {
            BufferKind::Lines => self.lines.len(),
            BufferKind::Points => self.points.len(),
        };
        len >= self.batch_size
    }

    /// Handle one line of a line protocol file
    pub fn process_line(&mut self, line: &str) -> Result<Action> {
        let line = line.trim();

        if line.starts_with(TOKEN_DDL) {
            self.phase = Phase::Ddl;
            return Ok(Action::None);
        }
        if line.starts_with(TOKEN_DML) {
            let rp = if self.config.retention_policy.is_empty() {
                DEFAULT_RETENTION_POLICY.to_string()
            } else {
                self.config.retention_policy.clone()
            };
            let action = self.retarget(self.database.clone(), rp);
            self.phase = Phase::Dml;
            return Ok(action);
        }
        if let Some(name) = line.strip_prefix(TOKEN_DATABASE) {
            return Ok(self.retarget(name.trim().to_string(), self.retention_policy.clone()));
        }
        if let Some(name) = line.strip_prefix(TOKEN_RETENTION_POLICY) {
            return Ok(self.retarget(self.database.clone(), name.trim().to_string()));
        }
        if line.is_empty() || line.starts_with('#') {
            return Ok(Action::None);
        }

        match self.phase {
            Phase::Ddl => Ok(Action::Query(line.to_string())),
            Phase::Dml => {
                if self.database.is_empty() {
                    return Err(ImportError::DatabaseRequired);
                }
                self.lines.push(line.to_string());
                Ok(self.flush_if_ready(BufferKind::Lines))
            }
        }
    }

    /// Handle one CSV record; the first one is the header
    pub fn process_csv(&mut self, record: &StringRecord) -> Result<Action> {
        if record.is_empty() {
            return Ok(Action::None);
        }

        match self.phase {
            Phase::Ddl => {
                let header: Vec<&str> = record.iter().collect();
                self.mapping = csv_adapter::map_header(
                    &header,
                    &self.config.tags,
                    &self.config.fields,
                    &self.config.time_field,
                )?;
                info!(columns = header.len(), "Parsed csv header");
                self.phase = Phase::Dml;
                Ok(self.enter_structured_dml())
            }
            Phase::Dml => {
                self.require_target()?;
                if self.measurement.is_empty() {
                    return Err(ImportError::MeasurementRequired);
                }
                if self.mapping.fields.is_empty() {
                    return Err(ImportError::Config("field is required".to_string()));
                }

                let point =
                    csv_adapter::row_to_point(record, &self.mapping, &self.measurement, self.precision)?;
                self.points.push(point);
                Ok(self.flush_if_ready(BufferKind::Points))
            }
        }
    }

    /// Start of the record array of a JSON document
    pub fn begin_json(&mut self) -> Action {
        if self.phase == Phase::Dml {
            return Action::None;
        }
        self.mapping = ColumnMapping::default();
        self.phase = Phase::Dml;
        self.enter_structured_dml()
    }

    /// Handle one element of an InfluxDB `series` array
    pub fn process_influx_series(&mut self, series: &InfluxSeries) -> Result<Action> {
        self.require_dml()?;
        self.require_target()?;

        self.mapping = json_influx::column_mapping(&series.columns);
        let lines = json_influx::series_to_lines(series, &self.mapping, self.precision);
        debug!(series = %series.name, lines = lines.len(), "Converted influx series");
        self.lines.extend(lines);
        Ok(self.flush_if_ready(BufferKind::Lines))
    }

    /// Handle one element of a Prometheus `result` array
    pub fn process_prom_series(&mut self, series: &PromSeries) -> Result<Action> {
        self.require_dml()?;
        self.require_target()?;
        if self.measurement.is_empty() {
            return Err(ImportError::MeasurementRequired);
        }

        let field = self
            .config
            .fields
            .first()
            .map(String::as_str)
            .unwrap_or(json_prom::DEFAULT_FIELD);
        let lines = json_prom::series_to_lines(
            series,
            &self.measurement,
            &self.config.tags,
            field,
            self.precision,
        );
        self.lines.extend(lines);
        Ok(self.flush_if_ready(BufferKind::Lines))
    }

    /// Take the next batch of lines: the first `batch_size` when more than a
    /// batch is pending, everything otherwise.
    pub fn take_line_batch(&mut self) -> Vec<String> {
        if self.lines.len() > self.batch_size {
            self.lines.drain(..self.batch_size).collect()
        } else {
            mem::take(&mut self.lines)
        }
    }

    pub fn take_point_batch(&mut self) -> Vec<Point> {
        if self.points.len() > self.batch_size {
            self.points.drain(..self.batch_size).collect()
        } else {
            mem::take(&mut self.points)
        }
    }

    fn flush_if_ready(&self, kind: BufferKind) -> Action {
        if self.batch_ready(kind) {
            Action::Flush(kind)
        } else {
            Action::None
        }
    }

    fn retarget(&mut self, database: String, retention_policy: String) -> Action {
        let previous = self.target();
        self.database = database;
        self.retention_policy = retention_policy;
        if self.lines.is_empty() || previous == self.target() {
            Action::None
        } else {
            Action::DrainLines(previous)
        }
    }

    fn enter_structured_dml(&mut self) -> Action {
        self.database = self.config.database.clone();
        self.retention_policy = self.config.retention_policy.clone();
        self.measurement = self.config.measurement.clone();

        if self.database.is_empty() {
            warn!(format = %self.config.format, "No database configured, skipping CREATE DATABASE");
            return Action::None;
        }
        Action::Query(format!("CREATE DATABASE {}", self.database))
    }

    fn require_dml(&self) -> Result<()> {
        if self.phase != Phase::Dml {
            return Err(ImportError::Parse(format!(
                "{} record found before its header",
                self.config.format
            )));
        }
        Ok(())
    }

    fn require_target(&mut self) -> Result<()> {
        if self.database.is_empty() {
            return Err(ImportError::DatabaseRequired);
        }
        if self.retention_policy.is_empty() {
            self.retention_policy = DEFAULT_RETENTION_POLICY.to_string();
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::Format;

    fn context(batch_size: usize) -> ImportContext {
        ImportContext::new(&ImportConfig {
            batch_size,
            ..Default::default()
        })
    }

    fn csv_context(fields: &[&str]) -> ImportContext {
        ImportContext::new(&ImportConfig {
            format: Format::Csv,
            database: "NOAA".to_string(),
            measurement: "h2o".to_string(),
            tags: vec!["location".to_string()],
            fields: fields.iter().map(|f| f.to_string()).collect(),
            batch_size: 2,
            ..Default::default()
        })
    }

    #[test]
    fn test_directives() {
        let mut ctx = context(10);
        assert_eq!(ctx.phase(), Phase::Ddl);

        assert_eq!(ctx.process_line("# DML").unwrap(), Action::None);
        assert_eq!(ctx.phase(), Phase::Dml);
        assert_eq!(ctx.retention_policy(), "autogen");

        ctx.process_line("# CONTEXT-DATABASE: NOAA_water_database").unwrap();
        ctx.process_line("# CONTEXT-RETENTION-POLICY:weekly").unwrap();
        assert_eq!(ctx.database(), "NOAA_water_database");
        assert_eq!(ctx.retention_policy(), "weekly");

        assert_eq!(ctx.process_line("# DDL").unwrap(), Action::None);
        assert_eq!(ctx.phase(), Phase::Ddl);
    }

    #[test]
    fn test_ddl_lines_become_queries() {
        let mut ctx = context(10);
        assert_eq!(
            ctx.process_line("CREATE DATABASE NOAA\n").unwrap(),
            Action::Query("CREATE DATABASE NOAA".to_string())
        );
        assert_eq!(ctx.process_line("   ").unwrap(), Action::None);
        assert_eq!(ctx.process_line("# a comment").unwrap(), Action::None);
        assert_eq!(ctx.lines_pending(), 0);
    }

    #[test]
    fn test_data_line_requires_database() {
        let mut ctx = context(10);
        ctx.process_line("# DML").unwrap();
        let err = ctx.process_line("cpu v=1").unwrap_err();
        assert!(matches!(err, ImportError::DatabaseRequired));
        assert!(err.to_string().contains("# CONTEXT-DATABASE:"));
        assert_eq!(ctx.lines_pending(), 0);
    }

    #[test]
    fn test_batch_threshold() {
        let mut ctx = context(3);
        ctx.process_line("# DML").unwrap();
        ctx.process_line("# CONTEXT-DATABASE: db").unwrap();

        assert_eq!(ctx.process_line("cpu v=1").unwrap(), Action::None);
        assert_eq!(ctx.process_line("cpu v=2").unwrap(), Action::None);
        assert_eq!(
            ctx.process_line("cpu v=3").unwrap(),
            Action::Flush(BufferKind::Lines)
        );
        ctx.process_line("cpu v=4").unwrap();

        let batch = ctx.take_line_batch();
        assert_eq!(batch, vec!["cpu v=1", "cpu v=2", "cpu v=3"]);
        assert_eq!(ctx.lines_pending(), 1);
        assert_eq!(ctx.take_line_batch(), vec!["cpu v=4"]);
        assert_eq!(ctx.lines_pending(), 0);
    }

    #[test]
    fn test_retarget_drains_pending_lines() {
        let mut ctx = context(10);
        ctx.process_line("# DML").unwrap();
        ctx.process_line("# CONTEXT-DATABASE: a").unwrap();
        ctx.process_line("cpu v=1").unwrap();

        let action = ctx.process_line("# CONTEXT-DATABASE: b").unwrap();
        assert_eq!(
            action,
            Action::DrainLines(Target {
                database: "a".to_string(),
                retention_policy: "autogen".to_string(),
            })
        );
        assert_eq!(ctx.database(), "b");

        ctx.take_line_batch();
        assert_eq!(ctx.process_line("# CONTEXT-DATABASE: c").unwrap(), Action::None);
    }

    #[test]
    fn test_csv_header_then_rows() {
        let mut ctx = csv_context(&["level"]);
        let header = StringRecord::from(vec!["time", "location", "level"]);
        assert_eq!(
            ctx.process_csv(&header).unwrap(),
            Action::Query("CREATE DATABASE NOAA".to_string())
        );
        assert_eq!(ctx.phase(), Phase::Dml);
        assert_eq!(ctx.retention_policy(), "");

        let row = StringRecord::from(vec!["1", "santa_monica", "2.1"]);
        assert_eq!(ctx.process_csv(&row).unwrap(), Action::None);
        assert_eq!(ctx.retention_policy(), "autogen");
        assert_eq!(ctx.process_csv(&row).unwrap(), Action::Flush(BufferKind::Points));

        let points = ctx.take_point_batch();
        assert_eq!(points.len(), 2);
        assert_eq!(points[0].get_tag("location"), Some("santa_monica"));
    }

    #[test]
    fn test_csv_header_error_is_fatal() {
        let mut ctx = csv_context(&["missing"]);
        let header = StringRecord::from(vec!["time", "location", "level"]);
        let err = ctx.process_csv(&header).unwrap_err();
        assert!(err.is_fatal());
        assert!(err.to_string().contains("field name (missing) not in csv header"));
        assert_eq!(ctx.phase(), Phase::Ddl);
    }

    #[test]
    fn test_csv_requires_measurement() {
        let mut ctx = ImportContext::new(&ImportConfig {
            format: Format::Csv,
            database: "db".to_string(),
            ..Default::default()
        });
        ctx.process_csv(&StringRecord::from(vec!["time", "v"])).unwrap();
        let err = ctx.process_csv(&StringRecord::from(vec!["1", "2"])).unwrap_err();
        assert!(matches!(err, ImportError::MeasurementRequired));
    }

    #[test]
    fn test_json_series_before_header() {
        let mut ctx = context(10);
        let series: PromSeries = serde_json::from_str(r#"{"metric":{},"value":[1,"1"]}"#).unwrap();
        assert!(matches!(
            ctx.process_prom_series(&series),
            Err(ImportError::Parse(_))
        ));
    }

    #[test]
    fn test_influx_series_resets_mapping() {
        let mut ctx = ImportContext::new(&ImportConfig {
            format: Format::JsonInflux,
            database: "db".to_string(),
            ..Default::default()
        });
        assert_eq!(ctx.begin_json(), Action::Query("CREATE DATABASE db".to_string()));
        assert_eq!(ctx.begin_json(), Action::None);

        let first: InfluxSeries =
            serde_json::from_str(r#"{"name":"a","columns":["time","x"],"values":[[1,1]]}"#).unwrap();
        let second: InfluxSeries =
            serde_json::from_str(r#"{"name":"b","columns":["y"],"values":[[2]]}"#).unwrap();

        ctx.process_influx_series(&first).unwrap();
        assert!(ctx.mapping().time.is_some());
        ctx.process_influx_series(&second).unwrap();
        assert!(ctx.mapping().time.is_none());
        assert_eq!(ctx.take_line_batch(), vec!["a x=1 1", "b y=2"]);
    }

    #[test]
    fn test_prom_uses_configured_field() {
        let mut ctx = ImportContext::new(&ImportConfig {
            format: Format::JsonProm,
            database: "db".to_string(),
            measurement: "prom".to_string(),
            fields: vec!["usage".to_string()],
            ..Default::default()
        });
        ctx.begin_json();
        let series: PromSeries =
            serde_json::from_str(r#"{"metric":{"job":"node"},"value":[10,"0.5"]}"#).unwrap();
        ctx.process_prom_series(&series).unwrap();
        assert_eq!(ctx.take_line_batch(), vec!["prom,job=node usage=0.5 10"]);
    }
}
