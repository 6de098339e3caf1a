//! Column-write request model
//!
//! A `WriteRequestBuilder` is bound to one database and retention policy and
//! is reused across batches. Lines are built through a per-measurement
//! `RecordBuilder` and grouped by measurement when the request is built.

use crate::error::{ImportError, Result};
use std::collections::BTreeMap;
use tsbulk_core::{FieldValue, Point, Timestamp};

/// Response code of a fully applied write
pub const CODE_SUCCESS: i32 = 0;
/// Response code of a write that was only partly applied
pub const CODE_PARTIAL_FAILURE: i32 = 1;
/// Response code of a rejected write
pub const CODE_FAILURE: i32 = 2;

/// One typed row of a measurement
#[derive(Debug, Clone, PartialEq)]
pub struct RecordLine {
    pub measurement: String,
    pub tags: BTreeMap<String, String>,
    pub fields: BTreeMap<String, FieldValue>,
    pub timestamp: Timestamp,
}

/// Produces lines for a single measurement
#[derive(Debug, Clone)]
pub struct RecordBuilder {
    measurement: String,
}

impl RecordBuilder {
    pub fn new(measurement: impl Into<String>) -> Result<Self> {
        let measurement = measurement.into();
        if measurement.is_empty() {
            return Err(ImportError::MeasurementRequired);
        }
        Ok(Self { measurement })
    }

    pub fn new_line(&self) -> LineBuilder {
        LineBuilder {
            measurement: self.measurement.clone(),
            tags: BTreeMap::new(),
            fields: BTreeMap::new(),
        }
    }
}

/// Accumulates the tags and fields of one line
#[derive(Debug)]
pub struct LineBuilder {
    measurement: String,
    tags: BTreeMap<String, String>,
    fields: BTreeMap<String, FieldValue>,
}

impl LineBuilder {
    pub fn add_tag(mut self, key: impl Into<String>, value: impl Into<String>) -> Self {
        self.tags.insert(key.into(), value.into());
        self
    }

    pub fn add_field(mut self, key: impl Into<String>, value: impl Into<FieldValue>) -> Self {
        self.fields.insert(key.into(), value.into());
        self
    }

    pub fn build(self, timestamp: Timestamp) -> RecordLine {
        RecordLine {
            measurement: self.measurement,
            tags: self.tags,
            fields: self.fields,
            timestamp,
        }
    }
}

/// Lines of a single measurement inside a request
#[derive(Debug, Clone, PartialEq)]
pub struct MeasurementRecord {
    pub measurement: String,
    pub lines: Vec<RecordLine>,
}

/// A complete column-write request
#[derive(Debug, Clone, PartialEq)]
pub struct WriteRequest {
    pub database: String,
    pub retention_policy: String,
    pub username: Option<String>,
    pub password: Option<String>,
    pub records: Vec<MeasurementRecord>,
}

impl WriteRequest {
    /// Total number of lines across all measurements
    pub fn line_count(&self) -> usize {
        self.records.iter().map(|r| r.lines.len()).sum()
    }
}

/// Stateful builder for `WriteRequest`s targeting one database and retention policy
#[derive(Debug)]
pub struct WriteRequestBuilder {
    database: String,
    retention_policy: String,
    username: Option<String>,
    password: Option<String>,
    pending: Vec<RecordLine>,
}

impl WriteRequestBuilder {
    pub fn new(database: impl Into<String>, retention_policy: impl Into<String>) -> Result<Self> {
        let database = database.into();
        if database.is_empty() {
            return Err(ImportError::DatabaseRequired);
        }
        Ok(Self {
            database,
            retention_policy: retention_policy.into(),
            username: None,
            password: None,
            pending: Vec::new(),
        })
    }

    pub fn retention_policy(&self) -> &str {
        &self.retention_policy
    }

    /// Set credentials carried by every following request; empty values clear them
    pub fn authenticate(&mut self, username: &str, password: &str) -> &mut Self {
        self.username = (!username.is_empty()).then(|| username.to_string());
        self.password = (!password.is_empty()).then(|| password.to_string());
        self
    }

    pub fn add_records(&mut self, records: impl IntoIterator<Item = RecordLine>) -> &mut Self {
        self.pending.extend(records);
        self
    }

    /// Build a request from the pending records, leaving the builder empty
    /// and ready for the next batch.
    pub fn build(&mut self) -> Result<WriteRequest> {
        if self.pending.is_empty() {
            return Err(ImportError::Config("no records to write".to_string()));
        }

        let mut records: Vec<MeasurementRecord> = Vec::new();
        for line in self.pending.drain(..) {
            match records.iter_mut().find(|r| r.measurement == line.measurement) {
                Some(record) => record.lines.push(line),
                None => records.push(MeasurementRecord {
                    measurement: line.measurement.clone(),
                    lines: vec![line],
                }),
            }
        }

        Ok(WriteRequest {
            database: self.database.clone(),
            retention_policy: self.retention_policy.clone(),
            username: self.username.clone(),
            password: self.password.clone(),
            records,
        })
    }
}

/// Outcome reported by the column-write service
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub struct WriteResponse {
    pub code: i32,
    pub message: String,
}

impl WriteResponse {
    pub fn success() -> Self {
        Self::default()
    }

    pub fn with_code(code: i32, message: impl Into<String>) -> Self {
        Self {
            code,
            message: message.into(),
        }
    }

    /// Map the response code to a local outcome
    pub fn check(&self) -> Result<()> {
        match self.code {
            CODE_SUCCESS => Ok(()),
            CODE_PARTIAL_FAILURE => Err(ImportError::PartialWrite { code: self.code }),
            CODE_FAILURE => Err(ImportError::WriteFailed { code: self.code }),
            other => Err(ImportError::UnexpectedResponse(other)),
        }
    }
}

/// Convert points into record lines, one `RecordBuilder` per measurement
pub fn points_to_records(points: &[Point]) -> Result<Vec<RecordLine>> {
    let mut builders: BTreeMap<&str, RecordBuilder> = BTreeMap::new();
    let mut lines = Vec::with_capacity(points.len());

    for point in points {
        let measurement = point.measurement.as_str();
        if !builders.contains_key(measurement) {
            builders.insert(measurement, RecordBuilder::new(measurement)?);
        }
        let builder = &builders[measurement];

        let mut line = builder.new_line();
        for (key, value) in &point.tags {
            line = line.add_tag(key.as_str(), value.as_str());
        }
        for (key, value) in &point.fields {
            line = line.add_field(key.as_str(), value.clone());
        }
        lines.push(line.build(point.timestamp));
    }

    Ok(lines)
}
