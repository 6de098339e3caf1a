//! tsbulk core - shared types for the bulk importer
//!
//! This crate provides the data model every import path converges on:
//! - `Timestamp`: Nanosecond-precision Unix epoch timestamps
//! - `FieldValue`: Typed field values (Float, Integer, String, Boolean)
//! - `Point`: A single record with measurement, tags, fields and timestamp
//! - `Precision`: Timestamp precision of the source data (s, ms, us, ns)

pub mod error;
pub mod precision;
pub mod types;

pub use error::{CoreError, Result};
pub use precision::Precision;
pub use types::*;
