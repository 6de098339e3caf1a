//! tsbulk Importer - bulk ingestion into InfluxDB-compatible time series stores
//!
//! Files are read one unit at a time, classified by an [`ImportContext`] and
//! batched before being delivered through row-write or column-write.
//!
//! ## Supported Formats
//!
//! - **Line protocol**: text with `# DDL`, `# DML` and `# CONTEXT-*` directives
//! - **CSV**: header row mapped to tags, fields and a time column
//! - **JSON-Influx**: `/query` results with a `series` array
//! - **JSON-Prom**: Prometheus query results with a `result` array
//!
//! ## Usage
//!
//! ```no_run
//! use std::sync::Arc;
//! use tokio_util::sync::CancellationToken;
//! use tsbulk_importer::{Format, HttpClient, ImportConfig, Importer};
//!
//! #[tokio::main]
//! async fn main() -> anyhow::Result<()> {
//!     let config = ImportConfig {
//!         path: "noaa.csv".into(),
//!         format: Format::Csv,
//!         database: "NOAA_water_database".to_string(),
//!         measurement: "h2o_feet".to_string(),
//!         tags: vec!["location".to_string()],
//!         ..Default::default()
//!     };
//!
//!     let client = Arc::new(HttpClient::new(&config.connection)?);
//!     let importer = Importer::new(config, client.clone(), client.clone(), client, CancellationToken::new());
//!     let stats = importer.run().await?;
//!
//!     println!("Imported {} units", stats.units_sent);
//!     Ok(())
//! }
//! ```

pub mod adapter;
pub mod client;
pub mod column;
pub mod config;
pub mod context;
pub mod dispatcher;
pub mod error;
pub mod http;
pub mod import;
pub mod line_protocol;
pub mod protocol;
pub mod registry;

pub use client::{ColumnWriteClient, QueryClient, QueryResponse, RowWriteClient};
pub use column::{RecordBuilder, RecordLine, WriteRequest, WriteRequestBuilder, WriteResponse};
pub use config::{ConnectionConfig, Format, ImportConfig, Transport};
pub use context::{Action, BufferKind, ImportContext, Phase, Target};
pub use dispatcher::{BatchDispatcher, DispatchStats};
pub use error::{ImportError, Result};
pub use http::HttpClient;
pub use import::{ImportStats, Importer};
pub use line_protocol::LineProtocolParser;
pub use registry::BuilderRegistry;
