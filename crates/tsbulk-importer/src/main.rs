//! tsbulk-import CLI
//!
//! Bulk-load line protocol, CSV or query-result JSON files into an
//! InfluxDB-compatible time series store.
//!
//! ## Usage
//!
//! ```bash
//! # Line protocol with `# DDL` / `# DML` / `# CONTEXT-DATABASE:` directives
//! tsbulk-import data.txt
//!
//! # CSV, always written through column-write
//! tsbulk-import noaa.csv --format csv --database NOAA --measurement h2o --tags location
//!
//! # Prometheus query result, seconds precision
//! tsbulk-import result.json --format jsonp --database prom --measurement up --precision s
//!
//! # Settings from a YAML file, flags override it
//! tsbulk-import --config import.yml --batch-size 500
//! ```

use anyhow::{Context, Result};
use clap::Parser;
use std::path::PathBuf;
use std::sync::Arc;
use std::time::Instant;
use tokio_util::sync::CancellationToken;
use tracing::{info, warn};
use tracing_subscriber::EnvFilter;
use tsbulk_core::Precision;
use tsbulk_importer::{Format, HttpClient, ImportConfig, Importer};

#[derive(Parser)]
#[command(name = "tsbulk-import")]
#[command(author, version, about = "Bulk import time series files")]
struct Cli {
    /// File to import (overrides config)
    file: Option<PathBuf>,

    /// Path to a YAML import config
    #[arg(short, long)]
    config: Option<PathBuf>,

    /// Input format: line_protocol, csv, jsoni, jsonp
    #[arg(short, long)]
    format: Option<Format>,

    /// Server URL
    #[arg(long)]
    host: Option<String>,

    #[arg(short, long)]
    username: Option<String>,

    #[arg(short, long)]
    password: Option<String>,

    /// Target database
    #[arg(long)]
    database: Option<String>,

    /// Target retention policy
    #[arg(long)]
    retention_policy: Option<String>,

    /// Measurement for CSV and Prometheus JSON
    #[arg(short, long)]
    measurement: Option<String>,

    /// Columns to treat as tags (comma-separated)
    #[arg(long, value_delimiter = ',')]
    tags: Vec<String>,

    /// Columns to treat as fields (comma-separated)
    #[arg(long, value_delimiter = ',')]
    fields: Vec<String>,

    /// Time column name
    #[arg(long)]
    time_field: Option<String>,

    /// Timestamp precision: s, ms, us, ns
    #[arg(long)]
    precision: Option<Precision>,

    /// Units per write request
    #[arg(short, long)]
    batch_size: Option<usize>,

    /// Use column-write for line protocol input
    #[arg(long)]
    column_write: bool,

    /// Request timeout in milliseconds
    #[arg(long)]
    timeout_ms: Option<u64>,
}

impl Cli {
    fn into_config(self) -> Result<ImportConfig> {
        let mut config = match &self.config {
            Some(path) => ImportConfig::load(path)
                .with_context(|| format!("Failed to load config {}", path.display()))?,
            None => ImportConfig::default(),
        };

        if let Some(file) = self.file {
            config.path = file;
        }
        if let Some(format) = self.format {
            config.format = format;
        }
        if let Some(host) = self.host {
            config.connection.url = host;
        }
        if let Some(username) = self.username {
            config.connection.username = username;
        }
        if let Some(password) = self.password {
            config.connection.password = password;
        }
        if let Some(timeout_ms) = self.timeout_ms {
            config.connection.timeout_ms = timeout_ms;
        }
        if let Some(database) = self.database {
            config.database = database;
        }
        if let Some(rp) = self.retention_policy {
            config.retention_policy = rp;
        }
        if let Some(measurement) = self.measurement {
            config.measurement = measurement;
        }
        if !self.tags.is_empty() {
            config.tags = self.tags;
        }
        if !self.fields.is_empty() {
            config.fields = self.fields;
        }
        if let Some(time_field) = self.time_field {
            config.time_field = time_field;
        }
        if let Some(precision) = self.precision {
            config.precision = precision;
        }
        if let Some(batch_size) = self.batch_size {
            config.batch_size = batch_size;
        }
        if self.column_write {
            config.column_write = true;
        }

        if config.path.as_os_str().is_empty() {
            anyhow::bail!("No input file given");
        }
        Ok(config)
    }
}

#[tokio::main]
async fn main() -> Result<()> {
    // Initialize logging
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")),
        )
        .init();

    let config = Cli::parse().into_config()?;
    if !config.path.exists() {
        anyhow::bail!("File not found: {}", config.path.display());
    }

    let client = Arc::new(HttpClient::new(&config.connection).context("Failed to create HTTP client")?);
    if let Err(e) = client.ping().await {
        warn!("Server {} did not answer ping: {}", client.base_url(), e);
    }

    let cancel = CancellationToken::new();
    let on_signal = cancel.clone();
    tokio::spawn(async move {
        if tokio::signal::ctrl_c().await.is_ok() {
            info!("Interrupt received, cancelling import");
            on_signal.cancel();
        }
    });

    info!("Importing {} ({})", config.path.display(), config.format);
    let path = config.path.clone();
    let start = Instant::now();

    let importer = Importer::new(config, client.clone(), client.clone(), client, cancel);
    let stats = importer
        .run()
        .await
        .with_context(|| format!("Failed to import {}", path.display()))?;

    println!("\nImport complete:");
    println!("  Units read: {}", stats.units_read);
    println!("  Units rejected: {}", stats.units_rejected);
    println!("  DDL executed: {} ({} failed)", stats.ddl_executed, stats.ddl_failed);
    println!(
        "  Batches written: {} ({} failed)",
        stats.batches_written, stats.batches_failed
    );
    println!("  Units sent: {}", stats.units_sent);
    if stats.units_dropped > 0 {
        println!("  Units dropped: {}", stats.units_dropped);
    }
    println!("  Total time: {:.2}s", start.elapsed().as_secs_f64());

    Ok(())
}
