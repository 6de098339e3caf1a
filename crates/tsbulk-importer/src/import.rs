//! Import driver
//!
//! Reads one unit at a time, lets the [`ImportContext`] classify it and
//! carries out the resulting [`Action`]. Per-unit failures are logged and
//! skipped; only header errors and cancellation stop a run. End of input
//! always drains both buffers.

use crate::adapter::{stream_records, JsonRecord};
use crate::adapter::json_influx::{InfluxSeries, SERIES_KEY};
use crate::adapter::json_prom::{PromSeries, RESULT_KEY};
use crate::client::{ColumnWriteClient, QueryClient, RowWriteClient};
use crate::config::{Format, ImportConfig};
use crate::context::{Action, BufferKind, ImportContext};
use crate::dispatcher::BatchDispatcher;
use crate::error::{ImportError, Result};
use serde::Deserialize;
use std::fs::File;
use std::io::{BufRead, BufReader, Read};
use std::sync::Arc;
use tokio::sync::mpsc;
use tokio_util::sync::CancellationToken;
use tracing::{debug, error, info, warn};

/// JSON records decoded ahead of the import loop
const JSON_READ_AHEAD: usize = 16;

/// Summary of an import run
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct ImportStats {
    /// Input units read (lines, CSV records, JSON series)
    pub units_read: u64,
    /// Units rejected before reaching a buffer
    pub units_rejected: u64,
    /// DDL statements executed successfully
    pub ddl_executed: u64,
    /// DDL statements that failed
    pub ddl_failed: u64,
    pub batches_written: u64,
    pub batches_failed: u64,
    /// Units delivered to the store
    pub units_sent: u64,
    /// Units lost to failed writes
    pub units_dropped: u64,
}

/// Drives one file through the context and the dispatcher
pub struct Importer {
    config: ImportConfig,
    context: ImportContext,
    dispatcher: BatchDispatcher,
    query: Arc<dyn QueryClient>,
    cancel: CancellationToken,
    stats: ImportStats,
}

impl Importer {
    pub fn new(
        config: ImportConfig,
        query: Arc<dyn QueryClient>,
        row: Arc<dyn RowWriteClient>,
        column: Arc<dyn ColumnWriteClient>,
        cancel: CancellationToken,
    ) -> Self {
        let dispatcher = BatchDispatcher::new(
            config.transport(),
            config.precision,
            row,
            column,
            cancel.clone(),
        )
        .with_credentials(
            config.connection.username.as_str(),
            config.connection.password.as_str(),
        );

        Self {
            context: ImportContext::new(&config),
            config,
            dispatcher,
            query,
            cancel,
            stats: ImportStats::default(),
        }
    }

    /// Import the configured file
    pub async fn run(self) -> Result<ImportStats> {
        let file = File::open(&self.config.path).map_err(|e| {
            error!(path = %self.config.path.display(), error = %e, "Failed to open file");
            e
        })?;
        self.import_reader(BufReader::new(file)).await
    }

    /// Import from any reader in the configured format
    pub async fn import_reader<R: Read + Send + 'static>(mut self, reader: R) -> Result<ImportStats> {
        info!(
            format = %self.config.format,
            transport = ?self.config.transport(),
            batch_size = self.context.batch_size(),
            "Starting import"
        );

        let outcome = match self.config.format {
            Format::LineProtocol => self.read_line_protocol(reader).await,
            Format::Csv => {
                info!("csv files are only imported through column-write");
                self.read_csv(reader).await
            }
            Format::JsonInflux | Format::JsonProm => {
                info!("json files are only imported through row-write");
                self.read_json(reader).await
            }
        };

        if let Err(e) = outcome {
            error!(error = %e, "Import aborted");
            if !e.is_fatal() {
                // the input broke off; what was read before it is still delivered
                if let Err(drain) = self.dispatcher.drain(&mut self.context).await {
                    error!(error = %drain, "Failed to write remaining data");
                }
            }
            return Err(e);
        }

        if let Err(e) = self.dispatcher.drain(&mut self.context).await {
            error!(error = %e, "Failed to write remaining data");
            if e.is_cancelled() {
                return Err(e);
            }
        }

        let stats = self.finish();
        info!(
            path = %self.config.path.display(),
            units = stats.units_read,
            sent = stats.units_sent,
            dropped = stats.units_dropped,
            "Import finished"
        );
        Ok(stats)
    }

    async fn read_line_protocol<R: Read>(&mut self, reader: R) -> Result<()> {
        let mut reader = BufReader::new(reader);
        let mut buf = Vec::new();
        loop {
            buf.clear();
            if reader.read_until(b'\n', &mut buf)? == 0 {
                return Ok(());
            }
            self.stats.units_read += 1;
            let result = match std::str::from_utf8(&buf) {
                Ok(line) => self.context.process_line(line),
                Err(e) => Err(ImportError::Parse(format!("invalid utf-8 in line: {}", e))),
            };
            self.handle(result).await?;
        }
    }

    async fn read_csv<R: Read>(&mut self, reader: R) -> Result<()> {
        let mut reader = csv::ReaderBuilder::new()
            .has_headers(false)
            .comment(Some(b'#'))
            .flexible(true)
            .from_reader(reader);

        for record in reader.records() {
            self.stats.units_read += 1;
            let record = match record {
                Ok(record) => record,
                Err(e) => {
                    error!(error = %e, "Failed to read csv record");
                    self.stats.units_rejected += 1;
                    continue;
                }
            };
            let result = self.context.process_csv(&record);
            self.handle(result).await?;
        }
        Ok(())
    }

    /// Decode the record arrays on a blocking thread and import them one
    /// element at a time
    async fn read_json<R: Read + Send + 'static>(&mut self, reader: R) -> Result<()> {
        let key = match self.config.format {
            Format::JsonProm => RESULT_KEY,
            _ => SERIES_KEY,
        };

        let (tx, mut rx) = mpsc::channel(JSON_READ_AHEAD);
        let decoder = tokio::task::spawn_blocking(move || {
            stream_records(BufReader::new(reader), key, |record| tx.blocking_send(record).is_ok())
        });

        let mut arrays = 0;
        while let Some(record) = rx.recv().await {
            match record {
                JsonRecord::Begin => {
                    arrays += 1;
                    debug!(key, arrays, "Found record array");
                    let action = self.context.begin_json();
                    self.handle(Ok(action)).await?;
                }
                JsonRecord::Item(item) => {
                    self.stats.units_read += 1;
                    let result = match self.config.format {
                        Format::JsonProm => PromSeries::deserialize(item)
                            .map_err(ImportError::from)
                            .and_then(|series| self.context.process_prom_series(&series)),
                        _ => InfluxSeries::deserialize(item)
                            .map_err(ImportError::from)
                            .and_then(|series| self.context.process_influx_series(&series)),
                    };
                    self.handle(result).await?;
                }
            }
        }

        decoder
            .await
            .map_err(|e| ImportError::Parse(format!("json decoder task failed: {}", e)))??;
        if arrays == 0 {
            warn!(key, "No record array found in document");
        }
        Ok(())
    }

    /// Log and skip a failed unit, or perform its action. Returns an error
    /// only when the run must stop.
    async fn handle(&mut self, result: Result<Action>) -> Result<()> {
        let outcome = match result {
            Ok(action) => self.apply(action).await,
            Err(e) => {
                if !e.is_fatal() {
                    self.stats.units_rejected += 1;
                }
                Err(e)
            }
        };

        match outcome {
            Err(e) if e.is_fatal() => Err(e),
            Err(e) => {
                error!(error = %e, "Failed to process {} unit", self.config.format);
                Ok(())
            }
            Ok(()) => Ok(()),
        }
    }

    async fn apply(&mut self, action: Action) -> Result<()> {
        match action {
            Action::None => Ok(()),
            Action::Query(command) => self.execute_ddl(&command).await,
            Action::Flush(kind) => {
                while self.context.batch_ready(kind) {
                    match kind {
                        BufferKind::Lines => self.dispatcher.flush_lines(&mut self.context).await?,
                        BufferKind::Points => self.dispatcher.flush_points(&mut self.context).await?,
                    }
                }
                Ok(())
            }
            Action::DrainLines(target) => {
                let mut errors = Vec::new();
                while self.context.lines_pending() > 0 {
                    if let Err(e) = self.dispatcher.flush_lines_to(&mut self.context, &target).await {
                        let stop = matches!(e, ImportError::DatabaseRequired | ImportError::Cancelled);
                        errors.push(e);
                        if stop {
                            break;
                        }
                    }
                }
                match ImportError::join(errors) {
                    Some(e) => Err(e),
                    None => Ok(()),
                }
            }
        }
    }

    async fn execute_ddl(&mut self, command: &str) -> Result<()> {
        if self.cancel.is_cancelled() {
            return Err(ImportError::Cancelled);
        }
        let result = tokio::select! {
            _ = self.cancel.cancelled() => Err(ImportError::Cancelled),
            result = self.query.query(command) => result,
        };

        match result {
            Ok(_) => {
                self.stats.ddl_executed += 1;
                info!(command, "Executed ddl");
                Ok(())
            }
            Err(ImportError::Cancelled) => Err(ImportError::Cancelled),
            Err(e) => {
                self.stats.ddl_failed += 1;
                error!(command, error = %e, "Failed to execute ddl");
                Ok(())
            }
        }
    }

    fn finish(&self) -> ImportStats {
        let dispatch = self.dispatcher.stats();
        ImportStats {
            batches_written: dispatch.batches_written,
            batches_failed: dispatch.batches_failed,
            units_sent: dispatch.units_sent,
            units_dropped: dispatch.units_dropped,
            ..self.stats
        }
    }
}
