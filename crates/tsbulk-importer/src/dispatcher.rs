//! Batch dispatcher
//!
//! Takes batches out of the import context and delivers them through the
//! configured transport. Delivery is at most once: a batch that fails to
//! send is counted and dropped, never put back into the buffer.

use crate::client::{ColumnWriteClient, RowWriteClient};
use crate::column::points_to_records;
use crate::config::Transport;
use crate::context::{ImportContext, Target};
use crate::error::{ImportError, Result};
use crate::line_protocol::LineProtocolParser;
use crate::registry::BuilderRegistry;
use std::future::Future;
use std::sync::Arc;
use tokio_util::sync::CancellationToken;
use tracing::{debug, warn};
use tsbulk_core::{Point, Precision};

/// Delivery counters
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct DispatchStats {
    /// Batches acknowledged by the store
    pub batches_written: u64,
    /// Batches that failed to send
    pub batches_failed: u64,
    /// Units contained in acknowledged batches
    pub units_sent: u64,
    /// Units lost to failed batches or unparsable lines
    pub units_dropped: u64,
}

/// Sends pending batches through row-write or column-write
pub struct BatchDispatcher {
    transport: Transport,
    precision: Precision,
    username: String,
    password: String,
    registry: BuilderRegistry,
    row: Arc<dyn RowWriteClient>,
    column: Arc<dyn ColumnWriteClient>,
    cancel: CancellationToken,
    stats: DispatchStats,
}

impl BatchDispatcher {
    pub fn new(
        transport: Transport,
        precision: Precision,
        row: Arc<dyn RowWriteClient>,
        column: Arc<dyn ColumnWriteClient>,
        cancel: CancellationToken,
    ) -> Self {
        Self {
            transport,
            precision,
            username: String::new(),
            password: String::new(),
            registry: BuilderRegistry::new(),
            row,
            column,
            cancel,
            stats: DispatchStats::default(),
        }
    }

    /// Credentials attached to column-write requests
    pub fn with_credentials(mut self, username: impl Into<String>, password: impl Into<String>) -> Self {
        self.username = username.into();
        self.password = password.into();
        self
    }

    pub fn stats(&self) -> DispatchStats {
        self.stats
    }

    pub fn registry(&self) -> &BuilderRegistry {
        &self.registry
    }

    /// Send the next batch of lines to the context's current target
    pub async fn flush_lines(&mut self, ctx: &mut ImportContext) -> Result<()> {
        let target = ctx.target();
        self.flush_lines_to(ctx, &target).await
    }

    /// Send the next batch of lines to `target`.
    ///
    /// Without a database nothing is taken from the buffer.
    pub async fn flush_lines_to(&mut self, ctx: &mut ImportContext, target: &Target) -> Result<()> {
        if target.database.is_empty() {
            return Err(ImportError::DatabaseRequired);
        }
        let batch = ctx.take_line_batch();
        if batch.is_empty() {
            return Ok(());
        }

        match self.transport {
            Transport::RowWrite => {
                let count = batch.len() as u64;
                let result = self.write_rows(target, &batch).await;
                self.record(count, result)
            }
            Transport::ColumnWrite => {
                let points = self.parse_batch(&batch);
                if points.is_empty() {
                    return Err(ImportError::Parse("no valid line in batch".to_string()));
                }
                let result = self.write_points(target, &points).await;
                self.record(points.len() as u64, result)
            }
        }
    }

    /// Send the next batch of points; points always go through column-write
    pub async fn flush_points(&mut self, ctx: &mut ImportContext) -> Result<()> {
        let target = ctx.target();
        if target.database.is_empty() {
            return Err(ImportError::DatabaseRequired);
        }
        let batch = ctx.take_point_batch();
        if batch.is_empty() {
            return Ok(());
        }

        let result = self.write_points(&target, &batch).await;
        self.record(batch.len() as u64, result)
    }

    /// Flush until both buffers are empty, collecting every failure.
    ///
    /// Stops early when the buffers cannot make progress (no database) or the
    /// run is cancelled.
    pub async fn drain(&mut self, ctx: &mut ImportContext) -> Result<()> {
        let mut errors = Vec::new();

        while ctx.lines_pending() > 0 {
            if let Err(e) = self.flush_lines(ctx).await {
                let stop = matches!(e, ImportError::DatabaseRequired | ImportError::Cancelled);
                errors.push(e);
                if stop {
                    break;
                }
            }
        }

        while ctx.points_pending() > 0 {
            if let Err(e) = self.flush_points(ctx).await {
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

    async fn write_rows(&self, target: &Target, batch: &[String]) -> Result<()> {
        let raw = batch.join("\n");
        cancellable(
            &self.cancel,
            self.row
                .write(&target.database, &target.retention_policy, &raw, self.precision),
        )
        .await
    }

    /// Re-parse lines into points; unparsable lines are dropped on their own
    fn parse_batch(&mut self, batch: &[String]) -> Vec<Point> {
        let text = batch.join("\n");
        let mut points = Vec::with_capacity(batch.len());
        for parsed in LineProtocolParser::new(&text).with_precision(self.precision).points() {
            match parsed {
                Ok(point) => points.push(point),
                Err(e) => {
                    warn!(error = %e, "Dropping unparsable line");
                    self.stats.units_dropped += 1;
                }
            }
        }
        points
    }

    async fn write_points(&mut self, target: &Target, points: &[Point]) -> Result<()> {
        let records = points_to_records(points)?;
        let request = self
            .registry
            .get_or_create(&target.database, &target.retention_policy)?
            .authenticate(&self.username, &self.password)
            .add_records(records)
            .build()?;

        let lines = request.line_count();
        let response = cancellable(&self.cancel, self.column.write(request)).await?;
        debug!(lines, code = response.code, "Column write response");
        response.check()
    }

    fn record(&mut self, count: u64, result: Result<()>) -> Result<()> {
        match result {
            Ok(()) => {
                self.stats.batches_written += 1;
                self.stats.units_sent += count;
                debug!(units = count, "Batch written");
                Ok(())
            }
            Err(e) => {
                self.stats.batches_failed += 1;
                self.stats.units_dropped += count;
                warn!(dropped = count, error = %e, "Dropping batch after failed write");
                Err(e)
            }
        }
    }
}

/// Race a network call against the run's cancellation token
async fn cancellable<T, F>(cancel: &CancellationToken, fut: F) -> Result<T>
where
    F: Future<Output = Result<T>>,
{
    if cancel.is_cancelled() {
        return Err(ImportError::Cancelled);
    }
    tokio::select! {
        _ = cancel.cancelled() => Err(ImportError::Cancelled),
        result = fut => result,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::client::{ColumnWriteClient, RowWriteClient};
    use crate::column::{WriteRequest, WriteResponse};
    use crate::config::ImportConfig;
    use async_trait::async_trait;
    use parking_lot::Mutex;

    #[derive(Default)]
    struct Recorder {
        rows: Mutex<Vec<String>>,
        requests: Mutex<Vec<WriteRequest>>,
        code: i32,
    }

    #[async_trait]
    impl RowWriteClient for Recorder {
        async fn write(&self, _: &str, _: &str, raw: &str, _: Precision) -> Result<()> {
            self.rows.lock().push(raw.to_string());
            Ok(())
        }
    }

    #[async_trait]
    impl ColumnWriteClient for Recorder {
        async fn write(&self, request: WriteRequest) -> Result<WriteResponse> {
            self.requests.lock().push(request);
            Ok(WriteResponse::with_code(self.code, ""))
        }
    }

    fn setup(transport: Transport, code: i32, batch_size: usize) -> (Arc<Recorder>, BatchDispatcher, ImportContext) {
        let recorder = Arc::new(Recorder {
            code,
            ..Default::default()
        });
        let dispatcher = BatchDispatcher::new(
            transport,
            Precision::Nanos,
            recorder.clone(),
            recorder.clone(),
            CancellationToken::new(),
        );
        let mut ctx = ImportContext::new(&ImportConfig {
            batch_size,
            ..Default::default()
        });
        ctx.process_line("# DML").unwrap();
        ctx.process_line("# CONTEXT-DATABASE: db").unwrap();
        (recorder, dispatcher, ctx)
    }

    #[tokio::test]
    async fn test_row_write_joins_lines() {
        let (recorder, mut dispatcher, mut ctx) = setup(Transport::RowWrite, 0, 2);
        ctx.process_line("cpu v=1 1").unwrap();
        ctx.process_line("cpu v=2 2").unwrap();

        dispatcher.flush_lines(&mut ctx).await.unwrap();
        assert_eq!(*recorder.rows.lock(), vec!["cpu v=1 1\ncpu v=2 2".to_string()]);
        assert_eq!(dispatcher.stats().units_sent, 2);
        assert_eq!(ctx.lines_pending(), 0);
    }

    #[tokio::test]
    async fn test_column_write_groups_measurements() {
        let (recorder, mut dispatcher, mut ctx) = setup(Transport::ColumnWrite, 0, 10);
        ctx.process_line("cpu,host=a v=1 1").unwrap();
        ctx.process_line("mem free=2i 2").unwrap();
        ctx.process_line("cpu,host=b v=3 3").unwrap();

        dispatcher.flush_lines(&mut ctx).await.unwrap();
        let requests = recorder.requests.lock();
        assert_eq!(requests.len(), 1);
        assert_eq!(requests[0].database, "db");
        assert_eq!(requests[0].retention_policy, "autogen");
        assert_eq!(requests[0].records.len(), 2);
        assert_eq!(requests[0].line_count(), 3);
        assert_eq!(dispatcher.registry().len(), 1);
    }

    #[tokio::test]
    async fn test_column_write_skips_bad_lines() {
        let (recorder, mut dispatcher, mut ctx) = setup(Transport::ColumnWrite, 0, 10);
        ctx.process_line("cpu v=1 1").unwrap();
        ctx.process_line("cpu v=2 later").unwrap();

        dispatcher.flush_lines(&mut ctx).await.unwrap();
        assert_eq!(recorder.requests.lock()[0].line_count(), 1);
        assert_eq!(dispatcher.stats().units_sent, 1);
        assert_eq!(dispatcher.stats().units_dropped, 1);
    }

    #[tokio::test]
    async fn test_failed_batch_is_dropped() {
        let (_, mut dispatcher, mut ctx) = setup(Transport::ColumnWrite, 1, 10);
        ctx.process_line("cpu v=1 1").unwrap();

        let err = dispatcher.flush_lines(&mut ctx).await.unwrap_err();
        assert!(err.to_string().contains("partial write failure"));
        assert_eq!(ctx.lines_pending(), 0);
        assert_eq!(dispatcher.stats().batches_failed, 1);
        assert_eq!(dispatcher.stats().units_dropped, 1);
    }

    #[tokio::test]
    async fn test_missing_database_keeps_buffer() {
        let (_, mut dispatcher, mut ctx) = setup(Transport::RowWrite, 0, 10);
        ctx.process_line("cpu v=1 1").unwrap();

        let empty = Target::default();
        let err = dispatcher.flush_lines_to(&mut ctx, &empty).await.unwrap_err();
        assert!(matches!(err, ImportError::DatabaseRequired));
        assert_eq!(ctx.lines_pending(), 1);
    }

    #[tokio::test]
    async fn test_drain_sends_every_batch() {
        let (recorder, mut dispatcher, mut ctx) = setup(Transport::RowWrite, 0, 2);
        for i in 0..5 {
            ctx.process_line(&format!("cpu v={} {}", i, i)).unwrap();
        }

        dispatcher.drain(&mut ctx).await.unwrap();
        assert_eq!(recorder.rows.lock().len(), 3);
        assert_eq!(dispatcher.stats().units_sent, 5);
        assert_eq!(ctx.lines_pending(), 0);
    }

    #[tokio::test]
    async fn test_drain_aggregates_errors() {
        let (_, mut dispatcher, mut ctx) = setup(Transport::ColumnWrite, 2, 1);
        ctx.process_line("cpu v=1 1").unwrap();
        ctx.process_line("cpu v=2 2").unwrap();

        let err = dispatcher.drain(&mut ctx).await.unwrap_err();
        assert!(matches!(err, ImportError::Multiple(ref errors) if errors.len() == 2));
        assert_eq!(ctx.lines_pending(), 0);
    }

    #[tokio::test]
    async fn test_cancelled_write() {
        let (recorder, mut dispatcher, mut ctx) = setup(Transport::RowWrite, 0, 10);
        ctx.process_line("cpu v=1 1").unwrap();
        dispatcher.cancel.cancel();

        let err = dispatcher.flush_lines(&mut ctx).await.unwrap_err();
        assert!(matches!(err, ImportError::Cancelled));
        assert!(recorder.rows.lock().is_empty());
    }
}
