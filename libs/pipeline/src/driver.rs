use std::sync::Arc;
use std::time::Duration;

use tokio_util::sync::CancellationToken;

use ingest_api::{BatchSource, MicroBatch, UserStore};

use crate::config::PipelineConfig;
use crate::parser::parse_batch;
use crate::upsert::{BatchReport, UpsertExecutor};
use crate::PipelineError;

/// Жизненный цикл driver'а.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DriverState {
    /// Connections and DDL are being set up by the caller.
    Initializing,
    Streaming,
    Terminated,
}

impl std::fmt::Display for DriverState {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            DriverState::Initializing => f.write_str("initializing"),
            DriverState::Streaming => f.write_str("streaming"),
            DriverState::Terminated => f.write_str("terminated"),
        }
    }
}

/// Why `run` returned without an error.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Exit {
    Cancelled,
    SourceClosed,
}

/// Running totals over all batches.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Totals {
    pub batches: u64,
    pub messages: u64,
    pub dropped: u64,
    pub written: u64,
    pub rejected: u64,
    pub failed: u64,
}

impl Totals {
    fn add(&mut self, report: &BatchReport) {
        self.batches += 1;
        self.messages += report.messages as u64;
        self.dropped += report.dropped as u64;
        self.written += report.written as u64;
        self.rejected += report.rejected as u64;
        self.failed += report.failed as u64;
    }
}

// ═══════════════════════════════════════════════════════════════
//  BatchDriver — source.next_batch() → parse → upsert → commit
// ═══════════════════════════════════════════════════════════════

/// Owns the bus subscription and the store handle for the life of the
/// process and feeds one micro-batch at a time through the executor.
///
/// The cursor is committed only after the executor returned for a batch,
/// so a crash in between means redelivery, which keyed upserts absorb.
pub struct BatchDriver {
    source: Box<dyn BatchSource>,
    store: Arc<dyn UserStore>,
    executor: UpsertExecutor,
    retry_backoff: Duration,
    state: DriverState,
    totals: Totals,
}

impl BatchDriver {
    pub fn new(source: Box<dyn BatchSource>, store: Arc<dyn UserStore>, config: &PipelineConfig) -> Self {
        Self {
            source,
            store,
            executor: UpsertExecutor::new(config.write_concurrency),
            retry_backoff: config.retry_backoff(),
            state: DriverState::Initializing,
            totals: Totals::default(),
        }
    }

    pub fn state(&self) -> DriverState {
        self.state
    }

    pub fn totals(&self) -> &Totals {
        &self.totals
    }

    fn transition(&mut self, next: DriverState) {
        tracing::info!(from = %self.state, to = %next, "driver state");
        self.state = next;
    }

    /// Pull and process batches until cancelled, the source closes, or an
    /// external system is lost for good.
    ///
    /// Cancellation is checked between batches only: a batch whose writes
    /// have started runs to the end and is committed.
    pub async fn run(&mut self, token: CancellationToken) -> Result<Exit, PipelineError> {
        self.transition(DriverState::Streaming);
        let result = self.stream(&token).await;
        self.transition(DriverState::Terminated);

        match &result {
            Ok(exit) => tracing::info!(?exit, totals = ?self.totals, "driver stopped"),
            Err(e) => tracing::error!(error = %e, totals = ?self.totals, "driver failed"),
        }
        result
    }

    async fn stream(&mut self, token: &CancellationToken) -> Result<Exit, PipelineError> {
        loop {
            let next = tokio::select! {
                biased;
                _ = token.cancelled() => None,
                next = self.source.next_batch() => Some(next),
            };
            let Some(next) = next else {
                return Ok(Exit::Cancelled);
            };

            match next {
                Ok(Some(batch)) => {
                    self.process_batch(batch).await?;
                }
                Ok(None) => return Ok(Exit::SourceClosed),
                Err(e) if e.is_fatal() => return Err(PipelineError::Source(e)),
                Err(e) => {
                    tracing::warn!(error = ?e, backoff_ms = self.retry_backoff.as_millis() as u64, "source error, retrying");
                    tokio::select! {
                        biased;
                        _ = token.cancelled() => return Ok(Exit::Cancelled),
                        _ = tokio::time::sleep(self.retry_backoff) => {}
                    }
                }
            }
        }
    }

    /// Parse, upsert and commit one micro-batch.
    pub async fn process_batch(&mut self, batch: MicroBatch) -> Result<BatchReport, PipelineError> {
        if batch.is_empty() {
            return Ok(BatchReport { batch_id: batch.id, ..Default::default() });
        }

        let mut report = self
            .executor
            .execute(self.store.as_ref(), batch.id, parse_batch(&batch))
            .await?;
        report.messages = batch.len();
        report.dropped = report.messages - report.processed();

        if let Err(e) = self.source.commit(&batch).await {
            tracing::warn!(batch_id = batch.id, error = ?e, "offset commit failed, batch may be redelivered");
        }

        tracing::info!(
            batch_id = report.batch_id,
            messages = report.messages,
            dropped = report.dropped,
            written = report.written,
            rejected = report.rejected,
            failed = report.failed,
            "batch done"
        );
        self.totals.add(&report);
        Ok(report)
    }
}
