use futures::stream::{self, StreamExt};

use ingest_api::{IngestError, UserRecord, UserStore};

use crate::PipelineError;

/// What happened to one record of a batch.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum RecordOutcome {
    Written,
    /// The id failed validation; nothing was sent to the store.
    Rejected(IngestError),
    /// The store refused or timed out the write.
    Failed(IngestError),
}

/// Counters for one processed micro-batch.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct BatchReport {
    pub batch_id: u64,
    pub messages: usize,
    pub dropped: usize,
    pub written: usize,
    pub rejected: usize,
    pub failed: usize,
}

impl BatchReport {
    pub fn processed(&self) -> usize {
        self.written + self.rejected + self.failed
    }
}

// ═══════════════════════════════════════════════════════════════
//  UpsertExecutor
// ═══════════════════════════════════════════════════════════════

/// Turns parsed records into keyed upserts against a store.
///
/// Failures stay with their record: a bad id or a refused write is logged
/// and counted, the rest of the batch is still written. The one exception
/// is a `Fatal` store error, after which nothing more is attempted.
#[derive(Debug, Clone)]
pub struct UpsertExecutor {
    concurrency: usize,
}

impl UpsertExecutor {
    pub fn new(concurrency: usize) -> Self {
        Self { concurrency: concurrency.max(1) }
    }

    pub fn concurrency(&self) -> usize {
        self.concurrency
    }

    /// Validate and write a single record.
    pub async fn upsert_record(store: &dyn UserStore, batch_id: u64, record: UserRecord) -> RecordOutcome {
        let raw_id = record.id.clone();
        let user = match record.validate() {
            Ok(user) => user,
            Err(e) => {
                tracing::error!(batch_id, id = ?raw_id, error = %e, "rejected record");
                return RecordOutcome::Rejected(e);
            }
        };

        match store.upsert(&user).await {
            Ok(()) => {
                tracing::debug!(
                    batch_id,
                    id = %user.id,
                    first_name = user.record.first_name.as_deref().unwrap_or(""),
                    last_name = user.record.last_name.as_deref().unwrap_or(""),
                    "inserted"
                );
                RecordOutcome::Written
            }
            Err(e) => {
                tracing::error!(batch_id, id = %user.id, kind = %e.kind(), error = %e, "could not insert");
                RecordOutcome::Failed(e)
            }
        }
    }

    /// Write every record of a batch. Up to `concurrency` writes are in
    /// flight at once, with no ordering between rows.
    pub async fn execute<I>(&self, store: &dyn UserStore, batch_id: u64, records: I) -> Result<BatchReport, PipelineError>
    where
        I: IntoIterator<Item = UserRecord>,
    {
        let mut report = BatchReport { batch_id, ..Default::default() };
        let mut outcomes = stream::iter(records)
            .map(|record| Self::upsert_record(store, batch_id, record))
            .buffer_unordered(self.concurrency);

        while let Some(outcome) = outcomes.next().await {
            match outcome {
                RecordOutcome::Written => report.written += 1,
                RecordOutcome::Rejected(_) => report.rejected += 1,
                RecordOutcome::Failed(e) if e.is_fatal() => {
                    return Err(PipelineError::StoreLost { batch_id, source: e });
                }
                RecordOutcome::Failed(_) => report.failed += 1,
            }
        }
        Ok(report)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use ingest_api::ErrorKind;
    use storage_memory::MemoryUserStore;
    use uuid::Uuid;

    const ID_1: &str = "11111111-1111-4111-8111-111111111111";
    const ID_2: &str = "22222222-2222-4222-8222-222222222222";
    const ID_3: &str = "33333333-3333-4333-8333-333333333333";

    fn record(id: Option<&str>, first_name: &str) -> UserRecord {
        UserRecord {
            id: id.map(str::to_string),
            first_name: Some(first_name.to_string()),
            last_name: Some("Tester".to_string()),
            post_code: Some("10115".to_string()),
            ..Default::default()
        }
    }

    fn uuid(s: &str) -> Uuid {
        Uuid::parse_str(s).unwrap()
    }

    #[tokio::test]
    async fn valid_record_is_written_with_its_fields() {
        let store = MemoryUserStore::new();
        let outcome = UpsertExecutor::upsert_record(&store, 0, record(Some(ID_1), "Ada")).await;

        assert_eq!(outcome, RecordOutcome::Written);
        assert_eq!(store.attempts(), 1);
        assert_eq!(store.get(&uuid(ID_1)).await.unwrap(), record(Some(ID_1), "Ada"));
    }

    #[tokio::test]
    async fn replay_yields_one_row() {
        let store = MemoryUserStore::new();
        let executor = UpsertExecutor::new(1);
        let batch = vec![record(Some(ID_1), "Ada"), record(Some(ID_2), "Grace")];

        let first = executor.execute(&store, 0, batch.clone()).await.unwrap();
        let replay = executor.execute(&store, 0, batch).await.unwrap();

        assert_eq!(first.written, 2);
        assert_eq!(replay.written, 2);
        assert_eq!(store.len().await, 2);
        assert_eq!(store.get(&uuid(ID_1)).await.unwrap().first_name.as_deref(), Some("Ada"));
    }

    #[tokio::test]
    async fn empty_or_absent_id_is_rejected_without_write() {
        let store = MemoryUserStore::new();
        for id in [None, Some("")] {
            match UpsertExecutor::upsert_record(&store, 0, record(id, "Nobody")).await {
                RecordOutcome::Rejected(e) => {
                    assert_eq!(e.kind(), ErrorKind::Validation);
                    assert!(e.message().contains("missing"));
                }
                other => panic!("unexpected outcome: {other:?}"),
            }
        }
        assert_eq!(store.attempts(), 0);
        assert!(store.is_empty().await);
    }

    #[tokio::test]
    async fn malformed_id_is_rejected_without_write() {
        let store = MemoryUserStore::new();
        match UpsertExecutor::upsert_record(&store, 0, record(Some("not-a-uuid"), "Nobody")).await {
            RecordOutcome::Rejected(e) => assert!(e.message().contains("invalid UUID format")),
            other => panic!("unexpected outcome: {other:?}"),
        }
        assert_eq!(store.attempts(), 0);
    }

    #[tokio::test]
    async fn bad_id_in_the_middle_does_not_abort_batch() {
        let store = MemoryUserStore::new();
        let batch = vec![
            record(Some(ID_1), "First"),
            record(Some(""), "Second"),
            record(Some(ID_3), "Third"),
        ];

        let report = UpsertExecutor::new(1).execute(&store, 4, batch).await.unwrap();

        assert_eq!(report, BatchReport { batch_id: 4, written: 2, rejected: 1, ..Default::default() });
        assert!(store.get(&uuid(ID_1)).await.is_some());
        assert!(store.get(&uuid(ID_3)).await.is_some());
        assert_eq!(store.len().await, 2);
    }

    #[tokio::test]
    async fn transient_write_failure_does_not_stop_later_writes() {
        let store = MemoryUserStore::new();
        store.fail_id(uuid(ID_2), IngestError::io("store unreachable")).await;
        let batch = vec![
            record(Some(ID_1), "First"),
            record(Some(ID_2), "Second"),
            record(Some(ID_3), "Third"),
        ];

        let report = UpsertExecutor::new(1).execute(&store, 0, batch).await.unwrap();

        assert_eq!(report.written, 2);
        assert_eq!(report.failed, 1);
        assert_eq!(store.attempts(), 3);
        assert!(store.get(&uuid(ID_2)).await.is_none());
        assert!(store.get(&uuid(ID_3)).await.is_some());
    }

    #[tokio::test]
    async fn store_outage_on_first_writes_is_counted_per_record() {
        let store = MemoryUserStore::new();
        store.fail_next(IngestError::io("connection reset")).await;
        store.fail_next(IngestError::io("connection reset")).await;
        let batch = vec![
            record(Some(ID_1), "First"),
            record(Some(ID_2), "Second"),
            record(Some(ID_3), "Third"),
        ];

        let report = UpsertExecutor::new(1).execute(&store, 2, batch).await.unwrap();

        assert_eq!(report, BatchReport { batch_id: 2, written: 1, failed: 2, ..Default::default() });
        assert_eq!(store.attempts(), 3);
        assert_eq!(store.len().await, 1);
        assert!(store.get(&uuid(ID_3)).await.is_some());
    }

    #[tokio::test]
    async fn fatal_write_failure_stops_the_batch() {
        let store = MemoryUserStore::new();
        store.fail_id(uuid(ID_2), IngestError::fatal("session closed")).await;
        let batch = vec![
            record(Some(ID_1), "First"),
            record(Some(ID_2), "Second"),
            record(Some(ID_3), "Third"),
        ];

        let err = UpsertExecutor::new(1).execute(&store, 9, batch).await.unwrap_err();

        assert!(matches!(err, PipelineError::StoreLost { batch_id: 9, .. }));
        assert_eq!(store.attempts(), 2);
        assert!(store.get(&uuid(ID_3)).await.is_none());
    }

    #[tokio::test]
    async fn concurrent_writes_reach_every_row() {
        let store = MemoryUserStore::new();
        let batch: Vec<UserRecord> = (0..32)
            .map(|i| {
                let id = Uuid::from_u128(0x1000 + i).to_string();
                record(Some(&id), &format!("user-{i}"))
            })
            .collect();

        let report = UpsertExecutor::new(8).execute(&store, 0, batch).await.unwrap();

        assert_eq!(report.written, 32);
        assert_eq!(store.len().await, 32);
    }

    #[test]
    fn zero_concurrency_means_sequential() {
        assert_eq!(UpsertExecutor::new(0).concurrency(), 1);
    }
}
