use std::collections::BTreeMap;
use std::future::Future;
use std::pin::Pin;

use crate::{IngestError, StoreSchema, ValidatedUser};

// ════════════════════════════════════════════════════════════════
//  Bus messages
// ════════════════════════════════════════════════════════════════

/// Одно сообщение шины, скопированное из буфера consumer'а.
///
/// `payload = None` — tombstone или пустое сообщение.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RawMessage {
    pub topic: String,
    pub partition: i32,
    pub offset: i64,
    pub payload: Option<Vec<u8>>,
}

impl RawMessage {
    pub fn new(topic: impl Into<String>, partition: i32, offset: i64, payload: impl Into<Vec<u8>>) -> Self {
        Self {
            topic: topic.into(),
            partition,
            offset,
            payload: Some(payload.into()),
        }
    }
}

/// A bounded group of messages pulled and processed together.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct MicroBatch {
    pub id: u64,
    pub messages: Vec<RawMessage>,
}

impl MicroBatch {
    pub fn len(&self) -> usize {
        self.messages.len()
    }

    pub fn is_empty(&self) -> bool {
        self.messages.is_empty()
    }

    /// Next offset to consume per `(topic, partition)`: highest seen + 1.
    pub fn next_offsets(&self) -> BTreeMap<(String, i32), i64> {
        let mut offsets: BTreeMap<(String, i32), i64> = BTreeMap::new();
        for m in &self.messages {
            let next = offsets.entry((m.topic.clone(), m.partition)).or_insert(m.offset + 1);
            *next = (*next).max(m.offset + 1);
        }
        offsets
    }
}

// ════════════════════════════════════════════════════════════════
//  Seams
// ════════════════════════════════════════════════════════════════

/// Источник micro-batch'ей (шина).
pub trait BatchSource: Send {
    /// Wait for the next micro-batch. `Ok(None)` means the source is closed.
    fn next_batch(&mut self) -> Pin<Box<dyn Future<Output = Result<Option<MicroBatch>, IngestError>> + Send + '_>>;

    /// Advance the consumer cursor past every message of `batch`.
    fn commit(&mut self, batch: &MicroBatch) -> Pin<Box<dyn Future<Output = Result<(), IngestError>> + Send + '_>>;
}

/// Хранилище пользователей с upsert-семантикой по `id`.
pub trait UserStore: Send + Sync {
    /// Idempotent create-if-not-exists of namespace and table.
    fn init(&self, schema: &StoreSchema) -> Pin<Box<dyn Future<Output = Result<(), IngestError>> + Send + '_>>;

    /// Insert the row, or replace it in place when the id already exists.
    fn upsert(&self, user: &ValidatedUser) -> Pin<Box<dyn Future<Output = Result<(), IngestError>> + Send + '_>>;
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn next_offsets_per_partition() {
        let batch = MicroBatch {
            id: 3,
            messages: vec![
                RawMessage::new("users_created", 0, 10, "{}"),
                RawMessage::new("users_created", 1, 4, "{}"),
                RawMessage::new("users_created", 0, 12, "{}"),
                RawMessage::new("users_created", 0, 11, "{}"),
            ],
        };
        let offsets = batch.next_offsets();
        assert_eq!(offsets.len(), 2);
        assert_eq!(offsets[&("users_created".to_string(), 0)], 13);
        assert_eq!(offsets[&("users_created".to_string(), 1)], 5);
    }

    #[test]
    fn empty_batch_has_no_offsets() {
        let batch = MicroBatch { id: 0, messages: Vec::new() };
        assert!(batch.is_empty());
        assert!(batch.next_offsets().is_empty());
    }
}
