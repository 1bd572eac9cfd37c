//! Kafka source: cuts micro-batches of user messages from one topic.

mod config;

use std::future::Future;
use std::pin::Pin;
use std::time::Duration;

use rdkafka::consumer::{CommitMode, Consumer, StreamConsumer};
use rdkafka::error::KafkaError;
use rdkafka::message::Message;
use rdkafka::types::RDKafkaErrorCode;
use rdkafka::{Offset, TopicPartitionList};
use tracing::{debug, info, warn};

use ingest_api::{BatchSource, IngestError, MicroBatch, RawMessage};

pub use config::KafkaSourceConfig;

/// Map a client error onto the pipeline's taxonomy. Only librdkafka's own
/// fatal state means the consumer is unusable; everything else may heal.
pub fn classify(e: &KafkaError) -> IngestError {
    match e.rdkafka_error_code() {
        Some(RDKafkaErrorCode::Fatal) => IngestError::fatal(format!("kafka: {e}")),
        _ => IngestError::io(format!("kafka: {e}")),
    }
}

fn to_raw<M: Message>(message: &M) -> RawMessage {
    RawMessage {
        topic: message.topic().to_string(),
        partition: message.partition(),
        offset: message.offset(),
        payload: message.payload().map(<[u8]>::to_vec),
    }
}

fn commit_list(batch: &MicroBatch) -> Result<TopicPartitionList, IngestError> {
    let mut tpl = TopicPartitionList::new();
    for ((topic, partition), offset) in batch.next_offsets() {
        tpl.add_partition_offset(&topic, partition, Offset::Offset(offset))
            .map_err(|e| classify(&e))?;
    }
    Ok(tpl)
}

// ═══════════════════════════════════════════════════════════════
//  KafkaSource
// ═══════════════════════════════════════════════════════════════

/// A subscribed consumer group member.
pub struct KafkaSource {
    consumer: StreamConsumer,
    max_records: usize,
    linger: Duration,
    next_batch_id: u64,
}

impl KafkaSource {
    /// Create the consumer, subscribe, and make sure a broker answers within
    /// `timeout`. Blocking: call from a blocking-friendly context.
    pub fn connect(config: &KafkaSourceConfig, timeout: Duration) -> Result<Self, IngestError> {
        config.validate().map_err(IngestError::config)?;

        let consumer: StreamConsumer = config
            .client_config()
            .create()
            .map_err(|e| IngestError::config(format!("kafka consumer: {e}")))?;

        let metadata = consumer
            .fetch_metadata(Some(config.topic.as_str()), timeout)
            .map_err(|e| IngestError::io(format!("kafka brokers at {} unreachable: {e}", config.bootstrap_servers)))?;
        match metadata.topics().iter().find(|t| t.name() == config.topic) {
            Some(topic) if topic.error().is_none() => {
                info!(topic = %config.topic, partitions = topic.partitions().len(), "topic found");
            }
            _ => warn!(topic = %config.topic, "topic not available yet, waiting for it to appear"),
        }

        consumer
            .subscribe(&[config.topic.as_str()])
            .map_err(|e| IngestError::config(format!("kafka subscribe '{}': {e}", config.topic)))?;

        info!(
            brokers = metadata.brokers().len(),
            topic = %config.topic,
            group_id = %config.group_id,
            auto_offset_reset = %config.auto_offset_reset,
            "Kafka source connected"
        );

        Ok(Self {
            consumer,
            max_records: config.batch_max_records.max(1),
            linger: config.batch_linger(),
            next_batch_id: 0,
        })
    }

    async fn collect_batch(&mut self) -> Result<MicroBatch, IngestError> {
        // Первое сообщение ждём без ограничения по времени.
        let first = to_raw(&self.consumer.recv().await.map_err(|e| classify(&e))?);
        let mut messages = vec![first];

        let deadline = tokio::time::Instant::now() + self.linger;
        while messages.len() < self.max_records {
            match tokio::time::timeout_at(deadline, self.consumer.recv()).await {
                Ok(Ok(message)) => messages.push(to_raw(&message)),
                Ok(Err(e)) => {
                    // Keep what was already consumed; the error resurfaces on the next pull.
                    warn!(error = %e, collected = messages.len(), "kafka error while filling batch");
                    break;
                }
                Err(_) => break,
            }
        }

        let id = self.next_batch_id;
        self.next_batch_id += 1;
        debug!(batch_id = id, messages = messages.len(), "batch cut");
        Ok(MicroBatch { id, messages })
    }
}

impl BatchSource for KafkaSource {
    fn next_batch(&mut self) -> Pin<Box<dyn Future<Output = Result<Option<MicroBatch>, IngestError>> + Send + '_>> {
        Box::pin(async move { self.collect_batch().await.map(Some) })
    }

    fn commit(&mut self, batch: &MicroBatch) -> Pin<Box<dyn Future<Output = Result<(), IngestError>> + Send + '_>> {
        let result = commit_list(batch).and_then(|tpl| {
            self.consumer
                .commit(&tpl, CommitMode::Async)
                .map_err(|e| classify(&e))
        });
        if result.is_ok() {
            debug!(batch_id = batch.id, "offsets committed");
        }
        Box::pin(std::future::ready(result))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use ingest_api::ErrorKind;

    #[test]
    fn commit_list_points_past_last_offset() {
        let batch = MicroBatch {
            id: 1,
            messages: vec![
                RawMessage::new("users_created", 0, 41, "{}"),
                RawMessage::new("users_created", 2, 7, "{}"),
                RawMessage::new("users_created", 0, 42, "{}"),
            ],
        };
        let tpl = commit_list(&batch).unwrap();
        assert_eq!(tpl.count(), 2);
        let p0 = tpl.find_partition("users_created", 0).unwrap();
        assert_eq!(p0.offset(), Offset::Offset(43));
        let p2 = tpl.find_partition("users_created", 2).unwrap();
        assert_eq!(p2.offset(), Offset::Offset(8));
    }

    #[test]
    fn only_librdkafka_fatal_is_fatal() {
        let transient = KafkaError::MessageConsumption(RDKafkaErrorCode::AllBrokersDown);
        assert_eq!(classify(&transient).kind(), ErrorKind::Io);

        let fatal = KafkaError::MessageConsumption(RDKafkaErrorCode::Fatal);
        assert_eq!(classify(&fatal).kind(), ErrorKind::Fatal);
    }
}
