use std::collections::HashMap;
use std::time::Duration;

use rdkafka::config::ClientConfig;
use serde::Deserialize;

fn default_bootstrap_servers() -> String {
    "localhost:9092".into()
}
fn default_group_id() -> String {
    "users-stream".into()
}
fn default_topic() -> String {
    "users_created".into()
}
fn default_auto_offset_reset() -> String {
    "earliest".into()
}
fn default_batch_max_records() -> usize {
    500
}
fn default_batch_linger_ms() -> u64 {
    1000
}

/// Configuration of the Kafka consumer and of how micro-batches are cut.
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
pub struct KafkaSourceConfig {
    /// Kafka bootstrap servers (comma-separated).
    #[serde(default = "default_bootstrap_servers")]
    pub bootstrap_servers: String,

    /// Consumer group ID; committed offsets live under it.
    #[serde(default = "default_group_id")]
    pub group_id: String,

    #[serde(default = "default_topic")]
    pub topic: String,

    /// Where a group without committed offsets starts (earliest, latest).
    #[serde(default = "default_auto_offset_reset")]
    pub auto_offset_reset: String,

    /// Upper bound of messages in one micro-batch.
    #[serde(default = "default_batch_max_records")]
    pub batch_max_records: usize,

    /// How long a batch keeps collecting after its first message.
    #[serde(default = "default_batch_linger_ms")]
    pub batch_linger_ms: u64,

    /// Additional librdkafka properties.
    #[serde(default)]
    pub properties: HashMap<String, String>,
}

impl Default for KafkaSourceConfig {
    fn default() -> Self {
        Self {
            bootstrap_servers: default_bootstrap_servers(),
            group_id: default_group_id(),
            topic: default_topic(),
            auto_offset_reset: default_auto_offset_reset(),
            batch_max_records: default_batch_max_records(),
            batch_linger_ms: default_batch_linger_ms(),
            properties: HashMap::new(),
        }
    }
}

impl KafkaSourceConfig {
    pub fn batch_linger(&self) -> Duration {
        Duration::from_millis(self.batch_linger_ms)
    }

    /// librdkafka settings for the consumer. Offsets are committed by hand
    /// after each batch, so auto-commit stays off.
    pub fn client_config(&self) -> ClientConfig {
        let mut client_config = ClientConfig::new();
        client_config
            .set("bootstrap.servers", &self.bootstrap_servers)
            .set("group.id", &self.group_id)
            .set("auto.offset.reset", &self.auto_offset_reset)
            .set("enable.auto.commit", "false")
            .set("enable.partition.eof", "false");

        for (key, value) in &self.properties {
            client_config.set(key, value);
        }
        client_config
    }

    pub fn validate(&self) -> Result<(), String> {
        if self.bootstrap_servers.trim().is_empty() {
            return Err("bus address is empty".into());
        }
        if self.topic.trim().is_empty() {
            return Err("topic name is empty".into());
        }
        if self.batch_max_records == 0 {
            return Err("batch_max_records must be at least 1".into());
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn defaults_subscribe_from_earliest_without_auto_commit() {
        let cfg = KafkaSourceConfig::default();
        let client = cfg.client_config();
        assert_eq!(client.get("bootstrap.servers"), Some("localhost:9092"));
        assert_eq!(client.get("auto.offset.reset"), Some("earliest"));
        assert_eq!(client.get("enable.auto.commit"), Some("false"));
        assert_eq!(cfg.topic, "users_created");
    }

    #[test]
    fn extra_properties_override() {
        let cfg: KafkaSourceConfig = toml::from_str(
            r#"
            bootstrap_servers = "broker:29092"
            [properties]
            "session.timeout.ms" = "6000"
            "auto.offset.reset" = "latest"
            "#,
        )
        .unwrap();
        let client = cfg.client_config();
        assert_eq!(client.get("bootstrap.servers"), Some("broker:29092"));
        assert_eq!(client.get("session.timeout.ms"), Some("6000"));
        assert_eq!(client.get("auto.offset.reset"), Some("latest"));
    }

    #[test]
    fn validate_rejects_empty_topic_and_zero_batch() {
        let cfg = KafkaSourceConfig { topic: " ".into(), ..Default::default() };
        assert!(cfg.validate().is_err());
        let cfg = KafkaSourceConfig { batch_max_records: 0, ..Default::default() };
        assert!(cfg.validate().is_err());
        assert!(KafkaSourceConfig::default().validate().is_ok());
    }
}
