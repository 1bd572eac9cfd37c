use std::collections::HashMap;
use std::time::Duration;

use clap::{Args, Parser};
use serde::Deserialize;

use ingest_api::StoreSchema;
use pipeline::PipelineConfig;
use source_kafka::KafkaSourceConfig;
use storage_cassandra::is_cql_identifier;

use crate::error::ServerError;

/// Конфиг по умолчанию; только его отсутствие допустимо.
pub const DEFAULT_CONFIG_PATH: &str = "users-stream.toml";

const DEFAULT_STORE_ADDRESS: &str = "localhost:9042";
const DEFAULT_STORE_PORT: u16 = 9042;
const DEFAULT_KEYSPACE: &str = "spark_streams";
const DEFAULT_TABLE: &str = "created_users";

#[derive(Parser)]
#[command(name = "users-stream", about = "Kafka → Cassandra ingestion of user records")]
pub struct Cli {
    #[command(flatten)]
    pub args: StreamArgs,
}

// ═══════════════════════════════════════════════════════════════
//  CLI / env args
// ═══════════════════════════════════════════════════════════════

#[derive(Args, Clone, Debug, Default)]
pub struct StreamArgs {
    /// Путь к TOML конфиг файлу
    #[arg(long, default_value = DEFAULT_CONFIG_PATH, env = "USERS_STREAM_CONFIG")]
    pub config: String,

    /// Kafka bootstrap servers
    #[arg(long, env = "BUS_ADDRESS")]
    pub bus_address: Option<String>,

    /// Cassandra contact points, comma-separated host[:port]
    #[arg(long, env = "STORE_ADDRESS")]
    pub store_address: Option<String>,

    #[arg(long, env = "TOPIC_NAME")]
    pub topic_name: Option<String>,

    #[arg(long, env = "KEYSPACE_NAME")]
    pub keyspace_name: Option<String>,

    #[arg(long, env = "TABLE_NAME")]
    pub table_name: Option<String>,

    /// Kafka consumer group
    #[arg(long, env = "GROUP_ID")]
    pub group_id: Option<String>,

    /// Replication factor для CREATE KEYSPACE (SimpleStrategy)
    #[arg(long, env = "REPLICATION_FACTOR")]
    pub replication_factor: Option<u32>,

    /// Максимум сообщений в одном micro-batch
    #[arg(long, env = "BATCH_MAX_RECORDS")]
    pub batch_max_records: Option<usize>,

    /// Сколько ждать добора batch'а после первого сообщения, мс
    #[arg(long, env = "BATCH_LINGER_MS")]
    pub batch_linger_ms: Option<u64>,

    /// Параллельных upsert'ов внутри batch'а
    #[arg(long, env = "WRITE_CONCURRENCY")]
    pub write_concurrency: Option<usize>,

    /// Таймаут подключения к шине и store, мс
    #[arg(long, env = "CONNECT_TIMEOUT_MS")]
    pub connect_timeout_ms: Option<u64>,
}

// ═══════════════════════════════════════════════════════════════
//  Config file (TOML)
// ═══════════════════════════════════════════════════════════════

#[derive(Debug, Default, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct FileConfig {
    pub bus_address: Option<String>,
    pub store_address: Option<String>,
    pub topic_name: Option<String>,
    pub keyspace_name: Option<String>,
    pub table_name: Option<String>,
    pub group_id: Option<String>,
    pub replication_factor: Option<u32>,
    pub batch_max_records: Option<usize>,
    pub batch_linger_ms: Option<u64>,
    pub write_concurrency: Option<usize>,
    pub connect_timeout_ms: Option<u64>,
    pub retry_backoff_ms: Option<u64>,
    /// Extra librdkafka properties, passed through as-is.
    #[serde(default)]
    pub kafka: HashMap<String, String>,
}

pub fn load_config(path: &str) -> Result<FileConfig, ServerError> {
    let content = std::fs::read_to_string(path)
        .map_err(|e| ServerError::Config { context: "read", detail: format!("'{path}': {e}") })?;
    toml::from_str(&content)
        .map_err(|e| ServerError::Config { context: "parse", detail: format!("'{path}': {e}") })
}

/// Split `host[:port],host[:port]` into contact points, defaulting the port.
pub fn parse_contact_points(address: &str) -> Vec<String> {
    address
        .split(',')
        .map(str::trim)
        .filter(|s| !s.is_empty())
        .map(|s| {
            if s.contains(':') {
                s.to_string()
            } else {
                format!("{s}:{DEFAULT_STORE_PORT}")
            }
        })
        .collect()
}

// ═══════════════════════════════════════════════════════════════
//  Effective — merged config
// ═══════════════════════════════════════════════════════════════

/// Итоговая конфигурация после мержа: config.toml < env/CLI
#[derive(Debug)]
pub struct Effective {
    pub source: KafkaSourceConfig,
    pub store_nodes: Vec<String>,
    pub store_schema: StoreSchema,
    pub pipeline: PipelineConfig,
    pub connect_timeout: Duration,
}

impl Effective {
    pub fn new(args: &StreamArgs) -> Result<Self, ServerError> {
        let file = if args.config == DEFAULT_CONFIG_PATH && !std::path::Path::new(&args.config).exists() {
            FileConfig::default()
        } else {
            load_config(&args.config)?
        };
        Self::merge(args, file)
    }

    pub fn merge(args: &StreamArgs, file: FileConfig) -> Result<Self, ServerError> {
        let kafka_defaults = KafkaSourceConfig::default();
        let pipeline_defaults = PipelineConfig::default();

        let source = KafkaSourceConfig {
            bootstrap_servers: args.bus_address.clone().or(file.bus_address).unwrap_or(kafka_defaults.bootstrap_servers),
            group_id: args.group_id.clone().or(file.group_id).unwrap_or(kafka_defaults.group_id),
            topic: args.topic_name.clone().or(file.topic_name).unwrap_or(kafka_defaults.topic),
            auto_offset_reset: kafka_defaults.auto_offset_reset,
            batch_max_records: args
                .batch_max_records
                .or(file.batch_max_records)
                .unwrap_or(kafka_defaults.batch_max_records),
            batch_linger_ms: args.batch_linger_ms.or(file.batch_linger_ms).unwrap_or(kafka_defaults.batch_linger_ms),
            properties: file.kafka,
        };

        let store_address = args
            .store_address
            .clone()
            .or(file.store_address)
            .unwrap_or_else(|| DEFAULT_STORE_ADDRESS.to_string());

        let store_schema = StoreSchema {
            keyspace: args.keyspace_name.clone().or(file.keyspace_name).unwrap_or_else(|| DEFAULT_KEYSPACE.into()),
            table: args.table_name.clone().or(file.table_name).unwrap_or_else(|| DEFAULT_TABLE.into()),
            replication_factor: args.replication_factor.or(file.replication_factor).unwrap_or(1),
        };

        let pipeline = PipelineConfig {
            write_concurrency: args
                .write_concurrency
                .or(file.write_concurrency)
                .unwrap_or(pipeline_defaults.write_concurrency),
            retry_backoff_ms: file.retry_backoff_ms.unwrap_or(pipeline_defaults.retry_backoff_ms),
        };

        let eff = Self {
            source,
            store_nodes: parse_contact_points(&store_address),
            store_schema,
            pipeline,
            connect_timeout: Duration::from_millis(args.connect_timeout_ms.or(file.connect_timeout_ms).unwrap_or(10_000)),
        };
        eff.validate()?;
        Ok(eff)
    }

    fn validate(&self) -> Result<(), ServerError> {
        self.source.validate().map_err(ServerError::invalid)?;
        self.pipeline.validate().map_err(ServerError::invalid)?;
        if self.store_nodes.is_empty() {
            return Err(ServerError::invalid("store address is empty"));
        }
        for (what, name) in [("keyspace", &self.store_schema.keyspace), ("table", &self.store_schema.table)] {
            if !is_cql_identifier(name) {
                return Err(ServerError::invalid(format!("{what} name '{name}' is not a valid CQL identifier")));
            }
        }
        if self.store_schema.replication_factor == 0 {
            return Err(ServerError::invalid("replication_factor must be at least 1"));
        }
        Ok(())
    }
}
