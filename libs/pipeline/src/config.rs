use std::time::Duration;

use serde::Deserialize;

fn default_write_concurrency() -> usize {
    1
}

fn default_retry_backoff_ms() -> u64 {
    1000
}

/// Настройки batch driver'а и upsert executor'а.
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
pub struct PipelineConfig {
    /// Сколько upsert'ов одного batch'а может быть в полёте одновременно.
    /// 1 — строго последовательно.
    #[serde(default = "default_write_concurrency")]
    pub write_concurrency: usize,
    /// Пауза перед повтором после transient ошибки источника.
    #[serde(default = "default_retry_backoff_ms")]
    pub retry_backoff_ms: u64,
}

impl Default for PipelineConfig {
    fn default() -> Self {
        Self {
            write_concurrency: default_write_concurrency(),
            retry_backoff_ms: default_retry_backoff_ms(),
        }
    }
}

impl PipelineConfig {
    pub fn retry_backoff(&self) -> Duration {
        Duration::from_millis(self.retry_backoff_ms)
    }

    pub fn validate(&self) -> Result<(), String> {
        if self.write_concurrency == 0 {
            return Err("write_concurrency must be at least 1".into());
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn defaults_apply_to_empty_table() {
        let cfg: PipelineConfig = toml::from_str("").unwrap();
        assert_eq!(cfg, PipelineConfig::default());
        assert_eq!(cfg.retry_backoff(), Duration::from_secs(1));
    }

    #[test]
    fn zero_concurrency_is_rejected() {
        let cfg = PipelineConfig { write_concurrency: 0, ..Default::default() };
        assert!(cfg.validate().is_err());
    }
}
